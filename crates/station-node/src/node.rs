use serde::{Deserialize, Serialize};

use station_shared::{NetworkPolicy, NodeId, NodeRole, StationNodeConfig, StationStats};

/// Snapshot of a station node, published on every state transition and
/// stats update.
///
/// `is_running` records *intent* only; the lifecycle controller derives
/// the reported state from the actually bound channels at query time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationNode {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub role: NodeRole,
    pub station_callsign: String,
    pub operator_callsign: String,
    pub station_public_key: String,
    pub operator_public_key: String,
    pub network_name: String,
    pub config: StationNodeConfig,
    pub policy: NetworkPolicy,
    pub stats: StationStats,
    pub error_message: Option<String>,
    pub is_running: bool,
}

impl StationNode {
    pub fn is_root(&self) -> bool {
        self.role == NodeRole::Root
    }
}
