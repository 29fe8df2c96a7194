use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Station node identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a station node within its network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Founding authority of the network. Deleting a root node dissolves
    /// the network for every remote participant.
    Root,
    /// A station managed from this device but hosted elsewhere.
    Remote,
}

/// Named content types a station can agree to carry.
///
/// The station treats these as opaque collections; their content format is
/// owned by the application layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Reports,
    Chat,
    Forum,
    Files,
    Inventory,
    Contacts,
}

/// Which retention rule applies to records in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionClass {
    /// Swept by `retention_days` (forum/report-like collections).
    Forum,
    /// Swept by `chat_retention_days`.
    Chat,
    /// Never swept regardless of configuration.
    Exempt,
}

impl CollectionType {
    /// Per-collection instancing policy: whether a station may carry more
    /// than one instance of this collection. A capability table, not a
    /// type hierarchy.
    pub fn allows_multiple_instances(&self) -> bool {
        match self {
            CollectionType::Forum | CollectionType::Contacts => false,
            CollectionType::Reports
            | CollectionType::Chat
            | CollectionType::Files
            | CollectionType::Inventory => true,
        }
    }

    /// Which retention rule governs records in this collection.
    pub fn retention_class(&self) -> RetentionClass {
        match self {
            CollectionType::Reports | CollectionType::Forum => RetentionClass::Forum,
            CollectionType::Chat => RetentionClass::Chat,
            CollectionType::Files | CollectionType::Inventory | CollectionType::Contacts => {
                RetentionClass::Exempt
            }
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CollectionType::Reports => "reports",
            CollectionType::Chat => "chat",
            CollectionType::Forum => "forum",
            CollectionType::Files => "files",
            CollectionType::Inventory => "inventory",
            CollectionType::Contacts => "contacts",
        };
        write!(f, "{name}")
    }
}

/// Live counters reported by a running station.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationStats {
    pub connected_devices: u32,
    pub messages_relayed: u64,
    pub storage_used_mb: u64,
    pub uptime_secs: u64,
}

/// A station running elsewhere that this device manages remotely.
///
/// Independent of any local station node; removing the reference never
/// affects the remote server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteStationReference {
    pub id: NodeId,
    pub name: String,
    pub callsign: String,
    pub remote_url: String,
}
