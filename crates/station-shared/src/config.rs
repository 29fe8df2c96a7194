//! Station and network configuration model.
//!
//! All types here are plain serde data; `validate` methods enforce the
//! invariants the station service checks before persisting anything.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HTTP_PORT, DEFAULT_HTTPS_PORT};
use crate::error::ConfigError;
use crate::types::{CollectionType, NodeRole};

/// How binary payloads (images, files) are cached on the station.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BinaryPolicy {
    /// Binary payloads are rejected outright; only text is stored.
    TextOnly,
    /// Only derived thumbnails are retained; originals are discarded.
    ThumbnailsOnly,
    /// Binaries are cached lazily and evicted first (LRU) under quota
    /// pressure.
    OnDemand,
    /// Everything is kept; writes fail once the allocation is exhausted.
    FullCache,
}

/// Storage allocation and retention policy for a station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationStorageConfig {
    pub allocated_mb: u64,
    pub binary_policy: BinaryPolicy,
    pub thumbnail_max_kb: u64,
    /// Days before forum/report records expire. 0 = keep forever.
    pub retention_days: u32,
    /// Days before chat records expire. 0 = keep forever.
    pub chat_retention_days: u32,
    pub nostr_require_auth_for_writes: bool,
    pub blossom_max_storage_mb: u64,
    pub blossom_max_file_mb: u64,
}

impl Default for StationStorageConfig {
    fn default() -> Self {
        Self {
            allocated_mb: 1024,
            binary_policy: BinaryPolicy::OnDemand,
            thumbnail_max_kb: 256,
            retention_days: 0,
            chat_retention_days: 30,
            nostr_require_auth_for_writes: true,
            blossom_max_storage_mb: 512,
            blossom_max_file_mb: 64,
        }
    }
}

impl StationStorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blossom_max_file_mb > self.blossom_max_storage_mb {
            return Err(ConfigError::BlossomFileExceedsStorage {
                file_mb: self.blossom_max_file_mb,
                storage_mb: self.blossom_max_storage_mb,
            });
        }
        Ok(())
    }
}

/// Who may join the network, and how.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeRegistration {
    Open,
    Approval,
    Invite,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRegistration {
    Open,
    Approval,
}

/// Network-wide policy set by the root station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPolicy {
    pub node_registration: NodeRegistration,
    pub user_registration: UserRegistration,
    pub enable_community_flagging: bool,
    /// Number of flags at which content is hidden. Must be positive while
    /// flagging is enabled.
    pub flag_threshold_hide: u32,
    pub allow_federation: bool,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            node_registration: NodeRegistration::Approval,
            user_registration: UserRegistration::Open,
            enable_community_flagging: true,
            flag_threshold_hide: 3,
            allow_federation: false,
        }
    }
}

impl NetworkPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_community_flagging && self.flag_threshold_hide == 0 {
            return Err(ConfigError::FlagThresholdNotPositive);
        }
        Ok(())
    }
}

/// The transports through which a station can be reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Internet,
    LocalNetwork,
    ShortRangeRadio,
    LowPowerRadio,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelType::Internet => "internet",
            ChannelType::LocalNetwork => "local_network",
            ChannelType::ShortRangeRadio => "short_range_radio",
            ChannelType::LowPowerRadio => "low_power_radio",
        };
        write!(f, "{name}")
    }
}

/// Enablement flag for a single transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel_type: ChannelType,
    pub enabled: bool,
}

/// Optional geographic service area: center plus radius.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coverage {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl Coverage {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::LongitudeOutOfRange(self.longitude));
        }
        if self.radius_km <= 0.0 {
            return Err(ConfigError::CoverageRadiusNotPositive(self.radius_km));
        }
        Ok(())
    }
}

/// Full configuration of a station node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationNodeConfig {
    pub storage: StationStorageConfig,
    pub accept_connections: bool,
    pub max_connections: u32,
    pub supported_apps: Vec<CollectionType>,
    pub coverage: Option<Coverage>,
    pub channels: Vec<ChannelConfig>,
}

impl Default for StationNodeConfig {
    fn default() -> Self {
        Self {
            storage: StationStorageConfig::default(),
            accept_connections: true,
            max_connections: 32,
            supported_apps: vec![CollectionType::Chat, CollectionType::Forum],
            coverage: None,
            channels: vec![
                ChannelConfig {
                    channel_type: ChannelType::Internet,
                    enabled: true,
                },
                ChannelConfig {
                    channel_type: ChannelType::LocalNetwork,
                    enabled: false,
                },
            ],
        }
    }
}

impl StationNodeConfig {
    /// Validate the whole config for a node of the given role. Runs before
    /// persistence; a failing config is never applied, even partially.
    pub fn validate(&self, role: NodeRole) -> Result<(), ConfigError> {
        if role == NodeRole::Root && self.supported_apps.is_empty() {
            return Err(ConfigError::NoSupportedApps);
        }
        if self.accept_connections && !self.channels.iter().any(|c| c.enabled) {
            return Err(ConfigError::NoEnabledChannel);
        }
        self.storage.validate()?;
        if let Some(coverage) = &self.coverage {
            coverage.validate()?;
        }
        Ok(())
    }

    /// The channel types currently enabled, in declaration order.
    pub fn enabled_channels(&self) -> Vec<ChannelType> {
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.channel_type)
            .collect()
    }
}

/// Network-level settings, persisted independently of the general config
/// so they can change while the station is stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkSettings {
    pub http_port: u16,
    pub https_port: u16,
    pub enable_ssl: bool,
    pub ssl_domain: Option<String>,
    pub ssl_email: Option<String>,
    pub ssl_auto_renew: bool,
    pub max_connected_devices: u32,
    pub nostr_require_auth_for_writes: bool,
    pub blossom_max_storage_mb: u64,
    pub blossom_max_file_mb: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            enable_ssl: false,
            ssl_domain: None,
            ssl_email: None,
            ssl_auto_renew: true,
            max_connected_devices: 32,
            nostr_require_auth_for_writes: true,
            blossom_max_storage_mb: 512,
            blossom_max_file_mb: 64,
        }
    }
}

impl NetworkSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blossom_max_file_mb > self.blossom_max_storage_mb {
            return Err(ConfigError::BlossomFileExceedsStorage {
                file_mb: self.blossom_max_file_mb,
                storage_mb: self.blossom_max_storage_mb,
            });
        }
        Ok(())
    }
}
