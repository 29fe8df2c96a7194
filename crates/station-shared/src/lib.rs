//! # station-shared
//!
//! Shared data model for the Geogram station subsystem: node identity and
//! callsigns, network policy, storage and channel configuration, and the
//! invariants that bind them.
//!
//! This crate is pure data plus validation. Anything that binds sockets,
//! touches disk, or talks to a certificate authority lives in the sibling
//! crates.

pub mod config;
pub mod constants;
pub mod identity;
pub mod types;

mod error;

pub use config::{
    BinaryPolicy, ChannelConfig, ChannelType, Coverage, NetworkPolicy, NetworkSettings,
    NodeRegistration, StationNodeConfig, StationStorageConfig, UserRegistration,
};
pub use error::ConfigError;
pub use identity::StationIdentity;
pub use types::{
    CollectionType, NodeId, NodeRole, RemoteStationReference, RetentionClass, StationStats,
};
