//! # station-node
//!
//! The station node aggregate: lifecycle control, state publication, and
//! the service facade the application layer talks to.
//!
//! All core behavior is reachable only through [`StationService`]:
//! `create_root_station`, `connect_remote_station`, `start`, `stop`,
//! `update_config`, `update_network_settings`, `delete_station`,
//! `remove_remote_station`, plus the read-only event stream from
//! [`EventBus`]. The facade holds explicit references to its storage
//! engine, channel manager, and certificate manager; nothing reaches for
//! a global service locator.

pub mod events;
pub mod lifecycle;
pub mod node;
pub mod remote;
pub mod service;
pub mod settings;

mod error;

pub use error::NodeError;
pub use events::{EventBus, EventReason, StationEvent};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use node::StationNode;
pub use service::{CreateRootStation, StationService};
pub use settings::SettingsStore;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NodeError>;
