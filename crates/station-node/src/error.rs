use thiserror::Error;

use station_net::{CertError, ChannelError};
use station_shared::{ConfigError, NodeId};
use station_store::StoreError;

/// Errors surfaced by the station node service.
///
/// `AlreadyRunning` and `NotRunning` are idempotency guards, not failures
/// of the system. Bind and certificate failures are also recorded on the
/// node's `error_message` and surfaced through the event stream.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Certificate error: {0}")]
    Cert(#[from] CertError),

    #[error("Station is already running")]
    AlreadyRunning,

    #[error("Station is not running")]
    NotRunning,

    #[error("Start cancelled by a concurrent stop request")]
    StartCancelled,

    #[error("No station is configured on this device")]
    NoStation,

    #[error("A station already exists on this device")]
    StationExists,

    #[error("Remote stations run elsewhere and cannot be started locally")]
    RemoteStation,

    #[error("Remote station not found: {0}")]
    RemoteNotFound(NodeId),

    #[error("Persistence error: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
