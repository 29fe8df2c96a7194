use thiserror::Error;

use station_shared::ChannelType;

/// Transport-specific failures, isolated to the channel that produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel could not bind its listening socket.
    #[error("Port {port} already in use")]
    PortInUse { port: u16 },

    /// HTTPS was requested without an issued, unexpired certificate.
    #[error("Cannot enable HTTPS: no valid certificate issued (request one first)")]
    HttpsWithoutCertificate,

    /// The channel is not currently enabled.
    #[error("Channel {0} is not enabled")]
    NotEnabled(ChannelType),

    /// The radio hardware refused or failed the operation.
    #[error("Radio error: {0}")]
    Radio(String),

    /// The operation exceeded its bound and should be retried.
    #[error("Channel operation timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Socket-level failure other than an occupied port.
    #[error("Bind error on port {port}: {message}")]
    Bind { port: u16, message: String },

    /// The issued certificate material could not be loaded into the TLS
    /// stack. The channel rolls back rather than serve plaintext on the
    /// HTTPS port.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Certificate lifecycle failures. Always recoverable: the manager retries
/// or reports, it never takes the station down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertError {
    /// Domain or email missing; no external authority was contacted.
    #[error("Missing certificate parameter: {0}")]
    MissingParameter(&'static str),

    /// The authority exchange failed (includes timeouts).
    #[error("Certificate request failed: {0}")]
    RequestFailed(String),

    /// The issued certificate is past its expiry.
    #[error("Certificate expired")]
    Expired,
}
