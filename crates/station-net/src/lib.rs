//! # station-net
//!
//! Connectivity for a Geogram station: the channel manager that toggles
//! transports (internet HTTP(S), local-network hotspot, short-range and
//! low-power radio) and the certificate lifecycle manager that keeps the
//! internet channel's TLS identity issued and renewed.
//!
//! Channels are independent of each other; a failure enabling one never
//! affects another. The single coupling is HTTPS-requires-certificate:
//! the internet channel refuses to bind its TLS port without an issued,
//! unexpired certificate.

pub mod cert;
pub mod hotspot;
pub mod internet;
pub mod manager;
pub mod radio;
pub mod reachability;

mod error;

pub use cert::{
    spawn_renewal_task, CertPhase, CertificateAuthority, CertificateManager, CertificateState,
    HttpAuthority, IssuedCertificate, SelfSignedAuthority,
};
pub use error::{CertError, ChannelError};
pub use hotspot::{HotspotBackend, HotspotCredentials, SoftApBackend};
pub use internet::{InternetParams, LiveStats, StationInfo};
pub use manager::{ChannelInfo, ChannelManager, ChannelParams};
