/// Default HTTP port for the internet channel.
pub const DEFAULT_HTTP_PORT: u16 = 3456;

/// Default HTTPS port for the internet channel.
pub const DEFAULT_HTTPS_PORT: u16 = 3457;

/// Days before certificate expiry at which auto-renewal kicks in.
pub const CERT_RENEWAL_WINDOW_DAYS: i64 = 30;

/// Upper bound on a single certificate request round-trip.
pub const CERT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Initial backoff after a failed renewal attempt.
pub const CERT_BACKOFF_INITIAL_SECS: u64 = 60;

/// Backoff ceiling for repeated renewal failures (6 hours).
pub const CERT_BACKOFF_MAX_SECS: u64 = 6 * 60 * 60;

/// Upper bound on hotspot group setup / teardown.
pub const HOTSPOT_OP_TIMEOUT_SECS: u64 = 15;

/// Generated hotspot WPA passphrase length.
pub const HOTSPOT_PASSPHRASE_LEN: usize = 12;

/// Per-subscriber event buffer; a subscriber that stays full longer than
/// the publish timeout is dropped rather than losing intermediate states.
pub const EVENT_BUFFER_SIZE: usize = 128;

/// How long a publish will wait on a full subscriber before dropping it.
pub const EVENT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Callsign class prefix for operator (human) identities.
pub const OPERATOR_CALLSIGN_PREFIX: &str = "X1";

/// Callsign class prefix for station identities.
pub const STATION_CALLSIGN_PREFIX: &str = "X3";

/// Key derivation contexts for callsign derivation (BLAKE3).
pub const KDF_CONTEXT_OPERATOR_CALLSIGN: &str = "geogram-operator-callsign-v1";
pub const KDF_CONTEXT_STATION_CALLSIGN: &str = "geogram-station-callsign-v1";

/// Bytes per megabyte, the unit all quota accounting reports in.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
