use thiserror::Error;

/// Validation failures for station and network configuration.
///
/// A `ConfigError` is always rejected before persistence; a config that
/// fails validation is never half-applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("A root station must support at least one collection type")]
    NoSupportedApps,

    #[error("At least one channel must be enabled while connections are accepted")]
    NoEnabledChannel,

    #[error("Blossom per-file limit ({file_mb} MB) exceeds total blossom storage ({storage_mb} MB)")]
    BlossomFileExceedsStorage { file_mb: u64, storage_mb: u64 },

    #[error("Flag threshold must be positive when community flagging is enabled")]
    FlagThresholdNotPositive,

    #[error("Coverage radius must be positive, got {0} km")]
    CoverageRadiusNotPositive(f64),

    #[error("Latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Station name must not be empty")]
    EmptyName,

    #[error("Remote station URL must not be empty")]
    EmptyRemoteUrl,
}
