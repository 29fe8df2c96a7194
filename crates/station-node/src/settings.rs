//! Persistence for network-level settings.
//!
//! Ports, SSL, and connection limits are persisted independently of the
//! general station config so they can be changed while the station is
//! stopped. Stored as JSON next to the station manifest; environment
//! variables override individual fields at load time in the usual way.

use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

use station_shared::NetworkSettings;

use crate::error::NodeError;
use crate::Result;

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load persisted settings, falling back to defaults when no file
    /// exists yet. Environment overrides are applied on top.
    pub async fn load(&self) -> Result<NetworkSettings> {
        let mut settings = match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| NodeError::Persist(format!("settings file corrupt: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NetworkSettings::default(),
            Err(e) => return Err(e.into()),
        };
        apply_env(&mut settings);
        Ok(settings)
    }

    /// Persist settings atomically (write-then-rename).
    pub async fn save(&self, settings: &NetworkSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|e| NodeError::Persist(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), "Network settings saved");
        Ok(())
    }
}

/// Apply `GEOGRAM_*` environment overrides. Unparsable values are warned
/// about and ignored.
fn apply_env(settings: &mut NetworkSettings) {
    if let Ok(val) = std::env::var("GEOGRAM_HTTP_PORT") {
        match val.parse() {
            Ok(port) => settings.http_port = port,
            Err(_) => warn!(value = %val, "Invalid GEOGRAM_HTTP_PORT, keeping persisted value"),
        }
    }
    if let Ok(val) = std::env::var("GEOGRAM_HTTPS_PORT") {
        match val.parse() {
            Ok(port) => settings.https_port = port,
            Err(_) => warn!(value = %val, "Invalid GEOGRAM_HTTPS_PORT, keeping persisted value"),
        }
    }
    if let Ok(val) = std::env::var("GEOGRAM_ENABLE_SSL") {
        settings.enable_ssl = val != "false" && val != "0";
    }
    if let Ok(domain) = std::env::var("GEOGRAM_SSL_DOMAIN") {
        if !domain.is_empty() {
            settings.ssl_domain = Some(domain);
        }
    }
    if let Ok(email) = std::env::var("GEOGRAM_SSL_EMAIL") {
        if !email.is_empty() {
            settings.ssl_email = Some(email);
        }
    }
}
