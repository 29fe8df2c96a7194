//! Local-network hotspot channel.
//!
//! The station advertises a Wi-Fi group whose name is derived from the
//! station's display name. Name correctness takes priority over avoiding a
//! reset: a group already up under a stale name is torn down and recreated.
//! The OS radio sits behind [`HotspotBackend`] so platforms (and tests)
//! plug in their own soft-AP implementation.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use station_shared::constants::{HOTSPOT_OP_TIMEOUT_SECS, HOTSPOT_PASSPHRASE_LEN};

use crate::error::ChannelError;

/// Longest SSID the radio will advertise.
const MAX_SSID_LEN: usize = 32;

/// Connection secret material handed to joining clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotspotCredentials {
    pub ssid: String,
    pub passphrase: String,
}

impl HotspotCredentials {
    /// The exact payload QR-scanning clients consume.
    pub fn qr_payload(&self) -> String {
        format!("WIFI:T:WPA;S:{};P:{};;", self.ssid, self.passphrase)
    }
}

/// Platform seam for the soft-AP radio. Calls may block; the channel wraps
/// them in `spawn_blocking` with a bounded timeout.
pub trait HotspotBackend: Send + Sync {
    fn start_group(&self, ssid: &str, passphrase: &str) -> std::io::Result<()>;
    fn stop_group(&self) -> std::io::Result<()>;
    /// SSID of the currently advertised group, if any.
    fn active_ssid(&self) -> Option<String>;
    fn client_count(&self) -> u32;
}

/// In-process soft-AP backend; the integration point real platforms
/// replace with wpa_supplicant / NetworkManager calls.
#[derive(Default)]
pub struct SoftApBackend {
    group: StdMutex<Option<String>>,
}

impl HotspotBackend for SoftApBackend {
    fn start_group(&self, ssid: &str, _passphrase: &str) -> std::io::Result<()> {
        let mut group = self.group.lock().expect("soft-ap lock poisoned");
        *group = Some(ssid.to_string());
        Ok(())
    }

    fn stop_group(&self) -> std::io::Result<()> {
        let mut group = self.group.lock().expect("soft-ap lock poisoned");
        *group = None;
        Ok(())
    }

    fn active_ssid(&self) -> Option<String> {
        self.group.lock().expect("soft-ap lock poisoned").clone()
    }

    fn client_count(&self) -> u32 {
        0
    }
}

/// Derive the advertised network name from the station's display name:
/// `GEO-` prefix, non-alphanumerics collapsed to single hyphens, clipped
/// to the SSID length limit.
pub fn derive_network_name(display_name: &str) -> String {
    let mut ssid = String::from("GEO-");
    let mut last_was_hyphen = false;
    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() {
            ssid.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen && !ssid.ends_with('-') {
            ssid.push('-');
            last_was_hyphen = true;
        }
    }
    let trimmed = ssid.trim_end_matches('-');
    trimmed.chars().take(MAX_SSID_LEN).collect()
}

fn generate_passphrase() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(HOTSPOT_PASSPHRASE_LEN)
        .map(char::from)
        .collect()
}

/// The hotspot channel: owns the backend and the advertised credentials.
pub struct HotspotChannel {
    backend: Arc<dyn HotspotBackend>,
    credentials: Mutex<Option<HotspotCredentials>>,
    op_timeout: Duration,
}

impl HotspotChannel {
    pub fn new(backend: Arc<dyn HotspotBackend>) -> Self {
        Self {
            backend,
            credentials: Mutex::new(None),
            op_timeout: Duration::from_secs(HOTSPOT_OP_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(backend: Arc<dyn HotspotBackend>, op_timeout: Duration) -> Self {
        Self {
            backend,
            credentials: Mutex::new(None),
            op_timeout,
        }
    }

    /// Bring the group up under a name derived from `station_name`.
    ///
    /// Re-enabling with an unchanged name is a no-op that still refreshes
    /// the reported client count. A group advertising a stale name is torn
    /// down and recreated.
    pub async fn enable(
        &self,
        station_name: &str,
    ) -> Result<(HotspotCredentials, u32), ChannelError> {
        let ssid = derive_network_name(station_name);
        let mut credentials = self.credentials.lock().await;

        if let Some(active) = self.backend.active_ssid() {
            if active == ssid {
                if let Some(existing) = credentials.as_ref() {
                    debug!(ssid = %ssid, "Hotspot already up, refreshing client count");
                    return Ok((existing.clone(), self.backend.client_count()));
                }
            } else {
                info!(stale = %active, wanted = %ssid, "Tearing down mismatched hotspot group");
                self.run_blocking({
                    let backend = self.backend.clone();
                    move || backend.stop_group()
                })
                .await?;
            }
        }

        let passphrase = generate_passphrase();
        self.run_blocking({
            let backend = self.backend.clone();
            let ssid = ssid.clone();
            let passphrase = passphrase.clone();
            move || backend.start_group(&ssid, &passphrase)
        })
        .await?;

        let creds = HotspotCredentials { ssid, passphrase };
        *credentials = Some(creds.clone());
        info!(ssid = %creds.ssid, "Hotspot enabled");
        Ok((creds, self.backend.client_count()))
    }

    /// Release the radio. Disabling an already-down group is a no-op.
    pub async fn disable(&self) -> Result<(), ChannelError> {
        let mut credentials = self.credentials.lock().await;
        if credentials.is_none() && self.backend.active_ssid().is_none() {
            debug!("Hotspot already disabled");
            return Ok(());
        }
        self.run_blocking({
            let backend = self.backend.clone();
            move || backend.stop_group()
        })
        .await?;
        *credentials = None;
        info!("Hotspot disabled");
        Ok(())
    }

    pub async fn is_enabled(&self) -> bool {
        self.credentials.lock().await.is_some()
    }

    pub fn client_count(&self) -> u32 {
        self.backend.client_count()
    }

    /// Run a backend call off the async runtime with the operation bound.
    async fn run_blocking<F>(&self, f: F) -> Result<(), ChannelError>
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        let result = tokio::time::timeout(self.op_timeout, tokio::task::spawn_blocking(f)).await;
        match result {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Hotspot backend call failed");
                Err(ChannelError::Radio(e.to_string()))
            }
            Ok(Err(join_err)) => Err(ChannelError::Radio(join_err.to_string())),
            Err(_) => Err(ChannelError::Timeout {
                secs: self.op_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_network_name() {
        assert_eq!(derive_network_name("Alpha"), "GEO-Alpha");
        assert_eq!(derive_network_name("Base Camp #3"), "GEO-Base-Camp-3");
        assert_eq!(derive_network_name("trailing!!"), "GEO-trailing");
    }

    #[test]
    fn test_network_name_clipped_to_ssid_limit() {
        let long = "a".repeat(64);
        assert_eq!(derive_network_name(&long).len(), MAX_SSID_LEN);
    }

    #[test]
    fn test_qr_payload_format() {
        let creds = HotspotCredentials {
            ssid: "GEO-Alpha".into(),
            passphrase: "s3cretpass12".into(),
        };
        assert_eq!(creds.qr_payload(), "WIFI:T:WPA;S:GEO-Alpha;P:s3cretpass12;;");
    }

    #[tokio::test]
    async fn test_enable_then_disable() {
        let backend = Arc::new(SoftApBackend::default());
        let channel = HotspotChannel::new(backend.clone());

        let (creds, _clients) = channel.enable("Alpha").await.unwrap();
        assert_eq!(creds.ssid, "GEO-Alpha");
        assert_eq!(backend.active_ssid().as_deref(), Some("GEO-Alpha"));
        assert_eq!(creds.passphrase.len(), HOTSPOT_PASSPHRASE_LEN);

        channel.disable().await.unwrap();
        assert!(backend.active_ssid().is_none());
        assert!(!channel.is_enabled().await);
    }

    #[tokio::test]
    async fn test_reenable_same_name_keeps_passphrase() {
        let channel = HotspotChannel::new(Arc::new(SoftApBackend::default()));
        let (first, _) = channel.enable("Alpha").await.unwrap();
        let (second, _) = channel.enable("Alpha").await.unwrap();
        assert_eq!(first.passphrase, second.passphrase);
    }

    #[tokio::test]
    async fn test_rename_recreates_group() {
        let backend = Arc::new(SoftApBackend::default());
        let channel = HotspotChannel::new(backend.clone());

        channel.enable("Alpha").await.unwrap();
        let (creds, _) = channel.enable("Beta").await.unwrap();

        assert_eq!(creds.ssid, "GEO-Beta");
        assert_eq!(backend.active_ssid().as_deref(), Some("GEO-Beta"));
    }

    #[tokio::test]
    async fn test_disable_when_down_is_noop() {
        let channel = HotspotChannel::new(Arc::new(SoftApBackend::default()));
        assert!(channel.disable().await.is_ok());
    }

    struct SlowBackend;

    impl HotspotBackend for SlowBackend {
        fn start_group(&self, _ssid: &str, _passphrase: &str) -> std::io::Result<()> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        }
        fn stop_group(&self) -> std::io::Result<()> {
            Ok(())
        }
        fn active_ssid(&self) -> Option<String> {
            None
        }
        fn client_count(&self) -> u32 {
            0
        }
    }

    #[tokio::test]
    async fn test_slow_radio_times_out() {
        let channel =
            HotspotChannel::with_timeout(Arc::new(SlowBackend), Duration::from_millis(20));
        let err = channel.enable("Alpha").await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }
}
