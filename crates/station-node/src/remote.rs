//! Registry of stations this device manages remotely.
//!
//! Only local references: adding or removing an entry never touches the
//! remote server itself.

use std::path::PathBuf;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use station_shared::{ConfigError, NodeId, RemoteStationReference};

use crate::error::NodeError;
use crate::Result;

pub struct RemoteStationRegistry {
    path: PathBuf,
    entries: Mutex<Vec<RemoteStationReference>>,
}

impl RemoteStationRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Load persisted references; a missing file is an empty registry.
    pub async fn load(&self) -> Result<()> {
        let entries = match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| NodeError::Persist(format!("remote registry corrupt: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        *self.entries.lock().await = entries;
        Ok(())
    }

    async fn save(&self, entries: &[RemoteStationReference]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json =
            serde_json::to_vec_pretty(entries).map_err(|e| NodeError::Persist(e.to_string()))?;
        // Write-then-rename so a crash mid-write never corrupts the registry.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Register a remote station. Performs no network I/O.
    pub async fn add(&self, url: &str, callsign: &str) -> Result<RemoteStationReference> {
        if url.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteUrl.into());
        }
        let reference = RemoteStationReference {
            id: NodeId::new(),
            name: callsign.to_string(),
            callsign: callsign.to_string(),
            remote_url: url.trim().to_string(),
        };

        let mut entries = self.entries.lock().await;
        entries.push(reference.clone());
        self.save(&entries).await?;
        info!(callsign = %reference.callsign, url = %reference.remote_url, "Remote station registered");
        Ok(reference)
    }

    /// Remove a reference by id. The remote server is unaffected.
    pub async fn remove(&self, id: NodeId) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|r| r.id != id);
        if entries.len() == before {
            return Err(NodeError::RemoteNotFound(id));
        }
        self.save(&entries).await?;
        info!(id = %id, "Remote station reference removed");
        Ok(())
    }

    pub async fn list(&self) -> Vec<RemoteStationReference> {
        self.entries.lock().await.clone()
    }
}
