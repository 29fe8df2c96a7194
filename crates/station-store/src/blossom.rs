//! Blossom-style binary object store.
//!
//! A capacity-bounded blob store with a per-file size ceiling, independent
//! of the retention engine: blossom blobs are only removed explicitly or by
//! quota eviction, never by retention sweeps. Quota accounting is delegated
//! to the [`StorageEngine`] so global usage stays consistent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use station_shared::constants::BYTES_PER_MB;
use station_shared::CollectionType;

use crate::engine::StorageEngine;
use crate::error::StoreError;
use crate::records::RecordKind;
use crate::Result;

struct BlossomEntry {
    record_id: Uuid,
    size_bytes: u64,
}

/// Disk-backed blob store bounded by the blossom storage settings.
pub struct BlossomStore {
    base_path: PathBuf,
    max_storage_bytes: u64,
    max_file_bytes: u64,
    engine: Arc<StorageEngine>,
    entries: Mutex<HashMap<Uuid, BlossomEntry>>,
}

impl BlossomStore {
    pub async fn new(
        base_path: PathBuf,
        max_storage_mb: u64,
        max_file_mb: u64,
        engine: Arc<StorageEngine>,
    ) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), max_storage_mb, max_file_mb, "Blossom store initialized");
        Ok(Self {
            base_path,
            max_storage_bytes: max_storage_mb * BYTES_PER_MB,
            max_file_bytes: max_file_mb * BYTES_PER_MB,
            engine,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Store a blob, enforcing the per-file ceiling and blossom capacity
    /// before delegating global accounting to the engine.
    pub async fn store(&self, data: &[u8]) -> Result<Uuid> {
        if data.is_empty() {
            return Err(StoreError::EmptyPayload);
        }
        let size = data.len() as u64;
        if size > self.max_file_bytes {
            return Err(StoreError::FileTooLarge {
                size_mb: size.div_ceil(BYTES_PER_MB),
                max_mb: self.max_file_bytes / BYTES_PER_MB,
            });
        }

        let mut entries = self.entries.lock().await;
        let used: u64 = entries.values().map(|e| e.size_bytes).sum();
        if used + size > self.max_storage_bytes {
            return Err(StoreError::BlossomFull {
                used_mb: used / BYTES_PER_MB,
                max_mb: self.max_storage_bytes / BYTES_PER_MB,
            });
        }

        let id = Uuid::new_v4();
        let path = self.blob_path(&id);
        fs::write(&path, data).await?;

        let record_id = match self
            .engine
            .account_for_blob(size, CollectionType::Files, RecordKind::Binary, Utc::now(), path.clone())
            .await
        {
            Ok(record_id) => record_id,
            Err(e) => {
                // Global quota said no; don't leave the file behind.
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };

        entries.insert(id, BlossomEntry { record_id, size_bytes: size });
        debug!(id = %id, size, "Stored blossom blob");
        Ok(id)
    }

    /// Fetch a blob by id, refreshing its LRU recency. A blob evicted from
    /// under us by the engine is pruned and reported as not found.
    pub async fn get(&self, id: Uuid) -> Result<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(&id).ok_or(StoreError::NotFound)?;

        match fs::read(self.blob_path(&id)).await {
            Ok(data) => {
                let _ = self.engine.touch(entry.record_id, Utc::now()).await;
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                entries.remove(&id);
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob and release its accounting.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(&id).ok_or(StoreError::NotFound)?;
        // Engine release unlinks the blob file as well.
        self.engine.release(entry.record_id).await?;
        debug!(id = %id, "Deleted blossom blob");
        Ok(())
    }

    pub async fn used_mb(&self) -> u64 {
        let entries = self.entries.lock().await;
        entries.values().map(|e| e.size_bytes).sum::<u64>() / BYTES_PER_MB
    }

    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}
