//! Quota accounting, eviction, and retention sweeps.
//!
//! The engine keeps an in-memory record index and a single `used_bytes`
//! counter. Records may point at blob files on disk; the engine owns their
//! removal so accounting and filesystem state move together.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use station_shared::constants::BYTES_PER_MB;
use station_shared::{BinaryPolicy, CollectionType, RetentionClass, StationStorageConfig};

use crate::error::StoreError;
use crate::records::{RecordKind, RecordMeta};
use crate::Result;

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_count: usize,
    pub freed_mb: u64,
}

struct EngineState {
    config: StationStorageConfig,
    records: HashMap<Uuid, RecordMeta>,
    used_bytes: u64,
}

/// Storage accounting engine. Single writer of `used_bytes`; all write
/// paths go through [`StorageEngine::account_for`].
pub struct StorageEngine {
    inner: Mutex<EngineState>,
}

impl StorageEngine {
    pub fn new(config: StationStorageConfig) -> Self {
        Self {
            inner: Mutex::new(EngineState {
                config,
                records: HashMap::new(),
                used_bytes: 0,
            }),
        }
    }

    /// Replace the storage configuration. Existing records are untouched;
    /// the new allocation applies from the next write.
    pub async fn update_config(&self, config: StationStorageConfig) {
        let mut state = self.inner.lock().await;
        state.config = config;
    }

    /// Account for a write of `bytes` into `collection`. Applies the binary
    /// policy, evicts under quota pressure where the policy allows it, and
    /// returns the id of the stored record.
    pub async fn account_for(
        &self,
        bytes: u64,
        collection: CollectionType,
        kind: RecordKind,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.account_inner(bytes, collection, kind, now, None).await
    }

    /// Like [`account_for`](Self::account_for), for records backed by a
    /// blob file the engine should unlink on eviction or deletion.
    pub async fn account_for_blob(
        &self,
        bytes: u64,
        collection: CollectionType,
        kind: RecordKind,
        now: DateTime<Utc>,
        blob_path: PathBuf,
    ) -> Result<Uuid> {
        self.account_inner(bytes, collection, kind, now, Some(blob_path))
            .await
    }

    async fn account_inner(
        &self,
        bytes: u64,
        collection: CollectionType,
        kind: RecordKind,
        now: DateTime<Utc>,
        blob_path: Option<PathBuf>,
    ) -> Result<Uuid> {
        if bytes == 0 {
            return Err(StoreError::EmptyPayload);
        }

        let mut state = self.inner.lock().await;
        let policy = state.config.binary_policy;

        // Apply the binary policy before any quota math. Rejected binaries
        // are never stored or counted.
        let (stored_kind, stored_bytes) = match kind {
            RecordKind::Binary => match policy {
                BinaryPolicy::TextOnly => return Err(StoreError::BinaryRejected),
                BinaryPolicy::ThumbnailsOnly => {
                    // The original is discarded after derivation; only the
                    // capped thumbnail is retained.
                    let cap = state.config.thumbnail_max_kb * 1024;
                    (RecordKind::Thumbnail, bytes.min(cap.max(1)))
                }
                BinaryPolicy::OnDemand | BinaryPolicy::FullCache => (RecordKind::Binary, bytes),
            },
            other => (other, bytes),
        };

        let allocated_bytes = state.config.allocated_mb * BYTES_PER_MB;
        if state.used_bytes + stored_bytes > allocated_bytes {
            let evicts = matches!(
                policy,
                BinaryPolicy::ThumbnailsOnly | BinaryPolicy::OnDemand
            );
            if evicts {
                Self::evict_until_fits(&mut state, stored_bytes, allocated_bytes).await;
            }
            if state.used_bytes + stored_bytes > allocated_bytes {
                return Err(StoreError::QuotaExceeded {
                    needed_mb: (state.used_bytes + stored_bytes).div_ceil(BYTES_PER_MB),
                    allocated_mb: state.config.allocated_mb,
                });
            }
        }

        let id = Uuid::new_v4();
        state.records.insert(
            id,
            RecordMeta {
                id,
                collection,
                kind: stored_kind,
                size_bytes: stored_bytes,
                created_at: now,
                last_access: now,
                blob_path,
            },
        );
        state.used_bytes += stored_bytes;

        debug!(
            id = %id,
            collection = %collection,
            bytes = stored_bytes,
            used_mb = state.used_bytes / BYTES_PER_MB,
            "Accounted record"
        );
        Ok(id)
    }

    /// Evict least-recently-accessed evictable records until `incoming`
    /// bytes fit within `allocated`, or nothing evictable remains.
    async fn evict_until_fits(state: &mut EngineState, incoming: u64, allocated: u64) {
        let mut candidates: Vec<(Uuid, DateTime<Utc>)> = state
            .records
            .values()
            .filter(|r| r.kind.evictable())
            .map(|r| (r.id, r.last_access))
            .collect();
        candidates.sort_by_key(|(_, last_access)| *last_access);

        for (id, _) in candidates {
            if state.used_bytes + incoming <= allocated {
                break;
            }
            if let Some(record) = state.records.remove(&id) {
                state.used_bytes = state.used_bytes.saturating_sub(record.size_bytes);
                if let Some(path) = &record.blob_path {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!(id = %id, path = %path.display(), error = %e, "Failed to unlink evicted blob");
                    }
                }
                debug!(id = %id, bytes = record.size_bytes, "Evicted record");
            }
        }
    }

    /// Mark a record as accessed, refreshing its LRU position.
    pub async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.inner.lock().await;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.last_access = now;
        Ok(())
    }

    /// Release a record and its accounted bytes (explicit deletion).
    pub async fn release(&self, id: Uuid) -> Result<()> {
        let mut state = self.inner.lock().await;
        let record = state.records.remove(&id).ok_or(StoreError::NotFound)?;
        state.used_bytes = state.used_bytes.saturating_sub(record.size_bytes);
        if let Some(path) = &record.blob_path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(id = %id, path = %path.display(), error = %e, "Failed to unlink released blob");
            }
        }
        Ok(())
    }

    /// Delete every record whose age exceeds the retention applicable to
    /// its collection. Retention 0 exempts the class entirely; the exact
    /// boundary is exclusive (a record aged exactly `d` days survives).
    ///
    /// Idempotent, and per-record failures never abort the batch: a record
    /// whose blob cannot be unlinked is logged, skipped, and retried on the
    /// next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut state = self.inner.lock().await;

        let expired: Vec<Uuid> = state
            .records
            .values()
            .filter(|record| {
                let days = match record.collection.retention_class() {
                    RetentionClass::Forum => state.config.retention_days,
                    RetentionClass::Chat => state.config.chat_retention_days,
                    RetentionClass::Exempt => 0,
                };
                days > 0 && record.age_days(now) > i64::from(days)
            })
            .map(|record| record.id)
            .collect();

        let mut report = SweepReport::default();
        let mut freed_bytes = 0u64;
        for id in expired {
            let Some(record) = state.records.get(&id) else {
                continue;
            };
            if let Some(path) = record.blob_path.clone() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(id = %id, path = %path.display(), error = %e, "Sweep could not unlink blob, skipping record");
                        continue;
                    }
                }
            }
            if let Some(record) = state.records.remove(&id) {
                state.used_bytes = state.used_bytes.saturating_sub(record.size_bytes);
                freed_bytes += record.size_bytes;
                report.deleted_count += 1;
            }
        }
        report.freed_mb = freed_bytes / BYTES_PER_MB;

        if report.deleted_count > 0 {
            info!(
                deleted = report.deleted_count,
                freed_mb = report.freed_mb,
                "Retention sweep complete"
            );
        }
        report
    }

    /// Megabytes currently accounted for.
    pub async fn used_mb(&self) -> u64 {
        self.inner.lock().await.used_bytes / BYTES_PER_MB
    }

    pub async fn used_bytes(&self) -> u64 {
        self.inner.lock().await.used_bytes
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.lock().await.records.contains_key(&id)
    }

    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Drop every record and its blob material. Used when a station is
    /// deleted.
    pub async fn wipe(&self) {
        let mut state = self.inner.lock().await;
        for record in state.records.values() {
            if let Some(path) = &record.blob_path {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "Failed to unlink blob during wipe");
                    }
                }
            }
        }
        let dropped = state.records.len();
        state.records.clear();
        state.used_bytes = 0;
        info!(records = dropped, "Storage wiped");
    }
}

/// Run [`StorageEngine::sweep_expired`] every `period` until aborted.
pub fn spawn_retention_sweeper(
    engine: Arc<StorageEngine>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            engine.sweep_expired(Utc::now()).await;
        }
    })
}
