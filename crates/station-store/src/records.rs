use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a stored record holds, which determines its eviction class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Text content. Never evicted; only removed by retention or explicit
    /// deletion.
    Text,
    /// A lazily cached binary. First class evicted under quota pressure.
    Binary,
    /// A derived thumbnail retained in place of its original.
    Thumbnail,
}

impl RecordKind {
    /// Whether the engine may evict records of this kind to satisfy quota.
    pub fn evictable(&self) -> bool {
        matches!(self, RecordKind::Binary | RecordKind::Thumbnail)
    }
}

/// Accounting metadata for one stored record.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub id: Uuid,
    pub collection: station_shared::CollectionType,
    pub kind: RecordKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Updated on every read; drives LRU eviction order.
    pub last_access: DateTime<Utc>,
    /// On-disk payload, when the record is backed by a blob file.
    pub blob_path: Option<PathBuf>,
}

impl RecordMeta {
    /// Age of the record in whole days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use station_shared::CollectionType;

    fn record(created_days_ago: i64, now: DateTime<Utc>) -> RecordMeta {
        RecordMeta {
            id: Uuid::new_v4(),
            collection: CollectionType::Forum,
            kind: RecordKind::Text,
            size_bytes: 100,
            created_at: now - Duration::days(created_days_ago),
            last_access: now,
            blob_path: None,
        }
    }

    #[test]
    fn test_age_days() {
        let now = Utc::now();
        assert_eq!(record(0, now).age_days(now), 0);
        assert_eq!(record(7, now).age_days(now), 7);
        assert_eq!(record(400, now).age_days(now), 400);
    }

    #[test]
    fn test_eviction_classes() {
        assert!(!RecordKind::Text.evictable());
        assert!(RecordKind::Binary.evictable());
        assert!(RecordKind::Thumbnail.evictable());
    }
}
