use thiserror::Error;

/// Errors produced by the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write would exceed the station's storage allocation and nothing
    /// evictable remains. Recoverable by eviction or a larger allocation.
    #[error("Storage quota exceeded: {needed_mb} MB needed, {allocated_mb} MB allocated")]
    QuotaExceeded { needed_mb: u64, allocated_mb: u64 },

    /// Binary payload rejected by the `text_only` policy. Nothing was
    /// stored or counted.
    #[error("Binary payloads are rejected under the text-only policy")]
    BinaryRejected,

    /// A blossom upload exceeds the per-file ceiling.
    #[error("File too large for blossom storage: {size_mb} MB (max {max_mb} MB)")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    /// Blossom storage is at capacity.
    #[error("Blossom storage full: {used_mb} MB used of {max_mb} MB")]
    BlossomFull { used_mb: u64, max_mb: u64 },

    /// Empty payloads are never stored.
    #[error("Empty payload")]
    EmptyPayload,

    /// No record with the given id.
    #[error("Record not found")]
    NotFound,

    /// Filesystem error while reading or writing blob material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
