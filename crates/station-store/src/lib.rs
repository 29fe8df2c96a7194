//! # station-store
//!
//! Storage accounting and retention for a Geogram station.
//!
//! The [`StorageEngine`] is the single writer of usage accounting: every
//! write path (collection records, certificate material, blossom blobs)
//! passes through [`StorageEngine::account_for`] so quota checks and
//! eviction stay consistent. The [`BlossomStore`] layers a capacity-bounded
//! binary object store on top of it.

pub mod blossom;
pub mod engine;
pub mod records;

mod error;

pub use blossom::BlossomStore;
pub use engine::{spawn_retention_sweeper, StorageEngine, SweepReport};
pub use error::StoreError;
pub use records::{RecordKind, RecordMeta};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
