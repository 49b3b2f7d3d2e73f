//! Durable volume metadata for Keel.
//!
//! This crate provides the storage layer: `MetadataStore`, a single-file
//! index of volume records written with atomic replace-and-fsync, guarded
//! for exclusive use by a `StoreLock`, with per-record blake3 checksums that
//! `verify_store_integrity` can audit.

pub mod integrity;
pub mod lock;
pub mod metadata;

pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use lock::StoreLock;
pub use metadata::{MetadataStore, VolumeRecord, METADATA_FORMAT_VERSION};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives power loss until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("volume record not found: {0}")]
    NotFound(String),
    #[error("integrity check failed for record '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("metadata format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("invalid record key: {0}")]
    InvalidKey(#[from] keel_schema::SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_not_found() {
        let e = StoreError::NotFound("fake1/test1".to_owned());
        assert!(e.to_string().contains("fake1/test1"));
    }

    #[test]
    fn store_error_display_lock_failed() {
        let e = StoreError::LockFailed("held elsewhere".to_owned());
        assert!(e.to_string().contains("held elsewhere"));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 2,
            found: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains('2'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            key: "k".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
