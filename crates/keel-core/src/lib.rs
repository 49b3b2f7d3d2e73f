//! Volume lifecycle orchestration for Keel.
//!
//! This crate ties together identity validation, the durable metadata store,
//! and the driver registry into `Core`, the public API for creating,
//! resolving, listing, attaching, detaching and removing volumes. It also
//! provides the per-volume locking that keeps concurrent callers from
//! interleaving on one identity.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod volume;

pub use concurrency::{IdentityGuard, IdentityLocks};
pub use config::CoreConfig;
pub use engine::Core;
pub use volume::Volume;

use keel_driver::DriverError;
use keel_schema::VolumeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid volume id: {0}")]
    InvalidVolumeId(#[from] keel_schema::SchemaError),
    #[error("volume driver '{0}' is not registered")]
    DriverNotFound(String),
    #[error("volume not found: {0}")]
    VolumeNotFound(VolumeId),
    #[error("volume {id} is in use by {attach_count} attachment(s)")]
    VolumeInUse { id: VolumeId, attach_count: u32 },
    #[error("store error: {0}")]
    Store(#[from] keel_store::StoreError),
    #[error("driver '{driver}' failed: {source}")]
    Driver {
        driver: String,
        #[source]
        source: DriverError,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("volume lock poisoned: {0}")]
    Poisoned(String),
}

impl CoreError {
    /// Wrap an error returned by `driver`, keeping the driver's detail.
    pub(crate) fn from_driver(driver: &str, source: DriverError) -> Self {
        match source {
            DriverError::NotRegistered(name) => CoreError::DriverNotFound(name),
            source => CoreError::Driver {
                driver: driver.to_owned(),
                source,
            },
        }
    }
}
