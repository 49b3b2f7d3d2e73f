//! Volume identity and request types for Keel.
//!
//! This crate defines the schema layer shared by the store, driver and core
//! crates: string newtypes for volume and driver names, the `(name, driver)`
//! identity tuple `VolumeId` with its storage key encoding, creation requests
//! (`VolumeSpec`), and list predicates (`VolumeFilter`).

pub mod spec;
pub mod types;

pub use spec::{VolumeFilter, VolumeSpec};
pub use types::{validate_name, DriverName, VolumeId, VolumeName};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },
    #[error("malformed volume key: {0}")]
    MalformedKey(String),
}
