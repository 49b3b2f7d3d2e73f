use crate::DriverError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A storage backend that owns the physical side of volumes.
///
/// The core serializes calls per volume name, but distinct volumes may be
/// driven concurrently, so implementations must be thread-safe.
pub trait VolumeDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate storage for `name`, configured by the opaque `options`.
    fn create(&self, name: &str, options: &BTreeMap<String, String>) -> Result<(), DriverError>;

    fn remove(&self, name: &str) -> Result<(), DriverError>;

    /// Resolve the host path the volume is (or will be) mounted at.
    fn path(&self, name: &str) -> Result<PathBuf, DriverError>;

    /// Attach-time setup such as mounting. Called once per attach.
    fn attach(&self, name: &str, options: &BTreeMap<String, String>) -> Result<(), DriverError>;

    fn detach(&self, name: &str, options: &BTreeMap<String, String>) -> Result<(), DriverError>;

    /// Names of every volume the backend holds. Optional.
    fn list(&self) -> Result<Vec<String>, DriverError> {
        Err(DriverError::Unsupported {
            driver: self.name().to_owned(),
            op: "list",
        })
    }
}
