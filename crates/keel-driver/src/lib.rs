//! Volume drivers for Keel.
//!
//! This crate defines the `VolumeDriver` trait every storage backend
//! implements, the thread-safe `DriverRegistry` the core resolves drivers
//! through, and `FakeDriver`, an in-memory backend with fault injection used
//! by tests and benchmarks.

pub mod driver;
pub mod fake;
pub mod registry;

pub use driver::VolumeDriver;
pub use fake::{FakeDriver, FakeOp};
pub use registry::DriverRegistry;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("volume driver '{0}' is not registered")]
    NotRegistered(String),
    #[error("volume '{0}' does not exist in driver")]
    VolumeMissing(String),
    #[error("operation not supported by {driver} driver: {op}")]
    Unsupported { driver: String, op: &'static str },
    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("driver operation failed: {0}")]
    Failed(String),
}
