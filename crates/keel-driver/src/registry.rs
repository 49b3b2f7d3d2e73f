use crate::driver::VolumeDriver;
use crate::DriverError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Name → driver table consulted by the core on every storage operation.
///
/// One registry is shared per process; it is passed to the core at
/// construction rather than living in a global so tests can build their own.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn VolumeDriver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `driver` under its own name, replacing any previous entry.
    pub fn register(&self, driver: Arc<dyn VolumeDriver>) {
        let name = driver.name().to_owned();
        // The map holds no invariant a panicking writer could break.
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        if drivers.insert(name.clone(), driver).is_some() {
            debug!("replaced volume driver '{name}'");
        } else {
            debug!("registered volume driver '{name}'");
        }
    }

    /// Remove the driver registered as `name`. Returns whether one was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        let removed = drivers.remove(name).is_some();
        if removed {
            debug!("unregistered volume driver '{name}'");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn VolumeDriver>, DriverError> {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::NotRegistered(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        drivers.contains_key(name)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = drivers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDriver;
    use std::thread;

    #[test]
    fn register_and_get() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(FakeDriver::new("fake1")));
        assert_eq!(registry.get("fake1").unwrap().name(), "fake1");
        assert!(registry.contains("fake1"));
    }

    #[test]
    fn get_unknown_is_not_registered() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            registry.get("none"),
            Err(DriverError::NotRegistered(name)) if name == "none"
        ));
    }

    #[test]
    fn register_replaces_existing() {
        let registry = DriverRegistry::new();
        let first = Arc::new(FakeDriver::new("fake1"));
        let second = Arc::new(FakeDriver::with_root("fake1", "/mnt/second"));
        registry.register(first);
        registry.register(second);

        assert_eq!(registry.names(), vec!["fake1"]);
        let path = registry.get("fake1").unwrap().path("v").unwrap();
        assert!(path.starts_with("/mnt/second"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(FakeDriver::new("fake1")));
        assert!(registry.unregister("fake1"));
        assert!(!registry.unregister("fake1"));
        assert!(!registry.contains("fake1"));
    }

    #[test]
    fn names_are_sorted() {
        let registry = DriverRegistry::new();
        for name in ["nfs", "local", "ebs"] {
            registry.register(Arc::new(FakeDriver::new(name)));
        }
        assert_eq!(registry.names(), vec!["ebs", "local", "nfs"]);
    }

    #[test]
    fn concurrent_register_and_lookup() {
        let registry = Arc::new(DriverRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let name = format!("drv{i}");
                    registry.register(Arc::new(FakeDriver::new(&name)));
                    for _ in 0..100 {
                        assert!(registry.get(&name).is_ok());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.names().len(), 8);
    }
}
