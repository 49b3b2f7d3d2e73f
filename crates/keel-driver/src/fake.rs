use crate::driver::VolumeDriver;
use crate::DriverError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Driver calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Create,
    Remove,
    Path,
    Attach,
    Detach,
}

#[derive(Debug, Clone, Default)]
struct FakeVolume {
    options: BTreeMap<String, String>,
    attached: u32,
}

/// In-memory volume driver.
///
/// Tracks which volumes exist and how deeply each is attached, resolves
/// paths under a virtual root without touching the filesystem, and can be
/// told to fail the next call of a given kind.
pub struct FakeDriver {
    name: String,
    root: PathBuf,
    volumes: Mutex<HashMap<String, FakeVolume>>,
    fail_next: Mutex<HashSet<FakeOp>>,
}

impl FakeDriver {
    pub fn new(name: &str) -> Self {
        Self::with_root(name, Path::new("/var/lib/keel/fake").join(name))
    }

    pub fn with_root(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_owned(),
            root: root.into(),
            volumes: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next `op` call fail with `DriverError::Failed`.
    pub fn fail_next(&self, op: FakeOp) {
        if let Ok(mut ops) = self.fail_next.lock() {
            ops.insert(op);
        }
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes
            .lock()
            .map(|v| v.contains_key(name))
            .unwrap_or(false)
    }

    /// Current attach depth of `name`, `None` if the volume does not exist.
    pub fn attach_depth(&self, name: &str) -> Option<u32> {
        self.volumes
            .lock()
            .ok()
            .and_then(|v| v.get(name).map(|vol| vol.attached))
    }

    /// Options the volume was created with.
    pub fn options_of(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.volumes
            .lock()
            .ok()
            .and_then(|v| v.get(name).map(|vol| vol.options.clone()))
    }

    fn state(&self) -> Result<MutexGuard<'_, HashMap<String, FakeVolume>>, DriverError> {
        self.volumes
            .lock()
            .map_err(|e| DriverError::Failed(format!("mutex poisoned: {e}")))
    }

    fn check_fault(&self, op: FakeOp, name: &str) -> Result<(), DriverError> {
        let mut ops = self
            .fail_next
            .lock()
            .map_err(|e| DriverError::Failed(format!("mutex poisoned: {e}")))?;
        if ops.remove(&op) {
            return Err(DriverError::Failed(format!(
                "injected {op:?} failure for '{name}'"
            )));
        }
        Ok(())
    }
}

impl VolumeDriver for FakeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, name: &str, options: &BTreeMap<String, String>) -> Result<(), DriverError> {
        self.check_fault(FakeOp::Create, name)?;
        let mut state = self.state()?;
        state.entry(name.to_owned()).or_insert_with(|| FakeVolume {
            options: options.clone(),
            attached: 0,
        });
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), DriverError> {
        self.check_fault(FakeOp::Remove, name)?;
        self.state()?.remove(name);
        Ok(())
    }

    fn path(&self, name: &str) -> Result<PathBuf, DriverError> {
        self.check_fault(FakeOp::Path, name)?;
        Ok(self.root.join(name))
    }

    fn attach(&self, name: &str, _options: &BTreeMap<String, String>) -> Result<(), DriverError> {
        self.check_fault(FakeOp::Attach, name)?;
        let mut state = self.state()?;
        let vol = state
            .get_mut(name)
            .ok_or_else(|| DriverError::VolumeMissing(name.to_owned()))?;
        vol.attached += 1;
        Ok(())
    }

    fn detach(&self, name: &str, _options: &BTreeMap<String, String>) -> Result<(), DriverError> {
        self.check_fault(FakeOp::Detach, name)?;
        let mut state = self.state()?;
        let vol = state
            .get_mut(name)
            .ok_or_else(|| DriverError::VolumeMissing(name.to_owned()))?;
        vol.attached = vol.attached.saturating_sub(1);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, DriverError> {
        let mut names: Vec<String> = self.state()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> BTreeMap<String, String> {
        BTreeMap::from([("size".to_owned(), "1G".to_owned())])
    }

    #[test]
    fn fake_lifecycle() {
        let driver = FakeDriver::new("fake1");
        driver.create("v1", &opts()).unwrap();
        assert!(driver.has_volume("v1"));
        assert_eq!(driver.options_of("v1"), Some(opts()));

        driver.attach("v1", &BTreeMap::new()).unwrap();
        driver.attach("v1", &BTreeMap::new()).unwrap();
        assert_eq!(driver.attach_depth("v1"), Some(2));
        driver.detach("v1", &BTreeMap::new()).unwrap();
        assert_eq!(driver.attach_depth("v1"), Some(1));

        driver.remove("v1").unwrap();
        assert!(!driver.has_volume("v1"));
        assert_eq!(driver.attach_depth("v1"), None);
    }

    #[test]
    fn path_is_under_root() {
        let driver = FakeDriver::with_root("fake1", "/mnt/vols");
        assert_eq!(driver.path("data").unwrap(), PathBuf::from("/mnt/vols/data"));
    }

    #[test]
    fn attach_missing_volume_fails() {
        let driver = FakeDriver::new("fake1");
        assert!(matches!(
            driver.attach("ghost", &BTreeMap::new()),
            Err(DriverError::VolumeMissing(_))
        ));
    }

    #[test]
    fn injected_fault_fires_once() {
        let driver = FakeDriver::new("fake1");
        driver.fail_next(FakeOp::Create);
        assert!(driver.create("v1", &opts()).is_err());
        assert!(!driver.has_volume("v1"));
        driver.create("v1", &opts()).unwrap();
        assert!(driver.has_volume("v1"));
    }

    #[test]
    fn list_is_sorted() {
        let driver = FakeDriver::new("fake1");
        for name in ["c", "a", "b"] {
            driver.create(name, &BTreeMap::new()).unwrap();
        }
        assert_eq!(driver.list().unwrap(), vec!["a", "b", "c"]);
    }
}
