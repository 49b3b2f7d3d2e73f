use crate::CoreError;
use keel_driver::VolumeDriver;
use keel_schema::VolumeId;
use keel_store::VolumeRecord;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A volume record bound to the driver that was registered for it when the
/// record was resolved. Lives for one request; never cached by the core.
#[derive(Clone)]
pub struct Volume {
    record: VolumeRecord,
    driver: Option<Arc<dyn VolumeDriver>>,
}

impl Volume {
    pub(crate) fn new(record: VolumeRecord, driver: Option<Arc<dyn VolumeDriver>>) -> Self {
        Self { record, driver }
    }

    pub fn id(&self) -> VolumeId {
        self.record.id()
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Name of the driver owning this volume, registered or not.
    pub fn driver(&self) -> &str {
        &self.record.driver
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.record.options
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.record.labels
    }

    pub fn created_at(&self) -> &str {
        &self.record.created_at
    }

    pub fn attach_count(&self) -> u32 {
        self.record.attach_count
    }

    pub fn is_attached(&self) -> bool {
        self.record.attach_count > 0
    }

    pub fn record(&self) -> &VolumeRecord {
        &self.record
    }

    pub fn into_record(self) -> VolumeRecord {
        self.record
    }

    /// Mount path as resolved by the bound driver.
    pub fn path(&self) -> Result<PathBuf, CoreError> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| CoreError::DriverNotFound(self.record.driver.to_string()))?;
        driver
            .path(&self.record.name)
            .map_err(|e| CoreError::from_driver(&self.record.driver, e))
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("record", &self.record)
            .field("driver_bound", &self.driver.is_some())
            .finish()
    }
}
