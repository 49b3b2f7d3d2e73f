use crate::concurrency::IdentityLocks;
use crate::config::CoreConfig;
use crate::volume::Volume;
use crate::CoreError;
use keel_driver::{DriverRegistry, VolumeDriver};
use keel_schema::{VolumeFilter, VolumeId, VolumeSpec};
use keel_store::{verify_store_integrity, IntegrityReport, MetadataStore, StoreError, VolumeRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Central orchestrator for volume lifecycle.
///
/// Every call re-resolves the volume from the metadata store and its driver
/// from the registry. Mutating calls hold the identity's lock for the whole
/// check, driver call and persist sequence, so two callers can never
/// interleave on one volume, while different volumes proceed in parallel.
pub struct Core {
    config: CoreConfig,
    store: MetadataStore,
    registry: Arc<DriverRegistry>,
    locks: IdentityLocks,
}

impl Core {
    /// Open the metadata store named by `config` and bind the registry.
    ///
    /// Fails immediately if the metadata path is missing, unwritable, or
    /// already open in another process.
    pub fn new(config: CoreConfig, registry: Arc<DriverRegistry>) -> Result<Self, CoreError> {
        config.validate()?;
        let store = MetadataStore::open(&config.volume_meta_path)?;
        info!(
            "volume core ready, metadata at {}",
            config.volume_meta_path.display()
        );
        Ok(Self {
            config,
            store,
            registry,
            locks: IdentityLocks::new(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    fn resolve_driver(&self, name: &str) -> Result<Arc<dyn VolumeDriver>, CoreError> {
        self.registry
            .get(name)
            .map_err(|e| CoreError::from_driver(name, e))
    }

    fn load_record(&self, id: &VolumeId) -> Result<VolumeRecord, CoreError> {
        match self.store.get(id) {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Err(CoreError::VolumeNotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the volume, or return it unchanged if it already exists.
    ///
    /// An existing volume keeps its original options and labels even when
    /// `spec` differs. The record is written only after the driver has
    /// allocated the storage.
    pub fn create_volume(&self, id: &VolumeId, spec: &VolumeSpec) -> Result<Volume, CoreError> {
        id.validate()?;
        let driver = self.resolve_driver(&id.driver)?;
        let _guard = self.locks.lock(id)?;

        match self.store.get(id) {
            Ok(existing) => {
                if existing.options != spec.options || existing.labels != spec.labels {
                    debug!("volume {id} exists; ignoring differing create spec");
                } else {
                    debug!("volume {id} exists; create is a no-op");
                }
                return Ok(Volume::new(existing, Some(driver)));
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        driver
            .create(&id.name, &spec.options)
            .map_err(|e| CoreError::from_driver(&id.driver, e))?;

        if let Err(e) = self.store.put(&VolumeRecord::new(id, spec)) {
            warn!("volume {id} allocated by driver but metadata write failed: {e}");
            return Err(e.into());
        }
        info!("created volume {id}");

        let record = self.load_record(id)?;
        Ok(Volume::new(record, Some(driver)))
    }

    /// Stored volume, bound to its driver if one is registered. A missing
    /// driver does not fail the lookup.
    pub fn get_volume(&self, id: &VolumeId) -> Result<Volume, CoreError> {
        id.validate()?;
        let record = self.load_record(id)?;
        let driver = self.registry.get(&id.driver).ok();
        Ok(Volume::new(record, driver))
    }

    /// Every volume matching `filter` (all of them for `None`).
    pub fn list_volumes(&self, filter: Option<&VolumeFilter>) -> Result<Vec<Volume>, CoreError> {
        let records = self.store.list(filter)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let driver = self.registry.get(&record.driver).ok();
                Volume::new(record, driver)
            })
            .collect())
    }

    /// Names of the volumes matching `filter`, without loading their records.
    pub fn list_volume_names(
        &self,
        filter: Option<&VolumeFilter>,
    ) -> Result<Vec<String>, CoreError> {
        Ok(self
            .store
            .list_keys(filter)?
            .into_iter()
            .map(|id| id.name.into_inner())
            .collect())
    }

    /// Destroy the volume's storage, then forget its record.
    ///
    /// If the driver fails, the record stays so the storage is never lost
    /// track of.
    pub fn remove_volume(&self, id: &VolumeId) -> Result<(), CoreError> {
        id.validate()?;
        let _guard = self.locks.lock(id)?;

        let record = self.load_record(id)?;
        if record.attach_count > 0 {
            return Err(CoreError::VolumeInUse {
                id: id.clone(),
                attach_count: record.attach_count,
            });
        }
        let driver = self.resolve_driver(&id.driver)?;

        driver
            .remove(&id.name)
            .map_err(|e| CoreError::from_driver(&id.driver, e))?;
        self.store.delete(id)?;
        info!("removed volume {id}");
        Ok(())
    }

    pub fn volume_path(&self, id: &VolumeId) -> Result<PathBuf, CoreError> {
        id.validate()?;
        let record = self.load_record(id)?;
        let driver = self.resolve_driver(&id.driver)?;
        Volume::new(record, Some(driver)).path()
    }

    /// Let the driver set the volume up for a consumer and count the
    /// attachment. A driver failure leaves the count untouched.
    pub fn attach_volume(
        &self,
        id: &VolumeId,
        options: &BTreeMap<String, String>,
    ) -> Result<Volume, CoreError> {
        id.validate()?;
        let _guard = self.locks.lock(id)?;

        self.load_record(id)?;
        let driver = self.resolve_driver(&id.driver)?;
        driver
            .attach(&id.name, options)
            .map_err(|e| CoreError::from_driver(&id.driver, e))?;

        let record = self
            .store
            .increment_attach(id)
            .inspect_err(|e| warn!("volume {id} attached by driver but count not saved: {e}"))?;
        info!("attached volume {id} (attach_count={})", record.attach_count);
        Ok(Volume::new(record, Some(driver)))
    }

    /// Tear down one attachment. Detaching a volume with no attachments is
    /// a no-op.
    pub fn detach_volume(
        &self,
        id: &VolumeId,
        options: &BTreeMap<String, String>,
    ) -> Result<Volume, CoreError> {
        id.validate()?;
        let _guard = self.locks.lock(id)?;

        let record = self.load_record(id)?;
        let driver = self.resolve_driver(&id.driver)?;
        if record.attach_count == 0 {
            debug!("volume {id} is not attached; detach is a no-op");
            return Ok(Volume::new(record, Some(driver)));
        }

        driver
            .detach(&id.name, options)
            .map_err(|e| CoreError::from_driver(&id.driver, e))?;

        let record = self
            .store
            .decrement_attach(id)
            .inspect_err(|e| warn!("volume {id} detached by driver but count not saved: {e}"))?;
        info!("detached volume {id} (attach_count={})", record.attach_count);
        Ok(Volume::new(record, Some(driver)))
    }

    /// Audit every stored record's checksum.
    pub fn verify_metadata(&self) -> Result<IntegrityReport, CoreError> {
        Ok(verify_store_integrity(&self.store)?)
    }

    /// Release the metadata store. Dropping the core does the same silently.
    pub fn close(self) -> Result<(), CoreError> {
        info!("closing volume core");
        self.store.close()?;
        Ok(())
    }
}
