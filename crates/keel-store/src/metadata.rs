use crate::lock::StoreLock;
use crate::{fsync_dir, StoreError};
use keel_schema::{DriverName, VolumeFilter, VolumeId, VolumeName, VolumeSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::Builder;
use tracing::{debug, warn};

/// Current metadata document format. Incremented on incompatible changes.
pub const METADATA_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeRecord {
    pub name: VolumeName,
    pub driver: DriverName,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub attach_count: u32,
    /// blake3 checksum for integrity verification. `None` until first `put`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl VolumeRecord {
    pub fn new(id: &VolumeId, spec: &VolumeSpec) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: id.name.clone(),
            driver: id.driver.clone(),
            options: spec.options.clone(),
            labels: spec.labels.clone(),
            created_at: now.clone(),
            updated_at: now,
            attach_count: 0,
            checksum: None,
        }
    }

    pub fn id(&self) -> VolumeId {
        VolumeId {
            name: self.name.clone(),
            driver: self.driver.clone(),
        }
    }

    /// Compute the checksum over the record content (excluding the checksum field itself).
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    fn seal(&mut self) -> Result<(), StoreError> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(())
    }

    /// Check the embedded checksum. A record without one never passes:
    /// every record the store writes is sealed.
    pub(crate) fn verify(&self, key: &str) -> Result<(), StoreError> {
        let actual = self.compute_checksum()?;
        match self.checksum {
            Some(ref expected) if *expected == actual => Ok(()),
            ref other => Err(StoreError::IntegrityFailure {
                key: key.to_owned(),
                expected: other.clone().unwrap_or_else(|| "<missing>".to_owned()),
                actual,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataDocument {
    format_version: u32,
    #[serde(default)]
    volumes: BTreeMap<String, VolumeRecord>,
}

#[derive(Serialize)]
struct MetadataDocumentRef<'a> {
    format_version: u32,
    volumes: &'a BTreeMap<String, VolumeRecord>,
}

/// Durable index of volume records kept in a single JSON document.
///
/// Every mutation rewrites the whole document to a temporary file, syncs it,
/// renames it over the target and syncs the directory, so after a crash the
/// file holds either the previous or the new document. Writers apply the
/// change to the in-memory mirror, write the document, and put the old
/// entry back if the write fails. They hold the mirror's write lock for the
/// whole sequence, so writers are serialized and readers never see an entry
/// that failed to persist.
///
/// If only the final directory sync fails, the renamed file may already
/// hold the new document while the mirror has been rolled back; the next
/// successful write or reopen settles which version is on disk.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    dir: PathBuf,
    volumes: RwLock<BTreeMap<String, VolumeRecord>>,
    lock: StoreLock,
}

impl MetadataStore {
    /// Open (or create) the metadata file at `path`, taking an exclusive
    /// lock on `<path>.lock` for the lifetime of the handle.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path: PathBuf = path.into();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let lock_path = lock_path_for(&path);
        let lock = StoreLock::try_acquire(&lock_path)?.ok_or_else(|| {
            StoreError::LockFailed(format!(
                "metadata file {} is already open elsewhere",
                path.display()
            ))
        })?;

        sweep_stale_temp_files(&path, &dir);

        let volumes = if path.exists() {
            load_document(&path)?
        } else {
            let empty = BTreeMap::new();
            write_document(&path, &dir, &empty)?;
            empty
        };
        debug!(
            "opened metadata store {} with {} records",
            path.display(),
            volumes.len()
        );

        Ok(Self {
            path,
            dir,
            volumes: RwLock::new(volumes),
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert a record under its identity. Uniqueness is the caller's concern.
    pub fn put(&self, record: &VolumeRecord) -> Result<(), StoreError> {
        let key = record.id().storage_key();
        let mut sealed = record.clone();
        sealed.seal()?;

        let mut volumes = self.write()?;
        let previous = volumes.insert(key.clone(), sealed);
        if let Err(e) = write_document(&self.path, &self.dir, &volumes) {
            match previous {
                Some(prev) => volumes.insert(key, prev),
                None => volumes.remove(&key),
            };
            return Err(e);
        }
        debug!("metadata put: {key}");
        Ok(())
    }

    pub fn get(&self, id: &VolumeId) -> Result<VolumeRecord, StoreError> {
        let key = id.storage_key();
        let volumes = self.read()?;
        let record = volumes
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        record.verify(&key)?;
        Ok(record.clone())
    }

    pub fn exists(&self, id: &VolumeId) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(&id.storage_key()))
    }

    /// Apply `f` to the stored record and persist the result atomically with
    /// respect to other writers. Returns the updated record.
    pub fn update<F>(&self, id: &VolumeId, f: F) -> Result<VolumeRecord, StoreError>
    where
        F: FnOnce(&mut VolumeRecord),
    {
        let key = id.storage_key();
        let mut volumes = self.write()?;
        let current = volumes
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        current.verify(&key)?;

        let mut next = current.clone();
        f(&mut next);
        next.updated_at = chrono::Utc::now().to_rfc3339();
        next.seal()?;

        let previous = volumes.insert(key.clone(), next.clone());
        if let Err(e) = write_document(&self.path, &self.dir, &volumes) {
            if let Some(prev) = previous {
                volumes.insert(key, prev);
            }
            return Err(e);
        }
        debug!("metadata update: {key} (attach_count={})", next.attach_count);
        Ok(next)
    }

    pub fn increment_attach(&self, id: &VolumeId) -> Result<VolumeRecord, StoreError> {
        self.update(id, |r| r.attach_count = r.attach_count.saturating_add(1))
    }

    /// Decrement the attach count, stopping at zero.
    pub fn decrement_attach(&self, id: &VolumeId) -> Result<VolumeRecord, StoreError> {
        self.update(id, |r| r.attach_count = r.attach_count.saturating_sub(1))
    }

    /// Remove a record. Removing an absent identity is not an error.
    pub fn delete(&self, id: &VolumeId) -> Result<(), StoreError> {
        let key = id.storage_key();
        let mut volumes = self.write()?;
        let Some(previous) = volumes.remove(&key) else {
            return Ok(());
        };
        if let Err(e) = write_document(&self.path, &self.dir, &volumes) {
            volumes.insert(key, previous);
            return Err(e);
        }
        debug!("metadata delete: {key}");
        Ok(())
    }

    /// All records matching `filter`, ordered by storage key. A record that
    /// fails its checksum aborts the listing.
    pub fn list(&self, filter: Option<&VolumeFilter>) -> Result<Vec<VolumeRecord>, StoreError> {
        let volumes = self.read()?;
        let mut results = Vec::new();
        for (key, record) in volumes.iter() {
            if filter.is_some_and(|f| !f.matches(&record.driver, &record.labels)) {
                continue;
            }
            record.verify(key)?;
            results.push(record.clone());
        }
        Ok(results)
    }

    /// Identities matching `filter`, without copying the records.
    pub fn list_keys(&self, filter: Option<&VolumeFilter>) -> Result<Vec<VolumeId>, StoreError> {
        let volumes = self.read()?;
        volumes
            .iter()
            .filter(|(_, r)| filter.is_none_or(|f| f.matches(&r.driver, &r.labels)))
            .map(|(key, _)| VolumeId::from_storage_key(key).map_err(StoreError::from))
            .collect()
    }

    /// Every stored entry as-is, checksums unchecked. Used by integrity audits.
    pub(crate) fn raw_entries(&self) -> Result<Vec<(String, VolumeRecord)>, StoreError> {
        Ok(self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Release the store lock. Dropping the store has the same effect but
    /// cannot report a failure.
    pub fn close(self) -> Result<(), StoreError> {
        debug!("closing metadata store {}", self.path.display());
        self.lock.release()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, VolumeRecord>>, StoreError> {
        self.volumes
            .read()
            .map_err(|e| StoreError::LockFailed(format!("metadata index poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, VolumeRecord>>, StoreError> {
        self.volumes
            .write()
            .map_err(|e| StoreError::LockFailed(format!("metadata index poisoned: {e}")))
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(".lock");
    PathBuf::from(s)
}

const TEMP_SUFFIX: &str = ".tmp";

/// Temporary documents for `volume.db` are named `.volume.db.<random>.tmp`.
fn temp_prefix(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{name}.")
}

/// Remove temporary documents left by writes that died before the rename.
/// Only called with the store lock held, so no live writer owns them.
fn sweep_stale_temp_files(path: &Path, dir: &Path) {
    let prefix = temp_prefix(path);
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX)) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!("removed stale temp file {name}"),
            Err(e) => warn!("failed to remove stale temp file {name}: {e}"),
        }
    }
}

fn load_document(path: &Path) -> Result<BTreeMap<String, VolumeRecord>, StoreError> {
    let content = fs::read_to_string(path)?;
    let doc: MetadataDocument = serde_json::from_str(&content)?;
    if doc.format_version != METADATA_FORMAT_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: METADATA_FORMAT_VERSION,
            found: doc.format_version,
        });
    }
    Ok(doc.volumes)
}

fn write_document(
    path: &Path,
    dir: &Path,
    volumes: &BTreeMap<String, VolumeRecord>,
) -> Result<(), StoreError> {
    let doc = MetadataDocumentRef {
        format_version: METADATA_FORMAT_VERSION,
        volumes,
    };
    let content = serde_json::to_string_pretty(&doc)?;

    let mut tmp = Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}
