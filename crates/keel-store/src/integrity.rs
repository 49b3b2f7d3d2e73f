use crate::metadata::MetadataStore;
use crate::StoreError;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub key: String,
    pub reason: String,
}

/// Audit every record in the store, collecting all failures instead of
/// stopping at the first one.
pub fn verify_store_integrity(store: &MetadataStore) -> Result<IntegrityReport, StoreError> {
    let entries = store.raw_entries()?;
    let mut report = IntegrityReport {
        checked: entries.len(),
        ..Default::default()
    };

    for (key, record) in &entries {
        if record.id().storage_key() != *key {
            report.failed.push(IntegrityFailure {
                key: key.clone(),
                reason: format!("record identity '{}' filed under wrong key", record.id()),
            });
            continue;
        }
        match record.verify(key) {
            Ok(()) => report.passed += 1,
            Err(StoreError::IntegrityFailure {
                expected, actual, ..
            }) => {
                report.failed.push(IntegrityFailure {
                    key: key.clone(),
                    reason: format!(
                        "record checksum mismatch: expected {expected}, got {actual}"
                    ),
                });
            }
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    key: key.clone(),
                    reason: format!("record read error: {e}"),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VolumeRecord;
    use keel_schema::{VolumeId, VolumeSpec};
    use std::fs;

    #[test]
    fn clean_store_passes() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("volume.db")).unwrap();
        for name in ["a", "b", "c"] {
            let rec = VolumeRecord::new(&VolumeId::new(name, "fake1"), &VolumeSpec::new());
            store.put(&rec).unwrap();
        }

        let report = verify_store_integrity(&store).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.passed, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn reports_every_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.db");
        {
            let store = MetadataStore::open(&path).unwrap();
            let spec = VolumeSpec::new().with_label("team", "red");
            for name in ["a", "b", "c"] {
                store
                    .put(&VolumeRecord::new(&VolumeId::new(name, "fake1"), &spec))
                    .unwrap();
            }
        }
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("\"red\"", "\"blue\"", 2)).unwrap();

        let store = MetadataStore::open(&path).unwrap();
        let report = verify_store_integrity(&store).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].reason.contains("checksum mismatch"));
    }

    #[test]
    fn misfiled_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.db");
        {
            let store = MetadataStore::open(&path).unwrap();
            let rec = VolumeRecord::new(&VolumeId::new("beta", "fake1"), &VolumeSpec::new());
            store.put(&rec).unwrap();
        }
        // Move the sealed record under another identity's key.
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("\"fake1/beta\"", "\"fake1/alpha\"")).unwrap();

        let store = MetadataStore::open(&path).unwrap();
        let report = verify_store_integrity(&store).unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "fake1/alpha");
        assert!(report.failed[0].reason.contains("wrong key"));
    }

    #[test]
    fn record_missing_checksum_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.db");
        let json = r#"{
            "format_version": 1,
            "volumes": {
                "fake1/bare": {
                    "name": "bare",
                    "driver": "fake1",
                    "created_at": "2025-01-01T00:00:00Z",
                    "updated_at": "2025-01-01T00:00:00Z"
                }
            }
        }"#;
        fs::write(&path, json).unwrap();

        let store = MetadataStore::open(&path).unwrap();
        let report = verify_store_integrity(&store).unwrap();
        assert_eq!(report.passed, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("<missing>"));
    }
}
