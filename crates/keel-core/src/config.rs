use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options consumed by [`Core::new`](crate::Core::new).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoreConfig {
    /// Metadata file holding every volume record.
    pub volume_meta_path: PathBuf,
}

impl CoreConfig {
    pub fn new(volume_meta_path: impl Into<PathBuf>) -> Self {
        Self {
            volume_meta_path: volume_meta_path.into(),
        }
    }

    /// Load a TOML config file, e.g.
    ///
    /// ```toml
    /// volume_meta_path = "/var/lib/keel/volume.db"
    /// ```
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.volume_meta_path.as_os_str().is_empty() {
            return Err(CoreError::Config(
                "volume_meta_path must not be empty".to_owned(),
            ));
        }
        if self.volume_meta_path.file_name().is_none() {
            return Err(CoreError::Config(format!(
                "volume_meta_path {} does not name a file",
                self.volume_meta_path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, "volume_meta_path = \"/var/lib/keel/volume.db\"\n").unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(
            config.volume_meta_path,
            PathBuf::from("/var/lib/keel/volume.db")
        );
    }

    #[test]
    fn load_missing_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, "other = 1\n").unwrap();
        assert!(matches!(CoreConfig::load(&path), Err(CoreError::Config(_))));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CoreConfig::load(&dir.path().join("absent.toml")),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn empty_path_rejected() {
        assert!(CoreConfig::new("").validate().is_err());
        assert!(CoreConfig::new("/").validate().is_err());
        assert!(CoreConfig::new("volume.db").validate().is_ok());
    }
}
