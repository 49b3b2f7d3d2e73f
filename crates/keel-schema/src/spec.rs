use crate::types::DriverName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Creation request for a volume: driver options plus caller labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Opaque configuration handed to the driver at creation.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Caller metadata, never interpreted by the core.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl VolumeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_owned(), value.to_owned());
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Predicate narrowing a volume listing by driver and labels.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeFilter {
    pub driver: Option<DriverName>,
    pub labels: BTreeMap<String, String>,
}

impl VolumeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn driver(mut self, driver: &str) -> Self {
        self.driver = Some(DriverName::new(driver));
        self
    }

    #[must_use]
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn matches(&self, driver: &str, labels: &BTreeMap<String, String>) -> bool {
        if let Some(ref want) = self.driver {
            if want.as_str() != driver {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = VolumeFilter::new();
        assert!(f.matches("local", &BTreeMap::new()));
        assert!(f.matches("nfs", &labels(&[("a", "b")])));
    }

    #[test]
    fn driver_filter() {
        let f = VolumeFilter::new().driver("nfs");
        assert!(f.matches("nfs", &BTreeMap::new()));
        assert!(!f.matches("local", &BTreeMap::new()));
    }

    #[test]
    fn label_filter_requires_all_pairs() {
        let f = VolumeFilter::new().label("env", "prod").label("tier", "db");
        assert!(f.matches("local", &labels(&[("env", "prod"), ("tier", "db"), ("x", "y")])));
        assert!(!f.matches("local", &labels(&[("env", "prod")])));
        assert!(!f.matches("local", &labels(&[("env", "dev"), ("tier", "db")])));
    }

    #[test]
    fn spec_builder_and_serde_defaults() {
        let spec = VolumeSpec::new().with_option("size", "10G").with_label("app", "web");
        assert_eq!(spec.options.get("size").map(String::as_str), Some("10G"));
        assert_eq!(spec.labels.get("app").map(String::as_str), Some("web"));

        let parsed: VolumeSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, VolumeSpec::default());
    }
}
