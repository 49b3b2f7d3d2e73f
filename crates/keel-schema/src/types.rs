//! Newtype wrappers for volume and driver names, and the `VolumeId` identity.
//!
//! Names serialize/deserialize as plain strings.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Longest accepted volume or driver name.
pub const MAX_NAME_LEN: usize = 64;

/// Separator between the driver and volume parts of a storage key.
const KEY_SEPARATOR: char = '/';

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Caller-chosen volume name, unique within one driver's namespace.
    VolumeName
);

string_newtype!(
    /// Name under which a volume driver registers itself.
    DriverName
);

/// Check a volume or driver name: 1-64 characters, leading ASCII
/// alphanumeric, remainder in `[A-Za-z0-9_.-]`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), SchemaError> {
    let invalid = |reason| SchemaError::InvalidName {
        kind,
        name: name.to_owned(),
        reason,
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid("must be 1-64 characters"));
    }
    if !name.as_bytes()[0].is_ascii_alphanumeric() {
        return Err(invalid("must start with [a-zA-Z0-9]"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
    {
        return Err(invalid("must match [a-zA-Z0-9_.-]"));
    }
    Ok(())
}

/// Identity of a volume: two volumes are the same entity iff both the name
/// and the driver are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId {
    pub name: VolumeName,
    pub driver: DriverName,
}

impl VolumeId {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: VolumeName::new(name),
            driver: DriverName::new(driver),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_name("volume", &self.name)?;
        validate_name("driver", &self.driver)
    }

    /// Key under which the metadata store files this identity: `driver/name`.
    ///
    /// Unambiguous for validated identities since neither part may contain
    /// the separator.
    pub fn storage_key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.driver, self.name)
    }

    pub fn from_storage_key(key: &str) -> Result<Self, SchemaError> {
        let (driver, name) = key
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| SchemaError::MalformedKey(key.to_owned()))?;
        let id = Self::new(name, driver);
        id.validate()
            .map_err(|_| SchemaError::MalformedKey(key.to_owned()))?;
        Ok(id)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.driver, self.name)
    }
}
