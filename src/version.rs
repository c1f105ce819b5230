//! Schema versioning utilities

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The version a schema declares in `version.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion {
    /// As declared (e.g. "1.3.0-dev")
    raw: String,
    /// Semantic version, when the declaration parses as one
    semver: Option<Version>,
}

impl SchemaVersion {
    /// Wrap a declared version; non-semver strings are kept verbatim
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.strip_prefix('v').unwrap_or(raw);
        Self {
            raw: raw.to_string(),
            semver: Version::parse(trimmed).ok(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn semver(&self) -> Option<&Version> {
        self.semver.as_ref()
    }

    /// Whether an event's declared version names this schema version
    pub fn matches(&self, declared: &str) -> bool {
        if declared == self.raw {
            return true;
        }
        let declared = declared.strip_prefix('v').unwrap_or(declared);
        match (&self.semver, Version::parse(declared)) {
            (Some(ours), Ok(theirs)) => *ours == theirs,
            _ => false,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}
