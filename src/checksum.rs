//! Checksum utilities for compiled schema integrity

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// SHA256 checksum of schema content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Checksum of a snapshot's serialized form. Every map in a snapshot is
    /// insertion-ordered, so equal compiles give equal checksums.
    pub fn of_snapshot(snapshot: &Snapshot) -> Result<Self> {
        Ok(Self::from_bytes(&serde_json::to_vec(snapshot)?))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = br#"{"name": "test", "version": "1.0.0"}"#;
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
    }

    #[test]
    fn test_checksum_different_content() {
        assert_ne!(Checksum::from_bytes(b"schema"), Checksum::from_bytes(b"schemas"));
    }

    #[test]
    fn test_short() {
        let checksum = Checksum::from_bytes(b"schema");
        assert_eq!(checksum.short().len(), 12);
        assert_eq!(checksum.as_str().len(), 64);
        assert!(checksum.as_str().starts_with(checksum.short()));
    }
}
