//! Interned identifiers
//!
//! Attribute, class, object, category and profile keys are interned once in a
//! process-wide table. Two identifiers with the same text share one allocation,
//! so equality is a pointer comparison.
//!
//! The table only grows. Caller-supplied names such as query filters go
//! through [`Identifier::lookup`], which never inserts.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Every interned name; entries are never removed
static INTERNER: Lazy<Mutex<HashSet<Arc<str>>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Separator between an extension name and the local item name
pub const EXTENSION_SEPARATOR: char = '/';

/// Marker prefix for hidden (abstract) classes and objects
pub const HIDDEN_PREFIX: char = '_';

/// An interned symbolic name
#[derive(Clone)]
pub struct Identifier(Arc<str>);

impl Identifier {
    /// Intern `name`, returning the shared identifier for it
    pub fn new(name: &str) -> Self {
        let mut table = INTERNER.lock();
        if let Some(existing) = table.get(name) {
            return Self(existing.clone());
        }
        let interned: Arc<str> = Arc::from(name);
        table.insert(interned.clone());
        Self(interned)
    }

    /// The identifier for `name` if it was ever interned. A name that was
    /// not cannot equal any schema key.
    pub fn lookup(name: &str) -> Option<Self> {
        INTERNER.lock().get(name).map(|existing| Self(existing.clone()))
    }

    /// Build `extension/name`
    pub fn qualified(extension: &str, name: &str) -> Self {
        Self::new(&format!("{extension}{EXTENSION_SEPARATOR}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension part of a qualified name (`win` for `win/registry_key`)
    pub fn extension(&self) -> Option<&str> {
        self.0.split_once(EXTENSION_SEPARATOR).map(|(ext, _)| ext)
    }

    /// The name without its extension prefix
    pub fn local_name(&self) -> &str {
        self.0
            .split_once(EXTENSION_SEPARATOR)
            .map_or(&*self.0, |(_, local)| local)
    }

    /// Hidden items only exist to be inherited from
    pub fn is_hidden(&self) -> bool {
        self.local_name().starts_with(HIDDEN_PREFIX)
    }

    /// Re-qualify the local name of `self` with `extension`
    pub fn in_extension(&self, extension: &str) -> Self {
        Self::qualified(extension, self.local_name())
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with `Borrow<str>`, so hash the text, not the pointer.
        self.0.hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            Ordering::Equal
        } else {
            self.0.cmp(&other.0)
        }
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::new(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_shares_allocation() {
        let a = Identifier::new("device");
        let b = Identifier::from(String::from("device"));
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_ne!(a, Identifier::new("devices"));
    }

    #[test]
    fn test_lookup_does_not_intern() {
        assert!(Identifier::lookup("never_interned_lookup_name").is_none());
        assert!(Identifier::lookup("never_interned_lookup_name").is_none());

        let known = Identifier::new("lookup_known");
        assert_eq!(Identifier::lookup("lookup_known"), Some(known));
    }

    #[test]
    fn test_qualified_names() {
        let id = Identifier::qualified("win", "registry_key");
        assert_eq!(id.as_str(), "win/registry_key");
        assert_eq!(id.extension(), Some("win"));
        assert_eq!(id.local_name(), "registry_key");
        assert!(!id.is_hidden());

        let core = Identifier::new("process");
        assert_eq!(core.extension(), None);
        assert_eq!(core.in_extension("linux").as_str(), "linux/process");
    }

    #[test]
    fn test_hidden_marker() {
        assert!(Identifier::new("_entity").is_hidden());
        assert!(Identifier::new("ext/_entity").is_hidden());
        assert!(!Identifier::new("entity").is_hidden());
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(Identifier::new("ip"), 1);
        assert_eq!(map.get("ip"), Some(&1));
    }
}
