//! Schema types and structures
//!
//! The typed model of a compiled event schema. Raw definitions are merged as
//! loose JSON maps during inheritance resolution and deserialized into these
//! types afterwards; every later pass and the validator work on the typed form.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ident::Identifier;

/// Attribute map of a class, object, profile or the dictionary
pub type Attributes = IndexMap<Identifier, Attribute>;

/// Enum values keyed by the integer value rendered as a string
pub type EnumMap = IndexMap<String, EnumValue>;

/// A set of requested profile names
pub type ProfileSet = BTreeSet<Identifier>;

/// Well-known attribute and type names
pub mod names {
    pub const CLASS_UID: &str = "class_uid";
    pub const CATEGORY_UID: &str = "category_uid";
    pub const TYPE_UID: &str = "type_uid";
    pub const ACTIVITY_ID: &str = "activity_id";
    pub const DISPOSITION_ID: &str = "disposition_id";
    pub const METADATA: &str = "metadata";
    pub const PROFILES: &str = "profiles";
    pub const VERSION: &str = "version";
    pub const OBSERVABLES: &str = "observables";
    pub const OBSERVABLE_OBJECT: &str = "observable";
    pub const TYPE_ID: &str = "type_id";
    pub const BASE_EVENT: &str = "base_event";
    pub const OBJECT_T: &str = "object_t";
    pub const TIMESTAMP_T: &str = "timestamp_t";
    pub const DATETIME_T: &str = "datetime_t";
    pub const DATETIME_PROFILE: &str = "datetime";
    pub const DATETIME_SUFFIX: &str = "_dt";
    /// Enum value conventionally meaning "Other"
    pub const OTHER_ENUM_VALUE: i64 = 99;
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// Attributes
// =============================================================================

/// How strongly an event is expected to carry an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    Required,
    Recommended,
    #[default]
    Optional,
}

/// Deprecation notice on an attribute, enum value, class or object
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deprecated {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub since: String,
}

/// A single enum value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnumValue {
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "@deprecated", default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
}

impl EnumValue {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            description: None,
            deprecated: None,
        }
    }
}

/// The primitive JSON kind an attribute's data type bottoms out in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Long,
    Float,
    String,
    Json,
    Object(Identifier),
}

impl PrimitiveType {
    /// Map a base type name; `object_t` is resolved separately since it needs
    /// the referenced object.
    pub fn from_base(name: &str) -> Option<Self> {
        match name {
            "boolean_t" => Some(Self::Boolean),
            "integer_t" => Some(Self::Integer),
            "long_t" => Some(Self::Long),
            "float_t" => Some(Self::Float),
            "string_t" => Some(Self::String),
            "json_t" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean_t",
            Self::Integer => "integer_t",
            Self::Long => "long_t",
            Self::Float => "float_t",
            Self::String => "string_t",
            Self::Json => "json_t",
            Self::Object(_) => "object_t",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => write!(f, "object_t ({})", object),
            other => f.write_str(other.base_name()),
        }
    }
}

/// Which kind of definition a back-link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkGroup {
    /// The base event class every class inherits from
    Common,
    Class,
    Object,
}

/// Reverse reference from a dictionary attribute (or object) to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub group: LinkGroup,
    #[serde(rename = "type")]
    pub type_id: Identifier,
    pub caption: String,
    pub attribute_keys: BTreeSet<Identifier>,
}

/// An attribute definition, either in the dictionary or compiled into a
/// class/object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared data type (`string_t`, `ip_t`, `object_t`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<Identifier>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Requirement>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<EnumMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(rename = "@deprecated", default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observable: Option<i64>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Identifier>,
    /// Caption of the named data type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Caption of the referenced object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive: Option<PrimitiveType>,
    #[serde(rename = "_links", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl Attribute {
    pub fn requirement(&self) -> Requirement {
        self.requirement.unwrap_or_default()
    }

    pub fn is_enum(&self) -> bool {
        self.enum_values.as_ref().is_some_and(|values| !values.is_empty())
    }

    /// Look up the enum value for a JSON value (`1` and `"1"` both match key `"1"`)
    pub fn enum_value(&self, value: &Value) -> Option<&EnumValue> {
        let key = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return None,
        };
        self.enum_values.as_ref()?.get(&key)
    }
}

// =============================================================================
// Dictionary
// =============================================================================

/// Numeric `[min, max]` bounds of a data type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range(pub f64, pub f64);

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.0 && value <= self.1
    }
}

/// A primitive or derived data type from the dictionary's `types` table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataType {
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The type this one is a subtype of
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub supertype: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observable: Option<i64>,
}

/// The schema-wide attribute dictionary and data type table
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dictionary {
    pub caption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attributes: Attributes,
    pub types: IndexMap<Identifier, DataType>,
    /// Compiled `regex` constraints, keyed by type
    #[serde(skip)]
    pub regexes: HashMap<Identifier, Regex>,
}

impl Dictionary {
    /// Find a dictionary attribute, trying the extension-qualified key first
    pub fn lookup(&self, name: &Identifier, extension: Option<&str>) -> Option<(&Identifier, &Attribute)> {
        if let Some(ext) = extension {
            let qualified = name.in_extension(ext);
            if let Some(found) = self.attributes.get_key_value(&qualified) {
                return Some(found);
            }
        }
        self.attributes.get_key_value(name)
    }

    /// The type itself followed by its supertype (one level)
    pub fn type_chain<'a>(&'a self, type_id: &'a Identifier) -> impl Iterator<Item = (&'a Identifier, &'a DataType)> + 'a {
        let own = self.types.get_key_value(type_id);
        let parent = own
            .and_then(|(_, t)| t.supertype.as_ref())
            .and_then(|sup| self.types.get_key_value(sup));
        own.into_iter().chain(parent)
    }

    /// Whether `type_id` is, or directly derives from, `ancestor`
    pub fn is_a(&self, type_id: &Identifier, ancestor: &str) -> bool {
        type_id.as_str() == ancestor
            || self
                .types
                .get(type_id)
                .and_then(|t| t.supertype.as_ref())
                .is_some_and(|sup| sup.as_str() == ancestor)
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// Class/object level presence constraints
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub at_least_one: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub just_one: Vec<Identifier>,
}

/// An event category; classes are associated by name, not owned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: Identifier,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Compiled uid (the authored id before compilation)
    #[serde(default)]
    pub uid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Identifier>,
}

/// An event class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: Identifier,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Identifier>,
    /// Compiled class uid (the authored class id before compilation)
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub observables: IndexMap<String, i64>,
    /// Observables as inherited from the base class, before the class's own
    #[serde(rename = "_parent_observables", default, skip_serializing)]
    pub parent_observables: IndexMap<String, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<Identifier>,
    #[serde(rename = "@deprecated", default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Identifier>,
}

/// A reusable object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: Identifier,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Identifier>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observable: Option<i64>,
    /// The `observable` marker came from a base object, not this one
    #[serde(rename = "_observable_inherited", default, skip_serializing_if = "is_false")]
    pub observable_inherited: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<Identifier>,
    #[serde(rename = "@deprecated", default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Deprecated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Identifier>,
    #[serde(rename = "_links", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// A named optional attribute bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Identifier,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Identifier>,
}

/// An extension contributing definitions under its own namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: Identifier,
    pub uid: i64,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// An entry of the observable type registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservableType {
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// Shared shape
// =============================================================================

/// What classes, objects and profiles have in common
pub trait Definition {
    fn name(&self) -> &Identifier;
    fn caption(&self) -> &str;
    fn attributes(&self) -> &Attributes;
    fn attributes_mut(&mut self) -> &mut Attributes;
    fn extension(&self) -> Option<&Identifier>;
}

macro_rules! impl_definition {
    ($($ty:ty),*) => {
        $(impl Definition for $ty {
            fn name(&self) -> &Identifier {
                &self.name
            }

            fn caption(&self) -> &str {
                &self.caption
            }

            fn attributes(&self) -> &Attributes {
                &self.attributes
            }

            fn attributes_mut(&mut self) -> &mut Attributes {
                &mut self.attributes
            }

            fn extension(&self) -> Option<&Identifier> {
                self.extension.as_ref()
            }
        })*
    };
}

impl_definition!(Class, Object, Profile);

/// Kind of a published schema entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Class,
    Object,
    Profile,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Class => "class",
            Self::Object => "object",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any published entity, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaEntity {
    Category {
        #[serde(flatten)]
        category: Category,
        classes: Vec<Identifier>,
    },
    Class(Class),
    Object(Object),
    Profile(Profile),
}

impl SchemaEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Category { .. } => EntityKind::Category,
            Self::Class(_) => EntityKind::Class,
            Self::Object(_) => EntityKind::Object,
            Self::Profile(_) => EntityKind::Profile,
        }
    }

    pub fn name(&self) -> &Identifier {
        match self {
            Self::Category { category, .. } => &category.name,
            Self::Class(class) => &class.name,
            Self::Object(object) => &object.name,
            Self::Profile(profile) => &profile.name,
        }
    }

    /// Categories carry no attributes of their own
    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::Category { .. } => None,
            Self::Class(class) => Some(&class.attributes),
            Self::Object(object) => Some(&object.attributes),
            Self::Profile(profile) => Some(&profile.attributes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_from_json() {
        let attr: Attribute = serde_json::from_value(json!({
            "caption": "Severity ID",
            "type": "integer_t",
            "requirement": "required",
            "sibling": "severity",
            "enum": {
                "1": {"caption": "Low"},
                "99": {"caption": "Other"}
            }
        }))
        .unwrap();

        assert_eq!(attr.requirement(), Requirement::Required);
        assert_eq!(attr.type_id.as_ref().map(Identifier::as_str), Some("integer_t"));
        assert!(attr.is_enum());
        assert_eq!(attr.enum_value(&json!(1)).map(|v| v.caption.as_str()), Some("Low"));
        assert_eq!(attr.enum_value(&json!("99")).map(|v| v.caption.as_str()), Some("Other"));
        assert!(attr.enum_value(&json!(2)).is_none());
    }

    #[test]
    fn test_requirement_defaults_to_optional() {
        let attr: Attribute = serde_json::from_value(json!({"caption": "Name"})).unwrap();
        assert_eq!(attr.requirement, None);
        assert_eq!(attr.requirement(), Requirement::Optional);
    }

    #[test]
    fn test_data_type_range() {
        let port: DataType = serde_json::from_value(json!({
            "caption": "Port",
            "type": "integer_t",
            "range": [0, 65535]
        }))
        .unwrap();
        let range = port.range.unwrap();
        assert!(range.contains(443.0));
        assert!(!range.contains(70000.0));
    }

    #[test]
    fn test_type_chain_walks_one_level() {
        let mut dictionary = Dictionary::default();
        dictionary.types.insert(
            Identifier::new("long_t"),
            DataType { caption: "Long".into(), ..Default::default() },
        );
        dictionary.types.insert(
            Identifier::new("timestamp_t"),
            DataType {
                caption: "Timestamp".into(),
                supertype: Some(Identifier::new("long_t")),
                ..Default::default()
            },
        );
        let ts = Identifier::new("timestamp_t");
        let chain: Vec<_> = dictionary.type_chain(&ts).map(|(id, _)| id.as_str()).collect();
        assert_eq!(chain, vec!["timestamp_t", "long_t"]);
        assert!(dictionary.is_a(&ts, "long_t"));
        assert!(!dictionary.is_a(&Identifier::new("long_t"), "timestamp_t"));
    }

    #[test]
    fn test_primitive_display() {
        assert_eq!(PrimitiveType::Long.to_string(), "long_t");
        assert_eq!(
            PrimitiveType::Object(Identifier::new("process")).to_string(),
            "object_t (process)"
        );
    }
}
