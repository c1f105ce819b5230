//! Schema Compiler
//!
//! Turns a [`RawSchema`] into an immutable [`Snapshot`]:
//!
//! 1. extension patches, then `extends` resolution ([`inherit`])
//! 2. profile attribute injection ([`profile`])
//! 3. dictionary resolution of every attribute ([`link`])
//! 4. typed model, primitive types
//! 5. uid arithmetic and uid enums ([`uid`])
//! 6. back-links and `_dt` companions ([`link`])
//! 7. observable registry ([`observable`])
//!
//! Authoring errors abort the compile; everything else is recorded as a
//! [`CompileWarning`] and logged.

pub mod inherit;
pub mod link;
pub mod merge;
pub mod observable;
pub mod profile;
pub mod uid;

use std::collections::HashMap;

use indexmap::IndexMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError};
use crate::ident::Identifier;
use crate::loader::{RawDictionary, RawSchema};
use crate::schema::{Category, Class, Dictionary, EntityKind, Object, Profile};
use crate::snapshot::Snapshot;
use crate::version::SchemaVersion;

use self::inherit::RawItems;
use self::link::ObjectIndex;
use self::observable::ObservableRegistry;

// =============================================================================
// Warnings
// =============================================================================

/// Kinds of soft compile problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    UndefinedAttribute,
    UndefinedObjectType,
    UndefinedType,
    DefaultedRequirement,
    MissingCategory,
    UndefinedProfile,
    InvalidRegex,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UndefinedAttribute => "undefined_attribute",
            Self::UndefinedObjectType => "undefined_object_type",
            Self::UndefinedType => "undefined_type",
            Self::DefaultedRequirement => "defaulted_requirement",
            Self::MissingCategory => "missing_category",
            Self::UndefinedProfile => "undefined_profile",
            Self::InvalidRegex => "invalid_regex",
        }
    }
}

/// A soft compile problem; the compile went on without it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileWarning {
    pub code: WarningCode,
    /// Item (and attribute) the warning is about, e.g. `network_activity.ip`
    pub path: String,
    pub message: String,
}

/// Warning collector that also logs each warning as it is raised
#[derive(Debug, Default)]
pub(crate) struct Warnings(Vec<CompileWarning>);

impl Warnings {
    pub(crate) fn push(&mut self, code: WarningCode, path: impl Into<String>, message: impl Into<String>) {
        let warning = CompileWarning {
            code,
            path: path.into(),
            message: message.into(),
        };
        warn!(code = code.as_str(), path = %warning.path, "{}", warning.message);
        self.0.push(warning);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &CompileWarning> {
        self.0.iter()
    }

    pub(crate) fn into_vec(self) -> Vec<CompileWarning> {
        self.0
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Compile raw definitions into a snapshot
pub fn compile(raw: RawSchema) -> Result<Snapshot> {
    let RawSchema {
        version,
        categories,
        dictionary: raw_dictionary,
        classes: mut raw_classes,
        objects: mut raw_objects,
        profiles: mut raw_profiles,
        extensions,
    } = raw;
    let mut warnings = Warnings::default();

    observable::check_hidden(&raw_classes, EntityKind::Class)?;
    observable::check_hidden(&raw_objects, EntityKind::Object)?;

    inherit::apply_patches(&mut raw_classes, EntityKind::Class)?;
    inherit::apply_patches(&mut raw_objects, EntityKind::Object)?;
    let mut raw_classes = inherit::resolve(raw_classes, EntityKind::Class)?;
    let mut raw_objects = inherit::resolve(raw_objects, EntityKind::Object)?;
    raw_classes.retain(|key, _| !key.is_hidden());
    raw_objects.retain(|key, _| !key.is_hidden());

    profile::inject_profiles(&mut raw_classes, &raw_profiles, &mut warnings);
    profile::inject_profiles(&mut raw_objects, &raw_profiles, &mut warnings);

    link::resolve_attributes(&mut raw_classes, &raw_dictionary, &mut warnings);
    link::resolve_attributes(&mut raw_objects, &raw_dictionary, &mut warnings);
    link::resolve_attributes(&mut raw_profiles, &raw_dictionary, &mut warnings);
    debug!(
        classes = raw_classes.len(),
        objects = raw_objects.len(),
        warnings = warnings.len(),
        "Resolved raw definitions"
    );

    let mut categories: IndexMap<Identifier, Category> = typed(categories, EntityKind::Category)?;
    let mut classes: IndexMap<Identifier, Class> = typed(raw_classes, EntityKind::Class)?;
    let mut objects: IndexMap<Identifier, Object> = typed(raw_objects, EntityKind::Object)?;
    let mut profiles: IndexMap<Identifier, Profile> = typed(raw_profiles, EntityKind::Profile)?;
    let mut dictionary = build_dictionary(raw_dictionary, &mut warnings)?;

    let index = ObjectIndex::new(&objects);
    link::type_dictionary(&mut dictionary, &index, &mut warnings);
    for class in classes.values_mut() {
        link::type_attributes(class, &dictionary.types, &index, &mut warnings);
        class.profiles = profile::collect_profiles(&class.profiles, &class.attributes);
    }
    for object in objects.values_mut() {
        link::type_attributes(object, &dictionary.types, &index, &mut warnings);
        object.profiles = profile::collect_profiles(&object.profiles, &object.attributes);
    }
    for profile in profiles.values_mut() {
        link::type_attributes(profile, &dictionary.types, &index, &mut warnings);
    }

    uid::derive(&mut categories, &mut classes, &extensions, &mut warnings)?;
    link::link_dictionary(&mut dictionary, &classes, &mut objects);
    link::synthesize_datetime(&mut dictionary, &mut classes, &mut objects, &mut profiles);

    let registry = ObservableRegistry::build(&dictionary, &objects, &classes)?;
    registry.publish(&mut objects);

    let snapshot = Snapshot {
        version: version.as_deref().map(SchemaVersion::new),
        extensions,
        profiles,
        categories,
        dictionary,
        classes,
        objects,
        observables: registry.into_entries(),
        warnings: warnings.into_vec(),
        classes_by_uid: HashMap::new(),
    }
    .indexed();

    info!(
        version = snapshot.version().map(SchemaVersion::as_str).unwrap_or("unversioned"),
        classes = snapshot.classes().len(),
        objects = snapshot.objects().len(),
        observables = snapshot.observables().len(),
        warnings = snapshot.warnings().len(),
        "Compiled schema"
    );
    Ok(snapshot)
}

fn typed<T: DeserializeOwned>(items: RawItems, kind: EntityKind) -> Result<IndexMap<Identifier, T>> {
    items
        .into_iter()
        .map(|(key, mut raw)| {
            raw.insert("name".into(), Value::String(key.to_string()));
            let item = serde_json::from_value(Value::Object(raw)).map_err(|source| SchemaError::InvalidDefinition {
                kind: kind.as_str(),
                name: key.to_string(),
                source,
            })?;
            Ok((key, item))
        })
        .collect()
}

fn build_dictionary(raw: RawDictionary, warnings: &mut Warnings) -> Result<Dictionary> {
    let mut dictionary = Dictionary {
        caption: raw.caption.unwrap_or_else(|| "Attribute Dictionary".to_string()),
        description: raw.description,
        ..Default::default()
    };

    for (key, attr) in raw.attributes {
        let attr = serde_json::from_value(Value::Object(attr)).map_err(|source| SchemaError::InvalidDefinition {
            kind: "attribute",
            name: key.to_string(),
            source,
        })?;
        dictionary.attributes.insert(key, attr);
    }
    for (key, data_type) in raw.types {
        let data_type = serde_json::from_value(Value::Object(data_type)).map_err(|source| {
            SchemaError::InvalidDefinition {
                kind: "type",
                name: key.to_string(),
                source,
            }
        })?;
        dictionary.types.insert(key, data_type);
    }

    for (key, data_type) in &dictionary.types {
        let Some(pattern) = &data_type.regex else { continue };
        match Regex::new(pattern) {
            Ok(regex) => {
                dictionary.regexes.insert(key.clone(), regex);
            }
            Err(e) => warnings.push(
                WarningCode::InvalidRegex,
                key.as_str(),
                format!("regex '{pattern}' does not compile: {e}"),
            ),
        }
    }
    Ok(dictionary)
}
