//! Observable Registry
//!
//! One flat, collision-free `type_id -> caption` namespace, filled in three
//! layers: dictionary types and attributes, observable objects, then
//! class-specific attribute paths.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::compile::inherit::RawItems;
use crate::error::{Result, SchemaError};
use crate::ident::Identifier;
use crate::schema::{names, Class, Dictionary, EntityKind, EnumValue, Object, ObservableType};

/// The global observable type namespace
#[derive(Debug, Default)]
pub struct ObservableRegistry {
    entries: BTreeMap<i64, ObservableType>,
}

impl ObservableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `type_id`, failing if it is already taken
    pub fn register(&mut self, type_id: i64, caption: String, description: Option<String>) -> Result<()> {
        if let Some(existing) = self.entries.get(&type_id) {
            return Err(SchemaError::ObservableCollision {
                type_id,
                existing: existing.caption.clone(),
                new: caption,
            });
        }
        self.entries.insert(type_id, ObservableType { caption, description });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> BTreeMap<i64, ObservableType> {
        self.entries
    }

    /// Build the registry from a compiled dictionary, objects and classes
    pub fn build(
        dictionary: &Dictionary,
        objects: &IndexMap<Identifier, Object>,
        classes: &IndexMap<Identifier, Class>,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for data_type in dictionary.types.values() {
            if let Some(type_id) = data_type.observable {
                registry.register(type_id, data_type.caption.clone(), data_type.description.clone())?;
            }
        }
        for attr in dictionary.attributes.values() {
            if let Some(type_id) = attr.observable {
                registry.register(type_id, attr.caption.clone(), attr.description.clone())?;
            }
        }

        for object in objects.values() {
            if object.observable_inherited {
                continue;
            }
            if let Some(type_id) = object.observable {
                registry.register(type_id, object.caption.clone(), object.description.clone())?;
            }
        }

        for class in classes.values() {
            for (path, type_id) in &class.observables {
                if class.parent_observables.get(path) == Some(type_id) {
                    continue;
                }
                registry.register(
                    *type_id,
                    format!("{} Class: {path} (Class-Specific)", class.caption),
                    None,
                )?;
            }
        }

        debug!(observables = registry.len(), "Built observable registry");
        Ok(registry)
    }

    /// Extend the `type_id` enum of the `observable` object with every entry
    pub fn publish(&self, objects: &mut IndexMap<Identifier, Object>) {
        let Some(attr) = objects
            .get_mut(names::OBSERVABLE_OBJECT)
            .and_then(|object| object.attributes.get_mut(names::TYPE_ID))
        else {
            return;
        };

        let mut values: BTreeMap<i64, EnumValue> = attr
            .enum_values
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| key.parse::<i64>().ok().map(|id| (id, value)))
            .collect();
        for (type_id, entry) in &self.entries {
            values.insert(
                *type_id,
                EnumValue {
                    caption: entry.caption.clone(),
                    description: entry.description.clone(),
                    deprecated: None,
                },
            );
        }
        attr.enum_values = Some(values.into_iter().map(|(id, v)| (id.to_string(), v)).collect());
    }
}

/// Hidden definitions must not author observables: every concrete
/// descendant would register the same type_id.
pub(crate) fn check_hidden(items: &RawItems, kind: EntityKind) -> Result<()> {
    for (key, item) in items {
        if !key.is_hidden() {
            continue;
        }
        let authored = match kind {
            EntityKind::Class => item
                .get(names::OBSERVABLES)
                .and_then(Value::as_object)
                .is_some_and(|o| !o.is_empty()),
            _ => item.get("observable").is_some_and(|v| !v.is_null()),
        };
        if authored {
            return Err(SchemaError::HiddenObservable {
                kind: kind.as_str(),
                name: key.to_string(),
            });
        }
    }
    Ok(())
}
