//! Dictionary Linker
//!
//! Binds class/object attributes to their dictionary entries, resolves each
//! attribute's primitive type, records back-links from the dictionary (and
//! from referenced objects) to every user, and synthesizes `<name>_dt`
//! companions for timestamp attributes.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::compile::inherit::RawItems;
use crate::compile::merge::{deep_merge, RawMap};
use crate::compile::{WarningCode, Warnings};
use crate::ident::Identifier;
use crate::loader::RawDictionary;
use crate::schema::{
    names, Attribute, Attributes, Class, DataType, Definition, Dictionary, Link, LinkGroup, Object, PrimitiveType,
    Profile, Requirement,
};

// =============================================================================
// Raw attribute resolution
// =============================================================================

fn extension_hint<'a>(attr: &'a RawMap, owner: &'a Identifier) -> Option<&'a str> {
    attr.get("_source")
        .and_then(Value::as_str)
        .and_then(|source| source.split_once(crate::ident::EXTENSION_SEPARATOR).map(|(ext, _)| ext))
        .or_else(|| owner.extension())
}

fn lookup_raw<'a>(dictionary: &'a RawDictionary, name: &str, extension: Option<&str>) -> Option<&'a RawMap> {
    if let Some(ext) = extension {
        if let Some(found) = dictionary.attributes.get(Identifier::qualified(ext, name).as_str()) {
            return Some(found);
        }
    }
    dictionary.attributes.get(name)
}

/// Compile every attribute of every item as the dictionary entry with the
/// item's own settings merged over it.
pub(crate) fn resolve_attributes(items: &mut RawItems, dictionary: &RawDictionary, warnings: &mut Warnings) {
    for (key, item) in items.iter_mut() {
        let Some(Value::Object(attributes)) = item.get_mut("attributes") else { continue };

        for (name, value) in attributes.iter_mut() {
            let local = match std::mem::take(value) {
                Value::Object(map) => map,
                _ => RawMap::new(),
            };
            let mut merged = match lookup_raw(dictionary, name, extension_hint(&local, key)) {
                Some(entry) => match deep_merge(Value::Object(entry.clone()), Value::Object(local)) {
                    Value::Object(map) => map,
                    _ => RawMap::new(),
                },
                None => {
                    warnings.push(
                        WarningCode::UndefinedAttribute,
                        format!("{key}.{name}"),
                        format!("attribute '{name}' is not defined in the dictionary"),
                    );
                    local
                }
            };
            if !merged.contains_key("requirement") {
                warnings.push(
                    WarningCode::DefaultedRequirement,
                    format!("{key}.{name}"),
                    "missing requirement, defaulting to optional".to_string(),
                );
                merged.insert("requirement".into(), Value::String("optional".into()));
            }
            *value = Value::Object(merged);
        }
    }
}

// =============================================================================
// Primitive types
// =============================================================================

/// What attribute typing needs to know about objects
pub(crate) struct ObjectIndex {
    captions: HashMap<Identifier, String>,
}

impl ObjectIndex {
    pub(crate) fn new(objects: &IndexMap<Identifier, Object>) -> Self {
        Self {
            captions: objects.iter().map(|(k, o)| (k.clone(), o.caption.clone())).collect(),
        }
    }

    fn find(&self, name: &Identifier, extension: Option<&str>) -> Option<(&Identifier, &String)> {
        self.captions.get_key_value(name).or_else(|| {
            let qualified = name.in_extension(extension?);
            self.captions.get_key_value(&qualified)
        })
    }
}

fn resolve_type(
    owner: &str,
    name: &Identifier,
    attr: &mut Attribute,
    extension: Option<&str>,
    dictionary_types: &IndexMap<Identifier, DataType>,
    objects: &ObjectIndex,
    warnings: &mut Warnings,
) {
    let Some(type_id) = attr.type_id.clone() else { return };

    if type_id.as_str() == names::OBJECT_T {
        let Some(object_type) = attr.object_type.clone() else {
            warnings.push(
                WarningCode::UndefinedObjectType,
                format!("{owner}.{name}"),
                "object_t attribute without object_type".to_string(),
            );
            return;
        };
        match objects.find(&object_type, extension) {
            Some((key, caption)) => {
                attr.object_name = Some(caption.clone());
                attr.primitive = Some(PrimitiveType::Object(key.clone()));
                attr.object_type = Some(key.clone());
            }
            None => warnings.push(
                WarningCode::UndefinedObjectType,
                format!("{owner}.{name}"),
                format!("object type '{object_type}' is not defined"),
            ),
        }
        return;
    }

    let declared = dictionary_types.get(&type_id);
    if let Some(data_type) = declared {
        attr.type_name = Some(data_type.caption.clone());
    }
    attr.primitive = PrimitiveType::from_base(type_id.as_str()).or_else(|| {
        declared
            .and_then(|t| t.supertype.as_ref())
            .and_then(|sup| PrimitiveType::from_base(sup.as_str()))
    });
    if attr.primitive.is_none() {
        warnings.push(
            WarningCode::UndefinedType,
            format!("{owner}.{name}"),
            format!("data type '{type_id}' is not defined"),
        );
    }
}

/// Resolve the primitive type of every attribute of a definition
pub(crate) fn type_attributes<D: Definition>(
    item: &mut D,
    dictionary_types: &IndexMap<Identifier, DataType>,
    objects: &ObjectIndex,
    warnings: &mut Warnings,
) {
    let owner = item.name().to_string();
    let item_extension = item.extension().map(|e| e.to_string());
    for (name, attr) in item.attributes_mut() {
        let extension = attr
            .source
            .as_ref()
            .and_then(|s| s.extension().map(String::from))
            .or_else(|| item_extension.clone());
        resolve_type(&owner, name, attr, extension.as_deref(), dictionary_types, objects, warnings);
    }
}

/// Resolve the primitive type of every dictionary attribute
pub(crate) fn type_dictionary(dictionary: &mut Dictionary, objects: &ObjectIndex, warnings: &mut Warnings) {
    let types = dictionary.types.clone();
    for (name, attr) in dictionary.attributes.iter_mut() {
        let extension = name.extension().map(String::from);
        resolve_type("dictionary", name, attr, extension.as_deref(), &types, objects, warnings);
    }
}

// =============================================================================
// Back-links
// =============================================================================

fn add_link(links: &mut Vec<Link>, link: Link) {
    match links
        .iter_mut()
        .find(|l| l.group == link.group && l.type_id == link.type_id)
    {
        Some(existing) => existing.attribute_keys.extend(link.attribute_keys),
        None => links.push(link),
    }
}

fn collect_links<D: Definition>(
    item: &D,
    group: LinkGroup,
    dictionary: &Dictionary,
    dictionary_links: &mut Vec<(Identifier, Link)>,
    object_links: &mut Vec<(Identifier, Link)>,
) {
    for (name, attr) in item.attributes() {
        let link = Link {
            group,
            type_id: item.name().clone(),
            caption: item.caption().to_string(),
            attribute_keys: [name.clone()].into_iter().collect(),
        };
        let extension = attr
            .source
            .as_ref()
            .and_then(|s| s.extension())
            .or_else(|| item.extension().map(Identifier::as_str));
        if let Some((key, _)) = dictionary.lookup(name, extension) {
            dictionary_links.push((key.clone(), link.clone()));
        }
        if let Some(PrimitiveType::Object(object)) = &attr.primitive {
            object_links.push((object.clone(), link));
        }
    }
}

/// Record on each dictionary attribute and each object every class/object
/// that uses it, one link per `{group, type}`.
pub(crate) fn link_dictionary(
    dictionary: &mut Dictionary,
    classes: &IndexMap<Identifier, Class>,
    objects: &mut IndexMap<Identifier, Object>,
) {
    let mut dictionary_links = Vec::new();
    let mut object_links = Vec::new();

    for class in classes.values() {
        let group = if class.name.as_str() == names::BASE_EVENT {
            LinkGroup::Common
        } else {
            LinkGroup::Class
        };
        collect_links(class, group, dictionary, &mut dictionary_links, &mut object_links);
    }
    for object in objects.values() {
        collect_links(object, LinkGroup::Object, dictionary, &mut dictionary_links, &mut object_links);
    }

    let linked = dictionary_links.len();
    for (key, link) in dictionary_links {
        if let Some(attr) = dictionary.attributes.get_mut(&key) {
            add_link(&mut attr.links, link);
        }
    }
    for (key, link) in object_links {
        if let Some(object) = objects.get_mut(&key) {
            add_link(&mut object.links, link);
        }
    }
    debug!(links = linked, "Linked dictionary");
}

// =============================================================================
// Datetime companions
// =============================================================================

fn is_timestamp(dictionary: &Dictionary, attr: &Attribute) -> bool {
    attr.type_id
        .as_ref()
        .is_some_and(|t| dictionary.is_a(t, names::TIMESTAMP_T))
}

fn datetime_companion(attr: &Attribute, type_name: &str) -> Attribute {
    Attribute {
        caption: attr.caption.clone(),
        description: attr.description.clone(),
        type_id: Some(Identifier::new(names::DATETIME_T)),
        requirement: Some(Requirement::Optional),
        profile: Some(Identifier::new(names::DATETIME_PROFILE)),
        group: attr.group.clone(),
        source: attr.source.clone(),
        type_name: Some(type_name.to_string()),
        primitive: Some(PrimitiveType::String),
        is_array: attr.is_array,
        ..Default::default()
    }
}

fn companions(dictionary: &Dictionary, attributes: &Attributes, type_name: &str) -> Vec<(Identifier, Attribute)> {
    attributes
        .iter()
        .filter(|(_, attr)| is_timestamp(dictionary, attr))
        .map(|(name, attr)| {
            (
                Identifier::new(&format!("{name}{}", names::DATETIME_SUFFIX)),
                datetime_companion(attr, type_name),
            )
        })
        .filter(|(name, _)| !attributes.contains_key(name))
        .collect()
}

/// Add a `<name>_dt` attribute, gated by the `datetime` profile, next to every
/// timestamp attribute.
pub(crate) fn synthesize_datetime(
    dictionary: &mut Dictionary,
    classes: &mut IndexMap<Identifier, Class>,
    objects: &mut IndexMap<Identifier, Object>,
    profiles: &mut IndexMap<Identifier, Profile>,
) {
    let datetime_t = Identifier::new(names::DATETIME_T);
    let type_name = dictionary
        .types
        .entry(datetime_t)
        .or_insert_with(|| DataType {
            caption: "Datetime".into(),
            description: Some("RFC 3339 formatted date and time".into()),
            supertype: Some(Identifier::new("string_t")),
            ..Default::default()
        })
        .caption
        .clone();

    let added = companions(dictionary, &dictionary.attributes, &type_name);
    let mut profile_attrs = Attributes::new();
    for (name, attr) in added {
        profile_attrs.insert(name.clone(), attr.clone());
        dictionary.attributes.insert(name, attr);
    }

    let profile_name = Identifier::new(names::DATETIME_PROFILE);
    let mut synthesized = 0;
    for class in classes.values_mut() {
        let added = companions(dictionary, &class.attributes, &type_name);
        if !added.is_empty() && !class.profiles.contains(&profile_name) {
            class.profiles.push(profile_name.clone());
        }
        synthesized += added.len();
        class.attributes.extend(added);
    }
    for object in objects.values_mut() {
        let added = companions(dictionary, &object.attributes, &type_name);
        if !added.is_empty() && !object.profiles.contains(&profile_name) {
            object.profiles.push(profile_name.clone());
        }
        synthesized += added.len();
        object.attributes.extend(added);
    }

    profiles.entry(profile_name.clone()).or_insert_with(|| Profile {
        name: profile_name,
        caption: "Date/Time".into(),
        description: Some("Adds an RFC 3339 datetime companion to every timestamp attribute.".into()),
        attributes: profile_attrs,
        extension: None,
    });
    debug!(synthesized, "Synthesized datetime attributes");
}
