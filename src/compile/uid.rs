//! Identifier Deriver
//!
//! `category_uid = extension_uid * 100 + category_id` (extension categories
//! only), `class_uid = category_uid * 1000 + class_id`,
//! `type_uid = class_uid * 100 + activity_id`.

use std::collections::HashMap;
use std::ops::Range;

use indexmap::IndexMap;
use tracing::debug;

use crate::compile::{WarningCode, Warnings};
use crate::error::{Result, SchemaError};
use crate::ident::Identifier;
use crate::schema::{names, Category, Class, EnumMap, EnumValue, Extension};

const CATEGORY_IDS: Range<i64> = 0..100;
const CLASS_IDS: Range<i64> = 0..1000;
const ACTIVITY_IDS: Range<i64> = -1..100;

const UNKNOWN_ID: i64 = 0;

fn check_range(kind: &'static str, name: &str, id: i64, range: Range<i64>) -> Result<i64> {
    if range.contains(&id) {
        Ok(id)
    } else {
        Err(SchemaError::InvalidUid {
            kind,
            name: name.to_string(),
            message: format!("id {id} is outside {}..{}", range.start, range.end),
        })
    }
}

fn overflow(kind: &'static str, name: &str) -> SchemaError {
    SchemaError::InvalidUid {
        kind,
        name: name.to_string(),
        message: "uid arithmetic overflows".to_string(),
    }
}

/// Prefix an id with an extension uid
pub fn category_uid(extension_uid: Option<i64>, category_id: i64) -> Option<i64> {
    match extension_uid {
        Some(ext) => ext.checked_mul(100)?.checked_add(category_id),
        None => Some(category_id),
    }
}

pub fn class_uid(category_uid: i64, class_id: i64) -> Option<i64> {
    category_uid.checked_mul(1000)?.checked_add(class_id)
}

pub fn type_uid(class_uid: i64, activity_id: i64) -> Option<i64> {
    class_uid.checked_mul(100)?.checked_add(activity_id)
}

fn extension_uid(
    extensions: &IndexMap<Identifier, Extension>,
    extension: Option<&Identifier>,
    kind: &'static str,
    name: &Identifier,
) -> Result<Option<i64>> {
    match extension {
        None => Ok(None),
        Some(ext) => extensions
            .get(ext)
            .map(|e| Some(e.uid))
            .ok_or_else(|| SchemaError::InvalidUid {
                kind,
                name: name.to_string(),
                message: format!("unknown extension '{ext}'"),
            }),
    }
}

/// Derive category uids, class uids and the per-class uid enums
pub(crate) fn derive(
    categories: &mut IndexMap<Identifier, Category>,
    classes: &mut IndexMap<Identifier, Class>,
    extensions: &IndexMap<Identifier, Extension>,
    warnings: &mut Warnings,
) -> Result<()> {
    let mut category_ids = HashMap::new();
    for (key, category) in categories.iter_mut() {
        let id = check_range("category", key.as_str(), category.uid, CATEGORY_IDS)?;
        let ext_uid = extension_uid(extensions, category.extension.as_ref(), "category", key)?;
        category.uid = category_uid(ext_uid, id).ok_or_else(|| overflow("category", key.as_str()))?;
        category_ids.insert(key.clone(), id);
    }

    let mut seen: HashMap<i64, Identifier> = HashMap::new();
    for (key, class) in classes.iter_mut() {
        if key.as_str() == names::BASE_EVENT {
            class.uid = 0;
            let caption = class.caption.clone();
            set_enum(class, names::CLASS_UID, [(0, caption)]);
            set_type_uids(class, key, 0, true)?;
        } else {
            derive_class(key, class, categories, &category_ids, extensions, warnings)?;
        }

        if let Some(first) = seen.insert(class.uid, key.clone()) {
            return Err(SchemaError::DuplicateClassUid {
                uid: class.uid,
                first: first.to_string(),
                second: key.to_string(),
            });
        }
    }

    debug!(categories = categories.len(), classes = classes.len(), "Derived uids");
    Ok(())
}

fn derive_class(
    key: &Identifier,
    class: &mut Class,
    categories: &IndexMap<Identifier, Category>,
    category_ids: &HashMap<Identifier, i64>,
    extensions: &IndexMap<Identifier, Extension>,
    warnings: &mut Warnings,
) -> Result<()> {
    let class_id = check_range("class", key.as_str(), class.uid, CLASS_IDS)?;

    let Some(category_name) = class.category.clone() else {
        warnings.push(WarningCode::MissingCategory, key.as_str(), "class has no category");
        class.uid = class_uid(0, class_id).ok_or_else(|| overflow("class", key.as_str()))?;
        let entry = (class.uid, class.caption.clone());
        set_enum(class, names::CLASS_UID, [entry]);
        let uid = class.uid;
        return set_type_uids(class, key, uid, false);
    };

    let found = categories.get_key_value(&category_name).or_else(|| {
        let ext = class.extension.as_ref()?;
        categories.get_key_value(&category_name.in_extension(ext.as_str()))
    });
    let Some((category_key, category)) = found else {
        return Err(SchemaError::UnknownCategory {
            class: key.to_string(),
            category: category_name.to_string(),
        });
    };

    let category_id = category_ids.get(category_key).copied().unwrap_or(category.uid);
    let prefix_extension = class.extension.as_ref().or(category.extension.as_ref());
    let ext_uid = extension_uid(extensions, prefix_extension, "class", key)?;
    let prefix = category_uid(ext_uid, category_id).ok_or_else(|| overflow("class", key.as_str()))?;

    class.uid = class_uid(prefix, class_id).ok_or_else(|| overflow("class", key.as_str()))?;
    class.category = Some(category_key.clone());
    class.category_name = Some(category.caption.clone());

    let entry = (class.uid, class.caption.clone());
    set_enum(class, names::CLASS_UID, [entry]);
    set_enum(class, names::CATEGORY_UID, [(category.uid, category.caption.clone())]);
    let uid = class.uid;
    set_type_uids(class, key, uid, false)
}

fn set_enum(class: &mut Class, attribute: &str, values: impl IntoIterator<Item = (i64, String)>) {
    if let Some(attr) = class.attributes.get_mut(attribute) {
        attr.enum_values = Some(
            values
                .into_iter()
                .map(|(uid, caption)| (uid.to_string(), EnumValue::new(caption)))
                .collect(),
        );
    }
}

/// Combine the class uid with every activity (or disposition) value
fn set_type_uids(class: &mut Class, key: &Identifier, class_uid: i64, base_event: bool) -> Result<()> {
    if !class.attributes.contains_key(names::TYPE_UID) {
        return Ok(());
    }

    let mut type_uids = EnumMap::new();
    if !base_event {
        let activities = class
            .attributes
            .get(names::ACTIVITY_ID)
            .or_else(|| class.attributes.get(names::DISPOSITION_ID))
            .and_then(|attr| attr.enum_values.clone())
            .unwrap_or_default();

        for (value, activity) in &activities {
            let id: i64 = value.parse().map_err(|_| SchemaError::InvalidUid {
                kind: "activity",
                name: format!("{key}.{value}"),
                message: "enum key is not an integer".to_string(),
            })?;
            let id = check_range("activity", &format!("{key}.{value}"), id, ACTIVITY_IDS)?;
            let uid = type_uid(class_uid, id).ok_or_else(|| overflow("class", key.as_str()))?;
            let mut entry = activity.clone();
            entry.caption = format!("{}: {}", class.caption, activity.caption);
            type_uids.insert(uid.to_string(), entry);
        }
    }

    for (id, caption) in [(UNKNOWN_ID, "Unknown"), (names::OTHER_ENUM_VALUE, "Other")] {
        let uid = type_uid(class_uid, id).ok_or_else(|| overflow("class", key.as_str()))?;
        type_uids
            .entry(uid.to_string())
            .or_insert_with(|| EnumValue::new(format!("{}: {caption}", class.caption)));
    }

    if let Some(attr) = class.attributes.get_mut(names::TYPE_UID) {
        attr.enum_values = Some(type_uids);
    }
    Ok(())
}
