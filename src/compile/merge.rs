//! Merge Engine
//!
//! Generic structural merge over raw JSON definitions. Right wins, maps merge
//! recursively, and an empty map on either side yields the other side
//! unchanged. Top-level fields of a class or object are merged according to an
//! explicit [`MergePolicy`] table instead of ad hoc special cases.

use serde_json::{Map, Value};

/// Raw, un-typed definition map
pub type RawMap = Map<String, Value>;

/// Merge `right` over `left`
pub fn deep_merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => Value::Object(merge_maps(l, r)),
        (left, Value::Object(r)) if r.is_empty() => left,
        (_, right) => right,
    }
}

/// Merge map `right` over map `left`, keeping `left`'s key order
pub fn merge_maps(mut left: RawMap, right: RawMap) -> RawMap {
    if right.is_empty() {
        return left;
    }
    if left.is_empty() {
        return right;
    }
    for (key, value) in right {
        match left.get_mut(&key) {
            Some(existing) => {
                let current = std::mem::take(existing);
                *existing = deep_merge(current, value);
            }
            None => {
                left.insert(key, value);
            }
        }
    }
    left
}

// =============================================================================
// Field Policies
// =============================================================================

/// How one top-level field combines between a base and a child definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Child value if present, base value otherwise
    Replace,
    /// Recursive [`deep_merge`] of base and child
    DeepMerge,
    /// Base list followed by child entries not already present
    ConcatUnique,
    /// Only the child's own value survives
    NotInherited,
    /// Only the base's value survives
    KeepBase,
}

/// Per-field merge policy table
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy {
    fields: &'static [(&'static str, FieldPolicy)],
    default: FieldPolicy,
}

/// Policy for inheriting between classes
pub const CLASS_POLICY: MergePolicy = MergePolicy {
    fields: &[
        ("attributes", FieldPolicy::DeepMerge),
        ("observables", FieldPolicy::DeepMerge),
        ("profiles", FieldPolicy::ConcatUnique),
        ("@deprecated", FieldPolicy::NotInherited),
        ("_parent_observables", FieldPolicy::NotInherited),
    ],
    default: FieldPolicy::Replace,
};

/// Policy for inheriting between objects
pub const OBJECT_POLICY: MergePolicy = MergePolicy {
    fields: &[
        ("attributes", FieldPolicy::DeepMerge),
        ("profiles", FieldPolicy::ConcatUnique),
        ("@deprecated", FieldPolicy::NotInherited),
        ("_observable_inherited", FieldPolicy::NotInherited),
    ],
    default: FieldPolicy::Replace,
};

/// Policy for an extension re-opening a core definition: the base keeps its
/// identity, only the patch's attributes and profiles are folded in.
pub const PATCH_POLICY: MergePolicy = MergePolicy {
    fields: &[
        ("attributes", FieldPolicy::DeepMerge),
        ("profiles", FieldPolicy::ConcatUnique),
    ],
    default: FieldPolicy::KeepBase,
};

impl MergePolicy {
    pub fn policy_for(&self, field: &str) -> FieldPolicy {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map_or(self.default, |(_, policy)| *policy)
    }

    /// Merge `child` over `base` field by field
    pub fn merge(&self, base: &RawMap, child: RawMap) -> RawMap {
        let mut merged = RawMap::new();

        for (field, base_value) in base {
            let policy = self.policy_for(field);
            let value = match (policy, child.get(field)) {
                (FieldPolicy::NotInherited, _) => continue,
                (FieldPolicy::KeepBase, _) => base_value.clone(),
                (FieldPolicy::Replace, Some(own)) => own.clone(),
                (FieldPolicy::Replace, None) => base_value.clone(),
                (FieldPolicy::DeepMerge, Some(own)) => deep_merge(base_value.clone(), own.clone()),
                (FieldPolicy::DeepMerge, None) => base_value.clone(),
                (FieldPolicy::ConcatUnique, own) => concat_unique(base_value, own),
            };
            merged.insert(field.clone(), value);
        }

        for (field, value) in child {
            if merged.contains_key(&field) || self.policy_for(&field) == FieldPolicy::KeepBase {
                continue;
            }
            merged.insert(field, value);
        }
        merged
    }
}

fn concat_unique(base: &Value, child: Option<&Value>) -> Value {
    let mut items: Vec<Value> = base.as_array().cloned().unwrap_or_default();
    if let Some(Value::Array(own)) = child {
        for item in own {
            if !items.contains(item) {
                items.push(item.clone());
            }
        }
    }
    Value::Array(items)
}
