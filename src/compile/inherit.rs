//! Inheritance Resolver
//!
//! Resolves `extends` chains over raw class/object maps. Bases are merged
//! before their children by walking a petgraph dependency graph in
//! topological order, so arbitrarily deep hierarchies resolve in one pass.

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use tracing::debug;

use crate::compile::merge::{MergePolicy, RawMap, CLASS_POLICY, OBJECT_POLICY, PATCH_POLICY};
use crate::error::{Result, SchemaError};
use crate::ident::Identifier;
use crate::schema::EntityKind;

pub(crate) type RawItems = IndexMap<Identifier, RawMap>;

const PARENT_OBSERVABLES: &str = "_parent_observables";
const OBSERVABLE_INHERITED: &str = "_observable_inherited";

fn policy(kind: EntityKind) -> MergePolicy {
    match kind {
        EntityKind::Class => CLASS_POLICY,
        _ => OBJECT_POLICY,
    }
}

fn extends_of(item: &RawMap) -> Option<&str> {
    item.get("extends").and_then(Value::as_str)
}

// =============================================================================
// Extension patches
// =============================================================================

/// Fold every extension item that re-opens a core definition of the same
/// local name into that definition. The patch item itself disappears; the
/// core item keeps its key, caption and uid.
pub fn apply_patches(items: &mut RawItems, kind: EntityKind) -> Result<()> {
    let patches: Vec<(Identifier, Identifier)> = items
        .iter()
        .filter_map(|(key, item)| {
            key.extension()?;
            let target = Identifier::new(key.local_name());
            let reopens = extends_of(item) == Some(key.local_name()) && items.contains_key(&target);
            reopens.then(|| (key.clone(), target))
        })
        .collect();

    for (patch_key, target) in patches {
        let Some(patch) = items.shift_remove(&patch_key) else { continue };
        let Some(base) = items.get(&target) else { continue };

        check_enum_collisions(base, &patch, &target)?;
        let merged = PATCH_POLICY.merge(base, patch);
        debug!(%kind, patch = %patch_key, target = %target, "Applied extension patch");
        items.insert(target, merged);
    }
    Ok(())
}

/// A patch may add enum values but never redefine an existing one
fn check_enum_collisions(base: &RawMap, patch: &RawMap, target: &Identifier) -> Result<()> {
    let (Some(Value::Object(base_attrs)), Some(Value::Object(patch_attrs))) =
        (base.get("attributes"), patch.get("attributes"))
    else {
        return Ok(());
    };

    for (name, patch_attr) in patch_attrs {
        let base_enum = base_attrs.get(name).and_then(|a| a.get("enum")).and_then(Value::as_object);
        let patch_enum = patch_attr.get("enum").and_then(Value::as_object);
        if let (Some(base_enum), Some(patch_enum)) = (base_enum, patch_enum) {
            if let Some(key) = patch_enum.keys().find(|k| base_enum.contains_key(*k)) {
                return Err(SchemaError::EnumCollision {
                    item: target.to_string(),
                    attribute: name.clone(),
                    key: key.clone(),
                });
            }
        }
    }
    Ok(())
}

// =============================================================================
// Extends resolution
// =============================================================================

/// Find the base an item extends: the literal name first, then the name
/// qualified with the child's own extension.
fn base_key(items: &RawItems, child: &Identifier, extends: &str) -> Option<Identifier> {
    let literal = Identifier::new(extends);
    if items.contains_key(&literal) {
        return Some(literal);
    }
    let qualified = Identifier::qualified(child.extension()?, extends);
    items.contains_key(&qualified).then_some(qualified)
}

/// Resolve every `extends` chain, returning items in their original order
/// with base content merged underneath.
pub fn resolve(mut items: RawItems, kind: EntityKind) -> Result<RawItems> {
    let mut graph: DiGraph<Identifier, ()> = DiGraph::new();
    let nodes: IndexMap<Identifier, NodeIndex> = items
        .keys()
        .map(|key| (key.clone(), graph.add_node(key.clone())))
        .collect();

    let mut bases: IndexMap<Identifier, Identifier> = IndexMap::new();
    for (key, item) in &items {
        let Some(extends) = extends_of(item) else { continue };
        let base = base_key(&items, key, extends).ok_or_else(|| SchemaError::UndefinedExtends {
            kind: kind.as_str(),
            name: key.to_string(),
            extends: extends.to_string(),
        })?;
        graph.add_edge(nodes[&base], nodes[key], ());
        bases.insert(key.clone(), base);
    }

    let order = toposort(&graph, None).map_err(|cycle| SchemaError::ExtendsCycle {
        kind: kind.as_str(),
        names: cycle_names(&bases, &graph[cycle.node_id()]),
    })?;

    let policy = policy(kind);
    for node in order {
        let key = &graph[node];
        let Some(base) = bases.get(key) else { continue };
        let (Some(base_item), Some(child)) = (items.get(base).cloned(), items.get(key).cloned()) else {
            continue;
        };
        let merged = inherit(&policy, kind, &base_item, child);
        items.insert(key.clone(), merged);
    }

    debug!(%kind, count = items.len(), extending = bases.len(), "Resolved inheritance");
    Ok(items)
}

fn inherit(policy: &MergePolicy, kind: EntityKind, base: &RawMap, mut child: RawMap) -> RawMap {
    match kind {
        EntityKind::Class => {
            let parent = base.get("observables").cloned().unwrap_or_else(|| Value::Object(RawMap::new()));
            child.insert(PARENT_OBSERVABLES.into(), parent);
        }
        _ => {
            if !child.contains_key("observable") && base.contains_key("observable") {
                child.insert(OBSERVABLE_INHERITED.into(), Value::Bool(true));
            }
        }
    }
    policy.merge(base, child)
}

fn cycle_names(bases: &IndexMap<Identifier, Identifier>, start: &Identifier) -> Vec<String> {
    let mut names = vec![start.to_string()];
    let mut current = start;
    while let Some(base) = bases.get(current) {
        if base == start || names.len() > bases.len() {
            names.push(base.to_string());
            break;
        }
        names.push(base.to_string());
        current = base;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(entries: Value) -> RawItems {
        entries
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (Identifier::new(k), v.as_object().unwrap().clone()))
            .collect()
    }

    #[test]
    fn test_child_inherits_and_overrides() {
        let resolved = resolve(
            items(json!({
                "child": {"extends": "base", "attributes": {"ip": {"requirement": "required"}}},
                "base": {"caption": "Base", "attributes": {"ip": {"requirement": "optional", "group": "primary"}, "port": {}}}
            })),
            EntityKind::Object,
        )
        .unwrap();

        let child = &resolved["child"];
        assert_eq!(child["caption"], json!("Base"));
        assert_eq!(child["attributes"]["ip"], json!({"requirement": "required", "group": "primary"}));
        assert!(child["attributes"].get("port").is_some());
    }

    #[test]
    fn test_chains_resolve_base_first() {
        let resolved = resolve(
            items(json!({
                "c": {"extends": "b", "attributes": {"z": {}}},
                "b": {"extends": "a", "attributes": {"y": {}}},
                "a": {"attributes": {"x": {}}}
            })),
            EntityKind::Object,
        )
        .unwrap();
        let keys: Vec<_> = resolved["c"]["attributes"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_undefined_base_is_fatal() {
        let err = resolve(items(json!({"child": {"extends": "nowhere"}})), EntityKind::Class).unwrap_err();
        assert!(matches!(err, SchemaError::UndefinedExtends { .. }));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let err = resolve(
            items(json!({"a": {"extends": "b"}, "b": {"extends": "a"}})),
            EntityKind::Object,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::ExtendsCycle { .. }));
    }

    #[test]
    fn test_extension_qualified_fallback() {
        let resolved = resolve(
            items(json!({
                "ext/child": {"extends": "local_base"},
                "ext/local_base": {"caption": "Local"}
            })),
            EntityKind::Object,
        )
        .unwrap();
        assert_eq!(resolved["ext/child"]["caption"], json!("Local"));
    }

    #[test]
    fn test_parent_observables_recorded() {
        let resolved = resolve(
            items(json!({
                "base": {"observables": {"actor.user": 21}},
                "child": {"extends": "base", "observables": {"device.ip": 2}}
            })),
            EntityKind::Class,
        )
        .unwrap();
        let child = &resolved["child"];
        assert_eq!(child["_parent_observables"], json!({"actor.user": 21}));
        assert_eq!(child["observables"], json!({"actor.user": 21, "device.ip": 2}));
        assert!(resolved["base"].get("_parent_observables").is_none());
    }

    #[test]
    fn test_observable_marker_inheritance() {
        let resolved = resolve(
            items(json!({
                "endpoint": {"observable": 20},
                "device": {"extends": "endpoint"},
                "host": {"extends": "endpoint", "observable": 30}
            })),
            EntityKind::Object,
        )
        .unwrap();
        assert_eq!(resolved["device"]["observable"], json!(20));
        assert_eq!(resolved["device"]["_observable_inherited"], json!(true));
        assert_eq!(resolved["host"]["observable"], json!(30));
        assert!(resolved["host"].get("_observable_inherited").is_none());
    }

    #[test]
    fn test_patch_keeps_core_identity() {
        let mut raw = items(json!({
            "process": {"caption": "Process", "attributes": {"pid": {}}},
            "linux/process": {"extends": "process", "caption": "Ignored", "attributes": {"auid": {}}}
        }));
        apply_patches(&mut raw, EntityKind::Object).unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(raw["process"]["caption"], json!("Process"));
        assert!(raw["process"]["attributes"].get("auid").is_some());
    }

    #[test]
    fn test_patch_enum_collision() {
        let mut raw = items(json!({
            "file": {"attributes": {"type_id": {"enum": {"1": {"caption": "Regular"}}}}},
            "ext/file": {"extends": "file", "attributes": {"type_id": {"enum": {"1": {"caption": "Clash"}}}}}
        }));
        let err = apply_patches(&mut raw, EntityKind::Object).unwrap_err();
        assert!(matches!(err, SchemaError::EnumCollision { .. }));
    }
}
