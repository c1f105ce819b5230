//! Registry publication and reload tests

mod common;

use std::fs;
use std::sync::Arc;

use event_schemas::{DirectoryLoader, SchemaError, SchemaRegistry, StaticLoader};
use serde_json::json;
use tempfile::tempdir;

use common::{copy_tree, fixture_home, load_fixture, network_event};

#[test]
fn test_registry_validates_against_current_snapshot() {
    let registry = SchemaRegistry::new(StaticLoader::new(load_fixture())).unwrap();
    assert!(registry.validate(&network_event()).is_clean());

    let bundle = json!({"events": [network_event()], "count": 1});
    assert!(!registry.validate_bundle(&bundle).has_errors());
}

#[test]
fn test_reload_publishes_new_snapshot() {
    let dir = tempdir().unwrap();
    copy_tree(&fixture_home(), dir.path());
    let registry = SchemaRegistry::new(DirectoryLoader::new(dir.path())).unwrap();
    let before = registry.current();
    assert!(before.class("legacy_activity").is_some());

    fs::remove_file(dir.path().join("events/system/legacy_activity.json")).unwrap();
    let after = registry.reload().unwrap();

    assert!(after.class("legacy_activity").is_none());
    assert!(Arc::ptr_eq(&after, &registry.current()));
    // readers holding the old snapshot are unaffected
    assert!(before.class("legacy_activity").is_some());
}

#[test]
fn test_failed_reload_keeps_previous_snapshot() {
    let dir = tempdir().unwrap();
    copy_tree(&fixture_home(), dir.path());
    let registry = SchemaRegistry::new(DirectoryLoader::new(dir.path())).unwrap();
    let before = registry.current();

    fs::write(
        dir.path().join("objects/device.json"),
        r#"{"name": "device", "caption": "Device", "extends": "_endpoint", "observable": 2}"#,
    )
    .unwrap();
    let err = registry.reload().unwrap_err();
    assert!(matches!(err, SchemaError::ObservableCollision { .. }), "{err}");

    assert!(Arc::ptr_eq(&before, &registry.current()));
    assert!(registry.validate(&network_event()).is_clean());
}

fn beta_extension(root: &std::path::Path) {
    let ext = root.join("beta");
    fs::create_dir_all(ext.join("events")).unwrap();
    fs::write(ext.join("extension.json"), r#"{"name": "beta", "uid": 5}"#).unwrap();
    fs::write(
        ext.join("events/beacon.json"),
        r#"{"name": "beacon", "caption": "Beacon", "extends": "base_event", "category": "network", "uid": 7}"#,
    )
    .unwrap();
}

#[test]
fn test_reload_with_extra_extension() {
    let extra = tempdir().unwrap();
    beta_extension(extra.path());

    let registry = SchemaRegistry::new(StaticLoader::new(load_fixture())).unwrap();
    assert!(registry.current().class("beta/beacon").is_none());

    let snapshot = registry.reload_with(&[extra.path().to_path_buf()]).unwrap();
    let beacon = snapshot.class("beta/beacon").unwrap();
    // core category, extension class: the class's extension prefixes the uid
    assert_eq!(beacon.uid, 504007);
    assert_eq!(snapshot.class_by_uid(504007).map(|c| c.name.as_str()), Some("beta/beacon"));
}

#[test]
fn test_plain_reload_keeps_extra_extension_roots() {
    let extra = tempdir().unwrap();
    beta_extension(extra.path());
    let dir = tempdir().unwrap();
    copy_tree(&fixture_home(), dir.path());

    let registry = SchemaRegistry::new(DirectoryLoader::new(dir.path())).unwrap();
    assert!(registry.extra_extension_paths().is_empty());
    registry.reload_with(&[extra.path().to_path_buf()]).unwrap();
    assert_eq!(registry.extra_extension_paths(), vec![extra.path().to_path_buf()]);

    fs::remove_file(dir.path().join("events/system/legacy_activity.json")).unwrap();
    let snapshot = registry.reload().unwrap();
    assert!(snapshot.class("legacy_activity").is_none());
    assert!(snapshot.class("beta/beacon").is_some());

    let snapshot = registry.reload_with(&[]).unwrap();
    assert!(snapshot.class("beta/beacon").is_none());
    assert!(registry.extra_extension_paths().is_empty());
}

#[test]
fn test_failed_reload_keeps_extra_extension_roots() {
    let extra = tempdir().unwrap();
    beta_extension(extra.path());
    let dir = tempdir().unwrap();
    copy_tree(&fixture_home(), dir.path());

    let registry = SchemaRegistry::new(DirectoryLoader::new(dir.path())).unwrap();
    registry.reload_with(&[extra.path().to_path_buf()]).unwrap();

    fs::remove_file(dir.path().join("dictionary.json")).unwrap();
    let err = registry.reload_with(&[]).unwrap_err();
    assert!(!err.is_authoring_error(), "{err}");
    assert_eq!(registry.extra_extension_paths(), vec![extra.path().to_path_buf()]);
    assert!(registry.current().class("beta/beacon").is_some());
}
