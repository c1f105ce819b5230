//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use event_schemas::{compile, DirectoryLoader, Loader, RawSchema, Snapshot};
use serde_json::{json, Value};

/// The schema tree under `tests/fixtures/schema`
pub fn fixture_home() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/schema")
}

pub fn load_fixture() -> RawSchema {
    DirectoryLoader::new(fixture_home()).load(&[]).unwrap()
}

pub fn compile_fixture() -> Snapshot {
    compile(load_fixture()).unwrap()
}

/// A `network_activity` event that validates cleanly
pub fn network_event() -> Value {
    json!({
        "class_uid": 4001,
        "category_uid": 4,
        "activity_id": 1,
        "activity_name": "Open",
        "type_uid": 400101,
        "severity_id": 1,
        "severity": "Informational",
        "time": 1_700_000_000_000_i64,
        "metadata": {"version": "1.2.0", "uid": "evt-1"},
        "src_endpoint": {"ip": "10.0.0.1", "port": 443}
    })
}

/// Copy a directory tree
pub fn copy_tree(from: &Path, to: &Path) {
    for entry in walkdir::WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let relative = entry.path().strip_prefix(from).unwrap();
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}
