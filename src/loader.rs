//! Schema Loading
//!
//! Reads schema source files from a base directory and any number of
//! extension directories, expands `$include` composition and hands the
//! compiler raw, un-linked definition maps.
//!
//! ```text
//! schema/
//! ├── version.json
//! ├── categories.json
//! ├── dictionary.json
//! ├── events/**/*.json
//! ├── objects/**/*.json
//! ├── profiles/**/*.json
//! └── extensions/
//!     └── linux/
//!         ├── extension.json      {"name": "linux", "uid": 1}
//!         ├── dictionary.json
//!         └── objects/...
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compile::merge::{deep_merge, merge_maps, RawMap};
use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::ident::Identifier;
use crate::schema::Extension;

const INCLUDE_KEY: &str = "$include";
const EXTENSION_FILE: &str = "extension.json";

/// Raw dictionary sections
#[derive(Debug, Clone, Default)]
pub struct RawDictionary {
    pub caption: Option<String>,
    pub description: Option<String>,
    pub attributes: IndexMap<Identifier, RawMap>,
    pub types: IndexMap<Identifier, RawMap>,
}

/// Include-expanded, un-linked schema definitions
#[derive(Debug, Clone, Default)]
pub struct RawSchema {
    pub version: Option<String>,
    pub categories: IndexMap<Identifier, RawMap>,
    pub dictionary: RawDictionary,
    pub classes: IndexMap<Identifier, RawMap>,
    pub objects: IndexMap<Identifier, RawMap>,
    pub profiles: IndexMap<Identifier, RawMap>,
    pub extensions: IndexMap<Identifier, Extension>,
}

/// Source of raw schema definitions
pub trait Loader: Send + Sync {
    /// Load the current view of the schema sources, additionally scanning
    /// `extra_extension_paths` for extensions.
    fn load(&self, extra_extension_paths: &[PathBuf]) -> Result<RawSchema>;
}

// =============================================================================
// Static Loader
// =============================================================================

/// Serves a fixed, already-parsed schema
#[derive(Debug, Clone)]
pub struct StaticLoader {
    raw: RawSchema,
}

impl StaticLoader {
    pub fn new(raw: RawSchema) -> Self {
        Self { raw }
    }
}

impl Loader for StaticLoader {
    fn load(&self, extra_extension_paths: &[PathBuf]) -> Result<RawSchema> {
        let mut raw = self.raw.clone();
        for dir in discover_extensions(extra_extension_paths) {
            load_extension(&mut raw, &dir, None)?;
        }
        Ok(raw)
    }
}

// =============================================================================
// Directory Loader
// =============================================================================

/// Loads a schema tree from the filesystem
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    home: PathBuf,
    extension_roots: Vec<PathBuf>,
    scan_default_extensions: bool,
}

impl DirectoryLoader {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            extension_roots: Vec::new(),
            scan_default_extensions: true,
        }
    }

    pub fn from_config(config: &SchemaConfig) -> Self {
        Self {
            home: config.schema_home(),
            extension_roots: config.schema.extensions.clone(),
            scan_default_extensions: config.schema.scan_default_extensions,
        }
    }

    /// Additional directories searched for extensions on every load
    pub fn with_extensions(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extension_roots.extend(roots);
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl Loader for DirectoryLoader {
    fn load(&self, extra_extension_paths: &[PathBuf]) -> Result<RawSchema> {
        let mut raw = RawSchema {
            version: read_version(&self.home)?,
            ..Default::default()
        };

        let core = SourceRoot {
            dir: self.home.clone(),
            extension: None,
        };
        for required in ["categories.json", "dictionary.json"] {
            let path = self.home.join(required);
            if !path.is_file() {
                return Err(SchemaError::MissingFile { path });
            }
        }
        load_root(&mut raw, &core, &self.home)?;

        let mut roots = Vec::new();
        if self.scan_default_extensions {
            roots.push(self.home.join("extensions"));
        }
        roots.extend(self.extension_roots.iter().cloned());
        roots.extend(extra_extension_paths.iter().cloned());

        for dir in discover_extensions(&roots) {
            load_extension(&mut raw, &dir, Some(&self.home))?;
        }

        info!(
            home = %self.home.display(),
            classes = raw.classes.len(),
            objects = raw.objects.len(),
            extensions = raw.extensions.len(),
            "Loaded schema sources"
        );
        Ok(raw)
    }
}

// =============================================================================
// Roots
// =============================================================================

/// A directory contributing definitions, core or extension
struct SourceRoot {
    dir: PathBuf,
    extension: Option<Extension>,
}

impl SourceRoot {
    fn key(&self, name: &str) -> Identifier {
        match &self.extension {
            Some(ext) => Identifier::qualified(ext.name.as_str(), name),
            None => Identifier::new(name),
        }
    }

    fn tag(&self, item: &mut RawMap) {
        if let Some(ext) = &self.extension {
            item.insert("extension".into(), Value::String(ext.name.to_string()));
        }
    }
}

fn read_version(home: &Path) -> Result<Option<String>> {
    let path = home.join("version.json");
    if !path.is_file() {
        return Ok(None);
    }
    let doc = read_json(&path)?;
    Ok(doc.get("version").and_then(Value::as_str).map(String::from))
}

/// Find extension directories below each root (a root may itself be one)
fn discover_extensions(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for root in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "Skipping missing extension root");
            continue;
        }
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_name() != EXTENSION_FILE {
                continue;
            }
            if let Some(dir) = entry.path().parent() {
                let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
                if seen.insert(canonical) {
                    found.push(dir.to_path_buf());
                }
            }
        }
    }
    found
}

fn load_extension(raw: &mut RawSchema, dir: &Path, home: Option<&Path>) -> Result<()> {
    let manifest_path = dir.join(EXTENSION_FILE);
    let mut manifest = match read_json(&manifest_path)? {
        Value::Object(map) => map,
        _ => {
            return Err(SchemaError::Include {
                path: manifest_path,
                message: "extension manifest must be a JSON object".into(),
            })
        }
    };
    if !manifest.contains_key("name") {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        manifest.insert("name".into(), Value::String(dir_name));
    }
    let name = manifest.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let extension: Extension =
        serde_json::from_value(Value::Object(manifest)).map_err(|source| SchemaError::InvalidDefinition {
            kind: "extension",
            name,
            source,
        })?;

    debug!(extension = %extension.name, uid = extension.uid, "Loading extension");
    let root = SourceRoot {
        dir: dir.to_path_buf(),
        extension: Some(extension.clone()),
    };
    load_root(raw, &root, home.unwrap_or(dir))?;
    raw.extensions.insert(extension.name.clone(), extension);
    Ok(())
}

fn load_root(raw: &mut RawSchema, root: &SourceRoot, home: &Path) -> Result<()> {
    let categories_path = root.dir.join("categories.json");
    if categories_path.is_file() {
        let doc = read_expanded(&categories_path, root, home)?;
        for (name, value) in attributes_of(&doc) {
            let mut item = value;
            root.tag(&mut item);
            raw.categories.insert(root.key(&name), item);
        }
    }

    let dictionary_path = root.dir.join("dictionary.json");
    if dictionary_path.is_file() {
        let doc = read_expanded(&dictionary_path, root, home)?;
        if root.extension.is_none() {
            raw.dictionary.caption = doc.get("caption").and_then(Value::as_str).map(String::from);
            raw.dictionary.description = doc.get("description").and_then(Value::as_str).map(String::from);
        }
        for (name, value) in attributes_of(&doc) {
            raw.dictionary.attributes.insert(root.key(&name), value);
        }
        if let Some(types) = doc.get("types") {
            for (name, value) in attributes_of(types) {
                let key = Identifier::new(&name);
                let merged = match raw.dictionary.types.shift_remove(&key) {
                    Some(existing) => merge_maps(existing, value),
                    None => value,
                };
                raw.dictionary.types.insert(key, merged);
            }
        }
    }

    load_items(&root.dir.join("events"), root, home, &mut raw.classes)?;
    load_items(&root.dir.join("objects"), root, home, &mut raw.objects)?;
    load_items(&root.dir.join("profiles"), root, home, &mut raw.profiles)?;
    Ok(())
}

/// Load every `*.json` definition below `dir`, keyed by its `name`
fn load_items(
    dir: &Path,
    root: &SourceRoot,
    home: &Path,
    target: &mut IndexMap<Identifier, RawMap>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let mut item = match read_expanded(path, root, home)? {
            Value::Object(map) => map,
            _ => continue,
        };
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_default();
        let key = root.key(&name);
        root.tag(&mut item);
        tag_sources(&mut item, &key);
        target.insert(key, item);
    }
    Ok(())
}

/// Record which definition contributed each attribute
pub fn tag_sources(item: &mut RawMap, key: &Identifier) {
    if let Some(Value::Object(attributes)) = item.get_mut("attributes") {
        for value in attributes.values_mut() {
            if let Value::Object(attr) = value {
                attr.entry("_source").or_insert_with(|| Value::String(key.to_string()));
            }
        }
    }
}

fn attributes_of(doc: &Value) -> Vec<(String, RawMap)> {
    doc.get("attributes")
        .and_then(Value::as_object)
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|(k, v)| v.as_object().map(|m| (k.clone(), m.clone())))
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// JSON + $include
// =============================================================================

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SchemaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_expanded(path: &Path, root: &SourceRoot, home: &Path) -> Result<Value> {
    let doc = read_json(path)?;
    let mut stack = vec![path.to_path_buf()];
    expand_includes(doc, None, path, &root.dir, home, &mut stack)
}

/// Replace every `$include` with the referenced files' content, merged
/// underneath the including object.
fn expand_includes(
    value: Value,
    parent_key: Option<&str>,
    file: &Path,
    root_dir: &Path,
    home: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut includes = Vec::new();
            let mut own = RawMap::new();
            for (key, child) in map {
                if key == INCLUDE_KEY {
                    match child {
                        Value::String(p) => includes.push(p),
                        Value::Array(items) => {
                            includes.extend(items.into_iter().filter_map(|v| v.as_str().map(String::from)))
                        }
                        other => {
                            return Err(SchemaError::Include {
                                path: file.to_path_buf(),
                                message: format!("expected a path or list of paths, got {other}"),
                            })
                        }
                    }
                    continue;
                }
                let expanded = expand_includes(child, Some(&key), file, root_dir, home, stack)?;
                own.insert(key, expanded);
            }

            let mut base = Value::Object(RawMap::new());
            for include in includes {
                let included = load_include(&include, parent_key, file, root_dir, home, stack)?;
                base = deep_merge(base, included);
            }
            Ok(deep_merge(base, Value::Object(own)))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| expand_includes(item, parent_key, file, root_dir, home, stack))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        scalar => Ok(scalar),
    }
}

fn load_include(
    include: &str,
    parent_key: Option<&str>,
    file: &Path,
    root_dir: &Path,
    home: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<Value> {
    let path = [root_dir.join(include), home.join(include)]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| SchemaError::Include {
            path: file.to_path_buf(),
            message: format!("included file '{include}' not found"),
        })?;

    if stack.contains(&path) {
        return Err(SchemaError::Include {
            path: file.to_path_buf(),
            message: format!("cyclic include of '{}'", path.display()),
        });
    }

    stack.push(path.clone());
    let doc = read_json(&path)?;
    let expanded = expand_includes(doc, None, &path, root_dir, home, stack)?;
    stack.pop();

    // An include inside an attribute map pulls in the file's own attributes.
    if parent_key == Some("attributes") {
        if let Some(attributes) = expanded.get("attributes") {
            return Ok(attributes.clone());
        }
    }
    Ok(expanded)
}
