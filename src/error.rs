//! Error types for the schema compiler
//!
//! Every variant except the loader and config ones is a fatal schema-authoring
//! error: it aborts the compile (and therefore the reload) as a whole.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema compiler errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Required schema file missing: {path}")]
    MissingFile { path: PathBuf },

    #[error("Invalid $include in {path}: {message}")]
    Include { path: PathBuf, message: String },

    #[error("{kind} '{name}' extends undefined {kind} '{extends}'")]
    UndefinedExtends {
        kind: &'static str,
        name: String,
        extends: String,
    },

    #[error("Inheritance cycle between {kind}s: {}", names.join(" -> "))]
    ExtendsCycle { kind: &'static str, names: Vec<String> },

    #[error("Class '{class}' refers to undefined category '{category}'")]
    UnknownCategory { class: String, category: String },

    #[error("Invalid uid for {kind} '{name}': {message}")]
    InvalidUid {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("Duplicate class uid {uid}: '{first}' and '{second}'")]
    DuplicateClassUid { uid: i64, first: String, second: String },

    #[error("Observable type_id {type_id} collision: '{new}' conflicts with '{existing}'")]
    ObservableCollision {
        type_id: i64,
        existing: String,
        new: String,
    },

    #[error("Hidden {kind} '{name}' must not define observables; every concrete extension would collide")]
    HiddenObservable { kind: &'static str, name: String },

    #[error("Enum value {key} of '{attribute}' is defined twice while patching '{item}'")]
    EnumCollision {
        item: String,
        attribute: String,
        key: String,
    },

    #[error("Invalid {kind} definition '{name}': {source}")]
    InvalidDefinition {
        kind: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    /// Whether the error stems from the schema sources themselves rather than
    /// from reading them.
    pub fn is_authoring_error(&self) -> bool {
        !matches!(
            self,
            SchemaError::Io { .. }
                | SchemaError::Parse { .. }
                | SchemaError::MissingFile { .. }
                | SchemaError::Json(_)
                | SchemaError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authoring_errors() {
        let collision = SchemaError::ObservableCollision {
            type_id: 2,
            existing: "ip_t".into(),
            new: "device".into(),
        };
        assert!(collision.is_authoring_error());

        let missing = SchemaError::MissingFile { path: PathBuf::from("version.json") };
        assert!(!missing.is_authoring_error());
    }
}
