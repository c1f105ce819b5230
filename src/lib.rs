//! Event Schemas
//!
//! Compiler and validator for declarative cybersecurity event schemas:
//! categories, a shared attribute dictionary, event classes, reusable
//! objects, profiles and extensions are compiled into one immutable,
//! fully-linked [`Snapshot`], and JSON events are validated against it.
//!
//! ## Features
//!
//! - **Single Inheritance**: `extends` chains with attribute-level deep merge
//! - **Derived Identifiers**: category, class and type uids by arithmetic
//! - **Back-links**: every dictionary attribute knows who uses it
//! - **Profiles**: opt-in attribute bundles, filtered per request
//! - **Observables**: one global, collision-checked type_id namespace
//! - **Hot Reload**: whole-snapshot atomic swap, failed reloads keep serving
//!
//! ## Architecture
//!
//! ```text
//! Loader ──> RawSchema ──> compile() ──> Snapshot ──> SchemaRegistry (ArcSwap)
//!                                                          │
//!                                        event JSON ──> Validator ──> Report
//! ```

pub mod checksum;
pub mod compile;
pub mod config;
pub mod error;
pub mod ident;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod snapshot;
pub mod validate;
pub mod version;

pub use checksum::Checksum;
pub use compile::{compile, CompileWarning, WarningCode};
pub use config::SchemaConfig;
pub use error::{Result, SchemaError};
pub use ident::Identifier;
pub use loader::{DirectoryLoader, Loader, RawSchema, StaticLoader};
pub use registry::SchemaRegistry;
pub use schema::{Attribute, Class, EntityKind, Object, PrimitiveType, Profile, Requirement, SchemaEntity};
pub use snapshot::{Query, Snapshot};
pub use validate::{BundleReport, Issue, IssueKind, Report, Severity, Validator};
pub use version::SchemaVersion;
