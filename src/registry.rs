//! Schema Registry
//!
//! Owns the one published [`Snapshot`]. A reload compiles a brand-new
//! snapshot off to the side and publishes it with a single atomic swap;
//! readers holding the previous snapshot finish against it undisturbed.
//! A reload that fails leaves the previous snapshot published.
//!
//! Extra extension roots given to [`SchemaRegistry::reload_with`] are
//! remembered, so a later plain [`SchemaRegistry::reload`] scans them again.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::checksum::Checksum;
use crate::compile::compile;
use crate::error::Result;
use crate::loader::Loader;
use crate::snapshot::Snapshot;
use crate::validate::{BundleReport, Report, Validator};

/// The live schema
pub struct SchemaRegistry<L: Loader> {
    loader: L,
    snapshot: ArcSwap<Snapshot>,
    /// Extension roots of the last successful `reload_with`
    extra_extension_paths: Mutex<Vec<PathBuf>>,
}

impl<L: Loader> SchemaRegistry<L> {
    /// Compile the loader's current sources and publish them
    pub fn new(loader: L) -> Result<Self> {
        let snapshot = Self::build(&loader, &[])?;
        Ok(Self {
            loader,
            snapshot: ArcSwap::from_pointee(snapshot),
            extra_extension_paths: Mutex::new(Vec::new()),
        })
    }

    /// The currently published snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Extension roots the next plain [`reload`](Self::reload) scans
    pub fn extra_extension_paths(&self) -> Vec<PathBuf> {
        self.extra_extension_paths.lock().clone()
    }

    /// Recompile from the loader, with the remembered extra extension roots,
    /// and publish the result
    pub fn reload(&self) -> Result<Arc<Snapshot>> {
        let extra = self.extra_extension_paths();
        self.reload_with(&extra)
    }

    /// Recompile, additionally scanning `extra_extension_paths`. On success
    /// the paths replace the remembered ones; pass `&[]` to forget them.
    pub fn reload_with(&self, extra_extension_paths: &[PathBuf]) -> Result<Arc<Snapshot>> {
        match Self::build(&self.loader, extra_extension_paths) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot.store(snapshot.clone());
                *self.extra_extension_paths.lock() = extra_extension_paths.to_vec();
                info!(classes = snapshot.classes().len(), "Published reloaded schema");
                Ok(snapshot)
            }
            Err(e) if e.is_authoring_error() => {
                error!(error = %e, "Schema sources are invalid; keeping the previous snapshot");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Could not read schema sources; keeping the previous snapshot");
                Err(e)
            }
        }
    }

    /// Validate one event against the current snapshot
    pub fn validate(&self, event: &Value) -> Report {
        let snapshot = self.snapshot.load();
        Validator::new(&snapshot).validate(event)
    }

    /// Validate a bundle against the current snapshot
    pub fn validate_bundle(&self, bundle: &Value) -> BundleReport {
        let snapshot = self.snapshot.load();
        Validator::new(&snapshot).validate_bundle(bundle)
    }

    fn build(loader: &L, extra_extension_paths: &[PathBuf]) -> Result<Snapshot> {
        let raw = loader.load(extra_extension_paths)?;
        let snapshot = compile(raw)?;
        let checksum = Checksum::of_snapshot(&snapshot)?;
        info!(checksum = checksum.short(), "Schema compiled");
        Ok(snapshot)
    }
}
