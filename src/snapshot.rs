//! Schema Snapshot
//!
//! One complete, immutable compile result and the query surface over it.
//! A snapshot is never mutated after [`compile`](crate::compile::compile)
//! returns it, so any number of readers may share it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::Serialize;

use crate::compile::profile::apply_profiles;
use crate::compile::CompileWarning;
use crate::ident::Identifier;
use crate::schema::{
    names, Attributes, Category, Class, Dictionary, EntityKind, Extension, Object, ObservableType, Profile,
    ProfileSet, SchemaEntity,
};
use crate::version::SchemaVersion;

/// A compiled schema
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub(crate) version: Option<SchemaVersion>,
    pub(crate) extensions: IndexMap<Identifier, Extension>,
    pub(crate) profiles: IndexMap<Identifier, Profile>,
    pub(crate) categories: IndexMap<Identifier, Category>,
    pub(crate) dictionary: Dictionary,
    pub(crate) classes: IndexMap<Identifier, Class>,
    pub(crate) objects: IndexMap<Identifier, Object>,
    pub(crate) observables: BTreeMap<i64, ObservableType>,
    #[serde(skip)]
    pub(crate) warnings: Vec<CompileWarning>,
    #[serde(skip)]
    pub(crate) classes_by_uid: HashMap<i64, Identifier>,
}

/// Optional profile and extension filters applied to published entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// `None` returns attributes unfiltered
    pub profiles: Option<ProfileSet>,
    /// `None` admits every extension; core entities are always admitted
    pub extensions: Option<BTreeSet<Identifier>>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.profiles = Some(
            profiles
                .into_iter()
                .filter_map(|p| Identifier::lookup(p.as_ref()))
                .collect(),
        );
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = Some(
            extensions
                .into_iter()
                .filter_map(|e| Identifier::lookup(e.as_ref()))
                .collect(),
        );
        self
    }

    /// Whether an entity owned by `extension` is part of the view
    pub fn admits(&self, extension: Option<&Identifier>) -> bool {
        match (&self.extensions, extension) {
            (Some(allowed), Some(ext)) => allowed.contains(ext),
            _ => true,
        }
    }

    /// Apply the profile filter and drop attributes contributed by
    /// extensions outside the view.
    pub fn attributes(&self, attributes: &Attributes) -> Attributes {
        let visible = match &self.profiles {
            Some(profiles) => apply_profiles(attributes, profiles),
            None => attributes.clone(),
        };
        if self.extensions.is_none() {
            return visible;
        }
        visible
            .into_iter()
            .filter(|(_, attr)| {
                let source_ext = attr.source.as_ref().and_then(Identifier::extension).map(Identifier::new);
                self.admits(source_ext.as_ref())
            })
            .collect()
    }
}

impl Snapshot {
    pub(crate) fn indexed(mut self) -> Self {
        self.classes_by_uid = self
            .classes
            .iter()
            .map(|(key, class)| (class.uid, key.clone()))
            .collect();
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn version(&self) -> Option<&SchemaVersion> {
        self.version.as_ref()
    }

    pub fn extensions(&self) -> &IndexMap<Identifier, Extension> {
        &self.extensions
    }

    pub fn profiles(&self) -> &IndexMap<Identifier, Profile> {
        &self.profiles
    }

    pub fn categories(&self) -> &IndexMap<Identifier, Category> {
        &self.categories
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn classes(&self) -> &IndexMap<Identifier, Class> {
        &self.classes
    }

    pub fn objects(&self) -> &IndexMap<Identifier, Object> {
        &self.objects
    }

    /// The observable type registry
    pub fn observables(&self) -> &BTreeMap<i64, ObservableType> {
        &self.observables
    }

    /// Soft problems found while compiling
    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.get(name)
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    pub fn class_by_uid(&self, uid: i64) -> Option<&Class> {
        self.classes_by_uid.get(&uid).and_then(|key| self.classes.get(key))
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// The common ancestor of all classes
    pub fn base_event(&self) -> Option<&Class> {
        self.classes.get(names::BASE_EVENT)
    }

    /// Classes associated with a category, matched by name
    pub fn category_classes(&self, category: &str) -> Vec<&Class> {
        self.classes
            .values()
            .filter(|class| class.category.as_ref().is_some_and(|c| c.as_str() == category))
            .collect()
    }

    // =========================================================================
    // Filtered query surface
    // =========================================================================

    /// Look up one entity by kind and name, filtered by `query`
    pub fn entity(&self, kind: EntityKind, name: &str, query: &Query) -> Option<SchemaEntity> {
        match kind {
            EntityKind::Category => self.category_entity(self.categories.get(name)?, query),
            EntityKind::Class => self.class_entity(self.classes.get(name)?, query),
            EntityKind::Object => {
                let object = self.objects.get(name)?;
                query.admits(object.extension.as_ref()).then(|| {
                    let mut object = object.clone();
                    object.attributes = query.attributes(&object.attributes);
                    SchemaEntity::Object(object)
                })
            }
            EntityKind::Profile => {
                let profile = self.profiles.get(name)?;
                query.admits(profile.extension.as_ref()).then(|| {
                    let mut profile = profile.clone();
                    profile.attributes = query.attributes(&profile.attributes);
                    SchemaEntity::Profile(profile)
                })
            }
        }
    }

    /// Look up a class by its numeric uid, filtered by `query`
    pub fn entity_by_uid(&self, uid: i64, query: &Query) -> Option<SchemaEntity> {
        self.class_entity(self.class_by_uid(uid)?, query)
    }

    /// Every entity of a kind admitted by `query`, in definition order
    pub fn entities(&self, kind: EntityKind, query: &Query) -> Vec<SchemaEntity> {
        let names: Vec<&Identifier> = match kind {
            EntityKind::Category => self.categories.keys().collect(),
            EntityKind::Class => self.classes.keys().collect(),
            EntityKind::Object => self.objects.keys().collect(),
            EntityKind::Profile => self.profiles.keys().collect(),
        };
        names
            .into_iter()
            .filter_map(|name| self.entity(kind, name.as_str(), query))
            .collect()
    }

    fn class_entity(&self, class: &Class, query: &Query) -> Option<SchemaEntity> {
        if !query.admits(class.extension.as_ref()) {
            return None;
        }
        let mut class = class.clone();
        class.attributes = query.attributes(&class.attributes);
        Some(SchemaEntity::Class(class))
    }

    fn category_entity(&self, category: &Category, query: &Query) -> Option<SchemaEntity> {
        if !query.admits(category.extension.as_ref()) {
            return None;
        }
        let classes = self
            .category_classes(category.name.as_str())
            .into_iter()
            .filter(|class| query.admits(class.extension.as_ref()))
            .map(|class| class.name.clone())
            .collect();
        Some(SchemaEntity::Category {
            category: category.clone(),
            classes,
        })
    }
}
