//! Event Validator
//!
//! Validates one event document against a compiled [`Snapshot`]:
//!
//! 1. `class_uid` must name a compiled class (otherwise stop)
//! 2. `metadata.profiles` selects the visible attribute set
//! 3. requirement, type, deprecation checks per schema attribute
//! 4. unknown document keys
//! 5. enum membership and sibling consistency
//! 6. `metadata.version`
//! 7. `type_uid` arithmetic
//! 8. `at_least_one` / `just_one` constraints
//! 9. `observables[].name` paths
//!
//! Object-typed values recurse into the referenced object with steps 3-5
//! and 8. Nothing here aborts; every finding lands in the [`Report`].

pub mod bundle;
pub mod report;
pub mod value;

use serde_json::{Map, Value};

use crate::compile::profile::is_visible;
use crate::compile::uid::type_uid;
use crate::ident::Identifier;
use crate::schema::{names, Attribute, Attributes, Class, Constraints, Object, PrimitiveType, ProfileSet, Requirement};
use crate::snapshot::Snapshot;

pub use self::report::{BundleReport, Issue, IssueKind, Report, Severity};

/// The definition whose attributes a document map is checked against
#[derive(Clone, Copy)]
enum Owner<'a> {
    Class(&'a Class),
    Object(&'a Object),
}

impl<'a> Owner<'a> {
    fn constraints(&self) -> Option<&'a Constraints> {
        match *self {
            Owner::Class(class) => class.constraints.as_ref(),
            Owner::Object(object) => object.constraints.as_ref(),
        }
    }

    fn annotate(&self, issue: Issue) -> Issue {
        match self {
            Owner::Class(class) => issue
                .with("class_uid", class.uid)
                .with("class_name", class.caption.as_str()),
            Owner::Object(object) => issue
                .with("object_type", object.name.as_str())
                .with("object_name", object.caption.as_str()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Owner::Class(class) => format!("class \"{}\"", class.name),
            Owner::Object(object) => format!("object \"{}\"", object.name),
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Non-null value of `key`
fn present<'v>(map: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn listing(keys: &[Identifier]) -> Vec<&str> {
    keys.iter().map(Identifier::as_str).collect()
}

fn expected_type(attr: &Attribute) -> String {
    let base = match (&attr.primitive, &attr.type_id) {
        (Some(PrimitiveType::Object(object)), _) => format!("object_t ({object})"),
        (_, Some(type_id)) => type_id.to_string(),
        (Some(primitive), None) => primitive.to_string(),
        (None, None) => "any".to_string(),
    };
    if attr.is_array {
        format!("array of {base}")
    } else {
        base
    }
}

/// Validates events against one snapshot
pub struct Validator<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> Validator<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// Validate a single event
    pub fn validate(&self, event: &Value) -> Report {
        let uid = event
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .map(String::from);
        let mut report = Report::new(uid);

        let Some(map) = event.as_object() else {
            report.push(
                Issue::new(IssueKind::EventNotObject, "Event must be a JSON object.")
                    .with("value_type", value::json_type(event)),
            );
            return report;
        };

        let Some(class) = self.resolve_class(map, &mut report) else {
            return report;
        };
        if let Some(deprecated) = &class.deprecated {
            report.push(
                Owner::Class(class).annotate(
                    Issue::new(
                        IssueKind::ClassDeprecated,
                        format!("Class \"{}\" is deprecated. {}", class.name, deprecated.message),
                    )
                    .with("since", deprecated.since.as_str()),
                ),
            );
        }

        let profiles = self.requested_profiles(map, &mut report);
        self.check_map(map, &class.attributes, Owner::Class(class), "", &profiles, &mut report);
        self.check_version(map, &mut report);
        self.check_type_uid(map, &mut report);
        self.check_observables(map, class, &mut report);
        report
    }

    // =========================================================================
    // Event-level steps
    // =========================================================================

    fn resolve_class(&self, map: &Map<String, Value>, report: &mut Report) -> Option<&'a Class> {
        let Some(value) = present(map, names::CLASS_UID) else {
            report.push(
                Issue::new(IssueKind::ClassUidMissing, "Required attribute \"class_uid\" is missing.")
                    .with("attribute_path", names::CLASS_UID)
                    .with("attribute", names::CLASS_UID),
            );
            return None;
        };
        let Some(uid) = value.as_i64() else {
            report.push(
                Issue::new(
                    IssueKind::ClassUidWrongType,
                    format!(
                        "Attribute \"class_uid\" must be an integer, got {}.",
                        value::json_type(value)
                    ),
                )
                .with("attribute_path", names::CLASS_UID)
                .with("value", value.clone())
                .with("expected_type", "integer_t"),
            );
            return None;
        };
        let class = self.snapshot.class_by_uid(uid);
        if class.is_none() {
            report.push(
                Issue::new(IssueKind::ClassUidUnknown, format!("Unknown \"class_uid\" value {uid}."))
                    .with("attribute_path", names::CLASS_UID)
                    .with("value", uid),
            );
        }
        class
    }

    fn requested_profiles(&self, map: &Map<String, Value>, report: &mut Report) -> ProfileSet {
        let mut profiles = ProfileSet::new();
        let Some(requested) = map
            .get(names::METADATA)
            .and_then(|m| m.get(names::PROFILES))
            .and_then(Value::as_array)
        else {
            return profiles;
        };

        for (i, name) in requested.iter().enumerate() {
            let Some(name) = name.as_str() else {
                report.push(
                    Issue::new(IssueKind::ProfileUnknown, format!("Profile entry {name} is not a profile name."))
                        .with("attribute_path", format!("metadata.profiles[{i}]"))
                        .with("value", name.clone()),
                );
                continue;
            };
            if let Some((key, _)) = self.snapshot.profiles().get_key_value(name) {
                profiles.insert(key.clone());
            } else {
                report.push(
                    Issue::new(IssueKind::ProfileUnknown, format!("Unknown profile \"{name}\"."))
                        .with("attribute_path", format!("metadata.profiles[{i}]"))
                        .with("value", name),
                );
            }
        }
        profiles
    }

    fn check_version(&self, map: &Map<String, Value>, report: &mut Report) {
        let (Some(expected), Some(declared)) = (
            self.snapshot.version(),
            map.get(names::METADATA)
                .and_then(|m| m.get(names::VERSION))
                .and_then(Value::as_str),
        ) else {
            return;
        };
        if !expected.matches(declared) {
            report.push(
                Issue::new(
                    IssueKind::VersionIncorrect,
                    format!("Event version \"{declared}\" does not match schema version \"{expected}\"."),
                )
                .with("attribute_path", "metadata.version")
                .with("value", declared)
                .with("expected_value", expected.as_str()),
            );
        }
    }

    fn check_type_uid(&self, map: &Map<String, Value>, report: &mut Report) {
        let get = |key: &str| present(map, key).and_then(Value::as_i64);
        let (Some(class_uid), Some(activity_id), Some(actual)) =
            (get(names::CLASS_UID), get(names::ACTIVITY_ID), get(names::TYPE_UID))
        else {
            return;
        };
        let expected = type_uid(class_uid, activity_id);
        if expected != Some(actual) {
            let mut issue = Issue::new(
                IssueKind::TypeUidIncorrect,
                format!(
                    "Attribute \"type_uid\" value {actual} does not equal class_uid * 100 + activity_id."
                ),
            )
            .with("attribute_path", names::TYPE_UID)
            .with("attribute", names::TYPE_UID)
            .with("value", actual)
            .with("class_uid", class_uid)
            .with("activity_id", activity_id);
            if let Some(expected) = expected {
                issue = issue.with("expected_value", expected);
            }
            report.push(issue);
        }
    }

    fn check_observables(&self, map: &Map<String, Value>, class: &Class, report: &mut Report) {
        let Some(observables) = map.get(names::OBSERVABLES).and_then(Value::as_array) else {
            return;
        };
        for (i, observable) in observables.iter().enumerate() {
            let Some(name) = observable.get("name").and_then(Value::as_str) else {
                continue;
            };
            if !self.resolves(&class.attributes, name) {
                report.push(
                    Owner::Class(class).annotate(
                        Issue::new(
                            IssueKind::ObservableNameInvalidReference,
                            format!("Observable name \"{name}\" does not refer to an attribute of the class."),
                        )
                        .with("attribute_path", format!("observables[{i}].name"))
                        .with("value", name),
                    ),
                );
            }
        }
    }

    /// Walk a dot path through attribute definitions and object types
    fn resolves(&self, attributes: &Attributes, path: &str) -> bool {
        let mut current = attributes;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(attr) = current.get(segment) else {
                return false;
            };
            if segments.peek().is_none() {
                return true;
            }
            match &attr.primitive {
                Some(PrimitiveType::Object(object)) => match self.snapshot.object(object.as_str()) {
                    Some(object) => current = &object.attributes,
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }

    // =========================================================================
    // Attribute checks
    // =========================================================================

    fn check_map(
        &self,
        map: &Map<String, Value>,
        attributes: &Attributes,
        owner: Owner<'_>,
        prefix: &str,
        profiles: &ProfileSet,
        report: &mut Report,
    ) {
        let visible: Vec<(&Identifier, &Attribute)> = attributes
            .iter()
            .filter(|(_, attr)| is_visible(attr, profiles))
            .collect();

        for (name, attr) in &visible {
            let path = join(prefix, name.as_str());
            match present(map, name.as_str()) {
                None => self.check_missing(name, attr, &path, owner, report),
                Some(value) => {
                    if let Some(deprecated) = &attr.deprecated {
                        report.push(
                            Issue::new(
                                IssueKind::AttributeDeprecated,
                                format!("Attribute \"{path}\" is deprecated. {}", deprecated.message),
                            )
                            .with("attribute_path", path.as_str())
                            .with("attribute", name.as_str())
                            .with("since", deprecated.since.as_str()),
                        );
                    }
                    self.check_attribute(name, attr, value, map, &path, profiles, report);
                }
            }
        }

        // an object declaring no attributes at all is open
        if !attributes.is_empty() {
            for (key, value) in map {
                if value.is_null() || visible.iter().any(|(name, _)| name.as_str() == key.as_str()) {
                    continue;
                }
                let path = join(prefix, key);
                report.push(
                    Issue::new(IssueKind::AttributeUnknown, format!("Unknown attribute \"{path}\"."))
                        .with("attribute_path", path.as_str())
                        .with("attribute", key.as_str()),
                );
            }
        }

        self.check_constraints(map, owner, prefix, report);
    }

    fn check_missing(&self, name: &Identifier, attr: &Attribute, path: &str, owner: Owner<'_>, report: &mut Report) {
        let kind = match attr.requirement() {
            Requirement::Required => IssueKind::AttributeRequiredMissing,
            Requirement::Recommended => IssueKind::AttributeRecommendedMissing,
            Requirement::Optional => return,
        };
        let label = match kind {
            IssueKind::AttributeRequiredMissing => "Required",
            _ => "Recommended",
        };
        report.push(
            owner.annotate(
                Issue::new(kind, format!("{label} attribute \"{path}\" is missing."))
                    .with("attribute_path", path)
                    .with("attribute", name.as_str()),
            ),
        );
    }

    fn check_constraints(&self, map: &Map<String, Value>, owner: Owner<'_>, prefix: &str, report: &mut Report) {
        let Some(constraints) = owner.constraints() else { return };
        let count = |keys: &[Identifier]| keys.iter().filter(|k| present(map, k.as_str()).is_some()).count();

        let mut failures = Vec::new();
        if !constraints.at_least_one.is_empty() && count(constraints.at_least_one.as_slice()) == 0 {
            failures.push(("at_least_one", constraints.at_least_one.as_slice(), "at least one of"));
        }
        if !constraints.just_one.is_empty() && count(constraints.just_one.as_slice()) != 1 {
            failures.push(("just_one", constraints.just_one.as_slice(), "exactly one of"));
        }

        for (constraint, members, wording) in failures {
            let mut detail = Map::new();
            detail.insert(constraint.to_string(), Value::from(listing(members)));
            let mut issue = Issue::new(
                IssueKind::ConstraintFailed,
                format!(
                    "Constraint failed for {}: expected {wording} {}.",
                    owner.describe(),
                    listing(members).join(", ")
                ),
            )
            .with("constraint", Value::Object(detail));
            if !prefix.is_empty() {
                issue = issue.with("attribute_path", prefix);
            }
            report.push(owner.annotate(issue));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_attribute(
        &self,
        name: &Identifier,
        attr: &Attribute,
        value: &Value,
        map: &Map<String, Value>,
        path: &str,
        profiles: &ProfileSet,
        report: &mut Report,
    ) {
        let sibling = attr.sibling.as_ref().and_then(|s| present(map, s.as_str()));

        if !attr.is_array {
            if self.check_value(name, attr, value, path, profiles, report) {
                self.check_enum(name, attr, value, sibling, path, report);
            }
            return;
        }

        let Some(items) = value.as_array() else {
            report.push(self.wrong_type(name, attr, value, path));
            return;
        };
        let siblings = sibling.and_then(Value::as_array);
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{path}[{i}]");
            if self.check_value(name, attr, item, &item_path, profiles, report) {
                let sibling = siblings.and_then(|s| s.get(i));
                self.check_enum(name, attr, item, sibling, &item_path, report);
            }
        }
    }

    fn wrong_type(&self, name: &Identifier, attr: &Attribute, value: &Value, path: &str) -> Issue {
        let expected = expected_type(attr);
        let actual = value::json_type(value);
        Issue::new(
            IssueKind::AttributeWrongType,
            format!("Attribute \"{path}\" value has the wrong type: expected {expected}, got {actual}."),
        )
        .with("attribute_path", path)
        .with("attribute", name.as_str())
        .with("value", value.clone())
        .with("value_type", actual)
        .with("expected_type", expected)
    }

    /// Check one (element) value; `false` when its kind is wrong
    fn check_value(
        &self,
        name: &Identifier,
        attr: &Attribute,
        value: &Value,
        path: &str,
        profiles: &ProfileSet,
        report: &mut Report,
    ) -> bool {
        let Some(primitive) = &attr.primitive else {
            return true;
        };
        if !value::kind_matches(primitive, value) {
            report.push(self.wrong_type(name, attr, value, path));
            return false;
        }

        match primitive {
            PrimitiveType::Json => {}
            PrimitiveType::Object(object_name) => {
                let (Some(nested), Some(object)) = (value.as_object(), self.snapshot.object(object_name.as_str()))
                else {
                    return true;
                };
                if let Some(deprecated) = &object.deprecated {
                    report.push(
                        Owner::Object(object).annotate(
                            Issue::new(
                                IssueKind::ObjectDeprecated,
                                format!("Object \"{}\" at \"{path}\" is deprecated. {}", object.name, deprecated.message),
                            )
                            .with("attribute_path", path)
                            .with("since", deprecated.since.as_str()),
                        ),
                    );
                }
                self.check_map(nested, &object.attributes, Owner::Object(object), path, profiles, report);
            }
            _ => {
                if let Some(type_id) = &attr.type_id {
                    value::check_constraints(self.snapshot.dictionary(), type_id, value, path, name.as_str(), report);
                }
            }
        }
        true
    }

    fn check_enum(
        &self,
        name: &Identifier,
        attr: &Attribute,
        value: &Value,
        sibling: Option<&Value>,
        path: &str,
        report: &mut Report,
    ) {
        if !attr.is_enum() || name.as_str() == names::TYPE_UID {
            return;
        }
        let Some(entry) = attr.enum_value(value) else {
            report.push(
                Issue::new(
                    IssueKind::AttributeEnumValueUnknown,
                    format!("Attribute \"{path}\" value {value} is not a defined enum value."),
                )
                .with("attribute_path", path)
                .with("attribute", name.as_str())
                .with("value", value.clone()),
            );
            return;
        };

        if let Some(deprecated) = &entry.deprecated {
            report.push(
                Issue::new(
                    IssueKind::AttributeEnumValueDeprecated,
                    format!("Enum value {value} of \"{path}\" is deprecated. {}", deprecated.message),
                )
                .with("attribute_path", path)
                .with("attribute", name.as_str())
                .with("value", value.clone())
                .with("since", deprecated.since.as_str()),
            );
        }

        if value.as_i64() == Some(names::OTHER_ENUM_VALUE) {
            return;
        }
        let (Some(sibling_name), Some(sibling_value)) = (&attr.sibling, sibling) else {
            return;
        };
        if sibling_value.as_str() != Some(entry.caption.as_str()) {
            report.push(
                Issue::new(
                    IssueKind::AttributeEnumSiblingIncorrect,
                    format!(
                        "Attribute \"{sibling_name}\" value {sibling_value} does not match the caption \"{}\" of \"{path}\" value {value}.",
                        entry.caption
                    ),
                )
                .with("attribute_path", path)
                .with("attribute", name.as_str())
                .with("value", value.clone())
                .with("sibling", sibling_name.as_str())
                .with("sibling_value", sibling_value.clone())
                .with("expected_value", entry.caption.as_str()),
            );
        }
    }
}
