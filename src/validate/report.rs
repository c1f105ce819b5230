//! Validation reports
//!
//! Every finding is an [`Issue`] with a fixed [`IssueKind`]; the kind alone
//! decides whether it lands in `errors` or `warnings`.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Severity of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// Every kind of validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    EventNotObject,
    ClassUidMissing,
    ClassUidWrongType,
    ClassUidUnknown,
    ClassDeprecated,
    ProfileUnknown,
    AttributeRequiredMissing,
    AttributeRecommendedMissing,
    AttributeUnknown,
    AttributeDeprecated,
    AttributeWrongType,
    AttributeEnumValueUnknown,
    AttributeEnumValueDeprecated,
    AttributeEnumSiblingIncorrect,
    AttributeValueExceedsRange,
    AttributeValueExceedsMaxLength,
    AttributeValueRegexNotMatched,
    AttributeValueNotInTypeValues,
    AttributeValueInvalidDatetime,
    ObjectDeprecated,
    VersionIncorrect,
    TypeUidIncorrect,
    ConstraintFailed,
    ObservableNameInvalidReference,
    BundleEventsMissing,
    BundleCountIncorrect,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::EventNotObject => "event_not_object",
            IssueKind::ClassUidMissing => "class_uid_missing",
            IssueKind::ClassUidWrongType => "class_uid_wrong_type",
            IssueKind::ClassUidUnknown => "class_uid_unknown",
            IssueKind::ClassDeprecated => "class_deprecated",
            IssueKind::ProfileUnknown => "profile_unknown",
            IssueKind::AttributeRequiredMissing => "attribute_required_missing",
            IssueKind::AttributeRecommendedMissing => "attribute_recommended_missing",
            IssueKind::AttributeUnknown => "attribute_unknown",
            IssueKind::AttributeDeprecated => "attribute_deprecated",
            IssueKind::AttributeWrongType => "attribute_wrong_type",
            IssueKind::AttributeEnumValueUnknown => "attribute_enum_value_unknown",
            IssueKind::AttributeEnumValueDeprecated => "attribute_enum_value_deprecated",
            IssueKind::AttributeEnumSiblingIncorrect => "attribute_enum_sibling_incorrect",
            IssueKind::AttributeValueExceedsRange => "attribute_value_exceeds_range",
            IssueKind::AttributeValueExceedsMaxLength => "attribute_value_exceeds_max_length",
            IssueKind::AttributeValueRegexNotMatched => "attribute_value_regex_not_matched",
            IssueKind::AttributeValueNotInTypeValues => "attribute_value_not_in_type_values",
            IssueKind::AttributeValueInvalidDatetime => "attribute_value_invalid_datetime",
            IssueKind::ObjectDeprecated => "object_deprecated",
            IssueKind::VersionIncorrect => "version_incorrect",
            IssueKind::TypeUidIncorrect => "type_uid_incorrect",
            IssueKind::ConstraintFailed => "constraint_failed",
            IssueKind::ObservableNameInvalidReference => "observable_name_invalid_reference",
            IssueKind::BundleEventsMissing => "bundle_events_missing",
            IssueKind::BundleCountIncorrect => "bundle_count_incorrect",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::ClassDeprecated
            | IssueKind::AttributeRecommendedMissing
            | IssueKind::AttributeDeprecated
            | IssueKind::AttributeEnumValueDeprecated
            | IssueKind::AttributeEnumSiblingIncorrect
            | IssueKind::AttributeValueRegexNotMatched
            | IssueKind::AttributeValueInvalidDatetime
            | IssueKind::ObjectDeprecated
            | IssueKind::VersionIncorrect
            | IssueKind::BundleCountIncorrect => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One validation finding with its context fields
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    /// `attribute_path`, `attribute`, `value`, `expected_value`, ...
    pub context: Map<String, Value>,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.context.len() + 2))?;
        map.serialize_entry(self.severity().as_str(), self.kind.as_str())?;
        map.serialize_entry("message", &self.message)?;
        for (key, value) in &self.context {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Result of validating one event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl Report {
    pub fn new(uid: Option<String>) -> Self {
        Self {
            uid,
            ..Default::default()
        }
    }

    /// File an issue under errors or warnings by its severity
    pub fn push(&mut self, issue: Issue) {
        match issue.severity() {
            Severity::Error => {
                self.errors.push(issue);
                self.error_count += 1;
            }
            Severity::Warning => {
                self.warnings.push(issue);
                self.warning_count += 1;
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Every issue, errors first
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().chain(&self.warnings)
    }

    /// Issues of one kind
    pub fn of_kind(&self, kind: IssueKind) -> Vec<&Issue> {
        self.issues().filter(|issue| issue.kind == kind).collect()
    }
}

/// Result of validating a bundle: the bundle-level report plus one report
/// per contained event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BundleReport {
    #[serde(flatten)]
    pub bundle: Report,
    pub events: Vec<Report>,
}

impl BundleReport {
    /// Whether the bundle or any event has errors
    pub fn has_errors(&self) -> bool {
        self.bundle.has_errors() || self.events.iter().any(Report::has_errors)
    }
}
