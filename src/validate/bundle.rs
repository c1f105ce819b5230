//! Bundle validation
//!
//! A bundle wraps several events:
//! `{"events": [...], "start_time": .., "end_time": .., "count": ..}`.
//! Each event is validated on its own; a bad event never affects another.

use serde_json::Value;

use crate::schema::PrimitiveType;
use crate::validate::report::{BundleReport, Issue, IssueKind, Report};
use crate::validate::{value, Validator};

const EVENTS: &str = "events";
const COUNT: &str = "count";

/// Optional bundle fields and the kind each must have
const BUNDLE_FIELDS: [(&str, PrimitiveType, &str); 3] = [
    ("start_time", PrimitiveType::Long, "timestamp_t"),
    ("end_time", PrimitiveType::Long, "timestamp_t"),
    (COUNT, PrimitiveType::Integer, "integer_t"),
];

impl<'a> Validator<'a> {
    /// Validate a bundle and every event in it
    pub fn validate_bundle(&self, bundle: &Value) -> BundleReport {
        let uid = bundle
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .map(String::from);
        let mut report = Report::new(uid);

        let Some(map) = bundle.as_object() else {
            report.push(
                Issue::new(IssueKind::EventNotObject, "Bundle must be a JSON object.")
                    .with("value_type", value::json_type(bundle)),
            );
            return BundleReport { bundle: report, events: Vec::new() };
        };

        for (field, primitive, type_name) in &BUNDLE_FIELDS {
            let Some(field_value) = map.get(*field).filter(|v| !v.is_null()) else { continue };
            if !value::kind_matches(primitive, field_value) {
                let actual = value::json_type(field_value);
                report.push(
                    Issue::new(
                        IssueKind::AttributeWrongType,
                        format!("Bundle attribute \"{field}\" has the wrong type: expected {type_name}, got {actual}."),
                    )
                    .with("attribute_path", *field)
                    .with("attribute", *field)
                    .with("value", field_value.clone())
                    .with("value_type", actual)
                    .with("expected_type", *type_name),
                );
            }
        }

        let Some(events) = map.get(EVENTS).and_then(Value::as_array) else {
            report.push(
                Issue::new(IssueKind::BundleEventsMissing, "Bundle must contain an \"events\" array.")
                    .with("attribute_path", EVENTS),
            );
            return BundleReport { bundle: report, events: Vec::new() };
        };

        if let Some(count) = map.get(COUNT).and_then(Value::as_i64) {
            if usize::try_from(count).ok() != Some(events.len()) {
                report.push(
                    Issue::new(
                        IssueKind::BundleCountIncorrect,
                        format!("Bundle count {count} does not match the {} events it contains.", events.len()),
                    )
                    .with("attribute_path", COUNT)
                    .with("value", count)
                    .with("expected_value", events.len()),
                );
            }
        }

        BundleReport {
            bundle: report,
            events: events.iter().map(|event| self.validate(event)).collect(),
        }
    }
}
