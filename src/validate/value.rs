//! Scalar value checks
//!
//! A value is first checked against its attribute's primitive JSON kind,
//! then against the constraints of its data type, looking one level up to
//! the supertype when the type itself lacks a constraint.

use chrono::DateTime;
use serde_json::Value;

use crate::ident::Identifier;
use crate::schema::{names, DataType, Dictionary, PrimitiveType};
use crate::validate::report::{Issue, IssueKind, Report};

/// Human-readable JSON kind of a value
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer (64-bit signed)",
        Value::Number(n) if n.is_u64() => "integer (64-bit unsigned)",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `value` is of the JSON kind `primitive` expects
pub fn kind_matches(primitive: &PrimitiveType, value: &Value) -> bool {
    match primitive {
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::Integer => value.is_i64(),
        PrimitiveType::Long => value.is_i64() || value.is_u64(),
        PrimitiveType::Float => value.is_number(),
        PrimitiveType::String => value.is_string(),
        PrimitiveType::Json => true,
        PrimitiveType::Object(_) => value.is_object(),
    }
}

/// First constraint found along the type chain
fn inherited<'a, T>(
    dictionary: &'a Dictionary,
    type_id: &'a Identifier,
    pick: impl Fn(&'a DataType) -> Option<T>,
) -> Option<(&'a Identifier, T)> {
    dictionary
        .type_chain(type_id)
        .find_map(|(id, data_type)| pick(data_type).map(|found| (id, found)))
}

/// Check a value of the right kind against its data type's constraints
pub fn check_constraints(
    dictionary: &Dictionary,
    type_id: &Identifier,
    value: &Value,
    path: &str,
    attribute: &str,
    report: &mut Report,
) {
    let issue = |kind: IssueKind, message: String| {
        Issue::new(kind, message)
            .with("attribute_path", path)
            .with("attribute", attribute)
            .with("value", value.clone())
    };

    if let (Some((_, range)), Some(number)) = (inherited(dictionary, type_id, |t| t.range), value.as_f64()) {
        if !range.contains(number) {
            report.push(
                issue(
                    IssueKind::AttributeValueExceedsRange,
                    format!(
                        "Attribute \"{path}\" value {value} is outside the range {}..{} of type {type_id}.",
                        range.0, range.1
                    ),
                )
                .with("range", vec![range.0, range.1]),
            );
        }
    }

    if let Some(text) = value.as_str() {
        if let Some((_, max_len)) = inherited(dictionary, type_id, |t| t.max_len) {
            let len = text.chars().count();
            if len > max_len {
                report.push(
                    issue(
                        IssueKind::AttributeValueExceedsMaxLength,
                        format!("Attribute \"{path}\" value is {len} characters, longer than the {max_len} allowed by type {type_id}."),
                    )
                    .with("max_len", max_len),
                );
            }
        }

        let regex_type = inherited(dictionary, type_id, |t| t.regex.as_ref()).map(|(id, _)| id);
        match regex_type.and_then(|id| dictionary.regexes.get(id)) {
            Some(regex) => {
                if !regex.is_match(text) {
                    report.push(
                        issue(
                            IssueKind::AttributeValueRegexNotMatched,
                            format!("Attribute \"{path}\" value does not match the pattern of type {type_id}."),
                        )
                        .with("regex", regex.as_str()),
                    );
                }
            }
            None if regex_type.is_none() && dictionary.is_a(type_id, names::DATETIME_T) => {
                if DateTime::parse_from_rfc3339(text).is_err() {
                    report.push(issue(
                        IssueKind::AttributeValueInvalidDatetime,
                        format!("Attribute \"{path}\" value is not an RFC 3339 date and time."),
                    ));
                }
            }
            None => {}
        }
    }

    if let Some((_, values)) = inherited(dictionary, type_id, |t| t.values.as_ref()) {
        if !values.contains(value) {
            report.push(
                issue(
                    IssueKind::AttributeValueNotInTypeValues,
                    format!("Attribute \"{path}\" value {value} is not one of the values allowed by type {type_id}."),
                )
                .with("expected_value", values.clone()),
            );
        }
    }
}
