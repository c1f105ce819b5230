//! Event and bundle validation against the fixture schema

mod common;

use event_schemas::{IssueKind, Report, Severity, Snapshot, Validator};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{compile_fixture, network_event};

fn validate(snapshot: &Snapshot, event: &Value) -> Report {
    Validator::new(snapshot).validate(event)
}

fn kinds(report: &Report) -> Vec<IssueKind> {
    report.issues().map(|issue| issue.kind).collect()
}

#[test]
fn test_valid_event_is_clean() {
    let snapshot = compile_fixture();
    let report = validate(&snapshot, &network_event());
    assert!(report.is_clean(), "{:#?}", report);
    assert_eq!(report.uid.as_deref(), Some("evt-1"));
}

#[test]
fn test_non_object_event() {
    let snapshot = compile_fixture();
    let report = validate(&snapshot, &json!([1, 2]));
    assert_eq!(kinds(&report), vec![IssueKind::EventNotObject]);
}

#[test]
fn test_class_uid_problems_stop_validation() {
    let snapshot = compile_fixture();

    let report = validate(&snapshot, &json!({"activity_id": 1}));
    assert_eq!(kinds(&report), vec![IssueKind::ClassUidMissing]);

    let report = validate(&snapshot, &json!({"class_uid": "4001"}));
    assert_eq!(kinds(&report), vec![IssueKind::ClassUidWrongType]);

    let report = validate(&snapshot, &json!({"class_uid": 9999}));
    assert_eq!(kinds(&report), vec![IssueKind::ClassUidUnknown]);
}

#[test]
fn test_type_uid_incorrect() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["type_uid"] = json!(400102);

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::TypeUidIncorrect]);
    let issue = &report.errors[0];
    assert_eq!(issue.get("expected_value"), Some(&json!(400101)));
    assert_eq!(issue.get("value"), Some(&json!(400102)));
}

#[test]
fn test_required_attribute_missing() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event.as_object_mut().unwrap().remove("time");

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeRequiredMissing]);
    let issue = &report.errors[0];
    assert_eq!(issue.get("attribute_path"), Some(&json!("time")));
    assert_eq!(issue.get("class_uid"), Some(&json!(4001)));
}

#[test]
fn test_nested_required_attribute_missing() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["metadata"] = json!({"uid": "evt-1"});

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeRequiredMissing]);
    let issue = &report.errors[0];
    assert_eq!(issue.get("attribute_path"), Some(&json!("metadata.version")));
    assert_eq!(issue.get("object_type"), Some(&json!("metadata")));
}

#[test]
fn test_unknown_attribute() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["bogus"] = json!(true);
    event["src_endpoint"]["mac"] = json!("00:00");
    // a null unknown value is not reported
    event["ignored"] = Value::Null;

    let report = validate(&snapshot, &event);
    let paths: Vec<&Value> = report
        .of_kind(IssueKind::AttributeUnknown)
        .into_iter()
        .filter_map(|issue| issue.get("attribute_path"))
        .collect();
    assert_eq!(paths, vec![&json!("src_endpoint.mac"), &json!("bogus")]);
}

#[test]
fn test_wrong_type() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["severity_id"] = json!("1");
    event["src_endpoint"] = json!("10.0.0.1");

    let report = validate(&snapshot, &event);
    assert_eq!(
        kinds(&report),
        vec![IssueKind::AttributeWrongType, IssueKind::AttributeWrongType]
    );
    assert_eq!(report.errors[1].get("expected_type"), Some(&json!("object_t (network_endpoint)")));
}

#[test]
fn test_enum_value_unknown() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["severity_id"] = json!(7);
    event.as_object_mut().unwrap().remove("severity");

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeEnumValueUnknown]);
}

#[test]
fn test_enum_sibling_mismatch_is_a_warning() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["severity"] = json!("Critical");

    let report = validate(&snapshot, &event);
    assert!(!report.has_errors());
    assert_eq!(kinds(&report), vec![IssueKind::AttributeEnumSiblingIncorrect]);
    assert_eq!(report.warnings[0].severity(), Severity::Warning);
    assert_eq!(report.warnings[0].get("expected_value"), Some(&json!("Informational")));
}

#[test]
fn test_other_enum_value_skips_sibling_check() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["severity_id"] = json!(99);
    event["severity"] = json!("Vendor Specific");

    assert!(validate(&snapshot, &event).is_clean());
}

#[test]
fn test_deprecated_enum_value() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["severity_id"] = json!(3);
    event["severity"] = json!("Medium");

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeEnumValueDeprecated]);
    assert_eq!(report.warnings[0].get("since"), Some(&json!("1.1.0")));
}

#[test]
fn test_value_constraints() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["src_endpoint"]["port"] = json!(70000);
    event["protocol"] = json!("icmp");

    let report = validate(&snapshot, &event);
    assert_eq!(
        kinds(&report),
        vec![IssueKind::AttributeValueExceedsRange, IssueKind::AttributeValueNotInTypeValues]
    );
}

#[test]
fn test_regex_mismatch_is_a_warning() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["src_endpoint"]["ip"] = json!("not an address");

    let report = validate(&snapshot, &event);
    assert!(!report.has_errors());
    assert_eq!(kinds(&report), vec![IssueKind::AttributeValueRegexNotMatched]);
}

#[test]
fn test_constraint_failed() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["src_endpoint"] = json!({"port": 443});

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::ConstraintFailed]);
    let issue = &report.errors[0];
    assert_eq!(issue.get("attribute_path"), Some(&json!("src_endpoint")));
    assert_eq!(issue.get("constraint"), Some(&json!({"at_least_one": ["ip", "hostname"]})));
}

#[test]
fn test_deprecated_class_and_just_one() {
    let snapshot = compile_fixture();
    let event = json!({
        "class_uid": 1099,
        "category_uid": 1,
        "activity_id": 0,
        "type_uid": 109900,
        "severity_id": 1,
        "time": 1_700_000_000_000_i64,
        "metadata": {"version": "1.2.0"},
        "message": "hello",
        "legacy_flag": true
    });

    let report = validate(&snapshot, &event);
    assert_eq!(
        kinds(&report),
        vec![
            IssueKind::ConstraintFailed,
            IssueKind::ClassDeprecated,
            IssueKind::AttributeDeprecated,
        ]
    );
}

#[test]
fn test_version_mismatch_is_a_warning() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["metadata"]["version"] = json!("1.3.0");

    let report = validate(&snapshot, &event);
    assert!(!report.has_errors());
    assert_eq!(kinds(&report), vec![IssueKind::VersionIncorrect]);

    event["metadata"]["version"] = json!("v1.2.0");
    assert!(validate(&snapshot, &event).is_clean());
}

#[test]
fn test_profiles_select_attributes() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["metadata"]["profiles"] = json!(["host", "datetime"]);
    event["time_dt"] = json!("2023-11-14T22:13:20Z");

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeRecommendedMissing]);
    assert_eq!(report.warnings[0].get("attribute_path"), Some(&json!("device")));

    // without the profile, the companion is unknown
    event["metadata"]["profiles"] = json!(["host"]);
    event["device"] = json!({"hostname": "web-1"});
    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeUnknown]);
}

#[test]
fn test_unknown_profile() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["metadata"]["profiles"] = json!(["cloud"]);

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::ProfileUnknown]);
    assert_eq!(report.errors[0].get("attribute_path"), Some(&json!("metadata.profiles[0]")));
}

#[test]
fn test_observable_names() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["observables"] = json!([
        {"name": "src_endpoint.ip", "type_id": 2, "type": "IP Address", "value": "10.0.0.1"},
        {"name": "src_endpoint.nowhere", "type_id": 2, "type": "IP Address"}
    ]);

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::ObservableNameInvalidReference]);
    assert_eq!(report.errors[0].get("attribute_path"), Some(&json!("observables[1].name")));
}

#[test]
fn test_extension_event() {
    let snapshot = compile_fixture();
    let event = json!({
        "class_uid": 301001,
        "category_uid": 301,
        "activity_id": 2,
        "activity_name": "Assemble",
        "type_uid": 30100102,
        "severity_id": 1,
        "time": 1_700_000_000_000_i64,
        "metadata": {"version": "1.2.0"},
        "widget_id": "w-42"
    });
    assert!(validate(&snapshot, &event).is_clean());
}

#[test]
fn test_report_serialization() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["type_uid"] = json!(1);
    event["severity"] = json!("Low");

    let rendered = serde_json::to_value(validate(&snapshot, &event)).unwrap();
    assert_eq!(rendered["error_count"], json!(1));
    assert_eq!(rendered["warning_count"], json!(1));
    assert_eq!(rendered["errors"][0]["error"], json!("type_uid_incorrect"));
    assert_eq!(rendered["warnings"][0]["warning"], json!("attribute_enum_sibling_incorrect"));
}

#[test]
fn test_non_string_profile_entry() {
    let snapshot = compile_fixture();
    let mut event = network_event();
    event["metadata"]["profiles"] = json!(["host", 7]);

    let report = validate(&snapshot, &event);
    let mut found = kinds(&report);
    found.sort_by_key(|kind| kind.as_str());
    assert_eq!(found, vec![IssueKind::AttributeWrongType, IssueKind::ProfileUnknown]);
    for issue in &report.errors {
        assert_eq!(issue.get("attribute_path"), Some(&json!("metadata.profiles[1]")));
    }
    // the string entry is still honoured: device is recommended under "host"
    assert_eq!(
        report.warnings.iter().map(|w| w.kind).collect::<Vec<_>>(),
        vec![IssueKind::AttributeRecommendedMissing]
    );
}

/// A clean `file_scan` event; the class keys its type_uids on disposition_id
fn file_scan_event() -> Value {
    json!({
        "class_uid": 1003,
        "category_uid": 1,
        "disposition_id": 2,
        "disposition": "Blocked",
        "type_uid": 100302,
        "time": 1_700_000_000_000_i64,
        "metadata": {"version": "1.2.0"}
    })
}

#[test]
fn test_disposition_event_is_clean() {
    let snapshot = compile_fixture();
    let report = validate(&snapshot, &file_scan_event());
    assert!(report.is_clean(), "{:#?}", report);

    let mut event = file_scan_event();
    event["disposition_id"] = json!(3);
    assert_eq!(kinds(&validate(&snapshot, &event)), vec![IssueKind::AttributeEnumValueUnknown]);
}

#[test]
fn test_array_enum_with_positional_siblings() {
    let snapshot = compile_fixture();
    let mut event = file_scan_event();
    event["tag_ids"] = json!([1, 2, 99]);
    event["tags"] = json!(["Malware", "Phishing", "Custom"]);
    assert!(validate(&snapshot, &event).is_clean());

    event["tags"] = json!(["Malware", "Spam"]);
    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeEnumSiblingIncorrect]);
    assert_eq!(report.warnings[0].get("attribute_path"), Some(&json!("tag_ids[1]")));

    event["tag_ids"] = json!([1, 5]);
    event["tags"] = json!(["Malware", "Unknown"]);
    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeEnumValueUnknown]);
    assert_eq!(report.errors[0].get("attribute_path"), Some(&json!("tag_ids[1]")));
}

#[test]
fn test_json_attribute_accepts_anything() {
    let snapshot = compile_fixture();
    for raw in [json!("line"), json!(42), json!([1, "two", {"three": 3}]), json!({"nested": {"deep": [true]}})] {
        let mut event = file_scan_event();
        event["raw_data"] = raw;
        let report = validate(&snapshot, &event);
        assert!(report.is_clean(), "{:#?}", report);
    }
}

#[test]
fn test_open_object_accepts_any_keys() {
    let snapshot = compile_fixture();
    let mut event = file_scan_event();
    event["unmapped"] = json!({"vendor_field": 1, "extra": {"anything": ["goes"]}});
    assert!(validate(&snapshot, &event).is_clean());

    event["unmapped"] = json!("not an object");
    assert_eq!(kinds(&validate(&snapshot, &event)), vec![IssueKind::AttributeWrongType]);
}

#[test]
fn test_profile_gated_object_still_rejects_unknown_keys() {
    let snapshot = compile_fixture();
    let mut event = file_scan_event();
    event["host_info"] = json!({"totally_bogus": 1, "hostname": "x"});

    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeUnknown, IssueKind::AttributeUnknown]);
    let paths: Vec<_> = report.errors.iter().filter_map(|e| e.get("attribute_path")).collect();
    assert_eq!(paths, vec![&json!("host_info.totally_bogus"), &json!("host_info.hostname")]);

    event["metadata"]["profiles"] = json!(["host"]);
    let report = validate(&snapshot, &event);
    assert_eq!(kinds(&report), vec![IssueKind::AttributeUnknown]);
    assert_eq!(report.errors[0].get("attribute_path"), Some(&json!("host_info.totally_bogus")));
}

// =============================================================================
// Bundles
// =============================================================================

#[test]
fn test_bundle_validates_each_event() {
    let snapshot = compile_fixture();
    let mut bad = network_event();
    bad.as_object_mut().unwrap().remove("time");

    let bundle = json!({
        "events": [network_event(), bad],
        "start_time": 1_700_000_000_000_i64,
        "end_time": 1_700_000_001_000_i64,
        "count": 2
    });
    let report = Validator::new(&snapshot).validate_bundle(&bundle);
    assert!(report.bundle.is_clean());
    assert_eq!(report.events.len(), 2);
    assert!(report.events[0].is_clean());
    assert_eq!(kinds(&report.events[1]), vec![IssueKind::AttributeRequiredMissing]);
    assert!(report.has_errors());
}

#[test]
fn test_bundle_shape_problems() {
    let snapshot = compile_fixture();
    let validator = Validator::new(&snapshot);

    let report = validator.validate_bundle(&json!({"count": 1}));
    assert_eq!(kinds(&report.bundle), vec![IssueKind::BundleEventsMissing]);

    let report = validator.validate_bundle(&json!({
        "events": [network_event()],
        "count": 3,
        "start_time": "yesterday"
    }));
    assert_eq!(
        kinds(&report.bundle),
        vec![IssueKind::AttributeWrongType, IssueKind::BundleCountIncorrect]
    );
    assert!(report.events[0].is_clean());
}
