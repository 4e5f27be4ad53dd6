//! Classifier precedence, triggers and determinism.

use crosscontext::trust::classifier::{classify, label, SENDER_DOMAIN_RULE, SKIPPED_SENDER_NOTE};
use crosscontext::types::{ClassificationLevel, Record};
use serde_json::json;

fn record(value: serde_json::Value) -> Record {
    match Record::from_value(value) {
        Ok(record) => record,
        Err(e) => panic!("test record should be an object: {e}"),
    }
}

#[test]
fn budget_from_vendor_is_confidential_with_both_triggers() {
    let result = classify(&record(json!({
        "subject": "Budget review",
        "from": "a@vendor.com",
    })));

    assert_eq!(result.level, ClassificationLevel::ConfidentialCloudEligible);
    assert!(result.rules_triggered.contains(&"budget".to_owned()));
    assert!(result
        .rules_triggered
        .contains(&format!("{SENDER_DOMAIN_RULE}vendor.com")));
    assert!(result.reason.contains("keyword 'budget'"));
    assert!(result.reason.contains("external sender (vendor.com)"));
}

#[test]
fn confidential_outranks_restricted() {
    let result = classify(&record(json!({
        "subject": "Medical claims and salary adjustments",
    })));
    assert_eq!(result.level, ClassificationLevel::ConfidentialCloudEligible);
    // Only the winning level's rules are recorded.
    assert_eq!(result.rules_triggered, vec!["salary".to_owned()]);
}

#[test]
fn sender_domain_rule_is_recorded_next_to_keywords() {
    let result = classify(&record(json!({
        "subject": "Lunch",
        "from": "Dr Lim <lim@Medical.gov.sg>",
    })));
    assert_eq!(result.level, ClassificationLevel::Restricted);
    assert_eq!(
        result.rules_triggered,
        vec![
            "medical".to_owned(),
            format!("{SENDER_DOMAIN_RULE}medical.gov.sg"),
        ]
    );
}

#[test]
fn keyword_matching_is_case_insensitive_substring() {
    let result = classify(&record(json!({"title": "CONFIDENTIALITY notice"})));
    assert_eq!(result.level, ClassificationLevel::OfficialClosed);
    assert!(result.rules_triggered.contains(&"confidential".to_owned()));
}

#[test]
fn nested_values_are_searched() {
    let result = classify(&record(json!({
        "title": "Sync",
        "attendees": ["a@agency.gov.sg"],
        "notes": {"agenda": ["tender evaluation"]},
    })));
    assert_eq!(result.level, ClassificationLevel::ConfidentialCloudEligible);
}

#[test]
fn field_names_do_not_trigger_rules() {
    let result = classify(&record(json!({"budget": "n/a", "draft": 3})));
    assert_eq!(result.level, ClassificationLevel::OfficialOpen);
    assert!(result.rules_triggered.is_empty());
}

#[test]
fn nothing_matching_is_official_open() {
    let result = classify(&record(json!({"subject": "Town hall", "from": "comm@gov.sg"})));
    assert_eq!(result.level, ClassificationLevel::OfficialOpen);
    assert!(result.rules_triggered.is_empty());
    assert_eq!(
        result.reason,
        "No sensitive keywords or restricted domains detected"
    );
}

#[test]
fn non_string_sender_is_skipped_not_fatal() {
    let result = classify(&record(json!({
        "subject": "Investigation notes",
        "from": {"address": "x@vendor.com"},
    })));
    // The domain rule cannot run, but keyword text still includes the nested address.
    assert_eq!(result.level, ClassificationLevel::Restricted);
    assert_eq!(result.notes.len(), 1);
    assert!(result.notes[0].starts_with(SKIPPED_SENDER_NOTE));
    assert!(result.notes[0].contains("from"));

    let labeled = label(&record(json!({"from": 7, "subject": "Town hall"})));
    let json = serde_json::to_value(&labeled).expect("encode");
    assert_eq!(json["classification_notes"].as_array().map(Vec::len), Some(1));
}

#[test]
fn well_formed_records_carry_no_notes() {
    let labeled = label(&record(json!({"from": "a@agency.gov.sg", "subject": "Town hall"})));
    assert!(labeled.classification.notes.is_empty());
    let json = serde_json::to_value(&labeled).expect("encode");
    assert!(json.get("classification_notes").is_none());
}

#[test]
fn sender_field_is_used_when_from_holds_no_address() {
    let result = classify(&record(json!({
        "from": "Front desk",
        "sender": "ops@supplier.com",
        "subject": "Weekly update",
    })));
    assert_eq!(result.level, ClassificationLevel::ConfidentialCloudEligible);
    assert_eq!(
        result.rules_triggered,
        vec![format!("{SENDER_DOMAIN_RULE}supplier.com")]
    );
}

#[test]
fn classification_is_deterministic() {
    let r = record(json!({"subject": "Draft budget", "from": "x@supplier.com"}));
    assert_eq!(classify(&r), classify(&r));
}

#[test]
fn label_replaces_source_supplied_annotations() {
    let labeled = label(&record(json!({
        "id": "e-1",
        "subject": "Town hall",
        "classification": "OFFICIAL_OPEN",
        "redacted": true,
    })));
    assert_eq!(labeled.id(), Some("e-1"));
    assert!(!labeled.redacted);
    assert!(!labeled.fields.contains_key("classification"));

    let wire = match serde_json::to_value(&labeled) {
        Ok(v) => v,
        Err(e) => panic!("labeled record should serialize: {e}"),
    };
    assert_eq!(wire["classification"], "OFFICIAL_OPEN");
    assert_eq!(wire["redacted"], false);
    assert!(wire.get("redaction_log").is_none());
}
