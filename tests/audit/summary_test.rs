//! Resource-access summary tests.

use crosscontext::audit::summary::{summarize, InvocationOutput, UNKNOWN};
use crosscontext::consent::ConsentStore;
use crosscontext::trust::classifier::label;
use crosscontext::types::{AccessDenial, ClassificationLevel, Clearance, Record, ResourceKind};
use serde_json::json;

#[test]
fn released_and_withheld_records_are_both_listed() {
    let record = Record::from_value(json!({"id": "email-005", "subject": "Town hall"}))
        .expect("object");
    let mut item = label(&record);
    item.redacted = true;
    let denial = AccessDenial {
        id: "email-001".to_owned(),
        classification: ClassificationLevel::ConfidentialCloudEligible,
        reason: "Insufficient clearance".to_owned(),
        required_clearance: Some(Clearance::Director),
    };

    let summary = summarize(&InvocationOutput::Records {
        kind: ResourceKind::Email,
        items: &[item],
        denials: &[denial],
    });

    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].resource_type, "email");
    assert_eq!(summary[0].resource_id, "email-005");
    assert_eq!(summary[0].classification, "OFFICIAL_OPEN");
    assert!(summary[0].redacted);
    assert!(!summary[0].denied);
    assert_eq!(summary[1].resource_id, "email-001");
    assert_eq!(summary[1].classification, "CONFIDENTIAL_CLOUD_ELIGIBLE");
    assert!(summary[1].denied);
}

#[test]
fn record_without_id_is_unknown() {
    let record = Record::from_value(json!({"title": "x"})).expect("object");
    let summary = summarize(&InvocationOutput::Records {
        kind: ResourceKind::Document,
        items: &[label(&record)],
        denials: &[],
    });
    assert_eq!(summary[0].resource_id, UNKNOWN);
}

#[test]
fn consent_output_is_a_consent_request_resource() {
    let store = ConsentStore::with_defaults();
    let request = store
        .create("op", &[], &[ClassificationLevel::Restricted], 1)
        .expect("create");
    let summary = summarize(&InvocationOutput::Consent(&request));
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].resource_type, "consent_request");
    assert_eq!(summary[0].resource_id, request.consent_id);
    assert_eq!(summary[0].classification, "RESTRICTED");
}

#[test]
fn unrecognized_output_is_one_unknown_entry() {
    let weird = json!({"surprise": [1, 2, 3]});
    let output = InvocationOutput::Unrecognized(&weird);
    let summary = summarize(&output);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].resource_type, UNKNOWN);
    assert_eq!(summary[0].classification, UNKNOWN);
    assert!(output.succeeded());
}

#[test]
fn failure_touches_nothing() {
    let output = InvocationOutput::Failed("boom");
    assert!(summarize(&output).is_empty());
    assert!(!output.succeeded());
    assert_eq!(output.error(), Some("boom"));
}
