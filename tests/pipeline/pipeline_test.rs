//! End-to-end pipeline ordering, denial and audit tests.

use std::sync::Arc;
use std::time::Duration;

use crosscontext::audit::sink::MemorySink;
use crosscontext::audit::{AuditError, AuditLog, RetryPolicy};
use crosscontext::ids::SequentialIds;
use crosscontext::pipeline::{Invocation, Pipeline};
use crosscontext::trust::redactor::Redactor;
use crosscontext::types::{ClassificationLevel, Clearance, RedactionContext, Record, ResourceKind};
use serde_json::{json, Value};

fn records() -> Vec<Record> {
    [
        json!({"id": "e-1", "subject": "Town hall", "snippet": "Call 91234567"}),
        json!({"id": "e-2", "subject": "Budget review", "from": "a@vendor.com"}),
        json!({"id": "e-3", "subject": "Medical leave for S1234567D"}),
        json!({"id": "e-4", "subject": "Draft agenda"}),
    ]
    .into_iter()
    .map(|v| Record::from_value(v).expect("object"))
    .collect()
}

fn pipeline() -> (Pipeline, MemorySink) {
    let sink = MemorySink::new();
    let audit = AuditLog::new(Box::new(sink.clone()))
        .with_ids(Box::new(SequentialIds::new("audit-")))
        .with_retry(RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
        });
    let redactor = Redactor::with_defaults().expect("patterns compile");
    (Pipeline::new(redactor, Arc::new(audit)), sink)
}

fn invocation<'a>(input: &'a Value, clearance: &'a str) -> Invocation<'a> {
    Invocation {
        actor: "officer_001",
        tool_name: "fetch_emails",
        input,
        kind: ResourceKind::Email,
        clearance,
    }
}

#[test]
fn officer_gets_open_and_closed_records_only() {
    let (pipeline, sink) = pipeline();
    let input = json!({"query": ""});
    let result = pipeline
        .run(&invocation(&input, "officer"), &records())
        .expect("run");

    let ids: Vec<&str> = result.items.iter().filter_map(|r| r.id()).collect();
    assert_eq!(ids, ["e-1", "e-4"]);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.audit_id, "audit-1");

    let denials = result.access_denials.as_ref().expect("denials present");
    assert_eq!(denials.len(), 2);
    assert_eq!(denials[0].id, "e-2");
    assert_eq!(
        denials[0].classification,
        ClassificationLevel::ConfidentialCloudEligible
    );
    assert_eq!(denials[0].required_clearance, Some(Clearance::Director));
    assert_eq!(denials[1].id, "e-3");
    assert_eq!(denials[1].required_clearance, Some(Clearance::SeniorOfficer));
    assert_eq!(
        result.access_summary.as_deref(),
        Some(
            "2 of 4 records withheld: \
             Insufficient clearance. CONFIDENTIAL CLOUD-ELIGIBLE requires director level access (1); \
             Insufficient clearance. RESTRICTED requires senior_officer level access (1)"
        )
    );

    // Withheld records never reach the redactor or the caller.
    let wire = serde_json::to_string(&result).expect("serialize");
    assert!(!wire.contains("S1234567D"));
    assert!(!wire.contains("vendor.com"));

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    let entry: Value = serde_json::from_str(&lines[0]).expect("json");
    let access = entry["resource_access"].as_array().expect("array");
    assert_eq!(access.len(), 4);
    assert_eq!(access[0]["resource_id"], "e-1");
    assert_eq!(access[0]["redacted"], true);
    assert_eq!(access[2]["denied"], true);
}

#[test]
fn admitted_records_are_redacted() {
    let (pipeline, _) = pipeline();
    let input = json!({});
    let result = pipeline
        .run(&invocation(&input, "director"), &records())
        .expect("run");

    assert_eq!(result.total_count, 4);
    assert!(result.access_denials.is_none());
    assert!(result.access_summary.is_none());
    let first = &result.items[0];
    assert!(first.redacted);
    assert_eq!(first.fields["snippet"], "Call [REDACTED PHONE]");
    let third = &result.items[2];
    assert_eq!(third.fields["subject"], "Medical leave for [REDACTED NRIC]");
    assert_eq!(third.level(), ClassificationLevel::Restricted);
}

#[test]
fn unknown_clearance_withholds_everything_but_is_still_audited() {
    let (pipeline, sink) = pipeline();
    let input = json!({});
    let result = pipeline
        .run(&invocation(&input, "superuser"), &records())
        .expect("run");
    assert!(result.items.is_empty());
    let denials = result.access_denials.expect("denials");
    assert_eq!(denials.len(), 4);
    assert!(denials
        .iter()
        .all(|d| d.reason == "Invalid user clearance level: superuser"));
    assert_eq!(
        result.access_summary.as_deref(),
        Some("4 of 4 records withheld: Invalid user clearance level: superuser (4)")
    );
    assert_eq!(sink.lines().len(), 1);
}

#[test]
fn empty_batch_still_produces_one_entry() {
    let (pipeline, sink) = pipeline();
    let input = json!({"query": "nothing"});
    let result = pipeline.run(&invocation(&input, "officer"), &[]).expect("run");
    assert_eq!(result.total_count, 0);
    assert!(result.access_denials.is_none());
    assert_eq!(sink.lines().len(), 1);
}

#[test]
fn audit_failure_releases_nothing() {
    let (pipeline, sink) = pipeline();
    sink.fail_next(2);
    let input = json!({});
    let result = pipeline.run(&invocation(&input, "admin"), &records());
    assert!(matches!(result, Err(AuditError::Persistence { .. })));
    assert!(sink.lines().is_empty());
}

#[test]
fn caller_records_are_not_modified() {
    let (pipeline, _) = pipeline();
    let input = records();
    let before = input.clone();
    let batch = pipeline.process(&input, "admin", RedactionContext::General);
    assert_eq!(batch.items.len(), 4);
    assert_eq!(input, before);
}

#[test]
fn calendar_context_keeps_attendee_addresses() {
    let (pipeline, _) = pipeline();
    let events = vec![Record::from_value(json!({
        "id": "event-9",
        "title": "Sync",
        "description": "Bring notes, ping lee@moh.gov.sg or 91234567",
    }))
    .expect("object")];
    let batch = pipeline.process(&events, "officer", RedactionContext::MeetingParticipant);
    assert_eq!(
        batch.items[0].fields["description"],
        "Bring notes, ping lee@moh.gov.sg or [REDACTED PHONE]"
    );
}
