//! Newline-delimited JSON request handling.

use std::sync::Arc;

use crosscontext::audit::sink::MemorySink;
use crosscontext::audit::AuditLog;
use crosscontext::consent::ConsentStore;
use crosscontext::ids::SequentialIds;
use crosscontext::pipeline::Pipeline;
use crosscontext::service::CrossContext;
use crosscontext::trust::redactor::Redactor;
use crosscontext::types::default_offset;
use serde_json::Value;

fn service() -> CrossContext {
    let pipeline = Pipeline::new(
        Redactor::with_defaults().expect("patterns compile"),
        Arc::new(AuditLog::new(Box::new(MemorySink::new()))),
    );
    let consents = ConsentStore::new(Box::new(SequentialIds::new("consent_")), default_offset());
    CrossContext::new(pipeline, consents)
        .with_builtin_sources()
        .expect("bundled corpora parse")
        .with_default_actor("officer_042")
}

fn reply(service: &CrossContext, line: &str) -> Value {
    serde_json::from_str(&service.handle_line(line)).expect("reply is JSON")
}

#[test]
fn query_line_returns_result_object() {
    let service = service();
    let out = reply(
        &service,
        r#"{"op":"query","kind":"policies","query":"","type_filter":"hr","clearance":"director"}"#,
    );
    assert_eq!(out["ok"], true);
    assert_eq!(out["result"]["total_count"], 1);
    assert_eq!(out["result"]["items"][0]["id"], "policy-004");
    assert_eq!(out["result"]["items"][0]["classification"], "CONFIDENTIAL_CLOUD_ELIGIBLE");
    assert!(out["result"]["audit_id"].is_string());
    assert!(out.get("error").is_none());
}

#[test]
fn consent_round_trip_over_lines() {
    let service = service();
    let created = reply(
        &service,
        r#"{"op":"request_consent","operation":"Brief","classifications":["RESTRICTED"],"estimated_count":3}"#,
    );
    assert_eq!(created["ok"], true);
    let id = created["result"]["consent_id"].as_str().expect("id").to_owned();
    assert_eq!(created["result"]["status"], "pending");

    let granted = reply(
        &service,
        &format!(r#"{{"op":"grant_consent","consent_id":"{id}"}}"#),
    );
    assert_eq!(granted["result"]["status"], "granted");
    assert_eq!(granted["result"]["resolved_by"], "officer_042");

    let again = reply(
        &service,
        &format!(r#"{{"op":"deny_consent","consent_id":"{id}","reason":"late"}}"#),
    );
    assert_eq!(again["ok"], false);
    assert_eq!(again["error"]["kind"], "terminal_state_conflict");

    let audit = reply(&service, r#"{"op":"recent_audit","limit":5}"#);
    let tools: Vec<&str> = audit["result"]
        .as_array()
        .expect("entries")
        .iter()
        .filter_map(|e| e["tool_name"].as_str())
        .collect();
    assert_eq!(tools, ["request_consent", "grant_consent", "deny_consent"]);
    assert_eq!(audit["result"][0]["actor"], "officer_042");
}

#[test]
fn garbage_is_an_invalid_request() {
    let service = service();
    for line in ["not json", r#"{"op":"nope"}"#, r#"{"op":"query","kind":"emails"}"#] {
        let out = reply(&service, line);
        assert_eq!(out["ok"], false, "{line} should fail");
        assert_eq!(out["error"]["kind"], "invalid_request");
    }
}
