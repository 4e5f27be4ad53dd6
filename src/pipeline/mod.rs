//! Ordered trust pipeline: classify, gate, redact, audit.
//!
//! Every record is labeled, then checked against the caller's clearance.
//! Admitted records are redacted and released; withheld ones go to a denial
//! list with their classification and reason. Each run appends exactly one
//! audit entry, and if that append fails nothing is released.
//!
//! Stages work on copies; the caller's records are never modified.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::audit::summary::InvocationOutput;
use crate::audit::{AuditError, AuditLog};
use crate::trust::redactor::Redactor;
use crate::trust::{access, classifier};
use crate::types::{AccessDenial, LabeledRecord, Record, RedactionContext, ResourceKind};

/// Who is asking, for what, and with which clearance.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Caller identity recorded in the audit log.
    pub actor: &'a str,
    /// Operation name recorded in the audit log.
    pub tool_name: &'a str,
    /// Raw operation input; scrubbed before logging.
    pub input: &'a Value,
    /// Kind of every record in the batch.
    pub kind: ResourceKind,
    /// Caller clearance name; unknown names are denied everything.
    pub clearance: &'a str,
}

/// Records split by the access gate, before auditing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Admitted and redacted records.
    pub items: Vec<LabeledRecord>,
    /// Withheld records.
    pub denials: Vec<AccessDenial>,
}

/// Result released to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Kind of the returned records.
    pub kind: ResourceKind,
    /// Admitted, redacted records.
    pub items: Vec<LabeledRecord>,
    /// Number of records in `items`.
    pub total_count: usize,
    /// Withheld records, present only when some were withheld.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_denials: Option<Vec<AccessDenial>>,
    /// One-line account of withheld records, present only when some were withheld.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_summary: Option<String>,
    /// Id of the audit entry for this invocation.
    pub audit_id: String,
}

/// The pipeline. Holds the shared redactor and audit log.
#[derive(Debug, Clone)]
pub struct Pipeline {
    redactor: Redactor,
    audit: Arc<AuditLog>,
}

impl Pipeline {
    /// Pipeline over an existing redactor and audit log.
    pub fn new(redactor: Redactor, audit: Arc<AuditLog>) -> Self {
        Self { redactor, audit }
    }

    /// Classify, gate and redact `records` without auditing.
    pub fn process(
        &self,
        records: &[Record],
        clearance: &str,
        context: RedactionContext,
    ) -> Batch {
        let mut batch = Batch::default();
        for record in records {
            let labeled = classifier::label(record);
            let decision = access::check(clearance, labeled.level());
            if decision.granted {
                batch.items.push(self.redactor.redact(&labeled, context));
            } else {
                info!(
                    id = labeled.id().unwrap_or("unknown"),
                    classification = %labeled.level(),
                    clearance,
                    reason = %decision.reason,
                    "record withheld"
                );
                batch.denials.push(AccessDenial {
                    id: labeled.id().unwrap_or("unknown").to_owned(),
                    classification: labeled.level(),
                    reason: decision.reason,
                    required_clearance: decision.required_clearance,
                });
            }
        }
        batch
    }

    /// Run the whole pipeline for one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if the audit entry cannot be persisted; no
    /// records are released in that case.
    pub fn run(
        &self,
        invocation: &Invocation<'_>,
        records: &[Record],
    ) -> Result<QueryResult, AuditError> {
        let batch = self.process(
            records,
            invocation.clearance,
            invocation.kind.redaction_context(),
        );

        let audit_id = self.audit.append(
            invocation.actor,
            invocation.tool_name,
            invocation.input,
            InvocationOutput::Records {
                kind: invocation.kind,
                items: &batch.items,
                denials: &batch.denials,
            },
        )?;

        Ok(assemble(invocation.kind, batch, audit_id))
    }

    /// The audit log this pipeline writes to.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }
}

fn assemble(kind: ResourceKind, batch: Batch, audit_id: String) -> QueryResult {
    let Batch { items, denials } = batch;
    let total_count = items.len();
    let (access_denials, access_summary) = if denials.is_empty() {
        (None, None)
    } else {
        let summary = withheld_summary(&denials, total_count);
        (Some(denials), Some(summary))
    };
    QueryResult {
        kind,
        items,
        total_count,
        access_denials,
        access_summary,
        audit_id,
    }
}

/// `"<n> of <total> records withheld: <reason> (<count>); ..."`, one group
/// per distinct denial reason in first-seen order.
fn withheld_summary(denials: &[AccessDenial], released: usize) -> String {
    let mut reasons: Vec<(&str, usize)> = Vec::new();
    for denial in denials {
        match reasons.iter_mut().find(|(reason, _)| *reason == denial.reason) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => reasons.push((denial.reason.as_str(), 1)),
        }
    }
    let causes: Vec<String> = reasons
        .iter()
        .map(|(reason, count)| format!("{reason} ({count})"))
        .collect();
    format!(
        "{} of {} records withheld: {}",
        denials.len(),
        released.saturating_add(denials.len()),
        causes.join("; ")
    )
}
