//! Resource-access summaries for audit entries.
//!
//! Every invocation output shape has its own variant and its own mapping, so
//! nothing is recognised by sniffing keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consent::ConsentRequest;
use crate::types::{AccessDenial, LabeledRecord, ResourceKind};

/// Placeholder for ids and classifications that could not be determined.
pub const UNKNOWN: &str = "unknown";

/// One resource touched by an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    /// Resource type, e.g. `email` or `consent_request`.
    pub resource_type: String,
    /// Resource id, or `unknown`.
    pub resource_id: String,
    /// Classification wire name, or `unknown`.
    pub classification: String,
    /// Whether PII was redacted before release.
    pub redacted: bool,
    /// Whether the access gate withheld the resource.
    #[serde(default, skip_serializing_if = "is_false")]
    pub denied: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// What an audited invocation produced.
#[derive(Debug, Clone, Copy)]
pub enum InvocationOutput<'a> {
    /// A record query: released records and withheld ones.
    Records {
        /// Kind of every record in the batch.
        kind: ResourceKind,
        /// Records released to the caller.
        items: &'a [LabeledRecord],
        /// Records withheld by the access gate.
        denials: &'a [AccessDenial],
    },
    /// A single consent request was created, read or resolved.
    Consent(&'a ConsentRequest),
    /// A list of consent requests was read.
    Consents(&'a [ConsentRequest]),
    /// The invocation failed before producing output.
    Failed(&'a str),
    /// Output with no known shape.
    Unrecognized(&'a Value),
}

impl InvocationOutput<'_> {
    /// Whether the invocation succeeded.
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Error message of a failed invocation.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(*message),
            _ => None,
        }
    }
}

/// Resources touched by `output`, in output order.
pub fn summarize(output: &InvocationOutput<'_>) -> Vec<ResourceAccess> {
    match output {
        InvocationOutput::Records {
            kind,
            items,
            denials,
        } => {
            let released = items.iter().map(|item| ResourceAccess {
                resource_type: kind.as_str().to_owned(),
                resource_id: item.id().unwrap_or(UNKNOWN).to_owned(),
                classification: item.level().as_str().to_owned(),
                redacted: item.redacted,
                denied: false,
            });
            let withheld = denials.iter().map(|denial| ResourceAccess {
                resource_type: kind.as_str().to_owned(),
                resource_id: denial.id.clone(),
                classification: denial.classification.as_str().to_owned(),
                redacted: false,
                denied: true,
            });
            released.chain(withheld).collect()
        }
        InvocationOutput::Consent(request) => vec![consent_access(request)],
        InvocationOutput::Consents(requests) => requests.iter().map(consent_access).collect(),
        InvocationOutput::Failed(_) => Vec::new(),
        InvocationOutput::Unrecognized(_) => vec![ResourceAccess {
            resource_type: UNKNOWN.to_owned(),
            resource_id: "unrecognized_output".to_owned(),
            classification: UNKNOWN.to_owned(),
            redacted: false,
            denied: false,
        }],
    }
}

fn consent_access(request: &ConsentRequest) -> ResourceAccess {
    ResourceAccess {
        resource_type: "consent_request".to_owned(),
        resource_id: request.consent_id.clone(),
        classification: request.highest_classification.as_str().to_owned(),
        redacted: false,
        denied: false,
    }
}
