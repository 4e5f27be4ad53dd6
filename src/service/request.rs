//! Newline-delimited JSON request handling for `crosscontext serve`.
//!
//! Each line is one [`Request`] tagged by `op`; each reply is one [`Response`]
//! line. Requests that name no actor run as the configured default actor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::sources::QueryParams;
use crate::types::ResourceKind;

use super::{CrossContext, ServiceError};

/// Entries returned by `recent_audit` when no limit is given.
pub const DEFAULT_AUDIT_LIMIT: usize = 10;

fn default_audit_limit() -> usize {
    DEFAULT_AUDIT_LIMIT
}

/// One boundary call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Fetch records through the pipeline.
    Query {
        /// Caller identity.
        #[serde(default)]
        actor: Option<String>,
        /// Kind of record, singular or collection name.
        kind: ResourceKind,
        /// Free-text query.
        #[serde(default)]
        query: String,
        /// Kind-specific type filter.
        #[serde(default)]
        type_filter: Option<String>,
        /// Result cap; clamped to the configured maximum.
        #[serde(default)]
        max_results: Option<usize>,
        /// Caller clearance name.
        clearance: String,
    },
    /// Create a consent request.
    RequestConsent {
        /// Caller identity.
        #[serde(default)]
        actor: Option<String>,
        /// What the operation will do.
        operation: String,
        /// Tools the operation will call.
        #[serde(default)]
        tools: Vec<String>,
        /// Classification names involved.
        #[serde(default)]
        classifications: Vec<String>,
        /// Expected number of records.
        #[serde(default)]
        estimated_count: u64,
    },
    /// Read a consent request.
    CheckConsent {
        /// Caller identity.
        #[serde(default)]
        actor: Option<String>,
        /// Request id.
        consent_id: String,
    },
    /// Grant a consent request.
    GrantConsent {
        /// Who grants it.
        #[serde(default)]
        actor: Option<String>,
        /// Request id.
        consent_id: String,
    },
    /// Deny a consent request.
    DenyConsent {
        /// Who denies it.
        #[serde(default)]
        actor: Option<String>,
        /// Request id.
        consent_id: String,
        /// Why; blank records the default reason.
        #[serde(default)]
        reason: String,
    },
    /// List pending consent requests.
    ListPendingConsents {
        /// Caller identity.
        #[serde(default)]
        actor: Option<String>,
    },
    /// Read the tail of the audit log.
    RecentAudit {
        /// Number of entries.
        #[serde(default = "default_audit_limit")]
        limit: usize,
    },
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Operation result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Failure details in a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error kind, e.g. `not_found`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl Response {
    /// Successful reply carrying `result`.
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed reply.
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }
}

impl From<Result<Value, ServiceError>> for Response {
    fn from(result: Result<Value, ServiceError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(err) => Self::failure(err.kind(), err.to_string()),
        }
    }
}

impl CrossContext {
    /// Run one request and return its result as JSON.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying operation returns.
    pub fn dispatch(&self, request: Request) -> Result<Value, ServiceError> {
        let default_actor = self.default_actor.as_str();
        match request {
            Request::Query {
                actor,
                kind,
                query,
                type_filter,
                max_results,
                clearance,
            } => {
                let params = QueryParams {
                    kind,
                    query,
                    type_filter,
                    max_results: max_results.unwrap_or(self.limits().default_max_results),
                };
                let actor = actor.as_deref().unwrap_or(default_actor);
                Ok(serde_json::to_value(self.query(actor, params, &clearance)?)?)
            }
            Request::RequestConsent {
                actor,
                operation,
                tools,
                classifications,
                estimated_count,
            } => {
                let actor = actor.as_deref().unwrap_or(default_actor);
                let request = self.request_consent(
                    actor,
                    &operation,
                    &tools,
                    &classifications,
                    estimated_count,
                )?;
                Ok(serde_json::to_value(request)?)
            }
            Request::CheckConsent { actor, consent_id } => {
                let actor = actor.as_deref().unwrap_or(default_actor);
                Ok(serde_json::to_value(self.check_consent(actor, &consent_id)?)?)
            }
            Request::GrantConsent { actor, consent_id } => {
                let actor = actor.as_deref().unwrap_or(default_actor);
                Ok(serde_json::to_value(self.grant_consent(&consent_id, actor)?)?)
            }
            Request::DenyConsent {
                actor,
                consent_id,
                reason,
            } => {
                let actor = actor.as_deref().unwrap_or(default_actor);
                Ok(serde_json::to_value(
                    self.deny_consent(&consent_id, actor, &reason)?,
                )?)
            }
            Request::ListPendingConsents { actor } => {
                let actor = actor.as_deref().unwrap_or(default_actor);
                Ok(serde_json::to_value(self.list_pending_consents(actor)?)?)
            }
            Request::RecentAudit { limit } => Ok(serde_json::to_value(self.recent_audit(limit)?)?),
        }
    }

    /// Parse one request line, run it, and encode the reply as one line.
    pub fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => Response::from(self.dispatch(request)),
            Err(err) => {
                warn!(error = %err, "unparseable request line");
                Response::failure("invalid_request", err.to_string())
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(
                r#"{{"ok":false,"error":{{"kind":"encode_failure","message":"{}"}}}}"#,
                err.to_string().replace('"', "'")
            )
        })
    }
}
