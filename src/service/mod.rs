//! The boundary object callers talk to.
//!
//! [`CrossContext`] owns the pipeline, the consent store and the record
//! sources, all built once at the composition root. Every operation appends
//! exactly one audit entry, success or failure, and an audit failure fails
//! the operation.

pub mod request;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::audit::summary::InvocationOutput;
use crate::audit::{AuditEntry, AuditError, AuditLog};
use crate::config::{Config, IdentityConfig, QueryConfig};
use crate::consent::{ConsentError, ConsentRequest, ConsentStore, CONSENT_ID_PREFIX};
use crate::ids::UuidIds;
use crate::pipeline::{Invocation, Pipeline, QueryResult};
use crate::sources::{QueryParams, RecordSource, StaticSource};
use crate::trust::redactor::Redactor;
use crate::trust::TrustError;
use crate::types::{ClassificationLevel, ResourceKind};

/// Errors surfaced at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A clearance, classification or kind name was not recognised.
    #[error(transparent)]
    InvalidInput(#[from] TrustError),

    /// The consent store rejected the operation.
    #[error(transparent)]
    Consent(#[from] ConsentError),

    /// The audit entry could not be written; nothing was released.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// No source serves this kind of record.
    #[error("no record source for {0}")]
    UnknownSource(ResourceKind),

    /// A result could not be encoded.
    #[error("result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Consent(ConsentError::NotFound(_)) => "not_found",
            Self::Consent(ConsentError::TerminalStateConflict { .. }) => "terminal_state_conflict",
            Self::Consent(_) => "consent_failure",
            Self::Audit(_) => "persistence_failure",
            Self::UnknownSource(_) => "unknown_source",
            Self::Encode(_) => "encode_failure",
        }
    }
}

/// Tool name recorded in the audit log for a query of `kind`.
pub fn query_tool_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Email => "fetch_emails",
        ResourceKind::CalendarEvent => "fetch_calendar",
        ResourceKind::Document => "fetch_documents",
        ResourceKind::Policy => "search_policies",
        ResourceKind::Stakeholder => "fetch_stakeholder",
    }
}

/// Query, consent and audit operations over one pipeline.
pub struct CrossContext {
    pipeline: Pipeline,
    consents: ConsentStore,
    sources: HashMap<ResourceKind, Box<dyn RecordSource>>,
    limits: QueryConfig,
    default_actor: String,
}

impl CrossContext {
    /// Service with no sources and default result caps.
    pub fn new(pipeline: Pipeline, consents: ConsentStore) -> Self {
        Self {
            pipeline,
            consents,
            sources: HashMap::new(),
            limits: QueryConfig::default(),
            default_actor: IdentityConfig::default().default_actor,
        }
    }

    /// Register `source`, replacing any source of the same kind.
    pub fn with_source(mut self, source: Box<dyn RecordSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    /// Register the bundled corpus for every kind.
    ///
    /// # Errors
    ///
    /// Returns the parse error if a bundled corpus is malformed.
    pub fn with_builtin_sources(self) -> Result<Self, serde_json::Error> {
        let sources = StaticSource::builtin_all()?;
        Ok(sources.into_iter().fold(self, |service, source| {
            service.with_source(Box::new(source))
        }))
    }

    /// Replace the result caps.
    pub fn with_limits(mut self, limits: QueryConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the actor used for requests that name none.
    pub fn with_default_actor(mut self, actor: impl Into<String>) -> Self {
        self.default_actor = actor.into();
        self
    }

    /// Build the service described by `config`, resolving the audit log
    /// path against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is invalid, the audit log cannot be
    /// opened, or the bundled corpora cannot be parsed.
    pub fn from_config(config: &Config, base_dir: &Path) -> anyhow::Result<Self> {
        let offset = config.audit.offset()?;
        let audit_path = config.audit.resolved_path(base_dir);
        let audit = AuditLog::open(&audit_path)
            .map_err(|e| {
                anyhow::anyhow!("failed to open audit log at {}: {e}", audit_path.display())
            })?
            .with_retry(config.audit.retry_policy())
            .with_clock(offset, config.audit.timezone.clone());

        let redactor = Redactor::new(config.redaction.self_address.clone())?;
        let pipeline = Pipeline::new(redactor, Arc::new(audit));
        let consents = ConsentStore::new(
            Box::new(UuidIds::with_prefix(CONSENT_ID_PREFIX)),
            offset,
        );

        let service = Self::new(pipeline, consents)
            .with_limits(config.query.clone())
            .with_default_actor(config.identity.default_actor.clone())
            .with_builtin_sources()
            .map_err(|e| anyhow::anyhow!("failed to load bundled records: {e}"))?;

        info!(audit_log = %audit_path.display(), "service ready");
        Ok(service)
    }

    /// The audit log every operation writes to.
    pub fn audit(&self) -> &Arc<AuditLog> {
        self.pipeline.audit()
    }

    /// Result caps in effect.
    pub fn limits(&self) -> &QueryConfig {
        &self.limits
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Fetch records of `params.kind` and pass them through the pipeline
    /// under `clearance`.
    ///
    /// The requested cap is clamped to the configured maximum. An unknown
    /// clearance is not an error: every record is withheld.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownSource`] if no source serves the kind,
    /// or [`ServiceError::Audit`] if the audit entry cannot be written.
    pub fn query(
        &self,
        actor: &str,
        mut params: QueryParams,
        clearance: &str,
    ) -> Result<QueryResult, ServiceError> {
        params.max_results = params.max_results.min(self.limits.max_results_cap);
        let tool_name = query_tool_name(params.kind);
        let input = json!({
            "kind": params.kind,
            "query": params.query,
            "type_filter": params.type_filter,
            "max_results": params.max_results,
            "clearance": clearance,
        });

        let Some(source) = self.sources.get(&params.kind) else {
            let err = ServiceError::UnknownSource(params.kind);
            self.audit()
                .append(actor, tool_name, &input, InvocationOutput::Failed(&err.to_string()))?;
            return Err(err);
        };

        let records = source.search(&params);
        debug!(kind = %params.kind, matched = records.len(), "source search complete");

        let invocation = Invocation {
            actor,
            tool_name,
            input: &input,
            kind: params.kind,
            clearance,
        };
        Ok(self.pipeline.run(&invocation, &records)?)
    }

    // -----------------------------------------------------------------------
    // Consent
    // -----------------------------------------------------------------------

    /// Create a pending consent request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for an unknown classification
    /// name, or a consent or audit failure.
    pub fn request_consent(
        &self,
        actor: &str,
        operation: &str,
        tools: &[String],
        classifications: &[String],
        estimated_count: u64,
    ) -> Result<ConsentRequest, ServiceError> {
        let input = json!({
            "operation_description": operation,
            "tools_involved": tools,
            "data_classifications": classifications,
            "estimated_data_count": estimated_count,
        });
        let outcome = classifications
            .iter()
            .map(|name| ClassificationLevel::parse(name))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ServiceError::from)
            .and_then(|levels| {
                Ok(self
                    .consents
                    .create(operation, tools, &levels, estimated_count)?)
            });
        self.audit_consent(actor, "request_consent", &input, outcome)
    }

    /// Current state of a consent request.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] for unknown ids, or an audit failure.
    pub fn check_consent(&self, actor: &str, id: &str) -> Result<ConsentRequest, ServiceError> {
        let input = json!({ "consent_id": id });
        let outcome = self.consents.get(id).map_err(ServiceError::from);
        self.audit_consent(actor, "check_consent", &input, outcome)
    }

    /// Grant a pending consent request.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] or
    /// [`ConsentError::TerminalStateConflict`], or an audit failure. The
    /// transition stands even if its audit entry then fails to persist.
    pub fn grant_consent(&self, id: &str, actor: &str) -> Result<ConsentRequest, ServiceError> {
        let input = json!({ "consent_id": id, "granted_by": actor });
        let outcome = self.consents.grant(id, actor).map_err(ServiceError::from);
        self.audit_consent(actor, "grant_consent", &input, outcome)
    }

    /// Deny a pending consent request. A blank reason records the default.
    ///
    /// # Errors
    ///
    /// Same as [`Self::grant_consent`].
    pub fn deny_consent(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<ConsentRequest, ServiceError> {
        let input = json!({ "consent_id": id, "denied_by": actor, "reason": reason });
        let outcome = self
            .consents
            .deny(id, actor, reason)
            .map_err(ServiceError::from);
        self.audit_consent(actor, "deny_consent", &input, outcome)
    }

    /// Every pending consent request, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a consent or audit failure.
    pub fn list_pending_consents(&self, actor: &str) -> Result<Vec<ConsentRequest>, ServiceError> {
        let input = json!({ "user_id": actor });
        match self.consents.list_pending(actor) {
            Ok(pending) => {
                self.audit().append(
                    actor,
                    "list_pending_consents",
                    &input,
                    InvocationOutput::Consents(&pending),
                )?;
                Ok(pending)
            }
            Err(err) => {
                self.audit().append(
                    actor,
                    "list_pending_consents",
                    &input,
                    InvocationOutput::Failed(&err.to_string()),
                )?;
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Audit review
    // -----------------------------------------------------------------------

    /// The most recent `limit` audit entries, newest last. Not itself audited.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Audit`] if the log cannot be read.
    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, ServiceError> {
        Ok(self.audit().read_recent(limit)?)
    }

    fn audit_consent(
        &self,
        actor: &str,
        tool_name: &str,
        input: &Value,
        outcome: Result<ConsentRequest, ServiceError>,
    ) -> Result<ConsentRequest, ServiceError> {
        match outcome {
            Ok(request) => {
                self.audit()
                    .append(actor, tool_name, input, InvocationOutput::Consent(&request))?;
                Ok(request)
            }
            Err(err) => {
                self.audit()
                    .append(actor, tool_name, input, InvocationOutput::Failed(&err.to_string()))?;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for CrossContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.sources.keys().map(ResourceKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("CrossContext")
            .field("pipeline", &self.pipeline)
            .field("consents", &self.consents)
            .field("sources", &kinds)
            .field("limits", &self.limits)
            .field("default_actor", &self.default_actor)
            .finish()
    }
}
