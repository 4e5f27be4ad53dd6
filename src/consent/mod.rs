//! Consent requests for operations touching sensitive data.
//!
//! A request is created `pending` and resolves exactly once, to `granted` or
//! `denied`. The table lock is held only to look up or insert an entry; each
//! transition runs under that entry's own lock, so racing resolutions of one
//! id serialize while different ids proceed independently. The first
//! resolution wins and every later one gets
//! [`ConsentError::TerminalStateConflict`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use crate::ids::{IdGenerator, UuidIds};
use crate::trust::access;
use crate::types::{default_offset, ClassificationLevel};

/// Prefix of generated consent ids.
pub const CONSENT_ID_PREFIX: &str = "consent_";

/// Denial reason recorded when the caller gives none.
pub const DEFAULT_DENIAL_REASON: &str = "User denied consent";

/// How many fresh ids to try before giving up on a colliding generator.
const MAX_ID_ATTEMPTS: u32 = 8;

/// Lifecycle status of a consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; terminal.
    Granted,
    /// Refused; terminal.
    Denied,
}

impl ConsentStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consent request and its resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentRequest {
    /// Unique opaque id.
    pub consent_id: String,
    /// What the operation will do.
    pub operation: String,
    /// Tools the operation will call.
    pub tools_involved: Vec<String>,
    /// Distinct classifications involved.
    pub classifications: BTreeSet<ClassificationLevel>,
    /// Highest of `classifications`.
    pub highest_classification: ClassificationLevel,
    /// Whether the highest classification is `RESTRICTED` or above.
    pub requires_consent: bool,
    /// Why consent is or is not needed.
    pub consent_reason: String,
    /// Expected number of records the operation will read.
    pub estimated_data_count: u64,
    /// Current status.
    pub status: ConsentStatus,
    /// When the request was created.
    pub created_at: DateTime<FixedOffset>,
    /// When the request was granted or denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<FixedOffset>>,
    /// Who granted or denied it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Reason given on denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
}

/// Errors from the consent store.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// No request has this id.
    #[error("consent request not found: {0}")]
    NotFound(String),

    /// The request was already resolved; nothing changed.
    #[error("consent request {id} is already {status}")]
    TerminalStateConflict {
        /// The request id.
        id: String,
        /// Its terminal status.
        status: ConsentStatus,
    },

    /// The id generator kept returning ids already in use.
    #[error("could not allocate a unique consent id after {0} attempts")]
    IdAllocation(u32),

    /// A store lock was poisoned by a panicking thread.
    #[error("consent store lock poisoned")]
    LockPoisoned,
}

enum Resolution<'a> {
    Grant,
    Deny(&'a str),
}

/// In-memory table of consent requests.
#[derive(Debug)]
pub struct ConsentStore {
    requests: Mutex<HashMap<String, Arc<Mutex<ConsentRequest>>>>,
    ids: Box<dyn IdGenerator>,
    offset: FixedOffset,
}

impl ConsentStore {
    /// Store using `ids` for allocation and `offset` for timestamps.
    pub fn new(ids: Box<dyn IdGenerator>, offset: FixedOffset) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            ids,
            offset,
        }
    }

    /// Store with `consent_<uuid>` ids and UTC+08:00 timestamps.
    pub fn with_defaults() -> Self {
        Self::new(
            Box::new(UuidIds::with_prefix(CONSENT_ID_PREFIX)),
            default_offset(),
        )
    }

    /// Create a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::IdAllocation`] if the generator cannot produce
    /// an unused id, or [`ConsentError::LockPoisoned`].
    pub fn create(
        &self,
        operation: &str,
        tools: &[String],
        classifications: &[ClassificationLevel],
        estimated_count: u64,
    ) -> Result<ConsentRequest, ConsentError> {
        let levels: BTreeSet<ClassificationLevel> = classifications.iter().copied().collect();
        let highest = access::max_classification(levels.iter().copied());

        let mut table = self
            .requests
            .lock()
            .map_err(|_| ConsentError::LockPoisoned)?;
        let consent_id = self.allocate_id(&table)?;

        let request = ConsentRequest {
            consent_id: consent_id.clone(),
            operation: operation.to_owned(),
            tools_involved: tools.to_vec(),
            requires_consent: access::requires_consent(levels.iter().copied()),
            classifications: levels,
            highest_classification: highest,
            consent_reason: access::consent_reason(highest).to_owned(),
            estimated_data_count: estimated_count,
            status: ConsentStatus::Pending,
            created_at: self.now(),
            resolved_at: None,
            resolved_by: None,
            denial_reason: None,
        };
        table.insert(consent_id, Arc::new(Mutex::new(request.clone())));

        info!(
            consent_id = %request.consent_id,
            highest = %highest,
            requires_consent = request.requires_consent,
            "consent request created"
        );
        Ok(request)
    }

    /// Fetch a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] for unknown ids.
    pub fn get(&self, id: &str) -> Result<ConsentRequest, ConsentError> {
        let entry = self.entry(id)?;
        let request = entry.lock().map_err(|_| ConsentError::LockPoisoned)?;
        Ok(request.clone())
    }

    /// Move a pending request to `granted`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] for unknown ids and
    /// [`ConsentError::TerminalStateConflict`] if already resolved.
    pub fn grant(&self, id: &str, actor: &str) -> Result<ConsentRequest, ConsentError> {
        self.resolve(id, actor, Resolution::Grant)
    }

    /// Move a pending request to `denied`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::NotFound`] for unknown ids and
    /// [`ConsentError::TerminalStateConflict`] if already resolved.
    pub fn deny(&self, id: &str, actor: &str, reason: &str) -> Result<ConsentRequest, ConsentError> {
        self.resolve(id, actor, Resolution::Deny(reason))
    }

    /// All pending requests, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::LockPoisoned`].
    pub fn list_pending(&self, actor: &str) -> Result<Vec<ConsentRequest>, ConsentError> {
        let entries: Vec<Arc<Mutex<ConsentRequest>>> = {
            let table = self
                .requests
                .lock()
                .map_err(|_| ConsentError::LockPoisoned)?;
            table.values().cloned().collect()
        };

        let mut pending = Vec::new();
        for entry in entries {
            let request = entry.lock().map_err(|_| ConsentError::LockPoisoned)?;
            if request.status == ConsentStatus::Pending {
                pending.push(request.clone());
            }
        }
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.consent_id.cmp(&b.consent_id))
        });

        trace!(actor, count = pending.len(), "listed pending consents");
        Ok(pending)
    }

    fn resolve(
        &self,
        id: &str,
        actor: &str,
        resolution: Resolution<'_>,
    ) -> Result<ConsentRequest, ConsentError> {
        let entry = self.entry(id)?;
        let mut request = entry.lock().map_err(|_| ConsentError::LockPoisoned)?;

        if request.status.is_terminal() {
            warn!(consent_id = id, actor, status = %request.status, "consent already resolved");
            return Err(ConsentError::TerminalStateConflict {
                id: id.to_owned(),
                status: request.status,
            });
        }

        request.resolved_at = Some(self.now());
        request.resolved_by = Some(actor.to_owned());
        match resolution {
            Resolution::Grant => request.status = ConsentStatus::Granted,
            Resolution::Deny(reason) => {
                request.status = ConsentStatus::Denied;
                let reason = if reason.trim().is_empty() {
                    DEFAULT_DENIAL_REASON
                } else {
                    reason
                };
                request.denial_reason = Some(reason.to_owned());
            }
        }

        info!(consent_id = id, actor, status = %request.status, "consent resolved");
        Ok(request.clone())
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<ConsentRequest>>, ConsentError> {
        let table = self
            .requests
            .lock()
            .map_err(|_| ConsentError::LockPoisoned)?;
        table
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_owned()))
    }

    fn allocate_id(
        &self,
        table: &HashMap<String, Arc<Mutex<ConsentRequest>>>,
    ) -> Result<String, ConsentError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            if !table.contains_key(&id) {
                return Ok(id);
            }
            warn!(consent_id = %id, "id generator returned an id already in use");
        }
        Err(ConsentError::IdAllocation(MAX_ID_ATTEMPTS))
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

impl Default for ConsentStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
