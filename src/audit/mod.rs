//! Append-only audit log of every boundary invocation.
//!
//! Each entry is one JSON object on its own line. Writes are serialized
//! behind a single lock, ids and timestamps are assigned while it is held, so
//! line order is the order invocations were logged. A failed write is retried
//! a bounded number of times; after that the invocation itself fails.

pub mod sanitize;
pub mod sink;
pub mod summary;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ids::{IdGenerator, UuidIds};
use crate::types::{default_offset, DEFAULT_TIMEZONE};

use self::sanitize::sanitize_input;
use self::sink::{AuditSink, FileSink};
use self::summary::{summarize, InvocationOutput, ResourceAccess};

/// Errors from the audit log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The entry could not be persisted within the retry budget.
    #[error("audit write failed after {attempts} attempt(s): {source}")]
    Persistence {
        /// Attempts made.
        attempts: u32,
        /// Last I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The log could not be opened or read.
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entry could not be encoded.
    #[error("audit entry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The writer lock was poisoned by a panicking thread.
    #[error("audit lock poisoned")]
    LockPoisoned,
}

/// One persisted audit entry. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id.
    pub audit_id: String,
    /// When the entry was written, at the configured fixed offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Timezone label for `timestamp`.
    pub timezone: String,
    /// Who invoked the operation.
    pub actor: String,
    /// Operation name.
    pub tool_name: String,
    /// Input after the deny-list scrub.
    pub sanitized_input: Value,
    /// Resources the invocation touched.
    pub resource_access: Vec<ResourceAccess>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Error message of a failed invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `session_YYYYMMDD` from the invocation's local date.
    pub session_id: String,
}

/// Bounded retry for audit writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Audit log over an [`AuditSink`].
pub struct AuditLog {
    sink: Mutex<Box<dyn AuditSink>>,
    ids: Box<dyn IdGenerator>,
    retry: RetryPolicy,
    offset: FixedOffset,
    timezone: String,
}

impl AuditLog {
    /// Log over `sink` with UUID ids, default retry and UTC+08:00 timestamps.
    pub fn new(sink: Box<dyn AuditSink>) -> Self {
        Self {
            sink: Mutex::new(sink),
            ids: Box::new(UuidIds::default()),
            retry: RetryPolicy::default(),
            offset: default_offset(),
            timezone: DEFAULT_TIMEZONE.to_owned(),
        }
    }

    /// Log appending to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self::new(Box::new(FileSink::open(path)?)))
    }

    /// Replace the id generator.
    pub fn with_ids(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the timestamp offset and its label.
    pub fn with_clock(mut self, offset: FixedOffset, timezone: impl Into<String>) -> Self {
        self.offset = offset;
        self.timezone = timezone.into();
        self
    }

    /// Append one entry for an invocation and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Persistence`] once the retry budget is spent;
    /// the caller must then fail the invocation.
    pub fn append(
        &self,
        actor: &str,
        tool_name: &str,
        raw_input: &Value,
        output: InvocationOutput<'_>,
    ) -> Result<String, AuditError> {
        let sanitized_input = sanitize_input(raw_input);
        let resource_access = summarize(&output);

        let mut sink = self.sink.lock().map_err(|_| AuditError::LockPoisoned)?;

        let timestamp = Utc::now().with_timezone(&self.offset);
        let entry = AuditEntry {
            audit_id: self.ids.next_id(),
            timestamp,
            timezone: self.timezone.clone(),
            actor: actor.to_owned(),
            tool_name: tool_name.to_owned(),
            sanitized_input,
            resource_access,
            success: output.succeeded(),
            error: output.error().map(str::to_owned),
            session_id: format!("session_{}", timestamp.format("%Y%m%d")),
        };
        let line = serde_json::to_string(&entry)?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match sink.append_line(&line) {
                Ok(()) => break,
                Err(err) if already_persisted(&**sink, &line) => {
                    warn!(
                        attempt,
                        error = %err,
                        "audit write reported failure but the entry is stored"
                    );
                    break;
                }
                Err(err) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %err, "audit write failed, retrying");
                    std::thread::sleep(self.retry.backoff);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "audit write failed, giving up");
                    return Err(AuditError::Persistence {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }

        debug!(audit_id = %entry.audit_id, tool = tool_name, actor, "audit entry appended");
        Ok(entry.audit_id)
    }

    /// The most recent `limit` entries, oldest first (newest last).
    ///
    /// Lines that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the log cannot be read.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let lines = {
            let sink = self.sink.lock().map_err(|_| AuditError::LockPoisoned)?;
            sink.read_lines()?
        };
        let skip = lines.len().saturating_sub(limit);
        Ok(lines
            .iter()
            .skip(skip)
            .filter_map(|line| match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable audit line");
                    None
                }
            })
            .collect())
    }
}

/// Whether `line` is already the last stored line. Entry lines carry a
/// unique id, so a match means an earlier attempt landed.
fn already_persisted(sink: &dyn AuditSink, line: &str) -> bool {
    match sink.read_lines() {
        Ok(lines) => lines.last().is_some_and(|last| last == line),
        Err(err) => {
            warn!(error = %err, "could not re-read audit log after failed write");
            false
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("ids", &self.ids)
            .field("retry", &self.retry)
            .field("offset", &self.offset)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
