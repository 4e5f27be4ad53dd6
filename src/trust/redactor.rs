//! Context-aware PII redaction for labeled records.

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::types::{LabeledRecord, PiiKind, RedactionContext, RedactionEntry};

use super::TrustError;

/// Address of the calling officer; never scrubbed from their own recipient list.
pub const DEFAULT_SELF_ADDRESS: &str = "you@agency.gov.sg";

/// Fields listing meeting attendees or participants.
const PARTICIPANT_FIELDS: &[&str] = &["attendees", "participants"];

/// Fields listing the recipients of a message.
const RECIPIENT_FIELDS: &[&str] = &["to"];

/// Categories in the order their matches claim text.
const MATCH_ORDER: [PiiKind; 4] = [
    PiiKind::Email,
    PiiKind::Nric,
    PiiKind::Phone,
    PiiKind::PostalCode,
];

/// One pattern match in a field.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    kind: PiiKind,
    redact: bool,
}

impl Span {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Replaces PII spans in string fields with typed placeholders.
///
/// Every occurrence of a match is replaced, not only the first. Re-running
/// on its own output changes nothing: placeholders never match a pattern and
/// earlier log entries are carried over.
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<(PiiKind, Regex)>,
    self_address: String,
}

impl Redactor {
    /// Compile the PII patterns.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Pattern`] if a pattern fails to compile.
    pub fn new(self_address: impl Into<String>) -> Result<Self, TrustError> {
        let patterns = MATCH_ORDER
            .into_iter()
            .map(|kind| Regex::new(kind.pattern()).map(|re| (kind, re)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            self_address: self_address.into().to_lowercase(),
        })
    }

    /// Redactor for the default caller address.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Pattern`] if a pattern fails to compile.
    pub fn with_defaults() -> Result<Self, TrustError> {
        Self::new(DEFAULT_SELF_ADDRESS)
    }

    /// Redact every string field of `record` under `context`.
    ///
    /// Non-string fields are left untouched. The returned record's `redacted`
    /// flag is set when this or an earlier pass replaced anything.
    pub fn redact(&self, record: &LabeledRecord, context: RedactionContext) -> LabeledRecord {
        let mut out = record.clone();
        let mut log = Vec::new();

        for (field, value) in out.fields.iter_mut() {
            if let Value::String(text) = value {
                if let Some(rewritten) = self.redact_text(field, text, context, &mut log) {
                    *text = rewritten;
                }
            }
        }

        if !log.is_empty() {
            trace!(
                id = out.id().unwrap_or("unknown"),
                replacements = log.len(),
                context = context.as_str(),
                "record redacted"
            );
            out.redacted = true;
            out.redaction_log.extend(log);
        }
        out
    }

    /// Scan one field. Returns the rewritten text if anything was replaced.
    ///
    /// Every pattern runs over the original text. Email addresses are settled
    /// first, kept or not, and no other category may match inside one, so a
    /// kept address is never partly rewritten.
    fn redact_text(
        &self,
        field: &str,
        text: &str,
        context: RedactionContext,
        log: &mut Vec<RedactionEntry>,
    ) -> Option<String> {
        let mut spans: Vec<Span> = Vec::new();
        for (kind, pattern) in &self.patterns {
            for found in pattern.find_iter(text) {
                if spans.iter().any(|s| s.overlaps(found.start(), found.end())) {
                    continue;
                }
                spans.push(Span {
                    start: found.start(),
                    end: found.end(),
                    kind: *kind,
                    redact: self.should_redact(*kind, found.as_str(), field, context),
                });
            }
        }
        spans.retain(|s| s.redact);
        if spans.is_empty() {
            return None;
        }

        spans.sort_by_key(|s| s.start);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in &spans {
            out.push_str(text.get(cursor..span.start)?);
            out.push_str(span.kind.placeholder());
            cursor = span.end;
        }
        out.push_str(text.get(cursor..)?);

        for kind in PiiKind::ALL {
            log.extend(
                spans
                    .iter()
                    .filter(|s| s.kind == kind)
                    .map(|_| RedactionEntry::new(field, kind)),
            );
        }
        Some(out)
    }

    fn should_redact(
        &self,
        kind: PiiKind,
        found: &str,
        field: &str,
        context: RedactionContext,
    ) -> bool {
        match kind {
            PiiKind::Nric | PiiKind::Phone | PiiKind::PostalCode => true,
            PiiKind::Email => {
                if context == RedactionContext::MeetingParticipant
                    || PARTICIPANT_FIELDS.contains(&field)
                {
                    return false;
                }
                !(RECIPIENT_FIELDS.contains(&field) && found.to_lowercase() == self.self_address)
            }
        }
    }
}
