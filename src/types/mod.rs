//! Record, label and clearance types shared by every pipeline stage.

use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::trust::TrustError;

/// Default local offset (UTC+08:00) for timestamps and session ids.
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 28_800;

/// Default timezone label written next to audit timestamps.
pub const DEFAULT_TIMEZONE: &str = "Asia/Singapore";

/// Field names owned by the pipeline. Values supplied by a source under these
/// names are discarded when the record is labeled.
pub const RESERVED_FIELDS: &[&str] = &[
    "classification",
    "classification_reason",
    "classification_rules_triggered",
    "classification_notes",
    "redacted",
    "redaction_log",
];

/// The default fixed offset used when none is configured.
pub fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

// ---------------------------------------------------------------------------
// Classification levels
// ---------------------------------------------------------------------------

/// Sensitivity tiers ordered lowest to highest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationLevel {
    /// Public information.
    #[default]
    #[serde(alias = "OFFICIAL (OPEN)")]
    OfficialOpen,
    /// Internal communications and drafts.
    #[serde(alias = "OFFICIAL (CLOSED)")]
    OfficialClosed,
    /// Personal, disciplinary or medical data.
    Restricted,
    /// Financial and procurement data.
    #[serde(alias = "CONFIDENTIAL CLOUD-ELIGIBLE")]
    ConfidentialCloudEligible,
}

impl ClassificationLevel {
    /// Every level, lowest sensitivity first.
    pub const ALL: [ClassificationLevel; 4] = [
        Self::OfficialOpen,
        Self::OfficialClosed,
        Self::Restricted,
        Self::ConfidentialCloudEligible,
    ];

    /// Wire name, e.g. `OFFICIAL_OPEN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficialOpen => "OFFICIAL_OPEN",
            Self::OfficialClosed => "OFFICIAL_CLOSED",
            Self::Restricted => "RESTRICTED",
            Self::ConfidentialCloudEligible => "CONFIDENTIAL_CLOUD_ELIGIBLE",
        }
    }

    /// Human-facing label, e.g. `OFFICIAL (OPEN)`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OfficialOpen => "OFFICIAL (OPEN)",
            Self::OfficialClosed => "OFFICIAL (CLOSED)",
            Self::Restricted => "RESTRICTED",
            Self::ConfidentialCloudEligible => "CONFIDENTIAL CLOUD-ELIGIBLE",
        }
    }

    /// Parse either the wire name or the display label.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidInput`] for any other value.
    pub fn parse(s: &str) -> Result<Self, TrustError> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == trimmed || level.label() == trimmed)
            .ok_or_else(|| TrustError::InvalidInput {
                field: "classification",
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for ClassificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationLevel {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Clearance
// ---------------------------------------------------------------------------

/// Caller clearance tiers ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clearance {
    /// Basic government officer.
    Officer,
    /// Senior roles with access to personal data.
    SeniorOfficer,
    /// Full read access to every classification.
    Director,
    /// System administrator; wildcard access.
    Admin,
}

impl Clearance {
    /// Every tier, lowest privilege first.
    pub const ALL: [Clearance; 4] = [
        Self::Officer,
        Self::SeniorOfficer,
        Self::Director,
        Self::Admin,
    ];

    /// Wire name, e.g. `senior_officer`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Officer => "officer",
            Self::SeniorOfficer => "senior_officer",
            Self::Director => "director",
            Self::Admin => "admin",
        }
    }

    /// Classification levels this tier may read.
    pub fn allowed(&self) -> &'static [ClassificationLevel] {
        use ClassificationLevel::*;
        match self {
            Self::Officer => &[OfficialOpen, OfficialClosed],
            Self::SeniorOfficer => &[OfficialOpen, OfficialClosed, Restricted],
            Self::Director | Self::Admin => &ClassificationLevel::ALL,
        }
    }

    /// Whether this tier may read records at `level`.
    pub fn permits(&self, level: ClassificationLevel) -> bool {
        *self == Self::Admin || self.allowed().contains(&level)
    }

    /// Parse a clearance name.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, TrustError> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TrustError::InvalidInput {
                field: "clearance",
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for Clearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resource kinds and redaction context
// ---------------------------------------------------------------------------

/// Kind of domain item a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Mail message.
    #[serde(alias = "emails")]
    Email,
    /// Calendar event.
    #[serde(alias = "events", alias = "calendar")]
    CalendarEvent,
    /// Stored document.
    #[serde(alias = "documents")]
    Document,
    /// Published policy.
    #[serde(alias = "policies")]
    Policy,
    /// Stakeholder profile.
    #[serde(alias = "stakeholders")]
    Stakeholder,
}

impl ResourceKind {
    /// Every kind.
    pub const ALL: [ResourceKind; 5] = [
        Self::Email,
        Self::CalendarEvent,
        Self::Document,
        Self::Policy,
        Self::Stakeholder,
    ];

    /// Singular resource type name used in audit summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::CalendarEvent => "calendar_event",
            Self::Document => "document",
            Self::Policy => "policy",
            Self::Stakeholder => "stakeholder",
        }
    }

    /// Collection name, e.g. `emails`.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Email => "emails",
            Self::CalendarEvent => "events",
            Self::Document => "documents",
            Self::Policy => "policies",
            Self::Stakeholder => "stakeholders",
        }
    }

    /// Redaction context records of this kind are processed under.
    pub fn redaction_context(&self) -> RedactionContext {
        match self {
            Self::CalendarEvent => RedactionContext::MeetingParticipant,
            _ => RedactionContext::General,
        }
    }

    /// Parse a singular or collection name.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, TrustError> {
        let lower = s.trim().to_lowercase();
        if lower == "calendar" {
            return Ok(Self::CalendarEvent);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower || k.collection() == lower)
            .ok_or_else(|| TrustError::InvalidInput {
                field: "resource kind",
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage context that tunes redaction decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionContext {
    /// Ordinary retrieval; contact details are scrubbed.
    #[default]
    General,
    /// Meeting data; participant addresses stay visible for follow-up.
    MeetingParticipant,
}

impl RedactionContext {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::MeetingParticipant => "meeting_participant",
        }
    }

    /// Map a free-form context name; anything unrecognised is `general`.
    pub fn from_name(name: &str) -> Self {
        if name == "meeting_participant" {
            Self::MeetingParticipant
        } else {
            Self::General
        }
    }
}

// ---------------------------------------------------------------------------
// PII categories
// ---------------------------------------------------------------------------

/// Recognised PII categories, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    /// National registration identity number.
    Nric,
    /// Local phone number.
    Phone,
    /// Email address.
    Email,
    /// Six-digit postal code.
    PostalCode,
}

impl PiiKind {
    /// Every category in scan order.
    pub const ALL: [PiiKind; 4] = [Self::Nric, Self::Phone, Self::Email, Self::PostalCode];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nric => "nric",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::PostalCode => "postal_code",
        }
    }

    /// Match pattern for this category.
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Nric => r"\b[STFG]\d{7}[A-Z]\b",
            Self::Phone => r"\b(?:\+?65[-\s]?)?[689]\d{7}\b",
            Self::Email => r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b",
            Self::PostalCode => r"\b\d{6}\b",
        }
    }

    /// Typed placeholder substituted for a match. Never matches any pattern.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Nric => "[REDACTED NRIC]",
            Self::Phone => "[REDACTED PHONE]",
            Self::Email => "[REDACTED EMAIL]",
            Self::PostalCode => "[REDACTED POSTAL_CODE]",
        }
    }

    /// Why a match in this category is scrubbed.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Nric => "National Registration Identity Card number (highly sensitive)",
            Self::Phone => "Personal phone number (privacy protection)",
            Self::Email => "Email address (privacy protection for non-meeting participants)",
            Self::PostalCode => "Residential postal code (location privacy)",
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A raw record from a source: an ordered mapping of field names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Wrap an ordered field map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidInput`] if the value is not an object.
    pub fn from_value(value: Value) -> Result<Self, TrustError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(TrustError::InvalidInput {
                field: "record",
                value: other.to_string(),
            }),
        }
    }

    /// The record's `id` field, when it is a string.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields in source order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume the record, returning its fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// Outcome of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned level.
    #[serde(rename = "classification")]
    pub level: ClassificationLevel,
    /// Human-readable explanation.
    #[serde(rename = "classification_reason")]
    pub reason: String,
    /// Keywords and `sender_domain:` rules that fired for the assigned level.
    #[serde(rename = "classification_rules_triggered")]
    pub rules_triggered: Vec<String>,
    /// Fields that could not be read and were skipped.
    #[serde(
        rename = "classification_notes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub notes: Vec<String>,
}

/// One replaced PII span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionEntry {
    /// Field the span was found in.
    pub field: String,
    /// Category of the span.
    pub pii_type: PiiKind,
    /// Placeholder written in its place.
    pub placeholder: String,
    /// Why it was redacted.
    pub reason: String,
}

impl RedactionEntry {
    /// Log entry for a `kind` match in `field`.
    pub fn new(field: &str, kind: PiiKind) -> Self {
        Self {
            field: field.to_owned(),
            pii_type: kind,
            placeholder: kind.placeholder().to_owned(),
            reason: kind.reason().to_owned(),
        }
    }
}

/// A record after classification (and possibly redaction).
///
/// Serializes as the record's own fields followed by the pipeline's
/// annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord {
    /// Source fields, minus any [`RESERVED_FIELDS`].
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Assigned classification.
    #[serde(flatten)]
    pub classification: Classification,
    /// True once at least one PII span has been replaced.
    pub redacted: bool,
    /// Every replacement made so far, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redaction_log: Vec<RedactionEntry>,
}

impl LabeledRecord {
    /// Attach a classification to a raw record.
    pub fn new(record: &Record, classification: Classification) -> Self {
        let fields = record
            .fields()
            .iter()
            .filter(|(name, _)| !RESERVED_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            fields,
            classification,
            redacted: false,
            redaction_log: Vec::new(),
        }
    }

    /// The record's `id` field, when it is a string.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// Assigned level.
    pub fn level(&self) -> ClassificationLevel {
        self.classification.level
    }
}

/// A record withheld by the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDenial {
    /// Id of the withheld record, or `unknown`.
    pub id: String,
    /// Its classification.
    pub classification: ClassificationLevel,
    /// Why it was withheld.
    pub reason: String,
    /// Lowest clearance that would have been admitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_clearance: Option<Clearance>,
}
