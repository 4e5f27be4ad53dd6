//! Record providers feeding the pipeline.
//!
//! Sources are opaque: they return raw records and know nothing about
//! classification or clearance. [`StaticSource`] serves an in-memory corpus
//! with plain term matching; real deployments plug in their own
//! [`RecordSource`].

use serde_json::Value;

use crate::types::{Record, ResourceKind};

/// Result cap used by [`QueryParams::all`].
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Query parameters shared by every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    /// Kind of record to fetch.
    pub kind: ResourceKind,
    /// Free-text query; any whitespace-separated term may match. Empty matches all.
    pub query: String,
    /// Kind-specific type filter (policy type, document category).
    pub type_filter: Option<String>,
    /// Result cap.
    pub max_results: usize,
}

impl QueryParams {
    /// Parameters for every record of `kind`, up to the default cap.
    pub fn all(kind: ResourceKind) -> Self {
        Self {
            kind,
            query: String::new(),
            type_filter: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A provider of raw records of one kind.
pub trait RecordSource: Send + Sync {
    /// Kind of records this source serves.
    fn kind(&self) -> ResourceKind;

    /// Records matching `params`, at most `params.max_results` of them.
    fn search(&self, params: &QueryParams) -> Vec<Record>;
}

/// Document categories and the keywords that identify them.
const DOCUMENT_CATEGORIES: &[(&str, &[&str])] = &[
    ("policy", &["policy", "guidelines", "/policies/"]),
    ("proposal", &["proposal", "/proposals/"]),
    ("report", &["analysis", "evaluation", "/reports/"]),
    ("presentation", &["presentation", "pptx", "/communications/"]),
    ("spreadsheet", &["xlsx", "criteria"]),
];

/// In-memory source over a fixed list of records.
#[derive(Debug, Clone)]
pub struct StaticSource {
    kind: ResourceKind,
    records: Vec<Record>,
}

impl StaticSource {
    /// Source serving `records`.
    pub fn new(kind: ResourceKind, records: Vec<Record>) -> Self {
        Self { kind, records }
    }

    /// Source over the corpus bundled with the crate for `kind`.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the bundled corpus is malformed.
    pub fn builtin(kind: ResourceKind) -> Result<Self, serde_json::Error> {
        let raw = match kind {
            ResourceKind::Email => include_str!("fixtures/emails.json"),
            ResourceKind::CalendarEvent => include_str!("fixtures/events.json"),
            ResourceKind::Document => include_str!("fixtures/documents.json"),
            ResourceKind::Policy => include_str!("fixtures/policies.json"),
            ResourceKind::Stakeholder => include_str!("fixtures/stakeholders.json"),
        };
        let records: Vec<Record> = serde_json::from_str(raw)?;
        Ok(Self::new(kind, records))
    }

    /// Bundled sources for every kind.
    ///
    /// # Errors
    ///
    /// Returns the parse error if a bundled corpus is malformed.
    pub fn builtin_all() -> Result<Vec<Self>, serde_json::Error> {
        ResourceKind::ALL.into_iter().map(Self::builtin).collect()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the source holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for StaticSource {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn search(&self, params: &QueryParams) -> Vec<Record> {
        let terms: Vec<String> = params
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let type_filter = params
            .type_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        self.records
            .iter()
            .filter(|record| {
                terms.is_empty() || {
                    let text = field_text(record, search_fields(self.kind));
                    terms.iter().any(|term| text.contains(term.as_str()))
                }
            })
            .filter(|record| {
                type_filter
                    .as_deref()
                    .map_or(true, |filter| matches_type(self.kind, record, filter))
            })
            .take(params.max_results)
            .cloned()
            .collect()
    }
}

/// Fields searched for each kind.
fn search_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Email => &["subject", "from", "snippet"],
        ResourceKind::CalendarEvent => &["title", "description", "attendees"],
        ResourceKind::Document => &["title", "snippet", "owner", "folder_path"],
        ResourceKind::Policy => &[
            "title",
            "summary",
            "policy_type",
            "ministry",
            "relevant_sections",
        ],
        ResourceKind::Stakeholder => &["name", "email", "organization", "role"],
    }
}

fn push_strings(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(&s.to_lowercase());
            out.push(' ');
        }
        Value::Array(items) => items.iter().for_each(|v| push_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| push_strings(v, out)),
        _ => {}
    }
}

fn field_text(record: &Record, fields: &[&str]) -> String {
    let mut text = String::new();
    for field in fields {
        if let Some(value) = record.get(field) {
            push_strings(value, &mut text);
        }
    }
    text
}

/// Type filter: policies match on type or title; documents on category
/// keywords, with unknown categories letting everything through. Other kinds
/// ignore the filter.
fn matches_type(kind: ResourceKind, record: &Record, filter: &str) -> bool {
    match kind {
        ResourceKind::Policy => field_text(record, &["policy_type", "title"]).contains(filter),
        ResourceKind::Document => {
            match DOCUMENT_CATEGORIES.iter().find(|(name, _)| *name == filter) {
                Some((_, keywords)) => {
                    let text = field_text(record, &["title", "snippet", "folder_path"]);
                    keywords.iter().any(|keyword| text.contains(keyword))
                }
                None => true,
            }
        }
        ResourceKind::Email
        | ResourceKind::CalendarEvent
        | ResourceKind::Stakeholder => true,
    }
}
