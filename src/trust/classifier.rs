//! Rule-based sensitivity classifier.
//!
//! Levels are tried from most to least sensitive. A level fires when one of
//! its keywords appears anywhere in the case-folded record text, or when the
//! sender's domain is in its domain set. The first level to fire is assigned
//! together with every rule of that level that matched; a record nothing
//! fires on is `OFFICIAL_OPEN`.
//!
//! Keywords match as substrings, so `confidentiality` fires `confidential`.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{Classification, ClassificationLevel, LabeledRecord, Record, RESERVED_FIELDS};

/// Prefix of triggered-rule entries produced by sender domain matches.
pub const SENDER_DOMAIN_RULE: &str = "sender_domain:";

/// Prefix of notes recorded when a sender field cannot be read.
pub const SKIPPED_SENDER_NOTE: &str = "skipped field ";

/// Fields whose value is treated as the sender address.
const SENDER_FIELDS: &[&str] = &["from", "sender"];

const DEFAULT_REASON: &str = "No sensitive keywords or restricted domains detected";

struct LevelRules {
    level: ClassificationLevel,
    keywords: &'static [&'static str],
    domains: &'static [&'static str],
}

/// Precedence order: most sensitive first.
const RULES: &[LevelRules] = &[
    LevelRules {
        level: ClassificationLevel::ConfidentialCloudEligible,
        keywords: &[
            "budget",
            "procurement",
            "tender",
            "contract",
            "salary",
            "financial",
        ],
        domains: &["vendor.com", "supplier.com", "contractor.gov.sg"],
    },
    LevelRules {
        level: ClassificationLevel::Restricted,
        keywords: &[
            "nric",
            "disciplinary",
            "investigation",
            "medical",
            "personal",
        ],
        domains: &["external-contractor.com", "medical.gov.sg"],
    },
    LevelRules {
        level: ClassificationLevel::OfficialClosed,
        keywords: &["internal", "draft", "review", "confidential", "restricted"],
        domains: &[],
    },
];

/// Classify a record. Pure: the same record always yields the same result.
pub fn classify(record: &Record) -> Classification {
    let text = flatten_text(record);
    let mut notes = Vec::new();
    let domain = sender_domain(record, &mut notes);

    for rules in RULES {
        let mut triggered: Vec<String> = rules
            .keywords
            .iter()
            .filter(|keyword| text.contains(*keyword))
            .map(|keyword| (*keyword).to_owned())
            .collect();

        if let Some(domain) = domain.as_deref() {
            if rules.domains.contains(&domain) {
                triggered.push(format!("{SENDER_DOMAIN_RULE}{domain}"));
            }
        }

        if !triggered.is_empty() {
            debug!(
                id = record.id().unwrap_or("unknown"),
                level = %rules.level,
                rules = ?triggered,
                "record classified"
            );
            return Classification {
                level: rules.level,
                reason: describe(rules.level, &triggered),
                rules_triggered: triggered,
                notes,
            };
        }
    }

    Classification {
        level: ClassificationLevel::OfficialOpen,
        reason: DEFAULT_REASON.to_owned(),
        rules_triggered: Vec::new(),
        notes,
    }
}

/// Classify a record and attach the result.
pub fn label(record: &Record) -> LabeledRecord {
    LabeledRecord::new(record, classify(record))
}

/// Base sentence explaining a level.
pub fn level_summary(level: ClassificationLevel) -> &'static str {
    match level {
        ClassificationLevel::ConfidentialCloudEligible => {
            "Contains sensitive financial or procurement data"
        }
        ClassificationLevel::Restricted => {
            "Contains personal data, disciplinary matters, or medical information"
        }
        ClassificationLevel::OfficialClosed => {
            "Contains internal communications or draft materials"
        }
        ClassificationLevel::OfficialOpen => "Public information with no sensitivity markers",
    }
}

fn describe(level: ClassificationLevel, triggered: &[String]) -> String {
    let parts: Vec<String> = triggered
        .iter()
        .map(|rule| match rule.strip_prefix(SENDER_DOMAIN_RULE) {
            Some(domain) => format!("external sender ({domain})"),
            None => format!("keyword '{rule}'"),
        })
        .collect();
    format!(
        "{} (triggered by: {})",
        level_summary(level),
        parts.join(", ")
    )
}

/// Case-folded text of every non-reserved field value, nested values included.
fn flatten_text(record: &Record) -> String {
    let mut out = String::new();
    for (name, value) in record.fields() {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        push_value(value, &mut out);
    }
    out
}

fn push_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.push_str(&s.to_lowercase());
            out.push('\n');
        }
        Value::Bool(_) | Value::Number(_) => {
            out.push_str(&value.to_string());
            out.push('\n');
        }
        Value::Array(items) => items.iter().for_each(|item| push_value(item, out)),
        Value::Object(map) => map.values().for_each(|item| push_value(item, out)),
    }
}

/// Lower-cased domain of the first sender-style field that holds an address.
///
/// A sender field that is not a string is skipped for domain matching and
/// noted in `notes`; its text still takes part in keyword matching.
fn sender_domain(record: &Record, notes: &mut Vec<String>) -> Option<String> {
    for field in SENDER_FIELDS {
        match record.get(field) {
            Some(Value::String(address)) => {
                let Some((_, domain)) = address.rsplit_once('@') else {
                    continue;
                };
                let domain = domain.trim().trim_end_matches('>').to_lowercase();
                if !domain.is_empty() {
                    return Some(domain);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => {
                warn!(
                    id = record.id().unwrap_or("unknown"),
                    field, "sender field is not a string, skipping domain rules"
                );
                notes.push(format!(
                    "{SKIPPED_SENDER_NOTE}{field} is not a string; domain rules not applied"
                ));
            }
        }
    }
    None
}
