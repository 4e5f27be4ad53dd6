//! Access gate: clearance against classification.
//!
//! Decisions depend on nothing but the two inputs. Unknown clearances fail
//! closed.

use serde::Serialize;

use crate::types::{ClassificationLevel, Clearance};

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Whether the caller may read the record.
    pub granted: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// On denial, the lowest tier that would have been admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_clearance: Option<Clearance>,
}

/// Check a clearance given by name.
pub fn check(clearance: &str, classification: ClassificationLevel) -> AccessDecision {
    match Clearance::parse(clearance) {
        Ok(clearance) => check_clearance(clearance, classification),
        Err(_) => AccessDecision {
            granted: false,
            reason: format!("Invalid user clearance level: {clearance}"),
            required_clearance: None,
        },
    }
}

/// Check a parsed clearance.
pub fn check_clearance(clearance: Clearance, classification: ClassificationLevel) -> AccessDecision {
    if clearance == Clearance::Admin {
        return AccessDecision {
            granted: true,
            reason: "Administrative access granted".to_owned(),
            required_clearance: None,
        };
    }

    if clearance.permits(classification) {
        return AccessDecision {
            granted: true,
            reason: format!("Access granted for {clearance} level user"),
            required_clearance: None,
        };
    }

    let required = Clearance::ALL
        .into_iter()
        .find(|tier| tier.permits(classification));
    let needed = required.map_or("admin", |tier| tier.as_str());
    AccessDecision {
        granted: false,
        reason: format!(
            "Insufficient clearance. {} requires {needed} level access",
            classification.label()
        ),
        required_clearance: required,
    }
}

/// Highest level present, or `OFFICIAL_OPEN` when there are none.
pub fn max_classification<I>(levels: I) -> ClassificationLevel
where
    I: IntoIterator<Item = ClassificationLevel>,
{
    levels.into_iter().max().unwrap_or_default()
}

/// True when the highest level present is `RESTRICTED` or above.
pub fn requires_consent<I>(levels: I) -> bool
where
    I: IntoIterator<Item = ClassificationLevel>,
{
    max_classification(levels) >= ClassificationLevel::Restricted
}

/// Why an operation touching `level` data does or does not need consent.
pub fn consent_reason(level: ClassificationLevel) -> &'static str {
    match level {
        ClassificationLevel::OfficialOpen => "No consent required - public information",
        ClassificationLevel::OfficialClosed => "Internal communications access",
        ClassificationLevel::Restricted => "Access to personal or disciplinary information",
        ClassificationLevel::ConfidentialCloudEligible => {
            "Access to sensitive financial or procurement data"
        }
    }
}
