//! Trust-and-safety stages: classification, redaction and access gating.
//!
//! All three are stateless. The classifier and access gate are free
//! functions; the redactor holds only its compiled patterns and can be shared
//! across threads behind a plain reference.

pub mod access;
pub mod classifier;
pub mod redactor;

/// Errors from the trust stages.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// A clearance, classification or kind name was not recognised.
    #[error("invalid {field}: {value}")]
    InvalidInput {
        /// What was being parsed.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A PII pattern failed to compile.
    #[error("invalid PII pattern: {0}")]
    Pattern(#[from] regex::Error),
}
