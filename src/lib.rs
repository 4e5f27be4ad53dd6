//! CrossContext: a trust boundary for sensitive government records.
//!
//! Every record leaving the boundary is classified, checked against the
//! caller's clearance, scrubbed of personal identifiers, and logged to an
//! append-only audit trail. Operations touching high-sensitivity data can be
//! gated behind one-shot consent requests.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod ids;
pub mod logging;
pub mod types;

pub mod audit;
pub mod consent;
pub mod trust;

pub mod pipeline;
pub mod service;
pub mod sources;
