//! Identifier allocation for consent requests and audit entries.
//!
//! Stores never invent ids themselves; they are handed an [`IdGenerator`] at
//! construction so tests can make identity predictable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of unique identifiers. Must be safe to call from many threads.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Produce the next identifier.
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers with an optional prefix.
#[derive(Debug, Clone, Default)]
pub struct UuidIds {
    prefix: String,
}

impl UuidIds {
    /// Generator producing `{prefix}{uuid}`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        format!("{}{}", self.prefix, Uuid::new_v4())
    }
}

/// Monotonic counter identifiers: `{prefix}1`, `{prefix}2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Counter starting at 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}{n}", self.prefix)
    }
}
