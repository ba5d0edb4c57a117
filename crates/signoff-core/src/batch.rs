//! Batch action types
//!
//! Batch processing is a queue of independent attempts: one item's failure
//! is itemized and never prevents later items from being processed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of actions a batch may apply
///
/// Dispatching on an enum instead of an action string makes unsupported
/// actions a compile-time concern for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    Approve,
    Reject,
}

impl std::fmt::Display for BatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// One failed item in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub task_id: Uuid,

    /// Machine-readable error kind (`forbidden`, `invalid_state`, ...)
    pub error_kind: String,

    /// Human-readable reason
    pub reason: String,
}

/// Itemized outcome of a batch operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub success_ids: Vec<Uuid>,
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.success_ids.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}
