//! Error taxonomy for engine operations
//!
//! Every variant except `Internal` is a recoverable, caller-visible outcome:
//! the calling layer maps them to its own error surface and none of them
//! should abort the process. A `ConcurrentModification` (or `AlreadyClaimed`
//! on claim) is expected under load and is not retried by the engine.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Which entity a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Definition,
    Instance,
    Task,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Definition => write!(f, "definition"),
            Self::Instance => write!(f, "instance"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced task/instance/definition does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    /// Transition is not legal from the entity's current status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller is not the authorized assignee/initiator
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or malformed input (e.g. reject without a comment)
    #[error("validation error: {0}")]
    Validation(String),

    /// Claim lost the race: the task already has an owner
    #[error("task already claimed: {0}")]
    AlreadyClaimed(Uuid),

    /// Compare-and-set lost a race with a concurrent writer
    #[error("concurrent modification on {0}")]
    ConcurrentModification(Uuid),

    /// Unexpected store failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn definition_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: EntityKind::Definition,
            id,
        }
    }

    pub fn instance_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: EntityKind::Instance,
            id,
        }
    }

    pub fn task_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: EntityKind::Task,
            id,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable tag, used in batch failure itemization
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::AlreadyClaimed(_) => "already_claimed",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Internal(_) => "internal",
        }
    }
}
