//! Process instance: one execution of a definition, tied to a business record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance is live and tasks may be worked
    Running,

    /// All tasks resolved; terminal
    Completed,

    /// Terminated or withdrawn before completion; terminal
    Terminated,

    /// Paused; only Activate is legal
    Suspended,
}

impl InstanceStatus {
    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// One running (or concluded) execution of a process definition
///
/// Invariant: `end_time` is set iff `status` is Completed or Terminated.
/// `current_node_id`/`current_node_name` are advisory — callers maintain
/// them; the engine does not derive routing from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,

    /// Weak reference to the owning definition
    pub definition_id: Uuid,
    pub process_key: String,
    pub process_name: String,

    /// Caller-supplied correlation key to the business record under approval
    pub business_id: Option<String>,

    pub initiator_id: Uuid,
    pub initiator_name: String,
    pub status: InstanceStatus,

    pub current_node_id: Option<String>,
    pub current_node_name: Option<String>,

    /// Opaque key→value map, merged additively on each approval
    pub variables: serde_json::Map<String, serde_json::Value>,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Set on suspend/terminate/withdraw
    pub reason: Option<String>,
}
