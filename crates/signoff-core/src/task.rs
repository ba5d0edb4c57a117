//! Task: one human work item within a process instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task
///
/// Completed, Rejected, Transferred and Delegated are terminal for the task
/// *record*. A transfer or delegation closes the original row and opens a
/// fresh successor row for the new holder (linked via
/// [`Task::predecessor_task_id`]), so the audit trail of who acted on what
/// stays one-row-one-actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no owner yet
    Pending,

    /// Claimed by an assignee
    Processing,

    /// Approved; terminal
    Completed,

    /// Handed to a new holder who becomes fully accountable; terminal
    Transferred,

    /// Handed to a new holder, original stays of record; terminal
    Delegated,

    /// Rejected; terminal
    Rejected,
}

impl TaskStatus {
    /// Statuses in which a task is still open for action
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Transferred => write!(f, "transferred"),
            Self::Delegated => write!(f, "delegated"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Outcome recorded when a task record is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Approve,
    Reject,
    Transfer,
    Delegate,
}

/// One human work item, owned by an assignee
///
/// Invariants: `assignee_id` is set for every status except freshly-created
/// Pending; `end_time` is set iff `status` is Completed or Rejected;
/// `duration_ms = end_time - start_time` and is non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    /// Owning instance; a task belongs to exactly one
    pub instance_id: Uuid,

    pub task_name: String,
    pub node_id: Option<String>,
    pub node_name: Option<String>,

    pub assignee_id: Option<Uuid>,
    pub assignee_name: Option<String>,

    /// Provenance: set only by transfer/delegate on the closed record and
    /// carried forward onto the successor
    pub original_assignee_id: Option<Uuid>,
    pub original_assignee_name: Option<String>,

    /// Links a transfer/delegate successor back to the record it supersedes
    pub predecessor_task_id: Option<Uuid>,

    pub priority: i32,
    pub due_time: Option<DateTime<Utc>>,

    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub comment: Option<String>,

    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,

    /// Bumped on any write, including the timestamp-only touch on withdraw
    pub update_time: DateTime<Utc>,
}

impl Task {
    /// Create a fresh pending task for an instance
    pub fn new_pending(instance_id: Uuid, task_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            instance_id,
            task_name: task_name.into(),
            node_id: None,
            node_name: None,
            assignee_id: None,
            assignee_name: None,
            original_assignee_id: None,
            original_assignee_name: None,
            predecessor_task_id: None,
            priority: 0,
            due_time: None,
            status: TaskStatus::Pending,
            result: None,
            comment: None,
            create_time: now,
            start_time: None,
            end_time: None,
            duration_ms: None,
            update_time: now,
        }
    }

    /// Whether the task is past its due time
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_time.map(|due| due < now).unwrap_or(false)
    }
}
