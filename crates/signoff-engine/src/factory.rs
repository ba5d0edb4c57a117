//! Task factory: the seam where node routing would live
//!
//! The engine does not interpret process definitions, so advancing from a
//! resolved task to the next node is not automated. The [`TaskFactory`]
//! trait is the capability boundary: given an instance and the task that
//! just resolved, return the next work item (or none). A real graph
//! evaluator can slot in here later; [`NoopTaskFactory`] matches the
//! source system, where task creation is the caller's responsibility.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use signoff_core::{ProcessInstance, Task, TaskStatus};
use signoff_store::Assignment;

/// Blueprint for a follow-up task produced by a factory
#[derive(Debug, Clone)]
pub struct NextTask {
    pub task_name: String,
    pub node_id: Option<String>,
    pub node_name: Option<String>,

    /// Pre-assigned holder; `None` leaves the task claimable
    pub assignee: Option<Assignment>,

    pub priority: i32,
    pub due_time: Option<DateTime<Utc>>,
}

impl NextTask {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            node_id: None,
            node_name: None,
            assignee: None,
            priority: 0,
            due_time: None,
        }
    }

    /// Materialize the blueprint as a task row for an instance
    pub fn into_task(self, instance_id: Uuid) -> Task {
        let mut task = Task::new_pending(instance_id, self.task_name);
        task.node_id = self.node_id;
        task.node_name = self.node_name;
        task.priority = self.priority;
        task.due_time = self.due_time;

        if let Some(assignee) = self.assignee {
            task.assignee_id = Some(assignee.user_id);
            task.assignee_name = Some(assignee.user_name);
            task.status = TaskStatus::Processing;
            task.start_time = Some(Utc::now());
        }

        task
    }
}

/// Produces the next task after one resolves
pub trait TaskFactory: Send + Sync + 'static {
    /// Zero-or-one follow-up task for `instance` after `resolved` closed
    fn next_task(&self, instance: &ProcessInstance, resolved: &Task) -> Option<NextTask>;
}

/// Factory that never routes anywhere
pub struct NoopTaskFactory;

impl TaskFactory for NoopTaskFactory {
    fn next_task(&self, _instance: &ProcessInstance, _resolved: &Task) -> Option<NextTask> {
        None
    }
}
