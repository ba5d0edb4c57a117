//! ProcessStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use signoff_core::{
    DefinitionStatus, InstanceStatus, ProcessDefinition, ProcessInstance, Task, TaskResult,
    TaskStatus,
};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Definition not found
    #[error("definition not found: {0}")]
    DefinitionNotFound(Uuid),

    /// Instance not found
    #[error("instance not found: {0}")]
    InstanceNotFound(Uuid),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Compare-and-set found a status outside the expected set
    #[error("status mismatch on {id}: current status is {actual}")]
    StatusMismatch { id: Uuid, actual: String },

    /// Backend error
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for signoff_core::EngineError {
    fn from(err: StoreError) -> Self {
        use signoff_core::EngineError;
        match err {
            StoreError::DefinitionNotFound(id) => EngineError::definition_not_found(id),
            StoreError::InstanceNotFound(id) => EngineError::instance_not_found(id),
            StoreError::TaskNotFound(id) => EngineError::task_not_found(id),
            // A lost CAS is a concurrent writer by default; operations with a
            // more specific surface (claim) translate it before this runs.
            StoreError::StatusMismatch { id, .. } => EngineError::ConcurrentModification(id),
            StoreError::Backend(msg) => EngineError::internal(msg),
        }
    }
}

/// An (id, display name) pair for assignment fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub user_id: Uuid,
    pub user_name: String,
}

impl Assignment {
    pub fn new(user_id: Uuid, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
        }
    }
}

/// Fields written alongside a task status transition
///
/// `None` leaves a field untouched. Clearing the assignee (unclaim) is a
/// distinct flag because `None` already means "no change".
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub assignee: Option<Assignment>,
    pub clear_assignee: bool,
    pub original_assignee: Option<Assignment>,
    pub result: Option<TaskResult>,
    pub comment: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Fields written alongside an instance status transition
#[derive(Debug, Clone, Default)]
pub struct InstanceUpdate {
    pub end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,

    /// Merged additively into the instance's variables map
    pub merge_variables: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Filter for task list queries
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub assignee_id: Option<Uuid>,
    pub instance_id: Option<Uuid>,
    pub status_in: Option<Vec<TaskStatus>>,
    pub priority: Option<i32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Filter for instance list queries
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub initiator_id: Option<Uuid>,
    pub definition_id: Option<Uuid>,
    pub status_in: Option<Vec<InstanceStatus>>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
}

/// Pagination parameters
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Durable storage for definitions, instances and tasks
///
/// Implementations must be thread-safe and support concurrent access. The
/// compare-and-set methods are the engine's only mutation primitive for
/// instances and tasks: they verify the current status is in `expected`
/// before applying `next` and the field update atomically, and fail with
/// [`StoreError::StatusMismatch`] otherwise. Two concurrent claims on the
/// same pending task must resolve to exactly one winner.
#[async_trait]
pub trait ProcessStore: Send + Sync + 'static {
    // =========================================================================
    // Definition Operations
    // =========================================================================

    /// Insert a new definition
    async fn insert_definition(&self, definition: ProcessDefinition) -> Result<(), StoreError>;

    /// Get a definition by id (logical-deleted rows are still returned)
    async fn get_definition(&self, id: Uuid) -> Result<ProcessDefinition, StoreError>;

    /// Get the latest non-deleted definition for a process key
    async fn latest_definition(
        &self,
        process_key: &str,
    ) -> Result<Option<ProcessDefinition>, StoreError>;

    /// List definitions, newest deploy first
    async fn list_definitions(
        &self,
        category: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<ProcessDefinition>, StoreError>;

    /// Update a definition's status
    async fn update_definition_status(
        &self,
        id: Uuid,
        status: DefinitionStatus,
    ) -> Result<ProcessDefinition, StoreError>;

    /// Clear the is_latest flag on every definition for a process key
    async fn mark_not_latest(&self, process_key: &str) -> Result<(), StoreError>;

    /// Set the logical delete flag
    async fn mark_definition_deleted(&self, id: Uuid) -> Result<(), StoreError>;

    /// Adjust the denormalized instance counter
    async fn increment_instance_count(&self, id: Uuid, delta: i64) -> Result<(), StoreError>;

    // =========================================================================
    // Instance Operations
    // =========================================================================

    /// Insert a new instance
    async fn insert_instance(&self, instance: ProcessInstance) -> Result<(), StoreError>;

    /// Get an instance by id
    async fn get_instance(&self, id: Uuid) -> Result<ProcessInstance, StoreError>;

    /// Atomically transition an instance's status
    ///
    /// Verifies the current status is in `expected`, then writes `next` and
    /// the update fields. Returns the updated instance.
    async fn compare_and_set_instance_status(
        &self,
        id: Uuid,
        expected: &[InstanceStatus],
        next: InstanceStatus,
        update: InstanceUpdate,
    ) -> Result<ProcessInstance, StoreError>;

    /// List instances matching a filter, newest start first
    async fn list_instances(
        &self,
        filter: InstanceFilter,
        pagination: Pagination,
    ) -> Result<Vec<ProcessInstance>, StoreError>;

    // =========================================================================
    // Task Operations
    // =========================================================================

    /// Insert a new task
    async fn insert_task(&self, task: Task) -> Result<(), StoreError>;

    /// Get a task by id
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Atomically transition a task's status
    ///
    /// Same contract as [`compare_and_set_instance_status`]: status checked
    /// and rewritten under one critical section (or one conditional UPDATE).
    ///
    /// [`compare_and_set_instance_status`]: ProcessStore::compare_and_set_instance_status
    async fn compare_and_set_task_status(
        &self,
        id: Uuid,
        expected: &[TaskStatus],
        next: TaskStatus,
        update: TaskUpdate,
    ) -> Result<Task, StoreError>;

    /// List a single instance's tasks, optionally restricted by status
    async fn list_tasks_by_instance(
        &self,
        instance_id: Uuid,
        status_in: Option<&[TaskStatus]>,
    ) -> Result<Vec<Task>, StoreError>;

    /// List tasks matching a filter, newest creation first
    async fn list_tasks(
        &self,
        filter: TaskFilter,
        pagination: Pagination,
    ) -> Result<Vec<Task>, StoreError>;

    /// Bump update_time on the given tasks without touching status
    ///
    /// Used when an instance is withdrawn: its open tasks are marked stale
    /// but not force-closed. Unknown ids are skipped.
    async fn touch_tasks(&self, ids: &[Uuid]) -> Result<usize, StoreError>;
}

impl TaskFilter {
    /// Whether a task matches this filter
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(assignee_id) = self.assignee_id {
            if task.assignee_id != Some(assignee_id) {
                return false;
            }
        }
        if let Some(instance_id) = self.instance_id {
            if task.instance_id != instance_id {
                return false;
            }
        }
        if let Some(ref statuses) = self.status_in {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if task.create_time < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if task.create_time >= before {
                return false;
            }
        }
        true
    }
}

impl InstanceFilter {
    /// Whether an instance matches this filter
    pub fn matches(&self, instance: &ProcessInstance) -> bool {
        if let Some(initiator_id) = self.initiator_id {
            if instance.initiator_id != initiator_id {
                return false;
            }
        }
        if let Some(definition_id) = self.definition_id {
            if instance.definition_id != definition_id {
                return false;
            }
        }
        if let Some(ref statuses) = self.status_in {
            if !statuses.contains(&instance.status) {
                return false;
            }
        }
        if let Some(after) = self.started_after {
            if instance.start_time < after {
                return false;
            }
        }
        if let Some(before) = self.started_before {
            if instance.start_time >= before {
                return false;
            }
        }
        true
    }
}
