//! In-memory implementation of ProcessStore
//!
//! Reference semantics for the store contract, used by the engine test
//! suites. Compare-and-set transitions re-check status under the write
//! lock, so concurrent claims resolve to exactly one winner just as a
//! conditional UPDATE would.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use signoff_core::{
    DefinitionStatus, InstanceStatus, ProcessDefinition, ProcessInstance, Task, TaskStatus,
};

use super::store::*;

/// In-memory implementation of ProcessStore
///
/// # Example
///
/// ```
/// use signoff_store::InMemoryProcessStore;
///
/// let store = InMemoryProcessStore::new();
/// ```
pub struct InMemoryProcessStore {
    definitions: RwLock<HashMap<Uuid, ProcessDefinition>>,
    instances: RwLock<HashMap<Uuid, ProcessInstance>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryProcessStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored definitions
    pub fn definition_count(&self) -> usize {
        self.definitions.read().len()
    }

    /// Number of stored instances
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Number of tasks still open (Pending or Processing)
    pub fn open_task_count(&self) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status.is_open())
            .count()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.definitions.write().clear();
        self.instances.write().clear();
        self.tasks.write().clear();
    }

    fn apply_task_update(task: &mut Task, update: TaskUpdate) {
        if let Some(assignee) = update.assignee {
            task.assignee_id = Some(assignee.user_id);
            task.assignee_name = Some(assignee.user_name);
        }
        if update.clear_assignee {
            task.assignee_id = None;
            task.assignee_name = None;
        }
        if let Some(original) = update.original_assignee {
            task.original_assignee_id = Some(original.user_id);
            task.original_assignee_name = Some(original.user_name);
        }
        if let Some(result) = update.result {
            task.result = Some(result);
        }
        if let Some(comment) = update.comment {
            task.comment = Some(comment);
        }
        if let Some(start_time) = update.start_time {
            task.start_time = Some(start_time);
        }
        if let Some(end_time) = update.end_time {
            task.end_time = Some(end_time);
        }
        if let Some(duration_ms) = update.duration_ms {
            task.duration_ms = Some(duration_ms);
        }
        task.update_time = Utc::now();
    }

    fn apply_instance_update(instance: &mut ProcessInstance, update: InstanceUpdate) {
        if let Some(end_time) = update.end_time {
            instance.end_time = Some(end_time);
        }
        if let Some(reason) = update.reason {
            instance.reason = Some(reason);
        }
        if let Some(variables) = update.merge_variables {
            for (key, value) in variables {
                instance.variables.insert(key, value);
            }
        }
    }
}

impl Default for InMemoryProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn insert_definition(&self, definition: ProcessDefinition) -> Result<(), StoreError> {
        self.definitions.write().insert(definition.id, definition);
        Ok(())
    }

    async fn get_definition(&self, id: Uuid) -> Result<ProcessDefinition, StoreError> {
        self.definitions
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::DefinitionNotFound(id))
    }

    async fn latest_definition(
        &self,
        process_key: &str,
    ) -> Result<Option<ProcessDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .values()
            .find(|d| d.process_key == process_key && d.is_latest && !d.deleted)
            .cloned())
    }

    async fn list_definitions(
        &self,
        category: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<ProcessDefinition>, StoreError> {
        let definitions = self.definitions.read();
        let mut matching: Vec<_> = definitions
            .values()
            .filter(|d| !d.deleted)
            .filter(|d| category.map(|c| d.category.as_deref() == Some(c)).unwrap_or(true))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.deploy_time.cmp(&a.deploy_time));

        Ok(matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn update_definition_status(
        &self,
        id: Uuid,
        status: DefinitionStatus,
    ) -> Result<ProcessDefinition, StoreError> {
        let mut definitions = self.definitions.write();
        let definition = definitions
            .get_mut(&id)
            .ok_or(StoreError::DefinitionNotFound(id))?;

        definition.status = status;
        Ok(definition.clone())
    }

    async fn mark_not_latest(&self, process_key: &str) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write();
        for definition in definitions.values_mut() {
            if definition.process_key == process_key {
                definition.is_latest = false;
            }
        }
        Ok(())
    }

    async fn mark_definition_deleted(&self, id: Uuid) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write();
        let definition = definitions
            .get_mut(&id)
            .ok_or(StoreError::DefinitionNotFound(id))?;

        definition.deleted = true;
        Ok(())
    }

    async fn increment_instance_count(&self, id: Uuid, delta: i64) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write();
        let definition = definitions
            .get_mut(&id)
            .ok_or(StoreError::DefinitionNotFound(id))?;

        definition.instance_count = definition.instance_count.saturating_add_signed(delta);
        Ok(())
    }

    async fn insert_instance(&self, instance: ProcessInstance) -> Result<(), StoreError> {
        self.instances.write().insert(instance.id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<ProcessInstance, StoreError> {
        self.instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::InstanceNotFound(id))
    }

    async fn compare_and_set_instance_status(
        &self,
        id: Uuid,
        expected: &[InstanceStatus],
        next: InstanceStatus,
        update: InstanceUpdate,
    ) -> Result<ProcessInstance, StoreError> {
        let mut instances = self.instances.write();
        let instance = instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))?;

        if !expected.contains(&instance.status) {
            return Err(StoreError::StatusMismatch {
                id,
                actual: instance.status.to_string(),
            });
        }

        instance.status = next;
        Self::apply_instance_update(instance, update);
        Ok(instance.clone())
    }

    async fn list_instances(
        &self,
        filter: InstanceFilter,
        pagination: Pagination,
    ) -> Result<Vec<ProcessInstance>, StoreError> {
        let instances = self.instances.read();
        let mut matching: Vec<_> = instances
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        Ok(matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.write().insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))
    }

    async fn compare_and_set_task_status(
        &self,
        id: Uuid,
        expected: &[TaskStatus],
        next: TaskStatus,
        update: TaskUpdate,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;

        if !expected.contains(&task.status) {
            return Err(StoreError::StatusMismatch {
                id,
                actual: task.status.to_string(),
            });
        }

        task.status = next;
        Self::apply_task_update(task, update);
        Ok(task.clone())
    }

    async fn list_tasks_by_instance(
        &self,
        instance_id: Uuid,
        status_in: Option<&[TaskStatus]>,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read();
        let mut matching: Vec<_> = tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .filter(|t| status_in.map(|s| s.contains(&t.status)).unwrap_or(true))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.create_time.cmp(&b.create_time));
        Ok(matching)
    }

    async fn list_tasks(
        &self,
        filter: TaskFilter,
        pagination: Pagination,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read();
        let mut matching: Vec<_> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();

        matching.sort_by(|a, b| b.create_time.cmp(&a.create_time));

        Ok(matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn touch_tasks(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.write();
        let now = Utc::now();
        let mut touched = 0;

        for id in ids {
            if let Some(task) = tasks.get_mut(id) {
                task.update_time = now;
                touched += 1;
            }
        }

        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_instance(initiator_id: Uuid) -> ProcessInstance {
        ProcessInstance {
            id: Uuid::now_v7(),
            definition_id: Uuid::now_v7(),
            process_key: "leave_request".to_string(),
            process_name: "Leave Request".to_string(),
            business_id: Some("LR-1001".to_string()),
            initiator_id,
            initiator_name: "alex".to_string(),
            status: InstanceStatus::Running,
            current_node_id: None,
            current_node_name: None,
            variables: serde_json::Map::new(),
            start_time: Utc::now(),
            end_time: None,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_task() {
        let store = InMemoryProcessStore::new();
        let task = Task::new_pending(Uuid::now_v7(), "review");
        let task_id = task.id;

        store.insert_task(task).await.unwrap();

        let loaded = store.get_task(task_id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(store.open_task_count(), 1);
    }

    #[tokio::test]
    async fn test_task_cas_succeeds_from_expected_status() {
        let store = InMemoryProcessStore::new();
        let task = Task::new_pending(Uuid::now_v7(), "review");
        let task_id = task.id;
        store.insert_task(task).await.unwrap();

        let user = Uuid::now_v7();
        let updated = store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Pending],
                TaskStatus::Processing,
                TaskUpdate {
                    assignee: Some(Assignment::new(user, "alex")),
                    start_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Processing);
        assert_eq!(updated.assignee_id, Some(user));
        assert!(updated.start_time.is_some());
    }

    #[tokio::test]
    async fn test_task_cas_rejects_unexpected_status() {
        let store = InMemoryProcessStore::new();
        let task = Task::new_pending(Uuid::now_v7(), "review");
        let task_id = task.id;
        store.insert_task(task).await.unwrap();

        let result = store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Completed,
                TaskUpdate::default(),
            )
            .await;

        assert!(matches!(result, Err(StoreError::StatusMismatch { .. })));

        // Status must be unchanged after a failed CAS
        let loaded = store.get_task(task_id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_task_cas_not_found_is_distinct() {
        let store = InMemoryProcessStore::new();
        let missing = Uuid::now_v7();

        let result = store
            .compare_and_set_task_status(
                missing,
                &[TaskStatus::Pending],
                TaskStatus::Processing,
                TaskUpdate::default(),
            )
            .await;

        assert!(matches!(result, Err(StoreError::TaskNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_instance_cas_merges_variables() {
        let store = InMemoryProcessStore::new();
        let mut instance = sample_instance(Uuid::now_v7());
        instance
            .variables
            .insert("days".to_string(), serde_json::json!(3));
        let instance_id = instance.id;
        store.insert_instance(instance).await.unwrap();

        let mut merge = serde_json::Map::new();
        merge.insert("approved_by".to_string(), serde_json::json!("sam"));

        let updated = store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running],
                InstanceStatus::Running,
                InstanceUpdate {
                    merge_variables: Some(merge),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.variables["days"], serde_json::json!(3));
        assert_eq!(updated.variables["approved_by"], serde_json::json!("sam"));
    }

    #[tokio::test]
    async fn test_list_tasks_by_instance_filters_status() {
        let store = InMemoryProcessStore::new();
        let instance_id = Uuid::now_v7();

        let open = Task::new_pending(instance_id, "step-1");
        let mut closed = Task::new_pending(instance_id, "step-2");
        closed.status = TaskStatus::Completed;
        let other = Task::new_pending(Uuid::now_v7(), "unrelated");

        store.insert_task(open).await.unwrap();
        store.insert_task(closed).await.unwrap();
        store.insert_task(other).await.unwrap();

        let open_tasks = store
            .list_tasks_by_instance(instance_id, Some(&[TaskStatus::Pending, TaskStatus::Processing]))
            .await
            .unwrap();
        assert_eq!(open_tasks.len(), 1);
        assert_eq!(open_tasks[0].task_name, "step-1");

        let all_tasks = store.list_tasks_by_instance(instance_id, None).await.unwrap();
        assert_eq!(all_tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_list_tasks_time_window() {
        let store = InMemoryProcessStore::new();
        let cutoff = Utc::now() - Duration::hours(1);

        let mut old = Task::new_pending(Uuid::now_v7(), "old");
        old.create_time = cutoff - Duration::hours(1);
        let recent = Task::new_pending(Uuid::now_v7(), "recent");

        store.insert_task(old).await.unwrap();
        store.insert_task(recent).await.unwrap();

        let tasks = store
            .list_tasks(
                TaskFilter {
                    created_after: Some(cutoff),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_name, "recent");
    }

    #[tokio::test]
    async fn test_touch_tasks_updates_timestamp_only() {
        let store = InMemoryProcessStore::new();
        let task = Task::new_pending(Uuid::now_v7(), "review");
        let task_id = task.id;
        let before = task.update_time;
        store.insert_task(task).await.unwrap();

        let touched = store.touch_tasks(&[task_id, Uuid::now_v7()]).await.unwrap();
        assert_eq!(touched, 1);

        let loaded = store.get_task(task_id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert!(loaded.update_time >= before);
    }

    #[tokio::test]
    async fn test_latest_definition_skips_deleted() {
        let store = InMemoryProcessStore::new();
        let definition = ProcessDefinition {
            id: Uuid::now_v7(),
            process_key: "leave_request".to_string(),
            version: 1,
            process_name: "Leave Request".to_string(),
            category: Some("leave".to_string()),
            description: None,
            status: DefinitionStatus::Published,
            process_definition: serde_json::json!({"nodes": []}),
            instance_count: 0,
            is_latest: true,
            deleted: false,
            deploy_time: Utc::now(),
        };
        let definition_id = definition.id;
        store.insert_definition(definition).await.unwrap();

        assert!(store.latest_definition("leave_request").await.unwrap().is_some());

        store.mark_definition_deleted(definition_id).await.unwrap();
        assert!(store.latest_definition("leave_request").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_instance_count() {
        let store = InMemoryProcessStore::new();
        let definition = ProcessDefinition {
            id: Uuid::now_v7(),
            process_key: "expense".to_string(),
            version: 1,
            process_name: "Expense Claim".to_string(),
            category: Some("expense".to_string()),
            description: None,
            status: DefinitionStatus::Published,
            process_definition: serde_json::json!({"nodes": []}),
            instance_count: 0,
            is_latest: true,
            deleted: false,
            deploy_time: Utc::now(),
        };
        let definition_id = definition.id;
        store.insert_definition(definition).await.unwrap();

        store.increment_instance_count(definition_id, 1).await.unwrap();
        store.increment_instance_count(definition_id, 1).await.unwrap();

        let loaded = store.get_definition(definition_id).await.unwrap();
        assert_eq!(loaded.instance_count, 2);
    }
}
