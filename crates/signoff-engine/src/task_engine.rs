//! Task state machine: claim, unclaim, approve, reject, transfer, delegate
//!
//! Every mutating operation follows the same shape: load, validate against
//! the current snapshot, then compare-and-set on status. The snapshot checks
//! give precise errors (Forbidden, InvalidState); the CAS is what actually
//! guarantees exclusivity when two callers pass validation at the same time.
//!
//! A transfer or delegation never mutates ownership in place. The held
//! record is closed with result Transfer/Delegate and a fresh successor row
//! is inserted for the new holder, linked via `predecessor_task_id`, so
//! every row in the audit trail has exactly one accountable actor.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use signoff_core::{
    EngineConfig, EngineError, InstanceStatus, NotificationEvent, ProcessInstance, Result, Task,
    TaskResult, TaskStatus,
};
use signoff_store::{
    Assignment, InstanceUpdate, Pagination, ProcessStore, StoreError, TaskFilter, TaskUpdate,
};

use crate::factory::{NextTask, NoopTaskFactory, TaskFactory};
use crate::instance_engine::InstanceEngine;
use crate::notify::NotificationDispatcher;

/// Both records produced by a transfer or delegation
#[derive(Debug, Clone)]
pub struct HandoverOutcome {
    /// The original record, closed with result Transfer/Delegate
    pub closed: Task,

    /// The fresh record owned by the new holder
    pub successor: Task,
}

/// Drives the task state machine
pub struct TaskEngine<S: ProcessStore> {
    store: Arc<S>,
    instances: InstanceEngine<S>,
    factory: Arc<dyn TaskFactory>,
    notifier: NotificationDispatcher,
    config: EngineConfig,
}

impl<S: ProcessStore> TaskEngine<S> {
    pub fn new(store: Arc<S>, instances: InstanceEngine<S>, notifier: NotificationDispatcher) -> Self {
        Self {
            store,
            instances,
            factory: Arc::new(NoopTaskFactory),
            notifier,
            config: EngineConfig::default(),
        }
    }

    /// Replace the routing factory consulted after each approval
    pub fn with_factory(mut self, factory: Arc<dyn TaskFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use a custom priority catalog instead of the built-in one
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a task on a running instance
    #[instrument(skip(self, blueprint), fields(task_name = %blueprint.task_name))]
    pub async fn create(&self, instance_id: Uuid, blueprint: NextTask) -> Result<Task> {
        if self.config.priority(blueprint.priority).is_none() {
            return Err(EngineError::validation(format!(
                "unknown priority level: {}",
                blueprint.priority
            )));
        }

        let instance = self.store.get_instance(instance_id).await?;
        if instance.status != InstanceStatus::Running {
            return Err(EngineError::invalid_state(format!(
                "instance {} is not running: status is {}",
                instance_id, instance.status
            )));
        }

        let task = blueprint.into_task(instance_id);
        self.store.insert_task(task.clone()).await?;
        info!(task_id = %task.id, %instance_id, "task created");

        if let Some(assignee_id) = task.assignee_id {
            self.notify_assigned(&task, assignee_id);
        }
        Ok(task)
    }

    /// Claim a pending, unowned task
    ///
    /// Of two concurrent claims exactly one wins; the loser gets
    /// [`EngineError::AlreadyClaimed`].
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn claim(&self, task_id: Uuid, user: Assignment) -> Result<Task> {
        let task = self.store.get_task(task_id).await?;
        self.require_running_instance(&task).await?;

        if task.assignee_id.is_some() {
            return Err(EngineError::AlreadyClaimed(task_id));
        }
        if task.status != TaskStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "task {} cannot be claimed: status is {}",
                task_id, task.status
            )));
        }

        let result = self
            .store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Pending],
                TaskStatus::Processing,
                TaskUpdate {
                    assignee: Some(user.clone()),
                    start_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await;

        match result {
            Ok(task) => {
                info!(%task_id, user_id = %user.user_id, "task claimed");
                Ok(task)
            }
            // CAS loss on claim means someone else owns it now
            Err(StoreError::StatusMismatch { .. }) => Err(EngineError::AlreadyClaimed(task_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Release a claimed task back to the pending pool
    ///
    /// Only the current holder may unclaim.
    #[instrument(skip(self))]
    pub async fn unclaim(&self, task_id: Uuid, user_id: Uuid) -> Result<Task> {
        let task = self.store.get_task(task_id).await?;
        self.require_running_instance(&task).await?;
        self.require_holder(&task, user_id)?;

        let task = self
            .store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Pending,
                TaskUpdate {
                    clear_assignee: true,
                    ..Default::default()
                },
            )
            .await?;

        info!(%task_id, %user_id, "task unclaimed");
        Ok(task)
    }

    /// Approve a task
    ///
    /// `variables` are merged additively into the instance's variable map.
    /// After the task closes, the routing factory is consulted for a
    /// successor; if none is produced and no other open task remains, the
    /// instance auto-completes.
    #[instrument(skip(self, comment, variables))]
    pub async fn approve(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        comment: Option<String>,
        variables: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Task> {
        let task = self.store.get_task(task_id).await?;
        let instance = self.require_running_instance(&task).await?;
        self.require_holder(&task, user_id)?;

        let now = Utc::now();
        let duration_ms = (now - task.start_time.unwrap_or(task.create_time)).num_milliseconds();

        let completed = self
            .store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Pending, TaskStatus::Processing],
                TaskStatus::Completed,
                TaskUpdate {
                    result: Some(TaskResult::Approve),
                    comment,
                    end_time: Some(now),
                    duration_ms: Some(duration_ms),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(variables) = variables {
            self.merge_variables(task.instance_id, variables).await?;
        }

        info!(%task_id, %user_id, "task approved");

        if let Some(blueprint) = self.factory.next_task(&instance, &completed) {
            let successor = blueprint.into_task(task.instance_id);
            self.store.insert_task(successor.clone()).await?;
            info!(
                successor_id = %successor.id,
                %task_id,
                "routing factory produced successor task"
            );
            if let Some(assignee_id) = successor.assignee_id {
                self.notify_assigned(&successor, assignee_id);
            }
        }

        self.instances.on_task_resolved(task.instance_id).await?;
        self.notify_resolved(&completed, user_id);
        Ok(completed)
    }

    /// Reject a task
    ///
    /// A non-empty comment is mandatory: a rejection without an explanation
    /// is useless to the initiator.
    #[instrument(skip(self, comment))]
    pub async fn reject(&self, task_id: Uuid, user_id: Uuid, comment: &str) -> Result<Task> {
        if comment.trim().is_empty() {
            return Err(EngineError::validation("reject requires a comment"));
        }

        let task = self.store.get_task(task_id).await?;
        let instance = self.require_running_instance(&task).await?;
        self.require_holder(&task, user_id)?;

        let now = Utc::now();
        let duration_ms = (now - task.start_time.unwrap_or(task.create_time)).num_milliseconds();

        let rejected = self
            .store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Pending, TaskStatus::Processing],
                TaskStatus::Rejected,
                TaskUpdate {
                    result: Some(TaskResult::Reject),
                    comment: Some(comment.to_string()),
                    end_time: Some(now),
                    duration_ms: Some(duration_ms),
                    ..Default::default()
                },
            )
            .await?;

        info!(%task_id, %user_id, "task rejected");

        self.instances.on_task_resolved(task.instance_id).await?;
        // A rejection concerns the initiator as much as the actor
        self.notify_resolved(&rejected, user_id);
        self.notify_resolved(&rejected, instance.initiator_id);
        Ok(rejected)
    }

    /// Transfer a task to a new holder who becomes fully accountable
    #[instrument(skip(self, target, comment), fields(target_id = %target.user_id))]
    pub async fn transfer(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        target: Assignment,
        comment: Option<String>,
    ) -> Result<HandoverOutcome> {
        self.hand_over(task_id, user_id, target, comment, TaskResult::Transfer)
            .await
    }

    /// Delegate a task; the original holder stays of record via provenance
    #[instrument(skip(self, target, comment), fields(target_id = %target.user_id))]
    pub async fn delegate(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        target: Assignment,
        comment: Option<String>,
    ) -> Result<HandoverOutcome> {
        self.hand_over(task_id, user_id, target, comment, TaskResult::Delegate)
            .await
    }

    async fn hand_over(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        target: Assignment,
        comment: Option<String>,
        result: TaskResult,
    ) -> Result<HandoverOutcome> {
        let task = self.store.get_task(task_id).await?;
        self.require_running_instance(&task).await?;

        let holder = match (task.assignee_id, task.assignee_name.clone()) {
            (Some(id), Some(name)) => Assignment::new(id, name),
            _ => {
                return Err(EngineError::invalid_state(format!(
                    "task {task_id} has no holder to hand over from; claim it first"
                )));
            }
        };
        if holder.user_id != user_id {
            return Err(EngineError::forbidden(format!(
                "user {user_id} does not hold task {task_id}"
            )));
        }
        if target.user_id == user_id {
            return Err(EngineError::validation(
                "cannot transfer or delegate a task to its current holder",
            ));
        }

        let next_status = match result {
            TaskResult::Transfer => TaskStatus::Transferred,
            TaskResult::Delegate => TaskStatus::Delegated,
            // hand_over is only called with the two variants above
            _ => return Err(EngineError::internal("invalid hand-over result")),
        };

        let closed = self
            .store
            .compare_and_set_task_status(
                task_id,
                &[TaskStatus::Pending, TaskStatus::Processing],
                next_status,
                TaskUpdate {
                    original_assignee: Some(holder.clone()),
                    result: Some(result),
                    comment,
                    ..Default::default()
                },
            )
            .await?;

        // Successor inherits the work item; the new holder starts immediately
        let now = Utc::now();
        let successor = Task {
            id: Uuid::now_v7(),
            instance_id: closed.instance_id,
            task_name: closed.task_name.clone(),
            node_id: closed.node_id.clone(),
            node_name: closed.node_name.clone(),
            assignee_id: Some(target.user_id),
            assignee_name: Some(target.user_name.clone()),
            original_assignee_id: Some(holder.user_id),
            original_assignee_name: Some(holder.user_name.clone()),
            predecessor_task_id: Some(closed.id),
            priority: closed.priority,
            due_time: closed.due_time,
            status: TaskStatus::Processing,
            result: None,
            comment: None,
            create_time: now,
            start_time: Some(now),
            end_time: None,
            duration_ms: None,
            update_time: now,
        };
        self.store.insert_task(successor.clone()).await?;

        info!(
            %task_id,
            successor_id = %successor.id,
            from = %holder.user_id,
            to = %target.user_id,
            kind = %next_status,
            "task handed over"
        );
        self.notify_assigned(&successor, target.user_id);

        Ok(HandoverOutcome { closed, successor })
    }

    /// Get a task by id
    pub async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        Ok(self.store.get_task(task_id).await?)
    }

    /// Open tasks a user currently holds, newest first
    ///
    /// An open task with an assignee is always Processing: claim promotes
    /// the row and unclaim clears the assignee on the way back to Pending.
    pub async fn list_my_pending(&self, user_id: Uuid, pagination: Pagination) -> Result<Vec<Task>> {
        let filter = TaskFilter {
            assignee_id: Some(user_id),
            status_in: Some(vec![TaskStatus::Processing]),
            ..Default::default()
        };
        Ok(self.store.list_tasks(filter, pagination).await?)
    }

    /// Tasks a user has resolved, newest first
    pub async fn list_my_completed(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> Result<Vec<Task>> {
        let filter = TaskFilter {
            assignee_id: Some(user_id),
            status_in: Some(vec![
                TaskStatus::Completed,
                TaskStatus::Rejected,
                TaskStatus::Transferred,
                TaskStatus::Delegated,
            ]),
            ..Default::default()
        };
        Ok(self.store.list_tasks(filter, pagination).await?)
    }

    /// The task's instance, verified live
    async fn require_running_instance(&self, task: &Task) -> Result<ProcessInstance> {
        let instance = self.store.get_instance(task.instance_id).await?;
        if instance.status != InstanceStatus::Running {
            return Err(EngineError::invalid_state(format!(
                "instance {} is not running: status is {}",
                instance.id, instance.status
            )));
        }
        Ok(instance)
    }

    /// Open-and-held-by check shared by approve/reject/unclaim
    fn require_holder(&self, task: &Task, user_id: Uuid) -> Result<()> {
        if task.status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "task {} is already resolved: status is {}",
                task.id, task.status
            )));
        }
        match task.assignee_id {
            Some(assignee_id) if assignee_id == user_id => Ok(()),
            Some(_) => Err(EngineError::forbidden(format!(
                "user {user_id} does not hold task {}",
                task.id
            ))),
            None => Err(EngineError::forbidden(format!(
                "task {} has no holder; claim it first",
                task.id
            ))),
        }
    }

    async fn merge_variables(
        &self,
        instance_id: Uuid,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let result = self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running],
                InstanceStatus::Running,
                InstanceUpdate {
                    merge_variables: Some(variables),
                    ..Default::default()
                },
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::StatusMismatch { actual, .. }) => {
                // The approval itself committed; losing the variable merge to
                // a concurrent lifecycle change is tolerable.
                warn!(%instance_id, %actual, "skipped variable merge, instance left running state");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn notify_assigned(&self, task: &Task, target_user_id: Uuid) {
        self.notifier.dispatch(NotificationEvent::task_assigned(
            task.id,
            target_user_id,
            json!({
                "task_name": task.task_name,
                "priority": task.priority,
                "due_time": task.due_time,
            }),
        ));
    }

    fn notify_resolved(&self, task: &Task, target_user_id: Uuid) {
        self.notifier.dispatch(NotificationEvent::task_resolved(
            task.id,
            target_user_id,
            json!({
                "task_name": task.task_name,
                "result": task.result,
                "comment": task.comment,
            }),
        ));
    }
}
