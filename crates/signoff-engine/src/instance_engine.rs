//! Instance lifecycle: start, suspend, activate, terminate, withdraw
//!
//! Every transition is a compare-and-set on the instance's status, so two
//! concurrent administrators cannot both terminate the same instance: one
//! wins, the other sees `ConcurrentModification`. Auto-completion is
//! idempotent for the same reason — of N concurrent "last task resolved"
//! signals, exactly one performs the Running → Completed write.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use signoff_core::{
    EngineError, InstanceStatus, NotificationEvent, ProcessInstance, Result, TaskStatus,
};
use signoff_store::{
    Assignment, InstanceFilter, InstanceUpdate, Pagination, ProcessStore, StoreError,
};

use crate::notify::NotificationDispatcher;

/// Drives the process instance state machine
pub struct InstanceEngine<S: ProcessStore> {
    store: Arc<S>,
    notifier: NotificationDispatcher,
}

impl<S: ProcessStore> Clone for InstanceEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: ProcessStore> InstanceEngine<S> {
    pub fn new(store: Arc<S>, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    /// Start a new instance of a definition
    ///
    /// The definition must be published and not deleted. The instance is
    /// inserted in Running status with no tasks; task creation is the
    /// caller's (or a [`TaskFactory`](crate::factory::TaskFactory)'s) job.
    #[instrument(skip(self, initiator, variables), fields(initiator_id = %initiator.user_id))]
    pub async fn start(
        &self,
        definition_id: Uuid,
        initiator: Assignment,
        business_id: Option<String>,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ProcessInstance> {
        let definition = self.store.get_definition(definition_id).await?;
        if !definition.is_startable() {
            return Err(EngineError::invalid_state(format!(
                "definition {} is not startable: status is {}",
                definition_id, definition.status
            )));
        }

        let now = Utc::now();
        let instance = ProcessInstance {
            id: Uuid::now_v7(),
            definition_id,
            process_key: definition.process_key.clone(),
            process_name: definition.process_name.clone(),
            business_id,
            initiator_id: initiator.user_id,
            initiator_name: initiator.user_name,
            status: InstanceStatus::Running,
            current_node_id: None,
            current_node_name: None,
            variables,
            start_time: now,
            end_time: None,
            reason: None,
        };

        self.store.insert_instance(instance.clone()).await?;
        self.store
            .increment_instance_count(definition_id, 1)
            .await?;

        info!(
            instance_id = %instance.id,
            process_key = %instance.process_key,
            "instance started"
        );
        self.notify_status(&instance);

        Ok(instance)
    }

    /// Start an instance of the latest published version of a process key
    #[instrument(skip(self, initiator, variables), fields(initiator_id = %initiator.user_id))]
    pub async fn start_latest(
        &self,
        process_key: &str,
        initiator: Assignment,
        business_id: Option<String>,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ProcessInstance> {
        let definition = self
            .store
            .latest_definition(process_key)
            .await?
            .ok_or_else(|| {
                EngineError::validation(format!("no definition deployed for key {process_key}"))
            })?;

        self.start(definition.id, initiator, business_id, variables)
            .await
    }

    /// Pause a running instance
    ///
    /// Suspended instances accept no task actions until activated again.
    #[instrument(skip(self))]
    pub async fn suspend(&self, instance_id: Uuid, reason: Option<String>) -> Result<ProcessInstance> {
        self.require_status(instance_id, &[InstanceStatus::Running], "suspended")
            .await?;

        let instance = self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running],
                InstanceStatus::Suspended,
                InstanceUpdate {
                    reason,
                    ..Default::default()
                },
            )
            .await?;

        info!(%instance_id, "instance suspended");
        self.notify_status(&instance);
        Ok(instance)
    }

    /// Resume a suspended instance
    #[instrument(skip(self))]
    pub async fn activate(&self, instance_id: Uuid) -> Result<ProcessInstance> {
        self.require_status(instance_id, &[InstanceStatus::Suspended], "activated")
            .await?;

        let instance = self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Suspended],
                InstanceStatus::Running,
                InstanceUpdate::default(),
            )
            .await?;

        info!(%instance_id, "instance activated");
        self.notify_status(&instance);
        Ok(instance)
    }

    /// Forcibly end an instance (administrative)
    ///
    /// Legal from Running or Suspended. Open tasks are left in place; they
    /// can no longer be acted on because every task action re-checks the
    /// owning instance.
    #[instrument(skip(self, reason))]
    pub async fn terminate(
        &self,
        instance_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<ProcessInstance> {
        self.require_status(
            instance_id,
            &[InstanceStatus::Running, InstanceStatus::Suspended],
            "terminated",
        )
        .await?;

        let instance = self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running, InstanceStatus::Suspended],
                InstanceStatus::Terminated,
                InstanceUpdate {
                    end_time: Some(Utc::now()),
                    reason: Some(reason.into()),
                    ..Default::default()
                },
            )
            .await?;

        info!(%instance_id, "instance terminated");
        self.notify_status(&instance);
        Ok(instance)
    }

    /// Snapshot check before a lifecycle CAS
    ///
    /// A transition requested from an illegal starting state is the caller's
    /// mistake and reports `InvalidState`; only a CAS that fails after this
    /// check passed is a genuine race and keeps the
    /// `ConcurrentModification` mapping.
    async fn require_status(
        &self,
        instance_id: Uuid,
        expected: &[InstanceStatus],
        verb: &str,
    ) -> Result<()> {
        let current = self.store.get_instance(instance_id).await?;
        if !expected.contains(&current.status) {
            return Err(EngineError::invalid_state(format!(
                "instance {} cannot be {}: status is {}",
                instance_id, verb, current.status
            )));
        }
        Ok(())
    }

    /// Withdraw an instance at the initiator's request
    ///
    /// Only the initiator may withdraw, only from Running, and a non-empty
    /// reason is required. Open tasks are touched (update_time bumped) but
    /// never force-closed.
    #[instrument(skip(self, reason))]
    pub async fn withdraw(
        &self,
        instance_id: Uuid,
        requester_id: Uuid,
        reason: &str,
    ) -> Result<ProcessInstance> {
        if reason.trim().is_empty() {
            return Err(EngineError::validation("withdraw requires a reason"));
        }

        let current = self.store.get_instance(instance_id).await?;
        if current.initiator_id != requester_id {
            return Err(EngineError::forbidden(format!(
                "user {requester_id} is not the initiator of instance {instance_id}"
            )));
        }
        if current.status != InstanceStatus::Running {
            return Err(EngineError::invalid_state(format!(
                "instance {} cannot be withdrawn: status is {}",
                instance_id, current.status
            )));
        }

        let instance = self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running],
                InstanceStatus::Terminated,
                InstanceUpdate {
                    end_time: Some(Utc::now()),
                    reason: Some(reason.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let open = self
            .store
            .list_tasks_by_instance(
                instance_id,
                Some(&[TaskStatus::Pending, TaskStatus::Processing]),
            )
            .await?;
        if !open.is_empty() {
            let ids: Vec<Uuid> = open.iter().map(|t| t.id).collect();
            let touched = self.store.touch_tasks(&ids).await?;
            debug!(%instance_id, touched, "marked open tasks stale after withdraw");
        }

        info!(%instance_id, "instance withdrawn by initiator");
        self.notify_status(&instance);
        Ok(instance)
    }

    /// React to a task reaching a terminal status
    ///
    /// If the instance is still Running and has no open tasks left, it is
    /// completed. Idempotent: concurrent callers race on the CAS and the
    /// losers treat the mismatch as already-handled.
    #[instrument(skip(self))]
    pub async fn on_task_resolved(&self, instance_id: Uuid) -> Result<()> {
        let instance = self.store.get_instance(instance_id).await?;
        if instance.status.is_terminal() {
            return Ok(());
        }

        let open = self
            .store
            .list_tasks_by_instance(
                instance_id,
                Some(&[TaskStatus::Pending, TaskStatus::Processing]),
            )
            .await?;
        if !open.is_empty() {
            return Ok(());
        }

        match self
            .store
            .compare_and_set_instance_status(
                instance_id,
                &[InstanceStatus::Running],
                InstanceStatus::Completed,
                InstanceUpdate {
                    end_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(completed) => {
                info!(%instance_id, "instance auto-completed: no open tasks remain");
                self.notify_status(&completed);
                Ok(())
            }
            Err(StoreError::StatusMismatch { .. }) => {
                // Someone else completed, suspended or terminated it first.
                warn!(%instance_id, "auto-completion lost a race, skipping");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Get an instance by id
    pub async fn get_instance(&self, instance_id: Uuid) -> Result<ProcessInstance> {
        Ok(self.store.get_instance(instance_id).await?)
    }

    /// Instances started by a user, newest first
    pub async fn list_my_instances(
        &self,
        initiator_id: Uuid,
        pagination: Pagination,
    ) -> Result<Vec<ProcessInstance>> {
        let filter = InstanceFilter {
            initiator_id: Some(initiator_id),
            ..Default::default()
        };
        Ok(self.store.list_instances(filter, pagination).await?)
    }

    /// Instances matching an arbitrary filter
    pub async fn list_instances(
        &self,
        filter: InstanceFilter,
        pagination: Pagination,
    ) -> Result<Vec<ProcessInstance>> {
        Ok(self.store.list_instances(filter, pagination).await?)
    }

    fn notify_status(&self, instance: &ProcessInstance) {
        self.notifier
            .dispatch(NotificationEvent::instance_status_changed(
                instance.id,
                instance.initiator_id,
                json!({
                    "status": instance.status,
                    "process_name": instance.process_name,
                    "business_id": instance.business_id,
                }),
            ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingSink;
    use signoff_core::{DefinitionStatus, ProcessDefinition};
    use signoff_store::InMemoryProcessStore;

    fn published_definition() -> ProcessDefinition {
        ProcessDefinition {
            id: Uuid::now_v7(),
            process_key: "leave_request".to_string(),
            version: 1,
            process_name: "Leave Request".to_string(),
            category: Some("leave".to_string()),
            description: None,
            status: DefinitionStatus::Published,
            process_definition: json!({"nodes": []}),
            instance_count: 0,
            is_latest: true,
            deleted: false,
            deploy_time: Utc::now(),
        }
    }

    async fn engine_with_definition() -> (InstanceEngine<InMemoryProcessStore>, Uuid, Arc<RecordingSink>) {
        let store = Arc::new(InMemoryProcessStore::new());
        let definition = published_definition();
        let definition_id = definition.id;
        store.insert_definition(definition).await.unwrap();

        let sink = Arc::new(RecordingSink::new());
        let engine = InstanceEngine::new(store, NotificationDispatcher::new(sink.clone()));
        (engine, definition_id, sink)
    }

    fn initiator() -> Assignment {
        Assignment::new(Uuid::now_v7(), "alex")
    }

    #[tokio::test]
    async fn test_start_running_instance() {
        let (engine, definition_id, _sink) = engine_with_definition().await;

        let instance = engine
            .start(definition_id, initiator(), Some("REQ-1".into()), Default::default())
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.process_key, "leave_request");
        assert!(instance.end_time.is_none());
    }

    #[tokio::test]
    async fn test_start_refuses_unpublished_definition() {
        let store = Arc::new(InMemoryProcessStore::new());
        let mut definition = published_definition();
        definition.status = DefinitionStatus::Draft;
        let definition_id = definition.id;
        store.insert_definition(definition).await.unwrap();

        let engine = InstanceEngine::new(
            store,
            NotificationDispatcher::new(Arc::new(RecordingSink::new())),
        );
        let err = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_suspend_then_activate() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();

        let suspended = engine
            .suspend(instance.id, Some("audit hold".into()))
            .await
            .unwrap();
        assert_eq!(suspended.status, InstanceStatus::Suspended);
        assert_eq!(suspended.reason.as_deref(), Some("audit hold"));

        let resumed = engine.activate(instance.id).await.unwrap();
        assert_eq!(resumed.status, InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_suspend_twice_is_invalid_state() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();

        engine.suspend(instance.id, None).await.unwrap();
        let err = engine.suspend(instance.id, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_suspend_completed_instance_is_invalid_state() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();
        engine.on_task_resolved(instance.id).await.unwrap();

        let err = engine.suspend(instance.id, None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_activate_running_instance_is_invalid_state() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();

        let err = engine.activate(instance.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_terminate_twice_is_invalid_state() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();
        engine.terminate(instance.id, "abandoned").await.unwrap();

        let err = engine.terminate(instance.id, "again").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_terminate_from_suspended() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();
        engine.suspend(instance.id, None).await.unwrap();

        let terminated = engine.terminate(instance.id, "abandoned").await.unwrap();
        assert_eq!(terminated.status, InstanceStatus::Terminated);
        assert!(terminated.end_time.is_some());
        assert_eq!(terminated.reason.as_deref(), Some("abandoned"));
    }

    #[tokio::test]
    async fn test_withdraw_requires_initiator() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let starter = initiator();
        let instance = engine
            .start(definition_id, starter, None, Default::default())
            .await
            .unwrap();

        let err = engine
            .withdraw(instance.id, Uuid::now_v7(), "changed my mind")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_withdraw_requires_reason() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let starter = initiator();
        let instance = engine
            .start(definition_id, starter.clone(), None, Default::default())
            .await
            .unwrap();

        let err = engine
            .withdraw(instance.id, starter.user_id, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_withdraw_touches_open_tasks() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let starter = initiator();
        let instance = engine
            .start(definition_id, starter.clone(), None, Default::default())
            .await
            .unwrap();

        let task = signoff_core::Task::new_pending(instance.id, "review");
        let task_id = task.id;
        let before = task.update_time;
        engine.store.insert_task(task).await.unwrap();

        let withdrawn = engine
            .withdraw(instance.id, starter.user_id, "changed my mind")
            .await
            .unwrap();
        assert_eq!(withdrawn.status, InstanceStatus::Terminated);

        let task = engine.store.get_task(task_id).await.unwrap();
        // Still open, only marked stale
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.update_time >= before);
    }

    #[tokio::test]
    async fn test_auto_completion_when_no_open_tasks() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();

        engine.on_task_resolved(instance.id).await.unwrap();

        let instance = engine.get_instance(instance.id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
        assert!(instance.end_time.is_some());
    }

    #[tokio::test]
    async fn test_auto_completion_skipped_while_tasks_open() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();
        engine
            .store
            .insert_task(signoff_core::Task::new_pending(instance.id, "review"))
            .await
            .unwrap();

        engine.on_task_resolved(instance.id).await.unwrap();

        let instance = engine.get_instance(instance.id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Running);
    }

    #[tokio::test]
    async fn test_auto_completion_is_idempotent() {
        let (engine, definition_id, _sink) = engine_with_definition().await;
        let instance = engine
            .start(definition_id, initiator(), None, Default::default())
            .await
            .unwrap();

        engine.on_task_resolved(instance.id).await.unwrap();
        // Second signal observes the terminal status and no-ops
        engine.on_task_resolved(instance.id).await.unwrap();

        let instance = engine.get_instance(instance.id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
    }
}
