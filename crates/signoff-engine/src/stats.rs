//! Read-only workload statistics
//!
//! Counts are computed from the store on every call; there is no cache to
//! invalidate, so the numbers are as fresh as the underlying lists. Callers
//! that need cheap repeated reads can layer their own caching on top.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use signoff_core::{InstanceStatus, Result, TaskResult, TaskStatus};
use signoff_store::{InstanceFilter, Pagination, ProcessStore, TaskFilter};

/// Half-open creation-time window; `None` bounds are unbounded
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn since(after: DateTime<Utc>) -> Self {
        Self {
            after: Some(after),
            before: None,
        }
    }
}

/// One user's task workload over a window
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatistics {
    /// Open tasks (pending or processing)
    pub todo_count: usize,

    pub completed_count: usize,
    pub approved_count: usize,
    pub rejected_count: usize,
    pub transferred_count: usize,
    pub delegated_count: usize,

    /// Open tasks past their due time
    pub overdue_count: usize,

    /// Mean task duration over resolved tasks that recorded one
    pub average_duration_ms: Option<f64>,
}

/// Instance counts by lifecycle status
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceStatistics {
    pub running: usize,
    pub completed: usize,
    pub terminated: usize,
    pub suspended: usize,
    pub total: usize,
}

/// Computes statistics from store list queries
pub struct StatisticsReader<S: ProcessStore> {
    store: Arc<S>,
}

impl<S: ProcessStore> StatisticsReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Task workload for one assignee within a creation-time window
    #[instrument(skip(self))]
    pub async fn task_statistics(
        &self,
        assignee_id: Uuid,
        window: TimeWindow,
    ) -> Result<TaskStatistics> {
        let filter = TaskFilter {
            assignee_id: Some(assignee_id),
            created_after: window.after,
            created_before: window.before,
            ..Default::default()
        };
        let tasks = self.store.list_tasks(filter, unpaged()).await?;

        let now = Utc::now();
        let mut stats = TaskStatistics::default();
        let mut duration_sum: i64 = 0;
        let mut duration_samples: usize = 0;

        for task in &tasks {
            match task.status {
                TaskStatus::Pending | TaskStatus::Processing => stats.todo_count += 1,
                TaskStatus::Completed => stats.completed_count += 1,
                TaskStatus::Rejected => stats.rejected_count += 1,
                TaskStatus::Transferred => stats.transferred_count += 1,
                TaskStatus::Delegated => stats.delegated_count += 1,
            }
            if task.result == Some(TaskResult::Approve) {
                stats.approved_count += 1;
            }
            if task.is_overdue(now) {
                stats.overdue_count += 1;
            }
            if let Some(duration_ms) = task.duration_ms {
                duration_sum += duration_ms;
                duration_samples += 1;
            }
        }

        if duration_samples > 0 {
            stats.average_duration_ms = Some(duration_sum as f64 / duration_samples as f64);
        }
        Ok(stats)
    }

    /// Instance counts, optionally restricted to one initiator
    #[instrument(skip(self))]
    pub async fn instance_statistics(
        &self,
        initiator_id: Option<Uuid>,
        window: TimeWindow,
    ) -> Result<InstanceStatistics> {
        let filter = InstanceFilter {
            initiator_id,
            started_after: window.after,
            started_before: window.before,
            ..Default::default()
        };
        let instances = self.store.list_instances(filter, unpaged()).await?;

        let mut stats = InstanceStatistics::default();
        for instance in &instances {
            match instance.status {
                InstanceStatus::Running => stats.running += 1,
                InstanceStatus::Completed => stats.completed += 1,
                InstanceStatus::Terminated => stats.terminated += 1,
                InstanceStatus::Suspended => stats.suspended += 1,
            }
        }
        stats.total = instances.len();
        Ok(stats)
    }
}

fn unpaged() -> Pagination {
    Pagination {
        offset: 0,
        limit: u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use signoff_core::{ProcessInstance, Task};
    use signoff_store::InMemoryProcessStore;

    fn instance(initiator_id: Uuid, status: InstanceStatus) -> ProcessInstance {
        ProcessInstance {
            id: Uuid::now_v7(),
            definition_id: Uuid::now_v7(),
            process_key: "leave_request".to_string(),
            process_name: "Leave Request".to_string(),
            business_id: None,
            initiator_id,
            initiator_name: "alex".to_string(),
            status,
            current_node_id: None,
            current_node_name: None,
            variables: Default::default(),
            start_time: Utc::now(),
            end_time: None,
            reason: None,
        }
    }

    fn task_for(assignee_id: Uuid, status: TaskStatus) -> Task {
        let mut task = Task::new_pending(Uuid::now_v7(), "review");
        task.assignee_id = Some(assignee_id);
        task.assignee_name = Some("sam".to_string());
        task.status = status;
        task
    }

    #[tokio::test]
    async fn test_task_statistics_by_status() {
        let store = Arc::new(InMemoryProcessStore::new());
        let user = Uuid::now_v7();

        store
            .insert_task(task_for(user, TaskStatus::Pending))
            .await
            .unwrap();
        store
            .insert_task(task_for(user, TaskStatus::Processing))
            .await
            .unwrap();

        let mut approved = task_for(user, TaskStatus::Completed);
        approved.result = Some(TaskResult::Approve);
        approved.duration_ms = Some(1000);
        store.insert_task(approved).await.unwrap();

        let mut rejected = task_for(user, TaskStatus::Rejected);
        rejected.result = Some(TaskResult::Reject);
        rejected.duration_ms = Some(3000);
        store.insert_task(rejected).await.unwrap();

        // Someone else's task is not counted
        store
            .insert_task(task_for(Uuid::now_v7(), TaskStatus::Pending))
            .await
            .unwrap();

        let reader = StatisticsReader::new(store);
        let stats = reader
            .task_statistics(user, TimeWindow::unbounded())
            .await
            .unwrap();

        assert_eq!(stats.todo_count, 2);
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.approved_count, 1);
        assert_eq!(stats.rejected_count, 1);
        assert_eq!(stats.average_duration_ms, Some(2000.0));
    }

    #[tokio::test]
    async fn test_overdue_counts_only_open_tasks() {
        let store = Arc::new(InMemoryProcessStore::new());
        let user = Uuid::now_v7();
        let past_due = Utc::now() - Duration::hours(2);

        let mut open = task_for(user, TaskStatus::Processing);
        open.due_time = Some(past_due);
        store.insert_task(open).await.unwrap();

        let mut closed = task_for(user, TaskStatus::Completed);
        closed.due_time = Some(past_due);
        store.insert_task(closed).await.unwrap();

        let reader = StatisticsReader::new(store);
        let stats = reader
            .task_statistics(user, TimeWindow::unbounded())
            .await
            .unwrap();
        assert_eq!(stats.overdue_count, 1);
    }

    #[tokio::test]
    async fn test_no_durations_means_no_average() {
        let store = Arc::new(InMemoryProcessStore::new());
        let user = Uuid::now_v7();
        store
            .insert_task(task_for(user, TaskStatus::Pending))
            .await
            .unwrap();

        let reader = StatisticsReader::new(store);
        let stats = reader
            .task_statistics(user, TimeWindow::unbounded())
            .await
            .unwrap();
        assert_eq!(stats.average_duration_ms, None);
    }

    #[tokio::test]
    async fn test_instance_statistics_by_initiator() {
        let store = Arc::new(InMemoryProcessStore::new());
        let alex = Uuid::now_v7();

        store
            .insert_instance(instance(alex, InstanceStatus::Running))
            .await
            .unwrap();
        store
            .insert_instance(instance(alex, InstanceStatus::Completed))
            .await
            .unwrap();
        store
            .insert_instance(instance(Uuid::now_v7(), InstanceStatus::Terminated))
            .await
            .unwrap();

        let reader = StatisticsReader::new(store);

        let mine = reader
            .instance_statistics(Some(alex), TimeWindow::unbounded())
            .await
            .unwrap();
        assert_eq!(mine.total, 2);
        assert_eq!(mine.running, 1);
        assert_eq!(mine.completed, 1);

        let all = reader
            .instance_statistics(None, TimeWindow::unbounded())
            .await
            .unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.terminated, 1);
    }

    #[tokio::test]
    async fn test_window_filters_by_creation_time() {
        let store = Arc::new(InMemoryProcessStore::new());
        let user = Uuid::now_v7();

        let mut old = task_for(user, TaskStatus::Completed);
        old.create_time = Utc::now() - Duration::days(30);
        store.insert_task(old).await.unwrap();
        store
            .insert_task(task_for(user, TaskStatus::Completed))
            .await
            .unwrap();

        let reader = StatisticsReader::new(store);
        let stats = reader
            .task_statistics(user, TimeWindow::since(Utc::now() - Duration::days(7)))
            .await
            .unwrap();
        assert_eq!(stats.completed_count, 1);
    }
}
