//! Batch task processing with itemized per-item outcomes
//!
//! Items are processed sequentially in request order. A failing item is
//! recorded and skipped; it never aborts the batch or rolls back earlier
//! successes. Batch rejection reuses the single-task rule that a comment is
//! mandatory, checked once up front so a bad request fails before any item
//! is touched.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use signoff_core::{BatchAction, BatchFailure, BatchResult, EngineError, Result};
use signoff_store::ProcessStore;

use crate::task_engine::TaskEngine;

/// Applies one action across many tasks
pub struct BatchCoordinator<S: ProcessStore> {
    tasks: TaskEngine<S>,
}

impl<S: ProcessStore> BatchCoordinator<S> {
    pub fn new(tasks: TaskEngine<S>) -> Self {
        Self { tasks }
    }

    /// Apply `action` to each task in order, as `user_id`
    ///
    /// Returns an itemized [`BatchResult`]; the call itself only errors on
    /// request-level problems (empty batch, reject without comment).
    #[instrument(skip(self, task_ids, comment), fields(total = task_ids.len(), %action))]
    pub async fn apply(
        &self,
        task_ids: &[Uuid],
        action: BatchAction,
        user_id: Uuid,
        comment: Option<String>,
    ) -> Result<BatchResult> {
        if task_ids.is_empty() {
            return Err(EngineError::validation("batch contains no task ids"));
        }
        if action == BatchAction::Reject
            && comment.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(EngineError::validation("batch reject requires a comment"));
        }

        let mut result = BatchResult {
            total: task_ids.len(),
            ..Default::default()
        };

        for &task_id in task_ids {
            let outcome = match action {
                BatchAction::Approve => self
                    .tasks
                    .approve(task_id, user_id, comment.clone(), None)
                    .await,
                BatchAction::Reject => {
                    // Comment presence was checked up front
                    let comment = comment.as_deref().unwrap_or_default();
                    self.tasks.reject(task_id, user_id, comment).await
                }
            };

            match outcome {
                Ok(_) => result.success_ids.push(task_id),
                Err(err) => {
                    warn!(%task_id, error = %err, "batch item failed, continuing");
                    result.failures.push(BatchFailure {
                        task_id,
                        error_kind: err.kind().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            total = result.total,
            succeeded = result.success_count(),
            failed = result.failure_count(),
            "batch finished"
        );
        Ok(result)
    }
}
