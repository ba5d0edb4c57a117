//! # Signoff Engine
//!
//! The approval workflow engine: process instances and the human tasks that
//! move them forward.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               TaskEngine / InstanceEngine                    │
//! │  (state machines; read → validate → compare-and-set write)  │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │       ProcessStore        │   │  NotificationDispatcher    │
//! │ (definitions, instances,  │   │ (fire-and-forget, after    │
//! │  tasks; conditional       │   │  the transition commits)   │
//! │  status updates)          │   └───────────────────────────┘
//! └───────────────────────────┘
//! ```
//!
//! The engine has no background loop; it is invoked synchronously per
//! request. Concurrency control is a compare-and-set on status: of two
//! concurrent claims on the same pending task, exactly one wins and the
//! other observes `AlreadyClaimed`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use signoff_engine::prelude::*;
//!
//! let store = Arc::new(InMemoryProcessStore::new());
//! let notifier = NotificationDispatcher::new(Arc::new(LoggingSink));
//! let instances = InstanceEngine::new(store.clone(), notifier.clone());
//! let tasks = TaskEngine::new(store.clone(), instances.clone(), notifier);
//!
//! let task = tasks.claim(task_id, Assignment::new(user_id, "alex")).await?;
//! tasks.approve(task.id, user_id, Some("looks good".into()), None).await?;
//! ```

pub mod batch;
pub mod definitions;
pub mod factory;
pub mod instance_engine;
pub mod notify;
pub mod stats;
pub mod task_engine;

/// Prelude for common imports
pub mod prelude {
    pub use crate::batch::BatchCoordinator;
    pub use crate::definitions::{DefinitionRegistry, DeployRequest};
    pub use crate::factory::{NextTask, NoopTaskFactory, TaskFactory};
    pub use crate::instance_engine::InstanceEngine;
    pub use crate::notify::{
        LoggingSink, NotificationDispatcher, NotificationSink, RecordingSink,
    };
    pub use crate::stats::{InstanceStatistics, StatisticsReader, TaskStatistics, TimeWindow};
    pub use crate::task_engine::{HandoverOutcome, TaskEngine};
    pub use signoff_core::{
        BatchAction, BatchResult, EngineConfig, EngineError, NotificationEvent, Result,
    };
    pub use signoff_store::{Assignment, InMemoryProcessStore, ProcessStore};
}

// Re-export key types at crate root
pub use batch::BatchCoordinator;
pub use definitions::{DefinitionRegistry, DeployRequest};
pub use factory::{NextTask, NoopTaskFactory, TaskFactory};
pub use instance_engine::InstanceEngine;
pub use notify::{LoggingSink, NotificationDispatcher, NotificationSink, RecordingSink};
pub use stats::{InstanceStatistics, StatisticsReader, TaskStatistics, TimeWindow};
pub use task_engine::{HandoverOutcome, TaskEngine};
