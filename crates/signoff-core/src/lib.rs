//! # Signoff Core
//!
//! Shared data model for the signoff approval workflow engine.
//!
//! The engine moves human approval work items (tasks) through a small state
//! machine inside a process instance. This crate holds the entity types and
//! status enums, the error taxonomy returned by every engine operation, the
//! notification events emitted after state transitions, and the batch
//! action/result types.
//!
//! ```text
//! ProcessDefinition --(start)--> ProcessInstance --(owns)--> Task
//!                                                             │
//!        PENDING --claim--> PROCESSING --approve/reject--> COMPLETED/REJECTED
//!        PENDING/PROCESSING --transfer/delegate--> TRANSFERRED/DELEGATED
//! ```

pub mod batch;
pub mod config;
pub mod definition;
pub mod error;
pub mod event;
pub mod instance;
pub mod task;

pub use batch::{BatchAction, BatchFailure, BatchResult};
pub use config::{Descriptor, EngineConfig};
pub use definition::{DefinitionStatus, ProcessDefinition};
pub use error::{EngineError, EntityKind, Result};
pub use event::NotificationEvent;
pub use instance::{InstanceStatus, ProcessInstance};
pub use task::{Task, TaskResult, TaskStatus};
