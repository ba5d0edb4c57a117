//! # Signoff Store
//!
//! Persistence contract for the approval workflow engine.
//!
//! Every mutating engine operation is a single atomic read-modify-write
//! against the store: a compare-and-set on status. The [`ProcessStore`]
//! trait is the whole surface the engine needs; implementations must report
//! "not found" distinctly from "status mismatch" so the engine can return
//! the right error kind to callers.
//!
//! [`InMemoryProcessStore`] provides the reference semantics and backs the
//! test suites.

pub mod memory;
pub mod store;

pub use memory::InMemoryProcessStore;
pub use store::{
    Assignment, InstanceFilter, InstanceUpdate, Pagination, ProcessStore, StoreError, TaskFilter,
    TaskUpdate,
};
