//! Persistent background task queue.
//!
//! Pending tasks are grouped into lanes (one per source) and identified by a
//! deterministic id, so scheduling the same work twice never runs it twice.
//! Workers claim ready tasks atomically, run the handler registered for the
//! task kind and record the outcome in an append-only completed log.

mod models;
mod registry;
mod retry_policy;
mod schema;
mod store;
mod worker;

pub use models::{CompletedTask, EnqueueOutcome, Task, TaskKind, TaskParams, TaskRequest};
pub use registry::{TaskFailure, TaskHandler, TaskOutcome, TaskRegistry, TaskResult};
pub use retry_policy::{RetryPolicy, RetryableError};
pub use schema::TASK_QUEUE_VERSIONED_SCHEMAS;
pub use store::{SqliteTaskStore, TaskStore};
pub use worker::{run_worker_pool, TaskDisposition, TaskReport, TaskWorker};
