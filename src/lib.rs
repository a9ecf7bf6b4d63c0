//! Mediasync library
//!
//! Mirrors remote media sources into a local library through a persistent,
//! deduplicating task queue. The modules are exposed for the binary and for
//! integration tests.

pub mod background_jobs;
pub mod catalog;
pub mod config;
pub mod maintenance;
pub mod pipeline;
pub mod policy;
pub mod providers;
pub mod sqlite_persistence;
pub mod task_identity;
pub mod task_queue;

pub use catalog::{CatalogStore, MemoryCatalogStore};
pub use pipeline::PipelineContext;
pub use task_queue::{SqliteTaskStore, TaskStore};
