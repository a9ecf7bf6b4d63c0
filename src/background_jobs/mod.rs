//! Background job scheduling.
//!
//! Periodic maintenance runs here, beside the task queue: indexing due
//! sources, pruning the completed task log and expiring old media.

pub mod context;
pub mod handle;
pub mod job;
pub mod jobs;
pub mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
