//! Specific background job implementations.

pub mod completed_tasks_cleanup;
pub mod expired_media_cleanup;
pub mod source_index_scheduler;

pub use completed_tasks_cleanup::CompletedTasksCleanupJob;
pub use expired_media_cleanup::ExpiredMediaCleanupJob;
pub use source_index_scheduler::SourceIndexSchedulerJob;
