//! Completed task cleanup background job.
//!
//! Deletes completed task records older than the configured retention
//! period. Indexing runs the same sweep; this job covers installations whose
//! sources rarely index.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::maintenance::purge_old_completed_tasks;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

pub struct CompletedTasksCleanupJob {
    retention_days: u64,
    interval: Duration,
}

impl CompletedTasksCleanupJob {
    pub fn new(retention_days: u64, interval: Duration) -> Self {
        Self {
            retention_days,
            interval,
        }
    }
}

impl BackgroundJob for CompletedTasksCleanupJob {
    fn id(&self) -> &'static str {
        "completed_tasks_cleanup"
    }

    fn name(&self) -> &'static str {
        "Completed Tasks Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete completed task records older than the retention period"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Cleanup can happen next run
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let deleted =
            purge_old_completed_tasks(ctx.tasks.as_ref(), self.retention_days, Utc::now())?;
        if deleted == 0 {
            info!("No completed tasks to clean up");
        }
        Ok(())
    }
}
