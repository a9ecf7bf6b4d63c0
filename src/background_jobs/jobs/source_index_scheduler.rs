//! Periodic source indexing.
//!
//! Schedules an index task for every source whose index interval has
//! elapsed since its last crawl. Runs once at startup so sources that fell
//! due while the service was down are picked up right away.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::pipeline::triggers::schedule_index;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

pub struct SourceIndexSchedulerJob {
    interval: Duration,
}

impl SourceIndexSchedulerJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for SourceIndexSchedulerJob {
    fn id(&self) -> &'static str {
        "source_index_scheduler"
    }

    fn name(&self) -> &'static str {
        "Source Index Scheduler"
    }

    fn description(&self) -> &'static str {
        "Schedule index tasks for sources whose index interval has elapsed"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::StartupAndInterval(self.interval)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let now = Utc::now();
        let mut scheduled = 0;
        for source in ctx.catalog.list_sources()? {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if !source.is_index_due(now) {
                continue;
            }
            if schedule_index(ctx.tasks.as_ref(), &source, now.timestamp())? {
                debug!("Scheduled index of source {}", source.name);
                scheduled += 1;
            }
        }

        if scheduled > 0 {
            info!("Scheduled {} source indexes", scheduled);
        }
        Ok(())
    }
}
