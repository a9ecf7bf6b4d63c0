//! Expired media cleanup background job.
//!
//! Deletes downloaded media older than the retention window of sources that
//! expire media, together with their files, and drops the pending work of
//! the deleted items.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::maintenance::purge_expired_media;
use crate::pipeline::triggers::on_media_deleted;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ExpiredMediaCleanupJob {
    interval: Duration,
}

impl ExpiredMediaCleanupJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for ExpiredMediaCleanupJob {
    fn id(&self) -> &'static str {
        "expired_media_cleanup"
    }

    fn name(&self) -> &'static str {
        "Expired Media Cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete downloaded media past the retention window of their source"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    // Files and rows are deleted together; a sweep is not stopped halfway.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let deleted = purge_expired_media(ctx.catalog.as_ref(), Utc::now())?;
        for media in &deleted {
            if let Err(e) = on_media_deleted(ctx.tasks.as_ref(), media) {
                warn!("Failed to drop pending tasks of expired media {}: {:#}", media.id, e);
            }
        }

        if deleted.is_empty() {
            info!("No expired media to clean up");
        } else {
            info!("Deleted {} expired media items", deleted.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, Media, MediaLayout, MemoryCatalogStore, Source, SourceKind};
    use crate::task_queue::{SqliteTaskStore, TaskKind, TaskParams, TaskRequest, TaskStore};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_deletes_expired_media_and_its_pending_work() {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(MemoryCatalogStore::new(MediaLayout::new(
            dir.path().join("downloads"),
            dir.path().join("thumbs"),
        )));
        let tasks = Arc::new(SqliteTaskStore::in_memory().unwrap());

        let mut source = Source::new(SourceKind::Channel, "UC1", "Chan", "chan");
        source.delete_old_media = true;
        source.days_to_keep = 7;
        catalog.save_source(&source).unwrap();

        let mut media = Media::new(source.id, "old");
        media.downloaded = true;
        media.download_date = Some(Utc::now() - chrono::Duration::days(10));
        catalog.save_media(&media).unwrap();
        tasks
            .enqueue(TaskRequest::new(
                TaskKind::FetchMetadata,
                TaskParams::new([media.id.to_string()]),
                source.id.to_string(),
                0,
            ))
            .unwrap();

        let ctx = JobContext::new(CancellationToken::new(), catalog.clone(), tasks.clone());
        ExpiredMediaCleanupJob::new(Duration::from_secs(3600))
            .execute(&ctx)
            .unwrap();

        assert!(catalog.get_media(&media.id).unwrap().is_none());
        assert_eq!(tasks.count_pending().unwrap(), 0);
    }

    #[test]
    fn test_waits_for_completion_on_shutdown() {
        let job = ExpiredMediaCleanupJob::new(Duration::from_secs(60));
        assert_eq!(job.shutdown_behavior(), ShutdownBehavior::WaitForCompletion);
        assert_eq!(job.schedule(), JobSchedule::Interval(Duration::from_secs(60)));
    }
}
