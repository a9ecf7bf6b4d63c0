//! Stages a source and its media items go through, from enumeration to the
//! post-download side effects.
//!
//! Every stage re-reads the entities it works on, so a stage whose entity
//! disappeared in the meantime ends as a no-op. Stages return
//! [`StageError`] only for failures worth retrying; policy preconditions that
//! do not hold end the stage with a [`SkipReason`].

mod check_directory;
mod download;
mod format_code;
mod handlers;
mod index;
mod metadata;
mod nfo;
mod rescan;
mod thumbnail;
pub mod triggers;

pub use check_directory::check_source_directory;
pub use download::download_media;
pub use format_code::{describe_download, DownloadedFormat};
pub use handlers::register_handlers;
pub use index::index_source;
pub use metadata::fetch_metadata;
pub use nfo::render_nfo;
pub use rescan::rescan_media_server;
pub use thumbnail::{fetch_thumbnail, render_thumbnail};

use crate::catalog::{CatalogStore, MediaLayout};
use crate::config::ThumbnailSettings;
use crate::providers::{ImageFetcher, MediaExtractor, MediaServerClient};
use crate::task_queue::{
    RetryableError, Task, TaskFailure, TaskOutcome, TaskResult, TaskStore,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage needs to run.
pub struct PipelineContext {
    pub catalog: Arc<dyn CatalogStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub extractor: Arc<dyn MediaExtractor>,
    pub images: Arc<dyn ImageFetcher>,
    pub media_servers: Arc<dyn MediaServerClient>,
    pub layout: MediaLayout,
    pub thumbnails: ThumbnailSettings,
    /// Retention of the completed task log, applied after each index.
    pub completed_task_retention_days: u64,
}

/// Why a stage ended without doing its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The source, media item or media server no longer exists.
    EntityGone,
    ManuallySkipped,
    MarkedSkip,
    AlreadyFetched,
    AlreadyDownloaded,
    DownloadsDisabled,
    ThumbnailsDisabled,
    PastCapDate,
    /// No format satisfies the source's preferences.
    NotDownloadable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::EntityGone => "entity no longer exists",
            SkipReason::ManuallySkipped => "media is manually skipped",
            SkipReason::MarkedSkip => "media is marked to be skipped",
            SkipReason::AlreadyFetched => "metadata already fetched",
            SkipReason::AlreadyDownloaded => "media is already downloaded",
            SkipReason::DownloadsDisabled => "source no longer downloads media",
            SkipReason::ThumbnailsDisabled => "source no longer downloads thumbnails",
            SkipReason::PastCapDate => "media is older than the source download cap",
            SkipReason::NotDownloadable => "no acceptable format",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Skipped(SkipReason),
}

/// Failures a stage reports. All of them are retried by the queue.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Network or availability problem of an external collaborator.
    #[error("{0:#}")]
    TransientExternal(anyhow::Error),

    #[error(
        "source \"{name}\" ({source_id}) returned no media to index, \
         is the source key valid and the source reachable?"
    )]
    NoData { source_id: Uuid, name: String },

    #[error("failed to download media {media_id}, expected output file does not exist: {path:?}")]
    MissingOutput { media_id: Uuid, path: PathBuf },

    /// The catalog or the task store failed.
    #[error("{0:#}")]
    Catalog(anyhow::Error),
}

impl StageError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StageError::TransientExternal(_) => "TransientExternalFailure",
            StageError::NoData { .. } => "NoDataFailure",
            StageError::MissingOutput { .. } => "MissingOutputFailure",
            StageError::Catalog(_) => "CatalogFailure",
        }
    }

    /// Error text stored in the task log. The last line reads `Kind: message`.
    pub fn trace(&self, task: &Task) -> String {
        let message = self.to_string().replace('\n', " ");
        format!(
            "task {} ({}) failed\n{}: {}",
            task.kind,
            task.label,
            self.kind_name(),
            message
        )
    }

    pub fn into_failure(self, task: &Task) -> TaskFailure {
        let trace = self.trace(task);
        if self.is_retryable() {
            TaskFailure::retryable(trace)
        } else {
            TaskFailure::fatal(trace)
        }
    }
}

impl RetryableError for StageError {
    fn is_retryable(&self) -> bool {
        true
    }
}

pub type StageResult = Result<StageOutcome, StageError>;

/// Maps a stage result to what the task worker records.
pub fn to_task_result(task: &Task, result: StageResult) -> TaskResult {
    match result {
        Ok(StageOutcome::Completed) => Ok(TaskOutcome::Completed),
        Ok(StageOutcome::Skipped(reason)) => Ok(TaskOutcome::Skipped(reason.to_string())),
        Err(e) => Err(e.into_failure(task)),
    }
}
