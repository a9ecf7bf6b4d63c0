mod file_config;

pub use file_config::{BackgroundJobsConfig, FileConfig, TaskQueueConfig, ThumbnailConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub download_root: Option<PathBuf>,
    pub extractor_url: Option<String>,
    pub extractor_timeout_sec: u64,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub download_root: PathBuf,
    pub thumbnail_cache: PathBuf,
    pub extractor_url: String,
    pub extractor_timeout_sec: u64,

    pub task_queue: TaskQueueSettings,
    pub thumbnails: ThumbnailSettings,
    pub background_jobs: BackgroundJobsSettings,
}

#[derive(Debug, Clone)]
pub struct TaskQueueSettings {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub completed_task_retention_days: u64,
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 1000,
            max_attempts: 8,
            initial_backoff_secs: 60,
            max_backoff_secs: 86400, // 24 hours
            backoff_multiplier: 2.5,
            completed_task_retention_days: 30,
        }
    }
}

impl TaskQueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: 430,
            height: 240,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    pub source_index_check_interval_secs: u64,
    pub expired_media_sweep_interval_secs: u64,
    pub completed_tasks_cleanup_interval_secs: u64,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            source_index_check_interval_secs: 60,
            expired_media_sweep_interval_secs: 60 * 60,
            completed_tasks_cleanup_interval_secs: 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let download_root = file
            .download_root
            .map(PathBuf::from)
            .or_else(|| cli.download_root.clone())
            .unwrap_or_else(|| db_dir.join("downloads"));
        let thumbnail_cache = file
            .thumbnail_cache
            .map(PathBuf::from)
            .unwrap_or_else(|| db_dir.join("thumbs"));

        let extractor_url = file
            .extractor_url
            .or_else(|| cli.extractor_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "extractor_url must be specified via --extractor-url or in config file"
                )
            })?;
        let extractor_timeout_sec = file
            .extractor_timeout_sec
            .unwrap_or(cli.extractor_timeout_sec);

        let tq_file = file.task_queue.unwrap_or_default();
        let tq_default = TaskQueueSettings::default();
        let task_queue = TaskQueueSettings {
            workers: tq_file
                .workers
                .or(cli.workers)
                .unwrap_or(tq_default.workers)
                .max(1),
            poll_interval_ms: tq_file.poll_interval_ms.unwrap_or(tq_default.poll_interval_ms),
            max_attempts: tq_file.max_attempts.unwrap_or(tq_default.max_attempts),
            initial_backoff_secs: tq_file
                .initial_backoff_secs
                .unwrap_or(tq_default.initial_backoff_secs),
            max_backoff_secs: tq_file
                .max_backoff_secs
                .unwrap_or(tq_default.max_backoff_secs),
            backoff_multiplier: tq_file
                .backoff_multiplier
                .unwrap_or(tq_default.backoff_multiplier),
            completed_task_retention_days: tq_file
                .completed_task_retention_days
                .unwrap_or(tq_default.completed_task_retention_days),
        };

        let th_file = file.thumbnails.unwrap_or_default();
        let th_default = ThumbnailSettings::default();
        let thumbnails = ThumbnailSettings {
            width: th_file.width.unwrap_or(th_default.width),
            height: th_file.height.unwrap_or(th_default.height),
            jpeg_quality: th_file
                .jpeg_quality
                .unwrap_or(th_default.jpeg_quality)
                .clamp(1, 100),
        };
        if thumbnails.width == 0 || thumbnails.height == 0 {
            bail!("Thumbnail dimensions must be positive");
        }

        let bj_file = file.background_jobs.unwrap_or_default();
        let bj_default = BackgroundJobsSettings::default();
        let background_jobs = BackgroundJobsSettings {
            source_index_check_interval_secs: bj_file
                .source_index_check_interval_secs
                .unwrap_or(bj_default.source_index_check_interval_secs),
            expired_media_sweep_interval_secs: bj_file
                .expired_media_sweep_interval_secs
                .unwrap_or(bj_default.expired_media_sweep_interval_secs),
            completed_tasks_cleanup_interval_secs: bj_file
                .completed_tasks_cleanup_interval_secs
                .unwrap_or(bj_default.completed_tasks_cleanup_interval_secs),
        };

        Ok(Self {
            db_dir,
            download_root,
            thumbnail_cache,
            extractor_url,
            extractor_timeout_sec,
            task_queue,
            thumbnails,
            background_jobs,
        })
    }

    pub fn tasks_db_path(&self) -> PathBuf {
        self.db_dir.join("tasks.db")
    }

    pub fn catalog_snapshot_path(&self) -> PathBuf {
        self.db_dir.join("catalog.json")
    }
}
