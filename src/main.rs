use anyhow::{bail, Context, Result};
use clap::Parser;
use mediasync::background_jobs::jobs::{
    CompletedTasksCleanupJob, ExpiredMediaCleanupJob, SourceIndexSchedulerJob,
};
use mediasync::background_jobs::{create_scheduler, JobContext};
use mediasync::catalog::{MediaLayout, MemoryCatalogStore};
use mediasync::config::{AppConfig, CliConfig, FileConfig};
use mediasync::pipeline::{register_handlers, PipelineContext};
use mediasync::providers::{HttpExtractorClient, HttpImageFetcher, HttpMediaServerClient};
use mediasync::task_queue::{
    run_worker_pool, RetryPolicy, SqliteTaskStore, TaskRegistry, TaskStore, TaskWorker,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the task queue database and the catalog snapshot.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Root directory media files are downloaded into.
    #[clap(long, value_parser = parse_path)]
    pub download_root: Option<PathBuf>,

    /// URL of the extractor service used to enumerate and download media.
    #[clap(long)]
    pub extractor_url: Option<String>,

    /// Timeout in seconds for extractor requests.
    #[clap(long, default_value_t = 300)]
    pub extractor_timeout_sec: u64,

    /// Number of concurrent task workers.
    #[clap(long)]
    pub workers: Option<usize>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            download_root: self.download_root.clone(),
            extractor_url: self.extractor_url.clone(),
            extractor_timeout_sec: self.extractor_timeout_sec,
            workers: self.workers,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening task queue at {:?}...", config.tasks_db_path());
    let tasks = Arc::new(SqliteTaskStore::new(config.tasks_db_path())?);
    tasks.requeue_in_flight()?;

    let layout = MediaLayout::new(&config.download_root, &config.thumbnail_cache);
    info!("Loading catalog from {:?}...", config.catalog_snapshot_path());
    let catalog = Arc::new(MemoryCatalogStore::open(
        config.catalog_snapshot_path(),
        layout.clone(),
    )?);

    let ctx = Arc::new(PipelineContext {
        catalog: catalog.clone(),
        tasks: tasks.clone(),
        extractor: Arc::new(HttpExtractorClient::new(
            &config.extractor_url,
            config.extractor_timeout_sec,
        )?),
        images: Arc::new(HttpImageFetcher::new(config.extractor_timeout_sec)?),
        media_servers: Arc::new(HttpMediaServerClient::new(config.extractor_timeout_sec)?),
        layout,
        thumbnails: config.thumbnails.clone(),
        completed_task_retention_days: config.task_queue.completed_task_retention_days,
    });

    let mut registry = TaskRegistry::new();
    register_handlers(&mut registry, ctx);
    let missing = registry.missing_kinds();
    if !missing.is_empty() {
        bail!("No handler registered for task kinds: {:?}", missing);
    }

    let shutdown_token = CancellationToken::new();

    let job_context = JobContext::new(shutdown_token.child_token(), catalog, tasks.clone());
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone(), job_context);
    let jobs_settings = &config.background_jobs;
    scheduler
        .register_job(Arc::new(SourceIndexSchedulerJob::new(Duration::from_secs(
            jobs_settings.source_index_check_interval_secs,
        ))))
        .await;
    scheduler
        .register_job(Arc::new(ExpiredMediaCleanupJob::new(Duration::from_secs(
            jobs_settings.expired_media_sweep_interval_secs,
        ))))
        .await;
    scheduler
        .register_job(Arc::new(CompletedTasksCleanupJob::new(
            config.task_queue.completed_task_retention_days,
            Duration::from_secs(jobs_settings.completed_tasks_cleanup_interval_secs),
        )))
        .await;
    for job in scheduler_handle.list_jobs().await {
        info!(
            "Background job {} every {}s{}: {}",
            job.id,
            job.interval_secs,
            if job.runs_on_startup { " and at startup" } else { "" },
            job.description
        );
    }
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let worker = Arc::new(TaskWorker::new(
        tasks,
        Arc::new(registry),
        RetryPolicy::new(&config.task_queue),
        config.task_queue.poll_interval(),
    ));
    info!("Starting {} task workers", config.task_queue.workers);
    let workers_task = tokio::spawn(run_worker_pool(
        worker,
        config.task_queue.workers,
        shutdown_token.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, stopping workers and background jobs...");
    shutdown_token.cancel();

    if let Err(e) = workers_task.await {
        error!("Task workers did not stop cleanly: {}", e);
    }
    if let Err(e) = scheduler_task.await {
        error!("Job scheduler did not stop cleanly: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}
