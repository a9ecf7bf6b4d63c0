//! Common test infrastructure
//!
//! Builds a pipeline over a temporary directory with scripted stand-ins for
//! the extractor, the image fetcher and media servers.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use mediasync::catalog::{
    CatalogStore, IndexBatch, Media, MediaFilter, MediaLayout, MediaServer, MemoryCatalogStore,
    Source, SourceKind,
};
use mediasync::config::{TaskQueueSettings, ThumbnailSettings};
use mediasync::pipeline::{register_handlers, PipelineContext};
use mediasync::policy::FormatSelection;
use mediasync::providers::{
    DownloadResult, ImageFetcher, MediaExtractor, MediaServerClient, RemoteItem,
};
use mediasync::task_queue::{
    CompletedTask, EnqueueOutcome, RetryPolicy, SqliteTaskStore, Task, TaskKind, TaskParams,
    TaskRegistry, TaskRequest, TaskStore, TaskWorker,
};
use serde_json::{json, Value};
use uuid::Uuid;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const THUMBNAIL_URL: &str = "https://img.example/thumb.jpg";

/// Metadata document with a 1080p VP9 stream and an Opus audio stream.
pub fn video_document(key: &str, uploaded: DateTime<Utc>) -> Value {
    json!({
        "id": key,
        "title": format!("Video {}", key),
        "description": "A test video",
        "upload_date": uploaded.format("%Y%m%d").to_string(),
        "thumbnail": THUMBNAIL_URL,
        "duration": 125.0,
        "uploader": "Tester",
        "formats": [
            {
                "format_id": "137", "vcodec": "avc1.640028", "acodec": "none",
                "width": 1920, "height": 1080, "fps": 30.0
            },
            {
                "format_id": "248", "vcodec": "vp9", "acodec": "none",
                "width": 1920, "height": 1080, "fps": 30.0
            },
            {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2"},
            {"format_id": "251", "vcodec": "none", "acodec": "opus"}
        ]
    })
}

type DownloadHook = Box<dyn Fn(&Media) + Send + Sync>;

/// Scripted extractor. Enumeration returns `items`; metadata comes from
/// `documents` keyed by media key; downloads write a small file unless
/// `write_output` is cleared. `on_download` runs before the file is written.
pub struct FakeExtractor {
    pub items: Mutex<Vec<RemoteItem>>,
    pub documents: Mutex<HashMap<String, Value>>,
    pub write_output: AtomicBool,
    pub downloads: AtomicUsize,
    pub on_download: Mutex<Option<DownloadHook>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            documents: Mutex::new(HashMap::new()),
            write_output: AtomicBool::new(true),
            downloads: AtomicUsize::new(0),
            on_download: Mutex::new(None),
        }
    }

    pub fn set_items(&self, keys: &[&str]) {
        *self.items.lock().unwrap() = keys.iter().map(|k| RemoteItem::new(*k)).collect();
    }

    pub fn set_document(&self, key: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(key.to_string(), document);
    }

    pub fn set_on_download(&self, hook: impl Fn(&Media) + Send + Sync + 'static) {
        *self.on_download.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn enumerate_source(&self, _source: &Source) -> Result<Vec<RemoteItem>> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn fetch_metadata(&self, _source: &Source, media: &Media) -> Result<Value> {
        match self.documents.lock().unwrap().get(&media.key) {
            Some(document) => Ok(document.clone()),
            None => bail!("no metadata for {}", media.key),
        }
    }

    async fn download(
        &self,
        source: &Source,
        media: &Media,
        selection: &FormatSelection,
        output_path: &Path,
    ) -> Result<DownloadResult> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_download.lock().unwrap().as_ref() {
            hook(media);
        }
        if self.write_output.load(Ordering::SeqCst) {
            tokio::fs::write(output_path, b"media bytes").await?;
        }
        Ok(DownloadResult {
            format_code: selection.format_code(),
            container: source.extension().to_string(),
        })
    }
}

pub struct FakeImageFetcher;

#[async_trait]
impl ImageFetcher for FakeImageFetcher {
    async fn fetch_image(&self, _url: &str) -> Result<DynamicImage> {
        Ok(DynamicImage::new_rgb8(640, 480))
    }
}

/// Image fetcher that deletes a media item before returning its image.
pub struct DeletingImageFetcher {
    pub catalog: Arc<MemoryCatalogStore>,
    pub media_id: Uuid,
}

#[async_trait]
impl ImageFetcher for DeletingImageFetcher {
    async fn fetch_image(&self, _url: &str) -> Result<DynamicImage> {
        self.catalog.delete_media(&self.media_id)?;
        Ok(DynamicImage::new_rgb8(640, 480))
    }
}

#[derive(Default)]
pub struct FakeMediaServers {
    pub updates: AtomicUsize,
}

#[async_trait]
impl MediaServerClient for FakeMediaServers {
    async fn update(&self, _server: &MediaServer) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Catalog whose bulk queries fail, so every maintenance sweep errors while
/// single-row reads and writes keep working.
pub struct FailingSweepCatalog(pub Arc<MemoryCatalogStore>);

impl CatalogStore for FailingSweepCatalog {
    fn get_source(&self, id: &Uuid) -> Result<Option<Source>> {
        self.0.get_source(id)
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        bail!("source listing unavailable")
    }

    fn save_source(&self, source: &Source) -> Result<()> {
        self.0.save_source(source)
    }

    fn delete_source(&self, id: &Uuid) -> Result<Option<Source>> {
        self.0.delete_source(id)
    }

    fn get_media(&self, id: &Uuid) -> Result<Option<Media>> {
        self.0.get_media(id)
    }

    fn find_media_by_key(&self, source_id: &Uuid, key: &str) -> Result<Option<Media>> {
        self.0.find_media_by_key(source_id, key)
    }

    fn list_media(&self, _filter: &MediaFilter) -> Result<Vec<Media>> {
        bail!("media listing unavailable")
    }

    fn save_media(&self, media: &Media) -> Result<()> {
        self.0.save_media(media)
    }

    fn delete_media(&self, id: &Uuid) -> Result<Option<Media>> {
        self.0.delete_media(id)
    }

    fn index_media_keys(&self, source_id: &Uuid, keys: &[String]) -> Result<IndexBatch> {
        self.0.index_media_keys(source_id, keys)
    }

    fn list_media_servers(&self) -> Result<Vec<MediaServer>> {
        self.0.list_media_servers()
    }

    fn get_media_server(&self, id: &Uuid) -> Result<Option<MediaServer>> {
        self.0.get_media_server(id)
    }

    fn save_media_server(&self, server: &MediaServer) -> Result<()> {
        self.0.save_media_server(server)
    }
}

/// Task store whose completed-log purge fails.
pub struct FailingPurgeTaskStore(pub Arc<SqliteTaskStore>);

impl TaskStore for FailingPurgeTaskStore {
    fn enqueue(&self, request: TaskRequest) -> Result<EnqueueOutcome> {
        self.0.enqueue(request)
    }

    fn find_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<Option<Task>> {
        self.0.find_pending(kind, params)
    }

    fn dequeue_ready(&self, now: i64) -> Result<Option<Task>> {
        self.0.dequeue_ready(now)
    }

    fn complete(&self, task: &Task, error: Option<&str>, duration_ms: i64) -> Result<()> {
        self.0.complete(task, error, duration_ms)
    }

    fn retry_later(&self, task: &Task, run_at: i64, error: &str) -> Result<()> {
        self.0.retry_later(task, run_at, error)
    }

    fn requeue_in_flight(&self) -> Result<usize> {
        self.0.requeue_in_flight()
    }

    fn cancel_lane_tasks(&self, kind: TaskKind, lane: &str) -> Result<usize> {
        self.0.cancel_lane_tasks(kind, lane)
    }

    fn cancel_lane(&self, lane: &str) -> Result<usize> {
        self.0.cancel_lane(lane)
    }

    fn drop_pending(&self, kind: TaskKind, params: &TaskParams) -> Result<bool> {
        self.0.drop_pending(kind, params)
    }

    fn list_pending(&self, limit: usize) -> Result<Vec<Task>> {
        self.0.list_pending(limit)
    }

    fn count_pending(&self) -> Result<usize> {
        self.0.count_pending()
    }

    fn list_completed(
        &self,
        lane: Option<&str>,
        only_errors: bool,
        limit: usize,
    ) -> Result<Vec<CompletedTask>> {
        self.0.list_completed(lane, only_errors, limit)
    }

    fn purge_completed_older_than(&self, _cutoff: i64) -> Result<usize> {
        bail!("completed log is locked")
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub catalog: Arc<MemoryCatalogStore>,
    pub tasks: Arc<SqliteTaskStore>,
    pub extractor: Arc<FakeExtractor>,
    pub servers: Arc<FakeMediaServers>,
    pub ctx: Arc<PipelineContext>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = MediaLayout::new(dir.path().join("downloads"), dir.path().join("thumbs"));
        let catalog = Arc::new(MemoryCatalogStore::new(layout.clone()));
        let tasks = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let extractor = Arc::new(FakeExtractor::new());
        let servers = Arc::new(FakeMediaServers::default());

        let ctx = Arc::new(PipelineContext {
            catalog: catalog.clone(),
            tasks: tasks.clone(),
            extractor: extractor.clone(),
            images: Arc::new(FakeImageFetcher),
            media_servers: servers.clone(),
            layout,
            thumbnails: ThumbnailSettings::default(),
            completed_task_retention_days: 30,
        });

        Self {
            dir,
            catalog,
            tasks,
            extractor,
            servers,
            ctx,
        }
    }

    /// Saves a channel source after applying `configure` to it.
    pub fn add_source(&self, configure: impl FnOnce(&mut Source)) -> Source {
        let mut source = Source::new(SourceKind::Channel, "UCtest", "Test Channel", "test-channel");
        configure(&mut source);
        self.catalog.save_source(&source).unwrap();
        source
    }

    /// Saves a media item whose metadata was already fetched and which can
    /// be downloaded.
    pub fn add_ready_media(&self, source: &Source, key: &str) -> Media {
        let uploaded = Utc::now() - chrono::Duration::days(1);
        let mut media = Media::new(source.id, key);
        media.metadata = Some(video_document(key, uploaded).to_string());
        media.published = Some(uploaded);
        media.can_download = true;
        self.catalog.save_media(&media).unwrap();
        media
    }

    /// A context over the same stores whose maintenance sweeps all fail.
    pub fn with_failing_sweeps(&self) -> PipelineContext {
        PipelineContext {
            catalog: Arc::new(FailingSweepCatalog(self.catalog.clone())),
            tasks: Arc::new(FailingPurgeTaskStore(self.tasks.clone())),
            extractor: self.extractor.clone(),
            images: Arc::new(FakeImageFetcher),
            media_servers: self.servers.clone(),
            layout: self.ctx.layout.clone(),
            thumbnails: ThumbnailSettings::default(),
            completed_task_retention_days: 30,
        }
    }

    /// A context over the same stores that fetches images through `images`.
    pub fn with_images(&self, images: Arc<dyn ImageFetcher>) -> PipelineContext {
        PipelineContext {
            catalog: self.catalog.clone(),
            tasks: self.tasks.clone(),
            extractor: self.extractor.clone(),
            images,
            media_servers: self.servers.clone(),
            layout: self.ctx.layout.clone(),
            thumbnails: ThumbnailSettings::default(),
            completed_task_retention_days: 30,
        }
    }

    pub fn media(&self, id: &Uuid) -> Option<Media> {
        self.catalog.get_media(id).unwrap()
    }

    pub fn worker(&self) -> TaskWorker {
        let mut registry = TaskRegistry::new();
        register_handlers(&mut registry, self.ctx.clone());
        TaskWorker::new(
            self.tasks.clone(),
            Arc::new(registry),
            RetryPolicy::new(&TaskQueueSettings::default()),
            Duration::from_millis(10),
        )
    }

    /// Runs ready tasks until none is left. Returns how many ran.
    pub async fn drain(&self, worker: &TaskWorker) -> usize {
        let mut ran = 0;
        while ran < 100 {
            match worker.run_once().await.unwrap() {
                Some(_) => ran += 1,
                None => break,
            }
        }
        ran
    }
}
