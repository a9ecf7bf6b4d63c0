//! Task handlers binding each task kind to its stage.

use super::{
    check_source_directory, download_media, fetch_metadata, fetch_thumbnail, index_source,
    rescan_media_server, to_task_result, PipelineContext,
};
use crate::task_queue::{Task, TaskFailure, TaskHandler, TaskKind, TaskRegistry, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

fn invalid_arguments(task: &Task, detail: &str) -> TaskFailure {
    TaskFailure::fatal(format!(
        "task {} ({}) failed\nInvalidArguments: {}",
        task.kind, task.label, detail
    ))
}

/// Entity id carried as the first task argument.
fn entity_id(task: &Task) -> Result<Uuid, TaskFailure> {
    let raw = task
        .params
        .first_arg()
        .ok_or_else(|| invalid_arguments(task, "missing entity id"))?;
    Uuid::parse_str(raw).map_err(|_| invalid_arguments(task, &format!("malformed id '{}'", raw)))
}

pub struct IndexSourceHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for IndexSourceHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let source_id = entity_id(task)?;
        to_task_result(task, index_source(&self.0, source_id).await)
    }
}

pub struct CheckSourceDirectoryHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for CheckSourceDirectoryHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let source_id = entity_id(task)?;
        to_task_result(task, check_source_directory(&self.0, source_id).await)
    }
}

pub struct FetchMetadataHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for FetchMetadataHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let media_id = entity_id(task)?;
        to_task_result(task, fetch_metadata(&self.0, media_id).await)
    }
}

pub struct FetchThumbnailHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for FetchThumbnailHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let media_id = entity_id(task)?;
        let url = task
            .params
            .arg(1)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| invalid_arguments(task, "missing thumbnail url"))?;
        to_task_result(task, fetch_thumbnail(&self.0, media_id, url).await)
    }
}

pub struct DownloadMediaHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for DownloadMediaHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let media_id = entity_id(task)?;
        to_task_result(task, download_media(&self.0, media_id).await)
    }
}

pub struct RescanMediaServerHandler(pub Arc<PipelineContext>);

#[async_trait]
impl TaskHandler for RescanMediaServerHandler {
    async fn run(&self, task: &Task) -> TaskResult {
        let server_id = entity_id(task)?;
        to_task_result(task, rescan_media_server(&self.0, server_id).await)
    }
}

/// Binds every task kind to its pipeline stage.
pub fn register_handlers(registry: &mut TaskRegistry, ctx: Arc<PipelineContext>) {
    for kind in TaskKind::ALL {
        let handler: Arc<dyn TaskHandler> = match kind {
            TaskKind::IndexSource => Arc::new(IndexSourceHandler(ctx.clone())),
            TaskKind::CheckSourceDirectory => Arc::new(CheckSourceDirectoryHandler(ctx.clone())),
            TaskKind::FetchMetadata => Arc::new(FetchMetadataHandler(ctx.clone())),
            TaskKind::FetchThumbnail => Arc::new(FetchThumbnailHandler(ctx.clone())),
            TaskKind::DownloadMedia => Arc::new(DownloadMediaHandler(ctx.clone())),
            TaskKind::RescanMediaServer => Arc::new(RescanMediaServerHandler(ctx.clone())),
        };
        registry.register(kind, handler);
    }
}
