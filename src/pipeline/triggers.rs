//! Scheduling that follows catalog mutations.
//!
//! Callers that change a source or media item invoke the matching function
//! here; the task queue itself never looks at catalog entities.

use crate::catalog::{Media, MediaServer, Source};
use crate::task_queue::{TaskKind, TaskParams, TaskRequest, TaskStore};
use anyhow::Result;
use tracing::{debug, info};
use uuid::Uuid;

pub fn lane_of(source_id: &Uuid) -> String {
    source_id.to_string()
}

/// Schedules an index of `source`, unless one is already waiting.
pub fn schedule_index(tasks: &dyn TaskStore, source: &Source, now: i64) -> Result<bool> {
    let request = TaskRequest::new(
        TaskKind::IndexSource,
        TaskParams::new([source.id.to_string()]),
        lane_of(&source.id),
        now,
    )
    .with_label(format!("Index media from source \"{}\"", source.name));
    Ok(tasks.enqueue(request)?.is_scheduled())
}

/// Makes sure the source directory exists and re-indexes the source with its
/// current settings. Work the settings no longer allow is dropped.
pub fn on_source_saved(tasks: &dyn TaskStore, source: &Source, now: i64) -> Result<()> {
    let params = TaskParams::new([source.id.to_string()]);
    let lane = lane_of(&source.id);

    if !source.download_media {
        let cancelled = tasks.cancel_lane_tasks(TaskKind::DownloadMedia, &lane)?;
        if cancelled > 0 {
            info!("Cancelled {} pending downloads of source {}", cancelled, source.name);
        }
    }
    if !source.download_thumbnails {
        tasks.cancel_lane_tasks(TaskKind::FetchThumbnail, &lane)?;
    }

    tasks.enqueue(
        TaskRequest::new(TaskKind::CheckSourceDirectory, params.clone(), lane.clone(), now)
            .with_label(format!("Check download directory exists for source \"{}\"", source.name)),
    )?;
    tasks.enqueue(
        TaskRequest::new(TaskKind::IndexSource, params, lane, now)
            .with_label(format!("Index media from source \"{}\"", source.name))
            .replacing(),
    )?;
    debug!("Scheduled directory check and index for source {}", source.name);
    Ok(())
}

/// Drops every pending task of a deleted source.
pub fn on_source_deleted(tasks: &dyn TaskStore, source_id: &Uuid) -> Result<usize> {
    let cancelled = tasks.cancel_lane(&lane_of(source_id))?;
    if cancelled > 0 {
        info!("Cancelled {} pending tasks of deleted source {}", cancelled, source_id);
    }
    Ok(cancelled)
}

/// Schedules the stages `media` is still missing. Returns the kinds that got
/// scheduled; work that is already pending is not counted.
pub fn on_media_saved(
    tasks: &dyn TaskStore,
    source: &Source,
    media: &Media,
    now: i64,
) -> Result<Vec<TaskKind>> {
    let media_id = media.id.to_string();
    let lane = lane_of(&source.id);
    let mut scheduled = Vec::new();

    if media.skip || media.manual_skip {
        if tasks.drop_pending(TaskKind::DownloadMedia, &TaskParams::new([media_id.as_str()]))? {
            debug!("Dropped download of skipped media {}", media.key);
        }
        return Ok(scheduled);
    }

    let Some(metadata) = media.metadata_document() else {
        let request = TaskRequest::new(
            TaskKind::FetchMetadata,
            TaskParams::new([media_id.as_str()]),
            lane,
            now,
        )
        .with_label(format!("Downloading metadata for \"{}\"", media.key));
        if tasks.enqueue(request)?.is_scheduled() {
            scheduled.push(TaskKind::FetchMetadata);
        }
        return Ok(scheduled);
    };

    if source.download_thumbnails && media.thumbnail.is_none() {
        if let Some(url) = metadata.thumbnail.as_deref().filter(|u| !u.is_empty()) {
            let request = TaskRequest::new(
                TaskKind::FetchThumbnail,
                TaskParams::new([media_id.as_str(), url]),
                lane.clone(),
                now,
            )
            .with_label(format!("Downloading thumbnail for \"{}\"", media.title()));
            if tasks.enqueue(request)?.is_scheduled() {
                scheduled.push(TaskKind::FetchThumbnail);
            }
        }
    }

    if media.can_download && !media.downloaded && source.download_media {
        let request = TaskRequest::new(
            TaskKind::DownloadMedia,
            TaskParams::new([media_id.as_str()]),
            lane,
            now,
        )
        .with_label(format!("Downloading media for \"{}\"", media.title()));
        if tasks.enqueue(request)?.is_scheduled() {
            scheduled.push(TaskKind::DownloadMedia);
        }
    }

    Ok(scheduled)
}

/// Drops the pending work of a deleted media item. In-flight work finds the
/// item gone and ends as a no-op.
pub fn on_media_deleted(tasks: &dyn TaskStore, media: &Media) -> Result<usize> {
    let params = TaskParams::new([media.id.to_string()]);
    let mut dropped = 0;
    for kind in [TaskKind::FetchMetadata, TaskKind::DownloadMedia] {
        if tasks.drop_pending(kind, &params)? {
            dropped += 1;
        }
    }
    let thumbnail_url = media.metadata_document().and_then(|m| m.thumbnail);
    if let Some(url) = thumbnail_url {
        let params = TaskParams::new([media.id.to_string(), url]);
        if tasks.drop_pending(TaskKind::FetchThumbnail, &params)? {
            dropped += 1;
        }
    }
    Ok(dropped)
}

/// Requests a library rescan on `server`, replacing a rescan already waiting
/// in the same lane.
pub fn schedule_rescan(
    tasks: &dyn TaskStore,
    server: &MediaServer,
    lane: &str,
    now: i64,
) -> Result<()> {
    let request = TaskRequest::new(
        TaskKind::RescanMediaServer,
        TaskParams::new([server.id.to_string()]),
        lane,
        now,
    )
    .with_label(format!("Request media server rescan for \"{}\"", server.base_url()))
    .replacing();
    tasks.enqueue(request)?;
    Ok(())
}
