use super::triggers::{on_media_deleted, on_media_saved};
use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use crate::catalog::{Media, Source};
use crate::maintenance::{purge_expired_media, purge_old_completed_tasks, purge_removed_media};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Enumerates a source and records the items it lists.
///
/// The whole batch is stored or none of it. Re-running with an unchanged
/// upstream list creates nothing and leaves existing rows untouched.
pub async fn index_source(ctx: &PipelineContext, source_id: Uuid) -> StageResult {
    let Some(mut source) = ctx.catalog.get_source(&source_id).map_err(StageError::Catalog)? else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };
    source.last_index_attempt = Some(Utc::now());
    ctx.catalog.save_source(&source).map_err(StageError::Catalog)?;

    let items = ctx
        .extractor
        .enumerate_source(&source)
        .await
        .map_err(StageError::TransientExternal)?;

    if items.is_empty() {
        source.has_failed = true;
        ctx.catalog.save_source(&source).map_err(StageError::Catalog)?;
        let failure = StageError::NoData {
            source_id,
            name: source.name.clone(),
        };
        error!("{}", failure);
        return Err(failure);
    }

    let keys: Vec<String> = items
        .iter()
        .map(|item| item.id.trim())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();
    let batch = ctx
        .catalog
        .index_media_keys(&source.id, &keys)
        .map_err(StageError::Catalog)?;
    for key in &batch.collisions {
        error!("Index media failed: {} / {} is listed more than once", source.name, key);
    }

    let now = Utc::now();
    source.last_crawl = Some(now);
    source.has_failed = false;
    ctx.catalog.save_source(&source).map_err(StageError::Catalog)?;
    info!(
        "Found {} media items for source {} ({} new)",
        items.len(),
        source.name,
        batch.created.len()
    );

    for media in batch.created.iter().chain(&batch.existing) {
        on_media_saved(ctx.tasks.as_ref(), &source, media, now.timestamp())
            .map_err(StageError::Catalog)?;
    }

    run_sweeps(ctx, &source, keys.into_iter().collect(), now);
    Ok(StageOutcome::Completed)
}

/// Maintenance that follows a successful index. Failures are logged and never
/// turn the index into a failure.
fn run_sweeps(
    ctx: &PipelineContext,
    source: &Source,
    remote_keys: HashSet<String>,
    now: DateTime<Utc>,
) {
    if let Err(e) =
        purge_old_completed_tasks(ctx.tasks.as_ref(), ctx.completed_task_retention_days, now)
    {
        warn!("Completed task cleanup after indexing {} failed: {:#}", source.name, e);
    }

    match purge_expired_media(ctx.catalog.as_ref(), now) {
        Ok(deleted) => drop_pending_work(ctx, &deleted),
        Err(e) => warn!("Expired media cleanup after indexing {} failed: {:#}", source.name, e),
    }

    if source.delete_removed_media {
        info!("Cleaning up media no longer in source {}", source.name);
        match purge_removed_media(ctx.catalog.as_ref(), source, &remote_keys) {
            Ok(deleted) => drop_pending_work(ctx, &deleted),
            Err(e) => warn!("Removed media cleanup of {} failed: {:#}", source.name, e),
        }
    }
}

fn drop_pending_work(ctx: &PipelineContext, deleted: &[Media]) {
    for media in deleted {
        if let Err(e) = on_media_deleted(ctx.tasks.as_ref(), media) {
            warn!("Failed to drop pending tasks of deleted media {}: {:#}", media.id, e);
        }
    }
}
