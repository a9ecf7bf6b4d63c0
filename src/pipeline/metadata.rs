use super::triggers::on_media_saved;
use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use crate::catalog::MediaMetadata;
use crate::policy::{select_target_format, should_skip_for_cap, should_skip_for_retention};
use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fetches and stores the metadata document of a media item, then decides
/// whether the item is skipped and whether it can be downloaded at all.
pub async fn fetch_metadata(ctx: &PipelineContext, media_id: Uuid) -> StageResult {
    let Some(mut media) = ctx.catalog.get_media(&media_id).map_err(StageError::Catalog)? else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };
    if media.manual_skip {
        debug!("Metadata fetch for {} skipped, media is manually skipped", media.key);
        return Ok(StageOutcome::Skipped(SkipReason::ManuallySkipped));
    }
    if media.metadata.is_some() {
        return Ok(StageOutcome::Skipped(SkipReason::AlreadyFetched));
    }
    let Some(source) = ctx
        .catalog
        .get_source(&media.source_id)
        .map_err(StageError::Catalog)?
    else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };

    let document = ctx
        .extractor
        .fetch_metadata(&source, &media)
        .await
        .map_err(StageError::TransientExternal)?;
    let metadata: MediaMetadata = serde_json::from_value(document.clone())
        .with_context(|| format!("Malformed metadata document for {}", media.key))
        .map_err(StageError::TransientExternal)?;

    media.metadata = Some(document.to_string());
    media.published = metadata.published();
    if media.published.is_none() {
        warn!("Media has no upload date, skipping: {} / {}", source.name, media.key);
        media.skip = true;
    }
    if should_skip_for_cap(&media, &source) {
        warn!(
            "Media {} / {} is older than the download cap date, skipping",
            source.name, media.key
        );
        media.skip = true;
    }
    let now = Utc::now();
    if media.published.is_some() && should_skip_for_retention(&media, &source, now) {
        warn!(
            "Media {} / {} is older than {} days, skipping",
            source.name, media.key, source.days_to_keep
        );
        media.skip = true;
    }
    if !media.skip {
        media.can_download = select_target_format(&media, &source).is_some();
    }

    // Another task may have deleted the item while the fetch ran.
    if ctx
        .catalog
        .get_media(&media_id)
        .map_err(StageError::Catalog)?
        .is_none()
    {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    }
    ctx.catalog.save_media(&media).map_err(StageError::Catalog)?;
    info!(
        "Saved {} bytes of metadata for {} / {}",
        media.metadata.as_deref().map_or(0, str::len),
        source.name,
        media.key
    );

    on_media_saved(ctx.tasks.as_ref(), &source, &media, now.timestamp())
        .map_err(StageError::Catalog)?;
    Ok(StageOutcome::Completed)
}
