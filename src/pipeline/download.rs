use super::format_code::describe_download;
use super::nfo::render_nfo;
use super::triggers::{lane_of, schedule_rescan};
use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use crate::catalog::{Media, Source};
use crate::policy::{select_target_format, should_skip_for_cap};
use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Policy checks repeated at execution time, since the item or its source may
/// have changed after the download was scheduled.
fn precondition(media: &Media, source: &Source) -> Option<SkipReason> {
    if media.skip || media.manual_skip {
        Some(SkipReason::MarkedSkip)
    } else if media.downloaded {
        Some(SkipReason::AlreadyDownloaded)
    } else if !source.download_media {
        Some(SkipReason::DownloadsDisabled)
    } else if should_skip_for_cap(media, source) {
        Some(SkipReason::PastCapDate)
    } else if !media.can_download {
        Some(SkipReason::NotDownloadable)
    } else {
        None
    }
}

/// Downloads a media file and runs the post-download side effects.
pub async fn download_media(ctx: &PipelineContext, media_id: Uuid) -> StageResult {
    let Some(media) = ctx.catalog.get_media(&media_id).map_err(StageError::Catalog)? else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };
    let Some(source) = ctx
        .catalog
        .get_source(&media.source_id)
        .map_err(StageError::Catalog)?
    else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };
    if let Some(reason) = precondition(&media, &source) {
        warn!("Download of {} ({}) not started: {}", media.key, media.id, reason);
        return Ok(StageOutcome::Skipped(reason));
    }
    let Some(selection) = select_target_format(&media, &source) else {
        warn!("Download of {} ({}) not started: no acceptable format", media.key, media.id);
        return Ok(StageOutcome::Skipped(SkipReason::NotDownloadable));
    };

    let output_path = ctx.layout.media_file_path(&source, &media);
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))
            .map_err(StageError::TransientExternal)?;
    }

    info!(
        "Downloading media {} ({}) as {} to {:?}",
        media.key,
        media.id,
        selection.format_code(),
        output_path
    );
    let result = ctx
        .extractor
        .download(&source, &media, &selection, &output_path)
        .await
        .map_err(StageError::TransientExternal)?;

    let file_size = match tokio::fs::metadata(&output_path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            let failure = StageError::MissingOutput {
                media_id: media.id,
                path: output_path,
            };
            error!("{}", failure);
            return Err(failure);
        }
    };
    info!("Successfully downloaded media {} ({}) to {:?}", media.key, media.id, output_path);

    // The item or its source may have been deleted while the file was downloading.
    let current = ctx.catalog.get_media(&media_id).map_err(StageError::Catalog)?;
    let source_exists = ctx
        .catalog
        .get_source(&source.id)
        .map_err(StageError::Catalog)?
        .is_some();
    let Some(mut media) = current.filter(|_| source_exists) else {
        warn!(
            "Media {} ({}) was deleted during its download, removing {:?}",
            media.key,
            media.id,
            output_path
        );
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            warn!("Failed to remove orphaned download {:?}: {}", output_path, e);
        }
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };

    let metadata = media.metadata_document().unwrap_or_default();
    let now = Utc::now();
    media.downloaded = true;
    media.media_file = Some(output_path);
    media.download_date = Some(now);
    media.downloaded_filesize = Some(file_size);
    media.downloaded_container = Some(result.container.clone());
    describe_download(&result.format_code, &metadata).apply_to(&mut media);
    ctx.catalog.save_media(&media).map_err(StageError::Catalog)?;

    if source.copy_thumbnails {
        if let Some(thumbnail) = media.thumbnail.as_ref() {
            let target = ctx.layout.sidecar_thumbnail_path(&source, &media);
            info!("Copying media thumbnail from {:?} to {:?}", thumbnail, target);
            if let Err(e) = tokio::fs::copy(thumbnail, &target).await {
                warn!("Failed to copy thumbnail to {:?}: {}", target, e);
            }
        }
    }

    if source.write_nfo {
        let target = ctx.layout.nfo_path(&source, &media);
        info!("Writing media NFO file to {:?}", target);
        let written = match render_nfo(&source, &media, &metadata) {
            Ok(xml) => tokio::fs::write(&target, xml).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Failed to write NFO file {:?}: {:#}", target, e);
        }
    }

    let lane = lane_of(&source.id);
    for server in ctx
        .catalog
        .list_media_servers()
        .map_err(StageError::Catalog)?
    {
        info!("Scheduling rescan of media server {}", server.base_url());
        schedule_rescan(ctx.tasks.as_ref(), &server, &lane, now.timestamp())
            .map_err(StageError::Catalog)?;
    }

    Ok(StageOutcome::Completed)
}
