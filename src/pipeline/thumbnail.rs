use super::triggers::on_media_saved;
use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use crate::config::ThumbnailSettings;
use anyhow::{Context, Result};
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{info, warn};
use uuid::Uuid;

/// Resizes `image` to the configured height keeping its aspect ratio,
/// centre-crops anything wider than the configured width and encodes the
/// result as JPEG.
pub fn render_thumbnail(image: &DynamicImage, settings: &ThumbnailSettings) -> Result<Vec<u8>> {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scaled_width = ((u64::from(width) * u64::from(settings.height)) / u64::from(height))
        .clamp(1, u64::from(u32::MAX)) as u32;

    let mut resized = image.resize_exact(scaled_width, settings.height, FilterType::Lanczos3);
    if scaled_width > settings.width {
        let x = (scaled_width - settings.width) / 2;
        resized = resized.crop_imm(x, 0, settings.width, settings.height);
    }

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, settings.jpeg_quality);
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_with_encoder(encoder)
        .context("Failed to encode thumbnail")?;
    Ok(bytes)
}

/// Downloads the thumbnail at `url` and stores a resized copy in the
/// thumbnail cache.
pub async fn fetch_thumbnail(ctx: &PipelineContext, media_id: Uuid, url: &str) -> StageResult {
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
    if !source.download_thumbnails {
        return Ok(StageOutcome::Skipped(SkipReason::ThumbnailsDisabled));
    }

    let image = ctx
        .images
        .fetch_image(url)
        .await
        .map_err(StageError::TransientExternal)?;
    info!(
        "Resizing {}x{} thumbnail to {}x{}: {}",
        image.width(),
        image.height(),
        ctx.thumbnails.width,
        ctx.thumbnails.height,
        url
    );

    let settings = ctx.thumbnails.clone();
    let bytes = tokio::task::spawn_blocking(move || render_thumbnail(&image, &settings))
        .await
        .context("Thumbnail rendering task failed")
        .and_then(|rendered| rendered)
        .map_err(StageError::TransientExternal)?;

    let path = ctx.layout.cached_thumbnail_path(&media);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create thumbnail directory {:?}", parent))
            .map_err(StageError::TransientExternal)?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write thumbnail {:?}", path))
        .map_err(StageError::TransientExternal)?;

    // Reload so fields written by other stages during the fetch are kept.
    let Some(mut media) = ctx.catalog.get_media(&media_id).map_err(StageError::Catalog)? else {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove orphaned thumbnail {:?}: {}", path, e);
        }
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };
    media.thumbnail = Some(path);
    ctx.catalog.save_media(&media).map_err(StageError::Catalog)?;
    info!("Saved thumbnail for {} from {}", media.key, url);

    on_media_saved(ctx.tasks.as_ref(), &source, &media, Utc::now().timestamp())
        .map_err(StageError::Catalog)?;
    Ok(StageOutcome::Completed)
}
