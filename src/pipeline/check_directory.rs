use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use anyhow::Context;
use tracing::info;
use uuid::Uuid;

/// Creates the output directory of a source when it is missing. Permission
/// problems surface as failed tasks.
pub async fn check_source_directory(ctx: &PipelineContext, source_id: Uuid) -> StageResult {
    let Some(source) = ctx.catalog.get_source(&source_id).map_err(StageError::Catalog)? else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };

    let directory = ctx.layout.source_directory(&source);
    if !tokio::fs::try_exists(&directory).await.unwrap_or(false) {
        info!("Creating directory {:?}", directory);
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create directory {:?}", directory))
            .map_err(StageError::TransientExternal)?;
    }
    Ok(StageOutcome::Completed)
}
