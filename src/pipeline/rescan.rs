use super::{PipelineContext, SkipReason, StageError, StageOutcome, StageResult};
use tracing::info;
use uuid::Uuid;

/// Asks a media server to pick up new downloads.
pub async fn rescan_media_server(ctx: &PipelineContext, server_id: Uuid) -> StageResult {
    let Some(server) = ctx
        .catalog
        .get_media_server(&server_id)
        .map_err(StageError::Catalog)?
    else {
        return Ok(StageOutcome::Skipped(SkipReason::EntityGone));
    };

    info!("Updating media server {}", server.base_url());
    ctx.media_servers
        .update(&server)
        .await
        .map_err(StageError::TransientExternal)?;
    Ok(StageOutcome::Completed)
}
