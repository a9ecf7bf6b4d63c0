use crate::catalog::{CatalogStore, Media, Source};
use crate::task_queue::{TaskKind, TaskParams};
use uuid::Uuid;

/// Catalog entity a task concerns.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSubject {
    Source(Source),
    Media(Media),
}

/// Looks up the entity a task concerns, with the path it is displayed at.
///
/// Unknown kinds, malformed params, a first argument that is not a uuid,
/// lookup errors and deleted entities all yield `None`.
pub fn resolve_task_subject(
    kind: TaskKind,
    params: &TaskParams,
    catalog: &dyn CatalogStore,
) -> Option<(TaskSubject, String)> {
    let id = Uuid::parse_str(params.first_arg()?).ok()?;
    match kind {
        TaskKind::IndexSource | TaskKind::CheckSourceDirectory => {
            let source = catalog.get_source(&id).ok()??;
            Some((TaskSubject::Source(source), format!("/source/{}", id)))
        }
        TaskKind::FetchMetadata | TaskKind::FetchThumbnail | TaskKind::DownloadMedia => {
            let media = catalog.get_media(&id).ok()??;
            Some((TaskSubject::Media(media), format!("/media/{}", id)))
        }
        TaskKind::RescanMediaServer => None,
    }
}

/// Same as [`resolve_task_subject`] for params still in their stored form.
pub fn resolve_stored_task_subject(
    kind: &str,
    params_json: &str,
    catalog: &dyn CatalogStore,
) -> Option<(TaskSubject, String)> {
    let kind = TaskKind::from_str(kind)?;
    let params = TaskParams::from_json(params_json)?;
    resolve_task_subject(kind, &params, catalog)
}
