//! End-to-end tests of the sync pipeline over a scripted extractor.

mod common;

use chrono::{Duration, Utc};
use common::{video_document, DeletingImageFetcher, TestEnv, THUMBNAIL_URL};
use mediasync::catalog::{CatalogStore, MediaFilter, MediaServer, MediaServerKind};
use mediasync::pipeline::triggers::{on_source_deleted, on_source_saved};
use mediasync::pipeline::{
    download_media, fetch_metadata, fetch_thumbnail, index_source, SkipReason, StageError,
    StageOutcome,
};
use mediasync::task_queue::{TaskKind, TaskStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn pending_kinds(env: &TestEnv) -> Vec<TaskKind> {
    env.tasks
        .list_pending(100)
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[tokio::test]
async fn test_index_is_idempotent() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    env.extractor.set_items(&["a", "b", "c"]);

    let outcome = index_source(&env.ctx, source.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);
    let first = env
        .catalog
        .list_media(&MediaFilter::for_source(source.id))
        .unwrap();
    assert_eq!(first.len(), 3);

    index_source(&env.ctx, source.id).await.unwrap();
    let second = env
        .catalog
        .list_media(&MediaFilter::for_source(source.id))
        .unwrap();
    assert_eq!(second.len(), 3);
    let mut first_ids: Vec<_> = first.iter().map(|m| m.id).collect();
    let mut second_ids: Vec<_> = second.iter().map(|m| m.id).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);

    // One metadata fetch per item, however often the source is indexed.
    let kinds = pending_kinds(&env);
    assert_eq!(kinds.len(), 3);
    assert!(kinds.iter().all(|k| *k == TaskKind::FetchMetadata));

    let saved = env.catalog.get_source(&source.id).unwrap().unwrap();
    assert!(saved.last_crawl.is_some());
    assert!(!saved.has_failed);
}

#[tokio::test]
async fn test_index_ignores_blank_and_repeated_keys() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    env.extractor.set_items(&["a", "a", "  ", "b"]);

    index_source(&env.ctx, source.id).await.unwrap();
    let media = env
        .catalog
        .list_media(&MediaFilter::for_source(source.id))
        .unwrap();
    assert_eq!(media.len(), 2);
}

#[tokio::test]
async fn test_empty_enumeration_marks_source_failed() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});

    let result = index_source(&env.ctx, source.id).await;
    assert!(matches!(result, Err(StageError::NoData { .. })));

    let saved = env.catalog.get_source(&source.id).unwrap().unwrap();
    assert!(saved.has_failed);
    assert!(saved.last_crawl.is_none());
    assert!(saved.last_index_attempt.is_some());
    assert!(!saved.is_index_due(Utc::now()));
    assert!(env.tasks.list_pending(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_index_of_deleted_source_is_noop() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    env.catalog.delete_source(&source.id).unwrap();
    env.extractor.set_items(&["a"]);

    let outcome = index_source(&env.ctx, source.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::EntityGone));
}

#[tokio::test]
async fn test_metadata_schedules_thumbnail_and_download() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    env.extractor.set_items(&["a"]);
    env.extractor
        .set_document("a", video_document("a", Utc::now() - Duration::days(2)));
    index_source(&env.ctx, source.id).await.unwrap();
    let media = env
        .catalog
        .find_media_by_key(&source.id, "a")
        .unwrap()
        .unwrap();

    let outcome = fetch_metadata(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);

    let media = env.media(&media.id).unwrap();
    assert!(media.metadata.is_some());
    assert!(media.published.is_some());
    assert!(!media.skip);
    assert!(media.can_download);
    assert_eq!(media.title(), "Video a");

    let kinds = pending_kinds(&env);
    assert!(kinds.contains(&TaskKind::FetchThumbnail));
    assert!(kinds.contains(&TaskKind::DownloadMedia));

    // A second fetch leaves the stored document alone.
    let outcome = fetch_metadata(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::AlreadyFetched));
}

#[tokio::test]
async fn test_metadata_before_cap_date_skips_download() {
    let env = TestEnv::new();
    let source = env.add_source(|s| s.download_cap_date = Some(Utc::now() - Duration::days(30)));
    env.extractor.set_items(&["old"]);
    env.extractor
        .set_document("old", video_document("old", Utc::now() - Duration::days(60)));
    index_source(&env.ctx, source.id).await.unwrap();
    let media = env
        .catalog
        .find_media_by_key(&source.id, "old")
        .unwrap()
        .unwrap();

    fetch_metadata(&env.ctx, media.id).await.unwrap();

    let media = env.media(&media.id).unwrap();
    assert!(media.skip);
    assert!(!media.can_download);
    assert!(env
        .tasks
        .find_download_task(&media.id.to_string())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_metadata_outside_retention_window_skips() {
    let env = TestEnv::new();
    let source = env.add_source(|s| {
        s.delete_old_media = true;
        s.days_to_keep = 7;
    });
    env.extractor.set_items(&["old"]);
    env.extractor
        .set_document("old", video_document("old", Utc::now() - Duration::days(10)));
    index_source(&env.ctx, source.id).await.unwrap();
    let media = env
        .catalog
        .find_media_by_key(&source.id, "old")
        .unwrap()
        .unwrap();

    fetch_metadata(&env.ctx, media.id).await.unwrap();
    assert!(env.media(&media.id).unwrap().skip);
    assert!(!pending_kinds(&env).contains(&TaskKind::DownloadMedia));
}

#[tokio::test]
async fn test_metadata_failure_is_retryable_error() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let media = mediasync::catalog::Media::new(source.id, "missing");
    env.catalog.save_media(&media).unwrap();

    let result = fetch_metadata(&env.ctx, media.id).await;
    assert!(matches!(result, Err(StageError::TransientExternal(_))));
    assert!(env.media(&media.id).unwrap().metadata.is_none());
}

#[tokio::test]
async fn test_download_of_downloaded_media_is_noop() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let mut media = env.add_ready_media(&source, "done");
    media.downloaded = true;
    env.catalog.save_media(&media).unwrap();

    let outcome = download_media(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::AlreadyDownloaded));
    assert_eq!(env.extractor.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(env.media(&media.id).unwrap(), media);
}

#[tokio::test]
async fn test_download_records_format_and_schedules_rescan() {
    let env = TestEnv::new();
    let source = env.add_source(|s| s.write_nfo = true);
    let server = MediaServer::new(MediaServerKind::Jellyfin, "jellyfin.local", 8096, "token");
    env.catalog.save_media_server(&server).unwrap();
    let media = env.add_ready_media(&source, "vid");

    let outcome = download_media(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);

    let media = env.media(&media.id).unwrap();
    assert!(media.downloaded);
    assert!(media.download_date.is_some());
    assert_eq!(media.downloaded_format.as_deref(), Some("1080p"));
    assert_eq!(media.downloaded_height, Some(1080));
    assert_eq!(media.downloaded_video_codec.as_deref(), Some("VP9"));
    assert_eq!(media.downloaded_audio_codec.as_deref(), Some("OPUS"));
    assert_eq!(media.downloaded_container.as_deref(), Some("mkv"));
    assert_eq!(media.downloaded_filesize, Some(11));

    let file = media.media_file.clone().unwrap();
    assert!(file.exists());
    assert!(env.ctx.layout.nfo_path(&source, &media).exists());

    let pending = env.tasks.list_pending(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, TaskKind::RescanMediaServer);
    assert_eq!(pending[0].params.first_arg(), Some(server.id.to_string().as_str()));
}

#[tokio::test]
async fn test_download_without_output_file_fails() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let media = env.add_ready_media(&source, "vid");
    env.extractor.write_output.store(false, Ordering::SeqCst);

    let result = download_media(&env.ctx, media.id).await;
    assert!(matches!(result, Err(StageError::MissingOutput { .. })));
    assert!(!env.media(&media.id).unwrap().downloaded);
}

#[tokio::test]
async fn test_media_deleted_during_download_is_not_restored() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let server = MediaServer::new(MediaServerKind::Plex, "plex.local", 32400, "token");
    env.catalog.save_media_server(&server).unwrap();
    let media = env.add_ready_media(&source, "vid");
    let catalog = env.catalog.clone();
    env.extractor.set_on_download(move |m| {
        catalog.delete_media(&m.id).unwrap();
    });

    let outcome = download_media(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::EntityGone));
    assert!(env.media(&media.id).is_none());
    assert!(!env.ctx.layout.media_file_path(&source, &media).exists());
    assert!(env.tasks.list_pending(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_source_deleted_during_download_discards_file() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let media = env.add_ready_media(&source, "vid");
    let catalog = env.catalog.clone();
    env.extractor.set_on_download(move |m| {
        catalog.delete_source(&m.source_id).unwrap();
    });

    let outcome = download_media(&env.ctx, media.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::EntityGone));
    assert!(env.catalog.get_source(&source.id).unwrap().is_none());
    assert!(!env.ctx.layout.media_file_path(&source, &media).exists());
}

#[tokio::test]
async fn test_thumbnail_of_media_deleted_during_fetch_is_discarded() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let media = env.add_ready_media(&source, "vid");
    let ctx = env.with_images(Arc::new(DeletingImageFetcher {
        catalog: env.catalog.clone(),
        media_id: media.id,
    }));

    let outcome = fetch_thumbnail(&ctx, media.id, THUMBNAIL_URL).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped(SkipReason::EntityGone));
    assert!(env.media(&media.id).is_none());
    assert!(!ctx.layout.cached_thumbnail_path(&media).exists());
}

#[tokio::test]
async fn test_failing_sweeps_do_not_fail_index() {
    let env = TestEnv::new();
    let source = env.add_source(|s| {
        s.delete_removed_media = true;
        s.delete_old_media = true;
        s.days_to_keep = 7;
    });
    env.extractor.set_items(&["a", "b"]);
    let ctx = env.with_failing_sweeps();

    let outcome = index_source(&ctx, source.id).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);

    let saved = env.catalog.get_source(&source.id).unwrap().unwrap();
    assert!(saved.last_crawl.is_some());
    assert!(!saved.has_failed);
    assert_eq!(pending_kinds(&env).len(), 2);
}

#[tokio::test]
async fn test_index_removes_media_gone_from_source() {
    let env = TestEnv::new();
    let source = env.add_source(|s| s.delete_removed_media = true);

    let mut gone = env.add_ready_media(&source, "gone");
    let file = env.ctx.layout.media_file_path(&source, &gone);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"old video").unwrap();
    gone.downloaded = true;
    gone.download_date = Some(Utc::now());
    gone.media_file = Some(file.clone());
    env.catalog.save_media(&gone).unwrap();

    env.extractor.set_items(&["kept"]);
    index_source(&env.ctx, source.id).await.unwrap();

    assert!(env.media(&gone.id).is_none());
    assert!(!file.exists());
    assert!(env
        .catalog
        .find_media_by_key(&source.id, "kept")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_index_expires_old_downloads() {
    let env = TestEnv::new();
    let source = env.add_source(|s| {
        s.delete_old_media = true;
        s.days_to_keep = 7;
    });

    let mut old = env.add_ready_media(&source, "old");
    old.downloaded = true;
    old.download_date = Some(Utc::now() - Duration::days(10));
    env.catalog.save_media(&old).unwrap();
    let mut recent = env.add_ready_media(&source, "recent");
    recent.downloaded = true;
    recent.download_date = Some(Utc::now() - Duration::days(3));
    env.catalog.save_media(&recent).unwrap();

    env.extractor.set_items(&["old", "recent"]);
    index_source(&env.ctx, source.id).await.unwrap();

    assert!(env.media(&old.id).is_none());
    assert!(env.media(&recent.id).is_some());
}

#[tokio::test]
async fn test_source_deletion_cancels_its_tasks() {
    let env = TestEnv::new();
    let source = env.add_source(|_| {});
    let other = env.add_source(|s| s.key = "UCother".to_string());
    on_source_saved(env.tasks.as_ref(), &source, Utc::now().timestamp()).unwrap();
    on_source_saved(env.tasks.as_ref(), &other, Utc::now().timestamp()).unwrap();
    assert_eq!(env.tasks.count_pending().unwrap(), 4);

    env.catalog.delete_source(&source.id).unwrap();
    assert_eq!(on_source_deleted(env.tasks.as_ref(), &source.id).unwrap(), 2);

    let pending = env.tasks.list_pending(10).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|t| t.lane == other.id.to_string()));
}

#[tokio::test]
async fn test_worker_syncs_new_source_end_to_end() {
    let env = TestEnv::new();
    let source = env.add_source(|s| {
        s.copy_thumbnails = true;
        s.write_nfo = true;
    });
    let server = MediaServer::new(MediaServerKind::Plex, "plex.local", 32400, "token");
    env.catalog.save_media_server(&server).unwrap();
    env.extractor.set_items(&["v1", "v2"]);
    for key in ["v1", "v2"] {
        env.extractor
            .set_document(key, video_document(key, Utc::now() - Duration::days(1)));
    }

    on_source_saved(env.tasks.as_ref(), &source, Utc::now().timestamp()).unwrap();
    let worker = env.worker();
    let ran = env.drain(&worker).await;

    // check + index, then metadata, thumbnail, download and the rescan it
    // requests per item. Rescans outrank downloads, so each runs in between.
    assert_eq!(ran, 2 + 2 * 4);
    assert_eq!(env.tasks.count_pending().unwrap(), 0);
    assert_eq!(env.servers.updates.load(Ordering::SeqCst), 2);
    assert!(env.ctx.layout.source_directory(&source).is_dir());

    let media = env
        .catalog
        .list_media(&MediaFilter::for_source(source.id))
        .unwrap();
    assert_eq!(media.len(), 2);
    for item in &media {
        assert!(item.downloaded, "{} not downloaded", item.key);
        assert!(item.media_file.as_ref().unwrap().exists());
        assert!(item.thumbnail.as_ref().unwrap().exists());
        assert!(env.ctx.layout.sidecar_thumbnail_path(&source, item).exists());
        assert!(env.ctx.layout.nfo_path(&source, item).exists());
    }

    let failures = env.tasks.list_completed(None, true, 10).unwrap();
    assert!(failures.is_empty(), "unexpected failures: {:?}", failures);
}
