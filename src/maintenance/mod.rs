//! Sweeps that prune the completed task log and media past its useful life.
//!
//! Deleting a media row through the catalog also removes its files. The
//! sweeps return what they deleted so callers can drop the pending work of
//! those items.

use crate::catalog::{CatalogStore, Media, MediaFilter, Source};
use crate::policy::{is_expired, is_still_present};
use crate::task_queue::TaskStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::info;

/// Deletes completed task records older than `retention_days`.
pub fn purge_old_completed_tasks(
    tasks: &dyn TaskStore,
    retention_days: u64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::days(retention_days.min(i64::MAX as u64 / 86_400) as i64);
    let deleted = tasks.purge_completed_older_than(cutoff.timestamp())?;
    if deleted > 0 {
        info!(
            "Deleted {} completed tasks older than {} days (before {})",
            deleted, retention_days, cutoff
        );
    }
    Ok(deleted)
}

/// Deletes downloaded media older than the retention window of every source
/// that expires media.
pub fn purge_expired_media(catalog: &dyn CatalogStore, now: DateTime<Utc>) -> Result<Vec<Media>> {
    let mut deleted = Vec::new();
    for source in catalog
        .list_sources()?
        .into_iter()
        .filter(|s| s.delete_old_media && s.days_to_keep > 0)
    {
        let cutoff = now - Duration::days(i64::from(source.days_to_keep));
        let candidates =
            catalog.list_media(&MediaFilter::for_source(source.id).downloaded_before(cutoff))?;
        for media in candidates.iter().filter(|m| is_expired(m, &source, now)) {
            info!(
                "Deleting expired media: {} / {} (older than {} days, downloaded before {})",
                source.name,
                media.title(),
                source.days_to_keep,
                cutoff
            );
            if let Some(removed) = catalog.delete_media(&media.id)? {
                deleted.push(removed);
            }
        }
    }
    Ok(deleted)
}

/// Deletes downloaded media of `source` that the latest enumeration no
/// longer lists.
pub fn purge_removed_media(
    catalog: &dyn CatalogStore,
    source: &Source,
    remote_keys: &HashSet<String>,
) -> Result<Vec<Media>> {
    let filter = MediaFilter {
        source_id: Some(source.id),
        downloaded: Some(true),
        ..Default::default()
    };
    let mut deleted = Vec::new();
    for media in catalog.list_media(&filter)? {
        if is_still_present(&media, remote_keys) {
            continue;
        }
        info!("{} is no longer in source {}, removing", media.title(), source.name);
        if let Some(removed) = catalog.delete_media(&media.id)? {
            deleted.push(removed);
        }
    }
    Ok(deleted)
}
