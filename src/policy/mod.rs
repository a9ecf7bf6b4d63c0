//! Pure decisions about what happens to a media item under its source's
//! policies.
//!
//! Nothing in here touches storage or the clock; callers pass `now` in.

mod format;

pub use format::{
    select_format, AudioTarget, FormatPreferences, FormatSelection, VideoTarget,
};

use crate::catalog::{Media, Source};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// True when the source has a download cap date and the media was published
/// on or before it.
pub fn should_skip_for_cap(media: &Media, source: &Source) -> bool {
    match (source.download_cap_date, media.published) {
        (Some(cap), Some(published)) => published <= cap,
        _ => false,
    }
}

fn retention_cutoff(source: &Source, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if source.delete_old_media && source.days_to_keep > 0 {
        Some(now - Duration::days(i64::from(source.days_to_keep)))
    } else {
        None
    }
}

/// True when the source expires media by age and this item is either
/// undated or already older than the retention window.
pub fn should_skip_for_retention(media: &Media, source: &Source, now: DateTime<Utc>) -> bool {
    let Some(cutoff) = retention_cutoff(source, now) else {
        return false;
    };
    match media.published {
        None => true,
        Some(published) => published < cutoff,
    }
}

/// True when a downloaded item has outlived its source's retention window.
pub fn is_expired(media: &Media, source: &Source, now: DateTime<Utc>) -> bool {
    let Some(cutoff) = retention_cutoff(source, now) else {
        return false;
    };
    media.downloaded && media.download_date.is_some_and(|date| date < cutoff)
}

/// True when the item's key is among the keys of the latest enumeration.
pub fn is_still_present(media: &Media, remote_keys: &HashSet<String>) -> bool {
    remote_keys.contains(&media.key)
}

/// Picks the formats to download for `media` under `source`'s preferences.
/// `None` when the metadata is missing or no format qualifies.
pub fn select_target_format(media: &Media, source: &Source) -> Option<FormatSelection> {
    let metadata = media.metadata_document()?;
    select_format(&metadata.formats, &FormatPreferences::from_source(source))
}
