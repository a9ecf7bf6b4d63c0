use super::models::{Media, MediaServer, Source};
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for media queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub source_id: Option<Uuid>,
    pub downloaded: Option<bool>,
    /// Only media whose `download_date` is strictly before this instant.
    pub downloaded_before: Option<DateTime<Utc>>,
    pub skip: Option<bool>,
    pub manual_skip: Option<bool>,
}

impl MediaFilter {
    pub fn for_source(source_id: Uuid) -> Self {
        Self {
            source_id: Some(source_id),
            ..Default::default()
        }
    }

    pub fn downloaded_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.downloaded = Some(true);
        self.downloaded_before = Some(cutoff);
        self
    }

    pub fn matches(&self, media: &Media) -> bool {
        if self.source_id.is_some_and(|id| id != media.source_id) {
            return false;
        }
        if self.downloaded.is_some_and(|d| d != media.downloaded) {
            return false;
        }
        if let Some(cutoff) = self.downloaded_before {
            match media.download_date {
                Some(date) if date < cutoff => {}
                _ => return false,
            }
        }
        if self.skip.is_some_and(|s| s != media.skip) {
            return false;
        }
        if self.manual_skip.is_some_and(|s| s != media.manual_skip) {
            return false;
        }
        true
    }
}

/// Result of persisting one enumeration of a source.
#[derive(Debug, Clone, Default)]
pub struct IndexBatch {
    /// Media rows created by this batch.
    pub created: Vec<Media>,
    /// Keys that were already known, with their unchanged rows.
    pub existing: Vec<Media>,
    /// Keys that could not be stored because another item in the same batch
    /// already claimed them.
    pub collisions: Vec<String>,
}

/// Catalog persistence used by the task pipeline.
pub trait CatalogStore: Send + Sync {
    fn get_source(&self, id: &Uuid) -> Result<Option<Source>>;
    fn list_sources(&self) -> Result<Vec<Source>>;
    fn save_source(&self, source: &Source) -> Result<()>;
    /// Deletes a source together with its media and their files.
    fn delete_source(&self, id: &Uuid) -> Result<Option<Source>>;

    fn get_media(&self, id: &Uuid) -> Result<Option<Media>>;
    fn find_media_by_key(&self, source_id: &Uuid, key: &str) -> Result<Option<Media>>;
    fn list_media(&self, filter: &MediaFilter) -> Result<Vec<Media>>;
    fn save_media(&self, media: &Media) -> Result<()>;
    /// Deletes a media row and every file it owns on disk.
    fn delete_media(&self, id: &Uuid) -> Result<Option<Media>>;

    /// Creates media rows for the keys of `source_id` not seen before.
    ///
    /// Existing rows are left untouched. Either the whole batch is stored or,
    /// on error, none of it is.
    fn index_media_keys(&self, source_id: &Uuid, keys: &[String]) -> Result<IndexBatch>;

    fn list_media_servers(&self) -> Result<Vec<MediaServer>>;
    fn get_media_server(&self, id: &Uuid) -> Result<Option<MediaServer>>;
    fn save_media_server(&self, server: &MediaServer) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_filter_downloaded_before() {
        let now = Utc::now();
        let source_id = Uuid::new_v4();
        let mut media = Media::new(source_id, "a");
        let filter = MediaFilter::for_source(source_id).downloaded_before(now - Duration::days(7));

        assert!(!filter.matches(&media));

        media.downloaded = true;
        media.download_date = Some(now - Duration::days(3));
        assert!(!filter.matches(&media));

        media.download_date = Some(now - Duration::days(10));
        assert!(filter.matches(&media));

        media.source_id = Uuid::new_v4();
        assert!(!filter.matches(&media));
    }

    #[test]
    fn test_filter_skip_flags() {
        let mut media = Media::new(Uuid::new_v4(), "a");
        let filter = MediaFilter {
            manual_skip: Some(true),
            ..Default::default()
        };
        assert!(!filter.matches(&media));
        media.manual_skip = true;
        assert!(filter.matches(&media));
    }
}
