//! On-disk locations of media files and their sidecars.
//!
//! Every path is derived from the source directory and the media identity, so
//! the stage that checks for a file and the stage that writes it always agree.

use super::models::{Media, Source};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MediaLayout {
    download_root: PathBuf,
    thumbnail_cache: PathBuf,
}

impl MediaLayout {
    pub fn new(download_root: impl Into<PathBuf>, thumbnail_cache: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            thumbnail_cache: thumbnail_cache.into(),
        }
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    pub fn thumbnail_cache(&self) -> &Path {
        &self.thumbnail_cache
    }

    pub fn source_directory(&self, source: &Source) -> PathBuf {
        self.download_root.join(&source.directory)
    }

    /// File name without extension, e.g. `2024-01-31_dQw4w9WgXcQ`.
    pub fn media_stem(&self, media: &Media) -> String {
        let key = sanitize_key(&media.key);
        match media.published {
            Some(published) => format!("{}_{}", published.format("%Y-%m-%d"), key),
            None => key,
        }
    }

    pub fn media_file_path(&self, source: &Source, media: &Media) -> PathBuf {
        self.source_directory(source)
            .join(format!("{}.{}", self.media_stem(media), source.extension()))
    }

    /// Thumbnail copied next to the media file.
    pub fn sidecar_thumbnail_path(&self, source: &Source, media: &Media) -> PathBuf {
        self.source_directory(source)
            .join(format!("{}.jpg", self.media_stem(media)))
    }

    pub fn nfo_path(&self, source: &Source, media: &Media) -> PathBuf {
        self.source_directory(source)
            .join(format!("{}.nfo", self.media_stem(media)))
    }

    pub fn cached_thumbnail_path(&self, media: &Media) -> PathBuf {
        self.thumbnail_cache.join(format!("{}.jpg", media.id))
    }

    /// Every file a media item may own on disk.
    pub fn owned_files(&self, source: &Source, media: &Media) -> Vec<PathBuf> {
        let mut files = vec![
            self.media_file_path(source, media),
            self.sidecar_thumbnail_path(source, media),
            self.nfo_path(source, media),
            self.cached_thumbnail_path(media),
        ];
        for recorded in [&media.media_file, &media.thumbnail].into_iter().flatten() {
            if !files.contains(recorded) {
                files.push(recorded.clone());
            }
        }
        files
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
