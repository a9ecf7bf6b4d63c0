//! Catalog entities: sources, the media items discovered in them and the media
//! servers to notify after downloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Channel,
    Playlist,
}

/// Target resolution of a source. `Audio` downloads audio streams only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "audio")]
    Audio,
}

impl Resolution {
    /// Target height in pixels, `None` for audio-only sources.
    pub fn height(&self) -> Option<u32> {
        match self {
            Resolution::P360 => Some(360),
            Resolution::P480 => Some(480),
            Resolution::P720 => Some(720),
            Resolution::P1080 => Some(1080),
            Resolution::P1440 => Some(1440),
            Resolution::P2160 => Some(2160),
            Resolution::Audio => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoCodec {
    Avc1,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// Parses extractor codec strings such as `avc1.640028`, `vp09.00.40.08`
    /// or `av01.0.08M.08`.
    pub fn from_codec_str(codec: &str) -> Option<Self> {
        let codec = codec.to_ascii_lowercase();
        if codec.starts_with("avc1") || codec.starts_with("h264") {
            Some(VideoCodec::Avc1)
        } else if codec.starts_with("vp9") || codec.starts_with("vp09") {
            Some(VideoCodec::Vp9)
        } else if codec.starts_with("av01") || codec.starts_with("av1") {
            Some(VideoCodec::Av1)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::Avc1 => "AVC1",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioCodec {
    /// AAC in an mp4 container (`mp4a.40.2`).
    M4a,
    Opus,
}

impl AudioCodec {
    pub fn from_codec_str(codec: &str) -> Option<Self> {
        let codec = codec.to_ascii_lowercase();
        if codec.starts_with("mp4a") || codec == "aac" || codec == "m4a" {
            Some(AudioCodec::M4a)
        } else if codec.starts_with("opus") {
            Some(AudioCodec::Opus)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::M4a => "M4A",
            AudioCodec::Opus => "OPUS",
        }
    }
}

/// What to do when the preferred format is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Do not download at all.
    Fail,
    /// Take the best format at or below the target resolution.
    NextBest,
    /// Take the best HD format, nearest to the target resolution.
    NextBestHd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub kind: SourceKind,
    /// Upstream identity key (channel or playlist id).
    pub key: String,
    pub name: String,
    /// Output directory, relative to the download root.
    pub directory: String,
    /// How often the source is re-indexed. Zero means on demand only.
    pub index_schedule_secs: u64,

    pub delete_old_media: bool,
    pub days_to_keep: u32,

    pub download_media: bool,
    pub download_cap_date: Option<DateTime<Utc>>,
    pub resolution: Resolution,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub prefer_60fps: bool,
    pub prefer_hdr: bool,
    pub fallback: Fallback,

    pub download_thumbnails: bool,
    pub copy_thumbnails: bool,
    pub write_nfo: bool,
    pub delete_removed_media: bool,

    pub last_crawl: Option<DateTime<Utc>>,
    /// Start of the latest index run, successful or not.
    #[serde(default)]
    pub last_index_attempt: Option<DateTime<Utc>>,
    pub has_failed: bool,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new(
        kind: SourceKind,
        key: impl Into<String>,
        name: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            key: key.into(),
            name: name.into(),
            directory: directory.into(),
            index_schedule_secs: 24 * 60 * 60,
            delete_old_media: false,
            days_to_keep: 14,
            download_media: true,
            download_cap_date: None,
            resolution: Resolution::P1080,
            video_codec: VideoCodec::Vp9,
            audio_codec: AudioCodec::Opus,
            prefer_60fps: true,
            prefer_hdr: false,
            fallback: Fallback::NextBest,
            download_thumbnails: true,
            copy_thumbnails: false,
            write_nfo: false,
            delete_removed_media: false,
            last_crawl: None,
            last_index_attempt: None,
            has_failed: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_audio(&self) -> bool {
        self.resolution == Resolution::Audio
    }

    /// File extension of the media files this source produces.
    pub fn extension(&self) -> &'static str {
        if self.is_audio() {
            match self.audio_codec {
                AudioCodec::M4a => "m4a",
                AudioCodec::Opus => "ogg",
            }
        } else {
            "mkv"
        }
    }

    /// Upstream URL used to enumerate this source.
    pub fn index_url(&self) -> String {
        match self.kind {
            SourceKind::Channel => format!("https://www.youtube.com/channel/{}", self.key),
            SourceKind::Playlist => format!("https://www.youtube.com/playlist?list={}", self.key),
        }
    }

    /// Whether the source is due for its periodic index at `now`.
    ///
    /// Counted from the latest attempt, so a source whose index keeps failing
    /// waits a full schedule before it is tried again.
    pub fn is_index_due(&self, now: DateTime<Utc>) -> bool {
        if self.index_schedule_secs == 0 {
            return false;
        }
        let schedule = i64::try_from(self.index_schedule_secs).unwrap_or(i64::MAX);
        match self.last_crawl.max(self.last_index_attempt) {
            None => true,
            Some(last) => (now - last).num_seconds() >= schedule,
        }
    }
}

/// Position of a media item in the download pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaState {
    Discovered,
    MetadataFetched,
    ThumbnailFetched,
    Downloaded,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Per-source upstream key.
    pub key: String,
    pub created_at: DateTime<Utc>,

    pub skip: bool,
    pub manual_skip: bool,
    pub can_download: bool,
    pub downloaded: bool,

    /// Raw metadata document as returned by the extractor.
    pub metadata: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Cached, resized thumbnail.
    pub thumbnail: Option<PathBuf>,

    pub media_file: Option<PathBuf>,
    pub download_date: Option<DateTime<Utc>>,
    pub downloaded_format: Option<String>,
    pub downloaded_container: Option<String>,
    pub downloaded_width: Option<u32>,
    pub downloaded_height: Option<u32>,
    pub downloaded_video_codec: Option<String>,
    pub downloaded_audio_codec: Option<String>,
    pub downloaded_fps: Option<u32>,
    pub downloaded_hdr: bool,
    pub downloaded_filesize: Option<u64>,
}

impl Media {
    pub fn new(source_id: Uuid, key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            key: key.into(),
            created_at: Utc::now(),
            skip: false,
            manual_skip: false,
            can_download: false,
            downloaded: false,
            metadata: None,
            published: None,
            thumbnail: None,
            media_file: None,
            download_date: None,
            downloaded_format: None,
            downloaded_container: None,
            downloaded_width: None,
            downloaded_height: None,
            downloaded_video_codec: None,
            downloaded_audio_codec: None,
            downloaded_fps: None,
            downloaded_hdr: false,
            downloaded_filesize: None,
        }
    }

    /// Parsed metadata document, `None` when missing or unreadable.
    pub fn metadata_document(&self) -> Option<MediaMetadata> {
        self.metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn title(&self) -> String {
        self.metadata_document()
            .and_then(|m| m.title)
            .unwrap_or_else(|| self.key.clone())
    }

    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.key)
    }

    pub fn state(&self) -> MediaState {
        if self.skip || self.manual_skip {
            MediaState::Skipped
        } else if self.downloaded {
            MediaState::Downloaded
        } else if self.thumbnail.is_some() {
            MediaState::ThumbnailFetched
        } else if self.metadata.is_some() {
            MediaState::MetadataFetched
        } else {
            MediaState::Discovered
        }
    }
}

/// Metadata document produced by the extractor for a single media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Upload date formatted as `YYYYMMDD`.
    pub upload_date: Option<String>,
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

impl MediaMetadata {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        let raw = self.upload_date.as_deref()?.trim();
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }

    pub fn format_by_id(&self, format_id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}

/// One entry of a media item's format catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub format_note: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub is_hdr: bool,
}

fn present_codec(codec: &Option<String>) -> Option<&str> {
    codec
        .as_deref()
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

impl FormatDescriptor {
    /// Raw video codec string, `None` when the format has no video stream.
    pub fn video_codec_str(&self) -> Option<&str> {
        present_codec(&self.vcodec)
    }

    /// Raw audio codec string, `None` when the format has no audio stream.
    pub fn audio_codec_str(&self) -> Option<&str> {
        present_codec(&self.acodec)
    }

    pub fn video_codec(&self) -> Option<VideoCodec> {
        self.video_codec_str().and_then(VideoCodec::from_codec_str)
    }

    pub fn audio_codec(&self) -> Option<AudioCodec> {
        self.audio_codec_str().and_then(AudioCodec::from_codec_str)
    }

    pub fn has_video(&self) -> bool {
        self.video_codec_str().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec_str().is_some()
    }

    pub fn fps_rounded(&self) -> Option<u32> {
        self.fps.map(|fps| fps.round() as u32)
    }

    /// Short display label such as `1080p60`.
    pub fn label(&self) -> String {
        if let Some(note) = self.format_note.as_deref().filter(|n| !n.is_empty()) {
            return note.to_string();
        }
        match (self.height, self.fps_rounded()) {
            (Some(height), Some(fps)) if fps > 30 => format!("{}p{}", height, fps),
            (Some(height), _) => format!("{}p", height),
            _ => self.format_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaServerKind {
    Plex,
    Jellyfin,
}

/// A media server to notify once new media has been downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaServer {
    pub id: Uuid,
    pub kind: MediaServerKind,
    pub host: String,
    pub port: u16,
    pub use_https: bool,
    pub verify_https: bool,
    pub token: String,
    /// Library (section) ids to refresh. Empty refreshes everything.
    #[serde(default)]
    pub libraries: Vec<String>,
}

impl MediaServer {
    pub fn new(
        kind: MediaServerKind,
        host: impl Into<String>,
        port: u16,
        token: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            host: host.into(),
            port,
            use_https: false,
            verify_https: true,
            token: token.into(),
            libraries: Vec::new(),
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
