//! Interpretation of the format code reported by the extractor after a
//! download.

use crate::catalog::{AudioCodec, FormatDescriptor, Media, MediaMetadata, VideoCodec};

/// Stream details of a finished download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadedFormat {
    /// Display label such as `1080p`, or `audio` for audio-only downloads.
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub fps: Option<u32>,
    pub hdr: bool,
}

impl DownloadedFormat {
    fn with_video(mut self, video: &FormatDescriptor) -> Self {
        self.format = Some(video.label());
        self.width = video.width;
        self.height = video.height;
        self.video_codec = video_codec_name(video);
        self.fps = video.fps_rounded();
        self.hdr = video.is_hdr;
        self
    }

    pub fn apply_to(self, media: &mut Media) {
        media.downloaded_format = self.format;
        media.downloaded_width = self.width;
        media.downloaded_height = self.height;
        media.downloaded_video_codec = self.video_codec;
        media.downloaded_audio_codec = self.audio_codec;
        media.downloaded_fps = self.fps;
        media.downloaded_hdr = self.hdr;
    }
}

fn video_codec_name(format: &FormatDescriptor) -> Option<String> {
    let raw = format.video_codec_str()?;
    Some(
        VideoCodec::from_codec_str(raw)
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| raw.to_uppercase()),
    )
}

fn audio_codec_name(format: &FormatDescriptor) -> Option<String> {
    let raw = format.audio_codec_str()?;
    Some(
        AudioCodec::from_codec_str(raw)
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| raw.to_uppercase()),
    )
}

/// Describes a download from its format code.
///
/// `V+A` takes the video fields from `V` and the audio codec from `A`. A
/// single code fills everything from that format, or records an `audio`
/// download when the format carries no video. Codes missing from the
/// metadata leave the corresponding fields empty.
pub fn describe_download(format_code: &str, metadata: &MediaMetadata) -> DownloadedFormat {
    let described = DownloadedFormat::default();
    match format_code.trim().split_once('+') {
        Some((video_code, audio_code)) => {
            let mut described = match metadata.format_by_id(video_code.trim()) {
                Some(video) => described.with_video(video),
                None => described,
            };
            described.audio_codec = metadata
                .format_by_id(audio_code.trim())
                .and_then(audio_codec_name);
            described
        }
        None => {
            let Some(format) = metadata.format_by_id(format_code.trim()) else {
                return described;
            };
            let mut described = if format.has_video() {
                described.with_video(format)
            } else {
                DownloadedFormat {
                    format: Some("audio".to_string()),
                    ..described
                }
            };
            described.audio_codec = audio_codec_name(format);
            described
        }
    }
}
