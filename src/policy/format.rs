//! Choice of the formats to download from a media item's format catalog.
//!
//! Candidates are ranked, in decreasing weight, by resolution, video codec,
//! frame rate preference, HDR preference and finally catalog position (the
//! extractor lists formats from worst to best, so later entries win ties).

use crate::catalog::{
    AudioCodec, Fallback, FormatDescriptor, Resolution, Source, VideoCodec,
};
use std::cmp::Reverse;

/// Height from which a format counts as HD.
const HD_HEIGHT: u32 = 720;
/// Rounded frame rate from which a format counts as high frame rate.
const HIGH_FPS: u32 = 50;

/// Per-source format preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatPreferences {
    pub resolution: Resolution,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub prefer_60fps: bool,
    pub prefer_hdr: bool,
    pub fallback: Fallback,
}

impl FormatPreferences {
    pub fn from_source(source: &Source) -> Self {
        Self {
            resolution: source.resolution,
            video_codec: source.video_codec,
            audio_codec: source.audio_codec,
            prefer_60fps: source.prefer_60fps,
            prefer_hdr: source.prefer_hdr,
            fallback: source.fallback,
        }
    }

    fn fps_matches(&self, format: &FormatDescriptor) -> bool {
        let high_fps = format.fps_rounded().is_some_and(|fps| fps >= HIGH_FPS);
        high_fps == self.prefer_60fps
    }

    fn hdr_matches(&self, format: &FormatDescriptor) -> bool {
        format.is_hdr == self.prefer_hdr
    }

    fn codec_matches(&self, format: &FormatDescriptor) -> bool {
        format.video_codec() == Some(self.video_codec)
    }

    /// Ordering among formats of equal height and codec.
    fn tie_break(&self, index: usize, format: &FormatDescriptor) -> (bool, bool, usize) {
        (self.fps_matches(format), self.hdr_matches(format), index)
    }

    /// Ordering among formats of equal height.
    fn rank(&self, index: usize, format: &FormatDescriptor) -> (bool, (bool, bool, usize)) {
        (self.codec_matches(format), self.tie_break(index, format))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTarget {
    pub format_id: String,
    pub codec: Option<VideoCodec>,
    pub height: u32,
    pub width: Option<u32>,
    pub fps: Option<u32>,
    pub hdr: bool,
}

impl VideoTarget {
    fn from_format(format: &FormatDescriptor) -> Self {
        Self {
            format_id: format.format_id.clone(),
            codec: format.video_codec(),
            height: format.height.unwrap_or_default(),
            width: format.width,
            fps: format.fps_rounded(),
            hdr: format.is_hdr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTarget {
    pub format_id: String,
    pub codec: Option<AudioCodec>,
}

impl AudioTarget {
    fn from_format(format: &FormatDescriptor) -> Self {
        Self {
            format_id: format.format_id.clone(),
            codec: format.audio_codec(),
        }
    }
}

/// Formats chosen for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelection {
    AudioOnly(AudioTarget),
    /// Separate video and audio streams, muxed by the downloader.
    Split {
        video: VideoTarget,
        audio: AudioTarget,
    },
    /// A single format carrying both streams.
    Combined {
        video: VideoTarget,
        audio_codec: Option<AudioCodec>,
    },
}

impl FormatSelection {
    /// Format code understood by the extractor, e.g. `137+140`.
    pub fn format_code(&self) -> String {
        match self {
            FormatSelection::AudioOnly(audio) => audio.format_id.clone(),
            FormatSelection::Split { video, audio } => {
                format!("{}+{}", video.format_id, audio.format_id)
            }
            FormatSelection::Combined { video, .. } => video.format_id.clone(),
        }
    }

    pub fn video(&self) -> Option<&VideoTarget> {
        match self {
            FormatSelection::AudioOnly(_) => None,
            FormatSelection::Split { video, .. } | FormatSelection::Combined { video, .. } => {
                Some(video)
            }
        }
    }
}

/// Picks the formats to download, or `None` when the catalog has nothing the
/// preferences (including their fallback) accept.
pub fn select_format(
    formats: &[FormatDescriptor],
    prefs: &FormatPreferences,
) -> Option<FormatSelection> {
    let audio = select_audio(formats, prefs);

    let Some(target_height) = prefs.resolution.height() else {
        return audio.map(|f| FormatSelection::AudioOnly(AudioTarget::from_format(f)));
    };

    let video_only: Vec<(usize, &FormatDescriptor)> = formats
        .iter()
        .enumerate()
        .filter(|(_, f)| f.has_video() && !f.has_audio() && f.height.is_some())
        .collect();
    if let (Some(audio), Some(video)) = (audio, select_video(&video_only, target_height, prefs)) {
        return Some(FormatSelection::Split {
            video: VideoTarget::from_format(video),
            audio: AudioTarget::from_format(audio),
        });
    }

    let combined: Vec<(usize, &FormatDescriptor)> = formats
        .iter()
        .enumerate()
        .filter(|(_, f)| f.has_video() && f.has_audio() && f.height.is_some())
        .collect();
    select_video(&combined, target_height, prefs).map(|f| FormatSelection::Combined {
        video: VideoTarget::from_format(f),
        audio_codec: f.audio_codec(),
    })
}

fn select_audio<'a>(
    formats: &'a [FormatDescriptor],
    prefs: &FormatPreferences,
) -> Option<&'a FormatDescriptor> {
    let audio_only = || formats.iter().filter(|f| f.has_audio() && !f.has_video());

    let preferred = audio_only()
        .filter(|f| f.audio_codec() == Some(prefs.audio_codec))
        .last();
    match (preferred, prefs.fallback) {
        (Some(format), _) => Some(format),
        (None, Fallback::Fail) => None,
        (None, _) => audio_only().last(),
    }
}

fn height(format: &FormatDescriptor) -> u32 {
    format.height.unwrap_or_default()
}

fn select_video<'a>(
    candidates: &[(usize, &'a FormatDescriptor)],
    target_height: u32,
    prefs: &FormatPreferences,
) -> Option<&'a FormatDescriptor> {
    let exact = candidates
        .iter()
        .filter(|(_, f)| height(f) == target_height && prefs.codec_matches(f))
        .max_by_key(|(index, f)| prefs.tie_break(*index, f));
    if let Some((_, format)) = exact {
        return Some(*format);
    }

    let chosen = match prefs.fallback {
        Fallback::Fail => None,
        Fallback::NextBest => candidates
            .iter()
            .filter(|(_, f)| height(f) <= target_height)
            .max_by_key(|(index, f)| (height(f), prefs.rank(*index, f))),
        Fallback::NextBestHd => {
            let hd = || candidates.iter().filter(|(_, f)| height(f) >= HD_HEIGHT);
            hd().filter(|(_, f)| height(f) <= target_height)
                .max_by_key(|(index, f)| (height(f), prefs.rank(*index, f)))
                .or_else(|| {
                    hd().filter(|(_, f)| height(f) > target_height)
                        .max_by_key(|(index, f)| (Reverse(height(f)), prefs.rank(*index, f)))
                })
        }
    };
    chosen.map(|(_, format)| *format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, codec: &str, height: u32, fps: f64) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            vcodec: Some(codec.to_string()),
            acodec: Some("none".to_string()),
            width: Some(height * 16 / 9),
            height: Some(height),
            fps: Some(fps),
            ..Default::default()
        }
    }

    fn hdr(mut format: FormatDescriptor) -> FormatDescriptor {
        format.is_hdr = true;
        format
    }

    fn audio(id: &str, codec: &str) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some(codec.to_string()),
            ..Default::default()
        }
    }

    fn combined(id: &str, height: u32) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            vcodec: Some("avc1.64001F".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            height: Some(height),
            fps: Some(30.0),
            ..Default::default()
        }
    }

    fn prefs(resolution: Resolution, fallback: Fallback) -> FormatPreferences {
        FormatPreferences {
            resolution,
            video_codec: VideoCodec::Vp9,
            audio_codec: AudioCodec::Opus,
            prefer_60fps: false,
            prefer_hdr: false,
            fallback,
        }
    }

    fn catalog() -> Vec<FormatDescriptor> {
        vec![
            audio("140", "mp4a.40.2"),
            audio("251", "opus"),
            combined("22", 720),
            video("136", "avc1.4d401f", 720, 30.0),
            video("247", "vp9", 720, 30.0),
            video("137", "avc1.640028", 1080, 30.0),
            video("248", "vp9", 1080, 30.0),
            video("303", "vp9", 1080, 60.0),
        ]
    }

    #[test]
    fn test_exact_match_is_split() {
        let selection =
            select_format(&catalog(), &prefs(Resolution::P1080, Fallback::Fail)).unwrap();
        assert_eq!(selection.format_code(), "248+251");

        let video = selection.video().unwrap();
        assert_eq!(video.codec, Some(VideoCodec::Vp9));
        assert_eq!(video.height, 1080);
        assert_eq!(video.fps, Some(30));
        assert!(!video.hdr);
    }

    #[test]
    fn test_fps_preference_breaks_ties() {
        let mut p = prefs(Resolution::P1080, Fallback::Fail);
        p.prefer_60fps = true;
        assert_eq!(select_format(&catalog(), &p).unwrap().format_code(), "303+251");
    }

    #[test]
    fn test_fps_outranks_hdr() {
        let formats = vec![
            audio("251", "opus"),
            hdr(video("a", "vp9", 1080, 30.0)),
            video("b", "vp9", 1080, 60.0),
        ];
        let mut p = prefs(Resolution::P1080, Fallback::Fail);
        p.prefer_60fps = true;
        p.prefer_hdr = true;
        // fps match beats hdr match
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "b+251");

        p.prefer_60fps = false;
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "a+251");
    }

    #[test]
    fn test_later_catalog_entry_wins_full_tie() {
        let formats = vec![
            audio("251", "opus"),
            video("first", "vp9", 1080, 30.0),
            video("second", "vp9", 1080, 30.0),
        ];
        let p = prefs(Resolution::P1080, Fallback::Fail);
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "second+251");
    }

    #[test]
    fn test_fail_fallback_rejects_missing_resolution() {
        assert!(select_format(&catalog(), &prefs(Resolution::P1440, Fallback::Fail)).is_none());
    }

    #[test]
    fn test_next_best_prefers_resolution_over_codec() {
        let formats = vec![
            audio("251", "opus"),
            video("247", "vp9", 720, 30.0),
            video("137", "avc1.640028", 1080, 30.0),
        ];
        let p = prefs(Resolution::P1080, Fallback::NextBest);
        // no vp9 at 1080: stay at 1080 with another codec
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "137+251");

        let p = prefs(Resolution::P1440, Fallback::NextBest);
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "137+251");
    }

    #[test]
    fn test_next_best_never_goes_above_target() {
        let formats = vec![audio("251", "opus"), video("248", "vp9", 1080, 30.0)];
        assert!(select_format(&formats, &prefs(Resolution::P720, Fallback::NextBest)).is_none());
    }

    #[test]
    fn test_next_best_hd() {
        let formats = vec![
            audio("251", "opus"),
            video("243", "vp9", 360, 30.0),
            video("248", "vp9", 1080, 30.0),
            video("271", "vp9", 1440, 30.0),
        ];
        // highest HD format under the target
        let p = prefs(Resolution::P2160, Fallback::NextBestHd);
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "271+251");

        // target under HD: nearest HD format above it
        let p = prefs(Resolution::P480, Fallback::NextBestHd);
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "248+251");

        let sd_only = vec![audio("251", "opus"), video("243", "vp9", 360, 30.0)];
        assert!(select_format(&sd_only, &p).is_none());
    }

    #[test]
    fn test_audio_only_source() {
        let p = prefs(Resolution::Audio, Fallback::Fail);
        assert_eq!(
            select_format(&catalog(), &p),
            Some(FormatSelection::AudioOnly(AudioTarget {
                format_id: "251".to_string(),
                codec: Some(AudioCodec::Opus),
            }))
        );

        let mut p = prefs(Resolution::Audio, Fallback::Fail);
        p.audio_codec = AudioCodec::M4a;
        assert_eq!(select_format(&catalog(), &p).unwrap().format_code(), "140");
    }

    #[test]
    fn test_audio_codec_fallback() {
        let formats = vec![audio("140", "mp4a.40.2"), video("248", "vp9", 1080, 30.0)];
        let p = prefs(Resolution::P1080, Fallback::NextBest);
        assert_eq!(select_format(&formats, &p).unwrap().format_code(), "248+140");

        let p = prefs(Resolution::P1080, Fallback::Fail);
        assert!(select_format(&formats, &p).is_none());
    }

    #[test]
    fn test_combined_used_without_split_streams() {
        let formats = vec![combined("18", 360), combined("22", 720)];
        let mut p = prefs(Resolution::P720, Fallback::NextBest);
        p.video_codec = VideoCodec::Avc1;

        let selection = select_format(&formats, &p).unwrap();
        assert_eq!(selection.format_code(), "22");
        assert!(matches!(
            selection,
            FormatSelection::Combined { audio_codec: Some(AudioCodec::M4a), .. }
        ));
    }

    #[test]
    fn test_empty_catalog() {
        assert!(select_format(&[], &prefs(Resolution::P1080, Fallback::NextBest)).is_none());
        assert!(select_format(&[], &prefs(Resolution::Audio, Fallback::NextBest)).is_none());
    }
}
