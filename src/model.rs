use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What the user wants out of a download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadMode {
    /// Chosen video stream merged with the best audio stream
    #[default]
    VideoAudio,
    /// Chosen video stream alone
    VideoOnly,
    /// Chosen audio stream, extracted to MP3
    AudioOnly,
}

impl DownloadMode {
    pub const ALL: [DownloadMode; 3] = [Self::VideoAudio, Self::VideoOnly, Self::AudioOnly];

    /// Whether this mode produces a file with a video track
    pub fn has_video(self) -> bool {
        !matches!(self, Self::AudioOnly)
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoAudio => write!(f, "Video + Audio"),
            Self::VideoOnly => write!(f, "Video Only"),
            Self::AudioOnly => write!(f, "Audio Only (MP3)"),
        }
    }
}

/// One entry of yt-dlp's `formats` array. Only the fields we read are kept.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormatVariant {
    /// Opaque identifier passed back to yt-dlp with `-f`
    pub format_id: String,
    /// Container extension (mp4, webm, m4a, ...)
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s
    pub tbr: Option<f64>,
    /// Audio bitrate in kbit/s
    pub abr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| !c.is_empty() && c != "none")
}

impl FormatVariant {
    pub fn has_video(&self) -> bool {
        codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.acodec)
    }

    /// Declared size, falling back to yt-dlp's estimate
    pub fn size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| *s > 0.0)
            .map(|s| s as u64)
    }
}

/// One entry of yt-dlp's `thumbnails` array
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThumbnailRef {
    pub url: String,
    pub width: Option<u32>,
}

/// Everything we know about the loaded video
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaDescriptor {
    pub title: String,
    /// Best thumbnail URL, if any
    pub thumbnail: Option<String>,
    /// Raw format list in yt-dlp's order; the quality list is derived from it per mode
    pub formats: Vec<FormatVariant>,
    /// Duration in seconds, when reported
    pub duration: Option<f64>,
}

/// A selectable entry of the quality list. The identifier travels with the
/// label so a selection never has to be matched back by text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualityOption {
    pub label: String,
    pub format_id: String,
}

/// Requested cut, in whole seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrimRange {
    pub start: u64,
    /// `None` means "to the end of the stream"
    pub end: Option<u64>,
}

impl TrimRange {
    /// Length of the kept interval, if bounded
    pub fn duration(&self) -> Option<u64> {
        self.end.filter(|end| *end > self.start).map(|end| end - self.start)
    }
}

/// A single download as confirmed by the user
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub title: String,
    pub mode: DownloadMode,
    /// Already resolved against the current format list
    pub format_id: String,
    pub trim: Option<TrimRange>,
    pub destination: PathBuf,
    /// Thumbnail to write next to the output, if wanted
    pub thumbnail: Option<String>,
}

/// Files produced by a finished download
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadOutcome {
    pub folder: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Coarse step of the running operation, shown next to the progress bar
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Downloading,
    Thumbnail,
    Trimming,
    Finalizing,
    Complete,
    Failed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Ready to download",
            Self::Loading => "Loading video info...",
            Self::Ready => "Ready to download",
            Self::Downloading => "Downloading...",
            Self::Thumbnail => "Saving thumbnail...",
            Self::Trimming => "Trimming...",
            Self::Finalizing => "Finishing...",
            Self::Complete => "Download Complete!",
            Self::Failed => "Failed",
        }
    }

    /// Phases during which no percentage is meaningful
    pub fn is_indeterminate(self) -> bool {
        matches!(self, Self::Loading | Self::Thumbnail | Self::Trimming | Self::Finalizing)
    }
}

/// Progress of the running operation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressState {
    /// Percentage, 0.0 to 100.0
    pub percent: f32,
    pub phase: Phase,
}

impl ProgressState {
    pub fn reset(phase: Phase) -> Self {
        Self { percent: 0.0, phase }
    }

    pub fn set_percent(&mut self, percent: f32) {
        self.percent = percent.clamp(0.0, 100.0);
    }

    /// Fraction for `egui::ProgressBar`
    pub fn fraction(&self) -> f32 {
        self.percent / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_none_counts_as_absent() {
        let audio = FormatVariant {
            vcodec: Some("none".into()),
            acodec: Some("opus".into()),
            ..Default::default()
        };
        assert!(!audio.has_video());
        assert!(audio.has_audio());
    }

    #[test]
    fn size_prefers_declared_over_estimate() {
        let f = FormatVariant {
            filesize: Some(2048.0),
            filesize_approx: Some(4096.0),
            ..Default::default()
        };
        assert_eq!(f.size(), Some(2048));
        let approx = FormatVariant {
            filesize_approx: Some(4096.0),
            ..Default::default()
        };
        assert_eq!(approx.size(), Some(4096));
        assert_eq!(FormatVariant::default().size(), None);
    }

    #[test]
    fn trim_duration_requires_end_after_start() {
        assert_eq!(TrimRange { start: 10, end: Some(25) }.duration(), Some(15));
        assert_eq!(TrimRange { start: 10, end: Some(5) }.duration(), None);
        assert_eq!(TrimRange { start: 10, end: None }.duration(), None);
    }

    #[test]
    fn progress_is_clamped() {
        let mut p = ProgressState::reset(Phase::Downloading);
        p.set_percent(140.0);
        assert_eq!(p.percent, 100.0);
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn mode_labels() {
        assert_eq!(DownloadMode::VideoAudio.to_string(), "Video + Audio");
        assert_eq!(DownloadMode::AudioOnly.to_string(), "Audio Only (MP3)");
        assert!(!DownloadMode::AudioOnly.has_video());
    }
}
