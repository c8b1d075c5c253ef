//! Builds the quality drop-down from the raw format list.

use crate::model::{DownloadMode, FormatVariant, QualityOption};
use std::cmp::Ordering;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Renders a byte count with a 1024 divisor, e.g. `1.5 MB`.
/// Zero or unknown sizes render as `Unknown`.
pub fn format_bytes(bytes: Option<u64>) -> String {
    let Some(bytes) = bytes.filter(|b| *b > 0) else {
        return "Unknown".to_string();
    };
    let mut value = bytes as f64;
    for unit in UNITS {
        // Decide on the rounded value, 1023.96 KB prints as 1.0 MB
        if (value * 10.0).round() / 10.0 < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} TB", value)
}

fn bitrate(f: &FormatVariant) -> f64 {
    f.abr.or(f.tbr).unwrap_or(0.0)
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Formats usable for the given mode, best first.
pub fn variants_for(formats: &[FormatVariant], mode: DownloadMode) -> Vec<&FormatVariant> {
    let mut picked: Vec<&FormatVariant> = if mode.has_video() {
        formats
            .iter()
            .filter(|f| f.ext.as_deref() == Some("mp4") && f.has_video())
            .collect()
    } else {
        formats
            .iter()
            .filter(|f| f.has_audio() && !f.has_video())
            .collect()
    };

    if mode.has_video() {
        picked.sort_by(|a, b| {
            b.height
                .unwrap_or(0)
                .cmp(&a.height.unwrap_or(0))
                .then_with(|| desc(a.tbr.unwrap_or(0.0), b.tbr.unwrap_or(0.0)))
        });
    } else {
        picked.sort_by(|a, b| desc(bitrate(a), bitrate(b)));
    }
    picked
}

/// Display label of one variant in the given mode
pub fn label(f: &FormatVariant, mode: DownloadMode) -> String {
    let size = format_bytes(f.size());
    if mode.has_video() {
        let mut label = match f.height {
            Some(h) => format!("{}p", h),
            None => "?p".to_string(),
        };
        if let Some(fps) = f.fps {
            label.push_str(&format!(" {}fps", fps.round() as u32));
        }
        if let Some(tbr) = f.tbr {
            label.push_str(&format!(" - {:.0}kbps", tbr));
        }
        format!("{} - {}", label, size)
    } else {
        let codec = f.acodec.as_deref().unwrap_or("audio");
        format!("{:.0}kbps {} - {}", bitrate(f), codec, size)
    }
}

/// The quality list shown to the user: (label, format id) pairs, best first.
pub fn build(formats: &[FormatVariant], mode: DownloadMode) -> Vec<QualityOption> {
    variants_for(formats, mode)
        .into_iter()
        .map(|f| QualityOption {
            label: label(f, mode),
            format_id: f.format_id.clone(),
        })
        .collect()
}
