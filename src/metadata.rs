//! Resolving a URL into a [`MediaDescriptor`] via `yt-dlp -J`.

use crate::error::{Error, Result};
use crate::model::{FormatVariant, MediaDescriptor, ThumbnailRef};
use crate::thumbnail::best_thumbnail;
use crate::tools;
use serde::Deserialize;
use std::path::Path;

/// The slice of yt-dlp's info dict we care about
#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<ThumbnailRef>,
    #[serde(default)]
    formats: Vec<FormatVariant>,
    duration: Option<f64>,
}

/// Turns yt-dlp's JSON dump into a descriptor. Playlists are rejected.
pub fn parse_info(json: &str) -> Result<MediaDescriptor> {
    let raw: RawInfo = serde_json::from_str(json)?;
    if matches!(raw.kind.as_deref(), Some("playlist" | "multi_video")) {
        return Err(Error::Unsupported(
            "playlists are not supported, paste a single video URL".into(),
        ));
    }
    let thumbnail = best_thumbnail(&raw.thumbnails, raw.thumbnail.as_deref());
    Ok(MediaDescriptor {
        title: raw.title.unwrap_or_else(|| "Unknown Video".to_string()),
        thumbnail,
        formats: raw.formats,
        duration: raw.duration,
    })
}

/// Arguments for a metadata-only run
pub fn info_args(url: &str) -> Vec<String> {
    vec![
        "-J".to_owned(),
        "--flat-playlist".to_owned(),
        "--no-warnings".to_owned(),
        "--encoding".to_owned(),
        "utf-8".to_owned(),
        url.to_owned(),
    ]
}

/// Runs yt-dlp without downloading and parses what it reports.
pub async fn fetch(yt_dlp: &Path, url: &str) -> Result<MediaDescriptor> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::EmptyUrl);
    }
    let args = info_args(url);
    log::debug!("{} {}", yt_dlp.display(), args.join(" "));

    let output = tools::command(yt_dlp).args(&args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Tool {
            tool: "yt-dlp",
            message: last_error_line(&stderr),
        });
    }
    let media = parse_info(&String::from_utf8_lossy(&output.stdout))?;
    log::info!("Loaded \"{}\" with {} formats", media.title, media.formats.len());
    Ok(media)
}

/// yt-dlp's last `ERROR:` line, or the tail of stderr
pub fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:"))
        .map(|l| l.trim().to_string())
        .or_else(|| lines.last().map(|l| l.to_string()))
        .unwrap_or_else(|| "exited without output".to_string())
}
