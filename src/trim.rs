//! Stream-copy trimming with ffmpeg.

use crate::error::{Error, Result};
use crate::model::TrimRange;
use crate::tools;
use std::path::Path;

/// ffmpeg arguments cutting `range` out of `input` into `output` without re-encoding.
pub fn ffmpeg_args(range: &TrimRange, input: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-ss"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(range.start.to_string());
    if let Some(duration) = range.duration() {
        args.push("-t".to_owned());
        args.push(duration.to_string());
    }
    args.push("-i".to_owned());
    args.push(input.to_string_lossy().into_owned());
    args.push("-c".to_owned());
    args.push("copy".to_owned());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Runs the cut and removes `input` once `output` is written.
pub async fn trim(ffmpeg: &Path, range: &TrimRange, input: &Path, output: &Path) -> Result<()> {
    let args = ffmpeg_args(range, input, output);
    log::debug!("{} {}", ffmpeg.display(), args.join(" "));

    let result = tools::command(ffmpeg).args(&args).output().await?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(Error::Tool {
            tool: "ffmpeg",
            message: stderr.trim().lines().last().unwrap_or("trim failed").to_string(),
        });
    }
    tokio::fs::remove_file(input).await?;
    log::info!("Trimmed {} -> {}", input.display(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ended_cut_has_no_duration() {
        let range = TrimRange { start: 10, end: None };
        let args = ffmpeg_args(&range, Path::new("in.mp4"), Path::new("out.mp4"));
        assert_eq!(
            args,
            ["-y", "-hide_banner", "-loglevel", "error", "-ss", "10", "-i", "in.mp4", "-c", "copy", "out.mp4"]
        );
    }

    #[test]
    fn bounded_cut_passes_duration() {
        let range = TrimRange { start: 65, end: Some(125) };
        let args = ffmpeg_args(&range, Path::new("in.mp4"), Path::new("out.mp4"));
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "60");
        assert!(t < args.iter().position(|a| a == "-i").unwrap());
    }

    #[test]
    fn end_before_start_is_open_ended() {
        let range = TrimRange { start: 30, end: Some(20) };
        let args = ffmpeg_args(&range, Path::new("a"), Path::new("b"));
        assert!(!args.iter().any(|a| a == "-t"));
    }

    #[tokio::test]
    async fn missing_ffmpeg_keeps_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"data").unwrap();
        let range = TrimRange { start: 1, end: None };
        let result = trim(
            Path::new("/nonexistent/ffmpeg"),
            &range,
            &input,
            &dir.path().join("out.mp4"),
        )
        .await;
        assert!(result.is_err());
        assert!(input.exists());
    }
}
