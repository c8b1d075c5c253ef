//! Download orchestration: yt-dlp transfer, thumbnail, then trim or promote.

use crate::error::{Error, Result};
use crate::metadata::last_error_line;
use crate::model::{
    DownloadMode, DownloadOutcome, DownloadRequest, FormatVariant, Phase, ProgressState,
    QualityOption, TrimRange,
};
use crate::progress::{is_payload_line, parse_progress_from_line, progress_template};
use crate::quality::variants_for;
use crate::tasks::TaskEvent;
use crate::thumbnail;
use crate::tools::{self, Toolchain};
use crate::trim;
use crate::util::sanitize_filename;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedSender,
};

const BEST_VIDEO: &str = "bestvideo[ext=mp4]";
const BEST_AUDIO: &str = "bestaudio";
const INTERMEDIATE_MARKER: &str = "intermediate";

/// Format id to request for `selected`. A selection that is not among the
/// current variants for `mode` falls back to the generic best format.
pub fn resolve_format_id(
    mode: DownloadMode,
    selected: Option<&QualityOption>,
    formats: &[FormatVariant],
) -> String {
    let current = selected.filter(|q| {
        variants_for(formats, mode)
            .iter()
            .any(|f| f.format_id == q.format_id)
    });
    match current {
        Some(q) => q.format_id.clone(),
        None => {
            let fallback = if mode.has_video() { BEST_VIDEO } else { BEST_AUDIO };
            log::warn!(
                "Selected quality {:?} is not available for {}, using {}",
                selected.map(|q| &q.label),
                mode,
                fallback
            );
            fallback.to_string()
        }
    }
}

/// Everything decided before any process is spawned
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadPlan {
    /// yt-dlp arguments, URL last
    pub args: Vec<String>,
    /// File stem shared by the intermediate and the final outputs
    pub stem: String,
    pub cache: PathBuf,
    pub destination: PathBuf,
    pub mode: DownloadMode,
    /// Only set when a video file will be produced
    pub trim: Option<TrimRange>,
    pub thumbnail: Option<(String, PathBuf)>,
}

impl DownloadPlan {
    pub fn new(request: &DownloadRequest, cache: &Path, ffmpeg: Option<&Path>) -> Self {
        let stem = sanitize_filename(&request.title);
        let template = cache.join(format!("{}.{}.%(ext)s", stem, INTERMEDIATE_MARKER));

        let mut args = vec!["-f".to_owned()];
        match request.mode {
            DownloadMode::VideoAudio => {
                args.push(format!("{}+{}", request.format_id, BEST_AUDIO));
                args.push("--merge-output-format".to_owned());
                args.push("mp4".to_owned());
            }
            DownloadMode::VideoOnly => args.push(request.format_id.clone()),
            DownloadMode::AudioOnly => {
                args.push(request.format_id.clone());
                args.push("-x".to_owned());
                args.push("--audio-format".to_owned());
                args.push("mp3".to_owned());
            }
        }
        for flag in ["--no-playlist", "--force-overwrites", "--newline", "--progress", "--no-simulate"] {
            args.push(flag.to_owned());
        }
        args.push("--encoding".to_owned());
        args.push("utf-8".to_owned());
        args.push("--progress-template".to_owned());
        args.push(progress_template());
        args.push("--print".to_owned());
        args.push("after_move:filepath".to_owned());
        if let Some(ffmpeg) = ffmpeg {
            args.push("--ffmpeg-location".to_owned());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }
        args.push("-o".to_owned());
        args.push(template.to_string_lossy().into_owned());
        args.push(request.url.clone());

        let trim = request.trim.filter(|_| request.mode.has_video());
        let thumbnail = request
            .thumbnail
            .as_ref()
            .map(|url| (url.clone(), thumbnail::thumbnail_path(&request.destination, &stem, url)));

        Self {
            args,
            stem,
            cache: cache.to_path_buf(),
            destination: request.destination.clone(),
            mode: request.mode,
            trim,
            thumbnail,
        }
    }

    /// Final name for a produced intermediate file
    pub fn final_path(&self, intermediate: &Path) -> PathBuf {
        let ext = intermediate
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(if self.mode.has_video() { "mp4" } else { "mp3" });
        let suffix = match self.mode {
            DownloadMode::VideoOnly => "_video",
            _ => "",
        };
        self.destination.join(format!("{}{}.{}", self.stem, suffix, ext))
    }

    /// Looks for the intermediate in the cache when yt-dlp did not print its path.
    pub fn find_intermediate(&self) -> Option<PathBuf> {
        let prefix = format!("{}.{}.", self.stem, INTERMEDIATE_MARKER);
        std::fs::read_dir(&self.cache)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| {
                        n.starts_with(&prefix) && !n.ends_with(".part") && !n.ends_with(".ytdl")
                    })
            })
    }
}

fn report(events: &UnboundedSender<TaskEvent>, phase: Phase, percent: f32) {
    let mut state = ProgressState::reset(phase);
    state.set_percent(percent);
    let _ = events.send(TaskEvent::Progress(state));
}

/// Next line of tool output without its terminator. Bytes that are not UTF-8
/// are replaced rather than failing the read. `None` at end of stream.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Runs yt-dlp, forwarding progress. Returns the printed output path, if any.
async fn transfer(
    yt_dlp: &Path,
    args: &[String],
    events: &UnboundedSender<TaskEvent>,
) -> Result<Option<PathBuf>> {
    log::debug!("{} {}", yt_dlp.display(), args.join(" "));
    let mut child = tools::command(yt_dlp)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take().ok_or_else(|| Error::Tool {
        tool: "yt-dlp",
        message: "stdout was not captured".into(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| Error::Tool {
        tool: "yt-dlp",
        message: "stderr was not captured".into(),
    })?;

    // Progress may land on either stream depending on the yt-dlp version
    let err_events = events.clone();
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            match next_line(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    log::trace!("yt-dlp! {}", line);
                    if let Some(pct) = parse_progress_from_line(&line) {
                        report(&err_events, Phase::Downloading, pct);
                    } else {
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Stopped reading yt-dlp stderr: {}", e);
                    break;
                }
            }
        }
        collected
    });

    let mut printed = None;
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        let line = match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                // Nobody reads its output any more; do not leave it running
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(e.into());
            }
        };
        log::trace!("yt-dlp> {}", line);
        if let Some(pct) = parse_progress_from_line(&line) {
            report(events, Phase::Downloading, pct);
        } else if is_payload_line(&line) {
            printed = Some(PathBuf::from(line.trim()));
        }
    }

    let status = child.wait().await?;
    let stderr_text = stderr_task.await?;
    if !status.success() {
        return Err(Error::Tool {
            tool: "yt-dlp",
            message: last_error_line(&stderr_text),
        });
    }
    Ok(printed)
}

/// Moves `from` to `to`, copying when they sit on different filesystems.
pub async fn promote(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    log::info!("Saved {}", to.display());
    Ok(())
}

/// Turns the intermediate into the final file: cut it, or just move it.
pub async fn finalize(
    plan: &DownloadPlan,
    intermediate: &Path,
    ffmpeg: Option<&Path>,
    events: &UnboundedSender<TaskEvent>,
) -> Result<PathBuf> {
    let target = plan.final_path(intermediate);
    match &plan.trim {
        Some(range) => {
            let ffmpeg = ffmpeg.ok_or_else(|| {
                Error::ToolUnavailable("ffmpeg", "required to trim the download".into())
            })?;
            report(events, Phase::Trimming, 0.0);
            trim::trim(ffmpeg, range, intermediate, &target).await?;
        }
        None => {
            report(events, Phase::Finalizing, 0.0);
            promote(intermediate, &target).await?;
        }
    }
    Ok(target)
}

/// Performs a whole download. Runs on the tokio runtime.
pub async fn run(
    request: DownloadRequest,
    tools: Toolchain,
    events: UnboundedSender<TaskEvent>,
) -> Result<DownloadOutcome> {
    tokio::fs::create_dir_all(&request.destination).await?;
    let plan = DownloadPlan::new(&request, &tools.cache, tools.ffmpeg.as_deref());
    log::info!("Downloading \"{}\" as {} ({})", request.title, request.mode, request.format_id);

    report(&events, Phase::Downloading, 0.0);
    let printed = transfer(&tools.yt_dlp, &plan.args, &events).await?;
    let intermediate = printed
        .filter(|p| p.is_file())
        .or_else(|| plan.find_intermediate())
        .ok_or_else(|| Error::Tool {
            tool: "yt-dlp",
            message: "finished without producing a file".into(),
        })?;

    let mut files = Vec::new();
    if let Some((url, target)) = &plan.thumbnail {
        report(&events, Phase::Thumbnail, 0.0);
        if thumbnail::save_best_effort(url, target).await.log("thumbnail") {
            files.push(target.clone());
        }
    }

    let output = finalize(&plan, &intermediate, tools.ffmpeg.as_deref(), &events).await?;
    files.insert(0, output);

    report(&events, Phase::Complete, 100.0);
    Ok(DownloadOutcome {
        folder: request.destination,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    /// Executable shell script standing in for an external tool
    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn video(id: &str, height: u32) -> FormatVariant {
        FormatVariant {
            format_id: id.into(),
            ext: Some("mp4".into()),
            vcodec: Some("avc1".into()),
            height: Some(height),
            ..Default::default()
        }
    }

    fn request(mode: DownloadMode, trim: Option<TrimRange>) -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            title: "Clip: part 1/2".into(),
            mode,
            format_id: "137".into(),
            trim,
            destination: PathBuf::from("/out"),
            thumbnail: Some("https://i.ytimg.com/vi/abc/maxresdefault.jpg".into()),
        }
    }

    #[test]
    fn selected_variant_is_kept() {
        let formats = [video("137", 1080), video("136", 720)];
        let selected = QualityOption { label: "720p".into(), format_id: "136".into() };
        assert_eq!(resolve_format_id(DownloadMode::VideoAudio, Some(&selected), &formats), "136");
    }

    #[test]
    fn stale_selection_falls_back() {
        let formats = [video("137", 1080)];
        let gone = QualityOption { label: "480p - 1.0 MB".into(), format_id: "135".into() };
        assert_eq!(
            resolve_format_id(DownloadMode::VideoAudio, Some(&gone), &formats),
            "bestvideo[ext=mp4]"
        );
        assert_eq!(resolve_format_id(DownloadMode::AudioOnly, Some(&gone), &formats), "bestaudio");
        assert_eq!(resolve_format_id(DownloadMode::VideoOnly, None, &formats), "bestvideo[ext=mp4]");
    }

    #[test]
    fn video_audio_plan_merges_and_keeps_trim() {
        let trim = Some(TrimRange { start: 10, end: None });
        let plan = DownloadPlan::new(
            &request(DownloadMode::VideoAudio, trim),
            Path::new("/cache"),
            Some(Path::new("/cache/ffmpeg")),
        );
        assert_eq!(plan.args[..4], ["-f", "137+bestaudio", "--merge-output-format", "mp4"]);
        assert!(plan.args.windows(2).any(|w| w == ["--ffmpeg-location", "/cache/ffmpeg"]));
        assert!(plan.args.windows(2).any(|w| w == ["--encoding", "utf-8"]));
        assert_eq!(plan.args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
        assert_eq!(plan.trim, trim);
        assert_eq!(plan.stem, "Clip_ part 1_2");
        assert_eq!(
            plan.final_path(Path::new("/cache/Clip_ part 1_2.intermediate.mp4")),
            PathBuf::from("/out/Clip_ part 1_2.mp4")
        );
    }

    #[test]
    fn audio_plan_extracts_and_never_trims() {
        let trim = Some(TrimRange { start: 10, end: Some(20) });
        let plan = DownloadPlan::new(&request(DownloadMode::AudioOnly, trim), Path::new("/cache"), None);
        assert!(plan.args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(plan.args.contains(&"-x".to_string()));
        assert!(!plan.args.contains(&"--ffmpeg-location".to_string()));
        assert_eq!(plan.trim, None);
        assert_eq!(
            plan.thumbnail.as_ref().map(|(_, p)| p.clone()),
            Some(PathBuf::from("/out/Clip_ part 1_2.jpg"))
        );
    }

    #[test]
    fn video_only_output_is_suffixed() {
        let plan = DownloadPlan::new(&request(DownloadMode::VideoOnly, None), Path::new("/cache"), None);
        assert_eq!(plan.args[..2], ["-f", "137"]);
        assert_eq!(
            plan.final_path(Path::new("/cache/x.intermediate.mp4")),
            PathBuf::from("/out/Clip_ part 1_2_video.mp4")
        );
    }

    #[test]
    fn intermediate_is_found_in_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(DownloadMode::AudioOnly, None);
        req.title = "Song".into();
        let plan = DownloadPlan::new(&req, dir.path(), None);
        std::fs::write(dir.path().join("Song.intermediate.webm.part"), b"partial").unwrap();
        assert_eq!(plan.find_intermediate(), None);
        std::fs::write(dir.path().join("Song.intermediate.mp3"), b"done").unwrap();
        assert_eq!(plan.find_intermediate(), Some(dir.path().join("Song.intermediate.mp3")));
    }

    #[tokio::test]
    async fn untrimmed_output_is_promoted_without_ffmpeg() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut req = request(DownloadMode::AudioOnly, None);
        req.title = "Song".into();
        req.destination = out.path().to_path_buf();
        let plan = DownloadPlan::new(&req, cache.path(), None);

        let intermediate = cache.path().join("Song.intermediate.mp3");
        std::fs::write(&intermediate, b"mp3 data").unwrap();

        let (tx, mut rx) = unbounded_channel();
        // A bogus ffmpeg path would fail if anything tried to run it
        let saved = finalize(&plan, &intermediate, Some(Path::new("/nonexistent/ffmpeg")), &tx)
            .await
            .unwrap();

        assert_eq!(saved, out.path().join("Song.mp3"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"mp3 data");
        assert!(!intermediate.exists());
        match rx.try_recv().unwrap() {
            TaskEvent::Progress(p) => assert_eq!(p.phase, Phase::Finalizing),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn trim_without_ffmpeg_is_an_error() {
        let cache = tempfile::tempdir().unwrap();
        let plan = DownloadPlan::new(
            &request(DownloadMode::VideoAudio, Some(TrimRange { start: 10, end: None })),
            cache.path(),
            None,
        );
        let intermediate = cache.path().join("v.intermediate.mp4");
        std::fs::write(&intermediate, b"v").unwrap();
        let (tx, _rx) = unbounded_channel();
        let err = finalize(&plan, &intermediate, None, &tx).await.unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable("ffmpeg", _)));
        assert!(intermediate.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn undecodable_output_does_not_fail_the_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let yt_dlp = script(
            dir.path(),
            "yt-dlp",
            "printf 'progress: 42.0%%\\n'\n\
             printf 'WARNING: caf\\351\\n' >&2\n\
             printf '/tmp/T\\377.mp4\\n'\n",
        );
        let (tx, mut rx) = unbounded_channel();
        let printed = transfer(&yt_dlp, &[], &tx).await.unwrap();
        assert_eq!(printed, Some(PathBuf::from("/tmp/T\u{FFFD}.mp4")));
        match rx.try_recv().unwrap() {
            TaskEvent::Progress(p) => assert_eq!(p.percent, 42.0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_transfer_reports_the_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let yt_dlp = script(
            dir.path(),
            "yt-dlp",
            "echo 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1\n",
        );
        let (tx, _rx) = unbounded_channel();
        match transfer(&yt_dlp, &[], &tx).await.unwrap_err() {
            Error::Tool { tool, message } => {
                assert_eq!(tool, "yt-dlp");
                assert_eq!(message, "[youtube] abc: Video unavailable");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_ended_trim_replaces_the_intermediate() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // Copies the `-i` input to the last argument and records what it was given
        let ffmpeg = script(
            cache.path(),
            "ffmpeg",
            "echo \"$@\" > \"$0.args\"\n\
             input=\n\
             while [ \"$#\" -gt 1 ]; do\n\
             \x20 if [ \"$1\" = \"-i\" ]; then input=\"$2\"; fi\n\
             \x20 shift\n\
             done\n\
             cp \"$input\" \"$1\"\n",
        );
        let mut req = request(DownloadMode::VideoAudio, Some(TrimRange { start: 10, end: None }));
        req.title = "Clip".into();
        req.destination = out.path().to_path_buf();
        let plan = DownloadPlan::new(&req, cache.path(), Some(ffmpeg.as_path()));

        let intermediate = cache.path().join("Clip.intermediate.mp4");
        std::fs::write(&intermediate, b"merged video").unwrap();

        let (tx, mut rx) = unbounded_channel();
        let saved = finalize(&plan, &intermediate, Some(ffmpeg.as_path()), &tx)
            .await
            .unwrap();

        assert_eq!(saved, out.path().join("Clip.mp4"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"merged video");
        assert!(!intermediate.exists());
        let args = std::fs::read_to_string(cache.path().join("ffmpeg.args")).unwrap();
        assert!(args.contains("-ss 10 -i"), "{}", args);
        assert!(!args.contains(" -t "), "{}", args);
        match rx.try_recv().unwrap() {
            TaskEvent::Progress(p) => assert_eq!(p.phase, Phase::Trimming),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
