//! Session state: what is loaded, what the user picked, and what is running.
//!
//! Only the UI thread touches a [`Session`]. Background work reports through
//! [`TaskEvent`]s which the UI feeds into [`Session::apply`].

use crate::config::Config;
use crate::downloader::resolve_format_id;
use crate::error::{Error, Result};
use crate::model::{
    DownloadMode, DownloadOutcome, DownloadRequest, MediaDescriptor, Phase, ProgressState,
    QualityOption, TrimRange,
};
use crate::quality;
use crate::tasks::{TaskEvent, Ticket};
use crate::util::{looks_like_video_url, parse_timestamp};
use std::path::PathBuf;

/// The single operation allowed in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Fetching(Ticket),
    Downloading,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Something the user must acknowledge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, title: title.to_string(), message: message.into() }
    }

    pub fn error(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, title: title.to_string(), message: message.into() }
    }
}

impl From<Error> for Notice {
    fn from(e: Error) -> Self {
        match e {
            Error::Unsupported(_) => Notice::error("Unsupported input", e.to_string()),
            _ => Notice::error("Error", e.to_string()),
        }
    }
}

pub struct Session {
    /// Contents of the URL field
    pub url: String,
    /// Trim fields as typed
    pub trim_start: String,
    pub trim_end: String,
    pub destination: PathBuf,
    pub save_thumbnail: bool,
    mode: DownloadMode,
    media: Option<MediaDescriptor>,
    qualities: Vec<QualityOption>,
    selected: Option<QualityOption>,
    progress: ProgressState,
    operation: Option<Operation>,
    next_ticket: Ticket,
    last_fetched_url: Option<String>,
    last_outcome: Option<DownloadOutcome>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            url: String::new(),
            trim_start: String::new(),
            trim_end: String::new(),
            destination: config.download_folder.clone(),
            save_thumbnail: config.save_thumbnail,
            mode: config.mode,
            media: None,
            qualities: Vec::new(),
            selected: None,
            progress: ProgressState::default(),
            operation: None,
            next_ticket: 0,
            last_fetched_url: None,
            last_outcome: None,
        }
    }

    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    pub fn media(&self) -> Option<&MediaDescriptor> {
        self.media.as_ref()
    }

    pub fn qualities(&self) -> &[QualityOption] {
        &self.qualities
    }

    pub fn selected(&self) -> Option<&QualityOption> {
        self.selected.as_ref()
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    pub fn is_busy(&self) -> bool {
        self.operation.is_some()
    }

    pub fn last_outcome(&self) -> Option<&DownloadOutcome> {
        self.last_outcome.as_ref()
    }

    /// Whether `ticket` belongs to the newest fetch
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.next_ticket == ticket
    }

    /// A pasted URL is fetched on its own only when nothing runs and it is new.
    pub fn should_auto_fetch(&self) -> bool {
        let url = self.url.trim();
        !self.is_busy()
            && looks_like_video_url(url)
            && self.last_fetched_url.as_deref() != Some(url)
    }

    /// Starts a metadata fetch. A running fetch is superseded; a running download blocks.
    pub fn begin_fetch(&mut self) -> Result<(Ticket, String)> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(Error::EmptyUrl);
        }
        if self.operation == Some(Operation::Downloading) {
            return Err(Error::Busy);
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.operation = Some(Operation::Fetching(ticket));
        self.media = None;
        self.qualities.clear();
        self.selected = None;
        self.last_outcome = None;
        self.progress = ProgressState::reset(Phase::Loading);
        self.last_fetched_url = Some(url.clone());
        log::info!("Loading video info for {}", url);
        Ok((ticket, url))
    }

    /// Switches mode and rebuilds the quality list from the already loaded formats.
    pub fn set_mode(&mut self, mode: DownloadMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.rebuild_qualities();
    }

    pub fn select(&mut self, option: QualityOption) {
        self.selected = Some(option);
    }

    fn rebuild_qualities(&mut self) {
        self.qualities = self
            .media
            .as_ref()
            .map(|m| quality::build(&m.formats, self.mode))
            .unwrap_or_default();
        self.selected = self.qualities.first().cloned();
    }

    /// Trim fields as a range; an unparseable start means no trim.
    pub fn trim_range(&self) -> Option<TrimRange> {
        let start = parse_timestamp(&self.trim_start)?;
        Some(TrimRange { start, end: parse_timestamp(&self.trim_end) })
    }

    /// Validates the current selections and marks a download as running.
    pub fn begin_download(&mut self) -> Result<DownloadRequest> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        if self.url.trim().is_empty() {
            return Err(Error::EmptyUrl);
        }
        let media = self.media.as_ref().ok_or(Error::NoMediaLoaded)?;
        // The loaded media belongs to the last fetched URL, not whatever the field holds now
        let url = self.last_fetched_url.clone().ok_or(Error::NoMediaLoaded)?;
        if self.selected.is_none() {
            return Err(Error::NoQuality);
        }
        let format_id = resolve_format_id(self.mode, self.selected.as_ref(), &media.formats);
        let request = DownloadRequest {
            url,
            title: media.title.clone(),
            mode: self.mode,
            format_id,
            trim: self.trim_range(),
            destination: self.destination.clone(),
            thumbnail: media.thumbnail.clone().filter(|_| self.save_thumbnail),
        };
        self.operation = Some(Operation::Downloading);
        self.last_outcome = None;
        self.progress = ProgressState::reset(Phase::Downloading);
        Ok(request)
    }

    /// Publishes a background result. Returns what the user should be told, if anything.
    pub fn apply(&mut self, event: TaskEvent) -> Option<Notice> {
        match event {
            TaskEvent::MetadataLoaded { ticket, result } => {
                if self.operation != Some(Operation::Fetching(ticket)) {
                    log::debug!("Dropping stale metadata for fetch #{}", ticket);
                    return None;
                }
                self.operation = None;
                match result {
                    Ok(media) => {
                        self.media = Some(media);
                        self.rebuild_qualities();
                        self.progress = ProgressState::reset(Phase::Ready);
                        None
                    }
                    Err(e) => {
                        log::error!("Failed to load: {}", e);
                        self.progress = ProgressState::reset(Phase::Failed);
                        Some(e.into())
                    }
                }
            }
            TaskEvent::Progress(progress) => {
                if self.operation == Some(Operation::Downloading) {
                    self.progress = progress;
                }
                None
            }
            TaskEvent::DownloadFinished(result) => {
                if self.operation != Some(Operation::Downloading) {
                    return None;
                }
                self.operation = None;
                match result {
                    Ok(outcome) => {
                        log::info!("Download complete: {:?}", outcome.files);
                        self.progress = ProgressState { percent: 100.0, phase: Phase::Complete };
                        let notice =
                            Notice::info("Success", format!("Saved to:\n{}", outcome.folder.display()));
                        self.last_outcome = Some(outcome);
                        Some(notice)
                    }
                    Err(e) => {
                        self.progress.phase = Phase::Failed;
                        Some(e.into())
                    }
                }
            }
            TaskEvent::ThumbnailSaved(result) => Some(match result {
                Ok(path) => Notice::info("Thumbnail", format!("Saved to:\n{}", path.display())),
                Err(e) => e.into(),
            }),
            TaskEvent::FfmpegReady(result) => match result {
                Ok(path) => {
                    log::info!("Using ffmpeg at {}", path.display());
                    None
                }
                Err(e) => {
                    log::warn!("ffmpeg unavailable: {}", e);
                    Some(Notice::error("Setup", format!("Failed to install ffmpeg:\n{}", e)))
                }
            },
            // Textures are the UI's business
            TaskEvent::Preview { .. } => None,
        }
    }
}
