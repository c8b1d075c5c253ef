//! Background work and the channel that carries its results to the UI thread.

use crate::downloader;
use crate::error::Result;
use crate::metadata;
use crate::model::{DownloadMode, DownloadOutcome, DownloadRequest, MediaDescriptor, ProgressState};
use crate::thumbnail;
use crate::tools::{self, Toolchain};
use eframe::egui::{self, ColorImage};
use once_cell::sync::OnceCell;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    runtime::Runtime,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Starts the shared runtime. Call once from `main`.
pub fn init_runtime() -> std::io::Result<()> {
    let rt = Arc::new(Runtime::new()?);
    // A second call keeps the first runtime
    let _ = RUNTIME.set(rt);
    Ok(())
}

fn runtime() -> Option<&'static Arc<Runtime>> {
    let rt = RUNTIME.get();
    if rt.is_none() {
        log::error!("Background runtime was not initialised");
    }
    rt
}

/// Identifies one metadata fetch; only the newest one is applied
pub type Ticket = u64;

/// Decoded thumbnail for the preview pane
pub struct PreviewImage(pub ColorImage);

impl std::fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PreviewImage({}x{})", self.0.size[0], self.0.size[1])
    }
}

/// Messages posted by background work, drained by the UI every frame
#[derive(Debug)]
pub enum TaskEvent {
    MetadataLoaded {
        ticket: Ticket,
        result: Result<MediaDescriptor>,
    },
    Preview {
        ticket: Ticket,
        image: PreviewImage,
    },
    Progress(ProgressState),
    DownloadFinished(Result<DownloadOutcome>),
    ThumbnailSaved(Result<PathBuf>),
    FfmpegReady(Result<PathBuf>),
}

async fn load_metadata(url: &str) -> Result<MediaDescriptor> {
    let cache = tools::cache_dir()?;
    let yt_dlp = tools::locate_yt_dlp(&cache)?;
    metadata::fetch(&yt_dlp, url).await
}

/// Spawns background work and hands its events back to the UI.
pub struct TaskRunner {
    tx: UnboundedSender<TaskEvent>,
    rx: UnboundedReceiver<TaskEvent>,
    ctx: Option<egui::Context>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        let (tx, rx) = unbounded_channel();
        Self { tx, rx, ctx: None }
    }
}

impl TaskRunner {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx: Some(ctx),
            ..Self::default()
        }
    }

    /// Everything posted since the last frame
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn post(tx: &UnboundedSender<TaskEvent>, ctx: &Option<egui::Context>, event: TaskEvent) {
        let _ = tx.send(event);
        if let Some(ctx) = ctx {
            ctx.request_repaint();
        }
    }

    /// Resolves `url` into metadata, then fetches a preview of its thumbnail.
    pub fn fetch_metadata(&self, ticket: Ticket, url: String) {
        let Some(rt) = runtime() else { return };
        let (tx, ctx) = (self.tx.clone(), self.ctx.clone());
        rt.spawn(async move {
            let result = load_metadata(&url).await;

            let preview_url = result.as_ref().ok().and_then(|m| m.thumbnail.clone());
            Self::post(&tx, &ctx, TaskEvent::MetadataLoaded { ticket, result });

            if let Some(url) = preview_url {
                let preview = tokio::task::spawn_blocking(move || thumbnail::fetch_preview(&url)).await;
                match preview {
                    Ok(Ok(image)) => Self::post(
                        &tx,
                        &ctx,
                        TaskEvent::Preview { ticket, image: PreviewImage(image) },
                    ),
                    Ok(Err(e)) => log::warn!("Preview unavailable: {}", e),
                    Err(e) => log::warn!("Preview task failed: {}", e),
                }
            }
        });
    }

    /// Runs a download to completion. Progress shares the event channel, so it
    /// always arrives before the matching `DownloadFinished`.
    pub fn download(&self, request: DownloadRequest) {
        let Some(rt) = runtime() else { return };
        let (tx, ctx) = (self.tx.clone(), self.ctx.clone());

        rt.spawn(async move {
            let need_ffmpeg = request.mode != DownloadMode::VideoOnly
                || request.trim.is_some();
            let result = match tokio::task::spawn_blocking(move || Toolchain::resolve(need_ffmpeg)).await {
                Ok(Ok(tools)) => downloader::run(request, tools, tx.clone()).await,
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = &result {
                log::error!("Download failed: {}", e);
            }
            Self::post(&tx, &ctx, TaskEvent::DownloadFinished(result));
        });
    }

    /// Saves a thumbnail to a user-chosen path.
    pub fn save_thumbnail(&self, url: String, target: PathBuf) {
        let Some(rt) = runtime() else { return };
        let (tx, ctx) = (self.tx.clone(), self.ctx.clone());
        rt.spawn_blocking(move || {
            let result = thumbnail::save_blocking(&url, &target).map(|_| target);
            Self::post(&tx, &ctx, TaskEvent::ThumbnailSaved(result));
        });
    }

    /// Makes sure ffmpeg is present, installing it once if needed.
    pub fn prepare_ffmpeg(&self) {
        let Some(rt) = runtime() else { return };
        let (tx, ctx) = (self.tx.clone(), self.ctx.clone());
        rt.spawn_blocking(move || {
            let result = tools::cache_dir().and_then(|cache| tools::ensure_ffmpeg(&cache));
            Self::post(&tx, &ctx, TaskEvent::FfmpegReady(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Phase;

    #[test]
    fn drain_returns_events_in_order() {
        let mut runner = TaskRunner::default();
        let tx = runner.tx.clone();
        tx.send(TaskEvent::Progress(ProgressState::reset(Phase::Downloading))).unwrap();
        tx.send(TaskEvent::FfmpegReady(Ok(PathBuf::from("ffmpeg")))).unwrap();

        let events = runner.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TaskEvent::Progress(_)));
        assert!(matches!(events[1], TaskEvent::FfmpegReady(Ok(_))));
        assert!(runner.drain().is_empty());
    }
}
