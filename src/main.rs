//! Main application for the YouTube Downloader Pro GUI

// Persisted preferences
mod config;
// Download orchestration (yt-dlp, thumbnail, trim)
mod downloader;
// Error taxonomy
mod error;
// yt-dlp metadata loading
mod metadata;
// Data models for media, requests and progress
mod model;
// Progress parsing utilities
mod progress;
// Quality list builder
mod quality;
// Session state owned by the UI thread
mod session;
// Background task runner
mod tasks;
// Thumbnail fetching module
mod thumbnail;
// Locating and installing external tools
mod tools;
// ffmpeg stream-copy trimming
mod trim;
// Small helpers: filenames, timestamps, URLs
mod util;

use config::Config;
use model::{DownloadMode, Phase};
use session::{Notice, NoticeLevel, Session};
use tasks::{TaskEvent, TaskRunner};

// eframe/egui for GUI application framework
use eframe::{egui, App, Frame};
use egui::{TextureOptions, Visuals};
// Dialogs for folder selection, saving and notifications
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};

const APP_NAME: &str = "YouTube Downloader Pro";

/// Program entry point: initializes logging and runtime and launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = Config::load();
    let level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let config = loaded.unwrap_or_else(|e| {
        log::error!("Malformed config file, using defaults: {}", e);
        Config::default()
    });

    tasks::init_runtime()?;

    let mut viewport = egui::ViewportBuilder::default()
        .with_title(APP_NAME)
        .with_inner_size([900.0, 700.0])
        .with_min_inner_size([400.0, 600.0]);
    if let Some(icon) = thumbnail::fetch_logo() {
        viewport = viewport.with_icon(icon);
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        APP_NAME,
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(cc.egui_ctx.clone(), config))
        }),
    )?;
    Ok(())
}

/// Application state for the GUI
struct DownloaderApp {
    config: Config,
    session: Session,
    runner: TaskRunner,
    /// Preview of the loaded video's thumbnail
    preview: Option<egui::TextureHandle>,
    /// Notifications waiting to be shown
    notices: Vec<Notice>,
}

impl DownloaderApp {
    fn new(ctx: egui::Context, config: Config) -> Self {
        let runner = TaskRunner::new(ctx);
        // One-time ffmpeg setup happens in the background
        runner.prepare_ffmpeg();
        Self {
            session: Session::new(&config),
            config,
            runner,
            preview: None,
            notices: Vec::new(),
        }
    }

    /// Applies everything the background posted since the last frame
    fn drain_events(&mut self, ctx: &egui::Context) {
        for event in self.runner.drain() {
            match event {
                TaskEvent::Preview { ticket, image } => {
                    if self.session.is_current(ticket) && self.session.media().is_some() {
                        self.preview = Some(ctx.load_texture("preview", image.0, TextureOptions::default()));
                    }
                }
                other => {
                    if let Some(notice) = self.session.apply(other) {
                        self.notices.push(notice);
                    }
                }
            }
        }
    }

    fn start_fetch(&mut self) {
        match self.session.begin_fetch() {
            Ok((ticket, url)) => {
                self.preview = None;
                self.runner.fetch_metadata(ticket, url);
            }
            Err(e) => self.notices.push(e.into()),
        }
    }

    fn start_download(&mut self) {
        match self.session.begin_download() {
            Ok(request) => self.runner.download(request),
            Err(e) => self.notices.push(e.into()),
        }
    }

    /// Typed or picked, the folder is remembered for the next launch
    fn set_destination(&mut self, folder: std::path::PathBuf) {
        self.session.destination = folder.clone();
        self.config.download_folder = folder;
        self.config.save();
    }

    fn save_thumbnail_as(&mut self) {
        let Some(media) = self.session.media() else { return };
        let Some(url) = media.thumbnail.clone() else {
            self.notices.push(Notice::error("Thumbnail", "This video has no thumbnail"));
            return;
        };
        let file_name = format!(
            "{}.{}",
            util::sanitize_filename(&media.title),
            thumbnail::extension_for(&url)
        );
        if let Some(target) = FileDialog::new()
            .set_directory(&self.session.destination)
            .set_file_name(&file_name)
            .save_file()
        {
            self.runner.save_thumbnail(url, target);
        }
    }

    /// Shows queued notifications; each blocks until dismissed
    fn show_notices(&mut self) {
        for notice in self.notices.drain(..) {
            let level = match notice.level {
                NoticeLevel::Info => MessageLevel::Info,
                NoticeLevel::Error => MessageLevel::Error,
            };
            MessageDialog::new()
                .set_level(level)
                .set_title(&notice.title)
                .set_description(&notice.message)
                .set_buttons(MessageButtons::Ok)
                .show();
        }
    }

    fn url_section(&mut self, ui: &mut egui::Ui) {
        ui.label("YouTube URL");
        ui.horizontal(|ui| {
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.session.url)
                    .hint_text("https://www.youtube.com/watch?v=...")
                    .desired_width(ui.available_width() - 110.0),
            );
            if edit.changed() && self.config.auto_fetch && self.session.should_auto_fetch() {
                self.start_fetch();
            }
            let can_load = !matches!(self.session.operation(), Some(session::Operation::Downloading));
            if ui.add_enabled(can_load, egui::Button::new("LOAD VIDEO")).clicked() {
                self.start_fetch();
            }
        });
    }

    fn media_section(&mut self, ui: &mut egui::Ui) {
        let title = self.session.media().map(|m| m.title.clone());
        let duration = self.session.media().and_then(|m| m.duration);
        ui.horizontal_wrapped(|ui| {
            ui.heading(title.as_deref().unwrap_or("No video loaded"));
            if let Some(d) = duration {
                ui.label(format!("({})", util::format_duration(d)));
            }
        });
        let Some(title) = title else { return };

        ui.horizontal(|ui| {
            if ui.button("Copy title").clicked() {
                ui.ctx().output_mut(|o| o.copied_text = title.clone());
            }
            if ui.button("Save thumbnail…").clicked() {
                self.save_thumbnail_as();
            }
        });
        if let Some(tex) = &self.preview {
            ui.add(egui::Image::from_texture(tex).max_width(320.0));
        }
    }

    fn options_section(&mut self, ui: &mut egui::Ui) {
        let enabled = !self.session.is_busy();
        ui.columns(2, |cols| {
            cols[0].label("Download Type");
            let mut mode = self.session.mode();
            for choice in DownloadMode::ALL {
                cols[0].add_enabled_ui(enabled, |ui| {
                    ui.radio_value(&mut mode, choice, choice.to_string());
                });
            }
            if mode != self.session.mode() {
                self.session.set_mode(mode);
                self.config.mode = mode;
                self.config.save();
            }

            cols[1].label(if mode.has_video() { "Video Quality" } else { "Audio Quality" });
            let selected_text = self
                .session
                .selected()
                .map(|q| q.label.clone())
                .unwrap_or_else(|| "Select quality after loading video".to_string());
            let mut picked = None;
            cols[1].add_enabled_ui(enabled && !self.session.qualities().is_empty(), |ui| {
                egui::ComboBox::from_id_source("quality")
                    .selected_text(selected_text)
                    .width(ui.available_width())
                    .show_ui(ui, |ui| {
                        for q in self.session.qualities() {
                            let is_selected = self.session.selected() == Some(q);
                            if ui.selectable_label(is_selected, &q.label).clicked() {
                                picked = Some(q.clone());
                            }
                        }
                    });
            });
            if let Some(q) = picked {
                self.session.select(q);
            }
        });

        ui.add_space(8.0);
        ui.add_enabled_ui(enabled && self.session.mode().has_video(), |ui| {
            ui.horizontal(|ui| {
                ui.label("Trim start");
                ui.add(egui::TextEdit::singleline(&mut self.session.trim_start).hint_text("HH:MM:SS").desired_width(90.0));
                ui.label("end");
                ui.add(egui::TextEdit::singleline(&mut self.session.trim_end).hint_text("to the end").desired_width(90.0));
            });
        });

        // Folder selection
        ui.horizontal(|ui| {
            ui.label("Download folder:");
            let mut folder = self.session.destination.display().to_string();
            if ui.text_edit_singleline(&mut folder).changed() {
                self.set_destination(folder.into());
            }
            if ui.add_enabled(enabled, egui::Button::new("Browse…")).clicked() {
                if let Some(folder) = FileDialog::new().set_directory(&self.session.destination).pick_folder() {
                    self.set_destination(folder);
                }
            }
        });
        ui.checkbox(&mut self.session.save_thumbnail, "Save thumbnail with download");
    }

    fn progress_section(&mut self, ui: &mut egui::Ui) {
        let progress = self.session.progress();
        let bar = if progress.phase.is_indeterminate() {
            egui::ProgressBar::new(progress.fraction()).animate(true).text(progress.phase.label())
        } else {
            egui::ProgressBar::new(progress.fraction()).show_percentage()
        };
        ui.add(bar);

        // Without media a click explains what is missing
        let trigger = ui.add_enabled(
            !self.session.is_busy(),
            egui::Button::new("DOWNLOAD NOW").min_size(egui::vec2(ui.available_width(), 40.0)),
        );
        if trigger.clicked() {
            self.start_download();
        }

        let color = match progress.phase {
            Phase::Failed => egui::Color32::RED,
            Phase::Complete | Phase::Ready => egui::Color32::GREEN,
            _ => egui::Color32::from_rgb(0x00, 0xd4, 0xaa),
        };
        ui.horizontal(|ui| {
            ui.colored_label(color, progress.phase.label());
            if let Some(outcome) = self.session.last_outcome() {
                if ui.button("Open Folder").clicked() {
                    util::open_folder(outcome.folder.clone());
                }
            }
        });
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_events(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().auto_shrink([false; 2]).show(ui, |ui| {
                ui.vertical_centered(|ui| ui.heading(APP_NAME));
                ui.separator();
                self.url_section(ui);
                ui.add_space(10.0);
                self.media_section(ui);
                ui.add_space(10.0);
                self.options_section(ui);
                ui.add_space(10.0);
                self.progress_section(ui);
            });
        });

        self.show_notices();

        // Keep polling while background work is outstanding
        if self.session.is_busy() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
