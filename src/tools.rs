//! Locating yt-dlp and ffmpeg, and the one-time ffmpeg install.

use crate::error::{Error, Result};
use rust_embed::RustEmbed;
use std::{
    fs::File,
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Optional yt-dlp build bundled at compile time
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const CACHE_SUBDIR: &str = "yt_downloader_pro";

// Held for the whole ffmpeg check-and-install
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

#[cfg(target_os = "windows")]
const FFMPEG_PACKAGE_URL: Option<&str> =
    Some("https://github.com/GyanD/codexffmpeg/releases/download/7.0.1/ffmpeg-7.0.1-essentials_build.zip");
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
const FFMPEG_PACKAGE_URL: Option<&str> = Some("https://www.osxexperts.net/ffmpeg71arm.zip");
#[cfg(all(target_os = "macos", not(target_arch = "aarch64")))]
const FFMPEG_PACKAGE_URL: Option<&str> = Some("https://www.osxexperts.net/ffmpeg71intel.zip");
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const FFMPEG_PACKAGE_URL: Option<&str> = None;

fn exe(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// A subprocess for one of the external tools, without a console window on Windows.
pub fn command(program: &Path) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Process-wide scratch directory: cached binaries and untrimmed downloads.
pub fn cache_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(CACHE_SUBDIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Finds yt-dlp: the bundled copy (unpacked into `cache` once), else `PATH`.
pub fn locate_yt_dlp(cache: &Path) -> Result<PathBuf> {
    let bin = exe("yt-dlp");
    if let Some(data) = Asset::get(&bin) {
        let target = cache.join(&bin);
        if !target.exists() {
            log::info!("Unpacking bundled {} to {}", bin, target.display());
            let part = part_path(&target);
            let mut f = File::create(&part)?;
            f.write_all(&data.data)?;
            f.sync_all()?;
            make_executable(&part)?;
            std::fs::rename(&part, &target)?;
        }
        return Ok(target);
    }
    which::which(&bin).map_err(|e| Error::ToolUnavailable("yt-dlp", e.to_string()))
}

/// Finds ffmpeg without installing anything: cached copy first, then `PATH`.
pub fn find_ffmpeg(cache: &Path) -> Option<PathBuf> {
    let cached = cache.join(exe("ffmpeg"));
    if cached.is_file() {
        return Some(cached);
    }
    which::which(exe("ffmpeg")).ok()
}

/// Finds ffmpeg, fetching the packaged build into `cache` if it is missing.
/// Blocking; run it off the UI thread. Concurrent callers wait for a running
/// install instead of starting their own.
pub fn ensure_ffmpeg(cache: &Path) -> Result<PathBuf> {
    let _guard = INSTALL_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(found) = find_ffmpeg(cache) {
        return Ok(found);
    }
    let url = FFMPEG_PACKAGE_URL.ok_or_else(|| {
        Error::ToolUnavailable(
            "ffmpeg",
            "install it with your package manager (e.g. `apt install ffmpeg`)".into(),
        )
    })?;
    install_ffmpeg(url, cache)
}

fn install_ffmpeg(url: &str, cache: &Path) -> Result<PathBuf> {
    log::info!("Downloading ffmpeg (one-time) from {}", url);
    let client = reqwest::blocking::Client::builder().timeout(None).build()?;
    let bytes = client.get(url).send()?.error_for_status()?.bytes()?;
    let target = cache.join(exe("ffmpeg"));
    extract_binary(Cursor::new(bytes), &exe("ffmpeg"), &target)?;
    log::info!("ffmpeg installed at {}", target.display());
    Ok(target)
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

/// Copies the first archive entry whose file name is `name` to `target`.
/// The binary is written next to `target` and only renamed into place once
/// complete, so `target` never exists half-written.
fn extract_binary<R: std::io::Read + std::io::Seek>(
    reader: R,
    name: &str,
    target: &Path,
) -> Result<()> {
    let part = part_path(target);
    let result = write_entry(reader, name, &part)
        .and_then(|()| make_executable(&part))
        .and_then(|()| std::fs::rename(&part, target).map_err(Error::from));
    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn write_entry<R: std::io::Read + std::io::Seek>(reader: R, name: &str, out: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let matches = !entry.is_dir()
            && Path::new(entry.name())
                .file_name()
                .is_some_and(|f| f == name);
        if matches {
            let mut file = File::create(out)?;
            std::io::copy(&mut entry, &mut file)?;
            file.sync_all()?;
            return Ok(());
        }
    }
    Err(Error::ToolUnavailable(
        "ffmpeg",
        format!("archive does not contain {}", name),
    ))
}

/// Paths handed to a download
#[derive(Clone, Debug)]
pub struct Toolchain {
    pub yt_dlp: PathBuf,
    pub ffmpeg: Option<PathBuf>,
    pub cache: PathBuf,
}

impl Toolchain {
    /// Resolves yt-dlp and, when `need_ffmpeg`, installs ffmpeg if absent.
    /// Blocking.
    pub fn resolve(need_ffmpeg: bool) -> Result<Self> {
        let cache = cache_dir()?;
        let yt_dlp = locate_yt_dlp(&cache)?;
        let ffmpeg = if need_ffmpeg {
            Some(ensure_ffmpeg(&cache)?)
        } else {
            find_ffmpeg(&cache)
        };
        Ok(Self { yt_dlp, ffmpeg, cache })
    }
}
