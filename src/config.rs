use crate::error::Result;
use crate::model::DownloadMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "yt-downloader-pro";
const FILE_NAME: &str = "config.toml";

/// Preferences kept between runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub download_folder: PathBuf,
    pub mode: DownloadMode,
    /// Write the thumbnail next to every download
    pub save_thumbnail: bool,
    /// Fetch metadata as soon as something that looks like a video URL is pasted
    pub auto_fetch: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_folder: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            mode: DownloadMode::default(),
            save_thumbnail: true,
            auto_fetch: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/yt-downloader-pro/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
    }

    /// Reads `path`. A missing or empty file gives the defaults.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&content)?)
    }

    /// [`Config::read`] on the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::read(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }

    /// Saves to the default path; failures are logged.
    pub fn save(&self) {
        let Some(path) = Self::default_path() else { return };
        match self.write(&path) {
            Ok(()) => log::debug!("Config saved to {}", path.display()),
            Err(e) => log::warn!("Could not save config to {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::read(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.save_thumbnail);
        assert_eq!(config.mode, DownloadMode::VideoAudio);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "mode = \"AudioOnly\"\nauto_fetch = false\n").unwrap();
        let config = Config::read(&path).unwrap();
        assert_eq!(config.mode, DownloadMode::AudioOnly);
        assert!(!config.auto_fetch);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "mode = [").unwrap();
        assert!(matches!(Config::read(&path), Err(Error::Config(_))));
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);
        let config = Config {
            download_folder: PathBuf::from("/media/videos"),
            mode: DownloadMode::VideoOnly,
            save_thumbnail: false,
            ..Config::default()
        };
        config.write(&path).unwrap();
        assert_eq!(Config::read(&path).unwrap(), config);
    }
}
