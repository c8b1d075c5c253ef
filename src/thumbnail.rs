use crate::error::{Ignorable, Result};
use crate::model::ThumbnailRef;
use eframe::egui::{self, ColorImage};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Decorative image fetches give up quickly
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const LOGO_URL: &str = "https://images.icon-icons.com/195/PNG/256/YouTube_23392.png";

/// Picks the widest thumbnail, falling back to the top-level `thumbnail` field.
pub fn best_thumbnail(thumbnails: &[ThumbnailRef], fallback: Option<&str>) -> Option<String> {
    thumbnails
        .iter()
        .filter(|t| !t.url.is_empty())
        .max_by_key(|t| t.width.unwrap_or(0))
        .map(|t| t.url.clone())
        .or_else(|| fallback.map(str::to_string))
}

/// File extension for a thumbnail URL; query strings are ignored.
pub fn extension_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "png"
    } else if path.ends_with(".webp") {
        "webp"
    } else {
        "jpg"
    }
}

/// Where the thumbnail for `stem` goes inside `folder`
pub fn thumbnail_path(folder: &Path, stem: &str, url: &str) -> PathBuf {
    folder.join(format!("{}.{}", stem, extension_for(url)))
}

fn fetch_bytes_blocking(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let resp = client.get(url).send()?.error_for_status()?;
    Ok(resp.bytes()?.to_vec())
}

/// Async fetch-and-write used by the download orchestrator.
pub async fn save(url: &str, target: &Path) -> Result<()> {
    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    tokio::fs::write(target, &bytes).await?;
    log::info!("Thumbnail saved to {}", target.display());
    Ok(())
}

/// Best-effort variant of [`save`]: its failure never fails the download.
pub async fn save_best_effort(url: &str, target: &Path) -> Ignorable {
    Ignorable::new(save(url, target).await)
}

/// Blocking fetch-and-write for the explicit "Save thumbnail" action.
pub fn save_blocking(url: &str, target: &Path) -> Result<()> {
    let bytes = fetch_bytes_blocking(url)?;
    std::fs::write(target, bytes)?;
    Ok(())
}

/// Downloads and decodes a thumbnail for the preview pane. Blocking.
pub fn fetch_preview(url: &str) -> Result<ColorImage> {
    let bytes = fetch_bytes_blocking(url)?;
    let img = image::load_from_memory(&bytes)?.thumbnail(480, 270).to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, &img))
}

/// Window icon. Blocking; any failure just means the default icon.
pub fn fetch_logo() -> Option<egui::viewport::IconData> {
    let bytes = match fetch_bytes_blocking(LOGO_URL) {
        Ok(b) => b,
        Err(e) => {
            log::debug!("Logo unavailable: {}", e);
            return None;
        }
    };
    let img = image::load_from_memory(&bytes)
        .ok()?
        .resize(64, 64, image::imageops::FilterType::Lanczos3)
        .to_rgba8();
    Some(egui::viewport::IconData {
        width: img.width(),
        height: img.height(),
        rgba: img.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(url: &str, width: Option<u32>) -> ThumbnailRef {
        ThumbnailRef { url: url.into(), width }
    }

    #[test]
    fn widest_thumbnail_wins() {
        let list = [
            thumb("https://i.ytimg.com/vi/x/default.jpg", Some(120)),
            thumb("https://i.ytimg.com/vi/x/maxresdefault.jpg", Some(1280)),
            thumb("https://i.ytimg.com/vi/x/mqdefault.jpg", None),
        ];
        assert_eq!(
            best_thumbnail(&list, None).as_deref(),
            Some("https://i.ytimg.com/vi/x/maxresdefault.jpg")
        );
    }

    #[test]
    fn falls_back_to_top_level_field() {
        assert_eq!(
            best_thumbnail(&[], Some("https://example.com/t.jpg")).as_deref(),
            Some("https://example.com/t.jpg")
        );
        assert_eq!(best_thumbnail(&[], None), None);
    }

    #[test]
    fn extension_ignores_query() {
        assert_eq!(extension_for("https://i.ytimg.com/vi_webp/x/maxresdefault.webp?v=1"), "webp");
        assert_eq!(extension_for("https://example.com/a.PNG"), "png");
        assert_eq!(extension_for("https://example.com/a"), "jpg");
        assert_eq!(
            thumbnail_path(Path::new("/out"), "Title", "https://x/y.jpg"),
            Path::new("/out/Title.jpg")
        );
    }

    #[tokio::test]
    async fn unreachable_thumbnail_is_ignorable() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t.jpg");
        let outcome = save_best_effort("http://127.0.0.1:9/nothing.jpg", &target).await;
        assert!(!outcome.log("thumbnail"));
        assert!(!target.exists());
    }
}
