//! Errors surfaced to the user, plus the contract for failures that are not.

use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The URL field was empty when an operation was requested.
    #[error("Enter a video URL")]
    EmptyUrl,
    /// A download was requested before any metadata was loaded.
    #[error("Load a video first!")]
    NoMediaLoaded,
    /// The loaded media has no variant for the selected mode.
    #[error("No quality available")]
    NoQuality,
    /// Another operation is still running.
    #[error("Another operation is still running")]
    Busy,
    /// The URL resolved to something other than a single video.
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    /// A subprocess exited unsuccessfully.
    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },
    /// A required executable could not be found or installed.
    #[error("{0} is not available: {1}")]
    ToolUnavailable(&'static str, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Could not extract archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Malformed config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Could not write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a best-effort side operation. Its failure never reaches the
/// caller's result; the only way to consume it is to log it.
#[must_use = "call .log() to record a failed best-effort step"]
pub struct Ignorable(Result<()>);

impl Ignorable {
    pub fn new(result: Result<()>) -> Self {
        Self(result)
    }

    /// Logs a failure at `warn` and reports whether the step succeeded.
    pub fn log(self, what: &str) -> bool {
        match self.0 {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} failed (ignored): {}", what, e);
                false
            }
        }
    }
}
