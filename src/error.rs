use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Image search failed: {0}")]
    ImageSearch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Input driver error: {0}")]
    Driver(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a retry wrapper may re-invoke the failed operation.
    ///
    /// Only transient synthetic-input failures qualify; search and
    /// configuration failures are deterministic and fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Driver(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
