//! Where table art comes from: HTTP URLs and local files.

use crate::config::IMAGE_FETCH_TIMEOUT_SECS;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Cache key identifying one piece of art
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// Remote image
    Url(String),
    /// Local file
    File(PathBuf),
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Errors raised while fetching or decoding art
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(String),
    /// The server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),
    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Bytes are not a supported image
    #[error("Image decode failed: {0}")]
    Decode(String),
}

/// Fetches raw image bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Raw bytes behind `key`
    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, FetchError>;
}

/// Fetches URLs over HTTP and files from disk
#[derive(Clone)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    /// Client with the image fetch timeout applied
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IMAGE_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, FetchError> {
        match key {
            ImageKey::Url(url) => {
                debug!("Getting image from url {}", url);
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Http(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Http(e.to_string()))
            }
            ImageKey::File(path) => {
                debug!("Getting image from path {}", path.display());
                Ok(Bytes::from(tokio::fs::read(path).await?))
            }
        }
    }
}

/// Twemoji asset name for a unicode emoji, e.g. `2694.png` for ⚔️.
///
/// Codepoints are lowercase hex joined by `-`. A trailing variation selector
/// is dropped when the emoji is exactly two codepoints.
///
/// # Examples
///
/// ```
/// use ocb_poll_bot::render::source::unicode_emoji_filename;
/// assert_eq!(unicode_emoji_filename("\u{2694}\u{fe0f}"), "2694.png");
/// assert_eq!(unicode_emoji_filename("🎲"), "1f3b2.png");
/// ```
#[must_use]
pub fn unicode_emoji_filename(emoji: &str) -> String {
    let mut codes: Vec<String> = emoji.chars().map(|c| format!("{:x}", u32::from(c))).collect();
    if codes.len() == 2 && codes[1] == "fe0f" {
        codes.pop();
    }
    format!("{}.png", codes.join("-"))
}
