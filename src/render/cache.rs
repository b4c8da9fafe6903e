//! Process-lifetime cache of decoded, downscaled table art.

use super::source::{FetchError, ImageKey, ImageSource};
use crate::config::PLACEHOLDER_COLOR;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, error};

/// Get-or-fetch-once image cache.
///
/// Concurrent requests for the same uncached key share one fetch. Failed
/// fetches are not cached and resolve to a solid placeholder tile.
#[derive(Clone)]
pub struct ImageCache {
    cache: Cache<ImageKey, Arc<RgbaImage>>,
    source: Arc<dyn ImageSource>,
    square_size: u32,
    placeholder: Arc<RgbaImage>,
}

impl ImageCache {
    /// Creates a cache whose images fit in a `square_size` square
    #[must_use]
    pub fn new(source: Arc<dyn ImageSource>, square_size: u32, max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();
        let placeholder = RgbaImage::from_pixel(square_size, square_size, Rgba(PLACEHOLDER_COLOR));

        Self {
            cache,
            source,
            square_size,
            placeholder: Arc::new(placeholder),
        }
    }

    /// Image for `key`, or the placeholder if it cannot be fetched or decoded
    pub async fn get(&self, key: &ImageKey) -> Arc<RgbaImage> {
        let source = Arc::clone(&self.source);
        let square_size = self.square_size;
        let fetch_key = key.clone();

        let result = self
            .cache
            .try_get_with(key.clone(), async move {
                debug!("Cache miss for {}", fetch_key);
                let bytes = source.fetch(&fetch_key).await?;
                decode_thumbnail(bytes, square_size).await.map(Arc::new)
            })
            .await;

        match result {
            Ok(image) => image,
            Err(e) => {
                error!("Failed to get image {}: {}", key, e);
                Arc::clone(&self.placeholder)
            }
        }
    }

    /// The tile used in place of missing art
    #[must_use]
    pub fn placeholder(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.placeholder)
    }

    /// Number of cached images
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

/// Decode `bytes` and shrink the result to fit a `size` square, keeping aspect
async fn decode_thumbnail(bytes: Bytes, size: u32) -> Result<RgbaImage, FetchError> {
    tokio::task::spawn_blocking(move || {
        let image =
            image::load_from_memory(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        let image = if image.width() > size || image.height() > size {
            image.thumbnail(size, size)
        } else {
            image
        };
        Ok(image.to_rgba8())
    })
    .await
    .map_err(|e| FetchError::Decode(e.to_string()))?
}
