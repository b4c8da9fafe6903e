//! Table rendering
//!
//! Turns an [`AttendanceTable`] into a composited PNG or a text grid. Art
//! for avatars and emoji goes through the shared [`cache::ImageCache`].

/// Decoded image cache.
pub mod cache;
/// Canvas compositing.
pub mod image_table;
/// Column and row ordering.
pub mod layout;
/// Image fetching.
pub mod source;
/// Text grid.
pub mod text_table;

use crate::config::{
    Settings, CUSTOM_EMOJI_CDN_BASE, EMOJI_CDN_TEMPLATE, IMAGE_CACHE_MAX_SIZE,
    TABLE_PADDING_WIDTH, TABLE_SQUARE_PADDING, TABLE_SQUARE_SIZE,
};
use crate::platform::EmojiKey;
use crate::poll::attendance::AttendanceTable;
use bytes::Bytes;
use cache::ImageCache;
use futures_util::future::join_all;
use image::{ImageFormat, RgbaImage};
use layout::TableLayout;
use source::{ImageKey, ImageSource};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while producing the table image
#[derive(Error, Debug)]
pub enum RenderError {
    /// PNG encoding failed
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    /// The blocking render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Pixel geometry of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableGeometry {
    /// Outer padding around the grid
    pub padding: u32,
    /// Side of one cell
    pub square_size: u32,
    /// Gap after each cell
    pub square_padding: u32,
}

impl Default for TableGeometry {
    fn default() -> Self {
        Self {
            padding: TABLE_PADDING_WIDTH,
            square_size: TABLE_SQUARE_SIZE,
            square_padding: TABLE_SQUARE_PADDING,
        }
    }
}

impl TableGeometry {
    /// Distance between the origins of adjacent cells
    #[must_use]
    pub const fn pitch(&self) -> u32 {
        self.square_size + self.square_padding
    }

    /// Canvas size for a `columns × rows` grid
    #[must_use]
    pub const fn canvas_size(&self, columns: u32, rows: u32) -> (u32, u32) {
        (
            self.padding * 2 + columns * self.pitch(),
            self.padding * 2 + rows * self.pitch(),
        )
    }

    /// Top-left corner for an image of `dimensions` centred in cell (`col`, `row`)
    #[must_use]
    pub fn tile_origin(&self, col: usize, row: usize, dimensions: (u32, u32)) -> (i64, i64) {
        let pitch = i64::from(self.pitch());
        let padding = i64::from(self.padding);
        let size = i64::from(self.square_size);
        let col = i64::try_from(col).unwrap_or_default();
        let row = i64::try_from(row).unwrap_or_default();
        (
            padding + col * pitch + (size - i64::from(dimensions.0)) / 2,
            padding + row * pitch + (size - i64::from(dimensions.1)) / 2,
        )
    }
}

/// Resolves reaction emoji to their art
#[derive(Debug, Clone)]
pub struct EmojiArt {
    /// Directory of local twemoji PNGs
    pub emoji_dir: PathBuf,
    /// Use `cdn_template` instead of `emoji_dir`
    pub use_remote: bool,
    /// URL template; `{}` is replaced by the asset file name
    pub cdn_template: String,
}

impl EmojiArt {
    /// Settings-driven resolver
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            emoji_dir: settings.emoji_dir.clone(),
            use_remote: settings.use_remote_emoji,
            cdn_template: EMOJI_CDN_TEMPLATE.to_string(),
        }
    }

    /// Cache key for `emoji`'s art
    #[must_use]
    pub fn key(&self, emoji: &EmojiKey, table: &AttendanceTable) -> ImageKey {
        match emoji {
            EmojiKey::Unicode(sequence) => {
                let filename = source::unicode_emoji_filename(sequence);
                if self.use_remote {
                    ImageKey::Url(self.cdn_template.replace("{}", &filename))
                } else {
                    ImageKey::File(self.emoji_dir.join(filename))
                }
            }
            EmojiKey::Custom { id, animated, .. } => table.emoji_url(emoji).map_or_else(
                || {
                    let ext = if *animated { "gif" } else { "png" };
                    ImageKey::Url(format!("{CUSTOM_EMOJI_CDN_BASE}/{id}.{ext}"))
                },
                |url| ImageKey::Url(url.to_string()),
            ),
        }
    }
}

/// Renders attendance tables
pub struct TableRenderer {
    cache: ImageCache,
    geometry: TableGeometry,
    emoji_art: EmojiArt,
}

impl TableRenderer {
    #[must_use]
    pub const fn new(cache: ImageCache, geometry: TableGeometry, emoji_art: EmojiArt) -> Self {
        Self {
            cache,
            geometry,
            emoji_art,
        }
    }

    /// Renderer with default geometry and settings-driven emoji lookup
    #[must_use]
    pub fn from_settings(settings: &Settings, source: Arc<dyn ImageSource>) -> Self {
        let geometry = TableGeometry::default();
        let cache = ImageCache::new(source, geometry.square_size, IMAGE_CACHE_MAX_SIZE);
        Self::new(cache, geometry, EmojiArt::from_settings(settings))
    }

    /// Pixel geometry in use
    #[must_use]
    pub const fn geometry(&self) -> &TableGeometry {
        &self.geometry
    }

    /// Composite the table image.
    ///
    /// Art for all columns and rows is fetched concurrently.
    pub async fn render_image(&self, table: &AttendanceTable) -> RgbaImage {
        let layout = TableLayout::from_table(table);

        let avatar_keys: Vec<ImageKey> = layout
            .columns
            .iter()
            .map(|a| ImageKey::Url(a.profile.avatar_url.clone()))
            .collect();
        let icon_keys: Vec<ImageKey> = layout
            .rows
            .iter()
            .map(|game| self.emoji_art.key(game, table))
            .collect();

        let (avatars, icons) = tokio::join!(
            join_all(avatar_keys.iter().map(|k| self.cache.get(k))),
            join_all(icon_keys.iter().map(|k| self.cache.get(k)))
        );
        debug!(
            "Drawing {} columns and {} rows",
            layout.columns.len(),
            layout.rows.len()
        );

        image_table::compose(&layout, &self.geometry, &avatars, &icons)
    }

    /// Render the table image as PNG bytes
    ///
    /// # Errors
    ///
    /// Returns an error if PNG encoding fails.
    pub async fn render_png(&self, table: &AttendanceTable) -> Result<Bytes, RenderError> {
        let image = self.render_image(table).await;
        tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?
    }

    /// Render the table as text with `check` marking votes
    #[must_use]
    pub fn render_text(&self, table: &AttendanceTable, check: &str) -> String {
        text_table::draw(&TableLayout::from_table(table), check)
    }
}

/// Encode an image as PNG
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Bytes, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(Bytes::from(buf.into_inner()))
}
