//! Compositing the attendance grid onto a transparent canvas.

use super::layout::TableLayout;
use super::TableGeometry;
use image::{imageops, RgbaImage};
use std::sync::Arc;

/// Draw `layout` using pre-fetched art.
///
/// `avatars[c]` heads column `c`; `icons[r]` is drawn in every marked cell
/// of row `r`. The header occupies grid row 0.
#[must_use]
pub fn compose(
    layout: &TableLayout,
    geometry: &TableGeometry,
    avatars: &[Arc<RgbaImage>],
    icons: &[Arc<RgbaImage>],
) -> RgbaImage {
    let columns = u32::try_from(layout.columns.len()).unwrap_or(u32::MAX);
    let rows = u32::try_from(layout.rows.len()).unwrap_or(u32::MAX).saturating_add(1);
    let (width, height) = geometry.canvas_size(columns, rows);
    let mut canvas = RgbaImage::new(width, height);

    for (col, avatar) in avatars.iter().enumerate() {
        let (x, y) = geometry.tile_origin(col, 0, avatar.dimensions());
        imageops::overlay(&mut canvas, avatar.as_ref(), x, y);
    }

    for (row, icon) in icons.iter().enumerate() {
        for col in 0..layout.columns.len() {
            if layout.is_marked(col, row) {
                let (x, y) = geometry.tile_origin(col, row + 1, icon.dimensions());
                imageops::overlay(&mut canvas, icon.as_ref(), x, y);
            }
        }
    }

    canvas
}
