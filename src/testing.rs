//! Shared fixtures for unit tests.

use crate::platform::{EmojiKey, UserId, UserProfile};
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// User with a unique avatar URL
pub fn profile(id: u64, name: &str) -> UserProfile {
    UserProfile {
        id: UserId(id),
        name: name.to_string(),
        avatar_url: format!("https://cdn.test/avatars/{id}.png"),
    }
}

/// Static guild emoji
pub fn custom_emoji(id: u64, name: &str) -> EmojiKey {
    EmojiKey::Custom {
        id,
        name: name.to_string(),
        animated: false,
    }
}

/// Solid grey PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("PNG encoding of an in-memory image");
    Bytes::from(buf.into_inner())
}
