//! Weekly game-night poll bot.
//!
//! Posts a weekly attendance poll, renders the reaction state as a table
//! image on a debounce, and rotates the poll on a fixed weekly cadence.

/// Gateway event handling for the Discord transport.
pub mod bot;
/// Configuration and settings management.
pub mod config;
/// Logging setup with secret redaction.
pub mod logging;
/// Chat platform abstraction and the Discord adapter.
pub mod platform;
/// Poll lifecycle: state machine, timers, schedule, attendance, archive.
pub mod poll;
/// Table rendering (image and text) and the image cache.
pub mod render;
/// Poll message templates backed by a YAML document.
pub mod templates;
/// Utility functions.
pub mod utils;

#[cfg(test)]
pub mod testing;
