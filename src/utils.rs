//! Utility functions for message splitting, truncation and retries.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

const CODE_FENCE: &str = "```";

/// Splits a long message into parts that fit within the platform message limit.
///
/// Code fences (triple backticks) are closed at the end of a part and reopened
/// at the start of the next one so every part renders on its own.
///
/// A single line longer than `max_length` is split on character boundaries.
///
/// # Examples
///
/// ```
/// use ocb_poll_bot::utils::split_long_message;
/// let long_msg = "A very long message...\n".repeat(300);
/// let parts = split_long_message(&long_msg, 1900);
/// assert!(parts.len() > 1);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }

    if message.chars().count() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut code_block = false;

    for line in message.lines() {
        let line_len = line.chars().count();

        if line_len > max_length {
            flush_part(&mut current, code_block, &mut parts);
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(max_length) {
                parts.push(chunk.iter().collect());
            }
            continue;
        }

        let toggles = line.starts_with(CODE_FENCE);
        // Leave room for the closing fence while inside a code block
        let reserve = if code_block != toggles {
            CODE_FENCE.len() + 1
        } else {
            0
        };
        let new_length = current.chars().count() + line_len + 1 + reserve;
        if new_length > max_length && !current.is_empty() {
            flush_part(&mut current, code_block, &mut parts);
        }

        if toggles {
            code_block = !code_block;
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() && current.trim() != CODE_FENCE {
        parts.push(current.trim_end().to_string());
    }

    parts
}

fn flush_part(current: &mut String, code_block: bool, parts: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    if code_block {
        current.push_str(CODE_FENCE);
        current.push('\n');
    }
    parts.push(current.trim_end().to_string());
    current.clear();
    if code_block {
        current.push_str(CODE_FENCE);
        current.push('\n');
    }
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use ocb_poll_bot::utils::truncate_str;
/// assert_eq!(truncate_str("Game night!", 4), "Game");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a platform API operation with exponential backoff.
///
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max retries: 3
///
/// # Examples
///
/// ```no_run
/// use ocb_poll_bot::utils::retry_platform_operation;
/// use anyhow::Result;
///
/// async fn post() -> Result<u64> {
///     Ok(1)
/// }
///
/// # async fn example() -> Result<()> {
/// let id = retry_platform_operation(|| async { post().await }).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error if every attempt fails.
pub async fn retry_platform_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        PLATFORM_API_INITIAL_BACKOFF_MS, PLATFORM_API_MAX_BACKOFF_MS, PLATFORM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(PLATFORM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(PLATFORM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(PLATFORM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Platform API operation failed after {} retries: {}",
            PLATFORM_API_MAX_RETRIES, e
        );
        e
    })
}
