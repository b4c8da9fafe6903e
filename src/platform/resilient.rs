//! Resilient messaging with automatic retry for platform sends.
//!
//! Only sends are retried. Fetches degrade to a skipped cycle instead.
//!
//! # Usage
//!
//! ```ignore
//! use ocb_poll_bot::platform::resilient::send_message_resilient;
//!
//! let msg = send_message_resilient(platform.as_ref(), channel, OutgoingMessage::text("Hello!")).await?;
//! ```

use super::{ChannelId, ChatPlatform, OutgoingMessage, PlatformMessage};
use anyhow::Result;

/// Send a message with automatic retry on failures.
///
/// Uses [`crate::utils::retry_platform_operation`] with exponential backoff.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    message: OutgoingMessage,
) -> Result<PlatformMessage> {
    crate::utils::retry_platform_operation(|| async {
        platform
            .send_message(channel, message.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Platform send error: {e}"))
    })
    .await
}

/// Send a long text as several messages, each under the platform limit.
///
/// Every part starts with `tag` on its own line, so each message can be
/// recognised without the others. An empty `tag` adds nothing.
///
/// # Errors
///
/// Returns an error if any part fails to send after retries.
pub async fn send_long_message(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    tag: &str,
    text: &str,
) -> Result<Vec<PlatformMessage>> {
    let header = if tag.is_empty() {
        0
    } else {
        tag.chars().count() + 1
    };
    let limit = crate::config::PLATFORM_MESSAGE_LIMIT.saturating_sub(header);
    let parts = crate::utils::split_long_message(text, limit);

    let mut sent = Vec::with_capacity(parts.len());
    for part in parts {
        let content = if tag.is_empty() {
            part
        } else {
            format!("{tag}\n{part}")
        };
        sent.push(send_message_resilient(platform, channel, OutgoingMessage::text(content)).await?);
    }
    Ok(sent)
}
