//! Chat platform abstraction
//!
//! The poll core only talks to the chat service through [`ChatPlatform`].
//! Identities are plain id newtypes so tables and events never hold
//! platform objects.

/// Serenity-backed Discord implementation.
pub mod discord;
/// Send wrappers with bounded retry.
pub mod resilient;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors returned by platform operations
#[derive(Error, Debug)]
pub enum PlatformError {
    /// A guild, channel or role could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),
    /// The platform rejected or failed the request
    #[error("Platform request failed: {0}")]
    Request(String),
    /// The request did not complete in time
    #[error("Platform request timed out after {0}s")]
    Timeout(u64),
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Guild (server) identity
    GuildId
);
id_newtype!(
    /// Channel identity
    ChannelId
);
id_newtype!(
    /// Message identity
    MessageId
);
id_newtype!(
    /// User identity
    UserId
);
id_newtype!(
    /// Role identity
    RoleId
);

/// Reaction emoji identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmojiKey {
    /// Standard unicode emoji, stored as its character sequence
    Unicode(String),
    /// Guild emoji uploaded to the platform
    Custom {
        /// Emoji id
        id: u64,
        /// Emoji name
        name: String,
        /// Whether the asset is animated
        animated: bool,
    },
}

impl EmojiKey {
    /// Stable identity string: the unicode sequence or `name:id`
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::Unicode(s) => s.clone(),
            Self::Custom { id, name, .. } => format!("{name}:{id}"),
        }
    }

    /// Human label used by the text table
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Unicode(s) => s.clone(),
            Self::Custom { name, .. } => format!(":{name}:"),
        }
    }

    /// Whether this is the given unicode emoji
    #[must_use]
    pub fn is_unicode(&self, emoji: &str) -> bool {
        matches!(self, Self::Unicode(s) if s == emoji)
    }
}

impl fmt::Display for EmojiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// A user as seen by the table: identity, name and avatar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// User identity
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Avatar image URL
    pub avatar_url: String,
}

/// A channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMessage {
    /// Message identity
    pub id: MessageId,
    /// Channel the message was posted in
    pub channel_id: ChannelId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Raw text
    pub content: String,
    /// Join notices, pins and other platform-generated messages
    pub is_system: bool,
    /// Distinct reactions on the message
    pub reactions: Vec<EmojiKey>,
    /// URLs of uploaded attachments
    pub attachment_urls: Vec<String>,
}

/// File attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown by the platform
    pub filename: String,
    /// File content
    pub data: Bytes,
}

/// A message to send
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    /// Text content
    pub content: String,
    /// Optional file upload
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Text-only message
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }
}

/// Change applied to an existing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEdit {
    /// Replace the text
    Content(String),
    /// Embed an image by URL
    EmbedImage(String),
}

/// Order of a history scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    /// Oldest message first
    OldestFirst,
    /// Newest message first
    NewestFirst,
}

/// Whether a reaction was added or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    /// Reaction added
    Added,
    /// Reaction removed
    Removed,
}

/// A raw reaction gateway event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    /// Message the reaction belongs to
    pub message_id: MessageId,
    /// Reaction emoji
    pub emoji: EmojiKey,
    /// Reacting user, when the platform provides it
    pub user_id: Option<UserId>,
    /// Added or removed
    pub kind: ReactionKind,
}

/// Interface to the chat service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Resolve a channel by name within a guild
    async fn resolve_channel(&self, guild: GuildId, name: &str)
        -> Result<ChannelId, PlatformError>;
    /// Check that a role exists within a guild
    async fn resolve_role(&self, guild: GuildId, role: RoleId) -> Result<RoleId, PlatformError>;
    /// Full channel history in the requested order
    async fn channel_history(
        &self,
        channel: ChannelId,
        order: HistoryOrder,
    ) -> Result<Vec<PlatformMessage>, PlatformError>;
    /// Send a message, returning it as posted
    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<PlatformMessage, PlatformError>;
    /// Edit a message
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), PlatformError>;
    /// Delete a message
    async fn delete_message(&self, channel: ChannelId, message: MessageId)
        -> Result<(), PlatformError>;
    /// Fetch a single message
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<PlatformMessage, PlatformError>;
    /// Users who placed `emoji` on a message
    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &EmojiKey,
    ) -> Result<Vec<UserProfile>, PlatformError>;
    /// Asset URL of a custom emoji; `None` for unicode emoji
    fn custom_emoji_url(&self, emoji: &EmojiKey) -> Option<String>;
}

/// Keep the messages matching `predicate`, preserving order
#[must_use]
pub fn filter_history<F>(messages: Vec<PlatformMessage>, predicate: F) -> Vec<PlatformMessage>
where
    F: Fn(&PlatformMessage) -> bool,
{
    messages.into_iter().filter(|m| predicate(m)).collect()
}
