//! Discord implementation of [`ChatPlatform`] on the serenity HTTP client.

use super::{
    ChannelId, ChatPlatform, EmojiKey, GuildId, HistoryOrder, MessageEdit, MessageId,
    OutgoingMessage, PlatformError, PlatformMessage, ReactionEvent, ReactionKind, RoleId, UserId,
    UserProfile,
};
use crate::config::CUSTOM_EMOJI_CDN_BASE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId as SChannelId, CreateAttachment, CreateEmbed, CreateMessage, EditMessage, EmojiId,
    GetMessages, GuildId as SGuildId, Http, Message, MessageId as SMessageId, MessageType,
    Reaction, ReactionType, RoleId as SRoleId, User, UserId as SUserId,
};
use std::sync::Arc;
use tracing::debug;

/// Page size for history and reaction listing
const PAGE_SIZE: u8 = 100;

fn request_error(e: &serenity::Error) -> PlatformError {
    PlatformError::Request(e.to_string())
}

/// Map a serenity reaction emoji to an [`EmojiKey`]
#[must_use]
pub fn emoji_key(reaction: &ReactionType) -> Option<EmojiKey> {
    match reaction {
        ReactionType::Unicode(s) => Some(EmojiKey::Unicode(s.clone())),
        ReactionType::Custom { animated, id, name } => Some(EmojiKey::Custom {
            id: id.get(),
            name: name.clone().unwrap_or_default(),
            animated: *animated,
        }),
        _ => None,
    }
}

fn reaction_type(emoji: &EmojiKey) -> ReactionType {
    match emoji {
        EmojiKey::Unicode(s) => ReactionType::Unicode(s.clone()),
        EmojiKey::Custom { id, name, animated } => ReactionType::Custom {
            animated: *animated,
            id: EmojiId::new(*id),
            name: Some(name.clone()),
        },
    }
}

/// Map a gateway reaction to a [`ReactionEvent`]
#[must_use]
pub fn reaction_event(reaction: &Reaction, kind: ReactionKind) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        message_id: MessageId(reaction.message_id.get()),
        emoji: emoji_key(&reaction.emoji)?,
        user_id: reaction.user_id.map(|id| UserId(id.get())),
        kind,
    })
}

fn profile(user: &User) -> UserProfile {
    UserProfile {
        id: UserId(user.id.get()),
        name: user.global_name.clone().unwrap_or_else(|| user.name.clone()),
        avatar_url: user.face(),
    }
}

fn platform_message(message: &Message) -> PlatformMessage {
    PlatformMessage {
        id: MessageId(message.id.get()),
        channel_id: ChannelId(message.channel_id.get()),
        created_at: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now),
        content: message.content.clone(),
        is_system: !matches!(message.kind, MessageType::Regular | MessageType::InlineReply),
        reactions: message
            .reactions
            .iter()
            .filter_map(|r| emoji_key(&r.reaction_type))
            .collect(),
        attachment_urls: message.attachments.iter().map(|a| a.url.clone()).collect(),
    }
}

/// Discord over the serenity HTTP client
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    /// Wrap an existing client, e.g. the gateway client's
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// HTTP-only client for one-shot tools
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        Self::new(Arc::new(Http::new(token)))
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn resolve_channel(&self, guild: GuildId, name: &str) -> Result<ChannelId, PlatformError> {
        let channels = SGuildId::new(guild.0)
            .channels(&*self.http)
            .await
            .map_err(|e| request_error(&e))?;
        channels
            .values()
            .find(|c| c.name == name)
            .map(|c| ChannelId(c.id.get()))
            .ok_or_else(|| PlatformError::NotFound(format!("channel #{name} in guild {guild}")))
    }

    async fn resolve_role(&self, guild: GuildId, role: RoleId) -> Result<RoleId, PlatformError> {
        let roles = SGuildId::new(guild.0)
            .roles(&*self.http)
            .await
            .map_err(|e| request_error(&e))?;
        if roles.contains_key(&SRoleId::new(role.0)) {
            Ok(role)
        } else {
            Err(PlatformError::NotFound(format!("role {role} in guild {guild}")))
        }
    }

    async fn channel_history(
        &self,
        channel: ChannelId,
        order: HistoryOrder,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let channel_id = SChannelId::new(channel.0);
        let mut messages = Vec::new();
        let mut before: Option<SMessageId> = None;

        // Pages arrive newest first
        loop {
            let mut request = GetMessages::new().limit(PAGE_SIZE);
            if let Some(id) = before {
                request = request.before(id);
            }
            let page = channel_id
                .messages(&*self.http, request)
                .await
                .map_err(|e| request_error(&e))?;
            let done = page.len() < usize::from(PAGE_SIZE);
            before = page.last().map(|m| m.id);
            messages.extend(page.iter().map(platform_message));
            if done || before.is_none() {
                break;
            }
        }
        debug!("Read {} messages from channel {}", messages.len(), channel);

        if order == HistoryOrder::OldestFirst {
            messages.reverse();
        }
        Ok(messages)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<PlatformMessage, PlatformError> {
        let mut builder = CreateMessage::new().content(message.content);
        if let Some(attachment) = message.attachment {
            builder = builder.add_file(CreateAttachment::bytes(
                attachment.data.to_vec(),
                attachment.filename,
            ));
        }
        let sent = SChannelId::new(channel.0)
            .send_message(&*self.http, builder)
            .await
            .map_err(|e| request_error(&e))?;
        Ok(platform_message(&sent))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), PlatformError> {
        let builder = match edit {
            MessageEdit::Content(content) => EditMessage::new().content(content),
            MessageEdit::EmbedImage(url) => EditMessage::new().embed(CreateEmbed::new().image(url)),
        };
        SChannelId::new(channel.0)
            .edit_message(&*self.http, SMessageId::new(message.0), builder)
            .await
            .map_err(|e| request_error(&e))?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        SChannelId::new(channel.0)
            .delete_message(&*self.http, SMessageId::new(message.0))
            .await
            .map_err(|e| request_error(&e))
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<PlatformMessage, PlatformError> {
        let fetched = SChannelId::new(channel.0)
            .message(&*self.http, SMessageId::new(message.0))
            .await
            .map_err(|e| request_error(&e))?;
        Ok(platform_message(&fetched))
    }

    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &EmojiKey,
    ) -> Result<Vec<UserProfile>, PlatformError> {
        let channel_id = SChannelId::new(channel.0);
        let message_id = SMessageId::new(message.0);
        let mut users = Vec::new();
        let mut after: Option<SUserId> = None;

        loop {
            let page = channel_id
                .reaction_users(
                    &*self.http,
                    message_id,
                    reaction_type(emoji),
                    Some(PAGE_SIZE),
                    after,
                )
                .await
                .map_err(|e| request_error(&e))?;
            let done = page.len() < usize::from(PAGE_SIZE);
            after = page.last().map(|u| u.id);
            users.extend(page.iter().map(profile));
            if done || after.is_none() {
                break;
            }
        }
        Ok(users)
    }

    fn custom_emoji_url(&self, emoji: &EmojiKey) -> Option<String> {
        match emoji {
            EmojiKey::Custom { id, animated, .. } => {
                let ext = if *animated { "gif" } else { "png" };
                Some(format!("{CUSTOM_EMOJI_CDN_BASE}/{id}.{ext}"))
            }
            EmojiKey::Unicode(_) => None,
        }
    }
}
