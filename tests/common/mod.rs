//! In-memory collaborators for lifecycle tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use ocb_poll_bot::config::Settings;
use ocb_poll_bot::platform::{
    ChannelId, ChatPlatform, EmojiKey, GuildId, HistoryOrder, MessageEdit, MessageId,
    OutgoingMessage, PlatformError, PlatformMessage, RoleId, UserId, UserProfile,
};
use ocb_poll_bot::poll::schedule::Clock;
use ocb_poll_bot::poll::PollDeps;
use ocb_poll_bot::render::cache::ImageCache;
use ocb_poll_bot::render::source::{FetchError, ImageKey, ImageSource};
use ocb_poll_bot::render::{EmojiArt, TableGeometry, TableRenderer};
use ocb_poll_bot::templates::{TemplateDocument, TemplateError, TemplateStore};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const POLL_CHANNEL: ChannelId = ChannelId(1);
pub const DUMP_CHANNEL: ChannelId = ChannelId(2);

/// Friday 16 October 2026, 10:00
pub fn friday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0)
        .single()
        .expect("valid instant")
}

pub fn settings() -> Settings {
    Settings {
        token: "test-token".into(),
        guild_id: 99,
        channel_name: "games".into(),
        dump_channel_name: "games-dump".into(),
        notify_role_id: None,
        log_level: "debug".into(),
        template_file: PathBuf::from("poll_messages.yaml"),
        emoji_dir: PathBuf::from("data/emoji"),
        use_remote_emoji: false,
        debounce_secs: 10,
    }
}

pub fn user(id: u64, name: &str) -> UserProfile {
    UserProfile {
        id: UserId(id),
        name: name.into(),
        avatar_url: format!("https://cdn.test/avatars/{id}.png"),
    }
}

pub fn thumb_up() -> EmojiKey {
    EmojiKey::Unicode("👍".into())
}

pub fn game(id: u64, name: &str) -> EmojiKey {
    EmojiKey::Custom {
        id,
        name: name.into(),
        animated: false,
    }
}

/// Clock stopped at one instant; local time equals UTC
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }

    fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.naive_utc()
    }
}

/// Clock that advances with tokio time and can fall behind it
pub struct DriftingClock {
    start: DateTime<Utc>,
    origin: tokio::time::Instant,
    lag: Mutex<chrono::Duration>,
}

impl DriftingClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
            lag: Mutex::new(chrono::Duration::zero()),
        }
    }

    /// From now on the wall clock reads `lag` behind tokio time
    pub fn fall_behind(&self, lag: chrono::Duration) {
        *self.lag.lock().expect("clock lock") = lag;
    }
}

impl Clock for DriftingClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.start + elapsed - *self.lag.lock().expect("clock lock")
    }

    fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.naive_utc()
    }
}

#[derive(Default)]
struct FakeState {
    /// Channel contents, oldest first
    channels: HashMap<ChannelId, Vec<PlatformMessage>>,
    /// Reactions per message in the order they were first placed
    reactions: HashMap<MessageId, Vec<(EmojiKey, Vec<UserProfile>)>>,
    next_id: u64,
    sends: Vec<(ChannelId, OutgoingMessage)>,
    edits: Vec<(ChannelId, MessageId, MessageEdit)>,
    deletes: Vec<(ChannelId, MessageId)>,
    fetches: usize,
}

/// In-memory chat service with two channels
pub struct FakePlatform {
    state: Mutex<FakeState>,
    now: DateTime<Utc>,
}

impl FakePlatform {
    pub fn new(now: DateTime<Utc>) -> Self {
        let state = FakeState {
            next_id: 1000,
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
            now,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake platform lock")
    }

    /// Add a message as if posted at `created_at`
    pub fn seed(&self, channel: ChannelId, content: &str, created_at: DateTime<Utc>) -> MessageId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        state.channels.entry(channel).or_default().push(PlatformMessage {
            id,
            channel_id: channel,
            created_at,
            content: content.into(),
            is_system: false,
            reactions: Vec::new(),
            attachment_urls: Vec::new(),
        });
        id
    }

    /// Add a join notice
    pub fn seed_system(&self, channel: ChannelId, created_at: DateTime<Utc>) -> MessageId {
        let id = self.seed(channel, "", created_at);
        let mut state = self.lock();
        if let Some(message) = state
            .channels
            .get_mut(&channel)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == id))
        {
            message.is_system = true;
        }
        id
    }

    /// `who` reacts to `message` with `emoji`
    pub fn react(&self, message: MessageId, emoji: &EmojiKey, who: &UserProfile) {
        let mut state = self.lock();
        let reactions = state.reactions.entry(message).or_default();
        match reactions.iter_mut().find(|(e, _)| e == emoji) {
            Some((_, users)) => users.push(who.clone()),
            None => reactions.push((emoji.clone(), vec![who.clone()])),
        }
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<PlatformMessage> {
        self.lock().channels.get(&channel).cloned().unwrap_or_default()
    }

    pub fn sends(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.lock().sends.clone()
    }

    pub fn sends_to(&self, channel: ChannelId) -> Vec<OutgoingMessage> {
        self.sends()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn edits(&self) -> Vec<(ChannelId, MessageId, MessageEdit)> {
        self.lock().edits.clone()
    }

    pub fn deletes(&self) -> Vec<(ChannelId, MessageId)> {
        self.lock().deletes.clone()
    }

    /// Single-message reads attempted so far
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    fn with_reactions(&self, state: &FakeState, mut message: PlatformMessage) -> PlatformMessage {
        message.reactions = state
            .reactions
            .get(&message.id)
            .map(|r| r.iter().map(|(e, _)| e.clone()).collect())
            .unwrap_or_default();
        message
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn resolve_channel(&self, _guild: GuildId, name: &str) -> Result<ChannelId, PlatformError> {
        match name {
            "games" => Ok(POLL_CHANNEL),
            "games-dump" => Ok(DUMP_CHANNEL),
            other => Err(PlatformError::NotFound(format!("channel #{other}"))),
        }
    }

    async fn resolve_role(&self, _guild: GuildId, role: RoleId) -> Result<RoleId, PlatformError> {
        Err(PlatformError::NotFound(format!("role {role}")))
    }

    async fn channel_history(
        &self,
        channel: ChannelId,
        order: HistoryOrder,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let state = self.lock();
        let mut messages: Vec<PlatformMessage> = state
            .channels
            .get(&channel)
            .map(|m| m.iter().map(|m| self.with_reactions(&state, m.clone())).collect())
            .unwrap_or_default();
        if order == HistoryOrder::NewestFirst {
            messages.reverse();
        }
        Ok(messages)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<PlatformMessage, PlatformError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        let posted = PlatformMessage {
            id,
            channel_id: channel,
            created_at: self.now,
            content: message.content.clone(),
            is_system: false,
            reactions: Vec::new(),
            attachment_urls: message
                .attachment
                .iter()
                .map(|a| format!("https://cdn.test/{id}/{}", a.filename))
                .collect(),
        };
        state.channels.entry(channel).or_default().push(posted.clone());
        state.sends.push((channel, message));
        Ok(posted)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if let (Some(target), MessageEdit::Content(content)) = (
            state
                .channels
                .get_mut(&channel)
                .and_then(|messages| messages.iter_mut().find(|m| m.id == message)),
            &edit,
        ) {
            target.content = content.clone();
        }
        state.edits.push((channel, message, edit));
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        let messages = state.channels.entry(channel).or_default();
        let before = messages.len();
        messages.retain(|m| m.id != message);
        if messages.len() == before {
            return Err(PlatformError::NotFound(format!("message {message}")));
        }
        state.deletes.push((channel, message));
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<PlatformMessage, PlatformError> {
        let mut state = self.lock();
        state.fetches += 1;
        let found = state
            .channels
            .get(&channel)
            .and_then(|messages| messages.iter().find(|m| m.id == message))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))?;
        Ok(self.with_reactions(&state, found))
    }

    async fn reaction_users(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &EmojiKey,
    ) -> Result<Vec<UserProfile>, PlatformError> {
        Ok(self
            .lock()
            .reactions
            .get(&message)
            .and_then(|r| r.iter().find(|(e, _)| e == emoji))
            .map(|(_, users)| users.clone())
            .unwrap_or_default())
    }

    fn custom_emoji_url(&self, emoji: &EmojiKey) -> Option<String> {
        match emoji {
            EmojiKey::Custom { id, .. } => Some(format!("https://cdn.test/emojis/{id}.png")),
            EmojiKey::Unicode(_) => None,
        }
    }
}

/// Template store held in memory
pub struct MemoryTemplates {
    document: Mutex<Option<TemplateDocument>>,
    saves: AtomicUsize,
}

impl MemoryTemplates {
    pub fn new(document: Option<TemplateDocument>) -> Self {
        Self {
            document: Mutex::new(document),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Option<TemplateDocument> {
        self.document.lock().expect("templates lock").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplates {
    async fn load(&self) -> Result<TemplateDocument, TemplateError> {
        self.current().ok_or_else(|| TemplateError::Io {
            path: PathBuf::from("memory"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no document"),
        })
    }

    async fn save(&self, document: &TemplateDocument) -> Result<(), TemplateError> {
        *self.document.lock().expect("templates lock") = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every key resolves to the same small PNG
pub struct SolidSource {
    fetches: AtomicUsize,
}

impl SolidSource {
    pub fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub fn png(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode test png");
    Bytes::from(buf.into_inner())
}

#[async_trait]
impl ImageSource for SolidSource {
    async fn fetch(&self, _key: &ImageKey) -> Result<Bytes, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(png(16, 16))
    }
}

pub fn geometry() -> TableGeometry {
    TableGeometry {
        padding: 2,
        square_size: 16,
        square_padding: 1,
    }
}

pub fn renderer(source: Arc<dyn ImageSource>) -> TableRenderer {
    let geometry = geometry();
    TableRenderer::new(
        ImageCache::new(source, geometry.square_size, 100),
        geometry,
        EmojiArt {
            emoji_dir: PathBuf::from("data/emoji"),
            use_remote: false,
            cdn_template: "https://cdn.test/twemoji/{}".into(),
        },
    )
}

pub fn templates() -> TemplateDocument {
    serde_yaml::from_str(
        "scheduled_messages: []\nrandom_messages:\n  - Bring snacks!\n  - New box just arrived.\ndefault_message: Games?\n",
    )
    .expect("valid template fixture")
}

pub fn deps(platform: Arc<FakePlatform>, templates: Arc<MemoryTemplates>) -> PollDeps {
    deps_with_clock(platform, templates, Arc::new(FixedClock(friday_morning())))
}

pub fn deps_with_clock(
    platform: Arc<FakePlatform>,
    templates: Arc<MemoryTemplates>,
    clock: Arc<dyn Clock>,
) -> PollDeps {
    PollDeps {
        platform,
        templates,
        renderer: Arc::new(renderer(Arc::new(SolidSource::new()))),
        clock,
    }
}
