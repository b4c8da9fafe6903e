//! Poll lifecycle state machine.
//!
//! A single actor owns the active poll id and both timers. Reaction events,
//! timer firings and shutdown all arrive on one channel, so no state is shared
//! between tasks.

use super::archive::ResultsArchiver;
use super::attendance::{collect_attendance, AttendanceTable};
use super::schedule::{next_reset, resolve_relative, Clock};
use super::timer::ArmedTimer;
use crate::config::{
    Settings, LAST_GAME_DATE_EXPR, NEXT_GAME_DATE_EXPR, PLATFORM_FETCH_TIMEOUT_SECS, POLL_PERIOD_DAYS,
    POLL_TABLE_MARKER, POLL_TAG, RESET_HOUR, RESET_WEEKDAY, TABLE_FILE_NAME,
};
use crate::platform::resilient::send_message_resilient;
use crate::platform::{
    Attachment, ChannelId, ChatPlatform, GuildId, HistoryOrder, MessageEdit, MessageId,
    OutgoingMessage, PlatformError, PlatformMessage, ReactionEvent, RoleId,
};
use crate::render::{RenderError, TableRenderer};
use crate::templates::{TemplateStore, FALLBACK_BODY};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

/// Errors raised by the poll lifecycle
#[derive(Error, Debug)]
pub enum PollError {
    /// Guild, channel or role is missing, or the first poll cannot be posted
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A platform call failed
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// A send failed after retries
    #[error("Send failed: {0}")]
    Send(String),
    /// The table image could not be produced
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Uninitialized,
    /// Searching the poll channel
    Locating,
    /// No poll found, posting the first one
    CreatingInitial,
    /// Watching a poll
    Active,
    /// Archiving and replacing the poll
    Resetting,
    /// Shut down
    Stopped,
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollCommand {
    /// A reaction was added or removed somewhere in the guild
    Reaction(ReactionEvent),
    /// The debounce timer of the given generation fired
    DebounceElapsed(u64),
    /// The reset timer of the given generation fired
    ResetElapsed(u64),
    /// Stop processing
    Shutdown,
}

/// Sender side used by the gateway handler
#[derive(Debug, Clone)]
pub struct PollHandle {
    tx: mpsc::Sender<PollCommand>,
}

impl PollHandle {
    /// Forward a reaction event
    pub async fn reaction_changed(&self, event: ReactionEvent) {
        if self.tx.send(PollCommand::Reaction(event)).await.is_err() {
            warn!("Poll actor is gone; dropping reaction event");
        }
    }

    /// Ask the actor to stop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(PollCommand::Shutdown).await;
    }
}

/// Collaborators injected into the state machine
#[derive(Clone)]
pub struct PollDeps {
    pub platform: Arc<dyn ChatPlatform>,
    pub templates: Arc<dyn TemplateStore>,
    pub renderer: Arc<TableRenderer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
struct Channels {
    poll: ChannelId,
    dump: ChannelId,
}

/// Owner of the weekly poll
pub struct PollStateMachine {
    settings: Settings,
    deps: PollDeps,
    phase: PollPhase,
    channels: Option<Channels>,
    active_poll: Option<MessageId>,
    debounce: ArmedTimer,
    reset: ArmedTimer,
    /// Local time the armed reset is due at
    reset_due: Option<NaiveDateTime>,
    tx: mpsc::Sender<PollCommand>,
    rx: mpsc::Receiver<PollCommand>,
    rng: StdRng,
}

/// Run `fut` under the platform fetch timeout
async fn within_fetch_timeout<T, F>(fut: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    tokio::time::timeout(Duration::from_secs(PLATFORM_FETCH_TIMEOUT_SECS), fut)
        .await
        .map_err(|_| PlatformError::Timeout(PLATFORM_FETCH_TIMEOUT_SECS))?
}

/// Earliest message in `channel` carrying the poll tag.
///
/// # Errors
///
/// Returns an error if the history cannot be read.
pub async fn find_poll_message(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
) -> Result<Option<PlatformMessage>, PlatformError> {
    let history =
        within_fetch_timeout(platform.channel_history(channel, HistoryOrder::OldestFirst)).await?;
    let mut candidates = crate::platform::filter_history(history, |m| {
        !m.is_system && m.content.contains(POLL_TAG)
    });

    if candidates.len() > 1 {
        warn!(
            "Found {} possible poll messages, will guess at the earliest: {}",
            candidates.len(),
            candidates[0].id
        );
    }
    Ok(if candidates.is_empty() {
        None
    } else {
        Some(candidates.swap_remove(0))
    })
}

/// Messages a poll-channel reset deletes.
///
/// Every non-system message except the leading one, plus the leading one when
/// it is itself a poll.
///
/// # Errors
///
/// Returns an error if the history cannot be read.
pub async fn clearable_messages(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
) -> Result<Vec<PlatformMessage>, PlatformError> {
    let history =
        within_fetch_timeout(platform.channel_history(channel, HistoryOrder::OldestFirst)).await?;
    Ok(crate::platform::filter_history(history, |m| !m.is_system)
        .into_iter()
        .enumerate()
        .filter(|(i, m)| *i > 0 || m.content.contains(POLL_TAG))
        .map(|(_, m)| m)
        .collect())
}

/// Read the live reactions of a poll message into an attendance table.
///
/// # Errors
///
/// Returns an error if the message or its reactions cannot be fetched in time.
pub async fn fetch_attendance(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    message: MessageId,
) -> Result<AttendanceTable, PlatformError> {
    let message = within_fetch_timeout(platform.fetch_message(channel, message)).await?;
    within_fetch_timeout(collect_attendance(platform, &message)).await
}

impl PollStateMachine {
    /// Build the machine and the handle that feeds it
    #[must_use]
    pub fn new(settings: Settings, deps: PollDeps) -> (Self, PollHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = PollHandle { tx: tx.clone() };
        let machine = Self {
            settings,
            deps,
            phase: PollPhase::Uninitialized,
            channels: None,
            active_poll: None,
            debounce: ArmedTimer::new("debounce"),
            reset: ArmedTimer::new("reset"),
            reset_due: None,
            tx,
            rx,
            rng: StdRng::from_entropy(),
        };
        (machine, handle)
    }

    /// Replace the template picker's random source
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Id of the poll being watched
    #[must_use]
    pub const fn active_poll(&self) -> Option<MessageId> {
        self.active_poll
    }

    /// Start, then process commands until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the startup error; after a successful start this only returns
    /// `Ok` on shutdown.
    pub async fn run(mut self) -> Result<(), PollError> {
        self.start().await?;
        self.event_loop().await;
        Ok(())
    }

    /// Locate or create the poll and arm the reset timer.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Configuration`] if the guild, a channel or the
    /// notify role cannot be resolved, or the first poll cannot be posted.
    pub async fn start(&mut self) -> Result<(), PollError> {
        self.phase = PollPhase::Locating;
        let channels = self.resolve_channels().await?;
        info!(
            "Running in guild {}, channel {}, dump channel {}",
            self.settings.guild_id, channels.poll, channels.dump
        );

        let found = find_poll_message(self.deps.platform.as_ref(), channels.poll)
            .await
            .map_err(|e| PollError::Configuration(format!("Could not read poll channel: {e}")))?;

        match found {
            None => {
                info!("Didn't find a poll message on startup, posting a new one");
                self.phase = PollPhase::CreatingInitial;
                let id = self.create_poll().await.map_err(|e| {
                    PollError::Configuration(format!("Could not post the initial poll: {e}"))
                })?;
                self.active_poll = Some(id);
            }
            Some(message) if self.is_stale(&message) => {
                info!("Poll message {} is stale, resetting now", message.id);
                self.active_poll = Some(message.id);
                self.reset_poll().await.map_err(|e| {
                    PollError::Configuration(format!("Could not replace the stale poll: {e}"))
                })?;
            }
            Some(message) => {
                info!("Found poll message with ID: {}", message.id);
                self.active_poll = Some(message.id);
            }
        }

        self.arm_reset_timer();
        self.phase = PollPhase::Active;
        Ok(())
    }

    /// Process commands until [`PollCommand::Shutdown`]
    pub async fn event_loop(&mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                PollCommand::Reaction(event) => self.on_reaction_changed(&event),
                PollCommand::DebounceElapsed(generation) => {
                    if self.debounce.take_if_current(generation) {
                        if let Err(e) = self.update_table().await {
                            error!("Failed to update poll table: {}", e);
                        }
                    } else {
                        debug!("Ignoring stale debounce firing {}", generation);
                    }
                }
                PollCommand::ResetElapsed(generation) => {
                    if self.reset.take_if_current(generation) {
                        if let Err(e) = self.reset_poll().await {
                            error!("Poll reset failed: {}", e);
                        }
                        self.arm_reset_timer();
                        self.phase = PollPhase::Active;
                    }
                }
                PollCommand::Shutdown => break,
            }
        }

        self.debounce.cancel();
        self.reset.cancel();
        self.phase = PollPhase::Stopped;
        info!("Poll state machine stopped");
    }

    /// Resolve the poll and dump channels and check the notify role.
    async fn resolve_channels(&mut self) -> Result<Channels, PollError> {
        let platform = self.deps.platform.as_ref();
        let guild = GuildId(self.settings.guild_id);

        let poll = platform
            .resolve_channel(guild, &self.settings.channel_name)
            .await
            .map_err(|e| PollError::Configuration(format!("Poll channel: {e}")))?;
        let dump = platform
            .resolve_channel(guild, &self.settings.dump_channel_name)
            .await
            .map_err(|e| PollError::Configuration(format!("Dump channel: {e}")))?;

        if let Some(role) = self.settings.notify_role_id {
            platform
                .resolve_role(guild, RoleId(role))
                .await
                .map_err(|e| PollError::Configuration(format!("Notify role: {e}")))?;
        }

        let channels = Channels { poll, dump };
        self.channels = Some(channels);
        Ok(channels)
    }

    fn channels(&self) -> Result<Channels, PollError> {
        self.channels
            .ok_or_else(|| PollError::Configuration("Channels are not resolved".into()))
    }

    fn is_stale(&self, message: &PlatformMessage) -> bool {
        self.deps.clock.now() - message.created_at > ChronoDuration::days(POLL_PERIOD_DAYS)
    }

    fn on_reaction_changed(&mut self, event: &ReactionEvent) {
        if self.active_poll != Some(event.message_id) {
            return;
        }
        debug!("{} {:?} on the poll", event.emoji, event.kind);
        self.debounce.arm(
            self.settings.debounce(),
            self.tx.clone(),
            PollCommand::DebounceElapsed,
        );
    }

    fn arm_reset_timer(&mut self) {
        let now = self.deps.clock.now_local();
        // A firing may land before its slot in local time; never re-arm for that slot
        let from = self.reset_due.take().map_or(now, |due| now.max(due));
        let at = next_reset(from, RESET_WEEKDAY, RESET_HOUR);
        let delay = (at - now).to_std().unwrap_or_default();
        self.reset_due = Some(at);
        info!(
            "Set reset timer to expire at around {} - {} seconds from now",
            at,
            delay.as_secs()
        );
        self.reset.arm(delay, self.tx.clone(), PollCommand::ResetElapsed);
    }

    /// Redraw the table from the poll's live reactions.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching, rendering or posting fails; the poll is
    /// left as it was.
    pub async fn update_table(&mut self) -> Result<(), PollError> {
        let Some(poll) = self.active_poll else {
            return Ok(());
        };
        let channels = self.channels()?;
        let platform = self.deps.platform.as_ref();
        info!("Updating poll table now");

        let table = fetch_attendance(platform, channels.poll, poll).await?;
        let png = self.deps.renderer.render_png(&table).await?;

        let artifact = OutgoingMessage {
            content: POLL_TABLE_MARKER.to_string(),
            attachment: Some(Attachment {
                filename: TABLE_FILE_NAME.to_string(),
                data: png,
            }),
        };
        let sent = send_message_resilient(platform, channels.dump, artifact)
            .await
            .map_err(|e| PollError::Send(e.to_string()))?;
        let url = sent
            .attachment_urls
            .first()
            .cloned()
            .ok_or_else(|| PollError::Send("Uploaded table has no attachment URL".into()))?;

        platform
            .edit_message(channels.poll, poll, MessageEdit::EmbedImage(url))
            .await?;
        self.sweep_artifacts(channels.dump, sent.id).await?;

        info!("Poll table successfully updated");
        Ok(())
    }

    /// Delete every table artifact in the dump channel except `keep`
    async fn sweep_artifacts(&self, dump: ChannelId, keep: MessageId) -> Result<(), PollError> {
        let platform = self.deps.platform.as_ref();
        let history =
            within_fetch_timeout(platform.channel_history(dump, HistoryOrder::OldestFirst)).await?;
        let stale = crate::platform::filter_history(history, |m| {
            !m.is_system && m.id != keep && m.content.starts_with(POLL_TABLE_MARKER)
        });

        for message in stale {
            if let Err(e) = platform.delete_message(dump, message.id).await {
                warn!("Failed to delete old table {}: {}", message.id, e);
            }
        }
        Ok(())
    }

    /// Archive the results, clear the poll channel and post a new poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be read or the new poll cannot
    /// be sent. A failed archive is logged and does not stop the reset.
    pub async fn reset_poll(&mut self) -> Result<(), PollError> {
        self.phase = PollPhase::Resetting;
        self.debounce.cancel();
        let channels = self.channels()?;
        info!("Resetting poll");

        if let Some(poll) = self.active_poll {
            self.archive_results(channels, poll).await;
        }

        let platform = self.deps.platform.as_ref();
        for message in clearable_messages(platform, channels.poll).await? {
            if let Err(e) = platform.delete_message(channels.poll, message.id).await {
                warn!("Failed to delete message {}: {}", message.id, e);
            }
        }

        self.active_poll = None;
        let id = self.create_poll().await?;
        self.active_poll = Some(id);
        Ok(())
    }

    async fn archive_results(&self, channels: Channels, poll: MessageId) {
        let platform = self.deps.platform.as_ref();
        let table = match fetch_attendance(platform, channels.poll, poll).await {
            Ok(table) => table,
            Err(e) => {
                error!("Could not read final results of poll {}: {}", poll, e);
                return;
            }
        };

        let archiver = ResultsArchiver::new(Arc::clone(&self.deps.platform), channels.dump);
        let date = self.deps.clock.now_local().date();
        if let Err(e) = archiver.archive(&table, date).await {
            error!("Failed to archive results of poll {}: {}", poll, e);
        }
    }

    /// Post a new poll message and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the game dates cannot be resolved or the message
    /// cannot be sent.
    pub async fn create_poll(&mut self) -> Result<MessageId, PollError> {
        let channels = self.channels()?;
        let now = self.deps.clock.now_local();
        let last = resolve_relative(LAST_GAME_DATE_EXPR, now).ok_or_else(|| {
            PollError::Configuration(format!("Could not parse {LAST_GAME_DATE_EXPR} as a date"))
        })?;
        let next = resolve_relative(NEXT_GAME_DATE_EXPR, now).ok_or_else(|| {
            PollError::Configuration(format!("Could not parse {NEXT_GAME_DATE_EXPR} as a date"))
        })?;

        let (body, remainder) = match self.deps.templates.load().await {
            Ok(document) => {
                let pick = document.pick_body_for(last, next, now, &mut self.rng);
                debug!("Picked {:?} poll message", pick.source);
                (pick.body, Some(pick.document))
            }
            Err(e) => {
                error!("Could not load poll templates, using the fallback body: {}", e);
                (FALLBACK_BODY.to_string(), None)
            }
        };

        let content = format!(
            "{POLL_TAG} {}\n{body}\n\n**Games? {}**",
            self.settings.mention(),
            next.format("%d/%m/%Y")
        );
        let sent = send_message_resilient(
            self.deps.platform.as_ref(),
            channels.poll,
            OutgoingMessage::text(content),
        )
        .await
        .map_err(|e| PollError::Send(e.to_string()))?;
        info!("Posted poll message {}", sent.id);

        if let Some(document) = remainder {
            if let Err(e) = self.deps.templates.save(&document).await {
                error!("Failed to save poll templates: {}", e);
            }
        }
        Ok(sent.id)
    }

    /// Resolve channels without starting; used by one-shot tools.
    ///
    /// # Errors
    ///
    /// Same as [`PollStateMachine::start`] for resolution failures.
    pub async fn prepare(&mut self) -> Result<(ChannelId, ChannelId), PollError> {
        let channels = self.resolve_channels().await?;
        Ok((channels.poll, channels.dump))
    }
}
