//! Gateway event handler feeding the poll state machine.

use crate::platform::discord::reaction_event;
use crate::platform::ReactionKind;
use crate::poll::{PollHandle, PollStateMachine};
use serenity::all::{Context, EventHandler, Reaction, Ready};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Starts the poll on the first `ready` and forwards reaction events to it
pub struct PollEventHandler {
    machine: Mutex<Option<PollStateMachine>>,
    handle: PollHandle,
}

impl PollEventHandler {
    #[must_use]
    pub fn new(machine: PollStateMachine, handle: PollHandle) -> Self {
        Self {
            machine: Mutex::new(Some(machine)),
            handle,
        }
    }

    /// Handle for shutting the poll down
    #[must_use]
    pub fn poll_handle(&self) -> PollHandle {
        self.handle.clone()
    }

    async fn forward(&self, reaction: &Reaction, kind: ReactionKind) {
        match reaction_event(reaction, kind) {
            Some(event) => self.handle.reaction_changed(event).await,
            None => debug!("Ignoring reaction with an unknown emoji type"),
        }
    }
}

#[serenity::async_trait]
impl EventHandler for PollEventHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);

        // Gateway reconnects fire `ready` again; the poll is only started once
        let Some(machine) = self.machine.lock().await.take() else {
            debug!("Poll already running");
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = machine.run().await {
                error!("Failed to start the poll: {}", e);
                std::process::exit(1);
            }
        });
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        self.forward(&reaction, ReactionKind::Added).await;
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        self.forward(&reaction, ReactionKind::Removed).await;
    }
}
