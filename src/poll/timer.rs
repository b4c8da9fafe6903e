//! Single-slot cancellable timers.
//!
//! Each timer is a spawned sleep racing a [`CancellationToken`]. Arming
//! cancels whatever was armed before and bumps a generation counter; the
//! firing carries that generation so a late delivery from a cancelled timer
//! can be recognised and dropped by the owner.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
struct Armed {
    generation: u64,
    token: CancellationToken,
    deadline: Instant,
}

/// A timer slot holding at most one pending firing
#[derive(Debug)]
pub struct ArmedTimer {
    name: &'static str,
    generation: u64,
    slot: Option<Armed>,
}

impl ArmedTimer {
    /// Empty slot; `name` is used in logs only
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            slot: None,
        }
    }

    /// Arm the timer, replacing any pending firing.
    ///
    /// After `delay` the message built by `make(generation)` is sent on `tx`.
    /// Returns the generation of the new firing.
    pub fn arm<T, F>(&mut self, delay: Duration, tx: mpsc::Sender<T>, make: F) -> u64
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        let child = token.clone();
        let name = self.name;

        tokio::spawn(async move {
            tokio::select! {
                () = child.cancelled() => {
                    debug!("{} timer generation {} cancelled", name, generation);
                }
                () = tokio::time::sleep(delay) => {
                    if tx.send(make(generation)).await.is_err() {
                        warn!("{} timer fired after its receiver was dropped", name);
                    }
                }
            }
        });

        self.slot = Some(Armed {
            generation,
            token,
            deadline: Instant::now() + delay,
        });
        generation
    }

    /// Cancel the pending firing, if any
    pub fn cancel(&mut self) {
        if let Some(armed) = self.slot.take() {
            armed.token.cancel();
        }
    }

    /// Clear the slot if `generation` is the armed one.
    ///
    /// Returns `false` for a stale firing, which the caller should ignore.
    pub fn take_if_current(&mut self, generation: u64) -> bool {
        match &self.slot {
            Some(armed) if armed.generation == generation => {
                self.slot = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a firing is pending
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// When the pending firing is due
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.slot.as_ref().map(|armed| armed.deadline)
    }
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
