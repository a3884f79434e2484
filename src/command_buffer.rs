//! Latest-wins hand-off of velocity commands into the control loop.
//!
//! Commands arrive from an asynchronous path (message callback, gamepad,
//! network task) while the control loop consumes them at its own fixed rate.
//! A single slot holding the newest command is all that is needed; history is
//! worthless once a newer command exists. The slot is an atomic pointer swap
//! so neither side ever blocks or observes a half-written command.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;

use crate::kinematics::BodyTwist;

/// A received velocity command and when it arrived
#[derive(Debug, Clone, Copy)]
pub struct PendingCommand {
    pub twist: BodyTwist,
    pub stamp: Instant,
}

/// Shared single-slot buffer. Cheap to clone, every clone points at the
/// same slot.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    slot: Arc<ArcSwapOption<PendingCommand>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side handle for the command arrival path
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Newest command, if any has ever arrived. Never blocks.
    pub fn latest(&self) -> Option<PendingCommand> {
        self.slot.load_full().map(|command| *command)
    }

    /// Newest command unless its age at `now` exceeds `timeout`.
    ///
    /// A stale command stays in the slot; only its use is suppressed, so a
    /// fresh arrival right after a stale window resumes motion immediately.
    pub fn latest_fresh(&self, now: Instant, timeout: Duration) -> CommandRead {
        match self.latest() {
            None => CommandRead::Empty,
            Some(command) if now.duration_since(command.stamp) > timeout => CommandRead::Stale,
            Some(command) => CommandRead::Fresh(command),
        }
    }

    /// Drop the stored command, returning the buffer to its never-written
    /// state
    pub fn clear(&self) {
        self.slot.store(None);
    }
}

/// Outcome of a consumer read
#[derive(Debug, Clone, Copy)]
pub enum CommandRead {
    /// no command has ever arrived
    Empty,
    /// the newest command is older than the timeout
    Stale,
    Fresh(PendingCommand),
}

/// Producer handle. Overwrites the slot wholesale; an unconsumed command is
/// silently superseded.
#[derive(Debug, Clone)]
pub struct CommandSender {
    slot: Arc<ArcSwapOption<PendingCommand>>,
}

impl CommandSender {
    pub fn send(&self, twist: BodyTwist, stamp: Instant) {
        self.slot
            .store(Some(Arc::new(PendingCommand { twist, stamp })));
    }
}
