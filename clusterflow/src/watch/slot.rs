//! Single-assignment outcome slot shared by the triggers of one watch.

use crate::core::WatchOutcome;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// The source that produced (or tried to produce) an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The status read made on entry.
    Immediate,
    /// The periodic status read.
    Poll,
    /// A change notification followed by a status read.
    Stream,
    /// The deadline timer.
    Timeout,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Poll => write!(f, "poll"),
            Self::Stream => write!(f, "stream"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

struct SlotState {
    sender: Option<oneshot::Sender<WatchOutcome>>,
    resolved_by: Option<Trigger>,
    armed: Vec<(Trigger, AbortHandle)>,
}

/// Holds the outcome of one watch until the first trigger claims it.
///
/// The first [`resolve`](Self::resolve) wins. Claiming the slot aborts every
/// armed trigger task under the same lock, so no trigger can observe the slot
/// as open after another has written it.
pub struct OutcomeSlot {
    state: Mutex<SlotState>,
}

impl OutcomeSlot {
    /// Creates an open slot and the receiver its outcome is delivered to.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<WatchOutcome>) {
        let (sender, receiver) = oneshot::channel();
        let slot = Self {
            state: Mutex::new(SlotState {
                sender: Some(sender),
                resolved_by: None,
                armed: Vec::new(),
            }),
        };
        (Arc::new(slot), receiver)
    }

    /// Registers a trigger task. Aborts it at once if the slot is already claimed.
    pub fn arm(&self, trigger: Trigger, handle: AbortHandle) {
        let mut state = self.state.lock();
        if state.sender.is_none() {
            handle.abort();
        } else {
            state.armed.push((trigger, handle));
        }
    }

    /// Claims the slot with `outcome`.
    ///
    /// Returns false if another trigger got there first; `outcome` is then
    /// discarded.
    pub fn resolve(&self, trigger: Trigger, outcome: WatchOutcome) -> bool {
        let mut state = self.state.lock();
        let Some(sender) = state.sender.take() else {
            return false;
        };
        state.resolved_by = Some(trigger);
        for (_, handle) in state.armed.drain(..) {
            handle.abort();
        }
        // The waiting side may already be gone.
        let _ = sender.send(outcome);
        true
    }

    /// Aborts every armed trigger and closes the slot without an outcome.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        for (_, handle) in state.armed.drain(..) {
            handle.abort();
        }
    }

    /// Returns true once the slot has been claimed or disarmed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// The trigger that claimed the slot.
    pub fn resolved_by(&self) -> Option<Trigger> {
        self.state.lock().resolved_by
    }

    /// The triggers currently armed.
    pub fn armed(&self) -> Vec<Trigger> {
        self.state.lock().armed.iter().map(|(trigger, _)| *trigger).collect()
    }
}

impl fmt::Debug for OutcomeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeSlot")
            .field("closed", &self.is_closed())
            .field("resolved_by", &self.resolved_by())
            .field("armed", &self.armed())
            .finish()
    }
}

/// Disarms the slot when the owning watch future is dropped.
pub struct DisarmOnDrop(pub Arc<OutcomeSlot>);

impl Drop for DisarmOnDrop {
    fn drop(&mut self) {
        self.0.disarm();
    }
}
