use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle of a poll loop or of the runtime as a whole.
///
/// Variants are ordered; a [`Lifecycle`] only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Nothing has started receiving yet.
    Idle,
    /// Actively polling.
    Receiving,
    /// Shutdown requested; the current batch drains and no new poll starts.
    ShuttingDown,
    /// Every poll loop has exited.
    Shutdown,
}

/// A monotonic, shareable lifecycle state.
///
/// Reads and writes go through the `watch` channel's lock, and waiters are
/// woken on every transition.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<State>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(State::Idle);
        Lifecycle { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> State {
        *self.tx.borrow()
    }

    /// Moves to `next` if it is later than the current state.
    ///
    /// Returns `true` when the state changed.
    pub fn advance(&self, next: State) -> bool {
        self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Whether a poll loop governed by this lifecycle may start another iteration.
    pub fn is_running(&self) -> bool {
        self.current() < State::ShuttingDown
    }

    /// Resolves once the state has reached at least `target`.
    pub async fn reached(&self, target: State) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state >= target).await;
    }

    /// A receiver that observes every later transition.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.tx.subscribe()
    }
}
