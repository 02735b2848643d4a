//! Monotonic refresh signals.
//!
//! A [`RefreshSignal`] is an edge-triggered counter: every
//! [`trigger`](RefreshSignal::trigger) bumps it by one and wakes every
//! [`RefreshReceiver`]. Views that depend on an operation's completion
//! (a meeting listing after a schedule, a recordings view after a manual
//! refresh) hold a receiver and re-fetch when it changes. Nothing polls.
//!
//! The repository uses the same type for its revision counter.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending half of a refresh counter. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RefreshSignal(Arc<watch::Sender<u64>>);

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self(Arc::new(sender))
    }

    /// Bump the counter and return its new value.
    pub fn trigger(&self) -> u64 {
        let mut value = 0;
        self.0.send_modify(|current| {
            *current += 1;
            value = *current;
        });
        value
    }

    /// Current counter value.
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.0.borrow()
    }

    /// Subscribe to future bumps.
    ///
    /// The receiver starts with the current value marked as seen.
    #[must_use]
    pub fn subscribe(&self) -> RefreshReceiver {
        RefreshReceiver(self.0.subscribe())
    }
}

/// Receiving half of a refresh counter.
#[derive(Debug, Clone)]
pub struct RefreshReceiver(watch::Receiver<u64>);

impl RefreshReceiver {
    /// Last value observed by this receiver.
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.0.borrow()
    }

    /// Wait for the next bump and return the new value.
    ///
    /// Several bumps between two calls are observed as one. Returns `None`
    /// once every [`RefreshSignal`] clone has been dropped.
    pub async fn changed(&mut self) -> Option<u64> {
        self.0.changed().await.ok()?;
        Some(*self.0.borrow_and_update())
    }
}
