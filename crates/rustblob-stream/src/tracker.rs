//! Outstanding-upload counter with an "all done" signal.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::warn;

/// Counts chunk uploads that have been dispatched but not yet completed.
///
/// The count never goes below zero. Waiters are woken exactly when the count
/// drops from one to zero.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl CompletionTracker {
    /// Create an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more outstanding upload.
    pub fn increment(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a completed upload.
    ///
    /// Returns `false`, leaving the count at zero, if nothing was outstanding.
    pub fn decrement(&self) -> bool {
        match self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => {
                self.idle.notify_waiters();
                true
            }
            Ok(_) => true,
            Err(_) => {
                warn!("completion tracker decremented below zero");
                false
            }
        }
    }

    /// Current number of outstanding uploads.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Wait until no uploads are outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent 1 -> 0 is not missed.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}
