//! Background upload of dispatched chunks.
//!
//! [`Dispatcher::dispatch`] is synchronous: it counts the chunk as outstanding
//! and queues it. A pump task takes chunks off the queue in order, waits for
//! a limiter permit, and spawns the upload. Each upload releases its permit
//! and then decrements the tracker, whatever the outcome.
//!
//! Failures go to the [`FaultLatch`]; the first one wins. Once the latch is
//! set, queued chunks are no longer sent.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustblob_core::{RequestError, RequestExecutor};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{UploadError, UploadResult};
use crate::latch::FaultLatch;
use crate::limiter::ConcurrencyLimiter;
use crate::target::Chunk;
use crate::tracker::CompletionTracker;

/// Queues chunks for bounded concurrent upload.
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<Chunk>,
    tracker: Arc<CompletionTracker>,
    latch: Arc<FaultLatch>,
    limiter: ConcurrencyLimiter,
    dispatched: AtomicU64,
    queued_bytes: Arc<AtomicU64>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("outstanding", &self.tracker.outstanding())
            .field("faulted", &self.latch.is_set())
            .field("parallelism", &self.limiter.capacity())
            .field("dispatched", &self.dispatched.load(Ordering::Relaxed))
            .field("queued_bytes", &self.queued_bytes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Start the pump task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(executor: Arc<dyn RequestExecutor>, limiter: ConcurrencyLimiter) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let tracker = Arc::new(CompletionTracker::new());
        let latch = Arc::new(FaultLatch::new());
        let queued_bytes = Arc::new(AtomicU64::new(0));

        tokio::spawn(pump(
            receiver,
            executor,
            limiter.clone(),
            Arc::clone(&tracker),
            Arc::clone(&latch),
            Arc::clone(&queued_bytes),
        ));

        Self {
            sender,
            tracker,
            latch,
            limiter,
            dispatched: AtomicU64::new(0),
            queued_bytes,
        }
    }

    /// Queue `chunk` for upload without waiting.
    pub fn dispatch(&self, chunk: Chunk) -> UploadResult<()> {
        trace!(
            id = ?chunk.id,
            offset = chunk.remote_offset,
            size = chunk.len(),
            "dispatching chunk"
        );
        let size = chunk.len() as u64;
        self.tracker.increment();
        self.queued_bytes.fetch_add(size, Ordering::Relaxed);
        if self.sender.send(chunk).is_err() {
            self.queued_bytes.fetch_sub(size, Ordering::Relaxed);
            self.tracker.decrement();
            return Err(UploadError::Internal(anyhow::anyhow!(
                "upload dispatcher is no longer running"
            )));
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait until every dispatched chunk has completed.
    pub async fn wait_idle(&self) {
        self.tracker.wait_idle().await;
    }

    /// Completion tracker shared with uploads.
    #[must_use]
    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    /// The sticky fault latch.
    #[must_use]
    pub fn latch(&self) -> &FaultLatch {
        &self.latch
    }

    /// Number of chunks dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Bytes of dispatched chunks still queued or uploading.
    #[must_use]
    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes.load(Ordering::Relaxed)
    }

    /// Permits available to uploads.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.limiter.capacity()
    }
}

async fn pump(
    mut receiver: mpsc::UnboundedReceiver<Chunk>,
    executor: Arc<dyn RequestExecutor>,
    limiter: ConcurrencyLimiter,
    tracker: Arc<CompletionTracker>,
    latch: Arc<FaultLatch>,
    queued_bytes: Arc<AtomicU64>,
) {
    while let Some(chunk) = receiver.recv().await {
        let size = chunk.len() as u64;
        let permit = match limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                latch.try_set(RequestError::new(
                    500,
                    rustblob_core::error::codes::INTERNAL_ERROR,
                    e.to_string(),
                ));
                queued_bytes.fetch_sub(size, Ordering::Relaxed);
                tracker.decrement();
                continue;
            }
        };

        let executor = Arc::clone(&executor);
        let tracker = Arc::clone(&tracker);
        let latch = Arc::clone(&latch);
        let queued_bytes = Arc::clone(&queued_bytes);
        tokio::spawn(async move {
            upload_chunk(executor.as_ref(), &latch, chunk).await;
            drop(permit);
            queued_bytes.fetch_sub(size, Ordering::Relaxed);
            tracker.decrement();
        });
    }
    trace!("upload pump stopped");
}

async fn upload_chunk(executor: &dyn RequestExecutor, latch: &FaultLatch, chunk: Chunk) {
    if latch.is_set() {
        trace!(id = ?chunk.id, "skipping chunk after earlier failure");
        return;
    }

    let is_append = chunk.is_append();
    let id = chunk.id;
    match executor.execute(chunk.request).await {
        Ok(_) => trace!(id = ?id, "chunk uploaded"),
        // A retried append that fails its position check most likely landed
        // on an earlier attempt whose acknowledgement was lost.
        Err(e) if is_append && e.is_append_precondition_failure() && e.was_retried() => {
            warn!(
                id = ?id,
                attempts = e.attempts,
                code = %e.code,
                "suppressing append precondition failure after retry"
            );
        }
        Err(e) => {
            if latch.try_set(e.clone()) {
                warn!(id = ?id, error = %e, "chunk upload failed");
            } else {
                debug!(id = ?id, error = %e, "dropping later chunk failure");
            }
        }
    }
}
