//! The buffered, chunked, concurrent write stream.
//!
//! ```text
//! write(bytes) -> [encrypt] -> hash -> chunk buffer -> Dispatcher -> limiter -> executor
//!                                                          |
//! flush()/commit() <------------ tracker reaches zero <-----
//! ```
//!
//! `write` never waits on the network. `flush` and `commit` wait for every
//! dispatched chunk and then surface the first recorded failure, if any.

use std::sync::Arc;

use rustblob_core::{BlobResponse, BlockId, Metadata, ObjectKind, RequestError, RequestExecutor};
use rustblob_crypto::EncryptTransform;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{UploadError, UploadResult};
use crate::session::{SessionState, WriteSession};

/// Outcome of [`BlobWriteStream::flush_with_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every dispatched chunk completed without error.
    Completed,
    /// The wait was cancelled. Dispatched chunks keep running.
    Cancelled,
}

/// What a successful commit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Entity tag returned by the finalize request, if one was issued.
    pub etag: Option<String>,
    /// Caller bytes written.
    pub bytes_written: u64,
    /// Bytes uploaded (ciphertext when encrypted).
    pub bytes_uploaded: u64,
    /// Whole-object MD5 stored at commit.
    pub content_md5: Option<String>,
    /// Number of chunks uploaded.
    pub chunks: u64,
}

/// A write stream into one remote object.
///
/// Obtained from [`crate::BlobClient::open_write`]. Call
/// [`commit`](Self::commit) exactly once to finalize the object.
#[derive(Debug)]
pub struct BlobWriteStream {
    session: WriteSession,
    dispatcher: Dispatcher,
    executor: Arc<dyn RequestExecutor>,
    encryptor: Option<EncryptTransform>,
    encrypted: bool,
    metadata: Metadata,
    start_offset: u64,
}

impl BlobWriteStream {
    pub(crate) fn new(
        session: WriteSession,
        dispatcher: Dispatcher,
        executor: Arc<dyn RequestExecutor>,
        encryptor: Option<EncryptTransform>,
        metadata: Metadata,
    ) -> Self {
        let start_offset = session.remote_offset();
        let encrypted = encryptor.is_some();
        Self {
            session,
            dispatcher,
            executor,
            encryptor,
            encrypted,
            metadata,
            start_offset,
        }
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Buffer `data`, dispatching every chunk it completes.
    ///
    /// Page objects only accept writes that are a multiple of 512 bytes. A
    /// faulted stream keeps accepting writes; the fault is reported by the
    /// next `flush` or `commit`.
    ///
    /// Completed chunks are queued without bound and held in memory until
    /// their upload finishes. Callers that produce data faster than it
    /// uploads can pace themselves on [`queued_bytes`](Self::queued_bytes)
    /// or call [`flush`](Self::flush).
    pub fn write(&mut self, data: &[u8]) -> UploadResult<()> {
        if self.session.is_sealed() {
            return Err(UploadError::WriteAfterCommit);
        }
        self.session
            .target()
            .validate_write(data.len(), self.session.logical_offset())?;

        let chunks = match self.encryptor.as_mut() {
            Some(encryptor) => {
                let cipher = encryptor.update(data);
                self.session.buffer(&cipher)
            }
            None => self.session.buffer(data),
        };
        self.session.advance_logical(data.len());

        for chunk in chunks {
            self.dispatcher.dispatch(chunk)?;
        }
        Ok(())
    }

    /// Dispatch the partial chunk and wait for every upload to finish.
    pub async fn flush(&mut self) -> UploadResult<()> {
        self.begin_flush()?;
        self.dispatcher.wait_idle().await;
        self.check_fault()?;
        self.reopen();
        Ok(())
    }

    /// Like [`flush`](Self::flush), but stop waiting when `token` is cancelled.
    ///
    /// A cancelled flush still reports a failure that was already recorded.
    pub async fn flush_with_cancel(&mut self, token: &CancellationToken) -> UploadResult<FlushStatus> {
        self.begin_flush()?;

        let cancelled = tokio::select! {
            () = self.dispatcher.wait_idle() => false,
            () = token.cancelled() => true,
        };

        self.check_fault()?;
        self.reopen();
        if cancelled {
            debug!(
                key = %self.session.key(),
                outstanding = self.dispatcher.tracker().outstanding(),
                "flush cancelled"
            );
            Ok(FlushStatus::Cancelled)
        } else {
            Ok(FlushStatus::Completed)
        }
    }

    /// Flush and finalize the object.
    ///
    /// Writes are refused from the first call on. If the returned future is
    /// dropped while chunks are still uploading, `commit` can be called
    /// again and resumes the wait. Once the uploads have settled the outcome
    /// is final: later calls return [`UploadError::AlreadyCommitted`], even
    /// when this one failed.
    pub async fn commit(&mut self) -> UploadResult<CommitSummary> {
        if self.session.is_committed() {
            return Err(UploadError::AlreadyCommitted);
        }
        self.session.set_state(SessionState::Committing);
        if !self.session.is_sealed() {
            self.seal()?;
        }

        self.dispatcher.wait_idle().await;
        self.session.mark_committed();
        self.check_fault()?;

        let content_md5 = self.session.object_md5();
        let metadata = std::mem::take(&mut self.metadata);
        let etag = match self
            .session
            .target()
            .commit_request(self.session.key(), content_md5.clone(), metadata)
        {
            Some(request) => {
                let operation = request.operation();
                match self.executor.execute(request).await {
                    Ok(
                        BlobResponse::Committed { etag } | BlobResponse::PropertiesSet { etag },
                    ) => Some(etag),
                    Ok(_) => {
                        return Err(self.fail(RequestError::unexpected_response(operation.as_str())));
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            }
            None => None,
        };

        self.session.set_state(SessionState::Committed);
        let summary = CommitSummary {
            etag,
            bytes_written: self.session.logical_offset(),
            bytes_uploaded: self.session.remote_offset() - self.start_offset,
            content_md5,
            chunks: self.dispatcher.dispatched(),
        };
        info!(
            key = %self.session.key(),
            kind = %self.session.target().kind(),
            bytes = summary.bytes_uploaded,
            chunks = summary.chunks,
            "committed object"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Object key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.session.key()
    }

    /// Object kind.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.session.target().kind()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Caller bytes accepted so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.session.logical_offset()
    }

    /// Remote offset of the next chunk.
    #[must_use]
    pub fn remote_offset(&self) -> u64 {
        self.session.remote_offset()
    }

    /// Bytes waiting in the chunk buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.session.buffered_len()
    }

    /// Chunks dispatched so far.
    #[must_use]
    pub fn dispatched_chunks(&self) -> u64 {
        self.dispatcher.dispatched()
    }

    /// Uploads dispatched but not yet completed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.dispatcher.tracker().outstanding()
    }

    /// Upload parallelism in effect.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.dispatcher.parallelism()
    }

    /// Block ids in submission order (block objects only).
    #[must_use]
    pub fn block_ids(&self) -> &[BlockId] {
        self.session.target().block_ids()
    }

    /// Bytes dispatched whose upload has not finished yet.
    #[must_use]
    pub fn queued_bytes(&self) -> u64 {
        self.dispatcher.queued_bytes()
    }

    /// Whether the commit outcome is final.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.session.is_committed()
    }

    /// Whether content is encrypted before upload.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The first recorded failure, if any.
    #[must_use]
    pub fn fault(&self) -> Option<RequestError> {
        self.dispatcher.latch().get()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Close the stream to writes and dispatch everything still buffered,
    /// including the encryption tail.
    fn seal(&mut self) -> UploadResult<()> {
        self.session.seal();
        let result = self.dispatch_tail();
        if result.is_err() {
            self.session.mark_committed();
            self.session.set_state(SessionState::Faulted);
        }
        result
    }

    fn dispatch_tail(&mut self) -> UploadResult<()> {
        if let Some(encryptor) = self.encryptor.take() {
            let tail = encryptor.finalize()?;
            for chunk in self.session.buffer(&tail) {
                self.dispatcher.dispatch(chunk)?;
            }
        }
        self.dispatch_partial()
    }

    fn dispatch_partial(&mut self) -> UploadResult<()> {
        if let Some(chunk) = self.session.take_partial() {
            self.dispatcher.dispatch(chunk)?;
        }
        Ok(())
    }

    fn begin_flush(&mut self) -> UploadResult<()> {
        if !self.session.is_sealed() {
            self.session.set_state(SessionState::Flushing);
        }
        self.dispatch_partial()
    }

    fn check_fault(&mut self) -> UploadResult<()> {
        match self.dispatcher.latch().get() {
            Some(error) => {
                self.session.set_state(SessionState::Faulted);
                Err(error.into())
            }
            None => Ok(()),
        }
    }

    fn reopen(&mut self) {
        if self.session.state() == SessionState::Flushing {
            self.session.set_state(SessionState::Open);
        }
    }

    fn fail(&mut self, error: RequestError) -> UploadError {
        warn!(key = %self.session.key(), error = %error, "finalize failed");
        self.dispatcher.latch().try_set(error.clone());
        self.session.set_state(SessionState::Faulted);
        self.dispatcher.latch().get().unwrap_or(error).into()
    }
}

impl Drop for BlobWriteStream {
    fn drop(&mut self) {
        if !self.session.is_committed() && self.session.logical_offset() > 0 {
            warn!(
                key = %self.session.key(),
                written = self.session.logical_offset(),
                buffered = self.session.buffered_len(),
                "write stream dropped without commit"
            );
        }
    }
}
