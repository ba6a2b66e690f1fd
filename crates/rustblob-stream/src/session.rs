//! Mutable state of one upload: offsets, chunk buffer, running hashes, and
//! the commit state machine.

use bytes::{Bytes, BytesMut};
use rustblob_core::checksums::RunningMd5;

use crate::target::{Chunk, UploadTarget};

/// Lifecycle of a write stream.
///
/// ```text
/// Open -> Flushing -> Open ... -> Committing -> Committed
///   \________\______________________\_______-> Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes.
    Open,
    /// Waiting for outstanding uploads.
    Flushing,
    /// Flushing before, or issuing, the finalize request.
    Committing,
    /// Finalized.
    Committed,
    /// An upload or the finalize request failed.
    Faulted,
}

/// One open-to-commit upload.
#[derive(Debug)]
pub struct WriteSession {
    key: String,
    target: UploadTarget,
    state: SessionState,
    sealed: bool,
    committed: bool,
    logical_offset: u64,
    remote_offset: u64,
    chunk_size: usize,
    buffer: BytesMut,
    chunk_md5: Option<RunningMd5>,
    object_md5: Option<RunningMd5>,
}

impl WriteSession {
    /// Start a session whose first chunk lands at `remote_offset`.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        target: UploadTarget,
        chunk_size: usize,
        remote_offset: u64,
        transactional_md5: bool,
        object_md5: bool,
    ) -> Self {
        Self {
            key: key.into(),
            target,
            state: SessionState::Open,
            sealed: false,
            committed: false,
            logical_offset: 0,
            remote_offset,
            chunk_size,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_md5: transactional_md5.then(RunningMd5::new),
            object_md5: object_md5.then(RunningMd5::new),
        }
    }

    /// Object key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Object kind and addressing state.
    #[must_use]
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `state`. `Committed` and `Faulted` are never left.
    pub fn set_state(&mut self, state: SessionState) {
        if matches!(self.state, SessionState::Committed | SessionState::Faulted) {
            return;
        }
        self.state = state;
    }

    /// Whether `commit` has started, closing the stream to writes.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Close the stream to writes. The commit may still be retried.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the commit outcome is final.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Record a final commit outcome. Implies sealed.
    pub fn mark_committed(&mut self) {
        self.sealed = true;
        self.committed = true;
    }

    /// Caller bytes accepted so far.
    #[must_use]
    pub fn logical_offset(&self) -> u64 {
        self.logical_offset
    }

    /// Remote offset of the next chunk.
    #[must_use]
    pub fn remote_offset(&self) -> u64 {
        self.remote_offset
    }

    /// Bytes waiting in the chunk buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Count `len` caller bytes as accepted.
    pub fn advance_logical(&mut self, len: usize) {
        self.logical_offset += len as u64;
    }

    /// Hash and buffer `data`, returning every chunk it completes.
    ///
    /// Bytes are hashed in call order before buffering, so hashes follow
    /// write order whatever order uploads complete in.
    pub fn buffer(&mut self, mut data: &[u8]) -> Vec<Chunk> {
        let mut full = Vec::new();
        while !data.is_empty() {
            let room = self.chunk_size - self.buffer.len();
            let (piece, rest) = data.split_at(room.min(data.len()));
            if let Some(md5) = self.chunk_md5.as_mut() {
                md5.update(piece);
            }
            if let Some(md5) = self.object_md5.as_mut() {
                md5.update(piece);
            }
            self.buffer.extend_from_slice(piece);
            data = rest;

            if self.buffer.len() == self.chunk_size {
                full.push(self.cut_chunk());
            }
        }
        full
    }

    /// Cut whatever is buffered into a final partial chunk.
    pub fn take_partial(&mut self) -> Option<Chunk> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.cut_chunk())
        }
    }

    /// Base64 MD5 of every byte buffered so far, when object hashing is on.
    #[must_use]
    pub fn object_md5(&self) -> Option<String> {
        self.object_md5.clone().map(RunningMd5::finish_base64)
    }

    fn cut_chunk(&mut self) -> Chunk {
        let data: Bytes = self.buffer.split().freeze();
        let len = data.len() as u64;
        let content_md5 = self.chunk_md5.as_mut().map(RunningMd5::take_base64);
        let chunk = self
            .target
            .next_chunk(&self.key, self.remote_offset, data, content_md5);
        self.remote_offset += len;
        chunk
    }
}
