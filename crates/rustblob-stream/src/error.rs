//! Error types for upload and read streams.

use rustblob_core::{CoreError, RequestError};
use rustblob_crypto::EncryptionError;

/// Upload and read stream error.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// An argument (offset, length, option combination) is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A page write is not a multiple of the page size.
    #[error("write of {length} bytes is not a multiple of the {page_size}-byte page size")]
    UnalignedWrite {
        /// Length of the rejected write.
        length: usize,
        /// Required alignment.
        page_size: u64,
    },

    /// `commit` was called a second time.
    #[error("stream is already committed")]
    AlreadyCommitted,

    /// `write` was called after `commit`.
    #[error("cannot write to a committed stream")]
    WriteAfterCommit,

    /// A remote request failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Encryption or decryption failed.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    /// Configuration or identifier error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Writing to the read destination failed.
    #[error("destination write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UploadError {
    /// The underlying request failure, if this is one.
    #[must_use]
    pub fn as_request(&self) -> Option<&RequestError> {
        match self {
            Self::Request(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience result type for stream operations.
pub type UploadResult<T> = Result<T, UploadError>;
