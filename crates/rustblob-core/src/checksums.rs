//! MD5 helpers for per-chunk and whole-object content hashes.
//!
//! Remote objects carry the base64 encoding of the raw MD5 digest. Both the
//! per-chunk transactional hash and the whole-object hash are computed over
//! the bytes actually sent, which are ciphertext when encryption is enabled.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use rustblob_core::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    let hash = md5::Md5::digest(data);
    hex::encode(hash)
}

/// Compute the base64-encoded MD5 digest of `data`, in the form stored as an
/// object's content hash.
///
/// # Examples
///
/// ```
/// use rustblob_core::checksums::compute_content_md5;
///
/// assert_eq!(compute_content_md5(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
/// ```
#[must_use]
pub fn compute_content_md5(data: &[u8]) -> String {
    let hash = md5::Md5::digest(data);
    BASE64_STANDARD.encode(hash)
}

// ---------------------------------------------------------------------------
// RunningMd5
// ---------------------------------------------------------------------------

/// Incremental MD5 over a stream of written chunks.
///
/// # Examples
///
/// ```
/// use rustblob_core::checksums::{RunningMd5, compute_content_md5};
///
/// let mut hasher = RunningMd5::new();
/// hasher.update(b"hel");
/// hasher.update(b"lo");
/// assert_eq!(hasher.bytes_hashed(), 5);
/// assert_eq!(hasher.finish_base64(), compute_content_md5(b"hello"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunningMd5 {
    md5: md5::Md5,
    bytes: u64,
}

impl RunningMd5 {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `data` into the hash.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes fed so far.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Return the base64 digest of everything fed so far and reset.
    pub fn take_base64(&mut self) -> String {
        self.bytes = 0;
        BASE64_STANDARD.encode(self.md5.finalize_reset())
    }

    /// Consume the hasher and return the base64 digest.
    #[must_use]
    pub fn finish_base64(self) -> String {
        BASE64_STANDARD.encode(self.md5.finalize())
    }
}
