//! AES-CBC-256 streaming transforms.
//!
//! [`EncryptTransform`] and [`DecryptTransform`] accept input in arbitrary
//! slices and keep the CBC chaining state between calls, so callers can feed
//! them straight from `write` without aligning anything themselves.

use std::fmt;

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngExt;

use crate::error::{EncryptionError, EncryptionResult};

/// AES block length in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-256 content key length in bytes.
pub const CONTENT_KEY_LEN: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Padding applied to the final block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// PKCS#7: always adds 1 to 16 bytes on encrypt, strips them on decrypt.
    Pkcs7,
    /// No padding. Plaintext must be block aligned.
    None,
}

// ---------------------------------------------------------------------------
// ContentKey
// ---------------------------------------------------------------------------

/// A per-object AES-256 content key.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; CONTENT_KEY_LEN]);

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

impl ContentKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut key = [0u8; CONTENT_KEY_LEN];
        rng.fill(&mut key);
        Self(key)
    }

    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(key: [u8; CONTENT_KEY_LEN]) -> Self {
        Self(key)
    }

    /// Build from an unwrapped key, checking its length.
    pub fn from_slice(key: &[u8]) -> EncryptionResult<Self> {
        let key: [u8; CONTENT_KEY_LEN] = key
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength(key.len()))?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_LEN] {
        &self.0
    }
}

/// Generate a fresh random IV.
#[must_use]
pub fn generate_iv() -> [u8; BLOCK_SIZE] {
    let mut rng = rand::rng();
    let mut iv = [0u8; BLOCK_SIZE];
    rng.fill(&mut iv);
    iv
}

// ---------------------------------------------------------------------------
// EncryptTransform
// ---------------------------------------------------------------------------

/// Incremental AES-CBC-256 encryption.
pub struct EncryptTransform {
    cipher: Aes256CbcEnc,
    pending: Vec<u8>,
    padding: Padding,
}

impl fmt::Debug for EncryptTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptTransform")
            .field("pending", &self.pending.len())
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}

impl EncryptTransform {
    /// Start a stream under `key` and `iv`.
    #[must_use]
    pub fn new(key: &ContentKey, iv: &[u8; BLOCK_SIZE], padding: Padding) -> Self {
        Self {
            cipher: Aes256CbcEnc::new(
                GenericArray::from_slice(key.as_bytes()),
                GenericArray::from_slice(iv),
            ),
            pending: Vec::with_capacity(BLOCK_SIZE),
            padding,
        }
    }

    /// Padding mode of this stream.
    #[must_use]
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Plaintext bytes held back until a full block is available.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Encrypt as many whole blocks as `input` completes.
    ///
    /// The returned ciphertext is always a multiple of [`BLOCK_SIZE`].
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(input);
        let full = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        let mut out: Vec<u8> = self.pending.drain(..full).collect();
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out
    }

    /// Encrypt the remainder, applying padding.
    pub fn finalize(mut self) -> EncryptionResult<Vec<u8>> {
        match self.padding {
            Padding::Pkcs7 => {
                let pad = u8::try_from(BLOCK_SIZE - self.pending.len()).unwrap_or(0);
                let mut block = std::mem::take(&mut self.pending);
                block.resize(BLOCK_SIZE, pad);
                self.cipher
                    .encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
                Ok(block)
            }
            Padding::None if self.pending.is_empty() => Ok(Vec::new()),
            Padding::None => Err(EncryptionError::UnalignedPlaintext(self.pending.len())),
        }
    }
}

// ---------------------------------------------------------------------------
// DecryptTransform
// ---------------------------------------------------------------------------

/// Incremental AES-CBC-256 decryption.
///
/// With [`Padding::Pkcs7`] the most recent plaintext block is held back until
/// [`finalize`](Self::finalize), because only the last block carries padding.
pub struct DecryptTransform {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
    held: Option<Vec<u8>>,
    padding: Padding,
}

impl fmt::Debug for DecryptTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptTransform")
            .field("pending", &self.pending.len())
            .field("held", &self.held.is_some())
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}

impl DecryptTransform {
    /// Start a stream under `key` and `iv`.
    #[must_use]
    pub fn new(key: &ContentKey, iv: &[u8; BLOCK_SIZE], padding: Padding) -> Self {
        Self {
            cipher: Aes256CbcDec::new(
                GenericArray::from_slice(key.as_bytes()),
                GenericArray::from_slice(iv),
            ),
            pending: Vec::with_capacity(BLOCK_SIZE),
            held: None,
            padding,
        }
    }

    /// Padding mode of this stream.
    #[must_use]
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Decrypt the whole blocks `input` completes.
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(input);
        let full = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        let mut blocks: Vec<u8> = self.pending.drain(..full).collect();
        for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        match self.padding {
            Padding::None => blocks,
            Padding::Pkcs7 => {
                if blocks.is_empty() {
                    return Vec::new();
                }
                let last = blocks.split_off(blocks.len() - BLOCK_SIZE);
                let mut out = self.held.replace(last).unwrap_or_default();
                out.extend_from_slice(&blocks);
                out
            }
        }
    }

    /// Finish the stream, validating and stripping padding.
    pub fn finalize(self) -> EncryptionResult<Vec<u8>> {
        if !self.pending.is_empty() {
            return Err(EncryptionError::TruncatedCiphertext(self.pending.len()));
        }
        match self.padding {
            Padding::None => Ok(Vec::new()),
            Padding::Pkcs7 => {
                let mut last = self.held.ok_or(EncryptionError::InvalidPadding)?;
                let pad = usize::from(*last.last().ok_or(EncryptionError::InvalidPadding)?);
                if pad == 0
                    || pad > BLOCK_SIZE
                    || last[BLOCK_SIZE - pad..].iter().any(|&b| usize::from(b) != pad)
                {
                    return Err(EncryptionError::InvalidPadding);
                }
                last.truncate(BLOCK_SIZE - pad);
                Ok(last)
            }
        }
    }
}
