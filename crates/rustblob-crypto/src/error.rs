//! Error types for envelope encryption.
//!
//! Every variant except `Internal` describes a data or configuration
//! integrity problem. None of them is retryable.

/// Envelope encryption error.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    /// Encryption was requested but no key wrapper is configured.
    #[error("no key wrapper configured for client-side encryption")]
    MissingKeyWrapper,

    /// Decryption needs a key but neither a key nor a resolver is configured.
    #[error("no key or key resolver configured for decryption")]
    MissingKeySource,

    /// Encryption is required but the object carries no encryption record.
    #[error("object is not encrypted but encryption is required")]
    EncryptionRequired,

    /// The encryption record could not be parsed.
    #[error("malformed encryption metadata: {0}")]
    MalformedMetadata(String),

    /// The encryption record has no content IV.
    #[error("encryption metadata is missing the content IV")]
    MissingIv,

    /// The content IV does not have the cipher block length.
    #[error("content IV has {0} bytes, expected 16")]
    InvalidIvLength(usize),

    /// The encryption record has no wrapped content key.
    #[error("encryption metadata is missing the wrapped content key")]
    MissingWrappedKey,

    /// The encryption record was written by an unsupported protocol version.
    #[error("unsupported encryption protocol version: {0}")]
    UnsupportedProtocol(String),

    /// The content encryption algorithm is not AES-CBC-256.
    #[error("unsupported content encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key wrap algorithm is not supported by the key.
    #[error("unsupported key wrap algorithm: {0}")]
    UnsupportedWrapAlgorithm(String),

    /// The configured key is not the key the content key was wrapped with.
    #[error("key id mismatch: object was wrapped with {expected}, configured key is {actual}")]
    KeyMismatch {
        /// Key id recorded in the object's encryption record.
        expected: String,
        /// Key id of the configured key.
        actual: String,
    },

    /// The key resolver has no key for the recorded key id.
    #[error("key resolver could not resolve key {key_id}")]
    KeyNotResolved {
        /// Key id recorded in the object's encryption record.
        key_id: String,
    },

    /// Wrapping or unwrapping the content key failed.
    #[error("key wrap failed: {0}")]
    KeyWrap(String),

    /// A key has the wrong length.
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),

    /// The final plaintext block does not carry valid PKCS#7 padding.
    #[error("invalid PKCS#7 padding")]
    InvalidPadding,

    /// Ciphertext ended in the middle of a cipher block.
    #[error("ciphertext truncated: {0} trailing bytes do not form a block")]
    TruncatedCiphertext(usize),

    /// Unpadded plaintext ended in the middle of a cipher block.
    #[error("plaintext of an unpadded stream is not block aligned: {0} trailing bytes")]
    UnalignedPlaintext(usize),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for encryption operations.
pub type EncryptionResult<T> = Result<T, EncryptionError>;
