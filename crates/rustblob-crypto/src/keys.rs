//! Key-encryption keys and key resolution.
//!
//! A [`KeyWrapper`] wraps and unwraps content keys. It may be local (see
//! [`SymmetricKey`]) or backed by a remote key vault. A [`KeyResolver`] maps a
//! key id recorded on an object to the wrapper able to unwrap it, which is
//! how readers follow key rotation.

use std::fmt;
use std::sync::Arc;

use aes::cipher::generic_array::GenericArray;
use aes_kw::KekAes256;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngExt;
use tracing::debug;

use crate::error::{EncryptionError, EncryptionResult};

/// RFC 3394 AES-256 key wrap.
pub const A256KW: &str = "A256KW";

/// Integrity check block added by AES key wrap.
const KEY_WRAP_OVERHEAD: usize = 8;

/// A wrapped content key and the algorithm used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Opaque wrapped bytes.
    pub bytes: Vec<u8>,
    /// Key wrap algorithm actually used.
    pub algorithm: String,
}

/// Wraps and unwraps content keys.
#[async_trait]
pub trait KeyWrapper: Send + Sync + fmt::Debug {
    /// Identifier recorded on every object this key protects.
    fn key_id(&self) -> &str;

    /// Algorithm used when the caller gives no hint.
    fn default_algorithm(&self) -> &str;

    /// Wrap `key`, optionally with a specific algorithm.
    async fn wrap_key(&self, key: &[u8], algorithm: Option<&str>) -> EncryptionResult<WrappedKey>;

    /// Unwrap `wrapped` with the algorithm recorded at wrap time.
    async fn unwrap_key(&self, wrapped: &[u8], algorithm: &str) -> EncryptionResult<Vec<u8>>;
}

/// Maps key ids to key wrappers.
#[async_trait]
pub trait KeyResolver: Send + Sync + fmt::Debug {
    /// Find the wrapper for `key_id`, or `None` if the id is unknown.
    async fn resolve_key(&self, key_id: &str) -> EncryptionResult<Option<Arc<dyn KeyWrapper>>>;
}

// ---------------------------------------------------------------------------
// SymmetricKey
// ---------------------------------------------------------------------------

/// A local 256-bit key-encryption key using AES key wrap.
#[derive(Clone)]
pub struct SymmetricKey {
    id: String,
    key: [u8; 32],
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SymmetricKey {
    /// Create a key with the given id and raw key bytes.
    #[must_use]
    pub fn new(id: impl Into<String>, key: [u8; 32]) -> Self {
        Self { id: id.into(), key }
    }

    /// Create a key from a byte slice, which must be 32 bytes.
    pub fn from_slice(id: impl Into<String>, key: &[u8]) -> EncryptionResult<Self> {
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength(key.len()))?;
        Ok(Self::new(id, key))
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate(id: impl Into<String>) -> Self {
        let mut rng = rand::rng();
        let mut key = [0u8; 32];
        rng.fill(&mut key);
        Self::new(id, key)
    }

    fn kek(&self) -> KekAes256 {
        KekAes256::new(GenericArray::from_slice(&self.key))
    }

    fn check_algorithm(algorithm: &str) -> EncryptionResult<()> {
        if algorithm == A256KW {
            Ok(())
        } else {
            Err(EncryptionError::UnsupportedWrapAlgorithm(algorithm.to_owned()))
        }
    }
}

#[async_trait]
impl KeyWrapper for SymmetricKey {
    fn key_id(&self) -> &str {
        &self.id
    }

    fn default_algorithm(&self) -> &str {
        A256KW
    }

    async fn wrap_key(&self, key: &[u8], algorithm: Option<&str>) -> EncryptionResult<WrappedKey> {
        let algorithm = algorithm.unwrap_or(A256KW);
        Self::check_algorithm(algorithm)?;
        let mut out = vec![0u8; key.len() + KEY_WRAP_OVERHEAD];
        self.kek()
            .wrap(key, &mut out)
            .map_err(|e| EncryptionError::KeyWrap(format!("{e:?}")))?;
        Ok(WrappedKey {
            bytes: out,
            algorithm: algorithm.to_owned(),
        })
    }

    async fn unwrap_key(&self, wrapped: &[u8], algorithm: &str) -> EncryptionResult<Vec<u8>> {
        Self::check_algorithm(algorithm)?;
        if wrapped.len() <= KEY_WRAP_OVERHEAD {
            return Err(EncryptionError::KeyWrap(format!(
                "wrapped key of {} bytes is too short",
                wrapped.len()
            )));
        }
        let mut out = vec![0u8; wrapped.len() - KEY_WRAP_OVERHEAD];
        self.kek()
            .unwrap(wrapped, &mut out)
            .map_err(|e| EncryptionError::KeyWrap(format!("{e:?}")))?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// InMemoryKeyResolver
// ---------------------------------------------------------------------------

/// Resolver backed by a concurrent map of key id to wrapper.
#[derive(Debug, Default)]
pub struct InMemoryKeyResolver {
    keys: DashMap<String, Arc<dyn KeyWrapper>>,
}

impl InMemoryKeyResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper under its own key id, replacing any previous one.
    pub fn insert(&self, key: Arc<dyn KeyWrapper>) {
        debug!(key_id = %key.key_id(), "registered key");
        self.keys.insert(key.key_id().to_owned(), key);
    }

    /// Remove the wrapper for `key_id`.
    pub fn remove(&self, key_id: &str) -> Option<Arc<dyn KeyWrapper>> {
        self.keys.remove(key_id).map(|(_, key)| key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl KeyResolver for InMemoryKeyResolver {
    async fn resolve_key(&self, key_id: &str) -> EncryptionResult<Option<Arc<dyn KeyWrapper>>> {
        Ok(self.keys.get(key_id).map(|entry| Arc::clone(entry.value())))
    }
}
