//! Envelope encryption policy.
//!
//! Write path: [`EncryptionPolicy::create_encryption_context`] generates a
//! content key and IV, wraps the key, and returns the encryption record plus
//! an encrypt transform.
//!
//! Read path: [`EncryptionPolicy::parse_material`] finds the record in object
//! metadata, [`EncryptionPolicy::resolve_content_key`] unwraps the content key
//! and [`EncryptionPolicy::open_decrypt_transform`] combines both.
//!
//! Key resolution order:
//! 1. a configured resolver is asked for the recorded key id; an unknown id
//!    is an error, there is no fallback to the configured key,
//! 2. otherwise the configured key must carry exactly the recorded key id.

use std::sync::Arc;

use rustblob_core::Metadata;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::cipher::{BLOCK_SIZE, ContentKey, DecryptTransform, EncryptTransform, Padding, generate_iv};
use crate::error::{EncryptionError, EncryptionResult};
use crate::keys::{KeyResolver, KeyWrapper};
use crate::material::{EncryptionMaterial, ValidatedMaterial};

/// Everything a write stream needs to encrypt one object.
#[derive(Debug)]
pub struct EncryptionContext {
    /// Record to persist in the object's metadata.
    pub material: EncryptionMaterial,
    /// Transform bound to the fresh content key and IV.
    pub transform: EncryptTransform,
}

/// Client-side encryption settings.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rustblob_crypto::{EncryptionPolicy, Padding, SymmetricKey};
///
/// # tokio_test::block_on(async {
/// let policy = EncryptionPolicy::builder()
///     .key(Arc::new(SymmetricKey::generate("kek-1")))
///     .build();
/// let context = policy.create_encryption_context(Padding::Pkcs7).await.unwrap();
/// assert!(context.material.validate().is_ok());
/// # });
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct EncryptionPolicy {
    /// Key used to wrap new content keys and, without a resolver, to unwrap.
    #[builder(default, setter(strip_option))]
    key: Option<Arc<dyn KeyWrapper>>,

    /// Resolver consulted first when unwrapping.
    #[builder(default, setter(strip_option))]
    resolver: Option<Arc<dyn KeyResolver>>,

    /// Whether reading an object without an encryption record is an error.
    #[builder(default = false)]
    require_encryption: bool,
}

impl EncryptionPolicy {
    /// Whether reads of unencrypted objects fail.
    #[must_use]
    pub fn require_encryption(&self) -> bool {
        self.require_encryption
    }

    /// Return a copy with `require_encryption` raised to at least `required`.
    #[must_use]
    pub fn requiring_encryption(mut self, required: bool) -> Self {
        self.require_encryption |= required;
        self
    }

    /// Whether a key is configured for writing.
    #[must_use]
    pub fn can_encrypt(&self) -> bool {
        self.key.is_some()
    }

    /// Generate and wrap a fresh content key for one object.
    pub async fn create_encryption_context(&self, padding: Padding) -> EncryptionResult<EncryptionContext> {
        let key = self.key.as_ref().ok_or(EncryptionError::MissingKeyWrapper)?;

        let content_key = ContentKey::generate();
        let iv = generate_iv();
        let wrapped = key.wrap_key(content_key.as_bytes(), None).await?;
        debug!(
            key_id = %key.key_id(),
            algorithm = %wrapped.algorithm,
            ?padding,
            "created encryption context"
        );

        Ok(EncryptionContext {
            material: EncryptionMaterial::new(key.key_id(), &wrapped.bytes, &wrapped.algorithm, &iv),
            transform: EncryptTransform::new(&content_key, &iv, padding),
        })
    }

    /// Find and validate the encryption record in `metadata`.
    ///
    /// Returns `Ok(None)` for unencrypted objects unless encryption is
    /// required, in which case the missing record is an error.
    pub fn parse_material(&self, metadata: &Metadata) -> EncryptionResult<Option<ValidatedMaterial>> {
        match EncryptionMaterial::from_metadata(metadata)? {
            Some(material) => material.validate().map(Some),
            None if self.require_encryption => Err(EncryptionError::EncryptionRequired),
            None => Ok(None),
        }
    }

    /// Unwrap the content key named by `material`.
    pub async fn resolve_content_key(&self, material: &ValidatedMaterial) -> EncryptionResult<ContentKey> {
        let key = self.select_key(&material.key_id).await?;
        let raw = key
            .unwrap_key(&material.wrapped_key, &material.wrap_algorithm)
            .await?;
        ContentKey::from_slice(&raw)
    }

    /// Parse the record, unwrap the key, and build a decrypt transform.
    ///
    /// `iv` overrides the record's IV for reads that start past the first
    /// cipher block. Returns `Ok(None)` for unencrypted objects.
    pub async fn open_decrypt_transform(
        &self,
        metadata: &Metadata,
        iv: Option<[u8; BLOCK_SIZE]>,
        padding: Padding,
    ) -> EncryptionResult<Option<DecryptTransform>> {
        let Some(material) = self.parse_material(metadata)? else {
            return Ok(None);
        };
        let content_key = self.resolve_content_key(&material).await?;
        let iv = iv.unwrap_or(material.iv);
        Ok(Some(DecryptTransform::new(&content_key, &iv, padding)))
    }

    async fn select_key(&self, key_id: &str) -> EncryptionResult<Arc<dyn KeyWrapper>> {
        if let Some(resolver) = &self.resolver {
            return resolver.resolve_key(key_id).await?.ok_or_else(|| {
                warn!(key_id = %key_id, "key resolver returned no key");
                EncryptionError::KeyNotResolved {
                    key_id: key_id.to_owned(),
                }
            });
        }
        let key = self.key.as_ref().ok_or(EncryptionError::MissingKeySource)?;
        if key.key_id() != key_id {
            return Err(EncryptionError::KeyMismatch {
                expected: key_id.to_owned(),
                actual: key.key_id().to_owned(),
            });
        }
        Ok(Arc::clone(key))
    }
}
