//! Client-side envelope encryption for rustblob objects.
//!
//! Each object is encrypted with its own random AES-256 content key in CBC
//! mode. The content key is wrapped by a key-encryption key ([`KeyWrapper`])
//! and stored, together with the IV, in the object's metadata as an
//! [`EncryptionMaterial`] record. Readers resolve the key-encryption key by id
//! ([`KeyResolver`]), unwrap the content key, and decrypt through a
//! [`DecryptWriter`].
//!
//! Ranged reads of encrypted objects are planned with
//! [`plan_encrypted_range`], which widens the request to cipher blocks and
//! decides whether padding must be removed.

pub mod cipher;
pub mod decrypt_stream;
pub mod error;
pub mod keys;
pub mod material;
pub mod policy;
pub mod range;

pub use cipher::{BLOCK_SIZE, ContentKey, DecryptTransform, EncryptTransform, Padding};
pub use decrypt_stream::DecryptWriter;
pub use error::{EncryptionError, EncryptionResult};
pub use keys::{A256KW, InMemoryKeyResolver, KeyResolver, KeyWrapper, SymmetricKey, WrappedKey};
pub use material::{ENCRYPTION_METADATA_KEY, EncryptionMaterial, ValidatedMaterial};
pub use policy::{EncryptionContext, EncryptionPolicy};
pub use range::{RangePlan, plan_encrypted_range};
