//! The encryption record persisted in object metadata.
//!
//! The record is JSON stored under [`ENCRYPTION_METADATA_KEY`]:
//!
//! ```text
//! {
//!   "EncryptionMode": "FullBlob",
//!   "WrappedContentKey": { "KeyId": "...", "EncryptedKey": "<b64>", "Algorithm": "A256KW" },
//!   "EncryptionAgent": { "Protocol": "1.0", "EncryptionAlgorithm": "AES_CBC_256" },
//!   "ContentEncryptionIV": "<b64>",
//!   "KeyWrappingMetadata": { "EncryptionLibrary": "rustblob 0.3.0" }
//! }
//! ```
//!
//! Every field is optional at parse time so that a missing IV or key is
//! reported as its own error by [`EncryptionMaterial::validate`].

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rustblob_core::Metadata;
use serde::{Deserialize, Serialize};

use crate::cipher::BLOCK_SIZE;
use crate::error::{EncryptionError, EncryptionResult};

/// Metadata key holding the serialized encryption record.
pub const ENCRYPTION_METADATA_KEY: &str = "encryptiondata";

/// The only supported protocol version.
pub const PROTOCOL_V1: &str = "1.0";

/// Content encryption algorithm identifier.
pub const AES_CBC_256: &str = "AES_CBC_256";

/// Encryption mode: the whole object is one CBC stream.
pub const FULL_BLOB: &str = "FullBlob";

/// Key of the agent entry in the free-form wrap metadata.
pub const ENCRYPTION_LIBRARY_KEY: &str = "EncryptionLibrary";

/// The wrapped content key and how it was wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WrappedContentKey {
    /// Id of the key-encryption key.
    pub key_id: String,
    /// Base64 wrapped content key.
    pub encrypted_key: String,
    /// Key wrap algorithm.
    pub algorithm: String,
}

/// Protocol and algorithm of the content encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptionAgent {
    /// Protocol version.
    pub protocol: String,
    /// Content encryption algorithm.
    pub encryption_algorithm: String,
}

/// The raw encryption record as stored on the object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptionMaterial {
    /// Encryption mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_mode: Option<String>,
    /// The wrapped content key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_content_key: Option<WrappedContentKey>,
    /// Protocol and algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_agent: Option<EncryptionAgent>,
    /// Base64 content IV.
    #[serde(
        rename = "ContentEncryptionIV",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_encryption_iv: Option<String>,
    /// Free-form metadata about the wrapping agent.
    #[serde(default)]
    pub key_wrapping_metadata: HashMap<String, String>,
}

/// A validated encryption record with decoded binary fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMaterial {
    /// Content IV.
    pub iv: [u8; BLOCK_SIZE],
    /// Id of the key-encryption key.
    pub key_id: String,
    /// Wrapped content key bytes.
    pub wrapped_key: Vec<u8>,
    /// Key wrap algorithm.
    pub wrap_algorithm: String,
}

impl EncryptionMaterial {
    /// Build the record for a freshly generated content key.
    #[must_use]
    pub fn new(key_id: &str, wrapped_key: &[u8], wrap_algorithm: &str, iv: &[u8; BLOCK_SIZE]) -> Self {
        let mut key_wrapping_metadata = HashMap::new();
        key_wrapping_metadata.insert(
            ENCRYPTION_LIBRARY_KEY.to_owned(),
            format!("rustblob {}", env!("CARGO_PKG_VERSION")),
        );
        Self {
            encryption_mode: Some(FULL_BLOB.to_owned()),
            wrapped_content_key: Some(WrappedContentKey {
                key_id: key_id.to_owned(),
                encrypted_key: BASE64_STANDARD.encode(wrapped_key),
                algorithm: wrap_algorithm.to_owned(),
            }),
            encryption_agent: Some(EncryptionAgent {
                protocol: PROTOCOL_V1.to_owned(),
                encryption_algorithm: AES_CBC_256.to_owned(),
            }),
            content_encryption_iv: Some(BASE64_STANDARD.encode(iv)),
            key_wrapping_metadata,
        }
    }

    /// Serialize to the JSON stored under [`ENCRYPTION_METADATA_KEY`].
    pub fn to_json(&self) -> EncryptionResult<String> {
        serde_json::to_string(self).map_err(|e| EncryptionError::MalformedMetadata(e.to_string()))
    }

    /// Insert the serialized record into `metadata`.
    pub fn write_to(&self, metadata: &mut Metadata) -> EncryptionResult<()> {
        metadata.insert(ENCRYPTION_METADATA_KEY.to_owned(), self.to_json()?);
        Ok(())
    }

    /// Parse the record from object metadata.
    ///
    /// Returns `Ok(None)` when the object carries no record.
    pub fn from_metadata(metadata: &Metadata) -> EncryptionResult<Option<Self>> {
        let Some(raw) = metadata.get(ENCRYPTION_METADATA_KEY) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| EncryptionError::MalformedMetadata(e.to_string()))
    }

    /// Check mandatory fields and decode them.
    pub fn validate(&self) -> EncryptionResult<ValidatedMaterial> {
        let agent = self
            .encryption_agent
            .as_ref()
            .ok_or_else(|| EncryptionError::MalformedMetadata("missing EncryptionAgent".to_owned()))?;
        if agent.protocol != PROTOCOL_V1 {
            return Err(EncryptionError::UnsupportedProtocol(agent.protocol.clone()));
        }
        if agent.encryption_algorithm != AES_CBC_256 {
            return Err(EncryptionError::UnsupportedAlgorithm(
                agent.encryption_algorithm.clone(),
            ));
        }

        let encoded_iv = self
            .content_encryption_iv
            .as_deref()
            .ok_or(EncryptionError::MissingIv)?;
        let raw_iv = BASE64_STANDARD
            .decode(encoded_iv)
            .map_err(|e| EncryptionError::MalformedMetadata(format!("ContentEncryptionIV: {e}")))?;
        let iv: [u8; BLOCK_SIZE] = raw_iv
            .as_slice()
            .try_into()
            .map_err(|_| EncryptionError::InvalidIvLength(raw_iv.len()))?;

        let wrapped = self
            .wrapped_content_key
            .as_ref()
            .ok_or(EncryptionError::MissingWrappedKey)?;
        if wrapped.encrypted_key.is_empty() {
            return Err(EncryptionError::MissingWrappedKey);
        }
        let wrapped_key = BASE64_STANDARD
            .decode(&wrapped.encrypted_key)
            .map_err(|e| EncryptionError::MalformedMetadata(format!("EncryptedKey: {e}")))?;

        Ok(ValidatedMaterial {
            iv,
            key_id: wrapped.key_id.clone(),
            wrapped_key,
            wrap_algorithm: wrapped.algorithm.clone(),
        })
    }
}
