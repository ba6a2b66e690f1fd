//! Reading objects, with transparent decryption.
//!
//! Properties are fetched once when the stream is opened. The encryption
//! record is validated at that point, so an object that should be encrypted
//! but is not fails before any byte reaches the destination.

use std::io::{self, Write};
use std::sync::Arc;

use rustblob_core::{BlobRequest, ByteRange, ObjectProperties, RequestExecutor};
use rustblob_crypto::{
    BLOCK_SIZE, ContentKey, DecryptWriter, EncryptionPolicy, Padding, ValidatedMaterial,
    plan_encrypted_range,
};
use tracing::{debug, trace};

use crate::error::UploadResult;

/// A read handle on one remote object.
#[derive(Debug)]
pub struct BlobReadStream {
    key: String,
    executor: Arc<dyn RequestExecutor>,
    policy: EncryptionPolicy,
    properties: ObjectProperties,
    material: Option<ValidatedMaterial>,
    content_key: Option<ContentKey>,
}

impl BlobReadStream {
    /// Fetch properties of `key` and validate its encryption record.
    pub async fn open(
        executor: Arc<dyn RequestExecutor>,
        key: &str,
        policy: EncryptionPolicy,
    ) -> UploadResult<Self> {
        let properties = executor
            .execute(BlobRequest::GetProperties {
                key: key.to_owned(),
            })
            .await?
            .into_properties()?;
        let material = policy.parse_material(&properties.metadata)?;
        debug!(
            key = %key,
            kind = %properties.kind,
            length = properties.length,
            encrypted = material.is_some(),
            "opened read stream"
        );
        Ok(Self {
            key: key.to_owned(),
            executor,
            policy,
            properties,
            material,
            content_key: None,
        })
    }

    /// Properties captured when the stream was opened.
    #[must_use]
    pub fn properties(&self) -> &ObjectProperties {
        &self.properties
    }

    /// Whether the object carries an encryption record.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.material.is_some()
    }

    /// Stream the whole object into `dest`. Returns the plaintext length.
    pub async fn read_to<W: Write>(&mut self, dest: &mut W) -> UploadResult<u64> {
        let decryption = self.decryption().await?;
        let (data, _) = self
            .executor
            .execute(BlobRequest::GetObject {
                key: self.key.clone(),
                range: None,
            })
            .await?
            .into_object()?;

        let mut counter = CountingWriter::new(dest);
        match decryption {
            None => counter.write_all(&data)?,
            Some((key, iv)) => {
                let padding = if self.properties.kind.is_block_aligned() {
                    Padding::None
                } else {
                    Padding::Pkcs7
                };
                let mut writer = DecryptWriter::new(&mut counter, key, iv, padding);
                writer.write_all(&data)?;
                writer.finish()?;
            }
        }
        trace!(key = %self.key, bytes = counter.count, "read object");
        Ok(counter.count)
    }

    /// Stream `range` of the plaintext into `dest`. Returns the bytes written.
    ///
    /// A range starting at or past the end yields nothing.
    pub async fn read_range_to<W: Write>(&mut self, range: ByteRange, dest: &mut W) -> UploadResult<u64> {
        let mut counter = CountingWriter::new(dest);
        match self.decryption().await? {
            None => {
                let Some(bounds) = range.resolve(self.properties.length) else {
                    return Ok(0);
                };
                let data = self.fetch(bounds).await?;
                counter.write_all(&data)?;
            }
            Some((key, iv)) => {
                let Some(plan) = plan_encrypted_range(
                    range.offset,
                    range.count,
                    self.properties.length,
                    self.properties.kind.is_block_aligned(),
                ) else {
                    return Ok(0);
                };
                let data = self.fetch(plan.download_range()).await?;
                let mut writer = DecryptWriter::for_range(&mut counter, key, iv, &plan);
                writer.write_all(&data)?;
                writer.finish()?;
            }
        }
        trace!(
            key = %self.key,
            offset = range.offset,
            bytes = counter.count,
            "read range"
        );
        Ok(counter.count)
    }

    /// Read the whole object into memory.
    pub async fn read_all(&mut self) -> UploadResult<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to(&mut out).await?;
        Ok(out)
    }

    async fn fetch(&self, range: (u64, u64)) -> UploadResult<bytes::Bytes> {
        let (data, _) = self
            .executor
            .execute(BlobRequest::GetObject {
                key: self.key.clone(),
                range: Some(range),
            })
            .await?
            .into_object()?;
        Ok(data)
    }

    /// Content key and IV for an encrypted object, resolved once.
    async fn decryption(&mut self) -> UploadResult<Option<(ContentKey, [u8; BLOCK_SIZE])>> {
        let Some(material) = self.material.as_ref() else {
            return Ok(None);
        };
        let iv = material.iv;
        if let Some(key) = &self.content_key {
            return Ok(Some((key.clone(), iv)));
        }
        let key = self.policy.resolve_content_key(material).await?;
        self.content_key = Some(key.clone());
        Ok(Some((key, iv)))
    }
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    count: u64,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
