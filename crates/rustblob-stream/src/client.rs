//! Entry point: opens write and read streams against one executor.

use std::sync::Arc;

use rustblob_core::{
    BlobRequest, BlobResponse, ClientConfig, ObjectKind, Operation, PageRange, RequestError,
    RequestExecutor,
};
use rustblob_crypto::EncryptionPolicy;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::{UploadError, UploadResult};
use crate::limiter::ConcurrencyLimiter;
use crate::options::{ReadOptions, UploadOptions};
use crate::reader::BlobReadStream;
use crate::session::WriteSession;
use crate::target::UploadTarget;
use crate::writer::BlobWriteStream;

/// Client for one storage endpoint.
///
/// Cheap to clone; every stream it opens shares the executor.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rustblob_core::{ClientConfig, InMemoryBlobService};
/// use rustblob_stream::{BlobClient, ReadOptions, UploadOptions};
///
/// # tokio_test::block_on(async {
/// let service = Arc::new(InMemoryBlobService::new());
/// let client = BlobClient::new(service, ClientConfig::default());
///
/// let mut stream = client.open_write("greeting", UploadOptions::default()).await.unwrap();
/// stream.write(b"hello").unwrap();
/// stream.commit().await.unwrap();
///
/// let mut reader = client.open_read("greeting", ReadOptions::default()).await.unwrap();
/// assert_eq!(reader.read_all().await.unwrap(), b"hello");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct BlobClient {
    executor: Arc<dyn RequestExecutor>,
    config: Arc<ClientConfig>,
    encryption: EncryptionPolicy,
}

impl BlobClient {
    /// Create a client without client-side encryption.
    #[must_use]
    pub fn new(executor: Arc<dyn RequestExecutor>, config: ClientConfig) -> Self {
        let encryption = EncryptionPolicy::default().requiring_encryption(config.require_encryption);
        Self {
            executor,
            config: Arc::new(config),
            encryption,
        }
    }

    /// Use `policy` for encrypting writes and decrypting reads.
    #[must_use]
    pub fn with_encryption(mut self, policy: EncryptionPolicy) -> Self {
        self.encryption = policy.requiring_encryption(self.config.require_encryption);
        self
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Encryption policy in effect.
    #[must_use]
    pub fn encryption(&self) -> &EncryptionPolicy {
        &self.encryption
    }

    /// Open a write stream into `key`.
    ///
    /// Page objects are created with their declared length up front. Append
    /// objects are created when `create_new` is set, otherwise writing
    /// resumes at the current length.
    pub async fn open_write(&self, key: &str, options: UploadOptions) -> UploadResult<BlobWriteStream> {
        let config = options.resolve(&self.config)?;
        let target = match options.kind {
            ObjectKind::Block => UploadTarget::block(),
            ObjectKind::Page => {
                let length = options.page_length.ok_or_else(|| {
                    UploadError::InvalidArgument("page objects need a declared length".to_owned())
                })?;
                UploadTarget::page(length)?
            }
            ObjectKind::Append => UploadTarget::append(options.max_size),
        };

        let padding = match (options.encrypt, target.padding()) {
            (Some(true), None) => {
                return Err(UploadError::InvalidArgument(format!(
                    "client-side encryption is not supported for {} objects",
                    options.kind
                )));
            }
            (Some(true), padding) => padding,
            (Some(false), _) => None,
            (None, padding) => padding.filter(|_| self.encryption.can_encrypt()),
        };

        let mut metadata = options.metadata.clone();
        let encryptor = match padding {
            Some(padding) => {
                let context = self.encryption.create_encryption_context(padding).await?;
                context.material.write_to(&mut metadata)?;
                Some(context.transform)
            }
            None => None,
        };

        let remote_offset = match &target {
            UploadTarget::Block(_) => 0,
            UploadTarget::Page(_) => {
                self.create(key, ObjectKind::Page, options.page_length, &metadata)
                    .await?;
                0
            }
            UploadTarget::Append(_) if options.create_new => {
                self.create(key, ObjectKind::Append, None, &metadata).await?;
                0
            }
            UploadTarget::Append(_) => {
                let properties = self
                    .executor
                    .execute(BlobRequest::GetProperties {
                        key: key.to_owned(),
                    })
                    .await?
                    .into_properties()?;
                if properties.kind != ObjectKind::Append {
                    return Err(UploadError::InvalidArgument(format!(
                        "cannot append to {key}: it is a {} object",
                        properties.kind
                    )));
                }
                properties.length
            }
        };

        let parallelism = target.effective_parallelism(config.parallelism);
        let session = WriteSession::new(
            key,
            target,
            config.chunk_size,
            remote_offset,
            config.transactional_md5,
            config.stores_object_md5(options.kind),
        );
        let dispatcher = Dispatcher::spawn(
            Arc::clone(&self.executor),
            ConcurrencyLimiter::new(parallelism),
        );

        info!(
            key = %key,
            kind = %options.kind,
            chunk_size = config.chunk_size,
            parallelism,
            encrypted = encryptor.is_some(),
            start_offset = remote_offset,
            "opened write stream"
        );
        Ok(BlobWriteStream::new(
            session,
            dispatcher,
            Arc::clone(&self.executor),
            encryptor,
            metadata,
        ))
    }

    /// Open a read stream on `key`.
    pub async fn open_read(&self, key: &str, options: ReadOptions) -> UploadResult<BlobReadStream> {
        let policy = self
            .encryption
            .clone()
            .requiring_encryption(options.require_encryption);
        BlobReadStream::open(Arc::clone(&self.executor), key, policy).await
    }

    /// Written ranges of a page object.
    pub async fn page_ranges(&self, key: &str) -> UploadResult<Vec<PageRange>> {
        match self
            .executor
            .execute(BlobRequest::GetPageRanges {
                key: key.to_owned(),
            })
            .await?
        {
            BlobResponse::PageRanges(ranges) => Ok(ranges),
            _ => Err(RequestError::unexpected_response(Operation::GetPageRanges.as_str()).into()),
        }
    }

    /// Take a snapshot of `key`, returning its identifier.
    pub async fn snapshot(&self, key: &str) -> UploadResult<String> {
        match self
            .executor
            .execute(BlobRequest::Snapshot {
                key: key.to_owned(),
            })
            .await?
        {
            BlobResponse::Snapshot { snapshot } => Ok(snapshot),
            _ => Err(RequestError::unexpected_response(Operation::Snapshot.as_str()).into()),
        }
    }

    async fn create(
        &self,
        key: &str,
        kind: ObjectKind,
        length: Option<u64>,
        metadata: &rustblob_core::Metadata,
    ) -> UploadResult<()> {
        self.executor
            .execute(BlobRequest::CreateObject {
                key: key.to_owned(),
                kind,
                length,
                metadata: metadata.clone(),
            })
            .await?;
        Ok(())
    }
}
