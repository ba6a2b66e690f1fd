//! Per-stream options layered over [`ClientConfig`].

use rustblob_core::{ClientConfig, CoreResult, Metadata, ObjectKind};
use typed_builder::TypedBuilder;

/// Options for [`crate::BlobClient::open_write`].
///
/// Unset fields fall back to the client configuration.
///
/// # Examples
///
/// ```
/// use rustblob_core::ObjectKind;
/// use rustblob_stream::UploadOptions;
///
/// let options = UploadOptions::builder()
///     .kind(ObjectKind::Page)
///     .page_length(4096)
///     .parallelism(2)
///     .build();
/// assert_eq!(options.page_length, Some(4096));
/// assert!(options.create_new);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct UploadOptions {
    /// Object kind to create.
    #[builder(default = ObjectKind::Block)]
    pub kind: ObjectKind,

    /// Declared length of a page object.
    #[builder(default, setter(strip_option))]
    pub page_length: Option<u64>,

    /// Create (overwrite) an append object, or resume at its current length.
    #[builder(default = true)]
    pub create_new: bool,

    /// Maximum total size precondition for append objects.
    #[builder(default, setter(strip_option))]
    pub max_size: Option<u64>,

    /// Chunk size override.
    #[builder(default, setter(strip_option))]
    pub chunk_size: Option<usize>,

    /// Parallelism override.
    #[builder(default, setter(strip_option))]
    pub parallelism: Option<usize>,

    /// Whole-object MD5 override.
    #[builder(default, setter(strip_option))]
    pub store_object_md5: Option<bool>,

    /// Per-chunk MD5 override.
    #[builder(default, setter(strip_option))]
    pub transactional_md5: Option<bool>,

    /// Encrypt the object. Unset means "encrypt if the client has a key and
    /// the kind supports it".
    #[builder(default, setter(strip_option))]
    pub encrypt: Option<bool>,

    /// User metadata stored on the object.
    #[builder(default)]
    pub metadata: Metadata,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl UploadOptions {
    /// Merge overrides into `config` and validate the result for this kind.
    pub fn resolve(&self, config: &ClientConfig) -> CoreResult<ClientConfig> {
        let mut resolved = config.clone();
        if let Some(chunk_size) = self.chunk_size {
            resolved.chunk_size = chunk_size;
        }
        if let Some(parallelism) = self.parallelism {
            resolved.parallelism = parallelism;
        }
        if let Some(store) = self.store_object_md5 {
            resolved.store_object_md5 = Some(store);
        }
        if let Some(transactional) = self.transactional_md5 {
            resolved.transactional_md5 = transactional;
        }
        resolved.validate_for(self.kind)?;
        Ok(resolved)
    }
}

/// Options for [`crate::BlobClient::open_read`].
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ReadOptions {
    /// Fail on objects without an encryption record. Raised, never lowered,
    /// against the client configuration.
    #[builder(default = false)]
    pub require_encryption: bool,
}
