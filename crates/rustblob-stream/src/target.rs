//! Per-object-kind chunk addressing and finalization.
//!
//! [`UploadTarget`] has one variant per object kind. Each knows how to
//! validate a write, how to turn buffered bytes into a [`Chunk`], and which
//! request (if any) finalizes the object.

use bytes::Bytes;
use rustblob_core::types::{BlockId, PAGE_SIZE, generate_block_id_prefix};
use rustblob_core::{AppendCondition, BlobRequest, Metadata, ObjectKind};
use rustblob_crypto::Padding;

use crate::error::{UploadError, UploadResult};

/// Where a chunk lands in the remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkId {
    /// A named block of a block object.
    Block(BlockId),
    /// A byte offset in a page or append object.
    Offset(u64),
}

/// One immutable unit of buffered data, ready to upload.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Destination identifier.
    pub id: ChunkId,
    /// Remote offset of the first byte.
    pub remote_offset: u64,
    /// Per-chunk MD5, when transactional hashing is on.
    pub content_md5: Option<String>,
    /// The request that uploads this chunk.
    pub request: BlobRequest,
}

impl Chunk {
    /// Number of bytes carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.request.body_len()
    }

    /// Whether the chunk carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this chunk is an append (sequential, precondition-checked).
    #[must_use]
    pub fn is_append(&self) -> bool {
        matches!(self.request, BlobRequest::AppendBlock { .. })
    }
}

// ---------------------------------------------------------------------------
// UploadTarget
// ---------------------------------------------------------------------------

/// Block object state: id prefix and the block list in submission order.
#[derive(Debug, Clone)]
pub struct BlockTarget {
    prefix: String,
    block_ids: Vec<BlockId>,
}

/// Page object state: the declared length.
#[derive(Debug, Clone, Copy)]
pub struct PageTarget {
    declared_length: u64,
}

/// Append object state: the optional maximum size precondition.
#[derive(Debug, Clone, Copy)]
pub struct AppendTarget {
    max_size: Option<u64>,
}

/// The object kind a write stream uploads into.
#[derive(Debug, Clone)]
pub enum UploadTarget {
    /// Block object.
    Block(BlockTarget),
    /// Page object.
    Page(PageTarget),
    /// Append object.
    Append(AppendTarget),
}

impl UploadTarget {
    /// A block target with a fresh random id prefix.
    #[must_use]
    pub fn block() -> Self {
        Self::Block(BlockTarget {
            prefix: generate_block_id_prefix(),
            block_ids: Vec::new(),
        })
    }

    /// A page target of `declared_length` bytes.
    pub fn page(declared_length: u64) -> UploadResult<Self> {
        if declared_length % PAGE_SIZE != 0 {
            return Err(UploadError::InvalidArgument(format!(
                "page object length {declared_length} is not a multiple of {PAGE_SIZE}"
            )));
        }
        Ok(Self::Page(PageTarget { declared_length }))
    }

    /// An append target with an optional maximum object size.
    #[must_use]
    pub fn append(max_size: Option<u64>) -> Self {
        Self::Append(AppendTarget { max_size })
    }

    /// Object kind.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Block(_) => ObjectKind::Block,
            Self::Page(_) => ObjectKind::Page,
            Self::Append(_) => ObjectKind::Append,
        }
    }

    /// Upload parallelism actually used for a configured value.
    #[must_use]
    pub fn effective_parallelism(&self, configured: usize) -> usize {
        match self {
            Self::Append(_) => 1,
            Self::Block(_) | Self::Page(_) => configured.max(1),
        }
    }

    /// Padding for client-side encryption of this kind, or `None` when the
    /// kind cannot be encrypted. Append objects are readable while still
    /// growing, which a padded CBC stream cannot support.
    #[must_use]
    pub fn padding(&self) -> Option<Padding> {
        match self {
            Self::Block(_) => Some(Padding::Pkcs7),
            Self::Page(_) => Some(Padding::None),
            Self::Append(_) => None,
        }
    }

    /// Check a caller write of `length` bytes at logical `position`.
    pub fn validate_write(&self, length: usize, position: u64) -> UploadResult<()> {
        if let Self::Page(page) = self {
            if length as u64 % PAGE_SIZE != 0 {
                return Err(UploadError::UnalignedWrite {
                    length,
                    page_size: PAGE_SIZE,
                });
            }
            if position + length as u64 > page.declared_length {
                return Err(UploadError::InvalidArgument(format!(
                    "write of {length} bytes at {position} exceeds page object length {}",
                    page.declared_length
                )));
            }
        }
        Ok(())
    }

    /// Turn buffered bytes into the next chunk.
    ///
    /// Block ids are assigned here, so the block list follows submission
    /// order regardless of how uploads complete.
    pub fn next_chunk(
        &mut self,
        key: &str,
        remote_offset: u64,
        data: Bytes,
        content_md5: Option<String>,
    ) -> Chunk {
        let key = key.to_owned();
        let (id, request) = match self {
            Self::Block(block) => {
                let block_id = BlockId::new(&block.prefix, block.block_ids.len() as u64);
                block.block_ids.push(block_id.clone());
                (
                    ChunkId::Block(block_id.clone()),
                    BlobRequest::PutBlock {
                        key,
                        block_id,
                        data,
                        content_md5: content_md5.clone(),
                    },
                )
            }
            Self::Page(_) => (
                ChunkId::Offset(remote_offset),
                BlobRequest::PutPage {
                    key,
                    offset: remote_offset,
                    data,
                    content_md5: content_md5.clone(),
                },
            ),
            Self::Append(append) => (
                ChunkId::Offset(remote_offset),
                BlobRequest::AppendBlock {
                    key,
                    data,
                    condition: AppendCondition {
                        append_position: Some(remote_offset),
                        max_size: append.max_size,
                    },
                    content_md5: content_md5.clone(),
                },
            ),
        };
        Chunk {
            id,
            remote_offset,
            content_md5,
            request,
        }
    }

    /// Block ids in submission order (empty for page and append targets).
    #[must_use]
    pub fn block_ids(&self) -> &[BlockId] {
        match self {
            Self::Block(block) => &block.block_ids,
            Self::Page(_) | Self::Append(_) => &[],
        }
    }

    /// The request that finalizes the object, if one is needed.
    ///
    /// Block objects always commit their block list. Page and append objects
    /// only need a properties update to store a whole-object hash.
    #[must_use]
    pub fn commit_request(
        &self,
        key: &str,
        content_md5: Option<String>,
        metadata: Metadata,
    ) -> Option<BlobRequest> {
        match self {
            Self::Block(block) => Some(BlobRequest::PutBlockList {
                key: key.to_owned(),
                block_ids: block.block_ids.clone(),
                content_md5,
                metadata,
            }),
            Self::Page(_) | Self::Append(_) => content_md5.map(|content_md5| BlobRequest::SetProperties {
                key: key.to_owned(),
                content_md5: Some(content_md5),
            }),
        }
    }
}
