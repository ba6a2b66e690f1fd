//! The remote request contract.
//!
//! Every interaction with remote storage goes through a [`RequestExecutor`].
//! An executor applies its own retry policy and reports the final outcome.
//! When it retried internally it records the attempt count on the returned
//! [`RequestError`], which is how the append path detects a write that may
//! have landed before a lost acknowledgement.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RequestError;
use crate::types::{BlockId, Metadata, ObjectKind, ObjectProperties, PageRange};

/// Preconditions attached to an append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendCondition {
    /// The append only succeeds if the object's current length equals this.
    pub append_position: Option<u64>,
    /// The append only succeeds if the resulting length does not exceed this.
    pub max_size: Option<u64>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Discriminant of a [`BlobRequest`], used for logging and fault matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create an empty object of a given kind.
    CreateObject,
    /// Stage one block of a block object.
    PutBlock,
    /// Commit the ordered block list of a block object.
    PutBlockList,
    /// Update system properties.
    SetProperties,
    /// Write an aligned page range.
    PutPage,
    /// Append one chunk.
    AppendBlock,
    /// List written page ranges.
    GetPageRanges,
    /// Take a snapshot.
    Snapshot,
    /// Read properties and metadata.
    GetProperties,
    /// Read content.
    GetObject,
}

impl Operation {
    /// Return the operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateObject => "CreateObject",
            Self::PutBlock => "PutBlock",
            Self::PutBlockList => "PutBlockList",
            Self::SetProperties => "SetProperties",
            Self::PutPage => "PutPage",
            Self::AppendBlock => "AppendBlock",
            Self::GetPageRanges => "GetPageRanges",
            Self::Snapshot => "Snapshot",
            Self::GetProperties => "GetProperties",
            Self::GetObject => "GetObject",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BlobRequest
// ---------------------------------------------------------------------------

/// A single remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobRequest {
    /// Create (or overwrite) an empty object.
    CreateObject {
        /// Object key.
        key: String,
        /// Layout of the new object.
        kind: ObjectKind,
        /// Declared length. Required for page objects, ignored otherwise.
        length: Option<u64>,
        /// Metadata persisted with the object.
        metadata: Metadata,
    },
    /// Stage one uncommitted block.
    PutBlock {
        /// Object key.
        key: String,
        /// Id of the block.
        block_id: BlockId,
        /// Block content.
        data: Bytes,
        /// Transactional MD5 of `data`.
        content_md5: Option<String>,
    },
    /// Commit staged blocks in the given order.
    PutBlockList {
        /// Object key.
        key: String,
        /// Ordered block ids.
        block_ids: Vec<BlockId>,
        /// Whole-object MD5 to store.
        content_md5: Option<String>,
        /// Metadata persisted with the object.
        metadata: Metadata,
    },
    /// Update system properties of an existing object.
    SetProperties {
        /// Object key.
        key: String,
        /// Whole-object MD5 to store.
        content_md5: Option<String>,
    },
    /// Write pages at an aligned offset.
    PutPage {
        /// Object key.
        key: String,
        /// Aligned starting offset.
        offset: u64,
        /// Page content, a multiple of the page size.
        data: Bytes,
        /// Transactional MD5 of `data`.
        content_md5: Option<String>,
    },
    /// Append one chunk to an append object.
    AppendBlock {
        /// Object key.
        key: String,
        /// Chunk content.
        data: Bytes,
        /// Append preconditions.
        condition: AppendCondition,
        /// Transactional MD5 of `data`.
        content_md5: Option<String>,
    },
    /// List the written ranges of a page object.
    GetPageRanges {
        /// Object key.
        key: String,
    },
    /// Take a read-only snapshot.
    Snapshot {
        /// Object key.
        key: String,
    },
    /// Read properties and metadata.
    GetProperties {
        /// Object key.
        key: String,
    },
    /// Read content, optionally restricted to an inclusive byte range.
    GetObject {
        /// Object key.
        key: String,
        /// Inclusive `(start, end)` range.
        range: Option<(u64, u64)>,
    },
}

impl BlobRequest {
    /// Key of the object this request targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::CreateObject { key, .. }
            | Self::PutBlock { key, .. }
            | Self::PutBlockList { key, .. }
            | Self::SetProperties { key, .. }
            | Self::PutPage { key, .. }
            | Self::AppendBlock { key, .. }
            | Self::GetPageRanges { key }
            | Self::Snapshot { key }
            | Self::GetProperties { key }
            | Self::GetObject { key, .. } => key,
        }
    }

    /// Operation discriminant.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateObject { .. } => Operation::CreateObject,
            Self::PutBlock { .. } => Operation::PutBlock,
            Self::PutBlockList { .. } => Operation::PutBlockList,
            Self::SetProperties { .. } => Operation::SetProperties,
            Self::PutPage { .. } => Operation::PutPage,
            Self::AppendBlock { .. } => Operation::AppendBlock,
            Self::GetPageRanges { .. } => Operation::GetPageRanges,
            Self::Snapshot { .. } => Operation::Snapshot,
            Self::GetProperties { .. } => Operation::GetProperties,
            Self::GetObject { .. } => Operation::GetObject,
        }
    }

    /// Length of the request body, zero for body-less requests.
    #[must_use]
    pub fn body_len(&self) -> usize {
        match self {
            Self::PutBlock { data, .. }
            | Self::PutPage { data, .. }
            | Self::AppendBlock { data, .. } => data.len(),
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// BlobResponse
// ---------------------------------------------------------------------------

/// Successful outcome of a [`BlobRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobResponse {
    /// Object created.
    Created {
        /// Entity tag of the new object.
        etag: String,
    },
    /// Block staged.
    BlockStaged,
    /// Block list committed.
    Committed {
        /// Entity tag of the committed object.
        etag: String,
    },
    /// Properties updated.
    PropertiesSet {
        /// Entity tag after the update.
        etag: String,
    },
    /// Pages written.
    PageWritten {
        /// Entity tag after the write.
        etag: String,
    },
    /// Chunk appended.
    Appended {
        /// Entity tag after the append.
        etag: String,
        /// Offset at which the chunk landed.
        append_offset: u64,
        /// Number of committed blocks after the append.
        committed_block_count: u32,
    },
    /// Written page ranges, ordered and merged.
    PageRanges(Vec<PageRange>),
    /// Snapshot taken.
    Snapshot {
        /// Opaque snapshot identifier.
        snapshot: String,
    },
    /// Object properties.
    Properties(ObjectProperties),
    /// Object content.
    Object {
        /// Requested bytes.
        data: Bytes,
        /// Properties of the whole object.
        properties: ObjectProperties,
    },
}

impl BlobResponse {
    /// Extract the properties of a `Properties` response.
    pub fn into_properties(self) -> Result<ObjectProperties, RequestError> {
        match self {
            Self::Properties(properties) => Ok(properties),
            _ => Err(RequestError::unexpected_response(Operation::GetProperties.as_str())),
        }
    }

    /// Extract content and properties of an `Object` response.
    pub fn into_object(self) -> Result<(Bytes, ObjectProperties), RequestError> {
        match self {
            Self::Object { data, properties } => Ok((data, properties)),
            _ => Err(RequestError::unexpected_response(Operation::GetObject.as_str())),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestExecutor
// ---------------------------------------------------------------------------

/// Executes requests against remote storage.
///
/// Implementations own their retry policy. Errors carry the number of
/// attempts made so callers can tell a first-try rejection from one that
/// followed a retry.
#[async_trait]
pub trait RequestExecutor: Send + Sync + fmt::Debug {
    /// Execute one request to completion.
    async fn execute(&self, request: BlobRequest) -> Result<BlobResponse, RequestError>;
}
