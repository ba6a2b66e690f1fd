//! Object kinds, identifiers, ranges, and properties.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Page objects are addressed in units of this many bytes.
pub const PAGE_SIZE: u64 = 512;

/// Hard upper bound for a single chunk (block, page write, or append).
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

/// Default lower bound for the configured chunk size.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 16 * 1024;

/// User metadata persisted alongside an object.
pub type Metadata = HashMap<String, String>;

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// The three remote object layouts a write stream can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Built from named blocks and finalized with an ordered block list.
    Block,
    /// Fixed-length object written in 512-byte aligned pages.
    Page,
    /// Object that only accepts sequential, offset-checked appends.
    Append,
}

impl ObjectKind {
    /// Return the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "BlockBlob",
            Self::Page => "PageBlob",
            Self::Append => "AppendBlob",
        }
    }

    /// Whether every write and read boundary must be page aligned.
    #[must_use]
    pub fn is_block_aligned(&self) -> bool {
        matches!(self, Self::Page)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`ObjectKind`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown object kind: {0}")]
pub struct ParseObjectKindError(String);

impl FromStr for ObjectKind {
    type Err = ParseObjectKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" | "blockblob" => Ok(Self::Block),
            "page" | "pageblob" => Ok(Self::Page),
            "append" | "appendblob" => Ok(Self::Append),
            _ => Err(ParseObjectKindError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// BlockId
// ---------------------------------------------------------------------------

/// Identifier of one staged block of a block object.
///
/// The raw form is `"<prefix>-<sequence>"` with a zero-padded six digit
/// sequence, so every id of one upload has the same length once encoded.
/// The wire form is the base64 encoding of the raw form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(String);

impl BlockId {
    /// Build the id for `sequence` under the upload-wide `prefix`.
    #[must_use]
    pub fn new(prefix: &str, sequence: u64) -> Self {
        Self(BASE64_STANDARD.encode(format!("{prefix}-{sequence:06}")))
    }

    /// Wrap an already encoded id after checking it is valid base64.
    pub fn from_encoded(encoded: impl Into<String>) -> CoreResult<Self> {
        let encoded = encoded.into();
        BASE64_STANDARD
            .decode(&encoded)
            .map_err(|e| CoreError::InvalidBlockId(format!("{encoded}: {e}")))?;
        Ok(Self(encoded))
    }

    /// The base64 wire form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to the raw `"<prefix>-<sequence>"` form.
    pub fn decode(&self) -> CoreResult<String> {
        let raw = BASE64_STANDARD
            .decode(&self.0)
            .map_err(|e| CoreError::InvalidBlockId(format!("{}: {e}", self.0)))?;
        String::from_utf8(raw).map_err(|e| CoreError::InvalidBlockId(e.to_string()))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate the random per-upload prefix used for block ids.
///
/// # Examples
///
/// ```
/// use rustblob_core::types::generate_block_id_prefix;
///
/// let prefix = generate_block_id_prefix();
/// assert_eq!(prefix.len(), 16);
/// assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn generate_block_id_prefix() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 8];
    rng.fill(&mut buf);
    hex::encode(buf)
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// A caller-facing byte range: a start offset and an optional length.
///
/// A missing `count` means "to the end of the object".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte to read.
    pub offset: u64,
    /// Number of bytes to read, or `None` for the remainder.
    pub count: Option<u64>,
}

impl ByteRange {
    /// A range starting at `offset` covering `count` bytes.
    #[must_use]
    pub fn new(offset: u64, count: u64) -> Self {
        Self {
            offset,
            count: Some(count),
        }
    }

    /// A range from `offset` to the end of the object.
    #[must_use]
    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            count: None,
        }
    }

    /// Resolve to an inclusive `(start, end)` pair against an object length.
    ///
    /// Returns `None` when the range is empty or starts past the end.
    #[must_use]
    pub fn resolve(&self, length: u64) -> Option<(u64, u64)> {
        if self.offset >= length || self.count == Some(0) {
            return None;
        }
        let last = length - 1;
        let end = match self.count {
            Some(count) => self.offset.saturating_add(count - 1).min(last),
            None => last,
        };
        Some((self.offset, end))
    }
}

/// An inclusive range of bytes that has been written in a page object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRange {
    /// First byte of the range.
    pub start: u64,
    /// Last byte of the range (inclusive).
    pub end: u64,
}

// ---------------------------------------------------------------------------
// ObjectProperties
// ---------------------------------------------------------------------------

/// System properties and metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectProperties {
    /// Object layout.
    pub kind: ObjectKind,
    /// Content length in bytes.
    pub length: u64,
    /// Base64 MD5 of the whole content, when one was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    /// Entity tag of the current content.
    pub etag: String,
    /// User metadata.
    pub metadata: Metadata,
    /// Number of committed blocks (block and append objects).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_block_count: Option<u32>,
}
