//! Mapping plaintext byte ranges onto encrypted objects.
//!
//! CBC decryption of block `i` needs ciphertext block `i - 1` as its IV. A
//! ranged read therefore widens the request to whole cipher blocks and, when
//! it does not start in the first block, downloads the preceding block too.

use crate::cipher::{BLOCK_SIZE, Padding};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// How to fetch and decrypt a plaintext range of an encrypted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    /// First ciphertext byte to download.
    pub download_offset: u64,
    /// Number of ciphertext bytes to download.
    pub download_count: u64,
    /// Whether the first downloaded block is the IV rather than content.
    pub iv_in_stream: bool,
    /// Leading plaintext bytes to discard after decryption.
    pub skip_plaintext: u64,
    /// Plaintext bytes to keep after the skip, `None` for all.
    pub take: Option<u64>,
    /// Padding to remove from the last downloaded block.
    pub padding: Padding,
}

impl RangePlan {
    /// The download as an inclusive `(start, end)` range.
    #[must_use]
    pub fn download_range(&self) -> (u64, u64) {
        (
            self.download_offset,
            self.download_offset + self.download_count - 1,
        )
    }
}

/// Plan a read of `count` plaintext bytes at `offset` from an object whose
/// ciphertext is `encrypted_length` bytes long.
///
/// Returns `None` when nothing can be read: an empty range or an offset at or
/// beyond the end of the ciphertext.
///
/// # Examples
///
/// ```
/// use rustblob_crypto::range::plan_encrypted_range;
///
/// let plan = plan_encrypted_range(40, Some(10), 128, false).unwrap();
/// assert_eq!(plan.download_offset, 16);
/// assert!(plan.iv_in_stream);
/// assert_eq!(plan.skip_plaintext, 8);
/// ```
#[must_use]
pub fn plan_encrypted_range(
    offset: u64,
    count: Option<u64>,
    encrypted_length: u64,
    block_aligned: bool,
) -> Option<RangePlan> {
    if offset >= encrypted_length || count == Some(0) {
        return None;
    }
    let last_byte = encrypted_length - 1;
    let end = count.map_or(last_byte, |c| offset.saturating_add(c - 1).min(last_byte));

    let block_start = offset / BLOCK * BLOCK;
    let block_end = (end / BLOCK * BLOCK + BLOCK - 1).min(last_byte);
    let (download_offset, iv_in_stream) = if block_start >= BLOCK {
        (block_start - BLOCK, true)
    } else {
        (0, false)
    };

    let ends_in_final_block = block_end == last_byte;
    let padding = if block_aligned || !ends_in_final_block {
        Padding::None
    } else {
        Padding::Pkcs7
    };

    Some(RangePlan {
        download_offset,
        download_count: block_end - download_offset + 1,
        iv_in_stream,
        skip_plaintext: offset - block_start,
        take: count,
        padding,
    })
}
