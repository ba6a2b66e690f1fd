//! A `Write` adapter that decrypts everything written through it.
//!
//! [`DecryptWriter`] owns whatever it wraps. Pass `&mut destination` to keep
//! the destination alive and open after the writer is finished.

use std::fmt;
use std::io::{self, Write};

use crate::cipher::{BLOCK_SIZE, ContentKey, DecryptTransform, Padding};
use crate::error::EncryptionError;
use crate::range::RangePlan;

enum IvState {
    Pending(Vec<u8>),
    Ready(DecryptTransform),
}

/// Decrypts ciphertext written into it and forwards plaintext to `inner`.
pub struct DecryptWriter<W: Write> {
    inner: W,
    key: ContentKey,
    padding: Padding,
    state: IvState,
    skip: u64,
    remaining: Option<u64>,
}

impl<W: Write> fmt::Debug for DecryptWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptWriter")
            .field("padding", &self.padding)
            .field("iv_ready", &matches!(self.state, IvState::Ready(_)))
            .field("skip", &self.skip)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<W: Write> DecryptWriter<W> {
    /// Decrypt a whole object encrypted under `key` and `iv`.
    #[must_use]
    pub fn new(inner: W, key: ContentKey, iv: [u8; BLOCK_SIZE], padding: Padding) -> Self {
        let transform = DecryptTransform::new(&key, &iv, padding);
        Self {
            inner,
            key,
            padding,
            state: IvState::Ready(transform),
            skip: 0,
            remaining: None,
        }
    }

    /// Decrypt a ranged download described by `plan`.
    ///
    /// `material_iv` is used when the plan does not carry the IV in-stream.
    #[must_use]
    pub fn for_range(inner: W, key: ContentKey, material_iv: [u8; BLOCK_SIZE], plan: &RangePlan) -> Self {
        let state = if plan.iv_in_stream {
            IvState::Pending(Vec::with_capacity(BLOCK_SIZE))
        } else {
            IvState::Ready(DecryptTransform::new(&key, &material_iv, plan.padding))
        };
        Self {
            inner,
            key,
            padding: plan.padding,
            state,
            skip: plan.skip_plaintext,
            remaining: plan.take,
        }
    }

    /// Flush trailing plaintext, check padding, and hand back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let state = std::mem::replace(&mut self.state, IvState::Pending(Vec::new()));
        match state {
            IvState::Pending(buf) if buf.is_empty() => {}
            IvState::Pending(buf) => {
                return Err(to_io(EncryptionError::TruncatedCiphertext(buf.len())));
            }
            IvState::Ready(transform) => {
                let tail = transform.finalize().map_err(to_io)?;
                self.emit(&tail)?;
            }
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, mut plain: &[u8]) -> io::Result<()> {
        if self.skip > 0 {
            let dropped = usize::try_from(self.skip).unwrap_or(usize::MAX).min(plain.len());
            plain = &plain[dropped..];
            self.skip -= dropped as u64;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            let keep = usize::try_from(*remaining).unwrap_or(usize::MAX).min(plain.len());
            plain = &plain[..keep];
            *remaining -= keep as u64;
        }
        if plain.is_empty() {
            return Ok(());
        }
        self.inner.write_all(plain)
    }
}

impl<W: Write> Write for DecryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut input = buf;
        if let IvState::Pending(iv) = &mut self.state {
            let needed = BLOCK_SIZE - iv.len();
            let taken = needed.min(input.len());
            iv.extend_from_slice(&input[..taken]);
            input = &input[taken..];
            if iv.len() < BLOCK_SIZE {
                return Ok(buf.len());
            }
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(iv);
            self.state = IvState::Ready(DecryptTransform::new(&self.key, &block, self.padding));
        }
        if let IvState::Ready(transform) = &mut self.state {
            let plain = transform.update(input);
            self.emit(&plain)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn to_io(error: EncryptionError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{EncryptTransform, generate_iv};
    use crate::range::plan_encrypted_range;

    fn encrypt(key: &ContentKey, iv: &[u8; BLOCK_SIZE], padding: Padding, data: &[u8]) -> Vec<u8> {
        let mut transform = EncryptTransform::new(key, iv, padding);
        let mut out = transform.update(data);
        out.extend(transform.finalize().expect("test finalize"));
        out
    }

    fn read_range(plain: &[u8], offset: u64, count: Option<u64>, padding: Padding) -> Vec<u8> {
        let key = ContentKey::generate();
        let iv = generate_iv();
        let cipher = encrypt(&key, &iv, padding, plain);
        let plan = plan_encrypted_range(offset, count, cipher.len() as u64, padding == Padding::None)
            .expect("test plan");
        let (start, end) = plan.download_range();

        let mut out = Vec::new();
        let mut writer = DecryptWriter::for_range(&mut out, key, iv, &plan);
        for piece in cipher[start as usize..=end as usize].chunks(7) {
            writer.write_all(piece).expect("test write");
        }
        writer.finish().expect("test finish");
        out
    }

    #[test]
    fn test_should_decrypt_whole_object_in_small_writes() {
        let key = ContentKey::generate();
        let iv = generate_iv();
        let plain: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let cipher = encrypt(&key, &iv, Padding::Pkcs7, &plain);

        let mut out = Vec::new();
        let mut writer = DecryptWriter::new(&mut out, key, iv, Padding::Pkcs7);
        for piece in cipher.chunks(3) {
            writer.write_all(piece).expect("test write");
        }
        writer.finish().expect("test finish");
        assert_eq!(out, plain);
    }

    #[test]
    fn test_should_serve_ranges_across_block_boundaries() {
        let plain: Vec<u8> = (0..200u8).collect();
        for (offset, count) in [(0, Some(10)), (5, Some(40)), (17, Some(16)), (33, None), (190, Some(50)), (150, Some(41))] {
            let expected_end = count.map_or(plain.len(), |c| (offset + c).min(plain.len()));
            assert_eq!(
                read_range(&plain, offset as u64, count.map(|c| c as u64), Padding::Pkcs7),
                &plain[offset..expected_end],
                "offset {offset} count {count:?}"
            );
        }
    }

    #[test]
    fn test_should_serve_ranges_of_unpadded_objects() {
        let plain: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        assert_eq!(read_range(&plain, 600, Some(100), Padding::None), &plain[600..700]);
        assert_eq!(read_range(&plain, 512, None, Padding::None), &plain[512..]);
    }

    #[test]
    fn test_should_leave_destination_usable_after_finish() {
        let key = ContentKey::generate();
        let iv = generate_iv();
        let cipher = encrypt(&key, &iv, Padding::Pkcs7, b"payload");

        let mut destination = Vec::new();
        {
            let mut writer = DecryptWriter::new(&mut destination, key, iv, Padding::Pkcs7);
            writer.write_all(&cipher).expect("test write");
            writer.finish().expect("test finish");
        }
        destination.extend_from_slice(b"-more");
        assert_eq!(destination, b"payload-more");
    }

    #[test]
    fn test_should_fail_on_truncated_input() {
        let key = ContentKey::generate();
        let iv = generate_iv();
        let cipher = encrypt(&key, &iv, Padding::Pkcs7, b"0123456789abcdefXYZ");

        let mut out = Vec::new();
        let mut writer = DecryptWriter::new(&mut out, key, iv, Padding::Pkcs7);
        writer.write_all(&cipher[..20]).expect("test write");
        let err = writer.finish().expect_err("test expected error");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
