//! Client configuration.
//!
//! Provides [`ClientConfig`] for the write and read paths. Values are loaded
//! from environment variables and can be overridden per stream.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{CoreError, CoreResult};
use crate::types::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, ObjectKind};

/// Default number of concurrent chunk uploads.
pub const DEFAULT_PARALLELISM: usize = 4;

/// rustblob client configuration.
///
/// # Examples
///
/// ```
/// use rustblob_core::config::ClientConfig;
///
/// let config = ClientConfig::default();
/// assert_eq!(config.chunk_size, 4 * 1024 * 1024);
/// assert_eq!(config.parallelism, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Size of one dispatched chunk in bytes.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Smallest chunk size accepted by validation.
    #[builder(default = DEFAULT_MIN_CHUNK_SIZE)]
    pub min_chunk_size: usize,

    /// Maximum number of chunk uploads in flight per stream.
    #[builder(default = DEFAULT_PARALLELISM)]
    pub parallelism: usize,

    /// Whether to store a whole-object MD5 at commit. `None` picks the
    /// per-kind default (on for block objects, off otherwise).
    #[builder(default)]
    pub store_object_md5: Option<bool>,

    /// Whether to attach a per-chunk MD5 to every chunk request.
    #[builder(default = false)]
    pub transactional_md5: bool,

    /// Whether reads must fail when an object carries no encryption record.
    #[builder(default = false)]
    pub require_encryption: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            store_object_md5: None,
            transactional_md5: false,
            require_encryption: false,
            log_level: String::from("info"),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RUSTBLOB_CHUNK_SIZE` | `4194304` |
    /// | `RUSTBLOB_MIN_CHUNK_SIZE` | `16384` |
    /// | `RUSTBLOB_PARALLELISM` | `4` |
    /// | `RUSTBLOB_STORE_OBJECT_MD5` | *(unset: per kind)* |
    /// | `RUSTBLOB_TRANSACTIONAL_MD5` | `false` |
    /// | `RUSTBLOB_REQUIRE_ENCRYPTION` | `false` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("RUSTBLOB_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                config.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("RUSTBLOB_MIN_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                config.min_chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("RUSTBLOB_PARALLELISM") {
            if let Ok(n) = v.parse::<usize>() {
                config.parallelism = n;
            }
        }
        if let Ok(v) = std::env::var("RUSTBLOB_STORE_OBJECT_MD5") {
            config.store_object_md5 = Some(parse_bool(&v));
        }
        if let Ok(v) = std::env::var("RUSTBLOB_TRANSACTIONAL_MD5") {
            config.transactional_md5 = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("RUSTBLOB_REQUIRE_ENCRYPTION") {
            config.require_encryption = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check the chunking parameters for a stream targeting `kind`.
    pub fn validate_for(&self, kind: ObjectKind) -> CoreResult<()> {
        if self.parallelism == 0 {
            return Err(CoreError::Config("parallelism must be at least 1".to_owned()));
        }
        if self.chunk_size < self.min_chunk_size || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(CoreError::Config(format!(
                "chunk size {} must be between {} and {MAX_CHUNK_SIZE}",
                self.chunk_size, self.min_chunk_size
            )));
        }
        if kind.is_block_aligned() && self.chunk_size as u64 % crate::types::PAGE_SIZE != 0 {
            return Err(CoreError::Config(format!(
                "chunk size {} must be a multiple of {} for page objects",
                self.chunk_size,
                crate::types::PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Whether a whole-object MD5 is stored for `kind` under this configuration.
    #[must_use]
    pub fn stores_object_md5(&self, kind: ObjectKind) -> bool {
        self.store_object_md5
            .unwrap_or(matches!(kind, ObjectKind::Block))
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
