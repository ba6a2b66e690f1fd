//! End-to-end tests for rustblob write and read streams.
//!
//! Every test runs against an [`InMemoryBlobService`], which can inject
//! faults and latency, so nothing here needs a running server.
//!
//! ```text
//! cargo test -p rustblob-integration
//! ```

use std::sync::{Arc, Once};

use rand::RngExt;
use rustblob_core::{ClientConfig, InMemoryBlobService};
use rustblob_crypto::{EncryptionPolicy, SymmetricKey};
use rustblob_stream::BlobClient;

mod test_append;
mod test_block;
mod test_concurrency;
mod test_encryption;
mod test_lifecycle;
mod test_page;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A configuration with small chunks and the given parallelism.
#[must_use]
pub fn small_config(chunk_size: usize, parallelism: usize) -> ClientConfig {
    ClientConfig::builder()
        .chunk_size(chunk_size)
        .min_chunk_size(1)
        .parallelism(parallelism)
        .build()
}

/// A fresh service and a client on it.
#[must_use]
pub fn client_with(config: ClientConfig) -> (Arc<InMemoryBlobService>, BlobClient) {
    init_tracing();
    let service = Arc::new(InMemoryBlobService::new());
    let client = BlobClient::new(service.clone(), config);
    (service, client)
}

/// An encryption policy holding a freshly generated key named `key_id`.
#[must_use]
pub fn policy_with_key(key_id: &str) -> (Arc<SymmetricKey>, EncryptionPolicy) {
    let key = Arc::new(SymmetricKey::generate(key_id));
    let policy = EncryptionPolicy::builder().key(key.clone()).build();
    (key, policy)
}

/// `len` random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}
