//! rustblob - upload a local file through a write stream and verify it.
//!
//! The file is written into an in-process [`InMemoryBlobService`] as a block,
//! page, or append object, optionally with client-side encryption, then read
//! back (whole and, optionally, as a range) and compared with the source.
//!
//! # Usage
//!
//! ```text
//! rustblob ./disk.img page --encrypt --range 4096:100
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUSTBLOB_CHUNK_SIZE` | `4194304` | Chunk size in bytes |
//! | `RUSTBLOB_PARALLELISM` | `4` | Uploads in flight per stream |
//! | `RUSTBLOB_TRANSACTIONAL_MD5` | `false` | Per-chunk MD5 |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rustblob_core::checksums::compute_md5;
use rustblob_core::types::PAGE_SIZE;
use rustblob_core::{ByteRange, ClientConfig, InMemoryBlobService, ObjectKind};
use rustblob_crypto::{EncryptionPolicy, SymmetricKey};
use rustblob_stream::{BlobClient, CommitSummary, ReadOptions, UploadOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytes handed to `write` per call. A multiple of the page size.
const WRITE_BUFFER: usize = 64 * 1024;

const KEY_ID: &str = "rustblob-local-kek";

#[derive(Debug, Parser)]
#[command(name = "rustblob", version, about = "Upload a file through rustblob and verify it")]
struct Cli {
    /// File to upload.
    file: PathBuf,

    /// Object kind: block, page, or append.
    #[arg(default_value = "block")]
    kind: ObjectKind,

    /// Encrypt client-side with a freshly generated key.
    #[arg(long)]
    encrypt: bool,

    /// Chunk size override in bytes.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Parallelism override.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Also read back `OFFSET:COUNT` (or `OFFSET:` for the rest).
    #[arg(long, value_parser = parse_range)]
    range: Option<ByteRange>,
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

fn parse_range(value: &str) -> Result<ByteRange, String> {
    let (offset, count) = value
        .split_once(':')
        .ok_or_else(|| format!("expected OFFSET:COUNT, got {value:?}"))?;
    let offset = offset
        .parse::<u64>()
        .map_err(|e| format!("invalid offset {offset:?}: {e}"))?;
    if count.is_empty() {
        return Ok(ByteRange::from_offset(offset));
    }
    let count = count
        .parse::<u64>()
        .map_err(|e| format!("invalid count {count:?}: {e}"))?;
    Ok(ByteRange::new(offset, count))
}

/// Zero-pad `content` to a whole number of pages.
fn pad_to_pages(content: &[u8]) -> Vec<u8> {
    let page = usize::try_from(PAGE_SIZE).unwrap_or(512);
    let mut padded = content.to_vec();
    padded.resize(content.len().div_ceil(page) * page, 0);
    padded
}

/// What one upload and read-back produced.
#[derive(Debug)]
struct Report {
    summary: CommitSummary,
    source_md5: String,
    read_back_md5: String,
    range_bytes: Option<u64>,
}

async fn round_trip(
    client: &BlobClient,
    key: &str,
    kind: ObjectKind,
    content: &[u8],
    range: Option<ByteRange>,
) -> Result<Report> {
    let payload = match kind {
        ObjectKind::Page => pad_to_pages(content),
        ObjectKind::Block | ObjectKind::Append => content.to_vec(),
    };
    let mut options = UploadOptions::builder().kind(kind).build();
    if kind == ObjectKind::Page {
        options.page_length = Some(payload.len() as u64);
    }

    let mut stream = client
        .open_write(key, options)
        .await
        .with_context(|| format!("failed to open {key} for writing"))?;
    for piece in payload.chunks(WRITE_BUFFER) {
        stream.write(piece)?;
    }
    let summary = stream.commit().await.context("commit failed")?;

    let mut reader = client.open_read(key, ReadOptions::default()).await?;
    let read_back = reader.read_all().await?;
    if read_back != payload {
        bail!(
            "read-back mismatch for {key}: wrote {} bytes, read {}",
            payload.len(),
            read_back.len()
        );
    }

    let range_bytes = match range {
        Some(range) => {
            let mut out = Vec::new();
            let n = reader.read_range_to(range, &mut out).await?;
            let expected = range
                .resolve(payload.len() as u64)
                .map_or(&[][..], |(start, end)| &payload[start as usize..=end as usize]);
            if out != expected {
                bail!("ranged read mismatch at offset {}", range.offset);
            }
            Some(n)
        }
        None => None,
    };

    Ok(Report {
        summary,
        source_md5: compute_md5(&payload),
        read_back_md5: compute_md5(&read_back),
        range_bytes,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env();
    init_tracing(&config.log_level)?;

    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(parallelism) = cli.parallelism {
        config.parallelism = parallelism;
    }

    let content = tokio::fs::read(&cli.file)
        .await
        .with_context(|| format!("cannot read {}", cli.file.display()))?;
    let key = cli
        .file
        .file_name()
        .map_or_else(|| "object".to_owned(), |name| name.to_string_lossy().into_owned());

    info!(
        file = %cli.file.display(),
        key = %key,
        kind = %cli.kind,
        size = content.len(),
        encrypt = cli.encrypt,
        chunk_size = config.chunk_size,
        parallelism = config.parallelism,
        version = VERSION,
        "starting upload"
    );

    let service = Arc::new(InMemoryBlobService::new());
    let mut client = BlobClient::new(service.clone(), config);
    if cli.encrypt {
        let policy = EncryptionPolicy::builder()
            .key(Arc::new(SymmetricKey::generate(KEY_ID)))
            .build();
        client = client.with_encryption(policy);
    }

    let report = round_trip(&client, &key, cli.kind, &content, cli.range).await?;
    let stored = service.properties(&key).map_or(0, |p| p.length);

    info!(
        key = %key,
        etag = ?report.summary.etag,
        chunks = report.summary.chunks,
        bytes_written = report.summary.bytes_written,
        bytes_stored = stored,
        md5 = %report.read_back_md5,
        range_bytes = ?report.range_bytes,
        "verified read-back"
    );
    println!("{}  {key}", report.source_md5);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
