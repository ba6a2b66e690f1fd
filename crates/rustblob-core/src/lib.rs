//! Core types, configuration, and the request executor contract for rustblob.
//!
//! This crate holds the building blocks shared by the upload engine and the
//! envelope-encryption layer: object kinds and identifiers, the typed request
//! and response descriptors handed to the transport, the cloneable transport
//! failure, client configuration, and content hashing.
//!
//! It also ships [`InMemoryBlobService`], a scriptable in-process executor
//! used by tests and the demo binary.
//!
//! # Architecture
//!
//! ```text
//! BlobWriteStream / BlobReadStream   (rustblob-stream)
//!        |
//!        v
//!   BlobRequest --> RequestExecutor --> BlobResponse | RequestError
//!                        |
//!                        v
//!          transport (HTTP, retries, signing) or InMemoryBlobService
//! ```

pub mod checksums;
pub mod config;
pub mod error;
pub mod request;
pub mod storage;
pub mod types;

pub use config::ClientConfig;
pub use error::{CoreError, CoreResult, RequestError};
pub use request::{AppendCondition, BlobRequest, BlobResponse, Operation, RequestExecutor};
pub use storage::InMemoryBlobService;
pub use types::{BlockId, ByteRange, Metadata, ObjectKind, ObjectProperties, PageRange};
