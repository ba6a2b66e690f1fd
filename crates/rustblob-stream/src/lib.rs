//! Buffered, chunked, concurrent upload streams for rustblob.
//!
//! A [`BlobWriteStream`] accepts bytes synchronously, cuts them into chunks,
//! and uploads the chunks in the background with bounded parallelism. Block,
//! page, and append objects differ only in how a chunk is addressed and how
//! the object is finalized ([`UploadTarget`]).
//!
//! ```text
//! BlobClient::open_write --> BlobWriteStream
//!                              |  write()   (sync, never waits on I/O)
//!                              v
//!                          WriteSession ---- chunk ----> Dispatcher
//!                                                          | ConcurrencyLimiter
//!                                                          | CompletionTracker
//!                                                          | FaultLatch
//!                                                          v
//!                                                   RequestExecutor
//! ```
//!
//! Reads go through [`BlobReadStream`], which decrypts objects written with
//! client-side encryption and maps plaintext ranges onto cipher blocks.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod latch;
pub mod limiter;
pub mod options;
pub mod reader;
pub mod session;
pub mod target;
pub mod tracker;
pub mod writer;

pub use client::BlobClient;
pub use error::{UploadError, UploadResult};
pub use options::{ReadOptions, UploadOptions};
pub use reader::BlobReadStream;
pub use session::SessionState;
pub use target::{Chunk, ChunkId, UploadTarget};
pub use writer::{BlobWriteStream, CommitSummary, FlushStatus};
