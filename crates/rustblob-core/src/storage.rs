//! In-memory request executor.
//!
//! [`InMemoryBlobService`] implements [`RequestExecutor`] against objects held
//! in [`DashMap`]s. It enforces the same layout rules a real service does
//! (page alignment, append preconditions, block list validation) and adds the
//! hooks tests need:
//!
//! - a journal of every request in the order it reached the executor,
//! - fault rules that fail the Nth request of an operation, either before it
//!   is applied or after (a lost acknowledgement),
//! - an artificial latency plus an in-flight high-water mark, used to observe
//!   the upload concurrency bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::checksums;
use crate::error::{RequestError, codes};
use crate::request::{AppendCondition, BlobRequest, BlobResponse, Operation, RequestExecutor};
use crate::types::{BlockId, MAX_CHUNK_SIZE, Metadata, ObjectKind, ObjectProperties, PAGE_SIZE, PageRange};

/// Composite key identifying an uncommitted block: `(object_key, block_id)`.
type BlockKey = (String, String);

// ---------------------------------------------------------------------------
// StoredBlob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredBlob {
    kind: ObjectKind,
    data: Vec<u8>,
    content_md5: Option<String>,
    metadata: Metadata,
    etag: String,
    committed_blocks: HashMap<String, Bytes>,
    committed_block_count: u32,
    written_pages: Vec<PageRange>,
}

impl StoredBlob {
    fn new(kind: ObjectKind, data: Vec<u8>, metadata: Metadata, etag: String) -> Self {
        Self {
            kind,
            data,
            content_md5: None,
            metadata,
            etag,
            committed_blocks: HashMap::new(),
            committed_block_count: 0,
            written_pages: Vec::new(),
        }
    }

    fn properties(&self) -> ObjectProperties {
        ObjectProperties {
            kind: self.kind,
            length: self.data.len() as u64,
            content_md5: self.content_md5.clone(),
            etag: self.etag.clone(),
            metadata: self.metadata.clone(),
            committed_block_count: match self.kind {
                ObjectKind::Page => None,
                ObjectKind::Block | ObjectKind::Append => Some(self.committed_block_count),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultTiming {
    BeforeApply,
    AfterApply,
}

#[derive(Debug, Clone)]
struct FaultRule {
    operation: Operation,
    nth: usize,
    timing: FaultTiming,
    error: RequestError,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// InMemoryBlobService
// ---------------------------------------------------------------------------

/// Scriptable in-process storage service.
///
/// # Examples
///
/// ```
/// use rustblob_core::{BlobRequest, InMemoryBlobService, ObjectKind, RequestExecutor};
///
/// # tokio_test::block_on(async {
/// let service = InMemoryBlobService::new();
/// service
///     .execute(BlobRequest::CreateObject {
///         key: "logs/a.log".to_owned(),
///         kind: ObjectKind::Append,
///         length: None,
///         metadata: Default::default(),
///     })
///     .await
///     .unwrap();
/// assert_eq!(service.properties("logs/a.log").unwrap().length, 0);
/// # });
/// ```
pub struct InMemoryBlobService {
    blobs: DashMap<String, StoredBlob>,
    uncommitted: DashMap<BlockKey, Bytes>,
    snapshots: DashMap<String, StoredBlob>,
    journal: Mutex<Vec<BlobRequest>>,
    request_counts: Mutex<HashMap<Operation, usize>>,
    faults: Mutex<Vec<FaultRule>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    etag_seq: AtomicU64,
}

impl std::fmt::Debug for InMemoryBlobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobService")
            .field("blobs_count", &self.blobs.len())
            .field("uncommitted_count", &self.uncommitted.len())
            .field("snapshots_count", &self.snapshots.len())
            .field("journal_len", &self.journal.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBlobService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBlobService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        debug!("creating InMemoryBlobService");
        Self {
            blobs: DashMap::new(),
            uncommitted: DashMap::new(),
            snapshots: DashMap::new(),
            journal: Mutex::new(Vec::new()),
            request_counts: Mutex::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            etag_seq: AtomicU64::new(0),
        }
    }

    /// Fail the `nth` (1-based) request of `operation` without applying it.
    pub fn fail_nth(&self, operation: Operation, nth: usize, error: RequestError) {
        self.faults.lock().push(FaultRule {
            operation,
            nth,
            timing: FaultTiming::BeforeApply,
            error,
        });
    }

    /// Apply the `nth` (1-based) request of `operation`, then report `error`
    /// instead of the success.
    ///
    /// Models an acknowledgement lost after the service accepted the write.
    pub fn fail_after_apply(&self, operation: Operation, nth: usize, error: RequestError) {
        self.faults.lock().push(FaultRule {
            operation,
            nth,
            timing: FaultTiming::AfterApply,
            error,
        });
    }

    /// Delay every request by `latency` before it is applied.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn journal(&self) -> Vec<BlobRequest> {
        self.journal.lock().clone()
    }

    /// Requests of one operation, in arrival order.
    #[must_use]
    pub fn requests_of(&self, operation: Operation) -> Vec<BlobRequest> {
        self.journal
            .lock()
            .iter()
            .filter(|r| r.operation() == operation)
            .cloned()
            .collect()
    }

    /// Number of requests of `operation` received so far.
    #[must_use]
    pub fn request_count(&self, operation: Operation) -> usize {
        self.request_counts
            .lock()
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of requests observed executing at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Committed content of `key`.
    #[must_use]
    pub fn object_data(&self, key: &str) -> Option<Bytes> {
        self.blobs
            .get(key)
            .map(|blob| Bytes::copy_from_slice(&blob.data))
    }

    /// Properties of `key`.
    #[must_use]
    pub fn properties(&self, key: &str) -> Option<ObjectProperties> {
        self.blobs.get(key).map(|blob| blob.properties())
    }

    /// Content of a snapshot returned by a `Snapshot` request.
    #[must_use]
    pub fn snapshot_data(&self, snapshot: &str) -> Option<Bytes> {
        self.snapshots
            .get(snapshot)
            .map(|blob| Bytes::copy_from_slice(&blob.data))
    }

    /// Number of staged but uncommitted blocks for `key`.
    #[must_use]
    pub fn uncommitted_block_count(&self, key: &str) -> usize {
        self.uncommitted.iter().filter(|e| e.key().0 == key).count()
    }

    /// Store an object directly, bypassing the request path.
    pub fn insert_object(&self, key: &str, kind: ObjectKind, data: Bytes, metadata: Metadata) {
        let etag = self.next_etag();
        let mut blob = StoredBlob::new(kind, data.to_vec(), metadata, etag);
        if kind == ObjectKind::Page && !data.is_empty() {
            blob.written_pages.push(PageRange {
                start: 0,
                end: data.len() as u64 - 1,
            });
        }
        self.blobs.insert(key.to_owned(), blob);
    }

    fn next_etag(&self) -> String {
        let seq = self.etag_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("\"0x{seq:016X}\"")
    }

    fn record(&self, request: &BlobRequest) -> usize {
        self.journal.lock().push(request.clone());
        let mut counts = self.request_counts.lock();
        let count = counts.entry(request.operation()).or_insert(0);
        *count += 1;
        *count
    }

    fn fault_for(&self, operation: Operation, nth: usize, timing: FaultTiming) -> Option<RequestError> {
        self.faults
            .lock()
            .iter()
            .find(|rule| rule.operation == operation && rule.nth == nth && rule.timing == timing)
            .map(|rule| rule.error.clone())
    }

    // -----------------------------------------------------------------------
    // Request application
    // -----------------------------------------------------------------------

    fn apply(&self, request: BlobRequest) -> Result<BlobResponse, RequestError> {
        match request {
            BlobRequest::CreateObject {
                key,
                kind,
                length,
                metadata,
            } => self.create_object(&key, kind, length, metadata),
            BlobRequest::PutBlock {
                key,
                block_id,
                data,
                content_md5,
            } => self.put_block(&key, &block_id, data, content_md5.as_deref()),
            BlobRequest::PutBlockList {
                key,
                block_ids,
                content_md5,
                metadata,
            } => self.put_block_list(&key, &block_ids, content_md5, metadata),
            BlobRequest::SetProperties { key, content_md5 } => {
                let mut blob = self
                    .blobs
                    .get_mut(&key)
                    .ok_or_else(|| RequestError::not_found(&key))?;
                blob.content_md5 = content_md5;
                blob.etag = self.next_etag();
                Ok(BlobResponse::PropertiesSet {
                    etag: blob.etag.clone(),
                })
            }
            BlobRequest::PutPage {
                key,
                offset,
                data,
                content_md5,
            } => self.put_page(&key, offset, &data, content_md5.as_deref()),
            BlobRequest::AppendBlock {
                key,
                data,
                condition,
                content_md5,
            } => self.append_block(&key, &data, condition, content_md5.as_deref()),
            BlobRequest::GetPageRanges { key } => {
                let blob = self
                    .blobs
                    .get(&key)
                    .ok_or_else(|| RequestError::not_found(&key))?;
                expect_kind(&blob, ObjectKind::Page)?;
                Ok(BlobResponse::PageRanges(merge_page_ranges(&blob.written_pages)))
            }
            BlobRequest::Snapshot { key } => {
                let blob = self
                    .blobs
                    .get(&key)
                    .ok_or_else(|| RequestError::not_found(&key))?
                    .clone();
                let snapshot = format!(
                    "{key}?snapshot={:016x}",
                    self.etag_seq.fetch_add(1, Ordering::SeqCst) + 1
                );
                debug!(key = %key, snapshot = %snapshot, "took snapshot");
                self.snapshots.insert(snapshot.clone(), blob);
                Ok(BlobResponse::Snapshot { snapshot })
            }
            BlobRequest::GetProperties { key } => self
                .blobs
                .get(&key)
                .map(|blob| BlobResponse::Properties(blob.properties()))
                .ok_or_else(|| RequestError::not_found(&key)),
            BlobRequest::GetObject { key, range } => {
                let blob = self
                    .blobs
                    .get(&key)
                    .ok_or_else(|| RequestError::not_found(&key))?;
                let data = match range {
                    None => Bytes::copy_from_slice(&blob.data),
                    Some((start, end)) => {
                        let len = blob.data.len() as u64;
                        if start >= len || end < start {
                            return Err(RequestError::new(
                                416,
                                codes::INVALID_RANGE,
                                format!("range {start}-{end} not satisfiable for length {len}"),
                            ));
                        }
                        let end = end.min(len - 1);
                        Bytes::copy_from_slice(&blob.data[to_index(start)..=to_index(end)])
                    }
                };
                Ok(BlobResponse::Object {
                    data,
                    properties: blob.properties(),
                })
            }
        }
    }

    fn create_object(
        &self,
        key: &str,
        kind: ObjectKind,
        length: Option<u64>,
        metadata: Metadata,
    ) -> Result<BlobResponse, RequestError> {
        let data = match kind {
            ObjectKind::Page => {
                let length = length.ok_or_else(|| {
                    RequestError::new(400, codes::INVALID_HEADER_VALUE, "page objects need a length")
                })?;
                if length % PAGE_SIZE != 0 {
                    return Err(RequestError::new(
                        400,
                        codes::INVALID_HEADER_VALUE,
                        format!("page object length {length} is not a multiple of {PAGE_SIZE}"),
                    ));
                }
                vec![0u8; to_index(length)]
            }
            ObjectKind::Block | ObjectKind::Append => Vec::new(),
        };
        let etag = self.next_etag();
        debug!(key = %key, kind = %kind, "created object");
        self.uncommitted.retain(|(k, _), _| k != key);
        self.blobs
            .insert(key.to_owned(), StoredBlob::new(kind, data, metadata, etag.clone()));
        Ok(BlobResponse::Created { etag })
    }

    fn put_block(
        &self,
        key: &str,
        block_id: &BlockId,
        data: Bytes,
        content_md5: Option<&str>,
    ) -> Result<BlobResponse, RequestError> {
        check_body_size(data.len())?;
        check_md5(&data, content_md5)?;
        if let Some(blob) = self.blobs.get(key) {
            expect_kind(&blob, ObjectKind::Block)?;
        }
        trace!(key = %key, block_id = %block_id, size = data.len(), "staged block");
        self.uncommitted
            .insert((key.to_owned(), block_id.as_str().to_owned()), data);
        Ok(BlobResponse::BlockStaged)
    }

    fn put_block_list(
        &self,
        key: &str,
        block_ids: &[BlockId],
        content_md5: Option<String>,
        metadata: Metadata,
    ) -> Result<BlobResponse, RequestError> {
        let previous = self.blobs.get(key).map(|blob| blob.clone());
        if let Some(blob) = &previous {
            expect_kind(blob, ObjectKind::Block)?;
        }

        let mut data = Vec::new();
        let mut committed = HashMap::with_capacity(block_ids.len());
        for id in block_ids {
            let staged = self
                .uncommitted
                .get(&(key.to_owned(), id.as_str().to_owned()))
                .map(|b| b.clone())
                .or_else(|| {
                    previous
                        .as_ref()
                        .and_then(|blob| blob.committed_blocks.get(id.as_str()).cloned())
                })
                .ok_or_else(|| {
                    RequestError::new(
                        400,
                        codes::INVALID_BLOCK_LIST,
                        format!("block {id} was never staged"),
                    )
                })?;
            data.extend_from_slice(&staged);
            committed.insert(id.as_str().to_owned(), staged);
        }

        let etag = self.next_etag();
        let mut blob = StoredBlob::new(ObjectKind::Block, data, metadata, etag.clone());
        blob.content_md5 = content_md5;
        blob.committed_block_count = u32::try_from(block_ids.len()).unwrap_or(u32::MAX);
        blob.committed_blocks = committed;

        debug!(key = %key, blocks = block_ids.len(), size = blob.data.len(), "committed block list");
        self.uncommitted.retain(|(k, _), _| k != key);
        self.blobs.insert(key.to_owned(), blob);
        Ok(BlobResponse::Committed { etag })
    }

    fn put_page(
        &self,
        key: &str,
        offset: u64,
        data: &[u8],
        content_md5: Option<&str>,
    ) -> Result<BlobResponse, RequestError> {
        check_body_size(data.len())?;
        let len = data.len() as u64;
        if len == 0 || offset % PAGE_SIZE != 0 || len % PAGE_SIZE != 0 {
            return Err(RequestError::new(
                400,
                codes::INVALID_PAGE_RANGE,
                format!("page write {offset}+{len} is not aligned to {PAGE_SIZE}"),
            ));
        }
        check_md5(data, content_md5)?;

        let mut blob = self
            .blobs
            .get_mut(key)
            .ok_or_else(|| RequestError::not_found(key))?;
        expect_kind(&blob, ObjectKind::Page)?;
        if offset + len > blob.data.len() as u64 {
            return Err(RequestError::new(
                416,
                codes::INVALID_PAGE_RANGE,
                format!(
                    "page write {offset}+{len} exceeds object length {}",
                    blob.data.len()
                ),
            ));
        }

        let start = to_index(offset);
        blob.data[start..start + data.len()].copy_from_slice(data);
        blob.written_pages.push(PageRange {
            start: offset,
            end: offset + len - 1,
        });
        blob.etag = self.next_etag();
        trace!(key = %key, offset, size = len, "wrote pages");
        Ok(BlobResponse::PageWritten {
            etag: blob.etag.clone(),
        })
    }

    fn append_block(
        &self,
        key: &str,
        data: &[u8],
        condition: AppendCondition,
        content_md5: Option<&str>,
    ) -> Result<BlobResponse, RequestError> {
        check_body_size(data.len())?;
        check_md5(data, content_md5)?;

        let mut blob = self
            .blobs
            .get_mut(key)
            .ok_or_else(|| RequestError::not_found(key))?;
        expect_kind(&blob, ObjectKind::Append)?;

        let current = blob.data.len() as u64;
        if let Some(max_size) = condition.max_size {
            if current + data.len() as u64 > max_size {
                return Err(RequestError::new(
                    412,
                    codes::MAX_BLOB_SIZE_CONDITION_NOT_MET,
                    format!("append of {} bytes would exceed {max_size}", data.len()),
                ));
            }
        }
        if let Some(position) = condition.append_position {
            if position != current {
                return Err(RequestError::new(
                    412,
                    codes::APPEND_POSITION_CONDITION_NOT_MET,
                    format!("append position {position} does not match length {current}"),
                ));
            }
        }

        blob.data.extend_from_slice(data);
        blob.committed_block_count += 1;
        blob.etag = self.next_etag();
        trace!(key = %key, offset = current, size = data.len(), "appended block");
        Ok(BlobResponse::Appended {
            etag: blob.etag.clone(),
            append_offset: current,
            committed_block_count: blob.committed_block_count,
        })
    }
}

#[async_trait]
impl RequestExecutor for InMemoryBlobService {
    async fn execute(&self, request: BlobRequest) -> Result<BlobResponse, RequestError> {
        let operation = request.operation();
        let nth = self.record(&request);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        trace!(operation = %operation, key = %request.key(), nth, "executing request");

        if let Some(error) = self.fault_for(operation, nth, FaultTiming::BeforeApply) {
            debug!(operation = %operation, nth, error = %error, "injected fault");
            return Err(error);
        }
        let response = self.apply(request)?;
        if let Some(error) = self.fault_for(operation, nth, FaultTiming::AfterApply) {
            debug!(operation = %operation, nth, error = %error, "injected fault after apply");
            return Err(error);
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn expect_kind(blob: &StoredBlob, kind: ObjectKind) -> Result<(), RequestError> {
    if blob.kind == kind {
        Ok(())
    } else {
        Err(RequestError::new(
            409,
            codes::INVALID_BLOB_TYPE,
            format!("object is a {}, not a {kind}", blob.kind),
        ))
    }
}

fn check_body_size(len: usize) -> Result<(), RequestError> {
    if len > MAX_CHUNK_SIZE {
        return Err(RequestError::new(
            413,
            codes::REQUEST_BODY_TOO_LARGE,
            format!("body of {len} bytes exceeds {MAX_CHUNK_SIZE}"),
        ));
    }
    Ok(())
}

fn check_md5(data: &[u8], content_md5: Option<&str>) -> Result<(), RequestError> {
    if let Some(expected) = content_md5 {
        let actual = checksums::compute_content_md5(data);
        if actual != expected {
            return Err(RequestError::new(
                400,
                codes::MD5_MISMATCH,
                format!("content md5 {expected} does not match {actual}"),
            ));
        }
    }
    Ok(())
}

/// Sort and coalesce overlapping or adjacent ranges.
fn merge_page_ranges(ranges: &[PageRange]) -> Vec<PageRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);
    let mut merged: Vec<PageRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + 1 => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}
