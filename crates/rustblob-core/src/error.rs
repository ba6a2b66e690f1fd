//! Error types shared by the rustblob crates.
//!
//! [`RequestError`] is the typed failure a [`crate::RequestExecutor`] returns.
//! It is cheap to clone so the same failure can be latched once and reported
//! to every later flush or commit.

/// Machine-readable error codes reported by the storage service.
pub mod codes {
    /// The append position precondition did not hold.
    pub const APPEND_POSITION_CONDITION_NOT_MET: &str = "AppendPositionConditionNotMet";
    /// The maximum object size precondition did not hold.
    pub const MAX_BLOB_SIZE_CONDITION_NOT_MET: &str = "MaxBlobSizeConditionNotMet";
    /// A generic conditional header did not hold.
    pub const CONDITION_NOT_MET: &str = "ConditionNotMet";
    /// The object does not exist.
    pub const BLOB_NOT_FOUND: &str = "BlobNotFound";
    /// The object exists but has a different type than the request expects.
    pub const INVALID_BLOB_TYPE: &str = "InvalidBlobType";
    /// The block list references a block that was never staged.
    pub const INVALID_BLOCK_LIST: &str = "InvalidBlockList";
    /// A page write is unaligned or outside the declared object length.
    pub const INVALID_PAGE_RANGE: &str = "InvalidPageRange";
    /// The requested byte range is not satisfiable.
    pub const INVALID_RANGE: &str = "InvalidRange";
    /// A header value (length, size) is not acceptable.
    pub const INVALID_HEADER_VALUE: &str = "InvalidHeaderValue";
    /// The supplied Content-MD5 does not match the payload.
    pub const MD5_MISMATCH: &str = "Md5Mismatch";
    /// The request body exceeds the maximum size for the operation.
    pub const REQUEST_BODY_TOO_LARGE: &str = "RequestBodyTooLarge";
    /// The executor returned a response that does not fit the request.
    pub const UNEXPECTED_RESPONSE: &str = "UnexpectedResponse";
    /// Catch-all for server-side failures.
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// A typed failure returned by the request executor.
///
/// `attempts` is the number of underlying transport attempts made for the
/// logical request (1 when no retry happened). The append path uses it as
/// evidence that an earlier attempt may already have been applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request failed with status {status} ({code}): {message}")]
pub struct RequestError {
    /// HTTP-style status code.
    pub status: u16,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Number of underlying attempts made for this request.
    pub attempts: u32,
}

impl RequestError {
    /// Create a failure observed on the first (and only) attempt.
    #[must_use]
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    /// Record how many underlying attempts were made.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// A `404 BlobNotFound` failure for `key`.
    #[must_use]
    pub fn not_found(key: &str) -> Self {
        Self::new(
            404,
            codes::BLOB_NOT_FOUND,
            format!("The specified blob does not exist: {key}"),
        )
    }

    /// The executor answered with a response variant the caller cannot use.
    #[must_use]
    pub fn unexpected_response(operation: &str) -> Self {
        Self::new(
            500,
            codes::UNEXPECTED_RESPONSE,
            format!("unexpected response for {operation}"),
        )
    }

    /// Whether this is one of the append preconditions (position or max size).
    #[must_use]
    pub fn is_append_precondition_failure(&self) -> bool {
        self.status == 412
            && (self.code == codes::APPEND_POSITION_CONDITION_NOT_MET
                || self.code == codes::MAX_BLOB_SIZE_CONDITION_NOT_MET)
    }

    /// Whether more than one underlying attempt was made.
    #[must_use]
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Core error type for configuration and identifier handling.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A block identifier is not valid base64 or does not follow the id layout.
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
