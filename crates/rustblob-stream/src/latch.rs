//! Sticky first-error latch shared by concurrent chunk uploads.

use parking_lot::Mutex;
use rustblob_core::RequestError;

/// Remembers the first failure and ignores every later one.
#[derive(Debug, Default)]
pub struct FaultLatch {
    error: Mutex<Option<RequestError>>,
}

impl FaultLatch {
    /// Create an empty latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `error` if the latch is empty. Returns whether it was stored.
    pub fn try_set(&self, error: RequestError) -> bool {
        let mut slot = self.error.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    /// The stored error, if any.
    #[must_use]
    pub fn get(&self) -> Option<RequestError> {
        self.error.lock().clone()
    }

    /// Whether an error has been stored.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.error.lock().is_some()
    }
}
