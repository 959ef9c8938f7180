use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::ServiceError;
use crate::sync::{lock, wait, wait_timeout};

/// Write-once outcome slot shared between a listener and its waiters.
pub(crate) struct Promise<T> {
    outcome: Mutex<Option<Result<T, ServiceError>>>,
    ready: Condvar,
}

impl<T: Clone> Promise<T> {
    pub(crate) const fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stores `outcome` unless one is already present. Returns whether the
    /// value was stored.
    pub(crate) fn complete(&self, outcome: Result<T, ServiceError>) -> bool {
        let mut slot = lock(&self.outcome);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.ready.notify_all();
        true
    }

    pub(crate) fn wait(&self) -> Result<T, ServiceError> {
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = wait(&self.ready, slot);
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Result<T, ServiceError> {
        let deadline = Instant::now() + timeout;
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ServiceError::WaitTimeout { timeout });
            }
            (slot, _) = wait_timeout(&self.ready, slot, remaining);
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        lock(&self.outcome).is_some()
    }
}
