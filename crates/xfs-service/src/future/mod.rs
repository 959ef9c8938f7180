//! Completion futures returned by service operations.
//!
//! Every future is resolved exactly once by the dispatcher that owns its
//! request. Callers block on [`XfsFuture::get`]; outcomes are cached, so
//! repeated calls return the same result.

mod close;
mod empty;
mod open;
mod promise;
mod typed;

use std::time::Duration;

use crate::error::{EventError, ServiceError, XfsError};
use crate::event::RawResult;
use crate::ids::RequestId;

pub use close::CloseFuture;
pub use empty::EmptyFuture;
pub use open::OpenFuture;
pub use typed::StdXfsFuture;

pub(crate) use close::CloseState;
pub(crate) use empty::EmptyState;
pub(crate) use open::OpenState;
pub(crate) use typed::TypedState;

/// Handle on an asynchronous request.
pub trait XfsFuture {
    /// Value produced on success.
    type Output;

    /// Blocks until the request completes.
    ///
    /// # Errors
    ///
    /// Returns the completion, decode or chaining failure that ended the
    /// request.
    fn get(&self) -> Result<Self::Output, ServiceError>;

    /// Blocks for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::WaitTimeout`] when the request is still
    /// pending, otherwise as [`get`](Self::get).
    fn get_timeout(&self, timeout: Duration) -> Result<Self::Output, ServiceError>;

    /// Asks the provider to cancel the request currently in flight.
    ///
    /// # Errors
    ///
    /// Returns the transport failure when the cancel is refused.
    fn cancel(&self) -> Result<(), ServiceError>;

    /// Request id currently in flight for this future.
    fn request_id(&self) -> RequestId;

    /// Returns `true` once [`get`](Self::get) would not block.
    fn is_done(&self) -> bool;
}

/// Receives intermediate execute events for a command in flight.
pub trait IntermediateListener: Send + Sync {
    /// Handles one intermediate event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when the event id is unknown or its payload
    /// cannot be decoded.
    fn on_intermediate_event(&self, result: &RawResult) -> Result<(), EventError>;
}

/// Maps a completion's result code to an outcome.
pub(crate) fn completion_outcome(result: &RawResult) -> Result<(), ServiceError> {
    if result.is_success() {
        Ok(())
    } else {
        Err(XfsError::new(result.error_code, result.request_id).into())
    }
}
