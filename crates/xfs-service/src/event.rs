//! Raw results and the events that carry them through the dispatch tiers.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ids::{RequestId, ResultHandle, ServiceId};
use crate::message::MessageKind;
use crate::reporter::DispatchReporter;
use crate::transport::Transport;

/// Opaque bytes attached to a result. Payloads are JSON documents whose
/// layout depends on the result kind and the negotiated version.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload(Option<Arc<[u8]>>);

impl Payload {
    /// A payload carrying no data.
    #[must_use]
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        if bytes.is_empty() {
            Self(None)
        } else {
            Self(Some(Arc::from(bytes)))
        }
    }

    /// Serialises `value` as a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error when `value` cannot be represented.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::new)
    }

    /// Raw bytes, or `None` for an empty payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Returns `true` when no data is attached.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(bytes) => write!(f, "Payload({} bytes)", bytes.len()),
            None => f.write_str("Payload(empty)"),
        }
    }
}

/// Result record delivered with every completion and event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    /// Request the result belongs to. Unsolicited events carry none.
    pub request_id: Option<RequestId>,
    /// Service that produced the result.
    pub service_id: ServiceId,
    /// Zero on success, a negative manager code otherwise.
    pub error_code: i32,
    /// Event id or command code, depending on the message.
    pub event_id: u32,
    /// Attached data.
    pub payload: Payload,
}

impl RawResult {
    /// A successful completion of `request_id` without data.
    #[must_use]
    pub const fn completion(service_id: ServiceId, request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            service_id,
            error_code: 0,
            event_id: 0,
            payload: Payload::empty(),
        }
    }

    /// An event with id `event_id` raised by `service_id`.
    #[must_use]
    pub const fn event(service_id: ServiceId, event_id: u32) -> Self {
        Self {
            request_id: None,
            service_id,
            error_code: 0,
            event_id,
            payload: Payload::empty(),
        }
    }

    /// Attaches the request the result belongs to.
    #[must_use]
    pub const fn for_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Replaces the result code.
    #[must_use]
    pub const fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Returns `true` when the result code is zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error_code == 0
    }
}

/// A decoded manager message travelling through the queues.
///
/// Exactly one component owns an event at any time; that owner either
/// forwards it or releases its result handle.
#[derive(Debug)]
pub struct XfsEvent {
    message: MessageKind,
    handle: ResultHandle,
    result: RawResult,
}

impl XfsEvent {
    pub(crate) const fn new(message: MessageKind, handle: ResultHandle, result: RawResult) -> Self {
        Self {
            message,
            handle,
            result,
        }
    }

    /// Message kind.
    #[must_use]
    pub const fn message(&self) -> MessageKind {
        self.message
    }

    /// Manager buffer backing the result.
    #[must_use]
    pub const fn handle(&self) -> ResultHandle {
        self.handle
    }

    /// Result record.
    #[must_use]
    pub const fn result(&self) -> &RawResult {
        &self.result
    }

    /// Service the result belongs to.
    #[must_use]
    pub const fn service_id(&self) -> ServiceId {
        self.result.service_id
    }
}

/// Frees a result buffer when dropped, including during unwinding.
pub(crate) struct ReleaseGuard<'a> {
    transport: &'a dyn Transport,
    reporter: &'a dyn DispatchReporter,
    handle: ResultHandle,
}

impl<'a> ReleaseGuard<'a> {
    pub(crate) fn new(
        transport: &'a dyn Transport,
        reporter: &'a dyn DispatchReporter,
        handle: ResultHandle,
    ) -> Self {
        Self {
            transport,
            reporter,
            handle,
        }
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.transport.free_result(self.handle) {
            self.reporter.release_failed(self.handle, &error);
        }
    }
}
