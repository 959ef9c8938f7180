//! Error types surfaced by the engine.

use std::fmt;
use std::time::Duration;

use strum::Display;
use thiserror::Error;
use xfs_config::XfsVersion;

use crate::decode::ResultKind;
use crate::ids::{RequestId, ServiceId};
use crate::service::ServiceKind;

/// Result codes reported by the manager and providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XfsErrorCode {
    /// The request was cancelled.
    Canceled,
    /// The device is not ready.
    DeviceNotReady,
    /// The device reported a hardware fault.
    HardwareError,
    /// The provider hit an internal fault.
    InternalError,
    /// The service handle is not valid.
    InvalidService,
    /// The request id is not known.
    InvalidRequestId,
    /// The service is locked by another application.
    Locked,
    /// Unlock was requested on a service that is not locked.
    NotLocked,
    /// The manager has not been started.
    NotStarted,
    /// Another operation is already in progress.
    OperationInProgress,
    /// The logical service was not found.
    ServiceNotFound,
    /// The request timed out.
    Timeout,
    /// The information category is not supported.
    UnsupportedCategory,
    /// The command is not supported.
    UnsupportedCommand,
    /// Any other code, kept verbatim.
    Other(i32),
}

impl XfsErrorCode {
    /// Maps a raw result code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -4 => Self::Canceled,
            -13 => Self::DeviceNotReady,
            -14 => Self::HardwareError,
            -15 => Self::InternalError,
            -22 => Self::InvalidService,
            -27 => Self::InvalidRequestId,
            -32 => Self::Locked,
            -37 => Self::NotLocked,
            -39 => Self::NotStarted,
            -41 => Self::OperationInProgress,
            -43 => Self::ServiceNotFound,
            -48 => Self::Timeout,
            -49 => Self::UnsupportedCategory,
            -50 => Self::UnsupportedCommand,
            other => Self::Other(other),
        }
    }

    /// Raw result code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Canceled => -4,
            Self::DeviceNotReady => -13,
            Self::HardwareError => -14,
            Self::InternalError => -15,
            Self::InvalidService => -22,
            Self::InvalidRequestId => -27,
            Self::Locked => -32,
            Self::NotLocked => -37,
            Self::NotStarted => -39,
            Self::OperationInProgress => -41,
            Self::ServiceNotFound => -43,
            Self::Timeout => -48,
            Self::UnsupportedCategory => -49,
            Self::UnsupportedCommand => -50,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for XfsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Canceled => "canceled",
            Self::DeviceNotReady => "device not ready",
            Self::HardwareError => "hardware error",
            Self::InternalError => "internal error",
            Self::InvalidService => "invalid service handle",
            Self::InvalidRequestId => "invalid request id",
            Self::Locked => "locked",
            Self::NotLocked => "not locked",
            Self::NotStarted => "not started",
            Self::OperationInProgress => "operation in progress",
            Self::ServiceNotFound => "service not found",
            Self::Timeout => "timeout",
            Self::UnsupportedCategory => "unsupported category",
            Self::UnsupportedCommand => "unsupported command",
            Self::Other(code) => return write!(f, "error code {code}"),
        };
        write!(f, "{label} ({})", self.code())
    }
}

/// A completion that carried a non-zero result code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request {request} completed with {code}")]
pub struct XfsError {
    code: XfsErrorCode,
    request: RequestLabel,
}

impl XfsError {
    /// Builds an error from a raw result code.
    #[must_use]
    pub const fn new(code: i32, request_id: Option<RequestId>) -> Self {
        Self {
            code: XfsErrorCode::from_code(code),
            request: RequestLabel(request_id),
        }
    }

    /// Decoded result code.
    #[must_use]
    pub const fn code(&self) -> XfsErrorCode {
        self.code
    }

    /// Request the completion belonged to, if any.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        self.request.0
    }

    /// Returns `true` when the request was cancelled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self.code, XfsErrorCode::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestLabel(Option<RequestId>);

impl fmt::Display for RequestLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("<none>"),
        }
    }
}

/// Manager entry points a [`TransportError`] can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransportOperation {
    /// `WFSStartUp`.
    StartUp,
    /// `WFSCleanUp`.
    CleanUp,
    /// `WFSCreateAppHandle`.
    CreateAppHandle,
    /// `WFSDestroyAppHandle`.
    DestroyAppHandle,
    /// Attaching the delivery sink.
    Attach,
    /// `WFSAsyncOpen`.
    Open,
    /// `WFSAsyncClose`.
    Close,
    /// `WFSAsyncLock`.
    Lock,
    /// `WFSAsyncUnlock`.
    Unlock,
    /// `WFSAsyncRegister`.
    Register,
    /// `WFSAsyncDeregister`.
    Deregister,
    /// `WFSAsyncExecute`.
    Execute,
    /// `WFSAsyncGetInfo`.
    GetInfo,
    /// `WFSCancelAsyncRequest`.
    Cancel,
    /// `WFSFreeResult`.
    FreeResult,
}

/// A synchronous failure returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport call {operation} failed: {message}")]
pub struct TransportError {
    operation: TransportOperation,
    code: Option<XfsErrorCode>,
    message: String,
}

impl TransportError {
    /// Builds an error carrying a free-form message.
    pub fn new(operation: TransportOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
        }
    }

    /// Builds an error from a manager result code.
    #[must_use]
    pub fn from_code(operation: TransportOperation, code: i32) -> Self {
        let decoded = XfsErrorCode::from_code(code);
        Self {
            operation,
            code: Some(decoded),
            message: decoded.to_string(),
        }
    }

    /// Entry point that failed.
    #[must_use]
    pub const fn operation(&self) -> TransportOperation {
        self.operation
    }

    /// Manager result code, when one was reported.
    #[must_use]
    pub const fn code(&self) -> Option<XfsErrorCode> {
        self.code
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failures turning a raw payload into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No layout is registered for the negotiated version.
    #[error("no {kind} layout supports version {version}")]
    Unsupported {
        /// Requested result kind.
        kind: ResultKind,
        /// Negotiated service version.
        version: XfsVersion,
    },
    /// A value was expected but the payload was empty.
    #[error("{kind} payload is empty")]
    EmptyPayload {
        /// Requested result kind.
        kind: ResultKind,
    },
    /// The payload did not match the selected layout.
    #[error("malformed {kind} payload: {message}")]
    Malformed {
        /// Requested result kind.
        kind: ResultKind,
        /// Parser diagnostic.
        message: String,
    },
    /// The decoded value did not fit the caller's type.
    #[error("{kind} value does not fit the requested type: {message}")]
    TypeMismatch {
        /// Requested result kind.
        kind: ResultKind,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors returned by service operations and their futures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The transport refused the submission.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The request completed with a failure code.
    #[error(transparent)]
    Completion(#[from] XfsError),
    /// The completion payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// No implementation exists for the requested service class.
    #[error("service kind {kind} is not supported")]
    UnsupportedKind {
        /// Requested service class.
        kind: ServiceKind,
    },
    /// Command input could not be serialised.
    #[error("failed to encode command input: {message}")]
    Encode {
        /// Serialiser diagnostic.
        message: String,
    },
    /// A service of one class was used as another.
    #[error("service {service_id} is a {actual} service, not {expected}")]
    KindMismatch {
        /// Service handle.
        service_id: ServiceId,
        /// Class the caller asked for.
        expected: ServiceKind,
        /// Class the service was opened as.
        actual: ServiceKind,
    },
    /// The manager issued a request id that is still pending.
    #[error("request {request_id} is already pending")]
    DuplicateRequest {
        /// Reused request id.
        request_id: RequestId,
    },
    /// The caller stopped waiting before the request completed.
    #[error("request did not complete within {timeout:?}")]
    WaitTimeout {
        /// Elapsed wait.
        timeout: Duration,
    },
    /// The dispatcher that owned the request has shut down.
    #[error("the dispatcher for service {service_id} has stopped")]
    Stopped {
        /// Service handle.
        service_id: ServiceId,
    },
}

impl ServiceError {
    /// Returns `true` when the request was cancelled by the provider.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Completion(error) if error.is_canceled())
    }
}

/// Failures while fanning an event out to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The event id is not defined for the device class.
    #[error("unknown {class} event id {event_id}")]
    UnknownEvent {
        /// Event class, e.g. `service` or `execute`.
        class: &'static str,
        /// Raw event id.
        event_id: u32,
    },
    /// The event payload could not be decoded.
    #[error("failed to decode event {event_id}: {source}")]
    Decode {
        /// Raw event id.
        event_id: u32,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },
    /// The request has no intermediate event handling.
    #[error("request {request_id} does not accept intermediate events")]
    IntermediateUnsupported {
        /// Request the event was addressed to.
        request_id: RequestId,
    },
}
