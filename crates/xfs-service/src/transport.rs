//! Boundary between the engine and the native XFS manager.
//!
//! Submissions return the manager-assigned [`RequestId`] immediately; their
//! completions arrive later through a [`DeliverySink`] on a thread the
//! transport owns.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xfs_config::{VersionRange, XfsVersion};

use crate::error::TransportError;
use crate::event::{Payload, RawResult};
use crate::ids::{AppHandle, RequestId, ResultHandle, ServiceId};
use crate::message::EventClasses;

/// Parameters for opening a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParams {
    logical_name: String,
    app_handle: Option<AppHandle>,
    app_id: Option<String>,
    trace_level: u32,
    timeout: Option<Duration>,
    versions_required: VersionRange,
}

impl OpenParams {
    /// Opens `logical_name` with default settings.
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            app_handle: None,
            app_id: None,
            trace_level: 0,
            timeout: None,
            versions_required: VersionRange::SUPPORTED,
        }
    }

    /// Sets the application handle.
    #[must_use]
    pub const fn with_app_handle(mut self, handle: AppHandle) -> Self {
        self.app_handle = Some(handle);
        self
    }

    /// Sets the application identifier.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the provider trace level.
    #[must_use]
    pub const fn with_trace_level(mut self, level: u32) -> Self {
        self.trace_level = level;
        self
    }

    /// Sets the open timeout. `None` waits indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the acceptable service versions.
    #[must_use]
    pub const fn with_versions_required(mut self, versions: VersionRange) -> Self {
        self.versions_required = versions;
        self
    }

    /// Logical service name from the manager configuration.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Application handle, if any.
    #[must_use]
    pub const fn app_handle(&self) -> Option<AppHandle> {
        self.app_handle
    }

    /// Application identifier, if any.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Provider trace level.
    #[must_use]
    pub const fn trace_level(&self) -> u32 {
        self.trace_level
    }

    /// Open timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Acceptable service versions.
    #[must_use]
    pub const fn versions_required(&self) -> VersionRange {
        self.versions_required
    }
}

/// Version details agreed with the manager or a provider (`WFSVERSION`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedVersion {
    /// Version both sides will use.
    pub version: XfsVersion,
    /// Lowest version the other side supports.
    pub low_version: XfsVersion,
    /// Highest version the other side supports.
    pub high_version: XfsVersion,
    /// Free-form description from the other side.
    #[serde(default)]
    pub description: String,
}

impl NegotiatedVersion {
    /// A negotiation that settled on `version` with no wider range.
    pub fn exact(version: XfsVersion) -> Self {
        Self {
            version,
            low_version: version,
            high_version: version,
            description: String::new(),
        }
    }
}

/// Immediate outcome of an open submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResponse {
    /// Request id of the pending open.
    pub request_id: RequestId,
    /// Handle assigned to the new service.
    pub service_id: ServiceId,
    /// Service interface version.
    pub service_version: NegotiatedVersion,
    /// Provider interface version.
    pub spi_version: NegotiatedVersion,
}

/// A device command submitted through `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteCommand {
    /// Device command code.
    pub command: u32,
    /// Command input.
    pub data: Payload,
    /// Command timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ExecuteCommand {
    /// A command without input data.
    #[must_use]
    pub const fn new(command: u32) -> Self {
        Self {
            command,
            data: Payload::empty(),
            timeout: None,
        }
    }

    /// Attaches command input.
    #[must_use]
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Sets the command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An information query submitted through `get_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoCommand {
    /// Information category code.
    pub category: u32,
    /// Query input.
    pub query: Payload,
    /// Query timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl InfoCommand {
    /// A query without input data.
    #[must_use]
    pub const fn new(category: u32) -> Self {
        Self {
            category,
            query: Payload::empty(),
            timeout: None,
        }
    }

    /// Attaches query input.
    #[must_use]
    pub fn with_query(mut self, query: Payload) -> Self {
        self.query = query;
        self
    }
}

/// Receives raw messages from the transport's delivery thread.
pub trait DeliverySink: Send + Sync {
    /// Accepts a message. Returns `false` when the code is not an XFS
    /// message, in which case the caller keeps ownership of the result.
    fn deliver(&self, message: u32, handle: ResultHandle, result: RawResult) -> bool;
}

/// Native manager calls used by the engine.
pub trait Transport: Send + Sync {
    /// Starts the manager session and negotiates its version.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects every version in `versions`.
    fn start_up(&self, versions: VersionRange) -> Result<NegotiatedVersion, TransportError>;

    /// Ends the manager session.
    ///
    /// # Errors
    ///
    /// Fails when the manager cannot tear the session down.
    fn clean_up(&self) -> Result<(), TransportError>;

    /// Creates the application handle passed with every open.
    ///
    /// # Errors
    ///
    /// Fails when the manager refuses a new handle.
    fn create_app_handle(&self) -> Result<AppHandle, TransportError>;

    /// Destroys an application handle.
    ///
    /// # Errors
    ///
    /// Fails when the handle is unknown.
    fn destroy_app_handle(&self, handle: AppHandle) -> Result<(), TransportError>;

    /// Starts routing manager messages to `sink`.
    ///
    /// # Errors
    ///
    /// Fails when the delivery thread cannot be started.
    fn attach(&self, sink: Arc<dyn DeliverySink>) -> Result<(), TransportError>;

    /// Stops routing manager messages.
    fn detach(&self);

    /// Submits an asynchronous open.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn open(&self, params: &OpenParams) -> Result<OpenResponse, TransportError>;

    /// Submits an asynchronous close.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn close(&self, service: ServiceId) -> Result<RequestId, TransportError>;

    /// Submits an asynchronous lock.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn lock(&self, service: ServiceId, timeout: Option<Duration>)
    -> Result<RequestId, TransportError>;

    /// Submits an asynchronous unlock.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn unlock(&self, service: ServiceId) -> Result<RequestId, TransportError>;

    /// Submits an asynchronous event registration.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn register(&self, service: ServiceId, classes: EventClasses)
    -> Result<RequestId, TransportError>;

    /// Submits an asynchronous event deregistration.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn deregister(
        &self,
        service: ServiceId,
        classes: EventClasses,
    ) -> Result<RequestId, TransportError>;

    /// Submits an asynchronous command.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn execute(
        &self,
        service: ServiceId,
        command: &ExecuteCommand,
    ) -> Result<RequestId, TransportError>;

    /// Submits an asynchronous information query.
    ///
    /// # Errors
    ///
    /// Fails when the manager rejects the submission.
    fn get_info(
        &self,
        service: ServiceId,
        command: &InfoCommand,
    ) -> Result<RequestId, TransportError>;

    /// Asks the provider to cancel a pending request.
    ///
    /// # Errors
    ///
    /// Fails when the request is unknown or already finished.
    fn cancel(&self, service: ServiceId, request: RequestId) -> Result<(), TransportError>;

    /// Frees the manager buffer behind a delivered result.
    ///
    /// # Errors
    ///
    /// Fails when the handle was already freed.
    fn free_result(&self, handle: ResultHandle) -> Result<(), TransportError>;
}

/// A service handle bound to the transport that owns it.
#[derive(Clone)]
pub(crate) struct ServiceLink {
    transport: Arc<dyn Transport>,
    service_id: ServiceId,
}

impl ServiceLink {
    pub(crate) fn new(transport: Arc<dyn Transport>, service_id: ServiceId) -> Self {
        Self {
            transport,
            service_id,
        }
    }

    pub(crate) const fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn cancel(&self, request: RequestId) -> Result<(), TransportError> {
        self.transport.cancel(self.service_id, request)
    }
}
