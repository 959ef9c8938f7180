//! Open logical services.

mod dispatcher;
mod system;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use xfs_config::XfsVersion;

use crate::cdm::{self, CdmEventRouter};
use crate::decode::{ResultDecoder, ResultType};
use crate::error::{EventError, ServiceError};
use crate::event::{RawResult, XfsEvent};
use crate::future::{CloseFuture, EmptyFuture, IntermediateListener, StdXfsFuture};
use crate::ids::{RequestId, ServiceId};
use crate::message::EventClasses;
use crate::queue::LoopError;
use crate::reporter::DispatchReporter;
use crate::transport::{
    ExecuteCommand, InfoCommand, NegotiatedVersion, OpenResponse, ServiceLink, Transport,
};

pub(crate) use dispatcher::ServiceCore;
pub use dispatcher::ServiceDispatcher;
pub use system::{
    AppDisconnect, DeviceState, DeviceStatus, ErrorAction, HardwareError, SystemEventListener,
    UndeliverableMessage, VersionError,
};

/// Device classes defined by the XFS standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Cash dispenser.
    Cdm,
    /// Printer.
    Ptr,
    /// Identification card reader.
    Idc,
    /// PIN pad.
    Pin,
    /// Sensors and indicators.
    Siu,
    /// Cash acceptor.
    Cim,
}

impl ServiceKind {
    /// Returns `true` when the engine can open services of this class.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Cdm)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cdm => "cdm",
            Self::Ptr => "ptr",
            Self::Idc => "idc",
            Self::Pin => "pin",
            Self::Siu => "siu",
            Self::Cim => "cim",
        };
        formatter.write_str(label)
    }
}

/// Error returned when parsing a service kind fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown service kind: {0}")]
pub struct ServiceKindParseError(String);

impl ServiceKindParseError {
    /// Returns the offending value.
    #[must_use]
    pub fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for ServiceKind {
    type Err = ServiceKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cdm" => Ok(Self::Cdm),
            "ptr" => Ok(Self::Ptr),
            "idc" => Ok(Self::Idc),
            "pin" => Ok(Self::Pin),
            "siu" => Ok(Self::Siu),
            "cim" => Ok(Self::Cim),
            other => Err(ServiceKindParseError(other.to_owned())),
        }
    }
}

/// Fans device-specific service and user events out to listeners.
pub trait DeviceEvents: Send + Sync {
    /// Handles an unsolicited device event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEvent`] for ids the device class does
    /// not define, or a decode failure.
    fn fire_service_event(&self, result: &RawResult) -> Result<(), EventError>;

    /// Handles an operator attention event.
    ///
    /// # Errors
    ///
    /// As [`fire_service_event`](Self::fire_service_event).
    fn fire_user_event(&self, result: &RawResult) -> Result<(), EventError>;
}

/// Device-class specific parts of an open service.
#[derive(Clone)]
pub(crate) enum Device {
    Cdm(Arc<CdmEventRouter>),
}

struct DeviceProfile {
    device: Device,
    events: Arc<dyn DeviceEvents>,
    decoder: Arc<dyn ResultDecoder>,
}

impl DeviceProfile {
    fn for_kind(kind: ServiceKind, version: XfsVersion) -> Result<Self, ServiceError> {
        match kind {
            ServiceKind::Cdm => {
                let decoder: Arc<dyn ResultDecoder> = Arc::new(cdm::decode_table(version));
                let router = Arc::new(CdmEventRouter::new(Arc::clone(&decoder)));
                Ok(Self {
                    device: Device::Cdm(Arc::clone(&router)),
                    events: router,
                    decoder,
                })
            }
            other => Err(ServiceError::UnsupportedKind { kind: other }),
        }
    }
}

struct ServiceInner {
    logical_name: String,
    kind: ServiceKind,
    version: NegotiatedVersion,
    spi_version: NegotiatedVersion,
    device: Device,
    dispatcher: ServiceDispatcher,
}

/// An open logical service. Clones share the same dispatcher.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn DispatchReporter>,
        logical_name: &str,
        kind: ServiceKind,
        response: &OpenResponse,
    ) -> Result<Self, ServiceError> {
        let profile = DeviceProfile::for_kind(kind, response.service_version.version)?;
        let dispatcher = ServiceDispatcher::new(
            ServiceLink::new(transport, response.service_id),
            profile.decoder,
            profile.events,
            reporter,
        );
        Ok(Self {
            inner: Arc::new(ServiceInner {
                logical_name: logical_name.to_owned(),
                kind,
                version: response.service_version.clone(),
                spi_version: response.spi_version.clone(),
                device: profile.device,
                dispatcher,
            }),
        })
    }

    /// Fails fast for classes without an implementation.
    pub(crate) const fn ensure_supported(kind: ServiceKind) -> Result<(), ServiceError> {
        if kind.is_supported() {
            Ok(())
        } else {
            Err(ServiceError::UnsupportedKind { kind })
        }
    }

    /// Handle the manager assigned to the service.
    #[must_use]
    pub fn id(&self) -> ServiceId {
        self.inner.dispatcher.service_id()
    }

    /// Logical name the service was opened with.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.inner.logical_name
    }

    /// Device class.
    #[must_use]
    pub fn kind(&self) -> ServiceKind {
        self.inner.kind
    }

    /// Negotiated service interface version.
    #[must_use]
    pub fn version(&self) -> &NegotiatedVersion {
        &self.inner.version
    }

    /// Negotiated provider interface version.
    #[must_use]
    pub fn spi_version(&self) -> &NegotiatedVersion {
        &self.inner.spi_version
    }

    /// Dispatcher owning this service's requests and events.
    #[must_use]
    pub fn dispatcher(&self) -> &ServiceDispatcher {
        &self.inner.dispatcher
    }

    /// Decoder selected for the negotiated version.
    #[must_use]
    pub fn decoder(&self) -> &Arc<dyn ResultDecoder> {
        self.inner.dispatcher.decoder()
    }

    /// Submits a device command.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::execute`].
    pub fn execute<T>(
        &self,
        command: &ExecuteCommand,
        listener: Option<Arc<dyn IntermediateListener>>,
    ) -> Result<StdXfsFuture<T>, ServiceError>
    where
        T: ResultType + Clone,
    {
        self.inner.dispatcher.execute(command, listener)
    }

    /// Submits an information query.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::get_info`].
    pub fn get_info<T>(&self, command: &InfoCommand) -> Result<StdXfsFuture<T>, ServiceError>
    where
        T: ResultType + Clone,
    {
        self.inner.dispatcher.get_info(command)
    }

    /// Requests exclusive use of the service.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::lock`].
    pub fn lock(&self, timeout: Option<Duration>) -> Result<EmptyFuture, ServiceError> {
        self.inner.dispatcher.lock(timeout)
    }

    /// Releases exclusive use of the service.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::unlock`].
    pub fn unlock(&self) -> Result<EmptyFuture, ServiceError> {
        self.inner.dispatcher.unlock()
    }

    /// Registers for the given event classes.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::register`].
    pub fn register(&self, classes: EventClasses) -> Result<EmptyFuture, ServiceError> {
        self.inner.dispatcher.register(classes)
    }

    /// Deregisters every event class, then closes the service.
    ///
    /// # Errors
    ///
    /// See [`ServiceDispatcher::deregister_and_close`].
    pub fn close(&self) -> Result<CloseFuture, ServiceError> {
        self.inner.dispatcher.deregister_and_close()
    }

    /// Asks the provider to cancel a pending request.
    ///
    /// # Errors
    ///
    /// Returns the transport failure when the cancel is refused.
    pub fn cancel(&self, request_id: RequestId) -> Result<(), ServiceError> {
        self.inner.dispatcher.cancel(request_id)
    }

    /// Adds a system event listener.
    pub fn add_system_listener(&self, listener: Arc<dyn SystemEventListener>) {
        self.inner.dispatcher.add_system_listener(listener);
    }

    /// Removes a system event listener.
    pub fn remove_system_listener(&self, listener: &Arc<dyn SystemEventListener>) {
        self.inner.dispatcher.remove_system_listener(listener);
    }

    pub(crate) fn device(&self) -> &Device {
        &self.inner.device
    }

    pub(crate) fn offer(&self, event: XfsEvent) {
        self.inner.dispatcher.offer(event);
    }

    pub(crate) fn stop(&self) -> Result<(), LoopError> {
        self.inner.dispatcher.stop()
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id())
            .field("logical_name", &self.inner.logical_name)
            .field("kind", &self.inner.kind)
            .field("version", &self.inner.version.version)
            .finish()
    }
}
