//! Per-service request submission and event dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::system::{
    AppDisconnect, DeviceStatus, HardwareError, SystemEventListener, UndeliverableMessage,
    VersionError,
};
use super::DeviceEvents;
use crate::decode::{ResultDecoder, ResultType, decode_as};
use crate::error::{DecodeError, EventError, ServiceError, TransportError};
use crate::event::{RawResult, ReleaseGuard, XfsEvent};
use crate::future::{
    CloseFuture, CloseState, EmptyFuture, EmptyState, IntermediateListener, StdXfsFuture,
    TypedState,
};
use crate::ids::{RequestId, ServiceId};
use crate::message::{EventClasses, MessageKind, SystemEventKind};
use crate::pending::PendingRequests;
use crate::queue::{EventHandler, EventLoop, Flow, LoopError};
use crate::reporter::{DispatchReporter, DropReason};
use crate::sync::lock;
use crate::transport::{ExecuteCommand, InfoCommand, ServiceLink, Transport};

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// State shared between a service's submitters and its worker thread.
pub(crate) struct ServiceCore {
    link: ServiceLink,
    pending: PendingRequests,
    decoder: Arc<dyn ResultDecoder>,
    events: Arc<dyn DeviceEvents>,
    system_listeners: Mutex<Vec<Arc<dyn SystemEventListener>>>,
    reporter: Arc<dyn DispatchReporter>,
    this: Weak<Self>,
}

impl ServiceCore {
    /// Submits a close and returns its future.
    pub(crate) fn close(&self) -> Result<EmptyFuture, ServiceError> {
        self.submit_empty(|transport, service| transport.close(service))
    }

    fn submit_empty<F>(&self, call: F) -> Result<EmptyFuture, ServiceError>
    where
        F: FnOnce(&dyn Transport, ServiceId) -> Result<RequestId, TransportError>,
    {
        let link = &self.link;
        self.pending
            .submit(|| {
                let request_id = call(link.transport(), link.service_id())?;
                Ok((request_id, Arc::new(EmptyState::new(link.clone(), request_id))))
            })
            .map(EmptyFuture::from_state)
    }

    fn complete(&self, message: MessageKind, result: &RawResult) {
        match result.request_id.and_then(|id| self.pending.take(id)) {
            Some(listener) => listener.on_complete(result),
            None => self.reporter.event_dropped(
                message,
                self.link.service_id(),
                DropReason::NoPendingRequest,
            ),
        }
    }

    fn intermediate(&self, result: &RawResult) {
        let Some(listener) = result.request_id.and_then(|id| self.pending.get(id)) else {
            self.reporter.event_dropped(
                MessageKind::ExecuteEvent,
                self.link.service_id(),
                DropReason::NoPendingRequest,
            );
            return;
        };
        self.shielded(MessageKind::ExecuteEvent, || {
            if let Err(error) = listener.on_intermediate(result) {
                self.log_event_error(MessageKind::ExecuteEvent, &error);
            }
        });
    }

    fn system_event(&self, result: &RawResult) {
        let Some(kind) = SystemEventKind::from_code(result.event_id) else {
            panic!(
                "service {} raised unrecognised system event {}",
                self.link.service_id(),
                result.event_id
            );
        };
        let listeners = lock(&self.system_listeners).clone();
        let outcome = match kind {
            SystemEventKind::UndeliverableMessage => {
                self.fan_out(result, &listeners, |l, v: &UndeliverableMessage| {
                    l.on_undeliverable_message(v);
                })
            }
            SystemEventKind::HardwareError => {
                self.fan_out(result, &listeners, |l, v: &HardwareError| l.on_hardware_error(v))
            }
            SystemEventKind::SoftwareError => {
                self.fan_out(result, &listeners, |l, v: &HardwareError| l.on_software_error(v))
            }
            SystemEventKind::UserError => {
                self.fan_out(result, &listeners, |l, v: &HardwareError| l.on_user_error(v))
            }
            SystemEventKind::FraudAttempt => {
                self.fan_out(result, &listeners, |l, v: &HardwareError| l.on_fraud_attempt(v))
            }
            SystemEventKind::DeviceStatus => {
                self.fan_out(result, &listeners, |l, v: &DeviceStatus| l.on_device_status(v))
            }
            SystemEventKind::AppDisconnect => {
                self.fan_out(result, &listeners, |l, v: &AppDisconnect| l.on_app_disconnect(v))
            }
            SystemEventKind::LockRequested => {
                for listener in &listeners {
                    self.shielded(MessageKind::SystemEvent, || listener.on_lock_requested());
                }
                Ok(())
            }
            SystemEventKind::VersionError => {
                decode_as::<VersionError>(self.decoder.as_ref(), &result.payload).map(|error| {
                    info!(
                        target: SERVICE_TARGET,
                        service = %self.link.service_id(),
                        logical_name = %error.logical_name,
                        version = %error.version.version,
                        "provider reported a version error"
                    );
                })
            }
        };
        if let Err(source) = outcome {
            let error = EventError::Decode {
                event_id: result.event_id,
                source,
            };
            self.log_event_error(MessageKind::SystemEvent, &error);
        }
    }

    fn fan_out<T, F>(
        &self,
        result: &RawResult,
        listeners: &[Arc<dyn SystemEventListener>],
        notify: F,
    ) -> Result<(), DecodeError>
    where
        T: ResultType,
        F: Fn(&dyn SystemEventListener, &T),
    {
        let value = decode_as::<T>(self.decoder.as_ref(), &result.payload)?;
        for listener in listeners {
            self.shielded(MessageKind::SystemEvent, || notify(listener.as_ref(), &value));
        }
        Ok(())
    }

    /// Runs application listener code on the worker. A panic is reported
    /// and swallowed so the service keeps dispatching.
    fn shielded<F>(&self, message: MessageKind, deliver: F)
    where
        F: FnOnce(),
    {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(deliver)) {
            self.reporter.listener_panicked(
                message,
                self.link.service_id(),
                panic_detail(payload.as_ref()),
            );
        }
    }

    fn log_event_error(&self, message: MessageKind, error: &EventError) {
        warn!(
            target: SERVICE_TARGET,
            service = %self.link.service_id(),
            message = %message,
            error = %error,
            "event could not be delivered to listeners"
        );
    }
}

impl EventHandler for ServiceCore {
    fn handle(&self, event: XfsEvent) -> Flow {
        let _release = ReleaseGuard::new(
            self.link.transport(),
            self.reporter.as_ref(),
            event.handle(),
        );
        let message = event.message();
        let result = event.result();
        debug!(
            target: SERVICE_TARGET,
            service = %self.link.service_id(),
            message = %message,
            request = ?result.request_id.map(RequestId::get),
            event_id = result.event_id,
            error_code = result.error_code,
            "dispatching event"
        );
        match message {
            MessageKind::CloseComplete => {
                self.complete(message, result);
                return Flow::Stop;
            }
            MessageKind::LockComplete
            | MessageKind::UnlockComplete
            | MessageKind::RegisterComplete
            | MessageKind::DeregisterComplete
            | MessageKind::GetInfoComplete
            | MessageKind::ExecuteComplete => self.complete(message, result),
            MessageKind::ExecuteEvent => self.intermediate(result),
            MessageKind::ServiceEvent => self.shielded(message, || {
                if let Err(error) = self.events.fire_service_event(result) {
                    self.log_event_error(message, &error);
                }
            }),
            MessageKind::UserEvent => self.shielded(message, || {
                if let Err(error) = self.events.fire_user_event(result) {
                    self.log_event_error(message, &error);
                }
            }),
            MessageKind::SystemEvent => self.system_event(result),
            // Opens complete at the top level before a service exists.
            MessageKind::OpenComplete | MessageKind::TimerEvent => self.reporter.event_dropped(
                message,
                self.link.service_id(),
                DropReason::Unroutable,
            ),
        }
        Flow::Continue
    }

    fn reject(&self, event: XfsEvent) {
        let _release = ReleaseGuard::new(
            self.link.transport(),
            self.reporter.as_ref(),
            event.handle(),
        );
        self.reporter.event_dropped(
            event.message(),
            event.service_id(),
            DropReason::DispatcherStopped,
        );
    }

    fn worker_started(&self, worker: &str) {
        self.reporter.worker_started(worker);
    }

    fn worker_stopped(&self, worker: &str) {
        self.pending.abandon_all();
        self.reporter.worker_stopped(worker);
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Submits requests for one service and drains the events routed to it on
/// a dedicated worker thread named `xfs-service-<id>`.
///
/// The worker stops after handling a close completion. Events offered after
/// that are released without dispatch, and requests still pending fail with
/// [`ServiceError::Stopped`].
pub struct ServiceDispatcher {
    core: Arc<ServiceCore>,
    events: EventLoop<ServiceCore>,
}

impl ServiceDispatcher {
    pub(crate) fn new(
        link: ServiceLink,
        decoder: Arc<dyn ResultDecoder>,
        events: Arc<dyn DeviceEvents>,
        reporter: Arc<dyn DispatchReporter>,
    ) -> Self {
        let service_id = link.service_id();
        let core = Arc::new_cyclic(|this| ServiceCore {
            link,
            pending: PendingRequests::new(service_id),
            decoder,
            events,
            system_listeners: Mutex::new(Vec::new()),
            reporter,
            this: this.clone(),
        });
        let worker = EventLoop::new(format!("xfs-service-{service_id}"), Arc::clone(&core));
        Self {
            core,
            events: worker,
        }
    }

    /// Handle of the service this dispatcher serves.
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.core.link.service_id()
    }

    /// Number of requests awaiting completion.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.core.pending.len()
    }

    /// Submits a bare close.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn close(&self) -> Result<EmptyFuture, ServiceError> {
        self.core.close()
    }

    /// Deregisters every event class, then closes the service.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the deregistration or the
    /// dispatcher has stopped.
    pub fn deregister_and_close(&self) -> Result<CloseFuture, ServiceError> {
        let core = &self.core;
        core.pending
            .submit(|| {
                let request_id = core
                    .link
                    .transport()
                    .deregister(core.link.service_id(), EventClasses::all())?;
                let state = CloseState::new(core.link.clone(), core.this.clone(), request_id);
                Ok((request_id, Arc::new(state)))
            })
            .map(CloseFuture::from_state)
    }

    /// Submits a device command. Intermediate events for the command go to
    /// `listener`.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn execute<T>(
        &self,
        command: &ExecuteCommand,
        listener: Option<Arc<dyn IntermediateListener>>,
    ) -> Result<StdXfsFuture<T>, ServiceError>
    where
        T: ResultType + Clone,
    {
        let core = &self.core;
        core.pending
            .submit(|| {
                let request_id = core.link.transport().execute(core.link.service_id(), command)?;
                let state = TypedState::<T>::new(
                    core.link.clone(),
                    request_id,
                    Arc::clone(&core.decoder),
                    listener,
                );
                Ok((request_id, Arc::new(state)))
            })
            .map(StdXfsFuture::from_state)
    }

    /// Submits an information query.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn get_info<T>(&self, command: &InfoCommand) -> Result<StdXfsFuture<T>, ServiceError>
    where
        T: ResultType + Clone,
    {
        let core = &self.core;
        core.pending
            .submit(|| {
                let request_id = core.link.transport().get_info(core.link.service_id(), command)?;
                let state = TypedState::<T>::new(
                    core.link.clone(),
                    request_id,
                    Arc::clone(&core.decoder),
                    None,
                );
                Ok((request_id, Arc::new(state)))
            })
            .map(StdXfsFuture::from_state)
    }

    /// Requests exclusive use of the service.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn lock(&self, timeout: Option<Duration>) -> Result<EmptyFuture, ServiceError> {
        self.core
            .submit_empty(|transport, service| transport.lock(service, timeout))
    }

    /// Releases exclusive use of the service.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn unlock(&self) -> Result<EmptyFuture, ServiceError> {
        self.core
            .submit_empty(|transport, service| transport.unlock(service))
    }

    /// Registers for the given event classes.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn register(&self, classes: EventClasses) -> Result<EmptyFuture, ServiceError> {
        self.core
            .submit_empty(|transport, service| transport.register(service, classes))
    }

    /// Deregisters the given event classes.
    ///
    /// # Errors
    ///
    /// Fails when the transport refuses the submission or the dispatcher
    /// has stopped.
    pub fn deregister(&self, classes: EventClasses) -> Result<EmptyFuture, ServiceError> {
        self.core
            .submit_empty(|transport, service| transport.deregister(service, classes))
    }

    /// Asks the provider to cancel a pending request.
    ///
    /// # Errors
    ///
    /// Returns the transport failure when the cancel is refused.
    pub fn cancel(&self, request_id: RequestId) -> Result<(), ServiceError> {
        self.core.link.cancel(request_id).map_err(ServiceError::from)
    }

    /// Adds a system event listener.
    pub fn add_system_listener(&self, listener: Arc<dyn SystemEventListener>) {
        lock(&self.core.system_listeners).push(listener);
    }

    /// Removes a listener previously added with
    /// [`add_system_listener`](Self::add_system_listener).
    pub fn remove_system_listener(&self, listener: &Arc<dyn SystemEventListener>) {
        lock(&self.core.system_listeners).retain(|known| !Arc::ptr_eq(known, listener));
    }

    /// Queues an event for the worker thread.
    pub(crate) fn offer(&self, event: XfsEvent) {
        self.events.offer(event);
    }

    /// Stops the worker, releases queued events and fails pending requests.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::WorkerPanicked`] when the worker died handling
    /// an event.
    pub fn stop(&self) -> Result<(), LoopError> {
        let outcome = self.events.stop();
        self.core.pending.abandon_all();
        outcome
    }

    /// Returns `true` once the worker no longer accepts events.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.events.is_closed()
    }

    pub(crate) fn decoder(&self) -> &Arc<dyn ResultDecoder> {
        &self.core.decoder
    }
}
