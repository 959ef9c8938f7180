//! Process-wide routing of manager messages to open services.
//!
//! The transport hands every message to [`EventDispatcher::deliver`], which
//! only enqueues it. A single worker thread (`xfs-dispatch`) then completes
//! opens, consumes version errors, and forwards everything else to the
//! owning service's dispatcher, preserving delivery order per service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::decode::{DecodeTable, decode_as};
use crate::error::ServiceError;
use crate::event::{RawResult, ReleaseGuard, XfsEvent};
use crate::future::{OpenFuture, OpenState, XfsFuture};
use crate::ids::{ResultHandle, ServiceId};
use crate::message::{MessageKind, SystemEventKind};
use crate::pending::PendingRequests;
use crate::queue::{EventHandler, EventLoop, Flow, LoopError};
use crate::reporter::{DispatchReporter, DropReason, StructuredDispatchReporter};
use crate::service::{Service, ServiceKind, VersionError};
use crate::sync::lock;
use crate::transport::{DeliverySink, OpenParams, Transport};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Name of the top-level worker thread.
pub const DISPATCH_THREAD_NAME: &str = "xfs-dispatch";

/// Requests owned by the top level are opens, which have no service yet.
const PROCESS_SCOPE: ServiceId = ServiceId::new(0);

struct DispatchCore {
    transport: Arc<dyn Transport>,
    requests: PendingRequests,
    services: Mutex<HashMap<ServiceId, Service>>,
    reporter: Arc<dyn DispatchReporter>,
}

impl DispatchCore {
    fn release(&self, handle: ResultHandle) -> ReleaseGuard<'_> {
        ReleaseGuard::new(self.transport.as_ref(), self.reporter.as_ref(), handle)
    }

    fn complete_open(&self, event: &XfsEvent) {
        let _release = self.release(event.handle());
        let result = event.result();
        let Some(listener) = result.request_id.and_then(|id| self.requests.take(id)) else {
            self.reporter.event_dropped(
                event.message(),
                event.service_id(),
                DropReason::NoPendingRequest,
            );
            return;
        };
        listener.on_complete(result);
        if !result.is_success() {
            self.discard_service(result.service_id);
        }
    }

    /// Drops a service whose open failed. It never registered, so there is
    /// nothing to close.
    fn discard_service(&self, service_id: ServiceId) {
        let removed = lock(&self.services).remove(&service_id);
        if let Some(service) = removed {
            if let Err(stop_error) = service.stop() {
                warn!(
                    target: DISPATCH_TARGET,
                    service = %service_id,
                    error = %stop_error,
                    "service worker ended abnormally"
                );
            }
            self.reporter.service_closed(service_id);
        }
    }

    fn dispatch_system_event(&self, event: XfsEvent) {
        let kind = SystemEventKind::from_code(event.result().event_id);
        if kind == Some(SystemEventKind::VersionError) {
            let _release = self.release(event.handle());
            log_version_error(event.result());
            return;
        }
        self.route(event);
    }

    fn route(&self, event: XfsEvent) {
        let service_id = event.service_id();
        let target = {
            let mut services = lock(&self.services);
            // The service worker stops on every close-complete, failed or not.
            if event.message() == MessageKind::CloseComplete {
                services.remove(&service_id)
            } else {
                services.get(&service_id).cloned()
            }
        };
        let Some(service) = target else {
            let _release = self.release(event.handle());
            self.reporter
                .event_dropped(event.message(), service_id, DropReason::UnknownService);
            return;
        };
        let closing = event.message() == MessageKind::CloseComplete;
        service.offer(event);
        if closing {
            self.reporter.service_closed(service_id);
        }
    }
}

fn log_version_error(result: &RawResult) {
    let decoder = DecodeTable::new(xfs_config::XfsVersion::V3_30);
    match decode_as::<VersionError>(&decoder, &result.payload) {
        Ok(version_error) => info!(
            target: DISPATCH_TARGET,
            service = %result.service_id,
            logical_name = %version_error.logical_name,
            app_id = %version_error.app_id,
            version = %version_error.version.version,
            low_version = %version_error.version.low_version,
            high_version = %version_error.version.high_version,
            "manager reported a version error"
        ),
        Err(decode_error) => warn!(
            target: DISPATCH_TARGET,
            service = %result.service_id,
            error = %decode_error,
            "unreadable version error payload"
        ),
    }
}

impl EventHandler for DispatchCore {
    fn handle(&self, event: XfsEvent) -> Flow {
        debug!(
            target: DISPATCH_TARGET,
            message = %event.message(),
            service = %event.service_id(),
            handle = %event.handle(),
            "routing event"
        );
        match event.message() {
            MessageKind::OpenComplete => self.complete_open(&event),
            MessageKind::SystemEvent => self.dispatch_system_event(event),
            MessageKind::TimerEvent => {
                let _release = self.release(event.handle());
                self.reporter.event_dropped(
                    event.message(),
                    event.service_id(),
                    DropReason::Unroutable,
                );
            }
            _ => self.route(event),
        }
        Flow::Continue
    }

    fn reject(&self, event: XfsEvent) {
        let _release = self.release(event.handle());
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
        self.requests.abandon_all();
        self.reporter.worker_stopped(worker);
    }
}

/// Top-level dispatcher shared by every service opened through one
/// transport.
pub struct EventDispatcher {
    core: Arc<DispatchCore>,
    events: EventLoop<DispatchCore>,
}

impl EventDispatcher {
    /// Builds a dispatcher that reports through `tracing`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_reporter(transport, Arc::new(StructuredDispatchReporter::new()))
    }

    /// Builds a dispatcher with a custom reporter.
    #[must_use]
    pub fn with_reporter(
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn DispatchReporter>,
    ) -> Self {
        let core = Arc::new(DispatchCore {
            transport,
            requests: PendingRequests::new(PROCESS_SCOPE),
            services: Mutex::new(HashMap::new()),
            reporter,
        });
        let events = EventLoop::new(DISPATCH_THREAD_NAME, Arc::clone(&core));
        Self { core, events }
    }

    /// Submits an open for a service of class `kind`.
    ///
    /// The service joins the routing table before this returns. The
    /// returned future resolves once the open and the follow-up event
    /// registration both succeed.
    ///
    /// # Errors
    ///
    /// Fails for unsupported classes, when the transport refuses the
    /// submission, or after [`stop`](Self::stop).
    pub fn open(&self, params: &OpenParams, kind: ServiceKind) -> Result<OpenFuture, ServiceError> {
        Service::ensure_supported(kind)?;
        let core = &self.core;
        core.requests
            .submit(|| {
                let response = core.transport.open(params)?;
                let service = Service::new(
                    Arc::clone(&core.transport),
                    Arc::clone(&core.reporter),
                    params.logical_name(),
                    kind,
                    &response,
                )?;
                lock(&core.services).insert(response.service_id, service.clone());
                core.reporter
                    .service_opened(response.service_id, params.logical_name(), kind);
                Ok((
                    response.request_id,
                    Arc::new(OpenState::new(service, response.request_id)),
                ))
            })
            .map(OpenFuture::from_state)
    }

    /// Accepts a raw manager message.
    ///
    /// Returns `false` for timer messages and codes outside the XFS range;
    /// the caller keeps ownership of those results. Everything else is
    /// queued and released exactly once by whichever dispatcher ends up
    /// owning it.
    pub fn deliver(&self, message: u32, handle: ResultHandle, result: RawResult) -> bool {
        let Some(kind) = MessageKind::from_code(message) else {
            return false;
        };
        if kind == MessageKind::TimerEvent {
            return false;
        }
        self.events.offer(XfsEvent::new(kind, handle, result));
        true
    }

    /// Returns the open service with handle `service_id`.
    #[must_use]
    pub fn service(&self, service_id: ServiceId) -> Option<Service> {
        lock(&self.core.services).get(&service_id).cloned()
    }

    /// Handles of every service in the routing table.
    #[must_use]
    pub fn open_services(&self) -> Vec<ServiceId> {
        let mut ids: Vec<_> = lock(&self.core.services).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of opens awaiting completion.
    #[must_use]
    pub fn pending_opens(&self) -> usize {
        self.core.requests.len()
    }

    /// Closes every open service, waiting for each close to finish, then
    /// stops the worker threads.
    ///
    /// Close failures are logged and do not stop the teardown. Events
    /// delivered afterwards are released without dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::WorkerPanicked`] when the top-level worker died.
    pub fn stop(&self) -> Result<(), LoopError> {
        let open: Vec<Service> = lock(&self.core.services).values().cloned().collect();
        for service in open {
            info!(
                target: DISPATCH_TARGET,
                service = %service.id(),
                logical_name = %service.logical_name(),
                "closing service"
            );
            if let Err(close_error) = service.close().and_then(|close| close.get()) {
                error!(
                    target: DISPATCH_TARGET,
                    service = %service.id(),
                    error = %close_error,
                    "failed to close service"
                );
            }
        }

        let remaining: Vec<(ServiceId, Service)> = lock(&self.core.services).drain().collect();
        for (service_id, service) in remaining {
            if let Err(stop_error) = service.stop() {
                warn!(
                    target: DISPATCH_TARGET,
                    service = %service_id,
                    error = %stop_error,
                    "service worker ended abnormally"
                );
            }
            self.core.reporter.service_closed(service_id);
        }

        let outcome = self.events.stop();
        self.core.requests.abandon_all();
        outcome
    }
}

impl DeliverySink for EventDispatcher {
    fn deliver(&self, message: u32, handle: ResultHandle, result: RawResult) -> bool {
        Self::deliver(self, message, handle, result)
    }
}
