//! Structured reporting for dispatch lifecycle events.

use std::sync::Arc;

use strum::Display;

use crate::error::TransportError;
use crate::ids::{ResultHandle, ServiceId};
use crate::message::MessageKind;
use crate::service::ServiceKind;

const REPORTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Why an event was released without reaching a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// No open service matches the event's service handle.
    UnknownService,
    /// The owning dispatcher has stopped.
    DispatcherStopped,
    /// No request is pending for the completion.
    NoPendingRequest,
    /// The message is not routed by the receiving tier.
    Unroutable,
}

/// Observer for dispatch lifecycle events.
pub trait DispatchReporter: Send + Sync {
    /// A worker thread began draining its queue.
    fn worker_started(&self, worker: &str);

    /// A worker thread exited.
    fn worker_stopped(&self, worker: &str);

    /// A service was added to the routing table.
    fn service_opened(&self, service: ServiceId, logical_name: &str, kind: ServiceKind);

    /// A service left the routing table.
    fn service_closed(&self, service: ServiceId);

    /// An event was released without reaching a listener.
    fn event_dropped(&self, message: MessageKind, service: ServiceId, reason: DropReason);

    /// Freeing a result buffer failed.
    fn release_failed(&self, handle: ResultHandle, error: &TransportError);

    /// An application listener panicked while handling `message`. The
    /// service keeps dispatching.
    fn listener_panicked(&self, message: MessageKind, service: ServiceId, detail: &str);
}

impl<T> DispatchReporter for Arc<T>
where
    T: DispatchReporter + ?Sized,
{
    fn worker_started(&self, worker: &str) {
        (**self).worker_started(worker);
    }

    fn worker_stopped(&self, worker: &str) {
        (**self).worker_stopped(worker);
    }

    fn service_opened(&self, service: ServiceId, logical_name: &str, kind: ServiceKind) {
        (**self).service_opened(service, logical_name, kind);
    }

    fn service_closed(&self, service: ServiceId) {
        (**self).service_closed(service);
    }

    fn event_dropped(&self, message: MessageKind, service: ServiceId, reason: DropReason) {
        (**self).event_dropped(message, service, reason);
    }

    fn release_failed(&self, handle: ResultHandle, error: &TransportError) {
        (**self).release_failed(handle, error);
    }

    fn listener_panicked(&self, message: MessageKind, service: ServiceId, detail: &str) {
        (**self).listener_panicked(message, service, detail);
    }
}

/// Default reporter that records dispatch events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredDispatchReporter;

impl StructuredDispatchReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DispatchReporter for StructuredDispatchReporter {
    fn worker_started(&self, worker: &str) {
        tracing::debug!(
            target: REPORTER_TARGET,
            event = "worker_started",
            worker,
            "dispatch worker started"
        );
    }

    fn worker_stopped(&self, worker: &str) {
        tracing::debug!(
            target: REPORTER_TARGET,
            event = "worker_stopped",
            worker,
            "dispatch worker stopped"
        );
    }

    fn service_opened(&self, service: ServiceId, logical_name: &str, kind: ServiceKind) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "service_opened",
            service = %service,
            logical_name,
            kind = %kind,
            "service added to routing table"
        );
    }

    fn service_closed(&self, service: ServiceId) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "service_closed",
            service = %service,
            "service removed from routing table"
        );
    }

    fn event_dropped(&self, message: MessageKind, service: ServiceId, reason: DropReason) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "event_dropped",
            message = %message,
            service = %service,
            reason = %reason,
            "released event without dispatching it"
        );
    }

    fn release_failed(&self, handle: ResultHandle, error: &TransportError) {
        tracing::error!(
            target: REPORTER_TARGET,
            event = "release_failed",
            handle = %handle,
            error = %error,
            "failed to free result buffer"
        );
    }

    fn listener_panicked(&self, message: MessageKind, service: ServiceId, detail: &str) {
        tracing::error!(
            target: REPORTER_TARGET,
            event = "listener_panicked",
            message = %message,
            service = %service,
            detail,
            "application listener panicked"
        );
    }
}
