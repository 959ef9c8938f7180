//! Test double for [`DispatchReporter`] that records dispatch events for
//! assertions.

use std::sync::Mutex;

use crate::error::TransportError;
use crate::ids::{ResultHandle, ServiceId};
use crate::message::MessageKind;
use crate::reporter::{DispatchReporter, DropReason};
use crate::service::ServiceKind;

/// Dispatch events tracked during a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A worker started.
    WorkerStarted(String),
    /// A worker stopped.
    WorkerStopped(String),
    /// A service joined the routing table.
    ServiceOpened(ServiceId, ServiceKind),
    /// A service left the routing table.
    ServiceClosed(ServiceId),
    /// An event was released without dispatch.
    Dropped {
        message: MessageKind,
        service: ServiceId,
        reason: DropReason,
    },
    /// Freeing a result failed.
    ReleaseFailed(ResultHandle),
    /// A listener panicked while handling a message.
    ListenerPanicked {
        message: MessageKind,
        service: ServiceId,
        detail: String,
    },
}

/// Records dispatch events for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    /// Drop events recorded with `reason`.
    pub fn drops(&self, reason: DropReason) -> Vec<(MessageKind, ServiceId)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::Dropped {
                    message,
                    service,
                    reason: recorded,
                } if recorded == reason => Some((message, service)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: DispatchEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl DispatchReporter for RecordingReporter {
    fn worker_started(&self, worker: &str) {
        self.record(DispatchEvent::WorkerStarted(worker.to_owned()));
    }

    fn worker_stopped(&self, worker: &str) {
        self.record(DispatchEvent::WorkerStopped(worker.to_owned()));
    }

    fn service_opened(&self, service: ServiceId, _logical_name: &str, kind: ServiceKind) {
        self.record(DispatchEvent::ServiceOpened(service, kind));
    }

    fn service_closed(&self, service: ServiceId) {
        self.record(DispatchEvent::ServiceClosed(service));
    }

    fn event_dropped(&self, message: MessageKind, service: ServiceId, reason: DropReason) {
        self.record(DispatchEvent::Dropped {
            message,
            service,
            reason,
        });
    }

    fn release_failed(&self, handle: ResultHandle, _error: &TransportError) {
        self.record(DispatchEvent::ReleaseFailed(handle));
    }

    fn listener_panicked(&self, message: MessageKind, service: ServiceId, detail: &str) {
        self.record(DispatchEvent::ListenerPanicked {
            message,
            service,
            detail: detail.to_owned(),
        });
    }
}
