//! Dispatcher wired to a recording transport and reporter.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::EventDispatcher;
use crate::error::TransportOperation;
use crate::event::RawResult;
use crate::future::{OpenFuture, XfsFuture};
use crate::ids::{RequestId, ResultHandle, ServiceId};
use crate::message::MessageKind;
use crate::reporter::DispatchReporter;
use crate::service::{Service, ServiceKind};
use crate::transport::{DeliverySink, OpenParams, Transport};

use super::reporter::RecordingReporter;
use super::transport::RecordingTransport;

/// Upper bound for every blocking wait in the suites.
pub const WAIT: Duration = Duration::from_secs(5);

/// A dispatcher attached to a [`RecordingTransport`].
pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub reporter: Arc<RecordingReporter>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl Harness {
    /// Completions are delivered by the test.
    #[must_use]
    pub fn manual() -> Self {
        Self::with_transport(RecordingTransport::new())
    }

    /// Every submission completes successfully on its own.
    #[must_use]
    pub fn auto_completing() -> Self {
        Self::with_transport(RecordingTransport::auto_completing())
    }

    fn with_transport(recording: RecordingTransport) -> Self {
        let transport = Arc::new(recording);
        let reporter = Arc::new(RecordingReporter::default());
        let shared_transport: Arc<dyn Transport> = Arc::clone(&transport) as Arc<dyn Transport>;
        let shared_reporter: Arc<dyn DispatchReporter> =
            Arc::clone(&reporter) as Arc<dyn DispatchReporter>;
        let dispatcher = Arc::new(EventDispatcher::with_reporter(
            shared_transport,
            shared_reporter,
        ));
        let sink: Arc<dyn DeliverySink> = Arc::clone(&dispatcher) as Arc<dyn DeliverySink>;
        transport.attach(sink).expect("attach dispatcher");
        Self {
            transport,
            reporter,
            dispatcher,
        }
    }

    /// Submits an open for a cash dispenser named `logical_name`.
    pub fn begin_open(&self, logical_name: &str) -> OpenFuture {
        self.dispatcher
            .open(&OpenParams::new(logical_name), ServiceKind::Cdm)
            .expect("open submitted")
    }

    /// Delivers a successful completion of `request`.
    pub fn complete(
        &self,
        message: MessageKind,
        service: ServiceId,
        request: RequestId,
    ) -> ResultHandle {
        self.deliver(message, RawResult::completion(service, request))
    }

    /// Delivers `result` and returns the handle backing it.
    pub fn deliver(&self, message: MessageKind, result: RawResult) -> ResultHandle {
        let (handle, accepted) = self.transport.deliver(message, result);
        assert!(accepted, "{message} was not accepted");
        handle
    }

    /// Opens a cash dispenser, driving the open and registration by hand
    /// when the transport does not complete them itself.
    pub fn open_service(&self, logical_name: &str) -> Service {
        let open = self.begin_open(logical_name);
        if !self.is_auto_completing() {
            let service_id = open.service_id();
            self.complete(MessageKind::OpenComplete, service_id, open.request_id());
            let register =
                self.transport
                    .wait_for_request(TransportOperation::Register, service_id, WAIT);
            self.complete(MessageKind::RegisterComplete, service_id, register);
        }
        open.get_timeout(WAIT).expect("service opens")
    }

    /// Closes `service`, driving the deregistration and close by hand.
    pub fn close_service(&self, service: &Service) {
        let close = service.close().expect("close submitted");
        let service_id = service.id();
        let deregister =
            self.transport
                .wait_for_request(TransportOperation::Deregister, service_id, WAIT);
        self.complete(MessageKind::DeregisterComplete, service_id, deregister);
        let close_request = self
            .transport
            .wait_for_request(TransportOperation::Close, service_id, WAIT);
        self.complete(MessageKind::CloseComplete, service_id, close_request);
        close.get_timeout(WAIT).expect("service closes");
    }

    fn is_auto_completing(&self) -> bool {
        self.transport.is_auto_completing()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.transport.detach();
    }
}
