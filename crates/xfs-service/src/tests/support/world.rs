//! BDD test world: a harness plus the outcomes steps assert on.

use std::cell::RefCell;

use crate::error::{ServiceError, TransportOperation};
use crate::event::RawResult;
use crate::future::{OpenFuture, XfsFuture};
use crate::ids::ServiceId;
use crate::message::MessageKind;
use crate::queue::LoopError;
use crate::service::Service;

use super::harness::{Harness, WAIT};

/// Scenario world shared across BDD steps.
#[derive(Default)]
pub struct DispatchWorld {
    harness: Option<Harness>,
    open: Option<OpenFuture>,
    open_outcome: Option<Result<Service, ServiceError>>,
    stop_outcome: Option<Result<(), LoopError>>,
}

impl DispatchWorld {
    /// Installs a harness whose completions are delivered by the steps.
    pub fn use_manual_transport(&mut self) {
        self.harness = Some(Harness::manual());
    }

    /// Installs a harness whose transport completes every submission.
    pub fn use_auto_completing_transport(&mut self) {
        self.harness = Some(Harness::auto_completing());
    }

    /// Harness installed by a `Given` step.
    ///
    /// # Panics
    ///
    /// Panics when no harness was installed.
    pub fn harness(&self) -> &Harness {
        self.harness.as_ref().expect("no dispatcher configured")
    }

    /// Opens a service and records the outcome.
    pub fn open(&mut self, logical_name: &str) {
        let service = self.harness().open_service(logical_name);
        self.open_outcome = Some(Ok(service));
    }

    /// Submits an open and completes it with `code`.
    pub fn fail_open(&mut self, logical_name: &str, code: i32) {
        let harness = self.harness();
        let open = harness.begin_open(logical_name);
        let result =
            RawResult::completion(open.service_id(), open.request_id()).with_error_code(code);
        harness.deliver(MessageKind::OpenComplete, result);
        self.open_outcome = Some(open.get_timeout(WAIT));
        self.open = Some(open);
    }

    /// Delivers an unsolicited event for a service nobody opened.
    pub fn deliver_stray_event(&self, service: ServiceId) {
        self.harness()
            .deliver(MessageKind::ServiceEvent, RawResult::event(service, 304));
    }

    /// Stops the dispatcher and records the outcome.
    pub fn stop(&mut self) {
        self.stop_outcome = Some(self.harness().dispatcher.stop());
    }

    /// Outcome of the last open.
    #[must_use]
    pub const fn open_outcome(&self) -> Option<&Result<Service, ServiceError>> {
        self.open_outcome.as_ref()
    }

    /// Outcome of the last stop.
    #[must_use]
    pub const fn stop_outcome(&self) -> Option<&Result<(), LoopError>> {
        self.stop_outcome.as_ref()
    }

    /// Service handle of the pending open, if one was submitted by hand.
    #[must_use]
    pub fn pending_open_service(&self) -> Option<ServiceId> {
        self.open.as_ref().map(OpenFuture::service_id)
    }

    /// Transport operations recorded so far, excluding the attach.
    #[must_use]
    pub fn operations(&self) -> Vec<TransportOperation> {
        self.harness()
            .transport
            .operations()
            .into_iter()
            .filter(|operation| *operation != TransportOperation::Attach)
            .collect()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::default())
}
