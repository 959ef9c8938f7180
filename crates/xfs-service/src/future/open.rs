use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{EmptyFuture, XfsFuture, completion_outcome};
use crate::error::ServiceError;
use crate::event::RawResult;
use crate::ids::{RequestId, ServiceId};
use crate::message::EventClasses;
use crate::pending::RequestListener;
use crate::service::Service;
use crate::sync::{lock, wait, wait_timeout};
use crate::transport::NegotiatedVersion;

enum OpenPhase {
    Opening,
    Registering(EmptyFuture),
    Failed(ServiceError),
}

/// Opens a service, then registers it for every event class once the open
/// succeeds.
pub(crate) struct OpenState {
    service: Service,
    open_id: RequestId,
    phase: Mutex<OpenPhase>,
    changed: Condvar,
}

impl OpenState {
    pub(crate) const fn new(service: Service, open_id: RequestId) -> Self {
        Self {
            service,
            open_id,
            phase: Mutex::new(OpenPhase::Opening),
            changed: Condvar::new(),
        }
    }

    fn advance(&self, next: OpenPhase) {
        *lock(&self.phase) = next;
        self.changed.notify_all();
    }

    fn settled(&self, timeout: Option<Duration>) -> Result<EmptyFuture, ServiceError> {
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut phase = lock(&self.phase);
        loop {
            match &*phase {
                OpenPhase::Registering(register) => return Ok(register.clone()),
                OpenPhase::Failed(error) => return Err(error.clone()),
                OpenPhase::Opening => {}
            }
            phase = match deadline {
                None => wait(&self.changed, phase),
                Some((at, limit)) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ServiceError::WaitTimeout { timeout: limit });
                    }
                    wait_timeout(&self.changed, phase, remaining).0
                }
            };
        }
    }
}

impl RequestListener for OpenState {
    fn on_complete(&self, result: &RawResult) {
        let next = match completion_outcome(result) {
            Err(error) => OpenPhase::Failed(error),
            Ok(()) => self
                .service
                .register(EventClasses::all())
                .map_or_else(OpenPhase::Failed, OpenPhase::Registering),
        };
        self.advance(next);
    }

    fn on_abandoned(&self, error: ServiceError) {
        self.advance(OpenPhase::Failed(error));
    }
}

/// Future for the open-then-register sequence.
///
/// Resolves to the opened [`Service`] once registration succeeds. A failed
/// open resolves with that failure and no registration is submitted.
#[derive(Clone)]
pub struct OpenFuture {
    state: Arc<OpenState>,
}

impl OpenFuture {
    pub(crate) const fn from_state(state: Arc<OpenState>) -> Self {
        Self { state }
    }

    /// Handle the manager assigned to the service.
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.state.service.id()
    }

    /// Service interface version negotiated at submission.
    #[must_use]
    pub fn service_version(&self) -> &NegotiatedVersion {
        self.state.service.version()
    }

    /// Provider interface version negotiated at submission.
    #[must_use]
    pub fn spi_version(&self) -> &NegotiatedVersion {
        self.state.service.spi_version()
    }
}

impl XfsFuture for OpenFuture {
    type Output = Service;

    fn get(&self) -> Result<Service, ServiceError> {
        self.state.settled(None)?.get()?;
        Ok(self.state.service.clone())
    }

    fn get_timeout(&self, timeout: Duration) -> Result<Service, ServiceError> {
        let started = Instant::now();
        let register = self.state.settled(Some(timeout))?;
        register
            .get_timeout(timeout.saturating_sub(started.elapsed()))
            .map_err(|error| match error {
                ServiceError::WaitTimeout { .. } => ServiceError::WaitTimeout { timeout },
                other => other,
            })?;
        Ok(self.state.service.clone())
    }

    fn cancel(&self) -> Result<(), ServiceError> {
        let phase = lock(&self.state.phase);
        match &*phase {
            OpenPhase::Opening => self.state.service.cancel(self.state.open_id),
            OpenPhase::Registering(register) => register.cancel(),
            OpenPhase::Failed(_) => Ok(()),
        }
    }

    fn request_id(&self) -> RequestId {
        match &*lock(&self.state.phase) {
            OpenPhase::Registering(register) => register.request_id(),
            OpenPhase::Opening | OpenPhase::Failed(_) => self.state.open_id,
        }
    }

    fn is_done(&self) -> bool {
        match &*lock(&self.state.phase) {
            OpenPhase::Opening => false,
            OpenPhase::Registering(register) => register.is_done(),
            OpenPhase::Failed(_) => true,
        }
    }
}

impl fmt::Debug for OpenFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFuture")
            .field("service_id", &self.service_id())
            .field("logical_name", &self.state.service.logical_name())
            .field("request_id", &self.request_id())
            .finish()
    }
}
