use std::fmt;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use super::{EmptyFuture, XfsFuture, completion_outcome};
use crate::error::ServiceError;
use crate::event::RawResult;
use crate::ids::RequestId;
use crate::pending::RequestListener;
use crate::service::ServiceCore;
use crate::sync::{lock, wait, wait_timeout};
use crate::transport::ServiceLink;

enum ClosePhase {
    Deregistering,
    Closing(EmptyFuture),
    Failed(ServiceError),
}

/// Deregisters every event class, then closes the service once the
/// deregistration succeeds.
pub(crate) struct CloseState {
    link: ServiceLink,
    core: Weak<ServiceCore>,
    deregister_id: RequestId,
    phase: Mutex<ClosePhase>,
    changed: Condvar,
}

impl CloseState {
    pub(crate) const fn new(
        link: ServiceLink,
        core: Weak<ServiceCore>,
        deregister_id: RequestId,
    ) -> Self {
        Self {
            link,
            core,
            deregister_id,
            phase: Mutex::new(ClosePhase::Deregistering),
            changed: Condvar::new(),
        }
    }

    fn advance(&self, next: ClosePhase) {
        *lock(&self.phase) = next;
        self.changed.notify_all();
    }

    /// Waits until the deregistration settles and returns the close future
    /// it started.
    fn settled(&self, timeout: Option<Duration>) -> Result<EmptyFuture, ServiceError> {
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut phase = lock(&self.phase);
        loop {
            match &*phase {
                ClosePhase::Closing(close) => return Ok(close.clone()),
                ClosePhase::Failed(error) => return Err(error.clone()),
                ClosePhase::Deregistering => {}
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

impl RequestListener for CloseState {
    fn on_complete(&self, result: &RawResult) {
        let next = match completion_outcome(result) {
            Err(error) => ClosePhase::Failed(error),
            Ok(()) => match self.core.upgrade() {
                Some(core) => core
                    .close()
                    .map_or_else(ClosePhase::Failed, ClosePhase::Closing),
                None => ClosePhase::Failed(ServiceError::Stopped {
                    service_id: self.link.service_id(),
                }),
            },
        };
        self.advance(next);
    }

    fn on_abandoned(&self, error: ServiceError) {
        self.advance(ClosePhase::Failed(error));
    }
}

/// Future for the deregister-then-close sequence.
///
/// Resolves when the close completes. A failed deregistration resolves the
/// future with that failure and no close is submitted.
#[derive(Clone)]
pub struct CloseFuture {
    state: Arc<CloseState>,
}

impl CloseFuture {
    pub(crate) const fn from_state(state: Arc<CloseState>) -> Self {
        Self { state }
    }
}

impl XfsFuture for CloseFuture {
    type Output = ();

    fn get(&self) -> Result<(), ServiceError> {
        self.state.settled(None)?.get()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<(), ServiceError> {
        let started = Instant::now();
        let close = self.state.settled(Some(timeout))?;
        close
            .get_timeout(timeout.saturating_sub(started.elapsed()))
            .map_err(|error| match error {
                ServiceError::WaitTimeout { .. } => ServiceError::WaitTimeout { timeout },
                other => other,
            })
    }

    fn cancel(&self) -> Result<(), ServiceError> {
        let phase = lock(&self.state.phase);
        match &*phase {
            ClosePhase::Deregistering => self
                .state
                .link
                .cancel(self.state.deregister_id)
                .map_err(ServiceError::from),
            ClosePhase::Closing(close) => close.cancel(),
            ClosePhase::Failed(_) => Ok(()),
        }
    }

    fn request_id(&self) -> RequestId {
        match &*lock(&self.state.phase) {
            ClosePhase::Closing(close) => close.request_id(),
            ClosePhase::Deregistering | ClosePhase::Failed(_) => self.state.deregister_id,
        }
    }

    fn is_done(&self) -> bool {
        match &*lock(&self.state.phase) {
            ClosePhase::Deregistering => false,
            ClosePhase::Closing(close) => close.is_done(),
            ClosePhase::Failed(_) => true,
        }
    }
}

impl fmt::Debug for CloseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseFuture")
            .field("service_id", &self.state.link.service_id())
            .field("request_id", &self.request_id())
            .finish()
    }
}
