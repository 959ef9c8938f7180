use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::promise::Promise;
use super::{XfsFuture, completion_outcome};
use crate::error::ServiceError;
use crate::event::RawResult;
use crate::ids::RequestId;
use crate::pending::RequestListener;
use crate::transport::ServiceLink;

pub(crate) struct EmptyState {
    link: ServiceLink,
    request_id: RequestId,
    promise: Promise<()>,
}

impl EmptyState {
    pub(crate) const fn new(link: ServiceLink, request_id: RequestId) -> Self {
        Self {
            link,
            request_id,
            promise: Promise::new(),
        }
    }
}

impl RequestListener for EmptyState {
    fn on_complete(&self, result: &RawResult) {
        self.promise.complete(completion_outcome(result));
    }

    fn on_abandoned(&self, error: ServiceError) {
        self.promise.complete(Err(error));
    }
}

/// Future for requests that produce no value: lock, unlock, register,
/// deregister and close.
#[derive(Clone)]
pub struct EmptyFuture {
    state: Arc<EmptyState>,
}

impl EmptyFuture {
    pub(crate) const fn from_state(state: Arc<EmptyState>) -> Self {
        Self { state }
    }
}

impl XfsFuture for EmptyFuture {
    type Output = ();

    fn get(&self) -> Result<(), ServiceError> {
        self.state.promise.wait()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<(), ServiceError> {
        self.state.promise.wait_timeout(timeout)
    }

    fn cancel(&self) -> Result<(), ServiceError> {
        self.state
            .link
            .cancel(self.state.request_id)
            .map_err(ServiceError::from)
    }

    fn request_id(&self) -> RequestId {
        self.state.request_id
    }

    fn is_done(&self) -> bool {
        self.state.promise.is_complete()
    }
}

impl fmt::Debug for EmptyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmptyFuture")
            .field("service_id", &self.state.link.service_id())
            .field("request_id", &self.state.request_id)
            .field("done", &self.is_done())
            .finish()
    }
}
