use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::promise::Promise;
use super::{IntermediateListener, XfsFuture, completion_outcome};
use crate::decode::{ResultDecoder, ResultType, decode_as};
use crate::error::{EventError, ServiceError};
use crate::event::RawResult;
use crate::ids::RequestId;
use crate::pending::RequestListener;
use crate::transport::ServiceLink;

pub(crate) struct TypedState<T> {
    link: ServiceLink,
    request_id: RequestId,
    decoder: Arc<dyn ResultDecoder>,
    intermediate: Option<Arc<dyn IntermediateListener>>,
    promise: Promise<T>,
}

impl<T: ResultType + Clone> TypedState<T> {
    pub(crate) const fn new(
        link: ServiceLink,
        request_id: RequestId,
        decoder: Arc<dyn ResultDecoder>,
        intermediate: Option<Arc<dyn IntermediateListener>>,
    ) -> Self {
        Self {
            link,
            request_id,
            decoder,
            intermediate,
            promise: Promise::new(),
        }
    }
}

impl<T: ResultType + Clone> RequestListener for TypedState<T> {
    fn on_complete(&self, result: &RawResult) {
        let outcome = completion_outcome(result).and_then(|()| {
            decode_as::<T>(self.decoder.as_ref(), &result.payload).map_err(ServiceError::from)
        });
        self.promise.complete(outcome);
    }

    fn on_abandoned(&self, error: ServiceError) {
        self.promise.complete(Err(error));
    }

    fn on_intermediate(&self, result: &RawResult) -> Result<(), EventError> {
        match &self.intermediate {
            Some(listener) => listener.on_intermediate_event(result),
            None => Err(EventError::IntermediateUnsupported {
                request_id: self.request_id,
            }),
        }
    }
}

/// Future for `execute` and `get_info` requests. The completion payload is
/// decoded into `T` with the service's decoder.
pub struct StdXfsFuture<T> {
    state: Arc<TypedState<T>>,
}

impl<T> StdXfsFuture<T> {
    pub(crate) const fn from_state(state: Arc<TypedState<T>>) -> Self {
        Self { state }
    }
}

impl<T> Clone for StdXfsFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: ResultType + Clone> XfsFuture for StdXfsFuture<T> {
    type Output = T;

    fn get(&self) -> Result<T, ServiceError> {
        self.state.promise.wait()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<T, ServiceError> {
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

impl<T> fmt::Debug for StdXfsFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdXfsFuture")
            .field("service_id", &self.state.link.service_id())
            .field("request_id", &self.state.request_id)
            .finish_non_exhaustive()
    }
}
