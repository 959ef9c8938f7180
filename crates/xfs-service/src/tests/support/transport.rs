//! In-memory [`Transport`] that records every call and hands out handles.
//!
//! Completions are either delivered by the test through
//! [`RecordingTransport::deliver`] or, in auto-complete mode, straight from
//! the submitting call. Deliveries always happen after the state lock is
//! released so the sink can free results re-entrantly.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{TransportError, TransportOperation};
use crate::event::{Payload, RawResult};
use crate::ids::{AppHandle, RequestId, ResultHandle, ServiceId};
use crate::message::{EventClasses, MessageKind};
use crate::transport::{
    DeliverySink, ExecuteCommand, InfoCommand, NegotiatedVersion, OpenParams, OpenResponse,
    Transport,
};
use xfs_config::{VersionRange, XfsVersion};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    /// Entry point invoked.
    pub operation: TransportOperation,
    /// Service addressed, when the call targets one.
    pub service: Option<ServiceId>,
    /// Request id handed back, for asynchronous submissions.
    pub request: Option<RequestId>,
    /// Command or category code, for execute and get-info.
    pub code: Option<u32>,
}

#[derive(Default)]
struct TransportState {
    next_request: u32,
    next_service: u16,
    next_handle: u64,
    issued: Vec<ResultHandle>,
    service_version: Option<XfsVersion>,
    calls: Vec<TransportCall>,
    freed: Vec<ResultHandle>,
    double_frees: Vec<ResultHandle>,
    failures: HashMap<TransportOperation, i32>,
    responses: HashMap<u32, Payload>,
    sink: Option<Arc<dyn DeliverySink>>,
    auto_complete: bool,
    cancelled: Vec<RequestId>,
    opened: Vec<OpenParams>,
}

impl TransportState {
    fn take_failure(&mut self, operation: TransportOperation) -> Result<(), TransportError> {
        match self.failures.remove(&operation) {
            Some(code) => Err(TransportError::from_code(operation, code)),
            None => Ok(()),
        }
    }

    fn allocate_request(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId::new(self.next_request)
    }

    fn allocate_handle(&mut self) -> ResultHandle {
        self.next_handle += 1;
        let handle = ResultHandle::new(self.next_handle);
        self.issued.push(handle);
        handle
    }
}

/// A completion queued for delivery once the state lock is released.
struct Delivery {
    sink: Arc<dyn DeliverySink>,
    message: MessageKind,
    handle: ResultHandle,
    result: RawResult,
}

impl Delivery {
    fn send(self) {
        self.sink
            .deliver(self.message.code(), self.handle, self.result);
    }
}

/// Records calls and frees for assertions.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<TransportState>,
    changed: Condvar,
}

impl RecordingTransport {
    /// Builds a transport negotiating version 3.30.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a transport that completes every submission immediately.
    #[must_use]
    pub fn auto_completing() -> Self {
        let transport = Self::new();
        transport.state().auto_complete = true;
        transport
    }

    /// Service version reported by later opens.
    pub fn set_service_version(&self, version: XfsVersion) {
        self.state().service_version = Some(version);
    }

    /// Makes the next call to `operation` fail with `code`.
    pub fn fail_next(&self, operation: TransportOperation, code: i32) {
        self.state().failures.insert(operation, code);
    }

    /// Payload attached to auto-completions of command or category `code`.
    pub fn respond_with(&self, code: u32, payload: Payload) {
        self.state().responses.insert(code, payload);
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    /// Operations recorded so far, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<TransportOperation> {
        self.state().calls.iter().map(|call| call.operation).collect()
    }

    /// Handles freed so far, in free order.
    #[must_use]
    pub fn freed(&self) -> Vec<ResultHandle> {
        self.state().freed.clone()
    }

    /// Every result handle handed out so far.
    #[must_use]
    pub fn issued(&self) -> Vec<ResultHandle> {
        self.state().issued.clone()
    }

    /// Handles freed more than once.
    #[must_use]
    pub fn double_frees(&self) -> Vec<ResultHandle> {
        self.state().double_frees.clone()
    }

    /// Requests the engine asked to cancel.
    #[must_use]
    pub fn cancelled(&self) -> Vec<RequestId> {
        self.state().cancelled.clone()
    }

    /// Parameters of every open, in submission order.
    #[must_use]
    pub fn open_params(&self) -> Vec<OpenParams> {
        self.state().opened.clone()
    }

    /// Returns `true` when submissions complete on their own.
    #[must_use]
    pub fn is_auto_completing(&self) -> bool {
        self.state().auto_complete
    }

    /// Returns `true` while a delivery sink is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state().sink.is_some()
    }

    /// Allocates a result handle the way the manager would.
    #[must_use]
    pub fn next_handle(&self) -> ResultHandle {
        self.state().allocate_handle()
    }

    /// Delivers `result` as `message` through the attached sink. Returns the
    /// handle backing the result and whether the sink accepted it.
    ///
    /// # Panics
    ///
    /// Panics when no sink is attached.
    pub fn deliver(&self, message: MessageKind, result: RawResult) -> (ResultHandle, bool) {
        self.deliver_code(message.code(), result)
    }

    /// As [`deliver`](Self::deliver) with a raw message code.
    ///
    /// # Panics
    ///
    /// Panics when no sink is attached.
    pub fn deliver_code(&self, message: u32, result: RawResult) -> (ResultHandle, bool) {
        let (sink, handle) = {
            let mut state = self.state();
            let sink = state.sink.clone().expect("no delivery sink attached");
            (sink, state.allocate_handle())
        };
        let accepted = sink.deliver(message, handle, result);
        (handle, accepted)
    }

    /// Waits until `operation` has been submitted for `service` and returns
    /// the request id of the latest such submission.
    ///
    /// # Panics
    ///
    /// Panics when no matching call arrives within `timeout`.
    pub fn wait_for_request(
        &self,
        operation: TransportOperation,
        service: ServiceId,
        timeout: Duration,
    ) -> RequestId {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            let found = state.calls.iter().rev().find_map(|call| {
                (call.operation == operation && call.service == Some(service))
                    .then_some(call.request)
                    .flatten()
            });
            if let Some(request) = found {
                return request;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            assert!(
                !remaining.is_zero(),
                "no {operation} call for service {service} within {timeout:?}"
            );
            state = self
                .changed
                .wait_timeout(state, remaining)
                .expect("transport state poisoned")
                .0;
        }
    }

    /// Waits until every handle in `handles` has been freed.
    #[must_use]
    pub fn wait_for_freed(&self, handles: &[ResultHandle], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if handles.iter().all(|handle| state.freed.contains(handle)) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .expect("transport state poisoned")
                .0;
        }
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().expect("transport state poisoned")
    }

    fn record(&self, state: &mut TransportState, call: TransportCall) {
        state.calls.push(call);
        self.changed.notify_all();
    }

    fn synchronous(&self, operation: TransportOperation) -> Result<(), TransportError> {
        let mut state = self.state();
        state.take_failure(operation)?;
        self.record(
            &mut state,
            TransportCall {
                operation,
                service: None,
                request: None,
                code: None,
            },
        );
        Ok(())
    }

    fn submit(
        &self,
        operation: TransportOperation,
        service: ServiceId,
        code: Option<u32>,
    ) -> Result<RequestId, TransportError> {
        let (request, delivery) = {
            let mut state = self.state();
            state.take_failure(operation)?;
            let request = state.allocate_request();
            self.record(
                &mut state,
                TransportCall {
                    operation,
                    service: Some(service),
                    request: Some(request),
                    code,
                },
            );
            let sink = state.sink.clone().filter(|_| state.auto_complete);
            let delivery = sink.zip(completion_for(operation)).map(|(sink, message)| {
                let mut result = RawResult::completion(service, request);
                if let Some(command) = code {
                    result.event_id = command;
                    if let Some(payload) = state.responses.get(&command) {
                        result = result.with_payload(payload.clone());
                    }
                }
                Delivery {
                    sink,
                    message,
                    handle: state.allocate_handle(),
                    result,
                }
            });
            (request, delivery)
        };
        if let Some(pending) = delivery {
            pending.send();
        }
        Ok(request)
    }
}

const fn completion_for(operation: TransportOperation) -> Option<MessageKind> {
    match operation {
        TransportOperation::Open => Some(MessageKind::OpenComplete),
        TransportOperation::Close => Some(MessageKind::CloseComplete),
        TransportOperation::Lock => Some(MessageKind::LockComplete),
        TransportOperation::Unlock => Some(MessageKind::UnlockComplete),
        TransportOperation::Register => Some(MessageKind::RegisterComplete),
        TransportOperation::Deregister => Some(MessageKind::DeregisterComplete),
        TransportOperation::GetInfo => Some(MessageKind::GetInfoComplete),
        TransportOperation::Execute => Some(MessageKind::ExecuteComplete),
        _ => None,
    }
}

impl Transport for RecordingTransport {
    fn start_up(&self, versions: VersionRange) -> Result<NegotiatedVersion, TransportError> {
        self.synchronous(TransportOperation::StartUp)?;
        Ok(NegotiatedVersion {
            version: versions.high,
            low_version: versions.low,
            high_version: versions.high,
            description: "recording transport".to_owned(),
        })
    }

    fn clean_up(&self) -> Result<(), TransportError> {
        self.synchronous(TransportOperation::CleanUp)
    }

    fn create_app_handle(&self) -> Result<AppHandle, TransportError> {
        self.synchronous(TransportOperation::CreateAppHandle)?;
        Ok(AppHandle::new(0xA11))
    }

    fn destroy_app_handle(&self, _handle: AppHandle) -> Result<(), TransportError> {
        self.synchronous(TransportOperation::DestroyAppHandle)
    }

    fn attach(&self, sink: Arc<dyn DeliverySink>) -> Result<(), TransportError> {
        self.synchronous(TransportOperation::Attach)?;
        self.state().sink = Some(sink);
        Ok(())
    }

    fn detach(&self) {
        self.state().sink = None;
    }

    fn open(&self, params: &OpenParams) -> Result<OpenResponse, TransportError> {
        let (response, delivery) = {
            let mut state = self.state();
            state.take_failure(TransportOperation::Open)?;
            state.next_service += 1;
            let service_id = ServiceId::new(state.next_service);
            let request_id = state.allocate_request();
            let version = state
                .service_version
                .unwrap_or_else(|| params.versions_required().high);
            state.opened.push(params.clone());
            self.record(
                &mut state,
                TransportCall {
                    operation: TransportOperation::Open,
                    service: Some(service_id),
                    request: Some(request_id),
                    code: None,
                },
            );
            let delivery = state
                .sink
                .clone()
                .filter(|_| state.auto_complete)
                .map(|sink| Delivery {
                    sink,
                    message: MessageKind::OpenComplete,
                    handle: state.allocate_handle(),
                    result: RawResult::completion(service_id, request_id),
                });
            let response = OpenResponse {
                request_id,
                service_id,
                service_version: NegotiatedVersion::exact(version),
                spi_version: NegotiatedVersion::exact(version),
            };
            (response, delivery)
        };
        if let Some(pending) = delivery {
            pending.send();
        }
        Ok(response)
    }

    fn close(&self, service: ServiceId) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Close, service, None)
    }

    fn lock(
        &self,
        service: ServiceId,
        _timeout: Option<Duration>,
    ) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Lock, service, None)
    }

    fn unlock(&self, service: ServiceId) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Unlock, service, None)
    }

    fn register(
        &self,
        service: ServiceId,
        _classes: EventClasses,
    ) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Register, service, None)
    }

    fn deregister(
        &self,
        service: ServiceId,
        _classes: EventClasses,
    ) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Deregister, service, None)
    }

    fn execute(
        &self,
        service: ServiceId,
        command: &ExecuteCommand,
    ) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::Execute, service, Some(command.command))
    }

    fn get_info(
        &self,
        service: ServiceId,
        command: &InfoCommand,
    ) -> Result<RequestId, TransportError> {
        self.submit(TransportOperation::GetInfo, service, Some(command.category))
    }

    fn cancel(&self, service: ServiceId, request: RequestId) -> Result<(), TransportError> {
        let mut state = self.state();
        state.take_failure(TransportOperation::Cancel)?;
        state.cancelled.push(request);
        self.record(
            &mut state,
            TransportCall {
                operation: TransportOperation::Cancel,
                service: Some(service),
                request: Some(request),
                code: None,
            },
        );
        Ok(())
    }

    fn free_result(&self, handle: ResultHandle) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.freed.contains(&handle) {
            state.double_frees.push(handle);
            return Err(TransportError::new(
                TransportOperation::FreeResult,
                format!("result {handle} already freed"),
            ));
        }
        state.take_failure(TransportOperation::FreeResult)?;
        state.freed.push(handle);
        self.changed.notify_all();
        Ok(())
    }
}
