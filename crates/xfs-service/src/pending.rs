//! Table of requests awaiting their completion message.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use crate::error::{EventError, ServiceError};
use crate::event::RawResult;
use crate::ids::{RequestId, ServiceId};
use crate::sync::lock;

/// Receives the messages addressed to one pending request.
pub(crate) trait RequestListener: Send + Sync {
    /// Delivers the completion. Called at most once.
    fn on_complete(&self, result: &RawResult);

    /// Fails the request because its dispatcher stopped first.
    fn on_abandoned(&self, error: ServiceError);

    /// Delivers an intermediate execute event.
    fn on_intermediate(&self, result: &RawResult) -> Result<(), EventError> {
        let request_id = result.request_id.unwrap_or(RequestId::new(0));
        Err(EventError::IntermediateUnsupported { request_id })
    }
}

#[derive(Default)]
struct Table {
    entries: HashMap<RequestId, Arc<dyn RequestListener>>,
    closed: bool,
}

/// Pending requests keyed by manager-assigned id.
///
/// Submissions run under the table lock, so a completion can never be looked
/// up before its listener is inserted.
pub(crate) struct PendingRequests {
    owner: ServiceId,
    table: Mutex<Table>,
}

impl PendingRequests {
    /// A table for requests addressed to `owner`. The top-level table uses
    /// service id zero.
    pub(crate) fn new(owner: ServiceId) -> Self {
        Self {
            owner,
            table: Mutex::default(),
        }
    }

    /// Runs `submit` under the table lock and records the listener it
    /// returns under the request id it returns.
    pub(crate) fn submit<L, F>(&self, submit: F) -> Result<Arc<L>, ServiceError>
    where
        L: RequestListener + 'static,
        F: FnOnce() -> Result<(RequestId, Arc<L>), ServiceError>,
    {
        let mut table = lock(&self.table);
        if table.closed {
            return Err(ServiceError::Stopped {
                service_id: self.owner,
            });
        }
        let (request_id, listener) = submit()?;
        match table.entries.entry(request_id) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateRequest { request_id }),
            Entry::Vacant(slot) => {
                let shared: Arc<dyn RequestListener> = Arc::<L>::clone(&listener);
                slot.insert(shared);
                Ok(listener)
            }
        }
    }

    /// Removes and returns the listener for `request_id`.
    pub(crate) fn take(&self, request_id: RequestId) -> Option<Arc<dyn RequestListener>> {
        lock(&self.table).entries.remove(&request_id)
    }

    /// Returns the listener for `request_id`, leaving it in place.
    pub(crate) fn get(&self, request_id: RequestId) -> Option<Arc<dyn RequestListener>> {
        lock(&self.table).entries.get(&request_id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    /// Refuses further submissions and fails every request still pending.
    pub(crate) fn abandon_all(&self) {
        let abandoned: Vec<_> = {
            let mut table = lock(&self.table);
            table.closed = true;
            table.entries.drain().map(|(_, listener)| listener).collect()
        };
        for listener in abandoned {
            listener.on_abandoned(ServiceError::Stopped {
                service_id: self.owner,
            });
        }
    }
}
