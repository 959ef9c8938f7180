//! FIFO event queue drained by a lazily started worker thread.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{error, warn};

use crate::event::XfsEvent;
use crate::sync::{lock, wait};

const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Whether the worker keeps draining after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Consumer side of an [`EventLoop`].
pub(crate) trait EventHandler: Send + Sync + 'static {
    /// Processes one event on the worker thread.
    fn handle(&self, event: XfsEvent) -> Flow;

    /// Takes ownership of an event the loop will never process.
    fn reject(&self, event: XfsEvent);

    fn worker_started(&self, _worker: &str) {}

    fn worker_stopped(&self, _worker: &str) {}
}

/// Errors raised while stopping a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    /// The worker thread panicked while handling an event.
    #[error("worker thread '{worker}' panicked")]
    WorkerPanicked {
        /// Thread name.
        worker: String,
    },
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<XfsEvent>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    fn push(&self, event: XfsEvent) -> Result<(), XfsEvent> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(event);
        }
        state.events.push_back(event);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn next(&self) -> Option<XfsEvent> {
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return None;
            }
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            state = wait(&self.available, state);
        }
    }

    fn close(&self) -> VecDeque<XfsEvent> {
        let mut state = lock(&self.state);
        state.closed = true;
        let leftovers = mem::take(&mut state.events);
        drop(state);
        self.available.notify_all();
        leftovers
    }
}

/// Queue plus the worker thread that drains it.
///
/// The worker starts on the first [`offer`](Self::offer). After
/// [`stop`](Self::stop), or after the handler returns [`Flow::Stop`], every
/// queued or newly offered event goes to [`EventHandler::reject`].
pub(crate) struct EventLoop<H: EventHandler> {
    name: String,
    handler: Arc<H>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<H: EventHandler> EventLoop<H> {
    pub(crate) fn new(name: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            name: name.into(),
            handler,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    /// Appends `event`, starting the worker if it has not run yet.
    pub(crate) fn offer(&self, event: XfsEvent) {
        let mut worker = lock(&self.worker);
        if let Err(rejected) = self.shared.push(event) {
            drop(worker);
            self.handler.reject(rejected);
            return;
        }
        if worker.is_some() {
            return;
        }
        match self.spawn() {
            Ok(handle) => *worker = Some(handle),
            Err(spawn_error) => {
                error!(
                    target: QUEUE_TARGET,
                    worker = %self.name,
                    error = %spawn_error,
                    "failed to start dispatch worker"
                );
                let leftovers = self.shared.close();
                drop(worker);
                self.reject_all(leftovers);
            }
        }
    }

    /// Closes the queue and waits for the worker to exit. Repeated calls
    /// are no-ops.
    ///
    /// Called from the worker itself, this only closes the queue; the
    /// worker exits once the current event returns.
    pub(crate) fn stop(&self) -> Result<(), LoopError> {
        let (handle, leftovers) = {
            let mut worker = lock(&self.worker);
            let leftovers = self.shared.close();
            (worker.take(), leftovers)
        };
        let outcome = match handle {
            Some(running) if running.thread().id() != thread::current().id() => running
                .join()
                .map_err(|_| LoopError::WorkerPanicked {
                    worker: self.name.clone(),
                }),
            _ => Ok(()),
        };
        self.reject_all(leftovers);
        outcome
    }

    /// Returns `true` once the queue no longer accepts events.
    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.shared.state).closed
    }

    fn spawn(&self) -> std::io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let handler = Arc::clone(&self.handler);
        let name = self.name.clone();
        thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(&name, &shared, handler.as_ref()))
    }

    fn reject_all(&self, events: VecDeque<XfsEvent>) {
        for event in events {
            self.handler.reject(event);
        }
    }
}

impl<H: EventHandler> Drop for EventLoop<H> {
    fn drop(&mut self) {
        if let Err(stop_error) = self.stop() {
            warn!(
                target: QUEUE_TARGET,
                worker = %self.name,
                error = %stop_error,
                "dispatch worker ended abnormally"
            );
        }
    }
}

/// Closes and drains the queue when the worker exits, including when a
/// handler panics.
struct WorkerExit<'a, H: EventHandler> {
    name: &'a str,
    shared: &'a Shared,
    handler: &'a H,
}

impl<H: EventHandler> Drop for WorkerExit<'_, H> {
    fn drop(&mut self) {
        for event in self.shared.close() {
            self.handler.reject(event);
        }
        self.handler.worker_stopped(self.name);
    }
}

fn run_worker<H: EventHandler>(name: &str, shared: &Shared, handler: &H) {
    let _exit = WorkerExit {
        name,
        shared,
        handler,
    };
    handler.worker_started(name);
    while let Some(event) = shared.next() {
        if handler.handle(event) == Flow::Stop {
            break;
        }
    }
}
