//! Client-side engine for CEN/XFS device services.
//!
//! Applications submit asynchronous requests (open, close, lock, execute,
//! get-info and so on) through a [`Transport`] and receive completions and
//! events back on a thread the transport owns. The engine turns that
//! callback stream into blocking futures and listener notifications:
//!
//! - [`EventDispatcher`] accepts every manager message, completes opens on
//!   its own worker and hands everything else to the owning service.
//! - Each open [`Service`] has a [`ServiceDispatcher`] with its own worker
//!   and pending-request table, so a slow listener on one service never
//!   delays another.
//! - Requests resolve [`XfsFuture`]s: [`EmptyFuture`] for requests without
//!   output, [`StdXfsFuture`] for decoded results, and the chained
//!   [`OpenFuture`] and [`CloseFuture`], which register for events after an
//!   open and deregister before a close.
//!
//! Result buffers are freed exactly once, whichever component ends up
//! owning them, including on shutdown and when a worker panics.
//!
//! [`ServiceManager`] wraps the process lifecycle, and [`cdm`] provides the
//! cash dispenser device class.

pub mod cdm;
mod decode;
mod dispatcher;
mod error;
mod event;
mod future;
mod ids;
mod manager;
mod message;
mod pending;
mod queue;
mod reporter;
mod service;
mod sync;
pub mod telemetry;
mod transport;

pub use decode::{
    DecodeFn, DecodeTable, ResultDecoder, ResultKind, ResultType, decode_as, layout,
};
pub use dispatcher::{DISPATCH_THREAD_NAME, EventDispatcher};
pub use error::{
    DecodeError, EventError, ServiceError, TransportError, TransportOperation, XfsError,
    XfsErrorCode,
};
pub use event::{Payload, RawResult};
pub use future::{
    CloseFuture, EmptyFuture, IntermediateListener, OpenFuture, StdXfsFuture, XfsFuture,
};
pub use ids::{AppHandle, RequestId, ResultHandle, ServiceId};
pub use manager::{ManagerError, ServiceManager};
pub use message::{EventClasses, MessageKind, SystemEventKind};
pub use queue::LoopError;
pub use reporter::{DispatchReporter, DropReason, StructuredDispatchReporter};
pub use service::{
    AppDisconnect, DeviceEvents, DeviceState, DeviceStatus, ErrorAction, HardwareError, Service,
    ServiceDispatcher, ServiceKind, ServiceKindParseError, SystemEventListener,
    UndeliverableMessage, VersionError,
};
pub use telemetry::{SubscriberOwner, TelemetryError};
pub use transport::{
    DeliverySink, ExecuteCommand, InfoCommand, NegotiatedVersion, OpenParams, OpenResponse,
    Transport,
};
pub use xfs_config::{Config, VersionRange, XfsVersion};

#[cfg(test)]
mod tests;
