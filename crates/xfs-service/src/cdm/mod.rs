//! Cash dispenser (CDM) services.
//!
//! [`CdmService`] wraps an open [`Service`] of kind [`ServiceKind::Cdm`]
//! with typed commands and queries. Unsolicited events reach
//! [`CdmServiceListener`]s through the service's [`CdmEventRouter`];
//! progress events of a running dispense or present reach the listener
//! passed with the command.

mod callbacks;
mod events;
mod layouts;
mod types;

use std::fmt;
use std::sync::Arc;

use crate::decode::{ResultDecoder, ResultType, decode_as};
use crate::error::{EventError, ServiceError};
use crate::event::{Payload, RawResult};
use crate::future::{IntermediateListener, StdXfsFuture};
use crate::ids::ServiceId;
use crate::service::{Device, Service, ServiceKind};
use crate::transport::{ExecuteCommand, InfoCommand};

pub use callbacks::{DispenseCallback, DispenseListener, PresentCallback, PresentListener};
pub use events::{CdmEventRouter, CdmServiceListener};
pub use layouts::decode_table;
pub use types::{
    AntiFraudModule, CashUnit, CashUnitError, CashUnitFailure, CashUnitInfo, CdmCapabilities,
    CdmStatus, CountsChanged, Denomination, DevicePosition, DevicePositionState, Dispense,
    DispenserState, DoorState, ItemInfoSummary, ItemPosition, NoteErrorReason, OutputPosition,
    PhysicalCashUnit, Position, PowerSaveChange, ShutterState, ShutterStatusChanged,
    StackerState,
};

const CDM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cdm");

/// Base of every cash dispenser code.
pub const CDM_SERVICE_OFFSET: u32 = 300;

/// `WFS_INF_CDM_STATUS`.
pub const INF_STATUS: u32 = CDM_SERVICE_OFFSET + 1;
/// `WFS_INF_CDM_CAPABILITIES`.
pub const INF_CAPABILITIES: u32 = CDM_SERVICE_OFFSET + 2;
/// `WFS_INF_CDM_CASH_UNIT_INFO`.
pub const INF_CASH_UNIT_INFO: u32 = CDM_SERVICE_OFFSET + 3;

/// `WFS_CMD_CDM_DISPENSE`.
pub const CMD_DISPENSE: u32 = CDM_SERVICE_OFFSET + 2;
/// `WFS_CMD_CDM_PRESENT`.
pub const CMD_PRESENT: u32 = CDM_SERVICE_OFFSET + 3;

/// Cash dispenser event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdmMessage {
    /// `WFS_EXEE_CDM_DELAYEDDISPENSE`.
    DelayedDispense,
    /// `WFS_EXEE_CDM_STARTDISPENSE`.
    StartDispense,
    /// `WFS_EXEE_CDM_CASHUNITERROR`.
    CashUnitError,
    /// `WFS_SRVE_CDM_SAFEDOOROPEN`.
    SafeDoorOpen,
    /// `WFS_SRVE_CDM_SAFEDOORCLOSED`.
    SafeDoorClosed,
    /// `WFS_USRE_CDM_CASHUNITTHRESHOLD`.
    CashUnitThreshold,
    /// `WFS_SRVE_CDM_CASHUNITINFOCHANGED`.
    CashUnitInfoChanged,
    /// `WFS_SRVE_CDM_TELLERINFOCHANGED`.
    TellerInfoChanged,
    /// `WFS_EXEE_CDM_PARTIALDISPENSE`.
    PartialDispense,
    /// `WFS_EXEE_CDM_SUBDISPENSEOK`.
    SubDispenseOk,
    /// `WFS_SRVE_CDM_ITEMSTAKEN`.
    ItemsTaken,
    /// `WFS_EXEE_CDM_INCOMPLETEDISPENSE`.
    IncompleteDispense,
    /// `WFS_EXEE_CDM_NOTEERROR`.
    NoteError,
    /// `WFS_SRVE_CDM_ITEMSPRESENTED`.
    ItemsPresented,
    /// `WFS_SRVE_CDM_COUNTS_CHANGED`.
    CountsChanged,
    /// `WFS_EXEE_CDM_INPUT_P6`.
    InputP6,
    /// `WFS_SRVE_CDM_MEDIADETECTED`.
    MediaDetected,
    /// `WFS_EXEE_CDM_INFO_AVAILABLE`.
    InfoAvailable,
    /// `WFS_SRVE_CDM_DEVICEPOSITION`.
    DevicePosition,
    /// `WFS_SRVE_CDM_POWER_SAVE_CHANGE`.
    PowerSaveChange,
    /// `WFS_EXEE_CDM_INCOMPLETERETRACT`.
    IncompleteRetract,
    /// `WFS_SRVE_CDM_SHUTTERSTATUSCHANGED`.
    ShutterStatusChanged,
}

impl CdmMessage {
    const ALL: [Self; 22] = [
        Self::DelayedDispense,
        Self::StartDispense,
        Self::CashUnitError,
        Self::SafeDoorOpen,
        Self::SafeDoorClosed,
        Self::CashUnitThreshold,
        Self::CashUnitInfoChanged,
        Self::TellerInfoChanged,
        Self::PartialDispense,
        Self::SubDispenseOk,
        Self::ItemsTaken,
        Self::IncompleteDispense,
        Self::NoteError,
        Self::ItemsPresented,
        Self::CountsChanged,
        Self::InputP6,
        Self::MediaDetected,
        Self::InfoAvailable,
        Self::DevicePosition,
        Self::PowerSaveChange,
        Self::IncompleteRetract,
        Self::ShutterStatusChanged,
    ];

    /// Maps a raw event id.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|message| message.code() == code)
    }

    /// Raw event id. Ids run consecutively from the service offset.
    #[must_use]
    pub const fn code(self) -> u32 {
        CDM_SERVICE_OFFSET + 1 + self as u32
    }
}

impl fmt::Display for CdmMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decodes an event payload, tagging failures with the event id.
fn read<T: ResultType>(decoder: &dyn ResultDecoder, result: &RawResult) -> Result<T, EventError> {
    decode_as(decoder, &result.payload).map_err(|source| EventError::Decode {
        event_id: result.event_id,
        source,
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Payload, ServiceError> {
    Payload::from_json(value).map_err(|error| ServiceError::Encode {
        message: error.to_string(),
    })
}

/// Typed access to an open cash dispenser.
#[derive(Clone)]
pub struct CdmService {
    service: Service,
    router: Arc<CdmEventRouter>,
}

impl CdmService {
    /// Wraps `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::KindMismatch`] when the service was not
    /// opened as a cash dispenser.
    pub fn new(service: Service) -> Result<Self, ServiceError> {
        if service.kind() != ServiceKind::Cdm {
            return Err(ServiceError::KindMismatch {
                service_id: service.id(),
                expected: ServiceKind::Cdm,
                actual: service.kind(),
            });
        }
        let Device::Cdm(cdm_router) = service.device();
        let router = Arc::clone(cdm_router);
        Ok(Self { service, router })
    }

    /// Underlying service.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Service handle.
    #[must_use]
    pub fn id(&self) -> ServiceId {
        self.service.id()
    }

    /// Dispenses notes. `listener` receives the command's progress events.
    ///
    /// The future yields the denomination actually dispensed.
    ///
    /// # Errors
    ///
    /// Fails when the request cannot be encoded or submitted.
    pub fn dispense(
        &self,
        dispense: &Dispense,
        listener: Arc<dyn DispenseListener>,
    ) -> Result<StdXfsFuture<Denomination>, ServiceError> {
        let command = ExecuteCommand::new(CMD_DISPENSE).with_data(encode(dispense)?);
        let callback: Arc<dyn IntermediateListener> = Arc::new(DispenseCallback::new(
            Arc::clone(self.service.decoder()),
            listener,
        ));
        self.service.execute(&command, Some(callback))
    }

    /// Presents dispensed notes at `position`.
    ///
    /// # Errors
    ///
    /// Fails when the request cannot be encoded or submitted.
    pub fn present(
        &self,
        position: Position,
        listener: Arc<dyn PresentListener>,
    ) -> Result<StdXfsFuture<()>, ServiceError> {
        let command = ExecuteCommand::new(CMD_PRESENT).with_data(encode(&position)?);
        let callback: Arc<dyn IntermediateListener> = Arc::new(PresentCallback::new(
            Arc::clone(self.service.decoder()),
            listener,
        ));
        self.service.execute(&command, Some(callback))
    }

    /// Queries the device status.
    ///
    /// # Errors
    ///
    /// Fails when the query cannot be submitted.
    pub fn status(&self) -> Result<StdXfsFuture<CdmStatus>, ServiceError> {
        self.service.get_info(&InfoCommand::new(INF_STATUS))
    }

    /// Queries the device capabilities.
    ///
    /// # Errors
    ///
    /// Fails when the query cannot be submitted.
    pub fn capabilities(&self) -> Result<StdXfsFuture<CdmCapabilities>, ServiceError> {
        self.service.get_info(&InfoCommand::new(INF_CAPABILITIES))
    }

    /// Queries the logical cash units.
    ///
    /// # Errors
    ///
    /// Fails when the query cannot be submitted.
    pub fn cash_unit_info(&self) -> Result<StdXfsFuture<CashUnitInfo>, ServiceError> {
        self.service.get_info(&InfoCommand::new(INF_CASH_UNIT_INFO))
    }

    /// Adds a listener for unsolicited dispenser events.
    pub fn add_service_listener(&self, listener: Arc<dyn CdmServiceListener>) {
        self.router.add_listener(listener);
    }

    /// Removes a listener added with
    /// [`add_service_listener`](Self::add_service_listener).
    pub fn remove_service_listener(&self, listener: &Arc<dyn CdmServiceListener>) {
        self.router.remove_listener(listener);
    }
}

impl TryFrom<Service> for CdmService {
    type Error = ServiceError;

    fn try_from(service: Service) -> Result<Self, Self::Error> {
        Self::new(service)
    }
}

impl fmt::Debug for CdmService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdmService")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
