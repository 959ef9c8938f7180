//! System event payloads and the listeners they fan out to.

use serde::{Deserialize, Serialize};

use crate::decode::{ResultKind, ResultType};
use crate::transport::NegotiatedVersion;

/// Recovery the provider expects after a hardware or software fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Reset the device.
    Reset,
    /// Replace a software component.
    SoftwareError,
    /// Configuration must be corrected.
    Configuration,
    /// A hardware component must be repaired.
    HardwareError,
    /// An operator must intervene.
    UserError,
    /// The fault needs no action.
    NoAction,
}

/// Device state reported through [`DeviceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Ready for use.
    Online,
    /// Offline but powered.
    Offline,
    /// Powered down.
    PowerOff,
    /// Not present.
    NoDevice,
    /// Faulted.
    HardwareError,
    /// Waiting on an operator.
    UserError,
    /// Processing another request.
    Busy,
    /// Locked by a fraud attempt.
    FraudAttempt,
    /// Detected a potential fraud attempt but still usable.
    PotentialFraud,
}

/// `WFSUNDEVMSG`: a message the manager failed to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndeliverableMessage {
    /// Logical service the message came from.
    pub logical_name: String,
    /// Workstation that hosted the application.
    pub workstation_name: String,
    /// Application the message was addressed to.
    pub app_id: String,
    /// Raw message code.
    pub message: u32,
    /// Provider-supplied description bytes.
    #[serde(default)]
    pub description: Vec<u8>,
}

impl ResultType for UndeliverableMessage {
    const KIND: Option<ResultKind> = Some(ResultKind::UndeliverableMessage);
}

/// `WFSHWERROR`: a hardware, software, user or fraud fault report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareError {
    /// Logical service reporting the fault.
    pub logical_name: String,
    /// Physical device name.
    pub physical_name: String,
    /// Workstation hosting the device.
    pub workstation_name: String,
    /// Application that owned the request, when known.
    #[serde(default)]
    pub app_id: String,
    /// Expected recovery.
    pub action: ErrorAction,
    /// Provider-supplied description bytes.
    #[serde(default)]
    pub description: Vec<u8>,
}

impl ResultType for HardwareError {
    const KIND: Option<ResultKind> = Some(ResultKind::HardwareError);
}

/// `WFSDEVSTATUS`: a device state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Physical device name.
    pub physical_name: String,
    /// Workstation hosting the device.
    pub workstation_name: String,
    /// New device state.
    pub state: DeviceState,
}

impl ResultType for DeviceStatus {
    const KIND: Option<ResultKind> = Some(ResultKind::DeviceStatus);
}

/// `WFSAPPDISC`: an application disconnected from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDisconnect {
    /// Logical service affected.
    pub logical_name: String,
    /// Workstation the application ran on.
    pub workstation_name: String,
    /// Disconnected application.
    pub app_id: String,
}

impl ResultType for AppDisconnect {
    const KIND: Option<ResultKind> = Some(ResultKind::AppDisconnect);
}

/// `WFSVRSNERROR`: version negotiation failed between manager layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionError {
    /// Logical service affected.
    pub logical_name: String,
    /// Workstation the application runs on.
    pub workstation_name: String,
    /// Application affected.
    pub app_id: String,
    /// Versions the failing layer offered.
    pub version: NegotiatedVersion,
}

impl ResultType for VersionError {
    const KIND: Option<ResultKind> = Some(ResultKind::VersionError);
}

/// Receives system events raised by a service. Every method defaults to a
/// no-op, so listeners implement only what they need.
pub trait SystemEventListener: Send + Sync {
    /// The manager failed to deliver a message.
    fn on_undeliverable_message(&self, _message: &UndeliverableMessage) {}

    /// The device reported a hardware fault.
    fn on_hardware_error(&self, _error: &HardwareError) {}

    /// The device changed state.
    fn on_device_status(&self, _status: &DeviceStatus) {}

    /// An application disconnected.
    fn on_app_disconnect(&self, _disconnect: &AppDisconnect) {}

    /// The provider reported a software fault.
    fn on_software_error(&self, _error: &HardwareError) {}

    /// An operator must intervene.
    fn on_user_error(&self, _error: &HardwareError) {}

    /// Another application asked for the lock this application holds.
    fn on_lock_requested(&self) {}

    /// The device detected tampering.
    fn on_fraud_attempt(&self, _error: &HardwareError) {}
}
