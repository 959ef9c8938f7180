//! Canonical cash dispenser values.
//!
//! Every versioned payload layout normalises into one of these shapes, so
//! callers see the same type whatever release the provider speaks. Fields
//! introduced by later releases are `None` when the negotiated version
//! predates them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decode::{ResultKind, ResultType};
use crate::service::DeviceState;

macro_rules! result_kind {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(impl ResultType for $ty {
            const KIND: Option<ResultKind> = Some(ResultKind::$kind);
        })+
    };
}

/// Output positions a dispenser can present notes at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Provider default position.
    Default,
    /// Left output.
    Left,
    /// Right output.
    Right,
    /// Centre output.
    Center,
    /// Top output.
    Top,
    /// Bottom output.
    Bottom,
    /// Front output.
    Front,
    /// Rear output.
    Rear,
}

/// Reason a note could not be dispensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteErrorReason {
    /// Two notes were picked at once.
    DoubleNoteDetected,
    /// A note exceeded the expected length.
    LongNoteDetected,
    /// A note was skewed in the transport.
    SkewedNote,
    /// The dispensed count did not match.
    IncorrectCount,
    /// Notes were too close together.
    NotesTooClose,
    /// Any other note fault.
    OtherNoteError,
    /// A note was shorter than expected.
    ShortNoteDetected,
}

/// Reason a cash unit failed during an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashUnitFailure {
    /// The unit ran empty.
    Empty,
    /// The unit reported a fault.
    Error,
    /// The unit is full.
    Full,
    /// The unit is locked.
    Locked,
    /// The unit is not configured.
    Invalid,
    /// The unit's configuration changed.
    Config,
    /// The unit is not physically present.
    NotConfigured,
}

/// Safe door state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    /// The device has no safe door sensor.
    NotSupported,
    /// The door is open.
    Open,
    /// The door is closed.
    Closed,
    /// The door is closed and locked.
    Locked,
    /// The state cannot be determined.
    Unknown,
}

/// Overall state of the dispensing units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenserState {
    /// All units are usable.
    Ok,
    /// Some units are unusable.
    State,
    /// No unit is usable.
    Stop,
    /// The state cannot be determined.
    Unknown,
}

/// Intermediate stacker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackerState {
    /// Empty.
    Empty,
    /// Holds notes.
    NotEmpty,
    /// Holds notes belonging to a customer.
    NotEmptyCustomer,
    /// Holds notes of unknown ownership.
    NotEmptyUnknown,
    /// The state cannot be determined.
    Unknown,
    /// The device has no intermediate stacker.
    NotSupported,
}

/// Shutter state at an output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterState {
    /// Closed.
    Closed,
    /// Open.
    Open,
    /// Jammed.
    Jammed,
    /// The state cannot be determined.
    Unknown,
    /// The position has no shutter.
    NotSupported,
}

/// Physical position of the device relative to its normal operating
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePositionState {
    /// In its operating position.
    InPosition,
    /// Moved out of its operating position.
    NotInPosition,
    /// The position cannot be determined.
    Unknown,
    /// The device cannot report its position.
    NotSupported,
}

/// Anti-fraud module state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiFraudModule {
    /// No module is fitted.
    NotSupported,
    /// Working.
    Ok,
    /// Inoperable.
    Inoperable,
    /// Detected a foreign device.
    DeviceDetected,
    /// The state cannot be determined.
    Unknown,
}

/// Notes dispensed, or to be dispensed, per cash unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Denomination {
    /// ISO 4217 currency code.
    pub currency_id: String,
    /// Total amount in minor units.
    pub amount: u32,
    /// Note counts indexed by logical cash unit.
    #[serde(default)]
    pub values: Vec<u32>,
    /// Amount taken from the cash box, for devices that support one.
    #[serde(default)]
    pub cash_box: u32,
}

/// A physical cassette backing a logical cash unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalCashUnit {
    /// Physical position name.
    pub position_name: String,
    /// Unit identifier printed on the cassette.
    pub unit_id: String,
    /// Notes loaded at the last replenishment.
    pub initial_count: u32,
    /// Notes currently held.
    pub count: u32,
    /// Notes rejected from this cassette.
    pub reject_count: u32,
    /// Notes dispensed since replenishment. Absent before 3.10.
    pub dispensed_count: Option<u32>,
    /// Notes presented since replenishment. Absent before 3.10.
    pub presented_count: Option<u32>,
    /// Notes retracted into this cassette. Absent before 3.10.
    pub retracted_count: Option<u32>,
}

/// A logical cash unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashUnit {
    /// Logical unit number.
    pub number: u16,
    /// Unit role, e.g. `bill_cassette` or `reject_cassette`.
    pub unit_type: String,
    /// Operator-assigned name.
    pub cash_unit_name: String,
    /// ISO 4217 currency code.
    pub currency_id: String,
    /// Note value in minor units.
    pub values: u32,
    /// Notes loaded at the last replenishment.
    pub initial_count: u32,
    /// Notes currently held.
    pub count: u32,
    /// Notes rejected from this unit.
    pub reject_count: u32,
    /// Low threshold.
    pub minimum: u32,
    /// High threshold.
    pub maximum: u32,
    /// Whether the application locked the unit.
    pub app_lock: bool,
    /// Unit status, e.g. `ok` or `low`.
    pub status: String,
    /// Physical cassettes behind the unit.
    pub physical: Vec<PhysicalCashUnit>,
}

/// Every logical cash unit of a teller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashUnitInfo {
    /// Teller the units belong to.
    pub teller_id: u16,
    /// Logical units.
    pub cash_units: Vec<CashUnit>,
}

/// A cash unit fault raised during an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashUnitError {
    /// Failure type.
    pub failure: CashUnitFailure,
    /// Affected unit, when the provider identified it.
    pub cash_unit: Option<CashUnit>,
}

/// State of one output position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPosition {
    /// Position described.
    pub position: Position,
    /// Shutter state.
    pub shutter: ShutterState,
    /// Whether notes are waiting at the position, e.g. `empty`.
    pub position_status: String,
    /// Transport state behind the position, e.g. `ok`.
    pub transport: String,
}

/// Device status (`WFS_INF_CDM_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmStatus {
    /// Device state.
    pub device: DeviceState,
    /// Safe door state.
    pub safe_door: DoorState,
    /// Dispenser state.
    pub dispenser: DispenserState,
    /// Intermediate stacker state.
    pub intermediate_stacker: StackerState,
    /// Output position states.
    pub positions: Vec<OutputPosition>,
    /// Vendor-specific details.
    pub extra: BTreeMap<String, String>,
    /// Guidance light states. Absent before 3.10.
    pub guid_lights: Option<Vec<u32>>,
    /// Device position. Absent before 3.10.
    pub device_position: Option<DevicePositionState>,
    /// Seconds needed to leave power-save mode. Absent before 3.10.
    pub power_save_recovery_time: Option<u16>,
    /// Anti-fraud module state. Absent before 3.20.
    pub anti_fraud_module: Option<AntiFraudModule>,
}

/// Device capabilities (`WFS_INF_CDM_CAPABILITIES`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdmCapabilities {
    /// Whether the device is a teller or self-service dispenser.
    pub device_type: String,
    /// Largest number of notes one dispense can deliver.
    pub max_dispense_items: u16,
    /// Whether the device is part of a compound device.
    pub compound: bool,
    /// Whether the device has a shutter.
    pub shutter: bool,
    /// Whether the shutter opens and closes with present and retract.
    pub shutter_control: bool,
    /// Whether the device has a safe door sensor.
    pub safe_door: bool,
    /// Whether the device has a cash box.
    pub cash_box: bool,
    /// Whether the device has an intermediate stacker.
    pub intermediate_stacker: bool,
    /// Whether the device senses when notes are taken.
    pub items_taken_sensor: bool,
    /// Output positions the device supports.
    pub positions: Vec<Position>,
    /// Vendor-specific details.
    pub extra: BTreeMap<String, String>,
    /// Supported guidance lights. Absent before 3.10.
    pub guid_lights: Option<Vec<u32>>,
    /// Whether power-save control is supported. Absent before 3.10.
    pub power_save_control: Option<bool>,
    /// Whether dispense preparation is supported. Absent before 3.10.
    pub prepare_dispense: Option<bool>,
    /// Whether an anti-fraud module is fitted. Absent before 3.20.
    pub anti_fraud_module: Option<bool>,
    /// Commands that can be synchronised. Absent before 3.30.
    pub synchronizable_commands: Option<Vec<u32>>,
}

/// Logical cash units whose counts changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsChanged {
    /// Changed unit numbers.
    pub cash_unit_numbers: Vec<u16>,
}

/// Where detected media was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPosition {
    /// Logical cash unit holding the media, or zero.
    pub number: u16,
    /// Retract area the media was moved to, if any.
    pub retract_area: Option<u16>,
    /// Output position holding the media, if any.
    pub output_position: Option<Position>,
}

/// Device position change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePosition {
    /// New position.
    pub position: DevicePositionState,
}

/// Power-save mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSaveChange {
    /// Seconds needed to leave power-save mode; zero when it was left.
    pub power_save_recovery_time: u16,
}

/// Shutter state change at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutterStatusChanged {
    /// Position whose shutter changed.
    pub position: Position,
    /// New shutter state.
    pub shutter: ShutterState,
}

/// Item information available for retrieval after a note error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfoSummary {
    /// Note classification level.
    pub level: u16,
    /// Items of that level with information available.
    pub number_of_items: u16,
}

/// Input of `WFS_CMD_CDM_DISPENSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispense {
    /// Teller the dispense is booked against.
    pub teller_id: u16,
    /// Mix algorithm, or zero to use `denomination.values`.
    pub mix_number: u16,
    /// Output position.
    pub position: Position,
    /// Whether to present the notes immediately.
    pub present: bool,
    /// Requested amount and, for mix zero, per-unit counts.
    pub denomination: Denomination,
}

impl Dispense {
    /// Dispenses `denomination` with the provider's default mix to the
    /// default position.
    #[must_use]
    pub const fn new(denomination: Denomination) -> Self {
        Self {
            teller_id: 0,
            mix_number: 1,
            position: Position::Default,
            present: false,
            denomination,
        }
    }

    /// Selects the output position.
    #[must_use]
    pub const fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Presents the notes as part of the dispense.
    #[must_use]
    pub const fn presenting(mut self) -> Self {
        self.present = true;
        self
    }
}

result_kind!(
    Position => Scalar,
    NoteErrorReason => Scalar,
    Denomination => CdmDenomination,
    CashUnit => CdmCashUnit,
    CashUnitInfo => CdmCashUnitInfo,
    CashUnitError => CdmCashUnitError,
    CdmStatus => CdmStatus,
    CdmCapabilities => CdmCapabilities,
    CountsChanged => CdmCountsChanged,
    ItemPosition => CdmItemPosition,
    DevicePosition => CdmDevicePosition,
    PowerSaveChange => CdmPowerSaveChange,
    ShutterStatusChanged => CdmShutterStatusChanged,
    ItemInfoSummary => CdmItemInfoSummary,
);
