//! Release-specific payload layouts and the table that selects them.
//!
//! Later layouts extend earlier ones by flattening the previous release's
//! layout and adding the fields that release introduced.

use std::collections::BTreeMap;

use serde::Deserialize;
use xfs_config::XfsVersion;

use super::types::{
    AntiFraudModule, CashUnit, CashUnitError, CashUnitFailure, CashUnitInfo, CdmCapabilities,
    CdmStatus, CountsChanged, Denomination, DevicePosition, DevicePositionState, DispenserState,
    DoorState, ItemInfoSummary, ItemPosition, OutputPosition, PhysicalCashUnit, Position,
    PowerSaveChange, ShutterStatusChanged, StackerState,
};
use crate::decode::{DecodeTable, ResultKind, layout};
use crate::service::DeviceState;

/// Builds the decode table for a cash dispenser negotiated at `version`.
#[must_use]
pub fn decode_table(version: XfsVersion) -> DecodeTable {
    DecodeTable::new(version)
        .with_layout(
            ResultKind::CdmStatus,
            XfsVersion::V3_00,
            layout::<Status300, CdmStatus>,
        )
        .with_layout(
            ResultKind::CdmStatus,
            XfsVersion::V3_10,
            layout::<Status310, CdmStatus>,
        )
        .with_layout(
            ResultKind::CdmStatus,
            XfsVersion::V3_20,
            layout::<Status320, CdmStatus>,
        )
        .with_layout(
            ResultKind::CdmCapabilities,
            XfsVersion::V3_00,
            layout::<Capabilities300, CdmCapabilities>,
        )
        .with_layout(
            ResultKind::CdmCapabilities,
            XfsVersion::V3_10,
            layout::<Capabilities310, CdmCapabilities>,
        )
        .with_layout(
            ResultKind::CdmCapabilities,
            XfsVersion::V3_20,
            layout::<Capabilities320, CdmCapabilities>,
        )
        .with_layout(
            ResultKind::CdmCapabilities,
            XfsVersion::V3_30,
            layout::<Capabilities330, CdmCapabilities>,
        )
        .with_layout(
            ResultKind::CdmCashUnit,
            XfsVersion::V3_00,
            layout::<CashUnit300, CashUnit>,
        )
        .with_layout(
            ResultKind::CdmCashUnit,
            XfsVersion::V3_10,
            layout::<CashUnit310, CashUnit>,
        )
        .with_layout(
            ResultKind::CdmCashUnitInfo,
            XfsVersion::V3_00,
            layout::<CashUnitInfo300, CashUnitInfo>,
        )
        .with_layout(
            ResultKind::CdmCashUnitInfo,
            XfsVersion::V3_10,
            layout::<CashUnitInfo310, CashUnitInfo>,
        )
        .with_layout(
            ResultKind::CdmCashUnitError,
            XfsVersion::V3_00,
            layout::<CashUnitError300, CashUnitError>,
        )
        .with_layout(
            ResultKind::CdmCashUnitError,
            XfsVersion::V3_10,
            layout::<CashUnitError310, CashUnitError>,
        )
        .with_layout(
            ResultKind::CdmDenomination,
            XfsVersion::V3_00,
            layout::<Denomination, Denomination>,
        )
        .with_layout(
            ResultKind::CdmCountsChanged,
            XfsVersion::V3_00,
            layout::<CountsChanged, CountsChanged>,
        )
        .with_layout(
            ResultKind::CdmItemPosition,
            XfsVersion::V3_00,
            layout::<ItemPosition, ItemPosition>,
        )
        .with_layout(
            ResultKind::CdmDevicePosition,
            XfsVersion::V3_10,
            layout::<DevicePosition, DevicePosition>,
        )
        .with_layout(
            ResultKind::CdmPowerSaveChange,
            XfsVersion::V3_10,
            layout::<PowerSaveChange, PowerSaveChange>,
        )
        .with_layout(
            ResultKind::CdmShutterStatusChanged,
            XfsVersion::V3_30,
            layout::<ShutterStatusChanged, ShutterStatusChanged>,
        )
        .with_layout(
            ResultKind::CdmItemInfoSummary,
            XfsVersion::V3_30,
            layout::<ItemInfoSummary, ItemInfoSummary>,
        )
}

#[derive(Deserialize)]
struct Status300 {
    device: DeviceState,
    safe_door: DoorState,
    dispenser: DispenserState,
    intermediate_stacker: StackerState,
    #[serde(default)]
    positions: Vec<OutputPosition>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Status310 {
    #[serde(flatten)]
    base: Status300,
    #[serde(default)]
    guid_lights: Vec<u32>,
    device_position: DevicePositionState,
    power_save_recovery_time: u16,
}

#[derive(Deserialize)]
struct Status320 {
    #[serde(flatten)]
    base: Status310,
    anti_fraud_module: AntiFraudModule,
}

impl From<Status300> for CdmStatus {
    fn from(layout: Status300) -> Self {
        Self {
            device: layout.device,
            safe_door: layout.safe_door,
            dispenser: layout.dispenser,
            intermediate_stacker: layout.intermediate_stacker,
            positions: layout.positions,
            extra: layout.extra,
            guid_lights: None,
            device_position: None,
            power_save_recovery_time: None,
            anti_fraud_module: None,
        }
    }
}

impl From<Status310> for CdmStatus {
    fn from(layout: Status310) -> Self {
        Self {
            guid_lights: Some(layout.guid_lights),
            device_position: Some(layout.device_position),
            power_save_recovery_time: Some(layout.power_save_recovery_time),
            ..Self::from(layout.base)
        }
    }
}

impl From<Status320> for CdmStatus {
    fn from(layout: Status320) -> Self {
        Self {
            anti_fraud_module: Some(layout.anti_fraud_module),
            ..Self::from(layout.base)
        }
    }
}

#[derive(Deserialize)]
struct Capabilities300 {
    device_type: String,
    max_dispense_items: u16,
    compound: bool,
    shutter: bool,
    shutter_control: bool,
    safe_door: bool,
    cash_box: bool,
    intermediate_stacker: bool,
    items_taken_sensor: bool,
    #[serde(default)]
    positions: Vec<Position>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Capabilities310 {
    #[serde(flatten)]
    base: Capabilities300,
    #[serde(default)]
    guid_lights: Vec<u32>,
    power_save_control: bool,
    prepare_dispense: bool,
}

#[derive(Deserialize)]
struct Capabilities320 {
    #[serde(flatten)]
    base: Capabilities310,
    anti_fraud_module: bool,
}

#[derive(Deserialize)]
struct Capabilities330 {
    #[serde(flatten)]
    base: Capabilities320,
    #[serde(default)]
    synchronizable_commands: Vec<u32>,
}

impl From<Capabilities300> for CdmCapabilities {
    fn from(layout: Capabilities300) -> Self {
        Self {
            device_type: layout.device_type,
            max_dispense_items: layout.max_dispense_items,
            compound: layout.compound,
            shutter: layout.shutter,
            shutter_control: layout.shutter_control,
            safe_door: layout.safe_door,
            cash_box: layout.cash_box,
            intermediate_stacker: layout.intermediate_stacker,
            items_taken_sensor: layout.items_taken_sensor,
            positions: layout.positions,
            extra: layout.extra,
            guid_lights: None,
            power_save_control: None,
            prepare_dispense: None,
            anti_fraud_module: None,
            synchronizable_commands: None,
        }
    }
}

impl From<Capabilities310> for CdmCapabilities {
    fn from(layout: Capabilities310) -> Self {
        Self {
            guid_lights: Some(layout.guid_lights),
            power_save_control: Some(layout.power_save_control),
            prepare_dispense: Some(layout.prepare_dispense),
            ..Self::from(layout.base)
        }
    }
}

impl From<Capabilities320> for CdmCapabilities {
    fn from(layout: Capabilities320) -> Self {
        Self {
            anti_fraud_module: Some(layout.anti_fraud_module),
            ..Self::from(layout.base)
        }
    }
}

impl From<Capabilities330> for CdmCapabilities {
    fn from(layout: Capabilities330) -> Self {
        Self {
            synchronizable_commands: Some(layout.synchronizable_commands),
            ..Self::from(layout.base)
        }
    }
}

#[derive(Deserialize)]
struct PhysicalCashUnit300 {
    position_name: String,
    unit_id: String,
    initial_count: u32,
    count: u32,
    reject_count: u32,
}

#[derive(Deserialize)]
struct PhysicalCashUnit310 {
    #[serde(flatten)]
    base: PhysicalCashUnit300,
    dispensed_count: u32,
    presented_count: u32,
    retracted_count: u32,
}

impl From<PhysicalCashUnit300> for PhysicalCashUnit {
    fn from(layout: PhysicalCashUnit300) -> Self {
        Self {
            position_name: layout.position_name,
            unit_id: layout.unit_id,
            initial_count: layout.initial_count,
            count: layout.count,
            reject_count: layout.reject_count,
            dispensed_count: None,
            presented_count: None,
            retracted_count: None,
        }
    }
}

impl From<PhysicalCashUnit310> for PhysicalCashUnit {
    fn from(layout: PhysicalCashUnit310) -> Self {
        Self {
            dispensed_count: Some(layout.dispensed_count),
            presented_count: Some(layout.presented_count),
            retracted_count: Some(layout.retracted_count),
            ..Self::from(layout.base)
        }
    }
}

/// Logical unit fields shared by every release, generic over the physical
/// cassette layout.
#[derive(Deserialize)]
struct CashUnitLayout<P> {
    number: u16,
    unit_type: String,
    cash_unit_name: String,
    currency_id: String,
    values: u32,
    initial_count: u32,
    count: u32,
    reject_count: u32,
    minimum: u32,
    maximum: u32,
    app_lock: bool,
    status: String,
    #[serde(default = "Vec::new")]
    physical: Vec<P>,
}

type CashUnit300 = CashUnitLayout<PhysicalCashUnit300>;
type CashUnit310 = CashUnitLayout<PhysicalCashUnit310>;

impl<P: Into<PhysicalCashUnit>> From<CashUnitLayout<P>> for CashUnit {
    fn from(layout: CashUnitLayout<P>) -> Self {
        Self {
            number: layout.number,
            unit_type: layout.unit_type,
            cash_unit_name: layout.cash_unit_name,
            currency_id: layout.currency_id,
            values: layout.values,
            initial_count: layout.initial_count,
            count: layout.count,
            reject_count: layout.reject_count,
            minimum: layout.minimum,
            maximum: layout.maximum,
            app_lock: layout.app_lock,
            status: layout.status,
            physical: layout.physical.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize)]
struct CashUnitInfoLayout<P> {
    teller_id: u16,
    #[serde(default = "Vec::new")]
    cash_units: Vec<CashUnitLayout<P>>,
}

type CashUnitInfo300 = CashUnitInfoLayout<PhysicalCashUnit300>;
type CashUnitInfo310 = CashUnitInfoLayout<PhysicalCashUnit310>;

impl<P: Into<PhysicalCashUnit>> From<CashUnitInfoLayout<P>> for CashUnitInfo {
    fn from(layout: CashUnitInfoLayout<P>) -> Self {
        Self {
            teller_id: layout.teller_id,
            cash_units: layout.cash_units.into_iter().map(CashUnit::from).collect(),
        }
    }
}

#[derive(Deserialize)]
struct CashUnitErrorLayout<P> {
    failure: CashUnitFailure,
    #[serde(default = "Option::default")]
    cash_unit: Option<CashUnitLayout<P>>,
}

type CashUnitError300 = CashUnitErrorLayout<PhysicalCashUnit300>;
type CashUnitError310 = CashUnitErrorLayout<PhysicalCashUnit310>;

impl<P: Into<PhysicalCashUnit>> From<CashUnitErrorLayout<P>> for CashUnitError {
    fn from(layout: CashUnitErrorLayout<P>) -> Self {
        Self {
            failure: layout.failure,
            cash_unit: layout.cash_unit.map(CashUnit::from),
        }
    }
}
