//! Unsolicited cash dispenser events and the listeners they reach.

use std::sync::{Arc, Mutex};

use tracing::info;

use super::types::{
    CashUnit, CountsChanged, DevicePosition, ItemPosition, Position, PowerSaveChange,
    ShutterStatusChanged,
};
use super::{CDM_TARGET, CdmMessage, read};
use crate::decode::ResultDecoder;
use crate::error::EventError;
use crate::event::RawResult;
use crate::service::DeviceEvents;
use crate::sync::lock;

/// Receives service and user events raised by a cash dispenser. Every
/// method defaults to a no-op.
pub trait CdmServiceListener: Send + Sync {
    /// The safe door was opened.
    fn on_safe_door_open(&self) {}

    /// The safe door was closed.
    fn on_safe_door_closed(&self) {}

    /// A cash unit crossed its low or high threshold.
    fn on_cash_unit_threshold(&self, _cash_unit: &CashUnit) {}

    /// A cash unit's configuration or counts changed.
    fn on_cash_unit_info_changed(&self, _cash_unit: &CashUnit) {}

    /// A teller's totals changed.
    fn on_teller_info_changed(&self, _teller_id: u16) {}

    /// The customer took the notes at `position`.
    fn on_items_taken(&self, _position: Position) {}

    /// Counts changed without a command, e.g. after a replenishment.
    fn on_counts_changed(&self, _counts: &CountsChanged) {}

    /// Notes were presented to the customer.
    fn on_items_presented(&self) {}

    /// Media was found in the device, e.g. after a reset. `None` when the
    /// provider could not say where.
    fn on_media_detected(&self, _position: Option<&ItemPosition>) {}

    /// The device moved.
    fn on_device_position(&self, _position: &DevicePosition) {}

    /// Power-save mode was entered or left.
    fn on_power_save_change(&self, _change: &PowerSaveChange) {}

    /// A shutter changed state outside a command.
    fn on_shutter_status_changed(&self, _change: &ShutterStatusChanged) {}
}

/// Decodes cash dispenser service and user events and fans them out to
/// registered [`CdmServiceListener`]s.
pub struct CdmEventRouter {
    decoder: Arc<dyn ResultDecoder>,
    listeners: Mutex<Vec<Arc<dyn CdmServiceListener>>>,
}

impl CdmEventRouter {
    /// Builds a router that decodes payloads with `decoder`.
    #[must_use]
    pub const fn new(decoder: Arc<dyn ResultDecoder>) -> Self {
        Self {
            decoder,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Adds a listener.
    pub fn add_listener(&self, listener: Arc<dyn CdmServiceListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Removes every registration of `listener`.
    pub fn remove_listener(&self, listener: &Arc<dyn CdmServiceListener>) {
        lock(&self.listeners).retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn notify<F>(&self, message: CdmMessage, notify: F)
    where
        F: Fn(&dyn CdmServiceListener),
    {
        info!(target: CDM_TARGET, event = %message, "firing service listeners");
        let listeners = lock(&self.listeners).clone();
        for listener in &listeners {
            notify(listener.as_ref());
        }
    }
}

impl DeviceEvents for CdmEventRouter {
    fn fire_service_event(&self, result: &RawResult) -> Result<(), EventError> {
        let unknown = || EventError::UnknownEvent {
            class: "service",
            event_id: result.event_id,
        };
        let message = CdmMessage::from_code(result.event_id).ok_or_else(unknown)?;
        let decoder = self.decoder.as_ref();
        match message {
            CdmMessage::SafeDoorOpen => self.notify(message, |l| l.on_safe_door_open()),
            CdmMessage::SafeDoorClosed => self.notify(message, |l| l.on_safe_door_closed()),
            CdmMessage::CashUnitInfoChanged => {
                let cash_unit: CashUnit = read(decoder, result)?;
                self.notify(message, |l| l.on_cash_unit_info_changed(&cash_unit));
            }
            CdmMessage::TellerInfoChanged => {
                let teller_id: u16 = read(decoder, result)?;
                self.notify(message, |l| l.on_teller_info_changed(teller_id));
            }
            CdmMessage::ItemsTaken => {
                let position: Position = read(decoder, result)?;
                self.notify(message, |l| l.on_items_taken(position));
            }
            CdmMessage::ItemsPresented => self.notify(message, |l| l.on_items_presented()),
            CdmMessage::CountsChanged => {
                let counts: CountsChanged = read(decoder, result)?;
                self.notify(message, |l| l.on_counts_changed(&counts));
            }
            CdmMessage::MediaDetected => {
                let position: Option<ItemPosition> = if result.payload.is_empty() {
                    None
                } else {
                    Some(read(decoder, result)?)
                };
                self.notify(message, |l| l.on_media_detected(position.as_ref()));
            }
            CdmMessage::DevicePosition => {
                let position: DevicePosition = read(decoder, result)?;
                self.notify(message, |l| l.on_device_position(&position));
            }
            CdmMessage::PowerSaveChange => {
                let change: PowerSaveChange = read(decoder, result)?;
                self.notify(message, |l| l.on_power_save_change(&change));
            }
            CdmMessage::ShutterStatusChanged => {
                let change: ShutterStatusChanged = read(decoder, result)?;
                self.notify(message, |l| l.on_shutter_status_changed(&change));
            }
            _ => return Err(unknown()),
        }
        Ok(())
    }

    fn fire_user_event(&self, result: &RawResult) -> Result<(), EventError> {
        match CdmMessage::from_code(result.event_id) {
            Some(message @ CdmMessage::CashUnitThreshold) => {
                let cash_unit: CashUnit = read(self.decoder.as_ref(), result)?;
                self.notify(message, |l| l.on_cash_unit_threshold(&cash_unit));
                Ok(())
            }
            _ => Err(EventError::UnknownEvent {
                class: "user",
                event_id: result.event_id,
            }),
        }
    }
}
