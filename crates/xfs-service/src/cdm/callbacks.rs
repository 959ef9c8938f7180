//! Intermediate events raised while a dispense or present runs.

use std::sync::Arc;

use super::types::{CashUnitError, Denomination, ItemInfoSummary, NoteErrorReason};
use super::{CdmMessage, read};
use crate::decode::ResultDecoder;
use crate::error::EventError;
use crate::event::RawResult;
use crate::future::IntermediateListener;
use crate::ids::RequestId;

/// Progress of a `dispense` command. Every method defaults to a no-op.
pub trait DispenseListener: Send + Sync {
    /// The dispense will start after `delay_ms` milliseconds.
    fn on_delayed_dispense(&self, _delay_ms: u32) {}

    /// A delayed dispense started; `request_id` is the dispense request.
    fn on_start_dispense(&self, _request_id: RequestId) {}

    /// A cash unit failed during the dispense.
    fn on_cash_unit_error(&self, _error: &CashUnitError) {}

    /// The dispense is split into `bundles` sub-dispenses.
    fn on_partial_dispense(&self, _bundles: u16) {}

    /// One sub-dispense finished.
    fn on_sub_dispense_ok(&self, _denomination: &Denomination) {}

    /// The dispense stopped part way; `denomination` is what was moved.
    fn on_incomplete_dispense(&self, _denomination: &Denomination) {}

    /// A note could not be dispensed.
    fn on_note_error(&self, _reason: NoteErrorReason) {}

    /// The device waits for the customer to enter a P6 confirmation.
    fn on_input_p6(&self) {}

    /// Item information can be retrieved for notes classified during the
    /// dispense.
    fn on_info_available(&self, _summary: &ItemInfoSummary) {}
}

/// Progress of a `present` command. Every method defaults to a no-op.
pub trait PresentListener: Send + Sync {
    /// The device waits for the customer to enter a P6 confirmation.
    fn on_input_p6(&self) {}

    /// Item information can be retrieved for the presented notes.
    fn on_info_available(&self, _summary: &ItemInfoSummary) {}
}

fn unknown_execute_event(result: &RawResult) -> EventError {
    EventError::UnknownEvent {
        class: "execute",
        event_id: result.event_id,
    }
}

/// Routes a dispense's execute events to a [`DispenseListener`].
pub struct DispenseCallback {
    decoder: Arc<dyn ResultDecoder>,
    listener: Arc<dyn DispenseListener>,
}

impl DispenseCallback {
    /// Builds a callback that decodes payloads with `decoder`.
    #[must_use]
    pub const fn new(
        decoder: Arc<dyn ResultDecoder>,
        listener: Arc<dyn DispenseListener>,
    ) -> Self {
        Self { decoder, listener }
    }
}

impl IntermediateListener for DispenseCallback {
    fn on_intermediate_event(&self, result: &RawResult) -> Result<(), EventError> {
        let message =
            CdmMessage::from_code(result.event_id).ok_or_else(|| unknown_execute_event(result))?;
        let decoder = self.decoder.as_ref();
        let listener = self.listener.as_ref();
        match message {
            CdmMessage::DelayedDispense => listener.on_delayed_dispense(read(decoder, result)?),
            CdmMessage::StartDispense => listener.on_start_dispense(read(decoder, result)?),
            CdmMessage::CashUnitError => {
                listener.on_cash_unit_error(&read::<CashUnitError>(decoder, result)?);
            }
            CdmMessage::PartialDispense => listener.on_partial_dispense(read(decoder, result)?),
            CdmMessage::SubDispenseOk => {
                listener.on_sub_dispense_ok(&read::<Denomination>(decoder, result)?);
            }
            CdmMessage::IncompleteDispense => {
                listener.on_incomplete_dispense(&read::<Denomination>(decoder, result)?);
            }
            CdmMessage::NoteError => listener.on_note_error(read(decoder, result)?),
            CdmMessage::InputP6 => listener.on_input_p6(),
            CdmMessage::InfoAvailable => {
                listener.on_info_available(&read::<ItemInfoSummary>(decoder, result)?);
            }
            _ => return Err(unknown_execute_event(result)),
        }
        Ok(())
    }
}

/// Routes a present's execute events to a [`PresentListener`].
pub struct PresentCallback {
    decoder: Arc<dyn ResultDecoder>,
    listener: Arc<dyn PresentListener>,
}

impl PresentCallback {
    /// Builds a callback that decodes payloads with `decoder`.
    #[must_use]
    pub const fn new(
        decoder: Arc<dyn ResultDecoder>,
        listener: Arc<dyn PresentListener>,
    ) -> Self {
        Self { decoder, listener }
    }
}

impl IntermediateListener for PresentCallback {
    fn on_intermediate_event(&self, result: &RawResult) -> Result<(), EventError> {
        match CdmMessage::from_code(result.event_id) {
            Some(CdmMessage::InputP6) => self.listener.on_input_p6(),
            Some(CdmMessage::InfoAvailable) => {
                let summary: ItemInfoSummary = read(self.decoder.as_ref(), result)?;
                self.listener.on_info_available(&summary);
            }
            _ => return Err(unknown_execute_event(result)),
        }
        Ok(())
    }
}
