//! Version-aware decoding of result payloads.
//!
//! Each result kind may have several layouts, one per protocol release that
//! changed it. A [`DecodeTable`] holds the layouts for one service and picks
//! the newest layout whose release does not exceed the negotiated version.
//! Kinds without registered layouts are parsed as-is.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use xfs_config::XfsVersion;

use crate::error::DecodeError;
use crate::event::Payload;
use crate::ids::RequestId;

/// Tags naming every payload shape the engine can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Single numeric or string value.
    Scalar,
    /// `WFSUNDEVMSG`.
    UndeliverableMessage,
    /// `WFSHWERROR`.
    HardwareError,
    /// `WFSVRSNERROR`.
    VersionError,
    /// `WFSDEVSTATUS`.
    DeviceStatus,
    /// `WFSAPPDISC`.
    AppDisconnect,
    /// Cash dispenser status.
    CdmStatus,
    /// Cash dispenser capabilities.
    CdmCapabilities,
    /// Cash unit table.
    CdmCashUnitInfo,
    /// Single cash unit.
    CdmCashUnit,
    /// Cash unit failure report.
    CdmCashUnitError,
    /// Dispensed denomination.
    CdmDenomination,
    /// Cash units whose counts changed.
    CdmCountsChanged,
    /// Location of detected media.
    CdmItemPosition,
    /// Physical device position.
    CdmDevicePosition,
    /// Power-save state change.
    CdmPowerSaveChange,
    /// Shutter state change.
    CdmShutterStatusChanged,
    /// Summary of item information available for retrieval.
    CdmItemInfoSummary,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A value that can be produced from a result payload.
pub trait ResultType: DeserializeOwned + Send + 'static {
    /// Layout selector, or `None` when the completion carries no value.
    const KIND: Option<ResultKind>;
}

impl ResultType for () {
    const KIND: Option<ResultKind> = None;
}

macro_rules! scalar_result {
    ($($ty:ty),+ $(,)?) => {
        $(impl ResultType for $ty {
            const KIND: Option<ResultKind> = Some(ResultKind::Scalar);
        })+
    };
}

scalar_result!(Value, u16, u32, RequestId);

/// Converts payload bytes into a canonical JSON value.
pub type DecodeFn = fn(&[u8]) -> Result<Value, serde_json::Error>;

/// Turns raw payloads into canonical values for one service.
pub trait ResultDecoder: Send + Sync {
    /// Decodes `payload` as `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when no layout applies or the payload does
    /// not match it.
    fn decode_value(&self, kind: ResultKind, payload: &Payload) -> Result<Value, DecodeError>;
}

/// Decodes `payload` into `T` using `decoder`.
///
/// # Errors
///
/// Returns [`DecodeError`] when decoding fails or the canonical value does
/// not fit `T`.
pub fn decode_as<T: ResultType>(
    decoder: &dyn ResultDecoder,
    payload: &Payload,
) -> Result<T, DecodeError> {
    let Some(kind) = T::KIND else {
        return serde_json::from_value(Value::Null).map_err(|error| DecodeError::TypeMismatch {
            kind: ResultKind::Scalar,
            message: error.to_string(),
        });
    };
    let value = decoder.decode_value(kind, payload)?;
    serde_json::from_value(value).map_err(|error| DecodeError::TypeMismatch {
        kind,
        message: error.to_string(),
    })
}

/// Parses a payload laid out as `L` and normalises it into `T`.
///
/// # Errors
///
/// Returns the parser error when the bytes do not match `L`.
pub fn layout<L, T>(bytes: &[u8]) -> Result<Value, serde_json::Error>
where
    L: DeserializeOwned,
    T: From<L> + Serialize,
{
    let parsed: L = serde_json::from_slice(bytes)?;
    serde_json::to_value(T::from(parsed))
}

#[derive(Debug, Clone, Copy)]
struct DecodeRow {
    since: XfsVersion,
    decode: DecodeFn,
}

/// Layout table keyed by result kind.
#[derive(Debug, Clone)]
pub struct DecodeTable {
    version: XfsVersion,
    rows: HashMap<ResultKind, Vec<DecodeRow>>,
}

impl DecodeTable {
    /// An empty table for a service negotiated at `version`.
    #[must_use]
    pub fn new(version: XfsVersion) -> Self {
        Self {
            version,
            rows: HashMap::new(),
        }
    }

    /// Registers `decode` for payloads of `kind` from release `since` on.
    #[must_use]
    pub fn with_layout(mut self, kind: ResultKind, since: XfsVersion, decode: DecodeFn) -> Self {
        let rows = self.rows.entry(kind).or_default();
        rows.push(DecodeRow { since, decode });
        rows.sort_by_key(|row| row.since);
        self
    }

    /// Negotiated version the table selects layouts for.
    #[must_use]
    pub const fn version(&self) -> XfsVersion {
        self.version
    }

    /// Release of the layout selected for `kind`, or `None` when the kind
    /// has no registered layouts.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Unsupported`] when every registered layout is
    /// newer than the negotiated version.
    pub fn selected_release(&self, kind: ResultKind) -> Result<Option<XfsVersion>, DecodeError> {
        self.select(kind).map(|row| row.map(|selected| selected.since))
    }

    fn select(&self, kind: ResultKind) -> Result<Option<&DecodeRow>, DecodeError> {
        let Some(rows) = self.rows.get(&kind) else {
            return Ok(None);
        };
        rows.iter()
            .rev()
            .find(|row| row.since <= self.version)
            .map(Some)
            .ok_or(DecodeError::Unsupported {
                kind,
                version: self.version,
            })
    }
}

impl ResultDecoder for DecodeTable {
    fn decode_value(&self, kind: ResultKind, payload: &Payload) -> Result<Value, DecodeError> {
        let bytes = payload
            .as_bytes()
            .ok_or(DecodeError::EmptyPayload { kind })?;
        let decoded = match self.select(kind)? {
            Some(row) => (row.decode)(bytes),
            None => serde_json::from_slice(bytes),
        };
        decoded.map_err(|error| DecodeError::Malformed {
            kind,
            message: error.to_string(),
        })
    }
}
