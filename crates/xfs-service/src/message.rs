//! Message codes delivered by the XFS manager.

use std::fmt;
use std::ops::BitOr;

/// Base of the user message range the manager posts into.
const WM_USER: u32 = 0x0400;

/// Completion and event messages the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Asynchronous open finished.
    OpenComplete,
    /// Asynchronous close finished.
    CloseComplete,
    /// Lock request finished.
    LockComplete,
    /// Unlock request finished.
    UnlockComplete,
    /// Event registration finished.
    RegisterComplete,
    /// Event deregistration finished.
    DeregisterComplete,
    /// Information query finished.
    GetInfoComplete,
    /// Command execution finished.
    ExecuteComplete,
    /// Intermediate event raised while a command executes.
    ExecuteEvent,
    /// Unsolicited device event.
    ServiceEvent,
    /// Event requesting operator attention.
    UserEvent,
    /// Manager or provider level system event.
    SystemEvent,
    /// Timer expiry; never dispatched.
    TimerEvent,
}

impl MessageKind {
    /// Maps a raw window message to a kind. Returns `None` for codes outside
    /// the XFS range.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code.checked_sub(WM_USER)? {
            1 => Self::OpenComplete,
            2 => Self::CloseComplete,
            3 => Self::LockComplete,
            4 => Self::UnlockComplete,
            5 => Self::RegisterComplete,
            6 => Self::DeregisterComplete,
            7 => Self::GetInfoComplete,
            8 => Self::ExecuteComplete,
            20 => Self::ExecuteEvent,
            21 => Self::ServiceEvent,
            22 => Self::UserEvent,
            23 => Self::SystemEvent,
            100 => Self::TimerEvent,
            _ => return None,
        };
        Some(kind)
    }

    /// Raw window message code.
    #[must_use]
    pub const fn code(self) -> u32 {
        WM_USER
            + match self {
                Self::OpenComplete => 1,
                Self::CloseComplete => 2,
                Self::LockComplete => 3,
                Self::UnlockComplete => 4,
                Self::RegisterComplete => 5,
                Self::DeregisterComplete => 6,
                Self::GetInfoComplete => 7,
                Self::ExecuteComplete => 8,
                Self::ExecuteEvent => 20,
                Self::ServiceEvent => 21,
                Self::UserEvent => 22,
                Self::SystemEvent => 23,
                Self::TimerEvent => 100,
            }
    }

    /// Returns `true` for messages that finish a pending request.
    #[must_use]
    pub const fn is_completion(self) -> bool {
        matches!(
            self,
            Self::OpenComplete
                | Self::CloseComplete
                | Self::LockComplete
                | Self::UnlockComplete
                | Self::RegisterComplete
                | Self::DeregisterComplete
                | Self::GetInfoComplete
                | Self::ExecuteComplete
        )
    }

    const fn label(self) -> &'static str {
        match self {
            Self::OpenComplete => "open-complete",
            Self::CloseComplete => "close-complete",
            Self::LockComplete => "lock-complete",
            Self::UnlockComplete => "unlock-complete",
            Self::RegisterComplete => "register-complete",
            Self::DeregisterComplete => "deregister-complete",
            Self::GetInfoComplete => "getinfo-complete",
            Self::ExecuteComplete => "execute-complete",
            Self::ExecuteEvent => "execute-event",
            Self::ServiceEvent => "service-event",
            Self::UserEvent => "user-event",
            Self::SystemEvent => "system-event",
            Self::TimerEvent => "timer-event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sub-kinds carried in the event id of a [`MessageKind::SystemEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEventKind {
    /// The manager could not deliver a message to the application.
    UndeliverableMessage,
    /// A device reported a hardware fault.
    HardwareError,
    /// Version negotiation failed between manager layers.
    VersionError,
    /// A device changed state.
    DeviceStatus,
    /// An application disconnected from a shared service.
    AppDisconnect,
    /// A provider reported a software fault.
    SoftwareError,
    /// Operator intervention is required.
    UserError,
    /// Another application asked for the lock.
    LockRequested,
    /// The device detected tampering.
    FraudAttempt,
}

impl SystemEventKind {
    /// Maps a raw event id to a sub-kind.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            1 => Self::UndeliverableMessage,
            2 => Self::HardwareError,
            3 => Self::VersionError,
            4 => Self::DeviceStatus,
            5 => Self::AppDisconnect,
            6 => Self::SoftwareError,
            7 => Self::UserError,
            8 => Self::LockRequested,
            9 => Self::FraudAttempt,
            _ => return None,
        };
        Some(kind)
    }

    /// Raw event id.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::UndeliverableMessage => 1,
            Self::HardwareError => 2,
            Self::VersionError => 3,
            Self::DeviceStatus => 4,
            Self::AppDisconnect => 5,
            Self::SoftwareError => 6,
            Self::UserError => 7,
            Self::LockRequested => 8,
            Self::FraudAttempt => 9,
        }
    }
}

/// Event classes a service can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventClasses(u32);

impl EventClasses {
    /// Unsolicited device events.
    pub const SERVICE: Self = Self(0x0001);
    /// Operator attention events.
    pub const USER: Self = Self(0x0002);
    /// System events.
    pub const SYSTEM: Self = Self(0x0004);
    /// Intermediate execute events.
    pub const EXECUTE: Self = Self(0x0008);

    /// Every event class.
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::SERVICE.0 | Self::USER.0 | Self::SYSTEM.0 | Self::EXECUTE.0)
    }

    /// Returns `true` when every class in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit mask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for EventClasses {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
