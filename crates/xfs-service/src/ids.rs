//! Identifier newtypes shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

identifier!(
    /// Identifier assigned by the manager to every asynchronous request.
    RequestId(u32)
);

identifier!(
    /// Handle of an open logical service (`HSERVICE`).
    ServiceId(u16)
);

identifier!(
    /// Handle of a manager-owned result buffer that must be freed exactly once.
    ResultHandle(u64)
);

identifier!(
    /// Application handle created at start-up and passed with every open.
    AppHandle(u64)
);
