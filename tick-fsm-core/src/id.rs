//! Identifier newtypes shared by events, states and the machine.
//!
//! All identifiers are caller-defined unsigned integers with no reserved
//! values. Uniqueness within one [`Machine`](crate::Machine) is the caller's
//! responsibility.

use std::fmt;

/// Value of the machine clock. Starts at zero and only moves forward.
pub type Tick = u64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw integer value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a [`Machine`](crate::Machine); stamped on its states as
    /// their owner.
    MachineId
);

id_type!(
    /// Identifies a [`State`](crate::State) within one machine.
    StateId
);

id_type!(
    /// Identifies an [`Event`](crate::Event) within one machine.
    EventId
);

id_type!(
    /// Trigger supplied by the caller when driving an event.
    Signal
);

id_type!(
    /// Tag of a scheduled timeout template, handed back to `on_timeout`.
    Label
);
