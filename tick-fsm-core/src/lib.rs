//! Runtime-independent engine for tick-fsm.
//!
//! A [`Machine`] tracks many independent [`Event`]s moving through one shared
//! graph of [`State`]s. Events move when the caller delivers a [`Signal`];
//! timeouts scheduled per state fire as the machine clock advances one
//! [`Tick`] at a time. The clock is fed by any [`TickDriver`]; this crate has
//! no opinion on where ticks come from.
//!
//! ```rust
//! use tick_fsm_core::{Event, EventId, Machine, Signal, State, StateId};
//!
//! let mut machine: Machine<&str> = Machine::new();
//! machine.register_state(State::new(1, "ringing").with_transition(1, 2).with_timeout(9, 30));
//! machine.register_state(State::new(2, "talking").fade(true));
//! machine.register_event(Event::new(100, "call-100"));
//!
//! machine.place(EventId(100), StateId(1), Signal(0), &"invite")?;
//! machine.digest(EventId(100), Signal(1), &"answer")?;
//! assert_eq!(machine.state_of(EventId(100)), Some(StateId(2)));
//! # Ok::<(), tick_fsm_core::FsmError>(())
//! ```

mod driver;
mod error;
mod event;
mod id;
mod machine;
mod state;

pub use crate::driver::{ManualDriver, TickDriver, TickFire};
pub use crate::error::{FsmError, PlacementViolation, Result};
pub use crate::event::{Event, Lifecycle};
pub use crate::id::{EventId, Label, MachineId, Signal, StateId, Tick};
pub use crate::machine::{BroadcastReport, Machine};
pub use crate::state::{
    FnBehavior, NoopBehavior, PendingTimeout, Route, State, StateBehavior, TimeoutTemplate,
};
