//! # tick-fsm
//!
//! A finite state machine engine for tracking many concurrent sessions
//! (calls, connections, jobs) against one shared transition table, with
//! per-state timeouts driven by a tick clock.
//!
//! The engine itself lives in `tick-fsm-core` and is re-exported here. This
//! crate adds the Tokio runtime: [`spawn`] moves a [`Machine`] into a task that
//! ticks it on a wall-clock interval and serializes every request sent through
//! a [`MachineHandle`].
//!
//! ## Example
//!
//! ```rust
//! use tick_fsm::{Event, EventId, Machine, RuntimeConfig, Signal, State, StateId, spawn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut machine: Machine<String> = Machine::new();
//! machine.register_state(State::new(1, "ringing").with_transition(1, 2).with_timeout(1, 30));
//! machine.register_state(State::new(2, "talking").with_self_loop(2));
//! machine.register_event(Event::new(7, "call-7"));
//!
//! let (handle, task) = spawn(machine, RuntimeConfig::from_interval_str("100ms")?)?;
//! handle.place(EventId(7), StateId(1), Signal(0), "INVITE".into()).await?;
//! handle.digest(EventId(7), Signal(1), "200 OK".into()).await?;
//!
//! handle.shutdown_graceful();
//! let machine = task.await?;
//! assert_eq!(machine.state_of(EventId(7)), Some(StateId(2)));
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod error;
mod runtime;

#[doc(inline)]
pub use crate::config::{
    CHANNEL_SIZE_ENV, DEFAULT_CHANNEL_SIZE, DEFAULT_TICK_INTERVAL, RuntimeConfig,
    TICK_INTERVAL_ENV,
};
#[doc(inline)]
pub use crate::error::{ConfigError, HandleError, TaskError};
#[doc(inline)]
pub use crate::runtime::{MachineHandle, MachineTask, ShutdownMode, spawn};
#[doc(inline)]
pub use tick_fsm_core::*;
