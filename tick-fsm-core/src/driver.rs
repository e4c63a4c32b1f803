//! Tick driver abstraction.
//!
//! The machine needs exactly one thing from the outside world: "call me once
//! more after one tick interval, unless cancelled". Anything able to provide
//! that single-shot, re-armable timer can drive a [`Machine`](crate::Machine).

/// How a timer firing reached the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFire {
    /// The interval elapsed normally.
    Elapsed,
    /// The timer was cancelled before or while firing. The machine must not
    /// mutate state or re-arm.
    Cancelled,
}

/// Single-shot, re-armable timer that feeds ticks into a machine.
///
/// The machine calls [`arm`](TickDriver::arm) once when the driver is attached
/// and once after each completed tick. It never asks for more than one
/// outstanding firing.
pub trait TickDriver: Send {
    /// Schedule one firing after one tick interval.
    fn arm(&mut self);

    /// Cancel the outstanding firing, if any. No further firings may be
    /// delivered as [`TickFire::Elapsed`] afterwards.
    fn cancel(&mut self);
}

/// Driver that never fires on its own.
///
/// Used when the caller advances the clock by invoking
/// [`Machine::tick`](crate::Machine::tick) directly, e.g. in tests or when the
/// machine is embedded into an existing event loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDriver;

impl TickDriver for ManualDriver {
    fn arm(&mut self) {}

    fn cancel(&mut self) {}
}
