//! Error types surfaced by machine operations.

use crate::id::{EventId, Signal, StateId};

/// Why a placement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlacementViolation {
    /// The event already has a current state. Use a move instead.
    #[error("event already has a current state ({0})")]
    AlreadyPlaced(StateId),
    /// The event has been recycled and accepts no further placements.
    #[error("event has been recycled")]
    Recycled,
}

/// Error returned by [`Machine`](crate::Machine) and [`Event`](crate::Event)
/// operations.
///
/// All variants are reported synchronously to the caller of the operation that
/// triggered them. The only place they are collected instead of returned is
/// [`Machine::broadcast`](crate::Machine::broadcast).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// The operation referenced an event id absent from the registry.
    #[error("event {event} not found (signal {signal})")]
    UnknownEvent {
        /// Missing event id.
        event: EventId,
        /// Signal the caller tried to deliver.
        signal: Signal,
    },
    /// Neither a self-loop nor a transition exists for the signal.
    #[error("no route for signal {signal} from state {state}")]
    UnroutableSignal {
        /// State the event currently sits in.
        state: StateId,
        /// Signal that could not be routed.
        signal: Signal,
    },
    /// `place` was called on an event that cannot be placed.
    #[error("illegal placement of event {event}: {reason}")]
    IllegalPlacement {
        /// Event being placed.
        event: EventId,
        /// Violated precondition.
        reason: PlacementViolation,
    },
    /// A placement or route target is not registered.
    #[error("state {0} not found")]
    UnknownState(StateId),
    /// The event has never been placed, so there is nothing to route from.
    #[error("event {0} has no current state")]
    Unplaced(EventId),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = FsmError> = std::result::Result<T, E>;
