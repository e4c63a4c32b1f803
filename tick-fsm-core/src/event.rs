//! Independently tracked FSM instances.

use std::collections::BTreeMap;

use crate::error::{FsmError, PlacementViolation, Result};
use crate::id::{EventId, Signal, StateId, Tick};
use crate::state::State;

/// Lifecycle of an [`Event`].
///
/// `Active` and `PendingExpiry` toggle freely. `Recycled` is terminal: it is
/// reached when a pending event enters a fade state, or when the event is
/// released from its machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Normal operation.
    #[default]
    Active,
    /// Will be recycled on its next entry into a fade state.
    PendingExpiry,
    /// No longer processed. Only queries remain meaningful.
    Recycled,
}

/// One FSM instance moving through the machine's shared states.
///
/// The event only records *which* state it is in; the state keeps the
/// matching resident entry. Both sides are kept consistent by
/// [`Event::place`] and by the machine's move operations.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    nick: String,
    lifecycle: Lifecycle,
    current_state: Option<StateId>,
    enter_tick: Tick,
    generation: u64,
}

impl Event {
    /// Creates an active, unplaced event.
    pub fn new(id: impl Into<EventId>, nick: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nick: nick.into(),
            lifecycle: Lifecycle::Active,
            current_state: None,
            enter_tick: 0,
            generation: 0,
        }
    }

    /// Places a fresh event into its first state.
    ///
    /// Fails with [`FsmError::IllegalPlacement`] if the event already has a
    /// current state or has been recycled. On success the state's entry
    /// callback has run exactly once, even if the event was recycled on entry.
    pub fn place<P>(&mut self, state: &mut State<P>, signal: Signal, payload: &P) -> Result<()> {
        if self.is_recycled() {
            return Err(self.illegal(PlacementViolation::Recycled));
        }
        if let Some(current) = self.current_state {
            return Err(self.illegal(PlacementViolation::AlreadyPlaced(current)));
        }

        self.enter(state, signal, payload);
        Ok(())
    }

    /// Moves the event out of its current state into `target`.
    ///
    /// Recycled events are left untouched. The target is resolved before the
    /// event is detached, so an unknown target leaves everything as it was.
    pub(crate) fn move_to<P>(
        &mut self,
        states: &mut BTreeMap<StateId, State<P>>,
        target: StateId,
        signal: Signal,
        payload: &P,
    ) -> Result<()> {
        if self.is_recycled() {
            return Ok(());
        }
        if !states.contains_key(&target) {
            return Err(FsmError::UnknownState(target));
        }

        if let Some(current) = self.current_state
            && let Some(state) = states.get_mut(&current)
        {
            state.remove_resident(self.id);
        }

        let state = states
            .get_mut(&target)
            .ok_or(FsmError::UnknownState(target))?;
        self.enter(state, signal, payload);
        Ok(())
    }

    fn enter<P>(&mut self, state: &mut State<P>, signal: Signal, payload: &P) {
        self.current_state = Some(state.id());
        self.enter_tick = state.tick_snapshot();

        if self.is_pending_expiry() && state.is_fade() {
            self.lifecycle = Lifecycle::Recycled;
            tracing::debug!(event = %self.id, state = %state.id(), "event recycled on entry");
        } else {
            self.generation = state.admit(self.id, self.enter_tick);
        }

        state.notify_entry(self, signal, payload);
    }

    fn illegal(&self, reason: PlacementViolation) -> FsmError {
        FsmError::IllegalPlacement {
            event: self.id,
            reason,
        }
    }

    /// Flags the event for recycling on its next entry into a fade state.
    pub fn mark_pending_expiry(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.lifecycle = Lifecycle::PendingExpiry;
        }
    }

    /// Clears a pending-expiry flag.
    pub fn mark_active(&mut self) {
        if self.lifecycle == Lifecycle::PendingExpiry {
            self.lifecycle = Lifecycle::Active;
        }
    }

    pub(crate) fn recycle(&mut self) {
        self.lifecycle = Lifecycle::Recycled;
    }

    /// Identifier given at construction.
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Free-form display name, used in logs.
    #[must_use]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the event is active and not flagged for expiry.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Whether the event will be recycled on its next fade-state entry.
    #[must_use]
    pub fn is_pending_expiry(&self) -> bool {
        self.lifecycle == Lifecycle::PendingExpiry
    }

    /// Whether the event has been recycled or released.
    #[must_use]
    pub fn is_recycled(&self) -> bool {
        self.lifecycle == Lifecycle::Recycled
    }

    /// State the event was last placed in or moved to.
    ///
    /// Still set after the event was recycled on entry into a fade state.
    #[must_use]
    pub fn current_state(&self) -> Option<StateId> {
        self.current_state
    }

    /// Tick snapshot taken when the event last entered a state.
    #[must_use]
    pub fn enter_tick(&self) -> Tick {
        self.enter_tick
    }

    /// Admission number issued by the current state on the latest entry.
    ///
    /// Every placement or full move gets a fresh, state-unique number.
    /// Scheduled timeouts remember the generation they were created for and
    /// are dropped if the event has re-entered the state since.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
