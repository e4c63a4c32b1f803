//! The machine: registries, routing and the tick clock.

use std::collections::BTreeMap;
use std::fmt;

use crate::driver::{ManualDriver, TickDriver, TickFire};
use crate::error::{FsmError, Result};
use crate::event::Event;
use crate::id::{EventId, MachineId, Signal, StateId, Tick};
use crate::state::State;

/// Outcome of [`Machine::broadcast`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Events that were driven successfully, in processing order.
    pub moved: Vec<EventId>,
    /// Events the signal could not be delivered to.
    pub failures: Vec<(EventId, FsmError)>,
}

impl BroadcastReport {
    /// True when every event accepted the signal.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owner of every state and event, and of the clock that drives timeouts.
///
/// States and events never reference each other directly. An event knows the
/// id of its state, a state knows the ids of its residents, and both are
/// resolved through the machine's registries.
///
/// The machine is a plain value: every operation takes `&mut self` and runs to
/// completion, so callers serialize access simply by owning it. The Tokio
/// runtime in `tick-fsm` does so from a single actor task.
pub struct Machine<P> {
    id: MachineId,
    tick: Tick,
    states: BTreeMap<StateId, State<P>>,
    events: BTreeMap<EventId, Event>,
    driver: Box<dyn TickDriver>,
    stopped: bool,
}

impl<P> Machine<P> {
    /// Creates an empty machine advanced by explicit [`tick`](Self::tick)
    /// calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: MachineId::default(),
            tick: 0,
            states: BTreeMap::new(),
            events: BTreeMap::new(),
            driver: Box::new(ManualDriver),
            stopped: false,
        }
    }

    /// Creates an empty machine and arms `driver` for the first tick.
    pub fn with_driver(driver: impl TickDriver + 'static) -> Self {
        let mut machine = Self::new();
        machine.attach_driver(driver);
        machine
    }

    /// Sets the machine id stamped as owner on states registered afterwards.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MachineId>) -> Self {
        self.id = id.into();
        self
    }

    /// Replaces the tick driver and arms it, unless the machine is stopped.
    pub fn attach_driver(&mut self, driver: impl TickDriver + 'static) {
        self.driver = Box::new(driver);
        if !self.stopped {
            self.driver.arm();
        }
    }

    /// Adds a state, replacing any state registered under the same id.
    ///
    /// The state's clock is synchronized with the machine so events entering
    /// it get correct timeout deadlines even before its next tick, and the
    /// machine is recorded as its owner.
    pub fn register_state(&mut self, mut state: State<P>) -> Option<State<P>> {
        state.adopt(self.id, self.tick);
        tracing::debug!(state = %state.id(), name = state.name(), fade = state.is_fade(), "state registered");
        self.states.insert(state.id(), state)
    }

    /// Looks up a registered state.
    #[must_use]
    pub fn find_state(&self, id: StateId) -> Option<&State<P>> {
        self.states.get(&id)
    }

    /// Looks up a registered state for adding routes or timeouts.
    pub fn find_state_mut(&mut self, id: StateId) -> Option<&mut State<P>> {
        self.states.get_mut(&id)
    }

    /// Adds an event, replacing any event registered under the same id.
    pub fn register_event(&mut self, event: Event) -> Option<Event> {
        tracing::debug!(event = %event.id(), nick = event.nick(), "event registered");
        self.events.insert(event.id(), event)
    }

    /// Looks up a registered event.
    #[must_use]
    pub fn find_event(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id)
    }

    /// Recycles an event and drops it from the registry.
    ///
    /// The state it was resident in is not touched. Its resident entry is
    /// purged the next time that state's residents are scanned, and its
    /// pending timeouts are discarded when they come due.
    pub fn release_event(&mut self, id: EventId) -> Option<Event> {
        let mut event = self.events.remove(&id)?;
        event.recycle();
        tracing::debug!(event = %id, "event released");
        Some(event)
    }

    /// Flags an event for recycling on its next fade-state entry. Unknown ids
    /// are ignored.
    pub fn mark_event_pending_expiry(&mut self, id: EventId) {
        if let Some(event) = self.events.get_mut(&id) {
            event.mark_pending_expiry();
        }
    }

    /// Clears a pending-expiry flag. Unknown ids are ignored.
    pub fn mark_event_active(&mut self, id: EventId) {
        if let Some(event) = self.events.get_mut(&id) {
            event.mark_active();
        }
    }

    /// Places a registered event into its first state.
    pub fn place(&mut self, event: EventId, state: StateId, signal: Signal, payload: &P) -> Result<()> {
        let target = self
            .events
            .get_mut(&event)
            .ok_or(FsmError::UnknownEvent { event, signal })?;
        let destination = self
            .states
            .get_mut(&state)
            .ok_or(FsmError::UnknownState(state))?;

        target.place(destination, signal, payload)?;
        destination.purge_residents(&self.events);
        tracing::debug!(event = %event, state = %state, signal = %signal, "event placed");
        Ok(())
    }

    /// Delivers `signal` to an event.
    ///
    /// A route back into the event's current state re-runs only the entry
    /// callback: residency and scheduled timeouts are left alone. Any other
    /// route performs a full move.
    pub fn digest(&mut self, event: EventId, signal: Signal, payload: &P) -> Result<()> {
        let Some((current, target)) = self.resolve(event, signal)? else {
            return Ok(());
        };

        if current != target {
            return self.move_event(event, target, signal, payload);
        }

        let entered = self
            .events
            .get_mut(&event)
            .ok_or(FsmError::UnknownEvent { event, signal })?;
        let state = self
            .states
            .get_mut(&current)
            .ok_or(FsmError::UnknownState(current))?;
        state.notify_entry(entered, signal, payload);
        tracing::trace!(event = %event, state = %current, signal = %signal, "event re-entered in place");
        Ok(())
    }

    /// Delivers `signal` to an event, always performing a full move.
    ///
    /// Unlike [`digest`](Self::digest), a route back into the current state
    /// detaches and re-attaches the event, restarting its timeout schedule.
    pub fn drive(&mut self, event: EventId, signal: Signal, payload: &P) -> Result<()> {
        match self.resolve(event, signal)? {
            Some((_, target)) => self.move_event(event, target, signal, payload),
            None => Ok(()),
        }
    }

    /// Drives every live event with `signal`.
    ///
    /// Failures are collected and logged; they never stop the remaining
    /// events from being processed.
    pub fn broadcast(&mut self, signal: Signal, payload: &P) -> BroadcastReport {
        let live: Vec<EventId> = self
            .events
            .values()
            .filter(|event| !event.is_recycled())
            .map(Event::id)
            .collect();

        let mut report = BroadcastReport::default();
        for id in live {
            match self.drive(id, signal, payload) {
                Ok(()) => report.moved.push(id),
                Err(error) => {
                    tracing::warn!(event = %id, signal = %signal, %error, "broadcast could not drive event");
                    report.failures.push((id, error));
                }
            }
        }
        report
    }

    /// Advances the clock by one tick and fires due timeouts.
    ///
    /// Returns the new tick, or `None` if the machine is stopped.
    pub fn tick(&mut self) -> Option<Tick> {
        self.handle_tick(TickFire::Elapsed)
    }

    /// Entry point for tick drivers.
    ///
    /// A cancelled firing, or any firing after [`stop`](Self::stop), leaves the
    /// machine untouched and does not re-arm the driver.
    pub fn handle_tick(&mut self, fire: TickFire) -> Option<Tick> {
        if fire == TickFire::Cancelled || self.stopped {
            tracing::trace!(tick = self.tick, ?fire, "tick ignored");
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let mut fired = 0;
        for state in self.states.values_mut() {
            fired += state.advance_tick(tick, &mut self.events);
        }
        tracing::trace!(machine = %self.id, tick, fired, "tick processed");

        self.driver.arm();
        Some(tick)
    }

    /// Cancels the tick driver. Signals are still accepted afterwards; only
    /// timeouts stop firing.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.driver.cancel();
        tracing::debug!(machine = %self.id, tick = self.tick, "machine stopped");
    }

    /// Identifier set with [`with_id`](Self::with_id), zero by default.
    #[must_use]
    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of ticks processed so far.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Residents of a state, after purging released or departed events.
    pub fn residents(&mut self, state: StateId) -> Option<&[EventId]> {
        let entry = self.states.get_mut(&state)?;
        entry.purge_residents(&self.events);
        Some(entry.residents())
    }

    /// Current state of a registered event.
    #[must_use]
    pub fn state_of(&self, event: EventId) -> Option<StateId> {
        self.events.get(&event).and_then(Event::current_state)
    }

    /// Registered states in id order.
    pub fn states(&self) -> impl Iterator<Item = &State<P>> + '_ {
        self.states.values()
    }

    /// Registered events in id order.
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.values()
    }

    /// Resolves the current and destination states for `signal`.
    ///
    /// `Ok(None)` means the event is recycled and the signal is dropped.
    fn resolve(&self, event: EventId, signal: Signal) -> Result<Option<(StateId, StateId)>> {
        let entry = self
            .events
            .get(&event)
            .ok_or(FsmError::UnknownEvent { event, signal })?;
        if entry.is_recycled() {
            return Ok(None);
        }

        let current = entry.current_state().ok_or(FsmError::Unplaced(event))?;
        let state = self
            .states
            .get(&current)
            .ok_or(FsmError::UnknownState(current))?;
        let route = state
            .route(signal)
            .ok_or(FsmError::UnroutableSignal { state: current, signal })?;

        Ok(Some((current, route.destination(current))))
    }

    fn move_event(&mut self, event: EventId, target: StateId, signal: Signal, payload: &P) -> Result<()> {
        let entry = self
            .events
            .get_mut(&event)
            .ok_or(FsmError::UnknownEvent { event, signal })?;
        entry.move_to(&mut self.states, target, signal, payload)?;
        let recycled = entry.is_recycled();
        if let Some(state) = self.states.get_mut(&target) {
            state.purge_residents(&self.events);
        }
        tracing::debug!(
            event = %event,
            state = %target,
            signal = %signal,
            recycled,
            "event moved"
        );
        Ok(())
    }
}

impl<P> Default for Machine<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Machine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("tick", &self.tick)
            .field("states", &self.states.len())
            .field("events", &self.events.len())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
