//! Nodes of the shared transition graph.
//!
//! A [`State`] owns three things: its outgoing routes, the list of events
//! currently resident in it, and a timer bucket holding the timeouts scheduled
//! for those residents. Everything else (the events themselves, other states)
//! is reached by id through the owning [`Machine`](crate::Machine).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::event::Event;
use crate::id::{EventId, Label, MachineId, Signal, StateId, Tick};

/// Outcome of routing a signal from a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The signal is handled without leaving the state.
    SelfLoop,
    /// The signal leads to the given state. It may be the same id as the
    /// source; that is still an ordinary transition, not a self-loop.
    Target(StateId),
}

impl Route {
    /// Resolves the destination id, given the state the route was taken from.
    #[must_use]
    pub fn destination(self, from: StateId) -> StateId {
        match self {
            Self::SelfLoop => from,
            Self::Target(target) => target,
        }
    }
}

/// Per-state callbacks.
///
/// Both hooks default to doing nothing. Implementations receive the event
/// mutably so they can flip its lifecycle flag, but they cannot move it:
/// moves only happen through the machine.
pub trait StateBehavior<P>: Send {
    /// Called once per placement or move into the state, and once per in-place
    /// re-entry through [`Machine::digest`](crate::Machine::digest).
    fn on_entry(&mut self, event: &mut Event, signal: Signal, payload: &P) {
        let _ = (event, signal, payload);
    }

    /// Called when a scheduled timeout comes due for a resident event.
    fn on_timeout(&mut self, label: Label, event: &mut Event) {
        let _ = (label, event);
    }
}

/// Behavior of a state that needs no callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBehavior;

impl<P> StateBehavior<P> for NoopBehavior {}

type EntryFn<P> = Box<dyn FnMut(&mut Event, Signal, &P) + Send>;
type TimeoutFn = Box<dyn FnMut(Label, &mut Event) + Send>;

/// [`StateBehavior`] assembled from closures.
///
/// ```rust
/// use tick_fsm_core::{FnBehavior, State};
///
/// let state: State<String> = State::new(1, "ringing").with_behavior(
///     FnBehavior::new()
///         .on_entry(|event, signal, payload: &String| {
///             println!("{} entered on {signal}: {payload}", event.id());
///         })
///         .on_timeout(|_label, event| event.mark_pending_expiry()),
/// );
/// ```
pub struct FnBehavior<P> {
    entry: Option<EntryFn<P>>,
    timeout: Option<TimeoutFn>,
}

impl<P> FnBehavior<P> {
    /// Behavior with neither callback set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entry: None,
            timeout: None,
        }
    }

    /// Sets the entry callback.
    #[must_use]
    pub fn on_entry(mut self, f: impl FnMut(&mut Event, Signal, &P) + Send + 'static) -> Self {
        self.entry = Some(Box::new(f));
        self
    }

    /// Sets the timeout callback.
    #[must_use]
    pub fn on_timeout(mut self, f: impl FnMut(Label, &mut Event) + Send + 'static) -> Self {
        self.timeout = Some(Box::new(f));
        self
    }
}

impl<P> Default for FnBehavior<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for FnBehavior<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehavior")
            .field("entry", &self.entry.is_some())
            .field("timeout", &self.timeout.is_some())
            .finish()
    }
}

impl<P> StateBehavior<P> for FnBehavior<P> {
    fn on_entry(&mut self, event: &mut Event, signal: Signal, payload: &P) {
        if let Some(entry) = self.entry.as_mut() {
            entry(event, signal, payload);
        }
    }

    fn on_timeout(&mut self, label: Label, event: &mut Event) {
        if let Some(timeout) = self.timeout.as_mut() {
            timeout(label, event);
        }
    }
}

/// Timeout applied to every event entering a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTemplate {
    pub label: Label,
    /// Delay in ticks, counted from the entry tick.
    pub delay: Tick,
}

/// Timer-bucket entry waiting for its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimeout {
    pub label: Label,
    pub event: EventId,
    /// Admission generation of the entry that scheduled the timeout.
    pub generation: u64,
}

/// One node of the transition graph, shared by all events.
pub struct State<P> {
    id: StateId,
    name: String,
    fade: bool,
    transitions: BTreeMap<Signal, StateId>,
    self_loops: BTreeSet<Signal>,
    timeouts: Vec<TimeoutTemplate>,
    residents: Vec<EventId>,
    bucket: BTreeMap<Tick, Vec<PendingTimeout>>,
    tick: Tick,
    admissions: u64,
    owner: Option<MachineId>,
    behavior: Box<dyn StateBehavior<P>>,
}

impl<P: 'static> State<P> {
    /// Creates a non-fade state without callbacks.
    pub fn new(id: impl Into<StateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fade: false,
            transitions: BTreeMap::new(),
            self_loops: BTreeSet::new(),
            timeouts: Vec::new(),
            residents: Vec::new(),
            bucket: BTreeMap::new(),
            tick: 0,
            admissions: 0,
            owner: None,
            behavior: Box::new(NoopBehavior),
        }
    }

    /// Sets whether pending-expiry events are recycled on entry.
    #[must_use]
    pub fn fade(mut self, fade: bool) -> Self {
        self.fade = fade;
        self
    }

    /// Installs the entry and timeout callbacks.
    #[must_use]
    pub fn with_behavior(mut self, behavior: impl StateBehavior<P> + 'static) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    /// Adds a transition; see [`add_transition`](Self::add_transition).
    #[must_use]
    pub fn with_transition(mut self, signal: impl Into<Signal>, target: impl Into<StateId>) -> Self {
        self.add_transition(signal.into(), target.into());
        self
    }

    /// Adds a self-loop; see [`add_self_loop`](Self::add_self_loop).
    #[must_use]
    pub fn with_self_loop(mut self, signal: impl Into<Signal>) -> Self {
        self.add_self_loop(signal.into());
        self
    }

    /// Adds a timeout template; see
    /// [`add_scheduled_timeout`](Self::add_scheduled_timeout).
    #[must_use]
    pub fn with_timeout(mut self, label: impl Into<Label>, delay: Tick) -> Self {
        self.add_scheduled_timeout(label.into(), delay);
        self
    }
}

impl<P> State<P> {
    /// Looks up where `signal` leads. Self-loops win over transitions.
    #[must_use]
    pub fn route(&self, signal: Signal) -> Option<Route> {
        if self.self_loops.contains(&signal) {
            Some(Route::SelfLoop)
        } else {
            self.transitions.get(&signal).copied().map(Route::Target)
        }
    }

    /// Adds or replaces the transition for `signal`.
    pub fn add_transition(&mut self, signal: Signal, target: StateId) {
        self.transitions.insert(signal, target);
    }

    /// Makes `signal` re-enter this state. Takes precedence over a transition
    /// on the same signal.
    pub fn add_self_loop(&mut self, signal: Signal) {
        self.self_loops.insert(signal);
    }

    /// Schedules `label` to fire `delay` ticks after every future entry.
    ///
    /// A delay of zero is treated as one tick: the entry tick has already been
    /// processed by the time an event enters. Deadlines past the end of the
    /// clock saturate at [`Tick::MAX`].
    pub fn add_scheduled_timeout(&mut self, label: Label, delay: Tick) {
        self.timeouts.push(TimeoutTemplate {
            label,
            delay: delay.max(1),
        });
    }

    /// Records a resident. Adding an id that is already resident is a no-op.
    pub fn add_resident(&mut self, event: EventId) {
        if !self.residents.contains(&event) {
            self.residents.push(event);
        }
    }

    /// Forgets a resident. Unknown ids are ignored.
    pub fn remove_resident(&mut self, event: EventId) {
        self.residents.retain(|id| *id != event);
    }

    /// Advances the local clock and fires the timeouts due at `tick`.
    ///
    /// An entry fires only if its event still resolves, is not recycled, is
    /// still in this state and has not re-entered it since scheduling. Every
    /// entry keyed at or before `tick` is discarded afterwards. Residents are
    /// only purged on ticks that have timeouts due. Returns the number of
    /// timeouts fired.
    pub fn advance_tick(&mut self, tick: Tick, events: &mut BTreeMap<EventId, Event>) -> usize {
        self.tick = tick;

        let due = match tick.checked_add(1) {
            Some(next) => {
                let later = self.bucket.split_off(&next);
                std::mem::replace(&mut self.bucket, later)
            }
            None => std::mem::take(&mut self.bucket),
        };
        if due.contains_key(&tick) {
            self.purge_residents(events);
        }

        let mut fired = 0;
        for entry in due.get(&tick).into_iter().flatten() {
            let Some(event) = events.get_mut(&entry.event) else {
                continue;
            };
            if event.is_recycled()
                || event.current_state() != Some(self.id)
                || event.generation() != entry.generation
            {
                tracing::trace!(
                    state = %self.id,
                    event = %entry.event,
                    label = %entry.label,
                    "dropping stale timeout"
                );
                continue;
            }

            tracing::trace!(state = %self.id, event = %entry.event, label = %entry.label, tick, "timeout fired");
            self.behavior.on_timeout(entry.label, event);
            fired += 1;
        }
        fired
    }

    /// Drops resident ids whose event is gone, recycled or elsewhere.
    pub(crate) fn purge_residents(&mut self, events: &BTreeMap<EventId, Event>) {
        let id = self.id;
        self.residents.retain(|event| {
            events
                .get(event)
                .is_some_and(|e| !e.is_recycled() && e.current_state() == Some(id))
        });
    }

    /// Adds a resident, schedules its timeouts and returns the admission
    /// generation stamped on them.
    pub(crate) fn admit(&mut self, event: EventId, enter_tick: Tick) -> u64 {
        self.admissions += 1;
        let generation = self.admissions;
        self.add_resident(event);
        for template in &self.timeouts {
            self.bucket
                .entry(enter_tick.saturating_add(template.delay))
                .or_default()
                .push(PendingTimeout {
                    label: template.label,
                    event,
                    generation,
                });
        }
        generation
    }

    pub(crate) fn notify_entry(&mut self, event: &mut Event, signal: Signal, payload: &P) {
        self.behavior.on_entry(event, signal, payload);
    }

    /// Syncs the clock and records the registering machine.
    pub(crate) fn adopt(&mut self, owner: MachineId, tick: Tick) {
        self.owner = Some(owner);
        self.tick = tick;
    }

    /// Identifier given at construction.
    #[must_use]
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Display name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether pending-expiry events are recycled on entry.
    #[must_use]
    pub fn is_fade(&self) -> bool {
        self.fade
    }

    /// Machine the state was registered with, if any.
    #[must_use]
    pub fn owner(&self) -> Option<MachineId> {
        self.owner
    }

    /// Tick value recorded at the last clock advance seen by this state.
    #[must_use]
    pub fn tick_snapshot(&self) -> Tick {
        self.tick
    }

    /// Resident event ids in arrival order.
    ///
    /// May still list released events until the next purge; use
    /// [`Machine::residents`](crate::Machine::residents) for a purged view.
    #[must_use]
    pub fn residents(&self) -> &[EventId] {
        &self.residents
    }

    /// Number of resident ids, stale ones included.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    /// Whether `event` is in the resident list.
    #[must_use]
    pub fn is_resident(&self, event: EventId) -> bool {
        self.residents.contains(&event)
    }

    /// Scheduled timeouts keyed by the tick they are due at.
    #[must_use]
    pub fn pending_timeouts(&self) -> &BTreeMap<Tick, Vec<PendingTimeout>> {
        &self.bucket
    }

    /// Timeout templates applied on every entry, in registration order.
    #[must_use]
    pub fn timeouts(&self) -> &[TimeoutTemplate] {
        &self.timeouts
    }

    /// Transitions as `(signal, target)` pairs, ordered by signal.
    pub fn transitions(&self) -> impl Iterator<Item = (Signal, StateId)> + '_ {
        self.transitions.iter().map(|(signal, target)| (*signal, *target))
    }

    /// Self-loop signals in ascending order.
    pub fn self_loops(&self) -> impl Iterator<Item = Signal> + '_ {
        self.self_loops.iter().copied()
    }
}

impl<P> fmt::Debug for State<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fade", &self.fade)
            .field("transitions", &self.transitions)
            .field("self_loops", &self.self_loops)
            .field("timeouts", &self.timeouts)
            .field("residents", &self.residents)
            .field("tick", &self.tick)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn events_with(ids: &[u32]) -> BTreeMap<EventId, Event> {
        ids.iter()
            .map(|id| (EventId(*id), Event::new(*id, "")))
            .collect()
    }

    #[test]
    fn route_prefers_self_loop() {
        let state: State<()> = State::new(1, "a")
            .with_transition(5, 2)
            .with_self_loop(5)
            .with_transition(6, 3);

        assert_eq!(state.route(Signal(5)), Some(Route::SelfLoop));
        assert_eq!(state.route(Signal(6)), Some(Route::Target(StateId(3))));
        assert_eq!(state.route(Signal(7)), None);
    }

    #[test]
    fn later_transition_overwrites_earlier() {
        let mut state: State<()> = State::new(1, "a");
        state.add_transition(Signal(1), StateId(2));
        state.add_transition(Signal(1), StateId(3));

        assert_eq!(state.route(Signal(1)), Some(Route::Target(StateId(3))));
        assert_eq!(state.transitions().count(), 1);
    }

    #[test]
    fn route_destination_resolves_self_loop() {
        assert_eq!(Route::SelfLoop.destination(StateId(4)), StateId(4));
        assert_eq!(Route::Target(StateId(2)).destination(StateId(4)), StateId(2));
    }

    #[test]
    fn residents_are_unique_and_removed_by_id() {
        let mut state: State<()> = State::new(1, "a");
        state.add_resident(EventId(1));
        state.add_resident(EventId(1));
        state.add_resident(EventId(2));
        assert_eq!(state.residents(), &[EventId(1), EventId(2)]);

        state.remove_resident(EventId(1));
        assert_eq!(state.residents(), &[EventId(2)]);
        state.remove_resident(EventId(9));
        assert_eq!(state.resident_count(), 1);
    }

    #[test]
    fn zero_delay_is_bumped_to_one_tick() {
        let state: State<()> = State::new(1, "a").with_timeout(1, 0);
        assert_eq!(state.timeouts()[0].delay, 1);
    }

    #[test]
    fn advance_tick_fires_only_exact_key_and_discards_bucket() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&fired);
        let mut state: State<()> = State::new(1, "a")
            .with_timeout(7, 3)
            .with_timeout(8, 5)
            .with_behavior(FnBehavior::new().on_timeout(move |label, event: &mut Event| {
                log.lock().unwrap().push((label, event.id()));
            }));
        let mut events = events_with(&[1]);
        events
            .get_mut(&EventId(1))
            .unwrap()
            .place(&mut state, Signal(0), &())
            .unwrap();

        for tick in 1..=2 {
            assert_eq!(state.advance_tick(tick, &mut events), 0);
        }
        assert_eq!(state.advance_tick(3, &mut events), 1);
        assert_eq!(*fired.lock().unwrap(), vec![(Label(7), EventId(1))]);
        assert!(!state.pending_timeouts().contains_key(&3));
        assert!(state.pending_timeouts().contains_key(&5));

        assert_eq!(state.advance_tick(4, &mut events), 0);
        assert_eq!(state.advance_tick(5, &mut events), 1);
        assert!(state.pending_timeouts().is_empty());
    }

    #[test]
    fn timeout_for_departed_event_is_dropped() {
        let mut state: State<()> = State::new(1, "a").with_timeout(1, 1);
        let mut events = events_with(&[1]);
        events
            .get_mut(&EventId(1))
            .unwrap()
            .place(&mut state, Signal(0), &())
            .unwrap();

        events.get_mut(&EventId(1)).unwrap().recycle();

        assert_eq!(state.advance_tick(1, &mut events), 0);
        assert!(state.pending_timeouts().is_empty());
        assert_eq!(state.resident_count(), 0);
    }

    #[test]
    fn released_ids_are_purged_when_timeouts_come_due() {
        let mut state: State<()> = State::new(1, "a").with_timeout(1, 2);
        let mut events = events_with(&[1, 2]);
        for id in [1, 2] {
            events
                .get_mut(&EventId(id))
                .unwrap()
                .place(&mut state, Signal(0), &())
                .unwrap();
        }

        events.remove(&EventId(1));
        state.advance_tick(1, &mut events);
        assert_eq!(state.residents(), &[EventId(1), EventId(2)]);
        assert_eq!(state.tick_snapshot(), 1);

        assert_eq!(state.advance_tick(2, &mut events), 1);
        assert_eq!(state.residents(), &[EventId(2)]);
    }

    #[test]
    fn idle_tick_leaves_residents_alone() {
        let mut state: State<()> = State::new(1, "a");
        let mut events = events_with(&[1]);
        events
            .get_mut(&EventId(1))
            .unwrap()
            .place(&mut state, Signal(0), &())
            .unwrap();
        events.clear();

        assert_eq!(state.advance_tick(1, &mut events), 0);
        assert_eq!(state.residents(), &[EventId(1)]);
    }

    #[test]
    fn huge_delay_saturates_instead_of_overflowing() {
        let mut state: State<()> = State::new(1, "a").with_timeout(1, Tick::MAX).with_timeout(2, 1);
        let mut events = events_with(&[1]);
        state.advance_tick(1, &mut events);
        events
            .get_mut(&EventId(1))
            .unwrap()
            .place(&mut state, Signal(0), &())
            .unwrap();

        assert!(state.is_resident(EventId(1)));
        let keys: Vec<Tick> = state.pending_timeouts().keys().copied().collect();
        assert_eq!(keys, vec![2, Tick::MAX]);

        assert_eq!(state.advance_tick(2, &mut events), 1);
        assert_eq!(state.advance_tick(Tick::MAX, &mut events), 1);
        assert!(state.pending_timeouts().is_empty());
    }

    #[test]
    fn entry_callback_receives_payload() {
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let mut state: State<String> = State::new(1, "a").with_behavior(
            FnBehavior::new().on_entry(move |event: &mut Event, signal, payload: &String| {
                *slot.lock().unwrap() = Some((event.id(), signal, payload.clone()));
            }),
        );
        let mut event = Event::new(3, "");

        event
            .place(&mut state, Signal(2), &"hello".to_string())
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            Some((EventId(3), Signal(2), "hello".to_string()))
        );
    }
}
