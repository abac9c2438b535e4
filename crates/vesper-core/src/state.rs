//! Typed state values that components can wait on.
//!
//! A [`State<T>`] is a copyable handle to a value owned by the environment.
//! Components register predicates over one or more states with
//! [`Environment::wait`]; every change of a value re-evaluates the waiters of
//! that state in queue order and releases those whose predicates hold.
//!
//! [`Environment::trigger`] sets a value, releases up to `max` waiters, and
//! then sets a follow-up value, which models a short pulse.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::debug;

use crate::component::{ComponentState, ScheduleReason, StateWait, WaitPredicate};
use crate::engine::Environment;
use crate::error::{SimError, SimResult};
use crate::event::TraceEvent;
use crate::id::{ComponentId, Priority, SimTime, StateId};
use crate::monitor::CategoryTimeline;
use crate::queue::ComponentQueue;

// ---------------------------------------------------------------------------
// Handles and storage
// ---------------------------------------------------------------------------

/// Typed handle to a state value.
pub struct State<T> {
    id: StateId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> State<T> {
    pub(crate) fn from_id(id: StateId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for State<T> {}

impl<T> PartialEq for State<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("State").field(&self.id).finish()
    }
}

fn render<T: Debug + 'static>(value: &dyn Any) -> String {
    value
        .downcast_ref::<T>()
        .map(|v| format!("{v:?}"))
        .unwrap_or_default()
}

/// Type-erased storage behind a [`State`] handle.
pub struct StateCell {
    name: String,
    value: Box<dyn Any>,
    render: fn(&dyn Any) -> String,
    pub(crate) waiters: ComponentQueue,
    timeline: CategoryTimeline,
}

impl StateCell {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current value, rendered with `Debug`.
    pub fn rendered(&self) -> String {
        (self.render)(self.value.as_ref())
    }

    pub fn waiters(&self) -> &ComponentQueue {
        &self.waiters
    }

    /// How long each value was held.
    pub fn timeline(&self) -> &CategoryTimeline {
        &self.timeline
    }

    fn holds(&self, predicate: &WaitPredicate) -> bool {
        predicate(self.value.as_ref())
    }
}

impl Debug for StateCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("name", &self.name)
            .field("value", &self.rendered())
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wait builder
// ---------------------------------------------------------------------------

/// Predicates to wait for, built up fluently.
///
/// ```ignore
/// env.wait(me, Wait::on(light, Light::Green))?;
/// env.wait(me, Wait::until(level, |l: &f64| *l > 3.0).and(door, true).any())?;
/// ```
pub struct Wait {
    entries: Vec<(StateId, WaitPredicate)>,
    all: bool,
    priority: Priority,
    fail_at: Option<SimTime>,
    fail_delay: Option<SimTime>,
    fail_priority: Priority,
    urgent: bool,
}

impl Wait {
    /// Wait until `state` equals `value`.
    pub fn on<T: PartialEq + 'static>(state: State<T>, value: T) -> Self {
        Self::until(state, move |v: &T| *v == value)
    }

    /// Wait until `predicate` holds for the value of `state`.
    pub fn until<T: 'static>(state: State<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            entries: vec![(state.id, erase(predicate))],
            all: true,
            priority: Priority::NORMAL,
            fail_at: None,
            fail_delay: None,
            fail_priority: Priority::NORMAL,
            urgent: false,
        }
    }

    pub fn and<T: PartialEq + 'static>(self, state: State<T>, value: T) -> Self {
        self.and_until(state, move |v: &T| *v == value)
    }

    pub fn and_until<T: 'static>(mut self, state: State<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.entries.push((state.id, erase(predicate)));
        self
    }

    /// Continue when any one predicate holds instead of all of them.
    pub fn any(mut self) -> Self {
        self.all = false;
        self
    }

    /// Position among the waiters of each state.
    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn fail_at(mut self, time: SimTime) -> Self {
        self.fail_at = Some(time);
        self
    }

    pub fn fail_delay(mut self, delay: SimTime) -> Self {
        self.fail_delay = Some(delay);
        self
    }

    pub fn fail_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.fail_priority = priority.into();
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

impl Debug for Wait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wait")
            .field("states", &self.entries.iter().map(|(s, _)| *s).collect::<Vec<_>>())
            .field("all", &self.all)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

fn erase<T: 'static>(predicate: impl Fn(&T) -> bool + 'static) -> WaitPredicate {
    Box::new(move |value: &dyn Any| value.downcast_ref::<T>().is_some_and(&predicate))
}

// ---------------------------------------------------------------------------
// State operations
// ---------------------------------------------------------------------------

impl Environment {
    pub fn create_state<T>(&mut self, name: impl Into<String>, initial: T) -> State<T>
    where
        T: PartialEq + Debug + 'static,
    {
        let name = name.into();
        let now = self.now();
        let tracked = self.config().tracking.queue_statistics;
        let cell = StateCell {
            waiters: ComponentQueue::with_tracking(format!("waiters of {name}"), now, tracked),
            timeline: CategoryTimeline::new(now, format!("{initial:?}")),
            value: Box::new(initial),
            render: render::<T>,
            name,
        };
        State::from_id(self.states.insert(cell))
    }

    pub fn state_value<T: 'static>(&self, state: State<T>) -> SimResult<&T> {
        self.states
            .get(state.id)
            .and_then(|cell| cell.value.downcast_ref::<T>())
            .ok_or(SimError::UnknownState(state.id))
    }

    /// Untyped view of a state, for inspection.
    pub fn state_cell(&self, id: StateId) -> Option<&StateCell> {
        self.states.get(id)
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &StateCell)> + '_ {
        self.states.iter()
    }

    /// Set the value of `state` and release every waiter whose predicates
    /// now hold. Setting the current value again does nothing.
    pub fn set_state<T>(&mut self, state: State<T>, value: T) -> SimResult<()>
    where
        T: PartialEq + Debug + 'static,
    {
        if self.assign(state, value)? {
            self.try_wait_state(state.id, usize::MAX)?;
        }
        Ok(())
    }

    /// Set `value`, release at most `max` waiters, then set `value_after`
    /// (the previous value when `None`) and release waiters again without a
    /// limit.
    pub fn trigger<T>(&mut self, state: State<T>, value: T, value_after: Option<T>, max: usize) -> SimResult<()>
    where
        T: Clone + PartialEq + Debug + 'static,
    {
        let after = match value_after {
            Some(v) => v,
            None => self.state_value(state)?.clone(),
        };
        self.assign(state, value)?;
        self.try_wait_state(state.id, max)?;
        self.set_state(state, after)
    }

    /// Suspend `id` until the predicates in `wait` hold, or until its
    /// deadline (then `failed()` is set).
    pub fn wait(&mut self, id: ComponentId, wait: Wait) -> SimResult<()> {
        let Wait {
            entries,
            all,
            priority,
            fail_at,
            fail_delay,
            fail_priority,
            urgent,
        } = wait;

        self.require_not_main(id)?;
        let deadline = self.deadline(id, fail_at, fail_delay)?;
        self.detach(id)?;
        let now = self.now();

        let c = self.comp_mut(id)?;
        c.failed = false;
        c.wait_all = all;

        for (sid, predicate) in entries {
            let cell = self.states.get_mut(sid).ok_or(SimError::UnknownState(sid))?;
            if !cell.waiters.contains(id) {
                cell.waiters.add(id, priority, now)?;
            }
            self.comp_mut(id)?.waits.push(StateWait {
                state: sid,
                predicate,
                priority,
            });
        }

        if !self.try_wait_component(id)? {
            self.reschedule(id, deadline, fail_priority, urgent, ScheduleReason::Wait)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Store a value without re-evaluating waiters. Returns whether it
    /// changed.
    fn assign<T>(&mut self, state: State<T>, value: T) -> SimResult<bool>
    where
        T: PartialEq + Debug + 'static,
    {
        let now = self.now();
        let cell = self
            .states
            .get_mut(state.id)
            .ok_or(SimError::UnknownState(state.id))?;
        if cell.value.downcast_ref::<T>() == Some(&value) {
            return Ok(false);
        }
        cell.timeline.add_value(now, format!("{value:?}"));
        debug!(state = %cell.name, value = ?value, time = now, "state changed");
        cell.value = Box::new(value);
        self.emit(TraceEvent::StateValueChanged {
            state: state.id,
            time: now,
        });
        Ok(true)
    }

    /// Re-evaluate the waiters of `state` in queue order, releasing at most
    /// `max` of them. Returns how many were released.
    pub(crate) fn try_wait_state(&mut self, state: StateId, max: usize) -> SimResult<usize> {
        let candidates = self
            .states
            .get(state)
            .ok_or(SimError::UnknownState(state))?
            .waiters
            .items();
        let mut released = 0;
        for candidate in candidates {
            if released >= max {
                break;
            }
            // released or withdrawn earlier in this pass
            if !self.states[state].waiters.contains(candidate) {
                continue;
            }
            if self.try_wait_component(candidate)? {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Release `id` if its predicates hold. Returns whether it was released.
    pub(crate) fn try_wait_component(&mut self, id: ComponentId) -> SimResult<bool> {
        let c = self.comp(id)?;
        if c.state == ComponentState::Interrupted || c.waits.is_empty() {
            return Ok(false);
        }
        let holds = |w: &StateWait| {
            self.states
                .get(w.state)
                .is_some_and(|cell| cell.holds(&w.predicate))
        };
        let honored = if c.wait_all {
            c.waits.iter().all(holds)
        } else {
            c.waits.iter().any(holds)
        };
        if !honored {
            return Ok(false);
        }

        let now = self.now();
        self.withdraw_waits(id)?;
        self.unschedule(id);
        debug!(component = %self.name_of(id), time = now, "wait honored");
        self.reschedule(id, now, Priority::NORMAL, false, ScheduleReason::Activate)?;
        Ok(true)
    }

    /// Drop all registered waits of `id`.
    pub(crate) fn withdraw_waits(&mut self, id: ComponentId) -> SimResult<()> {
        let now = self.now();
        let waits = std::mem::take(&mut self.comp_mut(id)?.waits);
        for w in &waits {
            if let Some(cell) = self.states.get_mut(w.state) {
                cell.waiters.remove(id, now);
            }
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Script;

    fn waiter(env: &mut Environment, name: &str, wait: impl Fn() -> Wait + 'static) -> ComponentId {
        env.spawn(name, Script::new().then(move |env, me| env.wait(me, wait())))
            .unwrap()
    }

    #[test]
    fn state_value_round_trip() {
        let mut env = Environment::default();
        let s = env.create_state("level", 3_i32);
        assert_eq!(*env.state_value(s).unwrap(), 3);
        env.set_state(s, 7).unwrap();
        assert_eq!(*env.state_value(s).unwrap(), 7);
        assert_eq!(env.state_cell(s.id()).unwrap().rendered(), "7");
    }

    #[test]
    fn wait_already_true_is_honored_immediately() {
        let mut env = Environment::default();
        let s = env.create_state("open", true);
        let c = waiter(&mut env, "w", move || Wait::on(s, true));
        env.run().unwrap();
        assert!(env.component(c).unwrap().is_data());
        assert!(!env.component(c).unwrap().failed());
    }

    #[test]
    fn set_state_releases_matching_waiters() {
        let mut env = Environment::default();
        let s = env.create_state("light", "red".to_string());
        let a = waiter(&mut env, "a", move || Wait::on(s, "green".to_string()));
        let b = waiter(&mut env, "b", move || Wait::on(s, "blue".to_string()));
        env.run_until(1.0).unwrap();
        assert!(env.component(a).unwrap().is_waiting());

        env.set_state(s, "green".to_string()).unwrap();
        assert!(env.component(a).unwrap().is_scheduled());
        assert!(env.component(b).unwrap().is_waiting());
        assert_eq!(env.state_cell(s.id()).unwrap().waiters().len(), 1);
    }

    #[test]
    fn setting_same_value_is_a_no_op() {
        let mut env = Environment::default();
        let s = env.create_state("x", 1_u8);
        env.set_state(s, 1).unwrap();
        assert_eq!(env.state_cell(s.id()).unwrap().timeline().changes().len(), 1);
    }

    #[test]
    fn trigger_releases_limited_waiters_and_reverts() {
        let mut env = Environment::default();
        let s = env.create_state("pulse", false);
        let a = waiter(&mut env, "a", move || Wait::on(s, true));
        let b = waiter(&mut env, "b", move || Wait::on(s, true));
        env.run_until(1.0).unwrap();

        env.trigger(s, true, None, 1).unwrap();
        assert!(!*env.state_value(s).unwrap());
        assert!(env.component(a).unwrap().is_scheduled());
        assert!(env.component(b).unwrap().is_waiting());
    }

    #[test]
    fn wait_all_needs_every_predicate() {
        let mut env = Environment::default();
        let x = env.create_state("x", 0_i32);
        let y = env.create_state("y", 0_i32);
        let c = waiter(&mut env, "c", move || {
            Wait::until(x, |v| *v > 0).and_until(y, |v| *v > 0)
        });
        env.run_until(1.0).unwrap();
        env.set_state(x, 1).unwrap();
        assert!(env.component(c).unwrap().is_waiting());
        env.set_state(y, 1).unwrap();
        assert!(env.component(c).unwrap().is_scheduled());
        assert!(!env.component(c).unwrap().is_waiting_on(x.id()));
    }

    #[test]
    fn wait_any_needs_one_predicate() {
        let mut env = Environment::default();
        let x = env.create_state("x", 0_i32);
        let y = env.create_state("y", 0_i32);
        let c = waiter(&mut env, "c", move || Wait::on(x, 5).and(y, 5).any());
        env.run_until(1.0).unwrap();
        env.set_state(y, 5).unwrap();
        assert!(env.component(c).unwrap().is_scheduled());
        assert!(env.state_cell(x.id()).unwrap().waiters().is_empty());
    }

    #[test]
    fn wait_times_out() {
        let mut env = Environment::default();
        let s = env.create_state("never", 0_i32);
        let c = waiter(&mut env, "c", move || Wait::on(s, 1).fail_delay(4.0));
        env.run().unwrap();
        assert_eq!(env.now(), 4.0);
        assert!(env.component(c).unwrap().failed());
        assert!(env.state_cell(s.id()).unwrap().waiters().is_empty());
    }

    #[test]
    fn past_deadline_registers_nothing() {
        let mut env = Environment::default();
        let s = env.create_state("s", 0_i32);
        let c = env
            .spawn("c", Script::new().then(|env, me| env.passivate(me)))
            .unwrap();
        env.run_until(5.0).unwrap();

        assert!(matches!(
            env.wait(c, Wait::on(s, 1).fail_at(2.0)),
            Err(SimError::ScheduledInPast { .. })
        ));
        assert!(env.state_cell(s.id()).unwrap().waiters().is_empty());
        assert!(!env.component(c).unwrap().is_waiting_on(s.id()));
        assert!(env.component(c).unwrap().is_passive());
    }

    #[test]
    fn data_component_cannot_wait() {
        let mut env = Environment::default();
        let s = env.create_state("s", 0_i32);
        let c = env.create_data_component("d");
        assert!(matches!(
            env.wait(c, Wait::on(s, 1)),
            Err(SimError::DataComponent(_))
        ));
    }

    #[test]
    fn timeline_records_durations() {
        let mut env = Environment::default();
        let s = env.create_state("mode", 'a');
        env.run_until(2.0).unwrap();
        env.set_state(s, 'b').unwrap();
        env.run_until(5.0).unwrap();
        let durations = env.state_cell(s.id()).unwrap().timeline().durations(env.now());
        assert!(durations.contains(&("'a'".to_string(), 2.0)));
        assert!(durations.contains(&("'b'".to_string(), 3.0)));
    }
}
