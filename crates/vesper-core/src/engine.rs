//! The environment: clock, event queue, standby lists and the run loop.
//!
//! Every simulated entity lives in an arena owned by [`Environment`] and is
//! addressed by a slotmap key. Processes receive `&mut Environment` when
//! they are resumed, which is how they invoke primitives on themselves and
//! on other components. Only one process runs at a time.
//!
//! # Step
//!
//! 1. If the pending-standby list has a component still in STANDBY, run it
//!    and end the step (standby components get one look per step without
//!    advancing time).
//! 2. Otherwise move this step's standby list to pending, pop the earliest
//!    wake-up, advance `now`, make that component CURRENT, fail any request
//!    or wait that is still outstanding (its deadline passed), and resume
//!    its process.
//! 3. Deliver buffered trace events to listeners.
//!
//! Popping the MAIN component ends the current run.

use std::collections::{HashMap, VecDeque};

use slotmap::SlotMap;
use tracing::{debug, info, trace, warn};

use crate::component::{
    Component, ComponentBuilder, ComponentState, Process, ProcessStatus, ScheduleReason,
};
use crate::config::SimConfig;
use crate::coordination::SharedQueue;
use crate::error::{SimError, SimResult};
use crate::event::{EventBus, TraceEvent};
use crate::event_queue::EventQueue;
use crate::id::{ComponentId, Priority, QueueId, ResourceId, SimTime, StateId};
use crate::registry::Registry;
use crate::resource::Resource;
use crate::rng::SimRng;
use crate::sim::{RunSummary, TrajectoryHash};
use crate::state::{State, StateCell};

/// What a dispatched process left behind.
enum Outcome {
    Suspended,
    Terminate,
    /// Finished while suspended; terminate on next dispatch.
    Exhausted,
}

pub struct Environment {
    now: SimTime,
    pub(crate) queue: EventQueue,
    pub(crate) components: SlotMap<ComponentId, Component>,
    pub(crate) resources: SlotMap<ResourceId, Resource>,
    pub(crate) states: SlotMap<StateId, StateCell>,
    pub(crate) queues: SlotMap<QueueId, SharedQueue>,
    /// Round-robin position per selecting component and candidate list.
    pub(crate) selection_cursors: HashMap<(ComponentId, Vec<ResourceId>), usize>,
    standby: Vec<ComponentId>,
    pending_standby: VecDeque<ComponentId>,
    current: Option<ComponentId>,
    main: ComponentId,
    running: bool,
    end_on_empty: bool,
    exhausted: bool,
    rng: SimRng,
    events: EventBus,
    config: SimConfig,
    dependencies: Registry,
    fingerprint: TrajectoryHash,
    steps: u64,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("now", &self.now)
            .field("components", &self.components.len())
            .field("resources", &self.resources.len())
            .field("states", &self.states.len())
            .field("queued", &self.queue.len())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(config: SimConfig) -> Self {
        let mut components = SlotMap::with_key();
        let mut main_record = Component::new("main".to_string(), 0.0);
        main_record.state = ComponentState::Current;
        let main = components.insert(main_record);

        let events = if config.tracking.trace_events {
            EventBus::new(config.event_buffer_capacity)
        } else {
            EventBus::disabled()
        };

        Self {
            now: 0.0,
            queue: EventQueue::new(),
            components,
            resources: SlotMap::with_key(),
            states: SlotMap::with_key(),
            queues: SlotMap::with_key(),
            selection_cursors: HashMap::new(),
            standby: Vec::new(),
            pending_standby: VecDeque::new(),
            current: Some(main),
            main,
            running: false,
            end_on_empty: false,
            exhausted: false,
            rng: SimRng::new(config.seed),
            events,
            config,
            dependencies: Registry::new(),
            fingerprint: TrajectoryHash::new(),
            steps: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(SimConfig::with_seed(seed))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The distinguished component that stands for "outside any process".
    pub fn main(&self) -> ComponentId {
        self.main
    }

    /// The component whose process is running. MAIN outside of a run,
    /// `None` between manual [`step`](Self::step)s.
    pub fn current(&self) -> Option<ComponentId> {
        self.current
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The environment's random generator. All sampling should go through
    /// it so a seed reproduces the run.
    pub fn rng(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn dependencies(&self) -> &Registry {
        &self.dependencies
    }

    pub fn dependencies_mut(&mut self) -> &mut Registry {
        &mut self.dependencies
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    /// All components, main included, in arena order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> + '_ {
        self.components.iter()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Number of wake-ups currently on the event queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next wake-up, if any.
    pub fn peek(&self) -> Option<SimTime> {
        self.queue.peek_time()
    }

    /// Steps executed since construction.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Hash over the dispatch sequence so far (times and component names).
    /// Two runs of the same model with the same seed produce the same value.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = self.fingerprint;
        hash.write_u64(self.rng.state());
        hash.finish()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Create a component. With a process it is scheduled immediately
    /// (at `now` unless the builder carries a schedule); without one it
    /// starts as DATA.
    pub fn create_component(&mut self, builder: ComponentBuilder) -> SimResult<ComponentId> {
        let ComponentBuilder {
            name,
            behavior,
            schedule,
            deferred,
        } = builder;

        if behavior.is_none() && schedule.is_some() {
            return Err(SimError::NoProcess(name));
        }
        if deferred && schedule.is_some() {
            return Err(SimError::ConflictingSchedule);
        }

        let id = self.components.insert(Component::new(name, self.now));
        let now = self.now;
        self.emit(TraceEvent::ComponentCreated {
            component: id,
            time: now,
        });

        if let Some(behavior) = behavior {
            self.components[id].set_behavior(Some(behavior));
            if !deferred {
                let schedule = schedule.unwrap_or_default();
                let at = schedule.resolve(now);
                self.reschedule(
                    id,
                    at,
                    schedule.priority,
                    schedule.urgent,
                    ScheduleReason::Activate,
                )?;
            }
        }
        debug!(component = %self.components[id].name, time = now, "created");
        Ok(id)
    }

    /// Create a component running `process` once, starting at `now`.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        process: impl Process + 'static,
    ) -> SimResult<ComponentId> {
        self.create_component(ComponentBuilder::new(name).process(process))
    }

    /// Create a component whose process restarts whenever it finishes.
    pub fn spawn_repeated(
        &mut self,
        name: impl Into<String>,
        process: impl Process + 'static,
    ) -> SimResult<ComponentId> {
        self.create_component(ComponentBuilder::new(name).repeated(process))
    }

    /// Create a DATA component without a process.
    pub fn create_data_component(&mut self, name: impl Into<String>) -> ComponentId {
        let id = self.components.insert(Component::new(name.into(), self.now));
        let now = self.now;
        self.emit(TraceEvent::ComponentCreated {
            component: id,
            time: now,
        });
        id
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run until the event queue is empty.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.run_inner(None)
    }

    /// Run for `duration` units of virtual time.
    pub fn run_for(&mut self, duration: SimTime) -> SimResult<RunSummary> {
        self.run_inner(Some(self.now + duration))
    }

    /// Run until virtual time `until`.
    pub fn run_until(&mut self, until: SimTime) -> SimResult<RunSummary> {
        self.run_inner(Some(until))
    }

    fn run_inner(&mut self, horizon: Option<SimTime>) -> SimResult<RunSummary> {
        let main = self.main;
        match horizon {
            Some(until) => {
                self.end_on_empty = false;
                self.reschedule(
                    main,
                    until,
                    Priority::NORMAL,
                    false,
                    ScheduleReason::Activate,
                )?;
            }
            None => {
                self.end_on_empty = true;
                self.queue.remove(main);
                self.components[main].scheduled_time = None;
                self.transition(main, ComponentState::Passive)?;
            }
        }

        info!(now = self.now, horizon = ?horizon, "run started");
        let start_steps = self.steps;
        self.exhausted = false;
        self.running = true;
        while self.running {
            if let Err(err) = self.step() {
                self.running = false;
                self.restore_main();
                return Err(err);
            }
        }
        let summary = RunSummary {
            steps_run: self.steps - start_steps,
            ended_at: self.now,
            exhausted: self.exhausted,
        };
        info!(now = self.now, steps = summary.steps_run, "run finished");
        Ok(summary)
    }

    /// End the current run once the components already due at `now` have
    /// been served.
    pub fn stop(&mut self) -> SimResult<()> {
        let main = self.main;
        let now = self.now;
        self.reschedule(main, now, Priority::NORMAL, false, ScheduleReason::Activate)
    }

    /// Execute a single step. See the module docs for the order of events.
    pub fn step(&mut self) -> SimResult<()> {
        let result = self.step_inner();
        self.events.deliver();
        result
    }

    fn step_inner(&mut self) -> SimResult<()> {
        self.steps += 1;

        while let Some(id) = self.pending_standby.pop_front() {
            let still_standby = self
                .components
                .get(id)
                .is_some_and(|c| c.state == ComponentState::Standby);
            if still_standby {
                trace!(component = %self.components[id].name, "standby check");
                self.dispatch(id)?;
                return Ok(());
            }
        }

        self.pending_standby = std::mem::take(&mut self.standby).into();

        let (time, id) = match self.queue.pop() {
            Some(next) => next,
            None => {
                self.exhausted = true;
                (self.now, self.main)
            }
        };

        if time < self.now {
            return Err(SimError::ClockRegression {
                time,
                now: self.now,
            });
        }
        if self.is_state(id, ComponentState::Passive) {
            return Err(SimError::PassiveInEventQueue(self.name_of(id)));
        }
        self.now = time;

        if id == self.main {
            self.set_current(id)?;
            self.running = false;
            return Ok(());
        }

        // Popped while still REQUESTING or WAITING means the deadline passed.
        let timed_out = self.is_state(id, ComponentState::Requesting)
            || self.is_state(id, ComponentState::Waiting);
        self.set_current(id)?;
        if timed_out {
            self.check_fail(id)?;
        }
        self.dispatch(id)
    }

    fn restore_main(&mut self) {
        let main = self.main;
        self.queue.remove(main);
        if let Err(err) = self.set_current(main) {
            warn!(%err, "main restored with a failing lifecycle update");
        }
    }

    fn set_current(&mut self, id: ComponentId) -> SimResult<()> {
        if let Some(c) = self.components.get_mut(id) {
            c.scheduled_time = None;
        }
        self.current = Some(id);
        self.transition(id, ComponentState::Current)
    }

    /// Make `id` CURRENT and resume its process. No component is current
    /// once the process hands back control.
    fn dispatch(&mut self, id: ComponentId) -> SimResult<()> {
        self.set_current(id)?;
        self.fingerprint.write_time(self.now);
        self.fingerprint.write_str(&self.components[id].name);
        let result = self.call_process(id);
        self.current = None;
        result
    }

    fn call_process(&mut self, id: ComponentId) -> SimResult<()> {
        let component = self.comp_mut(id)?;
        if component.exhausted {
            return self.terminate(id);
        }
        let epoch = component.process_epoch;
        let Some(mut behavior) = component.behavior.take() else {
            return Err(SimError::NoProcess(component.name.clone()));
        };

        let mut restarted = false;
        let outcome = loop {
            match behavior.process_mut().resume(self, id) {
                Err(err) => break Err(err),
                Ok(ProcessStatus::Suspended) => break Ok(Outcome::Suspended),
                Ok(ProcessStatus::Finished) => {
                    let owned = self
                        .components
                        .get(id)
                        .is_some_and(|c| c.process_epoch == epoch);
                    let still_current = self.is_state(id, ComponentState::Current);
                    if !owned {
                        break Ok(Outcome::Suspended);
                    }
                    if !behavior.is_repeated() {
                        break Ok(if still_current {
                            Outcome::Terminate
                        } else {
                            Outcome::Exhausted
                        });
                    }
                    if !still_current {
                        break Ok(Outcome::Suspended);
                    }
                    if restarted {
                        break Err(SimError::IdleRepeatedProcess(self.name_of(id)));
                    }
                    restarted = true;
                }
            }
        };

        // Put the process back unless it was replaced or cleared meanwhile.
        // A process cleared by cancel/terminate is kept for re-activation.
        if let Some(c) = self.components.get_mut(id) {
            if c.process_epoch == epoch {
                c.behavior = Some(behavior);
            } else if c.behavior.is_none() && c.state == ComponentState::Data {
                c.last_behavior = Some(behavior);
            }
        }

        match outcome? {
            Outcome::Suspended => {
                if self.is_state(id, ComponentState::Current) {
                    return Err(SimError::SuspendedWhileCurrent(self.name_of(id)));
                }
                Ok(())
            }
            Outcome::Terminate => self.terminate(id),
            Outcome::Exhausted => {
                if let Some(c) = self.components.get_mut(id) {
                    c.exhausted = true;
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scheduling internals
    // -----------------------------------------------------------------------

    /// Put `id` on the event queue at `time` in the state implied by
    /// `reason`. A time of `+inf` leaves it off the queue.
    pub(crate) fn reschedule(
        &mut self,
        id: ComponentId,
        time: SimTime,
        priority: Priority,
        urgent: bool,
        reason: ScheduleReason,
    ) -> SimResult<()> {
        if time.is_nan() || time < self.now {
            return Err(SimError::ScheduledInPast {
                component: self.name_of(id),
                time,
                now: self.now,
            });
        }
        self.comp_mut(id)?.scheduled_time = Some(time);
        self.transition(id, reason.state())?;
        self.push(id, time, priority, urgent);
        debug!(
            component = %self.components[id].name,
            time,
            now = self.now,
            ?reason,
            "scheduled"
        );
        Ok(())
    }

    /// Give-up time of a request or wait. Checked before anything is
    /// registered, so a bad deadline leaves no trace in the queues.
    pub(crate) fn deadline(
        &self,
        id: ComponentId,
        fail_at: Option<SimTime>,
        fail_delay: Option<SimTime>,
    ) -> SimResult<SimTime> {
        let deadline = match (fail_at, fail_delay) {
            (Some(_), Some(_)) => return Err(SimError::ConflictingDeadlines),
            (Some(at), None) => at,
            (None, Some(delay)) => self.now + delay,
            (None, None) => SimTime::INFINITY,
        };
        if deadline.is_nan() || deadline < self.now {
            return Err(SimError::ScheduledInPast {
                component: self.name_of(id),
                time: deadline,
                now: self.now,
            });
        }
        Ok(deadline)
    }

    /// Insert into the event queue. Infinite times are not stored.
    pub(crate) fn push(&mut self, id: ComponentId, time: SimTime, priority: Priority, urgent: bool) {
        if time.is_infinite() {
            self.queue.remove(id);
        } else {
            self.queue.push(id, time, priority, urgent);
        }
    }

    /// Take `id` off the event queue and the standby lists.
    pub(crate) fn unschedule(&mut self, id: ComponentId) {
        self.queue.remove(id);
        self.standby.retain(|c| *c != id);
        self.pending_standby.retain(|c| *c != id);
    }

    pub(crate) fn add_standby(&mut self, id: ComponentId) {
        self.standby.push(id);
    }

    // -----------------------------------------------------------------------
    // Record helpers
    // -----------------------------------------------------------------------

    pub(crate) fn comp(&self, id: ComponentId) -> SimResult<&Component> {
        self.components
            .get(id)
            .ok_or(SimError::UnknownComponent(id))
    }

    pub(crate) fn comp_mut(&mut self, id: ComponentId) -> SimResult<&mut Component> {
        self.components
            .get_mut(id)
            .ok_or(SimError::UnknownComponent(id))
    }

    pub(crate) fn res(&self, id: ResourceId) -> SimResult<&Resource> {
        self.resources.get(id).ok_or(SimError::UnknownResource(id))
    }

    pub(crate) fn res_mut(&mut self, id: ResourceId) -> SimResult<&mut Resource> {
        self.resources
            .get_mut(id)
            .ok_or(SimError::UnknownResource(id))
    }

    pub(crate) fn name_of(&self, id: ComponentId) -> String {
        self.components
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("{id:?}"))
    }

    pub(crate) fn is_state(&self, id: ComponentId, state: ComponentState) -> bool {
        self.components.get(id).is_some_and(|c| c.state == state)
    }

    /// Move `id` to `to`, trace it, and publish it to the component's
    /// lifecycle state if one was created (which may release joiners).
    pub(crate) fn transition(&mut self, id: ComponentId, to: ComponentState) -> SimResult<()> {
        let Some(c) = self.components.get_mut(id) else {
            return Ok(());
        };
        let from = c.state;
        if from == to {
            return Ok(());
        }
        c.state = to;
        let lifecycle = c.lifecycle;
        let time = self.now;
        self.events.emit(TraceEvent::StateChanged {
            component: id,
            from,
            to,
            time,
        });
        match lifecycle {
            Some(state) => self.set_state(State::from_id(state), to),
            None => Ok(()),
        }
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        self.events.emit(event);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Schedule, Script, process_fn};
    use crate::event::EventKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn new_environment_has_current_main() {
        let env = Environment::default();
        assert_eq!(env.now(), 0.0);
        assert_eq!(env.current(), Some(env.main()));
        assert!(env.component(env.main()).unwrap().is_current());
        assert_eq!(env.queued(), 0);
    }

    #[test]
    fn no_component_is_current_between_steps() {
        let mut env = Environment::default();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let c = env
            .spawn(
                "worker",
                Script::new().then(move |env, me| {
                    *s.borrow_mut() = env.current();
                    env.hold(me, 1.0)
                }),
            )
            .unwrap();
        env.step().unwrap();
        assert_eq!(*seen.borrow(), Some(c));
        assert_eq!(env.current(), None);
        assert!(env.component(c).unwrap().is_scheduled());
    }

    #[test]
    fn passive_component_in_event_queue_is_an_error() {
        let mut env = Environment::default();
        let c = env
            .spawn("ghost", Script::new().then(|env, me| env.hold(me, 1.0)))
            .unwrap();
        // bypass the primitives so the queue entry survives
        env.components[c].state = ComponentState::Passive;
        let err = env.run().unwrap_err();
        assert_eq!(err, SimError::PassiveInEventQueue("ghost".into()));
        assert_eq!(env.current(), Some(env.main()));
    }

    #[test]
    fn data_component_is_not_scheduled() {
        let mut env = Environment::default();
        let c = env.create_data_component("idle");
        assert!(env.component(c).unwrap().is_data());
        assert_eq!(env.queued(), 0);
    }

    #[test]
    fn schedule_without_process_is_rejected() {
        let mut env = Environment::default();
        let err = env
            .create_component(ComponentBuilder::new("x").schedule(5.0))
            .unwrap_err();
        assert!(matches!(err, SimError::NoProcess(_)));
    }

    #[test]
    fn spawned_component_runs_and_terminates() {
        let mut env = Environment::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let c = env
            .spawn(
                "worker",
                Script::new()
                    .then(|env, me| env.hold(me, 3.0))
                    .then(move |env, _| {
                        l.borrow_mut().push(env.now());
                        Ok(())
                    }),
            )
            .unwrap();
        assert!(env.component(c).unwrap().is_scheduled());

        let summary = env.run().unwrap();
        assert_eq!(*log.borrow(), vec![3.0]);
        assert!(env.component(c).unwrap().is_data());
        assert!(!env.component(c).unwrap().has_process());
        assert!(summary.exhausted);
        assert_eq!(env.now(), 3.0);
    }

    #[test]
    fn run_until_stops_at_horizon() {
        let mut env = Environment::default();
        env.spawn_repeated(
            "ticker",
            process_fn(|env, me| {
                env.hold(me, 1.0)?;
                Ok(ProcessStatus::Suspended)
            }),
        )
        .unwrap();
        let summary = env.run_until(10.5).unwrap();
        assert_eq!(env.now(), 10.5);
        assert!(!summary.exhausted);
        assert_eq!(env.current(), Some(env.main()));

        env.run_for(2.0).unwrap();
        assert_eq!(env.now(), 12.5);
    }

    #[test]
    fn run_until_in_past_fails() {
        let mut env = Environment::default();
        env.run_until(5.0).unwrap();
        let err = env.run_until(1.0).unwrap_err();
        assert!(matches!(err, SimError::ScheduledInPast { .. }));
    }

    #[test]
    fn same_time_events_follow_priority_then_fifo() {
        let mut env = Environment::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, prio) in [("a", 0), ("b", 5), ("c", 0), ("d", 5)] {
            let o = Rc::clone(&order);
            env.create_component(
                ComponentBuilder::new(name)
                    .process(process_fn(move |_, _| {
                        o.borrow_mut().push(name);
                        Ok(ProcessStatus::Finished)
                    }))
                    .schedule(Schedule::at(1.0).with_priority(prio)),
            )
            .unwrap();
        }
        env.run().unwrap();
        assert_eq!(*order.borrow(), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn urgent_schedule_goes_first() {
        let mut env = Environment::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, urgent) in [("late", false), ("urgent", true)] {
            let o = Rc::clone(&order);
            let mut schedule = Schedule::at(2.0);
            if urgent {
                schedule = schedule.urgent();
            }
            env.create_component(
                ComponentBuilder::new(name)
                    .process(process_fn(move |_, _| {
                        o.borrow_mut().push(name);
                        Ok(ProcessStatus::Finished)
                    }))
                    .schedule(schedule),
            )
            .unwrap();
        }
        env.run().unwrap();
        assert_eq!(*order.borrow(), vec!["urgent", "late"]);
    }

    #[test]
    fn suspended_while_current_is_an_error() {
        let mut env = Environment::default();
        env.spawn(
            "liar",
            process_fn(|_, _| Ok(ProcessStatus::Suspended)),
        )
        .unwrap();
        let err = env.run().unwrap_err();
        assert!(matches!(err, SimError::SuspendedWhileCurrent(name) if name == "liar"));
        assert_eq!(env.current(), Some(env.main()));
    }

    #[test]
    fn idle_repeated_process_is_an_error() {
        let mut env = Environment::default();
        env.spawn_repeated("spin", process_fn(|_, _| Ok(ProcessStatus::Finished)))
            .unwrap();
        let err = env.run().unwrap_err();
        assert!(matches!(err, SimError::IdleRepeatedProcess(_)));
    }

    #[test]
    fn finished_after_suspending_terminates_on_next_dispatch() {
        let mut env = Environment::default();
        let c = env
            .spawn(
                "short",
                process_fn(|env, me| {
                    env.hold(me, 4.0)?;
                    Ok(ProcessStatus::Finished)
                }),
            )
            .unwrap();
        env.run_until(2.0).unwrap();
        assert!(env.component(c).unwrap().is_scheduled());
        env.run().unwrap();
        assert!(env.component(c).unwrap().is_data());
        assert_eq!(env.now(), 4.0);
    }

    #[test]
    fn stop_ends_run_early() {
        let mut env = Environment::default();
        env.spawn(
            "stopper",
            Script::new()
                .then(|env, me| env.hold(me, 7.0))
                .then(|env, _| env.stop()),
        )
        .unwrap();
        env.spawn(
            "later",
            Script::new().then(|env, me| env.hold(me, 100.0)),
        )
        .unwrap();
        let summary = env.run().unwrap();
        assert_eq!(env.now(), 7.0);
        assert!(!summary.exhausted);
    }

    #[test]
    fn state_changes_are_traced() {
        let mut env = Environment::default();
        let c = env
            .spawn("traced", Script::new().then(|env, me| env.hold(me, 1.0)))
            .unwrap();
        env.run().unwrap();
        let transitions: Vec<_> = env
            .events()
            .events(EventKind::StateChanged)
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::StateChanged {
                    component, to, ..
                } if *component == c => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                ComponentState::Scheduled,
                ComponentState::Current,
                ComponentState::Scheduled,
                ComponentState::Current,
                ComponentState::Data,
            ]
        );
    }

    #[test]
    fn fingerprint_is_reproducible() {
        fn model(seed: u64) -> u64 {
            let mut env = Environment::with_seed(seed);
            for i in 0..5 {
                env.spawn(
                    format!("c{i}"),
                    process_fn(move |env, me| {
                        let delay = env.rng().exponential(2.0);
                        env.hold(me, delay)?;
                        Ok(ProcessStatus::Finished)
                    }),
                )
                .unwrap();
            }
            env.run().unwrap();
            env.fingerprint()
        }
        assert_eq!(model(1), model(1));
        assert_ne!(model(1), model(2));
    }
}
