//! Components: lifecycle states, process bodies and the per-component record.
//!
//! A component's behavior is an explicit state machine. The engine calls
//! [`Process::resume`] whenever the component is dispatched; the process
//! runs until it invokes a suspension primitive (`hold`, `request`, `wait`,
//! `passivate`, `standby`) and returns [`ProcessStatus::Suspended`], or
//! until it is done and returns [`ProcessStatus::Finished`].
//!
//! The variant is chosen at construction through [`Behavior`]: a process
//! that runs once and then terminates, a process that restarts every time
//! it finishes, or no process at all (a DATA component).

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::engine::Environment;
use crate::error::SimResult;
use crate::id::{ComponentId, Priority, ResourceId, SimTime, StateId};

// ---------------------------------------------------------------------------
// Lifecycle states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Not scheduled and not waiting on anything.
    Data,
    /// The one component whose process is executing.
    Current,
    /// Re-run once per step without advancing time.
    Standby,
    /// Suspended until activated by someone else.
    Passive,
    /// Suspended in place; see `interrupt`/`resume`.
    Interrupted,
    /// Waiting for a point in time.
    Scheduled,
    /// Waiting for resources.
    Requesting,
    /// Waiting for state predicates.
    Waiting,
}

/// Why a component is being put on the event queue. Decides the state it
/// ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleReason {
    Activate,
    Hold,
    Request,
    Wait,
}

impl ScheduleReason {
    pub(crate) fn state(self) -> ComponentState {
        match self {
            ScheduleReason::Activate | ScheduleReason::Hold => ComponentState::Scheduled,
            ScheduleReason::Request => ComponentState::Requesting,
            ScheduleReason::Wait => ComponentState::Waiting,
        }
    }
}

// ---------------------------------------------------------------------------
// Process contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// A suspension primitive was invoked; resume me when I'm dispatched.
    Suspended,
    /// The body is exhausted.
    Finished,
}

/// A resumable unit of work owned by a component.
pub trait Process {
    fn resume(&mut self, env: &mut Environment, me: ComponentId) -> SimResult<ProcessStatus>;

    /// Rewind to the beginning. Called when a DATA component is
    /// re-activated with its previous process.
    fn reset(&mut self) {}
}

impl<F> Process for F
where
    F: FnMut(&mut Environment, ComponentId) -> SimResult<ProcessStatus>,
{
    fn resume(&mut self, env: &mut Environment, me: ComponentId) -> SimResult<ProcessStatus> {
        self(env, me)
    }
}

/// Pin a closure to the [`Process`] signature so its argument types are
/// inferred at the call site.
pub fn process_fn<F>(f: F) -> F
where
    F: FnMut(&mut Environment, ComponentId) -> SimResult<ProcessStatus>,
{
    f
}

/// How a component's process is driven.
pub enum Behavior {
    /// Run once; the component terminates when the process finishes.
    Process(Box<dyn Process>),
    /// Restart the process each time it finishes.
    Repeated(Box<dyn Process>),
}

impl Behavior {
    pub fn once(process: impl Process + 'static) -> Self {
        Behavior::Process(Box::new(process))
    }

    pub fn repeated(process: impl Process + 'static) -> Self {
        Behavior::Repeated(Box::new(process))
    }

    pub(crate) fn process_mut(&mut self) -> &mut dyn Process {
        match self {
            Behavior::Process(p) | Behavior::Repeated(p) => p.as_mut(),
        }
    }

    pub(crate) fn is_repeated(&self) -> bool {
        matches!(self, Behavior::Repeated(_))
    }

    pub(crate) fn reset(&mut self) {
        self.process_mut().reset();
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Process(_) => write!(f, "Process(<fn>)"),
            Behavior::Repeated(_) => write!(f, "Repeated(<fn>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Script: a process written as a list of steps
// ---------------------------------------------------------------------------

type ScriptStep = Box<dyn FnMut(&mut Environment, ComponentId) -> SimResult<()>>;

/// A process assembled from sequential steps.
///
/// Each resume runs steps in order until one of them leaves the component
/// in a state other than CURRENT (i.e. it suspended), so a step that calls
/// `hold` marks a yield point. After the last step the script reports
/// [`ProcessStatus::Finished`] and rewinds, which makes it usable with
/// [`Behavior::Repeated`].
///
/// ```ignore
/// let script = Script::new()
///     .then(move |env, me| env.request(me, Request::on(counter)))
///     .then(|env, me| env.hold(me, 5.0))
///     .then(move |env, me| env.release(me, counter, None));
/// ```
#[derive(Default)]
pub struct Script {
    steps: Vec<ScriptStep>,
    next: usize,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<F>(mut self, step: F) -> Self
    where
        F: FnMut(&mut Environment, ComponentId) -> SimResult<()> + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Run the steps of `other` after these.
    pub fn append(mut self, other: Script) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Process for Script {
    fn resume(&mut self, env: &mut Environment, me: ComponentId) -> SimResult<ProcessStatus> {
        loop {
            let Some(step) = self.steps.get_mut(self.next) else {
                self.next = 0;
                return Ok(ProcessStatus::Finished);
            };
            self.next += 1;
            step(env, me)?;
            if env.component(me).map(|c| c.state()) != Some(ComponentState::Current) {
                return Ok(ProcessStatus::Suspended);
            }
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

// ---------------------------------------------------------------------------
// Scheduling options
// ---------------------------------------------------------------------------

/// When and how to put a component on the event queue.
///
/// The wake time is `at.unwrap_or(now) + delay`. A bare `f64` converts to a
/// delay, so `env.hold(me, 5.0)` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub(crate) at: Option<SimTime>,
    pub(crate) delay: SimTime,
    pub(crate) priority: Priority,
    pub(crate) urgent: bool,
}

impl Schedule {
    /// Wake at the current time.
    pub fn now() -> Self {
        Self {
            at: None,
            delay: 0.0,
            priority: Priority::NORMAL,
            urgent: false,
        }
    }

    pub fn after(delay: SimTime) -> Self {
        Self {
            delay,
            ..Self::now()
        }
    }

    pub fn at(time: SimTime) -> Self {
        Self {
            at: Some(time),
            ..Self::now()
        }
    }

    /// Add a delay on top of the base time.
    pub fn delayed(mut self, delay: SimTime) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Sort ahead of other wake-ups with the same time and priority.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub(crate) fn resolve(&self, now: SimTime) -> SimTime {
        self.at.unwrap_or(now) + self.delay
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::now()
    }
}

impl From<SimTime> for Schedule {
    fn from(delay: SimTime) -> Self {
        Schedule::after(delay)
    }
}

// ---------------------------------------------------------------------------
// Component record
// ---------------------------------------------------------------------------

/// A pending or granted quantity on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceClaim {
    pub resource: ResourceId,
    pub quantity: f64,
    pub priority: Priority,
    pub since: SimTime,
}

pub(crate) type WaitPredicate = Box<dyn Fn(&dyn Any) -> bool>;

/// One registered state predicate.
pub(crate) struct StateWait {
    pub state: StateId,
    pub predicate: WaitPredicate,
    pub priority: Priority,
}

impl std::fmt::Debug for StateWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWait")
            .field("state", &self.state)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The engine's record of a component.
#[derive(Debug)]
pub struct Component {
    pub(crate) name: String,
    pub(crate) state: ComponentState,
    pub(crate) behavior: Option<Behavior>,
    /// Process kept after cancel/terminate so a later `activate` can rerun it.
    pub(crate) last_behavior: Option<Behavior>,
    /// Bumped whenever `behavior` is replaced or cleared, so a running
    /// process can tell it no longer owns the slot.
    pub(crate) process_epoch: u64,
    /// The process finished while suspended; terminate on next dispatch.
    pub(crate) exhausted: bool,
    pub(crate) scheduled_time: Option<SimTime>,
    pub(crate) remaining_duration: Option<SimTime>,
    pub(crate) interrupt_level: u32,
    pub(crate) interrupted_state: Option<ComponentState>,
    pub(crate) requests: Vec<ResourceClaim>,
    pub(crate) claims: Vec<ResourceClaim>,
    pub(crate) one_of: bool,
    pub(crate) waits: Vec<StateWait>,
    pub(crate) wait_all: bool,
    pub(crate) failed: bool,
    pub(crate) created_at: SimTime,
    /// Mirror of `state` as a simulation state, created on first join.
    pub(crate) lifecycle: Option<StateId>,
}

impl Component {
    pub(crate) fn new(name: String, now: SimTime) -> Self {
        Self {
            name,
            state: ComponentState::Data,
            behavior: None,
            last_behavior: None,
            process_epoch: 0,
            exhausted: false,
            scheduled_time: None,
            remaining_duration: None,
            interrupt_level: 0,
            interrupted_state: None,
            requests: Vec::new(),
            claims: Vec::new(),
            one_of: false,
            waits: Vec::new(),
            wait_all: true,
            failed: false,
            created_at: now,
            lifecycle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn scheduled_time(&self) -> Option<SimTime> {
        self.scheduled_time
    }

    /// Saved time-to-go of a passivated or interrupted component.
    pub fn remaining_duration(&self) -> Option<SimTime> {
        self.remaining_duration
    }

    pub fn interrupt_level(&self) -> u32 {
        self.interrupt_level
    }

    /// The last request or wait timed out before being honored.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    pub fn has_process(&self) -> bool {
        self.behavior.is_some()
    }

    pub fn claims(&self) -> &[ResourceClaim] {
        &self.claims
    }

    pub fn requests(&self) -> &[ResourceClaim] {
        &self.requests
    }

    /// Quantity currently claimed from `resource`.
    pub fn claimed(&self, resource: ResourceId) -> f64 {
        self.claim(resource).map(|c| c.quantity).unwrap_or(0.0)
    }

    pub fn is_claiming(&self, resource: ResourceId) -> bool {
        self.claim(resource).is_some()
    }

    /// Whether the component no longer holds `resource`, e.g. after
    /// preemption by a higher-priority request.
    pub fn is_bumped(&self, resource: ResourceId) -> bool {
        !self.is_claiming(resource)
    }

    pub fn is_waiting_on(&self, state: StateId) -> bool {
        self.waits.iter().any(|w| w.state == state)
    }

    pub fn is_data(&self) -> bool {
        self.state == ComponentState::Data
    }

    pub fn is_current(&self) -> bool {
        self.state == ComponentState::Current
    }

    pub fn is_passive(&self) -> bool {
        self.state == ComponentState::Passive
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == ComponentState::Scheduled
    }

    pub fn is_requesting(&self) -> bool {
        self.state == ComponentState::Requesting
    }

    pub fn is_waiting(&self) -> bool {
        self.state == ComponentState::Waiting
    }

    pub fn is_standby(&self) -> bool {
        self.state == ComponentState::Standby
    }

    pub fn is_interrupted(&self) -> bool {
        self.state == ComponentState::Interrupted
    }

    pub(crate) fn claim(&self, resource: ResourceId) -> Option<&ResourceClaim> {
        self.claims.iter().find(|c| c.resource == resource)
    }

    pub(crate) fn request(&self, resource: ResourceId) -> Option<&ResourceClaim> {
        self.requests.iter().find(|c| c.resource == resource)
    }

    /// Swap in a new process (or none), invalidating any running one.
    pub(crate) fn set_behavior(&mut self, behavior: Option<Behavior>) {
        self.behavior = behavior;
        self.process_epoch += 1;
        self.exhausted = false;
    }

    /// Clear the process, remembering it for a later re-activation.
    pub(crate) fn retire_behavior(&mut self) {
        if let Some(old) = self.behavior.take() {
            self.last_behavior = Some(old);
        }
        self.set_behavior(None);
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Parameters for `Environment::create_component`.
///
/// Without a behavior the component starts as DATA. With one it is scheduled
/// right away (at `now` unless a schedule is given), unless `deferred` is
/// set, in which case it waits in DATA for an explicit `activate`.
#[derive(Debug)]
pub struct ComponentBuilder {
    pub(crate) name: String,
    pub(crate) behavior: Option<Behavior>,
    pub(crate) schedule: Option<Schedule>,
    pub(crate) deferred: bool,
}

impl ComponentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: None,
            schedule: None,
            deferred: false,
        }
    }

    pub fn process(mut self, process: impl Process + 'static) -> Self {
        self.behavior = Some(Behavior::once(process));
        self
    }

    pub fn repeated(mut self, process: impl Process + 'static) -> Self {
        self.behavior = Some(Behavior::repeated(process));
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    pub fn schedule(mut self, schedule: impl Into<Schedule>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    /// Keep the process but stay DATA until activated.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_resolution() {
        assert_eq!(Schedule::now().resolve(3.0), 3.0);
        assert_eq!(Schedule::after(2.0).resolve(3.0), 5.0);
        assert_eq!(Schedule::at(10.0).resolve(3.0), 10.0);
        assert_eq!(Schedule::at(10.0).delayed(1.5).resolve(3.0), 11.5);
        let s: Schedule = 4.0.into();
        assert_eq!(s.resolve(1.0), 5.0);
    }

    #[test]
    fn schedule_builder_flags() {
        let s = Schedule::after(1.0).with_priority(3).urgent();
        assert_eq!(s.priority, Priority(3));
        assert!(s.urgent);
    }

    #[test]
    fn reasons_map_to_states() {
        assert_eq!(ScheduleReason::Hold.state(), ComponentState::Scheduled);
        assert_eq!(ScheduleReason::Activate.state(), ComponentState::Scheduled);
        assert_eq!(ScheduleReason::Request.state(), ComponentState::Requesting);
        assert_eq!(ScheduleReason::Wait.state(), ComponentState::Waiting);
    }

    #[test]
    fn fresh_record_is_data() {
        let c = Component::new("c".into(), 2.0);
        assert!(c.is_data());
        assert!(!c.has_process());
        assert_eq!(c.created_at(), 2.0);
        assert_eq!(c.interrupt_level(), 0);
    }

    #[test]
    fn set_behavior_bumps_epoch() {
        let mut c = Component::new("c".into(), 0.0);
        let before = c.process_epoch;
        c.set_behavior(Some(Behavior::once(process_fn(|_, _| {
            Ok(ProcessStatus::Finished)
        }))));
        assert!(c.has_process());
        assert!(c.process_epoch > before);
    }
}
