//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{ComponentBuilder, Schedule, Script};
use crate::config::SimConfig;
use crate::engine::Environment;
use crate::event::{EventKind, TraceEvent};
use crate::id::{ComponentId, ResourceId, SimTime};
use crate::resource::{HonorPolicy, Request, ResourceBuilder};

// ===========================================================================
// Environments
// ===========================================================================

/// An environment with trace events enabled and the given seed.
pub fn env(seed: u64) -> Environment {
    let mut config = SimConfig::with_seed(seed);
    config.tracking.trace_events = true;
    Environment::new(config)
}

// ===========================================================================
// Recorders
// ===========================================================================

/// Record every component that gets a claim on `resource`, in claim order.
pub fn record_claims(env: &mut Environment, resource: ResourceId) -> Rc<RefCell<Vec<ComponentId>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    env.events_mut().on_event(
        EventKind::ResourceClaimed,
        Box::new(move |event| {
            if let TraceEvent::ResourceClaimed {
                resource: r,
                component,
                ..
            } = event
                && *r == resource
            {
                sink.borrow_mut().push(*component);
            }
        }),
    );
    log
}

/// Record every `(time, component)` pair the event queue dispatches.
pub fn record_dispatches(env: &mut Environment) -> Rc<RefCell<Vec<(SimTime, ComponentId)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    env.events_mut().on_event(
        EventKind::StateChanged,
        Box::new(move |event| {
            if let TraceEvent::StateChanged {
                component,
                to: crate::component::ComponentState::Current,
                time,
                ..
            } = event
            {
                sink.borrow_mut().push((*time, *component));
            }
        }),
    );
    log
}

// ===========================================================================
// Process helpers
// ===========================================================================

/// Request `quantity` of `resource`, then go passive and keep the claim.
pub fn claim_and_keep(resource: ResourceId, quantity: f64) -> Script {
    Script::new()
        .then(move |env, me| env.request(me, Request::quantity(resource, quantity)))
        .then(|env, me| env.passivate(me))
}

/// Request `quantity`, hold for `duration`, release.
pub fn claim_hold_release(resource: ResourceId, quantity: f64, duration: SimTime) -> Script {
    Script::new()
        .then(move |env, me| env.request(me, Request::quantity(resource, quantity)))
        .then(move |env, me| env.hold(me, duration))
        .then(move |env, me| env.release(me, resource, None))
}

/// Spawn a component that starts running `process` at `at`.
pub fn spawn_at(env: &mut Environment, name: &str, at: SimTime, process: Script) -> ComponentId {
    env.create_component(
        ComponentBuilder::new(name)
            .process(process)
            .schedule(Schedule::at(at)),
    )
    .unwrap_or_else(|e| panic!("spawn {name}: {e}"))
}

// ===========================================================================
// Honor policy scenario
// ===========================================================================

/// Arrival time and quantity of each customer in the policy scenario.
pub const POLICY_CUSTOMERS: [(SimTime, f64); 6] =
    [(1.0, 5.0), (6.0, 6.0), (15.0, 3.0), (24.0, 1.0), (30.0, 3.0), (37.0, 2.0)];

/// Run the policy scenario and return the 1-based customer numbers in the
/// order they were honored.
///
/// A manager claims the whole capacity of 20 at t=0, holds until t=20, and
/// then returns 4 units every 4 time units. Customers keep what they get.
pub fn honor_order(policy: HonorPolicy) -> Vec<usize> {
    let mut env = env(0);
    let r = env
        .create_resource_with(ResourceBuilder::new("counter", 20.0).honor_policy(policy))
        .unwrap_or_else(|e| panic!("resource: {e}"));

    let mut manager = Script::new()
        .then(move |env, me| env.request(me, Request::quantity(r, 20.0)))
        .then(|env, me| env.hold(me, 20.0));
    for i in 0..5 {
        manager = manager.then(move |env, me| env.release(me, r, Some(4.0)));
        if i < 4 {
            manager = manager.then(|env, me| env.hold(me, 4.0));
        }
    }
    let manager = env
        .spawn("manager", manager)
        .unwrap_or_else(|e| panic!("manager: {e}"));

    let customers: Vec<ComponentId> = POLICY_CUSTOMERS
        .iter()
        .enumerate()
        .map(|(i, &(at, q))| spawn_at(&mut env, &format!("customer.{}", i + 1), at, claim_and_keep(r, q)))
        .collect();

    let claims = record_claims(&mut env, r);
    env.run().unwrap_or_else(|e| panic!("run: {e}"));

    let claimed = claims.borrow();
    claimed
        .iter()
        .filter(|c| **c != manager)
        .filter_map(|c| customers.iter().position(|x| x == c).map(|i| i + 1))
        .collect()
}
