//! Primitives that make components wait on each other: joining on other
//! components' termination, collecting batches from a shared waiting line
//! and picking one resource out of several.
//!
//! All three are built on the state and resource machinery. A join waits
//! on the lifecycle states of its targets, a batch waits on the length of
//! a [`SharedQueue`], and a resource selection only decides where the
//! following request goes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::ComponentState;
use crate::engine::Environment;
use crate::error::{SimError, SimResult};
use crate::id::{ComponentId, Priority, QueueId, ResourceId, SimTime};
use crate::queue::ComponentQueue;
use crate::resource::Resource;
use crate::state::{State, Wait};

// ---------------------------------------------------------------------------
// Shared queues
// ---------------------------------------------------------------------------

/// A waiting line owned by the environment whose length is published as a
/// state, so components can wait for it to fill.
#[derive(Debug)]
pub struct SharedQueue {
    pub(crate) queue: ComponentQueue,
    pub(crate) length: State<usize>,
}

impl SharedQueue {
    pub fn queue(&self) -> &ComponentQueue {
        &self.queue
    }

    pub fn length(&self) -> State<usize> {
        self.length
    }
}

/// How [`Environment::select_resource`] picks among candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceSelectionPolicy {
    /// Fewest requesters, the first candidate on ties.
    ShortestQueue,
    /// Cycle through the candidates, one position per call.
    RoundRobin,
    /// First candidate with enough available. Goes on standby when none has.
    FirstAvailable,
    /// Any candidate, uniformly.
    #[default]
    RandomOrder,
    /// Any candidate with enough available, uniformly.
    RandomAvailable,
}

impl Environment {
    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// The lifecycle of `id` as a state, created on first use. It follows
    /// every transition of the component from then on.
    pub fn lifecycle_state(&mut self, id: ComponentId) -> SimResult<State<ComponentState>> {
        let component = self.comp(id)?;
        if let Some(state) = component.lifecycle {
            return Ok(State::from_id(state));
        }
        let name = format!("state of {}", component.name);
        let current = component.state;
        let state = self.create_state(name, current);
        self.comp_mut(id)?.lifecycle = Some(state.id());
        Ok(state)
    }

    /// Suspend `id` until every one of `components` is DATA. Components
    /// that already terminated count right away; an empty list continues at
    /// the next step.
    pub fn join(&mut self, id: ComponentId, components: &[ComponentId]) -> SimResult<()> {
        let Some((&first, rest)) = components.split_first() else {
            return self.hold(id, 0.0);
        };
        let mut wait = Wait::on(self.lifecycle_state(first)?, ComponentState::Data);
        for &other in rest {
            wait = wait.and(self.lifecycle_state(other)?, ComponentState::Data);
        }
        debug!(component = %self.name_of(id), targets = components.len(), "joining");
        self.wait(id, wait)
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    pub fn create_queue(&mut self, name: impl Into<String>) -> QueueId {
        let name = name.into();
        let now = self.now();
        let tracked = self.config().tracking.queue_statistics;
        let length = self.create_state(format!("length of {name}"), 0usize);
        self.queues.insert(SharedQueue {
            queue: ComponentQueue::with_tracking(name, now, tracked),
            length,
        })
    }

    pub fn shared_queue(&self, id: QueueId) -> Option<&SharedQueue> {
        self.queues.get(id)
    }

    /// Add `item` to the queue and release anyone waiting for its length.
    pub fn enqueue(&mut self, queue: QueueId, item: ComponentId, priority: impl Into<Priority>) -> SimResult<()> {
        let now = self.now();
        let shared = self.queues.get_mut(queue).ok_or(SimError::UnknownQueue(queue))?;
        shared.queue.add(item, priority.into(), now)?;
        let (length, len) = (shared.length, shared.queue.len());
        self.set_state(length, len)
    }

    /// Take the head of the queue, if any.
    pub fn dequeue(&mut self, queue: QueueId) -> SimResult<Option<ComponentId>> {
        Ok(self.take_batch(queue, 1)?.pop())
    }

    /// Suspend `id` until the queue holds at least `size` items, or until
    /// `timeout` has passed. After a timeout the component comes back with
    /// `failed()` set and [`take_batch`](Self::take_batch) hands over
    /// whatever is there.
    pub fn batch(&mut self, id: ComponentId, queue: QueueId, size: usize, timeout: Option<SimTime>) -> SimResult<()> {
        if size == 0 {
            return Err(SimError::EmptyBatch);
        }
        let length = self.queues.get(queue).ok_or(SimError::UnknownQueue(queue))?.length;
        let mut wait = Wait::until(length, move |len: &usize| *len >= size);
        if let Some(timeout) = timeout {
            wait = wait.fail_delay(timeout);
        }
        self.wait(id, wait)
    }

    /// Remove up to `size` items from the head of the queue. Returns fewer
    /// when the queue is shorter, for instance after a timed out batch or
    /// when another consumer got there first.
    pub fn take_batch(&mut self, queue: QueueId, size: usize) -> SimResult<Vec<ComponentId>> {
        let now = self.now();
        let shared = self.queues.get_mut(queue).ok_or(SimError::UnknownQueue(queue))?;
        let taken: Vec<ComponentId> = std::iter::from_fn(|| shared.queue.poll(now)).take(size).collect();
        let (length, len) = (shared.length, shared.queue.len());
        self.set_state(length, len)?;
        Ok(taken)
    }

    // -----------------------------------------------------------------------
    // Resource selection
    // -----------------------------------------------------------------------

    /// Pick one of `resources` for `id` to request `quantity` from.
    ///
    /// Returns `None` only under [`ResourceSelectionPolicy::FirstAvailable`]
    /// when no candidate has `quantity` available. The component is then on
    /// standby and should select again when it resumes.
    pub fn select_resource(
        &mut self,
        id: ComponentId,
        resources: &[ResourceId],
        quantity: f64,
        policy: ResourceSelectionPolicy,
    ) -> SimResult<Option<ResourceId>> {
        if resources.is_empty() {
            return Err(SimError::EmptySelection);
        }
        for &r in resources {
            self.res(r)?;
        }
        let fits = |res: &Resource| res.available() >= quantity;

        let selected = match policy {
            ResourceSelectionPolicy::ShortestQueue => resources
                .iter()
                .copied()
                .min_by_key(|&r| self.resources[r].requesters().len()),
            ResourceSelectionPolicy::RoundRobin => {
                let cursor = self
                    .selection_cursors
                    .entry((id, resources.to_vec()))
                    .or_insert(0);
                let picked = resources[*cursor % resources.len()];
                *cursor = (*cursor + 1) % resources.len();
                Some(picked)
            }
            ResourceSelectionPolicy::FirstAvailable => {
                let found = resources.iter().copied().find(|&r| fits(&self.resources[r]));
                if found.is_none() {
                    self.standby(id)?;
                }
                found
            }
            ResourceSelectionPolicy::RandomOrder => {
                let index = self.rng().discrete_uniform(0, resources.len() as i64 - 1);
                Some(resources[index as usize])
            }
            ResourceSelectionPolicy::RandomAvailable => {
                let open: Vec<ResourceId> = resources.iter().copied().filter(|&r| fits(&self.resources[r])).collect();
                if open.is_empty() {
                    return Err(SimError::NoneAvailable { quantity });
                }
                let index = self.rng().discrete_uniform(0, open.len() as i64 - 1);
                Some(open[index as usize])
            }
        };
        if let Some(r) = selected {
            debug!(component = %self.name_of(id), resource = self.resources[r].name(), ?policy, "resource selected");
        }
        Ok(selected)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ProcessStatus, Script, process_fn};
    use crate::test_utils::claim_hold_release;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sleeper(env: &mut Environment, name: &str, duration: f64) -> ComponentId {
        env.spawn(name, Script::new().then(move |env, me| env.hold(me, duration)))
            .unwrap()
    }

    #[test]
    fn join_returns_after_all_children_terminate() {
        let mut env = Environment::default();
        let children = Rc::new(RefCell::new(Vec::new()));
        let resumed = Rc::new(RefCell::new(None));
        let (kids, woke) = (Rc::clone(&children), Rc::clone(&resumed));
        let parent = env
            .spawn(
                "parent",
                process_fn(move |env, me| {
                    if !kids.borrow().is_empty() {
                        *woke.borrow_mut() = Some(env.now());
                        return Ok(ProcessStatus::Finished);
                    }
                    let spawned = vec![sleeper(env, "short", 3.0), sleeper(env, "long", 5.0)];
                    env.join(me, &spawned)?;
                    *kids.borrow_mut() = spawned;
                    Ok(ProcessStatus::Suspended)
                }),
            )
            .unwrap();
        env.run_until(4.0).unwrap();
        assert!(env.component(parent).unwrap().is_waiting());
        assert_eq!(*resumed.borrow(), None);

        env.run().unwrap();
        assert_eq!(*resumed.borrow(), Some(5.0));
        for &child in children.borrow().iter() {
            assert!(env.component(child).unwrap().is_data());
        }
        assert!(env.component(parent).unwrap().is_data());
    }

    #[test]
    fn join_on_terminated_components_continues_now() {
        let mut env = Environment::default();
        let done = env.create_data_component("done");
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        env.spawn(
            "parent",
            Script::new()
                .then(|env, me| env.hold(me, 2.0))
                .then(move |env, me| env.join(me, &[done]))
                .then(move |env, _| {
                    l.borrow_mut().push(env.now());
                    Ok(())
                }),
        )
        .unwrap();
        env.run().unwrap();
        assert_eq!(*log.borrow(), vec![2.0]);
    }

    #[test]
    fn lifecycle_state_follows_transitions() {
        let mut env = Environment::default();
        let c = sleeper(&mut env, "worker", 4.0);
        let lifecycle = env.lifecycle_state(c).unwrap();
        assert_eq!(env.lifecycle_state(c).unwrap(), lifecycle);
        assert_eq!(*env.state_value(lifecycle).unwrap(), ComponentState::Scheduled);
        env.run_until(1.0).unwrap();
        assert_eq!(*env.state_value(lifecycle).unwrap(), ComponentState::Scheduled);
        env.run().unwrap();
        assert_eq!(*env.state_value(lifecycle).unwrap(), ComponentState::Data);
    }

    fn consumer(
        env: &mut Environment,
        queue: QueueId,
        size: usize,
        timeout: Option<SimTime>,
    ) -> (ComponentId, Rc<RefCell<Vec<(SimTime, usize, bool)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let c = env
            .spawn(
                "consumer",
                Script::new()
                    .then(move |env, me| env.batch(me, queue, size, timeout))
                    .then(move |env, me| {
                        let failed = env.component(me).unwrap().failed();
                        let taken = env.take_batch(queue, size)?;
                        l.borrow_mut().push((env.now(), taken.len(), failed));
                        Ok(())
                    }),
            )
            .unwrap();
        (c, log)
    }

    fn producer(env: &mut Environment, queue: QueueId, arrivals: &'static [f64]) {
        let mut script = Script::new();
        let mut last = 0.0;
        for &at in arrivals {
            let gap = at - last;
            last = at;
            script = script
                .then(move |env, me| env.hold(me, gap))
                .then(move |env, _| {
                    let item = env.create_data_component("item");
                    env.enqueue(queue, item, 0)
                });
        }
        env.spawn("producer", script).unwrap();
    }

    #[test]
    fn batch_is_released_when_full() {
        let mut env = Environment::default();
        let q = env.create_queue("parts");
        let (_, log) = consumer(&mut env, q, 3, None);
        producer(&mut env, q, &[1.0, 2.0, 4.0, 6.0]);
        env.run().unwrap();
        assert_eq!(*log.borrow(), vec![(4.0, 3, false)]);
        assert_eq!(env.shared_queue(q).unwrap().queue().len(), 1);
        let length = env.shared_queue(q).unwrap().length();
        assert_eq!(*env.state_value(length).unwrap(), 1);
    }

    #[test]
    fn batch_times_out_with_partial_batch() {
        let mut env = Environment::default();
        let q = env.create_queue("parts");
        let (_, log) = consumer(&mut env, q, 3, Some(5.0));
        producer(&mut env, q, &[1.0, 2.0, 8.0]);
        env.run().unwrap();
        assert_eq!(*log.borrow(), vec![(5.0, 2, true)]);
        assert_eq!(env.shared_queue(q).unwrap().queue().len(), 1);
    }

    #[test]
    fn batch_of_zero_is_rejected() {
        let mut env = Environment::default();
        let q = env.create_queue("parts");
        let c = env.create_data_component("c");
        assert_eq!(env.batch(c, q, 0, None), Err(SimError::EmptyBatch));
    }

    #[test]
    fn dequeue_takes_the_head() {
        let mut env = Environment::default();
        let q = env.create_queue("line");
        let a = env.create_data_component("a");
        let b = env.create_data_component("b");
        env.enqueue(q, a, 0).unwrap();
        env.enqueue(q, b, 5).unwrap();
        assert_eq!(env.dequeue(q).unwrap(), Some(b));
        assert_eq!(env.dequeue(q).unwrap(), Some(a));
        assert_eq!(env.dequeue(q).unwrap(), None);
    }

    fn three_clerks(env: &mut Environment) -> [ResourceId; 3] {
        ["a", "b", "c"].map(|name| env.create_resource(name, 1.0).unwrap())
    }

    #[test]
    fn round_robin_cycles_per_component() {
        let mut env = Environment::default();
        let rs = three_clerks(&mut env);
        let c = env.create_data_component("picker");
        let other = env.create_data_component("other");
        let picks: Vec<ResourceId> = (0..4)
            .map(|_| {
                env.select_resource(c, &rs, 1.0, ResourceSelectionPolicy::RoundRobin)
                    .unwrap()
                    .unwrap()
            })
            .collect();
        assert_eq!(picks, vec![rs[0], rs[1], rs[2], rs[0]]);
        let first = env
            .select_resource(other, &rs, 1.0, ResourceSelectionPolicy::RoundRobin)
            .unwrap();
        assert_eq!(first, Some(rs[0]));
    }

    #[test]
    fn shortest_queue_prefers_fewest_requesters() {
        let mut env = Environment::default();
        let rs = three_clerks(&mut env);
        for (i, &r) in rs.iter().enumerate().take(2) {
            env.spawn(format!("holder.{i}"), claim_hold_release(r, 1.0, 10.0)).unwrap();
            env.spawn(format!("waiter.{i}"), claim_hold_release(r, 1.0, 10.0)).unwrap();
        }
        env.spawn("holder.2", claim_hold_release(rs[2], 1.0, 10.0)).unwrap();
        env.run_until(1.0).unwrap();
        let c = env.create_data_component("picker");
        let picked = env
            .select_resource(c, &rs, 1.0, ResourceSelectionPolicy::ShortestQueue)
            .unwrap();
        assert_eq!(picked, Some(rs[2]));
    }

    #[test]
    fn random_available_skips_full_resources() {
        let mut env = Environment::with_seed(11);
        let rs = three_clerks(&mut env);
        env.spawn("hog.a", claim_hold_release(rs[0], 1.0, 10.0)).unwrap();
        env.spawn("hog.c", claim_hold_release(rs[2], 1.0, 10.0)).unwrap();
        env.run_until(1.0).unwrap();
        let c = env.create_data_component("picker");
        for _ in 0..20 {
            let picked = env
                .select_resource(c, &rs, 1.0, ResourceSelectionPolicy::RandomAvailable)
                .unwrap();
            assert_eq!(picked, Some(rs[1]));
        }
        let err = env
            .select_resource(c, &rs, 2.0, ResourceSelectionPolicy::RandomAvailable)
            .unwrap_err();
        assert_eq!(err, SimError::NoneAvailable { quantity: 2.0 });
    }

    #[test]
    fn random_order_reaches_every_candidate() {
        let mut env = Environment::with_seed(3);
        let rs = three_clerks(&mut env);
        let c = env.create_data_component("picker");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..60 {
            let picked = env
                .select_resource(c, &rs, 1.0, ResourceSelectionPolicy::RandomOrder)
                .unwrap()
                .unwrap();
            seen.insert(picked);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn first_available_stands_by_until_a_resource_frees_up() {
        let mut env = Environment::default();
        let [a, b, _] = three_clerks(&mut env);
        env.spawn("hog.a", claim_hold_release(a, 1.0, 3.0)).unwrap();
        env.spawn("hog.b", claim_hold_release(b, 1.0, 5.0)).unwrap();
        let chosen = Rc::new(RefCell::new(None));
        let record = Rc::clone(&chosen);
        env.spawn(
            "picker",
            process_fn(move |env, me| {
                match env.select_resource(me, &[a, b], 1.0, ResourceSelectionPolicy::FirstAvailable)? {
                    None => {}
                    Some(r) => {
                        *record.borrow_mut() = Some((r, env.now()));
                        env.passivate(me)?;
                    }
                }
                Ok(ProcessStatus::Suspended)
            }),
        )
        .unwrap();
        env.run().unwrap();
        assert_eq!(*chosen.borrow(), Some((a, 3.0)));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let mut env = Environment::default();
        let c = env.create_data_component("picker");
        assert_eq!(
            env.select_resource(c, &[], 1.0, ResourceSelectionPolicy::ShortestQueue),
            Err(SimError::EmptySelection)
        );
    }
}
