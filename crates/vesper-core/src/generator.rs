//! Arrival generator.
//!
//! [`ComponentGenerator`] is an ordinary [`Process`]: it samples an
//! inter-arrival time from the environment RNG, holds for it, and calls a
//! factory to create the next component. Attach it to a component with
//! [`Environment::spawn`] like any other process.

use tracing::debug;

use crate::component::{Process, ProcessStatus};
use crate::engine::Environment;
use crate::error::SimResult;
use crate::id::{ComponentId, SimTime};
use crate::rng::SimRng;

type Sampler = Box<dyn FnMut(&mut SimRng) -> SimTime>;
type Factory = Box<dyn FnMut(&mut Environment, u64) -> SimResult<ComponentId>>;

/// Creates components at sampled intervals.
///
/// ```ignore
/// let arrivals = ComponentGenerator::new(
///     |rng| rng.exponential(2.0),
///     |env, n| env.spawn(format!("customer.{n}"), customer()),
/// )
/// .total(100);
/// env.spawn("arrivals", arrivals)?;
/// ```
pub struct ComponentGenerator {
    iat: Sampler,
    factory: Factory,
    total: Option<u64>,
    until: Option<SimTime>,
    created: u64,
    holding: bool,
}

impl ComponentGenerator {
    pub fn new<S, F>(iat: S, factory: F) -> Self
    where
        S: FnMut(&mut SimRng) -> SimTime + 'static,
        F: FnMut(&mut Environment, u64) -> SimResult<ComponentId> + 'static,
    {
        Self {
            iat: Box::new(iat),
            factory: Box::new(factory),
            total: None,
            until: None,
            created: 0,
            holding: false,
        }
    }

    /// Stop after `total` components.
    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Do not create components after `until`.
    pub fn until(mut self, until: SimTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    fn exhausted(&self) -> bool {
        self.total.is_some_and(|t| self.created >= t)
    }
}

impl Process for ComponentGenerator {
    fn resume(&mut self, env: &mut Environment, me: ComponentId) -> SimResult<ProcessStatus> {
        if self.holding {
            self.holding = false;
            self.created += 1;
            let id = (self.factory)(env, self.created)?;
            debug!(generated = %env.name_of(id), time = env.now(), "arrival");
        }
        if self.exhausted() {
            return Ok(ProcessStatus::Finished);
        }
        let iat = (self.iat)(env.rng()).max(0.0);
        let next = env.now() + iat;
        if self.until.is_some_and(|until| next > until) {
            return Ok(ProcessStatus::Finished);
        }
        env.hold(me, iat)?;
        self.holding = true;
        Ok(ProcessStatus::Suspended)
    }

    fn reset(&mut self) {
        self.created = 0;
        self.holding = false;
    }
}

impl std::fmt::Debug for ComponentGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentGenerator")
            .field("total", &self.total)
            .field("until", &self.until)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}
