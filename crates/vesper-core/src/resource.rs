//! Resources: capacity accounting, requester and claimer queues, honor
//! policies and preemption.
//!
//! A component asks for quantities with [`Environment::request`]. If the
//! request can be honored right away the quantities are claimed and the
//! component is rescheduled at `now`; otherwise it sits in the resource's
//! requester queue in REQUESTING until a release (or a capacity change)
//! lets the resource's [`HonorPolicy`] pick it.
//!
//! Depletable resources have no named claimants. `take` lowers the level,
//! `put` raises it, and both may block until the level allows them.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::component::{ComponentState, ResourceClaim, Schedule, ScheduleReason, Script};
use crate::engine::Environment;
use crate::error::{SimError, SimResult};
use crate::event::TraceEvent;
use crate::id::{ComponentId, Priority, ResourceId, SimTime};
use crate::monitor::{MetricTimeline, TimelineStatistics};
use crate::queue::{ComponentQueue, QueueStatistics};

/// Tolerance used when comparing quantities against capacity.
pub const EPS: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Decides which requesters a resource inspects, and in what order, when
/// capacity frees up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum HonorPolicy {
    /// Only the head of the requester queue may be honored.
    #[default]
    StrictFCFS,
    /// Honor any requester that fits, in queue order, skipping those that
    /// don't.
    RelaxedFCFS,
    /// Requester queue ordered by quantity within priority; head only.
    SQF,
    /// Rank by `(1 - w) * arrival + w * quantity`, then scan like
    /// `RelaxedFCFS`.
    WeightedFCFS(f64),
    /// Rank by `w * arrival + (1 - w) * quantity`, then scan like
    /// `RelaxedFCFS`.
    WeightedSQF(f64),
}

impl HonorPolicy {
    pub fn weight(&self) -> Option<f64> {
        match self {
            HonorPolicy::WeightedFCFS(w) | HonorPolicy::WeightedSQF(w) => Some(*w),
            _ => None,
        }
    }

    fn head_only(&self) -> bool {
        matches!(self, HonorPolicy::StrictFCFS | HonorPolicy::SQF)
    }

    fn score(&self, enter_time: SimTime, quantity: f64) -> f64 {
        match *self {
            HonorPolicy::WeightedFCFS(w) => (1.0 - w) * enter_time + w * quantity,
            HonorPolicy::WeightedSQF(w) => w * enter_time + (1.0 - w) * quantity,
            _ => enter_time,
        }
    }

    fn validate(&self) -> SimResult<()> {
        match self.weight() {
            Some(w) if !(0.0..=1.0).contains(&w) => Err(SimError::InvalidWeight(w)),
            _ => Ok(()),
        }
    }
}

/// What to do with a request that exceeds the resource's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapacityLimitMode {
    /// Reject with [`SimError::CapacityLimit`].
    #[default]
    Fail,
    /// Leave it pending, in case the capacity is raised later.
    Schedule,
    /// Clamp a put on a depletable resource to the free headroom.
    Cap,
}

// ---------------------------------------------------------------------------
// Resource record
// ---------------------------------------------------------------------------

/// Parameters for [`Environment::create_resource_with`].
#[derive(Debug, Clone)]
pub struct ResourceBuilder {
    name: String,
    capacity: f64,
    depletable: bool,
    initial_level: Option<f64>,
    preemptive: bool,
    policy: Option<HonorPolicy>,
}

impl ResourceBuilder {
    pub fn new(name: impl Into<String>, capacity: f64) -> Self {
        Self {
            name: name.into(),
            capacity,
            depletable: false,
            initial_level: None,
            preemptive: false,
            policy: None,
        }
    }

    /// A resource without named claimants, filled to capacity unless
    /// [`initial_level`](Self::initial_level) says otherwise.
    pub fn depletable(name: impl Into<String>, capacity: f64) -> Self {
        Self {
            depletable: true,
            ..Self::new(name, capacity)
        }
    }

    pub fn initial_level(mut self, level: f64) -> Self {
        self.initial_level = Some(level);
        self
    }

    pub fn preemptive(mut self) -> Self {
        self.preemptive = true;
        self
    }

    pub fn honor_policy(mut self, policy: HonorPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

#[derive(Debug)]
pub struct Resource {
    name: String,
    capacity: f64,
    claimed: f64,
    preemptive: bool,
    depletable: bool,
    policy: HonorPolicy,
    pub(crate) requesters: ComponentQueue,
    pub(crate) claimers: ComponentQueue,
    claimed_timeline: MetricTimeline,
    available_timeline: MetricTimeline,
    capacity_timeline: MetricTimeline,
    occupancy_timeline: MetricTimeline,
}

/// Point-in-time summary of a resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatistics {
    pub name: String,
    pub capacity: f64,
    pub claimed: f64,
    pub claimed_timeline: TimelineStatistics,
    pub available_timeline: TimelineStatistics,
    pub occupancy_timeline: TimelineStatistics,
    pub requesters: QueueStatistics,
    pub claimers: QueueStatistics,
}

fn occupancy(claimed: f64, capacity: f64) -> f64 {
    if capacity > 0.0 { claimed / capacity } else { 0.0 }
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn claimed(&self) -> f64 {
        self.claimed
    }

    pub fn available(&self) -> f64 {
        self.capacity - self.claimed
    }

    /// Fill level of a depletable resource.
    pub fn level(&self) -> f64 {
        self.available()
    }

    pub fn is_full(&self) -> bool {
        self.claimed <= EPS
    }

    pub fn is_depleted(&self) -> bool {
        self.level() <= EPS
    }

    pub fn is_depletable(&self) -> bool {
        self.depletable
    }

    pub fn is_preemptive(&self) -> bool {
        self.preemptive
    }

    pub fn policy(&self) -> HonorPolicy {
        self.policy
    }

    pub fn requesters(&self) -> &ComponentQueue {
        &self.requesters
    }

    pub fn claimers(&self) -> &ComponentQueue {
        &self.claimers
    }

    pub fn claimed_timeline(&self) -> &MetricTimeline {
        &self.claimed_timeline
    }

    pub fn available_timeline(&self) -> &MetricTimeline {
        &self.available_timeline
    }

    pub fn capacity_timeline(&self) -> &MetricTimeline {
        &self.capacity_timeline
    }

    pub fn occupancy_timeline(&self) -> &MetricTimeline {
        &self.occupancy_timeline
    }

    pub fn statistics(&self, now: SimTime) -> ResourceStatistics {
        ResourceStatistics {
            name: self.name.clone(),
            capacity: self.capacity,
            claimed: self.claimed,
            claimed_timeline: self.claimed_timeline.statistics(now),
            available_timeline: self.available_timeline.statistics(now),
            occupancy_timeline: self.occupancy_timeline.statistics(now),
            requesters: self.requesters.statistics(now),
            claimers: self.claimers.statistics(now),
        }
    }

    /// Whether `quantity` (negative for a put) fits right now, ignoring
    /// queue order.
    pub fn can_honor(&self, quantity: f64) -> bool {
        if quantity > 0.0 && quantity > self.capacity - self.claimed + EPS {
            return false;
        }
        -quantity <= self.claimed + EPS
    }

    fn set_claimed(&mut self, now: SimTime, claimed: f64) {
        // swallow rounding drift around zero
        self.claimed = if claimed.abs() < EPS { 0.0 } else { claimed };
        self.record(now);
    }

    fn record(&mut self, now: SimTime) {
        self.claimed_timeline.add_value(now, self.claimed);
        self.available_timeline
            .add_value(now, self.capacity - self.claimed);
        self.capacity_timeline.add_value(now, self.capacity);
        self.occupancy_timeline
            .add_value(now, occupancy(self.claimed, self.capacity));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request for one or more resources, built up fluently.
///
/// ```ignore
/// env.request(me, Request::on(clerk).priority(5).fail_delay(10.0))?;
/// env.request(me, Request::quantity(crane, 2.0).and(dock, 1.0))?;
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    entries: Vec<(ResourceId, f64)>,
    priority: Priority,
    one_of: bool,
    fail_at: Option<SimTime>,
    fail_delay: Option<SimTime>,
    fail_priority: Priority,
    capacity_limit: CapacityLimitMode,
    urgent: bool,
}

impl Request {
    /// One unit of `resource`.
    pub fn on(resource: ResourceId) -> Self {
        Self::quantity(resource, 1.0)
    }

    pub fn quantity(resource: ResourceId, quantity: f64) -> Self {
        Self::with_entries(vec![(resource, quantity)])
    }

    /// `quantity` from whichever of `resources` can honor it first.
    pub fn any_of(resources: &[ResourceId], quantity: f64) -> Self {
        let mut request = Self::with_entries(resources.iter().map(|r| (*r, quantity)).collect());
        request.one_of = true;
        request
    }

    fn with_entries(entries: Vec<(ResourceId, f64)>) -> Self {
        Self {
            entries,
            priority: Priority::NORMAL,
            one_of: false,
            fail_at: None,
            fail_delay: None,
            fail_priority: Priority::NORMAL,
            capacity_limit: CapacityLimitMode::Fail,
            urgent: false,
        }
    }

    /// Also ask for `quantity` of `resource`.
    pub fn and(mut self, resource: ResourceId, quantity: f64) -> Self {
        self.entries.push((resource, quantity));
        self
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Honored as soon as any single entry can be honored.
    pub fn one_of(mut self) -> Self {
        self.one_of = true;
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

    /// Priority of the timeout wake-up.
    pub fn fail_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.fail_priority = priority.into();
        self
    }

    pub fn capacity_limit(mut self, mode: CapacityLimitMode) -> Self {
        self.capacity_limit = mode;
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

impl Script {
    /// Claim `request`, run `body`, then give back what the request claimed.
    ///
    /// Only the quantities named in `request` are released, so claims held
    /// before the scope survive it. A request that timed out releases
    /// nothing. Depletable resources are left as the body leaves them.
    ///
    /// ```ignore
    /// let script = Script::new().scoped(Request::on(clerk), Script::new().then(|env, me| env.hold(me, 5.0)));
    /// ```
    pub fn scoped(self, request: Request, body: Script) -> Self {
        let entries = request.entries.clone();
        self.then(move |env, me| env.request(me, request.clone()))
            .append(body)
            .then(move |env, me| env.release_scope(me, &entries))
    }
}

// ---------------------------------------------------------------------------
// Resource operations
// ---------------------------------------------------------------------------

impl Environment {
    /// Create a regular resource with the configured default honor policy.
    pub fn create_resource(&mut self, name: impl Into<String>, capacity: f64) -> SimResult<ResourceId> {
        self.create_resource_with(ResourceBuilder::new(name, capacity))
    }

    pub fn create_resource_with(&mut self, builder: ResourceBuilder) -> SimResult<ResourceId> {
        let ResourceBuilder {
            name,
            capacity,
            depletable,
            initial_level,
            preemptive,
            policy,
        } = builder;

        if !(capacity >= 0.0) {
            return Err(SimError::InvalidQuantity {
                resource: name,
                quantity: capacity,
            });
        }
        let policy = policy.unwrap_or(self.config().default_honor_policy);
        policy.validate()?;

        let claimed = match (depletable, initial_level) {
            (true, Some(level)) if !(0.0..=capacity).contains(&level) => {
                return Err(SimError::InvalidQuantity {
                    resource: name,
                    quantity: level,
                });
            }
            (true, Some(level)) => capacity - level,
            _ => 0.0,
        };

        let now = self.now();
        let tracked = self.config().tracking.queue_statistics;
        let resource = Resource {
            requesters: ComponentQueue::with_tracking(format!("requesters of {name}"), now, tracked),
            claimers: ComponentQueue::with_tracking(format!("claimers of {name}"), now, tracked),
            claimed_timeline: MetricTimeline::new(now, claimed),
            available_timeline: MetricTimeline::new(now, capacity - claimed),
            capacity_timeline: MetricTimeline::new(now, capacity),
            occupancy_timeline: MetricTimeline::new(now, occupancy(claimed, capacity)),
            name,
            capacity,
            claimed,
            preemptive,
            depletable,
            policy,
        };
        debug!(resource = %resource.name, capacity, depletable, ?policy, "resource created");
        Ok(self.resources.insert(resource))
    }

    /// All resources in creation order.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> + '_ {
        self.resources.iter()
    }

    /// Ask for the quantities in `request` on behalf of `id`.
    ///
    /// On return the component is either rescheduled at `now` holding the
    /// claims, or REQUESTING until honored or until its deadline passes
    /// (then `failed()` is set and it resumes without a claim).
    pub fn request(&mut self, id: ComponentId, request: Request) -> SimResult<()> {
        let Request {
            entries,
            priority,
            one_of,
            fail_at,
            fail_delay,
            fail_priority,
            capacity_limit,
            urgent,
        } = request;

        let entries = self.validate_entries(entries, capacity_limit)?;

        self.require_not_main(id)?;
        let deadline = self.deadline(id, fail_at, fail_delay)?;
        self.detach(id)?;
        if !self.comp(id)?.requests.is_empty() {
            return Err(SimError::PendingRequests(self.name_of(id)));
        }
        let now = self.now();

        let c = self.comp_mut(id)?;
        c.failed = false;
        c.one_of = one_of;

        for (rid, quantity) in entries {
            let c = self.comp_mut(id)?;
            match c.requests.iter_mut().find(|r| r.resource == rid) {
                Some(existing) => existing.quantity += quantity,
                None => c.requests.push(ResourceClaim {
                    resource: rid,
                    quantity,
                    priority,
                    since: now,
                }),
            }

            let res = self.res_mut(rid)?;
            if !res.requesters.contains(id) {
                let key = if res.policy == HonorPolicy::SQF { quantity } else { 0.0 };
                res.requesters.add_with_key(id, priority, key, now)?;
            }
            self.emit(TraceEvent::ResourceRequested {
                resource: rid,
                component: id,
                quantity,
                priority,
                time: now,
            });

            if self.res(rid)?.preemptive {
                self.preempt(id, rid, quantity, priority)?;
            }
        }

        self.try_request_component(id)?;
        if !self.comp(id)?.requests.is_empty() {
            self.reschedule(id, deadline, fail_priority, urgent, ScheduleReason::Request)?;
        }
        Ok(())
    }

    /// Take positive quantities from depletable resources.
    pub fn take(&mut self, id: ComponentId, request: Request) -> SimResult<()> {
        self.require_positive(&request)?;
        self.request(id, request)
    }

    /// Put positive quantities back into depletable resources.
    pub fn put(&mut self, id: ComponentId, mut request: Request) -> SimResult<()> {
        self.require_positive(&request)?;
        for entry in &mut request.entries {
            entry.1 = -entry.1;
        }
        self.request(id, request)
    }

    /// Give back `quantity` (default: everything) of what `id` claims from
    /// `resource`.
    pub fn release(&mut self, id: ComponentId, resource: ResourceId, quantity: Option<f64>) -> SimResult<()> {
        let res = self.res(resource)?;
        if res.depletable {
            return Err(SimError::DepletableRelease(res.name.clone()));
        }
        self.release_internal(id, resource, quantity, None)
    }

    /// Release every claim held by `id`.
    pub fn release_all(&mut self, id: ComponentId) -> SimResult<()> {
        let held: Vec<ResourceId> = self.comp(id)?.claims.iter().map(|c| c.resource).collect();
        for resource in held {
            self.release_internal(id, resource, None, None)?;
        }
        Ok(())
    }

    /// Release on the resource side. A depletable resource drops its
    /// claimed amount by `quantity` (default: all of it); a regular one
    /// releases every claimer.
    pub fn release_resource(&mut self, resource: ResourceId, quantity: Option<f64>) -> SimResult<()> {
        let now = self.now();
        let res = self.res_mut(resource)?;
        if res.depletable {
            let q = quantity.unwrap_or(res.claimed).min(res.claimed);
            if q < 0.0 {
                return Err(SimError::InvalidQuantity {
                    resource: res.name.clone(),
                    quantity: q,
                });
            }
            res.set_claimed(now, res.claimed - q);
            self.emit(TraceEvent::ResourceReleased {
                resource,
                component: None,
                quantity: q,
                time: now,
            });
            return self.try_request_resource(resource);
        }

        for claimer in res.claimers.items() {
            if self.comp(claimer)?.is_claiming(resource) {
                self.release_internal(claimer, resource, None, None)?;
            }
        }
        Ok(())
    }

    /// Change the capacity of `resource` and offer any new room to
    /// requesters.
    pub fn set_capacity(&mut self, resource: ResourceId, capacity: f64) -> SimResult<()> {
        let now = self.now();
        let res = self.res_mut(resource)?;
        if !(capacity >= 0.0) {
            return Err(SimError::InvalidQuantity {
                resource: res.name.clone(),
                quantity: capacity,
            });
        }
        if res.depletable {
            // keep the level
            let shifted = (res.claimed + capacity - res.capacity).max(0.0);
            res.capacity = capacity;
            res.set_claimed(now, shifted);
        } else {
            if capacity + EPS < res.claimed {
                return Err(SimError::CapacityLimit {
                    resource: res.name.clone(),
                    requested: res.claimed,
                    capacity,
                });
            }
            res.capacity = capacity;
            res.record(now);
        }
        debug!(resource = %res.name, capacity, time = now, "capacity changed");
        self.try_request_resource(resource)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn release_scope(&mut self, id: ComponentId, entries: &[(ResourceId, f64)]) -> SimResult<()> {
        for &(resource, quantity) in entries {
            let held = self.comp(id)?.claimed(resource);
            if held > 0.0 && !self.res(resource)?.depletable {
                self.release(id, resource, Some(quantity.min(held)))?;
            }
        }
        Ok(())
    }

    fn validate_entries(
        &self,
        entries: Vec<(ResourceId, f64)>,
        mode: CapacityLimitMode,
    ) -> SimResult<Vec<(ResourceId, f64)>> {
        let multi = entries.len() > 1;
        entries
            .into_iter()
            .map(|(rid, quantity)| {
                let res = self.res(rid)?;
                let invalid = || SimError::InvalidQuantity {
                    resource: res.name.clone(),
                    quantity,
                };
                if !quantity.is_finite() || (quantity < 0.0 && !res.depletable) {
                    return Err(invalid());
                }
                if res.preemptive && multi {
                    return Err(SimError::PreemptiveMultiRequest(res.name.clone()));
                }
                let quantity = match mode {
                    CapacityLimitMode::Fail if quantity.abs() > res.capacity => {
                        return Err(SimError::CapacityLimit {
                            resource: res.name.clone(),
                            requested: quantity.abs(),
                            capacity: res.capacity,
                        });
                    }
                    CapacityLimitMode::Cap if quantity < 0.0 => quantity.max(-res.claimed),
                    CapacityLimitMode::Cap => return Err(invalid()),
                    _ => quantity,
                };
                Ok((rid, quantity))
            })
            .collect()
    }

    fn require_positive(&self, request: &Request) -> SimResult<()> {
        for (rid, quantity) in &request.entries {
            if !(*quantity > 0.0) {
                return Err(SimError::InvalidQuantity {
                    resource: self.res(*rid)?.name.clone(),
                    quantity: *quantity,
                });
            }
        }
        Ok(())
    }

    /// Bump lower-priority claimers of `resource` if that frees enough for
    /// `quantity`.
    fn preempt(&mut self, id: ComponentId, resource: ResourceId, quantity: f64, priority: Priority) -> SimResult<()> {
        let res = self.res(resource)?;
        let mut available = res.available();
        let mut victims = Vec::new();
        for entry in res.claimers.iter().rev() {
            if available >= quantity || priority <= entry.priority {
                break;
            }
            // an earlier claim of the requester itself is never bumped
            if entry.item == id {
                continue;
            }
            available += self.comp(entry.item)?.claimed(resource);
            victims.push(entry.item);
        }
        if available < quantity {
            return Ok(());
        }

        let now = self.now();
        for victim in victims {
            self.release_internal(victim, resource, None, Some(id))?;
            self.emit(TraceEvent::ComponentBumped {
                resource,
                component: victim,
                by: id,
                time: now,
            });
            debug!(component = %self.name_of(victim), by = %self.name_of(id), time = now, "bumped");
            if !self.is_state(victim, ComponentState::Data) {
                self.activate(victim, Schedule::now())?;
            }
        }
        Ok(())
    }

    pub(crate) fn release_internal(
        &mut self,
        id: ComponentId,
        resource: ResourceId,
        quantity: Option<f64>,
        bumped_by: Option<ComponentId>,
    ) -> SimResult<()> {
        let now = self.now();
        let Some(held) = self.comp(id)?.claim(resource).map(|c| c.quantity) else {
            return Err(SimError::NotClaiming {
                component: self.name_of(id),
                resource: self.res(resource)?.name.clone(),
            });
        };
        let q = quantity.unwrap_or(held).min(held);
        if q < 0.0 {
            return Err(SimError::InvalidQuantity {
                resource: self.res(resource)?.name.clone(),
                quantity: q,
            });
        }

        let res = self.res_mut(resource)?;
        res.set_claimed(now, res.claimed - q);

        let c = self.comp_mut(id)?;
        let left = held - q;
        if left < EPS {
            c.claims.retain(|claim| claim.resource != resource);
            self.res_mut(resource)?.claimers.remove(id, now);
        } else if let Some(claim) = c.claims.iter_mut().find(|claim| claim.resource == resource) {
            claim.quantity = left;
        }

        self.emit(TraceEvent::ResourceReleased {
            resource,
            component: Some(id),
            quantity: q,
            time: now,
        });
        trace!(component = %self.name_of(id), quantity = q, time = now, "released");

        if bumped_by.is_none() {
            self.try_request_resource(resource)?;
        }
        Ok(())
    }

    /// Withdraw all pending requests of `id` and let the affected resources
    /// reconsider their queues.
    pub(crate) fn withdraw_requests(&mut self, id: ComponentId) -> SimResult<()> {
        let now = self.now();
        let requests = std::mem::take(&mut self.comp_mut(id)?.requests);
        for req in &requests {
            self.res_mut(req.resource)?.requesters.remove(id, now);
        }
        for req in &requests {
            self.try_request_resource(req.resource)?;
        }
        Ok(())
    }

    fn can_component_honor(&self, resource: ResourceId, id: ComponentId, quantity: f64) -> bool {
        let Some(res) = self.resources.get(resource) else {
            return false;
        };
        if res.policy.head_only() && !self.heads(resource).contains(&id) {
            return false;
        }
        res.can_honor(quantity)
    }

    /// Requesters a head-only policy may honor. Takes and puts on a
    /// depletable resource queue independently, so each direction has its
    /// own head.
    fn heads(&self, resource: ResourceId) -> Vec<ComponentId> {
        let Some(res) = self.resources.get(resource) else {
            return Vec::new();
        };
        if !res.depletable {
            return res.requesters.peek().into_iter().collect();
        }
        let direction = |c: ComponentId| {
            self.components
                .get(c)
                .and_then(|comp| comp.request(resource))
                .map(|r| r.quantity < 0.0)
        };
        let mut heads = Vec::with_capacity(2);
        for is_put in [false, true] {
            if let Some(head) = res
                .requesters
                .iter()
                .map(|e| e.item)
                .find(|c| direction(*c) == Some(is_put))
            {
                heads.push(head);
            }
        }
        heads
    }

    /// Claim what `id` asked for if its pending request can be honored now.
    /// Returns whether it was.
    pub(crate) fn try_request_component(&mut self, id: ComponentId) -> SimResult<bool> {
        let c = self.comp(id)?;
        if c.state == ComponentState::Interrupted || c.requests.is_empty() {
            return Ok(false);
        }
        let honored: Vec<ResourceId> = if c.one_of {
            c.requests
                .iter()
                .find(|r| self.can_component_honor(r.resource, id, r.quantity))
                .map(|r| vec![r.resource])
                .unwrap_or_default()
        } else if c
            .requests
            .iter()
            .all(|r| self.can_component_honor(r.resource, id, r.quantity))
        {
            c.requests.iter().map(|r| r.resource).collect()
        } else {
            Vec::new()
        };
        if honored.is_empty() {
            return Ok(false);
        }

        let now = self.now();
        let requests = std::mem::take(&mut self.comp_mut(id)?.requests);
        for req in &requests {
            let res = self.res_mut(req.resource)?;
            if honored.contains(&req.resource) {
                res.set_claimed(now, res.claimed + req.quantity);
                if !res.depletable {
                    let priority = res
                        .requesters
                        .entry(id)
                        .map(|e| e.priority)
                        .unwrap_or(req.priority);
                    if !res.claimers.contains(id) {
                        res.claimers.add(id, priority, now)?;
                    }
                    let c = self.comp_mut(id)?;
                    match c.claims.iter_mut().find(|cl| cl.resource == req.resource) {
                        Some(existing) => existing.quantity += req.quantity,
                        None => c.claims.push(ResourceClaim {
                            since: now,
                            priority,
                            ..*req
                        }),
                    }
                }
                self.emit(TraceEvent::ResourceClaimed {
                    resource: req.resource,
                    component: id,
                    quantity: req.quantity,
                    time: now,
                });
            }
            self.res_mut(req.resource)?.requesters.remove(id, now);
        }
        trace!(component = %self.name_of(id), time = now, "request honored");

        self.unschedule(id);
        self.reschedule(id, now, Priority::NORMAL, false, ScheduleReason::Activate)?;

        for rid in honored {
            if self.res(rid)?.depletable {
                self.try_request_resource(rid)?;
            }
        }
        Ok(true)
    }

    /// Offer the free capacity of `resource` to its requesters according to
    /// its honor policy.
    pub(crate) fn try_request_resource(&mut self, resource: ResourceId) -> SimResult<()> {
        let policy = self.res(resource)?.policy;
        if policy.head_only() {
            loop {
                let mut progressed = false;
                for head in self.heads(resource) {
                    trace!(?resource, head = %self.name_of(head), "honor head");
                    progressed |= self.try_request_component(head)?;
                }
                if !progressed {
                    return Ok(());
                }
            }
        }

        let order = self.honor_order(resource, policy)?;
        for candidate in order {
            // honored or withdrawn earlier in this scan
            let Some(quantity) = self.comp(candidate)?.request(resource).map(|r| r.quantity) else {
                continue;
            };
            if self.res(resource)?.can_honor(quantity) {
                trace!(?resource, candidate = %self.name_of(candidate), "honor scan");
                self.try_request_component(candidate)?;
            }
        }
        Ok(())
    }

    /// Requesters of `resource` in the order a scanning policy visits them.
    fn honor_order(&self, resource: ResourceId, policy: HonorPolicy) -> SimResult<Vec<ComponentId>> {
        let res = self.res(resource)?;
        if policy.weight().is_none() {
            return Ok(res.requesters.items());
        }
        let mut ranked = Vec::with_capacity(res.requesters.len());
        for entry in res.requesters.iter() {
            let quantity = self
                .comp(entry.item)?
                .request(resource)
                .map(|r| r.quantity)
                .unwrap_or(0.0);
            ranked.push((entry.priority, policy.score(entry.enter_time, quantity), entry.item));
        }
        // stable, so queue order breaks remaining ties
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.total_cmp(&b.1)));
        Ok(ranked.into_iter().map(|(_, _, c)| c).collect())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
