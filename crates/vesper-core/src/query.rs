//! Read-only snapshots of the environment.
//!
//! [`SimSnapshot`] aggregates component, resource and state information into
//! owned, serializable views for reports and debugging. Nothing here holds a
//! reference into engine storage, and a snapshot cannot be loaded back.

use serde::Serialize;

use crate::component::{ComponentState, ResourceClaim};
use crate::engine::Environment;
use crate::id::{ComponentId, ResourceId, SimTime, StateId};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSnapshot {
    pub id: ComponentId,
    pub name: String,
    pub state: ComponentState,
    /// `None` for components that are not on the event queue.
    pub scheduled_time: Option<SimTime>,
    pub claims: Vec<ResourceClaim>,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub name: String,
    pub capacity: f64,
    pub claimed: f64,
    pub available: f64,
    pub depletable: bool,
    /// Names in queue order.
    pub requesters: Vec<String>,
    pub claimers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateInfo {
    pub id: StateId,
    pub name: String,
    /// The value rendered with `Debug`.
    pub value: String,
    pub waiters: usize,
}

/// Everything observable about an environment at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimSnapshot {
    pub now: SimTime,
    pub components: Vec<ComponentSnapshot>,
    pub resources: Vec<ResourceInfo>,
    pub states: Vec<StateInfo>,
}

impl SimSnapshot {
    pub fn component(&self, name: &str) -> Option<&ComponentSnapshot> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceInfo> {
        self.resources.iter().find(|r| r.name == name)
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Environment queries
// ---------------------------------------------------------------------------

impl Environment {
    pub fn snapshot(&self) -> SimSnapshot {
        let names = |ids: Vec<ComponentId>| -> Vec<String> {
            ids.into_iter().map(|id| self.name_of(id)).collect()
        };

        let components = self
            .components
            .iter()
            .map(|(id, c)| ComponentSnapshot {
                id,
                name: c.name.clone(),
                state: c.state,
                scheduled_time: c.scheduled_time,
                claims: c.claims.clone(),
                failed: c.failed,
            })
            .collect();

        let resources = self
            .resources
            .iter()
            .map(|(id, r)| ResourceInfo {
                id,
                name: r.name().to_string(),
                capacity: r.capacity(),
                claimed: r.claimed(),
                available: r.available(),
                depletable: r.is_depletable(),
                requesters: names(r.requesters().items()),
                claimers: names(r.claimers().items()),
            })
            .collect();

        let states = self
            .states
            .iter()
            .map(|(id, s)| StateInfo {
                id,
                name: s.name().to_string(),
                value: s.rendered(),
                waiters: s.waiters().len(),
            })
            .collect();

        SimSnapshot {
            now: self.now(),
            components,
            resources,
            states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Script;
    use crate::resource::Request;

    fn model() -> Environment {
        let mut env = Environment::with_seed(3);
        let desk = env.create_resource("desk", 1.0).unwrap();
        env.create_state("open", true);
        for name in ["ann", "bob"] {
            env.spawn(
                name,
                Script::new()
                    .then(move |env, me| env.request(me, Request::on(desk)))
                    .then(|env, me| env.hold(me, 10.0)),
            )
            .unwrap();
        }
        env.run_until(1.0).unwrap();
        env
    }

    #[test]
    fn snapshot_reflects_claims_and_queues() {
        let env = model();
        let snap = env.snapshot();
        assert_eq!(snap.now, 1.0);

        let desk = snap.resource("desk").unwrap();
        assert_eq!(desk.claimed, 1.0);
        assert_eq!(desk.claimers, vec!["ann".to_string()]);
        assert_eq!(desk.requesters, vec!["bob".to_string()]);

        let ann = snap.component("ann").unwrap();
        assert_eq!(ann.state, ComponentState::Scheduled);
        assert_eq!(ann.scheduled_time, Some(10.0));
        assert_eq!(ann.claims.len(), 1);
        assert_eq!(snap.component("bob").unwrap().state, ComponentState::Requesting);

        assert_eq!(snap.states[0].value, "true");
    }

    #[cfg(feature = "json")]
    #[test]
    fn snapshot_serializes_to_json() {
        let snap = model().snapshot();
        let json = snap.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["resources"][0]["name"], "desk");
        assert_eq!(value["components"].as_array().unwrap().len(), 3);
    }
}
