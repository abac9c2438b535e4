//! The future event list.
//!
//! Entries are ordered by ascending time, then descending priority, then
//! ascending insertion sequence. Urgent entries take a negated sequence so
//! they sort ahead of everything already queued at the same time and
//! priority. This order is the only source of tie-breaking in the engine.
//!
//! A component has at most one entry. A secondary map from component to key
//! makes unscheduling O(log n).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use slotmap::SecondaryMap;

use crate::id::{ComponentId, Priority, SimTime};

/// Sort key of a scheduled wake-up.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    pub time: SimTime,
    pub priority: Priority,
    pub seq: i64,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(other.priority.cmp(&self.priority))
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    entries: BTreeMap<EventKey, ComponentId>,
    index: SecondaryMap<ComponentId, EventKey>,
    counter: i64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or move the wake-up of `component`.
    pub fn push(&mut self, component: ComponentId, time: SimTime, priority: Priority, urgent: bool) {
        self.remove(component);
        self.counter += 1;
        let seq = if urgent { -self.counter } else { self.counter };
        let key = EventKey {
            time,
            priority,
            seq,
        };
        self.entries.insert(key, component);
        self.index.insert(component, key);
    }

    /// Remove the earliest entry.
    pub fn pop(&mut self) -> Option<(SimTime, ComponentId)> {
        let (key, component) = self.entries.pop_first()?;
        self.index.remove(component);
        Some((key.time, component))
    }

    /// Unschedule `component`. Returns whether it was queued.
    pub fn remove(&mut self, component: ComponentId) -> bool {
        match self.index.remove(component) {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        self.index.contains_key(component)
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.entries.first_key_value().map(|(k, _)| k.time)
    }

    /// Scheduled time of `component`, if queued.
    pub fn scheduled_time(&self, component: ComponentId) -> Option<SimTime> {
        self.index.get(component).map(|k| k.time)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Components in pop order.
    pub fn iter(&self) -> impl Iterator<Item = (SimTime, ComponentId)> + '_ {
        self.entries.iter().map(|(k, c)| (k.time, *c))
    }
}
