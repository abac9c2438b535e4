//! Instrumented membership containers.
//!
//! [`ComponentQueue`] keeps entries ordered by priority (descending), an
//! optional secondary key (ascending) and insertion order. Resources and
//! states use it for requesters, claimers and waiters; models use it for
//! their own waiting lines. [`ComponentList`] is the insertion-ordered
//! variant without priorities.
//!
//! Both record the entry time of every member, a length timeline and a
//! length-of-stay summary. Methods that change membership take `now`
//! explicitly since the containers don't hold a reference to the clock.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::id::{ComponentId, Priority, SimTime};
use crate::monitor::{MetricTimeline, NumericStatistics, StatisticsSummary, TimelineStatistics};

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// A member of a [`ComponentQueue`].
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry<C> {
    pub item: C,
    pub priority: Priority,
    /// Secondary ordering key, ascending. Zero for plain FIFO use.
    pub key: f64,
    pub enter_time: SimTime,
    seq: i64,
}

impl<C> QueueEntry<C> {
    fn order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.key.total_cmp(&other.key))
            .then(self.seq.cmp(&other.seq))
    }
}

/// Membership statistics shared by queues and lists.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    pub name: String,
    pub length: usize,
    pub length_timeline: TimelineStatistics,
    pub length_of_stay: StatisticsSummary,
}

#[derive(Debug, Clone)]
struct Tracking {
    length: MetricTimeline,
    stay: NumericStatistics,
}

impl Tracking {
    fn new(now: SimTime, enabled: bool) -> Self {
        Self {
            length: if enabled {
                MetricTimeline::new(now, 0.0)
            } else {
                MetricTimeline::disabled(now, 0.0)
            },
            stay: NumericStatistics::new(),
        }
    }

    fn entered(&mut self, now: SimTime, len: usize) {
        self.length.add_value(now, len as f64);
    }

    fn left(&mut self, now: SimTime, enter_time: SimTime, len: usize) {
        self.length.add_value(now, len as f64);
        if self.length.is_enabled() {
            self.stay.add(now - enter_time);
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentQueue
// ---------------------------------------------------------------------------

/// Priority-ordered queue with entry-time bookkeeping.
#[derive(Debug, Clone)]
pub struct ComponentQueue<C = ComponentId> {
    name: String,
    entries: Vec<QueueEntry<C>>,
    capacity: Option<usize>,
    next_seq: i64,
    tracking: Tracking,
}

impl<C: Copy + PartialEq> ComponentQueue<C> {
    pub fn new(name: impl Into<String>, now: SimTime) -> Self {
        Self::with_tracking(name, now, true)
    }

    /// Create a queue, optionally without length-of-stay and length
    /// history (the current length is always known).
    pub fn with_tracking(name: impl Into<String>, now: SimTime, enabled: bool) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            capacity: None,
            next_seq: 0,
            tracking: Tracking::new(now, enabled),
        }
    }

    /// Limit the number of members. Adding beyond it fails with
    /// [`SimError::CapacityLimit`].
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Add behind all members of equal or higher priority.
    pub fn add(&mut self, item: C, priority: Priority, now: SimTime) -> SimResult<()> {
        self.add_with_key(item, priority, 0.0, now)
    }

    /// Add with a secondary ordering key (smaller keys first among equal
    /// priorities).
    pub fn add_with_key(
        &mut self,
        item: C,
        priority: Priority,
        key: f64,
        now: SimTime,
    ) -> SimResult<()> {
        self.check_capacity()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = QueueEntry {
            item,
            priority,
            key,
            enter_time: now,
            seq,
        };
        let idx = self
            .entries
            .partition_point(|e| e.order(&entry) != Ordering::Greater);
        self.entries.insert(idx, entry);
        self.tracking.entered(now, self.entries.len());
        Ok(())
    }

    /// Put `item` at the head, taking the head's priority and key.
    pub fn add_front(&mut self, item: C, now: SimTime) -> SimResult<()> {
        self.check_capacity()?;
        let (priority, key, seq) = match self.entries.first() {
            Some(head) => (head.priority, head.key, head.seq - 1),
            None => (Priority::NORMAL, 0.0, self.next_seq),
        };
        self.next_seq = self.next_seq.max(seq + 1);
        self.entries.insert(
            0,
            QueueEntry {
                item,
                priority,
                key,
                enter_time: now,
                seq,
            },
        );
        self.tracking.entered(now, self.entries.len());
        Ok(())
    }

    /// Remove and return the head.
    pub fn poll(&mut self, now: SimTime) -> Option<C> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries.remove(0);
        self.tracking
            .left(now, entry.enter_time, self.entries.len());
        Some(entry.item)
    }

    pub fn peek(&self) -> Option<C> {
        self.entries.first().map(|e| e.item)
    }

    /// Remove `item` if present. Returns whether it was a member.
    pub fn remove(&mut self, item: C, now: SimTime) -> bool {
        match self.entries.iter().position(|e| e.item == item) {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                self.tracking
                    .left(now, entry.enter_time, self.entries.len());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: C) -> bool {
        self.entries.iter().any(|e| e.item == item)
    }

    pub fn position(&self, item: C) -> Option<usize> {
        self.entries.iter().position(|e| e.item == item)
    }

    pub fn entry(&self, item: C) -> Option<&QueueEntry<C>> {
        self.entries.iter().find(|e| e.item == item)
    }

    /// Change a member's priority and re-sort. Returns whether it was found.
    pub fn update_priority(&mut self, item: C, priority: Priority) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.item == item) else {
            return false;
        };
        entry.priority = priority;
        self.entries.sort_by(|a, b| a.order(b));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in queue order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &QueueEntry<C>> {
        self.entries.iter()
    }

    /// Members in queue order.
    pub fn items(&self) -> Vec<C> {
        self.entries.iter().map(|e| e.item).collect()
    }

    pub fn length_timeline(&self) -> &MetricTimeline {
        &self.tracking.length
    }

    pub fn length_of_stay(&self) -> &NumericStatistics {
        &self.tracking.stay
    }

    pub fn statistics(&self, now: SimTime) -> QueueStatistics {
        QueueStatistics {
            name: self.name.clone(),
            length: self.entries.len(),
            length_timeline: self.tracking.length.statistics(now),
            length_of_stay: self.tracking.stay.summary(),
        }
    }

    fn check_capacity(&self) -> SimResult<()> {
        match self.capacity {
            Some(cap) if self.entries.len() >= cap => Err(SimError::CapacityLimit {
                resource: self.name.clone(),
                requested: (self.entries.len() + 1) as f64,
                capacity: cap as f64,
            }),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentList
// ---------------------------------------------------------------------------

/// Insertion-ordered list with the same statistics as [`ComponentQueue`].
#[derive(Debug, Clone)]
pub struct ComponentList<C = ComponentId> {
    name: String,
    entries: Vec<(C, SimTime)>,
    tracking: Tracking,
}

impl<C: Copy + PartialEq> ComponentList<C> {
    pub fn new(name: impl Into<String>, now: SimTime) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            tracking: Tracking::new(now, true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, item: C, now: SimTime) {
        self.entries.push((item, now));
        self.tracking.entered(now, self.entries.len());
    }

    /// Insert at `index`, clamped to the list length.
    pub fn insert(&mut self, index: usize, item: C, now: SimTime) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, (item, now));
        self.tracking.entered(now, self.entries.len());
    }

    pub fn remove(&mut self, item: C, now: SimTime) -> bool {
        match self.entries.iter().position(|(c, _)| *c == item) {
            Some(idx) => {
                let (_, entered) = self.entries.remove(idx);
                self.tracking.left(now, entered, self.entries.len());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: C) -> bool {
        self.entries.iter().any(|(c, _)| *c == item)
    }

    pub fn get(&self, index: usize) -> Option<C> {
        self.entries.get(index).map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = C> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    pub fn statistics(&self, now: SimTime) -> QueueStatistics {
        QueueStatistics {
            name: self.name.clone(),
            length: self.entries.len(),
            length_timeline: self.tracking.length.statistics(now),
            length_of_stay: self.tracking.stay.summary(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
