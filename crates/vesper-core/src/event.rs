//! Structured trace events with per-kind ring buffers.
//!
//! The engine emits events while a step executes and delivers them in batch
//! to listeners once the step's process has returned. Each event kind has its
//! own [`EventBuffer`] with a configurable capacity.
//!
//! Listeners are passive: they receive `&TraceEvent` and have no access to
//! the environment, so they cannot alter the simulation they observe.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind.

use crate::component::ComponentState;
use crate::id::{ComponentId, Priority, ResourceId, SimTime, StateId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the virtual time at which they
/// occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    // -- Lifecycle --
    ComponentCreated {
        component: ComponentId,
        time: SimTime,
    },
    StateChanged {
        component: ComponentId,
        from: ComponentState,
        to: ComponentState,
        time: SimTime,
    },

    // -- Resources --
    ResourceRequested {
        resource: ResourceId,
        component: ComponentId,
        quantity: f64,
        priority: Priority,
        time: SimTime,
    },
    ResourceClaimed {
        resource: ResourceId,
        component: ComponentId,
        quantity: f64,
        time: SimTime,
    },
    ResourceReleased {
        resource: ResourceId,
        component: Option<ComponentId>,
        quantity: f64,
        time: SimTime,
    },
    ComponentBumped {
        resource: ResourceId,
        component: ComponentId,
        by: ComponentId,
        time: SimTime,
    },
    RequestFailed {
        component: ComponentId,
        time: SimTime,
    },

    // -- States --
    WaitFailed {
        component: ComponentId,
        time: SimTime,
    },
    StateValueChanged {
        state: StateId,
        time: SimTime,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ComponentCreated,
    StateChanged,
    ResourceRequested,
    ResourceClaimed,
    ResourceReleased,
    ComponentBumped,
    RequestFailed,
    WaitFailed,
    StateValueChanged,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 9;

impl TraceEvent {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::ComponentCreated { .. } => EventKind::ComponentCreated,
            TraceEvent::StateChanged { .. } => EventKind::StateChanged,
            TraceEvent::ResourceRequested { .. } => EventKind::ResourceRequested,
            TraceEvent::ResourceClaimed { .. } => EventKind::ResourceClaimed,
            TraceEvent::ResourceReleased { .. } => EventKind::ResourceReleased,
            TraceEvent::ComponentBumped { .. } => EventKind::ComponentBumped,
            TraceEvent::RequestFailed { .. } => EventKind::RequestFailed,
            TraceEvent::WaitFailed { .. } => EventKind::WaitFailed,
            TraceEvent::StateValueChanged { .. } => EventKind::StateValueChanged,
        }
    }

    pub fn time(&self) -> SimTime {
        match self {
            TraceEvent::ComponentCreated { time, .. }
            | TraceEvent::StateChanged { time, .. }
            | TraceEvent::ResourceRequested { time, .. }
            | TraceEvent::ResourceClaimed { time, .. }
            | TraceEvent::ResourceReleased { time, .. }
            | TraceEvent::ComponentBumped { time, .. }
            | TraceEvent::RequestFailed { time, .. }
            | TraceEvent::WaitFailed { time, .. }
            | TraceEvent::StateValueChanged { time, .. } => *time,
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ComponentCreated,
        EventKind::StateChanged,
        EventKind::ResourceRequested,
        EventKind::ResourceClaimed,
        EventKind::ResourceReleased,
        EventKind::ComponentBumped,
        EventKind::RequestFailed,
        EventKind::WaitFailed,
        EventKind::StateValueChanged,
    ];

    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer: pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<TraceEvent>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: TraceEvent) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total events written since creation (including dropped).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> + '_ {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head points at the oldest entry once the buffer has wrapped
            self.head
        };
        (0..self.len).filter_map(move |i| self.events[(start + i) % self.capacity()].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&TraceEvent)>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&TraceEvent) -> bool>;

/// Priority level for event subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    listener: PassiveListener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, the listeners, and suppression
/// flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    /// Events emitted since the last delivery, in emission order.
    undelivered: Vec<TraceEvent>,
    default_capacity: usize,
    enabled: bool,
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: Default::default(),
            undelivered: Vec::new(),
            default_capacity,
            enabled: true,
            next_insertion_order: 0,
        }
    }

    /// A bus that drops everything. Listeners may still be registered.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Suppress an event kind. Suppressed events are never buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event. No-ops if the bus is disabled or the kind is
    /// suppressed.
    pub fn emit(&mut self, event: TraceEvent) {
        let idx = event.kind().index();
        if !self.enabled || self.suppressed[idx] {
            return;
        }

        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event.clone());

        if !self.subscribers[idx].is_empty() {
            self.undelivered.push(event);
        }
    }

    /// Register a passive listener with Normal priority and no filter.
    pub fn on_event(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_event_filtered(kind, SubscriberPriority::Normal, None, listener);
    }

    /// Register one listener for every event kind.
    pub fn on_any<F>(&mut self, listener: F)
    where
        F: FnMut(&TraceEvent) + 'static,
    {
        let shared = std::rc::Rc::new(std::cell::RefCell::new(listener));
        for kind in EventKind::ALL {
            let shared = std::rc::Rc::clone(&shared);
            self.on_event(kind, Box::new(move |event| (*shared.borrow_mut())(event)));
        }
    }

    /// Register a passive listener with explicit priority and optional filter.
    pub fn on_event_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let subscribers = &mut self.subscribers[kind.index()];
        subscribers.push(SubscriberEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
        subscribers.sort_by_key(|entry| (entry.priority, entry.insertion_order));
    }

    /// Hand all undelivered events to listeners, in emission order. For each
    /// event, listeners run sorted by `(priority, insertion_order)`.
    pub fn deliver(&mut self) {
        if self.undelivered.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.undelivered);
        for event in &events {
            for entry in &mut self.subscribers[event.kind().index()] {
                if let Some(ref filter) = entry.filter
                    && !filter(event)
                {
                    continue;
                }
                (entry.listener)(event);
            }
        }
    }

    /// Get the event buffer for a specific kind (read-only).
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Buffered events of one kind, oldest first.
    pub fn events(&self, kind: EventKind) -> Vec<&TraceEvent> {
        self.buffer(kind)
            .map(|b| b.iter().collect())
            .unwrap_or_default()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all buffers. Does not remove subscribers or suppression settings.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
        self.undelivered.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn state_id() -> StateId {
        let mut map: SlotMap<StateId, ()> = SlotMap::with_key();
        map.insert(())
    }

    fn value_changed(time: SimTime) -> TraceEvent {
        TraceEvent::StateValueChanged {
            state: state_id(),
            time,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut buffer = EventBuffer::new(2);
        buffer.push(value_changed(1.0));
        buffer.push(value_changed(2.0));
        buffer.push(value_changed(3.0));
        let times: Vec<_> = buffer.iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![2.0, 3.0]);
        assert_eq!(buffer.dropped_count(), 1);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_clamped() {
        assert_eq!(EventBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn suppressed_kind_is_not_buffered() {
        let mut bus = EventBus::new(8);
        bus.suppress(EventKind::StateValueChanged);
        bus.emit(value_changed(1.0));
        assert!(bus.is_suppressed(EventKind::StateValueChanged));
        assert_eq!(bus.total_emitted(EventKind::StateValueChanged), 0);
        assert!(bus.buffer(EventKind::StateValueChanged).is_none());
    }

    #[test]
    fn disabled_bus_records_nothing() {
        let mut bus = EventBus::disabled();
        bus.emit(value_changed(1.0));
        assert_eq!(bus.buffered_count(EventKind::StateValueChanged), 0);
    }

    #[test]
    fn listeners_run_in_priority_order_on_deliver() {
        let mut bus = EventBus::new(8);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        bus.on_event_filtered(
            EventKind::StateValueChanged,
            SubscriberPriority::Post,
            None,
            Box::new(move |_| l.borrow_mut().push("post")),
        );
        let l = Rc::clone(&log);
        bus.on_event_filtered(
            EventKind::StateValueChanged,
            SubscriberPriority::Pre,
            None,
            Box::new(move |_| l.borrow_mut().push("pre")),
        );

        bus.emit(value_changed(1.0));
        assert!(log.borrow().is_empty(), "delivery is deferred");
        bus.deliver();
        assert_eq!(*log.borrow(), vec!["pre", "post"]);

        bus.deliver();
        assert_eq!(log.borrow().len(), 2, "events are delivered once");
    }

    #[test]
    fn filter_skips_events() {
        let mut bus = EventBus::new(8);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        bus.on_event_filtered(
            EventKind::StateValueChanged,
            SubscriberPriority::Normal,
            Some(Box::new(|e: &TraceEvent| e.time() > 1.5)),
            Box::new(move |e: &TraceEvent| s.borrow_mut().push(e.time())),
        );
        bus.emit(value_changed(1.0));
        bus.emit(value_changed(2.0));
        bus.deliver();
        assert_eq!(*seen.borrow(), vec![2.0]);
    }

    #[test]
    fn on_any_sees_every_kind() {
        let mut bus = EventBus::new(8);
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        bus.on_any(move |_| *c.borrow_mut() += 1);

        let mut components: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let id = components.insert(());
        bus.emit(value_changed(0.0));
        bus.emit(TraceEvent::RequestFailed {
            component: id,
            time: 0.0,
        });
        bus.deliver();
        assert_eq!(*count.borrow(), 2);
    }
}
