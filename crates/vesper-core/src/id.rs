use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a component (a simulated entity with a lifecycle).
    pub struct ComponentId;

    /// Identifies a resource owned by the environment.
    pub struct ResourceId;

    /// Identifies a state value holder owned by the environment.
    pub struct StateId;

    /// Identifies a shared waiting line owned by the environment.
    pub struct QueueId;
}

/// Virtual clock reading. `f64::INFINITY` stands for "never".
pub type SimTime = f64;

/// Scheduling priority. Higher values are serviced first among events at
/// the same time, and ahead of lower priorities in requester queues.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOWEST: Priority = Priority(-20);
    pub const LOW: Priority = Priority(-10);
    pub const NORMAL: Priority = Priority(0);
    pub const IMPORTANT: Priority = Priority(10);
    pub const CRITICAL: Priority = Priority(20);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}
