//! Error taxonomy for the simulation engine.
//!
//! Nearly every variant is a precondition violation: a logic bug in the
//! model that aborts the run. The one recoverable condition is
//! [`SimError::CapacityLimit`], which the caller can avoid by choosing a
//! different [`CapacityLimitMode`](crate::resource::CapacityLimitMode).
//! Timeouts and preemption are modeled as component state (`failed`,
//! `is_bumped`), never as errors.

use crate::component::ComponentState;
use crate::id::{ComponentId, QueueId, ResourceId, SimTime, StateId};

/// Result alias used by every fallible engine operation.
pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("cannot schedule '{component}' at {time}, which is before now ({now})")]
    ScheduledInPast {
        component: String,
        time: SimTime,
        now: SimTime,
    },
    #[error("event queue yielded time {time} which is before now ({now})")]
    ClockRegression { time: SimTime, now: SimTime },
    #[error("data component '{0}' not allowed")]
    DataComponent(String),
    #[error("main component not allowed")]
    MainComponent,
    #[error("current component '{0}' cannot be interrupted")]
    InterruptCurrent(String),
    #[error("component '{component}' is {state:?}, only interrupted components can be resumed")]
    NotInterrupted {
        component: String,
        state: ComponentState,
    },
    #[error("interrupted component '{0}' needs to be resumed prior to interaction")]
    Interrupted(String),
    #[error("component '{0}' is current and can only be activated with a new process")]
    ActivateCurrent(String),
    #[error("component '{0}' has no process to run")]
    NoProcess(String),
    #[error("component '{0}' already has pending requests")]
    PendingRequests(String),
    #[error("either a fail time or a fail delay can be given, not both")]
    ConflictingDeadlines,
    #[error("either an absolute time or a duration can be given, not both")]
    ConflictingSchedule,
    #[error("invalid quantity {quantity} for resource '{resource}'")]
    InvalidQuantity { resource: String, quantity: f64 },
    #[error("preemptive resource '{0}' does not support multiple resource requests")]
    PreemptiveMultiRequest(String),
    #[error("capacity limit exceeded on '{resource}': requested {requested}, capacity {capacity}")]
    CapacityLimit {
        resource: String,
        requested: f64,
        capacity: f64,
    },
    #[error("component '{component}' is not claiming from '{resource}'")]
    NotClaiming { component: String, resource: String },
    #[error("depletable resource '{0}' must be released via the resource itself")]
    DepletableRelease(String),
    #[error("component '{0}' reported suspension but is still current")]
    SuspendedWhileCurrent(String),
    #[error("repeated process of '{0}' finished twice without suspending")]
    IdleRepeatedProcess(String),
    #[error("passive component '{0}' popped from the event queue")]
    PassiveInEventQueue(String),
    #[error("batch size must be at least 1")]
    EmptyBatch,
    #[error("no resources to select from")]
    EmptySelection,
    #[error("none of the resources has {quantity} available")]
    NoneAvailable { quantity: f64 },
    #[error("weight {0} is outside [0, 1]")]
    InvalidWeight(f64),
    #[error("component not found: {0:?}")]
    UnknownComponent(ComponentId),
    #[error("resource not found: {0:?}")]
    UnknownResource(ResourceId),
    #[error("state not found: {0:?}")]
    UnknownState(StateId),
    #[error("queue not found: {0:?}")]
    UnknownQueue(QueueId),
    #[error("no dependency of type {type_name} (qualifier {qualifier:?})")]
    Unresolved {
        type_name: &'static str,
        qualifier: Option<String>,
    },
}
