//! Lifecycle primitives shared by every component: hold, passivate,
//! standby, activate, cancel, interrupt/resume and terminate.
//!
//! Primitives take the target component explicitly. When the target is the
//! CURRENT component, the primitive suspends it and the calling process is
//! expected to return [`ProcessStatus::Suspended`](crate::component::ProcessStatus)
//! right after. When the target is some other component, it is first pulled
//! off the event queue and its outstanding requests and waits are failed.

use tracing::{debug, warn};

use crate::component::{Behavior, ComponentState, Process, Schedule, ScheduleReason};
use crate::engine::Environment;
use crate::error::{SimError, SimResult};
use crate::event::TraceEvent;
use crate::id::{ComponentId, Priority};

// ---------------------------------------------------------------------------
// Activation options
// ---------------------------------------------------------------------------

/// Options for [`Environment::activate_with`].
#[derive(Debug, Default)]
pub struct Activation {
    schedule: Schedule,
    behavior: Option<Behavior>,
    keep_request: bool,
    keep_wait: bool,
}

impl Activation {
    pub fn new(schedule: impl Into<Schedule>) -> Self {
        Self {
            schedule: schedule.into(),
            ..Self::default()
        }
    }

    /// Replace the component's process.
    pub fn process(mut self, process: impl Process + 'static) -> Self {
        self.behavior = Some(Behavior::once(process));
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// With a new process, leave pending requests in place.
    pub fn keep_request(mut self) -> Self {
        self.keep_request = true;
        self
    }

    /// With a new process, leave pending waits in place.
    pub fn keep_wait(mut self) -> Self {
        self.keep_wait = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

impl Environment {
    /// Suspend `id` until `now + delay` (or an absolute time via
    /// [`Schedule::at`]).
    pub fn hold(&mut self, id: ComponentId, schedule: impl Into<Schedule>) -> SimResult<()> {
        let schedule = schedule.into();
        self.detach(id)?;
        let at = schedule.resolve(self.now());
        self.reschedule(id, at, schedule.priority, schedule.urgent, ScheduleReason::Hold)
    }

    /// Suspend `id` until someone activates it.
    pub fn passivate(&mut self, id: ComponentId) -> SimResult<()> {
        self.require_not_main(id)?;
        let now = self.now();
        let remaining = if self.comp(id)?.state == ComponentState::Current {
            Some(0.0)
        } else {
            let scheduled = self.comp(id)?.scheduled_time;
            self.detach(id)?;
            scheduled.map(|t| t - now)
        };
        let c = self.comp_mut(id)?;
        c.remaining_duration = remaining;
        c.scheduled_time = None;
        self.transition(id, ComponentState::Passive)?;
        debug!(component = %self.name_of(id), time = now, "passivated");
        Ok(())
    }

    /// Re-run `id` once per step, without advancing time, until it does
    /// something else.
    pub fn standby(&mut self, id: ComponentId) -> SimResult<()> {
        self.require_not_main(id)?;
        self.detach(id)?;
        let now = self.now();
        self.comp_mut(id)?.scheduled_time = Some(now);
        self.add_standby(id);
        self.transition(id, ComponentState::Standby)?;
        debug!(component = %self.name_of(id), time = now, "standby");
        Ok(())
    }

    /// Schedule `id` to continue with its current process.
    pub fn activate(&mut self, id: ComponentId, schedule: impl Into<Schedule>) -> SimResult<()> {
        self.activate_with(id, Activation::new(schedule))
    }

    /// Schedule `id`, optionally swapping in a new process.
    ///
    /// A DATA component without a new process reruns the process it had
    /// before it was cancelled or terminated.
    pub fn activate_with(&mut self, id: ComponentId, activation: Activation) -> SimResult<()> {
        let Activation {
            schedule,
            behavior,
            keep_request,
            keep_wait,
        } = activation;

        self.require_not_main(id)?;
        let state = self.comp(id)?.state;
        if state == ComponentState::Current && behavior.is_none() {
            return Err(SimError::ActivateCurrent(self.name_of(id)));
        }

        let new_process = behavior.is_some();
        let c = self.comp_mut(id)?;
        match behavior {
            Some(b) => c.set_behavior(Some(b)),
            None if state == ComponentState::Data && c.behavior.is_none() => {
                let Some(mut previous) = c.last_behavior.take() else {
                    return Err(SimError::NoProcess(c.name.clone()));
                };
                previous.reset();
                c.set_behavior(Some(previous));
            }
            None => {}
        }

        if state == ComponentState::Interrupted {
            let c = self.comp_mut(id)?;
            c.interrupt_level = 0;
            c.interrupted_state = None;
            c.remaining_duration = None;
        }

        if state != ComponentState::Current {
            self.unschedule(id);
            if !(new_process && (keep_request || keep_wait)) {
                self.check_fail(id)?;
            }
        }

        let at = schedule.resolve(self.now());
        self.reschedule(
            id,
            at,
            schedule.priority,
            schedule.urgent,
            ScheduleReason::Activate,
        )
    }

    /// Stop `id` without releasing its claims. It becomes DATA and loses
    /// its process.
    pub fn cancel(&mut self, id: ComponentId) -> SimResult<()> {
        self.require_not_main(id)?;
        self.detach(id)?;
        let c = self.comp_mut(id)?;
        c.retire_behavior();
        c.scheduled_time = None;
        self.transition(id, ComponentState::Data)?;
        debug!(component = %self.name_of(id), time = self.now(), "cancelled");
        Ok(())
    }

    /// Suspend `id` in place. Interrupts stack; each needs a matching
    /// [`resume`](Self::resume).
    pub fn interrupt(&mut self, id: ComponentId) -> SimResult<()> {
        let state = self.comp(id)?.state;
        match state {
            ComponentState::Current => Err(SimError::InterruptCurrent(self.name_of(id))),
            ComponentState::Interrupted => {
                let c = self.comp_mut(id)?;
                c.interrupt_level += 1;
                debug!(component = %c.name, level = c.interrupt_level, "interrupted again");
                Ok(())
            }
            _ => {
                self.require_not_data(id)?;
                self.unschedule(id);
                let now = self.now();
                let c = self.comp_mut(id)?;
                c.remaining_duration = c.scheduled_time.map(|t| t - now);
                c.interrupt_level = 1;
                c.interrupted_state = Some(state);
                self.transition(id, ComponentState::Interrupted)?;
                debug!(component = %self.name_of(id), time = now, from = ?state, "interrupted");
                Ok(())
            }
        }
    }

    /// Undo one [`interrupt`](Self::interrupt), or all of them when `all`
    /// is set. Once none remain the component returns to the state it was
    /// interrupted from.
    pub fn resume(&mut self, id: ComponentId, all: bool, priority: Priority) -> SimResult<()> {
        let c = self.comp_mut(id)?;
        if c.state != ComponentState::Interrupted || c.interrupt_level == 0 {
            return Err(SimError::NotInterrupted {
                component: c.name.clone(),
                state: c.state,
            });
        }
        let Some(restored) = c.interrupted_state else {
            return Err(SimError::NotInterrupted {
                component: c.name.clone(),
                state: c.state,
            });
        };

        c.interrupt_level -= 1;
        if c.interrupt_level != 0 && !all {
            warn!(component = %c.name, level = c.interrupt_level, "resume stalled");
            return Ok(());
        }
        c.interrupt_level = 0;
        c.interrupted_state = None;
        let remaining = c.remaining_duration.take();

        let now = self.now();
        self.transition(id, restored)?;
        debug!(component = %self.name_of(id), time = now, to = ?restored, "resumed");

        let reason = match restored {
            ComponentState::Passive => return Ok(()),
            ComponentState::Standby => {
                self.comp_mut(id)?.scheduled_time = Some(now);
                self.add_standby(id);
                return Ok(());
            }
            ComponentState::Waiting => {
                if !self.comp(id)?.waits.is_empty() {
                    self.try_wait_component(id)?;
                }
                ScheduleReason::Wait
            }
            ComponentState::Requesting => {
                self.try_request_component(id)?;
                ScheduleReason::Request
            }
            _ => ScheduleReason::Hold,
        };

        // An honored request or wait already rescheduled the component.
        if self.is_state(id, restored) {
            let at = now + remaining.unwrap_or(0.0);
            self.reschedule(id, at, priority, false, reason)?;
        }
        Ok(())
    }

    /// End `id`: release every claim, withdraw pending requests and waits,
    /// clear the process and move to DATA.
    pub fn terminate(&mut self, id: ComponentId) -> SimResult<()> {
        self.release_all(id)?;
        self.withdraw_requests(id)?;
        self.withdraw_waits(id)?;
        self.unschedule(id);
        let now = self.now();
        let c = self.comp_mut(id)?;
        c.retire_behavior();
        c.scheduled_time = None;
        c.remaining_duration = None;
        c.interrupt_level = 0;
        c.interrupted_state = None;
        self.transition(id, ComponentState::Data)?;
        debug!(component = %self.name_of(id), time = now, "terminated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared preconditions
    // -----------------------------------------------------------------------

    /// Pull a non-CURRENT target out of the queues and fail whatever it was
    /// waiting for.
    pub(crate) fn detach(&mut self, id: ComponentId) -> SimResult<()> {
        if self.comp(id)?.state == ComponentState::Current {
            return Ok(());
        }
        self.require_not_data(id)?;
        self.require_not_interrupted(id)?;
        self.unschedule(id);
        self.check_fail(id)
    }

    /// Fail the outstanding request or wait of `id`, if any.
    pub(crate) fn check_fail(&mut self, id: ComponentId) -> SimResult<()> {
        let now = self.now();
        if !self.comp(id)?.requests.is_empty() {
            self.withdraw_requests(id)?;
            self.comp_mut(id)?.failed = true;
            self.emit(TraceEvent::RequestFailed {
                component: id,
                time: now,
            });
            debug!(component = %self.name_of(id), time = now, "request failed");
        }
        if !self.comp(id)?.waits.is_empty() {
            self.withdraw_waits(id)?;
            self.comp_mut(id)?.failed = true;
            self.emit(TraceEvent::WaitFailed {
                component: id,
                time: now,
            });
            debug!(component = %self.name_of(id), time = now, "wait failed");
        }
        Ok(())
    }

    pub(crate) fn require_not_main(&self, id: ComponentId) -> SimResult<()> {
        if id == self.main() {
            return Err(SimError::MainComponent);
        }
        Ok(())
    }

    pub(crate) fn require_not_data(&self, id: ComponentId) -> SimResult<()> {
        let c = self.comp(id)?;
        if c.state == ComponentState::Data {
            return Err(SimError::DataComponent(c.name.clone()));
        }
        Ok(())
    }

    pub(crate) fn require_not_interrupted(&self, id: ComponentId) -> SimResult<()> {
        let c = self.comp(id)?;
        if c.state == ComponentState::Interrupted {
            return Err(SimError::Interrupted(c.name.clone()));
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
