//! Setpoint-driven dispatch controller.

use chrono::NaiveDateTime;

use super::dispatch::Dispatch;
use super::dispatch_schedule::{DispatchSchedule, ScheduledDispatch, SetpointSlot};
use super::setpoint::{SetpointCaps, SetpointPolicy, SetpointProposal, SetterSchedule, Setpoints};
use crate::forecast::SetpointForecasters;

/// Owns setpoint state and everything that decides the raw proposal.
///
/// A fixed-rate [`ScheduledDispatch`] takes precedence; when it is idle the
/// proposal comes from the setpoint governing the current dispatch window,
/// unless the controller is `scheduled_only`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Controller {
    pub setpoints: Setpoints,
    pub policy: SetpointPolicy,
    /// Hour-of-day caps applied ahead of the policy.
    pub caps: SetpointCaps,
    pub setter_schedule: SetterSchedule,
    pub forecasters: SetpointForecasters,
    pub dispatch_schedule: DispatchSchedule,
    pub scheduled_dispatch: ScheduledDispatch,
    /// Dispatch only inside scheduled windows; setpoints never propose.
    pub scheduled_only: bool,
}

impl Controller {
    /// Creates a controller with no fixed-rate schedule and a generic policy.
    pub fn new(
        setter_schedule: SetterSchedule,
        forecasters: SetpointForecasters,
        dispatch_schedule: DispatchSchedule,
    ) -> Self {
        Self {
            setpoints: Setpoints::new(),
            policy: SetpointPolicy::GENERIC,
            caps: SetpointCaps::default(),
            setter_schedule,
            forecasters,
            dispatch_schedule,
            scheduled_dispatch: ScheduledDispatch::default(),
            scheduled_only: false,
        }
    }

    /// Setpoint slot governing `t`.
    pub fn slot_at(&self, t: NaiveDateTime) -> SetpointSlot {
        self.dispatch_schedule.slot_at(t)
    }

    /// Raw dispatch proposal for `demand` at `t`, before constraints.
    pub fn proposal(&self, t: NaiveDateTime, demand: f64) -> Dispatch {
        let scheduled = self.scheduled_dispatch.proposal(t);
        if !scheduled.is_idle() || self.scheduled_only {
            return scheduled;
        }
        let raw = self.setpoints.raw_dispatch_proposal(demand, self.slot_at(t));
        Dispatch::from_raw(raw)
    }

    /// Commits a setpoint proposal made at `t` through the hour caps and
    /// then the configured policy.
    pub fn commit(&mut self, proposal: &SetpointProposal, t: NaiveDateTime) {
        let capped = self.caps.limit(proposal, &self.setpoints, t);
        self.setpoints.commit(&capped, self.policy);
    }
}
