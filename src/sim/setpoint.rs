//! Sticky setpoint state and its recomputation schedule.
//!
//! [`Setpoints`] holds the last committed charge, discharge and universal
//! thresholds. They change only through [`Setpoints::commit`]; slots absent
//! from a proposal keep their previous value.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::dispatch_schedule::SetpointSlot;
use super::schedule::{EventSchedule, HourSet, PeriodSchedule};

/// New values for any subset of the three setpoint slots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointProposal {
    pub charge: Option<f64>,
    pub discharge: Option<f64>,
    pub universal: Option<f64>,
}

impl SetpointProposal {
    pub fn is_empty(&self) -> bool {
        self.charge.is_none() && self.discharge.is_none() && self.universal.is_none()
    }
}

/// Upper bound on one setpoint slot during certain hours of the day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointCap {
    pub hours: HourSet,
    pub cap: f64,
}

/// Hour-of-day caps per slot, applied at commit time.
///
/// A capped slot is bounded even when absent from the proposal, in which
/// case its sticky value is what gets bounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointCaps {
    pub charge: Option<SetpointCap>,
    pub discharge: Option<SetpointCap>,
    pub universal: Option<SetpointCap>,
}

impl SetpointCaps {
    pub fn is_empty(&self) -> bool {
        self.charge.is_none() && self.discharge.is_none() && self.universal.is_none()
    }

    /// Proposal with every cap active at `t` applied.
    pub fn limit(
        &self,
        proposal: &SetpointProposal,
        current: &Setpoints,
        t: NaiveDateTime,
    ) -> SetpointProposal {
        let bound = |cap: Option<SetpointCap>, proposed: Option<f64>, sticky: f64| match cap {
            Some(cap) if cap.hours.contains(t.hour()) => {
                Some(proposed.unwrap_or(sticky).min(cap.cap))
            }
            _ => proposed,
        };
        SetpointProposal {
            charge: bound(self.charge, proposal.charge, current.charge),
            discharge: bound(self.discharge, proposal.discharge, current.discharge),
            universal: bound(self.universal, proposal.universal, current.universal),
        }
    }
}

/// Adjustments applied to a proposal before it is committed.
///
/// The conservative variants refuse to chase a setpoint past what the
/// flexed series has already reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetpointPolicy {
    /// Universal setpoint is never below the historical flexed peak.
    pub floor_universal_by_peak: bool,
    /// Charge setpoint is never above the historical flexed peak.
    pub cap_charge_by_peak: bool,
    /// Discharge setpoint is never below the historical flexed minimum.
    pub floor_discharge_by_min: bool,
}

impl SetpointPolicy {
    /// Commit proposals as they are.
    pub const GENERIC: SetpointPolicy = SetpointPolicy {
        floor_universal_by_peak: false,
        cap_charge_by_peak: false,
        floor_discharge_by_min: false,
    };

    /// Peak shaving that never targets below the peak already reached.
    pub const CONSERVATIVE_PEAK_SHAVE: SetpointPolicy = SetpointPolicy {
        floor_universal_by_peak: true,
        cap_charge_by_peak: false,
        floor_discharge_by_min: false,
    };

    /// TOU shifting whose charging never lifts demand above the peak reached.
    pub const TOU_PEAK_SHAVE_COMBO: SetpointPolicy = SetpointPolicy {
        floor_universal_by_peak: false,
        cap_charge_by_peak: true,
        floor_discharge_by_min: false,
    };
}

/// Current thresholds plus running extremes of the flexed series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Setpoints {
    charge: f64,
    discharge: f64,
    universal: f64,
    historical_peak: Option<f64>,
    historical_min: Option<f64>,
}

impl Setpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn discharge(&self) -> f64 {
        self.discharge
    }

    pub fn universal(&self) -> f64 {
        self.universal
    }

    /// Highest flexed demand seen so far; `None` before the first step.
    pub fn historical_peak_demand(&self) -> Option<f64> {
        self.historical_peak
    }

    /// Lowest flexed demand seen so far; `None` before the first step.
    pub fn historical_min_demand(&self) -> Option<f64> {
        self.historical_min
    }

    /// Commits the slots present in `proposal` after applying `policy`.
    ///
    /// Policy bounds only apply once a historical value exists.
    pub fn commit(&mut self, proposal: &SetpointProposal, policy: SetpointPolicy) {
        if let Some(mut universal) = proposal.universal {
            if let (true, Some(peak)) = (policy.floor_universal_by_peak, self.historical_peak) {
                universal = universal.max(peak);
            }
            self.universal = universal;
        }
        if let Some(mut charge) = proposal.charge {
            if let (true, Some(peak)) = (policy.cap_charge_by_peak, self.historical_peak) {
                charge = charge.min(peak);
            }
            self.charge = charge;
        }
        if let Some(mut discharge) = proposal.discharge {
            if let (true, Some(min)) = (policy.floor_discharge_by_min, self.historical_min) {
                discharge = discharge.max(min);
            }
            self.discharge = discharge;
        }
    }

    /// Folds one flexed demand observation into the running extremes.
    pub fn record_flexed_demand(&mut self, flexed: f64) {
        self.historical_peak = Some(self.historical_peak.map_or(flexed, |p| p.max(flexed)));
        self.historical_min = Some(self.historical_min.map_or(flexed, |m| m.min(flexed)));
    }

    /// Signed dispatch proposal for `demand` under the slot in force.
    ///
    /// Charge-only windows never propose discharge and discharge-only
    /// windows never propose charge. Positive values discharge.
    pub fn raw_dispatch_proposal(&self, demand: f64, slot: SetpointSlot) -> f64 {
        match slot {
            SetpointSlot::Charge => (demand - self.charge).min(0.0),
            SetpointSlot::Discharge => (demand - self.discharge).max(0.0),
            SetpointSlot::Universal => demand - self.universal,
            SetpointSlot::Idle => 0.0,
        }
    }
}

/// Which slots are due for recomputation at an instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueSlots {
    pub charge: bool,
    pub discharge: bool,
    pub universal: bool,
}

impl DueSlots {
    pub fn any(&self) -> bool {
        self.charge || self.discharge || self.universal
    }
}

/// Recomputation events per slot plus a pause override.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetterSchedule {
    pub charge: EventSchedule,
    pub discharge: EventSchedule,
    pub universal: EventSchedule,
    /// While active, no slot is due and event cursors do not move.
    pub pauses: PeriodSchedule,
}

impl SetterSchedule {
    pub fn events(&self, slot: SetpointSlot) -> Option<&EventSchedule> {
        match slot {
            SetpointSlot::Charge => Some(&self.charge),
            SetpointSlot::Discharge => Some(&self.discharge),
            SetpointSlot::Universal => Some(&self.universal),
            SetpointSlot::Idle => None,
        }
    }

    pub fn events_mut(&mut self, slot: SetpointSlot) -> Option<&mut EventSchedule> {
        match slot {
            SetpointSlot::Charge => Some(&mut self.charge),
            SetpointSlot::Discharge => Some(&mut self.discharge),
            SetpointSlot::Universal => Some(&mut self.universal),
            SetpointSlot::Idle => None,
        }
    }

    /// Evaluates every slot at `t`.
    ///
    /// Advances periodic cursors as a side effect; see
    /// [`EventSchedule::is_due`].
    pub fn due(&mut self, t: NaiveDateTime) -> DueSlots {
        if self.pauses.is_active(t) {
            return DueSlots::default();
        }
        DueSlots {
            charge: self.charge.is_due(t),
            discharge: self.discharge.is_due(t),
            universal: self.universal.is_due(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::schedule::{EventOccurrence, Period};
    use chrono::{NaiveDate, TimeDelta};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid datetime")
    }

    #[test]
    fn caps_bound_slots_inside_their_hours() {
        let mut sp = Setpoints::new();
        sp.commit(
            &SetpointProposal {
                charge: Some(8.0),
                ..Default::default()
            },
            SetpointPolicy::GENERIC,
        );
        let caps = SetpointCaps {
            charge: Some(SetpointCap {
                hours: HourSet::range(0, 6),
                cap: 5.0,
            }),
            universal: Some(SetpointCap {
                hours: HourSet::range(17, 21),
                cap: 20.0,
            }),
            ..Default::default()
        };
        let proposal = SetpointProposal {
            universal: Some(30.0),
            ..Default::default()
        };

        let night = caps.limit(&proposal, &sp, at(2));
        assert_eq!(night.charge, Some(5.0));
        assert_eq!(night.universal, Some(30.0));
        assert_eq!(night.discharge, None);

        let evening = caps.limit(&proposal, &sp, at(18));
        assert_eq!(evening.charge, None);
        assert_eq!(evening.universal, Some(20.0));

        let below = SetpointProposal {
            universal: Some(12.0),
            ..Default::default()
        };
        assert_eq!(caps.limit(&below, &sp, at(18)).universal, Some(12.0));
    }

    #[test]
    fn commit_is_sticky_for_absent_slots() {
        let mut sp = Setpoints::new();
        sp.commit(
            &SetpointProposal {
                charge: Some(3.0),
                discharge: Some(9.0),
                universal: Some(6.0),
            },
            SetpointPolicy::GENERIC,
        );
        sp.commit(
            &SetpointProposal {
                universal: Some(7.0),
                ..Default::default()
            },
            SetpointPolicy::GENERIC,
        );
        assert_eq!((sp.charge(), sp.discharge(), sp.universal()), (3.0, 9.0, 7.0));
    }

    #[test]
    fn conservative_floor_uses_historical_peak() {
        let mut sp = Setpoints::new();
        sp.record_flexed_demand(12.0);
        sp.record_flexed_demand(8.0);
        sp.commit(
            &SetpointProposal {
                universal: Some(10.0),
                ..Default::default()
            },
            SetpointPolicy::CONSERVATIVE_PEAK_SHAVE,
        );
        assert_eq!(sp.universal(), 12.0);
    }

    #[test]
    fn conservative_floor_ignored_before_history() {
        let mut sp = Setpoints::new();
        sp.commit(
            &SetpointProposal {
                universal: Some(10.0),
                ..Default::default()
            },
            SetpointPolicy::CONSERVATIVE_PEAK_SHAVE,
        );
        assert_eq!(sp.universal(), 10.0);
    }

    #[test]
    fn combo_caps_charge_at_peak() {
        let mut sp = Setpoints::new();
        sp.record_flexed_demand(7.0);
        sp.commit(
            &SetpointProposal {
                charge: Some(9.0),
                discharge: Some(11.0),
                universal: None,
            },
            SetpointPolicy::TOU_PEAK_SHAVE_COMBO,
        );
        assert_eq!(sp.charge(), 7.0);
        assert_eq!(sp.discharge(), 11.0);
    }

    #[test]
    fn discharge_floor_by_min_is_opt_in() {
        let mut sp = Setpoints::new();
        sp.record_flexed_demand(4.0);
        let proposal = SetpointProposal {
            discharge: Some(2.0),
            ..Default::default()
        };
        sp.commit(&proposal, SetpointPolicy::GENERIC);
        assert_eq!(sp.discharge(), 2.0);
        let policy = SetpointPolicy {
            floor_discharge_by_min: true,
            ..SetpointPolicy::GENERIC
        };
        sp.commit(&proposal, policy);
        assert_eq!(sp.discharge(), 4.0);
    }

    #[test]
    fn historical_extremes_track_flexed_demand() {
        let mut sp = Setpoints::new();
        let mut last_peak = f64::MIN;
        for v in [5.0, 3.0, 9.0, 1.0, 7.0] {
            sp.record_flexed_demand(v);
            let peak = sp.historical_peak_demand().unwrap_or(f64::MIN);
            assert!(peak >= last_peak);
            last_peak = peak;
        }
        assert_eq!(sp.historical_peak_demand(), Some(9.0));
        assert_eq!(sp.historical_min_demand(), Some(1.0));
    }

    #[test]
    fn raw_proposal_respects_slot_direction() {
        let mut sp = Setpoints::new();
        sp.commit(
            &SetpointProposal {
                charge: Some(5.0),
                discharge: Some(10.0),
                universal: Some(8.0),
            },
            SetpointPolicy::GENERIC,
        );
        assert_eq!(sp.raw_dispatch_proposal(3.0, SetpointSlot::Charge), -2.0);
        assert_eq!(sp.raw_dispatch_proposal(7.0, SetpointSlot::Charge), 0.0);
        assert_eq!(sp.raw_dispatch_proposal(12.0, SetpointSlot::Discharge), 2.0);
        assert_eq!(sp.raw_dispatch_proposal(4.0, SetpointSlot::Discharge), 0.0);
        assert_eq!(sp.raw_dispatch_proposal(6.0, SetpointSlot::Universal), -2.0);
        assert_eq!(sp.raw_dispatch_proposal(11.0, SetpointSlot::Universal), 3.0);
        assert_eq!(sp.raw_dispatch_proposal(50.0, SetpointSlot::Idle), 0.0);
    }

    #[test]
    fn pause_suppresses_every_slot() {
        let mut schedule = SetterSchedule {
            universal: EventSchedule::always(),
            charge: EventSchedule::always(),
            discharge: EventSchedule::new(),
            pauses: PeriodSchedule::new().with_period(Period::DateRange {
                from: at(2),
                to: at(3),
            }),
        };
        assert!(schedule.due(at(1)).universal);
        assert!(!schedule.due(at(2)).any());
        let due = schedule.due(at(4));
        assert!(due.universal && due.charge && !due.discharge);
    }

    #[test]
    fn missed_periodic_event_fires_after_pause() {
        let mut schedule = SetterSchedule {
            universal: EventSchedule::new()
                .with(EventOccurrence::periodic(at(0), TimeDelta::hours(2))),
            pauses: PeriodSchedule::new().with_period(Period::DateRange {
                from: at(1),
                to: at(2),
            }),
            ..Default::default()
        };
        assert!(schedule.due(at(0)).universal);
        assert!(!schedule.due(at(1)).universal);
        assert!(!schedule.due(at(2)).universal);
        assert!(schedule.due(at(3)).universal);
        assert!(schedule.due(at(4)).universal);
    }
}
