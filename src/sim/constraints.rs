//! Ordered dispatch constraints applied between proposal and equipment.
//!
//! Each constraint is a pure function of the demand scenario and the
//! incoming dispatch. It may shrink or zero a leg but never grows one.

use chrono::{NaiveDateTime, Timelike};

use super::dispatch::Dispatch;
use super::schedule::{HourSet, PeriodSchedule};

/// Demand context visible to constraints at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandScenario {
    pub timestamp: NaiveDateTime,
    /// Demand on the dispatch channel.
    pub demand: f64,
    /// Non-flexible part of demand.
    pub balance_energy: f64,
    /// Highest flexed demand so far in the run.
    pub historical_peak: Option<f64>,
}

/// Caps charging once raising the billed peak costs more than TOU shifting saves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EconomicThrottle {
    /// Cost per unit increase of the billing-period peak.
    pub demand_charge_rate: f64,
    /// Saving per unit of energy shifted from peak to off-peak.
    pub tou_spread: f64,
}

impl EconomicThrottle {
    /// Largest charge whose TOU saving still covers the added demand charge.
    ///
    /// With headroom `h` below the historical peak, charging `c > h` costs
    /// `r_d · (c - h)` and saves `s · c`; the two meet at
    /// `c = h · r_d / (r_d - s)`. Returns `None` when no cap applies.
    pub fn breakeven_charge(&self, scenario: &DemandScenario) -> Option<f64> {
        let peak = scenario.historical_peak?;
        if self.tou_spread >= self.demand_charge_rate {
            return None;
        }
        let headroom = (peak - scenario.demand).max(0.0);
        Some(headroom * self.demand_charge_rate / (self.demand_charge_rate - self.tou_spread))
    }
}

/// One stage of the constraint pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchConstraint {
    /// Zero a leg during inhibited hours of the day.
    HourInhibit {
        no_charge: HourSet,
        no_discharge: HourSet,
    },
    /// Zero a leg while an inhibiting period is active.
    PeriodInhibit {
        no_charge: PeriodSchedule,
        no_discharge: PeriodSchedule,
    },
    /// Hard per-interval energy limits.
    AbsoluteLimit { charge: f64, discharge: f64 },
    EconomicThrottle(EconomicThrottle),
}

impl DispatchConstraint {
    pub fn apply(&self, scenario: &DemandScenario, proposal: Dispatch) -> Dispatch {
        let t = scenario.timestamp;
        let Dispatch { charge, discharge } = proposal;
        match self {
            DispatchConstraint::HourInhibit {
                no_charge,
                no_discharge,
            } => Dispatch {
                charge: if no_charge.contains(t.hour()) { 0.0 } else { charge },
                discharge: if no_discharge.contains(t.hour()) {
                    0.0
                } else {
                    discharge
                },
            },
            DispatchConstraint::PeriodInhibit {
                no_charge,
                no_discharge,
            } => Dispatch {
                charge: if no_charge.is_active(t) { 0.0 } else { charge },
                discharge: if no_discharge.is_active(t) {
                    0.0
                } else {
                    discharge
                },
            },
            DispatchConstraint::AbsoluteLimit {
                charge: charge_limit,
                discharge: discharge_limit,
            } => Dispatch {
                charge: charge.min(*charge_limit),
                discharge: discharge.min(*discharge_limit),
            },
            DispatchConstraint::EconomicThrottle(throttle) => Dispatch {
                charge: throttle
                    .breakeven_charge(scenario)
                    .map_or(charge, |cap| charge.min(cap)),
                discharge,
            },
        }
    }
}

/// Constraints applied in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintPipeline {
    constraints: Vec<DispatchConstraint>,
}

impl ConstraintPipeline {
    pub fn new(constraints: Vec<DispatchConstraint>) -> Self {
        Self { constraints }
    }

    pub fn push(&mut self, constraint: DispatchConstraint) {
        self.constraints.push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn apply(&self, scenario: &DemandScenario, proposal: Dispatch) -> Dispatch {
        self.constraints
            .iter()
            .fold(proposal, |dispatch, c| c.apply(scenario, dispatch))
    }
}
