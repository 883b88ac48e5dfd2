//! Permitted charge/discharge windows and fixed-rate scheduled dispatch.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::dispatch::Dispatch;
use super::schedule::{Period, PeriodSchedule};
use crate::error::InvariantViolation;

/// Setpoint slot in force at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointSlot {
    /// Only charging permitted.
    Charge,
    /// Only discharging permitted.
    Discharge,
    /// Both directions permitted.
    Universal,
    /// Neither direction permitted.
    Idle,
}

impl fmt::Display for SetpointSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SetpointSlot::Charge => "charge",
            SetpointSlot::Discharge => "discharge",
            SetpointSlot::Universal => "universal",
            SetpointSlot::Idle => "idle",
        })
    }
}

/// Partitions time into charge-only, discharge-only, both and neither.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSchedule {
    pub charge_schedule: PeriodSchedule,
    pub discharge_schedule: PeriodSchedule,
    /// Skip window validation of realized dispatch.
    pub allow_non_scheduled_dispatch: bool,
}

impl DispatchSchedule {
    /// Both directions permitted at all times.
    pub fn unrestricted() -> Self {
        Self {
            charge_schedule: PeriodSchedule::always(),
            discharge_schedule: PeriodSchedule::always(),
            allow_non_scheduled_dispatch: false,
        }
    }

    pub fn new(charge_schedule: PeriodSchedule, discharge_schedule: PeriodSchedule) -> Self {
        Self {
            charge_schedule,
            discharge_schedule,
            allow_non_scheduled_dispatch: false,
        }
    }

    pub fn charge_allowed(&self, t: NaiveDateTime) -> bool {
        self.charge_schedule.is_active(t)
    }

    pub fn discharge_allowed(&self, t: NaiveDateTime) -> bool {
        self.discharge_schedule.is_active(t)
    }

    /// Identifies which setpoint governs `t`.
    pub fn slot_at(&self, t: NaiveDateTime) -> SetpointSlot {
        match (self.charge_allowed(t), self.discharge_allowed(t)) {
            (true, true) => SetpointSlot::Universal,
            (true, false) => SetpointSlot::Charge,
            (false, true) => SetpointSlot::Discharge,
            (false, false) => SetpointSlot::Idle,
        }
    }

    /// Rejects a non-zero leg outside its permitted window.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::ChargeOutsideSchedule`] or
    /// [`InvariantViolation::DischargeOutsideSchedule`] unless non-scheduled
    /// dispatch is allowed.
    pub fn validate_dispatch(
        &self,
        dispatch: &Dispatch,
        t: NaiveDateTime,
    ) -> Result<(), InvariantViolation> {
        if self.allow_non_scheduled_dispatch {
            return Ok(());
        }
        if dispatch.charge != 0.0 && !self.charge_allowed(t) {
            return Err(InvariantViolation::ChargeOutsideSchedule(dispatch.charge));
        }
        if dispatch.discharge != 0.0 && !self.discharge_allowed(t) {
            return Err(InvariantViolation::DischargeOutsideSchedule(dispatch.discharge));
        }
        Ok(())
    }
}

impl Default for DispatchSchedule {
    fn default() -> Self {
        Self::unrestricted()
    }
}

/// Fixed-energy dispatch inside explicit windows.
///
/// Takes precedence over setpoint-derived proposals whenever it proposes
/// anything. An infinite energy leaves the amount to the equipment, which
/// caps each leg at what it can physically do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduledDispatch {
    pub charge_schedule: PeriodSchedule,
    pub discharge_schedule: PeriodSchedule,
    /// Energy per interval while charging.
    pub charge_energy: f64,
    /// Energy per interval while discharging.
    pub discharge_energy: f64,
    /// Where both windows are active, charge alone instead of netting.
    pub charge_overrides_discharge: bool,
}

impl ScheduledDispatch {
    /// No windows yet; rates used once windows are added.
    pub fn new(charge_energy: f64, discharge_energy: f64) -> Self {
        Self {
            charge_schedule: PeriodSchedule::new(),
            discharge_schedule: PeriodSchedule::new(),
            charge_energy,
            discharge_energy,
            charge_overrides_discharge: false,
        }
    }

    /// Gives an active charge window priority over an active discharge one.
    pub fn with_charge_priority(mut self) -> Self {
        self.charge_overrides_discharge = true;
        self
    }

    /// Scheduled proposal at `t`.
    ///
    /// Overlapping charge and discharge windows net out into a single leg
    /// unless charge has priority.
    pub fn proposal(&self, t: NaiveDateTime) -> Dispatch {
        let charging = self.charge_schedule.is_active(t);
        let discharging = self.discharge_schedule.is_active(t);
        match (charging, discharging) {
            (false, false) => Dispatch::IDLE,
            (true, false) => Dispatch::charge(self.charge_energy),
            (false, true) => Dispatch::discharge(self.discharge_energy),
            (true, true) if self.charge_overrides_discharge => {
                Dispatch::charge(self.charge_energy)
            }
            (true, true) => Dispatch::from_raw(self.discharge_energy - self.charge_energy),
        }
    }

    /// Adds windows on top of the existing ones.
    pub fn append_windows(
        &mut self,
        charge: impl IntoIterator<Item = Period>,
        discharge: impl IntoIterator<Item = Period>,
    ) {
        self.charge_schedule.add_periods(charge);
        self.discharge_schedule.add_periods(discharge);
    }

    /// Clean-slate replacement of both window sets.
    pub fn replace_windows(
        &mut self,
        charge: impl IntoIterator<Item = Period>,
        discharge: impl IntoIterator<Item = Period>,
    ) {
        self.charge_schedule.clear_periods();
        self.discharge_schedule.clear_periods();
        self.append_windows(charge, discharge);
    }
}
