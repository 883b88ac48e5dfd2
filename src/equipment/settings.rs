//! Operating-setting adjustments that borrow energy from a running load.
//!
//! A setting change sheds part of the metered demand for a while and repays
//! it later. Shedding is reported as discharge, repayment as charge, both
//! sized from the demand seen during the interval rather than from a stored
//! state of charge.

use serde::{Deserialize, Serialize};

use super::types::{DispatchContext, Equipment, EquipmentStatus};
use crate::sim::dispatch::Dispatch;

/// Adjustable operating setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Setting {
    /// Refrigeration compressor suction pressure. Raising it lifts the COP
    /// and sheds load; lowering it afterwards recovers the lost throughput.
    CompressorSuctionPressure {
        baseline_cop: f64,
        low_pressure_cop: f64,
        high_pressure_cop: f64,
    },
    /// Fan speed throttled by a relative rate, saving power per the fan
    /// affinity laws.
    FanThrottle { throttle_rate: f64 },
}

impl Setting {
    /// Checks the setting parameters, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match *self {
            Setting::CompressorSuctionPressure {
                baseline_cop,
                low_pressure_cop,
                high_pressure_cop,
            } => {
                if !(low_pressure_cop > 0.0
                    && low_pressure_cop < baseline_cop
                    && baseline_cop < high_pressure_cop
                    && high_pressure_cop.is_finite())
                {
                    return Err(format!(
                        "compressor COPs must satisfy 0 < low < baseline < high, got \
                         low={low_pressure_cop} baseline={baseline_cop} high={high_pressure_cop}"
                    ));
                }
                Ok(())
            }
            Setting::FanThrottle { throttle_rate } => {
                if !(throttle_rate > 0.0 && throttle_rate < 1.0) {
                    return Err(format!(
                        "fan throttle rate must be in (0, 1), got {throttle_rate}"
                    ));
                }
                Ok(())
            }
        }
    }

    /// Share of demand shed while the setting is applied.
    pub fn shed_fraction(&self) -> f64 {
        match *self {
            Setting::CompressorSuctionPressure {
                baseline_cop,
                high_pressure_cop,
                ..
            } => 1.0 - baseline_cop / high_pressure_cop,
            Setting::FanThrottle { throttle_rate } => 1.0 - (1.0 - throttle_rate).powi(3),
        }
    }

    /// Share of demand added while the setting is reversed to repay.
    ///
    /// The fan repays what it last borrowed instead; see
    /// [`SettingsAdjustment`].
    pub fn repay_fraction(&self) -> f64 {
        match *self {
            Setting::CompressorSuctionPressure {
                baseline_cop,
                low_pressure_cop,
                ..
            } => baseline_cop / low_pressure_cop - 1.0,
            Setting::FanThrottle { .. } => 0.0,
        }
    }

    /// Repay window length relative to the shed window.
    pub fn repay_duration_ratio(&self) -> f64 {
        match *self {
            Setting::CompressorSuctionPressure {
                baseline_cop,
                low_pressure_cop,
                high_pressure_cop,
            } => (high_pressure_cop - baseline_cop) / (baseline_cop - low_pressure_cop),
            Setting::FanThrottle { .. } => 1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Setting::CompressorSuctionPressure { .. } => "CompressorSuctionPressure",
            Setting::FanThrottle { .. } => "FanThrottle",
        }
    }
}

/// Equipment wrapper applying a [`Setting`] against live demand.
///
/// A proposal's charge leg requests repayment and its discharge leg
/// requests shedding; each is capped by what the setting can do at the
/// current demand. Has no storage, so status reports zero capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsAdjustment {
    pub setting: Setting,
    last_borrowed: f64,
    borrowed_total: f64,
    repaid_total: f64,
}

impl SettingsAdjustment {
    /// # Panics
    ///
    /// Panics if the setting parameters are out of range.
    pub fn new(setting: Setting) -> Self {
        if let Err(reason) = setting.validate() {
            panic!("{reason}");
        }
        Self {
            setting,
            last_borrowed: 0.0,
            borrowed_total: 0.0,
            repaid_total: 0.0,
        }
    }

    /// Energy shed by the most recent discharge.
    pub fn last_borrowed(&self) -> f64 {
        self.last_borrowed
    }

    /// Total energy shed minus total energy repaid.
    pub fn outstanding(&self) -> f64 {
        self.borrowed_total - self.repaid_total
    }

    fn repay_energy(&self, demand: f64) -> f64 {
        match self.setting {
            Setting::FanThrottle { .. } => self.last_borrowed,
            Setting::CompressorSuctionPressure { .. } => demand * self.setting.repay_fraction(),
        }
    }
}

impl Equipment for SettingsAdjustment {
    fn dispatch_request(&mut self, proposal: Dispatch, context: &DispatchContext) -> Dispatch {
        let demand = context.demand.max(0.0);
        if proposal.charge > 0.0 {
            let charge = proposal.charge.min(self.repay_energy(demand)).max(0.0);
            self.repaid_total += charge;
            return Dispatch::charge(charge);
        }
        if proposal.discharge > 0.0 {
            let discharge = proposal
                .discharge
                .min(demand * self.setting.shed_fraction())
                .max(0.0);
            if let Setting::FanThrottle { .. } = self.setting {
                self.last_borrowed = discharge;
            }
            self.borrowed_total += discharge;
            return Dispatch::discharge(discharge);
        }
        Dispatch::IDLE
    }

    fn status(&self) -> EquipmentStatus {
        EquipmentStatus {
            state_of_charge: 0.0,
            available_energy: 0.0,
            available_storage: 0.0,
            cycle_count: 0.0,
            charge_capacity: 0.0,
            discharge_capacity: 0.0,
            charging_cop: None,
        }
    }

    fn available_energy(&self) -> f64 {
        0.0
    }

    fn available_storage(&self) -> f64 {
        0.0
    }

    fn charge_capacity(&self) -> f64 {
        0.0
    }

    fn discharge_capacity(&self) -> f64 {
        0.0
    }

    fn storage_capacity(&self) -> f64 {
        0.0
    }

    fn equipment_type(&self) -> &'static str {
        self.setting.name()
    }
}
