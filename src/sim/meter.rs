//! Per-step dispatch record and its consolidation into a flexed series.

use std::fmt;

use chrono::NaiveDateTime;

use super::dispatch::Dispatch;
use super::dispatch_schedule::SetpointSlot;
use super::setpoint::Setpoints;
use crate::equipment::EquipmentStatus;
use crate::series::DemandSeries;

/// Setpoint values in force when a step was dispatched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointSnapshot {
    pub charge: f64,
    pub discharge: f64,
    pub universal: f64,
    pub slot: SetpointSlot,
}

impl SetpointSnapshot {
    pub fn capture(setpoints: &Setpoints, slot: SetpointSlot) -> Self {
        Self {
            charge: setpoints.charge(),
            discharge: setpoints.discharge(),
            universal: setpoints.universal(),
            slot,
        }
    }
}

/// One realized step of a dispatch run.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub timestamp: NaiveDateTime,
    /// Realized dispatch returned by the equipment, in its own units.
    pub dispatch: Dispatch,
    /// Effect of the realized dispatch on metered electrical energy.
    pub electrical: Dispatch,
    /// Demand on the dispatch channel that drove the decision.
    pub demand: f64,
    /// `demand - net`.
    pub flexed_demand: f64,
    pub setpoints: SetpointSnapshot,
    pub status: EquipmentStatus,
}

impl DispatchRecord {
    /// Net electrical relief for the step.
    pub fn net_value(&self) -> f64 {
        self.electrical.net_value()
    }
}

impl fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | demand={:>8.2} flexed={:>8.2} | chg={:>7.2} dis={:>7.2} | \
             {:<9} sp(c={:.2} d={:.2} u={:.2}) | {}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.demand,
            self.flexed_demand,
            self.dispatch.charge,
            self.dispatch.discharge,
            self.setpoints.slot,
            self.setpoints.charge,
            self.setpoints.discharge,
            self.setpoints.universal,
            self.status,
        )
    }
}

/// Result of a complete run: the dispatch record plus the flexed series.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub records: Vec<DispatchRecord>,
    pub flexed: DemandSeries,
}

impl DispatchReport {
    /// Consolidates `records` against the `original` series.
    ///
    /// # Panics
    ///
    /// Panics if the record does not have one entry per sample.
    pub fn consolidate(
        original: &DemandSeries,
        records: Vec<DispatchRecord>,
        reduce_sub_load: bool,
    ) -> Self {
        let net: Vec<f64> = records.iter().map(DispatchRecord::net_value).collect();
        let flexed = original.flexed(&net, reduce_sub_load);
        Self { records, flexed }
    }

    pub fn total_charge(&self) -> f64 {
        self.records.iter().map(|r| r.dispatch.charge).sum()
    }

    pub fn total_discharge(&self) -> f64 {
        self.records.iter().map(|r| r.dispatch.discharge).sum()
    }

    /// Status after the last step, if any step ran.
    pub fn final_status(&self) -> Option<&EquipmentStatus> {
        self.records.last().map(|r| &r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Channel, regular_timestamps};
    use chrono::{NaiveDate, TimeDelta};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid datetime")
    }

    fn status() -> EquipmentStatus {
        EquipmentStatus {
            state_of_charge: 0.5,
            available_energy: 5.0,
            available_storage: 5.0,
            cycle_count: 0.0,
            charge_capacity: 2.0,
            discharge_capacity: 2.0,
            charging_cop: None,
        }
    }

    fn record(hour: i64, dispatch: Dispatch, demand: f64) -> DispatchRecord {
        DispatchRecord {
            timestamp: t0() + TimeDelta::hours(hour),
            dispatch,
            electrical: dispatch,
            demand,
            flexed_demand: demand - dispatch.net_value(),
            setpoints: SetpointSnapshot::capture(&Setpoints::new(), SetpointSlot::Universal),
            status: status(),
        }
    }

    #[test]
    fn consolidate_applies_net_dispatch() {
        let series = DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::hours(1), 3),
            TimeDelta::hours(1),
            vec![4.0, 9.0, 6.0],
            1.0,
        )
        .expect("valid series");
        let records = vec![
            record(0, Dispatch::charge(1.0), 4.0),
            record(1, Dispatch::discharge(2.0), 9.0),
            record(2, Dispatch::IDLE, 6.0),
        ];
        let report = DispatchReport::consolidate(&series, records, false);
        assert_eq!(report.flexed.values(Channel::DemandEnergy), &[5.0, 7.0, 6.0]);
        assert_eq!(report.total_charge(), 1.0);
        assert_eq!(report.total_discharge(), 2.0);
        assert_eq!(report.final_status().map(|s| s.state_of_charge), Some(0.5));
    }

    #[test]
    fn consolidate_uses_electrical_effect() {
        let series = DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::hours(1), 2),
            TimeDelta::hours(1),
            vec![9.0, 9.0],
            1.0,
        )
        .expect("valid series");
        let mut thermal = record(0, Dispatch::discharge(6.0), 9.0);
        thermal.electrical = Dispatch::discharge(2.0);
        let records = vec![thermal, record(1, Dispatch::IDLE, 9.0)];
        let report = DispatchReport::consolidate(&series, records, false);
        assert_eq!(report.flexed.values(Channel::DemandEnergy), &[7.0, 9.0]);
        assert_eq!(report.total_discharge(), 6.0);
    }

    #[test]
    fn display_includes_slot_and_status() {
        let line = record(0, Dispatch::discharge(2.0), 9.0).to_string();
        assert!(line.contains("2024-01-01 00:00"));
        assert!(line.contains("universal"));
        assert!(line.contains("SoC=50.0%"));
    }
}
