//! Post-hoc KPI computation from a dispatch report.

use std::fmt;

use super::meter::DispatchReport;
use crate::series::{Channel, DemandSeries};

/// Aggregate indicators derived from a complete dispatch run.
///
/// Computed post-hoc from the [`DispatchReport`] so the numbers always agree
/// with the recorded steps.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReport {
    /// Highest demand before dispatch on the reported channel.
    pub original_peak: f64,
    /// Highest demand after dispatch on the reported channel.
    pub flexed_peak: f64,
    /// `original_peak - flexed_peak`.
    pub peak_reduction: f64,
    pub total_charge: f64,
    pub total_discharge: f64,
    /// Discharged energy divided by storage capacity.
    pub equivalent_full_cycles: f64,
    /// State of charge after the final step.
    pub final_state_of_charge: f64,
    pub steps: usize,
    pub channel: Channel,
}

impl KpiReport {
    /// Computes all KPIs from a finished run.
    ///
    /// # Arguments
    ///
    /// * `original` - Series the run replayed
    /// * `report` - Output of the run
    /// * `channel` - Channel the peaks are read from
    /// * `storage_capacity` - Equipment capacity for cycle calculation
    pub fn from_report(
        original: &DemandSeries,
        report: &DispatchReport,
        channel: Channel,
        storage_capacity: f64,
    ) -> Self {
        let original_peak = peak(original.values(channel));
        let flexed_peak = peak(report.flexed.values(channel));
        let total_charge = report.total_charge();
        let total_discharge = report.total_discharge();
        let equivalent_full_cycles = if storage_capacity > 0.0 {
            total_discharge / storage_capacity
        } else {
            0.0
        };

        Self {
            original_peak,
            flexed_peak,
            peak_reduction: original_peak - flexed_peak,
            total_charge,
            total_discharge,
            equivalent_full_cycles,
            final_state_of_charge: report
                .final_status()
                .map_or(0.0, |s| s.state_of_charge),
            steps: report.records.len(),
            channel,
        }
    }
}

fn peak(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Channel:               {}", self.channel)?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(f, "Original peak:         {:.2}", self.original_peak)?;
        writeln!(f, "Flexed peak:           {:.2}", self.flexed_peak)?;
        writeln!(f, "Peak reduction:        {:.2}", self.peak_reduction)?;
        writeln!(f, "Total charge:          {:.2}", self.total_charge)?;
        writeln!(
            f,
            "Total discharge:       {:.2} ({:.2} equiv. cycles)",
            self.total_discharge, self.equivalent_full_cycles
        )?;
        write!(
            f,
            "Final state of charge: {:.1}%",
            self.final_state_of_charge * 100.0
        )
    }
}
