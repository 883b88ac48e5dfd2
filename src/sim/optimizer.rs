//! Setpoint optimizers: stateless searches over sorted demand curves.
//!
//! Every search maps a forecast window and an energy budget to a demand
//! threshold. The area above a threshold `θ` is the energy that must be
//! dispatched during the window to cap demand at `θ`.

use serde::{Deserialize, Serialize};

/// Relative slack when comparing cumulative areas against a budget.
const AREA_TOLERANCE: f64 = 1e-9;

/// How the threshold is read off the cumulative-area curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSearch {
    /// Deepest observed demand value whose area fits the budget.
    #[default]
    Step,
    /// Linear interpolation between samples so the area matches the budget
    /// exactly (bounded below by the window minimum).
    Interpolated,
}

/// What the sub-load search returns when the budget is never reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubLoadShortfall {
    /// Return `0.0`: no gross cap is required.
    #[default]
    Zero,
    /// Return the lowest gross demand in the window.
    WindowMinimum,
}

/// Cumulative area above each value of the descending demand curve.
///
/// `sorted_ascending` must be sorted ascending. Element `j` of the result is
/// the area above the `j`-th largest value, so the first element is zero and
/// the sequence is non-decreasing.
pub fn cumulative_peak_areas(sorted_ascending: &[f64]) -> Vec<f64> {
    let n = sorted_ascending.len();
    let mut areas = Vec::with_capacity(n);
    let mut total = 0.0;
    for rank in 0..n {
        if rank > 0 {
            let upper = sorted_ascending[n - rank];
            let lower = sorted_ascending[n - rank - 1];
            total += (upper - lower) * rank as f64;
        }
        areas.push(total);
    }
    areas
}

/// Index of the deepest cut whose cumulative area does not exceed `budget`.
pub fn peak_area_index(areas: &[f64], budget: f64) -> usize {
    let limit = budget + AREA_TOLERANCE * budget.abs().max(1.0);
    areas.partition_point(|a| *a <= limit).saturating_sub(1)
}

fn sorted(window: &[f64]) -> Vec<f64> {
    let mut values = window.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

/// Peak-shave threshold for `window` under an energy `budget`.
///
/// A non-positive budget returns the window peak; a budget at or above the
/// total area above the minimum returns the minimum.
///
/// # Returns
///
/// `None` for an empty window.
pub fn peak_shave_threshold(window: &[f64], budget: f64, search: ThresholdSearch) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let ascending = sorted(window);
    let n = ascending.len();
    let areas = cumulative_peak_areas(&ascending);
    let idx = peak_area_index(&areas, budget);
    let level = ascending[n - 1 - idx];
    let threshold = match search {
        ThresholdSearch::Step => level,
        ThresholdSearch::Interpolated if budget > 0.0 => {
            let shortfall = budget - areas[idx];
            (level - shortfall / (idx + 1) as f64).max(ascending[0])
        }
        ThresholdSearch::Interpolated => level,
    };
    Some(threshold)
}

/// One forecast row for the sub-load search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubLoadRow {
    /// Gross demand driving the threshold.
    pub gross: f64,
    /// Flexible portion of the gross demand.
    pub sub_load: f64,
}

/// Gross-demand cap reachable when only the sub-load can be flexed.
///
/// Walking from the peak inward, each candidate level clips every row's
/// sub-load to that row's gross exposure above the level. The first level
/// whose exposed sub-load reaches `budget` is one step too deep, so the
/// gross value of the next (less aggressive) row is returned.
///
/// # Returns
///
/// `None` for an empty window; the `shortfall` value when even the deepest
/// cut stays below the budget.
pub fn sub_load_peak_shave_limit(
    rows: &[SubLoadRow],
    budget: f64,
    shortfall: SubLoadShortfall,
) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| a.gross.total_cmp(&b.gross));
    let n = rows.len();

    for i in (0..n).rev() {
        let level = rows[i].gross;
        let exposed: f64 = rows
            .iter()
            .map(|r| r.sub_load.clamp(0.0, (r.gross - level).max(0.0)))
            .sum();
        if exposed >= budget {
            return Some(rows[(i + 1).min(n - 1)].gross);
        }
    }

    Some(match shortfall {
        SubLoadShortfall::Zero => 0.0,
        SubLoadShortfall::WindowMinimum => rows[0].gross,
    })
}

/// Time-of-use discharge threshold.
///
/// Budgets within the area above the window minimum use the peak-shave
/// search. Larger budgets lower the whole window uniformly below its
/// minimum by `(budget - cap_area) / len`.
pub fn tou_discharge_setpoint(window: &[f64], budget: f64, search: ThresholdSearch) -> Option<f64> {
    let (min, max) = bounds(window)?;
    if budget <= 0.0 {
        return Some(max);
    }
    let cap_area: f64 = window.iter().map(|v| v - min).sum();
    let extra = budget - cap_area;
    if extra > 0.0 {
        let cap_height = max - min;
        Some(max - (cap_height + extra / window.len() as f64))
    } else {
        peak_shave_threshold(window, budget, search)
    }
}

/// Time-of-use charge threshold.
///
/// The window is inverted (`max - v`) so troughs become peaks, searched
/// against the storage budget, and the result is inverted back.
pub fn tou_charge_setpoint(window: &[f64], budget: f64, search: ThresholdSearch) -> Option<f64> {
    let (_, max) = bounds(window)?;
    let inverted: Vec<f64> = window.iter().map(|v| max - v).collect();
    tou_discharge_setpoint(&inverted, budget, search).map(|t| max - t)
}

fn bounds(window: &[f64]) -> Option<(f64, f64)> {
    let mut iter = window.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}
