//! CSV import of metered demand.
//!
//! The file needs a `timestamp` column and a `demand_energy` column. The
//! remaining channels are read when present and derived otherwise: power is
//! energy over the interval, the power factor defaults to 1, apparent power
//! is power over the power factor, and generation and sub-load default to
//! zero. Unknown columns, including an exported `balance_energy`, are ignored.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;

use super::export::TIMESTAMP_FORMAT;
use crate::error::ImportError;
use crate::series::{Channel, DemandSeries, MeterChannels, hours};

const TIMESTAMP_COLUMN: &str = "timestamp";

/// Reads a demand series from a CSV file.
///
/// # Errors
///
/// Returns an [`ImportError`] if the file cannot be opened or parsed, or the
/// resulting series is invalid.
pub fn import_demand_csv(path: &Path) -> Result<DemandSeries, ImportError> {
    let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    parse(reader)
}

/// Reads a demand series from any CSV source.
///
/// The sample rate is the gap between the first two rows; every later gap
/// must match it.
///
/// # Errors
///
/// Returns [`ImportError::MissingColumn`] without a timestamp or demand
/// energy column, [`ImportError::TooShort`] with fewer than two rows, and a
/// row-level error for any unparseable cell.
pub fn read_demand_csv(reader: impl Read) -> Result<DemandSeries, ImportError> {
    parse(
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader),
    )
}

fn parse<R: Read>(mut rdr: csv::Reader<R>) -> Result<DemandSeries, ImportError> {
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let ts_col =
        column(TIMESTAMP_COLUMN).ok_or_else(|| ImportError::MissingColumn(TIMESTAMP_COLUMN.into()))?;
    let energy_col = column(Channel::DemandEnergy.name())
        .ok_or_else(|| ImportError::MissingColumn(Channel::DemandEnergy.name().into()))?;
    let optional = [
        Channel::DemandPower,
        Channel::DemandApparent,
        Channel::PowerFactor,
        Channel::GenerationEnergy,
        Channel::SubloadEnergy,
    ]
    .map(|c| (c, column(c.name())));

    let mut timestamps = Vec::new();
    let mut energy = Vec::new();
    let mut extra: Vec<Vec<f64>> = vec![Vec::new(); optional.len()];

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // 1-based data row, header excluded
        let row = i + 1;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        timestamps.push(parse_timestamp(cell(ts_col)).ok_or_else(|| ImportError::Timestamp {
            row,
            value: cell(ts_col).to_string(),
        })?);
        energy.push(parse_value(cell(energy_col), row, Channel::DemandEnergy)?);
        for ((channel, idx), values) in optional.iter().zip(extra.iter_mut()) {
            if let Some(idx) = idx {
                values.push(parse_value(cell(*idx), row, *channel)?);
            }
        }
    }

    if timestamps.len() < 2 {
        return Err(ImportError::TooShort);
    }
    let sample_rate = timestamps[1] - timestamps[0];
    let dt_h = hours(sample_rate);

    let mut present = optional
        .iter()
        .zip(extra)
        .map(|((_, idx), values)| idx.map(|_| values));
    let (power, apparent, power_factor, generation, subload) = (
        present.next().flatten(),
        present.next().flatten(),
        present.next().flatten(),
        present.next().flatten(),
        present.next().flatten(),
    );

    let n = energy.len();
    let power = power.unwrap_or_else(|| {
        if dt_h > 0.0 {
            energy.iter().map(|e| e / dt_h).collect()
        } else {
            vec![0.0; n]
        }
    });
    let power_factor = power_factor.unwrap_or_else(|| vec![1.0; n]);
    let apparent = apparent.unwrap_or_else(|| {
        power
            .iter()
            .zip(&power_factor)
            .map(|(p, pf)| if *pf > 0.0 { p / pf } else { *p })
            .collect()
    });

    Ok(DemandSeries::new(
        timestamps,
        sample_rate,
        MeterChannels {
            demand_energy: Some(energy),
            demand_power: Some(power),
            demand_apparent: Some(apparent),
            power_factor: Some(power_factor),
            generation_energy: Some(generation.unwrap_or_else(|| vec![0.0; n])),
            subload_energy: subload,
        },
    )?)
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .ok()
}

fn parse_value(value: &str, row: usize, channel: Channel) -> Result<f64, ImportError> {
    value.parse::<f64>().map_err(|_| ImportError::Value {
        row,
        column: channel.name().to_string(),
        value: value.to_string(),
    })
}
