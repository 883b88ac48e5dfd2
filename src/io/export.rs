//! CSV export for dispatch records and flexed demand series.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::series::{Channel, DemandSeries, TimeIndexed};
use crate::sim::meter::DispatchRecord;

/// Timestamp layout shared by every export and accepted by the importer.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Column header for dispatch record export.
const RECORD_HEADER: &str = "timestamp,demand,flexed_demand,charge,discharge,net_electrical,slot,\
                             charge_setpoint,discharge_setpoint,universal_setpoint,\
                             state_of_charge,available_energy,available_storage,cycle_count,\
                             charge_capacity,discharge_capacity,charging_cop";

/// Channel column order for series export.
const SERIES_CHANNELS: [Channel; 7] = [
    Channel::DemandEnergy,
    Channel::DemandPower,
    Channel::DemandApparent,
    Channel::PowerFactor,
    Channel::GenerationEnergy,
    Channel::SubloadEnergy,
    Channel::BalanceEnergy,
];

/// Exports dispatch records to a CSV file at the given path.
///
/// Writes a header row followed by one row per step. Produces deterministic
/// output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_records(records: &[DispatchRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_records(records, io::BufWriter::new(file))
}

/// Writes dispatch records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_records(records: &[DispatchRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(RECORD_HEADER.split(',').map(str::trim))?;

    for r in records {
        wtr.write_record(&[
            r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.4}", r.demand),
            format!("{:.4}", r.flexed_demand),
            format!("{:.4}", r.dispatch.charge),
            format!("{:.4}", r.dispatch.discharge),
            format!("{:.4}", r.net_value()),
            r.setpoints.slot.to_string(),
            format!("{:.4}", r.setpoints.charge),
            format!("{:.4}", r.setpoints.discharge),
            format!("{:.4}", r.setpoints.universal),
            format!("{:.4}", r.status.state_of_charge),
            format!("{:.4}", r.status.available_energy),
            format!("{:.4}", r.status.available_storage),
            format!("{:.4}", r.status.cycle_count),
            format!("{:.4}", r.status.charge_capacity),
            format!("{:.4}", r.status.discharge_capacity),
            r.status
                .charging_cop
                .map(|cop| format!("{cop:.4}"))
                .unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports a demand series (typically the flexed one) to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_series(series: &DemandSeries, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_series(series, io::BufWriter::new(file))
}

/// Writes a demand series as CSV: a timestamp column plus one column per channel.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_series(series: &DemandSeries, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(
        std::iter::once("timestamp").chain(SERIES_CHANNELS.iter().map(|c| c.name())),
    )?;

    for (i, t) in series.timestamps().iter().enumerate() {
        let mut row = Vec::with_capacity(SERIES_CHANNELS.len() + 1);
        row.push(t.format(TIMESTAMP_FORMAT).to_string());
        row.extend(
            SERIES_CHANNELS
                .iter()
                .map(|c| format!("{:.6}", series.values(*c)[i])),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::EquipmentStatus;
    use crate::series::regular_timestamps;
    use crate::sim::dispatch::Dispatch;
    use crate::sim::dispatch_schedule::SetpointSlot;
    use crate::sim::meter::SetpointSnapshot;
    use crate::sim::setpoint::Setpoints;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid datetime")
    }

    fn make_record(hour: i64) -> DispatchRecord {
        let dispatch = if hour % 2 == 0 {
            Dispatch::charge(1.5)
        } else {
            Dispatch::discharge(2.0)
        };
        DispatchRecord {
            timestamp: t0() + TimeDelta::hours(hour),
            dispatch,
            electrical: dispatch,
            demand: 10.0,
            flexed_demand: 10.0 - dispatch.net_value(),
            setpoints: SetpointSnapshot::capture(&Setpoints::new(), SetpointSlot::Universal),
            status: EquipmentStatus {
                state_of_charge: 0.48,
                available_energy: 4.8,
                available_storage: 5.2,
                cycle_count: 0.1,
                charge_capacity: 5.0,
                discharge_capacity: 5.0,
                charging_cop: None,
            },
        }
    }

    #[test]
    fn record_header_is_stable() {
        let mut buf = Vec::new();
        write_records(&[make_record(0)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let first_line = output.as_deref().unwrap_or("").lines().next().unwrap_or("");
        assert_eq!(
            first_line,
            "timestamp,demand,flexed_demand,charge,discharge,net_electrical,slot,\
             charge_setpoint,discharge_setpoint,universal_setpoint,\
             state_of_charge,available_energy,available_storage,cycle_count,\
             charge_capacity,discharge_capacity,charging_cop"
        );
    }

    #[test]
    fn row_count_matches_step_count() {
        let records: Vec<DispatchRecord> = (0..24).map(make_record).collect();
        let mut buf = Vec::new();
        write_records(&records, &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        // 1 header + 24 data rows
        assert_eq!(output.as_deref().unwrap_or("").lines().count(), 25);
    }

    #[test]
    fn deterministic_output() {
        let records: Vec<DispatchRecord> = (0..5).map(make_record).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_records(&records, &mut buf1).ok();
        write_records(&records, &mut buf2).ok();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn record_rows_parse() {
        let records: Vec<DispatchRecord> = (0..3).map(make_record).collect();
        let mut buf = Vec::new();
        write_records(&records, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().ok();
        assert_eq!(headers.as_ref().map(csv::StringRecord::len), Some(17));

        let rows: Vec<csv::StringRecord> = rdr.records().filter_map(|r| r.ok()).collect();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            for i in 1..6 {
                assert!(row[i].parse::<f64>().is_ok(), "column {i} should parse as f64");
            }
            assert_eq!(&row[6], "universal");
            assert_eq!(&row[16], "");
        }
        assert_eq!(rows[1][5].parse::<f64>().ok(), Some(2.0));
    }

    #[test]
    fn series_export_has_every_channel() {
        let series = DemandSeries::from_energy(
            regular_timestamps(t0(), TimeDelta::hours(1), 2),
            TimeDelta::hours(1),
            vec![3.0, 4.0],
            0.8,
        )
        .expect("valid series");
        let mut buf = Vec::new();
        write_series(&series, &mut buf).ok();
        let output = String::from_utf8(buf).unwrap_or_default();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some(
                "timestamp,demand_energy,demand_power,demand_apparent,power_factor,\
                 generation_energy,subload_energy,balance_energy"
            )
        );
        assert_eq!(
            lines.next(),
            Some("2024-01-01T00:00:00,3.000000,3.000000,3.750000,0.800000,0.000000,0.000000,3.000000")
        );
    }
}
