//! Trajectory export.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::{
    core::{
        driver::RunStatus,
        series::Timestamp,
        trajectory::{Outcome, Trajectory},
    },
    format::Format,
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Flat trajectory record.
///
/// Skipped hours have no decision, only the skip reason.
#[derive(Serialize)]
pub struct Record {
    pub time: Timestamp,
    pub price: KilowattHourRate,
    pub charge: Option<KilowattHours>,
    pub discharge: Option<KilowattHours>,

    /// Residual energy at the end of the hour.
    pub residual_energy: Option<KilowattHours>,

    pub skipped: Option<String>,
}

/// JSON export: the run status next to the records.
#[derive(Serialize)]
struct Envelope {
    status: RunStatus,
    records: Vec<Record>,
}

/// Write the trajectory as either JSON or CSV, depending on the extension.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write(path: &Path, trajectory: &Trajectory, status: RunStatus) -> Result {
    let file =
        File::create(path).with_context(|| format!("failed to create `{}`", path.display()))?;
    let writer = BufWriter::new(file);
    match Format::of(path) {
        Format::Json => write_json(writer, trajectory, status)?,
        Format::Csv => write_csv(writer, trajectory)?,
    }
    info!(len = trajectory.len(), ?status, "exported the trajectory");
    Ok(())
}

pub fn write_json(mut writer: impl Write, trajectory: &Trajectory, status: RunStatus) -> Result {
    let envelope = Envelope { status, records: records(trajectory).collect() };
    serde_json::to_writer_pretty(&mut writer, &envelope)?;
    writer.flush()?;
    Ok(())
}

/// Write one CSV row per hour.
///
/// The status has no place in a flat table, the caller is expected to report it.
pub fn write_csv(writer: impl Write, trajectory: &Trajectory) -> Result {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records(trajectory) {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn records(trajectory: &Trajectory) -> impl Iterator<Item = Record> {
    trajectory.rows().iter().map(|row| match row.outcome {
        Outcome::Committed(decision) => Record {
            time: row.time,
            price: row.price,
            charge: Some(decision.charge),
            discharge: Some(decision.discharge),
            residual_energy: Some(decision.residual_energy_after),
            skipped: None,
        },
        Outcome::Skipped(reason) => Record {
            time: row.time,
            price: row.price,
            charge: None,
            discharge: None,
            residual_energy: None,
            skipped: Some(reason.to_string()),
        },
    })
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeDelta, TimeZone};

    use super::*;
    use crate::core::{
        backend::SolverFailure,
        series::Point,
        trajectory::{Decision, Row, SkipReason},
    };

    fn trajectory() -> Trajectory {
        let start =
            FixedOffset::east_opt(3600).unwrap().with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut trajectory = Trajectory::default();
        trajectory.push(Row::new(
            0,
            Point::new(start, KilowattHourRate::from(0.05)),
            Outcome::Committed(Decision {
                charge: KilowattHours::from(100.0),
                discharge: KilowattHours::ZERO,
                residual_energy_before: KilowattHours::from(500.0),
                residual_energy_after: KilowattHours::from(590.0),
            }),
        ));
        trajectory.push(Row::new(
            1,
            Point::new(start + TimeDelta::hours(1), KilowattHourRate::from(0.3)),
            Outcome::Skipped(SkipReason::SolverFailure(SolverFailure::Infeasible)),
        ));
        trajectory
    }

    #[test]
    fn test_write_json() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &trajectory(), RunStatus::Cancelled { next_step: 2 }).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(value["status"]["kind"], "cancelled");
        assert_eq!(value["status"]["next_step"], 2);

        let records = &value["records"];
        assert_eq!(records[0]["time"], "2023-01-01T00:00:00+01:00");
        assert_eq!(records[0]["charge"], 100.0);
        assert_eq!(records[0]["residual_energy"], 590.0);
        assert!(records[0]["skipped"].is_null());
        assert_eq!(records[1]["time"], "2023-01-01T01:00:00+01:00");
        assert!(records[1]["charge"].is_null());
        assert_eq!(records[1]["skipped"], "solver failure: infeasible problem");
    }

    #[test]
    fn test_write_json_complete() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &Trajectory::default(), RunStatus::Complete).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["status"]["kind"], "complete");
        assert_eq!(value["records"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_write_csv() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &trajectory()).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time,price,charge,discharge,residual_energy,skipped");
        assert!(lines[1].starts_with("2023-01-01T00:00:00+01:00,0.05,100"), "{}", lines[1]);
        assert!(lines[1].ends_with(','), "{}", lines[1]);
        assert_eq!(lines[2], "2023-01-01T01:00:00+01:00,0.3,,,,solver failure: infeasible problem");
    }
}
