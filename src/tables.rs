use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;

use crate::{
    core::{
        parameters::Tariff,
        series::PriceSeries,
        trajectory::{Outcome, Trajectory},
        window::ForecastWindow,
    },
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

#[must_use]
pub fn build_steps_table(trajectory: &Trajectory, tariff: &Tariff) -> Table {
    let median_price = trajectory
        .rows()
        .iter()
        .map(|row| row.price)
        .sorted()
        .nth(trajectory.len() / 2)
        .unwrap_or(KilowattHourRate::ZERO);

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec![
        "Time",
        "Price",
        "Charge",
        "Discharge",
        "Before",
        "After",
        "Profit",
        "Note",
    ]);
    for row in trajectory.rows() {
        let mut cells = vec![
            Cell::new(row.time.format("%Y-%m-%d %H:%M")),
            Cell::new(row.price).fg(if row.price >= median_price {
                Color::Red
            } else {
                Color::Green
            }),
        ];
        match row.outcome {
            Outcome::Committed(decision) => {
                let profit = decision.profit(row.price, tariff);
                cells.extend([
                    energy_cell(decision.charge, Color::Green),
                    energy_cell(decision.discharge, Color::Red),
                    Cell::new(decision.residual_energy_before)
                        .set_alignment(CellAlignment::Right)
                        .add_attribute(Attribute::Dim),
                    Cell::new(decision.residual_energy_after).set_alignment(CellAlignment::Right),
                    Cell::new(profit).set_alignment(CellAlignment::Right).fg(
                        if profit >= Cost::ZERO { Color::Green } else { Color::Red },
                    ),
                    Cell::new(""),
                ]);
            }
            Outcome::Skipped(reason) => {
                cells.extend((0..5).map(|_| Cell::new("-").add_attribute(Attribute::Dim)));
                cells.push(Cell::new(reason).fg(Color::DarkYellow));
            }
        }
        table.add_row(cells);
    }
    table
}

/// Dims the idle hours.
fn energy_cell(energy: KilowattHours, color: Color) -> Cell {
    let cell = Cell::new(energy).set_alignment(CellAlignment::Right);
    if energy.abs() < KilowattHours::from(0.05) {
        cell.add_attribute(Attribute::Dim)
    } else {
        cell.fg(color)
    }
}

/// Visible horizon at up to `n_steps` steps since `start`.
#[must_use]
pub fn build_horizons_table(
    series: &PriceSeries,
    window: &ForecastWindow,
    start: usize,
    n_steps: usize,
) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["Step", "Time", "Hour", "Horizon", "Visible until"]);
    let start = start.min(series.len());
    for step in start..start.saturating_add(n_steps).min(series.len()) {
        let horizon = window.horizon(step, series.len());
        let visible = series.slice(step, horizon);
        let is_disclosed = window.hour_of_day(step) >= window.disclosure_hour();
        table.add_row(vec![
            Cell::new(step).add_attribute(Attribute::Dim),
            Cell::new(series[step].time.format("%Y-%m-%d %H:%M")),
            Cell::new(window.hour_of_day(step)).set_alignment(CellAlignment::Right),
            Cell::new(horizon)
                .set_alignment(CellAlignment::Right)
                .fg(if is_disclosed { Color::Green } else { Color::Reset }),
            match visible.last() {
                Some(last) if visible.len() == horizon => {
                    Cell::new(last.time.format("%Y-%m-%d %H:%M"))
                }
                _ => Cell::new(format!("{} of {horizon} hours", visible.len())).fg(Color::Red),
            },
        ]);
    }
    table
}
