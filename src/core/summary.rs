use std::fmt::{Display, Formatter};

use comfy_table::{Attribute, Cell, Color, Table, modifiers, presets};

use crate::{
    core::{parameters::Tariff, trajectory::Trajectory},
    quantity::{cost::Cost, energy::KilowattHours},
};

/// Realized economics of the committed decisions.
///
/// Only the committed hours at their actual prices count here. The planned values of the
/// windows are never used: they include speculative hours that were re-planned later anyway.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Summary {
    /// Sold energy at the market price.
    pub revenue: Cost,

    /// Bought energy at the market price.
    pub purchase: Cost,

    pub grid_fees: Cost,
    pub degradation: Cost,
    pub charge: KilowattHours,
    pub discharge: KilowattHours,
    pub n_committed: usize,
    pub n_skipped: usize,
}

impl Summary {
    pub fn new(trajectory: &Trajectory, tariff: &Tariff) -> Self {
        let mut this = Self {
            revenue: Cost::ZERO,
            purchase: Cost::ZERO,
            grid_fees: Cost::ZERO,
            degradation: Cost::ZERO,
            charge: KilowattHours::ZERO,
            discharge: KilowattHours::ZERO,
            n_committed: 0,
            n_skipped: trajectory.n_skipped(),
        };
        for (row, decision) in trajectory.committed() {
            this.revenue += decision.discharge * row.price;
            this.purchase += decision.charge * row.price;
            this.grid_fees += decision.charge * tariff.grid_fee;
            this.degradation += decision.throughput() * tariff.degradation_cost;
            this.charge += decision.charge;
            this.discharge += decision.discharge;
            this.n_committed += 1;
        }
        this
    }

    pub fn profit(&self) -> Cost {
        self.revenue - self.purchase - self.grid_fees - self.degradation
    }

    /// Profit per kilowatt-hour of throughput.
    pub fn profit_per_throughput(&self) -> Option<f64> {
        let throughput = self.charge + self.discharge;
        (throughput > KilowattHours::ZERO).then(|| self.profit().0 / throughput.0)
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let profit = self.profit();
        let profit_color = if profit >= Cost::ZERO { Color::Green } else { Color::Red };
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
            .enforce_styling()
            .set_header(vec![
                Cell::from("Profit").fg(profit_color),
                Cell::from("Per kWh\nmoved"),
                Cell::from("Revenue"),
                Cell::from("Purchase"),
                Cell::from("Grid\nfees"),
                Cell::from("Degradation"),
                Cell::from("Charge").fg(Color::Green),
                Cell::from("Discharge").fg(Color::Red),
                Cell::from("Hours"),
                Cell::from("Skipped"),
            ])
            .add_row(vec![
                Cell::from(profit).fg(profit_color).add_attribute(Attribute::Bold),
                Cell::from(
                    self.profit_per_throughput()
                        .map_or_else(|| "n/a".to_string(), |rate| format!("{rate:.4} €")),
                ),
                Cell::from(self.revenue),
                Cell::from(-self.purchase),
                Cell::from(-self.grid_fees),
                Cell::from(-self.degradation),
                Cell::from(self.charge).fg(Color::Green),
                Cell::from(self.discharge).fg(Color::Red),
                Cell::from(self.n_committed),
                Cell::from(self.n_skipped).fg(if self.n_skipped == 0 {
                    Color::Reset
                } else {
                    Color::DarkYellow
                }),
            ]);
        write!(f, "{table}")
    }
}
