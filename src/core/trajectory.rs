use std::fmt::{Display, Formatter};

use crate::{
    core::{
        backend::SolverFailure,
        parameters::Tariff,
        series::{Point, Timestamp},
    },
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

/// Committed single-hour action.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Decision {
    /// Energy bought from the grid.
    pub charge: KilowattHours,

    /// Energy sold to the grid.
    pub discharge: KilowattHours,

    pub residual_energy_before: KilowattHours,
    pub residual_energy_after: KilowattHours,
}

impl Decision {
    pub fn throughput(&self) -> KilowattHours {
        self.charge + self.discharge
    }

    /// Cash flow of the hour at the realized price.
    pub fn profit(&self, price: KilowattHourRate, tariff: &Tariff) -> Cost {
        self.discharge * price
            - self.charge * (price + tariff.grid_fee)
            - self.throughput() * tariff.degradation_cost
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer prices are left in the series than the horizon requires.
    InsufficientForecastData { required: usize, available: usize },

    SolverFailure(SolverFailure),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientForecastData { required, available } => {
                write!(f, "insufficient forecast data: {available} of {required} hours")
            }
            Self::SolverFailure(failure) => write!(f, "solver failure: {failure}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Outcome {
    Committed(Decision),
    Skipped(SkipReason),
}

/// Trajectory row, keyed by the hour it describes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Row {
    /// Absolute step, which is also the position in the source series.
    pub step: usize,

    pub time: Timestamp,

    /// Realized price of the hour.
    pub price: KilowattHourRate,

    pub outcome: Outcome,
}

impl Row {
    pub const fn new(step: usize, point: Point, outcome: Outcome) -> Self {
        Self { step, time: point.time, price: point.price, outcome }
    }

    pub const fn decision(&self) -> Option<&Decision> {
        match &self.outcome {
            Outcome::Committed(decision) => Some(decision),
            Outcome::Skipped(_) => None,
        }
    }
}

/// Append-only log of the hours the driver went through.
///
/// Skipped hours stay in as explicit gaps, so that every row keeps its own timestamp.
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct Trajectory(Vec<Row>);

impl Trajectory {
    /// # Panics
    ///
    /// Rows must be appended in strictly increasing time order.
    pub(crate) fn push(&mut self, row: Row) {
        if let Some(last) = self.0.last() {
            assert!(last.time < row.time, "trajectory rows must be ordered by time");
        }
        self.0.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.0
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row for the hour starting exactly at `time`, if the driver got there.
    pub fn get(&self, time: Timestamp) -> Option<&Row> {
        self.0.binary_search_by_key(&time, |row| row.time).ok().map(|index| &self.0[index])
    }

    pub fn committed(&self) -> impl Iterator<Item = (&Row, &Decision)> {
        self.0.iter().filter_map(|row| row.decision().map(|decision| (row, decision)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&Row, SkipReason)> {
        self.0.iter().filter_map(|row| match row.outcome {
            Outcome::Skipped(reason) => Some((row, reason)),
            Outcome::Committed(_) => None,
        })
    }

    pub fn n_committed(&self) -> usize {
        self.committed().count()
    }

    pub fn n_skipped(&self) -> usize {
        self.skipped().count()
    }
}
