use crate::{core::series::Point, quantity::energy::KilowattHours};

/// Hour of day at which the next day's prices are published.
pub const DEFAULT_DISCLOSURE_HOUR: u32 = 13;

/// Day-ahead disclosure rule: how far into the future the prices are visible at a given hour.
///
/// Before the disclosure hour, only the rest of the current day is known. From the disclosure
/// hour on, the whole next day is known as well.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct ForecastWindow {
    #[builder(default = DEFAULT_DISCLOSURE_HOUR)]
    disclosure_hour: u32,

    /// Hour of day of the series' first sample.
    #[builder(default)]
    first_hour: u32,
}

impl ForecastWindow {
    pub const fn disclosure_hour(&self) -> u32 {
        self.disclosure_hour
    }

    /// Hour of day at the absolute step.
    #[expect(clippy::cast_possible_truncation)]
    pub const fn hour_of_day(&self, step: usize) -> u32 {
        ((self.first_hour as usize + step) % 24) as u32
    }

    /// Visible horizon length at the step, in hours.
    ///
    /// After the disclosure hour, the horizon is capped by the `n_total` series length, so that
    /// the window never reads past the end. Before it, the horizon is not capped: it is up to
    /// the caller to check that the prices are actually there.
    pub fn horizon(&self, step: usize, n_total: usize) -> usize {
        let hour_of_day = self.hour_of_day(step) as usize;
        if hour_of_day < self.disclosure_hour as usize {
            24 - hour_of_day
        } else {
            (48 - hour_of_day).min(n_total.saturating_sub(step))
        }
    }
}

/// Everything the model needs to know about a single step: visible prices and the boundary
/// condition.
///
/// Lives for exactly one step.
#[must_use]
#[derive(Copy, Clone, Debug, derive_more::Constructor)]
pub struct DecisionWindow<'a> {
    pub prices: &'a [Point],

    /// Residual energy at the start of the window.
    pub residual_energy: KilowattHours,
}

impl DecisionWindow<'_> {
    pub const fn horizon(&self) -> usize {
        self.prices.len()
    }
}
