use std::{ops::ControlFlow, time::Instant};

use bon::bon;
use serde::Serialize;

use crate::{
    core::{
        backend::{Backend, SolverFailure},
        model::{FirstHour, HorizonModel},
        parameters::{BatteryParameters, ParameterError, Tariff},
        series::PriceSeries,
        trajectory::{Decision, Outcome, Row, SkipReason, Trajectory},
        window::{DEFAULT_DISCLOSURE_HOUR, DecisionWindow, ForecastWindow},
    },
    prelude::*,
    quantity::energy::KilowattHours,
};

/// The final hours of the series are never decided: there is no reliable forecast for them.
pub const EXCLUDED_TAIL_HOURS: usize = 12;

/// Receding-horizon state machine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum State {
    /// The step is about to be decided.
    Running { step: usize, residual_energy: KilowattHours },

    /// The step has just been skipped, the residual energy is unchanged.
    Skipped { step: usize, residual_energy: KilowattHours, reason: SkipReason },

    Finished { residual_energy: KilowattHours },
}

impl State {
    pub const fn residual_energy(&self) -> KilowattHours {
        match self {
            Self::Running { residual_energy, .. }
            | Self::Skipped { residual_energy, .. }
            | Self::Finished { residual_energy } => *residual_energy,
        }
    }

    /// The step that is going to be decided next, if any.
    pub const fn next_step(&self) -> Option<usize> {
        match self {
            Self::Running { step, .. } => Some(*step),
            Self::Skipped { step, .. } => Some(*step + 1),
            Self::Finished { .. } => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// All the steps were decided or skipped.
    Complete,

    /// Stopped by the progress hook before `next_step`.
    Cancelled { next_step: usize },

    /// Stopped because the solver failed more often than allowed.
    Aborted { n_solver_failures: usize },
}

/// Snapshot passed to the progress hook after every transition.
#[derive(Copy, Clone, Debug)]
pub struct Progress {
    pub state: State,

    /// The step at which the run ends.
    pub end_step: usize,

    pub n_committed: usize,
    pub n_skipped: usize,
}

/// Result of a whole run.
///
/// Cancelled and aborted runs carry the trajectory built so far.
#[must_use]
pub struct Run {
    pub trajectory: Trajectory,
    pub status: RunStatus,
    pub residual_energy: KilowattHours,
}

/// Rolling driver: decides one hour at a time given only the prices visible at that hour.
pub struct Driver<'a, B> {
    series: &'a PriceSeries,
    backend: B,
    battery: BatteryParameters,
    tariff: Tariff,
    window: ForecastWindow,
    end_step: usize,
    max_solver_failures: Option<usize>,
    n_solver_failures: usize,
    n_committed: usize,
    state: State,
    trajectory: Trajectory,
}

#[bon]
impl<'a, B: Backend> Driver<'a, B> {
    /// Validate the parameters and set up the initial state.
    ///
    /// The battery starts half-full at the first hour of the series. The run is aborted once the
    /// solver fails more than `max_solver_failures` times, if specified.
    #[builder]
    pub fn new(
        series: &'a PriceSeries,
        backend: B,
        battery: BatteryParameters,
        tariff: Tariff,
        #[builder(default = DEFAULT_DISCLOSURE_HOUR)] disclosure_hour: u32,
        #[builder(default = EXCLUDED_TAIL_HOURS)] excluded_tail_hours: usize,
        max_solver_failures: Option<usize>,
    ) -> Result<Self, ParameterError> {
        battery.validate()?;
        tariff.validate()?;
        if disclosure_hour > 23 {
            return Err(ParameterError::DisclosureHour(disclosure_hour));
        }

        let end_step = series.len().saturating_sub(excluded_tail_hours);
        let residual_energy = battery.initial_residual_energy();
        let state = if end_step == 0 {
            State::Finished { residual_energy }
        } else {
            State::Running { step: 0, residual_energy }
        };
        Ok(Self {
            series,
            backend,
            battery,
            tariff,
            window: ForecastWindow::builder()
                .disclosure_hour(disclosure_hour)
                .first_hour(series.first_hour())
                .build(),
            end_step,
            max_solver_failures,
            n_solver_failures: 0,
            n_committed: 0,
            state,
            trajectory: Trajectory::default(),
        })
    }
}

impl<B: Backend> Driver<'_, B> {
    pub const fn state(&self) -> State {
        self.state
    }

    pub const fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub const fn end_step(&self) -> usize {
        self.end_step
    }

    pub fn progress(&self) -> Progress {
        Progress {
            state: self.state,
            end_step: self.end_step,
            n_committed: self.n_committed,
            n_skipped: self.trajectory.len() - self.n_committed,
        }
    }

    /// Run till the end.
    pub fn run(self) -> Run {
        self.run_with(|_| ControlFlow::Continue(()))
    }

    /// Run till the end, calling the hook after every transition.
    ///
    /// The hook may stop the run by returning [`ControlFlow::Break`].
    #[instrument(skip_all, fields(end_step = self.end_step))]
    pub fn run_with(mut self, mut on_progress: impl FnMut(&Progress) -> ControlFlow<()>) -> Run {
        let start_instant = Instant::now();
        info!(n_hours = self.series.len(), "optimizing…");

        let status = loop {
            let state = self.advance();
            if let Some(max_solver_failures) = self.max_solver_failures
                && self.n_solver_failures > max_solver_failures
            {
                error!(
                    n_solver_failures = self.n_solver_failures,
                    max_solver_failures, "too many solver failures",
                );
                break RunStatus::Aborted { n_solver_failures: self.n_solver_failures };
            }
            let Some(next_step) = state.next_step() else {
                break RunStatus::Complete;
            };
            if on_progress(&self.progress()).is_break() {
                warn!(next_step, "cancelled");
                break RunStatus::Cancelled { next_step };
            }
        };

        info!(
            elapsed = ?start_instant.elapsed(),
            ?status,
            n_committed = self.n_committed,
            n_solver_failures = self.n_solver_failures,
            "optimized",
        );
        Run { residual_energy: self.state.residual_energy(), trajectory: self.trajectory, status }
    }

    /// Make a single transition.
    pub fn advance(&mut self) -> State {
        self.state = match self.state {
            State::Running { step, residual_energy } => self.decide(step, residual_energy),
            State::Skipped { step, residual_energy, .. } => self.proceed(step + 1, residual_energy),
            finished @ State::Finished { .. } => finished,
        };
        self.state
    }

    fn proceed(&self, step: usize, residual_energy: KilowattHours) -> State {
        if step >= self.end_step {
            State::Finished { residual_energy }
        } else {
            State::Running { step, residual_energy }
        }
    }

    fn decide(&mut self, step: usize, residual_energy: KilowattHours) -> State {
        let point = self.series[step];
        let horizon = self.window.horizon(step, self.series.len());
        let prices = self.series.slice(step, horizon);
        if horizon == 0 || prices.len() != horizon {
            let reason =
                SkipReason::InsufficientForecastData { required: horizon, available: prices.len() };
            return self.skip(step, residual_energy, reason);
        }

        let window = DecisionWindow::new(prices, residual_energy);
        match self.solve(&window) {
            Ok(decision) => {
                trace!(
                    step,
                    time = %point.time,
                    horizon,
                    charge = ?decision.charge,
                    discharge = ?decision.discharge,
                    residual_energy = ?decision.residual_energy_after,
                    "committed",
                );
                self.trajectory.push(Row::new(step, point, Outcome::Committed(decision)));
                self.n_committed += 1;
                self.proceed(step + 1, decision.residual_energy_after)
            }
            Err(failure) => {
                self.n_solver_failures += 1;
                self.skip(step, residual_energy, SkipReason::SolverFailure(failure))
            }
        }
    }

    fn skip(&mut self, step: usize, residual_energy: KilowattHours, reason: SkipReason) -> State {
        let point = self.series[step];
        warn!(step, time = %point.time, %reason, "skipped");
        self.trajectory.push(Row::new(step, point, Outcome::Skipped(reason)));
        State::Skipped { step, residual_energy, reason }
    }

    fn solve(&self, window: &DecisionWindow<'_>) -> Result<Decision, SolverFailure> {
        let model = HorizonModel::builder()
            .window(window)
            .battery(self.battery)
            .tariff(self.tariff)
            .build();
        let assignment = self.backend.solve(&model.program)?;
        trace!(planned_value = model.planned_value(&assignment), "solved");
        commit(&self.battery, window.residual_energy, model.first_hour(&assignment))
    }
}

/// Turn the raw first-hour solution into a decision.
///
/// Solver noise within the tolerance is snapped onto the bounds, anything beyond is a numerical
/// failure. The residual energy is then recomputed from the decision so that the balance holds
/// exactly.
fn commit(
    battery: &BatteryParameters,
    residual_energy_before: KilowattHours,
    first_hour: FirstHour,
) -> Result<Decision, SolverFailure> {
    let tolerance = battery.tolerance();
    let max_energy = battery.max_energy_per_step();
    let charge = snap(first_hour.charge, max_energy, tolerance)?;
    let discharge = snap(first_hour.discharge, max_energy, tolerance)?;
    let residual_energy_after =
        battery.residual_energy_after(residual_energy_before, charge, discharge);
    if (first_hour.residual_energy_after - residual_energy_after).abs() > tolerance {
        debug!(
            planned = ?first_hour.residual_energy_after,
            ?residual_energy_after,
            "the solution violates the energy balance",
        );
        return Err(SolverFailure::Numerical);
    }
    Ok(Decision {
        charge,
        discharge,
        residual_energy_before,
        residual_energy_after: snap(residual_energy_after, battery.capacity, tolerance)?,
    })
}

/// Snap the value onto `[0, max]` if it is within the tolerance.
fn snap(
    value: KilowattHours,
    max: KilowattHours,
    tolerance: KilowattHours,
) -> Result<KilowattHours, SolverFailure> {
    if value.is_finite() && value >= -tolerance && value <= max + tolerance {
        Ok(value.clamp(KilowattHours::ZERO, max))
    } else {
        Err(SolverFailure::Numerical)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::{
            backend::Clarabel,
            parameters::tests::{battery, tariff},
            program::{Assignment, LinearProgram},
            series::tests::{midnight, series_from},
            summary::Summary,
        },
        quantity::cost::Cost,
    };

    /// Delegates to Clarabel, but fails the calls for which `fails` returns `true`.
    struct Flaky<F> {
        n_calls: Cell<usize>,
        fails: F,
    }

    impl<F: Fn(usize) -> bool> Flaky<F> {
        const fn new(fails: F) -> Self {
            Self { n_calls: Cell::new(0), fails }
        }
    }

    impl<F: Fn(usize) -> bool> Backend for Flaky<F> {
        fn solve(&self, program: &LinearProgram) -> Result<Assignment, SolverFailure> {
            let call = self.n_calls.get();
            self.n_calls.set(call + 1);
            if (self.fails)(call) { Err(SolverFailure::Numerical) } else { Clarabel.solve(program) }
        }
    }

    /// Two days of cheap mornings and expensive afternoons.
    fn two_days() -> PriceSeries {
        let day: Vec<f64> = (0..24).map(|hour| if hour < 12 { 0.05 } else { 0.30 }).collect();
        series_from(midnight(), &[day.as_slice(), day.as_slice()].concat())
    }

    /// Three days of a wavy price curve.
    fn three_days() -> PriceSeries {
        let prices: Vec<f64> =
            (0..72).map(|hour| 0.2 + 0.1 * (f64::from(hour) * 0.3).sin()).collect();
        series_from(midnight(), &prices)
    }

    fn run(series: &PriceSeries, degradation_cost: f64) -> Run {
        Driver::builder()
            .series(series)
            .backend(Clarabel)
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, degradation_cost))
            .build()
            .unwrap()
            .run()
    }

    fn residual_energy_at(run: &Run, step: usize) -> f64 {
        run.trajectory.rows()[step].decision().unwrap().residual_energy_after.0
    }

    #[test]
    fn test_committed_invariants() {
        let series = three_days();
        let run = run(&series, 0.01);
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.trajectory.n_committed(), 72 - EXCLUDED_TAIL_HOURS);
        assert_eq!(run.trajectory.n_skipped(), 0);

        let mut expected_before = 500.0;
        for (row, decision) in run.trajectory.committed() {
            assert_eq!(row.time, series[row.step].time);
            assert_abs_diff_eq!(decision.residual_energy_before.0, expected_before);
            assert!(decision.charge.0 >= 0.0 && decision.charge.0 <= 500.0);
            assert!(decision.discharge.0 >= 0.0 && decision.discharge.0 <= 500.0);
            assert!(decision.residual_energy_after.0 >= 0.0);
            assert!(decision.residual_energy_after.0 <= 1000.0);
            let balance = decision.residual_energy_before.0 + decision.charge.0 * 0.9
                - decision.discharge.0 / 0.9;
            assert_abs_diff_eq!(decision.residual_energy_after.0, balance, epsilon = 1e-4);
            expected_before = decision.residual_energy_after.0;
        }
        assert_abs_diff_eq!(run.residual_energy.0, expected_before);
    }

    #[test]
    fn test_flat_prices_never_charge() {
        let series = series_from(midnight(), &[0.2; 48]);
        let run = run(&series, 0.01);
        assert_eq!(run.trajectory.n_committed(), 36);

        // Buying back is never worth it, so the initial energy is only ever sold:
        for (_, decision) in run.trajectory.committed() {
            assert_abs_diff_eq!(decision.charge.0, 0.0, epsilon = 1e-3);
            assert!(decision.residual_energy_after.0 <= decision.residual_energy_before.0 + 1e-3);
        }
        assert!(run.residual_energy.0 < 500.0);

        let summary = Summary::new(&run.trajectory, &tariff(0.04, 0.01));
        assert_abs_diff_eq!(
            summary.profit().0,
            summary.discharge.0 * (0.2 - 0.01),
            epsilon = 1e-2,
        );
    }

    #[test]
    fn test_arbitrage_scenario() {
        let series = two_days();
        let run = run(&series, 0.01);
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.trajectory.n_committed(), 36);

        let (mut cheap_charge, mut cheap_discharge) = (0.0, 0.0);
        let (mut expensive_charge, mut expensive_discharge) = (0.0, 0.0);
        for (row, decision) in run.trajectory.committed() {
            if row.step % 24 < 12 {
                cheap_charge += decision.charge.0;
                cheap_discharge += decision.discharge.0;
            } else {
                expensive_charge += decision.charge.0;
                expensive_discharge += decision.discharge.0;
            }
        }
        assert!(cheap_charge > 100.0, "{cheap_charge}");
        assert!(expensive_discharge > 100.0, "{expensive_discharge}");
        assert!(expensive_charge < 1.0, "{expensive_charge}");
        assert!(cheap_discharge < 1.0, "{cheap_discharge}");

        // Rises in the morning, then falls in the afternoon:
        assert!(residual_energy_at(&run, 11) > 900.0);
        assert!(residual_energy_at(&run, 23) < 100.0);

        let summary = Summary::new(&run.trajectory, &tariff(0.04, 0.01));
        assert!(summary.profit() > Cost::ZERO);
    }

    #[test]
    fn test_profit_cross_check() {
        let series = three_days();
        let run = run(&series, 0.01);
        let summary = Summary::new(&run.trajectory, &tariff(0.04, 0.01));

        let mut profit = 0.0;
        for row in run.trajectory.rows() {
            if let Outcome::Committed(decision) = row.outcome {
                let price = series[row.step].price.0;
                profit += decision.discharge.0 * price
                    - decision.charge.0 * (price + 0.04)
                    - 0.01 * (decision.charge.0 + decision.discharge.0);
            }
        }
        assert_abs_diff_eq!(summary.profit().0, profit, epsilon = 1e-6);
    }

    #[test]
    fn test_degradation_never_increases_profit() {
        let series = two_days();
        let profits: Vec<f64> = [0.0, 0.01, 0.05]
            .into_iter()
            .map(|degradation_cost| {
                let run = run(&series, degradation_cost);
                Summary::new(&run.trajectory, &tariff(0.04, degradation_cost)).profit().0
            })
            .collect();
        assert!(profits[0] >= profits[1] - 1e-3, "{profits:?}");
        assert!(profits[1] >= profits[2] - 1e-3, "{profits:?}");
    }

    #[test]
    fn test_tail_skipped() {
        // The second day is cut short, so its morning windows cannot be filled:
        let series = series_from(midnight(), &[0.2; 42]);
        let run = run(&series, 0.01);
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.trajectory.len(), 30);
        assert_eq!(run.trajectory.n_committed(), 24);
        assert_eq!(run.trajectory.n_skipped(), 6);

        let (row, reason) = run.trajectory.skipped().next().unwrap();
        assert_eq!(row.step, 24);
        assert_eq!(row.time, series[24].time);
        assert_eq!(reason, SkipReason::InsufficientForecastData { required: 24, available: 18 });
        assert_abs_diff_eq!(run.residual_energy.0, residual_energy_at(&run, 23));
    }

    #[test]
    fn test_solver_failure_skipped() {
        let series = three_days();
        let backend = Flaky::new(|call| call == 5);
        let run = Driver::builder()
            .series(&series)
            .backend(&backend)
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .build()
            .unwrap()
            .run();

        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.trajectory.len(), 60);
        assert_eq!(run.trajectory.n_skipped(), 1);

        let skipped = run.trajectory.get(series[5].time).unwrap();
        assert_eq!(skipped.step, 5);
        assert_eq!(
            skipped.outcome,
            Outcome::Skipped(SkipReason::SolverFailure(SolverFailure::Numerical)),
        );

        // The residual energy is carried over the gap unchanged:
        let next = run.trajectory.get(series[6].time).unwrap().decision().unwrap();
        assert_abs_diff_eq!(next.residual_energy_before.0, residual_energy_at(&run, 4));

        // Later rows stay at their own hours:
        for row in run.trajectory.rows() {
            assert_eq!(row.time, series[row.step].time);
        }
    }

    #[test]
    fn test_aborted() {
        let series = three_days();
        let run = Driver::builder()
            .series(&series)
            .backend(Flaky::new(|_| true))
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .max_solver_failures(2)
            .build()
            .unwrap()
            .run();
        assert_eq!(run.status, RunStatus::Aborted { n_solver_failures: 3 });
        assert_eq!(run.trajectory.len(), 3);
        assert_eq!(run.trajectory.n_skipped(), 3);
        assert_abs_diff_eq!(run.residual_energy.0, 500.0);
    }

    #[test]
    fn test_cancelled() {
        let series = three_days();
        let run = Driver::builder()
            .series(&series)
            .backend(Clarabel)
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .build()
            .unwrap()
            .run_with(|progress| {
                if progress.n_committed >= 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
        assert_eq!(run.status, RunStatus::Cancelled { next_step: 5 });
        assert_eq!(run.trajectory.len(), 5);
        assert_abs_diff_eq!(run.residual_energy.0, residual_energy_at(&run, 4));
    }

    #[test]
    fn test_invalid_parameters() {
        let series = three_days();
        let backend = Flaky::new(|_| false);

        let result = Driver::builder()
            .series(&series)
            .backend(&backend)
            .battery(battery(1000.0, 500.0, 1.5))
            .tariff(tariff(0.04, 0.01))
            .build();
        assert!(matches!(result, Err(ParameterError::Efficiency(_))));

        let result = Driver::builder()
            .series(&series)
            .backend(&backend)
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(-0.04, 0.01))
            .build();
        assert!(matches!(result, Err(ParameterError::GridFee(_))));

        let result = Driver::builder()
            .series(&series)
            .backend(&backend)
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .disclosure_hour(24)
            .build();
        assert!(matches!(result, Err(ParameterError::DisclosureHour(24))));

        assert_eq!(backend.n_calls.get(), 0);
    }

    #[test]
    fn test_transitions() {
        let series = series_from(midnight(), &[0.2; 36]);
        let mut driver = Driver::builder()
            .series(&series)
            .backend(Flaky::new(|call| call == 0))
            .battery(battery(1000.0, 500.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .build()
            .unwrap();
        let initial = KilowattHours::from(500.0);
        assert_eq!(driver.end_step(), 24);
        assert_eq!(driver.state(), State::Running { step: 0, residual_energy: initial });

        assert_eq!(
            driver.advance(),
            State::Skipped {
                step: 0,
                residual_energy: initial,
                reason: SkipReason::SolverFailure(SolverFailure::Numerical),
            },
        );
        assert_eq!(driver.state().next_step(), Some(1));
        assert_eq!(driver.advance(), State::Running { step: 1, residual_energy: initial });
        assert!(matches!(driver.advance(), State::Running { step: 2, .. }));

        let progress = driver.progress();
        assert_eq!(progress.n_committed, 1);
        assert_eq!(progress.n_skipped, 1);

        while driver.state().next_step().is_some() {
            driver.advance();
        }
        assert!(matches!(driver.state(), State::Finished { .. }));
        assert_eq!(driver.trajectory().len(), 24);
        assert_eq!(driver.advance(), driver.state());
    }

    #[test]
    fn test_series_shorter_than_tail() {
        let series = series_from(midnight(), &[0.2; 12]);
        let run = run(&series, 0.01);
        assert_eq!(run.status, RunStatus::Complete);
        assert!(run.trajectory.is_empty());
        assert_abs_diff_eq!(run.residual_energy.0, 500.0);
    }
}
