use bon::bon;

use crate::{
    core::{
        parameters::{BatteryParameters, Tariff},
        program::{Assignment, Bounds, Constraint, LinearExpression, LinearProgram, Sense, Variable},
        window::DecisionWindow,
    },
    quantity::energy::KilowattHours,
};

/// Battery dispatch linear program over a single visible horizon.
///
/// Every step gets a fresh instance: nothing is carried over but the boundary residual energy.
#[must_use]
pub struct HorizonModel {
    pub program: LinearProgram,

    /// Energy bought from the grid, per hour.
    pub charge: Vec<Variable>,

    /// Energy sold to the grid, per hour.
    pub discharge: Vec<Variable>,

    /// Residual energy at the hour boundaries, one more than the hours.
    pub residual_energy: Vec<Variable>,
}

/// Raw solver output for the first hour of the window.
#[derive(Copy, Clone, Debug)]
pub struct FirstHour {
    pub charge: KilowattHours,
    pub discharge: KilowattHours,
    pub residual_energy_after: KilowattHours,
}

#[bon]
impl HorizonModel {
    /// Build the problem:
    ///
    /// - `0 ≤ charge[i] ≤ max_power` and `0 ≤ discharge[i] ≤ max_power`;
    /// - `soc[0] = residual_energy`;
    /// - `soc[i + 1] = soc[i] + charge[i]·η − discharge[i]/η` and `0 ≤ soc[i + 1] ≤ capacity`;
    /// - maximise `Σ discharge[i]·p[i] − Σ charge[i]·(p[i] + fee) − degradation·Σ(charge[i] + discharge[i])`.
    #[builder]
    pub fn new(window: &DecisionWindow<'_>, battery: BatteryParameters, tariff: Tariff) -> Self {
        let horizon = window.horizon();
        let max_energy = battery.max_energy_per_step().0;
        let mut program = LinearProgram::new(Sense::Maximise);

        let charge = program.add_variables(Bounds::NON_NEGATIVE, horizon);
        let discharge = program.add_variables(Bounds::NON_NEGATIVE, horizon);
        let residual_energy = program.add_variables(Bounds::FREE, horizon + 1);

        program.add_constraint(Constraint::equal(residual_energy[0], window.residual_energy.0));
        for hour in 0..horizon {
            program.add_constraint(Constraint::less_or_equal(charge[hour], max_energy));
            program.add_constraint(Constraint::less_or_equal(discharge[hour], max_energy));

            // soc[i + 1] − soc[i] − charge[i]·η + discharge[i]/η = 0:
            program.add_constraint(Constraint::equal(
                LinearExpression::from(residual_energy[hour + 1])
                    .with_term(-1.0, residual_energy[hour])
                    .with_term(-battery.efficiency, charge[hour])
                    .with_term(1.0 / battery.efficiency, discharge[hour]),
                0.0,
            ));

            program.add_constraint(Constraint::greater_or_equal(residual_energy[hour + 1], 0.0));
            program.add_constraint(Constraint::less_or_equal(
                residual_energy[hour + 1],
                battery.capacity.0,
            ));
        }

        let mut objective = LinearExpression::default();
        for (hour, point) in window.prices.iter().enumerate() {
            let price = point.price.0;
            objective.add_term(price - tariff.degradation_cost.0, discharge[hour]);
            objective.add_term(
                -(price + tariff.grid_fee.0 + tariff.degradation_cost.0),
                charge[hour],
            );
        }
        program.set_objective(objective);

        Self { program, charge, discharge, residual_energy }
    }
}

impl HorizonModel {
    pub fn horizon(&self) -> usize {
        self.charge.len()
    }

    /// The only part of the plan that is ever committed.
    pub fn first_hour(&self, assignment: &Assignment) -> FirstHour {
        FirstHour {
            charge: KilowattHours::from(assignment[self.charge[0]]),
            discharge: KilowattHours::from(assignment[self.discharge[0]]),
            residual_energy_after: KilowattHours::from(assignment[self.residual_energy[1]]),
        }
    }

    /// Speculative value of the whole plan.
    ///
    /// It assumes that all the planned hours are executed as planned, which never happens.
    pub fn planned_value(&self, assignment: &Assignment) -> f64 {
        self.program.objective().evaluate(assignment)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::{
        backend::{Backend, Clarabel},
        parameters::tests::{battery, tariff},
        series::tests::{midnight, series_from},
    };

    #[test]
    fn test_structure() {
        let series = series_from(midnight(), &[0.1, 0.2, 0.3]);
        let window = DecisionWindow::new(series.as_slice(), KilowattHours::from(5.0));
        let model = HorizonModel::builder()
            .window(&window)
            .battery(battery(10.0, 5.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .build();

        assert_eq!(model.horizon(), 3);
        assert_eq!(model.residual_energy.len(), 4);
        assert_eq!(model.program.n_variables(), 3 + 3 + 4);
        // Boundary condition, then five per hour:
        assert_eq!(model.program.constraints().len(), 1 + 5 * 3);

        let coefficients = model.program.objective().terms();
        assert_abs_diff_eq!(coefficients[0].0, 0.1 - 0.01);
        assert_abs_diff_eq!(coefficients[1].0, -(0.1 + 0.04 + 0.01));
    }

    #[test]
    fn test_idle_is_feasible() {
        let series = series_from(midnight(), &[0.1; 5]);
        let window = DecisionWindow::new(series.as_slice(), KilowattHours::from(5.0));
        let model = HorizonModel::builder()
            .window(&window)
            .battery(battery(10.0, 5.0, 0.9))
            .tariff(tariff(0.04, 0.01))
            .build();
        let mut idle = vec![0.0; model.program.n_variables()];
        for variable in &model.residual_energy {
            idle[variable.index()] = 5.0;
        }
        assert!(model.program.is_feasible(&Assignment::from(idle), 1e-9));
    }

    #[test]
    fn test_solve_arbitrage() {
        // Cheap first hour, expensive second hour:
        let series = series_from(midnight(), &[0.05, 0.50]);
        let window = DecisionWindow::new(series.as_slice(), KilowattHours::ZERO);
        let model = HorizonModel::builder()
            .window(&window)
            .battery(battery(10.0, 5.0, 1.0))
            .tariff(tariff(0.0, 0.0))
            .build();
        let assignment = Clarabel.solve(&model.program).unwrap();
        let first_hour = model.first_hour(&assignment);
        assert_abs_diff_eq!(first_hour.charge.0, 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(first_hour.discharge.0, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(first_hour.residual_energy_after.0, 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(assignment[model.discharge[1]], 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(model.planned_value(&assignment), 5.0 * (0.50 - 0.05), epsilon = 1e-4);
    }

    #[test]
    fn test_solve_respects_capacity() {
        let series = series_from(midnight(), &[0.05, 0.05, 0.50, 0.50]);
        let window = DecisionWindow::new(series.as_slice(), KilowattHours::from(8.0));
        let model = HorizonModel::builder()
            .window(&window)
            .battery(battery(10.0, 5.0, 0.9))
            .tariff(tariff(0.0, 0.0))
            .build();
        let assignment = Clarabel.solve(&model.program).unwrap();
        assert!(model.program.is_feasible(&assignment, 1e-5));
        for variable in &model.residual_energy {
            assert!(assignment[*variable] <= 10.0 + 1e-5);
        }
    }
}
