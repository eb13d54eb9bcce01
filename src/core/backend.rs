//! Linear program solver backends.

use good_lp::{
    Expression,
    ProblemVariables,
    ResolutionError,
    Solution,
    SolverModel,
    constraint,
    variable,
};
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::{
    core::program::{Assignment, LinearExpression, LinearProgram, Relation, Sense},
    prelude::*,
};

/// Why the backend could not produce an optimal assignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverFailure {
    #[error("infeasible problem")]
    Infeasible,

    #[error("unbounded problem")]
    Unbounded,

    /// The solver gave up, or its output violates the problem beyond the tolerance.
    #[error("numerical failure")]
    Numerical,
}

/// Narrow solving interface, so that the model does not depend on any particular solver.
pub trait Backend {
    fn solve(&self, program: &LinearProgram) -> Result<Assignment, SolverFailure>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn solve(&self, program: &LinearProgram) -> Result<Assignment, SolverFailure> {
        (**self).solve(program)
    }
}

/// [Clarabel][1] interior-point solver via [`good_lp`].
///
/// [1]: https://clarabel.org
#[derive(Copy, Clone, Debug, Default)]
pub struct Clarabel;

impl Backend for Clarabel {
    fn solve(&self, program: &LinearProgram) -> Result<Assignment, SolverFailure> {
        let mut problem_variables = ProblemVariables::new();
        let variables = program
            .variables()
            .map(|(_, bounds)| {
                let mut definition = variable();
                if let Some(lower) = bounds.lower {
                    definition = definition.min(lower);
                }
                if let Some(upper) = bounds.upper {
                    definition = definition.max(upper);
                }
                problem_variables.add(definition)
            })
            .collect_vec();

        let objective = to_expression(program.objective(), &variables);
        let unsolved = match program.sense() {
            Sense::Maximise => problem_variables.maximise(objective),
            Sense::Minimise => problem_variables.minimise(objective),
        };
        let mut model = unsolved.using(good_lp::clarabel);
        for linear in program.constraints() {
            let lhs = to_expression(&linear.lhs, &variables);
            model = model.with(match linear.relation {
                Relation::Equal => constraint::eq(lhs, linear.rhs),
                Relation::LessOrEqual => constraint::leq(lhs, linear.rhs),
                Relation::GreaterOrEqual => constraint::geq(lhs, linear.rhs),
            });
        }

        let solution = model.solve().map_err(|error| match error {
            ResolutionError::Infeasible => SolverFailure::Infeasible,
            ResolutionError::Unbounded => SolverFailure::Unbounded,
            error => {
                debug!(%error, "solver gave up");
                SolverFailure::Numerical
            }
        })?;
        let values = variables.iter().map(|variable| solution.value(*variable)).collect_vec();
        if values.iter().all(|value| value.is_finite()) {
            Ok(Assignment::from(values))
        } else {
            Err(SolverFailure::Numerical)
        }
    }
}

fn to_expression(linear: &LinearExpression, variables: &[good_lp::Variable]) -> Expression {
    let mut expression = Expression::from(linear.constant());
    for (coefficient, variable) in linear.terms() {
        expression += *coefficient * variables[variable.index()];
    }
    expression
}
