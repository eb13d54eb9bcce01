//! Solver-agnostic linear program description.

use std::ops::Index;

/// Handle of a decision variable within its [`LinearProgram`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable(usize);

impl Variable {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Inclusive variable bounds, [`None`] means unbounded.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub const FREE: Self = Self { lower: None, upper: None };
    pub const NON_NEGATIVE: Self = Self { lower: Some(0.0), upper: None };

    pub const fn between(lower: f64, upper: f64) -> Self {
        Self { lower: Some(lower), upper: Some(upper) }
    }

    fn contain(&self, value: f64, tolerance: f64) -> bool {
        self.lower.is_none_or(|lower| value >= lower - tolerance)
            && self.upper.is_none_or(|upper| value <= upper + tolerance)
    }
}

/// Affine combination of variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearExpression {
    terms: Vec<(f64, Variable)>,
    constant: f64,
}

impl LinearExpression {
    #[must_use]
    pub fn with_term(mut self, coefficient: f64, variable: Variable) -> Self {
        self.add_term(coefficient, variable);
        self
    }

    pub fn add_term(&mut self, coefficient: f64, variable: Variable) {
        self.terms.push((coefficient, variable));
    }

    pub fn terms(&self) -> &[(f64, Variable)] {
        &self.terms
    }

    pub const fn constant(&self) -> f64 {
        self.constant
    }

    pub fn evaluate(&self, assignment: &Assignment) -> f64 {
        self.terms
            .iter()
            .map(|(coefficient, variable)| coefficient * assignment[*variable])
            .sum::<f64>()
            + self.constant
    }
}

impl From<Variable> for LinearExpression {
    fn from(variable: Variable) -> Self {
        Self::default().with_term(1.0, variable)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Relation {
    Equal,
    LessOrEqual,
    GreaterOrEqual,
}

/// `lhs <relation> rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub lhs: LinearExpression,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    pub fn equal(lhs: impl Into<LinearExpression>, rhs: f64) -> Self {
        Self { lhs: lhs.into(), relation: Relation::Equal, rhs }
    }

    pub fn less_or_equal(lhs: impl Into<LinearExpression>, rhs: f64) -> Self {
        Self { lhs: lhs.into(), relation: Relation::LessOrEqual, rhs }
    }

    pub fn greater_or_equal(lhs: impl Into<LinearExpression>, rhs: f64) -> Self {
        Self { lhs: lhs.into(), relation: Relation::GreaterOrEqual, rhs }
    }

    pub fn is_satisfied_by(&self, assignment: &Assignment, tolerance: f64) -> bool {
        let lhs = self.lhs.evaluate(assignment);
        match self.relation {
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
            Relation::LessOrEqual => lhs <= self.rhs + tolerance,
            Relation::GreaterOrEqual => lhs >= self.rhs - tolerance,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sense {
    Maximise,
    Minimise,
}

#[must_use]
#[derive(Clone, Debug)]
pub struct LinearProgram {
    bounds: Vec<Bounds>,
    constraints: Vec<Constraint>,
    objective: LinearExpression,
    sense: Sense,
}

impl LinearProgram {
    pub fn new(sense: Sense) -> Self {
        Self {
            bounds: Vec::new(),
            constraints: Vec::new(),
            objective: LinearExpression::default(),
            sense,
        }
    }

    pub fn add_variable(&mut self, bounds: Bounds) -> Variable {
        self.bounds.push(bounds);
        Variable(self.bounds.len() - 1)
    }

    pub fn add_variables(&mut self, bounds: Bounds, n: usize) -> Vec<Variable> {
        (0..n).map(|_| self.add_variable(bounds)).collect()
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        debug_assert!(
            constraint.lhs.terms().iter().all(|(_, variable)| variable.0 < self.bounds.len()),
            "the constraint refers to a foreign variable",
        );
        self.constraints.push(constraint);
    }

    pub fn set_objective(&mut self, objective: LinearExpression) {
        self.objective = objective;
    }

    pub const fn n_variables(&self) -> usize {
        self.bounds.len()
    }

    pub fn variables(&self) -> impl Iterator<Item = (Variable, Bounds)> + '_ {
        self.bounds.iter().enumerate().map(|(index, bounds)| (Variable(index), *bounds))
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub const fn objective(&self) -> &LinearExpression {
        &self.objective
    }

    pub const fn sense(&self) -> Sense {
        self.sense
    }

    /// Check all the bounds and constraints against the assignment.
    pub fn is_feasible(&self, assignment: &Assignment, tolerance: f64) -> bool {
        assignment.len() == self.bounds.len()
            && self
                .variables()
                .all(|(variable, bounds)| bounds.contain(assignment[variable], tolerance))
            && self
                .constraints
                .iter()
                .all(|constraint| constraint.is_satisfied_by(assignment, tolerance))
    }
}

/// Values of all the program's variables.
#[must_use]
#[derive(Clone, Debug, PartialEq, derive_more::From)]
pub struct Assignment(Vec<f64>);

impl Assignment {
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<Variable> for Assignment {
    type Output = f64;

    fn index(&self, variable: Variable) -> &Self::Output {
        &self.0[variable.0]
    }
}
