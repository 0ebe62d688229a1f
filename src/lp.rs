//! Linear-programming contract for range tightening.
//!
//! An affine value is a linear expression over its noise symbols, so the
//! exact bounds of a value under a set of affine side conditions are the
//! optima of two linear programs. This module defines the problem model
//! and the [`RangeSolver`] trait; an actual simplex implementation is
//! supplied by the caller, the core only builds problems and applies
//! solutions.

use std::collections::{HashMap, HashSet};

use crate::affine::{AffineValue, Context};
use crate::interval::Interval;
use crate::types::SymbolId;

/// Variable in a linear program, identified by name. Variables are
/// non-negative unless `can_be_negative` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LpVariable {
    pub name: String,
    pub can_be_negative: bool,
}

impl LpVariable {
    pub fn new(name: impl Into<String>) -> Self {
        LpVariable {
            name: name.into(),
            can_be_negative: false,
        }
    }

    pub fn negative(name: impl Into<String>) -> Self {
        LpVariable {
            name: name.into(),
            can_be_negative: true,
        }
    }
}

/// A linear expression: variable coefficients plus a free constant.
#[derive(Debug, Clone, Default)]
pub struct LpExpression {
    pub terms: HashMap<LpVariable, f64>,
    pub free: f64,
}

impl From<LpVariable> for LpExpression {
    fn from(v: LpVariable) -> Self {
        LpExpression {
            terms: HashMap::from([(v, 1.0)]),
            free: 0.0,
        }
    }
}

/// Relation between an expression and its constant bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LpConstraintSign {
    Equal,
    LessOrEqual,
    GreaterOrEqual,
}

/// Constraint of the form `expression sign constant`.
#[derive(Debug, Clone)]
pub struct LpConstraint {
    pub expression: LpExpression,
    pub sign: LpConstraintSign,
    pub constant: f64,
}

/// Direction the objective is optimized in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LpOptimization {
    Maximize,
    Minimize,
}

/// The objective of a linear program.
#[derive(Debug, Clone)]
pub struct LpFunction {
    pub expression: LpExpression,
    pub optimization: LpOptimization,
}

/// A complete linear program. Every variable referenced by a constraint
/// or the objective must appear in `variables`.
#[derive(Debug, Clone)]
pub struct LpProblem {
    pub variables: Vec<LpVariable>,
    pub constraints: Vec<LpConstraint>,
    pub function: LpFunction,
}

impl LpProblem {
    pub fn new(
        variables: Vec<LpVariable>,
        constraints: Vec<LpConstraint>,
        function: LpFunction,
    ) -> Self {
        let known: HashSet<&LpVariable> = variables.iter().collect();
        assert!(
            constraints
                .iter()
                .flat_map(|c| c.expression.terms.keys())
                .all(|v| known.contains(v)),
            "constraint uses a variable missing from the variables list"
        );
        assert!(
            function.expression.terms.keys().all(|v| known.contains(v)),
            "objective uses a variable missing from the variables list"
        );
        LpProblem {
            variables,
            constraints,
            function,
        }
    }
}

/// Incremental construction of an [`LpProblem`].
#[derive(Debug, Default)]
pub struct LpProblemBuilder {
    variables: HashMap<String, LpVariable>,
    constraints: Vec<LpConstraint>,
    function: Option<LpFunction>,
}

impl LpProblemBuilder {
    pub fn new() -> Self {
        LpProblemBuilder::default()
    }

    /// Registers a variable. Panics on a duplicate name.
    pub fn add_variable(&mut self, v: LpVariable) {
        assert!(
            !self.variables.contains_key(&v.name),
            "variable `{}` already added",
            v.name
        );
        self.variables.insert(v.name.clone(), v);
    }

    /// Adds a constraint over already-registered variables.
    pub fn add_constraint(&mut self, c: LpConstraint) {
        assert!(
            c.expression
                .terms
                .keys()
                .all(|v| self.variables.get(&v.name) == Some(v)),
            "constraint uses an unregistered variable"
        );
        self.constraints.push(c);
    }

    pub fn set_function(&mut self, f: LpFunction) {
        assert!(
            f.expression
                .terms
                .keys()
                .all(|v| self.variables.get(&v.name) == Some(v)),
            "objective uses an unregistered variable"
        );
        self.function = Some(f);
    }

    pub fn build(self) -> LpProblem {
        let function = self.function.expect("objective must be set before build");
        let mut variables: Vec<LpVariable> = self.variables.into_values().collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        LpProblem::new(variables, self.constraints, function)
    }
}

/// Outcome of solving an [`LpProblem`].
#[derive(Debug, Clone)]
pub enum LpSolution {
    Solved {
        value: f64,
        assignment: HashMap<LpVariable, f64>,
    },
    NoSolution,
    Unbounded,
}

/// Solver backend. The core never implements simplex itself; callers
/// plug in whatever implementation they have.
pub trait RangeSolver {
    fn solve(&self, problem: &LpProblem) -> LpSolution;
}

fn symbol_variable(id: SymbolId) -> LpVariable {
    LpVariable::negative(id.to_string())
}

fn expression_of(value: &AffineValue) -> LpExpression {
    LpExpression {
        terms: value
            .terms
            .iter()
            .map(|(&id, &c)| (symbol_variable(id), c))
            .collect(),
        free: value.central,
    }
}

impl Context {
    /// Builds the linear program optimizing `objective` over its noise
    /// symbols, each bounded to `[-1, 1]`, subject to affine `conditions`
    /// read as `condition sign 0`.
    pub fn lp_problem(
        &self,
        objective: &AffineValue,
        conditions: &[(AffineValue, LpConstraintSign)],
        optimization: LpOptimization,
    ) -> LpProblem {
        let mut builder = LpProblemBuilder::new();
        let mut seen = HashSet::new();
        let mut bind = |builder: &mut LpProblemBuilder, id: SymbolId| {
            if !seen.insert(id) {
                return;
            }
            let v = symbol_variable(id);
            builder.add_variable(v.clone());
            builder.add_constraint(LpConstraint {
                expression: v.clone().into(),
                sign: LpConstraintSign::LessOrEqual,
                constant: 1.0,
            });
            builder.add_constraint(LpConstraint {
                expression: v.into(),
                sign: LpConstraintSign::GreaterOrEqual,
                constant: -1.0,
            });
        };
        for &id in objective.terms.keys() {
            bind(&mut builder, id);
        }
        for (cond, _) in conditions {
            for &id in cond.terms.keys() {
                bind(&mut builder, id);
            }
        }
        for (cond, sign) in conditions {
            builder.add_constraint(LpConstraint {
                expression: expression_of(cond),
                sign: *sign,
                constant: 0.0,
            });
        }
        builder.set_function(LpFunction {
            expression: expression_of(objective),
            optimization,
        });
        builder.build()
    }

    /// Tightens a value's range under affine side conditions using the
    /// given solver. An infeasible system means the conditions rule out
    /// every point, so the result is empty; an unbounded direction keeps
    /// the existing bound.
    pub fn tighten<S: RangeSolver>(
        &self,
        value: &AffineValue,
        conditions: &[(AffineValue, LpConstraintSign)],
        solver: &S,
    ) -> AffineValue {
        if value.is_empty() || value.terms.is_empty() {
            return value.clone();
        }
        let mut min = value.range.min;
        let mut max = value.range.max;
        match solver.solve(&self.lp_problem(value, conditions, LpOptimization::Minimize)) {
            LpSolution::Solved { value: v, .. } => min = min.max(v - value.r),
            LpSolution::NoSolution => return self.empty(),
            LpSolution::Unbounded => {}
        }
        match solver.solve(&self.lp_problem(value, conditions, LpOptimization::Maximize)) {
            LpSolution::Solved { value: v, .. } => max = max.min(v + value.r),
            LpSolution::NoSolution => return self.empty(),
            LpSolution::Unbounded => {}
        }
        log::debug!("tightened {} to {}", value.range, Interval::new(min, max));
        AffineValue::with_parts(
            Interval::new(min, max),
            value.central,
            value.r,
            value.terms.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    /// Corner-point solver for box-constrained problems: optimizes the
    /// objective over `[-1, 1]` per variable, ignoring side conditions.
    struct BoxSolver;

    impl RangeSolver for BoxSolver {
        fn solve(&self, problem: &LpProblem) -> LpSolution {
            let maximize = problem.function.optimization == LpOptimization::Maximize;
            let mut value = problem.function.expression.free;
            let mut assignment = HashMap::new();
            for (v, &c) in &problem.function.expression.terms {
                let e = if (c >= 0.0) == maximize { 1.0 } else { -1.0 };
                value += c * e;
                assignment.insert(v.clone(), e);
            }
            LpSolution::Solved { value, assignment }
        }
    }

    struct InfeasibleSolver;

    impl RangeSolver for InfeasibleSolver {
        fn solve(&self, _problem: &LpProblem) -> LpSolution {
            LpSolution::NoSolution
        }
    }

    struct UnboundedSolver;

    impl RangeSolver for UnboundedSolver {
        fn solve(&self, _problem: &LpProblem) -> LpSolution {
            LpSolution::Unbounded
        }
    }

    #[test]
    fn test_problem_shape() {
        let ctx = Context::new();
        let x = ctx.interval(1.0, 3.0);
        let p = ctx.lp_problem(&x, &[], LpOptimization::Maximize);
        assert_eq!(p.variables.len(), 1);
        // Box constraints on the single symbol.
        assert_eq!(p.constraints.len(), 2);
        assert_eq!(p.function.expression.free, 2.0);
    }

    #[test]
    fn test_problem_includes_condition_symbols() {
        let ctx = Context::new();
        let x = ctx.interval(1.0, 3.0);
        let c = ctx.interval(0.0, 1.0);
        let p = ctx.lp_problem(
            &x,
            &[(c, LpConstraintSign::LessOrEqual)],
            LpOptimization::Minimize,
        );
        assert_eq!(p.variables.len(), 2);
        // Two box constraints per symbol plus the condition.
        assert_eq!(p.constraints.len(), 5);
    }

    #[test]
    fn test_tighten_solved_reproduces_bounds() {
        let ctx = Context::new();
        let x = ctx.interval(1.0, 3.0);
        let t = ctx.tighten(&x, &[], &BoxSolver);
        assert!((t.range.min - 1.0).abs() < 1e-12);
        assert!((t.range.max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_tighten_infeasible_is_empty() {
        let ctx = Context::new();
        let x = ctx.interval(1.0, 3.0);
        assert!(ctx.tighten(&x, &[], &InfeasibleSolver).is_empty());
    }

    #[test]
    fn test_tighten_unbounded_keeps_range() {
        let ctx = Context::new();
        let x = ctx.interval(1.0, 3.0);
        let t = ctx.tighten(&x, &[], &UnboundedSolver);
        assert_eq!(t.range, x.range);
    }

    #[test]
    fn test_tighten_scalar_is_noop() {
        let ctx = Context::new();
        let s = ctx.scalar(2.0);
        assert_eq!(ctx.tighten(&s, &[], &InfeasibleSolver), s);
    }

    #[test]
    fn test_builder_checks() {
        let mut b = LpProblemBuilder::new();
        let v = LpVariable::negative("e1");
        b.add_variable(v.clone());
        b.add_constraint(LpConstraint {
            expression: v.clone().into(),
            sign: LpConstraintSign::LessOrEqual,
            constant: 1.0,
        });
        b.set_function(LpFunction {
            expression: v.into(),
            optimization: LpOptimization::Maximize,
        });
        let p = b.build();
        assert_eq!(p.variables.len(), 1);
        assert_eq!(p.constraints.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already added")]
    fn test_builder_rejects_duplicate_variable() {
        let mut b = LpProblemBuilder::new();
        b.add_variable(LpVariable::new("x"));
        b.add_variable(LpVariable::new("x"));
    }

    #[test]
    #[should_panic(expected = "unregistered")]
    fn test_builder_rejects_unknown_variable() {
        let mut b = LpProblemBuilder::new();
        b.add_constraint(LpConstraint {
            expression: LpVariable::new("x").into(),
            sign: LpConstraintSign::Equal,
            constant: 0.0,
        });
    }
}
