//! Novelty test: is a candidate state covered by what has been reached already?

use log::debug;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::solver::{Solver, SolverResult};
use crate::state::SymbolicState;
use crate::types::Variable;

/// Existential closure of `formula` over every free variable that is not a state variable.
pub fn project_on_state_variables(formula: Expr, state_variables: &[Variable]) -> Expr {
    let hidden: Vec<Variable> = formula
        .free_variables()
        .into_iter()
        .filter(|v| !state_variables.contains(v))
        .collect();
    Expr::exists(hidden, formula)
}

/// Disjunction of all non-error states, each projected on the state variables.
///
/// Yields `false` when nothing has been reached.
pub fn reach_expression<'a>(
    states: impl IntoIterator<Item = &'a SymbolicState>,
    state_variables: &[Variable],
) -> Expr {
    Expr::or_all(
        states
            .into_iter()
            .filter(|s| !s.is_error())
            .map(|s| project_on_state_variables(s.to_expression(), state_variables)),
    )
}

/// A candidate is new iff `candidate AND NOT reached` is satisfiable.
pub fn is_new_value(candidate: &SymbolicState, reached: &Expr, solver: &dyn Solver) -> Result<bool> {
    let query = Expr::and(candidate.to_expression(), Expr::not(reached.clone()));
    let result = solver.is_satisfiable(&query);
    debug!("is_new_value(state = {}) -> {}", candidate.id(), result);
    match result {
        SolverResult::Sat => Ok(true),
        SolverResult::Unsat => Ok(false),
        SolverResult::DontKnow => Err(Error::indeterminate(format!("novelty of {}", candidate.id()))),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Comparator;
    use crate::solver::BddSolver;
    use crate::state::StateId;
    use crate::types::BuiltinType;

    fn x() -> Variable {
        Variable::new("x", BuiltinType::SInt32)
    }

    fn state(id: usize, formula: Expr) -> SymbolicState {
        SymbolicState::new(StateId(id), vec![(x(), formula)])
    }

    fn x_eq(v: i64) -> Expr {
        Expr::compare(Expr::var(&x()), Comparator::Eq, Expr::int(v, BuiltinType::SInt32))
    }

    #[test]
    fn test_projection_hides_history() {
        let old = Variable::new("x_sv_1", BuiltinType::SInt32);
        let formula = Expr::and(
            Expr::compare(Expr::var(&x()), Comparator::Gt, Expr::var(&old)),
            Expr::compare(Expr::var(&old), Comparator::Eq, Expr::int(0, BuiltinType::SInt32)),
        );
        let projected = project_on_state_variables(formula, &[x()]);
        assert_eq!(
            projected.to_string(),
            "(exists x_sv_1: ((x > x_sv_1) && (x_sv_1 == 0)))"
        );
        assert_eq!(projected.free_variables().into_iter().collect::<Vec<_>>(), vec![x()]);
    }

    #[test]
    fn test_empty_reach_is_false() {
        let reached = reach_expression([], &[x()]);
        assert_eq!(reached, Expr::bool(false));
        let solver = BddSolver::default();
        assert!(is_new_value(&state(1, x_eq(0)), &reached, &solver).unwrap());
    }

    #[test]
    fn test_reached_value_is_not_new() {
        let solver = BddSolver::default();
        let s1 = state(1, x_eq(0));
        let s2 = state(2, Expr::or(x_eq(1), x_eq(2)));
        let error = SymbolicState::error(StateId(0));
        let reached = reach_expression([&s1, &s2, &error], &[x()]);
        assert!(!is_new_value(&s1, &reached, &solver).unwrap());
        assert!(!is_new_value(&state(3, x_eq(2)), &reached, &solver).unwrap());
        assert!(is_new_value(&state(4, Expr::or(x_eq(2), x_eq(3))), &reached, &solver).unwrap());
    }
}
