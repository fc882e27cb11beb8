//! Decision oracle used by the search: "decide φ" and "find a model of φ".
//!
//! The [`Solver`] handle is passed explicitly to every operation that needs it,
//! so independent searches never share solver state and tests can plug in a
//! stub. [`BddSolver`] is the bundled implementation: it bit-blasts integer
//! and boolean terms into a fresh [`Bdd`] per query.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::bitblast::{BitBlaster, Unsupported};
use crate::expr::Expr;
use crate::types::{Value, Variable};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SolverResult {
    Sat,
    Unsat,
    DontKnow,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverResult::Sat => write!(f, "SAT"),
            SolverResult::Unsat => write!(f, "UNSAT"),
            SolverResult::DontKnow => write!(f, "DONT_KNOW"),
        }
    }
}

/// A model: concrete values for variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation(BTreeMap<Variable, Value>);

impl Valuation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: Variable, value: Value) {
        self.0.insert(var, value);
    }

    pub fn get(&self, var: &Variable) -> Option<&Value> {
        self.0.get(var)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(v, _)| v.name == name).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .0
            .iter()
            .map(|(var, value)| format!("{}={}", var, value))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

pub trait Solver {
    fn is_satisfiable(&self, expr: &Expr) -> SolverResult;

    /// Decides `expr` and, when satisfiable, returns a value for every free variable.
    fn solve(&self, expr: &Expr) -> (SolverResult, Valuation);
}

/// Counters describing the work done by a [`BddSolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub queries: usize,
    pub sat: usize,
    pub unsat: usize,
    pub dont_know: usize,
    pub total_nodes: usize,
    pub peak_nodes: usize,
}

pub struct BddSolver {
    cache_bits: usize,
    queries: Cell<usize>,
    sat: Cell<usize>,
    unsat: Cell<usize>,
    dont_know: Cell<usize>,
    total_nodes: Cell<usize>,
    peak_nodes: Cell<usize>,
}

impl BddSolver {
    pub fn new(cache_bits: usize) -> Self {
        Self {
            cache_bits,
            queries: Cell::new(0),
            sat: Cell::new(0),
            unsat: Cell::new(0),
            dont_know: Cell::new(0),
            total_nodes: Cell::new(0),
            peak_nodes: Cell::new(0),
        }
    }

    pub fn stats(&self) -> SolverStats {
        SolverStats {
            queries: self.queries.get(),
            sat: self.sat.get(),
            unsat: self.unsat.get(),
            dont_know: self.dont_know.get(),
            total_nodes: self.total_nodes.get(),
            peak_nodes: self.peak_nodes.get(),
        }
    }

    fn record(&self, result: SolverResult, bdd: &Bdd) -> SolverResult {
        self.queries.set(self.queries.get() + 1);
        let counter = match result {
            SolverResult::Sat => &self.sat,
            SolverResult::Unsat => &self.unsat,
            SolverResult::DontKnow => &self.dont_know,
        };
        counter.set(counter.get() + 1);
        self.total_nodes.set(self.total_nodes.get() + bdd.size());
        self.peak_nodes.set(self.peak_nodes.get().max(bdd.size()));
        result
    }

    /// Number of valuations of `vars` satisfying `expr`, after projecting
    /// every other variable away.
    pub fn count_models(&self, expr: &Expr, vars: &[Variable]) -> Option<BigUint> {
        let bdd = Bdd::new(self.cache_bits);
        let mut blaster = BitBlaster::new(&bdd);
        let mut kept = HashSet::new();
        for var in vars {
            kept.extend(blaster.var_indices(var).ok()?);
        }
        let f = match blaster.formula(expr) {
            Ok(f) => f,
            Err(Unsupported(reason)) => {
                warn!("count_models: {}", reason);
                return None;
            }
        };
        let others: HashSet<u32> = bdd.support(f).difference(&kept).copied().collect();
        let projected = bdd.exists(f, &others);
        Some(bdd.sat_count(projected, kept.len()))
    }
}

impl Default for BddSolver {
    fn default() -> Self {
        BddSolver::new(16)
    }
}

impl Solver for BddSolver {
    fn is_satisfiable(&self, expr: &Expr) -> SolverResult {
        let bdd = Bdd::new(self.cache_bits);
        let mut blaster = BitBlaster::new(&bdd);
        let result = match blaster.formula(expr) {
            Ok(f) if bdd.is_zero(f) => SolverResult::Unsat,
            Ok(_) => SolverResult::Sat,
            Err(Unsupported(reason)) => {
                warn!("is_satisfiable: {}", reason);
                SolverResult::DontKnow
            }
        };
        debug!("is_satisfiable(nodes = {}) -> {}", bdd.size(), result);
        self.record(result, &bdd)
    }

    fn solve(&self, expr: &Expr) -> (SolverResult, Valuation) {
        let bdd = Bdd::new(self.cache_bits);
        let mut blaster = BitBlaster::new(&bdd);
        let f = match blaster.formula(expr) {
            Ok(f) => f,
            Err(Unsupported(reason)) => {
                warn!("solve: {}", reason);
                return (self.record(SolverResult::DontKnow, &bdd), Valuation::new());
            }
        };
        let Some(path) = bdd.one_sat(f) else {
            return (self.record(SolverResult::Unsat, &bdd), Valuation::new());
        };
        let assignment: HashSet<u32> = path.into_iter().filter(|&(_, b)| b).map(|(v, _)| v).collect();

        let mut model = Valuation::new();
        for var in expr.free_variables() {
            let Ok(indices) = blaster.var_indices(&var) else {
                return (self.record(SolverResult::DontKnow, &bdd), Valuation::new());
            };
            let bits = indices
                .iter()
                .enumerate()
                .filter(|(_, v)| assignment.contains(*v))
                .fold(0u64, |acc, (i, _)| acc | (1 << i));
            model.insert(var.clone(), Value::from_bits(bits, var.ty));
        }
        debug!("solve(nodes = {}) -> {}", bdd.size(), model);
        (self.record(SolverResult::Sat, &bdd), model)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::{Comparator, NumericOp};
    use crate::types::BuiltinType;

    fn x() -> Variable {
        Variable::new("x", BuiltinType::SInt32)
    }

    fn lit(v: i64) -> Expr {
        Expr::int(v, BuiltinType::SInt32)
    }

    #[test]
    fn test_sat_and_unsat() {
        let solver = BddSolver::default();
        let a = Expr::and(
            Expr::compare(Expr::var(&x()), Comparator::Gt, lit(5)),
            Expr::compare(Expr::var(&x()), Comparator::Lt, lit(3)),
        );
        assert_eq!(solver.is_satisfiable(&a), SolverResult::Unsat);
        let b = Expr::compare(Expr::var(&x()), Comparator::Ge, lit(-3));
        assert_eq!(solver.is_satisfiable(&b), SolverResult::Sat);
        assert_eq!(solver.stats().queries, 2);
    }

    #[test]
    fn test_solve_model() {
        let solver = BddSolver::default();
        let y = Variable::new("y", BuiltinType::SInt32);
        let e = Expr::and(
            Expr::compare(Expr::var(&x()), Comparator::Eq, lit(-7)),
            Expr::compare(
                Expr::var(&y),
                Comparator::Eq,
                Expr::numeric(Expr::var(&x()), NumericOp::Mul, lit(3)),
            ),
        );
        let (res, model) = solver.solve(&e);
        assert_eq!(res, SolverResult::Sat);
        println!("model = {}", model);
        assert_eq!(model.get(&x()), Some(&Value::int(-7, BuiltinType::SInt32)));
        assert_eq!(model.get_by_name("y"), Some(&Value::int(-21, BuiltinType::SInt32)));
    }

    #[test]
    fn test_exists_projection() {
        let solver = BddSolver::default();
        let p = Variable::new("p", BuiltinType::SInt32);
        // (exists p. x == p + 1 && p == 4) && x != 5 is unsatisfiable
        let inner = Expr::and(
            Expr::compare(
                Expr::var(&x()),
                Comparator::Eq,
                Expr::numeric(Expr::var(&p), NumericOp::Add, lit(1)),
            ),
            Expr::compare(Expr::var(&p), Comparator::Eq, lit(4)),
        );
        let e = Expr::and(
            Expr::exists(vec![p.clone()], inner),
            Expr::compare(Expr::var(&x()), Comparator::Ne, lit(5)),
        );
        assert_eq!(solver.is_satisfiable(&e), SolverResult::Unsat);
    }

    #[test]
    fn test_reals_dont_know() {
        let solver = BddSolver::default();
        let d = Variable::new("d", BuiltinType::Double);
        let e = Expr::compare(Expr::var(&d), Comparator::Gt, Expr::var(&d));
        assert_eq!(solver.is_satisfiable(&e), SolverResult::DontKnow);
        assert_eq!(solver.solve(&e).0, SolverResult::DontKnow);
        assert_eq!(solver.stats().dont_know, 2);
    }

    #[test]
    fn test_count_models() {
        let solver = BddSolver::default();
        let b = Variable::new("b", BuiltinType::UInt8);
        let e = Expr::compare(Expr::var(&b), Comparator::Lt, Expr::int(10, BuiltinType::UInt8));
        assert_eq!(solver.count_models(&e, &[b]), Some(BigUint::from(10u32)));
    }
}
