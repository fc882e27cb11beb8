//! Regions: named collections of states, the unit of "reached" and "frontier"
//! in the breadth-first search engines.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use crate::error::Result;
use crate::expr::Expr;
use crate::novelty;
use crate::solver::Solver;
use crate::state::{EnumerativeState, SymbolicState};
use crate::types::Variable;

/// What a region needs from its states.
pub trait RegionState: Clone + fmt::Display {
    fn to_expression(&self) -> Expr;
    fn history(&self) -> &[String];
}

impl RegionState for SymbolicState {
    fn to_expression(&self) -> Expr {
        SymbolicState::to_expression(self)
    }
    fn history(&self) -> &[String] {
        SymbolicState::history(self)
    }
}

impl RegionState for EnumerativeState {
    fn to_expression(&self) -> Expr {
        EnumerativeState::to_expression(self)
    }
    fn history(&self) -> &[String] {
        EnumerativeState::history(self)
    }
}

/// Hands out `s_1`, `s_2`, ... for the states of one search run.
#[derive(Debug, Default, Clone)]
pub struct NameGenerator {
    count: usize,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&mut self) -> String {
        self.count += 1;
        format!("s_{}", self.count)
    }

    /// Number of names handed out so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region<S> {
    states: BTreeMap<String, S>,
}

impl<S> Default for Region<S> {
    fn default() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }
}

impl<S: RegionState> Region<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, state: S) {
        self.states.insert(name.into(), state);
    }

    pub fn get(&self, name: &str) -> Option<&S> {
        self.states.get(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &S)> {
        self.states.iter()
    }

    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.states.values()
    }

    /// All entries of `self` and `other`; on a name clash the entry of `other` wins.
    pub fn union(&self, other: &Region<S>) -> Region<S> {
        let mut states = self.states.clone();
        states.extend(other.states.iter().map(|(k, v)| (k.clone(), v.clone())));
        Region { states }
    }

    /// Absorbs every entry of `other`.
    pub fn extend(&mut self, other: Region<S>) {
        self.states.extend(other.states);
    }

    /// Disjunction of the state expressions; `false` for an empty region.
    pub fn to_expression(&self) -> Expr {
        Expr::or_all(self.states.values().map(RegionState::to_expression))
    }

    pub fn map(self, mut f: impl FnMut(S) -> S) -> Region<S> {
        Region {
            states: self.states.into_iter().map(|(k, v)| (k, f(v))).collect(),
        }
    }
}

impl Region<SymbolicState> {
    /// Disjunction of the states, each projected on `state_variables`.
    pub fn exists(&self, state_variables: &[Variable]) -> Expr {
        novelty::reach_expression(self.states.values(), state_variables)
    }

    /// States of `self` not covered by `reached`. Indeterminate answers are fatal.
    pub fn difference(
        &self,
        reached: &Region<SymbolicState>,
        state_variables: &[Variable],
        solver: &dyn Solver,
    ) -> Result<Region<SymbolicState>> {
        let covered = reached.exists(state_variables);
        let mut result = Region::new();
        for (name, state) in &self.states {
            if novelty::is_new_value(state, &covered, solver)? {
                result.put(name.clone(), state.clone());
            }
        }
        debug!("difference(states = {}) -> {}", self.len(), result.len());
        Ok(result)
    }
}

impl Region<EnumerativeState> {
    /// States of `self` whose valuation occurs neither in `reached` nor earlier in `self`.
    pub fn difference(&self, reached: &Region<EnumerativeState>) -> Region<EnumerativeState> {
        let mut result: Region<EnumerativeState> = Region::new();
        for (name, state) in &self.states {
            let known = reached.states().any(|r| r.same_values(state))
                || result.states().any(|r| r.same_values(state));
            if !known {
                result.put(name.clone(), state.clone());
            }
        }
        debug!("difference(states = {}) -> {}", self.len(), result.len());
        result
    }
}

impl<S: RegionState> fmt::Display for Region<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, state) in &self.states {
            writeln!(f, "{} -> {}", name, state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Comparator;
    use crate::solver::BddSolver;
    use crate::state::StateId;
    use crate::types::{BuiltinType, Value};

    fn x() -> Variable {
        Variable::new("x", BuiltinType::SInt32)
    }

    fn symbolic(v: i64) -> SymbolicState {
        let formula = Expr::compare(Expr::var(&x()), Comparator::Eq, Expr::int(v, BuiltinType::SInt32));
        SymbolicState::new(StateId(0), vec![(x(), formula)])
    }

    fn concrete(v: i64) -> EnumerativeState {
        EnumerativeState::new(vec![(x(), Value::int(v, BuiltinType::SInt32))])
    }

    #[test]
    fn test_name_generator() {
        let mut names = NameGenerator::new();
        assert_eq!(names.next_name(), "s_1");
        assert_eq!(names.next_name(), "s_2");
        assert_eq!(names.count(), 2);
    }

    #[test]
    fn test_union() {
        let mut a = Region::new();
        a.put("s_1", concrete(1));
        let mut b = Region::new();
        b.put("s_2", concrete(2));
        let u = a.union(&b);
        assert_eq!(u.len(), 2);
        assert_eq!(u.to_expression().to_string(), "((x == 1) || (x == 2))");
        assert!(Region::<EnumerativeState>::new().to_expression() == Expr::bool(false));
    }

    #[test]
    fn test_symbolic_difference() {
        let solver = BddSolver::default();
        let mut reached = Region::new();
        reached.put("s_1", symbolic(0));
        let mut image = Region::new();
        image.put("s_2", symbolic(0));
        image.put("s_3", symbolic(1));
        let delta = image.difference(&reached, &[x()], &solver).unwrap();
        assert_eq!(delta.len(), 1);
        assert!(delta.get("s_3").is_some());
    }

    #[test]
    fn test_enumerative_difference() {
        let mut reached = Region::new();
        reached.put("s_1", concrete(0));
        let mut image = Region::new();
        image.put("s_2", concrete(0));
        image.put("s_3", concrete(4));
        image.put("s_4", concrete(4));
        let delta = image.difference(&reached);
        assert_eq!(delta.len(), 1);
        assert!(delta.get("s_3").is_some());
    }
}
