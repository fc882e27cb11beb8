//! States of the search: symbolic (formula per variable) and enumerative
//! (concrete value per variable).

use std::fmt;

use crate::expr::Expr;
use crate::solver::Valuation;
use crate::transition::TransitionId;
use crate::types::{Value, Variable};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(pub usize);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s_{}", self.0)
    }
}

/// Maps every state variable to a boolean formula constraining its current value.
///
/// The formula of `x` may mention variables renamed by earlier transitions
/// (`x_sv_3`, `p_p_2`, ...); only the plain name `x` denotes the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicState {
    id: StateId,
    values: Vec<(Variable, Expr)>,
    is_error: bool,
    incoming: Vec<TransitionId>,
    outgoing: Vec<TransitionId>,
    history: Vec<String>,
}

impl SymbolicState {
    pub fn new(id: StateId, values: Vec<(Variable, Expr)>) -> Self {
        Self {
            id,
            values,
            is_error: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            history: Vec::new(),
        }
    }

    /// State in which every variable holds the default value of its type.
    pub fn initial(id: StateId, state_variables: &[Variable]) -> Self {
        let values = state_variables
            .iter()
            .map(|var| {
                let value = Expr::Constant(var.ty.default_value());
                (var.clone(), Expr::equal(Expr::var(var), value))
            })
            .collect();
        Self::new(id, values)
    }

    /// The error sentinel: no variables, no entries.
    pub fn error(id: StateId) -> Self {
        Self {
            is_error: true,
            ..Self::new(id, Vec::new())
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn get(&self, var: &Variable) -> Option<&Expr> {
        self.values.iter().find(|(v, _)| v == var).map(|(_, e)| e)
    }

    /// Replaces the formula of `var`, or appends it if the state has no entry yet.
    pub fn put(&mut self, var: Variable, value: Expr) {
        match self.values.iter_mut().find(|(v, _)| *v == var) {
            Some(entry) => entry.1 = value,
            None => self.values.push((var, value)),
        }
    }

    pub fn values(&self) -> &[(Variable, Expr)] {
        &self.values
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.values.iter().map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Conjunction of all variable formulas, folded left in variable order.
    pub fn to_expression(&self) -> Expr {
        Expr::and_all(self.values.iter().map(|(_, e)| e.clone()))
    }

    pub fn incoming(&self) -> &[TransitionId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }

    pub fn has_incoming_transitions(&self) -> bool {
        !self.incoming.is_empty()
    }

    pub(crate) fn add_incoming(&mut self, id: TransitionId) {
        self.incoming.push(id);
    }

    pub(crate) fn add_outgoing(&mut self, id: TransitionId) {
        self.outgoing.push(id);
    }

    /// Names of the labels fired along the path that produced this state.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub(crate) fn extend_history(&mut self, parent: &[String], label: &str) {
        self.history = parent.to_vec();
        self.history.push(label.to_string());
    }

    /// Rewrites the formulas, keeping identity, links and history.
    pub fn map_values(mut self, f: impl FnOnce(Vec<(Variable, Expr)>) -> Vec<(Variable, Expr)>) -> Self {
        self.values = f(std::mem::take(&mut self.values));
        self
    }
}

impl fmt::Display for SymbolicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error {
            return write!(f, "{}: ERROR", self.id);
        }
        let entries = self
            .values
            .iter()
            .map(|(v, e)| format!("{}: {}", v, e))
            .collect::<Vec<_>>();
        write!(f, "{}: [{}]", self.id, entries.join(", "))
    }
}

/// A concrete state, obtained from a solved valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerativeState {
    values: Vec<(Variable, Value)>,
    history: Vec<String>,
}

impl EnumerativeState {
    pub fn new(values: Vec<(Variable, Value)>) -> Self {
        Self {
            values,
            history: Vec::new(),
        }
    }

    /// Keeps the bindings of `model` for the given variables, in that order.
    pub fn from_valuation(model: &Valuation, state_variables: &[Variable]) -> Self {
        let values = state_variables
            .iter()
            .filter_map(|var| model.get(var).map(|value| (var.clone(), value.clone())))
            .collect();
        Self::new(values)
    }

    pub fn get(&self, var: &Variable) -> Option<&Value> {
        self.values.iter().find(|(v, _)| v == var).map(|(_, value)| value)
    }

    pub fn values(&self) -> &[(Variable, Value)] {
        &self.values
    }

    /// Conjunction of `v == value` for every entry.
    pub fn to_expression(&self) -> Expr {
        Expr::and_all(
            self.values
                .iter()
                .map(|(v, value)| Expr::equal(Expr::var(v), Expr::Constant(value.clone()))),
        )
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn with_history(mut self, parent: &[String], label: &str) -> Self {
        self.history = parent.to_vec();
        self.history.push(label.to_string());
        self
    }

    pub fn with_history_of(mut self, history: &[String]) -> Self {
        self.history = history.to_vec();
        self
    }

    /// Drops the prime of every bound variable.
    pub fn unprimed(mut self) -> Self {
        for (var, _) in self.values.iter_mut() {
            *var = var.unprimed();
        }
        self
    }

    /// Same valuation, regardless of how the state was reached.
    pub fn same_values(&self, other: &EnumerativeState) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for EnumerativeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .values
            .iter()
            .map(|(v, value)| format!("{}={}", v, value))
            .collect::<Vec<_>>();
        write!(f, "[{}]", entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::BuiltinType;

    #[test]
    fn test_initial_state_defaults() {
        let x = Variable::new("x", BuiltinType::SInt32);
        let b = Variable::new("b", BuiltinType::Bool);
        let state = SymbolicState::initial(StateId(1), &[x.clone(), b.clone()]);
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&x).unwrap().to_string(), "(x == 0)");
        assert_eq!(state.get(&b).unwrap().to_string(), "(b <=> false)");
        assert_eq!(state.to_expression().to_string(), "((x == 0) && (b <=> false))");
        assert_eq!(state.to_string(), "s_1: [x: (x == 0), b: (b <=> false)]");
    }

    #[test]
    fn test_put_replaces() {
        let x = Variable::new("x", BuiltinType::SInt32);
        let mut state = SymbolicState::initial(StateId(1), &[x.clone()]);
        let five = Expr::equal(Expr::var(&x), Expr::int(5, BuiltinType::SInt32));
        state.put(x.clone(), five.clone());
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(&x), Some(&five));
    }

    #[test]
    fn test_error_state_is_empty() {
        let error = SymbolicState::error(StateId(0));
        assert!(error.is_error());
        assert!(error.is_empty());
        assert!(!error.has_incoming_transitions());
    }

    #[test]
    fn test_enumerative_state() {
        let x = Variable::new("x", BuiltinType::SInt8);
        let mut model = Valuation::new();
        model.insert(x.clone(), Value::int(3, BuiltinType::SInt8));
        model.insert(Variable::new("p", BuiltinType::SInt8), Value::int(1, BuiltinType::SInt8));
        let state = EnumerativeState::from_valuation(&model, &[x.clone()]).with_history(&[], "t1");
        assert_eq!(state.values().len(), 1);
        assert_eq!(state.to_expression().to_string(), "(x == 3)");
        assert_eq!(state.history(), ["t1".to_string()]);
        assert_eq!(state.to_string(), "[x=3]");
    }
}
