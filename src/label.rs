//! Transition labels: a guarded, parameterised update of the state variables.

use std::collections::BTreeSet;
use std::fmt;

use log::debug;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::rename::{restore_current_names, suffix_state, transition_renaming};
use crate::solver::{Solver, SolverResult};
use crate::state::{StateId, SymbolicState};
use crate::transition::TransitionId;
use crate::types::Variable;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionLabel {
    name: String,
    state_variables: Vec<Variable>,
    preconditions: Vec<Expr>,
    effects: Vec<(Variable, Expr)>,
    parameters: Vec<Variable>,
    is_error: bool,
    is_constructor: bool,
}

impl TransitionLabel {
    pub fn new(name: impl Into<String>, state_variables: Vec<Variable>) -> Self {
        Self {
            name: name.into(),
            state_variables,
            preconditions: Vec::new(),
            effects: Vec::new(),
            parameters: Vec::new(),
            is_error: false,
            is_constructor: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn state_variables(&self) -> &[Variable] {
        &self.state_variables
    }
    pub fn preconditions(&self) -> &[Expr] {
        &self.preconditions
    }
    pub fn effects(&self) -> &[(Variable, Expr)] {
        &self.effects
    }
    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }
    pub fn is_error(&self) -> bool {
        self.is_error
    }
    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    pub fn set_error(&mut self, value: bool) {
        self.is_error = value;
    }
    pub fn set_constructor(&mut self, value: bool) {
        self.is_constructor = value;
    }

    pub fn add_precondition(&mut self, conjunct: Expr) {
        self.preconditions.push(conjunct);
    }

    pub fn add_parameter(&mut self, parameter: Variable) {
        if !self.parameters.contains(&parameter) {
            self.parameters.push(parameter);
        }
    }

    /// Sets the next-value constraint of a state variable, replacing any earlier one.
    pub fn add_effect(&mut self, var: Variable, effect: Expr) -> Result<()> {
        if !self.state_variables.contains(&var) {
            return Err(Error::UndeclaredVariable(var.name));
        }
        match self.effects.iter_mut().find(|(v, _)| *v == var) {
            Some(entry) => entry.1 = effect,
            None => self.effects.push((var, effect)),
        }
        Ok(())
    }

    pub fn explicit_effect(&self, var: &Variable) -> Option<&Expr> {
        self.effects.iter().find(|(v, _)| v == var).map(|(_, e)| e)
    }

    /// Conjunction of all preconditions; `true` when there are none.
    pub fn precondition(&self) -> Expr {
        Expr::and_all(self.preconditions.iter().cloned())
    }

    /// Precondition conjoined with every explicit effect, in order.
    pub fn effect(&self) -> Expr {
        self.effects
            .iter()
            .fold(self.precondition(), |acc, (_, e)| Expr::and(acc, e.clone()))
    }

    /// Next-value constraint of `var` together with the precondition conjuncts
    /// it transitively depends on.
    ///
    /// Starting from the free variables of the effect, a conjunct is included
    /// as soon as it mentions a relevant variable; its own variables then
    /// become relevant and the conjuncts before it are scanned again. Included
    /// conjuncts keep their inclusion order. Without an explicit effect the
    /// variable stutters: `var' == var`.
    pub fn effect_for_variable(&self, var: &Variable) -> Expr {
        let Some(effect) = self.explicit_effect(var) else {
            return Expr::equal(Expr::var(&var.primed()), Expr::var(var));
        };

        let mut relevant = effect.free_variables();
        let mut included = Vec::new();
        self.collect_frame(self.preconditions.len(), &mut relevant, &mut included);
        debug!(
            "effect_for_variable(label = {}, var = {}) -> {} conjuncts",
            self.name,
            var,
            included.len()
        );

        if included.is_empty() {
            return effect.clone();
        }
        let frame = Expr::and_all(included.into_iter().map(|i| self.preconditions[i].clone()));
        Expr::and(frame, effect.clone())
    }

    fn collect_frame(&self, max_index: usize, relevant: &mut BTreeSet<Variable>, included: &mut Vec<usize>) {
        for i in 0..max_index {
            if included.contains(&i) {
                continue;
            }
            let conjunct = &self.preconditions[i];
            if conjunct.mentions_any(relevant.iter()) {
                included.push(i);
                relevant.extend(conjunct.free_variables());
                self.collect_frame(i, relevant, included);
            }
        }
    }

    /// Precondition and the effect of every state variable, stutters included.
    pub fn transition_expression(&self) -> Expr {
        let effects = self.state_variables.iter().map(|var| match self.explicit_effect(var) {
            Some(effect) => effect.clone(),
            None => Expr::equal(Expr::var(&var.primed()), Expr::var(var)),
        });
        Expr::and_all(std::iter::once(self.precondition()).chain(effects))
    }

    /// Whether the precondition can hold in `state`.
    ///
    /// An indeterminate solver answer aborts the search.
    pub fn is_enabled_on_state(&self, state: &SymbolicState, solver: &dyn Solver) -> Result<bool> {
        let query = Expr::and(state.to_expression(), self.precondition());
        let result = solver.is_satisfiable(&query);
        debug!("is_enabled_on_state(label = {}, state = {}) -> {}", self.name, state.id(), result);
        match result {
            SolverResult::Sat => Ok(true),
            SolverResult::Unsat => Ok(false),
            SolverResult::DontKnow => Err(Error::indeterminate(format!(
                "guard of {} on {}",
                self.name,
                state.id()
            ))),
        }
    }

    /// Next-value formulas of all state variables when firing as `transition`,
    /// with names made unique to the transition but primed names still in place.
    ///
    /// The formula of each variable is its frame-conditioned effect conjoined
    /// with the current formulas of the state variables that effect reads.
    pub fn successor_formulas(&self, state: &SymbolicState, transition: TransitionId) -> Vec<(Variable, Expr)> {
        let values = self
            .state_variables
            .iter()
            .map(|var| {
                let effect = self.effect_for_variable(var);
                let read = effect.free_variables();
                let formula = self
                    .state_variables
                    .iter()
                    .filter(|sv| read.contains(*sv))
                    .filter_map(|sv| state.get(sv))
                    .fold(effect, |acc, current| Expr::and(acc, current.clone()));
                (var.clone(), formula)
            })
            .collect();
        let names = transition_renaming(&self.state_variables, &self.parameters, transition.0);
        suffix_state(values, &names)
    }

    /// Builds the successor of `state` through this label, fired as transition `transition`.
    pub fn apply_on_state(&self, state: &SymbolicState, transition: TransitionId, id: StateId) -> SymbolicState {
        debug!("apply_on_state(label = {}, state = {}, transition = {})", self.name, state.id(), transition);
        let values = restore_current_names(self.successor_formulas(state, transition));
        SymbolicState::new(id, values)
    }
}

impl fmt::Display for TransitionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_constructor { "CONSTRUCTOR" } else { "TRANSITION" };
        writeln!(f, "{} {}", kind, self.name)?;
        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(|p| format!("{}:{}", p.name, p.ty))
                .collect::<Vec<_>>();
            writeln!(f, "  PARAMETER {}", params.join(", "))?;
        }
        for conjunct in &self.preconditions {
            writeln!(f, "  PRECONDITION {}", conjunct)?;
        }
        if self.is_error {
            writeln!(f, "  EFFECT ERROR")?;
        }
        for (var, effect) in &self.effects {
            writeln!(f, "  EFFECT {}: {}", var, effect)?;
        }
        Ok(())
    }
}
