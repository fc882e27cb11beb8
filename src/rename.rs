//! Per-transition renaming, so formulas accumulated along different branches
//! of the search never share a free variable name.

use log::debug;

use crate::expr::{Expr, NameMap};
use crate::types::Variable;

pub fn state_variable_name(name: &str, transition: usize) -> String {
    format!("{}_sv_{}", name, transition)
}

pub fn parameter_name(name: &str, transition: usize) -> String {
    format!("{}_p_{}", name, transition)
}

/// Renaming table of one fired transition: `n -> n_sv_t` for state variables
/// and `n -> n_p_t` for parameters.
pub fn transition_renaming(state_variables: &[Variable], parameters: &[Variable], transition: usize) -> NameMap {
    let mut names = NameMap::new();
    for var in state_variables {
        names.map_names(&var.name, state_variable_name(&var.name, transition));
    }
    for var in parameters {
        names.map_names(&var.name, parameter_name(&var.name, transition));
    }
    names
}

/// Applies `names` to every formula of a candidate state.
pub fn suffix_state(values: Vec<(Variable, Expr)>, names: &NameMap) -> Vec<(Variable, Expr)> {
    debug!("suffix_state(values = {}, names = {})", values.len(), names.len());
    values
        .into_iter()
        .map(|(var, formula)| {
            let renamed = formula.rename(names);
            (var, renamed)
        })
        .collect()
}

/// Renames the primed name `n'` of each entry back to its plain name `n`,
/// turning next-value formulas into current-value formulas.
pub fn restore_current_names(values: Vec<(Variable, Expr)>) -> Vec<(Variable, Expr)> {
    values
        .into_iter()
        .map(|(var, formula)| {
            let mut names = NameMap::new();
            names.map_names(var.primed().name, var.name.clone());
            let restored = formula.rename(&names);
            (var, restored)
        })
        .collect()
}
