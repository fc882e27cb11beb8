//! The transition system and its depth-indexed unrolling.
//!
//! States live in an arena owned by [`TransitionSystem`]; everything else
//! refers to them by [`StateId`]. Index 0 is reserved for the error state.
//! Depth `d` keeps three collections: the states first discovered at `d`,
//! every state derived at `d`, and the transitions executed at `d`.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::label::TransitionLabel;
use crate::novelty;
use crate::profile::{NoopObserver, Observer, Phase};
use crate::solver::Solver;
use crate::state::{StateId, SymbolicState};
use crate::transition::{Transition, TransitionId};
use crate::types::Variable;

pub const ERROR_STATE: StateId = StateId(0);

/// How an unrolling or search run ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Depth {
    /// No new state appeared after this depth.
    Fixpoint(usize),
    /// The depth bound was hit while new states were still being found.
    Bounded,
    /// The stop flag was raised after completing this depth.
    Stopped(usize),
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Fixpoint(depth) => write!(f, "{}", depth),
            Depth::Bounded => write!(f, "bounded"),
            Depth::Stopped(depth) => write!(f, "stopped at {}", depth),
        }
    }
}

/// Cooperative cancellation shared between a search and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct TransitionSystem {
    state_variables: Vec<Variable>,
    labels: Vec<TransitionLabel>,
    init_values: Vec<(Variable, Expr)>,
    states: Vec<SymbolicState>,
    transitions: Vec<Transition>,
    init_states: Vec<StateId>,
    new_states: BTreeMap<usize, Vec<StateId>>,
    all_states: BTreeMap<usize, Vec<StateId>>,
    transitions_by_depth: BTreeMap<usize, Vec<TransitionId>>,
    stop: StopFlag,
    initialized: bool,
}

impl Default for TransitionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionSystem {
    pub fn new() -> Self {
        Self {
            state_variables: Vec::new(),
            labels: Vec::new(),
            init_values: Vec::new(),
            states: vec![SymbolicState::error(ERROR_STATE)],
            transitions: Vec::new(),
            init_states: Vec::new(),
            new_states: BTreeMap::new(),
            all_states: BTreeMap::new(),
            transitions_by_depth: BTreeMap::new(),
            stop: StopFlag::new(),
            initialized: false,
        }
    }

    pub fn add_variable(&mut self, var: Variable) {
        if !self.state_variables.contains(&var) {
            self.state_variables.push(var);
        }
    }

    pub fn add_variables(&mut self, vars: impl IntoIterator<Item = Variable>) {
        for var in vars {
            self.add_variable(var);
        }
    }

    pub fn state_variables(&self) -> &[Variable] {
        &self.state_variables
    }

    /// An empty label over the variables declared so far.
    pub fn new_label(&self, name: impl Into<String>) -> TransitionLabel {
        TransitionLabel::new(name, self.state_variables.clone())
    }

    pub fn add_label(&mut self, label: TransitionLabel) {
        self.labels.push(label);
    }

    pub fn labels(&self) -> &[TransitionLabel] {
        &self.labels
    }

    pub fn label_by_name(&self, name: &str) -> Option<&TransitionLabel> {
        self.labels.iter().find(|l| l.name().eq_ignore_ascii_case(name))
    }

    pub fn state_variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.state_variables.iter().find(|v| v.name.eq_ignore_ascii_case(name))
    }

    pub fn init_values(&self) -> &[(Variable, Expr)] {
        &self.init_values
    }

    /// Overrides the initial formula `name == default` of a state variable.
    pub fn add_init_value(&mut self, name: &str, value: Expr) -> Result<()> {
        let var = self
            .state_variable_by_name(name)
            .cloned()
            .ok_or_else(|| Error::UndeclaredVariable(name.to_string()))?;
        match self.init_values.iter_mut().find(|(v, _)| *v == var) {
            Some(entry) => entry.1 = value.clone(),
            None => self.init_values.push((var.clone(), value.clone())),
        }
        if self.initialized && self.labels.iter().all(|l| !l.is_constructor()) {
            if let Some(&init) = self.init_states.first() {
                self.states[init.0].put(var, value);
            }
        }
        Ok(())
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn set_stop_flag(&mut self, flag: StopFlag) {
        self.stop = flag;
    }

    pub fn state(&self, id: StateId) -> Option<&SymbolicState> {
        self.states.get(id.0)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        id.0.checked_sub(1).and_then(|i| self.transitions.get(i))
    }

    /// Number of transitions executed so far, constructors included.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn error_state(&self) -> &SymbolicState {
        &self.states[ERROR_STATE.0]
    }

    pub fn init_states(&self) -> Vec<&SymbolicState> {
        self.init_states.iter().map(|id| &self.states[id.0]).collect()
    }

    pub fn new_states(&self, depth: usize) -> Vec<&SymbolicState> {
        self.lookup(&self.new_states, depth)
    }

    pub fn all_states(&self, depth: usize) -> Vec<&SymbolicState> {
        self.lookup(&self.all_states, depth)
    }

    pub fn transitions(&self, depth: usize) -> Vec<&Transition> {
        self.transitions_by_depth
            .get(&depth)
            .map(|ids| ids.iter().filter_map(|&id| self.transition(id)).collect())
            .unwrap_or_default()
    }

    fn lookup(&self, map: &BTreeMap<usize, Vec<StateId>>, depth: usize) -> Vec<&SymbolicState> {
        map.get(&depth)
            .map(|ids| ids.iter().map(|id| &self.states[id.0]).collect())
            .unwrap_or_default()
    }

    pub fn has_new_states(&self, depth: usize) -> bool {
        self.new_states.get(&depth).is_some_and(|ids| !ids.is_empty())
    }

    /// Deepest depth unrolled so far.
    pub fn current_depth(&self) -> usize {
        self.all_states.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Establishes depth 0.
    ///
    /// Without constructors the default state (every variable at its type's
    /// default, overridden by the init values) is the only initial state.
    /// Otherwise each enabled constructor fires once on the default state
    /// and every result becomes an initial state.
    pub fn initialize(&mut self, solver: &dyn Solver) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let constructors: Vec<usize> = (0..self.labels.len())
            .filter(|&i| self.labels[i].is_constructor())
            .collect();
        if !constructors.is_empty() && !self.init_values.is_empty() {
            return Err(Error::ConstructorWithInit);
        }

        let mut default = SymbolicState::initial(StateId(self.states.len()), &self.state_variables);
        for (var, value) in &self.init_values {
            default.put(var.clone(), value.clone());
        }
        let default_id = default.id();
        self.states.push(default);

        if constructors.is_empty() {
            self.new_states.entry(0).or_default().push(default_id);
            self.all_states.entry(0).or_default().push(default_id);
            self.init_states.push(default_id);
        } else {
            self.new_states.entry(0).or_default();
            self.all_states.entry(0).or_default();
            let mut observer = NoopObserver;
            for index in constructors {
                self.fire(index, default_id, 0, solver, &mut observer)?;
            }
            self.init_states = self.new_states[&0].clone();
        }
        debug!("initialize() -> {} initial states", self.init_states.len());
        self.initialized = true;
        Ok(())
    }

    pub fn unroll_iteration(&mut self, depth: usize, solver: &dyn Solver) -> Result<()> {
        self.unroll_iteration_observed(depth, solver, &mut NoopObserver)
    }

    /// Fires every non-constructor label on every non-error state first
    /// discovered at `depth - 1`.
    pub fn unroll_iteration_observed(
        &mut self,
        depth: usize,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        if depth == 0 {
            return Err(Error::InvalidDepth(depth));
        }
        self.initialize(solver)?;

        observer.phase_started(&Phase::Iteration, depth);
        self.new_states.insert(depth, Vec::new());
        self.all_states.insert(depth, Vec::new());
        self.transitions_by_depth.insert(depth, Vec::new());

        let frontier = self.new_states.get(&(depth - 1)).cloned().unwrap_or_default();
        'states: for source in frontier {
            if source == ERROR_STATE {
                continue;
            }
            for index in 0..self.labels.len() {
                if self.stop.is_raised() {
                    debug!("unroll_iteration(depth = {}) stopped", depth);
                    break 'states;
                }
                if self.labels[index].is_constructor() {
                    continue;
                }
                self.fire(index, source, depth, solver, observer)?;
            }
        }
        observer.phase_finished(&Phase::Iteration, depth);

        let found = self.new_states[&depth].len();
        observer.new_states(depth, found);
        info!(
            "depth {}: {} new states, {} states, {} transitions",
            depth,
            found,
            self.all_states[&depth].len(),
            self.transitions_by_depth[&depth].len()
        );
        Ok(())
    }

    fn fire(
        &mut self,
        index: usize,
        source: StateId,
        depth: usize,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let label = &self.labels[index];
        let name = label.name().to_string();

        let guard = Phase::Guard(name.clone());
        observer.phase_started(&guard, depth);
        let enabled = label.is_enabled_on_state(&self.states[source.0], solver);
        observer.phase_finished(&guard, depth);
        if !enabled? {
            return Ok(());
        }

        let id = TransitionId(self.transitions.len() + 1);
        let mut transition = Transition::new(id, source, name.clone());
        let end = if label.is_error() {
            if !self.states[ERROR_STATE.0].has_incoming_transitions() {
                let history = self.states[source.0].history().to_vec();
                self.states[ERROR_STATE.0].extend_history(&history, &name);
                self.new_states.entry(depth).or_default().push(ERROR_STATE);
                transition.set_reached_new_value(true);
            }
            let all = self.all_states.entry(depth).or_default();
            if !all.contains(&ERROR_STATE) {
                all.push(ERROR_STATE);
            }
            transition.set_reached_error(true);
            ERROR_STATE
        } else {
            let apply = Phase::Apply(name.clone());
            observer.phase_started(&apply, depth);
            let target = StateId(self.states.len());
            let mut candidate = label.apply_on_state(&self.states[source.0], id, target);
            candidate.extend_history(self.states[source.0].history(), &name);
            observer.phase_finished(&apply, depth);

            let is_new = if label.is_constructor() {
                true
            } else {
                observer.phase_started(&Phase::Novelty, depth);
                let reached = self.reach_expression();
                let is_new = novelty::is_new_value(&candidate, &reached, solver);
                observer.phase_finished(&Phase::Novelty, depth);
                is_new?
            };

            self.states.push(candidate);
            if is_new {
                self.new_states.entry(depth).or_default().push(target);
                transition.set_reached_new_value(true);
            }
            self.all_states.entry(depth).or_default().push(target);
            target
        };
        debug!("fire(label = {}, source = {}) -> {}", name, source, end);

        transition.set_end(end);
        self.states[end.0].add_incoming(id);
        self.states[source.0].add_outgoing(id);
        self.transitions.push(transition);
        self.transitions_by_depth.entry(depth).or_default().push(id);
        Ok(())
    }

    /// Everything reached so far, projected on the state variables.
    pub fn reach_expression(&self) -> Expr {
        let reached = self.all_states.values().flatten().map(|id| &self.states[id.0]);
        novelty::reach_expression(reached, &self.state_variables)
    }

    pub fn unroll_to_fix_point(&mut self, solver: &dyn Solver) -> Result<Depth> {
        self.unroll(None, solver, &mut NoopObserver)
    }

    pub fn unroll_bounded(&mut self, max_depth: usize, solver: &dyn Solver) -> Result<Depth> {
        self.unroll(Some(max_depth), solver, &mut NoopObserver)
    }

    /// Unrolls up to `depth`, stopping early at a fixpoint. Returns the last depth unrolled.
    pub fn unroll_to_depth(&mut self, depth: usize, solver: &dyn Solver) -> Result<usize> {
        self.initialize(solver)?;
        let mut current = self.current_depth();
        while current < depth && self.has_new_states(current) {
            current += 1;
            self.unroll_iteration(current, solver)?;
        }
        Ok(current)
    }

    /// Unrolls until a depth yields no new state, the bound is hit or the stop flag is raised.
    ///
    /// A fixpoint reports the last depth that produced new states.
    pub fn unroll(
        &mut self,
        max_depth: Option<usize>,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<Depth> {
        self.initialize(solver)?;
        let mut depth = self.current_depth();
        while self.has_new_states(depth) {
            if self.stop.is_raised() {
                return Ok(Depth::Stopped(depth));
            }
            if max_depth == Some(depth) {
                info!("depth bound {} reached", depth);
                return Ok(Depth::Bounded);
            }
            depth += 1;
            self.unroll_iteration_observed(depth, solver, observer)?;
            if self.stop.is_raised() {
                info!("stopped during depth {}", depth);
                return Ok(Depth::Stopped(depth - 1));
            }
        }
        let result = Depth::Fixpoint(depth.saturating_sub(1));
        info!("fixpoint reached: {}", result);
        Ok(result)
    }

    /// Variables, init overrides and labels in declaration order.
    pub fn complete_to_string(&self) -> String {
        let mut out = String::new();
        let vars = self
            .state_variables
            .iter()
            .map(|v| format!("{}:{}", v.name, v.ty))
            .collect::<Vec<_>>();
        let _ = writeln!(out, "VARIABLES {}", vars.join(", "));
        for (var, value) in &self.init_values {
            let _ = writeln!(out, "INIT {}: {}", var, value);
        }
        for label in &self.labels {
            let _ = write!(out, "{}", label);
        }
        out
    }
}

impl fmt::Display for TransitionSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, ids) in &self.all_states {
            let new = self.new_states.get(depth).map_or(0, Vec::len);
            writeln!(f, "depth {}: {} states, {} new", depth, ids.len(), new)?;
            for id in ids {
                writeln!(f, "  {}", self.states[id.0])?;
            }
        }
        Ok(())
    }
}
