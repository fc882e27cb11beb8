//! Region-based breadth-first search.
//!
//! ```text
//! reached := Init; frontier := Init
//! while frontier is not empty:
//!     image    := rename(Post(frontier))
//!     frontier := image \ reached
//!     reached  := reached ∪ frontier
//! ```
//!
//! The same loop drives the symbolic and the enumerative search; a
//! [`TransitionHelper`] decides what a state is and how `Post` computes it.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::label::TransitionLabel;
use crate::profile::{Observer, Phase};
use crate::region::{NameGenerator, Region, RegionState};
use crate::rename::restore_current_names;
use crate::solver::{Solver, SolverResult};
use crate::state::{EnumerativeState, StateId, SymbolicState};
use crate::system::{Depth, StopFlag, TransitionSystem};
use crate::transition::TransitionId;
use crate::types::Variable;

/// Working state of a search run.
#[derive(Debug, Clone)]
pub struct SearchImage<S> {
    pub depth: usize,
    pub reachable: Region<S>,
    pub previous_new: Region<S>,
    pub new_states: Region<S>,
    /// Error messages recorded at each depth.
    pub errors_in_depth: BTreeMap<usize, Vec<String>>,
    /// Error labels reached, in the order they were first reached.
    pub reached_errors: Vec<String>,
    /// For every reached error label, the labels fired to get there.
    pub counterexamples: BTreeMap<String, Vec<String>>,
    pub result: Depth,
    names: NameGenerator,
}

impl<S: RegionState> SearchImage<S> {
    pub fn new(initial: impl IntoIterator<Item = S>) -> Self {
        let mut names = NameGenerator::new();
        let mut reachable = Region::new();
        for state in initial {
            reachable.put(names.next_name(), state);
        }
        Self {
            depth: 0,
            previous_new: reachable.clone(),
            reachable,
            new_states: Region::new(),
            errors_in_depth: BTreeMap::new(),
            reached_errors: Vec::new(),
            counterexamples: BTreeMap::new(),
            result: Depth::Fixpoint(0),
            names,
        }
    }

    pub fn fresh_name(&mut self) -> String {
        self.names.next_name()
    }

    /// Number of state names handed out during the run.
    pub fn names_issued(&self) -> usize {
        self.names.count()
    }

    pub fn is_error_reached(&self, label: &str) -> bool {
        self.reached_errors.iter().any(|e| e == label)
    }

    /// Records the first reach of an error label. Later reaches are ignored.
    pub fn record_error(&mut self, label: &str, history: Vec<String>) {
        if self.is_error_reached(label) {
            return;
        }
        info!("error {} reached at depth {}", label, self.depth);
        self.errors_in_depth
            .entry(self.depth)
            .or_default()
            .push(format!("{} reached at depth {}", label, self.depth));
        self.reached_errors.push(label.to_string());
        self.counterexamples.insert(label.to_string(), history);
    }
}

impl<S: RegionState> fmt::Display for SearchImage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "depth: {} ({})", self.depth, self.result)?;
        writeln!(f, "reachable states: {}", self.reachable.len())?;
        write!(f, "{}", self.reachable)?;
        for (depth, errors) in &self.errors_in_depth {
            for error in errors {
                writeln!(f, "depth {}: {}", depth, error)?;
            }
        }
        for (label, history) in &self.counterexamples {
            writeln!(f, "counterexample for {}: {}", label, history.join(" -> "))?;
        }
        Ok(())
    }
}

fn guard_result(result: SolverResult, label: &TransitionLabel, depth: usize) -> Result<bool> {
    match result {
        SolverResult::Sat => Ok(true),
        SolverResult::Unsat => Ok(false),
        SolverResult::DontKnow => Err(Error::indeterminate(format!(
            "guard of {} at depth {}",
            label.name(),
            depth
        ))),
    }
}

/// Knows how to fire labels on the states of one kind of region.
pub trait TransitionHelper<S: RegionState> {
    /// Makes every transition id this helper issues greater than `issued`.
    fn skip_transitions(&mut self, _issued: usize) {}

    /// Adds the successors of the frontier through `label` to `image.new_states`.
    fn apply_ok(
        &mut self,
        image: &mut SearchImage<S>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()>;

    /// Turns next-value states into current-value states.
    fn rename_to_current(&self, region: Region<S>) -> Region<S>;

    /// States of `image` not already in `reached`.
    fn difference(
        &self,
        image: &Region<S>,
        reached: &Region<S>,
        state_variables: &[Variable],
        solver: &dyn Solver,
    ) -> Result<Region<S>>;

    /// Tests an error label against the reachable region; the first reach wins.
    fn apply_error(
        &mut self,
        image: &mut SearchImage<S>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        if image.is_error_reached(label.name()) {
            return Ok(());
        }
        let mut found = None;
        for state in image.reachable.states() {
            if self.satisfies_guard(state, label, image.depth, solver, observer)? {
                found = Some(state.history().to_vec());
                break;
            }
        }
        if let Some(mut history) = found {
            history.push(label.name().to_string());
            image.record_error(label.name(), history);
        }
        Ok(())
    }

    fn satisfies_guard(
        &self,
        state: &S,
        label: &TransitionLabel,
        depth: usize,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<bool> {
        let query = Expr::and(state.to_expression(), label.precondition());
        let phase = Phase::Guard(label.name().to_string());
        observer.phase_started(&phase, depth);
        let result = solver.is_satisfiable(&query);
        observer.phase_finished(&phase, depth);
        guard_result(result, label, depth)
    }

    fn should_continue(&self, _image: &SearchImage<S>) -> bool {
        true
    }
}

/// Symbolic `Post`: frame-conditioned effects, renamed per fired transition.
#[derive(Debug)]
pub struct SymbolicHelper {
    transitions: usize,
    simplify: bool,
}

impl Default for SymbolicHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolicHelper {
    pub fn new() -> Self {
        Self {
            transitions: 0,
            simplify: true,
        }
    }

    /// Keeps next-value formulas as computed, without pinning determined values.
    pub fn without_simplification() -> Self {
        Self {
            simplify: false,
            ..Self::new()
        }
    }

    /// Replaces `formula` by `var' == c` when it admits `c` as the only value of `var'`.
    pub fn simplify_formula(var: &Variable, formula: Expr, solver: &dyn Solver) -> Result<Expr> {
        let primed = var.primed();
        if !formula.free_variables().contains(&primed) {
            return Ok(formula);
        }
        let (result, model) = solver.solve(&formula);
        let value = match result {
            SolverResult::Sat => match model.get(&primed) {
                Some(value) => value.clone(),
                None => return Ok(formula),
            },
            SolverResult::Unsat => return Ok(formula),
            SolverResult::DontKnow => {
                return Err(Error::indeterminate(format!("a value of {}", primed)));
            }
        };
        let pinned = Expr::equal(Expr::var(&primed), Expr::Constant(value));
        let other = Expr::and(formula.clone(), Expr::not(pinned.clone()));
        match solver.is_satisfiable(&other) {
            SolverResult::Unsat => {
                debug!("simplify_formula(var = {}) -> {}", var, pinned);
                Ok(pinned)
            }
            SolverResult::Sat => Ok(formula),
            SolverResult::DontKnow => Err(Error::indeterminate(format!("uniqueness of {}", primed))),
        }
    }
}

impl TransitionHelper<SymbolicState> for SymbolicHelper {
    fn skip_transitions(&mut self, issued: usize) {
        self.transitions = self.transitions.max(issued);
    }

    fn apply_ok(
        &mut self,
        image: &mut SearchImage<SymbolicState>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let depth = image.depth;
        let frontier: Vec<SymbolicState> = image.previous_new.states().cloned().collect();
        for state in &frontier {
            if !self.satisfies_guard(state, label, depth, solver, observer)? {
                continue;
            }
            let phase = Phase::Apply(label.name().to_string());
            observer.phase_started(&phase, depth);
            self.transitions += 1;
            let mut formulas = label.successor_formulas(state, TransitionId(self.transitions));
            if self.simplify {
                formulas = formulas
                    .into_iter()
                    .map(|(var, formula)| {
                        let simplified = Self::simplify_formula(&var, formula, solver)?;
                        Ok((var, simplified))
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
            let name = image.fresh_name();
            let mut next = SymbolicState::new(StateId(image.names_issued()), formulas);
            next.extend_history(state.history(), label.name());
            image.new_states.put(name, next);
            observer.phase_finished(&phase, depth);
        }
        Ok(())
    }

    fn rename_to_current(&self, region: Region<SymbolicState>) -> Region<SymbolicState> {
        region.map(|state| state.map_values(restore_current_names))
    }

    fn difference(
        &self,
        image: &Region<SymbolicState>,
        reached: &Region<SymbolicState>,
        state_variables: &[Variable],
        solver: &dyn Solver,
    ) -> Result<Region<SymbolicState>> {
        image.difference(reached, state_variables, solver)
    }
}

/// Enumerative `Post`: one concrete model of the guard and effects per fired label.
#[derive(Debug, Default)]
pub struct EnumerativeHelper;

impl EnumerativeHelper {
    pub fn new() -> Self {
        Self
    }
}

impl TransitionHelper<EnumerativeState> for EnumerativeHelper {
    fn apply_ok(
        &mut self,
        image: &mut SearchImage<EnumerativeState>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let depth = image.depth;
        let primed: Vec<Variable> = label.state_variables().iter().map(Variable::primed).collect();
        let frontier: Vec<EnumerativeState> = image.previous_new.states().cloned().collect();
        for state in &frontier {
            if !self.satisfies_guard(state, label, depth, solver, observer)? {
                continue;
            }
            let phase = Phase::Apply(label.name().to_string());
            observer.phase_started(&phase, depth);
            let query = Expr::and(state.to_expression(), label.transition_expression());
            let (result, model) = solver.solve(&query);
            observer.phase_finished(&phase, depth);
            match result {
                SolverResult::Sat => {
                    let next = EnumerativeState::from_valuation(&model, &primed)
                        .with_history(state.history(), label.name());
                    let name = image.fresh_name();
                    image.new_states.put(name, next);
                }
                SolverResult::Unsat => {
                    warn!("{} is enabled on {} but its effects admit no successor", label.name(), state);
                }
                SolverResult::DontKnow => {
                    return Err(Error::indeterminate(format!(
                        "successor of {} through {}",
                        state,
                        label.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn rename_to_current(&self, region: Region<EnumerativeState>) -> Region<EnumerativeState> {
        region.map(EnumerativeState::unprimed)
    }

    fn difference(
        &self,
        image: &Region<EnumerativeState>,
        reached: &Region<EnumerativeState>,
        _state_variables: &[Variable],
        _solver: &dyn Solver,
    ) -> Result<Region<EnumerativeState>> {
        Ok(image.difference(reached))
    }
}

/// Symbolic search that halts as soon as any error label fires on the frontier.
#[derive(Debug)]
pub struct SynchronisedHelper {
    inner: SymbolicHelper,
    stop: StopFlag,
}

impl SynchronisedHelper {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            inner: SymbolicHelper::new(),
            stop,
        }
    }
}

impl TransitionHelper<SymbolicState> for SynchronisedHelper {
    fn skip_transitions(&mut self, issued: usize) {
        self.inner.skip_transitions(issued);
    }

    fn apply_ok(
        &mut self,
        image: &mut SearchImage<SymbolicState>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        self.inner.apply_ok(image, label, solver, observer)
    }

    fn rename_to_current(&self, region: Region<SymbolicState>) -> Region<SymbolicState> {
        self.inner.rename_to_current(region)
    }

    fn difference(
        &self,
        image: &Region<SymbolicState>,
        reached: &Region<SymbolicState>,
        state_variables: &[Variable],
        solver: &dyn Solver,
    ) -> Result<Region<SymbolicState>> {
        self.inner.difference(image, reached, state_variables, solver)
    }

    fn apply_error(
        &mut self,
        image: &mut SearchImage<SymbolicState>,
        label: &TransitionLabel,
        solver: &dyn Solver,
        observer: &mut dyn Observer,
    ) -> Result<()> {
        let mut found = None;
        for state in image.previous_new.states() {
            if self.satisfies_guard(state, label, image.depth, solver, observer)? {
                found = Some(state.history().to_vec());
                break;
            }
        }
        if let Some(mut history) = found {
            self.stop.raise();
            history.push(label.name().to_string());
            debug!("apply_error(label = {}) -> counterexample {}", label.name(), history.join(" -> "));
            image.record_error(label.name(), history);
        }
        Ok(())
    }

    fn should_continue(&self, _image: &SearchImage<SymbolicState>) -> bool {
        !self.stop.is_raised()
    }
}

/// Runs the search loop from `initial` until the frontier is empty, the bound
/// is hit, or the run is stopped.
pub fn breadth_first_search<S: RegionState>(
    system: &TransitionSystem,
    helper: &mut dyn TransitionHelper<S>,
    initial: Vec<S>,
    solver: &dyn Solver,
    max_depth: Option<usize>,
    observer: &mut dyn Observer,
) -> Result<SearchImage<S>> {
    let stop = system.stop_flag();
    let mut image = SearchImage::new(initial);

    while !image.previous_new.is_empty() {
        if max_depth == Some(image.depth) {
            info!("depth bound {} reached", image.depth);
            image.result = Depth::Bounded;
            return Ok(image);
        }
        image.depth += 1;
        let depth = image.depth;

        observer.phase_started(&Phase::Iteration, depth);
        let mut interrupted = false;
        for label in system.labels() {
            if stop.is_raised() {
                interrupted = true;
                break;
            }
            if label.is_constructor() {
                continue;
            }
            if label.is_error() {
                helper.apply_error(&mut image, label, solver, observer)?;
            } else {
                helper.apply_ok(&mut image, label, solver, observer)?;
            }
        }
        observer.phase_finished(&Phase::Iteration, depth);
        observer.new_states(depth, image.new_states.len());

        observer.phase_started(&Phase::Rename, depth);
        let post = helper.rename_to_current(std::mem::take(&mut image.new_states));
        observer.phase_finished(&Phase::Rename, depth);

        observer.phase_started(&Phase::Difference, depth);
        let delta = helper.difference(&post, &image.reachable, system.state_variables(), solver)?;
        observer.phase_finished(&Phase::Difference, depth);

        info!("depth {}: {} successors, {} new", depth, post.len(), delta.len());
        image.reachable.extend(delta.clone());
        image.previous_new = delta;

        if interrupted {
            image.result = Depth::Stopped(depth - 1);
            return Ok(image);
        }
        if stop.is_raised() || !helper.should_continue(&image) {
            image.result = Depth::Stopped(depth);
            return Ok(image);
        }
    }

    image.result = Depth::Fixpoint(image.depth.saturating_sub(1));
    info!("search finished: {}", image.result);
    Ok(image)
}

/// Symbolic search starting from the initial states of `system`.
pub fn symbolic_breadth_first_search(
    system: &mut TransitionSystem,
    helper: &mut dyn TransitionHelper<SymbolicState>,
    solver: &dyn Solver,
    max_depth: Option<usize>,
    observer: &mut dyn Observer,
) -> Result<SearchImage<SymbolicState>> {
    system.initialize(solver)?;
    // initial states built by constructors already mention renamed variables
    helper.skip_transitions(system.transition_count());
    let initial = system.init_states().into_iter().cloned().collect();
    breadth_first_search(system, helper, initial, solver, max_depth, observer)
}

/// Enumerative search starting from one concrete model of every initial state.
pub fn enumerative_breadth_first_search(
    system: &mut TransitionSystem,
    helper: &mut dyn TransitionHelper<EnumerativeState>,
    solver: &dyn Solver,
    max_depth: Option<usize>,
    observer: &mut dyn Observer,
) -> Result<SearchImage<EnumerativeState>> {
    system.initialize(solver)?;
    let mut initial = Vec::new();
    for state in system.init_states() {
        let (result, model) = solver.solve(&state.to_expression());
        match result {
            SolverResult::Sat => {
                let concrete = EnumerativeState::from_valuation(&model, system.state_variables());
                initial.push(concrete.with_history_of(state.history()));
            }
            SolverResult::Unsat => warn!("initial state {} is unsatisfiable", state.id()),
            SolverResult::DontKnow => {
                return Err(Error::indeterminate(format!("initial state {}", state.id())));
            }
        }
    }
    breadth_first_search(system, helper, initial, solver, max_depth, observer)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::{Comparator, NumericOp};
    use crate::profile::{NoopObserver, Profiler};
    use crate::solver::BddSolver;
    use crate::types::BuiltinType;

    fn x() -> Variable {
        Variable::new("x", BuiltinType::SInt32)
    }

    fn lit(v: i64) -> Expr {
        Expr::int(v, BuiltinType::SInt32)
    }

    fn counter_with_error(limit: i64, bad: i64) -> TransitionSystem {
        let mut system = TransitionSystem::new();
        system.add_variable(x());
        let mut inc = system.new_label("inc");
        inc.add_precondition(Expr::compare(Expr::var(&x()), Comparator::Lt, lit(limit)));
        inc.add_effect(
            x(),
            Expr::compare(
                Expr::var(&x().primed()),
                Comparator::Eq,
                Expr::numeric(Expr::var(&x()), NumericOp::Add, lit(1)),
            ),
        )
        .unwrap();
        system.add_label(inc);
        let mut error = system.new_label("bad");
        error.set_error(true);
        error.add_precondition(Expr::compare(Expr::var(&x()), Comparator::Eq, lit(bad)));
        system.add_label(error);
        system
    }

    #[test]
    fn test_simplify_formula_pins_determined_value() {
        let solver = BddSolver::default();
        let old = Variable::new("x_sv_1", BuiltinType::SInt32);
        let formula = Expr::and(
            Expr::compare(
                Expr::var(&x().primed()),
                Comparator::Eq,
                Expr::numeric(Expr::var(&old), NumericOp::Add, lit(1)),
            ),
            Expr::compare(Expr::var(&old), Comparator::Eq, lit(2)),
        );
        let simplified = SymbolicHelper::simplify_formula(&x(), formula, &solver).unwrap();
        assert_eq!(simplified.to_string(), "(x' == 3)");

        let open = Expr::compare(Expr::var(&x().primed()), Comparator::Gt, lit(2));
        let kept = SymbolicHelper::simplify_formula(&x(), open.clone(), &solver).unwrap();
        assert_eq!(kept, open);
    }

    #[test]
    fn test_symbolic_search_reaches_fixpoint() {
        let mut system = counter_with_error(4, 100);
        let solver = BddSolver::default();
        let mut helper = SymbolicHelper::new();
        let mut profiler = Profiler::new();
        let image = symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut profiler).unwrap();
        assert_eq!(image.result, Depth::Fixpoint(4));
        assert_eq!(image.reachable.len(), 5);
        assert!(image.reached_errors.is_empty());
        assert!(profiler.kind_time("difference").is_some());
    }

    #[test]
    fn test_symbolic_search_records_error_once() {
        let mut system = counter_with_error(4, 2);
        let solver = BddSolver::default();
        let mut helper = SymbolicHelper::new();
        let image =
            symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Fixpoint(4));
        assert_eq!(image.reached_errors, vec!["bad".to_string()]);
        assert_eq!(image.errors_in_depth.values().map(Vec::len).sum::<usize>(), 1);
        assert_eq!(
            image.counterexamples["bad"],
            vec!["inc".to_string(), "inc".to_string(), "bad".to_string()]
        );
    }

    #[test]
    fn test_bounded_search() {
        let mut system = counter_with_error(10, 100);
        let solver = BddSolver::default();
        let mut helper = SymbolicHelper::without_simplification();
        let image =
            symbolic_breadth_first_search(&mut system, &mut helper, &solver, Some(3), &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Bounded);
        assert_eq!(image.depth, 3);
        assert_eq!(image.reachable.len(), 4);
    }

    #[test]
    fn test_zero_bound_keeps_initial_states() {
        let mut system = counter_with_error(5, 100);
        let solver = BddSolver::default();
        let mut helper = SymbolicHelper::new();
        let image =
            symbolic_breadth_first_search(&mut system, &mut helper, &solver, Some(0), &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Bounded);
        assert_eq!(image.depth, 0);
        assert_eq!(image.reachable.len(), 1);

        let mut unrolled = counter_with_error(5, 100);
        assert_eq!(unrolled.unroll_bounded(0, &solver).unwrap(), image.result);
    }

    #[test]
    fn test_stop_before_search_reports_depth_zero() {
        let mut system = counter_with_error(5, 100);
        system.stop_flag().raise();
        let solver = BddSolver::default();
        let mut helper = SymbolicHelper::new();
        let image =
            symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Stopped(0));
        assert_eq!(image.reachable.len(), 1);
    }

    #[test]
    fn test_enumerative_search() {
        let mut system = counter_with_error(4, 3);
        let solver = BddSolver::default();
        let mut helper = EnumerativeHelper::new();
        let image =
            enumerative_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Fixpoint(4));
        let mut values: Vec<String> = image
            .reachable
            .states()
            .map(|s| s.get(&x()).unwrap().to_string())
            .collect();
        values.sort();
        assert_eq!(values, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(image.reached_errors, vec!["bad".to_string()]);
    }

    #[test]
    fn test_synchronised_search_stops() {
        let mut system = counter_with_error(10, 2);
        let solver = BddSolver::default();
        let mut helper = SynchronisedHelper::new(system.stop_flag());
        let image =
            symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Stopped(3));
        assert!(system.stop_flag().is_raised());
        assert_eq!(
            image.counterexamples["bad"],
            vec!["inc".to_string(), "inc".to_string(), "bad".to_string()]
        );
    }
}
