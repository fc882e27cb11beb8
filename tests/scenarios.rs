//! End-to-end unrolling scenarios, written in the DSL.

use reach_rs::error::Error;
use reach_rs::expr::Expr;
use reach_rs::novelty::{is_new_value, reach_expression};
use reach_rs::parser::parse_system;
use reach_rs::solver::{BddSolver, Solver, SolverResult, Valuation};
use reach_rs::system::{Depth, TransitionSystem};

fn parse(input: &str) -> TransitionSystem {
    parse_system(input).unwrap()
}

// ─── Counter ───────────────────────────────────────────────────────────────────

const COUNTER: &str = "\
VARIABLES:
declare x:sint32

TRANSITION inc:
PRECONDITION:
x < 5
EFFECT:
x: x' == x + 1
";

#[test]
fn counter_reaches_fixpoint_at_five() {
    let mut system = parse(COUNTER);
    let solver = BddSolver::default();

    assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(5));
    assert_eq!(system.new_states(0).len(), 1);
    for depth in 1..=5 {
        assert_eq!(system.new_states(depth).len(), 1, "depth {}", depth);
    }
    assert!(system.new_states(6).is_empty());
    assert!(system.transitions(6).is_empty());
    assert!(!system.error_state().has_incoming_transitions());
}

#[test]
fn counter_bounded() {
    let mut system = parse(COUNTER);
    let solver = BddSolver::default();

    assert_eq!(system.unroll_bounded(3, &solver).unwrap(), Depth::Bounded);
    assert_eq!(system.current_depth(), 3);
}

#[test]
fn counter_states_are_not_new_twice() {
    let mut system = parse(COUNTER);
    let solver = BddSolver::default();
    system.unroll_to_depth(2, &solver).unwrap();

    let reached = system.reach_expression();
    for depth in 0..=2 {
        for state in system.all_states(depth) {
            assert!(!is_new_value(state, &reached, &solver).unwrap());
        }
    }
}

#[test]
fn reached_region_grows_with_depth() {
    let mut system = parse(COUNTER);
    let solver = BddSolver::default();
    system.initialize(&solver).unwrap();

    let vars = system.state_variables().to_vec();
    let mut previous = Expr::bool(false);
    for depth in 1..=5 {
        system.unroll_iteration(depth, &solver).unwrap();
        let states = (0..=depth).flat_map(|d| system.all_states(d));
        let current = reach_expression(states, &vars);
        // previous && !current is unsatisfiable
        let lost = Expr::and(previous.clone(), Expr::not(current.clone()));
        assert_eq!(solver.is_satisfiable(&lost), SolverResult::Unsat);
        previous = current;
    }
}

// ─── Constructors ──────────────────────────────────────────────────────────────

const CONSTRUCTORS: &str = "\
VARIABLES:
declare x:sint32

CONSTRUCTOR c1:
EFFECT:
x: x' == 0

CONSTRUCTOR c2:
EFFECT:
x: x' == 9

TRANSITION t1:
PRECONDITION:
x < 3
EFFECT:
x: x' == x + 1

TRANSITION t2:
PRECONDITION:
x > 7
x < 10
EFFECT:
x: x' == x - 1
";

#[test]
fn constructors_build_initial_states() {
    let mut system = parse(CONSTRUCTORS);
    let solver = BddSolver::default();
    system.initialize(&solver).unwrap();

    let init = system.init_states();
    assert_eq!(init.len(), 2);
    let mut labels = Vec::new();
    for state in &init {
        assert_eq!(state.incoming().len(), 1);
        let transition = system.transition(state.incoming()[0]).unwrap();
        labels.push(transition.labels()[0].clone());
    }
    assert_eq!(labels, ["c1", "c2"]);
    assert_eq!(system.new_states(0).len(), 2);
}

#[test]
fn constructors_never_fire_again() {
    let mut system = parse(CONSTRUCTORS);
    let solver = BddSolver::default();

    assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(3));
    for depth in 1..=system.current_depth() {
        for transition in system.transitions(depth) {
            assert!(!transition.labels().iter().any(|l| l.starts_with('c')));
        }
    }
    assert_eq!(system.new_states(1).len(), 2);
    assert_eq!(system.new_states(2).len(), 2);
    assert_eq!(system.new_states(3).len(), 1);
}

#[test]
fn constructors_with_init_are_rejected() {
    let mut system = parse(&format!("{}\nINIT:\nx: x == 1\n", CONSTRUCTORS));
    let solver = BddSolver::default();
    assert!(matches!(system.initialize(&solver), Err(Error::ConstructorWithInit)));
}

// ─── Error labels ──────────────────────────────────────────────────────────────

const ERROR_FROM_TWO_STATES: &str = "\
VARIABLES:
declare x:sint32

TRANSITION a:
EFFECT:
x: x' == 300

TRANSITION b:
PARAMETER: declare p:sint32
PRECONDITION:
p == 300 || p == 1
EFFECT:
x: x' == p

TRANSITION e:
PRECONDITION:
x == 300
EFFECT:
ERROR
";

#[test]
fn error_state_is_recorded_once() {
    let mut system = parse(ERROR_FROM_TWO_STATES);
    let solver = BddSolver::default();

    assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(2));
    assert_eq!(system.new_states(1).len(), 2);

    let new = system.new_states(2);
    assert_eq!(new.len(), 1);
    assert!(new[0].is_error());

    let to_error: Vec<_> = system
        .transitions(2)
        .into_iter()
        .filter(|t| t.reached_error())
        .collect();
    assert_eq!(to_error.len(), 2);
    assert_eq!(to_error.iter().filter(|t| t.reached_new_value()).count(), 1);
    assert_eq!(system.error_state().history(), ["a", "e"]);
}

const PARAMETER_GUARDS: &str = "\
VARIABLES:
declare x:sint32

TRANSITION t1:
PARAMETER: declare p1:sint32
PRECONDITION:
p1 > 200
p1 < 400
EFFECT:
x: x' == p1

TRANSITION t2:
PARAMETER: declare p1:sint32
PRECONDITION:
p1 <= 200 || p1 >= 400
EFFECT:
ERROR
";

#[test]
fn disjoint_parameter_guards() {
    let mut system = parse(PARAMETER_GUARDS);
    let solver = BddSolver::default();

    assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(1));
    let new = system.new_states(1);
    assert_eq!(new.len(), 2);
    assert_eq!(new.iter().filter(|s| s.is_error()).count(), 1);
}

// ─── Solver protocol ───────────────────────────────────────────────────────────

struct Undecided;

impl Solver for Undecided {
    fn is_satisfiable(&self, _expr: &Expr) -> SolverResult {
        SolverResult::DontKnow
    }

    fn solve(&self, _expr: &Expr) -> (SolverResult, Valuation) {
        (SolverResult::DontKnow, Valuation::new())
    }
}

#[test]
fn indeterminate_guard_is_fatal() {
    let mut system = parse(COUNTER);
    assert!(matches!(
        system.unroll_to_fix_point(&Undecided),
        Err(Error::SolverIndeterminate { .. })
    ));
}

#[test]
fn real_variables_are_indeterminate() {
    let mut system = parse("VARIABLES:\ndeclare r:double\nTRANSITION grow:\nEFFECT:\nr: r' == r + 1.5\n");
    let solver = BddSolver::default();
    assert!(matches!(
        system.unroll_to_fix_point(&solver),
        Err(Error::SolverIndeterminate { .. })
    ));
}
