//! Region-based search engines.

use reach_rs::parser::parse_system;
use reach_rs::profile::{NoopObserver, Profiler};
use reach_rs::search::{
    enumerative_breadth_first_search, symbolic_breadth_first_search, EnumerativeHelper, SymbolicHelper,
    SynchronisedHelper,
};
use reach_rs::solver::BddSolver;
use reach_rs::system::{Depth, TransitionSystem};
use reach_rs::types::{BuiltinType, Value, Variable};

const COUNTER_WITH_ERROR: &str = "\
VARIABLES:
declare x:sint8

TRANSITION inc:
PRECONDITION:
x < 4
EFFECT:
x: x' == x + 1

TRANSITION overflow:
PRECONDITION:
x == 2
EFFECT:
ERROR
";

fn system() -> TransitionSystem {
    parse_system(COUNTER_WITH_ERROR).unwrap()
}

// ─── Symbolic ──────────────────────────────────────────────────────────────────

#[test]
fn symbolic_search_reaches_fixpoint() {
    let mut system = system();
    let solver = BddSolver::default();
    let mut helper = SymbolicHelper::new();
    let mut profiler = Profiler::new();

    let image = symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut profiler).unwrap();
    assert_eq!(image.result, Depth::Fixpoint(4));
    assert_eq!(image.reachable.len(), 5);
    assert_eq!(image.reached_errors, ["overflow"]);
    assert_eq!(image.counterexamples["overflow"], ["inc", "inc", "overflow"]);
    assert!(profiler.label_time("inc").is_some());
    assert!(profiler.report().starts_with("complete result:"));
}

#[test]
fn symbolic_search_without_simplification_agrees() {
    let solver = BddSolver::default();

    let mut plain = system();
    let mut helper = SymbolicHelper::without_simplification();
    let image = symbolic_breadth_first_search(&mut plain, &mut helper, &solver, None, &mut NoopObserver).unwrap();

    let mut simplified = system();
    let mut helper = SymbolicHelper::new();
    let other = symbolic_breadth_first_search(&mut simplified, &mut helper, &solver, None, &mut NoopObserver).unwrap();

    assert_eq!(image.result, other.result);
    assert_eq!(image.reachable.len(), other.reachable.len());
}

#[test]
fn symbolic_search_bounded() {
    let mut system = system();
    let solver = BddSolver::default();
    let mut helper = SymbolicHelper::new();

    let image = symbolic_breadth_first_search(&mut system, &mut helper, &solver, Some(2), &mut NoopObserver).unwrap();
    assert_eq!(image.result, Depth::Bounded);
    assert_eq!(image.reachable.len(), 3);
}

// ─── Enumerative ───────────────────────────────────────────────────────────────

#[test]
fn enumerative_search_visits_every_value() {
    let mut system = system();
    let solver = BddSolver::default();
    let mut helper = EnumerativeHelper::new();

    let image = enumerative_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
    assert_eq!(image.result, Depth::Fixpoint(4));

    let x = Variable::new("x", BuiltinType::SInt8);
    let mut values: Vec<_> = image
        .reachable
        .states()
        .filter_map(|s| s.get(&x).cloned())
        .collect();
    values.sort_by_key(|v| v.to_string());
    let expected: Vec<_> = (0..=4).map(|v| Value::int(v, BuiltinType::SInt8)).collect();
    assert_eq!(values, expected);
    assert_eq!(image.reached_errors, ["overflow"]);
}

// ─── Synchronised ──────────────────────────────────────────────────────────────

#[test]
fn synchronised_search_stops_on_error() {
    let mut system = system();
    let solver = BddSolver::default();
    let stop = system.stop_flag();
    let mut helper = SynchronisedHelper::new(stop.clone());

    let image = symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
    assert!(stop.is_raised());
    assert!(matches!(image.result, Depth::Stopped(_)));
    assert_eq!(image.counterexamples["overflow"], ["inc", "inc", "overflow"]);
    assert!(image.reachable.len() < 5);
}

// ─── Constructors ──────────────────────────────────────────────────────────────

const CONSTRUCTED: &str = "\
VARIABLES:
declare x:sint32, y:sint32

CONSTRUCTOR make:
EFFECT:
y: y' == 7
x: x' == y + 1

TRANSITION step:
PRECONDITION:
x < 10
EFFECT:
x: x' == x + y
";

#[test]
fn symbolic_search_from_constructed_states() {
    let solver = BddSolver::default();
    let mut unrolled = parse_system(CONSTRUCTED).unwrap();
    assert_eq!(unrolled.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(2));

    for mut helper in [SymbolicHelper::new(), SymbolicHelper::without_simplification()] {
        let mut system = parse_system(CONSTRUCTED).unwrap();
        let image = symbolic_breadth_first_search(&mut system, &mut helper, &solver, None, &mut NoopObserver).unwrap();
        assert_eq!(image.result, Depth::Fixpoint(2));
        assert_eq!(image.reachable.len(), 3);
        assert!(image
            .reachable
            .states()
            .any(|s| s.history() == ["make", "step", "step"]));
    }
}
