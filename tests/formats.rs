//! DSL parsing and the persisted format.

use reach_rs::encoding::{load_system, write_system};
use reach_rs::error::Error;
use reach_rs::parser::{parse_file, parse_system};
use reach_rs::solver::BddSolver;
use reach_rs::system::Depth;

const ELEVATOR: &str = "\
// two-floor elevator with a door
VARIABLES:
declare floor:uint8, open:bool, calls:sint16

CONSTRUCTOR start:
EFFECT:
floor: floor' == 0
open: open' == false

TRANSITION up:
Moves the cabin one floor up.
The door has to be closed.
PRECONDITION:
floor < 1
!open
EFFECTS:
floor: floor' == floor + 1
calls: calls' == calls + 1

TRANSITION door:
PRECONDITION:
open == false
EFFECT:
open: open' <=> !open

TRANSITION:
PARAMETER:
declare req:uint8
PRECONDITION:
req > floor
open && floor == 1
EFFECT:
ERROR
";

// ─── Parser ────────────────────────────────────────────────────────────────────

#[test]
fn parse_elevator() {
    let system = parse_system(ELEVATOR).unwrap();
    assert_eq!(system.state_variables().len(), 3);
    assert_eq!(system.labels().len(), 4);

    let start = system.label_by_name("start").unwrap();
    assert!(start.is_constructor());
    assert_eq!(start.effects().len(), 2);

    let up = system.label_by_name("UP").unwrap();
    assert_eq!(up.precondition().to_string(), "((floor < 1) && !open)");
    assert_eq!(up.effects().len(), 2);

    let door = system.label_by_name("door").unwrap();
    assert_eq!(door.precondition().to_string(), "(open <=> false)");

    let anonymous = system.label_by_name("t_0").unwrap();
    assert!(anonymous.is_error());
    assert_eq!(anonymous.parameters().len(), 1);
}

#[test]
fn parse_and_unroll_elevator() {
    let mut system = parse_system(ELEVATOR).unwrap();
    let solver = BddSolver::default();

    assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(3));
    assert!(system.error_state().has_incoming_transitions());
    assert_eq!(system.error_state().history(), ["start", "up", "door", "t_0"]);
}

#[test]
fn parse_errors_carry_line_numbers() {
    let cases = [
        ("VARIABLES:\ndeclare x:sint32\nTRANSITION t:\nPRECONDITION:\ny > 0\n", 5),
        ("VARIABLES:\ndeclare x:sint32\nTRANSITION t:\nEFFECT:\nx = 1\n", 5),
        ("declare x:sint32\n", 1),
        ("VARIABLES:\ndeclare x:sint32\nPRECONDITION:\nx > 0\n", 3),
        ("VARIABLES:\ndeclare x:sint32\nINIT:\nx: x + 1\n", 4),
    ];
    for (input, expected) in cases {
        match parse_system(input) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, expected, "{}", input),
            other => panic!("expected a parse error for {:?}, got {:?}", input, other),
        }
    }
}

#[test]
fn parse_missing_file() {
    assert!(matches!(parse_file("does/not/exist.ts"), Err(Error::Io(_))));
}

// ─── Persisted format ──────────────────────────────────────────────────────────

#[test]
fn persisted_round_trip_renders_identically() {
    let system = parse_system(ELEVATOR).unwrap();
    let loaded = load_system(&write_system(&system)).unwrap();
    assert_eq!(loaded.complete_to_string(), system.complete_to_string());
}

#[test]
fn persisted_round_trip_keeps_behaviour() {
    let solver = BddSolver::default();
    let mut system = parse_system(ELEVATOR).unwrap();
    let mut loaded = load_system(&write_system(&system)).unwrap();
    assert_eq!(
        loaded.unroll_to_fix_point(&solver).unwrap(),
        system.unroll_to_fix_point(&solver).unwrap()
    );
}

#[test]
fn persisted_init_values() {
    let system = parse_system("VARIABLES:\ndeclare x:sint32\nINIT:\nx: x == 4 || x == 5\n").unwrap();
    let encoded = write_system(&system);
    assert!(encoded.contains("I:v:x:sint32;p:o:OR;"));
    let loaded = load_system(&encoded).unwrap();
    assert_eq!(loaded.complete_to_string(), "VARIABLES x:sint32\nINIT x: ((x == 4) || (x == 5))\n");
}

#[test]
fn persisted_unknown_type() {
    match load_system("D:v:x:sint32;v:y:complex;\n") {
        Err(Error::UnknownType(token)) => assert_eq!(token, "complex"),
        other => panic!("expected an unknown type, got {:?}", other),
    }
}
