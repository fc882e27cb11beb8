//! # reach-rs: reachability for labeled transition systems
//!
//! **`reach-rs`** explores the reachable state space of a labeled transition
//! system breadth-first, either symbolically (every state is a formula per
//! variable) or enumeratively (every state is a concrete valuation).
//!
//! ## Transition systems
//!
//! A system declares typed state variables and a set of transition labels.
//! Each label has a guard (a conjunction of preconditions), an optional list
//! of parameters, and an effect per modified variable relating its next value
//! `x'` to current values. Variables without an effect keep their value.
//! Labels marked as *error* lead to the distinguished error state; labels
//! marked as *constructor* fire once to build the initial states.
//!
//! ## Quick Start
//!
//! ```rust
//! use reach_rs::parser::parse_system;
//! use reach_rs::solver::BddSolver;
//! use reach_rs::system::Depth;
//!
//! let mut system = parse_system(
//!     "VARIABLES:\n\
//!      declare x:sint32\n\
//!      TRANSITION inc:\n\
//!      PRECONDITION:\n\
//!      x < 5\n\
//!      EFFECT:\n\
//!      x: x' == x + 1\n",
//! )
//! .unwrap();
//!
//! let solver = BddSolver::default();
//! assert_eq!(system.unroll_to_fix_point(&solver).unwrap(), Depth::Fixpoint(5));
//! assert_eq!(system.new_states(5).len(), 1);
//! ```
//!
//! ## Core Components
//!
//! - **[`system`]**: The [`TransitionSystem`][crate::system::TransitionSystem] and its depth-indexed unrolling.
//! - **[`label`]**: Guards, effects and the frame slice of a transition label.
//! - **[`search`]**: Region-based symbolic, enumerative and synchronised search.
//! - **[`solver`]**: The decision oracle, bit-blasting expressions into a [`Bdd`][crate::bdd::Bdd].
//! - **[`parser`]** and **[`encoding`]**: The textual DSL and the persisted format.

pub mod bdd;
pub mod bitblast;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod label;
pub mod novelty;
pub mod parser;
pub mod profile;
pub mod reference;
pub mod region;
pub mod rename;
pub mod sat;
pub mod search;
pub mod solver;
pub mod state;
pub mod system;
pub mod transition;
pub mod types;
pub mod utils;
