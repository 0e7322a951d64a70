//! Pass framework: skeletons for fixpoint analyses over code.
//!
//! Terminology note: a "pass" here is a readonly analysis. It does not
//! mutate code; it only traverses the program, possibly revisiting parts
//! of it (to converge), in order to compute some derived information.
//! Rewrites are built on top of the computed results.

pub mod lattice;
pub use lattice::*;
pub mod solver;
pub use solver::*;
