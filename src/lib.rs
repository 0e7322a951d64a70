//! SICKLE: flow-directed, field-sensitive global dead-code analysis
//! over a whole-program IR.

pub mod analysis;
pub mod entity;
mod ir;
pub mod pass;
pub mod passes;

pub use ir::*;
