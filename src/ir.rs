//! Intermediate representation: a whole program as a map from block
//! addresses to basic blocks, with SSA-like variables.

mod display;
mod program;

pub use display::*;
pub use program::*;
