//! Passes.

pub mod global_dce;
