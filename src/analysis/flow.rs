//! Results of the whole-program flow analysis, as consumed by the
//! global dead-code pass. The record is read-only: it is built once by
//! the flow analysis and borrowed by every later pass.

use crate::entity::PerEntity;
use crate::ir::{Expr, Var};
use std::collections::BTreeSet;

/// How a variable is defined: by an expression, or from outside the
/// static definition (a formal parameter, or the target of `Assign`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Def {
    Expr(Expr),
    #[default]
    Param,
}

/// Approximation of the set of values that may flow to a variable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Approx {
    /// Anything; no useful information.
    #[default]
    Top,
    /// Only the listed closure/block constants, plus possibly unknown
    /// values when `others` is set.
    Values { known: BTreeSet<Var>, others: bool },
}

/// Whether a variable's value may become observable outside its
/// defining closure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Escape {
    Escape,
    /// Escapes, but only into a constant context.
    Constant,
    #[default]
    No,
}

/// The read-only record produced by the global flow analysis.
#[derive(Clone, Debug, Default)]
pub struct FlowInfo {
    /// Definition of each variable, as seen by the flow analysis.
    pub defs: PerEntity<Var, Def>,
    /// Value approximation for each variable.
    pub approximation: PerEntity<Var, Approx>,
    /// For each closure variable, the variables its body may return.
    pub return_values: PerEntity<Var, BTreeSet<Var>>,
    /// Escape classification for each variable.
    pub escape: PerEntity<Var, Escape>,
}

impl FlowInfo {
    pub fn may_escape(&self, v: Var) -> bool {
        match self.escape[v] {
            Escape::Escape | Escape::Constant => true,
            Escape::No => false,
        }
    }
}
