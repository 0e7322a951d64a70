//! Lattice trait definition.

use std::fmt::Debug;

/// A join-semilattice type used for an analysis.
///
/// The `join` operator must compute the least upper bound for its
/// operands (that is, its result must be "greater than or equal to" its
/// operands, according to the lattice's partial order, and must be the
/// least value that satisfies this condition). It must obey the usual
/// lattice laws:
///
/// * a `join` a == a  (reflexivity)
/// * a `join` b == b `join` a (commutativity)
/// * a `join` (b `join` c) == (a `join` b) `join` c (associativity)
/// * a `join` bottom == a
///
/// Note that while we require that the lattice is a consistent partial
/// order, we don't actually require the user to implement `PartialOrd`
/// on the type, because we never make direct ordering comparisons when
/// we perform an analysis. Instead the ordering is only implicitly
/// depended upon, in order to ensure that the analysis terminates. For
/// this to be true, we also require that the lattice has only a finite
/// chain length -- that is, there must not be an infinite ordered
/// sequence in the lattice (or, moving to "greater" values will always
/// reach a maximal element in finite steps).
pub trait Lattice: Clone + Debug {
    /// Return the `bottom` lattice value.
    fn bottom() -> Self;
    /// Mutate self to `join(self, other)`. Returns `true` if any
    /// changes occurred.
    fn join_with(&mut self, other: &Self) -> bool;
}
