//! Chaotic worklist iteration to fixpoint over a variable dependency
//! graph, using lattice analysis values.

use crate::entity::EntityVec;
use crate::ir::Var;
use crate::pass::Lattice;
use fxhash::FxHashSet;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Dependency edges between variables. `add_dep(from, to)` records that
/// the analysis value of `from` is read when computing the value of
/// `to`; whenever `from`'s value grows, `to` must be revisited.
#[derive(Clone, Debug, Default)]
pub struct VarGraph {
    deps: EntityVec<Var, SmallVec<[Var; 4]>>,
}

impl VarGraph {
    pub fn new(num_vars: usize) -> VarGraph {
        VarGraph {
            deps: EntityVec::with_default(num_vars),
        }
    }

    pub fn add_dep(&mut self, from: Var, to: Var) {
        self.deps[from].push(to);
    }

    pub fn deps(&self, v: Var) -> &[Var] {
        &self.deps[v]
    }
}

/// Iterate `transfer` over all variables until stable. The transfer
/// function reads the current table and produces a new value for one
/// variable; the new value is joined into the table, so the sequence of
/// values at each variable is an ascending chain and the iteration
/// terminates by finite lattice height.
pub fn solve<L, F>(num_vars: usize, graph: &VarGraph, mut transfer: F) -> EntityVec<Var, L>
where
    L: Lattice,
    F: FnMut(Var, &EntityVec<Var, L>) -> L,
{
    let mut table: EntityVec<Var, L> = vec![L::bottom(); num_vars].into();

    let mut workqueue = VecDeque::new();
    let mut workqueue_set = FxHashSet::default();
    for v in table.iter() {
        workqueue.push_back(v);
        workqueue_set.insert(v);
    }

    while let Some(v) = workqueue.pop_front() {
        workqueue_set.remove(&v);

        let value = transfer(v, &table);
        let changed = table[v].join_with(&value);

        if changed {
            for &dep in graph.deps(v) {
                if workqueue_set.insert(dep) {
                    workqueue.push_back(dep);
                }
            }
        }
    }

    table
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Max(u32);

    impl Lattice for Max {
        fn bottom() -> Self {
            Max(0)
        }
        fn join_with(&mut self, other: &Self) -> bool {
            if other.0 > self.0 {
                self.0 = other.0;
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn propagates_along_chain() {
        // v0 -> v1 -> v2: v2's value must reach v0 the long way around.
        let mut graph = VarGraph::new(3);
        graph.add_dep(Var::new(2), Var::new(1));
        graph.add_dep(Var::new(1), Var::new(0));
        let table = solve::<Max, _>(3, &graph, |v, table| match v.index() {
            2 => Max(7),
            1 => table[Var::new(2)].clone(),
            0 => table[Var::new(1)].clone(),
            _ => unreachable!(),
        });
        assert_eq!(table[Var::new(0)], Max(7));
        assert_eq!(table[Var::new(1)], Max(7));
        assert_eq!(table[Var::new(2)], Max(7));
    }
}
