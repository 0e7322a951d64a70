//! Global, field-sensitive dead-code analysis and rewriting.
//!
//! The pass computes, for every variable in the program, whether its
//! value can be observed -- and for heap blocks, *which fields* can be
//! observed. It then rewrites every occurrence of an unobservable
//! variable into a single fresh sentinel variable (bound once, in the
//! entry block, to an undefined value) and compacts dead trailing block
//! fields. The bindings that become unused are left in place; a later,
//! purely local dead-code pass deletes them.
//!
//! Results of the whole-program flow analysis (`FlowInfo`) connect
//! liveness across function boundaries: the liveness of a call result
//! flows to the callee's possible return values, and the liveness of a
//! formal parameter flows to the actual arguments at every known,
//! exactly-applied call site.

use crate::analysis::flow::{Approx, Def, FlowInfo};
use crate::analysis::purity::Purity;
use crate::entity::{EntityRef, EntityVec};
use crate::ir::{
    Addr, BlockTarget, Expr, Instr, Prim, PrimArg, Program, SourceLoc, Terminator, Var,
};
use crate::pass::{solve, Lattice, VarGraph};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A sorted set of observed field indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSet(SmallVec<[u32; 4]>);

impl FieldSet {
    pub fn singleton(i: u32) -> FieldSet {
        let mut fields = SmallVec::new();
        fields.push(i);
        FieldSet(fields)
    }

    pub fn contains(&self, i: u32) -> bool {
        self.0.binary_search(&i).is_ok()
    }

    pub fn insert(&mut self, i: u32) -> bool {
        match self.0.binary_search(&i) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, i);
                true
            }
        }
    }

    pub fn union_with(&mut self, other: &FieldSet) -> bool {
        let mut changed = false;
        for &i in &other.0 {
            changed |= self.insert(i);
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

/// Liveness of one variable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Liveness {
    /// No observed use.
    #[default]
    Dead,
    /// The variable is a heap block and only the listed fields are
    /// observed. The set is never empty.
    Live(FieldSet),
    /// Observed, and either not a block or observed other than through
    /// field projection.
    Top,
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        !matches!(self, Liveness::Dead)
    }
}

impl Lattice for Liveness {
    fn bottom() -> Self {
        Liveness::Dead
    }

    fn join_with(&mut self, other: &Self) -> bool {
        match (&mut *self, other) {
            (_, Liveness::Dead) => false,
            (Liveness::Top, _) => false,
            (this, Liveness::Top) => {
                *this = Liveness::Top;
                true
            }
            (this @ Liveness::Dead, Liveness::Live(fields)) => {
                *this = Liveness::Live(fields.clone());
                true
            }
            (Liveness::Live(mine), Liveness::Live(fields)) => mine.union_with(fields),
        }
    }
}

impl Display for Liveness {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Liveness::Dead => write!(f, "dead"),
            Liveness::Live(fields) => {
                let fields = fields
                    .iter()
                    .map(|i| format!("{}", i))
                    .collect::<Vec<_>>();
                write!(f, "live{{{}}}", fields.join(","))
            }
            Liveness::Top => write!(f, "top"),
        }
    }
}

/// How a user consumes the variable it refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageKind {
    /// The used variable is consumed to produce the user; the
    /// contribution depends on how the user is defined.
    Compute,
    /// The user's liveness flows to the used variable unchanged
    /// (argument-to-parameter and return-value edges).
    Propagate,
}

impl Display for UsageKind {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            UsageKind::Compute => write!(f, "compute"),
            UsageKind::Propagate => write!(f, "propagate"),
        }
    }
}

/// The use graph. `users[y]` lists every variable that uses `y`,
/// sorted, with the kind of use; `graph` holds the same edges inverted
/// for the solver's revisit scheduling.
struct Uses {
    users: EntityVec<Var, SmallVec<[(Var, UsageKind); 4]>>,
    graph: VarGraph,
}

impl Uses {
    fn new(num_vars: usize) -> Uses {
        Uses {
            users: EntityVec::with_default(num_vars),
            graph: VarGraph::new(num_vars),
        }
    }

    fn add(&mut self, kind: UsageKind, user: Var, used: Var) {
        let list = &mut self.users[used];
        match list.binary_search_by_key(&user, |&(x, _)| x) {
            // A pair can be recorded more than once; the last kind wins.
            Ok(pos) => list[pos].1 = kind,
            Err(pos) => {
                list.insert(pos, (user, kind));
                self.graph.add_dep(user, used);
            }
        }
    }
}

/// Record how each variable is defined: `Let` stores the expression,
/// everything else (block and closure formals, `Assign` targets) reads
/// as `Param`.
fn definitions(num_vars: usize, program: &Program) -> EntityVec<Var, Def> {
    let mut defs: EntityVec<Var, Def> = EntityVec::with_default(num_vars);
    for block in program.blocks.values() {
        for (instr, _) in &block.body {
            match instr {
                Instr::Let(x, e) => defs[*x] = Def::Expr(e.clone()),
                Instr::Assign(x, _) => defs[*x] = Def::Param,
                _ => {}
            }
        }
    }
    defs
}

/// Build the use graph.
fn usages(num_vars: usize, program: &Program, flow: &FlowInfo) -> Uses {
    let mut uses = Uses::new(num_vars);

    // A continuation passes its arguments to the target block's
    // parameters. A missing target contributes nothing; extra
    // parameters or arguments are silently ignored.
    let add_cont = |uses: &mut Uses, cont: &BlockTarget| {
        if let Some(block) = program.blocks.get(&cont.block) {
            for (&param, &arg) in block.params.iter().zip(cont.args.iter()) {
                uses.add(UsageKind::Propagate, param, arg);
            }
        }
    };

    for block in program.blocks.values() {
        for (instr, _) in &block.body {
            match instr {
                Instr::Let(x, e) => match e {
                    Expr::Apply { f, args, .. } => {
                        uses.add(UsageKind::Compute, *x, *f);
                        match &flow.approximation[*f] {
                            // Escape analysis already forced everything
                            // reachable through an unknown callee to top.
                            Approx::Top => {}
                            Approx::Values { known, .. } => {
                                for &k in known {
                                    match &flow.defs[k] {
                                        Def::Expr(Expr::Closure(params, _))
                                            if params.len() == args.len() =>
                                        {
                                            for &r in &flow.return_values[k] {
                                                uses.add(UsageKind::Propagate, *x, r);
                                            }
                                            for (&param, &arg) in params.iter().zip(args.iter()) {
                                                uses.add(UsageKind::Propagate, param, arg);
                                            }
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }
                    }
                    Expr::Block(_, vars, _) => {
                        for &v in vars {
                            uses.add(UsageKind::Compute, *x, v);
                        }
                    }
                    Expr::Field(z, _) => uses.add(UsageKind::Compute, *x, *z),
                    Expr::Constant(_) => {}
                    Expr::Closure(_, cont) => add_cont(&mut uses, cont),
                    Expr::Prim(_, args) => {
                        for arg in args {
                            if let PrimArg::Var(v) = arg {
                                uses.add(UsageKind::Compute, *x, *v);
                            }
                        }
                    }
                },
                Instr::Assign(x, y) => uses.add(UsageKind::Compute, *x, *y),
                // Mutations influence liveness at seed time only.
                Instr::SetField(..) | Instr::OffsetRef(..) | Instr::ArraySet(..) => {}
            }
        }
        block
            .terminator
            .visit_targets(|cont| add_cont(&mut uses, cont));
    }
    uses
}

fn add_top(live: &mut EntityVec<Var, Liveness>, x: Var) {
    live[x] = Liveness::Top;
}

fn add_live(live: &mut EntityVec<Var, Liveness>, x: Var, field: u32) {
    live[x].join_with(&Liveness::Live(FieldSet::singleton(field)));
}

/// Seed liveness from locally observable effects, in one walk of the
/// program.
fn liveness(
    num_vars: usize,
    program: &Program,
    purity: &Purity,
    flow: &FlowInfo,
) -> EntityVec<Var, Liveness> {
    let mut live: EntityVec<Var, Liveness> = EntityVec::with_default(num_vars);

    for block in program.blocks.values() {
        for (instr, _) in &block.body {
            match instr {
                Instr::Let(x, e) => {
                    // A pure binding gets its liveness from its users,
                    // during propagation.
                    if !purity.pure_expr(e) {
                        add_top(&mut live, *x);
                    }
                }
                Instr::Assign(..) => {}
                &Instr::SetField(x, i, y) => {
                    add_live(&mut live, x, i);
                    // The written value is observable through any
                    // future read of the block.
                    add_top(&mut live, y);
                }
                &Instr::OffsetRef(x, i) => add_live(&mut live, x, i),
                &Instr::ArraySet(x, y, z) => {
                    add_top(&mut live, x);
                    add_top(&mut live, y);
                    add_top(&mut live, z);
                }
            }
        }
        match &block.terminator {
            &Terminator::Return { value } => {
                // Non-escaping return values inherit liveness from the
                // caller through the return edge instead.
                if flow.may_escape(value) {
                    add_top(&mut live, value);
                }
            }
            &Terminator::Raise { value, .. } => add_top(&mut live, value),
            &Terminator::CondBr { cond, .. } => add_top(&mut live, cond),
            &Terminator::Switch { arg, .. } => add_top(&mut live, arg),
            Terminator::Stop
            | Terminator::Br { .. }
            | Terminator::Pushtrap { .. }
            | Terminator::Poptrap { .. } => {}
        }
    }
    live
}

/// One solver step: join the seed with the contribution of every user
/// of `x`.
fn propagate(
    x: Var,
    defs: &EntityVec<Var, Def>,
    uses: &Uses,
    seed: &EntityVec<Var, Liveness>,
    table: &EntityVec<Var, Liveness>,
) -> Liveness {
    let mut result = seed[x].clone();
    for &(y, kind) in &uses.users[x] {
        let contribution = match kind {
            UsageKind::Propagate => table[y].clone(),
            UsageKind::Compute => match &table[y] {
                // An unobserved user contributes nothing.
                Liveness::Dead => Liveness::Dead,
                Liveness::Live(fields) => match &defs[y] {
                    Def::Expr(Expr::Block(_, vars, _)) => {
                        if fields.iter().any(|i| vars.get(i as usize).copied() == Some(x)) {
                            Liveness::Top
                        } else {
                            Liveness::Dead
                        }
                    }
                    Def::Expr(Expr::Field(_, i)) => Liveness::Live(FieldSet::singleton(*i)),
                    _ => Liveness::Top,
                },
                Liveness::Top => match &defs[y] {
                    // An observation of a field projection is precisely
                    // an observation of that field of its source.
                    Def::Expr(Expr::Field(_, i)) => Liveness::Live(FieldSet::singleton(*i)),
                    _ => Liveness::Top,
                },
            },
        };
        result.join_with(&contribution);
    }
    result
}

/// Rewrite the program: replace every occurrence of a dead variable
/// with the sentinel and compact dead trailing block fields. Bindings
/// themselves are left in place for the local dead-code pass.
fn zero(mut program: Program, sentinel: Var, table: &EntityVec<Var, Liveness>) -> Program {
    // Param liveness per block, computed before any mutation.
    let dead_params: BTreeMap<Addr, Vec<bool>> = program
        .blocks
        .iter()
        .map(|(&addr, block)| {
            let dead = block
                .params
                .iter()
                .map(|&p| !table[p].is_live())
                .collect::<Vec<_>>();
            (addr, dead)
        })
        .collect();

    let zero_var = |v: Var| if table[v].is_live() { v } else { sentinel };

    // Arities are preserved: a dead target parameter blanks the
    // corresponding argument, everything else passes through.
    let zero_cont = |cont: &mut BlockTarget| {
        if let Some(dead) = dead_params.get(&cont.block) {
            for (arg, &is_dead) in cont.args.iter_mut().zip(dead.iter()) {
                if is_dead {
                    *arg = sentinel;
                }
            }
        }
    };

    for block in program.blocks.values_mut() {
        for (instr, _) in &mut block.body {
            match instr {
                Instr::Let(_, Expr::Closure(_, cont)) => zero_cont(cont),
                Instr::Let(x, Expr::Block(_, vars, _)) => {
                    // Only a field-live block loses elements; a top or
                    // dead binding is left for the local pass.
                    if let Liveness::Live(fields) = &table[*x] {
                        for (i, v) in vars.iter_mut().enumerate() {
                            if !fields.contains(i as u32) {
                                *v = sentinel;
                            }
                        }
                        // Interior sentinels must stay: field indices of
                        // surviving reads are position-dependent.
                        while vars.last() == Some(&sentinel) {
                            vars.pop();
                        }
                    }
                }
                Instr::Let(_, Expr::Apply { args, .. }) => {
                    for arg in args {
                        *arg = zero_var(*arg);
                    }
                }
                _ => {}
            }
        }
        match &mut block.terminator {
            Terminator::Return { value } => *value = zero_var(*value),
            term => term.update_targets(zero_cont),
        }
    }
    program
}

/// Bind a fresh sentinel variable to an undefined value at the top of
/// the entry block, so that every later substitution refers to a
/// dominating definition.
pub fn add_sentinel(program: &mut Program) -> Var {
    let sentinel = program.fresh_var();
    let entry = program.entry;
    let block = program.blocks.get_mut(&entry).unwrap();
    block.body.insert(
        0,
        (
            Instr::Let(
                sentinel,
                Expr::Prim(Prim::Extern("%undefined".into()), vec![]),
            ),
            SourceLoc::invalid(),
        ),
    );
    sentinel
}

fn dump(uses: &Uses, seed: &EntityVec<Var, Liveness>, table: &EntityVec<Var, Liveness>) {
    for v in seed.iter() {
        let users = uses.users[v]
            .iter()
            .map(|&(x, kind)| format!("{} {}", kind, x))
            .collect::<Vec<_>>();
        log::debug!(
            "global_dce: {}: seed {}, final {}, used by [{}]",
            v,
            seed[v],
            table[v],
            users.join(", ")
        );
    }
}

/// Run the analysis and rewrite. `sentinel` must already be bound in
/// the entry block (see `add_sentinel`); the same variable replaces
/// every dead occurrence.
pub fn run(program: Program, sentinel: Var, flow: &FlowInfo, purity: &Purity) -> Program {
    let start = std::time::Instant::now();
    let num_vars = program.num_vars();

    log::debug!("global_dce: input:\n{}", program.display());

    let defs = definitions(num_vars, &program);
    let uses = usages(num_vars, &program, flow);
    let seed = liveness(num_vars, &program, purity, flow);
    let table = solve(num_vars, &uses.graph, |x, table| {
        propagate(x, &defs, &uses, &seed, table)
    });

    if log::log_enabled!(log::Level::Debug) {
        dump(&uses, &seed, &table);
    }

    let program = zero(program, sentinel, &table);

    log::debug!("global_dce: output:\n{}", program.display());
    log::debug!("global_dce: done in {:?}", start.elapsed());
    program
}

/// Driver convenience: insert the sentinel binding, then run the pass.
pub fn global_dce(mut program: Program, flow: &FlowInfo, purity: &Purity) -> Program {
    let sentinel = add_sentinel(&mut program);
    run(program, sentinel, flow, purity)
}
