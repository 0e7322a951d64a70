use crate::declare_entity;
use crate::entity::EntityRef;
use anyhow::{bail, Result};
use fxhash::FxHashSet;
use std::collections::BTreeMap;

declare_entity!(Var, "v");
declare_entity!(Addr, "b");
declare_entity!(SourceLoc, "loc");

/// A whole program: one distinguished entry block and a map from block
/// address to block body. The map may have holes; a branch to a missing
/// address is tolerated by every consumer (it is treated as dead).
#[derive(Clone, Debug)]
pub struct Program {
    /// Entry block.
    pub entry: Addr,
    /// Block bodies, in address order.
    pub blocks: BTreeMap<Addr, BlockDef>,
    next_var: u32,
    next_block: u32,
}

#[derive(Clone, Debug, Default)]
pub struct BlockDef {
    /// Formal parameters, bound by every branch into this block.
    pub params: Vec<Var>,
    /// Instructions in this block, each with its source location.
    pub body: Vec<(Instr, SourceLoc)>,
    /// Terminator: branch, return, raise, or stop.
    pub terminator: Terminator,
    pub terminator_loc: SourceLoc,
}

/// A continuation: a branch target together with the arguments bound to
/// the target block's parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTarget {
    pub block: Addr,
    pub args: Vec<Var>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// Bind a fresh variable to an expression.
    Let(Var, Expr),
    /// Mutate an existing variable to the current value of another.
    Assign(Var, Var),
    /// Write a field of a heap block.
    SetField(Var, u32, Var),
    /// Bump the integer stored in the given field of a reference block.
    OffsetRef(Var, u32),
    /// Write an array element at a dynamic index.
    ArraySet(Var, Var, Var),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Apply {
        f: Var,
        args: Vec<Var>,
        /// Whether the argument count is known to match the callee's arity.
        exact: bool,
    },
    Block(u32, Vec<Var>, BlockKind),
    Field(Var, u32),
    Closure(Vec<Var>, BlockTarget),
    Constant(Constant),
    Prim(Prim, Vec<PrimArg>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    NotArray,
    Array,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constant {
    Int(i64),
    /// Bit pattern of an IEEE754 double.
    Float(u64),
    Str(Box<str>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prim {
    Extern(Box<str>),
    Not,
    IsInt,
    Eq,
    Neq,
    Lt,
    Le,
    Ult,
    Vectlength,
    ArrayGet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimArg {
    Var(Var),
    Const(Constant),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaiseKind {
    Normal,
    Notrace,
    Reraise,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Return {
        value: Var,
    },
    Raise {
        value: Var,
        kind: RaiseKind,
    },
    Stop,
    Br {
        target: BlockTarget,
    },
    CondBr {
        cond: Var,
        if_true: BlockTarget,
        if_false: BlockTarget,
    },
    /// Dispatch on an immediate integer (first arm array) or a block tag
    /// (second arm array).
    Switch {
        arg: Var,
        ints: Vec<BlockTarget>,
        tags: Vec<BlockTarget>,
    },
    Pushtrap {
        target: BlockTarget,
        exn: Var,
        handler: BlockTarget,
    },
    Poptrap {
        target: BlockTarget,
    },
}

impl std::default::Default for Terminator {
    fn default() -> Self {
        Terminator::Stop
    }
}

impl Terminator {
    pub fn visit_targets<F: FnMut(&BlockTarget)>(&self, mut f: F) {
        match self {
            Terminator::Return { .. } | Terminator::Raise { .. } | Terminator::Stop => {}
            Terminator::Br { ref target } => f(target),
            Terminator::CondBr {
                ref if_true,
                ref if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Switch {
                ref ints, ref tags, ..
            } => {
                for target in ints {
                    f(target);
                }
                for target in tags {
                    f(target);
                }
            }
            Terminator::Pushtrap {
                ref target,
                ref handler,
                ..
            } => {
                f(target);
                f(handler);
            }
            Terminator::Poptrap { ref target } => f(target),
        }
    }

    pub fn update_targets<F: FnMut(&mut BlockTarget)>(&mut self, mut f: F) {
        match self {
            Terminator::Return { .. } | Terminator::Raise { .. } | Terminator::Stop => {}
            Terminator::Br { ref mut target } => f(target),
            Terminator::CondBr {
                ref mut if_true,
                ref mut if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Switch {
                ref mut ints,
                ref mut tags,
                ..
            } => {
                for target in ints {
                    f(target);
                }
                for target in tags {
                    f(target);
                }
            }
            Terminator::Pushtrap {
                ref mut target,
                ref mut handler,
                ..
            } => {
                f(target);
                f(handler);
            }
            Terminator::Poptrap { ref mut target } => f(target),
        }
    }

    pub fn visit_successors<F: FnMut(Addr)>(&self, mut f: F) {
        self.visit_targets(|target| f(target.block));
    }

    pub fn visit_uses<F: FnMut(Var)>(&self, mut f: F) {
        self.visit_targets(|target| {
            for &arg in &target.args {
                f(arg);
            }
        });
        match self {
            &Terminator::Return { value } => f(value),
            &Terminator::Raise { value, .. } => f(value),
            &Terminator::CondBr { cond, .. } => f(cond),
            &Terminator::Switch { arg, .. } => f(arg),
            _ => {}
        }
    }
}

impl Expr {
    pub fn visit_uses<F: FnMut(Var)>(&self, mut f: F) {
        match self {
            &Expr::Apply {
                f: callee,
                ref args,
                ..
            } => {
                f(callee);
                for &arg in args {
                    f(arg);
                }
            }
            &Expr::Block(_, ref vars, _) => {
                for &v in vars {
                    f(v);
                }
            }
            &Expr::Field(z, _) => f(z),
            &Expr::Closure(_, ref cont) => {
                for &arg in &cont.args {
                    f(arg);
                }
            }
            &Expr::Constant(_) => {}
            &Expr::Prim(_, ref args) => {
                for arg in args {
                    if let &PrimArg::Var(v) = arg {
                        f(v);
                    }
                }
            }
        }
    }
}

impl Instr {
    /// The variable this instruction freshly binds, if any.
    pub fn defined_var(&self) -> Option<Var> {
        match self {
            &Instr::Let(x, _) => Some(x),
            _ => None,
        }
    }

    pub fn visit_uses<F: FnMut(Var)>(&self, mut f: F) {
        match self {
            Instr::Let(_, e) => e.visit_uses(f),
            &Instr::Assign(x, y) => {
                f(x);
                f(y);
            }
            &Instr::SetField(x, _, y) => {
                f(x);
                f(y);
            }
            &Instr::OffsetRef(x, _) => f(x),
            &Instr::ArraySet(x, y, z) => {
                f(x);
                f(y);
                f(z);
            }
        }
    }
}

impl Program {
    /// Create a program with a fresh, empty entry block.
    pub fn new() -> Program {
        let mut program = Program {
            entry: Addr::invalid(),
            blocks: BTreeMap::new(),
            next_var: 0,
            next_block: 0,
        };
        program.entry = program.add_block(vec![]);
        program
    }

    /// Total count of variables minted so far. Every analysis table in
    /// this crate is sized by this.
    pub fn num_vars(&self) -> usize {
        self.next_var as usize
    }

    pub fn fresh_var(&mut self) -> Var {
        let v = Var::new(self.next_var as usize);
        self.next_var += 1;
        v
    }

    pub fn add_block(&mut self, params: Vec<Var>) -> Addr {
        let addr = Addr::new(self.next_block as usize);
        self.next_block += 1;
        self.blocks.insert(
            addr,
            BlockDef {
                params,
                ..BlockDef::default()
            },
        );
        log::trace!("add_block: block {}", addr);
        addr
    }

    pub fn append_to_block(&mut self, block: Addr, instr: Instr) {
        self.blocks
            .get_mut(&block)
            .unwrap()
            .body
            .push((instr, SourceLoc::invalid()));
    }

    pub fn set_terminator(&mut self, block: Addr, terminator: Terminator) {
        self.blocks.get_mut(&block).unwrap().terminator = terminator;
    }

    pub fn display(&self) -> super::ProgramDisplay<'_> {
        super::ProgramDisplay(self)
    }

    /// Check that every variable occurrence is bound somewhere: by a block
    /// or closure parameter, a `Let`, or a `Pushtrap` handler binder.
    pub fn validate(&self) -> Result<()> {
        if !self.blocks.contains_key(&self.entry) {
            bail!("entry block {} is missing", self.entry);
        }
        let mut bound = FxHashSet::default();
        for block in self.blocks.values() {
            bound.extend(block.params.iter().copied());
            for (instr, _) in &block.body {
                if let Some(x) = instr.defined_var() {
                    bound.insert(x);
                }
                if let Instr::Let(_, Expr::Closure(params, _)) = instr {
                    bound.extend(params.iter().copied());
                }
            }
            if let Terminator::Pushtrap { exn, .. } = block.terminator {
                bound.insert(exn);
            }
        }
        for (&addr, block) in &self.blocks {
            let mut unbound = None;
            let mut check = |v: Var| {
                if !bound.contains(&v) && unbound.is_none() {
                    unbound = Some(v);
                }
            };
            for (instr, _) in &block.body {
                instr.visit_uses(&mut check);
            }
            block.terminator.visit_uses(&mut check);
            if let Some(v) = unbound {
                bail!("unbound variable {} in block {}", v, addr);
            }
        }
        Ok(())
    }
}

impl std::default::Default for Program {
    fn default() -> Self {
        Program::new()
    }
}
