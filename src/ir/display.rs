//! Displaying IR.

use super::{BlockTarget, Constant, Expr, Instr, Prim, PrimArg, Program, RaiseKind, Terminator};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A wrapper around a `Program` to pretty-print it, block by block in
/// address order.
pub struct ProgramDisplay<'a>(pub(crate) &'a Program);

impl<'a> Display for ProgramDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (addr, block) in &self.0.blocks {
            let params = block
                .params
                .iter()
                .map(|p| format!("{}", p))
                .collect::<Vec<_>>();
            let entry_mark = if *addr == self.0.entry { " # entry" } else { "" };
            writeln!(f, "{}({}):{}", addr, params.join(", "), entry_mark)?;
            for (instr, _) in &block.body {
                writeln!(f, "  {}", instr)?;
            }
            writeln!(f, "  {}", block.terminator)?;
        }
        Ok(())
    }
}

impl Display for BlockTarget {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}", arg))
            .collect::<Vec<_>>();
        write!(f, "{}({})", self.block, args.join(", "))
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl Display for Prim {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Prim::Extern(name) => write!(f, "{}", name),
            Prim::Not => write!(f, "not"),
            Prim::IsInt => write!(f, "is_int"),
            Prim::Eq => write!(f, "eq"),
            Prim::Neq => write!(f, "neq"),
            Prim::Lt => write!(f, "lt"),
            Prim::Le => write!(f, "le"),
            Prim::Ult => write!(f, "ult"),
            Prim::Vectlength => write!(f, "vectlength"),
            Prim::ArrayGet => write!(f, "array_get"),
        }
    }
}

impl Display for PrimArg {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            PrimArg::Var(v) => write!(f, "{}", v),
            PrimArg::Const(c) => write!(f, "{}", c),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Expr::Apply {
                f: callee,
                args,
                exact,
            } => {
                let args = args
                    .iter()
                    .map(|arg| format!("{}", arg))
                    .collect::<Vec<_>>();
                let bang = if *exact { "!" } else { "" };
                write!(f, "{}{}({})", callee, bang, args.join(", "))
            }
            Expr::Block(tag, vars, _) => {
                let vars = vars.iter().map(|v| format!("{}", v)).collect::<Vec<_>>();
                write!(f, "block{{{}}}[{}]", tag, vars.join(", "))
            }
            Expr::Field(z, i) => write!(f, "{}[{}]", z, i),
            Expr::Closure(params, cont) => {
                let params = params.iter().map(|p| format!("{}", p)).collect::<Vec<_>>();
                write!(f, "fun({}) -> {}", params.join(", "), cont)
            }
            Expr::Constant(c) => write!(f, "const {}", c),
            Expr::Prim(p, args) => {
                let args = args
                    .iter()
                    .map(|arg| format!("{}", arg))
                    .collect::<Vec<_>>();
                write!(f, "prim {}({})", p, args.join(", "))
            }
        }
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Instr::Let(x, e) => write!(f, "{} = {}", x, e),
            Instr::Assign(x, y) => write!(f, "{} := {}", x, y),
            Instr::SetField(x, i, y) => write!(f, "{}[{}] <- {}", x, i, y),
            Instr::OffsetRef(x, i) => write!(f, "{}[{}] += 1", x, i),
            Instr::ArraySet(x, y, z) => write!(f, "{}[{}] <- {}", x, y, z),
        }
    }
}

impl Display for Terminator {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Terminator::Return { value } => write!(f, "return {}", value),
            Terminator::Raise { value, kind } => {
                let kind = match kind {
                    RaiseKind::Normal => "",
                    RaiseKind::Notrace => " notrace",
                    RaiseKind::Reraise => " reraise",
                };
                write!(f, "raise{} {}", kind, value)
            }
            Terminator::Stop => write!(f, "stop"),
            Terminator::Br { target } => write!(f, "br {}", target),
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
            } => write!(f, "if {}, {}, {}", cond, if_true, if_false),
            Terminator::Switch { arg, ints, tags } => {
                let arms = |targets: &[BlockTarget]| {
                    targets
                        .iter()
                        .map(|t| format!("{}", t))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(f, "switch {}, [{}], [{}]", arg, arms(ints), arms(tags))
            }
            Terminator::Pushtrap {
                target,
                exn,
                handler,
            } => write!(f, "pushtrap {} handler {} -> {}", target, exn, handler),
            Terminator::Poptrap { target } => write!(f, "poptrap {}", target),
        }
    }
}
