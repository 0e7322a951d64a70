//! Purity oracle: which expressions can be dropped without changing the
//! observable behavior of the program, and which closures qualify as
//! pure functions.

use crate::ir::{Addr, Expr, Instr, Prim, Program, Terminator, Var};
use fxhash::FxHashSet;

/// External primitives known to have no observable effect.
const PURE_EXTERNS: &[&str] = &["%undefined", "%identity", "%direct_obj_tag"];

#[derive(Clone, Debug)]
pub struct Purity {
    pure_funs: FxHashSet<Var>,
    enabled: bool,
}

impl Purity {
    /// The disabled oracle: every expression is judged impure. Running
    /// the dead-code pass with this oracle makes it a no-op.
    pub fn pessimistic() -> Purity {
        Purity {
            pure_funs: FxHashSet::default(),
            enabled: false,
        }
    }

    /// Compute the set of pure functions of `program`. Starts from the
    /// optimistic assumption that every closure is pure and repeatedly
    /// demotes closures whose reachable body mutates state, raises, or
    /// applies a non-pure callee, until stable. Mutually recursive pure
    /// closures survive.
    pub fn analyze(program: &Program) -> Purity {
        let mut closures: Vec<(Var, Addr)> = vec![];
        for block in program.blocks.values() {
            for (instr, _) in &block.body {
                if let Instr::Let(x, Expr::Closure(_, cont)) = instr {
                    closures.push((*x, cont.block));
                }
            }
        }

        let mut purity = Purity {
            pure_funs: closures.iter().map(|&(f, _)| f).collect(),
            enabled: true,
        };
        loop {
            let mut changed = false;
            for &(f, entry) in &closures {
                if purity.pure_funs.contains(&f) && !purity.body_is_pure(program, entry) {
                    purity.pure_funs.remove(&f);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        log::trace!("purity: {} of {} closures pure", purity.pure_funs.len(), closures.len());
        purity
    }

    pub fn pure_expr(&self, e: &Expr) -> bool {
        if !self.enabled {
            return false;
        }
        match e {
            Expr::Constant(_) | Expr::Block(..) | Expr::Field(..) | Expr::Closure(..) => true,
            Expr::Apply { f, .. } => self.pure_funs.contains(f),
            Expr::Prim(p, _) => match p {
                Prim::Extern(name) => PURE_EXTERNS.iter().any(|&known| known == &**name),
                // Reads mutable state and can fault on a bad index.
                Prim::ArrayGet => false,
                _ => true,
            },
        }
    }

    /// Whether every instruction reachable from `entry` is effect-free.
    /// Follows terminator successors only; nested closure bodies are
    /// judged on their own.
    fn body_is_pure(&self, program: &Program, entry: Addr) -> bool {
        let mut stack = vec![entry];
        let mut seen = FxHashSet::default();
        seen.insert(entry);
        while let Some(addr) = stack.pop() {
            let block = match program.blocks.get(&addr) {
                Some(block) => block,
                None => continue,
            };
            for (instr, _) in &block.body {
                match instr {
                    Instr::Let(_, e) => {
                        if !self.pure_expr(e) {
                            return false;
                        }
                    }
                    Instr::Assign(..)
                    | Instr::SetField(..)
                    | Instr::OffsetRef(..)
                    | Instr::ArraySet(..) => return false,
                }
            }
            if let Terminator::Raise { .. } = block.terminator {
                return false;
            }
            block.terminator.visit_successors(|succ| {
                if seen.insert(succ) {
                    stack.push(succ);
                }
            });
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{BlockTarget, Constant, PrimArg};

    #[test]
    fn disabled_oracle_is_constantly_false() {
        let purity = Purity::pessimistic();
        assert!(!purity.pure_expr(&Expr::Constant(Constant::Int(0))));
    }

    #[test]
    fn effect_free_closure_is_pure() {
        let mut p = Program::new();
        let f = p.fresh_var();
        let x = p.fresh_var();
        let y = p.fresh_var();
        let body = p.add_block(vec![x]);
        p.append_to_block(body, Instr::Let(y, Expr::Field(x, 0)));
        p.set_terminator(body, Terminator::Return { value: y });
        p.append_to_block(
            p.entry,
            Instr::Let(
                f,
                Expr::Closure(
                    vec![x],
                    BlockTarget {
                        block: body,
                        args: vec![x],
                    },
                ),
            ),
        );

        let purity = Purity::analyze(&p);
        assert!(purity.pure_expr(&Expr::Apply {
            f,
            args: vec![x],
            exact: true
        }));
    }

    #[test]
    fn mutation_demotes_transitively() {
        let mut p = Program::new();
        let f = p.fresh_var();
        let g = p.fresh_var();
        let xg = p.fresh_var();
        let xf = p.fresh_var();
        let r = p.fresh_var();

        // g writes a field; f merely calls g.
        let g_body = p.add_block(vec![xg]);
        p.append_to_block(g_body, Instr::SetField(xg, 0, xg));
        p.set_terminator(g_body, Terminator::Return { value: xg });

        let f_body = p.add_block(vec![xf]);
        p.append_to_block(
            f_body,
            Instr::Let(
                r,
                Expr::Apply {
                    f: g,
                    args: vec![xf],
                    exact: true,
                },
            ),
        );
        p.set_terminator(f_body, Terminator::Return { value: r });

        p.append_to_block(
            p.entry,
            Instr::Let(
                g,
                Expr::Closure(
                    vec![xg],
                    BlockTarget {
                        block: g_body,
                        args: vec![xg],
                    },
                ),
            ),
        );
        p.append_to_block(
            p.entry,
            Instr::Let(
                f,
                Expr::Closure(
                    vec![xf],
                    BlockTarget {
                        block: f_body,
                        args: vec![xf],
                    },
                ),
            ),
        );

        let purity = Purity::analyze(&p);
        let apply = |callee, arg| Expr::Apply {
            f: callee,
            args: vec![arg],
            exact: true,
        };
        assert!(!purity.pure_expr(&apply(g, xg)));
        assert!(!purity.pure_expr(&apply(f, xf)));
    }

    #[test]
    fn extern_purity_is_per_name() {
        let p = Program::new();
        let purity = Purity::analyze(&p);
        assert!(purity.pure_expr(&Expr::Prim(Prim::Extern("%undefined".into()), vec![])));
        assert!(!purity.pure_expr(&Expr::Prim(
            Prim::Extern("caml_ml_output".into()),
            vec![PrimArg::Const(Constant::Int(0))]
        )));
    }
}
