//! End-to-end tests of the global dead-code pass through the public
//! API.

use sickle::analysis::flow::FlowInfo;
use sickle::analysis::purity::Purity;
use sickle::passes::global_dce::{add_sentinel, global_dce, run};
use sickle::{
    Addr, BlockKind, BlockTarget, Constant, Expr, Instr, Prim, PrimArg, Program, Terminator, Var,
};

/// A two-block program with one observed field, one dead block element,
/// and one dead block parameter:
///
/// ```text
/// entry(): a = 1; d = 2; b = block{0}[a, d]; t = b[0]; br next(t, d)
/// next(u, w): pr = print(u); stop
/// ```
fn build_sample() -> (Program, Var, Var, Var, Addr) {
    let mut p = Program::new();
    let entry = p.entry;
    let a = p.fresh_var();
    let d = p.fresh_var();
    let b = p.fresh_var();
    let t = p.fresh_var();
    p.append_to_block(entry, Instr::Let(a, Expr::Constant(Constant::Int(1))));
    p.append_to_block(entry, Instr::Let(d, Expr::Constant(Constant::Int(2))));
    p.append_to_block(
        entry,
        Instr::Let(b, Expr::Block(0, vec![a, d], BlockKind::NotArray)),
    );
    p.append_to_block(entry, Instr::Let(t, Expr::Field(b, 0)));

    let u = p.fresh_var();
    let w = p.fresh_var();
    let next = p.add_block(vec![u, w]);
    let pr = p.fresh_var();
    p.append_to_block(
        next,
        Instr::Let(
            pr,
            Expr::Prim(Prim::Extern("caml_ml_output".into()), vec![PrimArg::Var(u)]),
        ),
    );

    p.set_terminator(
        entry,
        Terminator::Br {
            target: BlockTarget {
                block: next,
                args: vec![t, d],
            },
        },
    );

    (p, a, b, t, next)
}

#[test]
fn rewritten_program_stays_well_formed() {
    let _ = env_logger::try_init();
    let (p, a, b, t, _next) = build_sample();
    assert!(p.validate().is_ok());

    let flow = FlowInfo::default();
    let purity = Purity::analyze(&p);
    let mut p = p;
    let sentinel = add_sentinel(&mut p);
    let out = run(p, sentinel, &flow, &purity);
    out.validate().unwrap();

    // The dead element of the tuple compacted away, and the dead block
    // parameter's argument became the sentinel.
    let entry = out.entry;
    let block_binding = out.blocks[&entry]
        .body
        .iter()
        .find_map(|(instr, _)| match instr {
            Instr::Let(x, e) if *x == b => Some(e.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(block_binding, Expr::Block(0, vec![a], BlockKind::NotArray));
    match &out.blocks[&entry].terminator {
        Terminator::Br { target } => assert_eq!(target.args, vec![t, sentinel]),
        other => panic!("unexpected terminator {:?}", other),
    }
}

#[test]
fn rewriting_is_idempotent() {
    let (p, ..) = build_sample();
    let flow = FlowInfo::default();
    let purity = Purity::analyze(&p);
    let mut p = p;
    let sentinel = add_sentinel(&mut p);
    let once = run(p, sentinel, &flow, &purity);
    let twice = run(once.clone(), sentinel, &flow, &purity);
    assert_eq!(format!("{}", once.display()), format!("{}", twice.display()));
}

#[test]
fn output_is_deterministic() {
    let run_once = || {
        let (p, ..) = build_sample();
        let flow = FlowInfo::default();
        let purity = Purity::analyze(&p);
        format!("{}", global_dce(p, &flow, &purity).display())
    };
    assert_eq!(run_once(), run_once());
}
