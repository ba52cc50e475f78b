//! Lowering `switch`es with case selectors spanning (almost) the whole `i32`
//! range into chains of `if`s (inside a single-iteration `loop`), for
//! drivers that miscompile such switches.

use crate::builder::Builder;
use crate::caps::{Capabilities, Capability};
use crate::intrinsics::BinaryOp;
use crate::validate::validate;
use crate::visit::InstCollector;
use crate::{Block, CaseSelector, Const, Failure, Inst, InstKind, Module, SwitchCase, Type, Value};
use itertools::{Itertools, MinMaxResult};
use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};

const CAPABILITIES: Capabilities = Capabilities::NONE.with(Capability::AllowMultipleEntryPoints);

/// Whether the non-default selectors of `inst` (a `switch`) span a range
/// within one of overflowing `i32`.
fn needs_polyfill(module: &Module, inst: Inst) -> bool {
    let inst_def = &module.insts[inst];
    let InstKind::Switch { cases } = &inst_def.kind else {
        return false;
    };
    if !inst_def.alive {
        return false;
    }

    let cx = module.cx_ref();
    let selectors = cases.iter().flat_map(|case| &case.selectors).filter_map(|selector| {
        match *selector {
            CaseSelector::Value(ct) => ct.as_i64(cx),
            CaseSelector::Default => None,
        }
    });
    match selectors.minmax() {
        MinMaxResult::MinMax(min, max) => max - min >= i64::from(i32::MAX) - 1,
        MinMaxResult::NoElements | MinMaxResult::OneElement(_) => false,
    }
}

const PASS: &str = "CaseSwitchToIfElse";

/// One `if` of the lowered chain: the original case `block`, entered when
/// the condition equals any of `selectors` (or always, for `default`).
struct LoweredCase {
    selectors: SmallVec<[Const; 4]>,
    is_default: bool,
    block: Block,
}

/// Replace `switch` with a `loop` shell, whose body tests each original case
/// in turn (with `if`s whose true blocks hold the original case blocks'
/// instructions, now exiting the `loop`), falling back to the original
/// `default` case's instructions.
///
/// A `continue` can't jump over the `loop` shell, so if any case continues
/// an outer loop, the shell is the `switch` itself (left with a single
/// `default` case).
///
/// Everything is read out of `switch` before the first change, so a
/// malformed `switch` is reported without touching the module.
fn lower_switch(module: &mut Module, switch: Inst) -> Result<(), Failure> {
    let cx = module.cx();
    let cond = module
        .operand(switch, 0)
        .ok_or_else(|| Failure::transform(PASS, "switch without a condition"))?;
    let InstKind::Switch { cases } = &module.insts[switch].kind else {
        return Err(Failure::transform(PASS, "expected a switch"));
    };

    let mut value_cases = vec![];
    let mut default_cases = vec![];
    for case in cases {
        let is_default = case.selectors.contains(&CaseSelector::Default);
        let selectors: SmallVec<[Const; 4]> = case
            .selectors
            .iter()
            .filter_map(|selector| match *selector {
                CaseSelector::Value(ct) => Some(ct),
                CaseSelector::Default => None,
            })
            .collect();
        if !is_default && selectors.is_empty() {
            return Err(Failure::transform(PASS, "switch case without selectors"));
        }
        let lowered = LoweredCase { selectors, is_default, block: case.block };
        if is_default {
            default_cases.push(lowered);
        } else {
            value_cases.push(lowered);
        }
    }

    let nested = InstCollector::collect_within(module, switch, |_: &Module, _: Inst| true);
    let nested_loops: FxHashSet<Inst> = nested
        .iter()
        .copied()
        .filter(|&inst| matches!(module.insts[inst].kind, InstKind::Loop { .. }))
        .collect();
    let continues_outer_loop = nested.iter().any(|&inst| {
        matches!(module.insts[inst].kind, InstKind::Continue(target) if !nested_loops.contains(&target))
    });
    let exits: Vec<Inst> = nested
        .iter()
        .copied()
        .filter(|&inst| module.insts[inst].kind == InstKind::ExitSwitch(switch))
        .collect();

    let (shell, shell_block) = if continues_outer_loop {
        log::debug!("{PASS}: keeping a default-only switch around continues");
        let block = module.new_block();
        module.blocks[block].parent = Some(switch);
        if let InstKind::Switch { cases } = &mut module.insts[switch].kind {
            *cases = smallvec![SwitchCase { selectors: smallvec![CaseSelector::Default], block }];
        }
        (switch, block)
    } else {
        let result_types: SmallVec<[Type; 2]> = module.insts[switch]
            .results
            .iter()
            .map(|&r| module.inst_results[r].ty)
            .collect();
        let initializer = module.new_block();
        let body = module.new_multi_in_block();
        let continuing = module.new_multi_in_block();
        let loop_ = Builder::before(module, switch).inst(
            InstKind::Loop { initializer, body, continuing },
            [],
            &result_types,
        );
        for exit in exits {
            module.insts[exit].kind = InstKind::ExitLoop(loop_);
        }
        (loop_, body)
    };

    let bool_ty = cx.ty_bool();
    for case in value_cases.into_iter().chain(default_cases) {
        let true_block = module.new_block();
        let false_block = module.new_block();

        let mut b = Builder::at_end(module, shell_block);
        let condition = match case.selectors.split_first() {
            Some((&first, rest)) if !case.is_default => {
                let first: Value = b.binary(BinaryOp::Equal, bool_ty, cond, first.into()).into();
                rest.iter().fold(first, |any, &ct| {
                    let eq = b.binary(BinaryOp::Equal, bool_ty, cond, ct.into());
                    b.binary(BinaryOp::Or, bool_ty, any, eq.into()).into()
                })
            }
            _ => Value::Const(cx.const_bool(true)),
        };
        let if_ = b.inst(InstKind::If { true_block, false_block }, [condition], &[]);

        module.move_block_contents(case.block, true_block);
        module.blocks[case.block].parent = None;
        Builder::at_end(module, false_block).exit_if(if_, []);
    }

    Builder::at_end(module, shell_block).unreachable();

    if shell != switch {
        let old_results = module.insts[switch].results.clone();
        let new_results = module.insts[shell].results.clone();
        for (old, new) in old_results.into_iter().zip(new_results) {
            module.replace_all_uses_with(old.into(), new.into());
        }
        module.destroy_inst(switch);
    }
    Ok(())
}

pub fn case_switch_to_if_else(module: &mut Module) -> Result<(), Failure> {
    validate(module, CAPABILITIES)?;

    let worklist = InstCollector::collect(module, needs_polyfill);
    log::debug!("{PASS}: {} switch(es) to lower", worklist.len());

    for switch in worklist {
        lower_switch(module, switch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use std::rc::Rc;

    fn switch_with_selectors(cx: &Rc<Context>, selectors: &[i32]) -> (Module, Inst) {
        let mut m = Module::new(cx.clone());
        let func = m.add_function("f", cx.ty_void());
        let body = m.funcs[func].body;
        let switch = Builder::at_end(&mut m, body).switch(cx.const_i32(0).into(), &[]);
        for &v in selectors {
            let case = Builder::at_end(&mut m, body).switch_case(switch, [Some(cx.const_i32(v))]);
            Builder::at_end(&mut m, case).exit_switch(switch, []);
        }
        (m, switch)
    }

    #[test]
    fn only_near_overflowing_ranges_need_polyfill() {
        let cx = Rc::new(Context::new());

        let (m, switch) = switch_with_selectors(&cx, &[0, 0x7FFF_FFFE]);
        assert!(needs_polyfill(&m, switch));

        let (m, switch) = switch_with_selectors(&cx, &[i32::MIN, -1]);
        assert!(needs_polyfill(&m, switch));

        let (m, switch) = switch_with_selectors(&cx, &[0, 0x7FFF_FFFD]);
        assert!(!needs_polyfill(&m, switch));

        let (m, switch) = switch_with_selectors(&cx, &[]);
        assert!(!needs_polyfill(&m, switch));
    }

    #[test]
    fn malformed_switches_are_left_untouched() {
        let cx = Rc::new(Context::new());
        let case_count = |m: &Module, switch: Inst| match &m.insts[switch].kind {
            InstKind::Switch { cases } => cases.len(),
            _ => 0,
        };

        let (mut m, switch) = switch_with_selectors(&cx, &[0, 0x7FFF_FFFE]);
        let body = m.funcs[m.functions[0]].body;
        Builder::at_end(&mut m, body).switch_case(switch, Vec::<Option<Const>>::new());
        let err = lower_switch(&mut m, switch).unwrap_err();
        assert!(err.mentions("switch case without selectors"));
        assert_eq!(case_count(&m, switch), 3);
        assert!(m.insts[switch].alive);

        let (mut m, switch) = switch_with_selectors(&cx, &[0, 0x7FFF_FFFE]);
        m.set_operand(switch, 0, None);
        let err = lower_switch(&mut m, switch).unwrap_err();
        assert!(err.mentions("switch without a condition"));
        assert_eq!(case_count(&m, switch), 2);
    }
}
