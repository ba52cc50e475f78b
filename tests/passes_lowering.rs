use std::rc::Rc;
use tint_ir::builder::Builder;
use tint_ir::caps::{Capabilities, Capability};
use tint_ir::passes::case_switch_to_if_else::case_switch_to_if_else;
use tint_ir::passes::prepare_immediate_data::{prepare_immediate_data, PrepareImmediateDataConfig};
use tint_ir::passes::remove_uniform_vector_component_loads::remove_uniform_vector_component_loads;
use tint_ir::validate::validate;
use tint_ir::visit::InstCollector;
use tint_ir::{
    Access, AddrSpace, CaseSelector, Context, IOAttributes, Inst, InstKind, Module, PipelineStage,
    Value,
};

const CAPS: Capabilities = Capabilities::NONE.with(Capability::AllowMultipleEntryPoints);

fn new_module() -> (Rc<Context>, Module) {
    let cx = Rc::new(Context::new());
    let module = Module::new(cx.clone());
    (cx, module)
}

fn insts_where(m: &Module, pred: impl Fn(&InstKind) -> bool) -> Vec<Inst> {
    InstCollector::collect(m, |m: &Module, inst: Inst| m.insts[inst].alive && pred(&m.insts[inst].kind))
}

fn producer(m: &Module, v: Option<Value>) -> Option<Inst> {
    match v? {
        Value::InstResult(r) => m.inst_results[r].inst,
        _ => None,
    }
}

#[test]
fn overlapping_immediate_data_is_rejected() {
    let (cx, mut m) = new_module();
    let mut config = PrepareImmediateDataConfig::default();
    config.add_internal_immediate_data(0, "a", cx.ty_f32());
    config.add_internal_immediate_data(2, "b", cx.ty_f32());

    let err = prepare_immediate_data(&mut m, &config).unwrap_err();
    assert!(err.mentions("'b' at offset 2 overlaps 'a'"));
    assert!(m.blocks[m.root_block].insts.is_empty());
}

#[test]
fn user_immediate_data_is_merged_with_internal_entries() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let root = m.root_block;
    let user = Builder::at_end(&mut m, root).var(
        Some("user"),
        cx.ty_ptr(AddrSpace::Immediate, vec4, Access::Read),
        None,
        IOAttributes::default(),
    );

    let func = m.add_entry_point("main", PipelineStage::Fragment, vec4);
    m.funcs[func].ret_attrs = IOAttributes::location(0);
    let body = m.funcs[func].body;
    let mut b = Builder::at_end(&mut m, body);
    let value = b.load(user.into());
    let ret = b.return_(func, Some(value.into()));

    let mut config = PrepareImmediateDataConfig::default();
    config.add_internal_immediate_data(16, "depth_min", cx.ty_f32());
    config.add_internal_immediate_data(20, "depth_max", cx.ty_f32());
    let layout = prepare_immediate_data(&mut m, &config).unwrap();

    assert_eq!(layout.index_of(16), Some(1));
    assert_eq!(layout.index_of(20), Some(2));
    let block_var = layout.var.unwrap();
    let block_name = m.name_of(block_var.into()).map(|name| cx[name].to_string());
    assert_eq!(block_name.as_deref(), Some("tint_immediate_data"));

    // The user variable is gone, its load now goes through the block.
    let vars = insts_where(&m, |kind| matches!(kind, InstKind::Var { .. }));
    assert_eq!(vars.len(), 1);
    let load = producer(&m, m.operand(ret, 1)).unwrap();
    let access = producer(&m, m.operand(load, 0)).unwrap();
    assert_eq!(m.insts[access].kind, InstKind::Access);
    assert_eq!(m.operand(access, 0), Some(block_var.into()));

    validate(&m, CAPS).unwrap();

    // Preparing again only recomputes the layout.
    let again = prepare_immediate_data(&mut m, &config).unwrap();
    assert_eq!(again, layout);
    assert_eq!(insts_where(&m, |kind| matches!(kind, InstKind::Var { .. })).len(), 1);
}

#[test]
fn uniform_component_loads_load_the_whole_vector() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let root = m.root_block;
    let uniform = Builder::at_end(&mut m, root).var(
        Some("u"),
        cx.ty_ptr(AddrSpace::Uniform, vec4, Access::Read),
        None,
        IOAttributes::binding(0, 0),
    );

    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_f32());
    m.funcs[func].ret_attrs = IOAttributes::location(0);
    let body = m.funcs[func].body;
    let mut b = Builder::at_end(&mut m, body);
    let component = b.load_vector_element(uniform.into(), cx.const_u32(2).into());
    let ret = b.return_(func, Some(component.into()));
    validate(&m, CAPS).unwrap();

    remove_uniform_vector_component_loads(&mut m).unwrap();

    assert!(insts_where(&m, |kind| *kind == InstKind::LoadVectorElement).is_empty());
    let access = producer(&m, m.operand(ret, 1)).unwrap();
    assert_eq!(m.insts[access].kind, InstKind::Access);
    assert_eq!(m.operand(access, 1), Some(cx.const_u32(2).into()));
    let let_ = producer(&m, m.operand(access, 0)).unwrap();
    assert_eq!(m.insts[let_].kind, InstKind::Let);
    let load = producer(&m, m.operand(let_, 0)).unwrap();
    assert_eq!(m.insts[load].kind, InstKind::Load);
    assert_eq!(m.operand(load, 0), Some(uniform.into()));

    validate(&m, CAPS).unwrap();

    // Nothing left to rewrite.
    let before = insts_where(&m, |_| true);
    remove_uniform_vector_component_loads(&mut m).unwrap();
    assert_eq!(insts_where(&m, |_| true), before);
    assert_eq!(producer(&m, m.operand(ret, 1)), Some(access));
}

#[test]
fn component_loads_outside_uniform_are_kept() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let root = m.root_block;
    let private = Builder::at_end(&mut m, root).var(
        Some("p"),
        cx.ty_ptr(AddrSpace::Private, vec4, Access::ReadWrite),
        None,
        IOAttributes::default(),
    );

    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_f32());
    m.funcs[func].ret_attrs = IOAttributes::location(0);
    let body = m.funcs[func].body;
    let mut b = Builder::at_end(&mut m, body);
    let component = b.load_vector_element(private.into(), cx.const_u32(1).into());
    b.return_(func, Some(component.into()));

    remove_uniform_vector_component_loads(&mut m).unwrap();
    assert_eq!(insts_where(&m, |kind| *kind == InstKind::LoadVectorElement).len(), 1);
}

/// Fragment entry point `switch`ing over a constant, with one case per
/// selector (each exiting with its selector as the switch result) and a
/// default case.
fn switch_module(selectors: &[i32]) -> (Rc<Context>, Module, Inst) {
    let (cx, mut m) = new_module();
    let i32_ = cx.ty_i32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, i32_);
    m.funcs[func].ret_attrs = IOAttributes::location(0);
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let cond = b.let_(Some("x"), cx.const_i32(5).into());
    let switch = b.switch(cond.into(), &[i32_]);
    let case_blocks: Vec<_> =
        selectors.iter().map(|&v| (v, b.switch_case(switch, [Some(cx.const_i32(v))]))).collect();
    let default = b.switch_case(switch, [None]);
    let result = m.insts[switch].results[0];
    Builder::at_end(&mut m, body).return_(func, Some(result.into()));

    for (v, block) in case_blocks {
        Builder::at_end(&mut m, block).exit_switch(switch, [cx.const_i32(v).into()]);
    }
    Builder::at_end(&mut m, default).exit_switch(switch, [cx.const_i32(-1).into()]);
    (cx, m, switch)
}

#[test]
fn wide_switches_become_if_chains() {
    let (_cx, mut m, switch) = switch_module(&[0, 0x7FFF_FFFE]);
    validate(&m, CAPS).unwrap();

    case_switch_to_if_else(&mut m).unwrap();

    assert!(!m.insts[switch].alive);
    assert!(insts_where(&m, |kind| matches!(kind, InstKind::Switch { .. })).is_empty());
    assert!(insts_where(&m, |kind| matches!(kind, InstKind::ExitSwitch(_))).is_empty());
    // One `if` per case, the last one (for `default`) on `true`.
    assert_eq!(insts_where(&m, |kind| matches!(kind, InstKind::If { .. })).len(), 3);
    assert_eq!(insts_where(&m, |kind| matches!(kind, InstKind::Loop { .. })).len(), 1);
    validate(&m, CAPS).unwrap();

    // Nothing left to lower.
    let before = insts_where(&m, |_| true).len();
    case_switch_to_if_else(&mut m).unwrap();
    assert_eq!(insts_where(&m, |_| true).len(), before);
}

#[test]
fn narrow_switches_are_left_alone() {
    let (_cx, mut m, switch) = switch_module(&[0, 1, 0x7FFF_FFFD]);
    case_switch_to_if_else(&mut m).unwrap();

    assert!(m.insts[switch].alive);
    assert!(insts_where(&m, |kind| matches!(kind, InstKind::If { .. })).is_empty());
}

#[test]
fn switches_continuing_an_outer_loop_keep_a_default_shell() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let loop_ = b.loop_(&[]);
    b.return_(func, None);
    let InstKind::Loop { body: loop_body, .. } = m.insts[loop_].kind else {
        unreachable!()
    };

    let mut b = Builder::at_end(&mut m, loop_body);
    let cond = b.let_(None, cx.const_i32(7).into());
    let switch = b.switch(cond.into(), &[]);
    let low = b.switch_case(switch, [Some(cx.const_i32(i32::MIN))]);
    let high = b.switch_case(switch, [Some(cx.const_i32(-1))]);
    let default = b.switch_case(switch, [None]);
    b.exit_loop(loop_, []);

    Builder::at_end(&mut m, low).continue_(loop_, []);
    Builder::at_end(&mut m, high).exit_switch(switch, []);
    Builder::at_end(&mut m, default).exit_switch(switch, []);
    validate(&m, CAPS).unwrap();

    case_switch_to_if_else(&mut m).unwrap();

    assert!(m.insts[switch].alive);
    let InstKind::Switch { cases } = &m.insts[switch].kind else {
        unreachable!()
    };
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].selectors.as_slice(), &[CaseSelector::Default]);
    assert_eq!(insts_where(&m, |kind| matches!(kind, InstKind::If { .. })).len(), 3);
    validate(&m, CAPS).unwrap();
}
