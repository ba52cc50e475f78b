use std::rc::Rc;
use tint_ir::builder::Builder;
use tint_ir::caps::Capabilities;
use tint_ir::validate::validate;
use tint_ir::{Context, Func, Module, PipelineStage, Value};

fn new_module() -> (Rc<Context>, Module) {
    let cx = Rc::new(Context::new());
    let module = Module::new(cx.clone());
    (cx, module)
}

fn fragment_entry_point(m: &mut Module) -> Func {
    let cx = m.cx();
    m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void())
}

#[test]
fn well_formed_switch_and_loop() {
    let (cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let switch = b.switch(cx.const_i32(3).into(), &[cx.ty_i32()]);
    let one = b.switch_case(switch, [Some(cx.const_i32(1)), Some(cx.const_i32(2))]);
    let default = b.switch_case(switch, [None]);
    let loop_ = b.loop_(&[]);
    b.return_(func, None);

    Builder::at_end(&mut m, one).exit_switch(switch, [cx.const_i32(10).into()]);
    Builder::at_end(&mut m, default).exit_switch(switch, [cx.const_i32(20).into()]);

    let tint_ir::InstKind::Loop { body: loop_body, .. } = m.insts[loop_].kind else {
        unreachable!()
    };
    Builder::at_end(&mut m, loop_body).exit_loop(loop_, []);

    validate(&m, Capabilities::NONE).unwrap();
}

#[test]
fn switches_need_a_default_case() {
    let (cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let switch = b.switch(cx.const_i32(0).into(), &[]);
    let case = b.switch_case(switch, [Some(cx.const_i32(0))]);
    b.return_(func, None);
    Builder::at_end(&mut m, case).exit_switch(switch, []);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("missing default case for switch"));
}

#[test]
fn exit_if_cannot_skip_an_inner_if() {
    let (cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;
    let t = Value::Const(cx.const_bool(true));

    let mut b = Builder::at_end(&mut m, body);
    let outer = b.if_(t, &[]);
    b.return_(func, None);
    let tint_ir::InstKind::If { true_block, false_block } = m.insts[outer].kind else {
        unreachable!()
    };

    let inner = Builder::at_end(&mut m, true_block).if_(t, &[]);
    Builder::at_end(&mut m, true_block).exit_if(outer, []);
    Builder::at_end(&mut m, false_block).exit_if(outer, []);
    let tint_ir::InstKind::If { true_block: inner_true, false_block: inner_false } = m.insts[inner].kind
    else {
        unreachable!()
    };
    Builder::at_end(&mut m, inner_true).exit_if(outer, []);
    Builder::at_end(&mut m, inner_false).exit_if(inner, []);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("if target jumps over other control instructions"));
}

#[test]
fn exit_values_must_match_results() {
    let (cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let if_ = b.if_(cx.const_bool(false).into(), &[cx.ty_f32()]);
    b.return_(func, None);
    let tint_ir::InstKind::If { true_block, false_block } = m.insts[if_].kind else {
        unreachable!()
    };
    Builder::at_end(&mut m, true_block).exit_if(if_, [cx.const_f32(1.0).into()]);
    Builder::at_end(&mut m, false_block).exit_if(if_, []);

    assert!(validate(&m, Capabilities::NONE).is_err());
}

#[test]
fn blocks_must_be_terminated() {
    let (cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).phony(cx.const_u32(0).into());

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("block does not end in a terminator instruction"));
}

#[test]
fn continue_only_from_loop_body() {
    let (_cx, mut m) = new_module();
    let func = fragment_entry_point(&mut m);
    let body = m.funcs[func].body;

    let mut b = Builder::at_end(&mut m, body);
    let loop_ = b.loop_(&[]);
    b.return_(func, None);
    let tint_ir::InstKind::Loop { body: loop_body, continuing, .. } = m.insts[loop_].kind else {
        unreachable!()
    };
    Builder::at_end(&mut m, loop_body).continue_(loop_, []);
    Builder::at_end(&mut m, continuing).continue_(loop_, []);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("must only be called from loop body"));
}

#[test]
fn recursion_is_rejected() {
    let (cx, mut m) = new_module();
    let helper = m.add_function("helper", cx.ty_void());
    let body = m.funcs[helper].body;
    let mut b = Builder::at_end(&mut m, body);
    b.call(cx.ty_void(), helper, []);
    b.return_(helper, None);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("recursive function calls are not allowed"));
}

#[test]
fn discard_is_fragment_only() {
    let (cx, mut m) = new_module();
    let helper = m.add_function("helper", cx.ty_void());
    let body = m.funcs[helper].body;
    let mut b = Builder::at_end(&mut m, body);
    b.discard();
    b.return_(helper, None);

    let func = m.add_entry_point("main", PipelineStage::Compute, cx.ty_void());
    m.funcs[func].workgroup_size = Some([cx.const_u32(1).into(); 3]);
    let body = m.funcs[func].body;
    let mut b = Builder::at_end(&mut m, body);
    b.call(cx.ty_void(), helper, []);
    b.return_(func, None);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("cannot be used in a compute shader"));

    m.funcs[func].stage = PipelineStage::Fragment;
    m.funcs[func].workgroup_size = None;
    validate(&m, Capabilities::NONE).unwrap();
}
