use std::rc::Rc;
use tint_ir::builder::Builder;
use tint_ir::intrinsics::BuiltinFn;
use tint_ir::passes::raise::{raise, Options, Workarounds, RAISED_CAPABILITIES};
use tint_ir::passes::shader_io::{shader_io, RangeOffsets, ShaderIoConfig};
use tint_ir::validate::validate;
use tint_ir::visit::InstCollector;
use tint_ir::{
    AddrSpace, BuiltinValue, Context, Func, IOAttributes, Inst, InstKind, Module, PipelineStage,
    Type,
};

fn new_module() -> (Rc<Context>, Module) {
    let cx = Rc::new(Context::new());
    let module = Module::new(cx.clone());
    (cx, module)
}

fn func_named(m: &Module, name: &str) -> Func {
    let cx = m.cx();
    m.functions.iter().copied().find(|&f| &cx[m.funcs[f].name] == name).unwrap()
}

/// Names and store types of the module-scope `in`/`out` variables.
fn io_vars(m: &Module) -> Vec<(String, AddrSpace, Type)> {
    let cx = m.cx();
    m.blocks[m.root_block]
        .insts
        .iter()
        .filter_map(|&inst| {
            let result = m.result(inst)?;
            let mv = m.inst_results[result].ty.memory_view(&cx)?;
            let name = cx[m.name_of(result.into())?].to_string();
            matches!(mv.addr_space, AddrSpace::In | AddrSpace::Out).then_some((name, mv.addr_space, mv.store))
        })
        .collect()
}

fn insts_where(m: &Module, pred: impl Fn(&InstKind) -> bool) -> Vec<Inst> {
    InstCollector::collect(m, |m: &Module, inst: Inst| m.insts[inst].alive && pred(&m.insts[inst].kind))
}

#[test]
fn vertex_io_becomes_module_scope_variables() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let out = cx.ty_struct(
        "VertexOut",
        [
            (cx.intern("pos"), vec4, IOAttributes::builtin(BuiltinValue::Position)),
            (cx.intern("color"), vec4, IOAttributes::location(0)),
        ],
    );
    let func = m.add_entry_point("main", PipelineStage::Vertex, out);
    m.add_func_param(func, Some("idx"), cx.ty_u32(), IOAttributes::builtin(BuiltinValue::VertexIndex));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(cx.const_zero(out).into()));

    raise(&mut m, &Options::default()).unwrap();

    let main = func_named(&m, "main");
    let inner = func_named(&m, "main_inner");
    assert_eq!(m.funcs[main].stage, PipelineStage::Vertex);
    assert!(m.funcs[main].params.is_empty());
    assert!(m.funcs[main].ret_type.is_void(&cx));
    assert_eq!(m.funcs[inner].stage, PipelineStage::Undefined);
    assert!(m.funcs[inner].params.iter().all(|&p| m.func_params[p].attrs.is_empty()));

    let f32_ = cx.ty_f32();
    assert_eq!(
        io_vars(&m),
        [
            ("main_vertex_index_Input".to_string(), AddrSpace::In, cx.ty_u32()),
            ("main_position_Output".to_string(), AddrSpace::Out, vec4),
            ("main_loc0_Output".to_string(), AddrSpace::Out, vec4),
            ("main_point_size_Output".to_string(), AddrSpace::Out, f32_),
        ]
    );

    validate(&m, RAISED_CAPABILITIES).unwrap();
}

#[test]
fn point_size_is_optional() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let func = m.add_entry_point("main", PipelineStage::Vertex, vec4);
    m.funcs[func].ret_attrs = IOAttributes::builtin(BuiltinValue::Position);
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(cx.const_zero(vec4).into()));

    let options = Options { emit_vertex_point_size: false, ..Options::default() };
    raise(&mut m, &options).unwrap();

    let names: Vec<_> = io_vars(&m).into_iter().map(|(name, ..)| name).collect();
    assert_eq!(names, ["main_position_Output"]);
}

#[test]
fn sample_mask_is_an_array() {
    let (cx, mut m) = new_module();
    let u32_ = cx.ty_u32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, u32_);
    m.funcs[func].ret_attrs = IOAttributes::builtin(BuiltinValue::SampleMask);
    let mask = m.add_func_param(func, Some("mask"), u32_, IOAttributes::builtin(BuiltinValue::SampleMask));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(mask.into()));

    raise(&mut m, &Options::default()).unwrap();

    let mask_array = cx.ty_array(u32_, 1);
    assert_eq!(
        io_vars(&m),
        [
            ("main_sample_mask_Input".to_string(), AddrSpace::In, mask_array),
            ("main_sample_mask_Output".to_string(), AddrSpace::Out, mask_array),
        ]
    );
}

#[test]
fn shader_io_accepts_its_own_output() {
    let (cx, mut m) = new_module();
    let u32_ = cx.ty_u32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, u32_);
    m.funcs[func].ret_attrs = IOAttributes::builtin(BuiltinValue::SampleMask);
    let idx = m.add_func_param(func, Some("i"), u32_, IOAttributes::builtin(BuiltinValue::SampleIndex));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(idx.into()));

    let config = ShaderIoConfig::default();
    shader_io(&mut m, &config).unwrap();
    let vars = io_vars(&m);
    let insts = insts_where(&m, |_| true).len();
    assert_eq!(m.functions.len(), 2);

    shader_io(&mut m, &config).unwrap();
    assert_eq!(io_vars(&m), vars);
    assert_eq!(insts_where(&m, |_| true).len(), insts);
    assert_eq!(m.functions.len(), 2);
    validate(&m, RAISED_CAPABILITIES).unwrap();
}

#[test]
fn integer_fragment_builtins_are_flat() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    m.add_func_param(func, Some("i"), cx.ty_u32(), IOAttributes::builtin(BuiltinValue::SampleIndex));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    raise(&mut m, &Options::default()).unwrap();

    let var = m.blocks[m.root_block].insts[0];
    let InstKind::Var { attrs } = &m.insts[var].kind else {
        unreachable!()
    };
    assert_eq!(attrs.builtin, Some(BuiltinValue::SampleIndex));
    assert!(attrs.interpolation.is_some());
}

#[test]
fn frag_depth_is_clamped_to_immediate_data_bounds() {
    let (cx, mut m) = new_module();
    let f32_ = cx.ty_f32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, f32_);
    m.funcs[func].ret_attrs = IOAttributes::builtin(BuiltinValue::FragDepth);
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(cx.const_f32(0.5).into()));

    let options = Options { depth_range_offsets: Some(RangeOffsets { min: 4, max: 8 }), ..Options::default() };
    raise(&mut m, &options).unwrap();

    let clamps = insts_where(&m, |kind| *kind == InstKind::BuiltinCall(BuiltinFn::Clamp));
    assert_eq!(clamps.len(), 1);
    let immediate_vars = m.blocks[m.root_block]
        .insts
        .iter()
        .filter(|&&inst| {
            m.result(inst)
                .and_then(|r| m.inst_results[r].ty.memory_view(&cx))
                .is_some_and(|mv| mv.addr_space == AddrSpace::Immediate)
        })
        .count();
    assert_eq!(immediate_vars, 1);
}

#[test]
fn f16_io_is_polyfilled() {
    let (cx, mut m) = new_module();
    let f16_ = cx.ty_f16();
    let func = m.add_entry_point("main", PipelineStage::Fragment, f16_);
    m.funcs[func].ret_attrs = IOAttributes::location(0);
    let x = m.add_func_param(func, Some("x"), f16_, IOAttributes::location(0));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(x.into()));

    let options = Options { polyfill_f16_io: true, ..Options::default() };
    raise(&mut m, &options).unwrap();

    let f32_ = cx.ty_f32();
    assert!(io_vars(&m).iter().all(|(.., store)| *store == f32_));
    assert_eq!(insts_where(&m, |kind| *kind == InstKind::Convert).len(), 2);
}

#[test]
fn compute_workgroup_size_moves_to_the_wrapper() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Compute, cx.ty_void());
    m.funcs[func].workgroup_size = Some([cx.const_u32(64).into(), cx.const_u32(1).into(), cx.const_u32(1).into()]);
    m.add_func_param(
        func,
        Some("lid"),
        cx.ty_u32(),
        IOAttributes::builtin(BuiltinValue::LocalInvocationIndex),
    );
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    raise(&mut m, &Options::default()).unwrap();

    let main = func_named(&m, "main");
    let inner = func_named(&m, "main_inner");
    assert!(m.funcs[main].workgroup_size.is_some());
    assert!(m.funcs[inner].workgroup_size.is_none());
}

#[test]
fn raise_applies_the_switch_workaround() {
    let (cx, mut m) = new_module();
    let i32_ = cx.ty_i32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    let x = m.add_func_param(func, Some("x"), i32_, IOAttributes {
        interpolation: Some(tint_ir::io::Interpolation::FLAT),
        ..IOAttributes::location(0)
    });
    let body = m.funcs[func].body;
    let mut b = Builder::at_end(&mut m, body);
    let switch = b.switch(x.into(), &[]);
    let low = b.switch_case(switch, [Some(cx.const_i32(0))]);
    let high = b.switch_case(switch, [Some(cx.const_i32(0x7FFF_FFFE))]);
    let default = b.switch_case(switch, [None]);
    b.return_(func, None);
    for block in [low, high, default] {
        Builder::at_end(&mut m, block).exit_switch(switch, []);
    }

    let options = Options { workarounds: Workarounds { polyfill_case_switch: true }, ..Options::default() };
    raise(&mut m, &options).unwrap();

    assert!(insts_where(&m, |kind| matches!(kind, InstKind::Switch { .. })).is_empty());
}
