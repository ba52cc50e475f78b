use std::rc::Rc;
use tint_ir::builder::Builder;
use tint_ir::caps::{Capabilities, Capability};
use tint_ir::validate::validate;
use tint_ir::{
    BuiltinValue, Context, Func, IOAttributes, InternedStr, Module, PipelineStage, Type, Value,
};

fn new_module() -> (Rc<Context>, Module) {
    let cx = Rc::new(Context::new());
    let module = Module::new(cx.clone());
    (cx, module)
}

fn compute_entry_point(m: &mut Module, name: &str, size: [Value; 3]) -> Func {
    let cx = m.cx();
    let func = m.add_entry_point(name, PipelineStage::Compute, cx.ty_void());
    m.funcs[func].workgroup_size = Some(size);
    let body = m.funcs[func].body;
    Builder::at_end(m, body).return_(func, None);
    func
}

fn u32_size(cx: &Context, x: u32, y: u32, z: u32) -> [Value; 3] {
    [cx.const_u32(x).into(), cx.const_u32(y).into(), cx.const_u32(z).into()]
}

/// Entry point returning the zero value of `ret_type`, with `ret_attrs`.
fn returning_entry_point(
    m: &mut Module,
    stage: PipelineStage,
    ret_type: Type,
    ret_attrs: IOAttributes,
) -> Func {
    let cx = m.cx();
    let func = m.add_entry_point("main", stage, ret_type);
    m.funcs[func].ret_attrs = ret_attrs;
    let body = m.funcs[func].body;
    Builder::at_end(m, body).return_(func, Some(cx.const_zero(ret_type).into()));
    func
}

#[test]
fn multiple_entry_points_need_capability() {
    let (cx, mut m) = new_module();
    compute_entry_point(&mut m, "a", u32_size(&cx, 1, 1, 1));
    compute_entry_point(&mut m, "b", u32_size(&cx, 1, 1, 1));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("multiple entry points"));

    validate(&m, Capability::AllowMultipleEntryPoints.into()).unwrap();
}

#[test]
fn entry_point_names_must_be_unique() {
    let (cx, mut m) = new_module();
    compute_entry_point(&mut m, "main", u32_size(&cx, 1, 1, 1));
    compute_entry_point(&mut m, "main", u32_size(&cx, 1, 1, 1));

    let err = validate(&m, Capability::AllowMultipleEntryPoints.into()).unwrap_err();
    assert!(err.mentions("entry point name main is not unique"));
}

#[test]
fn workgroup_size_must_be_positive() {
    let (cx, mut m) = new_module();
    compute_entry_point(&mut m, "main", u32_size(&cx, 0, 0, 0));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("@workgroup_size params must be greater than 0"));
}

#[test]
fn workgroup_size_types_must_agree() {
    let (cx, mut m) = new_module();
    let size = [cx.const_u32(8).into(), cx.const_i32(8).into(), cx.const_u32(1).into()];
    compute_entry_point(&mut m, "main", size);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("must be all 'i32's or all 'u32's"));
}

#[test]
fn compute_entry_points_need_a_workgroup_size() {
    let (cx, mut m) = new_module();
    let func = compute_entry_point(&mut m, "main", u32_size(&cx, 1, 1, 1));
    m.funcs[func].workgroup_size = None;

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("compute entry point requires @workgroup_size"));
}

#[test]
fn compute_entry_points_return_nothing() {
    let (cx, mut m) = new_module();
    let func = returning_entry_point(&mut m, PipelineStage::Compute, cx.ty_u32(), IOAttributes::location(0));
    m.funcs[func].workgroup_size = Some(u32_size(&cx, 1, 1, 1));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("compute entry point must not have a return type, found u32"));
}

#[test]
fn fragment_bool_inputs_must_be_front_facing() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    m.add_func_param(func, Some("b"), cx.ty_bool(), IOAttributes::location(0));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("can only be a bool if decorated with @builtin(front_facing)"));

    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    m.add_func_param(func, Some("b"), cx.ty_bool(), IOAttributes::builtin(BuiltinValue::FrontFacing));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    validate(&m, Capabilities::NONE).unwrap();
}

#[test]
fn entry_points_never_return_bool() {
    let (cx, mut m) = new_module();
    returning_entry_point(&mut m, PipelineStage::Fragment, cx.ty_bool(), IOAttributes::location(0));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("entry point returns can not be 'bool'"));
}

#[test]
fn vertex_outputs_need_a_position() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    returning_entry_point(&mut m, PipelineStage::Vertex, vec4, IOAttributes::location(0));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("position must be declared for vertex entry point output"));

    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    returning_entry_point(&mut m, PipelineStage::Vertex, vec4, IOAttributes::builtin(BuiltinValue::Position));

    validate(&m, Capabilities::NONE).unwrap();
}

#[test]
fn fragment_output_locations_are_unique() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let out = cx.ty_struct(
        "Out",
        [
            (cx.intern("a"), vec4, IOAttributes::location(0)),
            (cx.intern("b"), vec4, IOAttributes::location(0)),
        ],
    );
    returning_entry_point(&mut m, PipelineStage::Fragment, out, IOAttributes::default());

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("duplicate location(0)"));
}

#[test]
fn integer_fragment_inputs_must_be_flat() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    m.add_func_param(func, Some("id"), cx.ty_u32(), IOAttributes::location(1));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("must have an @interpolate(flat) attribute"));
}

#[test]
fn builtins_are_checked_against_their_stage_and_type() {
    let (cx, mut m) = new_module();
    // `frag_depth` is a fragment output, not a vertex one.
    let out = cx.ty_struct(
        "Out",
        [
            (cx.intern("pos"), cx.ty_vec(cx.ty_f32(), 4), IOAttributes::builtin(BuiltinValue::Position)),
            (cx.intern("depth"), cx.ty_f32(), IOAttributes::builtin(BuiltinValue::FragDepth)),
        ],
    );
    returning_entry_point(&mut m, PipelineStage::Vertex, out, IOAttributes::default());

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("frag_depth cannot be used on a vertex shader output"));
}

#[test]
fn builtins_are_unique_per_direction() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let out = cx.ty_struct(
        "Out",
        [
            (cx.intern("a"), vec4, IOAttributes::builtin(BuiltinValue::Position)),
            (cx.intern("b"), vec4, IOAttributes::builtin(BuiltinValue::Position)),
        ],
    );
    returning_entry_point(&mut m, PipelineStage::Vertex, out, IOAttributes::default());

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions(
        "duplicate instance of builtin 'position' on entry point output, must be unique per \
         entry point i/o direction"
    ));

    let (cx, mut m) = new_module();
    let u32_ = cx.ty_u32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    m.add_func_param(func, Some("a"), u32_, IOAttributes::builtin(BuiltinValue::SampleIndex));
    m.add_func_param(func, Some("b"), u32_, IOAttributes::builtin(BuiltinValue::SampleIndex));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("duplicate instance of builtin 'sample_index' on entry point input"));
}

#[test]
fn the_same_builtin_may_be_both_input_and_output() {
    let (cx, mut m) = new_module();
    let u32_ = cx.ty_u32();
    let func = m.add_entry_point("main", PipelineStage::Fragment, u32_);
    m.funcs[func].ret_attrs = IOAttributes::builtin(BuiltinValue::SampleMask);
    let mask = m.add_func_param(func, Some("mask"), u32_, IOAttributes::builtin(BuiltinValue::SampleMask));
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, Some(mask.into()));

    validate(&m, Capabilities::NONE).unwrap();
}

/// Vertex entry point returning a `position` plus one `clip_distances`
/// member per type in `clip_distances`.
fn clip_distances_module(clip_distances: impl Fn(&Context) -> Vec<Type>) -> Module {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    let members: Vec<(InternedStr, Type, IOAttributes)> = [(cx.intern("pos"), vec4, IOAttributes::builtin(BuiltinValue::Position))]
        .into_iter()
        .chain(clip_distances(&*cx).into_iter().enumerate().map(|(i, ty)| {
            let name = format!("clip{i}");
            (cx.intern(name.as_str()), ty, IOAttributes::builtin(BuiltinValue::ClipDistances))
        }))
        .collect();
    let out = cx.ty_struct("Out", members);
    returning_entry_point(&mut m, PipelineStage::Vertex, out, IOAttributes::default());
    m
}

#[test]
fn clip_distances_may_appear_twice_when_broadened() {
    let caps: Capabilities = Capability::AllowClipDistancesOnF32ScalarAndVector.into();

    let m = clip_distances_module(|cx| vec![cx.ty_vec(cx.ty_f32(), 4), cx.ty_f32()]);
    validate(&m, caps).unwrap();

    let m = clip_distances_module(|cx| vec![cx.ty_vec(cx.ty_f32(), 4), cx.ty_f32(), cx.ty_f32()]);
    let err = validate(&m, caps).unwrap_err();
    assert!(err.mentions("too many instances of builtin 'clip_distances' on entry point output"));

    let m = clip_distances_module(|cx| vec![cx.ty_array(cx.ty_f32(), 4), cx.ty_array(cx.ty_f32(), 4)]);
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("duplicate instance of builtin 'clip_distances' on entry point output"));

    let m = clip_distances_module(|cx| vec![cx.ty_array(cx.ty_f32(), 4)]);
    validate(&m, Capabilities::NONE).unwrap();
}

fn blend_src(location: u32, blend_src: u32) -> IOAttributes {
    IOAttributes { blend_src: Some(blend_src), ..IOAttributes::location(location) }
}

/// Fragment entry point returning a struct with the given members.
fn fragment_output_module(
    members: impl Fn(&Context) -> Vec<(&'static str, Type, IOAttributes)>,
) -> Module {
    let (cx, mut m) = new_module();
    let members: Vec<(InternedStr, Type, IOAttributes)> =
        members(&*cx).into_iter().map(|(name, ty, attrs)| (cx.intern(name), ty, attrs)).collect();
    let out = cx.ty_struct("Out", members);
    returning_entry_point(&mut m, PipelineStage::Fragment, out, IOAttributes::default());
    m
}

#[test]
fn blend_src_pairs_are_accepted() {
    let m = fragment_output_module(|cx| {
        let vec4 = cx.ty_vec(cx.ty_f32(), 4);
        vec![("a", vec4, blend_src(0, 0)), ("b", vec4, blend_src(0, 1))]
    });
    validate(&m, Capabilities::NONE).unwrap();
}

#[test]
fn blend_src_needs_both_halves() {
    let m = fragment_output_module(|cx| {
        let vec4 = cx.ty_vec(cx.ty_f32(), 4);
        vec![("a", vec4, blend_src(0, 0)), ("b", vec4, IOAttributes::location(1))]
    });
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("then @blend_src(0) and @blend_src(1) must be used"));
}

#[test]
fn blend_src_members_are_at_location_zero() {
    let m = fragment_output_module(|cx| {
        let vec4 = cx.ty_vec(cx.ty_f32(), 4);
        vec![("a", vec4, blend_src(0, 0)), ("b", vec4, blend_src(1, 1))]
    });
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("struct members with blend_src must be located at 0"));
}

#[test]
fn blend_src_types_must_match() {
    let m = fragment_output_module(|cx| {
        vec![("a", cx.ty_vec(cx.ty_f32(), 4), blend_src(0, 0)), ("b", cx.ty_f32(), blend_src(0, 1))]
    });
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("does not match other blend_src type"));
}

#[test]
fn blend_src_is_for_struct_members_only() {
    let (cx, mut m) = new_module();
    let vec4 = cx.ty_vec(cx.ty_f32(), 4);
    returning_entry_point(&mut m, PipelineStage::Fragment, vec4, blend_src(0, 0));

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("blend_src cannot be used on non-struct-member types"));
}

#[test]
fn blend_src_locations_are_claimed_first() {
    let m = fragment_output_module(|cx| {
        let vec4 = cx.ty_vec(cx.ty_f32(), 4);
        vec![
            ("plain", vec4, IOAttributes::location(0)),
            ("a", vec4, blend_src(0, 0)),
            ("b", vec4, blend_src(0, 1)),
        ]
    });
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("duplicate location(0) on entry point output"));
}
