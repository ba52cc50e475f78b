use std::rc::Rc;
use tint_ir::builder::Builder;
use tint_ir::caps::{Capabilities, Capability};
use tint_ir::validate::validate;
use tint_ir::{
    Access, AddrSpace, Context, IOAttributes, InstKind, InternedStr, Module, PipelineStage, Type,
};

fn new_module() -> (Rc<Context>, Module) {
    let cx = Rc::new(Context::new());
    let module = Module::new(cx.clone());
    (cx, module)
}

/// Module with a single module-scope `var<private>` of type `store`.
fn private_var_module(store: impl Fn(&Context) -> Type) -> Module {
    let (cx, mut m) = new_module();
    let ty = cx.ty_ptr(AddrSpace::Private, store(&*cx), Access::ReadWrite);
    let root = m.root_block;
    Builder::at_end(&mut m, root).var(Some("v"), ty, None, IOAttributes::default());
    m
}

fn two_member_struct(cx: &Context, a: Type, b: Type) -> Type {
    let members: [(InternedStr, Type, IOAttributes); 2] = [
        (cx.intern("a"), a, IOAttributes::default()),
        (cx.intern("b"), b, IOAttributes::default()),
    ];
    cx.ty_struct("S", members)
}

#[test]
fn wide_and_narrow_integers_need_capabilities() {
    let m = private_var_module(|cx| cx.ty_i64());
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("64-bit integer types are not permitted"));
    validate(&m, Capability::Allow64BitIntegers.into()).unwrap();

    let m = private_var_module(|cx| cx.ty_vec(cx.ty_u8(), 4));
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("8-bit integer types are not permitted"));
    validate(&m, Capability::Allow8BitIntegers.into()).unwrap();

    // One capability does not imply the other.
    let m = private_var_module(|cx| cx.ty_u64());
    let err = validate(&m, Capability::Allow8BitIntegers.into()).unwrap_err();
    assert!(err.mentions("64-bit integer types are not permitted"));
}

#[test]
fn runtime_arrays_are_last_and_in_storage() {
    let m = private_var_module(|cx| cx.ty_runtime_array(cx.ty_u32()));
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("runtime arrays must be in the 'storage' address space"));

    let m = private_var_module(|cx| two_member_struct(cx, cx.ty_runtime_array(cx.ty_u32()), cx.ty_u32()));
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("runtime-sized arrays can only be the last member of a struct"));

    let (cx, mut m) = new_module();
    let buffer = two_member_struct(&cx, cx.ty_u32(), cx.ty_runtime_array(cx.ty_u32()));
    let root = m.root_block;
    Builder::at_end(&mut m, root).var(
        Some("buffer"),
        cx.ty_ptr(AddrSpace::Storage, buffer, Access::Read),
        None,
        IOAttributes::binding(0, 0),
    );
    validate(&m, Capabilities::NONE).unwrap();
}

#[test]
fn struct_members_must_not_overlap_or_be_far_apart() {
    let at_offsets = |members: fn(&Context) -> Vec<(&'static str, Type, u32)>| {
        private_var_module(move |cx| {
            let members: Vec<(InternedStr, Type, u32)> =
                members(cx).into_iter().map(|(name, ty, offset)| (cx.intern(name), ty, offset)).collect();
            cx.ty_struct_at_offsets("S", members)
        })
    };

    let m = at_offsets(|cx| vec![("a", cx.ty_f32(), 0), ("b", cx.ty_f32(), 0xFFFC)]);
    validate(&m, Capabilities::NONE).unwrap();

    let m = at_offsets(|cx| vec![("a", cx.ty_f32(), 0), ("b", cx.ty_f32(), 0x1_0004)]);
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("struct member padding (65536) is larger then the max (65536)"));

    // Overlapping members wrap around to a huge padding.
    let m = at_offsets(|cx| vec![("a", cx.ty_vec(cx.ty_f32(), 4), 0), ("b", cx.ty_f32(), 8)]);
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("struct member padding"));
}

#[test]
fn root_block_instructions_are_restricted() {
    let (cx, mut m) = new_module();
    let root = m.root_block;
    Builder::at_end(&mut m, root).let_(Some("x"), cx.const_u32(1).into());

    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("root block: invalid instruction: let"));
    validate(&m, Capability::AllowModuleScopeLets.into()).unwrap();

    let (cx, mut m) = new_module();
    let root = m.root_block;
    let ptr = cx.ty_ptr(AddrSpace::Private, cx.ty_u32(), Access::ReadWrite);
    let mut b = Builder::at_end(&mut m, root);
    let var = b.var(Some("v"), ptr, None, IOAttributes::default());
    b.let_(Some("x"), var.into());

    let err = validate(&m, Capability::AllowModuleScopeLets.into()).unwrap_err();
    assert!(err.mentions("instruction is not evaluatable at pipeline creation time"));
}

#[test]
fn detached_instructions_are_orphans() {
    let (cx, mut m) = new_module();
    let func = m.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);

    let orphan = m.new_inst(InstKind::Let, [Some(cx.const_u32(1).into())], &[cx.ty_u32()]);
    let err = validate(&m, Capabilities::NONE).unwrap_err();
    assert!(err.mentions("orphaned instruction: let"));

    m.destroy_inst(orphan);
    validate(&m, Capabilities::NONE).unwrap();
}

/// Module with problems in several places: two illegal module-scope types and
/// a compute entry point without a workgroup size.
fn broken_module() -> Module {
    let (cx, mut m) = new_module();
    let root = m.root_block;
    let mut b = Builder::at_end(&mut m, root);
    for (name, store) in [("wide", cx.ty_i64()), ("narrow", cx.ty_u8())] {
        let ty = cx.ty_ptr(AddrSpace::Private, store, Access::ReadWrite);
        b.var(Some(name), ty, None, IOAttributes::default());
    }

    let func = m.add_entry_point("main", PipelineStage::Compute, cx.ty_void());
    let body = m.funcs[func].body;
    Builder::at_end(&mut m, body).return_(func, None);
    m
}

#[test]
fn diagnostics_are_deterministic() {
    let m = broken_module();
    let first = validate(&m, Capabilities::NONE).unwrap_err();
    let again = validate(&m, Capabilities::NONE).unwrap_err();
    let rebuilt = validate(&broken_module(), Capabilities::NONE).unwrap_err();

    assert_eq!(first.diags(), again.diags());
    assert_eq!(first.to_string(), again.to_string());
    assert_eq!(first.to_string(), rebuilt.to_string());

    // Reported in module order.
    let position = |needle: &str| first.diags().iter().position(|d| d.message.contains(needle));
    let wide = position("64-bit integer types").unwrap();
    let narrow = position("8-bit integer types").unwrap();
    let workgroup = position("compute entry point requires @workgroup_size").unwrap();
    assert!(wide < narrow && narrow < workgroup);
}
