//! Shader IO legality: per-attribute checker registries, and the entry point
//! wide rules for locations, `blend_src`, interpolation, binding points and
//! builtin uniqueness.

use super::Validator;
use crate::caps::{Capabilities, Capability};
use crate::io::{BuiltinValue, DepthMode, InterpolationType};
use crate::{
    AddrSpace, Context, DiagAnchor, FxIndexMap, FxIndexSet, Func, IOAttributes, InstKind,
    PipelineStage, Type, TypeKind,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

/// What kind of value shader IO attributes are attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum ShaderIOKind {
    InputParam,
    ResultValue,
    ModuleScopeVar,
}

impl fmt::Display for ShaderIOKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderIOKind::InputParam => "input param",
            ShaderIOKind::ResultValue => "return value",
            ShaderIOKind::ModuleScopeVar => "module scope variable",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum IODirection {
    Input,
    Output,
    Resource,
}

impl fmt::Display for IODirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IODirection::Input => "input",
            IODirection::Output => "output",
            IODirection::Resource => "resource",
        })
    }
}

/// Pipeline stage and IO direction an attribute is used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum IOAttributeUsage {
    ComputeInput,
    ComputeOutput,
    ComputeResource,
    FragmentInput,
    FragmentOutput,
    FragmentResource,
    VertexInput,
    VertexOutput,
    VertexResource,
    Undefined,
}

impl IOAttributeUsage {
    fn new(stage: PipelineStage, dir: IODirection) -> Self {
        use IOAttributeUsage as U;
        match (stage, dir) {
            (PipelineStage::Compute, IODirection::Input) => U::ComputeInput,
            (PipelineStage::Compute, IODirection::Output) => U::ComputeOutput,
            (PipelineStage::Compute, IODirection::Resource) => U::ComputeResource,
            (PipelineStage::Fragment, IODirection::Input) => U::FragmentInput,
            (PipelineStage::Fragment, IODirection::Output) => U::FragmentOutput,
            (PipelineStage::Fragment, IODirection::Resource) => U::FragmentResource,
            (PipelineStage::Vertex, IODirection::Input) => U::VertexInput,
            (PipelineStage::Vertex, IODirection::Output) => U::VertexOutput,
            (PipelineStage::Vertex, IODirection::Resource) => U::VertexResource,
            (PipelineStage::Undefined, _) => U::Undefined,
        }
    }
}

impl fmt::Display for IOAttributeUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use IOAttributeUsage as U;
        f.write_str(match self {
            U::ComputeInput => "compute shader input",
            U::ComputeOutput => "compute shader output",
            U::ComputeResource => "compute shader resource",
            U::FragmentInput => "fragment shader input",
            U::FragmentOutput => "fragment shader output",
            U::FragmentResource => "fragment shader resource",
            U::VertexInput => "vertex shader input",
            U::VertexOutput => "vertex shader output",
            U::VertexResource => "vertex shader resource",
            U::Undefined => "non-entry point usage",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum IOAttributeKind {
    Invariant,
    Builtin,
    Color,
    InputAttachmentIndex,
    DepthMode,
}

impl fmt::Display for IOAttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IOAttributeKind::Invariant => "@invariant",
            IOAttributeKind::Builtin => "@builtin",
            IOAttributeKind::Color => "@color",
            IOAttributeKind::InputAttachmentIndex => "@input_attachment_index",
            IOAttributeKind::DepthMode => "@depth_mode",
        })
    }
}

/// Mutually exclusive ways for a value to take part in shader IO.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum IOAnnotation {
    BindingPoint,
    Location,
    Builtin,
    Workgroup,
    Color,
}

impl fmt::Display for IOAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IOAnnotation::BindingPoint => "@group + @binding",
            IOAnnotation::Location => "@location",
            IOAnnotation::Builtin => "built-in",
            IOAnnotation::Workgroup => "<workgroup>",
            IOAnnotation::Color => "@color",
        })
    }
}

/// `[ a, b, c ]`, for listing the allowed alternatives in diagnostics.
fn list<T: fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    format!("[ {} ]", values.into_iter().join(", "))
}

/// Add the annotations implied by `attrs`, failing with the first one
/// already present.
fn add_io_annotations(
    annotations: &mut BTreeSet<IOAnnotation>,
    attrs: &IOAttributes,
) -> Result<(), IOAnnotation> {
    let present = [
        (attrs.location.is_some(), IOAnnotation::Location),
        (attrs.builtin.is_some(), IOAnnotation::Builtin),
        (attrs.color.is_some(), IOAnnotation::Color),
    ];
    for (_, annotation) in present.into_iter().filter(|&(present, _)| present) {
        if !annotations.insert(annotation) {
            return Err(annotation);
        }
    }
    Ok(())
}

/// Type, usage and depth mode rules for one builtin value.
struct BuiltinChecker {
    valid_usages: &'static [IOAttributeUsage],
    valid_depth_modes: &'static [DepthMode],
    type_check: fn(&Context, Type) -> bool,
    type_error: &'static str,
}

/// `clip_distances` elements must be (at most 8) `f32`s.
fn is_clip_distances_array(cx: &Context, ty: Type) -> bool {
    matches!(ty.elements(cx), (Some(elem), count) if matches!(cx[elem].kind, TypeKind::F32) && count <= 8)
}

fn is_f32(cx: &Context, ty: Type) -> bool {
    matches!(cx[ty].kind, TypeKind::F32)
}

fn is_u32(cx: &Context, ty: Type) -> bool {
    matches!(cx[ty].kind, TypeKind::U32)
}

fn is_vec3_u32(cx: &Context, ty: Type) -> bool {
    ty.is_unsigned_integer_vector(cx) && ty.vector_width(cx) == Some(3)
}

const ONLY_UNDEFINED_DEPTH: &[DepthMode] = &[DepthMode::Undefined];

static CLIP_DISTANCES_F32_SCALAR_AND_VECTOR: BuiltinChecker = BuiltinChecker {
    valid_usages: &[IOAttributeUsage::VertexOutput],
    valid_depth_modes: ONLY_UNDEFINED_DEPTH,
    type_check: |cx, ty| {
        let composite = matches!(cx[ty].kind, TypeKind::Array { .. } | TypeKind::Vector { .. });
        (composite && is_clip_distances_array(cx, ty)) || is_f32(cx, ty)
    },
    type_error: "must be a f32 or either a vecN<f32> or an array<f32, N>, where N <= 8",
};

static CLIP_DISTANCES_F32: BuiltinChecker = BuiltinChecker {
    valid_usages: &[IOAttributeUsage::VertexOutput],
    valid_depth_modes: ONLY_UNDEFINED_DEPTH,
    type_check: |cx, ty| {
        let array = matches!(cx[ty].kind, TypeKind::Array { .. });
        (array && is_clip_distances_array(cx, ty)) || is_f32(cx, ty)
    },
    type_error: "must be a f32 or an array<f32, N>, where N <= 8",
};

const fn checker(
    valid_usages: &'static [IOAttributeUsage],
    type_check: fn(&Context, Type) -> bool,
    type_error: &'static str,
) -> BuiltinChecker {
    BuiltinChecker { valid_usages, valid_depth_modes: ONLY_UNDEFINED_DEPTH, type_check, type_error }
}

const fn checker_u32(valid_usages: &'static [IOAttributeUsage]) -> BuiltinChecker {
    checker(valid_usages, is_u32, "must be an u32")
}

lazy_static! {
    static ref BUILTIN_CHECKERS: FxHashMap<BuiltinValue, BuiltinChecker> = {
        use IOAttributeUsage as U;

        [
            (BuiltinValue::PointSize, checker(&[U::VertexOutput], is_f32, "must be a f32")),
            (
                BuiltinValue::ClipDistances,
                checker(
                    &[U::VertexOutput],
                    |cx, ty| {
                        matches!(cx[ty].kind, TypeKind::Array { .. })
                            && is_clip_distances_array(cx, ty)
                    },
                    "must be an array<f32, N>, where N <= 8",
                ),
            ),
            (
                BuiltinValue::CullDistance,
                checker(
                    &[U::VertexOutput],
                    |cx, ty| {
                        matches!(cx[ty].kind, TypeKind::Array { .. })
                            && is_f32(cx, ty.deepest_element(cx))
                    },
                    "must be an array of f32",
                ),
            ),
            (
                BuiltinValue::FragDepth,
                BuiltinChecker {
                    valid_usages: &[U::FragmentOutput],
                    valid_depth_modes: &[
                        DepthMode::Undefined,
                        DepthMode::Any,
                        DepthMode::Greater,
                        DepthMode::Less,
                    ],
                    type_check: is_f32,
                    type_error: "must be a f32",
                },
            ),
            (
                BuiltinValue::FrontFacing,
                checker(&[U::FragmentInput], |cx, ty| ty.is_bool(cx), "must be a bool"),
            ),
            (BuiltinValue::GlobalInvocationId, checker(&[U::ComputeInput], is_vec3_u32, "must be an vec3<u32>")),
            (BuiltinValue::InstanceIndex, checker_u32(&[U::VertexInput])),
            (BuiltinValue::LocalInvocationId, checker(&[U::ComputeInput], is_vec3_u32, "must be an vec3<u32>")),
            (BuiltinValue::LocalInvocationIndex, checker_u32(&[U::ComputeInput])),
            (BuiltinValue::NumSubgroups, checker_u32(&[U::ComputeInput])),
            (BuiltinValue::NumWorkgroups, checker(&[U::ComputeInput], is_vec3_u32, "must be an vec3<u32>")),
            (
                BuiltinValue::Position,
                checker(
                    &[U::VertexOutput, U::FragmentInput],
                    |cx, ty| ty.is_float_vector(cx) && ty.vector_width(cx) == Some(4),
                    "must be an vec4<f32>",
                ),
            ),
            (BuiltinValue::SampleIndex, checker_u32(&[U::FragmentInput])),
            (BuiltinValue::SampleMask, checker_u32(&[U::FragmentInput, U::FragmentOutput])),
            (BuiltinValue::SubgroupId, checker_u32(&[U::ComputeInput])),
            (
                BuiltinValue::SubgroupInvocationId,
                checker_u32(&[U::FragmentInput, U::ComputeInput]),
            ),
            (BuiltinValue::SubgroupSize, checker_u32(&[U::FragmentInput, U::ComputeInput])),
            (BuiltinValue::VertexIndex, checker_u32(&[U::VertexInput])),
            (BuiltinValue::WorkgroupId, checker(&[U::ComputeInput], is_vec3_u32, "must be an vec3<u32>")),
            (BuiltinValue::PrimitiveIndex, checker_u32(&[U::FragmentInput])),
            (
                BuiltinValue::BarycentricCoord,
                checker(
                    &[U::FragmentInput],
                    |cx, ty| ty.is_float_vector(cx) && ty.vector_width(cx) == Some(3),
                    "must be an vec3<f32>",
                ),
            ),
        ]
        .into_iter()
        .collect()
    };
}

fn builtin_checker(builtin: BuiltinValue, caps: Capabilities) -> &'static BuiltinChecker {
    if builtin == BuiltinValue::ClipDistances {
        if caps.contains(Capability::AllowClipDistancesOnF32ScalarAndVector) {
            return &CLIP_DISTANCES_F32_SCALAR_AND_VECTOR;
        }
        if caps.contains(Capability::AllowClipDistancesOnF32) {
            return &CLIP_DISTANCES_F32;
        }
    }
    &BUILTIN_CHECKERS[&builtin]
}

/// Usage, value kind, and type rules for one kind of IO attribute.
struct IOAttributeChecker {
    kind: IOAttributeKind,
    valid_usages: &'static [IOAttributeUsage],
    valid_io_kinds: &'static [ShaderIOKind],
    type_check: fn(&Context, Type, Capabilities) -> bool,
    type_error: &'static str,
    check: fn(&Context, Type, &IOAttributes, Capabilities, IOAttributeUsage) -> Result<(), String>,
}

const ALL_ENTRY_POINT_USAGES: &[IOAttributeUsage] = &[
    IOAttributeUsage::ComputeInput,
    IOAttributeUsage::ComputeOutput,
    IOAttributeUsage::FragmentInput,
    IOAttributeUsage::FragmentOutput,
    IOAttributeUsage::VertexInput,
    IOAttributeUsage::VertexOutput,
];

const ALL_IO_KINDS: &[ShaderIOKind] =
    &[ShaderIOKind::InputParam, ShaderIOKind::ResultValue, ShaderIOKind::ModuleScopeVar];

fn check_builtin_attr(
    cx: &Context,
    ty: Type,
    attrs: &IOAttributes,
    caps: Capabilities,
    usage: IOAttributeUsage,
) -> Result<(), String> {
    let Some(builtin) = attrs.builtin else {
        return Ok(());
    };
    let checker = builtin_checker(builtin, caps);

    if usage != IOAttributeUsage::Undefined && !checker.valid_usages.contains(&usage) {
        let allowed = match checker.valid_usages {
            [only] => format!("It can only be used on a {only}."),
            usages => format!("It can only be used on one of {}", list(usages)),
        };
        return Err(format!("{builtin} cannot be used on a {usage}. {allowed}"));
    }

    if !(checker.type_check)(cx, ty) {
        return Err(format!("{builtin} {}", checker.type_error));
    }

    let depth_mode = attrs.depth_mode.unwrap_or(DepthMode::Undefined);
    if !checker.valid_depth_modes.contains(&depth_mode) {
        let allowed = match checker.valid_depth_modes {
            [only] => format!("It can only be {only}."),
            modes => format!("It must be one of {}", list(modes)),
        };
        return Err(format!("{builtin} cannot have a depth mode of {depth_mode}. {allowed}"));
    }

    if builtin == BuiltinValue::PointSize && !caps.contains(Capability::AllowPointSizeBuiltin) {
        return Err("use of point_size builtin requires AllowPointSizeBuiltin".into());
    }

    Ok(())
}

lazy_static! {
    static ref IO_ATTRIBUTE_CHECKERS: FxHashMap<IOAttributeKind, IOAttributeChecker> = {
        let position = &BUILTIN_CHECKERS[&BuiltinValue::Position];
        [
            IOAttributeChecker {
                kind: IOAttributeKind::Invariant,
                valid_usages: &[IOAttributeUsage::VertexOutput, IOAttributeUsage::FragmentInput],
                valid_io_kinds: ALL_IO_KINDS,
                type_check: |cx, ty, _| ty.is_float_vector(cx) && ty.vector_width(cx) == Some(4),
                type_error: position.type_error,
                check: |_, _, attrs, _, _| {
                    if attrs.builtin != Some(BuiltinValue::Position) {
                        return Err("invariant can only decorate a value if it is also decorated \
                                    with position"
                            .into());
                    }
                    Ok(())
                },
            },
            IOAttributeChecker {
                kind: IOAttributeKind::Builtin,
                valid_usages: ALL_ENTRY_POINT_USAGES,
                valid_io_kinds: ALL_IO_KINDS,
                type_check: |_, _, _| true,
                type_error: "",
                check: check_builtin_attr,
            },
            IOAttributeChecker {
                kind: IOAttributeKind::Color,
                valid_usages: &[IOAttributeUsage::FragmentInput],
                valid_io_kinds: &[ShaderIOKind::InputParam, ShaderIOKind::ModuleScopeVar],
                type_check: |cx, ty, _| ty.is_numeric_scalar_or_vector(cx),
                type_error: "must be a scalar or vector",
                check: |_, _, _, _, _| Ok(()),
            },
            IOAttributeChecker {
                kind: IOAttributeKind::InputAttachmentIndex,
                valid_usages: &[IOAttributeUsage::FragmentResource],
                valid_io_kinds: &[ShaderIOKind::ModuleScopeVar],
                type_check: |cx, ty, caps| {
                    caps.contains(Capability::AllowAnyInputAttachmentIndexType)
                        || matches!(cx[ty].kind, TypeKind::InputAttachment { .. })
                },
                type_error: "must be an input_attachment",
                check: |_, _, _, _, _| Ok(()),
            },
            IOAttributeChecker {
                kind: IOAttributeKind::DepthMode,
                valid_usages: ALL_ENTRY_POINT_USAGES,
                valid_io_kinds: ALL_IO_KINDS,
                type_check: |_, _, _| true,
                type_error: "",
                // NOTE the value itself is checked against the builtin's rules.
                check: |_, _, attrs, _, _| {
                    if attrs.builtin.is_none() {
                        return Err("cannot have a depth_mode without a builtin".into());
                    }
                    Ok(())
                },
            },
        ]
        .into_iter()
        .map(|checker| (checker.kind, checker))
        .collect()
    };
}

/// Checkers for every attribute present in `attrs`.
///
/// `location`, `blend_src`, `interpolation` and binding points have rules
/// spanning whole entry points, and are checked separately.
fn io_attribute_checkers_for(
    attrs: &IOAttributes,
    skip_builtin: bool,
) -> SmallVec<[&'static IOAttributeChecker; 4]> {
    let present = [
        (attrs.invariant, IOAttributeKind::Invariant),
        (!skip_builtin && attrs.builtin.is_some(), IOAttributeKind::Builtin),
        (attrs.color.is_some(), IOAttributeKind::Color),
        (attrs.input_attachment_index.is_some(), IOAttributeKind::InputAttachmentIndex),
        (attrs.depth_mode.is_some(), IOAttributeKind::DepthMode),
    ];
    present
        .into_iter()
        .filter(|&(present, _)| present)
        .map(|(_, kind)| &IO_ATTRIBUTE_CHECKERS[&kind])
        .collect()
}

/// `ty` (with `attrs`) followed by every struct member reachable from it
/// (with their own attributes), looking through arrays, in pre-order.
fn walk_type_and_members<'a>(
    cx: &'a Context,
    ty: Type,
    attrs: &'a IOAttributes,
) -> Vec<(Type, &'a IOAttributes)> {
    fn walk_nested<'a>(cx: &'a Context, ty: Type, out: &mut Vec<(Type, &'a IOAttributes)>) {
        match &cx[ty].kind {
            TypeKind::Struct(def) => {
                for member in &def.members {
                    out.push((member.ty, &member.attrs));
                    walk_nested(cx, member.ty, out);
                }
            }
            &TypeKind::Array { elem, .. } => walk_nested(cx, elem, out),
            _ => {}
        }
    }

    let mut out = vec![(ty, attrs)];
    walk_nested(cx, ty, &mut out);
    out
}

/// Whether `ty` is a struct with a `@builtin(position)` member, or (not
/// being a struct) is itself decorated with it.
fn is_position_present(cx: &Context, attrs: &IOAttributes, ty: Type) -> bool {
    match ty.struct_def(cx) {
        Some(def) => {
            def.members.iter().any(|member| member.attrs.builtin == Some(BuiltinValue::Position))
        }
        None => attrs.builtin == Some(BuiltinValue::Position),
    }
}

/// Whether every leaf of `ty` is a numeric scalar or vector.
fn contains_only_numeric_elements(cx: &Context, ty: Type) -> bool {
    let ty = ty.unwrap_ptr_or_ref(cx);
    match ty.struct_def(cx) {
        Some(def) => def.members.iter().all(|m| contains_only_numeric_elements(cx, m.ty)),
        None => {
            let elem = ty.deepest_element(cx).unwrap_ptr_or_ref(cx);
            if elem.is_struct(cx) {
                contains_only_numeric_elements(cx, elem)
            } else {
                elem.is_numeric_scalar_or_vector(cx)
            }
        }
    }
}

/// A value taking part in the IO of an entry point.
struct IOObject<'a> {
    anchor: DiagAnchor,
    ty: Type,
    attrs: &'a IOAttributes,
    dir: IODirection,
    kind: ShaderIOKind,
}

/// Locations and `blend_src`s claimed so far, in one IO direction.
struct BlendSrcContext {
    stage: PipelineStage,
    dir: IODirection,
    locations: FxIndexMap<u32, DiagAnchor>,
    blend_srcs: FxIndexSet<u32>,
    blend_src_ty: Option<Type>,
}

impl BlendSrcContext {
    fn new(stage: PipelineStage, dir: IODirection) -> Self {
        Self {
            stage,
            dir,
            locations: FxIndexMap::default(),
            blend_srcs: FxIndexSet::default(),
            blend_src_ty: None,
        }
    }
}

/// Number of times each builtin was seen, per IO direction.
#[derive(Default)]
struct BuiltinCounts {
    inputs: FxHashMap<BuiltinValue, u32>,
    outputs: FxHashMap<BuiltinValue, u32>,
}

impl<'a> Validator<'a> {
    /// All the IO objects of `func`: parameters, return value, and the
    /// module-scope IO (and handle) variables it transitively references.
    fn io_objects(&mut self, func: Func) -> Vec<IOObject<'a>> {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];

        let mut objects: Vec<_> = func_decl
            .params
            .iter()
            .map(|&param| IOObject {
                anchor: DiagAnchor::FuncParam(param),
                ty: module.func_params[param].ty,
                attrs: &module.func_params[param].attrs,
                dir: IODirection::Input,
                kind: ShaderIOKind::InputParam,
            })
            .collect();

        objects.push(IOObject {
            anchor: DiagAnchor::Func(func),
            ty: func_decl.ret_type,
            attrs: &func_decl.ret_attrs,
            dir: IODirection::Output,
            kind: ShaderIOKind::ResultValue,
        });

        for &var in self.transitive_vars(func).iter() {
            let InstKind::Var { attrs } = &module.insts[var].kind else {
                continue;
            };
            let Some(mv) = module.result(var).and_then(|r| module.inst_results[r].ty.memory_view(cx))
            else {
                continue;
            };
            let dir = match mv.addr_space {
                AddrSpace::In => IODirection::Input,
                AddrSpace::Out => IODirection::Output,
                AddrSpace::Handle => IODirection::Resource,
                _ => continue,
            };
            objects.push(IOObject {
                anchor: DiagAnchor::Inst(var),
                ty: mv.store,
                attrs,
                dir,
                kind: ShaderIOKind::ModuleScopeVar,
            });
        }

        objects
    }

    /// Entry point wide IO attribute rules for `func` (which may also not be
    /// an entry point, in which case most attributes are rejected).
    pub(super) fn validate_io_attributes(&mut self, func: Func) {
        let cx = self.cx;
        let stage = self.module.funcs[func].stage;
        let objects = self.io_objects(func);

        if stage != PipelineStage::Undefined {
            let mut input_ctx = BlendSrcContext::new(stage, IODirection::Input);
            let mut output_ctx = BlendSrcContext::new(stage, IODirection::Output);

            // Locations used by `blend_src`s are claimed first, so that any
            // other use of them is reported as a duplicate.
            for object in &objects {
                let ctx = match object.dir {
                    IODirection::Input => &mut input_ctx,
                    _ => &mut output_ctx,
                };
                for (_, attrs) in walk_type_and_members(cx, object.ty, object.attrs) {
                    if let (Some(_), Some(location)) = (attrs.blend_src, attrs.location) {
                        ctx.locations.entry(location).or_insert(object.anchor);
                    }
                }
            }

            for object in &objects {
                let ctx = match object.dir {
                    IODirection::Input => &mut input_ctx,
                    _ => &mut output_ctx,
                };
                self.check_blend_src(ctx, object.anchor, object.ty, object.attrs);
            }

            if !output_ctx.blend_srcs.is_empty() && output_ctx.blend_srcs.len() != 2 {
                self.add_error(
                    DiagAnchor::Func(func),
                    "if any @blend_src is used on an output, then @blend_src(0) and \
                     @blend_src(1) must be used",
                );
            }

            for object in &objects {
                let locations = match object.dir {
                    IODirection::Input => &mut input_ctx.locations,
                    IODirection::Output => &mut output_ctx.locations,
                    IODirection::Resource => continue,
                };
                self.check_location(locations, object, stage);
            }
        }

        for object in &objects {
            self.check_interpolation(object, stage);
        }

        if stage != PipelineStage::Undefined {
            for object in &objects {
                self.check_binding_point(object.anchor, object.ty, object.attrs, object.kind);
            }
        }

        let mut counts = BuiltinCounts::default();
        for object in &objects {
            self.validate_io_attributes_of(&mut counts, object, stage);
        }
    }

    fn check_blend_src(
        &mut self,
        ctx: &mut BlendSrcContext,
        anchor: DiagAnchor,
        ty: Type,
        attrs: &IOAttributes,
    ) {
        let cx = self.cx;
        let loosened = self.caps.contains(Capability::LoosenValidationForShaderIO);

        if attrs.blend_src.is_some() {
            if !loosened {
                self.add_error(anchor, "blend_src cannot be used on non-struct-member types");
            }
            self.check_blend_src_member(ctx, anchor, ty, attrs);
        }

        if let Some(def) = ty.struct_def(cx) {
            if def.members.iter().any(|m| m.attrs.blend_src.is_some()) {
                let mut location_count = 0;
                for member in &def.members {
                    if member.attrs.location.is_some() {
                        location_count += 1;
                    }
                    self.check_blend_src_member(ctx, anchor, member.ty, &member.attrs);
                }
                if location_count != 2 {
                    self.add_error(
                        anchor,
                        "structs with blend_src members must have exactly 2 members with \
                         location annotations",
                    );
                }
                return;
            }
        }

        if !loosened {
            for (_, nested) in walk_type_and_members(cx, ty, attrs).into_iter().skip(1) {
                if nested.blend_src.is_some() {
                    self.add_error(anchor, "blend_src cannot be used on members of non-top level structs");
                }
            }
        }
    }

    fn check_blend_src_member(
        &mut self,
        ctx: &mut BlendSrcContext,
        anchor: DiagAnchor,
        ty: Type,
        attrs: &IOAttributes,
    ) {
        let Some(blend_src) = attrs.blend_src else {
            return;
        };

        if blend_src > 1 {
            self.add_error(anchor, "blend_src value must be 0 or 1");
        }
        if !ctx.blend_srcs.insert(blend_src) {
            self.add_error(
                anchor,
                format!("duplicate blend_src({blend_src}) on entry point {}", ctx.dir),
            );
        }

        if ctx.dir != IODirection::Output || ctx.stage != PipelineStage::Fragment {
            self.add_error(anchor, "blend_src can only be used on fragment shader outputs");
            return;
        }
        if attrs.location != Some(0) {
            self.add_error(anchor, "struct members with blend_src must be located at 0");
        }

        match ctx.blend_src_ty {
            None => {
                if !ty.is_numeric_scalar_or_vector(self.cx) {
                    self.add_error(
                        anchor,
                        format!(
                            "blend_src must be a numeric scalar or vector, but has type {}",
                            self.ty_name(ty)
                        ),
                    );
                }
                ctx.blend_src_ty = Some(ty);
            }
            Some(other) if other != ty => {
                self.add_error(
                    anchor,
                    format!(
                        "blend_src type {} does not match other blend_src type {}",
                        self.ty_name(ty),
                        self.ty_name(other)
                    ),
                );
            }
            Some(_) => {}
        }
    }

    fn check_location(
        &mut self,
        locations: &mut FxIndexMap<u32, DiagAnchor>,
        object: &IOObject<'_>,
        stage: PipelineStage,
    ) {
        let cx = self.cx;
        for (ty, attrs) in walk_type_and_members(cx, object.ty, object.attrs) {
            // NOTE `blend_src` locations were claimed ahead of time.
            if ty.is_struct(cx) || attrs.blend_src.is_some() {
                continue;
            }
            let Some(location) = attrs.location else {
                continue;
            };

            if stage == PipelineStage::Compute && object.dir == IODirection::Input {
                self.add_error(object.anchor, "location attribute is not valid for compute shader inputs");
            }

            match locations.get(&location) {
                Some(&conflict) => {
                    let note = self.anchor_declaration_note(conflict);
                    self.add_error(
                        object.anchor,
                        format!("duplicate location({location}) on entry point {}", object.dir),
                    )
                    .notes
                    .extend(note);
                }
                None => {
                    locations.insert(location, object.anchor);
                }
            }
        }
    }

    fn check_interpolation(&mut self, object: &IOObject<'_>, stage: PipelineStage) {
        let cx = self.cx;
        let loosened = self.caps.contains(Capability::LoosenValidationForShaderIO);
        let anchor = object.anchor;

        // Set once inside a composite with a location (covering its elements).
        let mut in_location_composite = false;
        for (ty, attrs) in walk_type_and_members(cx, object.ty, object.attrs) {
            let mut has_location = attrs.location.is_some() || in_location_composite;
            if !has_location {
                if let Some(def) = ty.struct_def(cx) {
                    has_location = def.members.iter().all(|m| m.attrs.location.is_some());
                }
            }

            if let Some(interpolation) = attrs.interpolation {
                has_location |= loosened && attrs.builtin.is_some();

                if !self.caps.contains(Capability::AllowLocationForNumericElements)
                    && ty.is_struct(cx)
                {
                    self.add_error(
                        anchor,
                        "interpolation cannot be applied to a struct without \
                         'AllowLocationForNumericElements' capability",
                    );
                }

                if ty.is_integer_scalar(cx) && interpolation.ty != InterpolationType::Flat {
                    self.add_error(
                        anchor,
                        "interpolation attribute type must be flat for integral types",
                    );
                }

                if !has_location {
                    if loosened {
                        self.add_error(
                            anchor,
                            "interpolation attribute requires a location attribute (or \
                             location-like shader I/O annotation)",
                        );
                    } else {
                        self.add_error(anchor, "interpolation attribute requires a location attribute");
                    }
                }
            } else if has_location && ty.is_integer_scalar_or_vector(cx) {
                let needs_flat = matches!(
                    (stage, object.dir),
                    (PipelineStage::Vertex, IODirection::Output)
                        | (PipelineStage::Fragment, IODirection::Input)
                );
                if needs_flat {
                    self.add_error(
                        anchor,
                        "integral user-defined inputs and outputs must have an @interpolate(flat) \
                         attribute",
                    );
                }
            }

            if matches!(cx[ty].kind, TypeKind::Array { .. } | TypeKind::Struct(_)) {
                in_location_composite |= attrs.location.is_some();
            }
        }
    }

    /// Binding points are required on resources (`storage`, `uniform` and
    /// `handle` values), and forbidden everywhere else.
    pub(super) fn check_binding_point(
        &mut self,
        anchor: DiagAnchor,
        ty: Type,
        attrs: &IOAttributes,
        kind: ShaderIOKind,
    ) {
        let cx = self.cx;
        let binding_point = attrs.binding_point;

        // NOTE handles may have been unwrapped from their pointers (for MSL).
        let addr_space = match ty.memory_view(cx) {
            Some(mv) => mv.addr_space,
            None if ty.is_handle(cx) => AddrSpace::Handle,
            None => AddrSpace::Undefined,
        };

        if binding_point.is_some()
            && kind != ShaderIOKind::ModuleScopeVar
            && !self.caps.contains(Capability::MslAllowEntryPointInterface)
        {
            self.add_error(anchor, "binding_points are only valid on resource variables");
        }

        match addr_space {
            AddrSpace::Handle => {
                if !self.caps.contains(Capability::AllowHandleVarsWithoutBindings)
                    && binding_point.is_none()
                {
                    self.add_error(anchor, format!("a {addr_space} resource requires a binding point"));
                }
            }
            AddrSpace::Storage | AddrSpace::Uniform => {
                if binding_point.is_none() {
                    self.add_error(anchor, format!("a {addr_space} resource requires a binding point"));
                }
            }
            _ => {
                if binding_point.is_some() {
                    self.add_error(
                        anchor,
                        format!("a {addr_space} non-resource cannot have a binding point"),
                    );
                }
            }
        }
    }

    /// Per-value attribute rules (and builtin uniqueness), for `object` and
    /// all the struct members reachable from it.
    fn validate_io_attributes_of(
        &mut self,
        counts: &mut BuiltinCounts,
        object: &IOObject<'_>,
        stage: PipelineStage,
    ) {
        let cx = self.cx;
        let caps = self.caps;
        let anchor = object.anchor;

        // NOTE materialized IO vars may use backend-specific builtin types.
        let skip_builtins = caps.contains(Capability::LoosenValidationForShaderIO)
            && object.kind == ShaderIOKind::ModuleScopeVar;
        let usage = IOAttributeUsage::new(stage, object.dir);

        for (ty, attrs) in walk_type_and_members(cx, object.ty, object.attrs) {
            let checkers = io_attribute_checkers_for(attrs, skip_builtins);
            if checkers.is_empty() {
                continue;
            }

            if let (Some(builtin), false) = (attrs.builtin, skip_builtins) {
                let count = match object.dir {
                    IODirection::Input => Some(counts.inputs.entry(builtin).or_default()),
                    IODirection::Output => Some(counts.outputs.entry(builtin).or_default()),
                    // Caught by the usage checks below.
                    IODirection::Resource => None,
                }
                .map_or(0, |count| {
                    *count += 1;
                    *count
                });

                if caps.contains(Capability::AllowClipDistancesOnF32ScalarAndVector)
                    && builtin == BuiltinValue::ClipDistances
                {
                    if count > 2 {
                        self.add_error(
                            anchor,
                            format!(
                                "too many instances of builtin 'clip_distances' on entry point \
                                 {}, only two allowed with \
                                 'AllowClipDistancesOnF32ScalarAndVector' capability enabled",
                                object.dir
                            ),
                        );
                    }
                } else if count > 1 {
                    self.add_error(
                        anchor,
                        format!(
                            "duplicate instance of builtin '{builtin}' on entry point {}, must \
                             be unique per entry point i/o direction",
                            object.dir
                        ),
                    );
                }
            }

            // Each checker reports (at most) its first failure, in the order
            // usage, value kind, type, and then attribute-specific rules.
            let mut failed = SmallVec::<[IOAttributeKind; 4]>::new();

            if usage != IOAttributeUsage::Undefined {
                for checker in &checkers {
                    if !checker.valid_usages.contains(&usage) {
                        failed.push(checker.kind);
                        let allowed = match checker.valid_usages {
                            [only] => format!("They can only be used for a {only}."),
                            usages => format!("They can only be used for {}", list(usages)),
                        };
                        self.add_error(
                            anchor,
                            format!(
                                "{} IO attributes cannot be declared for a {usage}. {allowed}",
                                checker.kind
                            ),
                        );
                    }
                }
            }

            for checker in &checkers {
                if failed.contains(&checker.kind) {
                    continue;
                }
                if !checker.valid_io_kinds.contains(&object.kind) {
                    failed.push(checker.kind);
                    let allowed = match checker.valid_io_kinds {
                        [only] => format!("They can only be used on a {only}."),
                        kinds => format!("They can only be used on {}", list(kinds)),
                    };
                    self.add_error(
                        anchor,
                        format!(
                            "{} IO attributes cannot be declared on a {}. {allowed}",
                            checker.kind, object.kind
                        ),
                    );
                }
            }

            for checker in &checkers {
                if failed.contains(&checker.kind) {
                    continue;
                }
                if !(checker.type_check)(cx, ty, caps) {
                    failed.push(checker.kind);
                    self.add_error(anchor, format!("{} {}", checker.kind, checker.type_error));
                }
            }

            for checker in &checkers {
                if failed.contains(&checker.kind) {
                    continue;
                }
                if let Err(message) = (checker.check)(cx, ty, attrs, caps, usage) {
                    self.add_error(anchor, message);
                }
            }
        }
    }

    /// Each IO value must take part in shader IO in exactly one way (e.g.
    /// either a location, or a builtin), and only numeric values can have
    /// locations.
    pub(super) fn validate_shader_io_annotations(
        &mut self,
        anchor: DiagAnchor,
        ty: Type,
        attrs: &IOAttributes,
        kind: ShaderIOKind,
    ) {
        let cx = self.cx;
        let caps = self.caps;

        let mut annotations = BTreeSet::new();
        // NOTE can't fail, as `annotations` starts out empty.
        let _ = add_io_annotations(&mut annotations, attrs);
        if attrs.binding_point.is_some() {
            annotations.insert(IOAnnotation::BindingPoint);
        }
        if ty.memory_view(cx).is_some_and(|mv| mv.addr_space == AddrSpace::Workgroup) {
            annotations.insert(IOAnnotation::Workgroup);
        }

        if ty.is_void(cx) {
            if !annotations.is_empty() {
                self.add_error(anchor, format!("{kind} with void type should never be annotated"));
            }
            return;
        }

        if attrs.location.is_some() {
            if caps.contains(Capability::AllowLocationForNumericElements) {
                if !contains_only_numeric_elements(cx, ty) {
                    self.add_error(
                        anchor,
                        format!(
                            "{kind} with a location attribute must contain only numeric elements {}",
                            self.ty_name(ty)
                        ),
                    );
                    return;
                }
            } else if !ty.unwrap_ptr_or_ref(cx).is_numeric_scalar_or_vector(cx) {
                self.add_error(
                    anchor,
                    format!(
                        "{kind} with a location attribute must be a numeric scalar or vector, but \
                         has type {}",
                        self.ty_name(ty)
                    ),
                );
                return;
            }
        }

        let Some(def) = ty.unwrap_ptr_or_ref(cx).struct_def(cx) else {
            if annotations.is_empty() {
                let unannotated_ok = caps.contains(Capability::AllowUnannotatedModuleIOVariables)
                    && kind == ShaderIOKind::ModuleScopeVar;
                if !unannotated_ok {
                    self.add_error(
                        anchor,
                        format!(
                            "{kind} must have at least one IO annotation, e.g. a binding point, a \
                             location, etc"
                        ),
                    );
                }
            } else if annotations.len() > 1 {
                self.add_error(
                    anchor,
                    format!("{kind} has more than one IO annotation, {}", list(&annotations)),
                );
            }
            return;
        };

        for member in &def.members {
            let mut member_annotations = annotations.clone();
            if let Err(duplicate) = add_io_annotations(&mut member_annotations, &member.attrs) {
                self.add_error(
                    anchor,
                    format!(
                        "{kind} struct member has same IO annotation, as top-level struct, \
                         '{duplicate}'"
                    ),
                );
                return;
            }

            let member_ty = member.ty.unwrap_ptr_or_ref(cx);
            if member.attrs.location.is_some() {
                if caps.contains(Capability::AllowLocationForNumericElements) {
                    if !member_ty.is_numeric_scalar_or_vector(cx) && !member_ty.is_struct(cx) {
                        self.add_error(
                            anchor,
                            format!(
                                "{kind} struct member with a location attribute must be a \
                                 numeric scalar, a numeric vector or a struct, but has type {}",
                                self.ty_name(member.ty)
                            ),
                        );
                        return;
                    }
                } else if !member_ty.is_numeric_scalar_or_vector(cx) {
                    self.add_error(
                        anchor,
                        format!(
                            "{kind} struct member with a location attribute must be a numeric \
                             scalar or vector, but has type {}",
                            self.ty_name(member.ty)
                        ),
                    );
                    return;
                }
            }

            if caps.contains(Capability::MslAllowEntryPointInterface)
                && member.ty.memory_view(cx).is_some_and(|mv| mv.addr_space == AddrSpace::Workgroup)
            {
                member_annotations.insert(IOAnnotation::Workgroup);
            }

            if member_annotations.is_empty() {
                self.add_error(
                    anchor,
                    format!(
                        "{kind} struct members must have at least one IO annotation, e.g. a \
                         binding point, a location, etc"
                    ),
                );
            } else if member_annotations.len() > 1 {
                self.add_error(
                    anchor,
                    format!(
                        "{kind} struct member has more than one IO annotation, {}",
                        list(&member_annotations)
                    ),
                );
            }
        }
    }

    pub(super) fn check_front_facing_if_bool(
        &mut self,
        anchor: DiagAnchor,
        ty: Type,
        attrs: &IOAttributes,
        message: &str,
    ) {
        if ty.is_bool(self.cx) && attrs.builtin != Some(BuiltinValue::FrontFacing) {
            self.add_error(anchor, message);
        }
    }

    pub(super) fn check_not_bool(&mut self, anchor: DiagAnchor, ty: Type, message: &str) {
        if ty.is_bool(self.cx) {
            self.add_error(anchor, message);
        }
    }

    /// Vertex shaders must output `@builtin(position)`, either from their
    /// return value, or through a module-scope variable.
    pub(super) fn check_position_present_for_vertex_output(&mut self, func: Func) {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];

        if is_position_present(cx, &func_decl.ret_attrs, func_decl.ret_type) {
            return;
        }

        let present_in_var = self.transitive_vars(func).iter().any(|&var| {
            let InstKind::Var { attrs } = &module.insts[var].kind else {
                return false;
            };
            module
                .result(var)
                .map(|r| module.inst_results[r].ty.unwrap_ptr_or_ref(cx))
                .is_some_and(|ty| is_position_present(cx, attrs, ty))
        });
        if !present_in_var {
            self.add_error(
                DiagAnchor::Func(func),
                "position must be declared for vertex entry point output",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_a_checker() {
        for &builtin in BuiltinValue::ALL {
            assert!(BUILTIN_CHECKERS.contains_key(&builtin), "missing checker for {builtin}");
        }
    }

    #[test]
    fn clip_distances_checker_follows_capabilities() {
        let cx = Context::new();
        let f32_ = cx.ty_f32();
        let vec4 = cx.ty_vec(f32_, 4);
        let arr = cx.ty_array(f32_, 4);

        let strict = builtin_checker(BuiltinValue::ClipDistances, Capabilities::NONE);
        assert!((strict.type_check)(&cx, arr));
        assert!(!(strict.type_check)(&cx, f32_));
        assert!(!(strict.type_check)(&cx, cx.ty_array(f32_, 9)));

        let scalar_and_vector = builtin_checker(
            BuiltinValue::ClipDistances,
            Capability::AllowClipDistancesOnF32ScalarAndVector.into(),
        );
        assert!((scalar_and_vector.type_check)(&cx, f32_));
        assert!((scalar_and_vector.type_check)(&cx, vec4));
    }

    #[test]
    fn usage_messages_list_alternatives() {
        assert_eq!(
            list(BUILTIN_CHECKERS[&BuiltinValue::Position].valid_usages),
            "[ vertex shader output, fragment shader input ]"
        );
        let mut annotations = BTreeSet::new();
        add_io_annotations(&mut annotations, &IOAttributes::location(1)).unwrap();
        assert_eq!(
            add_io_annotations(&mut annotations, &IOAttributes::location(2)),
            Err(IOAnnotation::Location)
        );
    }

    #[test]
    fn walk_visits_nested_struct_members_through_arrays() {
        let cx = Context::new();
        let f32_ = cx.ty_f32();
        let inner = cx.ty_struct("Inner", [(cx.intern("a"), f32_, IOAttributes::location(0))]);
        let outer = cx.ty_struct(
            "Outer",
            [
                (cx.intern("inner"), cx.ty_array(inner, 2), IOAttributes::default()),
                (cx.intern("pos"), cx.ty_vec(f32_, 4), IOAttributes::builtin(BuiltinValue::Position)),
            ],
        );
        let attrs = IOAttributes::default();
        let walked = walk_type_and_members(&cx, outer, &attrs);
        assert_eq!(walked.len(), 4);
        assert_eq!(walked[2].1.location, Some(0));
        assert!(is_position_present(&cx, &attrs, outer));
    }
}
