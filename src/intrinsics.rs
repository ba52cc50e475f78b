//! Intrinsic overload tables: operators, conversions, vector/matrix
//! constructors and builtin functions.
//!
//! Lookups take argument types and either produce the result type (and, for
//! builtin functions, extra information about the matched overload), or an
//! error message describing the failed match.

use crate::{AddrSpace, Access, ArrayCount, Context, PipelineStage, TextureDim, Type, TypeKind};
use arrayvec::ArrayVec;
use itertools::Itertools;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negation,
    Complement,
    Not,
}

impl UnaryOp {
    /// Name used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Negation => "negation",
            UnaryOp::Complement => "complement",
            UnaryOp::Not => "not",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negation => "-",
            UnaryOp::Complement => "~",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    ShiftLeft,
    ShiftRight,

    /// Short-circuiting operators, which only exist before lowering to
    /// control-flow, and are never valid in the IR.
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// Name used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
            BinaryOp::Modulo => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Equal => "eq",
            BinaryOp::NotEqual => "neq",
            BinaryOp::LessThan => "lt",
            BinaryOp::GreaterThan => "gt",
            BinaryOp::LessThanEqual => "lte",
            BinaryOp::GreaterThanEqual => "gte",
            BinaryOp::ShiftLeft => "shl",
            BinaryOp::ShiftRight => "shr",
            BinaryOp::LogicalAnd => "logical-and",
            BinaryOp::LogicalOr => "logical-or",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
            BinaryOp::LessThanEqual => "<=",
            BinaryOp::GreaterThanEqual => ">=",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }
}

fn type_list(cx: &Context, tys: &[Type]) -> String {
    tys.iter().map(|ty| ty.name(cx)).join(", ")
}

pub fn lookup_unary(cx: &Context, op: UnaryOp, ty: Type) -> Result<Type, String> {
    let elem = ty.scalar_or_vector_elem(cx);
    let ok = match op {
        UnaryOp::Negation => elem.is_signed_integer_scalar(cx) || elem.is_float_scalar(cx),
        UnaryOp::Complement => elem.is_integer_scalar(cx),
        UnaryOp::Not => elem.is_bool(cx),
    };
    if ok && ty.is_scalar(cx) == (elem == ty) {
        Ok(ty)
    } else {
        Err(format!("no matching overload for 'operator {} ({})'", op.symbol(), ty.name(cx)))
    }
}

pub fn lookup_binary(cx: &Context, op: BinaryOp, lhs: Type, rhs: Type) -> Result<Type, String> {
    binary_result(cx, op, lhs, rhs).ok_or_else(|| {
        format!(
            "no matching overload for 'operator {} ({})'",
            op.symbol(),
            type_list(cx, &[lhs, rhs])
        )
    })
}

fn binary_result(cx: &Context, op: BinaryOp, lhs: Type, rhs: Type) -> Option<Type> {
    let (l_elem, r_elem) = (lhs.scalar_or_vector_elem(cx), rhs.scalar_or_vector_elem(cx));
    let (l_width, r_width) = (lhs.vector_width(cx), rhs.vector_width(cx));
    let scalar_or_vector = |ty: Type| ty.is_scalar(cx) || ty.vector_width(cx).is_some();
    if !scalar_or_vector(lhs) || !scalar_or_vector(rhs) {
        return matrix_arith_result(cx, op, lhs, rhs);
    }

    let bool_result = |width: Option<u32>| {
        let b = cx.ty_bool();
        width.map_or(b, |w| cx.ty_vec(b, w))
    };

    match op {
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => {
            if l_elem != r_elem || !l_elem.is_numeric_scalar(cx) {
                return None;
            }
            // Mixed scalar/vector arithmetic splats the scalar side.
            match (l_width, r_width) {
                (Some(l), Some(r)) if l != r => None,
                (Some(_), _) => Some(lhs),
                (None, _) => Some(rhs),
            }
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            let valid_elem = l_elem.is_integer_scalar(cx)
                || (op != BinaryOp::Xor && l_elem.is_bool(cx));
            (lhs == rhs && valid_elem).then_some(lhs)
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            (lhs == rhs && l_elem.is_scalar(cx)).then(|| bool_result(l_width))
        }
        BinaryOp::LessThan
        | BinaryOp::GreaterThan
        | BinaryOp::LessThanEqual
        | BinaryOp::GreaterThanEqual => {
            (lhs == rhs && l_elem.is_numeric_scalar(cx)).then(|| bool_result(l_width))
        }
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            let valid = l_elem.is_integer_scalar(cx)
                && matches!(cx[r_elem].kind, TypeKind::U32)
                && l_width == r_width;
            valid.then_some(lhs)
        }
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            (lhs == rhs && lhs.is_bool(cx)).then_some(lhs)
        }
    }
}

/// Matrix arithmetic: `+`/`-` between identical matrices, and the linear
/// algebra forms of `*` (scalar, vector and matrix products).
fn matrix_arith_result(cx: &Context, op: BinaryOp, lhs: Type, rhs: Type) -> Option<Type> {
    let as_matrix = |ty: Type| match cx[ty].kind {
        TypeKind::Matrix { column, columns } => {
            let (elem, rows) = column.elements(cx);
            Some((elem?, columns, rows))
        }
        _ => None,
    };
    match (op, as_matrix(lhs), as_matrix(rhs)) {
        (BinaryOp::Add | BinaryOp::Subtract, Some(_), Some(_)) => (lhs == rhs).then_some(lhs),
        (BinaryOp::Multiply, Some((le, lc, lr)), Some((re, rc, rr))) => {
            (le == re && lc == rr).then(|| cx.ty_mat(le, rc, lr))
        }
        (BinaryOp::Multiply, Some((elem, columns, rows)), None) => {
            if rhs == elem {
                Some(lhs)
            } else if rhs == cx.ty_vec(elem, columns) {
                Some(cx.ty_vec(elem, rows))
            } else {
                None
            }
        }
        (BinaryOp::Multiply, None, Some((elem, columns, rows))) => {
            if lhs == elem {
                Some(rhs)
            } else if lhs == cx.ty_vec(elem, rows) {
                Some(cx.ty_vec(elem, columns))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_convertible_scalar(cx: &Context, ty: Type) -> bool {
    matches!(
        cx[ty].kind,
        TypeKind::I32 | TypeKind::U32 | TypeKind::F32 | TypeKind::F16 | TypeKind::Bool
    )
}

/// Whether `convert` can produce `to` from a value of type `from` (value
/// conversions only, i.e. never the identity).
pub fn has_converter(cx: &Context, to: Type, from: Type) -> bool {
    if to == from {
        return false;
    }
    match (&cx[to].kind, &cx[from].kind) {
        (
            &TypeKind::Vector { elem: to_elem, width: to_width },
            &TypeKind::Vector { elem: from_elem, width: from_width },
        ) => {
            to_width == from_width
                && is_convertible_scalar(cx, to_elem)
                && is_convertible_scalar(cx, from_elem)
        }
        (
            &TypeKind::Matrix { column: to_column, columns: to_columns },
            &TypeKind::Matrix { column: from_column, columns: from_columns },
        ) => {
            to_columns == from_columns
                && to_column.vector_width(cx) == from_column.vector_width(cx)
                && to_column.is_float_vector(cx)
                && from_column.is_float_vector(cx)
        }
        _ => is_convertible_scalar(cx, to) && is_convertible_scalar(cx, from),
    }
}

/// Whether `construct` arguments `args` can build `vec`: a single scalar
/// (splat), or scalars and vectors (of the same element type) whose total
/// component count is the vector width.
pub fn vector_ctor_matches(cx: &Context, vec: Type, args: &[Type]) -> bool {
    let (Some(elem), Some(width)) = (vec.vector_elem(cx), vec.vector_width(cx)) else {
        return false;
    };
    if args.iter().any(|&arg| arg.scalar_or_vector_elem(cx) != elem) {
        return false;
    }
    if let [arg] = args {
        if *arg == elem {
            return true;
        }
    }
    let components: u32 = args.iter().map(|&arg| arg.vector_width(cx).unwrap_or(1)).sum();
    components == width
}

/// Whether `construct` arguments `args` can build `mat`: either one column
/// vector per column, one scalar per element, or an identical matrix.
pub fn matrix_ctor_matches(cx: &Context, mat: Type, args: &[Type]) -> bool {
    let TypeKind::Matrix { column, columns } = cx[mat].kind else {
        return false;
    };
    let (Some(elem), rows) = column.elements(cx) else {
        return false;
    };
    if let [arg] = args {
        if *arg == mat {
            return true;
        }
    }
    let n = args.len() as u32;
    (n == columns && args.iter().all(|&arg| arg == column))
        || (n == columns * rows && args.iter().all(|&arg| arg == elem))
}

/// Set of pipeline stages an intrinsic may be used from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SupportedStages(u8);

impl SupportedStages {
    pub const VERTEX: Self = SupportedStages(1 << 0);
    pub const FRAGMENT: Self = SupportedStages(1 << 1);
    pub const COMPUTE: Self = SupportedStages(1 << 2);
    pub const ALL: Self = SupportedStages(0b111);

    pub const fn union(self, other: Self) -> Self {
        SupportedStages(self.0 | other.0)
    }

    pub fn contains(self, stage: PipelineStage) -> bool {
        let bit = match stage {
            PipelineStage::Vertex => Self::VERTEX.0,
            PipelineStage::Fragment => Self::FRAGMENT.0,
            PipelineStage::Compute => Self::COMPUTE.0,
            PipelineStage::Undefined => return true,
        };
        self.0 & bit != 0
    }
}

/// Special roles of builtin function parameters, which come with extra
/// (constant value) requirements on the arguments passed to them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamUsage {
    Value,
    /// Texture gather component, a constant in `[0, 3]`.
    Component,
    /// Texel offset, with constant components in `[-8, 7]`.
    Offset,
}

/// A successfully matched builtin function overload.
#[derive(Clone, Debug)]
pub struct Overload {
    pub return_type: Type,
    pub params: ArrayVec<ParamUsage, 5>,
    pub stages: SupportedStages,
}

macro_rules! builtin_fns {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Builtin functions callable via [`InstKind::BuiltinCall`](crate::InstKind::BuiltinCall).
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum BuiltinFn {
            $($variant),+
        }

        impl BuiltinFn {
            pub const ALL: &'static [BuiltinFn] = &[$(BuiltinFn::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(BuiltinFn::$variant => $name),+
                }
            }
        }
    };
}

builtin_fns! {
    Abs => "abs",
    Min => "min",
    Max => "max",
    Clamp => "clamp",
    Select => "select",
    Dot => "dot",
    Cross => "cross",
    Length => "length",
    Normalize => "normalize",
    Sqrt => "sqrt",
    Floor => "floor",
    Ceil => "ceil",
    Fract => "fract",
    Sin => "sin",
    Cos => "cos",
    Exp => "exp",
    Pow => "pow",
    Mix => "mix",
    ArrayLength => "arrayLength",
    Dpdx => "dpdx",
    Dpdy => "dpdy",
    Fwidth => "fwidth",
    TextureSample => "textureSample",
    TextureGather => "textureGather",
    TextureLoad => "textureLoad",
    TextureDimensions => "textureDimensions",
    WorkgroupBarrier => "workgroupBarrier",
    StorageBarrier => "storageBarrier",
    SubgroupBallot => "subgroupBallot",
    SubgroupBroadcast => "subgroupBroadcast",
    QuadBroadcast => "quadBroadcast",
    AtomicLoad => "atomicLoad",
    AtomicStore => "atomicStore",
    AtomicAdd => "atomicAdd",
}

/// Resolve the overload of `f` matching `args`, returning the
/// "no matching call" error otherwise.
pub fn lookup_builtin(cx: &Context, f: BuiltinFn, args: &[Type]) -> Result<Overload, String> {
    match_builtin(cx, f, args)
        .ok_or_else(|| format!("no matching call to '{}({})'", f.name(), type_list(cx, args)))
}

fn match_builtin(cx: &Context, f: BuiltinFn, args: &[Type]) -> Option<Overload> {
    use ParamUsage::Value as V;

    let overload = |return_type: Type, params: &[ParamUsage], stages: SupportedStages| Overload {
        return_type,
        params: params.iter().copied().collect(),
        stages,
    };
    let fragment_and_compute = SupportedStages::FRAGMENT.union(SupportedStages::COMPUTE);
    let float_sv = |ty: Type| ty.is_float_scalar_or_vector(cx) && !ty.is_abstract(cx);
    let numeric_sv = |ty: Type| ty.is_numeric_scalar_or_vector(cx) && !ty.is_abstract(cx);
    let is_u32_or_i32 = |ty: Type| matches!(cx[ty].kind, TypeKind::I32 | TypeKind::U32);
    let vec2_f32 = cx.ty_vec(cx.ty_f32(), 2);
    let vec2_i32 = cx.ty_vec(cx.ty_i32(), 2);
    let vec4 = |elem: Type| cx.ty_vec(elem, 4);

    match (f, args) {
        (BuiltinFn::Abs, &[t]) if numeric_sv(t) => Some(overload(t, &[V], SupportedStages::ALL)),
        (BuiltinFn::Min | BuiltinFn::Max, &[a, b]) if a == b && numeric_sv(a) => {
            Some(overload(a, &[V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Clamp, &[a, b, c]) if a == b && b == c && numeric_sv(a) => {
            Some(overload(a, &[V, V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Select, &[a, b, cond]) if a == b && (a.is_scalar(cx) || a.vector_width(cx).is_some()) => {
            let cond_ok = cond.is_bool(cx)
                || (cond.is_bool_scalar_or_vector(cx) && cond.vector_width(cx) == a.vector_width(cx));
            cond_ok.then(|| overload(a, &[V, V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Dot, &[a, b]) if a == b && a.vector_width(cx).is_some() && numeric_sv(a) => {
            Some(overload(a.scalar_or_vector_elem(cx), &[V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Cross, &[a, b]) if a == b && a.is_float_vector(cx) && a.vector_width(cx) == Some(3) => {
            Some(overload(a, &[V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Length, &[t]) if float_sv(t) => {
            Some(overload(t.scalar_or_vector_elem(cx), &[V], SupportedStages::ALL))
        }
        (BuiltinFn::Normalize, &[t]) if t.is_float_vector(cx) => {
            Some(overload(t, &[V], SupportedStages::ALL))
        }
        (
            BuiltinFn::Sqrt
            | BuiltinFn::Floor
            | BuiltinFn::Ceil
            | BuiltinFn::Fract
            | BuiltinFn::Sin
            | BuiltinFn::Cos
            | BuiltinFn::Exp,
            &[t],
        ) if float_sv(t) => Some(overload(t, &[V], SupportedStages::ALL)),
        (BuiltinFn::Pow, &[a, b]) if a == b && float_sv(a) => {
            Some(overload(a, &[V, V], SupportedStages::ALL))
        }
        (BuiltinFn::Mix, &[a, b, t]) if a == b && float_sv(a) => {
            (t == a || t == a.scalar_or_vector_elem(cx))
                .then(|| overload(a, &[V, V, V], SupportedStages::ALL))
        }
        (BuiltinFn::ArrayLength, &[ptr]) => match cx[ptr].kind {
            TypeKind::Pointer(mv)
                if mv.addr_space == AddrSpace::Storage
                    && matches!(
                        cx[mv.store].kind,
                        TypeKind::Array { count: ArrayCount::Runtime, .. }
                    ) =>
            {
                Some(overload(cx.ty_u32(), &[V], SupportedStages::ALL))
            }
            _ => None,
        },
        (BuiltinFn::Dpdx | BuiltinFn::Dpdy | BuiltinFn::Fwidth, &[t])
            if t.scalar_or_vector_elem(cx) == cx.ty_f32() =>
        {
            Some(overload(t, &[V], SupportedStages::FRAGMENT))
        }
        (BuiltinFn::TextureSample, [texture, sampler, coords, offset @ ..]) => {
            if !matches!(cx[*sampler].kind, TypeKind::Sampler { comparison: false }) {
                return None;
            }
            let (result, coords_ty, offset_ty) = match cx[*texture].kind {
                TypeKind::SampledTexture { dim, sample } if sample == cx.ty_f32() => {
                    let (coords, offset) = texture_coords(cx, dim)?;
                    (vec4(sample), coords, offset)
                }
                TypeKind::DepthTexture { dim } => {
                    let (coords, offset) = texture_coords(cx, dim)?;
                    (cx.ty_f32(), coords, offset)
                }
                _ => return None,
            };
            if *coords != coords_ty {
                return None;
            }
            match offset {
                [] => Some(overload(result, &[V, V, V], SupportedStages::FRAGMENT)),
                [offset] if Some(*offset) == offset_ty => Some(overload(
                    result,
                    &[V, V, V, ParamUsage::Offset],
                    SupportedStages::FRAGMENT,
                )),
                _ => None,
            }
        }
        (BuiltinFn::TextureGather, args) => {
            let (component, rest) = match args {
                [component, rest @ ..] if is_u32_or_i32(*component) => (true, rest),
                _ => (false, args),
            };
            let [texture, sampler, coords, offset @ ..] = rest else {
                return None;
            };
            if !matches!(cx[*sampler].kind, TypeKind::Sampler { comparison: false })
                || *coords != vec2_f32
            {
                return None;
            }
            let result = match cx[*texture].kind {
                TypeKind::SampledTexture { dim: TextureDim::D2, sample } if component => {
                    vec4(sample)
                }
                TypeKind::DepthTexture { dim: TextureDim::D2 } if !component => {
                    vec4(cx.ty_f32())
                }
                _ => return None,
            };
            let mut params: ArrayVec<ParamUsage, 5> = ArrayVec::new();
            if component {
                params.push(ParamUsage::Component);
            }
            params.extend([V, V, V]);
            match offset {
                [] => {}
                [offset] if *offset == vec2_i32 => params.push(ParamUsage::Offset),
                _ => return None,
            }
            Some(Overload { return_type: result, params, stages: SupportedStages::ALL })
        }
        (BuiltinFn::TextureLoad, &[texture, coords, level]) => {
            let TypeKind::SampledTexture { dim: TextureDim::D2, sample } = cx[texture].kind
            else {
                return None;
            };
            let coords_ok = coords.vector_width(cx) == Some(2)
                && is_u32_or_i32(coords.scalar_or_vector_elem(cx));
            (coords_ok && is_u32_or_i32(level))
                .then(|| overload(vec4(sample), &[V, V, V], SupportedStages::ALL))
        }
        (BuiltinFn::TextureDimensions, [texture, level @ ..]) if texture.is_texture(cx) => {
            let dims = match cx[*texture].kind {
                TypeKind::SampledTexture { dim, .. }
                | TypeKind::DepthTexture { dim }
                | TypeKind::MultisampledTexture { dim, .. }
                | TypeKind::StorageTexture { dim, .. } => match dim {
                    TextureDim::D1 => 1,
                    TextureDim::D3 => 3,
                    _ => 2,
                },
                _ => 2,
            };
            let result = cx.ty_match_width(cx.ty_u32(), dims);
            match level {
                [] => Some(overload(result, &[V], SupportedStages::ALL)),
                [level] if is_u32_or_i32(*level) => {
                    Some(overload(result, &[V, V], SupportedStages::ALL))
                }
                _ => None,
            }
        }
        (BuiltinFn::WorkgroupBarrier | BuiltinFn::StorageBarrier, []) => {
            Some(overload(cx.ty_void(), &[], SupportedStages::COMPUTE))
        }
        (BuiltinFn::SubgroupBallot, &[pred]) if pred.is_bool(cx) => {
            Some(overload(vec4(cx.ty_u32()), &[V], fragment_and_compute))
        }
        (BuiltinFn::SubgroupBroadcast | BuiltinFn::QuadBroadcast, &[value, id])
            if numeric_sv(value) && is_u32_or_i32(id) =>
        {
            Some(overload(value, &[V, V], fragment_and_compute))
        }
        (BuiltinFn::AtomicLoad | BuiltinFn::AtomicStore | BuiltinFn::AtomicAdd, [ptr, rest @ ..]) => {
            let TypeKind::Pointer(mv) = cx[*ptr].kind else {
                return None;
            };
            let TypeKind::Atomic(elem) = cx[mv.store].kind else {
                return None;
            };
            if !matches!(mv.addr_space, AddrSpace::Storage | AddrSpace::Workgroup)
                || mv.access != Access::ReadWrite
            {
                return None;
            }
            match (f, rest) {
                (BuiltinFn::AtomicLoad, []) => Some(overload(elem, &[V], SupportedStages::ALL)),
                (BuiltinFn::AtomicStore, &[value]) if value == elem => {
                    Some(overload(cx.ty_void(), &[V, V], SupportedStages::ALL))
                }
                (BuiltinFn::AtomicAdd, &[value]) if value == elem => {
                    Some(overload(elem, &[V, V], SupportedStages::ALL))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Coordinate type, and (optional) offset type, for sampling a texture of
/// dimension `dim`.
fn texture_coords(cx: &Context, dim: TextureDim) -> Option<(Type, Option<Type>)> {
    let (f32, i32) = (cx.ty_f32(), cx.ty_i32());
    Some(match dim {
        TextureDim::D1 => (f32, None),
        TextureDim::D2 => (cx.ty_vec(f32, 2), Some(cx.ty_vec(i32, 2))),
        TextureDim::D3 => (cx.ty_vec(f32, 3), Some(cx.ty_vec(i32, 3))),
        TextureDim::Cube => (cx.ty_vec(f32, 3), None),
        TextureDim::D2Array | TextureDim::CubeArray => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_splats_scalars() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        let v3 = cx.ty_vec(f32, 3);
        assert_eq!(lookup_binary(&cx, BinaryOp::Multiply, v3, f32), Ok(v3));
        assert_eq!(lookup_binary(&cx, BinaryOp::Add, f32, v3), Ok(v3));
        assert_eq!(
            lookup_binary(&cx, BinaryOp::Add, f32, cx.ty_i32()).unwrap_err(),
            "no matching overload for 'operator + (f32, i32)'"
        );
    }

    #[test]
    fn comparisons_produce_bools() {
        let cx = Context::new();
        let v2 = cx.ty_vec(cx.ty_u32(), 2);
        assert_eq!(
            lookup_binary(&cx, BinaryOp::LessThan, v2, v2),
            Ok(cx.ty_vec(cx.ty_bool(), 2))
        );
    }

    #[test]
    fn matrix_vector_product() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        let mat = cx.ty_mat(f32, 4, 3);
        assert_eq!(
            lookup_binary(&cx, BinaryOp::Multiply, mat, cx.ty_vec(f32, 4)),
            Ok(cx.ty_vec(f32, 3))
        );
    }

    #[test]
    fn negation_of_unsigned_is_rejected() {
        let cx = Context::new();
        assert!(lookup_unary(&cx, UnaryOp::Negation, cx.ty_u32()).is_err());
        assert_eq!(lookup_unary(&cx, UnaryOp::Complement, cx.ty_u32()), Ok(cx.ty_u32()));
    }

    #[test]
    fn texture_gather_parameter_usages() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        let texture = cx.ty_sampled_texture(TextureDim::D2, f32);
        let args = [
            cx.ty_i32(),
            texture,
            cx.ty_sampler(),
            cx.ty_vec(f32, 2),
            cx.ty_vec(cx.ty_i32(), 2),
        ];
        let overload = lookup_builtin(&cx, BuiltinFn::TextureGather, &args).unwrap();
        assert_eq!(overload.return_type, cx.ty_vec(f32, 4));
        assert_eq!(overload.params[0], ParamUsage::Component);
        assert_eq!(overload.params[4], ParamUsage::Offset);
    }

    #[test]
    fn derivatives_are_fragment_only() {
        let cx = Context::new();
        let overload = lookup_builtin(&cx, BuiltinFn::Dpdx, &[cx.ty_f32()]).unwrap();
        assert!(overload.stages.contains(PipelineStage::Fragment));
        assert!(!overload.stages.contains(PipelineStage::Compute));
        assert_eq!(
            lookup_builtin(&cx, BuiltinFn::Dpdx, &[cx.ty_bool()]).unwrap_err(),
            "no matching call to 'dpdx(bool)'"
        );
    }

    #[test]
    fn conversions_and_constructors() {
        let cx = Context::new();
        let (f32, i32) = (cx.ty_f32(), cx.ty_i32());
        assert!(has_converter(&cx, f32, i32));
        assert!(!has_converter(&cx, f32, f32));
        assert!(has_converter(&cx, cx.ty_vec(f32, 3), cx.ty_vec(i32, 3)));
        assert!(!has_converter(&cx, cx.ty_vec(f32, 3), cx.ty_vec(i32, 2)));

        let v4 = cx.ty_vec(f32, 4);
        assert!(vector_ctor_matches(&cx, v4, &[f32]));
        assert!(vector_ctor_matches(&cx, v4, &[cx.ty_vec(f32, 2), f32, f32]));
        assert!(!vector_ctor_matches(&cx, v4, &[f32, f32]));
        assert!(!vector_ctor_matches(&cx, v4, &[i32]));

        let mat = cx.ty_mat(f32, 2, 2);
        assert!(matrix_ctor_matches(&cx, mat, &[cx.ty_vec(f32, 2); 2]));
        assert!(matrix_ctor_matches(&cx, mat, &[f32; 4]));
    }
}
