//! Type and constant constructors (on [`Context`]), and type queries
//! (layout, constructibility, friendly names, etc.).

use crate::io::IOAttributes;
use crate::{
    Access, AddrSpace, ArrayCount, Const, ConstDef, ConstKind, Context, InternedStr, MemoryView,
    PipelineStage, StructDef, StructMember, SubgroupMatrixKind, TexelFormat, TextureDim, Type,
    TypeKind,
};
use smallvec::SmallVec;
use std::fmt;

/// Rounds `value` up to the nearest multiple of `align` (with `0` treated as `1`).
pub fn round_up(align: u32, value: u32) -> u32 {
    if align == 0 { value } else { value.div_ceil(align) * align }
}

impl Context {
    pub fn ty_void(&self) -> Type {
        self.intern(TypeKind::Void)
    }
    pub fn ty_bool(&self) -> Type {
        self.intern(TypeKind::Bool)
    }
    pub fn ty_i8(&self) -> Type {
        self.intern(TypeKind::I8)
    }
    pub fn ty_u8(&self) -> Type {
        self.intern(TypeKind::U8)
    }
    pub fn ty_i32(&self) -> Type {
        self.intern(TypeKind::I32)
    }
    pub fn ty_u32(&self) -> Type {
        self.intern(TypeKind::U32)
    }
    pub fn ty_i64(&self) -> Type {
        self.intern(TypeKind::I64)
    }
    pub fn ty_u64(&self) -> Type {
        self.intern(TypeKind::U64)
    }
    pub fn ty_f16(&self) -> Type {
        self.intern(TypeKind::F16)
    }
    pub fn ty_f32(&self) -> Type {
        self.intern(TypeKind::F32)
    }

    pub fn ty_vec(&self, elem: Type, width: u32) -> Type {
        self.intern(TypeKind::Vector { elem, width })
    }

    /// `matCxR<elem>`, i.e. `columns` column vectors of `rows` elements.
    pub fn ty_mat(&self, elem: Type, columns: u32, rows: u32) -> Type {
        let column = self.ty_vec(elem, rows);
        self.intern(TypeKind::Matrix { column, columns })
    }

    /// Scalar `elem` when `width == 1`, `vecN<elem>` otherwise.
    pub fn ty_match_width(&self, elem: Type, width: u32) -> Type {
        if width == 1 { elem } else { self.ty_vec(elem, width) }
    }

    /// Fixed-size array, with the implicit (WGSL) stride.
    pub fn ty_array(&self, elem: Type, count: u32) -> Type {
        let stride = elem.implicit_stride(self);
        self.intern(TypeKind::Array { elem, count: ArrayCount::Constant(count), stride })
    }

    pub fn ty_runtime_array(&self, elem: Type) -> Type {
        let stride = elem.implicit_stride(self);
        self.intern(TypeKind::Array { elem, count: ArrayCount::Runtime, stride })
    }

    pub fn ty_atomic(&self, elem: Type) -> Type {
        self.intern(TypeKind::Atomic(elem))
    }

    pub fn ty_ptr(&self, addr_space: AddrSpace, store: Type, access: Access) -> Type {
        self.intern(TypeKind::Pointer(MemoryView { addr_space, store, access }))
    }

    pub fn ty_ref(&self, addr_space: AddrSpace, store: Type, access: Access) -> Type {
        self.intern(TypeKind::Reference(MemoryView { addr_space, store, access }))
    }

    pub fn ty_sampler(&self) -> Type {
        self.intern(TypeKind::Sampler { comparison: false })
    }

    pub fn ty_sampled_texture(&self, dim: TextureDim, sample: Type) -> Type {
        self.intern(TypeKind::SampledTexture { dim, sample })
    }

    pub fn ty_function(&self) -> Type {
        self.intern(TypeKind::Function)
    }

    /// Struct with members laid out according to the WGSL rules (each member
    /// at the next offset aligned to its type's alignment).
    pub fn ty_struct(
        &self,
        name: &str,
        members: impl IntoIterator<Item = (InternedStr, Type, IOAttributes)>,
    ) -> Type {
        let mut offset = 0;
        let mut struct_align = 1;
        let members: Vec<_> = members
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty, attrs))| {
                let (size, align) = (ty.size(self), ty.align(self));
                let member_offset = round_up(align, offset);
                offset = member_offset + size;
                struct_align = struct_align.max(align);
                StructMember {
                    name,
                    ty,
                    index: i as u32,
                    offset: member_offset,
                    size,
                    align,
                    attrs,
                    row_major: false,
                    matrix_stride: None,
                }
            })
            .collect();
        self.intern(TypeKind::Struct(StructDef {
            name: self.intern(name),
            members,
            size: round_up(struct_align, offset),
            align: struct_align,
        }))
    }

    /// Struct with members at the given offsets (which must be increasing,
    /// and aligned for their types), padded to its alignment.
    pub fn ty_struct_at_offsets(
        &self,
        name: &str,
        members: impl IntoIterator<Item = (InternedStr, Type, u32)>,
    ) -> Type {
        let mut end = 0;
        let mut struct_align = 1;
        let members: Vec<_> = members
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty, offset))| {
                let (size, align) = (ty.size(self), ty.align(self));
                end = offset + size;
                struct_align = struct_align.max(align);
                StructMember {
                    name,
                    ty,
                    index: i as u32,
                    offset,
                    size,
                    align,
                    attrs: IOAttributes::default(),
                    row_major: false,
                    matrix_stride: None,
                }
            })
            .collect();
        self.intern(TypeKind::Struct(StructDef {
            name: self.intern(name),
            members,
            size: round_up(struct_align, end),
            align: struct_align,
        }))
    }

    pub fn const_bool(&self, v: bool) -> Const {
        self.intern(ConstDef { ty: self.ty_bool(), kind: ConstKind::Bool(v) })
    }
    pub fn const_i32(&self, v: i32) -> Const {
        self.intern(ConstDef { ty: self.ty_i32(), kind: ConstKind::I32(v) })
    }
    pub fn const_u32(&self, v: u32) -> Const {
        self.intern(ConstDef { ty: self.ty_u32(), kind: ConstKind::U32(v) })
    }
    pub fn const_f32(&self, v: f32) -> Const {
        self.intern(ConstDef { ty: self.ty_f32(), kind: ConstKind::F32(v.to_bits()) })
    }

    pub fn const_zero(&self, ty: Type) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Zero })
    }

    pub fn const_splat(&self, ty: Type, elem: Const) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Splat(elem) })
    }

    pub fn const_composite(&self, ty: Type, elems: impl IntoIterator<Item = Const>) -> Const {
        self.intern(ConstDef { ty, kind: ConstKind::Composite(elems.into_iter().collect()) })
    }
}

impl Const {
    pub fn ty(self, cx: &Context) -> Type {
        cx[self].ty
    }

    /// Integer value of a scalar (integer, or `bool`) constant.
    pub fn as_i64(self, cx: &Context) -> Option<i64> {
        Some(match cx[self].kind {
            ConstKind::Bool(v) => v as i64,
            ConstKind::I8(v) => v.into(),
            ConstKind::U8(v) => v.into(),
            ConstKind::I32(v) => v.into(),
            ConstKind::U32(v) => v.into(),
            ConstKind::I64(v) => v,
            ConstKind::U64(v) => v as i64,
            ConstKind::Zero if cx[self].ty.is_integer_scalar(cx) => 0,
            _ => return None,
        })
    }

    /// Value of an integer scalar constant, truncated to `u32` (like
    /// reading the low bits of the value).
    pub fn as_u32(self, cx: &Context) -> Option<u32> {
        self.as_i64(cx).map(|v| v as u32)
    }

    /// Element `i` of a composite constant (with splats and zeros expanded).
    pub fn element(self, cx: &Context, i: u32) -> Option<Const> {
        let def = &cx[self];
        match &def.kind {
            ConstKind::Composite(elems) => elems.get(i as usize).copied(),
            &ConstKind::Splat(elem) => Some(elem),
            ConstKind::Zero => Some(cx.const_zero(def.ty.element(cx, i)?)),
            _ => None,
        }
    }

    /// Number of elements of a composite constant (`0` for scalars).
    pub fn num_elements(self, cx: &Context) -> u32 {
        let ty = cx[self].ty;
        match &cx[ty].kind {
            TypeKind::Struct(def) => def.members.len() as u32,
            _ => ty.elements(cx).1,
        }
    }
}

impl Type {
    pub fn kind(self, cx: &Context) -> &TypeKind {
        &cx[self].kind
    }

    pub fn is_void(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::Void)
    }

    pub fn is_bool(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::Bool)
    }

    pub fn is_scalar(self, cx: &Context) -> bool {
        matches!(
            cx[self].kind,
            TypeKind::Bool
                | TypeKind::I8
                | TypeKind::U8
                | TypeKind::I32
                | TypeKind::U32
                | TypeKind::I64
                | TypeKind::U64
                | TypeKind::F16
                | TypeKind::F32
                | TypeKind::AbstractInt
                | TypeKind::AbstractFloat
        )
    }

    pub fn is_signed_integer_scalar(self, cx: &Context) -> bool {
        matches!(
            cx[self].kind,
            TypeKind::I8 | TypeKind::I32 | TypeKind::I64 | TypeKind::AbstractInt
        )
    }

    pub fn is_unsigned_integer_scalar(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::U8 | TypeKind::U32 | TypeKind::U64)
    }

    pub fn is_integer_scalar(self, cx: &Context) -> bool {
        self.is_signed_integer_scalar(cx) || self.is_unsigned_integer_scalar(cx)
    }

    pub fn is_float_scalar(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::F16 | TypeKind::F32 | TypeKind::AbstractFloat)
    }

    pub fn is_numeric_scalar(self, cx: &Context) -> bool {
        self.is_integer_scalar(cx) || self.is_float_scalar(cx)
    }

    /// Element type, for vectors (`None` for everything else).
    pub fn vector_elem(self, cx: &Context) -> Option<Type> {
        match cx[self].kind {
            TypeKind::Vector { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn vector_width(self, cx: &Context) -> Option<u32> {
        match cx[self].kind {
            TypeKind::Vector { width, .. } => Some(width),
            _ => None,
        }
    }

    pub fn is_float_vector(self, cx: &Context) -> bool {
        self.vector_elem(cx).is_some_and(|e| e.is_float_scalar(cx))
    }

    pub fn is_unsigned_integer_vector(self, cx: &Context) -> bool {
        self.vector_elem(cx).is_some_and(|e| e.is_unsigned_integer_scalar(cx))
    }

    /// The type itself for scalars, or the element type for vectors.
    pub fn scalar_or_vector_elem(self, cx: &Context) -> Type {
        self.vector_elem(cx).unwrap_or(self)
    }

    pub fn is_integer_scalar_or_vector(self, cx: &Context) -> bool {
        self.scalar_or_vector_elem(cx).is_integer_scalar(cx)
    }

    pub fn is_float_scalar_or_vector(self, cx: &Context) -> bool {
        self.scalar_or_vector_elem(cx).is_float_scalar(cx)
    }

    pub fn is_bool_scalar_or_vector(self, cx: &Context) -> bool {
        self.scalar_or_vector_elem(cx).is_bool(cx)
    }

    pub fn is_numeric_scalar_or_vector(self, cx: &Context) -> bool {
        self.scalar_or_vector_elem(cx).is_numeric_scalar(cx)
    }

    pub fn is_abstract(self, cx: &Context) -> bool {
        match &cx[self].kind {
            TypeKind::AbstractInt | TypeKind::AbstractFloat => true,
            TypeKind::Vector { elem, .. } | TypeKind::Array { elem, .. } => elem.is_abstract(cx),
            TypeKind::Matrix { column, .. } => column.is_abstract(cx),
            _ => false,
        }
    }

    /// Opaque resource types, which can only live in the `handle` address space.
    pub fn is_handle(self, cx: &Context) -> bool {
        matches!(
            cx[self].kind,
            TypeKind::Sampler { .. }
                | TypeKind::SampledTexture { .. }
                | TypeKind::DepthTexture { .. }
                | TypeKind::MultisampledTexture { .. }
                | TypeKind::StorageTexture { .. }
                | TypeKind::ExternalTexture
                | TypeKind::InputAttachment { .. }
                | TypeKind::BindingArray { .. }
                | TypeKind::SampledImage { .. }
        )
    }

    pub fn is_texture(self, cx: &Context) -> bool {
        matches!(
            cx[self].kind,
            TypeKind::SampledTexture { .. }
                | TypeKind::DepthTexture { .. }
                | TypeKind::MultisampledTexture { .. }
                | TypeKind::StorageTexture { .. }
                | TypeKind::ExternalTexture
                | TypeKind::InputAttachment { .. }
        )
    }

    /// Only backend-specific types are not part of the core IR.
    pub fn is_core(self, cx: &Context) -> bool {
        !matches!(cx[self].kind, TypeKind::SampledImage { .. })
    }

    pub fn is_pointer(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::Pointer(_))
    }

    pub fn is_struct(self, cx: &Context) -> bool {
        matches!(cx[self].kind, TypeKind::Struct(_))
    }

    pub fn struct_def(self, cx: &Context) -> Option<&StructDef> {
        match &cx[self].kind {
            TypeKind::Struct(def) => Some(def),
            _ => None,
        }
    }

    /// Pointer or reference details (`None` for non-memory-view types).
    pub fn memory_view(self, cx: &Context) -> Option<MemoryView> {
        match cx[self].kind {
            TypeKind::Pointer(mv) | TypeKind::Reference(mv) => Some(mv),
            _ => None,
        }
    }

    pub fn unwrap_ptr_or_ref(self, cx: &Context) -> Type {
        self.memory_view(cx).map_or(self, |mv| mv.store)
    }

    pub fn unwrap_ptr(self, cx: &Context) -> Type {
        match cx[self].kind {
            TypeKind::Pointer(mv) => mv.store,
            _ => self,
        }
    }

    /// Uniform element type and element count of a composite type, with
    /// structs (having heterogeneous elements) reporting `None` as the type.
    pub fn elements(self, cx: &Context) -> (Option<Type>, u32) {
        match &cx[self].kind {
            &TypeKind::Vector { elem, width } => (Some(elem), width),
            &TypeKind::Matrix { column, columns } => (Some(column), columns),
            &TypeKind::Array { elem, count, .. } | &TypeKind::BindingArray { elem, count } => {
                let count = match count {
                    ArrayCount::Constant(count) => count,
                    ArrayCount::Runtime => 0,
                };
                (Some(elem), count)
            }
            TypeKind::Struct(def) => (None, def.members.len() as u32),
            _ => (None, 0),
        }
    }

    /// Type of element `i` of a composite type, if in bounds.
    pub fn element(self, cx: &Context, i: u32) -> Option<Type> {
        match &cx[self].kind {
            TypeKind::Struct(def) => def.members.get(i as usize).map(|m| m.ty),
            TypeKind::Array { elem, count: ArrayCount::Runtime, .. } => Some(*elem),
            _ => match self.elements(cx) {
                (Some(elem), count) if i < count => Some(elem),
                _ => None,
            },
        }
    }

    /// Innermost element type of nested arrays/vectors/matrices.
    pub fn deepest_element(self, cx: &Context) -> Type {
        let mut ty = self;
        while let (Some(elem), _) = ty.elements(cx) {
            ty = elem;
        }
        ty
    }

    pub fn size(self, cx: &Context) -> u32 {
        match &cx[self].kind {
            TypeKind::Bool | TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => 4,
            TypeKind::I8 | TypeKind::U8 => 1,
            TypeKind::F16 => 2,
            TypeKind::I64 | TypeKind::U64 => 8,
            &TypeKind::Vector { elem, width } => elem.size(cx) * width,
            &TypeKind::Matrix { column, columns } => column.implicit_stride(cx) * columns,
            &TypeKind::Array { count, stride, .. } => match count {
                ArrayCount::Constant(count) => stride * count,
                ArrayCount::Runtime => stride,
            },
            TypeKind::Struct(def) => def.size,
            &TypeKind::Atomic(elem) => elem.size(cx),
            _ => 0,
        }
    }

    pub fn align(self, cx: &Context) -> u32 {
        match &cx[self].kind {
            &TypeKind::Vector { elem, width } => elem.size(cx) * if width == 2 { 2 } else { 4 },
            &TypeKind::Matrix { column, .. } => column.align(cx),
            &TypeKind::Array { elem, .. } | &TypeKind::Atomic(elem) => elem.align(cx),
            TypeKind::Struct(def) => def.align,
            _ => self.size(cx),
        }
    }

    /// Array stride implied by the WGSL layout rules, for this element type.
    pub fn implicit_stride(self, cx: &Context) -> u32 {
        round_up(self.align(cx), self.size(cx))
    }

    /// Size of the last member of a struct needed to hold a value of this
    /// type (for runtime arrays, a single element).
    pub fn min_required_size(self, cx: &Context) -> u32 {
        match cx[self].kind {
            TypeKind::Array { count: ArrayCount::Runtime, stride, .. } => stride,
            _ => self.size(cx),
        }
    }

    pub fn is_constructible(self, cx: &Context) -> bool {
        match &cx[self].kind {
            TypeKind::Bool
            | TypeKind::I8
            | TypeKind::U8
            | TypeKind::I32
            | TypeKind::U32
            | TypeKind::I64
            | TypeKind::U64
            | TypeKind::F16
            | TypeKind::F32
            | TypeKind::Vector { .. }
            | TypeKind::Matrix { .. }
            | TypeKind::SubgroupMatrix { .. } => true,
            &TypeKind::Array { elem, count: ArrayCount::Constant(_), .. } => {
                elem.is_constructible(cx)
            }
            TypeKind::Struct(def) => def.members.iter().all(|m| m.ty.is_constructible(cx)),
            _ => false,
        }
    }

    pub fn is_host_shareable(self, cx: &Context) -> bool {
        match &cx[self].kind {
            TypeKind::I8
            | TypeKind::U8
            | TypeKind::I32
            | TypeKind::U32
            | TypeKind::I64
            | TypeKind::U64
            | TypeKind::F16
            | TypeKind::F32
            | TypeKind::Atomic(_) => true,
            &TypeKind::Vector { elem, .. } | &TypeKind::Array { elem, .. } => {
                elem.is_host_shareable(cx)
            }
            &TypeKind::Matrix { column, .. } => column.is_host_shareable(cx),
            TypeKind::Struct(def) => def.members.iter().all(|m| m.ty.is_host_shareable(cx)),
            _ => false,
        }
    }

    pub fn has_creation_fixed_footprint(self, cx: &Context) -> bool {
        match &cx[self].kind {
            TypeKind::Bool
            | TypeKind::I8
            | TypeKind::U8
            | TypeKind::I32
            | TypeKind::U32
            | TypeKind::I64
            | TypeKind::U64
            | TypeKind::F16
            | TypeKind::F32
            | TypeKind::Vector { .. }
            | TypeKind::Matrix { .. }
            | TypeKind::Atomic(_)
            | TypeKind::SubgroupMatrix { .. } => true,
            &TypeKind::Array { elem, count: ArrayCount::Constant(_), .. } => {
                elem.has_creation_fixed_footprint(cx)
            }
            TypeKind::Struct(def) => {
                def.members.iter().all(|m| m.ty.has_creation_fixed_footprint(cx))
            }
            _ => false,
        }
    }

    /// Human-readable (WGSL-like) name, e.g. `vec4<f32>` or `ptr<storage, u32, read>`.
    pub fn name(self, cx: &Context) -> String {
        TypeName(self, cx).to_string()
    }

    /// Direct component types (struct members, array/vector elements, etc.),
    /// used to walk types without recursing.
    pub fn components(self, cx: &Context) -> SmallVec<[Type; 4]> {
        match &cx[self].kind {
            TypeKind::Struct(def) => def.members.iter().map(|m| m.ty).collect(),
            _ => self.elements(cx).0.into_iter().collect(),
        }
    }
}

/// [`fmt::Display`] adapter for [`Type::name`].
pub struct TypeName<'a>(pub Type, pub &'a Context);

impl fmt::Display for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let &TypeName(ty, cx) = self;
        let name = |ty: Type| TypeName(ty, cx);
        match &cx[ty].kind {
            TypeKind::Void => f.write_str("void"),
            TypeKind::Bool => f.write_str("bool"),
            TypeKind::I8 => f.write_str("i8"),
            TypeKind::U8 => f.write_str("u8"),
            TypeKind::I32 => f.write_str("i32"),
            TypeKind::U32 => f.write_str("u32"),
            TypeKind::I64 => f.write_str("i64"),
            TypeKind::U64 => f.write_str("u64"),
            TypeKind::F16 => f.write_str("f16"),
            TypeKind::F32 => f.write_str("f32"),
            TypeKind::AbstractInt => f.write_str("abstract-int"),
            TypeKind::AbstractFloat => f.write_str("abstract-float"),
            &TypeKind::Vector { elem, width } => write!(f, "vec{width}<{}>", name(elem)),
            &TypeKind::Matrix { column, columns } => {
                let (elem, rows) = column.elements(cx);
                match elem {
                    Some(elem) => write!(f, "mat{columns}x{rows}<{}>", name(elem)),
                    None => write!(f, "mat{columns}x{rows}<?>"),
                }
            }
            &TypeKind::Array { elem, count, stride } => {
                if stride != elem.implicit_stride(cx) {
                    write!(f, "@stride({stride}) ")?;
                }
                match count {
                    ArrayCount::Constant(n) => write!(f, "array<{}, {n}>", name(elem)),
                    ArrayCount::Runtime => write!(f, "array<{}>", name(elem)),
                }
            }
            TypeKind::Struct(def) => f.write_str(&cx[def.name]),
            &TypeKind::Atomic(elem) => write!(f, "atomic<{}>", name(elem)),
            TypeKind::Pointer(mv) => {
                write!(f, "ptr<{}, {}, {}>", mv.addr_space, name(mv.store), mv.access)
            }
            TypeKind::Reference(mv) => {
                write!(f, "ref<{}, {}, {}>", mv.addr_space, name(mv.store), mv.access)
            }
            TypeKind::Sampler { comparison: false } => f.write_str("sampler"),
            TypeKind::Sampler { comparison: true } => f.write_str("sampler_comparison"),
            &TypeKind::SampledTexture { dim, sample } => {
                write!(f, "texture_{dim}<{}>", name(sample))
            }
            TypeKind::DepthTexture { dim } => write!(f, "texture_depth_{dim}"),
            &TypeKind::MultisampledTexture { dim, sample } => {
                write!(f, "texture_multisampled_{dim}<{}>", name(sample))
            }
            TypeKind::StorageTexture { dim, format, access } => {
                write!(f, "texture_storage_{dim}<{format}, {access}>")
            }
            TypeKind::ExternalTexture => f.write_str("texture_external"),
            &TypeKind::InputAttachment { component } => {
                write!(f, "input_attachment<{}>", name(component))
            }
            &TypeKind::SubgroupMatrix { kind, component, columns, rows } => {
                let kind = match kind {
                    SubgroupMatrixKind::Left => "left",
                    SubgroupMatrixKind::Right => "right",
                    SubgroupMatrixKind::Result => "result",
                };
                write!(f, "subgroup_matrix_{kind}<{}, {columns}, {rows}>", name(component))
            }
            &TypeKind::BindingArray { elem, count } => match count {
                ArrayCount::Constant(n) => write!(f, "binding_array<{}, {n}>", name(elem)),
                ArrayCount::Runtime => write!(f, "binding_array<{}>", name(elem)),
            },
            &TypeKind::SampledImage { image } => write!(f, "sampled_image<{}>", name(image)),
            TypeKind::Function => f.write_str("<function>"),
        }
    }
}

impl fmt::Display for AddrSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddrSpace::Undefined => "undefined",
            AddrSpace::Function => "function",
            AddrSpace::Private => "private",
            AddrSpace::Workgroup => "workgroup",
            AddrSpace::Uniform => "uniform",
            AddrSpace::Storage => "storage",
            AddrSpace::Handle => "handle",
            AddrSpace::Immediate => "immediate",
            AddrSpace::In => "__in",
            AddrSpace::Out => "__out",
            AddrSpace::PixelLocal => "pixel_local",
        })
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "read_write",
        })
    }
}

impl fmt::Display for TextureDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextureDim::D1 => "1d",
            TextureDim::D2 => "2d",
            TextureDim::D2Array => "2d_array",
            TextureDim::D3 => "3d",
            TextureDim::Cube => "cube",
            TextureDim::CubeArray => "cube_array",
        })
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Undefined => "undefined",
            PipelineStage::Vertex => "vertex",
            PipelineStage::Fragment => "fragment",
            PipelineStage::Compute => "compute",
        })
    }
}

impl fmt::Display for TexelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TexelFormat::Rgba8Unorm => "rgba8unorm",
            TexelFormat::Rgba8Snorm => "rgba8snorm",
            TexelFormat::Rgba8Uint => "rgba8uint",
            TexelFormat::Rgba8Sint => "rgba8sint",
            TexelFormat::Rgba16Float => "rgba16float",
            TexelFormat::R32Uint => "r32uint",
            TexelFormat::R32Sint => "r32sint",
            TexelFormat::R32Float => "r32float",
            TexelFormat::Rg32Float => "rg32float",
            TexelFormat::Rgba32Uint => "rgba32uint",
            TexelFormat::Rgba32Sint => "rgba32sint",
            TexelFormat::Rgba32Float => "rgba32float",
            TexelFormat::Bgra8Unorm => "bgra8unorm",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgsl_vector_and_matrix_layout() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        let vec3 = cx.ty_vec(f32, 3);
        assert_eq!((vec3.size(&cx), vec3.align(&cx)), (12, 16));
        let vec2h = cx.ty_vec(cx.ty_f16(), 2);
        assert_eq!((vec2h.size(&cx), vec2h.align(&cx)), (4, 4));
        let mat = cx.ty_mat(f32, 4, 3);
        assert_eq!((mat.size(&cx), mat.align(&cx)), (64, 16));
    }

    #[test]
    fn struct_layout_is_consistent() {
        let cx = Context::new();
        let (f32, u32) = (cx.ty_f32(), cx.ty_u32());
        let s = cx.ty_struct(
            "S",
            [
                (cx.intern("a"), f32, IOAttributes::default()),
                (cx.intern("b"), cx.ty_vec(f32, 3), IOAttributes::default()),
                (cx.intern("c"), u32, IOAttributes::default()),
            ],
        );
        let def = s.struct_def(&cx).unwrap();
        let offsets: Vec<_> = def.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, [0, 16, 28]);
        assert_eq!((def.size, def.align), (32, 16));
        for pair in def.members.windows(2) {
            assert!(pair[0].offset + pair[0].size <= pair[1].offset);
        }
        let last = def.members.last().unwrap();
        assert!(def.size >= last.offset + last.size);
    }

    #[test]
    fn friendly_names() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        assert_eq!(cx.ty_vec(f32, 4).name(&cx), "vec4<f32>");
        assert_eq!(cx.ty_array(f32, 8).name(&cx), "array<f32, 8>");
        assert_eq!(
            cx.ty_ptr(AddrSpace::Uniform, cx.ty_u32(), Access::Read).name(&cx),
            "ptr<uniform, u32, read>"
        );
        assert_eq!(cx.ty_mat(f32, 2, 3).name(&cx), "mat2x3<f32>");
    }

    #[test]
    fn constructibility() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        assert!(cx.ty_array(f32, 4).is_constructible(&cx));
        assert!(!cx.ty_runtime_array(f32).is_constructible(&cx));
        assert!(!cx.ty_atomic(cx.ty_u32()).is_constructible(&cx));
        assert!(!cx.ty_sampler().is_constructible(&cx));
        assert!(!cx.ty_bool().is_host_shareable(&cx));
    }

    #[test]
    fn zero_composite_elements() {
        let cx = Context::new();
        let v = cx.const_zero(cx.ty_vec(cx.ty_i32(), 2));
        let e = v.element(&cx, 1).unwrap();
        assert_eq!(e.as_i64(&cx), Some(0));
        assert_eq!(v.num_elements(&cx), 2);
    }
}
