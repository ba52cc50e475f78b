//! Type legality, memoized per (type, ignored capabilities) pair.

use super::Validator;
use crate::caps::{Capabilities, Capability};
use crate::{AddrSpace, ArrayCount, DiagAnchor, TextureDim, Type, TypeKind};
use rustc_hash::FxHashSet;

/// Largest padding allowed before (or after) any struct member.
pub const MAX_STRUCT_MEMBER_PADDING: u32 = 0x10000;

impl Validator<'_> {
    /// Check `root` (and every type reachable from it) is legal IR, reporting
    /// the first problem found against `anchor`.
    ///
    /// Capabilities in `ignore_caps` are treated as disabled, even if enabled
    /// for the whole validation (e.g. references in function signatures).
    pub(super) fn check_type(&mut self, root: Type, anchor: DiagAnchor, ignore_caps: Capabilities) {
        let cx = self.cx;

        if !self.caps.contains(Capability::AllowNonCoreTypes) && !root.is_core(cx) {
            self.add_error(anchor, "non-core types not allowed in core IR");
            return;
        }

        if !self.validated_types.insert((root, ignore_caps)) {
            return;
        }

        let addr_space = root.memory_view(cx).map_or(AddrSpace::Undefined, |mv| mv.addr_space);

        let mut stack = vec![root];
        let mut seen = FxHashSet::default();
        while let Some(ty) = stack.pop() {
            if let Err(message) = self.check_one_type(root, ty, addr_space, ignore_caps) {
                self.add_error(anchor, message);
                return;
            }

            if let Some(mv) = ty.memory_view(cx) {
                if seen.insert(mv.store) {
                    stack.push(mv.store);
                }
                continue;
            }

            match ty.elements(cx) {
                (Some(elem), _) => {
                    if seen.insert(elem) {
                        stack.push(elem);
                    }
                }
                (None, count) => {
                    for i in 0..count {
                        if let Some(elem) = ty.element(cx, i) {
                            if seen.insert(elem) {
                                stack.push(elem);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Rules for `ty` itself (not its components), found while walking `root`.
    fn check_one_type(
        &self,
        root: Type,
        ty: Type,
        addr_space: AddrSpace,
        ignore_caps: Capabilities,
    ) -> Result<(), String> {
        let cx = self.cx;
        let caps = self.caps;
        let name = |ty: Type| ty.name(cx);

        if ty.is_abstract(cx) {
            return Err("abstracts are not permitted".into());
        }

        match &cx[ty].kind {
            TypeKind::Struct(def) => {
                let mut cur_offset = 0u32;
                for (i, member) in def.members.iter().enumerate() {
                    let index = member.index;
                    let member_ty = &cx[member.ty].kind;
                    if member.ty.is_void(cx) {
                        return Err(format!("struct member {index} cannot have void type"));
                    }
                    if !caps.contains(Capability::MslAllowEntryPointInterface) {
                        if member.ty.is_pointer(cx) {
                            return Err(format!("struct member {index} cannot be a pointer type"));
                        }
                        if member.ty.is_texture(cx) {
                            return Err(format!("struct member {index} cannot be a texture type"));
                        }
                        if let TypeKind::Sampler { .. } = member_ty {
                            return Err(format!("struct member {index} cannot be a sampler type"));
                        }
                    }
                    if let TypeKind::Array { count: ArrayCount::Runtime, .. } = member_ty {
                        if i + 1 != def.members.len() {
                            return Err(
                                "runtime-sized arrays can only be the last member of a struct"
                                    .into(),
                            );
                        }
                    }
                    if member.align == 0 {
                        return Err("struct member must not have an alignment of 0".into());
                    }
                    let ty_align = member.ty.align(cx);
                    if ty_align == 0 {
                        return Err("struct member type must not have an alignment of 0".into());
                    }
                    if !caps.contains(Capability::AllowStructMatrixDecorations) {
                        if member.row_major {
                            return Err("Row major annotation not allowed on structures".into());
                        }
                        if member.matrix_stride.is_some() {
                            return Err("Matrix stride annotation not allowed on structures".into());
                        }
                    }
                    // FIXME also check the layout of row-major members.
                    if !member.row_major {
                        let ty_size = member.ty.size(cx);
                        if member.size < ty_size {
                            return Err(format!(
                                "struct member {index} with size={} must be at least as large \
                                 as the type with size {ty_size}",
                                member.size
                            ));
                        }
                        if member.align % ty_align != 0 {
                            return Err(format!(
                                "struct member alignment ({}) must be divisible by type \
                                 alignment ({ty_align})",
                                member.align
                            ));
                        }
                    }

                    // NOTE overlapping members wrap around to a huge padding.
                    let padding = member.offset.wrapping_sub(cur_offset);
                    if padding >= MAX_STRUCT_MEMBER_PADDING {
                        return Err(format!(
                            "struct member padding ({padding}) is larger then the max \
                             ({MAX_STRUCT_MEMBER_PADDING})"
                        ));
                    }
                    cur_offset =
                        cur_offset.wrapping_add(padding).wrapping_add(member.ty.min_required_size(cx));
                }
                if def.size < cur_offset {
                    return Err(format!(
                        "struct size ({}) is smaller than the end of the last member ({cur_offset})",
                        def.size
                    ));
                }
                let padding = def.size - cur_offset;
                if padding >= MAX_STRUCT_MEMBER_PADDING {
                    return Err(format!(
                        "struct padding ({padding}) is larger then the max \
                         ({MAX_STRUCT_MEMBER_PADDING})"
                    ));
                }
            }

            TypeKind::Reference(mv) => {
                if mv.store.is_void(cx) {
                    return Err("references to void are not permitted".into());
                }
                if !caps.contains(Capability::AllowRefTypes)
                    || ignore_caps.contains(Capability::AllowRefTypes)
                {
                    return Err("reference types are not permitted here".into());
                }
                if ty != root {
                    return Err("nested reference types are not permitted".into());
                }
            }

            TypeKind::Pointer(mv) => {
                if mv.store.is_void(cx) {
                    return Err("pointers to void are not permitted".into());
                }
                if matches!(mv.addr_space, AddrSpace::Uniform | AddrSpace::Handle)
                    && mv.access != crate::Access::Read
                {
                    return Err("uniform and handle pointers must be read access".into());
                }
                if mv.addr_space == AddrSpace::Workgroup && mv.access != crate::Access::ReadWrite {
                    return Err("workgroup pointers must be read_write access".into());
                }
                if mv.addr_space == AddrSpace::Handle {
                    if !mv.store.is_handle(cx) {
                        return Err(
                            "the 'handle' address space can only be used for handle types".into()
                        );
                    }
                } else if mv.store.is_handle(cx) {
                    return Err(
                        "handle types can only be declared in the 'handle' address space".into()
                    );
                }
                if mv.addr_space == AddrSpace::Immediate && mv.access != crate::Access::Read {
                    return Err("immediate pointers must be read access".into());
                }
                if mv.store.is_pointer(cx) {
                    return Err("pointers to pointers are not allowed".into());
                }
            }

            TypeKind::I64 | TypeKind::U64 => {
                if !caps.contains(Capability::Allow64BitIntegers) {
                    return Err("64-bit integer types are not permitted".into());
                }
            }
            TypeKind::I8 | TypeKind::U8 => {
                if !caps.contains(Capability::Allow8BitIntegers) {
                    return Err("8-bit integer types are not permitted".into());
                }
            }

            &TypeKind::Array { elem, count, .. } => {
                if !elem.has_creation_fixed_footprint(cx) {
                    return Err(format!(
                        "array elements, {}, must have creation-fixed footprint",
                        name(ty)
                    ));
                }
                match count {
                    ArrayCount::Runtime => {
                        if addr_space != AddrSpace::Storage {
                            return Err(
                                "runtime arrays must be in the 'storage' address space".into()
                            );
                        }
                    }
                    ArrayCount::Constant(0) => {
                        return Err("array requires a constant array size > 0".into());
                    }
                    ArrayCount::Constant(_) => {}
                }
            }
            &TypeKind::Vector { elem, .. } => {
                if !elem.is_scalar(cx) {
                    return Err(format!("vector elements, {}, must be scalars", name(ty)));
                }
            }
            &TypeKind::Matrix { column, .. } => {
                let elem_ok = column.vector_elem(cx).is_some_and(|elem| elem.is_float_scalar(cx));
                if !elem_ok {
                    return Err(format!("matrix elements, {}, must be float scalars", name(ty)));
                }
            }
            &TypeKind::Atomic(elem) => {
                if !matches!(cx[elem].kind, TypeKind::I32 | TypeKind::U32) {
                    return Err("atomic subtype must be i32 or u32".into());
                }
            }

            &TypeKind::SampledTexture { sample, .. } => {
                if !is_texel_component(cx, sample) {
                    return Err(format!("invalid sampled texture sample type: {}", name(sample)));
                }
            }
            &TypeKind::MultisampledTexture { dim, sample } => {
                if !is_texel_component(cx, sample) {
                    return Err(format!(
                        "invalid multisampled texture sample type: {}",
                        name(sample)
                    ));
                }
                if dim != TextureDim::D2 {
                    return Err(format!("invalid multisampled texture dimension: {dim}"));
                }
            }
            &TypeKind::StorageTexture { dim, .. } => {
                if matches!(dim, TextureDim::Cube | TextureDim::CubeArray) {
                    return Err(format!(
                        "dimension {dim} for storage textures does not in WGSL yet"
                    ));
                }
            }
            &TypeKind::InputAttachment { component } => {
                if !is_texel_component(cx, component) {
                    return Err(format!(
                        "invalid input attachment component type: {}",
                        name(component)
                    ));
                }
            }
            &TypeKind::SubgroupMatrix { component, .. } => {
                let component_ok = matches!(
                    cx[component].kind,
                    TypeKind::F16
                        | TypeKind::F32
                        | TypeKind::I8
                        | TypeKind::I32
                        | TypeKind::U8
                        | TypeKind::U32
                );
                if !component_ok {
                    return Err(format!(
                        "invalid subgroup matrix component type: {}",
                        name(component)
                    ));
                }
                if !matches!(addr_space, AddrSpace::Undefined | AddrSpace::Function) {
                    return Err(format!("invalid address space for subgroup matrix : {addr_space}"));
                }
            }
            &TypeKind::BindingArray { elem, count } => {
                let count = match count {
                    ArrayCount::Constant(count) => count,
                    ArrayCount::Runtime => {
                        return Err("binding_array count must be a constant expression".into());
                    }
                };
                if count == 0 {
                    return Err("binding array requires a constant array size > 0".into());
                }
                if !matches!(addr_space, AddrSpace::Undefined | AddrSpace::Handle)
                    && !caps.contains(Capability::MslAllowEntryPointInterface)
                {
                    return Err(format!("invalid address space for binding_array : {addr_space}"));
                }
                if !caps.contains(Capability::AllowNonCoreTypes)
                    && !matches!(cx[elem].kind, TypeKind::SampledTexture { .. })
                {
                    return Err("binding_array element type must be a sampled texture type".into());
                }
            }

            _ => {}
        }
        Ok(())
    }
}

fn is_texel_component(cx: &crate::Context, ty: Type) -> bool {
    matches!(cx[ty].kind, TypeKind::F32 | TypeKind::I32 | TypeKind::U32)
}
