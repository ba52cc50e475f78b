//! Per-instruction checks (operand/result shapes, typing rules, and the
//! structural rules of control-flow instructions and terminators).

use super::{Task, Validator};
use crate::caps::{Capabilities, Capability};
use crate::intrinsics::{self, BinaryOp, BuiltinFn, ParamUsage, SupportedStages};
use crate::{
    Access, AddrSpace, ArrayCount, Block, CaseSelector, Diag, DiagAnchor, Inst, InstKind, Type,
    TypeKind, Value,
};

/// Whether a value is used directly (`Value`), or through a memory view.
#[derive(Copy, Clone, PartialEq, Eq)]
enum AccessKind {
    Ptr,
    Ref,
    Value,
}

impl Validator<'_> {
    pub(super) fn check_inst(&mut self, inst: Inst) {
        let module = self.module;
        let inst_def = &module.insts[inst];

        self.visited_insts.insert(inst);
        if !inst_def.alive {
            self.inst_error(inst, "destroyed instruction found in instruction list");
            return;
        }

        for (idx, &result) in inst_def.results.iter().enumerate() {
            let ty = module.inst_results[result].ty;
            self.check_type(ty, DiagAnchor::Result { inst, idx: idx as u32 }, Capabilities::NONE);
        }
        for (idx, &v) in inst_def.operands.iter().enumerate() {
            match v {
                None | Some(Value::Func(_) | Value::Unused) => {}
                Some(v) => {
                    let anchor = DiagAnchor::Operand { inst, idx: idx as u32 };
                    self.check_type(module.type_of(v), anchor, Capabilities::NONE);
                }
            }
        }

        match &inst_def.kind {
            InstKind::Var { .. } => self.check_var(inst),
            InstKind::Let => self.check_let(inst),
            InstKind::Override { id } => self.check_override(inst, *id),
            InstKind::Load => self.check_load(inst),
            InstKind::Store => self.check_store(inst),
            InstKind::LoadVectorElement => self.check_load_vector_element(inst),
            InstKind::StoreVectorElement => self.check_store_vector_element(inst),
            InstKind::Access => self.check_access(inst),
            InstKind::Swizzle { indices } => self.check_swizzle(inst, indices),
            &InstKind::Unary(op) => self.check_unary(inst, op),
            &InstKind::Binary(op) => self.check_binary(inst, op),
            InstKind::Bitcast => self.check_bitcast(inst),
            InstKind::Convert => self.check_convert(inst),
            InstKind::Construct => self.check_construct(inst),
            &InstKind::BuiltinCall(f) => self.check_builtin_call(inst, f),
            InstKind::UserCall => self.check_user_call(inst),
            InstKind::Discard => {
                self.stage_restricted.insert(inst, SupportedStages::FRAGMENT);
                self.check_results_and_operands(inst, 0, 0);
            }
            InstKind::Phony => self.check_phony(inst),
            InstKind::If { true_block, false_block } => {
                self.check_if(inst, *true_block, *false_block);
            }
            InstKind::Loop { initializer, body, continuing } => {
                self.check_loop(inst, *initializer, *body, *continuing);
            }
            InstKind::Switch { .. } => self.check_switch(inst),
            InstKind::Return
            | InstKind::Unreachable
            | InstKind::TerminateInvocation
            | InstKind::ExitIf(_)
            | InstKind::ExitSwitch(_)
            | InstKind::ExitLoop(_)
            | InstKind::Continue(_)
            | InstKind::NextIteration(_)
            | InstKind::BreakIf(_) => self.check_terminator(inst),
        }

        for &result in &inst_def.results {
            self.add_to_scope(result.into());
        }
    }

    // Operands and results.

    fn check_result(&mut self, inst: Inst, idx: usize) -> bool {
        let module = self.module;
        let cx = self.cx;
        let inst_def = &module.insts[inst];
        let result_def = &module.inst_results[inst_def.results[idx]];

        match result_def.inst {
            None => {
                self.result_error(inst, idx, "result instruction is undefined");
                return false;
            }
            Some(owner) if owner != inst => {
                self.result_error(
                    inst,
                    idx,
                    "result instruction does not match instruction (possible double usage)",
                );
                return false;
            }
            Some(_) => {}
        }

        let ty = result_def.ty;
        let is_call = matches!(
            inst_def.kind,
            InstKind::UserCall
                | InstKind::BuiltinCall(_)
                | InstKind::Bitcast
                | InstKind::Convert
                | InstKind::Construct
                | InstKind::Discard
        );
        if !is_call && ty.is_void(cx) {
            self.result_error(inst, idx, "result type cannot be void");
            return false;
        }

        if inst_def.kind.is_control() {
            if ty.is_pointer(cx) {
                self.result_error(inst, idx, "result type cannot be a pointer");
                return false;
            }
            if !ty.is_constructible(cx) {
                self.result_error(inst, idx, "result type must be constructable");
                return false;
            }
        }

        if ty.is_void(cx) && result_def.name.is_some() {
            self.result_error(inst, idx, "void results must not have names");
            return false;
        }

        true
    }

    fn check_results(&mut self, inst: Inst, count: Option<usize>) -> bool {
        let results = &self.module.insts[inst].results;
        if let Some(count) = count {
            if results.len() != count {
                let got = results.len();
                self.inst_error(inst, format!("expected exactly {count} results, got {got}"));
                return false;
            }
        }

        let mut passed = true;
        let mut seen = rustc_hash::FxHashSet::default();
        for (idx, &result) in results.iter().enumerate() {
            if !self.check_result(inst, idx) {
                passed = false;
            }
            if !seen.insert(result) {
                self.result_error(inst, idx, "result was seen previously as a result");
                passed = false;
            }
        }
        passed
    }

    fn check_operand(&mut self, inst: Inst, idx: usize) -> bool {
        let module = self.module;
        let inst_def = &module.insts[inst];

        let Some(v) = inst_def.operands[idx] else {
            // NOTE `var`s (and `override`s) have optional initializers, while
            // terminators use `None` for undefined values.
            if inst_def.kind.is_terminator()
                || matches!(inst_def.kind, InstKind::Var { .. } | InstKind::Override { .. })
            {
                return true;
            }
            self.operand_error(inst, idx, "operand is undefined");
            return false;
        };

        let alive = match v {
            Value::Const(_) | Value::Unused => return true,
            Value::InstResult(result) => module.inst_results[result]
                .inst
                .is_some_and(|def_inst| module.insts[def_inst].alive),
            Value::FuncParam(param) => module.func_params[param].alive,
            Value::BlockParam(param) => module.block_params[param].alive,
            Value::Func(_) => true,
        };
        if !alive {
            self.operand_error(inst, idx, "operand is not alive");
            return false;
        }

        let usage = crate::Usage { inst, operand_idx: idx as u32 };
        if !module.uses(v).contains(&usage) {
            self.operand_error(inst, idx, "operand missing usage");
            return false;
        }

        if let Value::Func(func) = v {
            if !self.all_functions.contains(&func) {
                let name = self.name_of(v);
                self.operand_error(inst, idx, format!("{name} is not part of the module"));
                return false;
            }
        }

        if !self.is_in_scope(v) {
            let name = self.name_of(v);
            let note = self.declaration_note(v);
            self.operand_error(inst, idx, format!("{name} is not in scope")).notes.extend(note);
            return false;
        }

        true
    }

    fn check_operands(&mut self, inst: Inst, count: Option<usize>) -> bool {
        let len = self.module.insts[inst].operands.len();
        if let Some(count) = count {
            if len != count {
                self.inst_error(inst, format!("expected exactly {count} operands, got {len}"));
                return false;
            }
        }
        self.check_each_operand(inst)
    }

    fn check_operand_range(&mut self, inst: Inst, min: usize, max: Option<usize>) -> bool {
        let len = self.module.insts[inst].operands.len();
        let in_range = len >= min && max.map_or(true, |max| len <= max);
        if !in_range {
            let message = match max {
                Some(max) => format!("expected between {min} and {max} operands, got {len}"),
                None => format!("expected at least {min} operands, got {len}"),
            };
            self.inst_error(inst, message);
            return false;
        }
        self.check_each_operand(inst)
    }

    fn check_each_operand(&mut self, inst: Inst) -> bool {
        let mut passed = true;
        for idx in 0..self.module.insts[inst].operands.len() {
            if !self.check_operand(inst, idx) {
                passed = false;
            }
        }
        passed
    }

    fn check_results_and_operands(&mut self, inst: Inst, results: usize, operands: usize) -> bool {
        // NOTE both are always checked, to report as many errors as possible.
        let results_passed = self.check_results(inst, Some(results));
        let operands_passed = self.check_operands(inst, Some(operands));
        results_passed && operands_passed
    }

    fn check_results_and_operand_range(
        &mut self,
        inst: Inst,
        results: usize,
        min_operands: usize,
        max_operands: Option<usize>,
    ) -> bool {
        let results_passed = self.check_results(inst, Some(results));
        let operands_passed = self.check_operand_range(inst, min_operands, max_operands);
        results_passed && operands_passed
    }

    fn operand_ty(&self, inst: Inst, idx: usize) -> Option<Type> {
        self.module.operand(inst, idx).map(|v| self.module.type_of(v))
    }

    fn result_ty(&self, inst: Inst) -> Option<Type> {
        self.module.result(inst).map(|r| self.module.inst_results[r].ty)
    }

    // Memory and values.

    fn check_override(&mut self, inst: Inst, id: Option<u16>) {
        let cx = self.cx;

        // NOTE the initializer is optional, so operands are only checked below.
        if !self.check_results(inst, Some(1)) {
            return;
        }

        if let Some(id) = id {
            if !self.seen_override_ids.insert(id) {
                self.inst_error(inst, format!("duplicate override id encountered: {id}"));
                return;
            }
        }

        let Some(ty) = self.result_ty(inst) else {
            return;
        };
        if !ty.is_scalar(cx) {
            self.inst_error(inst, format!("override type {} is not a scalar", self.ty_name(ty)));
            return;
        }

        let init = self.module.operand(inst, 0);
        if let Some(init) = init {
            if !self.check_operand(inst, 0) {
                return;
            }
            let init_ty = self.module.type_of(init);
            if init_ty != ty {
                self.inst_error(
                    inst,
                    format!(
                        "override type {} does not match initializer type {}",
                        self.ty_name(ty),
                        self.ty_name(init_ty)
                    ),
                );
                return;
            }
        }

        if id.is_none() && init.is_none() {
            self.inst_error(inst, "must have an id or an initializer");
        }
    }

    fn check_var(&mut self, inst: Inst) {
        let module = self.module;
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }

        let InstKind::Var { attrs } = &module.insts[inst].kind else {
            return;
        };
        let Some(ty) = self.result_ty(inst) else {
            return;
        };
        let Some(mv) = ty.memory_view(cx) else {
            self.inst_error(
                inst,
                format!("result type {} must be a pointer or a reference", self.ty_name(ty)),
            );
            return;
        };

        let in_root_block = module.insts[inst].block == Some(module.root_block);
        if !in_root_block && mv.addr_space != AddrSpace::Function {
            let msl_private = self.caps.contains(Capability::MslAllowEntryPointInterface)
                && mv.addr_space == AddrSpace::Private;
            if !msl_private {
                self.inst_error(
                    inst,
                    "vars in a function scope must be in the 'function' address space",
                );
                return;
            }
        }

        if let Some(init) = module.operand(inst, 0) {
            if !matches!(mv.addr_space, AddrSpace::Function | AddrSpace::Private | AddrSpace::Out) {
                self.inst_error(
                    inst,
                    "only variables in the function, private, or __out address space may be \
                     initialized",
                );
                return;
            }
            if !self.check_operand(inst, 0) {
                return;
            }
            let init_ty = module.type_of(init);
            if init_ty != mv.store {
                self.inst_error(
                    inst,
                    format!(
                        "initializer type {} does not match store type {}",
                        self.ty_name(init_ty),
                        self.ty_name(mv.store)
                    ),
                );
                return;
            }
        }

        self.check_binding_point(
            DiagAnchor::Inst(inst),
            ty,
            attrs,
            super::io::ShaderIOKind::ModuleScopeVar,
        );

        if in_root_block && mv.addr_space == AddrSpace::Function {
            self.inst_error(inst, "vars in the 'function' address space must be in a function scope");
            return;
        }

        match mv.addr_space {
            AddrSpace::Storage => {
                if !mv.store.is_host_shareable(cx) {
                    self.inst_error(inst, "vars in the 'storage' address space must be host-shareable");
                    return;
                }
                if !matches!(mv.access, Access::Read | Access::ReadWrite) {
                    self.inst_error(
                        inst,
                        "vars in the 'storage' address space must have access 'read' or \
                         'read-write'",
                    );
                    return;
                }
            }
            AddrSpace::Uniform => {
                if !mv.store.is_constructible(cx) || !mv.store.is_host_shareable(cx) {
                    self.inst_error(
                        inst,
                        "vars in the 'uniform' address space must be host-shareable and \
                         constructible or a buffer",
                    );
                    return;
                }
            }
            AddrSpace::Immediate => {
                if !mv.store.is_host_shareable(cx) {
                    self.inst_error(
                        inst,
                        "vars in the 'immediate' address space must be host-shareable",
                    );
                    return;
                }
            }
            _ => {}
        }

        if attrs.input_attachment_index.is_some() {
            if mv.addr_space != AddrSpace::Handle {
                self.inst_error(inst, "'@input_attachment_index' is not valid for non-handle var");
                return;
            }
            if !self.caps.contains(Capability::AllowAnyInputAttachmentIndexType)
                && !matches!(cx[mv.store].kind, TypeKind::InputAttachment { .. })
            {
                self.inst_error(
                    inst,
                    "'@input_attachment_index' is only valid for 'input_attachment' type var",
                );
                return;
            }
        }

        if in_root_block && matches!(mv.addr_space, AddrSpace::In | AddrSpace::Out) {
            self.validate_shader_io_annotations(
                DiagAnchor::Inst(inst),
                ty,
                attrs,
                super::io::ShaderIOKind::ModuleScopeVar,
            );
        }

        if mv.addr_space == AddrSpace::PixelLocal && in_root_block && !mv.store.is_struct(cx) {
            self.inst_error(inst, "pixel_local var must be of type struct");
        }
    }

    fn check_let(&mut self, inst: Inst) {
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(value_ty), Some(result_ty)) = (self.operand_ty(inst, 0), self.result_ty(inst))
        else {
            return;
        };

        let any_let_type = self.caps.contains(Capability::AllowAnyLetType);
        if any_let_type {
            if value_ty.is_void(cx) {
                self.inst_error(inst, "value type cannot be void");
            }
        } else if !value_ty.is_constructible(cx) && !value_ty.is_pointer(cx) {
            self.inst_error(
                inst,
                format!(
                    "value type, {}, must be concrete constructible type or a pointer type",
                    self.ty_name(value_ty)
                ),
            );
        }

        if !any_let_type {
            match cx[result_ty].kind {
                TypeKind::Pointer(mv) => {
                    if mv.addr_space == AddrSpace::Handle
                        && !self.caps.contains(Capability::AllowPointerToHandle)
                    {
                        self.inst_error(inst, "handle pointer cannot be captured in a let");
                    }
                }
                _ if !result_ty.is_constructible(cx) => {
                    self.inst_error(
                        inst,
                        format!(
                            "result type, {}, must be concrete constructible type or a pointer \
                             type",
                            self.ty_name(result_ty)
                        ),
                    );
                }
                _ => {}
            }
        }

        if value_ty != result_ty {
            self.inst_error(
                inst,
                format!(
                    "result type {} does not match value type {}",
                    self.ty_name(result_ty),
                    self.ty_name(value_ty)
                ),
            );
        }
    }

    /// Whether a value of type `ty` can be produced by a `load`.
    fn can_load(&self, ty: Type) -> bool {
        let cx = self.cx;
        match &cx[ty].kind {
            &TypeKind::Array { elem, count, .. } => {
                count != ArrayCount::Runtime && self.can_load(elem)
            }
            TypeKind::Struct(def) => def.members.iter().all(|member| {
                (member.ty.is_pointer(cx)
                    && self.caps.contains(Capability::MslAllowEntryPointInterface))
                    || self.can_load(member.ty)
            }),
            _ => ty.is_constructible(cx) || ty.is_handle(cx),
        }
    }

    fn check_load(&mut self, inst: Inst) {
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(from_ty), Some(result_ty)) = (self.operand_ty(inst, 0), self.result_ty(inst))
        else {
            return;
        };

        let Some(mv) = from_ty.memory_view(cx) else {
            self.operand_error(
                inst,
                0,
                format!("load source operand {} is not a memory view", self.ty_name(from_ty)),
            );
            return;
        };

        if !matches!(mv.access, Access::Read | Access::ReadWrite) {
            self.operand_error(
                inst,
                0,
                format!("load source operand has a non-readable access type, {}", mv.access),
            );
            return;
        }

        if result_ty != mv.store {
            self.operand_error(
                inst,
                0,
                format!(
                    "result type {} does not match source store type {}",
                    self.ty_name(result_ty),
                    self.ty_name(mv.store)
                ),
            );
        }

        if !self.can_load(mv.store) {
            self.operand_error(inst, 0, format!("type {} cannot be loaded", self.ty_name(mv.store)));
        }
    }

    fn check_store(&mut self, inst: Inst) {
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 0, 2) {
            return;
        }
        let (Some(to_ty), Some(value_ty)) = (self.operand_ty(inst, 0), self.operand_ty(inst, 1))
        else {
            return;
        };

        let Some(mv) = to_ty.memory_view(cx) else {
            self.operand_error(
                inst,
                0,
                format!("store target operand {} is not a memory view", self.ty_name(to_ty)),
            );
            return;
        };

        if !matches!(mv.access, Access::Write | Access::ReadWrite) {
            self.operand_error(
                inst,
                0,
                format!("store target operand has a non-writeable access type, {}", mv.access),
            );
            return;
        }

        if value_ty != mv.store {
            self.operand_error(
                inst,
                1,
                format!(
                    "value type {} does not match store type {}",
                    self.ty_name(value_ty),
                    self.ty_name(mv.store)
                ),
            );
            return;
        }

        if !mv.store.is_constructible(cx) {
            self.inst_error(
                inst,
                format!("store type {} is not constructible", self.ty_name(mv.store)),
            );
        }
    }

    /// The element type of the vector pointed to by operand `idx`.
    fn vector_ptr_elem_type(&mut self, inst: Inst, idx: usize) -> Option<Type> {
        let cx = self.cx;
        let Some(ty) = self.operand_ty(inst, idx) else {
            self.operand_error(inst, idx, "missing element operand");
            return None;
        };
        let elem = ty.memory_view(cx).and_then(|mv| mv.store.vector_elem(cx));
        if elem.is_none() {
            self.operand_error(
                inst,
                idx,
                format!("operand {} must be a pointer to a vector", self.ty_name(ty)),
            );
        }
        elem
    }

    /// Shared `index` operand rules of `load_vector_element`/`store_vector_element`.
    fn check_vector_element_index(&mut self, inst: Inst, what: &str) {
        let module = self.module;
        let cx = self.cx;
        let (Some(index), Some(ptr_ty)) = (module.operand(inst, 1), self.operand_ty(inst, 0)) else {
            return;
        };

        if !module.type_of(index).is_integer_scalar(cx) {
            self.operand_error(inst, 1, format!("{what} index must be an integer scalar"));
        }
        if let Value::Const(ct) = index {
            let width = ptr_ty.unwrap_ptr_or_ref(cx).vector_width(cx).unwrap_or(0);
            let value = ct.as_i64(cx).unwrap_or(0);
            if value < 0 || value >= i64::from(width) {
                self.operand_error(
                    inst,
                    1,
                    format!("{what} index must be in range [0, {}]", width.saturating_sub(1)),
                );
            }
        }
    }

    fn check_load_vector_element(&mut self, inst: Inst) {
        if !self.check_results_and_operands(inst, 1, 2) {
            return;
        }

        let Some(elem) = self.vector_ptr_elem_type(inst, 0) else {
            return;
        };
        if let Some(result_ty) = self.result_ty(inst) {
            if result_ty != elem {
                self.result_error(
                    inst,
                    0,
                    format!(
                        "result type {} does not match vector pointer element type {}",
                        self.ty_name(result_ty),
                        self.ty_name(elem)
                    ),
                );
                return;
            }
        }

        self.check_vector_element_index(inst, "load vector element");
    }

    fn check_store_vector_element(&mut self, inst: Inst) {
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 0, 3) {
            return;
        }

        let Some(elem) = self.vector_ptr_elem_type(inst, 0) else {
            return;
        };
        if let Some(value_ty) = self.operand_ty(inst, 2) {
            if value_ty != elem {
                self.operand_error(
                    inst,
                    2,
                    format!(
                        "value type {} does not match vector pointer element type {}",
                        self.ty_name(value_ty),
                        self.ty_name(elem)
                    ),
                );
                return;
            }
        }
        let access = self.operand_ty(inst, 0).and_then(|ty| ty.memory_view(cx)).map(|mv| mv.access);
        if let Some(access @ Access::Read) = access {
            self.operand_error(
                inst,
                0,
                format!(
                    "store_vector_element target operand has a non-writeable access type, {access}"
                ),
            );
            return;
        }

        self.check_vector_element_index(inst, "store vector element");
    }

    fn check_access(&mut self, inst: Inst) {
        let module = self.module;
        let cx = self.cx;

        if !self.check_results_and_operand_range(inst, 1, 1, None) {
            return;
        }
        let (Some(object_ty), Some(want)) = (self.operand_ty(inst, 0), self.result_ty(inst)) else {
            return;
        };

        let object_view = object_ty.memory_view(cx);
        let in_kind = match cx[object_ty].kind {
            TypeKind::Pointer(_) => AccessKind::Ptr,
            TypeKind::Reference(_) => AccessKind::Ref,
            _ => AccessKind::Value,
        };
        let desc = |ty: Type| match (in_kind, object_view) {
            (AccessKind::Ptr, Some(mv)) => {
                format!("ptr<{}, {}, {}>", mv.addr_space, ty.name(cx), mv.access)
            }
            (AccessKind::Ref, Some(mv)) => {
                format!("ref<{}, {}, {}>", mv.addr_space, ty.name(cx), mv.access)
            }
            _ => ty.name(cx),
        };

        let mut ty = object_ty.unwrap_ptr_or_ref(cx);
        let num_operands = module.insts[inst].operands.len();
        for idx in 1..num_operands {
            let Some(index) = module.operand(inst, idx) else {
                return;
            };
            let index_ty = module.type_of(index);
            if !index_ty.is_integer_scalar(cx) {
                self.operand_error(
                    inst,
                    idx,
                    format!("index type {} must be an integer", self.ty_name(index_ty)),
                );
                return;
            }

            if !self.caps.contains(Capability::AllowVectorElementPointer)
                && in_kind != AccessKind::Value
                && ty.vector_elem(cx).is_some()
            {
                self.operand_error(inst, idx, "cannot obtain address of vector element");
                return;
            }

            let elem = match index {
                Value::Const(ct) => {
                    let value = ct.as_i64(cx).unwrap_or(0);
                    if value < 0 {
                        self.operand_error(
                            inst,
                            idx,
                            format!("constant index must be positive, got {value}"),
                        );
                        return;
                    }
                    let value = u32::try_from(value).unwrap_or(u32::MAX);
                    match ty.element(cx, value) {
                        Some(elem) => elem,
                        None => {
                            let (_, count) = ty.elements(cx);
                            if count != 0 && value >= count {
                                self.operand_error(
                                    inst,
                                    idx,
                                    format!("index out of bounds for type {}", desc(ty)),
                                )
                                .notes
                                .push(Diag::note(
                                    DiagAnchor::Operand { inst, idx: idx as u32 },
                                    format!("acceptable range: [0..{}]", count - 1),
                                ));
                                return;
                            }
                            self.operand_error(
                                inst,
                                idx,
                                format!("type {} cannot be indexed", desc(ty)),
                            );
                            return;
                        }
                    }
                }
                _ => match ty.elements(cx) {
                    (Some(elem), _) => elem,
                    (None, _) => {
                        self.operand_error(
                            inst,
                            idx,
                            format!("type {} cannot be dynamically indexed", desc(ty)),
                        );
                        return;
                    }
                },
            };
            ty = elem;
        }

        let ok = match object_view {
            // NOTE memory views are indexed into memory views of the same kind.
            Some(mv) => want.memory_view(cx).is_some_and(|want_mv| {
                want_mv.store == ty
                    && object_ty.is_pointer(cx) == want.is_pointer(cx)
                    && want_mv.addr_space == mv.addr_space
                    && want_mv.access == mv.access
            }),
            None => ty == want,
        };
        if !ok {
            self.inst_error(
                inst,
                format!(
                    "result of access chain is type {} but instruction type is {}",
                    desc(ty),
                    self.ty_name(want)
                ),
            );
        }
    }

    fn check_swizzle(&mut self, inst: Inst, indices: &[u32]) {
        let module = self.module;
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(object), Some(result_ty)) = (module.operand(inst, 0), self.result_ty(inst)) else {
            return;
        };

        let object_ty = module.type_of(object);
        let (Some(elem), Some(width)) = (object_ty.vector_elem(cx), object_ty.vector_width(cx))
        else {
            let name = self.name_of(object);
            self.inst_error(
                inst,
                format!("object of swizzle, {name}, is not a vector, {}", self.ty_name(object_ty)),
            );
            return;
        };

        if indices.is_empty() {
            self.inst_error(inst, "expected at least 1 indices");
            return;
        }
        if indices.len() > 4 {
            self.inst_error(inst, "expected at most 4 indices");
            return;
        }
        if indices.iter().any(|&idx| idx > 3 || idx >= width) {
            self.inst_error(inst, "invalid index value");
            return;
        }

        let expected = cx.ty_match_width(elem, indices.len() as u32);
        if result_ty != expected {
            self.inst_error(
                inst,
                format!(
                    "result type {} does not match expected type, {}",
                    self.ty_name(result_ty),
                    self.ty_name(expected)
                ),
            );
        }
    }

    fn check_unary(&mut self, inst: Inst, op: intrinsics::UnaryOp) {
        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(ty), Some(result_ty)) = (self.operand_ty(inst, 0), self.result_ty(inst)) else {
            return;
        };

        match intrinsics::lookup_unary(self.cx, op, ty) {
            Err(message) => {
                self.inst_error(inst, message);
            }
            Ok(return_type) if return_type != result_ty => {
                self.inst_error(
                    inst,
                    format!(
                        "result value type {} does not match {} result type {}",
                        self.ty_name(result_ty),
                        op.name(),
                        self.ty_name(return_type)
                    ),
                );
            }
            Ok(_) => {}
        }
    }

    fn check_binary(&mut self, inst: Inst, op: BinaryOp) {
        if !self.check_results_and_operands(inst, 1, 2) {
            return;
        }

        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            self.inst_error(inst, format!("{} is not valid in the IR", op.name()));
            return;
        }

        let (Some(lhs), Some(rhs), Some(result_ty)) =
            (self.operand_ty(inst, 0), self.operand_ty(inst, 1), self.result_ty(inst))
        else {
            return;
        };
        match intrinsics::lookup_binary(self.cx, op, lhs, rhs) {
            Err(message) => {
                self.inst_error(inst, message);
            }
            Ok(return_type) if return_type != result_ty => {
                self.inst_error(
                    inst,
                    format!(
                        "result value type {} does not match {} result type {}",
                        self.ty_name(result_ty),
                        op.name(),
                        self.ty_name(return_type)
                    ),
                );
            }
            Ok(_) => {}
        }
    }

    fn check_bitcast(&mut self, inst: Inst) {
        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(from), Some(to)) = (self.operand_ty(inst, 0), self.result_ty(inst)) else {
            return;
        };

        if !is_valid_bitcast(self.cx, from, to) {
            self.inst_error(
                inst,
                format!("bitcast is not defined for {} -> {}", self.ty_name(from), self.ty_name(to)),
            );
        }
    }

    fn check_convert(&mut self, inst: Inst) {
        let cx = self.cx;

        if !self.check_results_and_operands(inst, 1, 1) {
            return;
        }
        let (Some(from), Some(to)) = (self.operand_ty(inst, 0), self.result_ty(inst)) else {
            return;
        };

        let convertible_to = matches!(
            cx[to].kind,
            TypeKind::I32
                | TypeKind::U32
                | TypeKind::F32
                | TypeKind::F16
                | TypeKind::Bool
                | TypeKind::Vector { .. }
                | TypeKind::Matrix { .. }
        );
        if !convertible_to {
            self.inst_error(inst, format!("not defined for result type, {}", self.ty_name(to)));
            return;
        }

        if !intrinsics::has_converter(cx, to, from) {
            self.inst_error(
                inst,
                format!("No defined converter for {} -> {}", self.ty_name(from), self.ty_name(to)),
            );
        }
    }

    fn check_construct(&mut self, inst: Inst) {
        let module = self.module;
        let cx = self.cx;

        if !self.check_results_and_operand_range(inst, 1, 0, None) {
            return;
        }
        let Some(result_ty) = self.result_ty(inst) else {
            return;
        };

        // NOTE only structs holding pointers and handles (for MSL) can be
        // constructed while not being constructible.
        if !result_ty.is_constructible(cx)
            && !(result_ty.is_struct(cx)
                && self.caps.contains(Capability::MslAllowEntryPointInterface))
        {
            self.inst_error(inst, "type is not constructible");
            return;
        }

        let args: Vec<Value> = module.insts[inst].operands.iter().flatten().copied().collect();
        if args.is_empty() {
            // Zero values.
            return;
        }
        let arg_types: Vec<Type> = args.iter().map(|&v| module.type_of(v)).collect();

        match &cx[result_ty].kind {
            _ if result_ty.is_scalar(cx) => {
                if args.len() > 1 {
                    self.inst_error(inst, "scalar construct must not have more than one argument");
                }
                if arg_types[0] != result_ty {
                    self.operand_error(
                        inst,
                        0,
                        format!(
                            "scalar construct argument type {} does not match result type {}",
                            self.ty_name(arg_types[0]),
                            self.ty_name(result_ty)
                        ),
                    );
                }
            }
            &TypeKind::SubgroupMatrix { component, .. } => {
                if args.len() > 1 {
                    self.inst_error(
                        inst,
                        "subgroup matrix construct must not have more than 1 argument",
                    );
                    return;
                }
                // NOTE 8-bit integer matrices are built from 32-bit scalars,
                // unless the backend supports 8-bit integers directly.
                let scalar_ty = match cx[component].kind {
                    TypeKind::I8 => cx.ty_i32(),
                    TypeKind::U8 => cx.ty_u32(),
                    _ => component,
                };
                if arg_types[0] != scalar_ty && arg_types[0] != component {
                    self.inst_error(
                        inst,
                        format!(
                            "subgroup matrix construct argument type {} does not match matrix \
                             shader scalar type {}",
                            self.ty_name(arg_types[0]),
                            self.ty_name(scalar_ty)
                        ),
                    );
                }
            }
            &TypeKind::Vector { elem, .. } => {
                let matches = intrinsics::vector_ctor_matches(cx, result_ty, &arg_types)
                    && arg_types[0].deepest_element(cx) == elem;
                if !matches {
                    self.inst_error(
                        inst,
                        format!("no matching overload for {} constructor", self.ty_name(result_ty)),
                    );
                }
            }
            TypeKind::Matrix { .. } => {
                if !intrinsics::matrix_ctor_matches(cx, result_ty, &arg_types) {
                    self.inst_error(
                        inst,
                        format!("no matching overload for {} constructor", self.ty_name(result_ty)),
                    );
                }
            }
            &TypeKind::Array { count, .. } => {
                let count = match count {
                    ArrayCount::Constant(count) => count as usize,
                    ArrayCount::Runtime => 0,
                };
                if args.len() != count {
                    self.inst_error(
                        inst,
                        format!(
                            "array has {count} elements, but construct provides {} arguments",
                            args.len()
                        ),
                    );
                    return;
                }
                self.check_construct_args_match_elements(inst, result_ty, &args);
            }
            TypeKind::Struct(def) => {
                if args.len() != def.members.len() {
                    self.inst_error(
                        inst,
                        format!(
                            "structure has {} members, but construct provides {} arguments",
                            def.members.len(),
                            args.len()
                        ),
                    );
                    return;
                }
                self.check_construct_args_match_elements(inst, result_ty, &args);
            }
            _ => {}
        }
    }

    fn check_construct_args_match_elements(&mut self, inst: Inst, ty: Type, args: &[Value]) {
        let cx = self.cx;
        for (i, &arg) in args.iter().enumerate() {
            if arg == Value::Unused {
                continue;
            }
            let arg_ty = self.module.type_of(arg);
            let expected = ty.element(cx, i as u32);
            if Some(arg_ty) != expected {
                let expected = expected.map_or_else(|| "<none>".to_string(), |ty| ty.name(cx));
                self.operand_error(
                    inst,
                    i,
                    format!(
                        "type {} of argument {i} does not match expected type {expected}",
                        self.ty_name(arg_ty)
                    ),
                );
            }
        }
    }

    fn check_builtin_call(&mut self, inst: Inst, f: BuiltinFn) {
        let module = self.module;
        let cx = self.cx;

        // NOTE the number of arguments is only known after overload resolution.
        if !self.check_results(inst, Some(1)) || !self.check_operands(inst, None) {
            return;
        }
        let Some(result_ty) = self.result_ty(inst) else {
            return;
        };
        let args: Vec<Value> = module.insts[inst].operands.iter().flatten().copied().collect();
        let arg_types: Vec<Type> = args.iter().map(|&v| module.type_of(v)).collect();

        let overload = match intrinsics::lookup_builtin(cx, f, &arg_types) {
            Ok(overload) => overload,
            Err(message) => {
                self.inst_error(inst, message);
                return;
            }
        };

        if overload.return_type != result_ty {
            self.inst_error(
                inst,
                format!(
                    "call result type {} does not match builtin return type {}",
                    self.ty_name(result_ty),
                    self.ty_name(overload.return_type)
                ),
            );
            return;
        }

        if matches!(f, BuiltinFn::SubgroupBroadcast | BuiltinFn::QuadBroadcast) {
            if !matches!(args.get(1), Some(Value::Const(_))) {
                self.operand_error(inst, 1, "non-constant ID provided");
            }
        } else {
            self.check_builtin_arg_in_range(inst, &overload.params, &args, ParamUsage::Component, 0, 3);
            self.check_builtin_arg_in_range(inst, &overload.params, &args, ParamUsage::Offset, -8, 7);
        }

        self.stage_restricted.insert(inst, overload.stages);
    }

    /// Check the argument for the `usage` parameter (if any) is a constant
    /// (with all components) within `[min, max]`.
    fn check_builtin_arg_in_range(
        &mut self,
        inst: Inst,
        params: &[ParamUsage],
        args: &[Value],
        usage: ParamUsage,
        min: i64,
        max: i64,
    ) {
        let cx = self.cx;
        let Some(idx) = params.iter().position(|&p| p == usage) else {
            return;
        };
        let Some(&arg) = args.get(idx) else {
            return;
        };
        let Value::Const(ct) = arg else {
            self.operand_error(inst, idx, "expected a constant value");
            return;
        };

        let values: Vec<i64> = if ct.ty(cx).vector_elem(cx).is_some() {
            (0..ct.num_elements(cx))
                .filter_map(|i| ct.element(cx, i).and_then(|elem| elem.as_i64(cx)))
                .collect()
        } else {
            ct.as_i64(cx).into_iter().collect()
        };
        if let Some(value) = values.into_iter().find(|v| !(min..=max).contains(v)) {
            self.operand_error(inst, idx, format!("{value} outside range of [{min}, {max}]"));
        }
    }

    fn check_user_call(&mut self, inst: Inst) {
        let module = self.module;

        if !self.check_results_and_operand_range(inst, 1, 1, None) {
            return;
        }

        let Some(Value::Func(target)) = module.operand(inst, 0) else {
            self.operand_error(inst, 0, "target not defined or not a function");
            return;
        };
        let target_decl = &module.funcs[target];

        if target_decl.is_entry_point() {
            self.operand_error(inst, 0, "call target must not have a pipeline stage");
        }

        if self.result_ty(inst) != Some(target_decl.ret_type) {
            self.inst_error(inst, "result type does not match function return type");
            return;
        }

        let num_args = module.insts[inst].operands.len() - 1;
        let params = &target_decl.params;
        if num_args != params.len() {
            self.operand_error(
                inst,
                0,
                format!(
                    "function has {} parameters, but call provides {num_args} arguments",
                    params.len()
                ),
            );
            return;
        }

        for (i, &param) in params.iter().enumerate() {
            let param_ty = module.func_params[param].ty;
            let Some(arg_ty) = self.operand_ty(inst, i + 1) else {
                continue;
            };
            if arg_ty != param_ty {
                self.operand_error(
                    inst,
                    i + 1,
                    format!(
                        "type {} of function parameter {i} does not match argument type {}",
                        self.ty_name(param_ty),
                        self.ty_name(arg_ty)
                    ),
                );
            }
        }
    }

    fn check_phony(&mut self, inst: Inst) {
        if !self.caps.contains(Capability::AllowPhonyInstructions) {
            self.inst_error(inst, "missing capability 'AllowPhonyInstructions'");
            return;
        }
        self.check_results_and_operands(inst, 0, 1);
    }

    // Control-flow.

    fn check_if(&mut self, inst: Inst, true_block: Block, false_block: Block) {
        let module = self.module;
        let cx = self.cx;

        self.check_results(inst, None);
        self.check_operands(inst, Some(1));

        if let Some(cond_ty) = self.operand_ty(inst, 0) {
            if !cond_ty.is_bool(cx) {
                self.operand_error(inst, 0, "condition type must be 'bool'");
            }
        }

        if module.blocks[false_block].is_multi_in() {
            self.inst_error(inst, "if false block must be a block");
        }
        if module.blocks[true_block].is_multi_in() {
            self.inst_error(inst, "if true block must be a block");
        }

        // NOTE tasks run in reverse order.
        self.tasks.push(Task::PopControl);
        if !module.blocks[false_block].is_empty() {
            self.queue_block(false_block);
        }
        self.queue_block(true_block);
        self.tasks.push(Task::PushControl(inst));
    }

    fn check_loop(&mut self, inst: Inst, initializer: Block, body: Block, continuing: Block) {
        let module = self.module;

        self.check_results(inst, None);
        self.check_operands(inst, Some(0));

        let has_initializer = !module.blocks[initializer].is_empty();
        let has_continuing = !module.blocks[continuing].is_empty();

        if has_initializer {
            let terminated_by_next_iteration =
                module.blocks[initializer].terminator().is_some_and(|term| {
                    matches!(module.insts[term].kind, InstKind::NextIteration(_))
                });
            if !terminated_by_next_iteration {
                self.add_error(
                    DiagAnchor::Block(initializer),
                    "loop initializer must have a NextIteration terminator",
                );
            }
        }

        // NOTE tasks run in reverse order, with the continuing block nested
        // in the body block, itself nested in the initializer block.
        self.tasks.push(Task::PopControl);
        if has_initializer {
            self.tasks.push(Task::EndBlock);
        }
        self.tasks.push(Task::EndBlock);
        if has_continuing {
            self.tasks.push(Task::EndBlock);
            self.tasks.push(Task::BeginLoopContinuing(inst));
        }
        self.tasks.push(Task::BeginLoopBody(inst));
        if has_initializer {
            self.tasks.push(Task::BeginBlock(initializer));
        }
        self.tasks.push(Task::PushControl(inst));
    }

    pub(super) fn check_loop_body(&mut self, inst: Inst) {
        let module = self.module;
        let InstKind::Loop { initializer, body, .. } = module.insts[inst].kind else {
            return;
        };
        if !module.blocks[body].params().is_empty() && module.blocks[initializer].is_empty() {
            self.inst_error(inst, "loop with body block parameters must have an initializer");
        }
    }

    pub(super) fn check_loop_continuing(&mut self, inst: Inst) {
        let module = self.module;
        let InstKind::Loop { body, continuing, .. } = module.insts[inst].kind else {
            return;
        };
        if module.blocks[continuing].is_empty() {
            return;
        }

        // Values declared after the first `continue` (or the instruction
        // holding it) aren't available in the continuing block.
        if let Some(&first_continue) = self.first_continues.get(&inst) {
            let mut holds_continue = Some(first_continue);
            while let Some(held) = holds_continue {
                match module.insts[held].block {
                    Some(block) if block != body => holds_continue = module.blocks[block].parent,
                    _ => break,
                }
            }

            let body_insts = &module.blocks[body].insts;
            let start = holds_continue.and_then(|held| body_insts.iter().position(|&i| i == held));
            for &body_inst in start.map_or(&[][..], |start| &body_insts[start..]) {
                for &result in &module.insts[body_inst].results {
                    for usage in &module.inst_results[result].uses {
                        if !self.transitively_holds(continuing, usage.inst) {
                            continue;
                        }
                        let name = self.name_of(result.into());
                        let declared = self.declaration_note(result.into());
                        self.add_error(
                            DiagAnchor::Operand { inst: usage.inst, idx: usage.operand_idx },
                            format!(
                                "{name} cannot be used in continuing block as it is declared \
                                 after the first continue in the loop's body"
                            ),
                        )
                        .notes
                        .extend(declared.into_iter().chain([Diag::note(
                            DiagAnchor::Inst(first_continue),
                            "loop body's first continue",
                        )]));
                    }
                }
            }
        }

        let terminator_ok = module.blocks[continuing].terminator().is_some_and(|term| {
            matches!(module.insts[term].kind, InstKind::NextIteration(_) | InstKind::BreakIf(_))
        });
        if !terminator_ok {
            self.add_error(
                DiagAnchor::Block(continuing),
                "loop continuing terminator can only be next_iteration or break_if",
            );
        }
    }

    fn check_switch(&mut self, inst: Inst) {
        let module = self.module;
        let cx = self.cx;

        self.check_results(inst, None);
        self.check_operands(inst, Some(1));

        if let Some(cond_ty) = self.operand_ty(inst, 0) {
            if !cond_ty.is_integer_scalar(cx) {
                self.operand_error(
                    inst,
                    0,
                    format!("condition type {} must be an integer scalar", self.ty_name(cond_ty)),
                );
            }
        }

        let InstKind::Switch { cases } = &module.insts[inst].kind else {
            return;
        };

        self.tasks.push(Task::PopControl);

        let mut found_default = false;
        for case in cases {
            if module.blocks[case.block].is_multi_in() {
                self.inst_error(inst, "case block must be a block");
            }
            if case.selectors.is_empty() {
                self.inst_error(inst, "case does not have any selectors");
            }

            self.queue_block(case.block);
            for selector in &case.selectors {
                match *selector {
                    CaseSelector::Default => {
                        if found_default {
                            self.inst_error(inst, "multiple default selectors in switch");
                        }
                        found_default = true;
                    }
                    CaseSelector::Value(ct) => {
                        let ty = ct.ty(cx);
                        if !ty.is_integer_scalar(cx) {
                            self.inst_error(
                                inst,
                                format!(
                                    "case selector type {} must be an integer scalar",
                                    self.ty_name(ty)
                                ),
                            );
                        }
                    }
                }
            }
        }

        if !found_default {
            self.inst_error(inst, "missing default case for switch");
        }

        self.tasks.push(Task::PushControl(inst));
    }

    // Terminators.

    fn check_terminator(&mut self, inst: Inst) {
        let module = self.module;
        let inst_def = &module.insts[inst];

        if !self.check_results(inst, Some(0)) {
            return;
        }
        // NOTE `return` has its own operand count rules.
        if !matches!(inst_def.kind, InstKind::Return) && !self.check_operands(inst, None) {
            return;
        }

        match inst_def.kind {
            InstKind::Return => self.check_return(inst),
            InstKind::Unreachable => {
                self.check_operands(inst, Some(0));
            }
            InstKind::TerminateInvocation => {}
            InstKind::ExitIf(target) => {
                if self.check_exit(inst, target, |kind| matches!(kind, InstKind::If { .. })) {
                    self.check_exit_if(inst, target);
                }
            }
            InstKind::ExitSwitch(target) => {
                if self.check_exit(inst, target, |kind| matches!(kind, InstKind::Switch { .. })) {
                    self.check_controls_allowing_if(inst, target);
                }
            }
            InstKind::ExitLoop(target) => {
                if self.check_exit(inst, target, |kind| matches!(kind, InstKind::Loop { .. })) {
                    self.check_exit_loop(inst, target);
                }
            }
            InstKind::Continue(target) => self.check_continue(inst, target),
            InstKind::NextIteration(target) => self.check_next_iteration(inst, target),
            InstKind::BreakIf(target) => self.check_break_if(inst, target),
            _ => {}
        }

        let block = inst_def.block.map(|block| &module.blocks[block]);
        if block.is_some_and(|block| block.terminator() != Some(inst)) {
            self.inst_error(inst, "must be the last instruction in the block");
        }
    }

    fn check_return(&mut self, inst: Inst) {
        let module = self.module;
        let cx = self.cx;

        if !self.check_operand_range(inst, 1, Some(2)) {
            return;
        }

        let Some(Value::Func(func)) = module.operand(inst, 0) else {
            self.inst_error(inst, "expected function for first operand");
            return;
        };
        if Some(func) != self.containing_function(inst) {
            self.inst_error(inst, "function operand does not match containing function");
            return;
        }

        let ret_type = module.funcs[func].ret_type;
        let value = module.operand(inst, 1);
        if ret_type.is_void(cx) {
            if module.insts[inst].operands.len() > 1 {
                self.inst_error(inst, "unexpected return value");
            }
        } else {
            match value {
                None => {
                    self.inst_error(inst, "expected return value");
                }
                Some(value) => {
                    let value_ty = module.type_of(value);
                    if value_ty != ret_type {
                        self.inst_error(
                            inst,
                            format!(
                                "return value type {} does not match function return type {}",
                                self.ty_name(value_ty),
                                self.ty_name(ret_type)
                            ),
                        );
                    }
                }
            }
        }
    }

    /// Common rules for `exit_if`/`exit_switch`/`exit_loop`, returning
    /// `false` if `target` isn't a valid target at all.
    fn check_exit(&mut self, inst: Inst, target: Inst, is_kind: fn(&InstKind) -> bool) -> bool {
        let module = self.module;

        if !module.insts[target].alive || !is_kind(&module.insts[target].kind) {
            self.inst_error(inst, "has no parent control instruction");
            return false;
        }

        if self.control_stack.is_empty() {
            self.inst_error(inst, "found outside all control instructions");
            return false;
        }

        let num_args = module.insts[inst].operands.len();
        let target_values: Vec<Value> =
            module.insts[target].results.iter().map(|&r| Value::InstResult(r)).collect();
        self.check_operands_match_target(inst, 0, num_args, DiagAnchor::Inst(target), &target_values);
        true
    }

    fn check_exit_if(&mut self, inst: Inst, target: Inst) {
        if let Some(&innermost) = self.control_stack.last() {
            if innermost != target {
                self.inst_error(inst, "if target jumps over other control instructions")
                    .notes
                    .push(Diag::note(DiagAnchor::Inst(innermost), "first control instruction jumped"));
            }
        }
    }

    /// Exits may only jump over `if`s (to reach their target).
    fn check_controls_allowing_if(&mut self, inst: Inst, target: Inst) {
        let module = self.module;
        let target_name = module.insts[target].kind.friendly_name();

        let mut found = false;
        for &control in self.control_stack.clone().iter().rev() {
            if control == target {
                found = true;
                break;
            }
            if !matches!(module.insts[control].kind, InstKind::If { .. }) {
                self.inst_error(inst, format!("{target_name} target jumps over other control instructions"))
                    .notes
                    .push(Diag::note(DiagAnchor::Inst(control), "first control instruction jumped"));
                return;
            }
        }
        if !found {
            self.inst_error(inst, format!("{target_name} not found in parent control instructions"));
        }
    }

    fn check_exit_loop(&mut self, inst: Inst, target: Inst) {
        let module = self.module;

        self.check_controls_allowing_if(inst, target);

        let InstKind::Loop { initializer, continuing, .. } = module.insts[target].kind else {
            return;
        };
        let exit_block = module.insts[inst].block;

        // Find the block (directly in the loop) holding the exit.
        let mut current = Some(inst);
        while let Some(held) = current {
            let Some(block) = module.insts[held].block else {
                break;
            };
            if module.blocks[block].parent == Some(target) {
                if block == continuing {
                    let diag = self.inst_error(inst, "loop exit jumps out of continuing block");
                    if exit_block != Some(continuing) {
                        diag.notes
                            .push(Diag::note(DiagAnchor::Block(continuing), "in continuing block"));
                    }
                } else if block == initializer {
                    let diag = self.inst_error(inst, "loop exit not permitted in loop initializer");
                    if exit_block != Some(initializer) {
                        diag.notes
                            .push(Diag::note(DiagAnchor::Block(initializer), "in initializer block"));
                    }
                }
                break;
            }
            current = module.blocks[block].parent;
        }
    }

    /// The `(initializer, body, continuing)` blocks of `target`, if a loop.
    fn loop_blocks(&mut self, inst: Inst, target: Inst) -> Option<(Block, Block, Block)> {
        match self.module.insts[target].kind {
            InstKind::Loop { initializer, body, continuing } if self.module.insts[target].alive => {
                Some((initializer, body, continuing))
            }
            _ => {
                self.inst_error(inst, "has no associated loop");
                None
            }
        }
    }

    fn block_param_values(&self, block: Block) -> Vec<Value> {
        self.module.blocks[block].params().iter().map(|&p| Value::BlockParam(p)).collect()
    }

    fn check_continue(&mut self, inst: Inst, target: Inst) {
        let Some((_, body, continuing)) = self.loop_blocks(inst, target) else {
            return;
        };

        if !self.transitively_holds(body, inst) {
            if self.control_stack.contains(&target) {
                self.inst_error(inst, "must only be called from loop body");
            } else {
                self.inst_error(inst, "called outside of associated loop");
            }
        }

        let num_args = self.module.insts[inst].operands.len();
        let params = self.block_param_values(continuing);
        self.check_operands_match_target(inst, 0, num_args, DiagAnchor::Block(continuing), &params);

        self.first_continues.entry(target).or_insert(inst);
    }

    fn check_next_iteration(&mut self, inst: Inst, target: Inst) {
        let Some((initializer, body, continuing)) = self.loop_blocks(inst, target) else {
            return;
        };

        if !self.transitively_holds(initializer, inst) && !self.transitively_holds(continuing, inst)
        {
            if self.control_stack.contains(&target) {
                self.inst_error(inst, "must only be called from loop initializer or continuing");
            } else {
                self.inst_error(inst, "called outside of associated loop");
            }
        }

        let num_args = self.module.insts[inst].operands.len();
        let params = self.block_param_values(body);
        self.check_operands_match_target(inst, 0, num_args, DiagAnchor::Block(body), &params);
    }

    fn check_break_if(&mut self, inst: Inst, target: Inst) {
        let module = self.module;
        let cx = self.cx;

        let Some(cond) = module.operand(inst, 0) else {
            self.inst_error(inst, "break_if condition cannot be nullptr");
            return;
        };
        if !module.type_of(cond).is_bool(cx) {
            self.inst_error(inst, "condition must be a 'bool'");
            return;
        }

        let Some((_, body, continuing)) = self.loop_blocks(inst, target) else {
            return;
        };

        if module.insts[inst].block != Some(continuing) {
            self.inst_error(inst, "must only be called directly from loop continuing");
        }

        // NOTE the operands after the condition are split between the body
        // block parameters, and the loop results.
        let num_values = module.insts[inst].operands.len() - 1;
        let body_params = self.block_param_values(body);
        let num_next_iter = body_params.len().min(num_values);
        self.check_operands_match_target(inst, 1, num_next_iter, DiagAnchor::Block(body), &body_params);

        let loop_results: Vec<Value> =
            module.insts[target].results.iter().map(|&r| Value::InstResult(r)).collect();
        self.check_operands_match_target(
            inst,
            1 + num_next_iter,
            num_values - num_next_iter,
            DiagAnchor::Inst(target),
            &loop_results,
        );
    }

    /// Check `count` operands of `inst` (starting at `offset`) match the
    /// values (block parameters or results) of `target`, by count and type.
    fn check_operands_match_target(
        &mut self,
        inst: Inst,
        offset: usize,
        count: usize,
        target: DiagAnchor,
        target_values: &[Value],
    ) {
        let module = self.module;
        let target_name = match target {
            DiagAnchor::Block(block) => self.block_name(block),
            DiagAnchor::Inst(target) => module.insts[target].kind.friendly_name().into_owned(),
            _ => String::new(),
        };

        if count != target_values.len() {
            let values = |n: usize| if n == 1 { "value" } else { "values" };
            let note = self.anchor_declaration_note(target);
            self.inst_error(
                inst,
                format!(
                    "provides {count} {} but {target_name} expects {} {}",
                    values(count),
                    target_values.len(),
                    values(target_values.len())
                ),
            )
            .notes
            .extend(note);
        }

        for (i, &target_value) in target_values.iter().enumerate().take(count) {
            let Some(source) = module.operand(inst, offset + i) else {
                continue;
            };
            let source_ty = module.type_of(source);
            let target_ty = module.type_of(target_value);
            if source_ty != target_ty {
                let note = self.declaration_note(target_value);
                self.operand_error(
                    inst,
                    offset + i,
                    format!(
                        "operand with type {} does not match {target_name} target type {}",
                        self.ty_name(source_ty),
                        self.ty_name(target_ty)
                    ),
                )
                .notes
                .extend(note);
            }
        }
    }
}

/// The `bitcast` overloads: reinterpreting 32-bit scalars (or vectors of
/// them) between each other, and to/from `f16` vectors of the same size.
fn is_valid_bitcast(cx: &crate::Context, from: Type, to: Type) -> bool {
    let is_32bit = |ty: Type| matches!(cx[ty].kind, TypeKind::I32 | TypeKind::U32 | TypeKind::F32);
    let is_f16 = |ty: Type| matches!(cx[ty].kind, TypeKind::F16);
    let vector = |ty: Type| match cx[ty].kind {
        TypeKind::Vector { elem, width } => Some((elem, width)),
        _ => None,
    };

    match (vector(from), vector(to)) {
        (None, None) => (is_32bit(from) && is_32bit(to)) || (is_f16(from) && is_f16(to)),
        (None, Some((to_elem, to_width))) => is_32bit(from) && to_width == 2 && is_f16(to_elem),
        (Some((from_elem, from_width)), None) => {
            from_width == 2 && is_f16(from_elem) && is_32bit(to)
        }
        (Some((from_elem, from_width)), Some((to_elem, to_width))) => {
            if is_32bit(from_elem) {
                (from_width == to_width && is_32bit(to_elem))
                    || (from_width == 2 && to_width == 4 && is_f16(to_elem))
            } else if is_f16(from_elem) {
                (is_f16(to_elem) && from_width == to_width)
                    || (from_width == 4 && to_width == 2 && is_32bit(to_elem))
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid_bitcast;
    use crate::Context;

    #[test]
    fn bitcast_overloads() {
        let cx = Context::new();
        let (i32_, u32_, f32_, f16) = (cx.ty_i32(), cx.ty_u32(), cx.ty_f32(), cx.ty_f16());
        assert!(is_valid_bitcast(&cx, i32_, f32_));
        assert!(is_valid_bitcast(&cx, f16, f16));
        assert!(is_valid_bitcast(&cx, u32_, cx.ty_vec(f16, 2)));
        assert!(is_valid_bitcast(&cx, cx.ty_vec(f16, 2), i32_));
        assert!(is_valid_bitcast(&cx, cx.ty_vec(u32_, 2), cx.ty_vec(f16, 4)));
        assert!(is_valid_bitcast(&cx, cx.ty_vec(f16, 4), cx.ty_vec(f32_, 2)));
        assert!(is_valid_bitcast(&cx, cx.ty_vec(i32_, 3), cx.ty_vec(f32_, 3)));

        assert!(!is_valid_bitcast(&cx, f16, f32_));
        assert!(!is_valid_bitcast(&cx, cx.ty_vec(i32_, 3), cx.ty_vec(f32_, 2)));
        assert!(!is_valid_bitcast(&cx, cx.ty_bool(), u32_));
    }
}
