//! IR validation, i.e. checking a [`Module`] satisfies every rule that passes
//! (and backends) are allowed to assume.
//!
//! Validation happens in two phases:
//! * structural checks: the root block, then every function, with nested
//!   blocks walked through an explicit task stack (instead of recursion),
//!   so that each instruction is only allowed to use values in scope
//! * whole-module checks (recursion, orphaned instructions, and pipeline
//!   stage restrictions), which are skipped if the first phase failed
//!
//! Which IR shapes are legal depends on the [`Capabilities`] passed in, as
//! later passes gradually lower the IR into backend-specific forms.

mod insts;
mod io;
mod types;

pub use types::MAX_STRUCT_MEMBER_PADDING;

use crate::caps::{Capabilities, Capability};
use crate::intrinsics::SupportedStages;
use crate::print::{render_diags, Disassembler};
use crate::{
    Block, Context, Diag, DiagAnchor, Failure, Func, FxIndexMap, FxIndexSet, Inst, InstKind,
    InternedStr, Module, PipelineStage, Type, TypeKind, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Validate `module`, allowing the IR relaxations in `caps`.
///
/// On failure, every diagnostic found is returned (in the order found),
/// along with their rendering, which ends in a disassembly of the module.
pub fn validate(module: &Module, caps: Capabilities) -> Result<(), Failure> {
    log::trace!("validating module with capabilities [{}]", itertools::join(caps.iter(), ", "));

    let mut validator = Validator::new(module, caps);
    validator.run();
    validator.finish()
}

/// Deferred work for the structural checks, processed in LIFO order.
enum Task {
    BeginBlock(Block),
    EndBlock,
    /// Check instruction `idx` of `block` (after queueing the next one).
    CheckInst { block: Block, idx: usize },
    PushControl(Inst),
    PopControl,
    BeginLoopBody(Inst),
    BeginLoopContinuing(Inst),
}

/// Functions called, and module-scope variables used, directly by a function.
#[derive(Default)]
struct DirectRefs {
    callees: FxIndexSet<Func>,
    vars: FxIndexSet<Inst>,
}

struct Validator<'a> {
    module: &'a Module,
    cx: &'a Context,
    caps: Capabilities,

    diags: Vec<Diag>,

    /// Only created once names are needed (i.e. for diagnostics).
    disassembler: Option<Disassembler<'a>>,

    all_functions: FxIndexSet<Func>,
    body_to_func: FxHashMap<Block, Func>,
    direct_refs: FxHashMap<Func, DirectRefs>,
    transitive_vars: FxHashMap<Func, Rc<FxIndexSet<Inst>>>,

    visited_insts: FxHashSet<Inst>,

    tasks: Vec<Task>,
    block_stack: Vec<Block>,
    control_stack: Vec<Inst>,
    scope_stack: Vec<FxHashSet<Value>>,

    /// The first `continue` of each loop in the control stack (once seen).
    first_continues: FxHashMap<Inst, Inst>,

    /// Instructions only usable from some pipeline stages.
    stage_restricted: FxIndexMap<Inst, SupportedStages>,

    seen_override_ids: FxHashSet<u16>,
    entry_point_names: FxHashSet<InternedStr>,
    validated_types: FxHashSet<(Type, Capabilities)>,
}

impl<'a> Validator<'a> {
    fn new(module: &'a Module, caps: Capabilities) -> Self {
        let mut validator = Validator {
            module,
            cx: module.cx_ref(),
            caps,
            diags: vec![],
            disassembler: None,
            all_functions: FxIndexSet::default(),
            body_to_func: FxHashMap::default(),
            direct_refs: FxHashMap::default(),
            transitive_vars: FxHashMap::default(),
            visited_insts: FxHashSet::default(),
            tasks: vec![],
            block_stack: vec![],
            control_stack: vec![],
            scope_stack: vec![],
            first_continues: FxHashMap::default(),
            stage_restricted: FxIndexMap::default(),
            seen_override_ids: FxHashSet::default(),
            entry_point_names: FxHashSet::default(),
            validated_types: FxHashSet::default(),
        };
        for &func in &module.functions {
            validator.body_to_func.insert(module.funcs[func].body, func);
            let refs = validator.collect_direct_refs(func);
            validator.direct_refs.insert(func, refs);
        }
        validator
    }

    fn run(&mut self) {
        self.run_structural_checks();
        if self.has_errors() {
            return;
        }

        self.check_for_recursion();
        if self.has_errors() {
            return;
        }

        self.check_for_orphaned_insts();
        if self.has_errors() {
            return;
        }

        self.check_stage_restricted_insts();
    }

    fn finish(mut self) -> Result<(), Failure> {
        if !self.has_errors() {
            return Ok(());
        }
        let module = self.module;
        let disassembler = self.disassembler.take().unwrap_or_else(|| Disassembler::new(module));
        self.diags.push(Diag::note(
            DiagAnchor::Module,
            format!("# Disassembly\n{}", disassembler.text()),
        ));
        let rendered = render_diags(&disassembler, &self.diags);
        log::trace!("validation failed with {} diagnostics", self.diags.len());
        Err(Failure::Invalid { diags: self.diags, rendered })
    }

    fn has_errors(&self) -> bool {
        self.diags.iter().any(Diag::is_error)
    }

    // Diagnostics.

    /// Record an error against `anchor`, returning it so notes can be added.
    ///
    /// Errors against instructions (or their operands/results) are prefixed
    /// with the instruction's name, and note the block being walked.
    fn add_error(&mut self, anchor: DiagAnchor, message: impl Into<String>) -> &mut Diag {
        let message = message.into();
        let diag = match anchor {
            DiagAnchor::Inst(inst)
            | DiagAnchor::Operand { inst, .. }
            | DiagAnchor::Result { inst, .. } => {
                let name = self.module.insts[inst].kind.friendly_name();
                let mut diag = Diag::err(anchor, format!("{name}: {message}"));
                if let Some(&block) = self.block_stack.last() {
                    diag.notes.push(Diag::note(DiagAnchor::Block(block), "in block"));
                }
                diag
            }
            _ => Diag::err(anchor, message),
        };
        self.diags.push(diag);
        let last = self.diags.len() - 1;
        &mut self.diags[last]
    }

    fn inst_error(&mut self, inst: Inst, message: impl Into<String>) -> &mut Diag {
        self.add_error(DiagAnchor::Inst(inst), message)
    }

    fn operand_error(&mut self, inst: Inst, idx: usize, message: impl Into<String>) -> &mut Diag {
        self.add_error(DiagAnchor::Operand { inst, idx: idx as u32 }, message)
    }

    fn result_error(&mut self, inst: Inst, idx: usize, message: impl Into<String>) -> &mut Diag {
        self.add_error(DiagAnchor::Result { inst, idx: idx as u32 }, message)
    }

    fn disassembler(&mut self) -> &Disassembler<'a> {
        let module = self.module;
        self.disassembler.get_or_insert_with(|| Disassembler::new(module))
    }

    fn name_of(&mut self, v: Value) -> String {
        self.disassembler().value(v)
    }

    fn block_name(&mut self, block: Block) -> String {
        self.disassembler().block(block)
    }

    fn ty_name(&self, ty: Type) -> String {
        ty.name(self.cx)
    }

    /// Note pointing at where `v` is declared (`None` for constants).
    fn declaration_note(&mut self, v: Value) -> Option<Diag> {
        let anchor = match v {
            Value::InstResult(result) => {
                let inst = self.module.inst_results[result].inst?;
                let idx = self.module.insts[inst].results.iter().position(|&r| r == result)?;
                DiagAnchor::Result { inst, idx: idx as u32 }
            }
            Value::FuncParam(param) => DiagAnchor::FuncParam(param),
            Value::BlockParam(param) => DiagAnchor::BlockParam(param),
            Value::Func(func) => DiagAnchor::Func(func),
            Value::Const(_) | Value::Unused => return None,
        };
        let name = self.name_of(v);
        Some(Diag::note(anchor, format!("{name} declared here")))
    }

    /// Note pointing at an arbitrary diagnostic anchor (e.g. a conflicting
    /// shader IO declaration).
    fn anchor_declaration_note(&mut self, anchor: DiagAnchor) -> Option<Diag> {
        let name = match anchor {
            DiagAnchor::Func(func) => self.name_of(func.into()),
            DiagAnchor::FuncParam(param) => self.name_of(param.into()),
            DiagAnchor::BlockParam(param) => self.name_of(param.into()),
            DiagAnchor::Block(block) => self.block_name(block),
            DiagAnchor::Inst(inst) => self.module.insts[inst].kind.friendly_name().into_owned(),
            DiagAnchor::Value(v) => return self.declaration_note(v),
            DiagAnchor::Module | DiagAnchor::Operand { .. } | DiagAnchor::Result { .. } => {
                return None;
            }
        };
        Some(Diag::note(anchor, format!("{name} declared here")))
    }

    // Scopes and tasks.

    fn push_scope(&mut self) {
        self.scope_stack.push(FxHashSet::default());
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn add_to_scope(&mut self, v: Value) {
        if let Some(scope) = self.scope_stack.last_mut() {
            scope.insert(v);
        }
    }

    fn is_in_scope(&self, v: Value) -> bool {
        self.scope_stack.iter().any(|scope| scope.contains(&v))
    }

    fn queue_block(&mut self, block: Block) {
        self.tasks.push(Task::EndBlock);
        self.tasks.push(Task::BeginBlock(block));
    }

    fn queue_insts(&mut self, block: Block, idx: usize) {
        // Stop walking after any error, later checks assume earlier ones passed.
        if self.has_errors() {
            return;
        }
        if idx < self.module.blocks[block].insts.len() {
            self.tasks.push(Task::CheckInst { block, idx });
        }
    }

    fn process_tasks(&mut self) {
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::BeginBlock(block) => self.begin_block(block),
                Task::EndBlock => self.end_block(),
                Task::CheckInst { block, idx } => {
                    self.queue_insts(block, idx + 1);
                    let inst = self.module.blocks[block].insts[idx];
                    self.check_inst(inst);
                }
                Task::PushControl(inst) => self.control_stack.push(inst),
                Task::PopControl => {
                    if let Some(inst) = self.control_stack.pop() {
                        self.first_continues.remove(&inst);
                    }
                }
                Task::BeginLoopBody(loop_inst) => {
                    self.check_loop_body(loop_inst);
                    if let InstKind::Loop { body, .. } = self.module.insts[loop_inst].kind {
                        self.begin_block(body);
                    }
                }
                Task::BeginLoopContinuing(loop_inst) => {
                    self.check_loop_continuing(loop_inst);
                    if let InstKind::Loop { continuing, .. } = self.module.insts[loop_inst].kind {
                        self.begin_block(continuing);
                    }
                }
            }
        }
    }

    fn begin_block(&mut self, block: Block) {
        let module = self.module;
        let cx = self.cx;
        log::trace!("entering block {block:?}");

        self.push_scope();
        self.block_stack.push(block);

        let block_def = &module.blocks[block];
        for &param in block_def.params() {
            let param_def = &module.block_params[param];
            let anchor = DiagAnchor::BlockParam(param);
            if !param_def.alive {
                self.add_error(anchor, "destroyed parameter found in block parameter list");
                return;
            }
            match param_def.block {
                None => {
                    self.add_error(anchor, "block parameter has nullptr parent block");
                    return;
                }
                Some(parent) if parent != block => {
                    let name = self.block_name(parent);
                    self.add_error(anchor, "block parameter has incorrect parent block").notes.push(
                        Diag::note(
                            DiagAnchor::Block(parent),
                            format!("parent block {name} declared here"),
                        ),
                    );
                    return;
                }
                Some(_) => {}
            }

            self.check_type(param_def.ty, anchor, Capabilities::from(Capability::AllowRefTypes));

            if param_def.ty.is_void(cx) {
                self.add_error(anchor, "block parameter type cannot be void");
            }

            self.add_to_scope(param.into());
        }

        let terminated = block_def
            .terminator()
            .is_some_and(|inst| module.insts[inst].kind.is_terminator());
        if !terminated {
            self.add_error(DiagAnchor::Block(block), "block does not end in a terminator instruction");
            return;
        }

        for &inst in &block_def.insts {
            if module.insts[inst].block != Some(block) {
                self.inst_error(inst, "block instruction does not have same block as parent");
                return;
            }
        }

        self.queue_insts(block, 0);
    }

    fn end_block(&mut self) {
        self.pop_scope();
        self.block_stack.pop();
    }

    // Structural checks.

    fn run_structural_checks(&mut self) {
        let module = self.module;

        self.push_scope();

        self.check_root_block();

        for &func in &module.functions {
            if !self.all_functions.insert(func) {
                let name = self.name_of(func.into());
                self.add_error(
                    DiagAnchor::Func(func),
                    format!("function {name} added to module multiple times"),
                );
            } else {
                self.add_to_scope(func.into());
            }
        }

        for &func in &module.functions {
            self.check_function(func);
        }

        self.pop_scope();

        // NOTE every check must leave these balanced, even after errors.
        let balanced = self.scope_stack.is_empty()
            && self.tasks.is_empty()
            && self.control_stack.is_empty()
            && self.block_stack.is_empty();
        if !balanced {
            self.diags.push(Diag::bug(DiagAnchor::Module, "unbalanced validation stacks"));
        }
    }

    fn check_root_block(&mut self) {
        let module = self.module;
        let root = module.root_block;

        self.block_stack.push(root);

        let mut evaluatable = FxHashSet::default();
        for &inst in &module.blocks[root].insts {
            let inst_def = &module.insts[inst];
            if inst_def.block != Some(root) {
                self.inst_error(inst, "instruction in root block does not have root block as parent");
                continue;
            }

            let pipeline_creatable = inst_def.operands.iter().flatten().all(|&v| {
                matches!(v, Value::Const(_)) || evaluatable.contains(&v)
            });
            if !pipeline_creatable {
                self.inst_error(inst, "instruction is not evaluatable at pipeline creation time");
            }

            let allow_overrides = self.caps.contains(Capability::AllowOverrides);
            let allow_lets = self.caps.contains(Capability::AllowModuleScopeLets);
            let legal = match inst_def.kind {
                InstKind::Var { .. } => {
                    self.check_inst(inst);
                    continue;
                }
                InstKind::Override { .. } => allow_overrides,
                InstKind::Let => allow_lets,
                InstKind::Construct => allow_lets || allow_overrides,
                InstKind::Unary(_)
                | InstKind::Binary(_)
                | InstKind::BuiltinCall(_)
                | InstKind::Convert
                | InstKind::Swizzle { .. }
                | InstKind::Access
                | InstKind::Bitcast => allow_overrides,
                _ => false,
            };
            if !legal {
                let name = inst_def.kind.friendly_name();
                self.inst_error(inst, format!("root block: invalid instruction: {name}"));
                continue;
            }

            // NOTE only overrides and lets may be used from function bodies.
            if !matches!(inst_def.kind, InstKind::Override { .. } | InstKind::Let) {
                self.check_only_used_in_root_block(inst);
            }
            self.check_inst(inst);
            if pipeline_creatable {
                evaluatable.extend(inst_def.results.iter().map(|&r| Value::InstResult(r)));
            }
        }

        self.process_tasks();

        self.block_stack.pop();
    }

    fn check_only_used_in_root_block(&mut self, inst: Inst) {
        let module = self.module;
        let root = module.root_block;
        for &result in &module.insts[inst].results {
            for usage in &module.inst_results[result].uses {
                if module.insts[usage.inst].block != Some(root) {
                    let name = module.insts[usage.inst].kind.friendly_name();
                    self.inst_error(
                        inst,
                        format!("root block: instruction used outside of root block {name}"),
                    );
                }
            }
        }
    }

    fn check_function(&mut self, func: Func) {
        // Holds the parameters (and the body's values, in nested scopes).
        self.push_scope();
        self.check_function_in_scope(func);
        self.pop_scope();
    }

    fn check_function_in_scope(&mut self, func: Func) {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];
        let func_anchor = DiagAnchor::Func(func);
        let is_entry_point = func_decl.is_entry_point();

        log::trace!("validating function `{}`", &cx[func_decl.name]);

        if is_entry_point {
            if !self.caps.contains(Capability::AllowMultipleEntryPoints)
                && !self.entry_point_names.is_empty()
            {
                self.add_error(
                    func_anchor,
                    "a module with multiple entry points requires the AllowMultipleEntryPoints \
                     capability",
                );
                return;
            }

            if !self.entry_point_names.insert(func_decl.name) {
                let name = &cx[func_decl.name];
                self.add_error(func_anchor, format!("entry point name {name} is not unique"));
            }
        }

        if module.blocks[func_decl.body].is_multi_in() {
            self.add_error(func_anchor, "root block for function cannot be a multi-in block");
            return;
        }

        let mut seen_params = FxHashSet::default();
        for &param in &func_decl.params {
            let param_def = &module.func_params[param];
            let anchor = DiagAnchor::FuncParam(param);
            let ty = param_def.ty;

            if !param_def.alive {
                self.add_error(anchor, "destroyed parameter found in function parameter list");
                return;
            }
            match param_def.func {
                None => {
                    self.add_error(anchor, "function parameter has nullptr parent function");
                    return;
                }
                Some(parent) if parent != func => {
                    let name = self.name_of(parent.into());
                    self.add_error(anchor, "function parameter has incorrect parent function")
                        .notes
                        .push(Diag::note(
                            DiagAnchor::Func(parent),
                            format!("parent function {name} declared here"),
                        ));
                    return;
                }
                Some(_) => {}
            }

            if !seen_params.insert(param) {
                self.add_error(anchor, "function parameter is not unique");
                continue;
            }

            // NOTE references are never allowed in function signatures.
            self.check_type(ty, anchor, Capabilities::from(Capability::AllowRefTypes));

            if !is_valid_function_param_type(cx, ty) {
                let allowed_ptr_to_handle = self.caps.contains(Capability::AllowPointerToHandle)
                    && matches!(cx[ty].kind, TypeKind::Pointer(mv) if mv.store.is_handle(cx));
                let allowed_interface_struct =
                    self.caps.contains(Capability::MslAllowEntryPointInterface)
                        && ty.struct_def(cx).is_some_and(|def| {
                            def.members.iter().all(|m| is_valid_function_param_type(cx, m.ty))
                        });
                if !allowed_ptr_to_handle && !allowed_interface_struct {
                    self.add_error(
                        anchor,
                        format!(
                            "function parameter type, {}, must be constructible, a pointer, or \
                             a handle",
                            self.ty_name(ty)
                        ),
                    );
                }
            }

            let msl_interface = self.caps.contains(Capability::MslAllowEntryPointInterface);
            if is_entry_point && !msl_interface && ty.is_pointer(cx) {
                self.add_error(anchor, "entry point parameters cannot be pointers");
            }

            if func_decl.stage == PipelineStage::Fragment {
                self.check_front_facing_if_bool(
                    anchor,
                    ty,
                    &param_def.attrs,
                    "fragment entry point params can only be a bool if decorated with \
                     @builtin(front_facing)",
                );
            } else if is_entry_point {
                self.check_not_bool(
                    anchor,
                    ty,
                    "entry point params can only be a bool for fragment shaders",
                );
            }

            let mv = ty.memory_view(cx);
            if let Some(mv) = mv {
                if mv.addr_space == crate::AddrSpace::PixelLocal && !mv.store.is_struct(cx) {
                    self.add_error(anchor, "pixel_local param must be of type struct");
                }
            }

            if is_entry_point {
                self.validate_shader_io_annotations(
                    anchor,
                    ty,
                    &param_def.attrs,
                    io::ShaderIOKind::InputParam,
                );
            } else {
                if param_def.attrs.binding_point.is_some() {
                    self.add_error(
                        anchor,
                        "input param to non-entry point function has a binding point set",
                    );
                }
                if param_def.attrs.builtin.is_some() {
                    self.add_error(anchor, "builtins can only be decorated on entry point params");
                }
            }

            if is_entry_point
                && !msl_interface
                && ty.is_pointer(cx)
                && mv.is_some_and(|mv| mv.addr_space == crate::AddrSpace::Workgroup)
            {
                self.add_error(
                    anchor,
                    "input param to entry point cannot be a ptr in the 'workgroup' address space",
                );
            }

            self.add_to_scope(param.into());
        }

        let ret_type = func_decl.ret_type;
        self.check_type(ret_type, func_anchor, Capabilities::from(Capability::AllowRefTypes));

        // NOTE `void` isn't constructible, but means "no return value".
        if !ret_type.is_void(cx) && !ret_type.is_constructible(cx) {
            self.add_error(func_anchor, "function return type must be constructible");
        }

        self.validate_io_attributes(func);

        if is_entry_point && cx[func_decl.name].is_empty() {
            self.add_error(func_anchor, "entry points must have names");
        }

        self.check_workgroup_size(func);
        self.check_subgroup_size(func);

        if func_decl.stage == PipelineStage::Compute && !ret_type.is_void(cx) {
            self.add_error(
                func_anchor,
                format!(
                    "compute entry point must not have a return type, found {}",
                    self.ty_name(ret_type)
                ),
            );
        }

        if is_entry_point {
            self.validate_shader_io_annotations(
                func_anchor,
                ret_type,
                &func_decl.ret_attrs,
                io::ShaderIOKind::ResultValue,
            );
            self.check_not_bool(
                func_anchor,
                ret_type,
                "entry point returns can not be 'bool'",
            );

            if !self.check_entry_point_module_vars(func) {
                return;
            }
        }

        if func_decl.stage == PipelineStage::Vertex {
            self.check_position_present_for_vertex_output(func);
        }

        self.queue_block(func_decl.body);
        self.process_tasks();
    }

    /// Check the module-scope variables referenced by entry point `func`,
    /// returning `false` if checking `func` any further is pointless.
    fn check_entry_point_module_vars(&mut self, func: Func) -> bool {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];

        let mut binding_points = FxHashSet::default();
        let mut user_declared_immediate = None;
        for &var in self.transitive_vars(func).iter() {
            let var_attrs = match &module.insts[var].kind {
                InstKind::Var { attrs } => attrs,
                _ => continue,
            };
            let anchor = DiagAnchor::Inst(var);

            if !self.caps.contains(Capability::AllowDuplicateBindings) {
                if let Some(bp) = var_attrs.binding_point {
                    if !binding_points.insert(bp) {
                        let name = self.name_of(func.into());
                        self.add_error(
                            anchor,
                            format!(
                                "found non-unique binding point, {bp}, being referenced in entry \
                                 point, {name}"
                            ),
                        );
                    }
                }
            }

            let Some(mv) = module.result(var).and_then(|r| module.inst_results[r].ty.memory_view(cx))
            else {
                continue;
            };

            if mv.addr_space == crate::AddrSpace::Immediate {
                if user_declared_immediate.is_some() {
                    let name = self.name_of(func.into());
                    self.add_error(
                        anchor,
                        format!(
                            "multiple user-declared immediate data variables referenced by entry \
                             point {name}"
                        ),
                    );
                    return false;
                }
                user_declared_immediate = Some(var);
            }

            match mv.addr_space {
                crate::AddrSpace::In if func_decl.stage == PipelineStage::Fragment => {
                    self.check_front_facing_if_bool(
                        anchor,
                        mv.store,
                        var_attrs,
                        "input address space values referenced by fragment shaders can only be \
                         'bool' if decorated with @builtin(front_facing)",
                    );
                }
                crate::AddrSpace::In | crate::AddrSpace::Out => {
                    self.check_not_bool(
                        anchor,
                        mv.store,
                        "IO address space values referenced by shader entry points can only be \
                         'bool' if in the input space, used only by fragment shaders and \
                         decorated with @builtin(front_facing)",
                    );
                }
                _ => {}
            }
        }
        true
    }

    fn check_workgroup_size(&mut self, func: Func) {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];
        let anchor = DiagAnchor::Func(func);

        let Some(sizes) = func_decl.workgroup_size else {
            if func_decl.stage == PipelineStage::Compute {
                self.add_error(anchor, "compute entry point requires @workgroup_size");
            }
            return;
        };

        if func_decl.stage != PipelineStage::Compute {
            self.add_error(anchor, "@workgroup_size only valid on compute entry point");
            return;
        }

        let first_ty = module.type_of(sizes[0]);
        let mut total: u64 = 1;
        for size in sizes {
            let ty = module.type_of(size);
            if !ty.is_integer_scalar(cx) {
                self.add_error(
                    anchor,
                    format!(
                        "@workgroup_size params must be an 'i32' or 'u32', received {}",
                        self.ty_name(ty)
                    ),
                );
                return;
            }
            if ty != first_ty {
                self.add_error(anchor, "@workgroup_size params must be all 'i32's or all 'u32's");
                return;
            }

            match size {
                Value::Const(ct) => {
                    let value = ct.as_i64(cx).unwrap_or(0);
                    if value <= 0 {
                        self.add_error(anchor, "@workgroup_size params must be greater than 0");
                        return;
                    }
                    total = total.saturating_mul(value as u64);
                }
                _ => {
                    if self.module_scope_size_inst(anchor, size, "@workgroup_size").is_none() {
                        return;
                    }
                }
            }
        }

        if total > u64::from(u32::MAX) {
            self.add_error(anchor, "workgroup grid size cannot exceed 0xffffffff");
        }
    }

    fn check_subgroup_size(&mut self, func: Func) {
        let module = self.module;
        let cx = self.cx;
        let func_decl = &module.funcs[func];
        let anchor = DiagAnchor::Func(func);

        let Some(size) = func_decl.subgroup_size else {
            return;
        };

        if func_decl.stage != PipelineStage::Compute {
            self.add_error(anchor, "@subgroup_size only valid on compute entry point");
            return;
        }

        let ty = module.type_of(size);
        if !ty.is_integer_scalar(cx) {
            self.add_error(
                anchor,
                format!(
                    "@subgroup_size param must be an 'i32' or 'u32', received {}",
                    self.ty_name(ty)
                ),
            );
            return;
        }

        match size {
            Value::Const(ct) => {
                let value = ct.as_i64(cx).unwrap_or(0);
                if value <= 0 {
                    self.add_error(anchor, "@subgroup_size param must be greater than 0");
                    return;
                }
                if !(value as u64).is_power_of_two() {
                    self.add_error(anchor, "@subgroup_size param must be a power of 2");
                }
            }
            _ => {
                if let Some(inst) = self.module_scope_size_inst(anchor, size, "@subgroup_size") {
                    if !matches!(module.insts[inst].kind, InstKind::Override { .. }) {
                        self.add_error(
                            anchor,
                            "@subgroup_size must be an InstructionResult or a Constant",
                        );
                    }
                }
            }
        }
    }

    /// Non-constant `@workgroup_size`/`@subgroup_size` values must be results
    /// of root block instructions (only possible with overrides).
    fn module_scope_size_inst(&mut self, anchor: DiagAnchor, v: Value, attr: &str) -> Option<Inst> {
        let module = self.module;

        if !self.caps.contains(Capability::AllowOverrides) {
            self.add_error(
                anchor,
                format!(
                    "{attr} param is not a constant value, and IR capability 'AllowOverrides' \
                     is not set"
                ),
            );
            return None;
        }

        let Value::InstResult(result) = v else {
            self.add_error(anchor, format!("{attr} must be an InstructionResult or a Constant"));
            return None;
        };
        let Some(inst) = module.inst_results[result].inst else {
            self.add_error(anchor, format!("instruction for {attr} param is not defined"));
            return None;
        };
        if module.insts[inst].block != Some(module.root_block) {
            self.add_error(anchor, format!("{attr} param defined by non-module scope value"));
            return None;
        }
        Some(inst)
    }

    // Whole-module checks.

    fn check_for_recursion(&mut self) {
        let module = self.module;
        for &func in &module.functions {
            if self.transitive_callees(func).contains(&func) {
                self.add_error(DiagAnchor::Func(func), "recursive function calls are not allowed");
                return;
            }
        }
    }

    fn check_for_orphaned_insts(&mut self) {
        let module = self.module;
        for (inst, inst_def) in module.insts.iter() {
            if inst_def.alive && !self.visited_insts.contains(&inst) {
                let name = inst_def.kind.friendly_name();
                self.inst_error(inst, format!("orphaned instruction: {name}"));
            }
        }
    }

    fn check_stage_restricted_insts(&mut self) {
        let module = self.module;
        let restricted: Vec<_> = self.stage_restricted.iter().map(|(&i, &s)| (i, s)).collect();
        for (inst, stages) in restricted {
            let Some(func) = self.containing_function(inst) else {
                continue;
            };
            let entry_points: Vec<Func> = if module.funcs[func].is_entry_point() {
                vec![func]
            } else {
                module
                    .functions
                    .iter()
                    .copied()
                    .filter(|&ep| {
                        module.funcs[ep].is_entry_point()
                            && self.transitive_callees(ep).contains(&func)
                    })
                    .collect()
            };
            for ep in entry_points {
                let stage = module.funcs[ep].stage;
                if !stages.contains(stage) {
                    self.inst_error(inst, format!("cannot be used in a {stage} shader"));
                }
            }
        }
    }

    // Module structure queries.

    /// Function whose body (transitively) holds `inst` (`None` for the root
    /// block, or detached instructions).
    fn containing_function(&self, inst: Inst) -> Option<Func> {
        let module = self.module;
        let mut block = module.insts[inst].block?;
        loop {
            match module.blocks[block].parent {
                Some(parent) => block = module.insts[parent].block?,
                None => return self.body_to_func.get(&block).copied(),
            }
        }
    }

    fn collect_direct_refs(&self, func: Func) -> DirectRefs {
        let module = self.module;
        let root = module.root_block;
        let mut refs = DirectRefs::default();

        // NOTE root block values used through other root block instructions
        // (e.g. an `access` of a `var`) also count as used.
        let mut pending_root_insts = vec![];
        let mut seen_root_insts = FxHashSet::default();
        for_each_inst_in(module, module.funcs[func].body, |inst| {
            let inst_def = &module.insts[inst];
            if let (InstKind::UserCall, Some(Some(Value::Func(callee)))) =
                (&inst_def.kind, inst_def.operands.first())
            {
                refs.callees.insert(*callee);
            }
            for &v in inst_def.operands.iter().flatten() {
                if let Value::InstResult(result) = v {
                    if let Some(def_inst) = module.inst_results[result].inst {
                        if module.insts[def_inst].block == Some(root)
                            && seen_root_insts.insert(def_inst)
                        {
                            pending_root_insts.push(def_inst);
                        }
                    }
                }
            }
        });
        while let Some(inst) = pending_root_insts.pop() {
            let inst_def = &module.insts[inst];
            if let InstKind::Var { .. } = inst_def.kind {
                refs.vars.insert(inst);
            }
            for &v in inst_def.operands.iter().flatten() {
                if let Value::InstResult(result) = v {
                    if let Some(def_inst) = module.inst_results[result].inst {
                        if module.insts[def_inst].block == Some(root)
                            && seen_root_insts.insert(def_inst)
                        {
                            pending_root_insts.push(def_inst);
                        }
                    }
                }
            }
        }
        refs
    }

    /// Every function (transitively) called from `func`.
    fn transitive_callees(&self, func: Func) -> FxIndexSet<Func> {
        let mut callees = FxIndexSet::default();
        let mut stack = vec![func];
        while let Some(caller) = stack.pop() {
            if let Some(refs) = self.direct_refs.get(&caller) {
                for &callee in &refs.callees {
                    if callees.insert(callee) {
                        stack.push(callee);
                    }
                }
            }
        }
        callees
    }

    /// Every module-scope `var` used by `func`, or any function it calls.
    fn transitive_vars(&mut self, func: Func) -> Rc<FxIndexSet<Inst>> {
        if let Some(vars) = self.transitive_vars.get(&func) {
            return vars.clone();
        }
        let mut vars = FxIndexSet::default();
        for f in std::iter::once(func).chain(self.transitive_callees(func)) {
            if let Some(refs) = self.direct_refs.get(&f) {
                vars.extend(refs.vars.iter().copied());
            }
        }
        let vars = Rc::new(vars);
        self.transitive_vars.insert(func, vars.clone());
        vars
    }

    /// Whether `block` is `inst`'s block, or (transitively) contains it.
    fn transitively_holds(&self, block: Block, inst: Inst) -> bool {
        let module = self.module;
        let mut current = module.insts[inst].block;
        while let Some(b) = current {
            if b == block {
                return true;
            }
            current = module.blocks[b].parent.and_then(|parent| module.insts[parent].block);
        }
        false
    }
}

/// Call `f` on every instruction in `block`, and in all blocks nested in it.
fn for_each_inst_in(module: &Module, block: Block, mut f: impl FnMut(Inst)) {
    let mut seen_blocks = FxHashSet::default();
    let mut stack = vec![block];
    while let Some(block) = stack.pop() {
        if !seen_blocks.insert(block) {
            continue;
        }
        for &inst in &module.blocks[block].insts {
            f(inst);
            stack.extend(module.insts[inst].kind.child_blocks());
        }
    }
}

/// Basic function parameter rules: constructible, a (non-`handle`) pointer,
/// or a handle.
fn is_valid_function_param_type(cx: &Context, ty: Type) -> bool {
    if ty.is_constructible(cx) || ty.is_handle(cx) {
        return true;
    }
    match cx[ty].kind {
        TypeKind::Pointer(mv) => mv.addr_space != crate::AddrSpace::Handle,
        _ => false,
    }
}
