//! Creating and editing IR, while keeping [`Usage`]s in sync.
//!
//! All the graph mutation primitives live on [`Module`] (operand updates,
//! use-list rewrites, insertion and destruction), and [`Builder`] layers a
//! convenient "append at insertion point" API for new instructions on top.

use crate::intrinsics::{BinaryOp, BuiltinFn, UnaryOp};
use crate::{
    Block, BlockDef, BlockKind, BlockParam, BlockParamDef, CaseSelector, Const, Func, FuncDecl,
    FuncParam, FuncParamDef, IOAttributes, Inst, InstDef, InstKind, InstResult, InstResultDef,
    InternedStr, Module, PipelineStage, SwitchCase, Type, Usage, Value,
};
use smallvec::SmallVec;

impl Module {
    /// Add a new (non-entry point) function, with an empty body, at the end
    /// of the module's function list.
    pub fn add_function(&mut self, name: &str, ret_type: Type) -> Func {
        let name = self.cx_ref().intern(name);
        let body = self.blocks.define(BlockDef::default());
        let func = self.funcs.define(FuncDecl {
            name,
            stage: PipelineStage::Undefined,
            params: SmallVec::new(),
            ret_type,
            ret_attrs: IOAttributes::default(),
            workgroup_size: None,
            subgroup_size: None,
            body,
            uses: vec![],
        });
        self.functions.push(func);
        func
    }

    /// Add a new entry point (see also [`Module::add_function`]).
    pub fn add_entry_point(&mut self, name: &str, stage: PipelineStage, ret_type: Type) -> Func {
        let func = self.add_function(name, ret_type);
        self.funcs[func].stage = stage;
        func
    }

    pub fn add_func_param(
        &mut self,
        func: Func,
        name: Option<&str>,
        ty: Type,
        attrs: IOAttributes,
    ) -> FuncParam {
        let name = name.map(|name| self.cx_ref().intern(name));
        let param = self.func_params.define(FuncParamDef {
            ty,
            name,
            func: Some(func),
            attrs,
            alive: true,
            uses: vec![],
        });
        self.funcs[func].params.push(param);
        param
    }

    /// Create a new (detached) block, to be owned by a control instruction.
    pub fn new_block(&mut self) -> Block {
        self.blocks.define(BlockDef::default())
    }

    pub fn new_multi_in_block(&mut self) -> Block {
        self.blocks.define(BlockDef {
            kind: BlockKind::MultiIn { params: SmallVec::new() },
            ..BlockDef::default()
        })
    }

    /// Add a parameter to a [`BlockKind::MultiIn`] block (turning a plain
    /// block into one if needed).
    pub fn add_block_param(&mut self, block: Block, name: Option<&str>, ty: Type) -> BlockParam {
        let name = name.map(|name| self.cx_ref().intern(name));
        let param = self.block_params.define(BlockParamDef {
            ty,
            name,
            block: Some(block),
            alive: true,
            uses: vec![],
        });
        let block_def = &mut self.blocks[block];
        match &mut block_def.kind {
            BlockKind::MultiIn { params } => params.push(param),
            BlockKind::Plain => {
                block_def.kind = BlockKind::MultiIn { params: [param].into_iter().collect() };
            }
        }
        param
    }

    /// The type of any value, including functions (`<function>`) and the
    /// `Unused` placeholder (`void`).
    pub fn type_of(&self, v: Value) -> Type {
        let cx = self.cx_ref();
        match v {
            Value::Const(ct) => cx[ct].ty,
            Value::InstResult(r) => self.inst_results[r].ty,
            Value::FuncParam(p) => self.func_params[p].ty,
            Value::BlockParam(p) => self.block_params[p].ty,
            Value::Func(_) => cx.ty_function(),
            Value::Unused => cx.ty_void(),
        }
    }

    pub fn uses(&self, v: Value) -> &[Usage] {
        match v {
            Value::InstResult(r) => &self.inst_results[r].uses,
            Value::FuncParam(p) => &self.func_params[p].uses,
            Value::BlockParam(p) => &self.block_params[p].uses,
            Value::Func(f) => &self.funcs[f].uses,
            Value::Const(_) | Value::Unused => &[],
        }
    }

    fn uses_mut(&mut self, v: Value) -> Option<&mut Vec<Usage>> {
        match v {
            Value::InstResult(r) => Some(&mut self.inst_results[r].uses),
            Value::FuncParam(p) => Some(&mut self.func_params[p].uses),
            Value::BlockParam(p) => Some(&mut self.block_params[p].uses),
            Value::Func(f) => Some(&mut self.funcs[f].uses),
            Value::Const(_) | Value::Unused => None,
        }
    }

    pub fn name_of(&self, v: Value) -> Option<InternedStr> {
        match v {
            Value::InstResult(r) => self.inst_results[r].name,
            Value::FuncParam(p) => self.func_params[p].name,
            Value::BlockParam(p) => self.block_params[p].name,
            Value::Func(f) => Some(self.funcs[f].name),
            Value::Const(_) | Value::Unused => None,
        }
    }

    /// Name a value (only instruction results and parameters can be named).
    pub fn set_name(&mut self, v: Value, name: &str) {
        let name = Some(self.cx_ref().intern(name));
        match v {
            Value::InstResult(r) => self.inst_results[r].name = name,
            Value::FuncParam(p) => self.func_params[p].name = name,
            Value::BlockParam(p) => self.block_params[p].name = name,
            Value::Func(_) | Value::Const(_) | Value::Unused => {}
        }
    }

    /// The first (usually only) result of `inst`.
    pub fn result(&self, inst: Inst) -> Option<InstResult> {
        self.insts[inst].results.first().copied()
    }

    pub fn operand(&self, inst: Inst, idx: usize) -> Option<Value> {
        self.insts[inst].operands.get(idx).copied().flatten()
    }

    /// Replace operand `idx` of `inst` (which must already exist), moving
    /// the [`Usage`] from the old value to the new one.
    pub fn set_operand(&mut self, inst: Inst, idx: usize, value: Option<Value>) {
        let usage = Usage { inst, operand_idx: idx as u32 };
        if let Some(old) = self.insts[inst].operands[idx] {
            if let Some(uses) = self.uses_mut(old) {
                uses.retain(|&u| u != usage);
            }
        }
        self.insts[inst].operands[idx] = value;
        if let Some(new) = value {
            if let Some(uses) = self.uses_mut(new) {
                uses.push(usage);
            }
        }
    }

    pub fn push_operand(&mut self, inst: Inst, value: Option<Value>) {
        let idx = self.insts[inst].operands.len();
        self.insts[inst].operands.push(None);
        self.set_operand(inst, idx, value);
    }

    /// Remove every operand of `inst` (and their [`Usage`]s).
    pub fn clear_operands(&mut self, inst: Inst) {
        for idx in 0..self.insts[inst].operands.len() {
            self.set_operand(inst, idx, None);
        }
        self.insts[inst].operands.clear();
    }

    /// Make every user of `old` use `new` instead, going through the use-list
    /// of `old` (instead of walking the IR).
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        let uses = match self.uses_mut(old) {
            Some(uses) => std::mem::take(uses),
            None => return,
        };
        for usage in uses {
            let idx = usage.operand_idx as usize;
            // NOTE the usage was already removed from `old`, so only the
            // operand itself, and the use-list of `new`, need updating.
            self.insts[usage.inst].operands[idx] = Some(new);
            if let Some(new_uses) = self.uses_mut(new) {
                new_uses.push(usage);
            }
        }
    }

    /// Create a new (detached) instruction, recording its operand usages.
    pub fn new_inst(
        &mut self,
        kind: InstKind,
        operands: impl IntoIterator<Item = Option<Value>>,
        result_types: &[Type],
    ) -> Inst {
        let inst = self.insts.define(InstDef {
            kind,
            operands: SmallVec::new(),
            results: SmallVec::new(),
            block: None,
            alive: true,
        });
        for operand in operands {
            self.push_operand(inst, operand);
        }
        for &ty in result_types {
            self.add_result(inst, ty);
        }
        let child_blocks = self.insts[inst].kind.child_blocks();
        for block in child_blocks {
            self.blocks[block].parent = Some(inst);
        }
        inst
    }

    pub fn add_result(&mut self, inst: Inst, ty: Type) -> InstResult {
        let result =
            self.inst_results.define(InstResultDef { ty, name: None, inst: Some(inst), uses: vec![] });
        self.insts[inst].results.push(result);
        result
    }

    fn position_in_block(&self, inst: Inst) -> Option<(Block, usize)> {
        let block = self.insts[inst].block?;
        let idx = self.blocks[block].insts.iter().position(|&i| i == inst)?;
        Some((block, idx))
    }

    /// Insert a detached `inst` at the end of `block`.
    pub fn append(&mut self, block: Block, inst: Inst) {
        self.blocks[block].insts.push(inst);
        self.insts[inst].block = Some(block);
    }

    /// Insert a detached `inst` right before `before` (in its block).
    pub fn insert_before(&mut self, before: Inst, inst: Inst) {
        if let Some((block, idx)) = self.position_in_block(before) {
            self.blocks[block].insts.insert(idx, inst);
            self.insts[inst].block = Some(block);
        }
    }

    pub fn insert_after(&mut self, after: Inst, inst: Inst) {
        if let Some((block, idx)) = self.position_in_block(after) {
            self.blocks[block].insts.insert(idx + 1, inst);
            self.insts[inst].block = Some(block);
        }
    }

    /// Detach `inst` from its block, without destroying it.
    pub fn remove_from_block(&mut self, inst: Inst) {
        if let Some((block, idx)) = self.position_in_block(inst) {
            self.blocks[block].insts.remove(idx);
        }
        self.insts[inst].block = None;
    }

    /// Destroy `inst`: detach it, drop all its operand usages, detach its
    /// results, and (for control instructions) destroy every instruction
    /// in its blocks. Its results must no longer have any uses.
    pub fn destroy_inst(&mut self, inst: Inst) {
        self.remove_from_block(inst);
        self.clear_operands(inst);
        let child_blocks = self.insts[inst].kind.child_blocks();
        for child in child_blocks {
            self.destroy_block_contents(child);
        }
        let results = self.insts[inst].results.clone();
        for result in results {
            self.inst_results[result].inst = None;
        }
        self.insts[inst].alive = false;
    }

    /// Move every instruction of `from` to the end of `to` (keeping their
    /// order, results and usages).
    pub fn move_block_contents(&mut self, from: Block, to: Block) {
        let insts = std::mem::take(&mut self.blocks[from].insts);
        for &inst in &insts {
            self.insts[inst].block = Some(to);
        }
        self.blocks[to].insts.extend(insts);
    }

    /// Destroy every instruction in `block` (leaving it empty).
    pub fn destroy_block_contents(&mut self, block: Block) {
        while let Some(&inst) = self.blocks[block].insts.last() {
            self.destroy_inst(inst);
        }
    }
}

/// Where a [`Builder`] inserts new instructions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    /// At the end of a block (in order).
    End(Block),
    /// Before an instruction (in order, all before it).
    Before(Inst),
    /// After an instruction (in order, each after the previous one).
    After(Inst),
}

pub struct Builder<'a> {
    pub module: &'a mut Module,
    pub at: InsertPoint,
}

impl<'a> Builder<'a> {
    pub fn new(module: &'a mut Module, at: InsertPoint) -> Self {
        Self { module, at }
    }

    pub fn at_end(module: &'a mut Module, block: Block) -> Self {
        Self::new(module, InsertPoint::End(block))
    }

    pub fn before(module: &'a mut Module, inst: Inst) -> Self {
        Self::new(module, InsertPoint::Before(inst))
    }

    fn insert(&mut self, inst: Inst) -> Inst {
        match self.at {
            InsertPoint::End(block) => self.module.append(block, inst),
            InsertPoint::Before(before) => self.module.insert_before(before, inst),
            InsertPoint::After(after) => {
                self.module.insert_after(after, inst);
                self.at = InsertPoint::After(inst);
            }
        }
        inst
    }

    /// Create and insert an instruction.
    pub fn inst(
        &mut self,
        kind: InstKind,
        operands: impl IntoIterator<Item = Value>,
        result_types: &[Type],
    ) -> Inst {
        let inst = self.module.new_inst(kind, operands.into_iter().map(Some), result_types);
        self.insert(inst)
    }

    /// Like [`Builder::inst`], returning the single result.
    fn value_inst(
        &mut self,
        kind: InstKind,
        operands: impl IntoIterator<Item = Value>,
        ty: Type,
    ) -> InstResult {
        let inst = self.inst(kind, operands, &[ty]);
        self.module.insts[inst].results[0]
    }

    /// Declare a `var`, with `ptr_type` being its (pointer) result type.
    pub fn var(
        &mut self,
        name: Option<&str>,
        ptr_type: Type,
        init: Option<Value>,
        attrs: IOAttributes,
    ) -> InstResult {
        let inst = self.module.new_inst(InstKind::Var { attrs }, [init], &[ptr_type]);
        self.insert(inst);
        let result = self.module.insts[inst].results[0];
        if let Some(name) = name {
            self.module.set_name(result.into(), name);
        }
        result
    }

    pub fn let_(&mut self, name: Option<&str>, value: Value) -> InstResult {
        let ty = self.module.type_of(value);
        let result = self.value_inst(InstKind::Let, [value], ty);
        if let Some(name) = name {
            self.module.set_name(result.into(), name);
        }
        result
    }

    pub fn override_(&mut self, ty: Type, id: Option<u16>, init: Option<Value>) -> InstResult {
        let inst = self.module.new_inst(InstKind::Override { id }, [init], &[ty]);
        self.insert(inst);
        self.module.insts[inst].results[0]
    }

    /// Load through a memory view, producing a value of its store type.
    pub fn load(&mut self, from: Value) -> InstResult {
        let cx = self.module.cx();
        let ty = self.module.type_of(from).unwrap_ptr_or_ref(&cx);
        self.value_inst(InstKind::Load, [from], ty)
    }

    pub fn store(&mut self, to: Value, value: Value) -> Inst {
        self.inst(InstKind::Store, [to, value], &[])
    }

    pub fn load_vector_element(&mut self, from: Value, index: Value) -> InstResult {
        let cx = self.module.cx();
        let vec = self.module.type_of(from).unwrap_ptr_or_ref(&cx);
        let ty = vec.vector_elem(&cx).unwrap_or(vec);
        self.value_inst(InstKind::LoadVectorElement, [from, index], ty)
    }

    pub fn store_vector_element(&mut self, to: Value, index: Value, value: Value) -> Inst {
        self.inst(InstKind::StoreVectorElement, [to, index, value], &[])
    }

    pub fn access(
        &mut self,
        ty: Type,
        object: Value,
        indices: impl IntoIterator<Item = Value>,
    ) -> InstResult {
        let operands = std::iter::once(object).chain(indices);
        self.value_inst(InstKind::Access, operands, ty)
    }

    pub fn swizzle(&mut self, ty: Type, object: Value, indices: &[u32]) -> InstResult {
        let indices = indices.iter().copied().collect();
        self.value_inst(InstKind::Swizzle { indices }, [object], ty)
    }

    pub fn unary(&mut self, op: UnaryOp, ty: Type, value: Value) -> InstResult {
        self.value_inst(InstKind::Unary(op), [value], ty)
    }

    pub fn binary(&mut self, op: BinaryOp, ty: Type, lhs: Value, rhs: Value) -> InstResult {
        self.value_inst(InstKind::Binary(op), [lhs, rhs], ty)
    }

    pub fn bitcast(&mut self, ty: Type, value: Value) -> InstResult {
        self.value_inst(InstKind::Bitcast, [value], ty)
    }

    pub fn convert(&mut self, ty: Type, value: Value) -> InstResult {
        self.value_inst(InstKind::Convert, [value], ty)
    }

    pub fn construct(&mut self, ty: Type, args: impl IntoIterator<Item = Value>) -> InstResult {
        self.value_inst(InstKind::Construct, args, ty)
    }

    pub fn call(
        &mut self,
        ty: Type,
        func: Func,
        args: impl IntoIterator<Item = Value>,
    ) -> InstResult {
        let operands = std::iter::once(Value::Func(func)).chain(args);
        self.value_inst(InstKind::UserCall, operands, ty)
    }

    pub fn builtin_call(
        &mut self,
        ty: Type,
        f: BuiltinFn,
        args: impl IntoIterator<Item = Value>,
    ) -> InstResult {
        self.value_inst(InstKind::BuiltinCall(f), args, ty)
    }

    pub fn discard(&mut self) -> Inst {
        self.inst(InstKind::Discard, [], &[])
    }

    pub fn phony(&mut self, value: Value) -> Inst {
        self.inst(InstKind::Phony, [value], &[])
    }

    /// Create an `if`, with empty true/false blocks, and results of types
    /// `result_types` (to be provided by `exit_if`s).
    pub fn if_(&mut self, cond: Value, result_types: &[Type]) -> Inst {
        let true_block = self.module.new_block();
        let false_block = self.module.new_block();
        self.inst(InstKind::If { true_block, false_block }, [cond], result_types)
    }

    /// Create a `loop`, with an empty initializer, and empty (multi-in) body
    /// and continuing blocks.
    pub fn loop_(&mut self, result_types: &[Type]) -> Inst {
        let initializer = self.module.new_block();
        let body = self.module.new_multi_in_block();
        let continuing = self.module.new_multi_in_block();
        self.inst(InstKind::Loop { initializer, body, continuing }, [], result_types)
    }

    /// Create a `switch` without any cases (see [`Builder::switch_case`]).
    pub fn switch(&mut self, cond: Value, result_types: &[Type]) -> Inst {
        self.inst(InstKind::Switch { cases: SmallVec::new() }, [cond], result_types)
    }

    /// Add a case to `switch`, returning its (empty) block.
    pub fn switch_case(
        &mut self,
        switch: Inst,
        selectors: impl IntoIterator<Item = Option<Const>>,
    ) -> Block {
        let block = self.module.new_block();
        self.module.blocks[block].parent = Some(switch);
        let selectors = selectors
            .into_iter()
            .map(|selector| selector.map_or(CaseSelector::Default, CaseSelector::Value))
            .collect();
        if let InstKind::Switch { cases } = &mut self.module.insts[switch].kind {
            cases.push(SwitchCase { selectors, block });
        }
        block
    }

    /// Return from `func`, with an optional return value.
    pub fn return_(&mut self, func: Func, value: Option<Value>) -> Inst {
        self.inst(InstKind::Return, std::iter::once(Value::Func(func)).chain(value), &[])
    }

    pub fn unreachable(&mut self) -> Inst {
        self.inst(InstKind::Unreachable, [], &[])
    }

    pub fn terminate_invocation(&mut self) -> Inst {
        self.inst(InstKind::TerminateInvocation, [], &[])
    }

    pub fn exit_if(&mut self, if_: Inst, values: impl IntoIterator<Item = Value>) -> Inst {
        self.inst(InstKind::ExitIf(if_), values, &[])
    }

    pub fn exit_switch(&mut self, switch: Inst, values: impl IntoIterator<Item = Value>) -> Inst {
        self.inst(InstKind::ExitSwitch(switch), values, &[])
    }

    pub fn exit_loop(&mut self, loop_: Inst, values: impl IntoIterator<Item = Value>) -> Inst {
        self.inst(InstKind::ExitLoop(loop_), values, &[])
    }

    pub fn continue_(&mut self, loop_: Inst, values: impl IntoIterator<Item = Value>) -> Inst {
        self.inst(InstKind::Continue(loop_), values, &[])
    }

    pub fn next_iteration(&mut self, loop_: Inst, values: impl IntoIterator<Item = Value>) -> Inst {
        self.inst(InstKind::NextIteration(loop_), values, &[])
    }

    pub fn break_if(
        &mut self,
        loop_: Inst,
        cond: Value,
        next_iter_values: impl IntoIterator<Item = Value>,
        exit_values: impl IntoIterator<Item = Value>,
    ) -> Inst {
        let operands = std::iter::once(cond).chain(next_iter_values).chain(exit_values);
        self.inst(InstKind::BreakIf(loop_), operands, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AddrSpace, Access, Context};
    use std::rc::Rc;

    #[test]
    fn usages_follow_operand_edits() {
        let cx = Rc::new(Context::new());
        let mut m = Module::new(cx.clone());
        let f32 = cx.ty_f32();
        let func = m.add_function("f", f32);
        let body = m.funcs[func].body;
        let mut b = Builder::at_end(&mut m, body);
        let ptr_ty = cx.ty_ptr(AddrSpace::Function, f32, Access::ReadWrite);
        let ptr = b.var(Some("v"), ptr_ty, None, IOAttributes::default());
        let a = b.load(ptr.into());
        let c = b.load(ptr.into());
        let ret = b.return_(func, Some(a.into()));

        assert_eq!(m.uses(ptr.into()).len(), 2);
        assert_eq!(m.uses(a.into()), &[Usage { inst: ret, operand_idx: 1 }]);

        m.replace_all_uses_with(a.into(), c.into());
        assert!(m.uses(a.into()).is_empty());
        assert_eq!(m.uses(c.into()), &[Usage { inst: ret, operand_idx: 1 }]);
        assert_eq!(m.operand(ret, 1), Some(Value::InstResult(c)));
        assert_eq!(m.uses(Value::Func(func)).len(), 1);
    }

    #[test]
    fn destroy_detaches_everything() {
        let cx = Rc::new(Context::new());
        let mut m = Module::new(cx.clone());
        let func = m.add_function("f", cx.ty_void());
        let body = m.funcs[func].body;
        let mut b = Builder::at_end(&mut m, body);
        let if_ = b.if_(cx.const_bool(true).into(), &[]);
        let InstKind::If { true_block, .. } = b.module.insts[if_].kind else { unreachable!() };
        let mut inner = Builder::at_end(b.module, true_block);
        let exit = inner.exit_if(if_, []);
        Builder::at_end(&mut m, body).return_(func, None);

        m.destroy_inst(if_);
        assert!(!m.insts[if_].alive);
        assert!(!m.insts[exit].alive);
        assert_eq!(m.blocks[body].insts.len(), 1);
        assert!(m.blocks[true_block].is_empty());
    }

    #[test]
    fn insertion_points_keep_order() {
        let cx = Rc::new(Context::new());
        let mut m = Module::new(cx.clone());
        let func = m.add_function("f", cx.ty_void());
        let body = m.funcs[func].body;
        let ret = Builder::at_end(&mut m, body).return_(func, None);
        let mut b = Builder::before(&mut m, ret);
        let x = b.discard();
        let y = b.discard();
        assert_eq!(m.blocks[body].insts, [x, y, ret]);
    }
}
