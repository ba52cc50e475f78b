//! Immutable IR traversal.

use crate::{Block, BlockDef, Const, Func, FuncDecl, Inst, InstDef, Module, Type, Value};

/// An entity (e.g. [`Block`] or [`Inst`]) paired with the [`Module`] that
/// defines it, which is needed to access its definition.
#[derive(Copy, Clone)]
pub struct ModuleAt<'a, P: Copy> {
    pub module: &'a Module,
    pub position: P,
}

impl Module {
    pub fn at<P: Copy>(&self, position: P) -> ModuleAt<'_, P> {
        ModuleAt { module: self, position }
    }
}

impl<'a, P: Copy> ModuleAt<'a, P> {
    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> ModuleAt<'a, P2> {
        ModuleAt { module: self.module, position: new_position }
    }
}

impl<'a> ModuleAt<'a, Func> {
    pub fn def(self) -> &'a FuncDecl {
        &self.module.funcs[self.position]
    }
}

impl<'a> ModuleAt<'a, Block> {
    pub fn def(self) -> &'a BlockDef {
        &self.module.blocks[self.position]
    }
}

impl<'a> ModuleAt<'a, Inst> {
    pub fn def(self) -> &'a InstDef {
        &self.module.insts[self.position]
    }
}

// FIXME `Sized` bound shouldn't be needed but removing it requires
// writing `impl Visitor<'a> + ?Sized` in `fn inner_visit_with` signatures.
pub trait Visitor<'a>: Sized {
    // Context-interned leaves (noop default behavior).
    fn visit_type_use(&mut self, _ty: Type) {}
    fn visit_const_use(&mut self, _ct: Const) {}

    // Values (only forwarding constants to `visit_const_use` by default).
    fn visit_value_use(&mut self, v: Value) {
        if let Value::Const(ct) = v {
            self.visit_const_use(ct);
        }
    }

    // Non-leaves (defaulting to calling `.inner_visit_with(self)`).
    fn visit_module(&mut self, module: &'a Module) {
        module.inner_visit_with(self);
    }
    fn visit_func_decl(&mut self, func: ModuleAt<'a, Func>) {
        func.inner_visit_with(self);
    }
    fn visit_block_def(&mut self, block: ModuleAt<'a, Block>) {
        block.inner_visit_with(self);
    }
    fn visit_inst_def(&mut self, inst: ModuleAt<'a, Inst>) {
        inst.inner_visit_with(self);
    }
}

impl Module {
    /// Visit the root block, then every function (in module order).
    pub fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        visitor.visit_block_def(self.at(self.root_block));
        for &func in &self.functions {
            visitor.visit_func_decl(self.at(func));
        }
    }
}

impl<'a> ModuleAt<'a, Func> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        let FuncDecl {
            name: _,
            stage: _,
            params,
            ret_type,
            ret_attrs: _,
            workgroup_size,
            subgroup_size,
            body,
            uses: _,
        } = self.def();

        for &param in params {
            visitor.visit_type_use(self.module.func_params[param].ty);
        }
        visitor.visit_type_use(*ret_type);
        for &v in workgroup_size.iter().flatten().chain(subgroup_size) {
            visitor.visit_value_use(v);
        }
        visitor.visit_block_def(self.at(*body));
    }
}

impl<'a> ModuleAt<'a, Block> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        let block_def = self.def();
        for &param in block_def.params() {
            visitor.visit_type_use(self.module.block_params[param].ty);
        }
        for &inst in &block_def.insts {
            visitor.visit_inst_def(self.at(inst));
        }
    }
}

impl<'a> ModuleAt<'a, Inst> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        let InstDef { kind, operands, results, block: _, alive: _ } = self.def();

        for &v in operands.iter().flatten() {
            visitor.visit_value_use(v);
        }
        for &result in results {
            visitor.visit_type_use(self.module.inst_results[result].ty);
        }
        for block in kind.child_blocks() {
            visitor.visit_block_def(self.at(block));
        }
    }
}

/// Collects every instruction (reachable from the module's root block and
/// function list) satisfying a predicate, in traversal order.
pub struct InstCollector<F> {
    pub pred: F,
    pub found: Vec<Inst>,
}

impl<F: FnMut(&Module, Inst) -> bool> InstCollector<F> {
    pub fn collect(module: &Module, pred: F) -> Vec<Inst> {
        let mut collector = InstCollector { pred, found: vec![] };
        collector.visit_module(module);
        collector.found
    }

    /// Like [`InstCollector::collect`], but only looking at the instructions
    /// nested (at any depth) in the blocks of `inst`.
    pub fn collect_within(module: &Module, inst: Inst, pred: F) -> Vec<Inst> {
        let mut collector = InstCollector { pred, found: vec![] };
        module.at(inst).inner_visit_with(&mut collector);
        collector.found
    }
}

impl<'a, F: FnMut(&Module, Inst) -> bool> Visitor<'a> for InstCollector<F> {
    fn visit_inst_def(&mut self, inst: ModuleAt<'a, Inst>) {
        if (self.pred)(inst.module, inst.position) {
            self.found.push(inst.position);
        }
        inst.inner_visit_with(self);
    }
}
