//! Plain text disassembly of [`Module`]s, and naming of IR entities, as used
//! by diagnostics (see also [`render_diags`]).
//!
//! # Naming
//!
//! A [`Namer`] assigns every value and block a name, in printing order:
//! * values use their own name when they have one (`%name`, deduplicated by
//!   appending `_1`, `_2`, etc.), and a counter otherwise (`%1`, `%2`, etc.)
//! * blocks are always numbered (`$B1` being the root block)
//! * constants are printed inline (e.g. `1u`, `vec2<f32>(1.0f, 2.0f)`)

use itertools::Itertools as _;

use crate::visit::{ModuleAt, Visitor};
use crate::{
    Block, CaseSelector, Const, ConstKind, Context, Diag, DiagAnchor, Func, Inst, InstKind,
    Module, PipelineStage, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;

/// Names for every value and block reachable from a [`Module`].
pub struct Namer {
    values: FxHashMap<Value, String>,
    blocks: FxHashMap<Block, u32>,
    taken: FxHashSet<String>,
    next_value_id: u32,
}

impl Namer {
    pub fn new(module: &Module) -> Self {
        let mut namer = Namer {
            values: FxHashMap::default(),
            blocks: FxHashMap::default(),
            taken: FxHashSet::default(),
            next_value_id: 1,
        };
        for &func in &module.functions {
            let name = module.cx_ref()[module.funcs[func].name].to_string();
            namer.assign(module, Value::Func(func), Some(name));
        }
        namer.visit_module(module);
        namer
    }

    fn assign(&mut self, module: &Module, v: Value, name: Option<String>) {
        if self.values.contains_key(&v) {
            return;
        }
        let name = name.or_else(|| module.name_of(v).map(|name| module.cx_ref()[name].to_string()));
        let name = match name {
            Some(base) => {
                let mut candidate = format!("%{base}");
                let mut suffix = 1;
                while self.taken.contains(&candidate) {
                    candidate = format!("%{base}_{suffix}");
                    suffix += 1;
                }
                candidate
            }
            None => loop {
                let candidate = format!("%{}", self.next_value_id);
                self.next_value_id += 1;
                if !self.taken.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.taken.insert(name.clone());
        self.values.insert(v, name);
    }

    fn name_block(&mut self, block: Block) {
        let next = self.blocks.len() as u32 + 1;
        self.blocks.entry(block).or_insert(next);
    }

    /// `$B{n}`, for blocks reachable from the module (`$B?` otherwise).
    pub fn block(&self, block: Block) -> String {
        match self.blocks.get(&block) {
            Some(n) => format!("$B{n}"),
            None => "$B?".to_string(),
        }
    }

    pub fn value(&self, cx: &Context, v: Value) -> String {
        match v {
            Value::Const(ct) => const_text(cx, ct),
            Value::Unused => "unused".to_string(),
            _ => self.values.get(&v).cloned().unwrap_or_else(|| "%undef".to_string()),
        }
    }
}

impl<'a> Visitor<'a> for Namer {
    fn visit_func_decl(&mut self, func: ModuleAt<'a, Func>) {
        for &param in &func.def().params {
            self.assign(func.module, param.into(), None);
        }
        func.inner_visit_with(self);
    }

    fn visit_block_def(&mut self, block: ModuleAt<'a, Block>) {
        self.name_block(block.position);
        for &param in block.def().params() {
            self.assign(block.module, param.into(), None);
        }
        block.inner_visit_with(self);
    }

    fn visit_inst_def(&mut self, inst: ModuleAt<'a, Inst>) {
        for &result in &inst.def().results {
            self.assign(inst.module, result.into(), None);
        }
        // NOTE child blocks are named in printing order (which, for `loop`
        // and `if`, matches `child_blocks`).
        inst.inner_visit_with(self);
    }
}

/// Constant values, printed the way they'd appear as operands.
pub fn const_text(cx: &Context, ct: Const) -> String {
    let def = &cx[ct];
    match &def.kind {
        ConstKind::Bool(v) => v.to_string(),
        ConstKind::I8(v) => format!("{v}i8"),
        ConstKind::U8(v) => format!("{v}u8"),
        ConstKind::I32(v) => format!("{v}i"),
        ConstKind::U32(v) => format!("{v}u"),
        ConstKind::I64(v) => format!("{v}i64"),
        ConstKind::U64(v) => format!("{v}u64"),
        ConstKind::F16(bits) => format!("0x{bits:04x}h"),
        ConstKind::F32(bits) => format!("{:?}f", f32::from_bits(*bits)),
        ConstKind::Composite(elems) => {
            let elems = elems.iter().map(|&elem| const_text(cx, elem)).join(", ");
            format!("{}({elems})", def.ty.name(cx))
        }
        &ConstKind::Splat(elem) => format!("{}({})", def.ty.name(cx), const_text(cx, elem)),
        ConstKind::Zero => {
            if def.ty.is_scalar(cx) {
                format!("{}(0)", def.ty.name(cx))
            } else {
                format!("{}()", def.ty.name(cx))
            }
        }
    }
}

/// Plain text disassembler.
pub struct Disassembler<'a> {
    module: &'a Module,
    pub namer: Namer,
}

impl<'a> Disassembler<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self { module, namer: Namer::new(module) }
    }

    pub fn value(&self, v: Value) -> String {
        self.namer.value(self.module.cx_ref(), v)
    }

    pub fn block(&self, block: Block) -> String {
        self.namer.block(block)
    }

    /// Single-line form of an instruction (without nested blocks).
    pub fn inst_line(&self, inst: Inst) -> String {
        let m = self.module;
        let cx = m.cx_ref();
        let def = &m.insts[inst];

        let mut line = String::new();
        if !def.results.is_empty() {
            let results = def
                .results
                .iter()
                .map(|&r| format!("{}:{}", self.value(r.into()), m.inst_results[r].ty.name(cx)))
                .join(", ");
            let _ = write!(line, "{results} = ");
        }
        let name = match &def.kind {
            InstKind::Unary(op) => op.name().into(),
            InstKind::Binary(op) => op.name().into(),
            kind => kind.friendly_name(),
        };
        line += &name;

        let operand = |v: Option<Value>| v.map_or_else(|| "undef".to_string(), |v| self.value(v));
        let operands = def.operands.iter().map(|&v| operand(v)).join(", ");
        if !operands.is_empty() {
            let _ = write!(line, " {operands}");
        }

        match &def.kind {
            InstKind::Var { attrs } if !attrs.is_empty() => {
                let _ = write!(line, " {attrs}");
            }
            InstKind::Override { id: Some(id) } => {
                let _ = write!(line, " @id({id})");
            }
            InstKind::Swizzle { indices } => {
                let components = indices
                    .iter()
                    .map(|&i| ['x', 'y', 'z', 'w'].get(i as usize).copied().unwrap_or('?'))
                    .collect::<String>();
                let _ = write!(line, ", {components}");
            }
            &InstKind::If { true_block, false_block } => {
                let _ = write!(line, " [t: {}, f: {}]", self.block(true_block), self.block(false_block));
            }
            &InstKind::Loop { initializer, body, continuing } => {
                let _ = write!(
                    line,
                    " [i: {}, b: {}, c: {}]",
                    self.block(initializer),
                    self.block(body),
                    self.block(continuing)
                );
            }
            InstKind::Switch { cases } => {
                let cases = cases
                    .iter()
                    .map(|case| {
                        let selectors = case
                            .selectors
                            .iter()
                            .map(|sel| match *sel {
                                CaseSelector::Value(ct) => const_text(cx, ct),
                                CaseSelector::Default => "default".to_string(),
                            })
                            .join(" ");
                        format!("c: ({selectors}, {})", self.block(case.block))
                    })
                    .join(", ");
                let _ = write!(line, " [{cases}]");
            }
            _ => {}
        }
        if let Some(target) = def.kind.branch_target() {
            let _ = write!(line, "  # -> {}", m.insts[target].kind.friendly_name());
        }
        line
    }

    fn func_header(&self, func: Func) -> String {
        let m = self.module;
        let cx = m.cx_ref();
        let decl = &m.funcs[func];
        let params = decl
            .params
            .iter()
            .map(|&p| {
                let def = &m.func_params[p];
                let mut param = format!("{}:{}", self.value(p.into()), def.ty.name(cx));
                if !def.attrs.is_empty() {
                    let _ = write!(param, " [{}]", def.attrs);
                }
                param
            })
            .join(", ");
        let stage = match decl.stage {
            PipelineStage::Undefined => "",
            PipelineStage::Vertex => "@vertex ",
            PipelineStage::Fragment => "@fragment ",
            PipelineStage::Compute => "@compute ",
        };
        let mut header = format!(
            "{} = {stage}func({params}):{}",
            self.value(func.into()),
            decl.ret_type.name(cx)
        );
        if !decl.ret_attrs.is_empty() {
            let _ = write!(header, " [{}]", decl.ret_attrs);
        }
        if let Some(size) = decl.workgroup_size {
            let size = size.iter().map(|&v| self.value(v)).join(", ");
            let _ = write!(header, " @workgroup_size({size})");
        }
        if let Some(size) = decl.subgroup_size {
            let _ = write!(header, " @subgroup_size({})", self.value(size));
        }
        header
    }

    fn print_block(&self, out: &mut String, block: Block, indent: usize, comment: &str) {
        let m = self.module;
        let cx = m.cx_ref();
        let pad = "  ".repeat(indent);
        let params = m.blocks[block].params();
        let params = if params.is_empty() {
            String::new()
        } else {
            let params = params
                .iter()
                .map(|&p| format!("{}:{}", self.value(p.into()), m.block_params[p].ty.name(cx)))
                .join(", ");
            format!(" ({params})")
        };
        let _ = writeln!(out, "{pad}{}{params}: {{  # {comment}", self.block(block));
        for &inst in &m.blocks[block].insts {
            self.print_inst(out, inst, indent + 1);
        }
        let _ = writeln!(out, "{pad}}}");
    }

    fn print_inst(&self, out: &mut String, inst: Inst, indent: usize) {
        let pad = "  ".repeat(indent);
        let kind = &self.module.insts[inst].kind;
        if !kind.is_control() {
            let _ = writeln!(out, "{pad}{}", self.inst_line(inst));
            return;
        }
        let _ = writeln!(out, "{pad}{} {{", self.inst_line(inst));
        match kind {
            &InstKind::If { true_block, false_block } => {
                self.print_block(out, true_block, indent + 1, "true");
                self.print_block(out, false_block, indent + 1, "false");
            }
            &InstKind::Loop { initializer, body, continuing } => {
                if !self.module.blocks[initializer].is_empty() {
                    self.print_block(out, initializer, indent + 1, "initializer");
                }
                self.print_block(out, body, indent + 1, "body");
                if !self.module.blocks[continuing].is_empty() {
                    self.print_block(out, continuing, indent + 1, "continuing");
                }
            }
            InstKind::Switch { cases } => {
                for case in cases {
                    self.print_block(out, case.block, indent + 1, "case");
                }
            }
            _ => {}
        }
        let _ = writeln!(out, "{pad}}}");
    }

    /// Disassemble the whole module (root block first, then each function).
    pub fn text(&self) -> String {
        let m = self.module;
        let mut out = String::new();
        self.print_block(&mut out, m.root_block, 0, "root");
        for &func in &m.functions {
            out.push('\n');
            let _ = writeln!(out, "{} {{", self.func_header(func));
            self.print_block(&mut out, m.funcs[func].body, 1, "body");
            out.push_str("}\n");
        }
        out
    }

    /// Short description of a diagnostic's anchor.
    pub fn anchor(&self, anchor: DiagAnchor) -> Option<String> {
        let m = self.module;
        let cx = m.cx_ref();
        Some(match anchor {
            DiagAnchor::Module => return None,
            DiagAnchor::Func(func) => self.func_header(func),
            DiagAnchor::FuncParam(p) => {
                format!("{}:{}", self.value(p.into()), m.func_params[p].ty.name(cx))
            }
            DiagAnchor::Block(block) => self.block(block),
            DiagAnchor::BlockParam(p) => {
                format!("{}:{}", self.value(p.into()), m.block_params[p].ty.name(cx))
            }
            DiagAnchor::Inst(inst) => self.inst_line(inst),
            DiagAnchor::Operand { inst, idx } => {
                format!("operand {idx} of `{}`", self.inst_line(inst))
            }
            DiagAnchor::Result { inst, idx } => {
                format!("result {idx} of `{}`", self.inst_line(inst))
            }
            DiagAnchor::Value(v) => self.value(v),
        })
    }
}

/// Render diagnostics as text, one per line (plus one per anchor), with
/// notes indented under the diagnostic they belong to.
pub fn render_diags(disassembler: &Disassembler<'_>, diags: &[Diag]) -> String {
    fn render(out: &mut String, d: &Disassembler<'_>, diag: &Diag, indent: usize) {
        let pad = "  ".repeat(indent);
        let _ = writeln!(out, "{pad}{}: {}", diag.level, diag.message);
        if let Some(anchor) = d.anchor(diag.anchor) {
            let _ = writeln!(out, "{pad}  --> {anchor}");
        }
        for note in &diag.notes {
            render(out, d, note, indent + 1);
        }
    }
    let mut out = String::new();
    for diag in diags {
        render(&mut out, disassembler, diag, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::{Access, AddrSpace, IOAttributes};
    use std::rc::Rc;

    #[test]
    fn names_are_unique_and_stable() {
        let cx = Rc::new(Context::new());
        let mut m = Module::new(cx.clone());
        let f32 = cx.ty_f32();
        let root = m.root_block;
        let ptr = cx.ty_ptr(AddrSpace::Private, f32, Access::ReadWrite);
        let a = Builder::at_end(&mut m, root).var(Some("x"), ptr, None, IOAttributes::default());
        let b = Builder::at_end(&mut m, root).var(Some("x"), ptr, None, IOAttributes::default());
        let func = m.add_function("f", f32);
        let body = m.funcs[func].body;
        let mut builder = Builder::at_end(&mut m, body);
        let v = builder.load(a.into());
        builder.return_(func, Some(v.into()));

        let namer = Namer::new(&m);
        assert_eq!(namer.value(&cx, a.into()), "%x");
        assert_eq!(namer.value(&cx, b.into()), "%x_1");
        assert_eq!(namer.value(&cx, v.into()), "%1");
        assert_eq!(namer.value(&cx, func.into()), "%f");
        assert_eq!(namer.block(root), "$B1");
        assert_eq!(namer.block(body), "$B2");

        let text = Disassembler::new(&m).text();
        assert!(text.contains("%1:f32 = load %x"), "{text}");
        assert!(text.contains("return %f, %1"), "{text}");
    }

    #[test]
    fn constants_print_inline() {
        let cx = Context::new();
        let f32 = cx.ty_f32();
        let v = cx.const_composite(cx.ty_vec(f32, 2), [cx.const_f32(1.0), cx.const_f32(0.5)]);
        assert_eq!(const_text(&cx, v), "vec2<f32>(1.0f, 0.5f)");
        assert_eq!(const_text(&cx, cx.const_u32(3)), "3u");
        assert_eq!(const_text(&cx, cx.const_i32(-1)), "-1i");
    }
}
