//! Materializing shader IO as module-scope `in`/`out` variables.
//!
//! Every entry point with parameters (or a non-`void` return type) is split
//! in two: the original function (renamed to `<name>_inner`, no longer an
//! entry point, and stripped of its IO attributes), and a new parameterless
//! `void` entry point (with the original name) which loads every input from
//! its variable, calls the original function, and stores every output.

use super::prepare_immediate_data::ImmediateDataLayout;
use crate::builder::Builder;
use crate::caps::{Capabilities, Capability};
use crate::intrinsics::BuiltinFn;
use crate::io::Interpolation;
use crate::validate::validate;
use crate::{
    Access, AddrSpace, BuiltinValue, Context, Failure, Func, IOAttributes, InstResult, Module,
    PipelineStage, Type, TypeKind, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::ops::Range;
use std::rc::Rc;

const PASS: &str = "ShaderIO";

/// Capabilities of the modules this pass accepts.
pub const SHADER_IO_CAPABILITIES: Capabilities = Capabilities::NONE
    .with(Capability::AllowPointSizeBuiltin)
    .with(Capability::AllowClipDistancesOnF32ScalarAndVector)
    .with(Capability::AllowMultipleEntryPoints);

/// Capabilities of the modules this pass produces, as materialized IO
/// variables carry backend-specific builtin types (e.g. `array<u32, 1>`
/// for `sample_mask`) and interpolation on integer builtins.
pub const MATERIALIZED_IO_CAPABILITIES: Capabilities =
    SHADER_IO_CAPABILITIES.with(Capability::LoosenValidationForShaderIO);

/// Byte offsets (in the immediate data block) of the `f32` bounds that
/// `frag_depth` outputs get clamped to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeOffsets {
    pub min: u32,
    pub max: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ShaderIoConfig {
    /// As returned by [`prepare_immediate_data`](super::prepare_immediate_data::prepare_immediate_data).
    pub immediate_data_layout: ImmediateDataLayout,

    /// Add a `point_size` output (always `1.0`) to vertex entry points.
    pub emit_vertex_point_size: bool,

    /// Declare `f16` inputs and outputs as `f32`, converting on access.
    pub polyfill_f16_io: bool,

    /// Clamp `frag_depth` outputs to the bounds found at these offsets.
    pub depth_range_offsets: Option<RangeOffsets>,
}

/// Immediate data block and member indices of the `frag_depth` bounds.
#[derive(Copy, Clone)]
struct DepthBounds {
    block: InstResult,
    min_idx: u32,
    max_idx: u32,
}

/// A single input or output (struct parameters/results are split into one
/// entry per member).
struct IoEntry {
    ty: Type,
    attrs: IOAttributes,
}

/// How an entry point parameter is rebuilt from the loaded inputs.
enum ParamSource {
    Input(usize),
    Struct { ty: Type, inputs: Range<usize> },
}

/// How the entry point's return value is split into outputs.
enum ResultSink {
    Void,
    Output(usize),
    Struct(Range<usize>),
}

pub fn shader_io(module: &mut Module, config: &ShaderIoConfig) -> Result<(), Failure> {
    let caps = if has_materialized_io(module) {
        MATERIALIZED_IO_CAPABILITIES
    } else {
        SHADER_IO_CAPABILITIES
    };
    validate(module, caps)?;

    let depth_bounds = match config.depth_range_offsets {
        Some(offsets) => Some(depth_bounds(&config.immediate_data_layout, offsets)?),
        None => None,
    };

    let entry_points: Vec<Func> = module
        .functions
        .iter()
        .copied()
        .filter(|&func| {
            let decl = &module.funcs[func];
            decl.is_entry_point() && (!decl.params.is_empty() || !decl.ret_type.is_void(module.cx_ref()))
        })
        .collect();
    log::debug!("{PASS}: {} entry point(s) with shader IO", entry_points.len());

    for func in entry_points {
        EntryPointIo::new(module, config, depth_bounds, func).materialize(module);
    }
    Ok(())
}

/// Whether a previous run already declared module-scope `in`/`out` variables.
fn has_materialized_io(module: &Module) -> bool {
    let cx = module.cx_ref();
    module.blocks[module.root_block].insts.iter().any(|&inst| {
        module
            .result(inst)
            .and_then(|r| module.inst_results[r].ty.memory_view(cx))
            .is_some_and(|mv| matches!(mv.addr_space, AddrSpace::In | AddrSpace::Out))
    })
}

fn depth_bounds(layout: &ImmediateDataLayout, offsets: RangeOffsets) -> Result<DepthBounds, Failure> {
    let block = layout.var.ok_or_else(|| {
        Failure::transform(PASS, "frag_depth clamping requires an immediate data block")
    })?;
    let index_of = |offset: u32| {
        layout.index_of(offset).ok_or_else(|| {
            Failure::transform(PASS, format!("no immediate data member at offset {offset}"))
        })
    };
    Ok(DepthBounds { block, min_idx: index_of(offsets.min)?, max_idx: index_of(offsets.max)? })
}

fn is_f16_based(cx: &Context, ty: Type) -> bool {
    cx[ty.deepest_element(cx)].kind == TypeKind::F16
}

struct EntryPointIo<'c> {
    cx: Rc<Context>,
    config: &'c ShaderIoConfig,
    depth_bounds: Option<DepthBounds>,

    func: Func,
    name: String,
    stage: PipelineStage,

    inputs: Vec<IoEntry>,
    params: Vec<ParamSource>,
    outputs: Vec<IoEntry>,
    result: ResultSink,
    point_size: Option<usize>,
}

impl<'c> EntryPointIo<'c> {
    fn new(
        module: &Module,
        config: &'c ShaderIoConfig,
        depth_bounds: Option<DepthBounds>,
        func: Func,
    ) -> Self {
        let cx = module.cx();
        let decl = &module.funcs[func];

        let mut inputs = vec![];
        let params = decl
            .params
            .iter()
            .map(|&param| {
                let param_def = &module.func_params[param];
                match param_def.ty.struct_def(&cx) {
                    Some(def) => {
                        let start = inputs.len();
                        inputs.extend(
                            def.members.iter().map(|m| IoEntry { ty: m.ty, attrs: m.attrs.clone() }),
                        );
                        ParamSource::Struct { ty: param_def.ty, inputs: start..inputs.len() }
                    }
                    None => {
                        inputs.push(IoEntry { ty: param_def.ty, attrs: param_def.attrs.clone() });
                        ParamSource::Input(inputs.len() - 1)
                    }
                }
            })
            .collect();

        let mut outputs = vec![];
        let result = if decl.ret_type.is_void(&cx) {
            ResultSink::Void
        } else if let Some(def) = decl.ret_type.struct_def(&cx) {
            outputs.extend(def.members.iter().map(|m| IoEntry { ty: m.ty, attrs: m.attrs.clone() }));
            ResultSink::Struct(0..outputs.len())
        } else {
            outputs.push(IoEntry { ty: decl.ret_type, attrs: decl.ret_attrs.clone() });
            ResultSink::Output(0)
        };

        let point_size = (decl.stage == PipelineStage::Vertex && config.emit_vertex_point_size)
            .then(|| {
                outputs.push(IoEntry {
                    ty: cx.ty_f32(),
                    attrs: IOAttributes::builtin(BuiltinValue::PointSize),
                });
                outputs.len() - 1
            });

        EntryPointIo {
            name: cx[decl.name].to_string(),
            stage: decl.stage,
            cx,
            config,
            depth_bounds,
            func,
            inputs,
            params,
            outputs,
            result,
            point_size,
        }
    }

    /// Type of the variable backing `entry`.
    fn var_store_type(&self, entry: &IoEntry) -> Type {
        let cx = &*self.cx;
        let ty = if entry.attrs.builtin == Some(BuiltinValue::SampleMask) {
            cx.ty_array(cx.ty_u32(), 1)
        } else {
            entry.ty
        };
        if self.config.polyfill_f16_io && is_f16_based(cx, ty) {
            cx.ty_match_width(cx.ty_f32(), ty.vector_width(cx).unwrap_or(1))
        } else {
            ty
        }
    }

    fn var_name(&self, entry: &IoEntry, suffix: &str) -> String {
        let mut name = self.name.clone();
        if let Some(builtin) = entry.attrs.builtin {
            let _ = write!(name, "_{builtin}");
        }
        if let Some(location) = entry.attrs.location {
            let _ = write!(name, "_loc{location}");
            if let Some(idx) = entry.attrs.blend_src {
                let _ = write!(name, "_idx{idx}");
            }
        }
        name + suffix
    }

    fn declare_vars(&self, module: &mut Module, entries: &[IoEntry], dir: AddrSpace) -> Vec<InstResult> {
        let cx = &*self.cx;
        let (access, suffix) = match dir {
            AddrSpace::In => (Access::Read, "_Input"),
            _ => (Access::Write, "_Output"),
        };
        let root = module.root_block;

        entries
            .iter()
            .map(|entry| {
                let store = self.var_store_type(entry);
                let mut attrs = entry.attrs.clone();
                // NOTE integer builtins have no default interpolation.
                if self.stage == PipelineStage::Fragment
                    && dir == AddrSpace::In
                    && attrs.builtin.is_some()
                    && store.is_integer_scalar_or_vector(cx)
                {
                    attrs.interpolation = Some(Interpolation::FLAT);
                }
                let name = self.var_name(entry, suffix);
                Builder::at_end(module, root).var(Some(&name), cx.ty_ptr(dir, store, access), None, attrs)
            })
            .collect()
    }

    fn load_input(&self, b: &mut Builder<'_>, entry: &IoEntry, var: InstResult) -> Value {
        let cx = &*self.cx;
        let mut from = Value::InstResult(var);
        if entry.attrs.builtin == Some(BuiltinValue::SampleMask) {
            let elem_ptr = cx.ty_ptr(AddrSpace::In, cx.ty_u32(), Access::Read);
            from = b.access(elem_ptr, from, [cx.const_u32(0).into()]).into();
        }
        let value: Value = b.load(from).into();
        if self.config.polyfill_f16_io && is_f16_based(cx, entry.ty) {
            b.convert(entry.ty, value).into()
        } else {
            value
        }
    }

    fn store_output(&self, b: &mut Builder<'_>, entry: &IoEntry, var: InstResult, mut value: Value) {
        let cx = &*self.cx;
        let mut to = Value::InstResult(var);
        match entry.attrs.builtin {
            Some(BuiltinValue::SampleMask) => {
                let elem_ptr = cx.ty_ptr(AddrSpace::Out, cx.ty_u32(), Access::Write);
                to = b.access(elem_ptr, to, [cx.const_u32(0).into()]).into();
            }
            Some(BuiltinValue::FragDepth) => {
                if let Some(bounds) = self.depth_bounds {
                    let f32_ = cx.ty_f32();
                    let bound_ptr = cx.ty_ptr(AddrSpace::Immediate, f32_, Access::Read);
                    let mut load_bound = |idx: u32| -> Value {
                        let ptr = b.access(bound_ptr, bounds.block.into(), [cx.const_u32(idx).into()]);
                        b.load(ptr.into()).into()
                    };
                    let min = load_bound(bounds.min_idx);
                    let max = load_bound(bounds.max_idx);
                    value = b.builtin_call(f32_, BuiltinFn::Clamp, [value, min, max]).into();
                }
            }
            _ => {}
        }
        if self.config.polyfill_f16_io && is_f16_based(cx, entry.ty) {
            value = b.convert(self.var_store_type(entry), value).into();
        }
        b.store(to, value);
    }

    fn materialize(self, module: &mut Module) {
        let cx = self.cx.clone();
        log::debug!(
            "{PASS}: entry point `{}` has {} input(s) and {} output(s)",
            self.name,
            self.inputs.len(),
            self.outputs.len()
        );

        let input_vars = self.declare_vars(module, &self.inputs, AddrSpace::In);
        let output_vars = self.declare_vars(module, &self.outputs, AddrSpace::Out);

        // Demote the original entry point to a plain function.
        let (workgroup_size, subgroup_size, ret_type) = {
            let decl = &mut module.funcs[self.func];
            decl.name = cx.intern(format!("{}_inner", self.name).as_str());
            decl.stage = PipelineStage::Undefined;
            decl.ret_attrs = IOAttributes::default();
            (decl.workgroup_size.take(), decl.subgroup_size.take(), decl.ret_type)
        };
        for param in module.funcs[self.func].params.clone() {
            module.func_params[param].attrs = IOAttributes::default();
        }

        let wrapper = module.add_entry_point(&self.name, self.stage, cx.ty_void());
        module.funcs[wrapper].workgroup_size = workgroup_size;
        module.funcs[wrapper].subgroup_size = subgroup_size;

        let body = module.funcs[wrapper].body;
        let mut b = Builder::at_end(module, body);

        let loaded: Vec<Value> = self
            .inputs
            .iter()
            .zip(&input_vars)
            .map(|(entry, &var)| self.load_input(&mut b, entry, var))
            .collect();
        let args: Vec<Value> = self
            .params
            .iter()
            .map(|param| match param {
                ParamSource::Input(i) => loaded[*i],
                ParamSource::Struct { ty, inputs } => {
                    b.construct(*ty, loaded[inputs.clone()].iter().copied()).into()
                }
            })
            .collect();

        let result = b.call(ret_type, self.func, args);

        match &self.result {
            ResultSink::Void => {}
            ResultSink::Output(i) => {
                self.store_output(&mut b, &self.outputs[*i], output_vars[*i], result.into());
            }
            ResultSink::Struct(outputs) => {
                for (member_idx, i) in outputs.clone().enumerate() {
                    let entry = &self.outputs[i];
                    let member =
                        b.access(entry.ty, result.into(), [cx.const_u32(member_idx as u32).into()]);
                    self.store_output(&mut b, entry, output_vars[i], member.into());
                }
            }
        }
        if let Some(i) = self.point_size {
            let one = Value::Const(cx.const_f32(1.0));
            self.store_output(&mut b, &self.outputs[i], output_vars[i], one);
        }

        b.return_(wrapper, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_names_describe_the_attributes() {
        let cx = Rc::new(Context::new());
        let mut module = Module::new(cx.clone());
        let func = module.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
        let config = ShaderIoConfig::default();
        let io = EntryPointIo::new(&module, &config, None, func);

        let position = IoEntry {
            ty: cx.ty_vec(cx.ty_f32(), 4),
            attrs: IOAttributes::builtin(BuiltinValue::Position),
        };
        assert_eq!(io.var_name(&position, "_Input"), "main_position_Input");

        let blend = IoEntry {
            ty: cx.ty_f32(),
            attrs: IOAttributes { location: Some(0), blend_src: Some(1), ..Default::default() },
        };
        assert_eq!(io.var_name(&blend, "_Output"), "main_loc0_idx1_Output");

        let mask = IoEntry { ty: cx.ty_u32(), attrs: IOAttributes::builtin(BuiltinValue::SampleMask) };
        assert_eq!(io.var_store_type(&mask), cx.ty_array(cx.ty_u32(), 1));
    }

    #[test]
    fn f16_io_is_widened_when_polyfilled() {
        let cx = Rc::new(Context::new());
        let mut module = Module::new(cx.clone());
        let func = module.add_entry_point("main", PipelineStage::Fragment, cx.ty_void());
        let config = ShaderIoConfig { polyfill_f16_io: true, ..Default::default() };
        let io = EntryPointIo::new(&module, &config, None, func);

        let half3 = IoEntry { ty: cx.ty_vec(cx.ty_f16(), 3), attrs: IOAttributes::location(2) };
        assert_eq!(io.var_store_type(&half3), cx.ty_vec(cx.ty_f32(), 3));

        let half = IoEntry { ty: cx.ty_f16(), attrs: IOAttributes::location(3) };
        assert_eq!(io.var_store_type(&half), cx.ty_f32());
    }

    #[test]
    fn depth_bounds_need_a_prepared_block() {
        let offsets = RangeOffsets { min: 4, max: 8 };
        let err = depth_bounds(&ImmediateDataLayout::default(), offsets).err();
        assert!(err.is_some_and(|err| err.mentions("requires an immediate data block")));
    }
}
