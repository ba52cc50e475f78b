//! Replacing `load_vector_element`s from `uniform` memory with whole-vector
//! loads, followed by a component `access` (working around drivers that
//! miscompile single-component loads from uniform buffers).

use crate::builder::Builder;
use crate::caps::{Capabilities, Capability};
use crate::validate::validate;
use crate::visit::InstCollector;
use crate::{AddrSpace, Failure, Inst, InstKind, Module, Value};

const CAPABILITIES: Capabilities = Capabilities::NONE.with(Capability::AllowMultipleEntryPoints);

fn is_uniform_component_load(module: &Module, inst: Inst) -> bool {
    let inst_def = &module.insts[inst];
    if !inst_def.alive || inst_def.kind != InstKind::LoadVectorElement {
        return false;
    }
    module
        .operand(inst, 0)
        .and_then(|from| module.type_of(from).memory_view(module.cx_ref()))
        .is_some_and(|mv| mv.addr_space == AddrSpace::Uniform)
}

pub fn remove_uniform_vector_component_loads(module: &mut Module) -> Result<(), Failure> {
    validate(module, CAPABILITIES)?;

    let worklist = InstCollector::collect(module, is_uniform_component_load);
    log::debug!(
        "RemoveUniformVectorComponentLoads: {} uniform component load(s)",
        worklist.len()
    );

    for inst in worklist {
        let (Some(from), Some(index), Some(old)) =
            (module.operand(inst, 0), module.operand(inst, 1), module.result(inst))
        else {
            log::warn!("RemoveUniformVectorComponentLoads: skipping malformed component load");
            continue;
        };
        let elem_ty = module.inst_results[old].ty;

        let mut b = Builder::before(module, inst);
        let vector = b.load(from);
        // NOTE the `let` keeps the full vector load from being folded back
        // into a component load by downstream optimizers.
        let vector = b.let_(None, vector.into());
        let component = b.access(elem_ty, vector.into(), [index]);

        module.replace_all_uses_with(Value::InstResult(old), component.into());
        module.destroy_inst(inst);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Access, BindingPoint, Context, IOAttributes};
    use std::rc::Rc;

    #[test]
    fn only_uniform_component_loads_are_collected() {
        let cx = Rc::new(Context::new());
        let mut m = Module::new(cx.clone());
        let vec4 = cx.ty_vec(cx.ty_f32(), 4);
        let root = m.root_block;

        let mut b = Builder::at_end(&mut m, root);
        let uniform = b.var(
            Some("u"),
            cx.ty_ptr(AddrSpace::Uniform, vec4, Access::Read),
            None,
            IOAttributes {
                binding_point: Some(BindingPoint { group: 0, binding: 0 }),
                ..Default::default()
            },
        );
        let private =
            b.var(Some("p"), cx.ty_ptr(AddrSpace::Private, vec4, Access::ReadWrite), None, Default::default());

        let func = m.add_function("f", cx.ty_f32());
        let body = m.funcs[func].body;
        let mut b = Builder::at_end(&mut m, body);
        let one = Value::Const(cx.const_u32(1));
        let a = b.load_vector_element(uniform.into(), one);
        let _ = b.load_vector_element(private.into(), one);
        b.return_(func, Some(a.into()));

        let found = InstCollector::collect(&m, is_uniform_component_load);
        assert_eq!(found.len(), 1);
        assert_eq!(m.result(found[0]), Some(a));
    }
}
