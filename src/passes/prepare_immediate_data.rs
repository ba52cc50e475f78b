//! Immediate data layout: merging the (at most one) user-declared
//! `immediate` variable with internal entries requested by other passes,
//! into a single synthesized block.

use crate::builder::Builder;
use crate::caps::{Capabilities, Capability};
use crate::validate::validate;
use crate::{Access, AddrSpace, Failure, Inst, InstKind, InstResult, Module, Type, Value};
use rustc_hash::FxHashMap;

const PASS: &str = "PrepareImmediateData";

/// Largest immediate data block (in bytes) that can be synthesized.
pub const MAX_IMMEDIATE_DATA_BYTES: u32 = 256;

/// Name of the synthesized variable (and the prefix of its struct type).
const BLOCK_VAR_NAME: &str = "tint_immediate_data";
const BLOCK_STRUCT_NAME: &str = "tint_immediate_data_struct";
const USER_MEMBER_NAME: &str = "user_immediate_data";

const CAPABILITIES: Capabilities = Capabilities::NONE.with(Capability::AllowMultipleEntryPoints);

/// An internal (i.e. not user-declared) immediate data entry.
#[derive(Clone, Debug)]
pub struct InternalImmediateData {
    /// Byte offset in the immediate data block.
    pub offset: u32,
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, Default)]
pub struct PrepareImmediateDataConfig {
    pub internal: Vec<InternalImmediateData>,
}

impl PrepareImmediateDataConfig {
    pub fn add_internal_immediate_data(&mut self, offset: u32, name: impl Into<String>, ty: Type) {
        self.internal.push(InternalImmediateData { offset, name: name.into(), ty });
    }
}

/// Where each internal entry ended up, in the synthesized block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImmediateDataLayout {
    /// The immediate data block (a `var<immediate>` of struct type), if any.
    pub var: Option<InstResult>,

    /// Struct member index of the internal entry at each offset.
    pub offset_to_index: FxHashMap<u32, u32>,
}

impl ImmediateDataLayout {
    /// Struct member index of the internal entry at `offset`.
    pub fn index_of(&self, offset: u32) -> Option<u32> {
        self.offset_to_index.get(&offset).copied()
    }
}

struct Member {
    name: String,
    ty: Type,
    offset: u32,
}

/// Synthesize the immediate data block described by `config` (plus any user
/// immediate data, at offset `0`), redirecting every use of the user
/// variable to the first member of the new block.
///
/// Nothing is changed if there are no internal entries, or if the block had
/// already been synthesized (in which case its layout is recomputed).
pub fn prepare_immediate_data(
    module: &mut Module,
    config: &PrepareImmediateDataConfig,
) -> Result<ImmediateDataLayout, Failure> {
    validate(module, CAPABILITIES)?;

    let cx = module.cx();

    let mut immediate_vars = module.blocks[module.root_block].insts.iter().copied().filter(|&inst| {
        matches!(module.insts[inst].kind, InstKind::Var { .. })
            && module
                .result(inst)
                .and_then(|r| module.inst_results[r].ty.memory_view(&cx))
                .is_some_and(|mv| mv.addr_space == AddrSpace::Immediate)
    });
    let user_var = immediate_vars.next();
    if immediate_vars.next().is_some() {
        return Err(Failure::transform(PASS, "multiple user-declared immediate data variables"));
    }

    let Some(user_var) = user_var else {
        if config.internal.is_empty() {
            return Ok(ImmediateDataLayout::default());
        }
        return synthesize(module, config, None);
    };

    if is_synthesized_block(module, user_var) {
        return existing_layout(module, config, user_var);
    }

    if config.internal.is_empty() {
        return Ok(ImmediateDataLayout {
            var: module.result(user_var),
            offset_to_index: FxHashMap::default(),
        });
    }

    synthesize(module, config, Some(user_var))
}

fn is_synthesized_block(module: &Module, var: Inst) -> bool {
    let cx = module.cx_ref();
    let Some(result) = module.result(var) else {
        return false;
    };
    let named_block = module.inst_results[result].name.is_some_and(|name| &cx[name] == BLOCK_VAR_NAME);
    let store_def = module.inst_results[result]
        .ty
        .memory_view(cx)
        .and_then(|mv| mv.store.struct_def(cx).map(|def| &cx[def.name] == BLOCK_STRUCT_NAME));
    named_block && store_def == Some(true)
}

/// Layout of an already synthesized block, which must contain every entry
/// requested by `config`.
fn existing_layout(
    module: &Module,
    config: &PrepareImmediateDataConfig,
    var: Inst,
) -> Result<ImmediateDataLayout, Failure> {
    let cx = module.cx_ref();
    let result = module.result(var);
    let members = result
        .and_then(|r| module.inst_results[r].ty.memory_view(cx))
        .and_then(|mv| mv.store.struct_def(cx))
        .map(|def| def.members.as_slice())
        .unwrap_or_default();

    let mut offset_to_index = FxHashMap::default();
    for entry in &config.internal {
        let member = members
            .iter()
            .find(|m| m.offset == entry.offset && m.ty == entry.ty && cx[m.name] == entry.name)
            .ok_or_else(|| {
                Failure::transform(
                    PASS,
                    format!(
                        "immediate data block was already prepared without member '{}' at \
                         offset {}",
                        entry.name, entry.offset
                    ),
                )
            })?;
        offset_to_index.insert(entry.offset, member.index);
    }

    log::debug!("{PASS}: immediate data block already prepared");
    Ok(ImmediateDataLayout { var: result, offset_to_index })
}

/// Check that `members` (sorted by offset) don't overlap, are aligned, and
/// fit in [`MAX_IMMEDIATE_DATA_BYTES`].
fn check_layout(module: &Module, members: &[Member]) -> Result<(), Failure> {
    let cx = module.cx_ref();
    let mut prev: Option<&Member> = None;
    for member in members {
        let (size, align) = (member.ty.size(cx), member.ty.align(cx));

        if let Some(prev) = prev {
            if u64::from(member.offset) < u64::from(prev.offset) + u64::from(prev.ty.size(cx)) {
                return Err(Failure::transform(
                    PASS,
                    format!(
                        "immediate data member '{}' at offset {} overlaps '{}' (at offset {}, of \
                         size {})",
                        member.name,
                        member.offset,
                        prev.name,
                        prev.offset,
                        prev.ty.size(cx)
                    ),
                ));
            }
        }

        if member.offset % align != 0 {
            return Err(Failure::transform(
                PASS,
                format!(
                    "immediate data member '{}' at offset {} is not aligned to {align} bytes",
                    member.name, member.offset
                ),
            ));
        }

        // NOTE offsets are caller-supplied, so the end is computed in `u64`.
        if u64::from(member.offset) + u64::from(size) > u64::from(MAX_IMMEDIATE_DATA_BYTES) {
            return Err(Failure::transform(
                PASS,
                format!(
                    "immediate data member '{}' (at offset {}, of size {size}) exceeds the \
                     maximum immediate data size of {MAX_IMMEDIATE_DATA_BYTES} bytes",
                    member.name, member.offset
                ),
            ));
        }

        prev = Some(member);
    }
    Ok(())
}

fn synthesize(
    module: &mut Module,
    config: &PrepareImmediateDataConfig,
    user_var: Option<Inst>,
) -> Result<ImmediateDataLayout, Failure> {
    let cx = module.cx();

    let user_store = user_var
        .and_then(|var| module.result(var))
        .and_then(|r| module.inst_results[r].ty.memory_view(&cx))
        .map(|mv| mv.store);

    let mut internal: Vec<_> = config
        .internal
        .iter()
        .map(|entry| Member { name: entry.name.clone(), ty: entry.ty, offset: entry.offset })
        .collect();
    internal.sort_by_key(|member| member.offset);

    let members: Vec<_> = user_store
        .map(|ty| Member { name: USER_MEMBER_NAME.to_string(), ty, offset: 0 })
        .into_iter()
        .chain(internal)
        .collect();

    // NOTE nothing is mutated before the whole layout is known to be valid.
    check_layout(module, &members)?;

    let block_ty = cx.ty_struct_at_offsets(
        BLOCK_STRUCT_NAME,
        members.iter().map(|m| (cx.intern(m.name.as_str()), m.ty, m.offset)),
    );
    let first_internal = u32::from(user_store.is_some());
    let offset_to_index = config
        .internal
        .iter()
        .filter_map(|entry| {
            let idx = members.iter().skip(first_internal as usize).position(|m| m.offset == entry.offset)?;
            Some((entry.offset, first_internal + idx as u32))
        })
        .collect();

    let root_block = module.root_block;
    let block_ptr_ty = cx.ty_ptr(AddrSpace::Immediate, block_ty, Access::Read);
    let block_var = match user_var {
        Some(user_var) => Builder::before(module, user_var).var(
            Some(BLOCK_VAR_NAME),
            block_ptr_ty,
            None,
            Default::default(),
        ),
        None => Builder::at_end(module, root_block).var(
            Some(BLOCK_VAR_NAME),
            block_ptr_ty,
            None,
            Default::default(),
        ),
    };

    let user = user_var.and_then(|var| Some((var, module.result(var)?, user_store?)));
    if let Some((user_var, user_result, user_store)) = user {
        let member_ptr_ty = cx.ty_ptr(AddrSpace::Immediate, user_store, Access::Read);
        let zero = Value::Const(cx.const_u32(0));

        let uses = module.uses(user_result.into()).to_vec();
        for usage in uses {
            let access = Builder::before(module, usage.inst).access(
                member_ptr_ty,
                block_var.into(),
                [zero],
            );
            module.set_operand(usage.inst, usage.operand_idx as usize, Some(access.into()));
        }
        module.destroy_inst(user_var);
    }

    log::debug!(
        "{PASS}: synthesized immediate data block with {} member(s)",
        members.len()
    );

    Ok(ImmediateDataLayout { var: Some(block_var), offset_to_index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use std::rc::Rc;

    fn member(name: &str, ty: Type, offset: u32) -> Member {
        Member { name: name.to_string(), ty, offset }
    }

    #[test]
    fn layout_rejects_overlap_misalignment_and_overflow() {
        let cx = Rc::new(Context::new());
        let module = Module::new(cx.clone());
        let f32_ = cx.ty_f32();

        let ok = [member("a", f32_, 0), member("b", f32_, 4)];
        assert!(check_layout(&module, &ok).is_ok());

        let overlap = [member("a", f32_, 0), member("b", cx.ty_vec(f32_, 2), 2)];
        let err = check_layout(&module, &overlap).unwrap_err();
        assert!(err.mentions("'b' at offset 2 overlaps 'a'"));

        let misaligned = [member("a", cx.ty_vec(f32_, 4), 4)];
        assert!(check_layout(&module, &misaligned).unwrap_err().mentions("not aligned to 16"));

        let too_far = [member("a", f32_, 256)];
        assert!(check_layout(&module, &too_far).unwrap_err().mentions("exceeds the maximum"));
    }

    #[test]
    fn layout_rejects_offsets_near_the_end_of_u32() {
        let cx = Rc::new(Context::new());
        let mut module = Module::new(cx.clone());
        let f32_ = cx.ty_f32();

        let wrapping = [member("a", f32_, 0xFFFF_FFFC)];
        let err = check_layout(&module, &wrapping).unwrap_err();
        assert!(err.mentions("'a' (at offset 4294967292, of size 4) exceeds the maximum"));

        let mut config = PrepareImmediateDataConfig::default();
        config.add_internal_immediate_data(0xFFFF_FFFC, "a", f32_);
        assert!(prepare_immediate_data(&mut module, &config).is_err());
        assert!(module.blocks[module.root_block].insts.is_empty());
    }
}
