//! Shader compiler IR, with a structural/semantic validator, and the lowering
//! passes that rewrite it while preserving the invariants validation enforces.
//!
//! The IR is a mutable graph: a [`Module`] owns [`Func`]s, whose bodies are
//! [`Block`]s of [`Inst`]s, and control-flow instructions (`if`, `loop`,
//! `switch`) own further nested [`Block`]s. Values (instruction results,
//! function/block parameters, and interned [`Const`]s) keep back-references
//! ([`Usage`]s) to every instruction operand that reads them.
//!
//! #### Notable types/modules
//!
//! ##### IR data types
// HACK using `(struct.Context.html)` to link `Context`, not `context::Context`.
//! * [`Context`](struct.Context.html): handles interning ([`Type`]s, [`Const`]s, etc.)
//! * [`Module`]: owns every entity (functions, blocks, instructions and their values)
//! * [`InstDef`]/[`InstKind`]: instructions, including structured control-flow
//!
//! ##### Utilities and passes
//! * [`validate`](mod@validate): the validator, parameterized by [`caps::Capabilities`]
//! * [`builder::Builder`]: creating instructions, while keeping [`Usage`]s in sync
//! * [`print`](mod@print): plain text disassembler, used for diagnostics
//! * [`passes`]: structural lowering passes, and the [`passes::raise`] pipeline

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,

    // NOTE ignored because it's misguided to suggest `let mut s = ...;`
    // and `s.push_str(...);` when `+` is equivalent and does not require `let`.
    clippy::string_add,

    // FIXME rework doc comments to conform to linted expectations.
    clippy::too_long_first_doc_paragraph,
)]
// NOTE this is stronger than the "Embark standard lints" above, because
// we almost never need `unsafe` code and this is a further "speed bump" to it.
#![forbid(unsafe_code)]


// NOTE all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod builder;
pub mod caps;
mod context;
pub mod error;
pub mod intrinsics;
pub mod io;
pub mod print;
pub mod types;
pub mod validate;
pub mod visit;
pub mod passes {
    //! IR transformations (typically whole-[`Module`](crate::Module)).
    //
    // NOTE inline `mod` to avoid adding APIs here, it's just namespacing.

    pub mod case_switch_to_if_else;
    pub mod prepare_immediate_data;
    pub mod raise;
    pub mod remove_uniform_vector_component_loads;
    pub mod shader_io;
}

use smallvec::SmallVec;
use std::borrow::Cow;

// HACK work around the lack of `FxIndex{Map,Set}` type aliases elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
#[doc(hidden)]
type FxIndexSet<V> = indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// NOTE these reexports are all documented inside `context`.
pub use context::{Context, Entity, EntityDefs, InternInCx};

/// Interned handle for a [`str`].
pub use context::InternedStr;

pub use error::Failure;
pub use io::{BindingPoint, BuiltinValue, IOAttributes};

// HACK this only serves to disallow modifying the `cx` field of `Module`.
#[doc(hidden)]
mod sealed {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone)]
    pub struct Module {
        /// Context used for everything interned, in this module.
        ///
        /// Notable choices made for this field:
        /// * private to disallow switching the context of a module
        /// * [`Rc`] sharing to allow multiple modules to use the same context
        ///   (`Context: !Sync` because of the interners so it can't be `Arc`)
        cx: Rc<Context>,

        pub funcs: EntityDefs<Func>,
        pub func_params: EntityDefs<FuncParam>,
        pub blocks: EntityDefs<Block>,
        pub block_params: EntityDefs<BlockParam>,
        pub insts: EntityDefs<Inst>,
        pub inst_results: EntityDefs<InstResult>,

        /// Module-scope declarations (`var`s, `override`s, and, when allowed,
        /// pipeline-evaluatable `let`s and expressions).
        pub root_block: Block,

        /// Ordered list of the functions in the module (which is only expected
        /// to contain duplicates, or miss functions, when malformed).
        pub functions: Vec<Func>,
    }

    impl Module {
        pub fn new(cx: Rc<Context>) -> Self {
            let mut blocks = EntityDefs::new();
            let root_block = blocks.define(BlockDef::default());
            Self {
                cx,

                funcs: Default::default(),
                func_params: Default::default(),
                blocks,
                block_params: Default::default(),
                insts: Default::default(),
                inst_results: Default::default(),

                root_block,
                functions: vec![],
            }
        }

        // FIXME `cx_ref` might be the better default in situations where
        // the module doesn't need to be modified, figure out if that's common.
        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }
    }
}
pub use sealed::Module;

/// Interned handle for a [`TypeDef`](crate::TypeDef).
pub use context::Type;

/// Definition for a [`Type`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TypeDef {
    pub kind: TypeKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    I8,
    U8,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,

    /// Frontend-only types, never legal in the IR.
    AbstractInt,
    AbstractFloat,

    Vector {
        elem: Type,
        width: u32,
    },
    Matrix {
        /// Column vector type (its width being the number of rows).
        column: Type,
        columns: u32,
    },
    Array {
        elem: Type,
        count: ArrayCount,
        stride: u32,
    },
    Struct(StructDef),
    Atomic(Type),

    Pointer(MemoryView),
    Reference(MemoryView),

    Sampler {
        comparison: bool,
    },
    SampledTexture {
        dim: TextureDim,
        sample: Type,
    },
    DepthTexture {
        dim: TextureDim,
    },
    MultisampledTexture {
        dim: TextureDim,
        sample: Type,
    },
    StorageTexture {
        dim: TextureDim,
        format: TexelFormat,
        access: Access,
    },
    ExternalTexture,
    InputAttachment {
        component: Type,
    },
    SubgroupMatrix {
        kind: SubgroupMatrixKind,
        component: Type,
        columns: u32,
        rows: u32,
    },
    BindingArray {
        elem: Type,
        count: ArrayCount,
    },

    /// Backend-specific combined image/sampler, not part of the core IR.
    SampledImage {
        image: Type,
    },

    /// The type of [`Value::Func`] (i.e. of callees).
    Function,
}

// HACK this behaves like an implicit conversion for `cx.intern(...)`.
impl InternInCx<Type> for TypeKind {
    fn intern_in_cx(self, cx: &Context) -> Type {
        cx.intern(TypeDef { kind: self })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayCount {
    Constant(u32),
    Runtime,
}

/// Pointed-to type, address space and access mode, shared by pointers
/// and references.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoryView {
    pub addr_space: AddrSpace,
    pub store: Type,
    pub access: Access,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: InternedStr,
    pub members: Vec<StructMember>,
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: InternedStr,
    pub ty: Type,
    pub index: u32,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
    pub attrs: IOAttributes,

    /// Backend-only matrix layout decorations.
    pub row_major: bool,
    pub matrix_stride: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddrSpace {
    Undefined,
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    Handle,
    Immediate,
    In,
    Out,
    PixelLocal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureDim {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rg32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    Bgra8Unorm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubgroupMatrixKind {
    Left,
    Right,
    Result,
}

/// Interned handle for a [`ConstDef`](crate::ConstDef) (a constant value).
pub use context::Const;

/// Definition for a [`Const`]: a constant value.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ConstDef {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstKind {
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),

    /// IEEE 754 binary16 bits.
    F16(u16),
    /// IEEE 754 binary32 bits.
    F32(u32),

    /// One constant per element of the composite type.
    Composite(SmallVec<[Const; 4]>),
    /// The same constant for every element of the composite type.
    Splat(Const),
    /// The zero value of any constructible type.
    Zero,
}

/// Entity handle for a [`FuncDecl`](crate::FuncDecl) (a function).
pub use context::Func;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Undefined,
    Vertex,
    Fragment,
    Compute,
}

/// Declaration/definition for a [`Func`]: a function.
#[derive(Clone)]
pub struct FuncDecl {
    pub name: InternedStr,

    /// [`PipelineStage::Undefined`] for functions that aren't entry points.
    pub stage: PipelineStage,

    pub params: SmallVec<[FuncParam; 4]>,

    pub ret_type: Type,
    pub ret_attrs: IOAttributes,

    /// Only (and always) present on compute entry points, each dimension being
    /// either a constant, or (with overrides allowed) a module-scope value.
    pub workgroup_size: Option<[Value; 3]>,
    pub subgroup_size: Option<Value>,

    pub body: Block,

    pub uses: Vec<Usage>,
}

impl FuncDecl {
    pub fn is_entry_point(&self) -> bool {
        self.stage != PipelineStage::Undefined
    }
}

/// Entity handle for a [`FuncParamDef`](crate::FuncParamDef).
pub use context::FuncParam;

#[derive(Clone)]
pub struct FuncParamDef {
    pub ty: Type,
    pub name: Option<InternedStr>,

    /// Parent function, `None` only while detached (or when malformed).
    pub func: Option<Func>,

    pub attrs: IOAttributes,

    pub alive: bool,
    pub uses: Vec<Usage>,
}

/// Entity handle for a [`BlockDef`](crate::BlockDef).
///
/// A block is an ordered list of instructions, always ending in exactly one
/// terminator instruction (control never falls off the end of a block).
pub use context::Block;

#[derive(Clone, Default)]
pub struct BlockDef {
    pub kind: BlockKind,
    pub insts: Vec<Inst>,

    /// The control-flow instruction owning this block, or `None` for the
    /// root block and function bodies.
    pub parent: Option<Inst>,
}

#[derive(Clone, Default)]
pub enum BlockKind {
    #[default]
    Plain,

    /// Target of control-flow merges (loop bodies and continuing blocks),
    /// with `params` acting as phi-like values.
    MultiIn { params: SmallVec<[BlockParam; 2]> },
}

impl BlockDef {
    pub fn params(&self) -> &[BlockParam] {
        match &self.kind {
            BlockKind::Plain => &[],
            BlockKind::MultiIn { params } => params,
        }
    }

    pub fn is_multi_in(&self) -> bool {
        matches!(self.kind, BlockKind::MultiIn { .. })
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn terminator(&self) -> Option<Inst> {
        self.insts.last().copied()
    }
}

/// Entity handle for a [`BlockParamDef`](crate::BlockParamDef).
pub use context::BlockParam;

#[derive(Clone)]
pub struct BlockParamDef {
    pub ty: Type,
    pub name: Option<InternedStr>,
    pub block: Option<Block>,
    pub alive: bool,
    pub uses: Vec<Usage>,
}

/// Entity handle for an [`InstDef`](crate::InstDef) (an instruction).
pub use context::Inst;

#[derive(Clone)]
pub struct InstDef {
    pub kind: InstKind,

    /// `None` operands are only legal as `var`/`override` initializers.
    pub operands: SmallVec<[Option<Value>; 4]>,

    pub results: SmallVec<[InstResult; 1]>,

    /// Parent block, `None` while detached.
    pub block: Option<Block>,

    /// `false` once destroyed (destroyed instructions must never be found
    /// in any block, nor referenced by any live instruction).
    pub alive: bool,
}

/// Entity handle for an [`InstResultDef`](crate::InstResultDef).
pub use context::InstResult;

#[derive(Clone)]
pub struct InstResultDef {
    pub ty: Type,
    pub name: Option<InternedStr>,

    /// Instruction producing this value, `None` once detached from it.
    pub inst: Option<Inst>,

    pub uses: Vec<Usage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    // Memory and values.
    /// Operands: `[initializer?]` (always one slot, `None` when absent).
    Var {
        attrs: IOAttributes,
    },
    /// Operands: `[value]`.
    Let,
    /// Operands: `[initializer?]`.
    Override {
        id: Option<u16>,
    },
    /// Operands: `[from]`.
    Load,
    /// Operands: `[to, value]`.
    Store,
    /// Operands: `[from, index]`.
    LoadVectorElement,
    /// Operands: `[to, index, value]`.
    StoreVectorElement,
    /// Operands: `[object, indices..]`.
    Access,
    /// Operands: `[object]`.
    Swizzle {
        indices: SmallVec<[u32; 4]>,
    },
    Unary(intrinsics::UnaryOp),
    Binary(intrinsics::BinaryOp),
    Bitcast,
    Convert,
    /// Operands: `[args..]` (no operands meaning the zero value).
    Construct,
    BuiltinCall(intrinsics::BuiltinFn),
    /// Operands: `[callee, args..]`.
    UserCall,
    Discard,
    /// Operands: `[value]` (evaluated only for its side-effects).
    Phony,

    // Control-flow.
    /// Operands: `[condition]`.
    If {
        true_block: Block,
        false_block: Block,
    },
    Loop {
        initializer: Block,
        body: Block,
        continuing: Block,
    },
    /// Operands: `[condition]`.
    Switch {
        cases: SmallVec<[SwitchCase; 4]>,
    },

    // Terminators.
    /// Operands: `[func, value?]`.
    Return,
    Unreachable,
    TerminateInvocation,
    /// Operands: `[values..]` for the results of the target `if`.
    ExitIf(Inst),
    ExitSwitch(Inst),
    ExitLoop(Inst),
    /// Operands: `[values..]` for the parameters of the continuing block.
    Continue(Inst),
    /// Operands: `[values..]` for the parameters of the loop body.
    NextIteration(Inst),
    /// Operands: `[condition, next_iter_values.., exit_values..]`, split by
    /// the number of parameters of the target loop's body.
    BreakIf(Inst),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchCase {
    pub selectors: SmallVec<[CaseSelector; 2]>,
    pub block: Block,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CaseSelector {
    Value(Const),
    Default,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Return
                | InstKind::Unreachable
                | InstKind::TerminateInvocation
                | InstKind::ExitIf(_)
                | InstKind::ExitSwitch(_)
                | InstKind::ExitLoop(_)
                | InstKind::Continue(_)
                | InstKind::NextIteration(_)
                | InstKind::BreakIf(_)
        )
    }

    pub fn is_control(&self) -> bool {
        matches!(self, InstKind::If { .. } | InstKind::Loop { .. } | InstKind::Switch { .. })
    }

    /// The control instruction targeted by a branching terminator.
    pub fn branch_target(&self) -> Option<Inst> {
        match *self {
            InstKind::ExitIf(target)
            | InstKind::ExitSwitch(target)
            | InstKind::ExitLoop(target)
            | InstKind::Continue(target)
            | InstKind::NextIteration(target)
            | InstKind::BreakIf(target) => Some(target),
            _ => None,
        }
    }

    /// Blocks directly owned by a control-flow instruction, in the order
    /// they are printed (and validated).
    pub fn child_blocks(&self) -> SmallVec<[Block; 4]> {
        match self {
            &InstKind::If { true_block, false_block } => {
                [true_block, false_block].into_iter().collect()
            }
            &InstKind::Loop { initializer, body, continuing } => {
                [initializer, body, continuing].into_iter().collect()
            }
            InstKind::Switch { cases } => cases.iter().map(|case| case.block).collect(),
            _ => SmallVec::new(),
        }
    }

    /// Short name of the instruction, used to prefix diagnostics, and by
    /// the disassembler.
    pub fn friendly_name(&self) -> Cow<'static, str> {
        let name = match self {
            InstKind::Var { .. } => "var",
            InstKind::Let => "let",
            InstKind::Override { .. } => "override",
            InstKind::Load => "load",
            InstKind::Store => "store",
            InstKind::LoadVectorElement => "load_vector_element",
            InstKind::StoreVectorElement => "store_vector_element",
            InstKind::Access => "access",
            InstKind::Swizzle { .. } => "swizzle",
            InstKind::Unary(_) => "unary",
            InstKind::Binary(_) => "binary",
            InstKind::Bitcast => "bitcast",
            InstKind::Convert => "convert",
            InstKind::Construct => "construct",
            InstKind::BuiltinCall(f) => return f.name().into(),
            InstKind::UserCall => "call",
            InstKind::Discard => "discard",
            InstKind::Phony => "phony",
            InstKind::If { .. } => "if",
            InstKind::Loop { .. } => "loop",
            InstKind::Switch { .. } => "switch",
            InstKind::Return => "return",
            InstKind::Unreachable => "unreachable",
            InstKind::TerminateInvocation => "terminate_invocation",
            InstKind::ExitIf(_) => "exit_if",
            InstKind::ExitSwitch(_) => "exit_switch",
            InstKind::ExitLoop(_) => "exit_loop",
            InstKind::Continue(_) => "continue",
            InstKind::NextIteration(_) => "next_iteration",
            InstKind::BreakIf(_) => "break_if",
        };
        name.into()
    }
}

/// A value used as an instruction operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::From)]
pub enum Value {
    #[from]
    Const(Const),

    /// One of the results of an [`Inst`].
    #[from]
    InstResult(InstResult),

    #[from]
    FuncParam(FuncParam),

    #[from]
    BlockParam(BlockParam),

    /// A function, as a value (only used as the callee of `call`, and as the
    /// first operand of `return`).
    #[from]
    Func(Func),

    /// Placeholder for a value that is intentionally not provided (e.g. an
    /// unused `construct` argument), and always "in scope".
    Unused,
}

/// One use of a [`Value`], as operand `operand_idx` of instruction `inst`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Usage {
    pub inst: Inst,
    pub operand_idx: u32,
}

/// Diagnostics produced by validation (and occasionally by passes).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diag {
    pub level: DiagLevel,
    pub anchor: DiagAnchor,
    pub message: Cow<'static, str>,

    /// Supplementary diagnostics (typically [`DiagLevel::Note`]s), e.g.
    /// pointing at a conflicting declaration.
    pub notes: Vec<Diag>,
}

impl Diag {
    pub fn new(level: DiagLevel, anchor: DiagAnchor, message: impl Into<Cow<'static, str>>) -> Self {
        Self { level, anchor, message: message.into(), notes: vec![] }
    }

    // FIXME make macros more ergonomic than this, for interpolation.
    #[track_caller]
    pub fn bug(anchor: DiagAnchor, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(DiagLevel::Bug(std::panic::Location::caller()), anchor, message)
    }

    pub fn err(anchor: DiagAnchor, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(DiagLevel::Error, anchor, message)
    }

    pub fn warn(anchor: DiagAnchor, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(DiagLevel::Warning, anchor, message)
    }

    pub fn note(anchor: DiagAnchor, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(DiagLevel::Note, anchor, message)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagLevel::Bug(_) | DiagLevel::Error)
    }
}

/// The "severity" level of a [`Diag`]nostic.
///
/// Note: `Bug` diagnostics track their emission point for easier identification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagLevel {
    Bug(&'static std::panic::Location<'static>),
    Error,
    Warning,
    Note,
}

/// The part of the IR a [`Diag`]nostic refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagAnchor {
    Module,
    Func(Func),
    FuncParam(FuncParam),
    Block(Block),
    BlockParam(BlockParam),
    Inst(Inst),
    Operand { inst: Inst, idx: u32 },
    Result { inst: Inst, idx: u32 },
    Value(Value),
}

impl std::fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagLevel::Bug(loc) => write!(f, "BUG({loc})"),
            DiagLevel::Error => f.write_str("error"),
            DiagLevel::Warning => f.write_str("warning"),
            DiagLevel::Note => f.write_str("note"),
        }
    }
}
