//! [`Context`](struct.Context.html) and related types/traits.

use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::ops;

/// Context object with global resources for the IR.
///
/// Those resources currently are:
/// * interners, for anything without an identity, and which can be deduplicated
///   (types, constants and strings)
///
/// Entities (functions, blocks, instructions and their values) are *not*
/// owned by the [`Context`], but by the [`Module`](crate::Module) defining
/// them, in [`EntityDefs`] arenas.
#[derive(Default)]
pub struct Context {
    interners: Interners,
}

/// Private trait used to implement `Context::intern` for a type or its
/// definition (e.g. `TypeKind` interns via an implied `TypeDef`).
pub trait InternInCx<I> {
    fn intern_in_cx(self, cx: &Context) -> I;
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern<T: InternInCx<I>, I>(&self, x: T) -> I {
        x.intern_in_cx(self)
    }
}

// HACK `elsa` needs a `StableDeref` wrapper, and interning by value
// always allocates, even when the value turns out to already be present.
type FxFrozenIndexSet<T> = elsa::FrozenIndexSet<T, BuildHasherDefault<FxHasher>>;

macro_rules! interners {
    ($($name:ident => $ty:ty),+ $(,)?) => {
        #[allow(non_snake_case)]
        #[derive(Default)]
        struct Interners {
            $($name: FxFrozenIndexSet<Box<$ty>>),*
        }

        $(
            // NOTE never derive `PartialOrd, Ord` for these types, as
            // observing the interning order shouldn't be allowed.
            #[derive(Copy, Clone, PartialEq, Eq, Hash)]
            pub struct $name(u32);

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }

            impl $name {
                fn from_interner_index(idx: usize) -> Self {
                    $name(u32::try_from(idx).unwrap_or_else(|_| {
                        panic!(concat!("too many interned `", stringify!($name), "`s"))
                    }))
                }
            }

            impl ops::Index<$name> for Context {
                type Output = $ty;

                fn index(&self, interned: $name) -> &Self::Output {
                    match self.interners.$name.get_index(interned.0 as usize) {
                        Some(def) => def,
                        None => panic!(
                            concat!("`", stringify!($name), "({})` not interned in this `Context`"),
                            interned.0
                        ),
                    }
                }
            }
        )*
    };
}

interners! {
    InternedStr => str,
    Type => crate::TypeDef,
    Const => crate::ConstDef,
}

impl InternInCx<Type> for crate::TypeDef {
    fn intern_in_cx(self, cx: &Context) -> Type {
        let (idx, _) = cx.interners.Type.insert_full(Box::new(self));
        Type::from_interner_index(idx)
    }
}

impl InternInCx<Const> for crate::ConstDef {
    fn intern_in_cx(self, cx: &Context) -> Const {
        let (idx, _) = cx.interners.Const.insert_full(Box::new(self));
        Const::from_interner_index(idx)
    }
}

impl InternInCx<InternedStr> for &'_ str {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        let (idx, _) = cx.interners.InternedStr.insert_full(self.into());
        InternedStr::from_interner_index(idx)
    }
}

impl InternInCx<InternedStr> for String {
    fn intern_in_cx(self, cx: &Context) -> InternedStr {
        cx.intern(&self[..])
    }
}

/// Dense arena of entity definitions, indexed by (`Copy`) entity handles.
///
/// Entities are never removed from their arena, and instead "destroyed" by
/// flipping an `alive` flag in their definition (when they have one), which
/// keeps every handle permanently valid (but possibly referring to a dead
/// entity, that validation can then diagnose).
#[derive(Clone)]
pub struct EntityDefs<E: sealed::Entity> {
    defs: Vec<E::Def>,
}

impl<E: sealed::Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self { defs: vec![] }
    }
}

impl<E: sealed::Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: E::Def) -> E {
        let entity = E::from_index(self.defs.len());
        self.defs.push(def);
        entity
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterate over all defined entities, in definition order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (E, &E::Def)> + '_ {
        self.defs.iter().enumerate().map(|(i, def)| (E::from_index(i), def))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = E> + '_ {
        (0..self.defs.len()).map(E::from_index)
    }
}

impl<E: sealed::Entity> ops::Index<E> for EntityDefs<E> {
    type Output = E::Def;

    fn index(&self, entity: E) -> &E::Def {
        &self.defs[entity.to_index()]
    }
}

impl<E: sealed::Entity> ops::IndexMut<E> for EntityDefs<E> {
    fn index_mut(&mut self, entity: E) -> &mut E::Def {
        &mut self.defs[entity.to_index()]
    }
}

mod sealed {
    pub trait Entity: Copy + Eq + std::hash::Hash + 'static {
        type Def;

        fn from_index(idx: usize) -> Self;
        fn to_index(self) -> usize;
    }
}
pub use sealed::Entity;

macro_rules! entities {
    ($($name:ident => $def:ty),+ $(,)?) => {
        $(
            #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(u32);

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }

            impl sealed::Entity for $name {
                type Def = $def;

                fn from_index(idx: usize) -> Self {
                    $name(u32::try_from(idx).unwrap_or_else(|_| {
                        panic!(concat!("too many ", stringify!($name), " entities"))
                    }))
                }

                fn to_index(self) -> usize {
                    self.0 as usize
                }
            }
        )+
    };
}

entities! {
    Func => crate::FuncDecl,
    FuncParam => crate::FuncParamDef,
    Block => crate::BlockDef,
    BlockParam => crate::BlockParamDef,
    Inst => crate::InstDef,
    InstResult => crate::InstResultDef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeKind;

    #[test]
    fn interning_dedups_deeply_equal_types() {
        let cx = Context::new();
        let a = cx.intern(TypeKind::F32);
        let b = cx.intern(TypeKind::F32);
        let c = cx.intern(TypeKind::U32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(matches!(cx[a].kind, TypeKind::F32));
    }

    #[test]
    fn interned_strings_round_trip() {
        let cx = Context::new();
        let s = cx.intern("main");
        assert_eq!(&cx[s], "main");
        assert_eq!(cx.intern(String::from("main")), s);
    }
}
