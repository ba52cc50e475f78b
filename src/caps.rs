//! Capabilities: opt-in relaxations of which IR shapes validation accepts.

use std::fmt;

/// A single relaxation of the validation rules.
///
/// Backends enable these as they lower the IR towards shapes only they can
/// express (e.g. SPIR-V style `sample_mask` arrays), so the set of legal IR
/// at any pipeline point is "core rules, minus the enabled capabilities".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Capability {
    /// More than one entry point per module.
    AllowMultipleEntryPoints,
    /// `override` declarations, and override expressions in the root block.
    AllowOverrides,
    /// `let`s (and `construct`s) in the root block.
    AllowModuleScopeLets,
    /// Several resources sharing a binding point in the same entry point.
    AllowDuplicateBindings,
    Allow8BitIntegers,
    Allow64BitIntegers,
    /// Reference types (outside of function signatures and block parameters).
    AllowRefTypes,
    /// Pointers to handle types, as function parameters or `let`s.
    AllowPointerToHandle,
    /// `access` through pointers into vectors.
    AllowVectorElementPointer,
    /// Backend-only types (e.g. sampled images).
    AllowNonCoreTypes,
    /// Row-major / matrix-stride decorations on struct members.
    AllowStructMatrixDecorations,
    /// MSL-style entry point interfaces (pointer/struct parameters, etc.).
    MslAllowEntryPointInterface,
    /// `clip_distances` as a scalar `f32`.
    AllowClipDistancesOnF32,
    /// `clip_distances` as `f32`, `vecN<f32>` or `array<f32, N>`, declared
    /// at most twice per entry point direction.
    AllowClipDistancesOnF32ScalarAndVector,
    /// The `point_size` builtin.
    AllowPointSizeBuiltin,
    /// `@input_attachment_index` on non-`input_attachment` handle vars.
    AllowAnyInputAttachmentIndexType,
    /// Relaxed shader IO rules, after IO has been materialized as module vars.
    LoosenValidationForShaderIO,
    /// `@location` on composites containing only numeric elements.
    AllowLocationForNumericElements,
    /// Module-scope `in`/`out` vars without any IO annotation.
    AllowUnannotatedModuleIOVariables,
    /// Handle vars without binding points.
    AllowHandleVarsWithoutBindings,
    /// `let`s of any (non-void) type.
    AllowAnyLetType,
    /// `phony` instructions.
    AllowPhonyInstructions,
}

impl Capability {
    pub const ALL: [Capability; 22] = [
        Capability::AllowMultipleEntryPoints,
        Capability::AllowOverrides,
        Capability::AllowModuleScopeLets,
        Capability::AllowDuplicateBindings,
        Capability::Allow8BitIntegers,
        Capability::Allow64BitIntegers,
        Capability::AllowRefTypes,
        Capability::AllowPointerToHandle,
        Capability::AllowVectorElementPointer,
        Capability::AllowNonCoreTypes,
        Capability::AllowStructMatrixDecorations,
        Capability::MslAllowEntryPointInterface,
        Capability::AllowClipDistancesOnF32,
        Capability::AllowClipDistancesOnF32ScalarAndVector,
        Capability::AllowPointSizeBuiltin,
        Capability::AllowAnyInputAttachmentIndexType,
        Capability::LoosenValidationForShaderIO,
        Capability::AllowLocationForNumericElements,
        Capability::AllowUnannotatedModuleIOVariables,
        Capability::AllowHandleVarsWithoutBindings,
        Capability::AllowAnyLetType,
        Capability::AllowPhonyInstructions,
    ];

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Set of [`Capability`]s, passed by value and never mutated during a run.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);

    pub const fn with(self, cap: Capability) -> Self {
        Capabilities(self.0 | cap.bit())
    }

    pub const fn without(self, cap: Capability) -> Self {
        Capabilities(self.0 & !cap.bit())
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub const fn union(self, other: Capabilities) -> Self {
        Capabilities(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |&cap| self.contains(cap))
    }
}

impl From<Capability> for Capabilities {
    fn from(cap: Capability) -> Self {
        Capabilities::NONE.with(cap)
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Capabilities::NONE, Capabilities::with)
    }
}

impl<const N: usize> From<[Capability; N]> for Capabilities {
    fn from(caps: [Capability; N]) -> Self {
        caps.into_iter().collect()
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, other: Capabilities) -> Capabilities {
        self.union(other)
    }
}

impl std::ops::BitOr<Capability> for Capabilities {
    type Output = Capabilities;

    fn bitor(self, cap: Capability) -> Capabilities {
        self.with(cap)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl serde::Serialize for Capabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> serde::Deserialize<'de> for Capabilities {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<Capability>::deserialize(deserializer)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_has_a_distinct_bit() {
        let all: Capabilities = Capability::ALL.into_iter().collect();
        assert_eq!(all.iter().count(), Capability::ALL.len());
        for cap in Capability::ALL {
            assert!(all.contains(cap));
            assert!(!all.without(cap).contains(cap));
        }
    }

    #[test]
    fn union_and_membership() {
        let caps = Capabilities::from([Capability::AllowOverrides])
            | Capability::AllowModuleScopeLets;
        assert!(caps.contains(Capability::AllowOverrides));
        assert!(caps.contains(Capability::AllowModuleScopeLets));
        assert!(!caps.contains(Capability::AllowRefTypes));
        assert!(Capabilities::NONE.is_empty());
    }

    #[test]
    fn serde_as_list_of_names() {
        let caps = Capabilities::from([Capability::AllowPointSizeBuiltin]);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["AllowPointSizeBuiltin"]"#);
        let back: Capabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(back, caps);
    }
}
