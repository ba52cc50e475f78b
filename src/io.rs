//! Shader IO attributes (`@builtin`, `@location`, `@interpolate`, etc.), as
//! attached to entry point parameters, return values, struct members and
//! module-scope variables.

use std::fmt;

/// Resource binding point (`@group(g) @binding(b)`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

impl fmt::Display for BindingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[group: {}, binding: {}]", self.group, self.binding)
    }
}

/// All the optional shader IO attributes a value can carry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IOAttributes {
    pub location: Option<u32>,
    pub blend_src: Option<u32>,
    pub color: Option<u32>,
    pub builtin: Option<BuiltinValue>,
    pub interpolation: Option<Interpolation>,
    pub invariant: bool,
    pub input_attachment_index: Option<u32>,
    pub depth_mode: Option<DepthMode>,
    pub binding_point: Option<BindingPoint>,
}

impl IOAttributes {
    pub fn builtin(builtin: BuiltinValue) -> Self {
        Self { builtin: Some(builtin), ..Self::default() }
    }

    pub fn location(location: u32) -> Self {
        Self { location: Some(location), ..Self::default() }
    }

    pub fn binding(group: u32, binding: u32) -> Self {
        Self { binding_point: Some(BindingPoint { group, binding }), ..Self::default() }
    }

    /// Whether any attribute relevant to shader IO is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Attribute syntax, e.g. `@location(0) @interpolate(flat)`.
impl fmt::Display for IOAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        let mut attr = |f: &mut fmt::Formatter<'_>, args: fmt::Arguments<'_>| {
            let r = write!(f, "{sep}@{args}");
            sep = " ";
            r
        };
        if let Some(bp) = self.binding_point {
            attr(f, format_args!("binding_point({}, {})", bp.group, bp.binding))?;
        }
        if let Some(location) = self.location {
            attr(f, format_args!("location({location})"))?;
        }
        if let Some(blend_src) = self.blend_src {
            attr(f, format_args!("blend_src({blend_src})"))?;
        }
        if let Some(color) = self.color {
            attr(f, format_args!("color({color})"))?;
        }
        if let Some(builtin) = self.builtin {
            attr(f, format_args!("builtin({builtin})"))?;
        }
        if let Some(interpolation) = self.interpolation {
            attr(f, format_args!("interpolate({interpolation})"))?;
        }
        if self.invariant {
            attr(f, format_args!("invariant"))?;
        }
        if let Some(index) = self.input_attachment_index {
            attr(f, format_args!("input_attachment_index({index})"))?;
        }
        if let Some(depth_mode) = self.depth_mode {
            attr(f, format_args!("depth_mode({depth_mode})"))?;
        }
        Ok(())
    }
}

macro_rules! named_enum {
    ($(#[$attr:meta])* pub enum $name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $str),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_enum! {
    /// Reserved shader-stage interface values (`@builtin(...)`).
    pub enum BuiltinValue {
        PointSize => "point_size",
        ClipDistances => "clip_distances",
        CullDistance => "cull_distance",
        FragDepth => "frag_depth",
        FrontFacing => "front_facing",
        GlobalInvocationId => "global_invocation_id",
        InstanceIndex => "instance_index",
        LocalInvocationId => "local_invocation_id",
        LocalInvocationIndex => "local_invocation_index",
        NumSubgroups => "num_subgroups",
        NumWorkgroups => "num_workgroups",
        Position => "position",
        SampleIndex => "sample_index",
        SampleMask => "sample_mask",
        SubgroupId => "subgroup_id",
        SubgroupInvocationId => "subgroup_invocation_id",
        SubgroupSize => "subgroup_size",
        VertexIndex => "vertex_index",
        WorkgroupId => "workgroup_id",
        PrimitiveIndex => "primitive_index",
        BarycentricCoord => "barycentric_coord",
    }
}

named_enum! {
    pub enum InterpolationType {
        Perspective => "perspective",
        Linear => "linear",
        Flat => "flat",
    }
}

named_enum! {
    pub enum InterpolationSampling {
        Center => "center",
        Centroid => "centroid",
        Sample => "sample",
        First => "first",
        Either => "either",
    }
}

named_enum! {
    /// `frag_depth` conservative depth modes.
    pub enum DepthMode {
        Undefined => "undefined",
        Any => "any",
        Greater => "greater",
        Less => "less",
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interpolation {
    pub ty: InterpolationType,
    pub sampling: Option<InterpolationSampling>,
}

impl Interpolation {
    pub const FLAT: Interpolation = Interpolation { ty: InterpolationType::Flat, sampling: None };
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sampling {
            Some(sampling) => write!(f, "{}, {}", self.ty, sampling),
            None => write!(f, "{}", self.ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_snake_case() {
        assert_eq!(BuiltinValue::FrontFacing.to_string(), "front_facing");
        assert_eq!(BuiltinValue::ALL.len(), 21);
        for b in BuiltinValue::ALL {
            assert!(b.name().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn default_attributes_are_empty() {
        assert!(IOAttributes::default().is_empty());
        assert!(!IOAttributes::location(0).is_empty());
        assert_eq!(
            IOAttributes::binding(1, 2).binding_point,
            Some(BindingPoint { group: 1, binding: 2 })
        );
    }
}
