//! The full lowering pipeline, taking a validated module to the form
//! expected by a SPIR-V style backend.

use super::case_switch_to_if_else::case_switch_to_if_else;
use super::prepare_immediate_data::{prepare_immediate_data, PrepareImmediateDataConfig};
use super::remove_uniform_vector_component_loads::remove_uniform_vector_component_loads;
use super::shader_io::{shader_io, RangeOffsets, ShaderIoConfig, MATERIALIZED_IO_CAPABILITIES};
use crate::caps::Capabilities;
use crate::validate::validate;
use crate::{Failure, Module};
use serde::{Deserialize, Serialize};

/// Capabilities of fully raised modules.
pub const RAISED_CAPABILITIES: Capabilities = MATERIALIZED_IO_CAPABILITIES;

/// Driver bug workarounds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workarounds {
    /// Lower `switch`es whose selectors span (almost) all of `i32`.
    pub polyfill_case_switch: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub workarounds: Workarounds,
    pub emit_vertex_point_size: bool,
    pub polyfill_f16_io: bool,
    pub depth_range_offsets: Option<RangeOffsets>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            workarounds: Workarounds::default(),
            emit_vertex_point_size: true,
            polyfill_f16_io: false,
            depth_range_offsets: None,
        }
    }
}

impl Options {
    /// Parse options from JSON, with absent fields taking their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub fn raise(module: &mut Module, options: &Options) -> Result<(), Failure> {
    let mut immediate_data_config = PrepareImmediateDataConfig::default();
    if let Some(offsets) = options.depth_range_offsets {
        let f32_ = module.cx_ref().ty_f32();
        immediate_data_config.add_internal_immediate_data(offsets.min, "tint_frag_depth_min", f32_);
        immediate_data_config.add_internal_immediate_data(offsets.max, "tint_frag_depth_max", f32_);
    }
    let immediate_data_layout = prepare_immediate_data(module, &immediate_data_config)?;

    remove_uniform_vector_component_loads(module)?;

    if options.workarounds.polyfill_case_switch {
        case_switch_to_if_else(module)?;
    }

    shader_io(
        module,
        &ShaderIoConfig {
            immediate_data_layout,
            emit_vertex_point_size: options.emit_vertex_point_size,
            polyfill_f16_io: options.polyfill_f16_io,
            depth_range_offsets: options.depth_range_offsets,
        },
    )?;

    validate(module, RAISED_CAPABILITIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_partial_json() {
        let options = Options::from_json("{}").unwrap();
        assert_eq!(options, Options::default());
        assert!(options.emit_vertex_point_size);

        let options = Options::from_json(
            r#"{
                "workarounds": { "polyfill_case_switch": true },
                "emit_vertex_point_size": false,
                "depth_range_offsets": { "min": 4, "max": 8 }
            }"#,
        )
        .unwrap();
        assert!(options.workarounds.polyfill_case_switch);
        assert!(!options.emit_vertex_point_size);
        assert!(!options.polyfill_f16_io);
        assert_eq!(options.depth_range_offsets, Some(RangeOffsets { min: 4, max: 8 }));

        assert!(Options::from_json(r#"{ "emit_vertex_point_size": 1 }"#).is_err());
    }
}
