// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph optimization settings and the `O1`..`O4` presets.
//!
//! | Preset | Level | GELU approximation | fp16 | GPU only |
//! |---|---|---|---|---|
//! | O1 | 1 | no | no | no |
//! | O2 | 2 | no | no | no |
//! | O3 | 2 | yes | no | no |
//! | O4 | 2 | yes | yes | yes |

use crate::options::{as_bool, as_usize, unknown_key};
use crate::{BackendError, OptionMap, OptionTable};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A named optimization preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizationPreset {
    O1,
    O2,
    O3,
    O4,
}

impl OptimizationPreset {
    pub const ALL: [OptimizationPreset; 4] = [
        OptimizationPreset::O1,
        OptimizationPreset::O2,
        OptimizationPreset::O3,
        OptimizationPreset::O4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationPreset::O1 => "O1",
            OptimizationPreset::O2 => "O2",
            OptimizationPreset::O3 => "O3",
            OptimizationPreset::O4 => "O4",
        }
    }
}

impl fmt::Display for OptimizationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationPreset {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptimizationPreset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                BackendError::Config(format!(
                    "unknown optimization preset '{s}'; expected one of O1, O2, O3, O4"
                ))
            })
    }
}

/// Settings for the graph optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    /// 0 disables all optimizations, 1 basic, 2 extended, 99 everything.
    pub optimization_level: usize,
    pub optimize_for_gpu: bool,
    pub fp16: bool,
    pub enable_transformers_specific_optimizations: bool,
    pub disable_gelu_fusion: bool,
    pub disable_layer_norm_fusion: bool,
    pub disable_attention_fusion: bool,
    pub disable_skip_layer_norm_fusion: bool,
    pub disable_bias_skip_layer_norm_fusion: bool,
    pub disable_bias_gelu_fusion: bool,
    pub disable_embed_layer_norm_fusion: bool,
    pub enable_gelu_approximation: bool,
    pub disable_shape_inference: bool,
    pub use_mask_index: bool,
    pub no_attention_mask: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            optimization_level: 1,
            optimize_for_gpu: false,
            fp16: false,
            enable_transformers_specific_optimizations: true,
            disable_gelu_fusion: false,
            disable_layer_norm_fusion: false,
            disable_attention_fusion: false,
            disable_skip_layer_norm_fusion: true,
            disable_bias_skip_layer_norm_fusion: false,
            disable_bias_gelu_fusion: false,
            disable_embed_layer_norm_fusion: true,
            enable_gelu_approximation: false,
            disable_shape_inference: false,
            use_mask_index: false,
            no_attention_mask: false,
        }
    }
}

impl OptionTable for OptimizationConfig {
    const SCOPE: &'static str = "optimization";
    const KEYS: &'static [&'static str] = &[
        "optimization_level",
        "fp16",
        "enable_transformers_specific_optimizations",
        "disable_gelu_fusion",
        "disable_layer_norm_fusion",
        "disable_attention_fusion",
        "disable_skip_layer_norm_fusion",
        "disable_bias_skip_layer_norm_fusion",
        "disable_bias_gelu_fusion",
        "disable_embed_layer_norm_fusion",
        "enable_gelu_approximation",
        "disable_shape_inference",
        "use_mask_index",
        "no_attention_mask",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        if key == "optimization_level" {
            let level = as_usize(s, key, value)?;
            if !matches!(level, 0 | 1 | 2 | 99) {
                return Err(BackendError::InvalidOption {
                    scope: s,
                    key: key.to_string(),
                    detail: format!("level must be 0, 1, 2 or 99, got {level}"),
                });
            }
            self.optimization_level = level;
            return Ok(());
        }
        let flag = as_bool(s, key, value)?;
        let slot = match key {
            "fp16" => &mut self.fp16,
            "enable_transformers_specific_optimizations" => {
                &mut self.enable_transformers_specific_optimizations
            }
            "disable_gelu_fusion" => &mut self.disable_gelu_fusion,
            "disable_layer_norm_fusion" => &mut self.disable_layer_norm_fusion,
            "disable_attention_fusion" => &mut self.disable_attention_fusion,
            "disable_skip_layer_norm_fusion" => &mut self.disable_skip_layer_norm_fusion,
            "disable_bias_skip_layer_norm_fusion" => &mut self.disable_bias_skip_layer_norm_fusion,
            "disable_bias_gelu_fusion" => &mut self.disable_bias_gelu_fusion,
            "disable_embed_layer_norm_fusion" => &mut self.disable_embed_layer_norm_fusion,
            "enable_gelu_approximation" => &mut self.enable_gelu_approximation,
            "disable_shape_inference" => &mut self.disable_shape_inference,
            "use_mask_index" => &mut self.use_mask_index,
            "no_attention_mask" => &mut self.no_attention_mask,
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        };
        *slot = flag;
        Ok(())
    }
}

impl OptimizationConfig {
    /// Builds the config of a preset, then applies `overrides`.
    ///
    /// # Errors
    /// [`BackendError::UnsupportedConfiguration`] for `O4` off-GPU.
    pub fn from_preset(
        preset: OptimizationPreset,
        for_gpu: bool,
        overrides: &OptionMap,
    ) -> Result<Self, BackendError> {
        let mut config = OptimizationConfig {
            optimize_for_gpu: for_gpu,
            ..Default::default()
        };
        match preset {
            OptimizationPreset::O1 => config.optimization_level = 1,
            OptimizationPreset::O2 => config.optimization_level = 2,
            OptimizationPreset::O3 => {
                config.optimization_level = 2;
                config.enable_gelu_approximation = true;
            }
            OptimizationPreset::O4 => {
                if !for_gpu {
                    return Err(BackendError::UnsupportedConfiguration(
                        "optimization preset O4 (fp16) is only available on GPU".into(),
                    ));
                }
                config.optimization_level = 2;
                config.enable_gelu_approximation = true;
                config.fp16 = true;
            }
        }
        config.apply(overrides)?;
        tracing::debug!("optimization preset {preset}: {config:?}");
        Ok(config)
    }

    /// Builds a config from explicit options.
    pub fn manual(for_gpu: bool, options: &OptionMap) -> Result<Self, BackendError> {
        let mut config = OptimizationConfig::default();
        config.apply(options)?;
        config.optimize_for_gpu = for_gpu;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presets() {
        let none = OptionMap::new();
        let o1 = OptimizationConfig::from_preset(OptimizationPreset::O1, false, &none).unwrap();
        assert_eq!(o1.optimization_level, 1);
        let o3 = OptimizationConfig::from_preset(OptimizationPreset::O3, false, &none).unwrap();
        assert_eq!(o3.optimization_level, 2);
        assert!(o3.enable_gelu_approximation);
        assert!(!o3.fp16);
        let o4 = OptimizationConfig::from_preset(OptimizationPreset::O4, true, &none).unwrap();
        assert!(o4.fp16 && o4.optimize_for_gpu);
    }

    #[test]
    fn test_o4_needs_gpu() {
        let err = OptimizationConfig::from_preset(OptimizationPreset::O4, false, &OptionMap::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn test_preset_overrides() {
        let mut overrides = OptionMap::new();
        overrides.insert("disable_attention_fusion".into(), json!(true));
        let c = OptimizationConfig::from_preset(OptimizationPreset::O2, false, &overrides).unwrap();
        assert!(c.disable_attention_fusion);
    }

    #[test]
    fn test_manual() {
        let mut options = OptionMap::new();
        options.insert("optimization_level".into(), json!(99));
        let c = OptimizationConfig::manual(true, &options).unwrap();
        assert_eq!(c.optimization_level, 99);
        assert!(c.optimize_for_gpu);

        options.insert("optimization_level".into(), json!(3));
        assert!(OptimizationConfig::manual(false, &options).is_err());
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("o2".parse::<OptimizationPreset>().unwrap(), OptimizationPreset::O2);
        assert!("O5".parse::<OptimizationPreset>().is_err());
    }
}
