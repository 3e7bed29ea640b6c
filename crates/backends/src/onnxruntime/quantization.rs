// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantization settings and the per-target presets.

use crate::options::{as_bool, as_choice, as_string_list, unknown_key};
use crate::{BackendError, OptionMap, OptionTable};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Operators quantized by default with dynamic quantization.
pub const DEFAULT_DYNAMIC_OPERATORS: [&str; 7] = [
    "Conv",
    "MatMul",
    "Attention",
    "LSTM",
    "Gather",
    "Transpose",
    "EmbedLayerNormalization",
];

/// Operators quantized by default with static quantization.
pub const DEFAULT_STATIC_OPERATORS: [&str; 14] = [
    "Add",
    "Conv",
    "Gather",
    "MatMul",
    "Mul",
    "Relu",
    "Clip",
    "LeakyRelu",
    "Sigmoid",
    "MaxPool",
    "GlobalAveragePool",
    "Transpose",
    "EmbedLayerNormalization",
    "Attention",
];

/// How quantized operators are represented in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantFormat {
    /// Dedicated quantized operators.
    QOperator,
    /// QuantizeLinear / DequantizeLinear pairs around float operators.
    QDQ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationMode {
    IntegerOps,
    QLinearOps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantType {
    QInt8,
    QUInt8,
}

/// Named quantization target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantizationPreset {
    Arm64,
    Avx2,
    Avx512,
    Avx512Vnni,
    TensorRt,
}

impl QuantizationPreset {
    pub const ALL: [QuantizationPreset; 5] = [
        QuantizationPreset::Arm64,
        QuantizationPreset::Avx2,
        QuantizationPreset::Avx512,
        QuantizationPreset::Avx512Vnni,
        QuantizationPreset::TensorRt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuantizationPreset::Arm64 => "arm64",
            QuantizationPreset::Avx2 => "avx2",
            QuantizationPreset::Avx512 => "avx512",
            QuantizationPreset::Avx512Vnni => "avx512_vnni",
            QuantizationPreset::TensorRt => "tensorrt",
        }
    }
}

impl fmt::Display for QuantizationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantizationPreset {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuantizationPreset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = QuantizationPreset::ALL.iter().map(|p| p.as_str()).collect();
                BackendError::Config(format!(
                    "unknown quantization preset '{s}'; expected one of {names:?}"
                ))
            })
    }
}

/// Arguments accepted on top of a preset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresetArgs {
    pub is_static: bool,
    pub use_symmetric_activations: bool,
    pub use_symmetric_weights: bool,
    pub per_channel: bool,
    pub reduce_range: Option<bool>,
    pub operators_to_quantize: Option<Vec<String>>,
    pub nodes_to_quantize: Vec<String>,
    pub nodes_to_exclude: Vec<String>,
}

impl OptionTable for PresetArgs {
    const SCOPE: &'static str = "auto_quantization";
    const KEYS: &'static [&'static str] = &[
        "is_static",
        "use_symmetric_activations",
        "use_symmetric_weights",
        "per_channel",
        "reduce_range",
        "operators_to_quantize",
        "nodes_to_quantize",
        "nodes_to_exclude",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        match key {
            "is_static" => self.is_static = as_bool(s, key, value)?,
            "use_symmetric_activations" => self.use_symmetric_activations = as_bool(s, key, value)?,
            "use_symmetric_weights" => self.use_symmetric_weights = as_bool(s, key, value)?,
            "per_channel" => self.per_channel = as_bool(s, key, value)?,
            "reduce_range" => self.reduce_range = Some(as_bool(s, key, value)?),
            "operators_to_quantize" => {
                self.operators_to_quantize = Some(as_string_list(s, key, value)?)
            }
            "nodes_to_quantize" => self.nodes_to_quantize = as_string_list(s, key, value)?,
            "nodes_to_exclude" => self.nodes_to_exclude = as_string_list(s, key, value)?,
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        }
        Ok(())
    }
}

/// Settings for the graph quantizer.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationConfig {
    pub is_static: bool,
    pub format: QuantFormat,
    pub mode: QuantizationMode,
    pub activations_dtype: QuantType,
    pub activations_symmetric: bool,
    pub weights_dtype: QuantType,
    pub weights_symmetric: bool,
    pub per_channel: bool,
    pub reduce_range: bool,
    pub nodes_to_quantize: Vec<String>,
    pub nodes_to_exclude: Vec<String>,
    pub operators_to_quantize: Vec<String>,
}

fn default_operators(is_static: bool) -> Vec<String> {
    let ops: &[&str] = if is_static {
        &DEFAULT_STATIC_OPERATORS
    } else {
        &DEFAULT_DYNAMIC_OPERATORS
    };
    ops.iter().map(|s| s.to_string()).collect()
}

fn mode_for(is_static: bool) -> QuantizationMode {
    if is_static {
        QuantizationMode::QLinearOps
    } else {
        QuantizationMode::IntegerOps
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            is_static: false,
            format: QuantFormat::QOperator,
            mode: QuantizationMode::IntegerOps,
            activations_dtype: QuantType::QUInt8,
            activations_symmetric: false,
            weights_dtype: QuantType::QInt8,
            weights_symmetric: true,
            per_channel: false,
            reduce_range: false,
            nodes_to_quantize: Vec::new(),
            nodes_to_exclude: Vec::new(),
            operators_to_quantize: default_operators(false),
        }
    }
}

impl OptionTable for QuantizationConfig {
    const SCOPE: &'static str = "quantization";
    const KEYS: &'static [&'static str] = &[
        "is_static",
        "format",
        "mode",
        "activations_dtype",
        "activations_symmetric",
        "weights_dtype",
        "weights_symmetric",
        "per_channel",
        "reduce_range",
        "nodes_to_quantize",
        "nodes_to_exclude",
        "operators_to_quantize",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        let dtypes = [("QInt8", QuantType::QInt8), ("QUInt8", QuantType::QUInt8)];
        match key {
            "is_static" => self.is_static = as_bool(s, key, value)?,
            "format" => {
                self.format = as_choice(
                    s,
                    key,
                    value,
                    &[("QOperator", QuantFormat::QOperator), ("QDQ", QuantFormat::QDQ)],
                )?
            }
            "mode" => {
                self.mode = as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("IntegerOps", QuantizationMode::IntegerOps),
                        ("QLinearOps", QuantizationMode::QLinearOps),
                    ],
                )?
            }
            "activations_dtype" => self.activations_dtype = as_choice(s, key, value, &dtypes)?,
            "activations_symmetric" => self.activations_symmetric = as_bool(s, key, value)?,
            "weights_dtype" => self.weights_dtype = as_choice(s, key, value, &dtypes)?,
            "weights_symmetric" => self.weights_symmetric = as_bool(s, key, value)?,
            "per_channel" => self.per_channel = as_bool(s, key, value)?,
            "reduce_range" => self.reduce_range = as_bool(s, key, value)?,
            "nodes_to_quantize" => self.nodes_to_quantize = as_string_list(s, key, value)?,
            "nodes_to_exclude" => self.nodes_to_exclude = as_string_list(s, key, value)?,
            "operators_to_quantize" => self.operators_to_quantize = as_string_list(s, key, value)?,
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        }
        Ok(())
    }
}

impl QuantizationConfig {
    /// Builds the config a preset describes for the given arguments.
    pub fn from_preset(preset: QuantizationPreset, overrides: &OptionMap) -> Result<Self, BackendError> {
        let mut args = PresetArgs {
            use_symmetric_weights: true,
            ..Default::default()
        };
        if preset == QuantizationPreset::TensorRt {
            args.is_static = true;
            args.use_symmetric_activations = true;
            args.per_channel = true;
        }
        args.apply(overrides)?;

        let (activations_dtype, weights_dtype, reduce_range) = match preset {
            QuantizationPreset::Arm64 => (QuantType::QUInt8, QuantType::QInt8, false),
            QuantizationPreset::Avx2 => (QuantType::QUInt8, QuantType::QUInt8, true),
            QuantizationPreset::Avx512 | QuantizationPreset::Avx512Vnni => {
                (QuantType::QUInt8, QuantType::QInt8, false)
            }
            QuantizationPreset::TensorRt => (QuantType::QInt8, QuantType::QInt8, false),
        };
        let format = if args.is_static {
            QuantFormat::QDQ
        } else {
            QuantFormat::QOperator
        };

        let config = QuantizationConfig {
            is_static: args.is_static,
            format,
            mode: mode_for(args.is_static),
            activations_dtype,
            activations_symmetric: args.use_symmetric_activations,
            weights_dtype,
            weights_symmetric: args.use_symmetric_weights,
            per_channel: args.per_channel,
            reduce_range: args.reduce_range.unwrap_or(reduce_range),
            nodes_to_quantize: args.nodes_to_quantize,
            nodes_to_exclude: args.nodes_to_exclude,
            operators_to_quantize: args
                .operators_to_quantize
                .unwrap_or_else(|| default_operators(args.is_static)),
        };
        tracing::debug!("quantization preset {preset}: {config:?}");
        Ok(config)
    }

    /// Builds a config from explicit options. Unless given, the mode and the
    /// operator set follow `is_static`.
    pub fn manual(options: &OptionMap) -> Result<Self, BackendError> {
        let mut config = QuantizationConfig::default();
        config.apply(options)?;
        if !options.contains_key("mode") {
            config.mode = mode_for(config.is_static);
        }
        if !options.contains_key("operators_to_quantize") {
            config.operators_to_quantize = default_operators(config.is_static);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preset_defaults_are_dynamic() {
        let c = QuantizationConfig::from_preset(QuantizationPreset::Avx512Vnni, &OptionMap::new()).unwrap();
        assert!(!c.is_static);
        assert_eq!(c.format, QuantFormat::QOperator);
        assert_eq!(c.mode, QuantizationMode::IntegerOps);
        assert_eq!(c.operators_to_quantize.len(), DEFAULT_DYNAMIC_OPERATORS.len());
    }

    #[test]
    fn test_static_preset() {
        let mut overrides = OptionMap::new();
        overrides.insert("is_static".into(), json!(true));
        overrides.insert("per_channel".into(), json!(true));
        let c = QuantizationConfig::from_preset(QuantizationPreset::Arm64, &overrides).unwrap();
        assert!(c.is_static && c.per_channel);
        assert_eq!(c.format, QuantFormat::QDQ);
        assert_eq!(c.mode, QuantizationMode::QLinearOps);
    }

    #[test]
    fn test_tensorrt_is_static() {
        let c = QuantizationConfig::from_preset(QuantizationPreset::TensorRt, &OptionMap::new()).unwrap();
        assert!(c.is_static);
        assert_eq!(c.activations_dtype, QuantType::QInt8);
    }

    #[test]
    fn test_preset_rejects_manual_only_keys() {
        let mut overrides = OptionMap::new();
        overrides.insert("format".into(), json!("QDQ"));
        assert!(QuantizationConfig::from_preset(QuantizationPreset::Avx2, &overrides).is_err());
    }

    #[test]
    fn test_manual_mode_follows_static() {
        let mut options = OptionMap::new();
        options.insert("is_static".into(), json!(true));
        options.insert("format".into(), json!("QDQ"));
        let c = QuantizationConfig::manual(&options).unwrap();
        assert_eq!(c.mode, QuantizationMode::QLinearOps);
        assert_eq!(c.format, QuantFormat::QDQ);

        let d = QuantizationConfig::manual(&OptionMap::new()).unwrap();
        assert_eq!(d, QuantizationConfig::default());
    }
}
