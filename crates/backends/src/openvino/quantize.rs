// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Post-training quantization through the vendor quantizer.

use super::library::OvLibrary;
use super::OvConfig;
use crate::options::{as_bool, as_choice, as_string, as_usize, unknown_key};
use crate::workspace::QUANTIZED_DIR;
use crate::{
    calibration_dataset, BackendError, DatasetGenerator, OptionMap, OptionTable,
    PretrainedArtifacts, PretrainedModel, Stage, Workspace,
};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvQuantizationPreset {
    /// Symmetric weights and activations.
    Performance,
    /// Symmetric weights, asymmetric activations.
    Mixed,
}

/// Settings for the vendor quantizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OvQuantizationConfig {
    pub save_onnx_model: bool,
    pub preset: OvQuantizationPreset,
    /// Calibration samples to use at most.
    pub subset_size: usize,
    pub fast_bias_correction: bool,
    /// Architecture hint, e.g. `transformer`.
    pub model_type: Option<String>,
}

impl Default for OvQuantizationConfig {
    fn default() -> Self {
        Self {
            save_onnx_model: false,
            preset: OvQuantizationPreset::Performance,
            subset_size: 300,
            fast_bias_correction: true,
            model_type: None,
        }
    }
}

impl OptionTable for OvQuantizationConfig {
    const SCOPE: &'static str = "openvino quantization";
    const KEYS: &'static [&'static str] = &[
        "save_onnx_model",
        "preset",
        "subset_size",
        "fast_bias_correction",
        "model_type",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        match key {
            "save_onnx_model" => self.save_onnx_model = as_bool(s, key, value)?,
            "preset" => {
                self.preset = as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("performance", OvQuantizationPreset::Performance),
                        ("mixed", OvQuantizationPreset::Mixed),
                    ],
                )?
            }
            "subset_size" => self.subset_size = as_usize(s, key, value)?,
            "fast_bias_correction" => self.fast_bias_correction = as_bool(s, key, value)?,
            "model_type" => self.model_type = Some(as_string(s, key, value)?),
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        }
        Ok(())
    }
}

impl OvQuantizationConfig {
    pub fn build(options: &OptionMap) -> Result<Self, BackendError> {
        let mut config = OvQuantizationConfig::default();
        config.apply(options)?;
        Ok(config)
    }
}

/// What the quantize stage reads from the backend.
pub(crate) struct QuantizeContext<'a> {
    pub config: &'a OvConfig,
    pub library: &'a dyn OvLibrary,
    pub workspace: &'a Workspace,
    pub artifacts: &'a PretrainedArtifacts,
}

/// Quantizes a framework model into `workspace/quantized_model`.
pub(crate) fn quantize(
    ctx: &QuantizeContext<'_>,
    model: &dyn PretrainedModel,
    datasets: &dyn DatasetGenerator,
) -> Result<PathBuf, BackendError> {
    let settings = ctx.config.quantization_settings()?;
    let task = ctx.config.base.task;
    let mut quantizer = ctx
        .library
        .quantizer(model, task, ctx.config.base.seed)
        .map_err(BackendError::at(Stage::Quantization))?;

    let dataset = if ctx.config.calibration {
        let mut dataset = calibration_dataset(datasets, task, &ctx.artifacts.model_shapes)?;
        dataset.retain_columns(&quantizer.export_input_names());
        tracing::info!("calibrating on {} row(s)", dataset.num_rows());
        Some(dataset)
    } else {
        None
    };

    let save_dir = ctx.workspace.subdir(QUANTIZED_DIR)?;
    tracing::info!("quantizing {} into {}", model.class(), save_dir.display());
    quantizer
        .quantize(&save_dir, &settings, dataset.as_ref(), 1)
        .map_err(BackendError::at(Stage::Quantization))?;
    ctx.artifacts.save_to(&save_dir)?;
    Ok(save_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_overrides() {
        assert_eq!(OvQuantizationConfig::build(&OptionMap::new()).unwrap().subset_size, 300);

        let mut options = OptionMap::new();
        options.insert("preset".into(), json!("mixed"));
        options.insert("subset_size".into(), json!(16));
        let c = OvQuantizationConfig::build(&options).unwrap();
        assert_eq!(c.preset, OvQuantizationPreset::Mixed);
        assert_eq!(c.subset_size, 16);
    }

    #[test]
    fn test_unknown_key() {
        let mut options = OptionMap::new();
        options.insert("bits".into(), json!(4));
        assert!(OvQuantizationConfig::build(&options).is_err());
    }
}
