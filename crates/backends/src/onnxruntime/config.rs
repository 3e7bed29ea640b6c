// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime-execution backend configuration.
//!
//! # TOML Format
//! ```toml
//! model = "distilbert-base-uncased-finetuned-sst-2-english"
//! task = "text-classification"
//! device = "cpu"
//! no_weights = true
//!
//! quantization = true
//! auto_quantization = "avx512_vnni"
//! calibration = true
//! auto_calibration = "minmax"
//!
//! [auto_quantization_config]
//! is_static = true
//!
//! [session_options]
//! enable_profiling = false
//! ```

use super::calibration::{AutoCalibration, CalibrationConfig};
use super::optimization::{OptimizationConfig, OptimizationPreset};
use super::quantization::{QuantizationConfig, QuantizationPreset};
use super::session::{ExecutionProvider, SessionOptions};
use crate::choice::{resolve_exclusive, Exclusive};
use crate::config::{from_file, from_toml, to_toml};
use crate::{BackendConfig, BackendError, Dataset, Device, OptionMap};
use std::path::Path;

/// Configuration of an [`OrtBackend`](super::OrtBackend).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrtConfig {
    #[serde(flatten)]
    pub base: BackendConfig,

    /// Execution provider name; inferred from the device when absent.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub provider_options: OptionMap,
    /// Defaults to `true` for CUDA providers.
    #[serde(default)]
    pub use_io_binding: Option<bool>,
    #[serde(default)]
    pub session_options: OptionMap,
    #[serde(default)]
    pub intra_op_num_threads: Option<usize>,
    #[serde(default)]
    pub inter_op_num_threads: Option<usize>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub use_merged: bool,

    #[serde(default)]
    pub optimization: bool,
    #[serde(default)]
    pub optimization_config: OptionMap,
    #[serde(default)]
    pub auto_optimization: Option<String>,
    #[serde(default)]
    pub auto_optimization_config: OptionMap,

    #[serde(default)]
    pub quantization: bool,
    #[serde(default)]
    pub quantization_config: OptionMap,
    #[serde(default)]
    pub auto_quantization: Option<String>,
    #[serde(default)]
    pub auto_quantization_config: OptionMap,

    #[serde(default)]
    pub calibration: bool,
    #[serde(default)]
    pub calibration_config: OptionMap,
    #[serde(default)]
    pub auto_calibration: Option<String>,
    #[serde(default)]
    pub auto_calibration_config: OptionMap,
}

fn default_true() -> bool {
    true
}

impl OrtConfig {
    pub fn new(base: BackendConfig) -> Self {
        Self {
            base,
            provider: None,
            provider_options: OptionMap::new(),
            use_io_binding: None,
            session_options: OptionMap::new(),
            intra_op_num_threads: None,
            inter_op_num_threads: None,
            use_cache: true,
            use_merged: false,
            optimization: false,
            optimization_config: OptionMap::new(),
            auto_optimization: None,
            auto_optimization_config: OptionMap::new(),
            quantization: false,
            quantization_config: OptionMap::new(),
            auto_quantization: None,
            auto_quantization_config: OptionMap::new(),
            calibration: false,
            calibration_config: OptionMap::new(),
            auto_calibration: None,
            auto_calibration_config: OptionMap::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BackendError> {
        from_file(path)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, BackendError> {
        from_toml(toml_str)
    }

    pub fn to_toml(&self) -> Result<String, BackendError> {
        to_toml(self)
    }

    pub fn is_optimized(&self) -> bool {
        self.optimization || self.auto_optimization.is_some()
    }

    pub fn is_quantized(&self) -> bool {
        self.quantization || self.auto_quantization.is_some()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration || self.auto_calibration.is_some()
    }

    /// The configured provider, or the one implied by the device.
    pub fn execution_provider(&self) -> Result<ExecutionProvider, BackendError> {
        match &self.provider {
            Some(name) => name.parse(),
            None => Ok(ExecutionProvider::for_device(self.base.device)),
        }
    }

    /// Session options with the explicit thread counts folded in.
    pub fn session(&self) -> Result<SessionOptions, BackendError> {
        SessionOptions::build(
            &self.session_options,
            self.intra_op_num_threads,
            self.inter_op_num_threads,
        )
    }

    /// Provider options, with the CUDA device id filled in when absent.
    pub fn effective_provider_options(&self) -> OptionMap {
        let mut options = self.provider_options.clone();
        if let Device::Cuda(index) = self.base.device {
            options
                .entry("device_id".to_string())
                .or_insert_with(|| serde_json::Value::from(index));
        }
        options
    }

    pub fn effective_use_io_binding(&self) -> Result<bool, BackendError> {
        match self.use_io_binding {
            Some(flag) => Ok(flag),
            None => Ok(self.execution_provider()?.uses_cuda()),
        }
    }

    /// The optimizer settings, when optimization is enabled.
    pub fn optimization_config(&self) -> Result<Option<OptimizationConfig>, BackendError> {
        let for_gpu = self.base.device.is_cuda();
        let preset = self
            .auto_optimization
            .as_deref()
            .map(str::parse::<OptimizationPreset>)
            .transpose()?;
        let manual = self.optimization.then_some(&self.optimization_config);
        match resolve_exclusive("optimization", preset, manual) {
            Some(Exclusive::Auto(preset)) => {
                OptimizationConfig::from_preset(preset, for_gpu, &self.auto_optimization_config).map(Some)
            }
            Some(Exclusive::Manual(options)) => OptimizationConfig::manual(for_gpu, options).map(Some),
            None => Ok(None),
        }
    }

    /// The quantizer settings, when quantization is enabled.
    pub fn quantization_config(&self) -> Result<Option<QuantizationConfig>, BackendError> {
        let preset = self
            .auto_quantization
            .as_deref()
            .map(str::parse::<QuantizationPreset>)
            .transpose()?;
        let manual = self.quantization.then_some(&self.quantization_config);
        match resolve_exclusive("quantization", preset, manual) {
            Some(Exclusive::Auto(preset)) => {
                QuantizationConfig::from_preset(preset, &self.auto_quantization_config).map(Some)
            }
            Some(Exclusive::Manual(options)) => QuantizationConfig::manual(options).map(Some),
            None => Ok(None),
        }
    }

    /// The calibration settings for `dataset`, when calibration is enabled.
    pub fn calibration_config(&self, dataset: &Dataset) -> Result<Option<CalibrationConfig>, BackendError> {
        let auto = self
            .auto_calibration
            .as_deref()
            .map(str::parse::<AutoCalibration>)
            .transpose()?;
        let manual = self.calibration.then_some(&self.calibration_config);
        match resolve_exclusive("calibration", auto, manual) {
            Some(Exclusive::Auto(auto)) => {
                CalibrationConfig::from_auto(auto, &self.auto_calibration_config, dataset).map(Some)
            }
            Some(Exclusive::Manual(options)) => CalibrationConfig::manual(options, dataset).map(Some),
            None => Ok(None),
        }
    }

    /// Checks the configuration for consistency. Runs before anything else
    /// when a backend is built.
    pub fn validate(&self) -> Result<(), BackendError> {
        match self.base.device {
            Device::Cpu | Device::Cuda(_) => {}
            other => {
                return Err(BackendError::Config(format!(
                    "the onnxruntime backend runs on cpu or cuda, not {other}"
                )))
            }
        }
        self.execution_provider()?;
        self.session()?;
        self.optimization_config()?;

        let quantization = self.quantization_config()?;
        if self.is_calibrated() && quantization.is_none() {
            return Err(BackendError::Config(
                "calibration requires quantization to be enabled".into(),
            ));
        }
        if let Some(auto) = &self.auto_calibration {
            auto.parse::<AutoCalibration>()?;
        }
        if let Some(q) = &quantization {
            if q.is_static && !self.is_calibrated() {
                return Err(BackendError::Config(
                    "static quantization requires calibration to be enabled".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;
    use serde_json::json;

    fn base() -> OrtConfig {
        OrtConfig::new(BackendConfig::new("bert-base-uncased", Task::TextClassification))
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
model = "bert-base-uncased"
task = "text-classification"
device = "cuda:1"
auto_optimization = "O2"

[session_options]
enable_profiling = true
"#;
        let c = OrtConfig::from_toml(toml).unwrap();
        assert!(c.is_optimized());
        assert_eq!(c.execution_provider().unwrap(), ExecutionProvider::Cuda);
        assert_eq!(c.effective_provider_options()["device_id"], json!(1));
        assert!(c.effective_use_io_binding().unwrap());
        assert!(c.session().unwrap().enable_profiling);
        c.validate().unwrap();
    }

    #[test]
    fn test_unknown_top_level_key() {
        let toml = r#"
model = "gpt2"
task = "text-generation"
optimisation = true
"#;
        assert!(OrtConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_gpu_device() {
        let mut c = base();
        c.base.device = Device::Gpu(0);
        assert!(matches!(c.validate(), Err(BackendError::Config(_))));
    }

    #[test]
    fn test_calibration_requires_quantization() {
        let mut c = base();
        c.auto_calibration = Some("minmax".into());
        assert!(c.validate().is_err());
        c.quantization = true;
        c.validate().unwrap();
    }

    #[test]
    fn test_static_requires_calibration() {
        let mut c = base();
        c.quantization = true;
        c.quantization_config.insert("is_static".into(), json!(true));
        assert!(c.validate().is_err());
        c.calibration = true;
        c.validate().unwrap();
    }

    #[test]
    fn test_unknown_presets() {
        let mut c = base();
        c.auto_quantization = Some("avx1024".into());
        assert!(c.validate().is_err());

        let mut c = base();
        c.auto_optimization = Some("O9".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_auto_optimization_wins() {
        let mut c = base();
        c.optimization = true;
        c.optimization_config.insert("optimization_level".into(), json!(99));
        c.auto_optimization = Some("O1".into());
        let applied = c.optimization_config().unwrap().unwrap();
        assert_eq!(applied.optimization_level, 1);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut c = base();
        c.auto_quantization = Some("arm64".into());
        c.auto_quantization_config.insert("per_channel".into(), json!(true));
        let back = OrtConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }
}
