// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Hardware-vendor backend configuration.
//!
//! # TOML Format
//! ```toml
//! model = "google/vit-base-patch16-224"
//! task = "image-classification"
//! device = "cpu"
//! reshape = true
//! inter_op_num_threads = 4
//!
//! [openvino_config]
//! PERFORMANCE_HINT = "LATENCY"
//! ```

use super::properties::OvProperties;
use super::quantize::OvQuantizationConfig;
use crate::config::{from_file, from_toml, to_toml};
use crate::{BackendConfig, BackendError, Device, OptionMap};
use std::path::Path;

/// Configuration of an [`OvBackend`](super::OvBackend).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OvConfig {
    #[serde(flatten)]
    pub base: BackendConfig,

    #[serde(default)]
    pub openvino_config: OptionMap,
    /// Written into the `INFERENCE_NUM_THREADS` property.
    #[serde(default)]
    pub inter_op_num_threads: Option<usize>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub use_merged: bool,

    #[serde(default)]
    pub quantization: bool,
    #[serde(default)]
    pub quantization_config: OptionMap,
    #[serde(default)]
    pub calibration: bool,

    /// Reshape the model to static input shapes before compiling.
    #[serde(default)]
    pub reshape: bool,
    /// Convert the model to half precision before compiling.
    #[serde(default)]
    pub half: bool,
}

fn default_true() -> bool {
    true
}

impl OvConfig {
    pub fn new(base: BackendConfig) -> Self {
        Self {
            base,
            openvino_config: OptionMap::new(),
            inter_op_num_threads: None,
            use_cache: true,
            use_merged: false,
            quantization: false,
            quantization_config: OptionMap::new(),
            calibration: false,
            reshape: false,
            half: false,
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

    pub fn properties(&self) -> Result<OvProperties, BackendError> {
        OvProperties::build(&self.openvino_config, self.inter_op_num_threads)
    }

    pub fn quantization_settings(&self) -> Result<OvQuantizationConfig, BackendError> {
        OvQuantizationConfig::build(&self.quantization_config)
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        match self.base.device {
            Device::Cpu | Device::Gpu(_) => {}
            other => {
                return Err(BackendError::Config(format!(
                    "the openvino backend runs on cpu or gpu, not {other}"
                )))
            }
        }
        if self.calibration && !self.quantization {
            return Err(BackendError::Config(
                "calibration requires quantization to be enabled".into(),
            ));
        }
        self.properties()?;
        self.quantization_settings()?;
        Ok(())
    }
}
