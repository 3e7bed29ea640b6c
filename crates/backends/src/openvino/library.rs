// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The hardware-vendor library interface.

use super::properties::OvLoadOptions;
use super::quantize::OvQuantizationConfig;
use crate::{Dataset, HubOptions, ModelClass, ModelHub, ModelSource, PretrainedModel, Task};
use std::path::Path;

pub trait OvLibrary: ModelHub {
    /// Loads the framework (not yet converted) model, as the quantizer
    /// consumes it.
    fn load_framework_model(
        &self,
        class: ModelClass,
        source: &ModelSource,
        hub: &HubOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>>;

    /// Loads `source` as an IR model, converting it first when
    /// `source.export` is set.
    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OvLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>>;

    /// A quantizer for a loaded framework model.
    fn quantizer(
        &self,
        model: &dyn PretrainedModel,
        task: Task,
        seed: u64,
    ) -> anyhow::Result<Box<dyn OvQuantizer>>;
}

pub trait OvQuantizer {
    /// Input names of the graph the quantizer exports.
    fn export_input_names(&self) -> Vec<String>;

    /// Converts, quantizes and writes the model into `save_dir`.
    fn quantize(
        &mut self,
        save_dir: &Path,
        config: &OvQuantizationConfig,
        calibration_dataset: Option<&Dataset>,
        batch_size: usize,
    ) -> anyhow::Result<()>;
}
