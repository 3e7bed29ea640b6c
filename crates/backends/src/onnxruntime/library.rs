// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The runtime-execution library interface.

use super::calibration::{CalibrationConfig, CalibrationRanges};
use super::optimization::OptimizationConfig;
use super::quantization::QuantizationConfig;
use super::session::OrtLoadOptions;
use crate::{Dataset, ModelClass, ModelHub, ModelSource, PretrainedModel};
use std::path::{Path, PathBuf};

/// Loads models into runtime sessions and hands out graph tools.
pub trait OrtLibrary: ModelHub {
    /// Loads `source` with the given loader class, exporting it to the
    /// runtime's graph format first when `source.export` is set.
    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OrtLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>>;

    /// An optimizer over the named graph files of `model_dir`.
    fn optimizer(&self, model_dir: &Path, file_names: &[String]) -> anyhow::Result<Box<dyn GraphOptimizer>>;

    /// A quantizer for a single graph file of `model_dir`.
    fn quantizer(&self, model_dir: &Path, file_name: &str) -> anyhow::Result<Box<dyn GraphQuantizer>>;
}

pub trait GraphOptimizer {
    /// Writes optimized graphs into `save_dir` and returns that directory.
    fn optimize(&mut self, config: &OptimizationConfig, save_dir: &Path) -> anyhow::Result<PathBuf>;
}

pub trait GraphQuantizer {
    /// Collects activation ranges over `dataset`.
    fn fit(
        &mut self,
        dataset: &Dataset,
        calibration: &CalibrationConfig,
        operators_to_quantize: &[String],
        use_gpu: bool,
        batch_size: usize,
    ) -> anyhow::Result<CalibrationRanges>;

    /// Writes the quantized graph into `save_dir` and returns that directory.
    fn quantize(
        &mut self,
        config: &QuantizationConfig,
        ranges: Option<&CalibrationRanges>,
        save_dir: &Path,
    ) -> anyhow::Result<PathBuf>;
}
