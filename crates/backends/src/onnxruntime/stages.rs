// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The optimize and quantize stages.
//!
//! Each stage reads the graph files of the current artifact directory and
//! writes a new artifact directory inside the workspace, together with a
//! copy of the model's config and processor descriptions.

use super::library::OrtLibrary;
use super::optimization::OptimizationConfig;
use super::quantization::QuantizationConfig;
use super::OrtConfig;
use crate::workspace::{OPTIMIZED_DIR, QUANTIZED_DIR};
use crate::{
    calibration_dataset, BackendError, DatasetGenerator, PretrainedArtifacts, Stage, Workspace,
};
use model_ir::layout;
use std::path::{Path, PathBuf};

/// Decoder files superseded by the merged decoder.
const UNMERGED_DECODERS: [&str; 2] = ["decoder_model.onnx", "decoder_with_past_model.onnx"];

/// What every stage reads from the backend.
pub(crate) struct StageContext<'a> {
    pub config: &'a OrtConfig,
    pub library: &'a dyn OrtLibrary,
    pub workspace: &'a Workspace,
    pub artifacts: &'a PretrainedArtifacts,
}

/// Lists the graph files of `dir` in name order.
pub fn component_files(dir: &Path, use_merged: bool) -> Result<Vec<String>, BackendError> {
    let mut files = layout::list_files_with_extension(dir, "onnx")?;
    if use_merged {
        files.retain(|f| !UNMERGED_DECODERS.contains(&f.as_str()));
    }
    if files.is_empty() {
        return Err(BackendError::UnsupportedConfiguration(format!(
            "no graph files found in {}",
            dir.display()
        )));
    }
    Ok(files)
}

/// Optimizes every graph of `current` into `workspace/optimized`.
pub(crate) fn optimize(
    ctx: &StageContext<'_>,
    current: &Path,
    config: &OptimizationConfig,
) -> Result<PathBuf, BackendError> {
    let files = component_files(current, ctx.config.use_merged)?;
    tracing::info!("optimizing {} graph(s): {files:?}", files.len());

    let save_dir = ctx.workspace.subdir(OPTIMIZED_DIR)?;
    let mut optimizer = ctx
        .library
        .optimizer(current, &files)
        .map_err(BackendError::at(Stage::Optimization))?;
    let out = optimizer
        .optimize(config, &save_dir)
        .map_err(BackendError::at(Stage::Optimization))?;
    ctx.artifacts.save_to(&out)?;
    Ok(out)
}

/// Quantizes every graph of `current` into `workspace/quantized_model`,
/// calibrating first when calibration is enabled.
///
/// # Errors
/// [`BackendError::UnsupportedConfiguration`] when calibration is requested
/// for a model with several graphs. This is checked before any dataset is
/// generated.
pub(crate) fn quantize(
    ctx: &StageContext<'_>,
    current: &Path,
    config: &QuantizationConfig,
    input_names: &[String],
    datasets: &dyn DatasetGenerator,
) -> Result<PathBuf, BackendError> {
    let files = component_files(current, ctx.config.use_merged)?;
    let calibrate = ctx.config.is_calibrated();
    if calibrate && files.len() > 1 {
        return Err(BackendError::UnsupportedConfiguration(format!(
            "calibration is only supported for single-graph models, found {files:?}"
        )));
    }

    let calibration = if calibrate {
        let mut dataset =
            calibration_dataset(datasets, ctx.config.base.task, &ctx.artifacts.model_shapes)?;
        dataset.retain_columns(input_names);
        let calibration_config = ctx
            .config
            .calibration_config(&dataset)?
            .ok_or_else(|| BackendError::Config("calibration enabled without a method".into()))?;
        tracing::info!(
            "calibrating with {} on {} row(s)",
            calibration_config.method.name(),
            dataset.num_rows()
        );
        Some((dataset, calibration_config))
    } else {
        None
    };

    let use_gpu = ctx.config.execution_provider()?.uses_cuda();
    let save_dir = ctx.workspace.subdir(QUANTIZED_DIR)?;
    for file in &files {
        tracing::info!("quantizing {file}");
        let mut quantizer = ctx
            .library
            .quantizer(current, file)
            .map_err(BackendError::at(Stage::Quantization))?;
        let ranges = match &calibration {
            Some((dataset, calibration_config)) => Some(
                quantizer
                    .fit(
                        dataset,
                        calibration_config,
                        &config.operators_to_quantize,
                        use_gpu,
                        1,
                    )
                    .map_err(BackendError::at(Stage::Calibration))?,
            ),
            None => None,
        };
        quantizer
            .quantize(config, ranges.as_ref(), &save_dir)
            .map_err(BackendError::at(Stage::Quantization))?;
    }
    ctx.artifacts.save_to(&save_dir)?;
    Ok(save_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"{}").unwrap();
        }
    }

    #[test]
    fn test_component_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["unet.onnx", "text_encoder.onnx", "config.json", "vae_decoder.onnx"]);
        let files = component_files(dir.path(), false).unwrap();
        assert_eq!(files, vec!["text_encoder.onnx", "unet.onnx", "vae_decoder.onnx"]);
    }

    #[test]
    fn test_merged_decoder_excludes_unmerged() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &["decoder_model.onnx", "decoder_with_past_model.onnx", "decoder_model_merged.onnx"],
        );
        assert_eq!(component_files(dir.path(), true).unwrap(), vec!["decoder_model_merged.onnx"]);
        assert_eq!(component_files(dir.path(), false).unwrap().len(), 3);
    }

    #[test]
    fn test_no_graphs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            component_files(dir.path(), false),
            Err(BackendError::UnsupportedConfiguration(_))
        ));
    }
}
