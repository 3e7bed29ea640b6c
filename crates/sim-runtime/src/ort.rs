// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph-runtime library: export, session creation, graph optimization and
//! quantization.

use crate::calibrate;
use crate::compute::Kernels;
use crate::graph::{self, GraphDef, GraphFormat, OptimizationRecord, QuantizationRecord};
use crate::model::SimModel;
use crate::weights::{ModelWeights, QuantizeTargets};
use crate::{SimError, SimRuntime};
use backends::onnxruntime::{
    CalibrationConfig, CalibrationRanges, GraphOptimizer, GraphQuantizer, OptimizationConfig,
    OrtLibrary, OrtLoadOptions, QuantizationConfig,
};
use backends::{Dataset, Device, ModelClass, ModelSource, PretrainedModel};
use std::path::{Path, PathBuf};

const REDUCED_RANGE_LEVEL: i8 = 63;
const FULL_RANGE_LEVEL: i8 = 127;

impl SimRuntime {
    /// Exports a framework model to graph files in a fresh temporary
    /// directory.
    fn export_onnx(&self, class: ModelClass, source: &Path, options: &OrtLoadOptions) -> Result<SimModel, SimError> {
        let framework = self.framework_model(class.task, source, &options.hub)?;
        let dir = tempfile::Builder::new().prefix("optibench-onnx-").tempdir()?;
        let token_types = framework
            .config
            .as_ref()
            .is_some_and(|c| c.type_vocab_size.is_some());

        let components = graph::onnx_components(
            class.task,
            options.use_cache.unwrap_or(true),
            options.use_merged.unwrap_or(false),
        );
        for component in &components {
            let mut def = GraphDef::new(GraphFormat::Onnx, class.task, component, framework.dims, token_types);
            def.save(dir.path(), &format!("{component}.{}", graph::ONNX_EXTENSION), &framework.weights)?;
        }
        if let Some(config) = &framework.config {
            config.save_pretrained(dir.path())?;
        }
        if let Some(processor) = &framework.processor {
            processor.save_pretrained(dir.path())?;
        }
        tracing::info!("exported {class} to {} ({components:?})", dir.path().display());

        let executed = graph::executed_graph(dir.path(), GraphFormat::Onnx)?;
        let (def, weights) = GraphDef::open(&executed)?;
        let save_dir = dir.path().to_path_buf();
        SimModel::new(class, def, weights, save_dir, Some(dir))
    }

    fn open_onnx(&self, class: ModelClass, dir: &Path) -> Result<SimModel, SimError> {
        let path = graph::executed_graph(dir, GraphFormat::Onnx)?;
        let (def, weights) = GraphDef::open(&path)?;
        if def.task != class.task {
            return Err(SimError::TaskMismatch {
                path,
                expected: class.task,
                found: def.task,
            });
        }
        SimModel::new(class, def, weights, dir.to_path_buf(), None)
    }
}

fn session_device(options: &OrtLoadOptions) -> Device {
    if options.provider.uses_cuda() {
        let id = options
            .provider_options
            .get("device_id")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Device::Cuda(id as u32)
    } else {
        Device::Cpu
    }
}

impl OrtLibrary for SimRuntime {
    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OrtLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        let session = &options.session_options;
        tracing::debug!(
            "session: level={:?} intra={:?} inter={:?} io_binding={}",
            session.graph_optimization_level,
            session.intra_op_num_threads,
            session.inter_op_num_threads,
            options.use_io_binding
        );
        let model = if source.export {
            self.export_onnx(class, &source.model, options)?
        } else {
            self.open_onnx(class, &source.model)?
        };

        let providers = self.session_providers(options.provider);
        let device = if providers.first().map(String::as_str) == Some(options.provider.as_str()) {
            session_device(options)
        } else {
            Device::Cpu
        };
        Ok(Box::new(model.with_providers(providers, device)))
    }

    fn optimizer(&self, model_dir: &Path, file_names: &[String]) -> anyhow::Result<Box<dyn GraphOptimizer>> {
        Ok(Box::new(SimOptimizer {
            model_dir: model_dir.to_path_buf(),
            file_names: file_names.to_vec(),
        }))
    }

    fn quantizer(&self, model_dir: &Path, file_name: &str) -> anyhow::Result<Box<dyn GraphQuantizer>> {
        let (graph, weights) = GraphDef::open(&model_dir.join(file_name))?;
        Ok(Box::new(SimQuantizer {
            file_name: file_name.to_string(),
            graph,
            weights,
        }))
    }
}

/// Applies graph-level passes to every component of a model directory.
pub struct SimOptimizer {
    model_dir: PathBuf,
    file_names: Vec<String>,
}

impl GraphOptimizer for SimOptimizer {
    fn optimize(&mut self, config: &OptimizationConfig, save_dir: &Path) -> anyhow::Result<PathBuf> {
        for file in &self.file_names {
            let (mut def, weights) = GraphDef::open(&self.model_dir.join(file))?;
            let weights = if config.fp16 { weights.to_f16()? } else { weights };
            def.optimization = Some(OptimizationRecord {
                level: config.optimization_level,
                for_gpu: config.optimize_for_gpu,
                fp16: config.fp16,
                gelu_approximation: config.enable_gelu_approximation,
            });
            def.save(save_dir, file, &weights)?;
            tracing::debug!("optimized {file} at level {}", config.optimization_level);
        }
        Ok(save_dir.to_path_buf())
    }
}

/// Calibrates and quantizes one graph file.
pub struct SimQuantizer {
    file_name: String,
    graph: GraphDef,
    weights: ModelWeights,
}

impl GraphQuantizer for SimQuantizer {
    fn fit(
        &mut self,
        dataset: &Dataset,
        calibration: &CalibrationConfig,
        operators_to_quantize: &[String],
        use_gpu: bool,
        batch_size: usize,
    ) -> anyhow::Result<CalibrationRanges> {
        tracing::debug!(
            "fitting {} over {} row(s) (ops {operators_to_quantize:?}, gpu {use_gpu}, batch {batch_size})",
            self.file_name,
            dataset.num_rows()
        );
        let kernels = Kernels::new(
            self.graph.task,
            self.graph.dims,
            &self.weights,
            self.graph.gelu_approximation(),
        )?;
        let observed = calibrate::observe(&kernels, dataset, calibration.dataset_num_samples)?;
        Ok(calibrate::estimate(&calibration.method, &observed))
    }

    fn quantize(
        &mut self,
        config: &QuantizationConfig,
        ranges: Option<&CalibrationRanges>,
        save_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        if config.is_static && ranges.is_none() {
            return Err(SimError::MissingRanges(self.file_name.clone()).into());
        }
        let level = if config.reduce_range {
            REDUCED_RANGE_LEVEL
        } else {
            FULL_RANGE_LEVEL
        };
        let targets = QuantizeTargets::from_operators(&config.operators_to_quantize);
        let quantized = self.weights.quantize(targets, level)?;

        let mut def = self.graph.clone();
        def.quantization = Some(QuantizationRecord {
            scheme: format!("{:?}/{:?}", config.format, config.mode),
            is_static: config.is_static,
            per_channel: config.per_channel,
            reduce_range: config.reduce_range,
            operators: config.operators_to_quantize.clone(),
            ranges: ranges.cloned().unwrap_or_default(),
        });
        def.save(save_dir, &self.file_name, &quantized)?;
        tracing::info!(
            "quantized {}: {} -> {} bytes",
            self.file_name,
            self.weights.size_bytes(),
            quantized.size_bytes()
        );
        Ok(save_dir.to_path_buf())
    }
}
