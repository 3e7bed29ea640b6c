// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference-engine library: IR conversion, compilation and post-training
//! quantization.

use crate::calibrate;
use crate::compute::Kernels;
use crate::graph::{self, GraphDef, GraphFormat, QuantizationRecord};
use crate::model::SimModel;
use crate::weights::{ModelWeights, QuantizeTargets};
use crate::{SimError, SimRuntime};
use backends::onnxruntime::CalibrationMethod;
use backends::openvino::{
    OvLibrary, OvLoadOptions, OvQuantizationConfig, OvQuantizationPreset, OvQuantizer, PrecisionHint,
};
use backends::{
    Dataset, Device, HubOptions, ModelClass, ModelSource, PretrainedModel, Task,
};
use std::path::Path;

const QUANTIZED_LEVEL: i8 = 127;

impl SimRuntime {
    fn convert_ir(&self, class: ModelClass, source: &Path, options: &OvLoadOptions) -> Result<SimModel, SimError> {
        let framework = self.framework_model(class.task, source, &options.hub)?;
        let dir = tempfile::Builder::new().prefix("optibench-ir-").tempdir()?;
        let token_types = framework
            .config
            .as_ref()
            .is_some_and(|c| c.type_vocab_size.is_some());
        let mut def = GraphDef::new(GraphFormat::OpenVino, class.task, "openvino_model", framework.dims, token_types);
        def.save(dir.path(), graph::OPENVINO_GRAPH, &framework.weights)?;
        if let Some(config) = &framework.config {
            config.save_pretrained(dir.path())?;
        }
        if let Some(processor) = &framework.processor {
            processor.save_pretrained(dir.path())?;
        }
        tracing::info!("converted {class} to IR in {}", dir.path().display());
        let save_dir = dir.path().to_path_buf();
        SimModel::new(class, def, framework.weights, save_dir, Some(dir))
    }

    fn open_ir(&self, class: ModelClass, dir: &Path) -> Result<SimModel, SimError> {
        let path = graph::executed_graph(dir, GraphFormat::OpenVino)?;
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

impl OvLibrary for SimRuntime {
    fn load_framework_model(
        &self,
        class: ModelClass,
        source: &ModelSource,
        hub: &HubOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        let framework = self.framework_model(class.task, &source.model, hub)?;
        let token_types = framework
            .config
            .as_ref()
            .is_some_and(|c| c.type_vocab_size.is_some());
        let def = GraphDef::new(GraphFormat::OpenVino, class.task, "framework", framework.dims, token_types);
        let ties = framework
            .config
            .as_ref()
            .map_or(true, |c| c.ties_word_embeddings());
        let model = SimModel::new(class, def, framework.weights, source.model.clone(), None)?
            .with_tied_embeddings(ties);
        Ok(Box::new(model))
    }

    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OvLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        let device: Device = options.device.parse()?;
        tracing::debug!("IR properties for {}: {:?}", options.device, options.properties);
        let mut model = if source.export {
            self.convert_ir(class, &source.model, options)?
        } else {
            self.open_ir(class, &source.model)?
        };
        if matches!(
            options.properties.inference_precision_hint,
            Some(PrecisionHint::F16 | PrecisionHint::Bf16)
        ) && model.precision() != crate::weights::Precision::Int8
        {
            model = model.with_half_kernels()?;
        }
        let model = model
            .with_providers(vec![options.device.clone()], device)
            .compiled(options.compile);
        Ok(Box::new(model))
    }

    fn quantizer(
        &self,
        model: &dyn PretrainedModel,
        task: Task,
        seed: u64,
    ) -> anyhow::Result<Box<dyn OvQuantizer>> {
        let sim = model
            .as_any()
            .downcast_ref::<SimModel>()
            .ok_or_else(|| SimError::ForeignModel(model.class().to_string()))?;
        let mut graph = sim.graph().clone();
        graph.component = "openvino_model".to_string();
        tracing::debug!("IR quantizer for {task} (seed {seed})");
        Ok(Box::new(SimOvQuantizer {
            graph,
            weights: sim.weights().clone(),
        }))
    }
}

/// Converts a framework model to a quantized IR.
pub struct SimOvQuantizer {
    graph: GraphDef,
    weights: ModelWeights,
}

impl OvQuantizer for SimOvQuantizer {
    fn export_input_names(&self) -> Vec<String> {
        self.graph.inputs.clone()
    }

    fn quantize(
        &mut self,
        save_dir: &Path,
        config: &OvQuantizationConfig,
        calibration_dataset: Option<&Dataset>,
        batch_size: usize,
    ) -> anyhow::Result<()> {
        let ranges = match calibration_dataset {
            Some(dataset) => {
                tracing::debug!(
                    "calibrating on at most {} of {} row(s), batch {batch_size}",
                    config.subset_size,
                    dataset.num_rows()
                );
                let kernels = Kernels::new(self.graph.task, self.graph.dims, &self.weights, false)?;
                let observed = calibrate::observe(&kernels, dataset, config.subset_size)?;
                let method = CalibrationMethod::MinMax {
                    moving_average: false,
                    averaging_constant: 0.01,
                };
                calibrate::estimate(&method, &observed)
            }
            None => Default::default(),
        };

        let quantized = self.weights.quantize(QuantizeTargets::ALL, QUANTIZED_LEVEL)?;
        let mut def = self.graph.clone();
        def.quantization = Some(QuantizationRecord {
            scheme: match config.preset {
                OvQuantizationPreset::Performance => "performance".to_string(),
                OvQuantizationPreset::Mixed => "mixed".to_string(),
            },
            is_static: !ranges.is_empty(),
            per_channel: false,
            reduce_range: false,
            operators: Vec::new(),
            ranges,
        });
        def.save(save_dir, graph::OPENVINO_GRAPH, &quantized)?;
        if config.save_onnx_model {
            let mut onnx = def.clone();
            onnx.format = GraphFormat::Onnx;
            onnx.save(save_dir, "model.onnx", &quantized)?;
        }
        tracing::info!(
            "IR quantized ({}): {} -> {} bytes",
            def.quantization.as_ref().map_or("", |q| q.scheme.as_str()),
            self.weights.size_bytes(),
            quantized.size_bytes()
        );
        Ok(())
    }
}
