// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`PretrainedModel`] the simulated runtime hands out.

use crate::compute::{Kernels, DEFAULT_INFERENCE_STEPS, DEFAULT_NEW_TOKENS};
use crate::graph::GraphDef;
use crate::weights::{ModelWeights, Precision};
use crate::SimError;
use backends::{
    BackendKind, Device, InputValue, Kwargs, ModelClass, ModelInputs, ModelOutputs,
    PretrainedModel, Shapes,
};
use std::any::Any;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STATIC_DIMS: [&str; 4] = ["batch_size", "sequence_length", "height", "width"];

/// A loaded model: graph description, parameters and kernels.
///
/// Exported models own the temporary directory their graphs were written
/// to, so `save_dir` stays valid for as long as the model lives.
pub struct SimModel {
    class: ModelClass,
    graph: GraphDef,
    weights: ModelWeights,
    kernels: Kernels,
    save_dir: PathBuf,
    _export_dir: Option<TempDir>,
    providers: Vec<String>,
    device: Device,
    static_shapes: Option<Shapes>,
    compiled: bool,
    ties_embeddings: bool,
}

impl std::fmt::Debug for SimModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimModel")
            .field("class", &self.class.name)
            .field("component", &self.graph.component)
            .field("precision", &self.weights.precision())
            .field("save_dir", &self.save_dir)
            .field("providers", &self.providers)
            .finish()
    }
}

impl SimModel {
    pub(crate) fn new(
        class: ModelClass,
        graph: GraphDef,
        weights: ModelWeights,
        save_dir: PathBuf,
        export_dir: Option<TempDir>,
    ) -> Result<Self, SimError> {
        let kernels = Kernels::new(graph.task, graph.dims, &weights, graph.gelu_approximation())?;
        Ok(Self {
            class,
            graph,
            weights,
            kernels,
            save_dir,
            _export_dir: export_dir,
            providers: Vec::new(),
            device: Device::Cpu,
            static_shapes: None,
            compiled: false,
            ties_embeddings: true,
        })
    }

    pub(crate) fn with_providers(mut self, providers: Vec<String>, device: Device) -> Self {
        self.providers = providers;
        self.device = device;
        self
    }

    /// Runs in half precision without changing the stored weights.
    pub(crate) fn with_half_kernels(mut self) -> Result<Self, SimError> {
        let half = self.weights.to_f16()?;
        self.kernels = Kernels::new(self.graph.task, self.graph.dims, &half, self.graph.gelu_approximation())?;
        Ok(self)
    }

    /// Whether `tie_weights` may share the embeddings with the output head.
    pub(crate) fn with_tied_embeddings(mut self, tie: bool) -> Self {
        self.ties_embeddings = tie;
        self
    }

    pub(crate) fn compiled(mut self, compiled: bool) -> Self {
        self.compiled = compiled;
        self
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    pub fn precision(&self) -> Precision {
        self.weights.precision()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn static_shapes(&self) -> Option<&Shapes> {
        self.static_shapes.as_ref()
    }

    fn rebuild_kernels(&mut self) -> Result<(), SimError> {
        self.kernels = Kernels::new(
            self.graph.task,
            self.graph.dims,
            &self.weights,
            self.graph.gelu_approximation(),
        )?;
        Ok(())
    }

    /// IR models compile on first use when not compiled at load.
    fn ensure_compiled(&mut self) {
        if self.class.backend == BackendKind::OpenVino && !self.compiled {
            tracing::debug!("compiling {} on first inference", self.class);
            self.compiled = true;
        }
    }

    /// Rejects inputs that disagree with the static shapes set by `reshape`.
    fn check_static_shapes(&self, inputs: &ModelInputs) -> Result<(), SimError> {
        let Some(shapes) = &self.static_shapes else {
            return Ok(());
        };
        for (name, value) in inputs {
            let Some(tensor) = value.as_tensor() else {
                continue;
            };
            let dims = tensor.shape().dims();
            let mut expected: Vec<(usize, &str)> = vec![(0, "batch_size")];
            if name == "pixel_values" {
                expected.extend([(2, "height"), (3, "width")]);
            } else if dims.len() >= 2 {
                expected.push((dims.len() - 1, "sequence_length"));
            }
            for (axis, dim) in expected {
                if let (Some(&want), Some(&got)) = (shapes.get(dim), dims.get(axis)) {
                    if want != got {
                        return Err(SimError::BadInput {
                            name: name.clone(),
                            detail: format!("{dim} is statically {want}, got {got}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn place(&self, outputs: ModelOutputs) -> ModelOutputs {
        let mut placed = ModelOutputs::new();
        for (name, tensor) in outputs.iter() {
            placed.insert(name, tensor.to_device(self.device));
        }
        placed
    }
}

fn usize_kwarg(kwargs: &Kwargs, name: &str) -> Option<usize> {
    kwargs.get(name)?.as_u64().map(|v| v as usize)
}

impl PretrainedModel for SimModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn class(&self) -> ModelClass {
        self.class
    }

    fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    fn input_names(&self) -> Vec<String> {
        self.graph.inputs.clone()
    }

    fn providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    fn forward(&mut self, inputs: &ModelInputs, _kwargs: &Kwargs) -> anyhow::Result<ModelOutputs> {
        self.ensure_compiled();
        self.check_static_shapes(inputs)?;
        tracing::trace!("{}: forward({})", self.class, describe_inputs(inputs));
        let outputs = self.kernels.forward(inputs)?;
        Ok(self.place(outputs))
    }

    fn generate(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs> {
        self.ensure_compiled();
        self.check_static_shapes(inputs)?;
        let new_tokens = usize_kwarg(kwargs, "max_new_tokens").unwrap_or(DEFAULT_NEW_TOKENS);
        let min_tokens = usize_kwarg(kwargs, "min_new_tokens").unwrap_or(0);
        let output_scores = kwargs
            .get("output_scores")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let outputs = self
            .kernels
            .generate(inputs, new_tokens.max(min_tokens), output_scores)?;
        Ok(self.place(outputs))
    }

    fn call(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs> {
        if !self.graph.task.is_diffusion() {
            return self.forward(inputs, kwargs);
        }
        self.ensure_compiled();
        let steps = usize_kwarg(kwargs, "num_inference_steps").unwrap_or(DEFAULT_INFERENCE_STEPS);
        let outputs = self.kernels.call(inputs, steps)?;
        Ok(self.place(outputs))
    }

    fn tie_weights(&mut self) -> anyhow::Result<()> {
        if !self.ties_embeddings {
            tracing::debug!("{}: word embeddings are not tied", self.class);
            return Ok(());
        }
        if self.weights.tie_embeddings()? {
            tracing::debug!("{}: output projection tied to embeddings", self.class);
            self.rebuild_kernels()?;
        }
        Ok(())
    }

    fn reshape_dims(&self) -> Vec<&'static str> {
        match self.class.backend {
            BackendKind::OpenVino => STATIC_DIMS.to_vec(),
            _ => Vec::new(),
        }
    }

    fn reshape(&mut self, shapes: &Shapes) -> anyhow::Result<()> {
        if self.class.backend != BackendKind::OpenVino {
            anyhow::bail!("{} does not support static reshaping", self.class);
        }
        tracing::info!("{}: static shapes {shapes:?}", self.class);
        self.static_shapes = Some(shapes.clone());
        self.compiled = false;
        Ok(())
    }

    fn half(&mut self) -> anyhow::Result<()> {
        if self.class.backend != BackendKind::OpenVino {
            anyhow::bail!("{} does not support half precision", self.class);
        }
        self.weights = self.weights.to_f16()?;
        self.graph.precision = Precision::F16;
        self.rebuild_kernels()?;
        self.compiled = false;
        Ok(())
    }

    fn compile(&mut self) -> anyhow::Result<()> {
        self.compiled = true;
        Ok(())
    }
}

fn describe_inputs(inputs: &ModelInputs) -> String {
    inputs
        .iter()
        .map(|(name, value)| match value {
            InputValue::Tensor(t) => format!("{name}{}", t.shape()),
            InputValue::Text(texts) => format!("{name}[{} texts]", texts.len()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
