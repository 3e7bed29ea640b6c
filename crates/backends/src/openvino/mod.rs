// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The hardware-vendor backend.
//!
//! Two load paths:
//!
//! * without quantization the IR model is loaded directly (converted on
//!   the fly when `export` is set; always for no-weights stand-ins);
//! * with quantization the framework model is loaded, quantized into the
//!   workspace and the resulting IR model is reloaded from there.

mod config;
mod library;
mod properties;
mod quantize;

pub use config::OvConfig;
pub use library::{OvLibrary, OvQuantizer};
pub use properties::{NumStreams, OvLoadOptions, OvProperties, PerformanceHint, PrecisionHint};
pub use quantize::{OvQuantizationConfig, OvQuantizationPreset};

use crate::backend::diffusion_inputs;
use crate::materialize::{create_no_weights_model, load_with_no_weights};
use crate::{
    resolve_model_class, Backend, BackendError, BackendKind, DatasetGenerator, Library,
    ModelClass, ModelInputs, ModelSource, PipelineState, PretrainedArtifacts, PretrainedModel,
    Shapes, Stage, StateTracker, Workspace,
};
use quantize::QuantizeContext;
use std::sync::Arc;

/// Channel count assumed for vision models whose config declares none.
const DEFAULT_NUM_CHANNELS: usize = 3;

/// A model prepared for, and served by, the vendor runtime.
pub struct OvBackend {
    config: OvConfig,
    library: Arc<dyn OvLibrary>,
    datasets: Arc<dyn DatasetGenerator>,
    states: StateTracker,
    class: Option<ModelClass>,
    model_shapes: Shapes,
    workspace: Option<Workspace>,
    model: Option<Box<dyn PretrainedModel>>,
}

impl OvBackend {
    /// Builds a ready backend. On failure the workspace is removed before
    /// the error is returned.
    pub fn new(
        config: OvConfig,
        library: Arc<dyn OvLibrary>,
        datasets: Arc<dyn DatasetGenerator>,
    ) -> Result<Self, BackendError> {
        let mut backend = Self {
            config,
            library,
            datasets,
            states: StateTracker::new(BackendKind::OpenVino),
            class: None,
            model_shapes: Shapes::new(),
            workspace: None,
            model: None,
        };
        match backend.setup() {
            Ok(()) => Ok(backend),
            Err(e) => {
                tracing::error!("openvino backend setup failed: {e}");
                backend.clean();
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &OvConfig {
        &self.config
    }

    pub fn model_shapes(&self) -> &Shapes {
        &self.model_shapes
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        self.config.validate()?;
        let class = resolve_model_class(self.config.base.task, BackendKind::OpenVino)?;
        tracing::info!("{} resolved to {class}", self.config.base.task);
        self.class = Some(class);
        self.states.advance(PipelineState::TaskValidated);

        let options = self.load_options()?;
        let artifacts = PretrainedArtifacts::fetch(self.library.as_ref(), &self.config.base)?;
        self.model_shapes = artifacts.model_shapes.clone();
        self.workspace = Some(Workspace::create()?);

        if self.config.quantization {
            let framework = self.load_framework_model(&artifacts)?;
            self.states.advance(PipelineState::ModelMaterialized);

            let quantized = {
                let workspace = self
                    .workspace
                    .as_ref()
                    .ok_or(BackendError::NotReady(self.states.current()))?;
                let ctx = QuantizeContext {
                    config: &self.config,
                    library: self.library.as_ref(),
                    workspace,
                    artifacts: &artifacts,
                };
                quantize::quantize(&ctx, framework.as_ref(), self.datasets.as_ref())?
            };
            drop(framework);
            self.states.advance(PipelineState::Quantized);

            self.model = Some(self.load(class, &ModelSource::artifact(quantized), &options)?);
            self.states.advance(PipelineState::Reloaded);
        } else if self.config.base.no_weights {
            let dir = create_no_weights_model(
                self.workspace()?,
                self.config.base.library(),
                artifacts.config.as_ref(),
                self.config.base.seed,
            )?;
            let model = load_with_no_weights(&dir, true, |source| self.load(class, source, &options))?;
            self.model = Some(model);
            self.states.advance(PipelineState::ModelMaterialized);
        } else {
            let model = self.load(class, &ModelSource::from_config(&self.config.base), &options)?;
            self.model = Some(model);
            self.states.advance(PipelineState::ModelMaterialized);
        }

        if let Some(mut workspace) = self.workspace.take() {
            workspace.cleanup()?;
        }
        self.states.advance(PipelineState::Ready);
        Ok(())
    }

    fn load_options(&self) -> Result<OvLoadOptions, BackendError> {
        let generation = self.config.base.task.is_text_generation();
        Ok(OvLoadOptions {
            device: self.config.base.device.openvino_name(),
            properties: self.config.properties()?,
            compile: !(self.config.reshape || self.config.half),
            use_cache: generation.then_some(self.config.use_cache),
            use_merged: generation.then_some(self.config.use_merged),
            hub: self.config.base.hub_kwargs.clone(),
        })
    }

    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OvLoadOptions,
    ) -> Result<Box<dyn PretrainedModel>, BackendError> {
        tracing::info!("loading {class} from {} (export: {})", source.model.display(), source.export);
        self.library
            .load(class, source, options)
            .map_err(BackendError::at(Stage::Load))
    }

    /// Loads the framework model the quantizer starts from.
    fn load_framework_model(
        &self,
        artifacts: &PretrainedArtifacts,
    ) -> Result<Box<dyn PretrainedModel>, BackendError> {
        let class = resolve_model_class(self.config.base.task, BackendKind::PyTorch)?;
        let hub = &self.config.base.hub_kwargs;
        let load = |source: &ModelSource| {
            tracing::info!("loading framework model {class} from {}", source.model.display());
            self.library
                .load_framework_model(class, source, hub)
                .map_err(BackendError::at(Stage::Load))
        };

        if !self.config.base.no_weights {
            return load(&ModelSource::new(&self.config.base.model, false));
        }
        let dir = create_no_weights_model(
            self.workspace()?,
            self.config.base.library(),
            artifacts.config.as_ref(),
            self.config.base.seed,
        )?;
        let mut model = load_with_no_weights(&dir, false, load)?;
        model
            .tie_weights()
            .map_err(BackendError::at(Stage::TieWeights))?;
        Ok(model)
    }

    fn workspace(&self) -> Result<&Workspace, BackendError> {
        self.workspace
            .as_ref()
            .ok_or(BackendError::NotReady(self.states.current()))
    }

    /// The static shapes to reshape to: the model's reshape dimensions taken
    /// from the input and model shapes. Vision models read their channel
    /// count through `sequence_length`.
    fn static_shapes(&self, model: &dyn PretrainedModel, input_shapes: &Shapes) -> Shapes {
        let accepted = model.reshape_dims();
        let mut merged = input_shapes.clone();
        merged.extend(self.model_shapes.iter().map(|(k, v)| (k.clone(), *v)));

        let mut shapes: Shapes = merged
            .into_iter()
            .filter(|(k, _)| accepted.contains(&k.as_str()))
            .collect();
        if shapes.contains_key("sequence_length") && shapes.contains_key("height") {
            let channels = self
                .model_shapes
                .get("num_channels")
                .copied()
                .unwrap_or(DEFAULT_NUM_CHANNELS);
            shapes.insert("sequence_length".into(), channels);
        }
        shapes
    }
}

impl Backend for OvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenVino
    }

    fn state(&self) -> PipelineState {
        self.states.current()
    }

    fn history(&self) -> &[PipelineState] {
        self.states.history()
    }

    fn model_class(&self) -> ModelClass {
        self.class.unwrap_or(ModelClass {
            backend: BackendKind::OpenVino,
            task: self.config.base.task,
            name: "unresolved",
        })
    }

    fn model(&self) -> Option<&dyn PretrainedModel> {
        self.model.as_deref()
    }

    fn model_mut(&mut self) -> Option<&mut dyn PretrainedModel> {
        self.model.as_mut().map(|m| m.as_mut() as &mut dyn PretrainedModel)
    }

    fn prepare_inputs(&self, inputs: ModelInputs) -> Result<ModelInputs, BackendError> {
        if self.config.base.library() == Library::Diffusers {
            return diffusion_inputs(inputs);
        }
        Ok(inputs)
    }

    /// Reshapes and converts the model as configured, then compiles it.
    fn prepare_for_inference(&mut self, input_shapes: &Shapes) -> Result<(), BackendError> {
        let state = self.states.current();
        let (reshape, half) = (self.config.reshape, self.config.half);
        if !(reshape || half) {
            return Ok(());
        }
        let static_shapes = match self.model.as_deref() {
            Some(model) if reshape => Some(self.static_shapes(model, input_shapes)),
            Some(_) => None,
            None => return Err(BackendError::NotReady(state)),
        };
        let model = self.model_mut().ok_or(BackendError::NotReady(state))?;

        if let Some(shapes) = static_shapes {
            tracing::info!("reshaping model to {shapes:?}");
            model.reshape(&shapes).map_err(BackendError::at(Stage::Reshape))?;
        }
        if half {
            tracing::info!("converting model to half precision");
            model.half().map_err(BackendError::at(Stage::Half))?;
        }
        model.compile().map_err(BackendError::at(Stage::Compile))
    }

    fn clean(&mut self) {
        self.model = None;
        if let Some(mut workspace) = self.workspace.take() {
            if let Err(e) = workspace.cleanup() {
                tracing::warn!("failed to remove workspace {}: {e}", workspace.root().display());
            }
        }
        if self.states.current() != PipelineState::Cleaned {
            self.states.advance(PipelineState::Cleaned);
        }
    }
}
