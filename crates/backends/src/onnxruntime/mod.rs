// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The runtime-execution backend.
//!
//! [`OrtBackend::new`] runs the whole preparation pipeline: validate,
//! resolve the loader, materialize, optionally optimize and quantize,
//! reload, check the execution provider. Any failure cleans up before it is
//! returned, so a backend value always holds a ready model.

mod calibration;
mod config;
mod library;
mod optimization;
mod quantization;
mod session;
mod stages;

pub use calibration::{
    AutoCalibration, CalibrationConfig, CalibrationMethod, CalibrationRanges, MANUAL_DATASET_NAME,
};
pub use config::OrtConfig;
pub use library::{GraphOptimizer, GraphQuantizer, OrtLibrary};
pub use optimization::{OptimizationConfig, OptimizationPreset};
pub use quantization::{
    PresetArgs, QuantFormat, QuantType, QuantizationConfig, QuantizationMode, QuantizationPreset,
    DEFAULT_DYNAMIC_OPERATORS, DEFAULT_STATIC_OPERATORS,
};
pub use session::{
    ExecutionMode, ExecutionProvider, GraphOptimizationLevel, OrtLoadOptions, SessionOptions,
};
pub use stages::component_files;

use crate::backend::diffusion_inputs;
use crate::materialize::{create_no_weights_model, load_with_no_weights};
use crate::{
    resolve_model_class, Backend, BackendError, BackendKind, DatasetGenerator, Library,
    ModelClass, ModelInputs, ModelSource, PipelineState, PretrainedArtifacts, PretrainedModel,
    Stage, StateTracker, Workspace, PROBLEMATIC_INPUTS,
};
use stages::StageContext;
use std::path::PathBuf;
use std::sync::Arc;

/// A model prepared for, and served by, the runtime-execution library.
pub struct OrtBackend {
    config: OrtConfig,
    library: Arc<dyn OrtLibrary>,
    datasets: Arc<dyn DatasetGenerator>,
    states: StateTracker,
    class: Option<ModelClass>,
    load_options: Option<OrtLoadOptions>,
    workspace: Option<Workspace>,
    model: Option<Box<dyn PretrainedModel>>,
}

impl OrtBackend {
    /// Builds a ready backend.
    ///
    /// # Errors
    /// Configuration errors, [`BackendError::UnsupportedTask`],
    /// [`BackendError::UnsupportedConfiguration`],
    /// [`BackendError::ProviderMismatch`] and any library failure. The
    /// workspace is removed before the error is returned.
    pub fn new(
        config: OrtConfig,
        library: Arc<dyn OrtLibrary>,
        datasets: Arc<dyn DatasetGenerator>,
    ) -> Result<Self, BackendError> {
        let mut backend = Self {
            config,
            library,
            datasets,
            states: StateTracker::new(BackendKind::OnnxRuntime),
            class: None,
            load_options: None,
            workspace: None,
            model: None,
        };
        match backend.setup() {
            Ok(()) => Ok(backend),
            Err(e) => {
                tracing::error!("onnxruntime backend setup failed: {e}");
                backend.clean();
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &OrtConfig {
        &self.config
    }

    pub fn load_options(&self) -> Option<&OrtLoadOptions> {
        self.load_options.as_ref()
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        self.config.validate()?;
        let class = resolve_model_class(self.config.base.task, BackendKind::OnnxRuntime)?;
        tracing::info!("{} resolved to {class}", self.config.base.task);
        self.class = Some(class);
        self.states.advance(PipelineState::TaskValidated);

        let load_options = self.build_load_options()?;
        let artifacts = PretrainedArtifacts::fetch(self.library.as_ref(), &self.config.base)?;
        self.workspace = Some(Workspace::create()?);

        let model = if self.config.base.no_weights {
            self.load_no_weights(class, &load_options, &artifacts)?
        } else {
            self.load(class, &ModelSource::from_config(&self.config.base), &load_options)?
        };
        self.model = Some(model);
        self.states.advance(PipelineState::ModelMaterialized);

        if self.config.is_optimized() || self.config.is_quantized() {
            let reloaded = self.transform(&artifacts)?;
            self.model = Some(self.load(class, &ModelSource::artifact(reloaded), &load_options)?);
            self.states.advance(PipelineState::Reloaded);
        }

        self.validate_provider(load_options.provider)?;
        self.states.advance(PipelineState::ProviderValidated);

        if let Some(mut workspace) = self.workspace.take() {
            workspace.cleanup()?;
        }
        self.load_options = Some(load_options);
        self.states.advance(PipelineState::Ready);
        Ok(())
    }

    fn build_load_options(&self) -> Result<OrtLoadOptions, BackendError> {
        let task = self.config.base.task;
        let generation = task.is_text_generation();
        Ok(OrtLoadOptions {
            provider: self.config.execution_provider()?,
            provider_options: self.config.effective_provider_options(),
            session_options: self.config.session()?,
            use_io_binding: self.config.effective_use_io_binding()?,
            use_cache: generation.then_some(self.config.use_cache),
            use_merged: generation.then_some(self.config.use_merged),
            hub: self.config.base.hub_kwargs.clone(),
        })
    }

    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OrtLoadOptions,
    ) -> Result<Box<dyn PretrainedModel>, BackendError> {
        tracing::info!("loading {class} from {} (export: {})", source.model.display(), source.export);
        self.library
            .load(class, source, options)
            .map_err(BackendError::at(Stage::Load))
    }

    fn load_no_weights(
        &self,
        class: ModelClass,
        options: &OrtLoadOptions,
        artifacts: &PretrainedArtifacts,
    ) -> Result<Box<dyn PretrainedModel>, BackendError> {
        let workspace = self.workspace()?;
        let dir = create_no_weights_model(
            workspace,
            self.config.base.library(),
            artifacts.config.as_ref(),
            self.config.base.seed,
        )?;
        load_with_no_weights(&dir, self.config.base.export, |source| {
            self.load(class, source, options)
        })
    }

    /// Runs the optimize and quantize stages and returns the directory to
    /// reload from.
    fn transform(&mut self, artifacts: &PretrainedArtifacts) -> Result<PathBuf, BackendError> {
        let state = self.states.current();
        let model = self.model.as_ref().ok_or(BackendError::NotReady(state))?;
        let mut current = model.save_dir().to_path_buf();
        let input_names = model.input_names();

        let optimization = self.config.optimization_config()?;
        let quantization = self.config.quantization_config()?;
        let workspace = self.workspace.as_ref().ok_or(BackendError::NotReady(state))?;
        let ctx = StageContext {
            config: &self.config,
            library: self.library.as_ref(),
            workspace,
            artifacts,
        };

        if let Some(optimization) = &optimization {
            current = stages::optimize(&ctx, &current, optimization)?;
            self.states.advance(PipelineState::Optimized);
        }
        if let Some(quantization) = &quantization {
            current = stages::quantize(
                &ctx,
                &current,
                quantization,
                &input_names,
                self.datasets.as_ref(),
            )?;
            self.states.advance(PipelineState::Quantized);
        }
        Ok(current)
    }

    fn validate_provider(&self, provider: ExecutionProvider) -> Result<(), BackendError> {
        let model = self
            .model
            .as_ref()
            .ok_or(BackendError::NotReady(self.states.current()))?;
        let active = model.providers();
        if active.first().map(String::as_str) != Some(provider.as_str()) {
            return Err(BackendError::ProviderMismatch {
                expected: provider.as_str().to_string(),
                active,
            });
        }
        tracing::debug!("active providers: {active:?}");
        Ok(())
    }

    fn workspace(&self) -> Result<&Workspace, BackendError> {
        self.workspace
            .as_ref()
            .ok_or(BackendError::NotReady(self.states.current()))
    }
}

impl Backend for OrtBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OnnxRuntime
    }

    fn state(&self) -> PipelineState {
        self.states.current()
    }

    fn history(&self) -> &[PipelineState] {
        self.states.history()
    }

    fn model_class(&self) -> ModelClass {
        self.class.unwrap_or(ModelClass {
            backend: BackendKind::OnnxRuntime,
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

    /// Diffusion pipelines take the prompt only. Other models get their
    /// tensors on the target device, minus problematic inputs the graph
    /// does not declare. Unknown inputs outside that set pass through.
    fn prepare_inputs(&self, inputs: ModelInputs) -> Result<ModelInputs, BackendError> {
        if self.config.base.library() == Library::Diffusers {
            return diffusion_inputs(inputs);
        }
        let declared = self.model.as_ref().map(|m| m.input_names()).unwrap_or_default();
        let device = self.config.base.device;
        Ok(inputs
            .into_iter()
            .filter(|(name, _)| {
                let drop = PROBLEMATIC_INPUTS.contains(&name.as_str()) && !declared.contains(name);
                if drop {
                    tracing::debug!("dropping input '{name}' not declared by the model");
                }
                !drop
            })
            .map(|(name, value)| (name, value.to_device(device)))
            .collect())
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
