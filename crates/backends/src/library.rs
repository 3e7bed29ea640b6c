// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Interfaces to the model libraries the pipeline drives.
//!
//! Collaborators report failures as [`anyhow::Error`]; the pipeline wraps
//! them into [`BackendError::Library`](crate::BackendError::Library)
//! together with the stage they happened in.

use crate::{
    BackendConfig, BackendError, HubOptions, Kwargs, ModelClass, ModelInputs, ModelOutputs, Shapes,
    Stage,
};
use model_ir::{extract_model_shapes, PretrainedConfig, ProcessorConfig};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Where a load reads its model from, and whether it must be converted.
///
/// Stages never rewrite the backend configuration; they hand the loader a
/// `ModelSource` pointing at the artifact they produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub model: PathBuf,
    pub export: bool,
}

impl ModelSource {
    pub fn new(model: impl Into<PathBuf>, export: bool) -> Self {
        Self {
            model: model.into(),
            export,
        }
    }

    /// An artifact the pipeline already produced in the backend's format.
    pub fn artifact(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, false)
    }

    /// The model the configuration names.
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(&config.model, config.export)
    }
}

/// A loaded model handle.
pub trait PretrainedModel: Send {
    fn as_any(&self) -> &dyn Any;

    /// The loader class this model was loaded with.
    fn class(&self) -> ModelClass;

    /// Directory holding the model's native artifacts.
    fn save_dir(&self) -> &Path;

    /// Input names the model's graph declares.
    fn input_names(&self) -> Vec<String>;

    /// Execution providers of the underlying session, in priority order.
    fn providers(&self) -> Vec<String> {
        Vec::new()
    }

    fn forward(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs>;

    fn generate(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs>;

    /// Runs the model as a pipeline (diffusion models and similar).
    fn call(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs>;

    fn tie_weights(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Static dimensions [`reshape`](PretrainedModel::reshape) accepts.
    fn reshape_dims(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn reshape(&mut self, _shapes: &Shapes) -> anyhow::Result<()> {
        anyhow::bail!("{} does not support static reshaping", self.class())
    }

    fn half(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("{} does not support half precision", self.class())
    }

    fn compile(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Access to model metadata published alongside the weights.
pub trait ModelHub: Send + Sync {
    fn pretrained_config(
        &self,
        model: &Path,
        hub: &HubOptions,
    ) -> anyhow::Result<Option<PretrainedConfig>>;

    fn pretrained_processor(
        &self,
        model: &Path,
        hub: &HubOptions,
    ) -> anyhow::Result<Option<ProcessorConfig>>;
}

/// Metadata fetched once per backend and copied next to every artifact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PretrainedArtifacts {
    pub config: Option<PretrainedConfig>,
    pub processor: Option<ProcessorConfig>,
    pub model_shapes: Shapes,
}

impl PretrainedArtifacts {
    pub fn fetch<H: ModelHub + ?Sized>(hub: &H, config: &BackendConfig) -> Result<Self, BackendError> {
        let model = config.model_path();
        let pretrained = hub
            .pretrained_config(model, &config.hub_kwargs)
            .map_err(BackendError::at(Stage::HubLookup))?;
        let processor = hub
            .pretrained_processor(model, &config.hub_kwargs)
            .map_err(BackendError::at(Stage::HubLookup))?;
        let model_shapes = extract_model_shapes(pretrained.as_ref(), processor.as_ref());
        tracing::debug!("model shapes: {model_shapes:?}");
        Ok(Self {
            config: pretrained,
            processor,
            model_shapes,
        })
    }

    /// Writes the config and processor descriptions into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<(), BackendError> {
        if let Some(config) = &self.config {
            config.save_pretrained(dir)?;
        }
        if let Some(processor) = &self.processor {
            processor.save_pretrained(dir)?;
        }
        Ok(())
    }
}
