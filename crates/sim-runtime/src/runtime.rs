// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The runtime handle and its model hub.

use crate::catalog;
use crate::weights::{ModelDims, ModelWeights};
use crate::SimError;
use backends::onnxruntime::ExecutionProvider;
use backends::{scope, HubOptions, ModelHub, Task};
use model_ir::{layout, PretrainedConfig, ProcessorConfig};
use std::path::Path;

/// An in-process runtime implementing both backend libraries.
///
/// Models resolve from local directories first and from the built-in
/// catalog second. Sessions can only be placed on `available_providers`;
/// any other request falls back to the CPU provider, as a real runtime
/// built without that provider would.
#[derive(Debug, Clone)]
pub struct SimRuntime {
    available_providers: Vec<ExecutionProvider>,
    seed: u64,
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// A framework model resolved from a directory or the catalog.
pub(crate) struct FrameworkModel {
    pub config: Option<PretrainedConfig>,
    pub processor: Option<ProcessorConfig>,
    pub dims: ModelDims,
    pub weights: ModelWeights,
}

impl SimRuntime {
    pub fn new() -> Self {
        Self {
            available_providers: vec![ExecutionProvider::Cpu],
            seed: 0,
        }
    }

    /// Replaces the providers sessions may run on. The CPU provider is
    /// always available.
    pub fn with_providers(mut self, providers: impl IntoIterator<Item = ExecutionProvider>) -> Self {
        self.available_providers = providers.into_iter().collect();
        if !self.available_providers.contains(&ExecutionProvider::Cpu) {
            self.available_providers.push(ExecutionProvider::Cpu);
        }
        self
    }

    /// Seed for randomly initialized parameters.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn available_providers(&self) -> &[ExecutionProvider] {
        &self.available_providers
    }

    /// Providers a session requesting `requested` ends up with, in
    /// priority order.
    pub(crate) fn session_providers(&self, requested: ExecutionProvider) -> Vec<String> {
        let mut providers = Vec::new();
        if self.available_providers.contains(&requested) {
            providers.push(requested.as_str().to_string());
        } else {
            tracing::warn!(
                "{} is not available in this runtime (available: {:?}); falling back to {}",
                requested.as_str(),
                self.available_providers,
                ExecutionProvider::Cpu.as_str()
            );
        }
        if requested != ExecutionProvider::Cpu {
            providers.push(ExecutionProvider::Cpu.as_str().to_string());
        }
        providers
    }

    /// Resolves the framework model at `source` for `task`.
    ///
    /// Parameters are drawn at random inside a random-init scope, for
    /// catalog models, and for directories without a checkpoint.
    pub(crate) fn framework_model(&self, task: Task, source: &Path, hub: &HubOptions) -> Result<FrameworkModel, SimError> {
        let config = self.pretrained_config_of(source, hub)?;
        let processor = self.pretrained_processor_of(source, hub)?;
        let dims = ModelDims::for_task(task, config.as_ref())?;

        let checkpoint = source.join(layout::WEIGHTS_NAME);
        let weights = if scope::random_init_active() {
            tracing::debug!("random init of {} for {task}", source.display());
            ModelWeights::random(&dims, self.seed)
        } else if source.is_dir() && checkpoint.is_file() {
            ModelWeights::load_framework(&checkpoint, &dims)?
        } else {
            tracing::warn!(
                "no checkpoint for {}; parameters are drawn at random (seed {})",
                source.display(),
                self.seed
            );
            ModelWeights::random(&dims, self.seed)
        };
        Ok(FrameworkModel {
            config,
            processor,
            dims,
            weights,
        })
    }

    fn pretrained_config_of(&self, model: &Path, hub: &HubOptions) -> Result<Option<PretrainedConfig>, SimError> {
        if model.is_dir() {
            return Ok(PretrainedConfig::from_dir(model)?);
        }
        let id = hub_id(model, hub)?;
        Ok(catalog::config(&id)?)
    }

    fn pretrained_processor_of(&self, model: &Path, hub: &HubOptions) -> Result<Option<ProcessorConfig>, SimError> {
        if model.is_dir() {
            return Ok(ProcessorConfig::from_dir(model)?);
        }
        let id = hub_id(model, hub)?;
        Ok(catalog::processor(&id)?)
    }
}

/// The catalog id `model` names, if it names one.
fn hub_id(model: &Path, hub: &HubOptions) -> Result<String, SimError> {
    let id = model.to_string_lossy().into_owned();
    if !catalog::contains(&id) {
        return Err(SimError::UnknownModel(id));
    }
    if hub.local_files_only {
        tracing::debug!("{id}: served from the built-in catalog with local_files_only set");
    }
    if let Some(revision) = &hub.revision {
        tracing::debug!("{id}: revision '{revision}' ignored, the catalog holds one revision");
    }
    Ok(id)
}

impl ModelHub for SimRuntime {
    fn pretrained_config(&self, model: &Path, hub: &HubOptions) -> anyhow::Result<Option<PretrainedConfig>> {
        Ok(self.pretrained_config_of(model, hub)?)
    }

    fn pretrained_processor(&self, model: &Path, hub: &HubOptions) -> anyhow::Result<Option<ProcessorConfig>> {
        Ok(self.pretrained_processor_of(model, hub)?)
    }
}
