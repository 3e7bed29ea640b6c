// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The backend state machine and the inference facade.
//!
//! ```text
//! Created ─▶ TaskValidated ─▶ ModelMaterialized ─┬─▶ Optimized ─┐
//!                                                ├─▶ Quantized ◀┤
//!                                                │      │       │
//!                                                │      ▼       │
//!                                                │   Reloaded ◀─┘
//!                                                ▼      │
//!                                     ProviderValidated ◀┘
//!                                                │
//!                                                ▼
//!                                              Ready ─▶ Cleaned
//! ```
//!
//! `Cleaned` is reachable from every state: any setup failure cleans up
//! before the error is returned.

use crate::{
    scope, BackendError, BackendKind, Kwargs, ModelClass, ModelInputs, ModelOutputs,
    PretrainedModel, Stage,
};
use std::fmt;

/// Inputs some exporters drop from the graph even though tokenizers emit
/// them.
pub const PROBLEMATIC_INPUTS: [&str; 2] = ["token_type_ids", "position_ids"];

/// A step of backend construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Created,
    TaskValidated,
    ModelMaterialized,
    Optimized,
    Quantized,
    Reloaded,
    ProviderValidated,
    Ready,
    Cleaned,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records the states a backend went through.
#[derive(Debug, Clone)]
pub struct StateTracker {
    backend: BackendKind,
    history: Vec<PipelineState>,
}

impl StateTracker {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            history: vec![PipelineState::Created],
        }
    }

    pub fn advance(&mut self, state: PipelineState) {
        tracing::info!("{} backend: {} -> {}", self.backend, self.current(), state);
        self.history.push(state);
    }

    pub fn current(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Created)
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn visited(&self, state: PipelineState) -> bool {
        self.history.contains(&state)
    }
}

/// The inference operations a benchmark can time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Forward,
    Prefill,
    Generate,
    Call,
}

impl Operation {
    fn stage(self) -> Stage {
        match self {
            Operation::Forward => Stage::Forward,
            Operation::Prefill => Stage::Prefill,
            Operation::Generate => Stage::Generate,
            Operation::Call => Stage::Call,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Forward => "forward",
            Operation::Prefill => "prefill",
            Operation::Generate => "generate",
            Operation::Call => "call",
        };
        f.write_str(name)
    }
}

/// A prepared model plus the uniform inference facade over it.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn state(&self) -> PipelineState;

    /// Every state visited so far, starting with `Created`.
    fn history(&self) -> &[PipelineState];

    fn model_class(&self) -> ModelClass;

    /// The loaded model; `None` once cleaned.
    fn model(&self) -> Option<&dyn PretrainedModel>;

    fn model_mut(&mut self) -> Option<&mut dyn PretrainedModel>;

    /// Adapts generated inputs to what the loaded model accepts.
    fn prepare_inputs(&self, inputs: ModelInputs) -> Result<ModelInputs, BackendError>;

    /// Applies input-shape dependent preparation. A no-op by default.
    fn prepare_for_inference(&mut self, _input_shapes: &crate::Shapes) -> Result<(), BackendError> {
        Ok(())
    }

    /// Drops the loaded model and removes temporary artifacts.
    fn clean(&mut self);

    fn forward(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> Result<ModelOutputs, BackendError> {
        self.run(Operation::Forward, inputs, kwargs)
    }

    /// Runs the first generation step; `kwargs` usually caps new tokens at 1.
    fn prefill(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> Result<ModelOutputs, BackendError> {
        self.run(Operation::Prefill, inputs, kwargs)
    }

    fn generate(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> Result<ModelOutputs, BackendError> {
        self.run(Operation::Generate, inputs, kwargs)
    }

    fn call(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> Result<ModelOutputs, BackendError> {
        self.run(Operation::Call, inputs, kwargs)
    }

    /// Dispatches `op` to the loaded model under inference mode.
    fn run(
        &mut self,
        op: Operation,
        inputs: &ModelInputs,
        kwargs: &Kwargs,
    ) -> Result<ModelOutputs, BackendError> {
        let state = self.state();
        let model = self.model_mut().ok_or(BackendError::NotReady(state))?;
        let _mode = scope::inference_mode();
        let result = match op {
            Operation::Forward => model.forward(inputs, kwargs),
            Operation::Prefill | Operation::Generate => model.generate(inputs, kwargs),
            Operation::Call => model.call(inputs, kwargs),
        };
        result.map_err(BackendError::at(op.stage()))
    }
}

/// Reduces diffusion pipeline inputs to the prompt.
pub(crate) fn diffusion_inputs(mut inputs: ModelInputs) -> Result<ModelInputs, BackendError> {
    let prompt = inputs
        .remove("prompt")
        .ok_or_else(|| BackendError::MissingInput("prompt".into()))?;
    Ok(ModelInputs::from([("prompt".to_string(), prompt)]))
}
