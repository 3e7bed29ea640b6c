// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the model-preparation pipeline.

use crate::{BackendKind, PipelineState, Task};
use std::fmt;

/// The pipeline step a collaborator failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    HubLookup,
    Load,
    TieWeights,
    Optimization,
    DatasetGeneration,
    Calibration,
    Quantization,
    Forward,
    Prefill,
    Generate,
    Call,
    Reshape,
    Half,
    Compile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::HubLookup => "hub lookup",
            Stage::Load => "model load",
            Stage::TieWeights => "weight tying",
            Stage::Optimization => "optimization",
            Stage::DatasetGeneration => "dataset generation",
            Stage::Calibration => "calibration",
            Stage::Quantization => "quantization",
            Stage::Forward => "forward",
            Stage::Prefill => "prefill",
            Stage::Generate => "generate",
            Stage::Call => "call",
            Stage::Reshape => "reshape",
            Stage::Half => "half-precision conversion",
            Stage::Compile => "compilation",
        };
        f.write_str(name)
    }
}

/// Errors raised while preparing or running a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No loader class exists for the task under this backend.
    #[error("task '{task}' is not supported by the {backend} backend")]
    UnsupportedTask { task: Task, backend: BackendKind },

    /// A structurally unsupported combination of options, detected before
    /// any expensive work.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// The configured execution provider is not the first active provider
    /// of the loaded session.
    #[error("{expected} is not first in providers list: {active:?}")]
    ProviderMismatch {
        expected: String,
        active: Vec<String>,
    },

    /// An option table rejected a key or a value.
    #[error("invalid {scope} option '{key}': {detail}")]
    InvalidOption {
        scope: &'static str,
        key: String,
        detail: String,
    },

    /// The configuration is malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The temporary workspace could not be created or removed.
    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    /// A model artifact could not be read or written.
    #[error("model artifact error: {0}")]
    Model(#[from] model_ir::ModelError),

    /// A tensor could not be built or converted.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),

    /// A required inference input is absent.
    #[error("missing input '{0}'")]
    MissingInput(String),

    /// An operation needs a loaded model but the backend is not ready.
    #[error("backend is not ready (state: {0:?})")]
    NotReady(PipelineState),

    /// A collaborator library call failed.
    #[error("{stage} failed: {source:#}")]
    Library {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl BackendError {
    /// Wraps a collaborator failure with the stage it happened in.
    pub fn library(stage: Stage, source: anyhow::Error) -> Self {
        BackendError::Library { stage, source }
    }

    /// Shorthand for `map_err(|e| BackendError::library(stage, e))`.
    pub(crate) fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| BackendError::library(stage, source)
    }
}
