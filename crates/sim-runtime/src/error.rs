// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error type for the simulated runtime.

use backends::Task;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The runtime has no kernel set for the task.
    #[error("the simulated runtime has no model for task '{0}'")]
    UnsupportedTask(Task),

    /// The model name is neither a local directory nor a catalog entry.
    #[error("model '{0}' is neither a local directory nor a known hub id")]
    UnknownModel(String),

    /// An artifact directory holds no graph the runtime can execute.
    #[error("no executable graph in '{dir}' (looked for {expected:?})")]
    MissingGraph { dir: PathBuf, expected: Vec<String> },

    /// A graph was exported for a different task than the one requested.
    #[error("graph '{path}' was exported for '{found}', not '{expected}'")]
    TaskMismatch {
        path: PathBuf,
        expected: Task,
        found: Task,
    },

    /// The operation has no meaning for the model's task.
    #[error("{op} is not supported for task '{task}'")]
    Unsupported { op: &'static str, task: Task },

    /// A model input is absent or has the wrong layout.
    #[error("bad input '{name}': {detail}")]
    BadInput { name: String, detail: String },

    /// Static quantization was requested without activation ranges.
    #[error("static quantization of '{0}' needs calibration ranges")]
    MissingRanges(String),

    /// A calibration dataset had no usable rows.
    #[error("calibration dataset '{0}' has no rows")]
    EmptyDataset(String),

    /// Converting between storage precisions is not possible.
    #[error("cannot convert {from} weights to {to}")]
    Precision { from: &'static str, to: &'static str },

    /// The model handed to a quantizer was not produced by this runtime.
    #[error("model {0} was not loaded by the simulated runtime")]
    ForeignModel(String),

    #[error(transparent)]
    Model(#[from] model_ir::ModelError),

    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),

    #[error("graph document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
