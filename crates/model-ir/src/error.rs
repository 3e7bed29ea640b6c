// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model artifact handling.

use std::path::PathBuf;

/// Errors that can occur when reading or writing model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An artifact file could not be read or written.
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON artifact is malformed.
    #[error("failed to parse artifact JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A path expected to be a model directory is not one.
    #[error("'{0}' is not a model directory")]
    NotADirectory(PathBuf),

    /// A required artifact is missing from the model directory.
    #[error("missing artifact '{name}' in '{dir}'")]
    MissingArtifact { dir: PathBuf, name: String },

    /// A tensor was not found in the SafeTensors file.
    #[error("weight tensor not found: {name}")]
    WeightNotFound { name: String },

    /// The SafeTensors file could not be parsed or written.
    #[error("safetensors error: {0}")]
    SafeTensors(String),

    /// A tensor could not be constructed from the stored bytes.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
