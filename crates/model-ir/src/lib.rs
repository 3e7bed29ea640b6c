// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! On-disk model artifacts as the preparation pipeline sees them.
//!
//! - [`PretrainedConfig`] — the `config.json` architecture description.
//! - [`ProcessorConfig`] — the tokenizer or feature-extractor description
//!   (`tokenizer_config.json` / `preprocessor_config.json`).
//! - [`Shapes`] and [`extract_model_shapes`] — the named dimensions
//!   (vocabulary size, label count, image size, …) that input generators
//!   need, read from the two configs above.
//! - [`WeightFile`] / [`save_tensors`] — safetensors payloads, read through
//!   a memory map.
//! - [`layout`] — canonical file names and directory listing.
//!
//! # Directory format
//! ```text
//! <model>/
//!   config.json
//!   preprocessor_config.json | tokenizer_config.json   (optional)
//!   model.safetensors                                   (framework weights)
//!   *.onnx / openvino_model.*                           (exported graphs)
//! ```

mod error;
pub mod layout;
mod pretrained;
mod processor;
mod shapes;
mod weights;

pub use error::ModelError;
pub use pretrained::{ImageSize, PretrainedConfig};
pub use processor::{ProcessorConfig, ProcessorKind};
pub use shapes::{extract_model_shapes, Shapes};
pub use weights::{save_tensors, WeightFile, WeightMeta};
