// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # backends
//!
//! The model-preparation pipeline of the benchmark harness. Given a model
//! reference, a task, a device and a backend configuration, a backend
//! produces a loaded, optionally optimized and quantized model and exposes
//! uniform inference operations over it.
//!
//! ```text
//!  OrtConfig / OvConfig
//!        │ validate, resolve (task, backend) → loader class
//!        ▼
//!  ┌───────────────┐   no_weights?   ┌──────────────────────────┐
//!  │  Materialize  │ ──────────────▶ │ workspace/no_weights_model│
//!  └──────┬────────┘                 └──────────────────────────┘
//!         ▼ (optional)
//!  ┌───────────────┐   ┌──────────────────────────┐
//!  │   Optimize    │──▶│ workspace/optimized       │
//!  └──────┬────────┘   └──────────────────────────┘
//!         ▼ (optional)
//!  ┌───────────────┐   ┌──────────────────────────┐
//!  │ Quantize (+   │──▶│ workspace/quantized_model │
//!  │  calibrate)   │   └──────────────────────────┘
//!  └──────┬────────┘
//!         ▼ reload (export = false), validate provider
//!       Ready ── forward / prefill / generate / call
//! ```
//!
//! The inference libraries themselves are collaborators behind traits
//! ([`ModelHub`], [`onnxruntime::OrtLibrary`], [`openvino::OvLibrary`],
//! [`PretrainedModel`], [`DatasetGenerator`]). The pipeline only sequences
//! them, enforces configuration consistency and owns the temporary
//! artifacts it creates.

mod backend;
mod choice;
mod config;
mod dataset;
mod error;
mod generators;
mod io;
mod library;
pub mod materialize;
pub mod onnxruntime;
pub mod openvino;
mod options;
pub mod scope;
mod task;
pub mod workspace;

pub use backend::{Backend, Operation, PipelineState, StateTracker, PROBLEMATIC_INPUTS};
pub use choice::{resolve_exclusive, Exclusive};
pub use config::{BackendConfig, HubOptions, Library};
pub use dataset::{calibration_dataset, Dataset, DatasetGenerator};
pub use error::{BackendError, Stage};
pub use generators::{InputGenerator, SyntheticDatasetGenerator};
pub use io::{require_tensor, InputValue, Kwargs, ModelInputs, ModelOutputs};
pub use library::{ModelHub, ModelSource, PretrainedArtifacts, PretrainedModel};
pub use model_ir::Shapes;
pub use options::{OptionMap, OptionTable};
pub use task::{resolve_model_class, BackendKind, ModelClass, Task};
pub use tensor_core::Device;
pub use workspace::Workspace;
