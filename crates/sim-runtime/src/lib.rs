// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # sim-runtime
//!
//! An in-process model runtime implementing the collaborator traits of the
//! `backends` crate: [`ModelHub`](backends::ModelHub),
//! [`OrtLibrary`](backends::onnxruntime::OrtLibrary) and
//! [`OvLibrary`](backends::openvino::OvLibrary).
//!
//! Models are small embedding-plus-head networks whose widths follow the
//! checkpoint's `config.json`. Export, graph optimization, calibration and
//! int8 quantization operate on real files (JSON graph documents with
//! SafeTensors parameters), so every pipeline stage can be exercised and
//! benchmarked end to end without an external runtime.
//!
//! ```no_run
//! use backends::onnxruntime::{OrtBackend, OrtConfig};
//! use backends::{Backend, BackendConfig, SyntheticDatasetGenerator, Task};
//! use sim_runtime::SimRuntime;
//! use std::sync::Arc;
//!
//! let mut base = BackendConfig::new("bert-base-uncased", Task::FillMask);
//! base.no_weights = true;
//! let backend = OrtBackend::new(
//!     OrtConfig::new(base),
//!     Arc::new(SimRuntime::new()),
//!     Arc::new(SyntheticDatasetGenerator::default()),
//! )?;
//! assert!(backend.model().is_some());
//! # Ok::<(), backends::BackendError>(())
//! ```

mod calibrate;
pub mod catalog;
mod compute;
mod error;
pub mod graph;
mod model;
mod ort;
mod ov;
mod runtime;
pub mod weights;

pub use compute::{DEFAULT_INFERENCE_STEPS, DEFAULT_NEW_TOKENS};
pub use error::SimError;
pub use model::SimModel;
pub use ort::{SimOptimizer, SimQuantizer};
pub use ov::SimOvQuantizer;
pub use runtime::SimRuntime;
