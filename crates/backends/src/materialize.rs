// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight-free model stand-ins.
//!
//! Benchmarking does not need trained weights: a model with the original
//! architecture and random parameters exercises the same kernels. The
//! stand-in directory holds the original `config.json` and a tiny
//! `model.safetensors` (the state of a `Linear(1, 1)` layer), and the loader
//! runs inside [`scope::random_init`](crate::scope::random_init) so that it
//! initializes every parameter instead of reading them.

use crate::workspace::{Workspace, NO_WEIGHTS_DIR};
use crate::{scope, BackendError, Library, ModelSource};
use model_ir::{layout, save_tensors, PretrainedConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tensor_core::{Shape, Tensor};

/// Names of the tensors in the stand-in payload.
pub const STAND_IN_TENSORS: [&str; 2] = ["bias", "weight"];

/// Writes the stand-in model into `workspace/no_weights_model` and returns
/// that directory.
///
/// # Errors
/// [`BackendError::UnsupportedConfiguration`] when a `transformers` model
/// has no config to copy.
pub fn create_no_weights_model(
    workspace: &Workspace,
    library: Library,
    config: Option<&PretrainedConfig>,
    seed: u64,
) -> Result<PathBuf, BackendError> {
    let dir = workspace.subdir(NO_WEIGHTS_DIR)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let weight = Tensor::from_f32(Shape::matrix(1, 1), vec![rng.gen_range(-1.0f32..1.0)])?;
    let bias = Tensor::from_f32(Shape::vector(1), vec![rng.gen_range(-1.0f32..1.0)])?;
    let metadata = BTreeMap::from([("format".to_string(), "pt".to_string())]);
    save_tensors(
        &dir.join(layout::WEIGHTS_NAME),
        &[("weight".to_string(), weight), ("bias".to_string(), bias)],
        Some(metadata),
    )?;

    if library == Library::Transformers {
        let config = config.ok_or_else(|| {
            BackendError::UnsupportedConfiguration(
                "a no-weights transformers model needs the original config.json".into(),
            )
        })?;
        config.save_pretrained(&dir)?;
    }

    tracing::info!("no-weights stand-in written to {}", dir.display());
    Ok(dir)
}

/// Loads a stand-in with random initialization enabled for the duration of
/// `load` only.
pub fn load_with_no_weights<T, E>(
    dir: &Path,
    export: bool,
    load: impl FnOnce(&ModelSource) -> Result<T, E>,
) -> Result<T, E> {
    let source = ModelSource::new(dir, export);
    let _guard = scope::random_init();
    load(&source)
}
