// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The per-backend temporary directory holding intermediate artifacts.
//!
//! ```text
//! optibench-XXXXXX/
//! ├── no_weights_model/    stand-in weights + config
//! ├── optimized/           graph optimizer output
//! └── quantized_model/     quantizer output
//! ```
//!
//! Nothing in the workspace outlives the backend: it is removed once the
//! final model is loaded, or when setup fails.

use crate::BackendError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const NO_WEIGHTS_DIR: &str = "no_weights_model";
pub const OPTIMIZED_DIR: &str = "optimized";
pub const QUANTIZED_DIR: &str = "quantized_model";

/// A uniquely-named temporary directory owned by one backend.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace under the system temporary directory.
    pub fn create() -> Result<Self, BackendError> {
        let dir = tempfile::Builder::new()
            .prefix("optibench-")
            .tempdir()
            .map_err(BackendError::Workspace)?;
        let root = dir.path().to_path_buf();
        tracing::debug!("workspace created at {}", root.display());
        Ok(Self {
            dir: Some(dir),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `root/name`, creating it if needed.
    pub fn subdir(&self, name: &str) -> Result<PathBuf, BackendError> {
        if self.is_cleaned() {
            return Err(BackendError::Workspace(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("workspace {} was already removed", self.root.display()),
            )));
        }
        let path = self.root.join(name);
        std::fs::create_dir_all(&path).map_err(BackendError::Workspace)?;
        Ok(path)
    }

    pub fn is_cleaned(&self) -> bool {
        self.dir.is_none()
    }

    /// Removes the workspace and everything in it. Calling it again is a
    /// no-op.
    pub fn cleanup(&mut self) -> Result<(), BackendError> {
        match self.dir.take() {
            Some(dir) => {
                dir.close().map_err(BackendError::Workspace)?;
                tracing::debug!("workspace {} removed", self.root.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}
