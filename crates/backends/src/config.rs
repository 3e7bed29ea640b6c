// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend-independent configuration.
//!
//! # TOML Format
//! ```toml
//! model = "bert-base-uncased"
//! task = "text-classification"
//! device = "cuda:0"
//! no_weights = true
//! seed = 42
//!
//! [hub_kwargs]
//! revision = "main"
//! local_files_only = true
//! ```
//!
//! A configuration is never mutated once a backend is built from it. Stages
//! that need to point the loader at a different artifact directory build a
//! [`ModelSource`](crate::ModelSource) instead.

use crate::{BackendError, Device, Task};
use std::fmt;
use std::path::{Path, PathBuf};

/// The library a model is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Transformers,
    Diffusers,
    Timm,
}

impl Library {
    pub fn as_str(self) -> &'static str {
        match self {
            Library::Transformers => "transformers",
            Library::Diffusers => "diffusers",
            Library::Timm => "timm",
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options forwarded to every model-hub lookup and load.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubOptions {
    pub revision: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub force_download: bool,
    pub local_files_only: bool,
    pub trust_remote_code: bool,
}

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackendConfig {
    /// Model identifier or local directory.
    pub model: String,
    pub task: Task,
    #[serde(default)]
    pub device: Device,
    /// Defaults to [`Task::default_library`].
    #[serde(default)]
    pub library: Option<Library>,
    /// Whether the model must be converted to the backend's format on load.
    #[serde(default = "default_true")]
    pub export: bool,
    /// Replace the real weights with a small random stand-in.
    #[serde(default)]
    pub no_weights: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub hub_kwargs: HubOptions,
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

impl BackendConfig {
    pub fn new(model: impl Into<String>, task: Task) -> Self {
        Self {
            model: model.into(),
            task,
            device: Device::Cpu,
            library: None,
            export: true,
            no_weights: false,
            seed: default_seed(),
            hub_kwargs: HubOptions::default(),
        }
    }

    pub fn library(&self) -> Library {
        self.library.unwrap_or_else(|| self.task.default_library())
    }

    pub fn model_path(&self) -> &Path {
        Path::new(&self.model)
    }
}

/// TOML helpers shared by the backend configurations.
pub(crate) fn from_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BackendError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BackendError::Config(format!("cannot read config '{}': {e}", path.display()))
    })?;
    from_toml(&content)
}

pub(crate) fn from_toml<T: serde::de::DeserializeOwned>(toml_str: &str) -> Result<T, BackendError> {
    toml::from_str(toml_str).map_err(|e| BackendError::Config(format!("TOML parse error: {e}")))
}

pub(crate) fn to_toml<T: serde::Serialize>(value: &T) -> Result<String, BackendError> {
    toml::to_string_pretty(value)
        .map_err(|e| BackendError::Config(format!("TOML serialise error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = BackendConfig::new("bert-base-uncased", Task::FillMask);
        assert_eq!(c.device, Device::Cpu);
        assert!(c.export);
        assert!(!c.no_weights);
        assert_eq!(c.seed, 42);
        assert_eq!(c.library(), Library::Transformers);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
model = "runwayml/stable-diffusion-v1-5"
task = "stable-diffusion"
device = "cuda:1"
no_weights = true

[hub_kwargs]
revision = "fp16"
"#;
        let c: BackendConfig = from_toml(toml).unwrap();
        assert_eq!(c.task, Task::StableDiffusion);
        assert_eq!(c.device, Device::Cuda(1));
        assert_eq!(c.library(), Library::Diffusers);
        assert_eq!(c.hub_kwargs.revision.as_deref(), Some("fp16"));
        assert!(c.no_weights);
    }

    #[test]
    fn test_unknown_hub_option_rejected() {
        let toml = r#"
model = "gpt2"
task = "text-generation"

[hub_kwargs]
revison = "main"
"#;
        assert!(from_toml::<BackendConfig>(toml).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut c = BackendConfig::new("gpt2", Task::TextGeneration);
        c.library = Some(Library::Transformers);
        let s = to_toml(&c).unwrap();
        let back: BackendConfig = from_toml(&s).unwrap();
        assert_eq!(back, c);
    }
}
