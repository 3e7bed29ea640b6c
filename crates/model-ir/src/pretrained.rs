// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `config.json` parsing.
//!
//! Only the fields the pipeline reads are typed; every other key is kept in
//! [`PretrainedConfig::extra`] so that a config written back by
//! [`PretrainedConfig::save_pretrained`] is equal to the one that was read.
//!
//! # Format
//! ```json
//! {
//!   "model_type": "bert",
//!   "architectures": ["BertForSequenceClassification"],
//!   "hidden_size": 32,
//!   "vocab_size": 1024,
//!   "id2label": { "0": "NEGATIVE", "1": "POSITIVE" }
//! }
//! ```

use crate::{layout, ModelError};
use std::collections::BTreeMap;
use std::path::Path;

/// Image resolution as found in configs: a single side or `[height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(usize),
    Rect([usize; 2]),
}

impl ImageSize {
    /// Returns `(height, width)`.
    pub fn dims(self) -> (usize, usize) {
        match self {
            ImageSize::Square(s) => (s, s),
            ImageSize::Rect([h, w]) => (h, w),
        }
    }
}

/// Architecture description of a pretrained model.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct PretrainedConfig {
    /// Architecture family (e.g., `"bert"`, `"gpt2"`).
    #[serde(default)]
    pub model_type: String,
    /// Head classes the checkpoint was trained with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_vocab_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_position_embeddings: Option<usize>,
    /// Label names keyed by stringified class index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id2label: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_channels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_queries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_word_embeddings: Option<bool>,
    /// Keys the pipeline does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PretrainedConfig {
    /// Loads `config.json` from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads `config.json` from a model directory, `None` if absent.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>, ModelError> {
        let path = dir.join(layout::CONFIG_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    /// Writes `config.json` into `dir`, creating the directory if needed.
    pub fn save_pretrained(&self, dir: &Path) -> Result<(), ModelError> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(layout::CONFIG_NAME), json)?;
        Ok(())
    }

    /// Number of classification labels; two when the config declares none.
    pub fn num_labels(&self) -> usize {
        self.id2label.as_ref().map_or(2, |m| m.len())
    }

    /// Word embeddings are tied to the output projection unless disabled.
    pub fn ties_word_embeddings(&self) -> bool {
        self.tie_word_embeddings.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERT_JSON: &str = r#"{
        "model_type": "bert",
        "architectures": ["BertForSequenceClassification"],
        "hidden_size": 32,
        "vocab_size": 1024,
        "type_vocab_size": 2,
        "max_position_embeddings": 512,
        "id2label": { "0": "NEGATIVE", "1": "NEUTRAL", "2": "POSITIVE" },
        "hidden_act": "gelu",
        "layer_norm_eps": 1e-12
    }"#;

    #[test]
    fn test_parse_typed_and_extra_fields() {
        let cfg = PretrainedConfig::from_json(BERT_JSON).unwrap();
        assert_eq!(cfg.model_type, "bert");
        assert_eq!(cfg.hidden_size, Some(32));
        assert_eq!(cfg.num_labels(), 3);
        assert_eq!(cfg.extra["hidden_act"], "gelu");
        assert!(cfg.ties_word_embeddings());
    }

    #[test]
    fn test_save_then_load_is_equal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PretrainedConfig::from_json(BERT_JSON).unwrap();
        cfg.save_pretrained(&dir.path().join("nested")).unwrap();

        let back = PretrainedConfig::from_dir(&dir.path().join("nested")).unwrap().unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PretrainedConfig::from_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_image_size_forms() {
        let square = PretrainedConfig::from_json(r#"{"image_size": 224}"#).unwrap();
        assert_eq!(square.image_size.unwrap().dims(), (224, 224));
        let rect = PretrainedConfig::from_json(r#"{"image_size": [32, 48]}"#).unwrap();
        assert_eq!(rect.image_size.unwrap().dims(), (32, 48));
        assert_eq!(rect.num_labels(), 2);
    }
}
