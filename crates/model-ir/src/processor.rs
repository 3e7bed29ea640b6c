// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Processor descriptions (tokenizers and feature extractors).
//!
//! The pipeline never runs a processor; it only copies the description next
//! to every artifact it produces and reads a few shape hints from it.

use crate::{layout, ModelError};
use std::path::Path;

/// Which processor file a description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// `tokenizer_config.json`.
    Tokenizer,
    /// `preprocessor_config.json` (image processors, audio feature extractors).
    FeatureExtractor,
}

impl ProcessorKind {
    fn file_name(self) -> &'static str {
        match self {
            ProcessorKind::Tokenizer => layout::TOKENIZER_CONFIG_NAME,
            ProcessorKind::FeatureExtractor => layout::PREPROCESSOR_NAME,
        }
    }
}

/// A processor description, kept as an untyped JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub kind: ProcessorKind,
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl ProcessorConfig {
    /// Loads the processor description from a model directory.
    ///
    /// A feature-extractor description takes precedence over a tokenizer
    /// description. Returns `None` when the directory has neither.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>, ModelError> {
        for kind in [ProcessorKind::FeatureExtractor, ProcessorKind::Tokenizer] {
            let path = dir.join(kind.file_name());
            if path.is_file() {
                let content = std::fs::read_to_string(&path)?;
                let values = serde_json::from_str(&content)?;
                return Ok(Some(Self { kind, values }));
            }
        }
        Ok(None)
    }

    /// Writes the description into `dir` under its canonical file name.
    pub fn save_pretrained(&self, dir: &Path) -> Result<(), ModelError> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(dir.join(self.kind.file_name()), json)?;
        Ok(())
    }

    /// Returns an unsigned integer entry.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.values.get(key)?.as_u64().map(|v| v as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_extractor_wins_over_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(layout::TOKENIZER_CONFIG_NAME), r#"{"model_max_length": 128}"#)
            .unwrap();
        std::fs::write(dir.path().join(layout::PREPROCESSOR_NAME), r#"{"feature_size": 80}"#)
            .unwrap();

        let proc = ProcessorConfig::from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(proc.kind, ProcessorKind::FeatureExtractor);
        assert_eq!(proc.get_usize("feature_size"), Some(80));
    }

    #[test]
    fn test_save_uses_canonical_name() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join(layout::TOKENIZER_CONFIG_NAME), r#"{"do_lower_case": true}"#)
            .unwrap();
        let proc = ProcessorConfig::from_dir(src.path()).unwrap().unwrap();

        let dst = tempfile::tempdir().unwrap();
        proc.save_pretrained(dst.path()).unwrap();
        assert!(dst.path().join(layout::TOKENIZER_CONFIG_NAME).is_file());
        assert_eq!(ProcessorConfig::from_dir(dst.path()).unwrap(), Some(proc));
    }

    #[test]
    fn test_absent_processor() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProcessorConfig::from_dir(dir.path()).unwrap().is_none());
    }
}
