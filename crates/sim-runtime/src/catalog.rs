// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in hub catalog.
//!
//! Hub ids that are not local directories resolve here. Each entry carries
//! the architecture description the real checkpoint publishes, trimmed to
//! the keys the pipeline reads; weights for catalog models are drawn at
//! random from the configured seed.

use model_ir::{PretrainedConfig, ProcessorConfig, ProcessorKind};

struct Entry {
    id: &'static str,
    config: Option<&'static str>,
    processor: Option<(ProcessorKind, &'static str)>,
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: "bert-base-uncased",
        config: Some(r#"{"model_type": "bert", "architectures": ["BertForMaskedLM"],
            "hidden_size": 768, "vocab_size": 30522, "type_vocab_size": 2,
            "max_position_embeddings": 512}"#),
        processor: Some((ProcessorKind::Tokenizer, r#"{"do_lower_case": true, "model_max_length": 512}"#)),
    },
    Entry {
        id: "distilbert-base-uncased-finetuned-sst-2-english",
        config: Some(r#"{"model_type": "distilbert", "architectures": ["DistilBertForSequenceClassification"],
            "hidden_size": 768, "vocab_size": 30522, "max_position_embeddings": 512,
            "id2label": {"0": "NEGATIVE", "1": "POSITIVE"}}"#),
        processor: Some((ProcessorKind::Tokenizer, r#"{"do_lower_case": true, "model_max_length": 512}"#)),
    },
    Entry {
        id: "gpt2",
        config: Some(r#"{"model_type": "gpt2", "architectures": ["GPT2LMHeadModel"],
            "n_embd": 768, "vocab_size": 50257, "n_positions": 1024,
            "max_position_embeddings": 1024}"#),
        processor: Some((ProcessorKind::Tokenizer, r#"{"model_max_length": 1024}"#)),
    },
    Entry {
        id: "t5-small",
        config: Some(r#"{"model_type": "t5", "architectures": ["T5ForConditionalGeneration"],
            "d_model": 512, "vocab_size": 32128}"#),
        processor: Some((ProcessorKind::Tokenizer, r#"{"model_max_length": 512}"#)),
    },
    Entry {
        id: "google/vit-base-patch16-224",
        config: Some(r#"{"model_type": "vit", "architectures": ["ViTForImageClassification"],
            "hidden_size": 768, "image_size": 224, "num_channels": 3,
            "id2label": {"0": "tench", "1": "goldfish", "2": "great white shark"}}"#),
        processor: Some((
            ProcessorKind::FeatureExtractor,
            r#"{"do_resize": true, "size": {"height": 224, "width": 224}}"#,
        )),
    },
    Entry {
        id: "runwayml/stable-diffusion-v1-5",
        config: None,
        processor: None,
    },
];

/// Whether `id` is a catalog entry.
pub fn contains(id: &str) -> bool {
    ENTRIES.iter().any(|e| e.id == id)
}

/// Ids of every catalog entry.
pub fn ids() -> impl Iterator<Item = &'static str> {
    ENTRIES.iter().map(|e| e.id)
}

/// Architecture description of a catalog model.
///
/// Diffusion pipelines publish no `config.json` at the root, so their
/// entry resolves to `None`.
pub fn config(id: &str) -> Result<Option<PretrainedConfig>, model_ir::ModelError> {
    match ENTRIES.iter().find(|e| e.id == id).and_then(|e| e.config) {
        Some(json) => PretrainedConfig::from_json(json).map(Some),
        None => Ok(None),
    }
}

/// Processor description of a catalog model.
pub fn processor(id: &str) -> Result<Option<ProcessorConfig>, model_ir::ModelError> {
    let Some((kind, json)) = ENTRIES.iter().find(|e| e.id == id).and_then(|e| e.processor) else {
        return Ok(None);
    };
    Ok(Some(ProcessorConfig {
        kind,
        values: serde_json::from_str(json)?,
    }))
}
