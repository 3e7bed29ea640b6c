// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Named model dimensions used to size synthetic inputs.

use crate::{ImageSize, PretrainedConfig, ProcessorConfig};
use std::collections::BTreeMap;

/// Named dimensions such as `batch_size`, `sequence_length`, `vocab_size`.
///
/// Ordered so that logs and reports print deterministically.
pub type Shapes = BTreeMap<String, usize>;

/// Reads the dimensions input generators need from a model's artifacts.
///
/// Always yields `vocab_size`, `type_vocab_size`, `num_labels` and
/// `num_queries` (with small defaults), plus `num_channels`, `height` and
/// `width` when the config or processor declares them. Processor values
/// override config values.
pub fn extract_model_shapes(
    config: Option<&PretrainedConfig>,
    processor: Option<&ProcessorConfig>,
) -> Shapes {
    let mut shapes = Shapes::new();
    let cfg = config.cloned().unwrap_or_default();
    let proc_usize = |key: &str| processor.and_then(|p| p.get_usize(key));

    shapes.insert("vocab_size".into(), cfg.vocab_size.unwrap_or(2));
    shapes.insert("type_vocab_size".into(), cfg.type_vocab_size.unwrap_or(2));
    shapes.insert("num_labels".into(), cfg.num_labels());
    shapes.insert("num_queries".into(), cfg.num_queries.filter(|&q| q > 0).unwrap_or(2));
    if let Some(hidden) = cfg.hidden_size {
        shapes.insert("hidden_size".into(), hidden);
    }
    if let Some(max_pos) = cfg.max_position_embeddings {
        shapes.insert("max_position_embeddings".into(), max_pos);
    }

    if let Some(channels) = proc_usize("num_channels").or(cfg.num_channels) {
        shapes.insert("num_channels".into(), channels);
    }

    let image_size = processor_image_size(processor).or(cfg.image_size);
    if let Some((height, width)) = image_size.map(ImageSize::dims) {
        shapes.insert("height".into(), height);
        shapes.insert("width".into(), width);
    }

    for key in ["feature_size", "nb_max_frames"] {
        if let Some(v) = proc_usize(key) {
            shapes.insert(key.into(), v);
        }
    }

    shapes
}

/// Image processors describe their resolution as `size`, either an integer,
/// a `[h, w]` pair, or an object with `height`/`width` or `shortest_edge`.
fn processor_image_size(processor: Option<&ProcessorConfig>) -> Option<ImageSize> {
    let value = processor?.values.get("size")?;
    if let Some(side) = value.as_u64() {
        return Some(ImageSize::Square(side as usize));
    }
    if let Some(pair) = value.as_array() {
        if let [h, w] = pair.as_slice() {
            return Some(ImageSize::Rect([h.as_u64()? as usize, w.as_u64()? as usize]));
        }
        return None;
    }
    let obj = value.as_object()?;
    match (obj.get("height"), obj.get("width"), obj.get("shortest_edge")) {
        (Some(h), Some(w), _) => Some(ImageSize::Rect([h.as_u64()? as usize, w.as_u64()? as usize])),
        (_, _, Some(edge)) => Some(ImageSize::Square(edge.as_u64()? as usize)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessorKind;

    #[test]
    fn test_defaults_without_artifacts() {
        let shapes = extract_model_shapes(None, None);
        assert_eq!(shapes["vocab_size"], 2);
        assert_eq!(shapes["type_vocab_size"], 2);
        assert_eq!(shapes["num_labels"], 2);
        assert_eq!(shapes["num_queries"], 2);
        assert!(!shapes.contains_key("height"));
    }

    #[test]
    fn test_text_config() {
        let cfg = PretrainedConfig::from_json(
            r#"{"vocab_size": 30522, "hidden_size": 16, "id2label": {"0": "a", "1": "b", "2": "c"}}"#,
        )
        .unwrap();
        let shapes = extract_model_shapes(Some(&cfg), None);
        assert_eq!(shapes["vocab_size"], 30522);
        assert_eq!(shapes["num_labels"], 3);
        assert_eq!(shapes["hidden_size"], 16);
    }

    #[test]
    fn test_processor_size_overrides_config() {
        let cfg = PretrainedConfig::from_json(r#"{"image_size": 224, "num_channels": 3}"#).unwrap();
        let processor = ProcessorConfig {
            kind: ProcessorKind::FeatureExtractor,
            values: serde_json::from_str(r#"{"size": {"height": 32, "width": 64}}"#).unwrap(),
        };
        let shapes = extract_model_shapes(Some(&cfg), Some(&processor));
        assert_eq!(shapes["height"], 32);
        assert_eq!(shapes["width"], 64);
        assert_eq!(shapes["num_channels"], 3);
    }
}
