// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Deterministic synthetic inputs, per task.
//!
//! | Task family | Inputs |
//! |---|---|
//! | encoder text tasks | `input_ids`, `attention_mask`, `token_type_ids` `[b, s]` |
//! | `multiple-choice` | the same, shaped `[b, num_choices, s]` |
//! | decoder / seq2seq text | `input_ids`, `attention_mask` `[b, s]` |
//! | vision | `pixel_values` `[b, c, h, w]` |
//! | `audio-classification` | `input_values` `[b, audio_sequence_length]` |
//! | `automatic-speech-recognition` | `input_features` `[b, feature_size, nb_max_frames]` |
//! | diffusion | `prompt` (text) |

use crate::{BackendError, Dataset, DatasetGenerator, InputValue, ModelInputs, Shapes, Task};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tensor_core::{Shape, Tensor};

const DEFAULT_BATCH_SIZE: usize = 1;
const DEFAULT_SEQUENCE_LENGTH: usize = 16;
const DEFAULT_NUM_CHOICES: usize = 2;
const DEFAULT_NUM_CHANNELS: usize = 3;
const DEFAULT_IMAGE_SIDE: usize = 64;
const DEFAULT_AUDIO_LENGTH: usize = 16_000;
const DEFAULT_FEATURE_SIZE: usize = 80;
const DEFAULT_NB_MAX_FRAMES: usize = 3000;

/// Generates one batch of inputs for a task.
///
/// Input dimensions (`batch_size`, `sequence_length`, ...) take precedence
/// over model dimensions of the same name.
#[derive(Debug)]
pub struct InputGenerator {
    task: Task,
    shapes: Shapes,
    rng: StdRng,
}

impl InputGenerator {
    pub fn new(task: Task, input_shapes: &Shapes, model_shapes: &Shapes, seed: u64) -> Self {
        let mut shapes = model_shapes.clone();
        shapes.extend(input_shapes.iter().map(|(k, v)| (k.clone(), *v)));
        Self {
            task,
            shapes,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn dim(&self, name: &str, default: usize) -> usize {
        self.shapes.get(name).copied().filter(|&d| d > 0).unwrap_or(default)
    }

    fn sequence_length(&self) -> usize {
        let len = self.dim("sequence_length", DEFAULT_SEQUENCE_LENGTH);
        match self.shapes.get("max_position_embeddings") {
            Some(&max) if max > 0 => len.min(max),
            _ => len,
        }
    }

    pub fn generate(&mut self) -> Result<ModelInputs, BackendError> {
        let batch = self.dim("batch_size", DEFAULT_BATCH_SIZE);
        let mut inputs = ModelInputs::new();
        match self.task {
            Task::FeatureExtraction
            | Task::FillMask
            | Task::TextClassification
            | Task::TokenClassification
            | Task::QuestionAnswering => {
                let dims = vec![batch, self.sequence_length()];
                self.text_inputs(&mut inputs, dims, true)?;
            }
            Task::MultipleChoice => {
                let choices = self.dim("num_choices", DEFAULT_NUM_CHOICES);
                let dims = vec![batch, choices, self.sequence_length()];
                self.text_inputs(&mut inputs, dims, true)?;
            }
            Task::TextGeneration | Task::Text2TextGeneration => {
                let dims = vec![batch, self.sequence_length()];
                self.text_inputs(&mut inputs, dims, false)?;
            }
            Task::ImageClassification
            | Task::SemanticSegmentation
            | Task::ObjectDetection
            | Task::ImageToText => {
                let dims = vec![
                    batch,
                    self.dim("num_channels", DEFAULT_NUM_CHANNELS),
                    self.dim("height", DEFAULT_IMAGE_SIDE),
                    self.dim("width", DEFAULT_IMAGE_SIDE),
                ];
                let values = self.uniform(dims.clone());
                inputs.insert("pixel_values".into(), Tensor::from_f32(Shape::new(dims), values)?.into());
            }
            Task::AudioClassification => {
                let dims = vec![batch, self.dim("audio_sequence_length", DEFAULT_AUDIO_LENGTH)];
                let values = self.uniform(dims.clone());
                inputs.insert("input_values".into(), Tensor::from_f32(Shape::new(dims), values)?.into());
            }
            Task::AutomaticSpeechRecognition => {
                let dims = vec![
                    batch,
                    self.dim("feature_size", DEFAULT_FEATURE_SIZE),
                    self.dim("nb_max_frames", DEFAULT_NB_MAX_FRAMES),
                ];
                let values = self.uniform(dims.clone());
                inputs.insert("input_features".into(), Tensor::from_f32(Shape::new(dims), values)?.into());
            }
            Task::StableDiffusion | Task::StableDiffusionXl => {
                let prompts = (0..batch).map(|i| format!("synthetic prompt {i}")).collect();
                inputs.insert("prompt".into(), InputValue::Text(prompts));
            }
        }
        Ok(inputs)
    }

    fn text_inputs(
        &mut self,
        inputs: &mut ModelInputs,
        dims: Vec<usize>,
        with_token_types: bool,
    ) -> Result<(), BackendError> {
        let n: usize = dims.iter().product();
        let vocab = self.dim("vocab_size", 2) as i64;
        let ids = (0..n).map(|_| self.rng.gen_range(0..vocab)).collect();
        inputs.insert("input_ids".into(), Tensor::from_i64(Shape::new(dims.clone()), ids)?.into());
        inputs.insert(
            "attention_mask".into(),
            Tensor::full_i64(Shape::new(dims.clone()), 1).into(),
        );
        if with_token_types {
            let types = self.dim("type_vocab_size", 2) as i64;
            let token_types = (0..n).map(|_| self.rng.gen_range(0..types)).collect();
            inputs.insert(
                "token_type_ids".into(),
                Tensor::from_i64(Shape::new(dims), token_types)?.into(),
            );
        }
        Ok(())
    }

    fn uniform(&mut self, dims: Vec<usize>) -> Vec<f32> {
        let n: usize = dims.iter().product();
        (0..n).map(|_| self.rng.gen_range(-1.0f32..1.0)).collect()
    }
}

/// The default [`DatasetGenerator`]: `dataset_size` rows of batch-1 inputs
/// from [`InputGenerator`].
#[derive(Debug, Clone, Copy)]
pub struct SyntheticDatasetGenerator {
    seed: u64,
}

impl SyntheticDatasetGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for SyntheticDatasetGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}

impl DatasetGenerator for SyntheticDatasetGenerator {
    fn generate(
        &self,
        task: Task,
        dataset_shapes: &Shapes,
        model_shapes: &Shapes,
    ) -> anyhow::Result<Dataset> {
        if task.is_diffusion() {
            anyhow::bail!("no tensor dataset can be generated for task '{task}'");
        }
        let size = dataset_shapes.get("dataset_size").copied().unwrap_or(1);
        let mut row_shapes = dataset_shapes.clone();
        row_shapes.insert("batch_size".into(), 1);

        let mut generator = InputGenerator::new(task, &row_shapes, model_shapes, self.seed);
        let mut rows = Vec::with_capacity(size);
        for _ in 0..size {
            let row: BTreeMap<String, Tensor> = generator
                .generate()?
                .into_iter()
                .filter_map(|(name, value)| match value {
                    InputValue::Tensor(t) => Some((name, t)),
                    InputValue::Text(_) => None,
                })
                .collect();
            rows.push(row);
        }
        tracing::debug!("generated {size} synthetic rows for {task}");
        Ok(Dataset {
            name: "synthetic".into(),
            config_name: "default".into(),
            split: "train".into(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::DType;

    fn shapes(pairs: &[(&str, usize)]) -> Shapes {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_text_inputs_respect_vocab() {
        let model = shapes(&[("vocab_size", 7), ("type_vocab_size", 2)]);
        let input = shapes(&[("batch_size", 2), ("sequence_length", 5)]);
        let inputs = InputGenerator::new(Task::TextClassification, &input, &model, 0)
            .generate()
            .unwrap();

        let ids = inputs["input_ids"].as_tensor().unwrap();
        assert_eq!(ids.shape().dims(), &[2, 5]);
        assert!(ids.as_i64().unwrap().iter().all(|&v| (0..7).contains(&v)));
        assert!(inputs.contains_key("token_type_ids"));
        assert_eq!(inputs["attention_mask"].as_tensor().unwrap().as_i64().unwrap(), &[1; 10]);
    }

    #[test]
    fn test_generation_tasks_skip_token_types() {
        let inputs = InputGenerator::new(Task::TextGeneration, &Shapes::new(), &Shapes::new(), 0)
            .generate()
            .unwrap();
        assert_eq!(
            inputs.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["attention_mask", "input_ids"]
        );
    }

    #[test]
    fn test_sequence_clamped_to_positions() {
        let model = shapes(&[("max_position_embeddings", 8)]);
        let input = shapes(&[("sequence_length", 512)]);
        let inputs = InputGenerator::new(Task::FillMask, &input, &model, 0)
            .generate()
            .unwrap();
        assert_eq!(inputs["input_ids"].as_tensor().unwrap().shape().dims(), &[1, 8]);
    }

    #[test]
    fn test_multiple_choice_is_3d() {
        let inputs = InputGenerator::new(Task::MultipleChoice, &Shapes::new(), &Shapes::new(), 0)
            .generate()
            .unwrap();
        assert_eq!(inputs["input_ids"].as_tensor().unwrap().shape().dims(), &[1, 2, 16]);
    }

    #[test]
    fn test_vision_uses_model_resolution() {
        let model = shapes(&[("num_channels", 1), ("height", 4), ("width", 6)]);
        let inputs = InputGenerator::new(Task::ImageClassification, &Shapes::new(), &model, 0)
            .generate()
            .unwrap();
        let pixels = inputs["pixel_values"].as_tensor().unwrap();
        assert_eq!(pixels.shape().dims(), &[1, 1, 4, 6]);
        assert_eq!(pixels.dtype(), DType::F32);
    }

    #[test]
    fn test_diffusion_prompt() {
        let input = shapes(&[("batch_size", 2)]);
        let inputs = InputGenerator::new(Task::StableDiffusion, &input, &Shapes::new(), 0)
            .generate()
            .unwrap();
        assert!(matches!(&inputs["prompt"], InputValue::Text(p) if p.len() == 2));
    }

    #[test]
    fn test_same_seed_same_inputs() {
        let model = shapes(&[("vocab_size", 1000)]);
        let a = InputGenerator::new(Task::FillMask, &Shapes::new(), &model, 9).generate().unwrap();
        let b = InputGenerator::new(Task::FillMask, &Shapes::new(), &model, 9).generate().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_synthetic_dataset() {
        let ds = SyntheticDatasetGenerator::new(1)
            .generate(
                Task::TextClassification,
                &shapes(&[("dataset_size", 3), ("sequence_length", 1)]),
                &shapes(&[("vocab_size", 10)]),
            )
            .unwrap();
        assert_eq!(ds.num_rows(), 3);
        assert_eq!(ds.name, "synthetic");
        assert_eq!(ds.rows[0]["input_ids"].shape().dims(), &[1, 1]);
    }
}
