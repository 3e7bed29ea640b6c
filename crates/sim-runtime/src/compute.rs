// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution of a simulated model.

use crate::weights::{DenseWeights, ModelDims, ModelWeights, IMAGE_CHANNELS, IMAGE_SIDE};
use crate::SimError;
use backends::{InputValue, ModelInputs, ModelOutputs, Task};
use tensor_core::{gelu, matmul, softmax, DType, GeluApproximation, Shape, Tensor};

/// Tokens appended by `generate` when the caller sets no budget.
pub const DEFAULT_NEW_TOKENS: usize = 1;
/// Denoising steps a diffusion call runs when the caller sets none.
pub const DEFAULT_INFERENCE_STEPS: usize = 2;
const DECODER_START_TOKEN: i64 = 0;

/// Dense weights plus the activation flavor the graph was built with.
#[derive(Debug, Clone)]
pub struct Kernels {
    task: Task,
    dims: ModelDims,
    weights: DenseWeights,
    approximation: GeluApproximation,
}

/// Intermediate and final values of one forward pass.
pub struct Activations {
    pub hidden: Tensor,
    pub outputs: ModelOutputs,
}

impl Kernels {
    pub fn new(
        task: Task,
        dims: ModelDims,
        weights: &ModelWeights,
        gelu_approximation: bool,
    ) -> Result<Self, SimError> {
        Ok(Self {
            task,
            dims,
            weights: weights.dense()?,
            approximation: if gelu_approximation {
                GeluApproximation::Tanh
            } else {
                GeluApproximation::None
            },
        })
    }

    pub fn forward(&self, inputs: &ModelInputs) -> Result<ModelOutputs, SimError> {
        Ok(self.activations(inputs)?.outputs)
    }

    /// Runs the model and keeps the hidden states.
    pub fn activations(&self, inputs: &ModelInputs) -> Result<Activations, SimError> {
        match self.task {
            Task::FeatureExtraction
            | Task::FillMask
            | Task::TokenClassification
            | Task::TextGeneration
            | Task::Text2TextGeneration => {
                let ids = token_ids(inputs, 2)?;
                let (batch, seq) = (ids.shape().dims()[0], ids.shape().dims()[1]);
                let hidden = self.encode(ids.as_i64()?)?;
                let outputs = if self.task == Task::FeatureExtraction {
                    let state = hidden.clone().reshape(Shape::new(vec![batch, seq, self.dims.hidden]))?;
                    single("last_hidden_state", state)
                } else {
                    let logits = self.project(&hidden)?;
                    single("logits", logits.reshape(Shape::new(vec![batch, seq, self.dims.output_dim]))?)
                };
                Ok(Activations { hidden, outputs })
            }
            Task::TextClassification => {
                let ids = token_ids(inputs, 2)?;
                let seq = ids.shape().dims()[1];
                let hidden = mean_pool(&self.encode(ids.as_i64()?)?, seq)?;
                let logits = self.project(&hidden)?;
                Ok(Activations {
                    hidden,
                    outputs: single("logits", logits),
                })
            }
            Task::QuestionAnswering => {
                let ids = token_ids(inputs, 2)?;
                let (batch, seq) = (ids.shape().dims()[0], ids.shape().dims()[1]);
                let hidden = self.encode(ids.as_i64()?)?;
                let spans = self.project(&hidden)?.to_f32_vec();
                let start = spans.iter().step_by(2).copied().collect();
                let end = spans.iter().skip(1).step_by(2).copied().collect();
                let mut outputs = ModelOutputs::new();
                outputs.insert("start_logits", Tensor::from_f32(Shape::matrix(batch, seq), start)?);
                outputs.insert("end_logits", Tensor::from_f32(Shape::matrix(batch, seq), end)?);
                Ok(Activations { hidden, outputs })
            }
            Task::MultipleChoice => {
                let ids = token_ids(inputs, 3)?;
                let dims = ids.shape().dims().to_vec();
                let hidden = mean_pool(&self.encode(ids.as_i64()?)?, dims[2])?;
                let scores = self.project(&hidden)?.reshape(Shape::matrix(dims[0], dims[1]))?;
                Ok(Activations {
                    hidden,
                    outputs: single("logits", scores),
                })
            }
            Task::ImageClassification => {
                let pixels = float_input(inputs, "pixel_values", 4)?;
                let hidden = self.embed_features(&channel_means(pixels)?)?;
                let logits = self.project(&hidden)?;
                Ok(Activations {
                    hidden,
                    outputs: single("logits", logits),
                })
            }
            Task::AudioClassification => {
                let wave = float_input(inputs, "input_values", 2)?;
                let hidden = self.embed_features(&waveform_stats(wave)?)?;
                let logits = self.project(&hidden)?;
                Ok(Activations {
                    hidden,
                    outputs: single("logits", logits),
                })
            }
            task => Err(SimError::Unsupported { op: "forward", task }),
        }
    }

    /// Greedy decoding of `new_tokens` tokens.
    ///
    /// Each step scores the last token of every sequence; sequence-to-sequence
    /// models condition on the pooled encoder states and start from the
    /// decoder start token.
    ///
    /// With `output_scores`, the per-step token distributions are returned
    /// as `scores` with shape `[batch, new_tokens, vocab]`.
    pub fn generate(
        &self,
        inputs: &ModelInputs,
        new_tokens: usize,
        output_scores: bool,
    ) -> Result<ModelOutputs, SimError> {
        let ids = token_ids(inputs, 2)?;
        let (batch, seq) = (ids.shape().dims()[0], ids.shape().dims()[1]);
        let prompt = ids.as_i64()?;

        let (mut sequences, context) = match self.task {
            Task::TextGeneration => {
                let rows: Vec<Vec<i64>> = prompt.chunks(seq.max(1)).map(<[i64]>::to_vec).collect();
                (rows, None)
            }
            Task::Text2TextGeneration => {
                let encoded = mean_pool(&self.encode(prompt)?, seq)?;
                (vec![vec![DECODER_START_TOKEN]; batch], Some(encoded.to_f32_vec()))
            }
            task => return Err(SimError::Unsupported { op: "generate", task }),
        };

        let vocab = self.dims.output_dim;
        let mut scores = vec![Vec::with_capacity(new_tokens * vocab); batch];
        for _ in 0..new_tokens {
            let last: Vec<i64> = sequences.iter().map(|s| s.last().copied().unwrap_or(0)).collect();
            let mut hidden = self.encode(&last)?;
            if let Some(context) = &context {
                for (h, c) in hidden.as_f32_mut()?.iter_mut().zip(context) {
                    *h += c;
                }
            }
            let logits = self.project(&hidden)?;
            for (sequence, row) in sequences.iter_mut().zip(logits.as_f32()?.chunks(vocab)) {
                sequence.push(argmax(row) as i64);
            }
            if output_scores {
                let mut probs = Tensor::zeros(logits.shape().clone(), DType::F32);
                softmax(&logits, &mut probs)?;
                for (acc, row) in scores.iter_mut().zip(probs.as_f32()?.chunks(vocab)) {
                    acc.extend_from_slice(row);
                }
            }
        }

        let width = sequences.first().map_or(0, Vec::len);
        let flat = sequences.into_iter().flatten().collect();
        let mut outputs = single("sequences", Tensor::from_i64(Shape::matrix(batch, width), flat)?);
        if output_scores {
            let shape = Shape::new(vec![batch, new_tokens, vocab]);
            outputs.insert("scores", Tensor::from_f32(shape, scores.concat())?);
        }
        Ok(outputs)
    }

    /// Runs a text-to-image pipeline over the `prompt` input.
    pub fn call(&self, inputs: &ModelInputs, steps: usize) -> Result<ModelOutputs, SimError> {
        if !self.task.is_diffusion() {
            return Err(SimError::Unsupported { op: "call", task: self.task });
        }
        let prompts = match inputs.get("prompt") {
            Some(InputValue::Text(prompts)) => prompts,
            _ => {
                return Err(SimError::BadInput {
                    name: "prompt".into(),
                    detail: "expected a list of prompts".into(),
                })
            }
        };

        let side = IMAGE_SIDE * IMAGE_SIDE;
        let mut pixels = Vec::with_capacity(prompts.len() * IMAGE_CHANNELS * side);
        for prompt in prompts {
            let tokens: Vec<i64> = prompt.bytes().map(i64::from).collect();
            let tokens = if tokens.is_empty() { vec![0] } else { tokens };
            let mut latent = mean_pool(&self.encode(&tokens)?, tokens.len())?;
            for _ in 0..steps {
                let mut next = Tensor::zeros(latent.shape().clone(), DType::F32);
                gelu(&latent, &mut next, self.approximation)?;
                latent = next;
            }
            for channel in self.project(&latent)?.to_f32_vec() {
                pixels.extend(std::iter::repeat(channel.tanh()).take(side));
            }
        }
        let shape = Shape::new(vec![prompts.len(), IMAGE_CHANNELS, IMAGE_SIDE, IMAGE_SIDE]);
        Ok(single("images", Tensor::from_f32(shape, pixels)?))
    }

    /// Embedding lookup followed by GELU, one row per token.
    fn encode(&self, ids: &[i64]) -> Result<Tensor, SimError> {
        let table = self.weights.embeddings.as_f32()?;
        let (rows, hidden) = (self.dims.input_dim as i64, self.dims.hidden);
        let mut values = Vec::with_capacity(ids.len() * hidden);
        for &id in ids {
            let row = id.rem_euclid(rows) as usize;
            values.extend_from_slice(&table[row * hidden..(row + 1) * hidden]);
        }
        self.activate(Tensor::from_f32(Shape::matrix(ids.len(), hidden), values)?)
    }

    /// Dense features `[n, input_dim]` through the embedding matrix.
    fn embed_features(&self, features: &Tensor) -> Result<Tensor, SimError> {
        let n = features.shape().dims()[0];
        let mut out = Tensor::zeros(Shape::matrix(n, self.dims.hidden), DType::F32);
        matmul(features, &self.weights.embeddings, &mut out)?;
        self.activate(out)
    }

    fn activate(&self, input: Tensor) -> Result<Tensor, SimError> {
        let mut out = Tensor::zeros(input.shape().clone(), DType::F32);
        gelu(&input, &mut out, self.approximation)?;
        Ok(out)
    }

    /// `hidden @ head + bias`.
    fn project(&self, hidden: &Tensor) -> Result<Tensor, SimError> {
        let n = hidden.shape().dims()[0];
        let mut out = Tensor::zeros(Shape::matrix(n, self.dims.output_dim), DType::F32);
        matmul(hidden, &self.weights.head, &mut out)?;
        for row in out.as_f32_mut()?.chunks_mut(self.dims.output_dim) {
            for (v, b) in row.iter_mut().zip(&self.weights.bias) {
                *v += b;
            }
        }
        Ok(out)
    }
}

fn single(name: &str, tensor: Tensor) -> ModelOutputs {
    let mut outputs = ModelOutputs::new();
    outputs.insert(name, tensor);
    outputs
}

fn token_ids(inputs: &ModelInputs, rank: usize) -> Result<&Tensor, SimError> {
    let ids = inputs
        .get("input_ids")
        .and_then(InputValue::as_tensor)
        .ok_or_else(|| SimError::BadInput {
            name: "input_ids".into(),
            detail: "missing".into(),
        })?;
    if ids.dtype() != DType::I64 || ids.shape().rank() != rank {
        return Err(SimError::BadInput {
            name: "input_ids".into(),
            detail: format!("expected rank-{rank} i64 ids, got {} {}", ids.dtype(), ids.shape()),
        });
    }
    Ok(ids)
}

fn float_input<'a>(inputs: &'a ModelInputs, name: &str, rank: usize) -> Result<&'a Tensor, SimError> {
    match inputs.get(name).and_then(InputValue::as_tensor) {
        Some(t) if t.dtype() == DType::F32 && t.shape().rank() == rank => Ok(t),
        Some(t) => Err(SimError::BadInput {
            name: name.into(),
            detail: format!("expected rank-{rank} f32 values, got {} {}", t.dtype(), t.shape()),
        }),
        None => Err(SimError::BadInput {
            name: name.into(),
            detail: "missing".into(),
        }),
    }
}

/// Averages consecutive groups of `group` rows.
fn mean_pool(rows: &Tensor, group: usize) -> Result<Tensor, SimError> {
    let group = group.max(1);
    let (n, width) = (rows.shape().dims()[0], rows.shape().dims()[1]);
    let values = rows.as_f32()?;
    let mut pooled = Vec::with_capacity(n / group * width);
    for chunk in values.chunks(group * width) {
        let count = (chunk.len() / width) as f32;
        for col in 0..width {
            let sum: f32 = chunk.iter().skip(col).step_by(width).sum();
            pooled.push(sum / count);
        }
    }
    let groups = pooled.len() / width.max(1);
    Ok(Tensor::from_f32(Shape::matrix(groups, width), pooled)?)
}

/// `[b, c, h, w]` pixels to `[b, c]` channel means.
fn channel_means(pixels: &Tensor) -> Result<Tensor, SimError> {
    let dims = pixels.shape().dims();
    let (batch, channels, plane) = (dims[0], dims[1], dims[2] * dims[3]);
    let means = pixels
        .as_f32()?
        .chunks(plane.max(1))
        .map(|p| p.iter().sum::<f32>() / plane.max(1) as f32)
        .collect();
    Ok(Tensor::from_f32(Shape::matrix(batch, channels), means)?)
}

/// `[b, samples]` waveforms to `[b, 2]` mean and mean magnitude.
fn waveform_stats(wave: &Tensor) -> Result<Tensor, SimError> {
    let dims = wave.shape().dims();
    let (batch, samples) = (dims[0], dims[1].max(1));
    let mut stats = Vec::with_capacity(batch * 2);
    for row in wave.as_f32()?.chunks(samples) {
        stats.push(row.iter().sum::<f32>() / samples as f32);
        stats.push(row.iter().map(|v| v.abs()).sum::<f32>() / samples as f32);
    }
    Ok(Tensor::from_f32(Shape::matrix(batch, 2), stats)?)
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::ModelWeights;

    fn kernels(task: Task) -> Kernels {
        let cfg = model_ir::PretrainedConfig::from_json(r#"{"hidden_size": 8, "vocab_size": 32}"#).unwrap();
        let dims = ModelDims::for_task(task, Some(&cfg)).unwrap();
        Kernels::new(task, dims, &ModelWeights::random(&dims, 11), false).unwrap()
    }

    fn ids(dims: Vec<usize>) -> ModelInputs {
        let n: usize = dims.iter().product();
        let values = (0..n as i64).collect();
        ModelInputs::from([(
            "input_ids".to_string(),
            InputValue::Tensor(Tensor::from_i64(Shape::new(dims), values).unwrap()),
        )])
    }

    #[test]
    fn test_classification_shapes() {
        let out = kernels(Task::TextClassification).forward(&ids(vec![3, 5])).unwrap();
        assert_eq!(out.get("logits").unwrap().shape().dims(), &[3, 2]);

        let out = kernels(Task::MultipleChoice).forward(&ids(vec![2, 4, 5])).unwrap();
        assert_eq!(out.get("logits").unwrap().shape().dims(), &[2, 4]);

        let out = kernels(Task::QuestionAnswering).forward(&ids(vec![1, 6])).unwrap();
        assert_eq!(out.names().collect::<Vec<_>>(), ["start_logits", "end_logits"]);
        assert_eq!(out.get("end_logits").unwrap().shape().dims(), &[1, 6]);
    }

    #[test]
    fn test_token_level_and_hidden_states() {
        let out = kernels(Task::FillMask).forward(&ids(vec![2, 3])).unwrap();
        assert_eq!(out.get("logits").unwrap().shape().dims(), &[2, 3, 32]);
        let out = kernels(Task::FeatureExtraction).forward(&ids(vec![2, 3])).unwrap();
        assert_eq!(out.get("last_hidden_state").unwrap().shape().dims(), &[2, 3, 8]);
    }

    #[test]
    fn test_ids_beyond_vocab_wrap() {
        let k = kernels(Task::TextClassification);
        let a = k.forward(&ids(vec![1, 4])).unwrap();
        let mut shifted = ids(vec![1, 4]);
        if let Some(InputValue::Tensor(t)) = shifted.get_mut("input_ids") {
            *t = Tensor::from_i64(Shape::matrix(1, 4), vec![32, 33, 34, 35]).unwrap();
        }
        assert_eq!(a.get("logits"), k.forward(&shifted).unwrap().get("logits"));
    }

    #[test]
    fn test_image_classification() {
        let pixels = Tensor::from_f32(Shape::new(vec![2, 3, 2, 2]), vec![0.5; 24]).unwrap();
        let inputs = ModelInputs::from([("pixel_values".to_string(), InputValue::Tensor(pixels))]);
        let out = kernels(Task::ImageClassification).forward(&inputs).unwrap();
        assert_eq!(out.get("logits").unwrap().shape().dims(), &[2, 2]);
    }

    #[test]
    fn test_generate_appends_tokens() {
        let out = kernels(Task::TextGeneration).generate(&ids(vec![2, 3]), 4, false).unwrap();
        let seq = out.get("sequences").unwrap();
        assert_eq!(seq.shape().dims(), &[2, 7]);
        assert_eq!(&seq.as_i64().unwrap()[..3], &[0, 1, 2]);
        assert!(out.get("scores").is_none());

        let out = kernels(Task::Text2TextGeneration).generate(&ids(vec![1, 3]), 2, false).unwrap();
        assert_eq!(out.get("sequences").unwrap().shape().dims(), &[1, 3]);
        assert!(matches!(
            kernels(Task::FillMask).generate(&ids(vec![1, 3]), 1, false),
            Err(SimError::Unsupported { op: "generate", .. })
        ));
    }

    #[test]
    fn test_generation_scores_are_distributions() {
        let out = kernels(Task::TextGeneration).generate(&ids(vec![2, 3]), 2, true).unwrap();
        let scores = out.get("scores").unwrap();
        assert_eq!(scores.shape().dims(), &[2, 2, 32]);
        for step in scores.as_f32().unwrap().chunks(32) {
            let total: f32 = step.iter().sum();
            assert!((total - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_diffusion_call() {
        let k = kernels(Task::StableDiffusion);
        let inputs = ModelInputs::from([(
            "prompt".to_string(),
            InputValue::Text(vec!["a cat".into(), "a dog".into()]),
        )]);
        let images = k.call(&inputs, DEFAULT_INFERENCE_STEPS).unwrap();
        let images = images.get("images").unwrap();
        assert_eq!(images.shape().dims(), &[2, 3, IMAGE_SIDE, IMAGE_SIDE]);
        assert!(images.as_f32().unwrap().iter().all(|v| v.abs() <= 1.0));
        assert!(k.forward(&inputs).is_err());
    }

    #[test]
    fn test_missing_input() {
        let err = kernels(Task::TextClassification).forward(&ModelInputs::new()).unwrap_err();
        assert!(matches!(err, SimError::BadInput { .. }));
    }
}
