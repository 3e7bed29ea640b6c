// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Parameters of a simulated model.
//!
//! Every model is an embedding table followed by a GELU and a linear head:
//!
//! ```text
//! ids / features ──► embeddings [input_dim, hidden] ──► gelu ──► head [hidden, output_dim] + bias
//! ```
//!
//! Widths come from the model's `config.json`, capped so that full-size
//! configs stay cheap to initialize. Token ids beyond the capped vocabulary
//! wrap around.
//!
//! Weights persist as SafeTensors. Quantized tensors are stored as `I8`
//! with their scale in the header metadata under `scale.<tensor name>`.

use crate::SimError;
use backends::Task;
use model_ir::{save_tensors, PretrainedConfig, WeightFile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};

pub const EMBEDDINGS: &str = "embeddings.weight";
pub const HEAD_WEIGHT: &str = "head.weight";
pub const HEAD_BIAS: &str = "head.bias";

/// Widest hidden layer the runtime materializes.
pub const MAX_HIDDEN: usize = 64;
/// Largest vocabulary the runtime materializes.
pub const MAX_VOCAB: usize = 1024;
/// Side of the square images diffusion pipelines return.
pub const IMAGE_SIDE: usize = 8;
pub const IMAGE_CHANNELS: usize = 3;

const DEFAULT_HIDDEN: usize = 16;
const DEFAULT_VOCAB: usize = 256;
/// Mean and mean magnitude of the waveform.
const AUDIO_FEATURES: usize = 2;
const SCALE_PREFIX: &str = "scale.";

/// Layer widths of a simulated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelDims {
    pub input_dim: usize,
    pub hidden: usize,
    pub output_dim: usize,
}

impl ModelDims {
    /// Derives the widths for `task` from an architecture description.
    pub fn for_task(task: Task, config: Option<&PretrainedConfig>) -> Result<Self, SimError> {
        let cfg = config.cloned().unwrap_or_default();
        let hidden = cfg.hidden_size.unwrap_or(DEFAULT_HIDDEN).clamp(1, MAX_HIDDEN);
        let vocab = cfg.vocab_size.unwrap_or(DEFAULT_VOCAB).clamp(2, MAX_VOCAB);
        let labels = cfg.num_labels().max(1);
        let channels = cfg.num_channels.unwrap_or(IMAGE_CHANNELS).max(1);

        let (input_dim, output_dim) = match task {
            Task::FeatureExtraction => (vocab, hidden),
            Task::FillMask | Task::TextGeneration | Task::Text2TextGeneration => (vocab, vocab),
            Task::TextClassification | Task::TokenClassification => (vocab, labels),
            Task::QuestionAnswering => (vocab, 2),
            Task::MultipleChoice => (vocab, 1),
            Task::ImageClassification => (channels, labels),
            Task::AudioClassification => (AUDIO_FEATURES, labels),
            Task::StableDiffusion | Task::StableDiffusionXl => (vocab, IMAGE_CHANNELS),
            other => return Err(SimError::UnsupportedTask(other)),
        };
        Ok(Self {
            input_dim,
            hidden,
            output_dim,
        })
    }

    fn shape_of(&self, name: &str) -> Shape {
        match name {
            EMBEDDINGS => Shape::matrix(self.input_dim, self.hidden),
            HEAD_WEIGHT => Shape::matrix(self.hidden, self.output_dim),
            _ => Shape::vector(self.output_dim),
        }
    }
}

/// Storage precision of a weight set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Int8,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::F32 => "f32",
            Precision::F16 => "f16",
            Precision::Int8 => "int8",
        }
    }
}

/// Which tensors a quantization pass rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizeTargets {
    /// The embedding lookup (`Gather`).
    pub embeddings: bool,
    /// The output projection (`MatMul`).
    pub head: bool,
}

impl QuantizeTargets {
    pub const ALL: Self = Self {
        embeddings: true,
        head: true,
    };

    /// Maps graph operator names onto the tensors they read.
    pub fn from_operators(operators: &[String]) -> Self {
        let has = |op: &str| operators.iter().any(|o| o == op);
        Self {
            embeddings: has("Gather") || has("EmbedLayerNormalization"),
            head: has("MatMul"),
        }
    }
}

/// The parameters of one model, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeights {
    tensors: BTreeMap<String, Tensor>,
    scales: BTreeMap<String, f32>,
}

/// Weights widened to `F32` for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWeights {
    pub embeddings: Tensor,
    pub head: Tensor,
    pub bias: Vec<f32>,
}

impl ModelWeights {
    /// Draws every parameter from a seeded uniform distribution scaled by
    /// the fan-in.
    pub fn random(dims: &ModelDims, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tensors = BTreeMap::new();
        for (name, fan_in) in [
            (EMBEDDINGS, dims.input_dim),
            (HEAD_WEIGHT, dims.hidden),
            (HEAD_BIAS, dims.hidden),
        ] {
            let shape = dims.shape_of(name);
            let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
            let values = (0..shape.num_elements())
                .map(|_| rng.gen_range(-bound..bound))
                .collect();
            // Shape and value count agree by construction.
            if let Ok(t) = Tensor::from_f32(shape, values) {
                tensors.insert(name.to_string(), t);
            }
        }
        Self {
            tensors,
            scales: BTreeMap::new(),
        }
    }

    /// Reads a framework checkpoint and checks it against `dims`.
    pub fn load_framework(path: &Path, dims: &ModelDims) -> Result<Self, SimError> {
        let file = WeightFile::open(path)?;
        let mut tensors = BTreeMap::new();
        for name in [EMBEDDINGS, HEAD_WEIGHT, HEAD_BIAS] {
            tensors.insert(name.to_string(), file.load(name)?);
        }
        let weights = Self {
            tensors,
            scales: BTreeMap::new(),
        };
        weights.check(dims)?;
        Ok(weights)
    }

    /// Reads a weight set written by [`ModelWeights::save`].
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let file = WeightFile::open(path)?;
        let mut tensors = BTreeMap::new();
        for meta in file.metadata()? {
            let tensor = file.load(&meta.name)?;
            tensors.insert(meta.name, tensor);
        }
        let mut scales = BTreeMap::new();
        for (key, value) in file.user_metadata()? {
            if let Some(name) = key.strip_prefix(SCALE_PREFIX) {
                let scale = value.parse::<f32>().map_err(|_| {
                    model_ir::ModelError::SafeTensors(format!("bad scale '{value}' for {name}"))
                })?;
                scales.insert(name.to_string(), scale);
            }
        }
        Ok(Self { tensors, scales })
    }

    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        let tensors: Vec<(String, Tensor)> = self
            .tensors
            .iter()
            .map(|(name, t)| (name.clone(), t.clone()))
            .collect();
        let mut metadata = BTreeMap::from([("format".to_string(), "sim".to_string())]);
        for (name, scale) in &self.scales {
            metadata.insert(format!("{SCALE_PREFIX}{name}"), scale.to_string());
        }
        save_tensors(path, &tensors, Some(metadata))?;
        Ok(())
    }

    /// Verifies tensor names and shapes.
    pub fn check(&self, dims: &ModelDims) -> Result<(), SimError> {
        for name in [EMBEDDINGS, HEAD_WEIGHT, HEAD_BIAS] {
            let tensor = self.tensor(name)?;
            let expected = dims.shape_of(name);
            if tensor.shape() != &expected {
                return Err(tensor_core::TensorError::ShapeMismatch {
                    op: "load weights",
                    lhs: expected,
                    rhs: tensor.shape().clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn tensor(&self, name: &str) -> Result<&Tensor, SimError> {
        self.tensors.get(name).ok_or_else(|| {
            model_ir::ModelError::WeightNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// The narrowest storage type among the tensors.
    pub fn precision(&self) -> Precision {
        let dtypes: Vec<DType> = self.tensors.values().map(Tensor::dtype).collect();
        if dtypes.contains(&DType::I8) {
            Precision::Int8
        } else if dtypes.contains(&DType::F16) {
            Precision::F16
        } else {
            Precision::F32
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.tensors.values().map(Tensor::size_bytes).sum()
    }

    /// Converts every float tensor to `F16` storage.
    pub fn to_f16(&self) -> Result<Self, SimError> {
        if self.precision() == Precision::Int8 {
            return Err(SimError::Precision {
                from: Precision::Int8.as_str(),
                to: Precision::F16.as_str(),
            });
        }
        let mut tensors = BTreeMap::new();
        for (name, t) in &self.tensors {
            tensors.insert(name.clone(), t.to_f16()?);
        }
        Ok(Self {
            tensors,
            scales: BTreeMap::new(),
        })
    }

    /// Quantizes the targeted tensors to `I8` with one symmetric scale per
    /// tensor. `max_level` is 127, or 63 for reduced range.
    pub fn quantize(&self, targets: QuantizeTargets, max_level: i8) -> Result<Self, SimError> {
        let mut out = self.clone();
        for (name, selected) in [(EMBEDDINGS, targets.embeddings), (HEAD_WEIGHT, targets.head)] {
            let tensor = self.tensor(name)?;
            if !selected || tensor.dtype() == DType::I8 {
                continue;
            }
            let values = tensor.to_f32_vec();
            let max_abs = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let scale = if max_abs > 0.0 {
                max_abs / f32::from(max_level)
            } else {
                1.0
            };
            let limit = f32::from(max_level);
            let quantized = values
                .iter()
                .map(|v| (v / scale).round().clamp(-limit, limit) as i8)
                .collect();
            out.tensors.insert(
                name.to_string(),
                Tensor::from_i8(tensor.shape().clone(), quantized)?,
            );
            out.scales.insert(name.to_string(), scale);
        }
        Ok(out)
    }

    /// Ties the output projection to the transposed embedding table.
    ///
    /// Returns `false` when the two do not have transposed shapes.
    pub fn tie_embeddings(&mut self) -> Result<bool, SimError> {
        let embeddings = self.tensor(EMBEDDINGS)?;
        let head = self.tensor(HEAD_WEIGHT)?;
        let (rows, cols) = match embeddings.shape().dims() {
            &[rows, cols] => (rows, cols),
            _ => return Ok(false),
        };
        if head.shape().dims() != [cols, rows] || embeddings.dtype() != DType::F32 {
            return Ok(false);
        }
        let src = embeddings.as_f32()?;
        let mut transposed = vec![0.0f32; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                transposed[c * rows + r] = src[r * cols + c];
            }
        }
        let tied = Tensor::from_f32(Shape::matrix(cols, rows), transposed)?;
        self.tensors.insert(HEAD_WEIGHT.to_string(), tied);
        Ok(true)
    }

    /// Widens (and dequantizes) the parameters for execution.
    pub fn dense(&self) -> Result<DenseWeights, SimError> {
        let widen = |name: &str| -> Result<Tensor, SimError> {
            let tensor = self.tensor(name)?;
            let scale = self.scales.get(name).copied().unwrap_or(1.0);
            let values = tensor.to_f32_vec().into_iter().map(|v| v * scale).collect();
            Ok(Tensor::from_f32(tensor.shape().clone(), values)?)
        };
        Ok(DenseWeights {
            embeddings: widen(EMBEDDINGS)?,
            head: widen(HEAD_WEIGHT)?,
            bias: widen(HEAD_BIAS)?.to_f32_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ModelDims {
        ModelDims {
            input_dim: 8,
            hidden: 4,
            output_dim: 8,
        }
    }

    #[test]
    fn test_dims_follow_task_and_caps() {
        let cfg = PretrainedConfig::from_json(r#"{"hidden_size": 768, "vocab_size": 30522}"#).unwrap();
        let d = ModelDims::for_task(Task::FillMask, Some(&cfg)).unwrap();
        assert_eq!((d.input_dim, d.hidden, d.output_dim), (MAX_VOCAB, MAX_HIDDEN, MAX_VOCAB));

        let d = ModelDims::for_task(Task::TextClassification, Some(&cfg)).unwrap();
        assert_eq!(d.output_dim, 2);
        let d = ModelDims::for_task(Task::ImageClassification, None).unwrap();
        assert_eq!(d.input_dim, 3);
        assert!(matches!(
            ModelDims::for_task(Task::ObjectDetection, None),
            Err(SimError::UnsupportedTask(Task::ObjectDetection))
        ));
    }

    #[test]
    fn test_random_is_seeded() {
        assert_eq!(ModelWeights::random(&dims(), 1), ModelWeights::random(&dims(), 1));
        assert_ne!(ModelWeights::random(&dims(), 1), ModelWeights::random(&dims(), 2));
        ModelWeights::random(&dims(), 1).check(&dims()).unwrap();
    }

    #[test]
    fn test_quantize_keeps_values_close() {
        let weights = ModelWeights::random(&dims(), 7);
        let q = weights.quantize(QuantizeTargets::ALL, 127).unwrap();
        assert_eq!(q.precision(), Precision::Int8);
        assert!(q.size_bytes() < weights.size_bytes());

        let a = weights.dense().unwrap();
        let b = q.dense().unwrap();
        let max_err = a
            .head
            .to_f32_vec()
            .iter()
            .zip(b.head.to_f32_vec())
            .fold(0.0f32, |m, (x, y)| m.max((x - y).abs()));
        assert!(max_err < 0.01, "max error {max_err}");
        assert_eq!(a.bias, b.bias);
    }

    #[test]
    fn test_operator_targets() {
        let only_matmul = QuantizeTargets::from_operators(&["MatMul".to_string()]);
        assert!(only_matmul.head && !only_matmul.embeddings);
        let q = ModelWeights::random(&dims(), 0).quantize(only_matmul, 127).unwrap();
        assert_eq!(q.tensor(EMBEDDINGS).unwrap().dtype(), DType::F32);
        assert_eq!(q.tensor(HEAD_WEIGHT).unwrap().dtype(), DType::I8);
    }

    #[test]
    fn test_save_and_load_preserves_scales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx_data");
        let q = ModelWeights::random(&dims(), 3).quantize(QuantizeTargets::ALL, 63).unwrap();
        q.save(&path).unwrap();
        assert_eq!(ModelWeights::load(&path).unwrap(), q);
    }

    #[test]
    fn test_half_and_tie() {
        let mut weights = ModelWeights::random(&dims(), 5);
        assert_eq!(weights.to_f16().unwrap().precision(), Precision::F16);
        assert!(weights.tie_embeddings().unwrap());
        let dense = weights.dense().unwrap();
        assert_eq!(dense.head.as_f32().unwrap()[1], dense.embeddings.as_f32().unwrap()[4]);

        let q = weights.quantize(QuantizeTargets::ALL, 127).unwrap();
        assert!(matches!(q.to_f16(), Err(SimError::Precision { .. })));
    }
}
