// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph documents.
//!
//! An exported component is a JSON document describing the graph's task,
//! interface and the passes applied to it, with its parameters in a
//! SafeTensors sidecar:
//!
//! | format      | graph file             | parameters            |
//! |-------------|------------------------|-----------------------|
//! | onnx        | `<component>.onnx`     | `<component>.onnx_data` |
//! | openvino IR | `openvino_model.xml`   | `openvino_model.bin`  |
//!
//! The IR graph file holds the same JSON document as the `.onnx` one.

use crate::weights::{ModelDims, ModelWeights, Precision};
use crate::SimError;
use backends::Task;
use model_ir::layout;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PRODUCER: &str = "optibench-sim";
pub const OPENVINO_GRAPH: &str = "openvino_model.xml";
pub const ONNX_EXTENSION: &str = "onnx";

/// Components that run when a multi-graph artifact is executed, most
/// specific first.
const EXECUTED_COMPONENTS: [&str; 5] = [
    "model",
    "decoder_model_merged",
    "decoder_model",
    "unet",
    "openvino_model",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    Onnx,
    OpenVino,
}

/// Record of a graph optimization pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptimizationRecord {
    pub level: usize,
    pub for_gpu: bool,
    pub fp16: bool,
    pub gelu_approximation: bool,
}

/// Record of a quantization pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantizationRecord {
    /// `QDQ/QLinearOps`, `QOperator/IntegerOps`, or an IR preset name.
    pub scheme: String,
    pub is_static: bool,
    pub per_channel: bool,
    pub reduce_range: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<String>,
    /// Activation ranges the pass was calibrated with.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ranges: BTreeMap<String, (f32, f32)>,
}

/// One exported graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDef {
    pub producer: String,
    pub format: GraphFormat,
    pub task: Task,
    pub component: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub dims: ModelDims,
    pub precision: Precision,
    /// Sidecar holding the parameters, relative to the graph file.
    pub weights: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationRecord>,
}

impl GraphDef {
    /// Describes a freshly exported component.
    pub fn new(
        format: GraphFormat,
        task: Task,
        component: &str,
        dims: ModelDims,
        token_type_ids: bool,
    ) -> Self {
        Self {
            producer: PRODUCER.to_string(),
            format,
            task,
            component: component.to_string(),
            inputs: input_names(task, token_type_ids),
            outputs: output_names(task),
            dims,
            precision: Precision::F32,
            weights: String::new(),
            optimization: None,
            quantization: None,
        }
    }

    /// Writes the document as `dir/file_name` and `weights` next to it.
    pub fn save(&mut self, dir: &Path, file_name: &str, weights: &ModelWeights) -> Result<PathBuf, SimError> {
        std::fs::create_dir_all(dir)?;
        self.weights = sidecar_name(file_name);
        self.precision = weights.precision();
        weights.save(&dir.join(&self.weights))?;
        let path = dir.join(file_name);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("wrote {} ({})", path.display(), self.precision.as_str());
        Ok(path)
    }

    /// Reads a graph document and its parameters.
    pub fn open(path: &Path) -> Result<(Self, ModelWeights), SimError> {
        let content = std::fs::read_to_string(path)?;
        let graph: GraphDef = serde_json::from_str(&content)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let weights = ModelWeights::load(&dir.join(&graph.weights))?;
        weights.check(&graph.dims)?;
        Ok((graph, weights))
    }

    pub fn gelu_approximation(&self) -> bool {
        self.optimization
            .as_ref()
            .is_some_and(|o| o.gelu_approximation)
    }
}

fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

fn sidecar_name(file_name: &str) -> String {
    match file_name.strip_suffix(".xml") {
        Some(stem) => format!("{stem}.bin"),
        None => format!("{file_name}_data"),
    }
}

/// Input names a graph for `task` declares.
pub fn input_names(task: Task, token_type_ids: bool) -> Vec<String> {
    let names: &[&str] = match task {
        Task::FeatureExtraction
        | Task::FillMask
        | Task::TextClassification
        | Task::TokenClassification
        | Task::QuestionAnswering
        | Task::MultipleChoice
            if token_type_ids =>
        {
            &["input_ids", "attention_mask", "token_type_ids"]
        }
        Task::ImageClassification
        | Task::SemanticSegmentation
        | Task::ObjectDetection
        | Task::ImageToText => &["pixel_values"],
        Task::AudioClassification => &["input_values"],
        Task::AutomaticSpeechRecognition => &["input_features"],
        Task::StableDiffusion | Task::StableDiffusionXl => &["prompt"],
        _ => &["input_ids", "attention_mask"],
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// Output names a graph for `task` declares.
pub fn output_names(task: Task) -> Vec<String> {
    let names: &[&str] = match task {
        Task::FeatureExtraction => &["last_hidden_state"],
        Task::QuestionAnswering => &["start_logits", "end_logits"],
        Task::StableDiffusion | Task::StableDiffusionXl => &["images"],
        _ => &["logits"],
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// Component graphs an export produces for `task`.
pub fn onnx_components(task: Task, use_cache: bool, use_merged: bool) -> Vec<&'static str> {
    let decoders: &[&str] = match (use_cache, use_merged) {
        (true, true) => &["decoder_model_merged"],
        (true, false) => &["decoder_model", "decoder_with_past_model"],
        (false, _) => &["decoder_model"],
    };
    match task {
        Task::TextGeneration => decoders.to_vec(),
        Task::Text2TextGeneration => {
            let mut components = vec!["encoder_model"];
            components.extend_from_slice(decoders);
            components
        }
        Task::StableDiffusion => vec!["text_encoder", "unet", "vae_decoder"],
        Task::StableDiffusionXl => vec!["text_encoder", "text_encoder_2", "unet", "vae_decoder"],
        _ => vec!["model"],
    }
}

/// Picks the graph file of `dir` that executes the model.
pub fn executed_graph(dir: &Path, format: GraphFormat) -> Result<PathBuf, SimError> {
    let files = match format {
        GraphFormat::Onnx => layout::list_files_with_extension(dir, ONNX_EXTENSION)?,
        GraphFormat::OpenVino => layout::list_files_with_extension(dir, "xml")?,
    };
    EXECUTED_COMPONENTS
        .iter()
        .find_map(|component| files.iter().find(|f| file_stem(f) == *component))
        .map(|f| dir.join(f))
        .ok_or_else(|| SimError::MissingGraph {
            dir: dir.to_path_buf(),
            expected: EXECUTED_COMPONENTS.iter().map(|c| c.to_string()).collect(),
        })
}
