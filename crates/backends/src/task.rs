// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tasks, backend kinds and loader-class resolution.
//!
//! [`resolve_model_class`] is a single exhaustive `match` over
//! `(backend, task)`: adding a task or a backend without deciding its
//! loader is a compile error, and an unsupported pair surfaces as
//! [`BackendError::UnsupportedTask`] before any I/O happens.

use crate::{BackendError, Library};
use std::fmt;
use std::str::FromStr;

/// A benchmarkable model task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    FeatureExtraction,
    FillMask,
    TextClassification,
    TokenClassification,
    QuestionAnswering,
    MultipleChoice,
    ImageClassification,
    AudioClassification,
    SemanticSegmentation,
    ObjectDetection,
    TextGeneration,
    Text2TextGeneration,
    AutomaticSpeechRecognition,
    ImageToText,
    StableDiffusion,
    StableDiffusionXl,
}

impl Task {
    pub const ALL: [Task; 16] = [
        Task::FeatureExtraction,
        Task::FillMask,
        Task::TextClassification,
        Task::TokenClassification,
        Task::QuestionAnswering,
        Task::MultipleChoice,
        Task::ImageClassification,
        Task::AudioClassification,
        Task::SemanticSegmentation,
        Task::ObjectDetection,
        Task::TextGeneration,
        Task::Text2TextGeneration,
        Task::AutomaticSpeechRecognition,
        Task::ImageToText,
        Task::StableDiffusion,
        Task::StableDiffusionXl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::FeatureExtraction => "feature-extraction",
            Task::FillMask => "fill-mask",
            Task::TextClassification => "text-classification",
            Task::TokenClassification => "token-classification",
            Task::QuestionAnswering => "question-answering",
            Task::MultipleChoice => "multiple-choice",
            Task::ImageClassification => "image-classification",
            Task::AudioClassification => "audio-classification",
            Task::SemanticSegmentation => "semantic-segmentation",
            Task::ObjectDetection => "object-detection",
            Task::TextGeneration => "text-generation",
            Task::Text2TextGeneration => "text2text-generation",
            Task::AutomaticSpeechRecognition => "automatic-speech-recognition",
            Task::ImageToText => "image-to-text",
            Task::StableDiffusion => "stable-diffusion",
            Task::StableDiffusionXl => "stable-diffusion-xl",
        }
    }

    /// Tasks whose loaders accept the `use_cache` / `use_merged` options.
    pub fn is_text_generation(self) -> bool {
        matches!(
            self,
            Task::TextGeneration
                | Task::Text2TextGeneration
                | Task::AutomaticSpeechRecognition
                | Task::ImageToText
        )
    }

    pub fn is_diffusion(self) -> bool {
        matches!(self, Task::StableDiffusion | Task::StableDiffusionXl)
    }

    /// The library a model for this task is published with, absent an
    /// explicit choice.
    pub fn default_library(self) -> Library {
        if self.is_diffusion() {
            Library::Diffusers
        } else {
            Library::Transformers
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Task::ALL.iter().map(|t| t.as_str()).collect();
                BackendError::Config(format!("unknown task '{s}'; expected one of {known:?}"))
            })
    }
}

impl serde::Serialize for Task {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Task {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The execution stack a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Plain framework execution; used as the source of framework models.
    PyTorch,
    OnnxRuntime,
    OpenVino,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::PyTorch => "pytorch",
            BackendKind::OnnxRuntime => "onnxruntime",
            BackendKind::OpenVino => "openvino",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The loader class resolved for a (task, backend) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelClass {
    pub backend: BackendKind,
    pub task: Task,
    pub name: &'static str,
}

impl ModelClass {
    /// Dual-model diffusion pipelines rather than single-graph models.
    pub fn is_pipeline(&self) -> bool {
        self.task.is_diffusion()
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Resolves the loader class for `task` under `backend`.
///
/// # Errors
/// [`BackendError::UnsupportedTask`] if the backend has no loader for the task.
pub fn resolve_model_class(task: Task, backend: BackendKind) -> Result<ModelClass, BackendError> {
    loader_name(backend, task)
        .map(|name| ModelClass {
            backend,
            task,
            name,
        })
        .ok_or(BackendError::UnsupportedTask { task, backend })
}

fn loader_name(backend: BackendKind, task: Task) -> Option<&'static str> {
    use BackendKind::*;
    use Task::*;

    let name = match (backend, task) {
        (PyTorch, FeatureExtraction) => "AutoModel",
        (PyTorch, FillMask) => "AutoModelForMaskedLM",
        (PyTorch, TextClassification) => "AutoModelForSequenceClassification",
        (PyTorch, TokenClassification) => "AutoModelForTokenClassification",
        (PyTorch, QuestionAnswering) => "AutoModelForQuestionAnswering",
        (PyTorch, MultipleChoice) => "AutoModelForMultipleChoice",
        (PyTorch, ImageClassification) => "AutoModelForImageClassification",
        (PyTorch, AudioClassification) => "AutoModelForAudioClassification",
        (PyTorch, SemanticSegmentation) => "AutoModelForSemanticSegmentation",
        (PyTorch, ObjectDetection) => "AutoModelForObjectDetection",
        (PyTorch, TextGeneration) => "AutoModelForCausalLM",
        (PyTorch, Text2TextGeneration) => "AutoModelForSeq2SeqLM",
        (PyTorch, AutomaticSpeechRecognition) => "AutoModelForSpeechSeq2Seq",
        (PyTorch, ImageToText) => "AutoModelForVision2Seq",
        (PyTorch, StableDiffusion) => "StableDiffusionPipeline",
        (PyTorch, StableDiffusionXl) => "StableDiffusionXLPipeline",

        (OnnxRuntime, FeatureExtraction) => "ORTModelForFeatureExtraction",
        (OnnxRuntime, FillMask) => "ORTModelForMaskedLM",
        (OnnxRuntime, TextClassification) => "ORTModelForSequenceClassification",
        (OnnxRuntime, TokenClassification) => "ORTModelForTokenClassification",
        (OnnxRuntime, QuestionAnswering) => "ORTModelForQuestionAnswering",
        (OnnxRuntime, MultipleChoice) => "ORTModelForMultipleChoice",
        (OnnxRuntime, ImageClassification) => "ORTModelForImageClassification",
        (OnnxRuntime, AudioClassification) => "ORTModelForAudioClassification",
        (OnnxRuntime, SemanticSegmentation) => "ORTModelForSemanticSegmentation",
        (OnnxRuntime, TextGeneration) => "ORTModelForCausalLM",
        (OnnxRuntime, Text2TextGeneration) => "ORTModelForSeq2SeqLM",
        (OnnxRuntime, AutomaticSpeechRecognition) => "ORTModelForSpeechSeq2Seq",
        (OnnxRuntime, ImageToText) => "ORTModelForVision2Seq",
        (OnnxRuntime, StableDiffusion) => "ORTStableDiffusionPipeline",
        (OnnxRuntime, StableDiffusionXl) => "ORTStableDiffusionXLPipeline",
        (OnnxRuntime, ObjectDetection) => return None,

        (OpenVino, FeatureExtraction) => "OVModelForFeatureExtraction",
        (OpenVino, FillMask) => "OVModelForMaskedLM",
        (OpenVino, TextClassification) => "OVModelForSequenceClassification",
        (OpenVino, TokenClassification) => "OVModelForTokenClassification",
        (OpenVino, QuestionAnswering) => "OVModelForQuestionAnswering",
        (OpenVino, ImageClassification) => "OVModelForImageClassification",
        (OpenVino, AudioClassification) => "OVModelForAudioClassification",
        (OpenVino, TextGeneration) => "OVModelForCausalLM",
        (OpenVino, Text2TextGeneration) => "OVModelForSeq2SeqLM",
        (OpenVino, StableDiffusion) => "OVStableDiffusionPipeline",
        (OpenVino, StableDiffusionXl) => "OVStableDiffusionXLPipeline",
        (
            OpenVino,
            MultipleChoice
            | SemanticSegmentation
            | ObjectDetection
            | AutomaticSpeechRecognition
            | ImageToText,
        ) => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names_roundtrip() {
        for task in Task::ALL {
            assert_eq!(task.as_str().parse::<Task>().unwrap(), task);
        }
        assert!("sentence-similarity".parse::<Task>().is_err());
    }

    #[test]
    fn test_text_generation_set() {
        let gen: Vec<Task> = Task::ALL.into_iter().filter(|t| t.is_text_generation()).collect();
        assert_eq!(
            gen,
            vec![
                Task::TextGeneration,
                Task::Text2TextGeneration,
                Task::AutomaticSpeechRecognition,
                Task::ImageToText
            ]
        );
    }

    #[test]
    fn test_resolve_runtime_loaders() {
        let class = resolve_model_class(Task::TextClassification, BackendKind::OnnxRuntime).unwrap();
        assert_eq!(class.name, "ORTModelForSequenceClassification");
        assert!(!class.is_pipeline());

        let sd = resolve_model_class(Task::StableDiffusionXl, BackendKind::OnnxRuntime).unwrap();
        assert_eq!(sd.to_string(), "ORTStableDiffusionXLPipeline");
        assert!(sd.is_pipeline());
    }

    #[test]
    fn test_unsupported_pairs() {
        let err = resolve_model_class(Task::ObjectDetection, BackendKind::OnnxRuntime).unwrap_err();
        assert!(matches!(
            err,
            BackendError::UnsupportedTask {
                task: Task::ObjectDetection,
                backend: BackendKind::OnnxRuntime
            }
        ));
        assert!(resolve_model_class(Task::ImageToText, BackendKind::OpenVino).is_err());
    }

    #[test]
    fn test_framework_covers_every_task() {
        for task in Task::ALL {
            assert!(resolve_model_class(task, BackendKind::PyTorch).is_ok(), "{task}");
        }
    }

    #[test]
    fn test_default_library() {
        assert_eq!(Task::StableDiffusion.default_library(), Library::Diffusers);
        assert_eq!(Task::FillMask.default_library(), Library::Transformers);
    }
}
