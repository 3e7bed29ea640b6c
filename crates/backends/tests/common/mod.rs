// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Recording collaborators shared by the pipeline tests.

#![allow(dead_code)]

use backends::onnxruntime::{
    CalibrationConfig, CalibrationRanges, GraphOptimizer, GraphQuantizer, OptimizationConfig,
    OrtLibrary, OrtLoadOptions, QuantizationConfig,
};
use backends::openvino::{OvLibrary, OvLoadOptions, OvQuantizationConfig, OvQuantizer};
use backends::{
    scope, Dataset, DatasetGenerator, HubOptions, Kwargs, ModelClass, ModelHub, ModelInputs,
    ModelOutputs, ModelSource, PretrainedModel, Shapes, Task,
};
use model_ir::{PretrainedConfig, ProcessorConfig};
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tensor_core::{DType, Shape, Tensor};

pub const BERT_CONFIG: &str = r#"{
    "model_type": "bert",
    "vocab_size": 64,
    "hidden_size": 8,
    "max_position_embeddings": 32,
    "id2label": {"0": "NEGATIVE", "1": "POSITIVE"}
}"#;

/// One recorded load.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub class: ModelClass,
    pub source: ModelSource,
    pub random_init: bool,
    pub framework: bool,
}

/// Everything the mocks observed.
#[derive(Debug, Default)]
pub struct Journal {
    pub loads: Vec<LoadEvent>,
    pub optimizations: Vec<OptimizationConfig>,
    pub quantizations: Vec<QuantizationConfig>,
    pub fits: Vec<(Vec<String>, CalibrationConfig)>,
    pub ov_quantizations: Vec<(PathBuf, Option<Vec<String>>)>,
    pub tied: usize,
    pub reshapes: Vec<Shapes>,
    pub halves: usize,
    pub compiles: usize,
    pub ort_options: Vec<OrtLoadOptions>,
    pub ov_options: Vec<OvLoadOptions>,
}

pub type SharedJournal = Arc<Mutex<Journal>>;

pub struct MockModel {
    class: ModelClass,
    dir: PathBuf,
    inputs: Vec<String>,
    providers: Vec<String>,
    journal: SharedJournal,
}

fn logits() -> Tensor {
    Tensor::zeros(Shape::matrix(1, 2), DType::F32)
}

impl PretrainedModel for MockModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn class(&self) -> ModelClass {
        self.class
    }

    fn save_dir(&self) -> &Path {
        &self.dir
    }

    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    fn forward(&mut self, _: &ModelInputs, _: &Kwargs) -> anyhow::Result<ModelOutputs> {
        assert!(scope::inference_mode_active());
        let mut out = ModelOutputs::new();
        out.insert("logits", logits());
        Ok(out)
    }

    fn generate(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs> {
        self.forward(inputs, kwargs)
    }

    fn call(&mut self, inputs: &ModelInputs, kwargs: &Kwargs) -> anyhow::Result<ModelOutputs> {
        self.forward(inputs, kwargs)
    }

    fn tie_weights(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().tied += 1;
        Ok(())
    }

    fn reshape_dims(&self) -> Vec<&'static str> {
        vec!["batch_size", "sequence_length", "height", "width"]
    }

    fn reshape(&mut self, shapes: &Shapes) -> anyhow::Result<()> {
        self.journal.lock().unwrap().reshapes.push(shapes.clone());
        Ok(())
    }

    fn half(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().halves += 1;
        Ok(())
    }

    fn compile(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().compiles += 1;
        Ok(())
    }
}

/// A library whose "export" is a fixed directory of graph files.
pub struct MockLibrary {
    pub journal: SharedJournal,
    export_dir: TempDir,
    pub providers: Vec<String>,
    pub inputs: Vec<String>,
    pub fail_load: bool,
}

impl MockLibrary {
    pub fn new(graph_files: &[&str]) -> Self {
        let export_dir = tempfile::tempdir().unwrap();
        for name in graph_files {
            std::fs::write(export_dir.path().join(name), b"{}").unwrap();
        }
        Self {
            journal: SharedJournal::default(),
            export_dir,
            providers: vec!["CPUExecutionProvider".into()],
            inputs: vec!["input_ids".into(), "attention_mask".into()],
            fail_load: false,
        }
    }

    pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    fn model(&self, class: ModelClass, source: &ModelSource, framework: bool) -> anyhow::Result<Box<dyn PretrainedModel>> {
        self.journal().loads.push(LoadEvent {
            class,
            source: source.clone(),
            random_init: scope::random_init_active(),
            framework,
        });
        if self.fail_load {
            anyhow::bail!("cannot open {}", source.model.display());
        }
        let dir = if source.export {
            self.export_dir.path().to_path_buf()
        } else {
            source.model.clone()
        };
        Ok(Box::new(MockModel {
            class,
            dir,
            inputs: self.inputs.clone(),
            providers: self.providers.clone(),
            journal: self.journal.clone(),
        }))
    }
}

impl ModelHub for MockLibrary {
    fn pretrained_config(&self, _: &Path, _: &HubOptions) -> anyhow::Result<Option<PretrainedConfig>> {
        Ok(Some(PretrainedConfig::from_json(BERT_CONFIG)?))
    }

    fn pretrained_processor(&self, _: &Path, _: &HubOptions) -> anyhow::Result<Option<ProcessorConfig>> {
        Ok(None)
    }
}

struct CopyingOptimizer {
    source: PathBuf,
    files: Vec<String>,
    journal: SharedJournal,
}

impl GraphOptimizer for CopyingOptimizer {
    fn optimize(&mut self, config: &OptimizationConfig, save_dir: &Path) -> anyhow::Result<PathBuf> {
        for file in &self.files {
            std::fs::copy(self.source.join(file), save_dir.join(file))?;
        }
        self.journal.lock().unwrap().optimizations.push(config.clone());
        Ok(save_dir.to_path_buf())
    }
}

struct CopyingQuantizer {
    source: PathBuf,
    file: String,
    journal: SharedJournal,
}

impl GraphQuantizer for CopyingQuantizer {
    fn fit(
        &mut self,
        dataset: &Dataset,
        calibration: &CalibrationConfig,
        _: &[String],
        _: bool,
        _: usize,
    ) -> anyhow::Result<CalibrationRanges> {
        self.journal
            .lock()
            .unwrap()
            .fits
            .push((dataset.column_names(), calibration.clone()));
        Ok(BTreeMap::from([("input_ids".to_string(), (0.0, 1.0))]))
    }

    fn quantize(
        &mut self,
        config: &QuantizationConfig,
        _: Option<&CalibrationRanges>,
        save_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        std::fs::copy(self.source.join(&self.file), save_dir.join(&self.file))?;
        self.journal.lock().unwrap().quantizations.push(config.clone());
        Ok(save_dir.to_path_buf())
    }
}

impl OrtLibrary for MockLibrary {
    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OrtLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        self.journal().ort_options.push(options.clone());
        self.model(class, source, false)
    }

    fn optimizer(&self, model_dir: &Path, file_names: &[String]) -> anyhow::Result<Box<dyn GraphOptimizer>> {
        Ok(Box::new(CopyingOptimizer {
            source: model_dir.to_path_buf(),
            files: file_names.to_vec(),
            journal: self.journal.clone(),
        }))
    }

    fn quantizer(&self, model_dir: &Path, file_name: &str) -> anyhow::Result<Box<dyn GraphQuantizer>> {
        Ok(Box::new(CopyingQuantizer {
            source: model_dir.to_path_buf(),
            file: file_name.to_string(),
            journal: self.journal.clone(),
        }))
    }
}

struct RecordingOvQuantizer {
    export_inputs: Vec<String>,
    journal: SharedJournal,
}

impl OvQuantizer for RecordingOvQuantizer {
    fn export_input_names(&self) -> Vec<String> {
        self.export_inputs.clone()
    }

    fn quantize(
        &mut self,
        save_dir: &Path,
        _: &OvQuantizationConfig,
        calibration_dataset: Option<&Dataset>,
        _: usize,
    ) -> anyhow::Result<()> {
        std::fs::write(save_dir.join("openvino_model.xml"), b"<net/>")?;
        self.journal
            .lock()
            .unwrap()
            .ov_quantizations
            .push((save_dir.to_path_buf(), calibration_dataset.map(Dataset::column_names)));
        Ok(())
    }
}

impl OvLibrary for MockLibrary {
    fn load_framework_model(
        &self,
        class: ModelClass,
        source: &ModelSource,
        _: &HubOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        self.model(class, source, true)
    }

    fn load(
        &self,
        class: ModelClass,
        source: &ModelSource,
        options: &OvLoadOptions,
    ) -> anyhow::Result<Box<dyn PretrainedModel>> {
        self.journal().ov_options.push(options.clone());
        self.model(class, source, false)
    }

    fn quantizer(&self, _: &dyn PretrainedModel, _: Task, _: u64) -> anyhow::Result<Box<dyn OvQuantizer>> {
        Ok(Box::new(RecordingOvQuantizer {
            export_inputs: self.inputs.clone(),
            journal: self.journal.clone(),
        }))
    }
}

/// Counts invocations and emits one row with an extra `label` column.
#[derive(Default)]
pub struct CountingDatasets {
    pub calls: Mutex<usize>,
}

impl CountingDatasets {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl DatasetGenerator for CountingDatasets {
    fn generate(&self, _: Task, dataset_shapes: &Shapes, _: &Shapes) -> anyhow::Result<Dataset> {
        *self.calls.lock().unwrap() += 1;
        let len = dataset_shapes["sequence_length"];
        let row = ["input_ids", "attention_mask", "token_type_ids", "label"]
            .into_iter()
            .map(|c| (c.to_string(), Tensor::full_i64(Shape::matrix(1, len), 0)))
            .collect();
        Ok(Dataset {
            name: "synthetic".into(),
            config_name: "default".into(),
            split: "train".into(),
            rows: vec![row],
        })
    }
}

/// Directory of the first recorded load whose source lives in a workspace.
pub fn workspace_root(journal: &Journal) -> Option<PathBuf> {
    journal
        .loads
        .iter()
        .map(|l| &l.source.model)
        .find(|p| {
            p.parent()
                .and_then(Path::file_name)
                .is_some_and(|n| n.to_string_lossy().starts_with("optibench-"))
        })
        .and_then(|p| p.parent().map(Path::to_path_buf))
}
