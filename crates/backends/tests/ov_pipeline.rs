// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline tests for the hardware-vendor backend, against recording
//! collaborators.

mod common;

use backends::openvino::{OvBackend, OvConfig};
use backends::{Backend, BackendConfig, BackendError, Device, PipelineState, Shapes, Task};
use common::{workspace_root, CountingDatasets, MockLibrary};
use std::sync::Arc;

fn build(
    config: OvConfig,
    library: &Arc<MockLibrary>,
    datasets: &Arc<CountingDatasets>,
) -> Result<OvBackend, BackendError> {
    OvBackend::new(config, library.clone(), datasets.clone())
}

#[test]
fn test_no_weights_ir_load_forces_export() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("bert-base-uncased", Task::FillMask);
    base.no_weights = true;
    base.export = false;

    let backend = build(OvConfig::new(base), &library, &datasets).unwrap();
    assert_eq!(
        backend.history(),
        &[
            PipelineState::Created,
            PipelineState::TaskValidated,
            PipelineState::ModelMaterialized,
            PipelineState::Ready,
        ]
    );

    let journal = library.journal();
    let load = &journal.loads[0];
    assert!(load.source.export);
    assert!(load.random_init);
    assert_eq!(load.class.name, "OVModelForMaskedLM");
    assert!(journal.ov_options[0].compile);
    assert_eq!(journal.ov_options[0].device, "CPU");
    assert!(!workspace_root(&journal).unwrap().exists());
}

#[test]
fn test_quantization_path() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("distilbert-sst2", Task::TextClassification);
    base.no_weights = true;
    let mut config = OvConfig::new(base);
    config.quantization = true;
    config.calibration = true;

    let backend = build(config, &library, &datasets).unwrap();
    assert_eq!(
        backend.history(),
        &[
            PipelineState::Created,
            PipelineState::TaskValidated,
            PipelineState::ModelMaterialized,
            PipelineState::Quantized,
            PipelineState::Reloaded,
            PipelineState::Ready,
        ]
    );
    assert_eq!(datasets.calls(), 1);

    let journal = library.journal();
    assert_eq!(journal.loads.len(), 2);
    let framework = &journal.loads[0];
    assert!(framework.framework);
    assert!(framework.random_init);
    assert_eq!(framework.class.name, "AutoModelForSequenceClassification");
    assert_eq!(journal.tied, 1);

    let (save_dir, columns) = &journal.ov_quantizations[0];
    assert!(save_dir.ends_with("quantized_model"));
    assert_eq!(
        columns.as_deref(),
        Some(&["attention_mask".to_string(), "input_ids".to_string()][..])
    );

    let reload = &journal.loads[1];
    assert!(!reload.framework);
    assert!(!reload.source.export);
    assert_eq!(&reload.source.model, save_dir);
    assert!(!save_dir.exists());
}

#[test]
fn test_quantization_without_calibration_skips_dataset() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = OvConfig::new(BackendConfig::new("/models/bert", Task::FeatureExtraction));
    config.quantization = true;

    build(config, &library, &datasets).unwrap();
    assert_eq!(datasets.calls(), 0);
    let journal = library.journal();
    assert_eq!(journal.tied, 0);
    assert_eq!(journal.ov_quantizations[0].1, None);
}

#[test]
fn test_prepare_for_inference_reshapes_vision_models() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("vit", Task::ImageClassification);
    base.device = Device::Gpu(0);
    let mut config = OvConfig::new(base);
    config.reshape = true;
    config.half = true;
    let mut backend = build(config, &library, &datasets).unwrap();
    assert!(!library.journal().ov_options[0].compile);
    assert_eq!(library.journal().ov_options[0].device, "GPU.0");

    let input_shapes: Shapes = [
        ("batch_size".to_string(), 2),
        ("sequence_length".to_string(), 128),
        ("height".to_string(), 224),
        ("width".to_string(), 224),
        ("num_choices".to_string(), 4),
    ]
    .into_iter()
    .collect();
    backend.prepare_for_inference(&input_shapes).unwrap();

    let journal = library.journal();
    let reshaped = &journal.reshapes[0];
    assert_eq!(reshaped["sequence_length"], 3);
    assert_eq!(reshaped["batch_size"], 2);
    assert!(!reshaped.contains_key("num_choices"));
    assert_eq!(journal.halves, 1);
    assert_eq!(journal.compiles, 1);
}

#[test]
fn test_height_alone_sets_channel_count() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = OvConfig::new(BackendConfig::new("vit", Task::ImageClassification));
    config.reshape = true;
    let mut backend = build(config, &library, &datasets).unwrap();

    let input_shapes: Shapes = [
        ("batch_size".to_string(), 1),
        ("sequence_length".to_string(), 64),
        ("height".to_string(), 32),
    ]
    .into_iter()
    .collect();
    backend.prepare_for_inference(&input_shapes).unwrap();

    let journal = library.journal();
    let reshaped = &journal.reshapes[0];
    assert_eq!(reshaped["sequence_length"], 3);
    assert!(!reshaped.contains_key("width"));
}

#[test]
fn test_prepare_for_inference_is_noop_by_default() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let config = OvConfig::new(BackendConfig::new("bert", Task::FillMask));
    let mut backend = build(config, &library, &datasets).unwrap();

    backend.prepare_for_inference(&Shapes::new()).unwrap();
    let journal = library.journal();
    assert!(journal.reshapes.is_empty());
    assert_eq!(journal.compiles, 0);
}

#[test]
fn test_unsupported_task() {
    let library = Arc::new(MockLibrary::new(&["openvino_model.xml"]));
    let datasets = Arc::new(CountingDatasets::default());
    let config = OvConfig::new(BackendConfig::new("blip", Task::ImageToText));
    let err = build(config, &library, &datasets).err().unwrap();
    assert!(matches!(
        err,
        BackendError::UnsupportedTask {
            task: Task::ImageToText,
            ..
        }
    ));
}
