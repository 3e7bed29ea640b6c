// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline tests for the runtime-execution backend, against recording
//! collaborators.

mod common;

use backends::onnxruntime::{OrtBackend, OrtConfig, QuantFormat};
use backends::{
    Backend, BackendConfig, BackendError, Device, InputValue, Kwargs, ModelInputs, PipelineState,
    Stage, Task,
};
use common::{workspace_root, CountingDatasets, MockLibrary};
use serde_json::json;
use std::sync::Arc;
use tensor_core::{Shape, Tensor};

fn text_classification() -> OrtConfig {
    let mut base = BackendConfig::new("distilbert-sst2", Task::TextClassification);
    base.no_weights = true;
    OrtConfig::new(base)
}

fn build(
    config: OrtConfig,
    library: &Arc<MockLibrary>,
    datasets: &Arc<CountingDatasets>,
) -> Result<OrtBackend, BackendError> {
    OrtBackend::new(config, library.clone(), datasets.clone())
}

#[test]
fn test_no_weights_reaches_ready_and_serves_calls() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut backend = build(text_classification(), &library, &datasets).unwrap();

    assert_eq!(backend.state(), PipelineState::Ready);
    assert_eq!(
        backend.history(),
        &[
            PipelineState::Created,
            PipelineState::TaskValidated,
            PipelineState::ModelMaterialized,
            PipelineState::ProviderValidated,
            PipelineState::Ready,
        ]
    );

    {
        let journal = library.journal();
        assert_eq!(journal.loads.len(), 1);
        let load = &journal.loads[0];
        assert!(load.random_init);
        assert!(load.source.export);
        assert!(load.source.model.ends_with("no_weights_model"));
        assert_eq!(load.class.name, "ORTModelForSequenceClassification");
        let root = workspace_root(&journal).unwrap();
        assert!(!root.exists(), "workspace must be removed once ready");
    }

    let mut inputs = ModelInputs::new();
    inputs.insert(
        "input_ids".into(),
        InputValue::Tensor(Tensor::full_i64(Shape::matrix(1, 4), 1)),
    );
    let outputs = backend.call(&inputs, &Kwargs::new()).unwrap();
    assert!(!outputs.is_empty());
    assert_eq!(datasets.calls(), 0);
}

#[test]
fn test_auto_optimization_wins_over_manual() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = text_classification();
    config.optimization = true;
    config.optimization_config.insert("optimization_level".into(), json!(99));
    config.auto_optimization = Some("O1".into());

    let backend = build(config, &library, &datasets).unwrap();
    assert!(backend.history().contains(&PipelineState::Optimized));
    assert!(backend.history().contains(&PipelineState::Reloaded));

    let journal = library.journal();
    assert_eq!(journal.optimizations.len(), 1);
    assert_eq!(journal.optimizations[0].optimization_level, 1);

    let reload = journal.loads.last().unwrap();
    assert!(!reload.source.export);
    assert!(reload.source.model.ends_with("optimized"));
    assert!(!reload.random_init);
}

#[test]
fn test_calibration_rejects_multi_graph_models_before_generating_data() {
    let library = Arc::new(MockLibrary::new(&["decoder_model.onnx", "encoder_model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("t5-small", Task::Text2TextGeneration);
    base.no_weights = true;
    let mut config = OrtConfig::new(base);
    config.quantization = true;
    config.calibration = true;

    let err = build(config, &library, &datasets).err().unwrap();
    assert!(matches!(err, BackendError::UnsupportedConfiguration(_)));
    assert_eq!(datasets.calls(), 0);

    let journal = library.journal();
    assert!(journal.quantizations.is_empty());
    assert!(!workspace_root(&journal).unwrap().exists());
}

#[test]
fn test_config_is_not_mutated_by_stages() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = text_classification();
    config.auto_optimization = Some("O2".into());
    config.auto_quantization = Some("avx2".into());
    let before = config.clone();

    let backend = build(config, &library, &datasets).unwrap();
    assert_eq!(backend.config(), &before);
    assert!(backend.config().base.export);
    assert_eq!(backend.config().base.model, "distilbert-sst2");

    let journal = library.journal();
    let reload = journal.loads.last().unwrap();
    assert!(reload.source.model.ends_with("quantized_model"));
}

#[test]
fn test_provider_mismatch_removes_workspace() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = text_classification();
    config.base.device = Device::Cuda(0);

    let err = build(config, &library, &datasets).err().unwrap();
    match err {
        BackendError::ProviderMismatch { expected, active } => {
            assert_eq!(expected, "CUDAExecutionProvider");
            assert_eq!(active, vec!["CPUExecutionProvider".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    let journal = library.journal();
    assert!(!workspace_root(&journal).unwrap().exists());

    let options = &journal.ort_options[0];
    assert_eq!(options.provider_options["device_id"], json!(0));
    assert!(options.use_io_binding);
}

#[test]
fn test_auto_quantization_preset_is_used_with_calibration() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = text_classification();
    config.quantization = true;
    config.quantization_config.insert("per_channel".into(), json!(true));
    config.quantization_config.insert("format".into(), json!("QOperator"));
    config.auto_quantization = Some("arm64".into());
    config.auto_quantization_config.insert("is_static".into(), json!(true));
    config.calibration = true;
    config.auto_calibration = Some("minmax".into());

    let backend = build(config, &library, &datasets).unwrap();
    assert_eq!(
        &backend.history()[2..],
        &[
            PipelineState::ModelMaterialized,
            PipelineState::Quantized,
            PipelineState::Reloaded,
            PipelineState::ProviderValidated,
            PipelineState::Ready,
        ]
    );
    assert_eq!(datasets.calls(), 1);

    let journal = library.journal();
    let applied = &journal.quantizations[0];
    assert!(applied.is_static);
    assert!(!applied.per_channel);
    assert_eq!(applied.format, QuantFormat::QDQ);

    let (columns, calibration) = &journal.fits[0];
    assert_eq!(columns, &vec!["attention_mask".to_string(), "input_ids".to_string()]);
    assert_eq!(calibration.method.name(), "minmax");
    assert_eq!(calibration.dataset_num_samples, 1);
}

#[test]
fn test_unsupported_task_fails_before_any_io() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let config = OrtConfig::new(BackendConfig::new("detr", Task::ObjectDetection));

    let err = build(config, &library, &datasets).err().unwrap();
    assert!(matches!(err, BackendError::UnsupportedTask { .. }));
    assert!(library.journal().loads.is_empty());
}

#[test]
fn test_load_failure_is_propagated() {
    let mut mock = MockLibrary::new(&["model.onnx"]);
    mock.fail_load = true;
    let library = Arc::new(mock);
    let datasets = Arc::new(CountingDatasets::default());

    let err = build(text_classification(), &library, &datasets).err().unwrap();
    assert!(matches!(err, BackendError::Library { stage: Stage::Load, .. }));
    assert!(err.to_string().contains("cannot open"));
    assert!(!workspace_root(&library.journal()).unwrap().exists());
}

#[test]
fn test_prepare_inputs_drops_undeclared_problematic_inputs() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let backend = build(text_classification(), &library, &datasets).unwrap();

    let mut inputs = ModelInputs::new();
    for name in ["input_ids", "attention_mask", "token_type_ids", "position_ids", "pixel_mask"] {
        inputs.insert(name.into(), Tensor::full_i64(Shape::matrix(1, 2), 0).into());
    }
    let prepared = backend.prepare_inputs(inputs).unwrap();
    assert_eq!(
        prepared.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["attention_mask", "input_ids", "pixel_mask"]
    );
}

#[test]
fn test_prepare_inputs_moves_tensors_to_device() {
    let mut mock = MockLibrary::new(&["model.onnx"]);
    mock.providers = vec!["CUDAExecutionProvider".into(), "CPUExecutionProvider".into()];
    mock.inputs.push("token_type_ids".into());
    let library = Arc::new(mock);
    let datasets = Arc::new(CountingDatasets::default());
    let mut config = text_classification();
    config.base.device = Device::Cuda(1);
    let backend = build(config, &library, &datasets).unwrap();

    let mut inputs = ModelInputs::new();
    inputs.insert("token_type_ids".into(), Tensor::full_i64(Shape::matrix(1, 2), 0).into());
    let prepared = backend.prepare_inputs(inputs).unwrap();
    assert_eq!(prepared["token_type_ids"].device(), Some(Device::Cuda(1)));
}

#[test]
fn test_diffusion_inputs_reduced_to_prompt() {
    let library = Arc::new(MockLibrary::new(&["text_encoder.onnx", "unet.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("sd-v1-5", Task::StableDiffusion);
    base.no_weights = true;
    let backend = build(OrtConfig::new(base), &library, &datasets).unwrap();
    assert_eq!(backend.model_class().name, "ORTStableDiffusionPipeline");

    let mut inputs = ModelInputs::new();
    inputs.insert("prompt".into(), InputValue::Text(vec!["a lighthouse".into()]));
    inputs.insert("input_ids".into(), Tensor::full_i64(Shape::matrix(1, 2), 0).into());
    let prepared = backend.prepare_inputs(inputs).unwrap();
    assert_eq!(prepared.len(), 1);
    assert!(prepared.contains_key("prompt"));
}

#[test]
fn test_clean_is_terminal_and_idempotent() {
    let library = Arc::new(MockLibrary::new(&["model.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut backend = build(text_classification(), &library, &datasets).unwrap();

    backend.clean();
    backend.clean();
    assert_eq!(backend.state(), PipelineState::Cleaned);
    assert!(backend.model().is_none());
    assert!(matches!(
        backend.forward(&ModelInputs::new(), &Kwargs::new()),
        Err(BackendError::NotReady(PipelineState::Cleaned))
    ));
}

#[test]
fn test_generation_load_options() {
    let library = Arc::new(MockLibrary::new(&["decoder_model_merged.onnx"]));
    let datasets = Arc::new(CountingDatasets::default());
    let mut base = BackendConfig::new("gpt2", Task::TextGeneration);
    base.no_weights = true;
    let mut config = OrtConfig::new(base);
    config.use_merged = true;
    build(config, &library, &datasets).unwrap();

    let journal = library.journal();
    assert_eq!(journal.ort_options[0].use_cache, Some(true));
    assert_eq!(journal.ort_options[0].use_merged, Some(true));
}
