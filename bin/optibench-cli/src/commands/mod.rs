// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the experiment file they share.
//!
//! # TOML Format
//! ```toml
//! [backend]
//! name = "onnxruntime"
//! model = "distilbert-base-uncased-finetuned-sst-2-english"
//! task = "text-classification"
//! no_weights = true
//! auto_quantization = "avx2"
//!
//! [benchmark]
//! scenario = "forward"
//! warmup = 2
//! iterations = 20
//! batch_size = 4
//! sequence_length = 32
//!
//! [runtime]
//! providers = ["CUDAExecutionProvider"]
//! ```

pub mod inspect;
pub mod run;

use anyhow::{bail, Context};
use backends::onnxruntime::{ExecutionProvider, OrtBackend, OrtConfig};
use backends::openvino::{OvBackend, OvConfig};
use backends::{
    Backend, BackendConfig, BackendError, BackendKind, Device, Operation, Shapes,
    SyntheticDatasetGenerator, Task,
};
use sim_runtime::SimRuntime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Model selection shared by every subcommand.
#[derive(Debug, Default, clap::Args)]
pub struct TargetArgs {
    /// Model identifier or local directory.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Task the model is loaded for (e.g., "text-classification").
    #[arg(short, long)]
    pub task: Option<String>,

    /// Backend: onnxruntime or openvino.
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Device (e.g., "cpu", "cuda:0").
    #[arg(short, long)]
    pub device: Option<String>,

    /// Replace the real weights with a random stand-in.
    #[arg(long)]
    pub no_weights: bool,
}

/// A benchmark experiment: one backend, one timed scenario.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    pub backend: BackendSection,
    #[serde(default)]
    pub benchmark: BenchmarkSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// The `[backend]` table, tagged by `name`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "name")]
pub enum BackendSection {
    #[serde(rename = "onnxruntime")]
    OnnxRuntime(OrtConfig),
    #[serde(rename = "openvino")]
    OpenVino(OvConfig),
}

impl BackendSection {
    fn new(kind: BackendKind, base: BackendConfig) -> anyhow::Result<Self> {
        match kind {
            BackendKind::OnnxRuntime => Ok(BackendSection::OnnxRuntime(OrtConfig::new(base))),
            BackendKind::OpenVino => Ok(BackendSection::OpenVino(OvConfig::new(base))),
            other => bail!("'{other}' is not a benchmarkable backend"),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSection::OnnxRuntime(_) => BackendKind::OnnxRuntime,
            BackendSection::OpenVino(_) => BackendKind::OpenVino,
        }
    }

    pub fn base(&self) -> &BackendConfig {
        match self {
            BackendSection::OnnxRuntime(c) => &c.base,
            BackendSection::OpenVino(c) => &c.base,
        }
    }

    fn base_mut(&mut self) -> &mut BackendConfig {
        match self {
            BackendSection::OnnxRuntime(c) => &mut c.base,
            BackendSection::OpenVino(c) => &mut c.base,
        }
    }

    /// Optional stages this configuration enables, in pipeline order.
    pub fn planned_stages(&self) -> Vec<&'static str> {
        let mut stages = Vec::new();
        match self {
            BackendSection::OnnxRuntime(c) => {
                if c.is_optimized() {
                    stages.push("optimize");
                }
                if c.is_quantized() {
                    stages.push("quantize");
                }
                if c.is_calibrated() {
                    stages.push("calibrate");
                }
            }
            BackendSection::OpenVino(c) => {
                if c.quantization {
                    stages.push("quantize");
                }
                if c.calibration {
                    stages.push("calibrate");
                }
                if c.reshape {
                    stages.push("reshape");
                }
                if c.half {
                    stages.push("half");
                }
            }
        }
        stages
    }
}

/// The `[benchmark]` table.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkSection {
    pub scenario: Operation,
    pub warmup: usize,
    pub iterations: usize,
    pub batch_size: usize,
    pub sequence_length: usize,
    /// Tokens per `generate` call; `prefill` always produces one.
    pub new_tokens: usize,
    pub num_inference_steps: Option<usize>,
    /// Further input dimensions (e.g., `num_choices`, `height`).
    pub input_shapes: Shapes,
    pub json: Option<PathBuf>,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            scenario: Operation::Forward,
            warmup: 2,
            iterations: 10,
            batch_size: 1,
            sequence_length: 16,
            new_tokens: 8,
            num_inference_steps: None,
            input_shapes: Shapes::new(),
            json: None,
        }
    }
}

impl BenchmarkSection {
    /// Input dimensions handed to input generation and to
    /// `prepare_for_inference`.
    pub fn shapes(&self) -> Shapes {
        let mut shapes = self.input_shapes.clone();
        shapes.insert("batch_size".into(), self.batch_size);
        shapes.insert("sequence_length".into(), self.sequence_length);
        shapes
    }
}

/// The `[runtime]` table: what the in-process runtime pretends to offer.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// Execution providers available besides the CPU provider.
    pub providers: Vec<String>,
    pub seed: u64,
}

impl RuntimeSection {
    pub fn build(&self) -> anyhow::Result<SimRuntime> {
        let providers = self
            .providers
            .iter()
            .map(|p| p.parse::<ExecutionProvider>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SimRuntime::new().with_providers(providers).with_seed(self.seed))
    }
}

impl Experiment {
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("invalid experiment file")
    }

    /// Loads the experiment file when given, otherwise builds one from the
    /// target arguments; target arguments override file values.
    pub fn resolve(config: Option<&Path>, target: &TargetArgs) -> anyhow::Result<Self> {
        let mut experiment = match config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read experiment '{}'", path.display()))?;
                Self::from_toml(&content)?
            }
            None => {
                let (Some(model), Some(task)) = (&target.model, &target.task) else {
                    bail!("either --config or both --model and --task are required");
                };
                let base = BackendConfig::new(model.clone(), task.parse::<Task>()?);
                let kind = parse_backend(target.backend.as_deref().unwrap_or("onnxruntime"))?;
                Self {
                    backend: BackendSection::new(kind, base)?,
                    benchmark: BenchmarkSection::default(),
                    runtime: RuntimeSection::default(),
                }
            }
        };

        if let Some(name) = &target.backend {
            let kind = parse_backend(name)?;
            if kind != experiment.backend.kind() {
                bail!(
                    "--backend {kind} conflicts with the experiment's {} backend",
                    experiment.backend.kind()
                );
            }
        }
        let base = experiment.backend.base_mut();
        if let Some(model) = &target.model {
            base.model = model.clone();
        }
        if let Some(task) = &target.task {
            base.task = task.parse()?;
        }
        if let Some(device) = &target.device {
            base.device = device.parse::<Device>()?;
        }
        if target.no_weights {
            base.no_weights = true;
        }
        Ok(experiment)
    }

    /// Runs the full preparation pipeline.
    pub fn build_backend(&self, runtime: Arc<SimRuntime>) -> Result<Box<dyn Backend>, BackendError> {
        let datasets = Arc::new(SyntheticDatasetGenerator::new(self.backend.base().seed));
        Ok(match &self.backend {
            BackendSection::OnnxRuntime(config) => {
                Box::new(OrtBackend::new(config.clone(), runtime, datasets)?)
            }
            BackendSection::OpenVino(config) => {
                Box::new(OvBackend::new(config.clone(), runtime, datasets)?)
            }
        })
    }
}

fn parse_backend(name: &str) -> anyhow::Result<BackendKind> {
    match name {
        "onnxruntime" => Ok(BackendKind::OnnxRuntime),
        "openvino" => Ok(BackendKind::OpenVino),
        other => bail!("unknown backend '{other}'; expected 'onnxruntime' or 'openvino'"),
    }
}
