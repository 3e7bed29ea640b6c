// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `optibench run` command: prepare a backend and time one scenario.
//!
//! ```text
//! Experiment → build_backend (Created … Ready) → prepare_for_inference
//!            → warm-up → timed loop → report → clean
//! ```

use super::{Experiment, TargetArgs};
use crate::metrics::{LatencyReport, LatencyTracker};
use anyhow::Context;
use backends::{InputGenerator, Kwargs, Operation, PretrainedArtifacts};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Command-line values that replace `[benchmark]` entries.
#[derive(Debug, Default)]
pub struct Overrides {
    pub scenario: Option<String>,
    pub warmup: Option<usize>,
    pub iterations: Option<usize>,
    pub json: Option<PathBuf>,
}

/// What `--json` writes.
#[derive(Debug, serde::Serialize)]
struct RunReport {
    backend: String,
    model: String,
    task: String,
    device: String,
    model_class: String,
    scenario: Operation,
    states: Vec<String>,
    input_shapes: backends::Shapes,
    latency: LatencyReport,
}

pub fn execute(config: Option<&Path>, target: TargetArgs, overrides: Overrides) -> anyhow::Result<()> {
    let mut experiment = Experiment::resolve(config, &target)?;
    apply(&mut experiment, overrides)?;
    let bench = &experiment.benchmark;
    let base = experiment.backend.base();

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              optibench · Benchmark Run              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Config:");
    println!("   Backend:  {}", experiment.backend.kind());
    println!("   Model:    {}", base.model);
    println!("   Task:     {}", base.task);
    println!("   Device:   {}", base.device);
    println!("   Scenario: {} ({} warm-up, {} timed)", bench.scenario, bench.warmup, bench.iterations);
    println!();

    // ── Preparation ───────────────────────────────────────────
    println!("  [1/3] Preparing backend...");
    let runtime = Arc::new(experiment.runtime.build()?);
    let artifacts = PretrainedArtifacts::fetch(runtime.as_ref(), base)
        .context("model lookup failed")?;
    let started = Instant::now();
    let mut backend = experiment
        .build_backend(runtime)
        .context("backend preparation failed")?;
    let states: Vec<String> = backend.history().iter().map(ToString::to_string).collect();
    println!(
        "        {} ready in {:.2}ms ({})",
        backend.model_class(),
        started.elapsed().as_secs_f64() * 1000.0,
        states.join(" → "),
    );
    println!();

    // ── Inputs ────────────────────────────────────────────────
    println!("  [2/3] Generating inputs...");
    let input_shapes = bench.shapes();
    backend.prepare_for_inference(&input_shapes)?;
    let raw = InputGenerator::new(base.task, &input_shapes, &artifacts.model_shapes, base.seed).generate()?;
    let inputs = backend.prepare_inputs(raw)?;
    println!("        Inputs: {}", describe(&inputs));
    println!();

    // ── Timed loop ────────────────────────────────────────────
    println!("  [3/3] Running {}...", bench.scenario);
    let kwargs = scenario_kwargs(bench.scenario, bench);
    if bench.iterations == 0 {
        tracing::warn!("no timed iterations requested; the latency report will be empty");
    }
    tracing::debug!(warmup = bench.warmup, ?kwargs, "warming up {}", bench.scenario);
    for _ in 0..bench.warmup {
        backend.run(bench.scenario, &inputs, &kwargs)?;
    }
    let mut tracker = LatencyTracker::new();
    for _ in 0..bench.iterations {
        let t0 = Instant::now();
        backend.run(bench.scenario, &inputs, &kwargs)?;
        tracker.record(t0.elapsed());
    }
    let (units, unit) = units_per_call(bench.scenario, bench.batch_size, bench.new_tokens);
    let latency = tracker.report(units);
    println!();
    println!("  Results:");
    println!("   {}", latency.summary(unit));
    println!();

    if let Some(path) = &bench.json {
        let report = RunReport {
            backend: experiment.backend.kind().to_string(),
            model: base.model.clone(),
            task: base.task.to_string(),
            device: base.device.to_string(),
            model_class: backend.model_class().to_string(),
            scenario: bench.scenario,
            states,
            input_shapes,
            latency,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("cannot write '{}'", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
        println!("  Report written to {}", path.display());
        println!();
    }

    backend.clean();
    Ok(())
}

fn apply(experiment: &mut Experiment, overrides: Overrides) -> anyhow::Result<()> {
    let bench = &mut experiment.benchmark;
    if let Some(scenario) = overrides.scenario {
        bench.scenario = serde_json::from_value(json!(scenario))
            .with_context(|| format!("unknown scenario '{scenario}'"))?;
    }
    if let Some(warmup) = overrides.warmup {
        bench.warmup = warmup;
    }
    if let Some(iterations) = overrides.iterations {
        bench.iterations = iterations;
    }
    if overrides.json.is_some() {
        bench.json = overrides.json;
    }
    Ok(())
}

fn scenario_kwargs(scenario: Operation, bench: &super::BenchmarkSection) -> Kwargs {
    let mut kwargs = Kwargs::new();
    match scenario {
        Operation::Forward => {}
        Operation::Prefill => {
            kwargs.insert("max_new_tokens".into(), json!(1));
            kwargs.insert("min_new_tokens".into(), json!(1));
        }
        Operation::Generate => {
            kwargs.insert("max_new_tokens".into(), json!(bench.new_tokens));
            kwargs.insert("min_new_tokens".into(), json!(bench.new_tokens));
        }
        Operation::Call => {
            if let Some(steps) = bench.num_inference_steps {
                kwargs.insert("num_inference_steps".into(), json!(steps));
            }
        }
    }
    kwargs
}

fn units_per_call(scenario: Operation, batch_size: usize, new_tokens: usize) -> (usize, &'static str) {
    match scenario {
        Operation::Forward | Operation::Call => (batch_size, "samples"),
        Operation::Prefill => (batch_size, "tokens"),
        Operation::Generate => (batch_size * new_tokens, "tokens"),
    }
}

fn describe(inputs: &backends::ModelInputs) -> String {
    inputs
        .iter()
        .map(|(name, value)| match value.as_tensor() {
            Some(t) => format!("{name}{:?}", t.shape().dims()),
            None => format!("{name}(text)"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
