// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `optibench inspect` command: what a run would do, without doing it.
//!
//! Resolves the loader class for the configured task and backend, reads the
//! model shapes from the hub and lists the optional stages the
//! configuration enables. Nothing is exported or loaded.

use super::{Experiment, TargetArgs};
use anyhow::Context;
use backends::{resolve_model_class, PretrainedArtifacts};
use std::path::Path;

pub fn execute(config: Option<&Path>, target: TargetArgs) -> anyhow::Result<()> {
    let experiment = Experiment::resolve(config, &target)?;
    let base = experiment.backend.base();

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              optibench · Model Inspector            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let class = resolve_model_class(base.task, experiment.backend.kind())?;
    let runtime = experiment.runtime.build()?;
    let artifacts = PretrainedArtifacts::fetch(&runtime, base)
        .with_context(|| format!("failed to resolve model '{}'", base.model))?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Model:   {}", base.model);
    println!("  Task:    {} ({})", base.task, base.library());
    println!("  Backend: {}", experiment.backend.kind());
    println!("  Loader:  {class}{}", if class.is_pipeline() { " (pipeline)" } else { "" });
    println!("  Config:  {}", if artifacts.config.is_some() { "found" } else { "none" });
    println!(
        "  Processor: {}",
        artifacts
            .processor
            .as_ref()
            .map_or("none".to_string(), |p| format!("{:?}", p.kind)),
    );
    println!();

    // ── Shapes ─────────────────────────────────────────────────
    println!("  {:<28} {:>10}", "Model shape", "Value");
    println!("  {}", "-".repeat(40));
    for (name, value) in &artifacts.model_shapes {
        println!("  {name:<28} {value:>10}");
    }
    println!();

    // ── Stages ─────────────────────────────────────────────────
    let optional = experiment.backend.planned_stages();
    let mut stages = vec![if base.no_weights { "materialize (random weights)" } else { "materialize" }];
    stages.extend(optional);
    stages.extend(["reload", "validate provider"]);
    println!("  Planned stages:");
    for (i, stage) in stages.iter().enumerate() {
        println!("   {}. {stage}", i + 1);
    }
    println!();
    Ok(())
}
