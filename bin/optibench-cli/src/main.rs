// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # optibench
//!
//! Command-line interface for the model-preparation pipeline.
//!
//! ## Usage
//! ```bash
//! # Prepare a backend from an experiment file and time 20 forward passes
//! optibench --config experiments/bert-avx2.toml run --iterations 20
//!
//! # Quick run without an experiment file
//! optibench run --model ./models/tiny-bert --task fill-mask --no-weights
//!
//! # Show the loader class, model shapes and planned stages
//! optibench inspect --model gpt2 --task text-generation --backend openvino
//! ```

mod commands;
mod metrics;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "optibench",
    about = "Prepare models for ONNX Runtime and OpenVINO style backends and benchmark inference",
    version,
    author
)]
struct Cli {
    /// Path to a TOML experiment file (CLI arguments override its values).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a backend and time inference over a scenario.
    Run {
        #[command(flatten)]
        target: commands::TargetArgs,

        /// Scenario to time: forward, prefill, generate or call.
        #[arg(short, long)]
        scenario: Option<String>,

        /// Untimed iterations before measuring.
        #[arg(long)]
        warmup: Option<usize>,

        /// Timed iterations.
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Write the report as JSON to this path.
        #[arg(long)]
        json: Option<std::path::PathBuf>,
    },

    /// Resolve a model without preparing it: loader class, shapes, stages.
    Inspect {
        #[command(flatten)]
        target: commands::TargetArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            target,
            scenario,
            warmup,
            iterations,
            json,
        } => {
            let overrides = commands::run::Overrides {
                scenario,
                warmup,
                iterations,
                json,
            };
            commands::run::execute(cli.config.as_deref(), target, overrides)
        }
        Commands::Inspect { target } => commands::inspect::execute(cli.config.as_deref(), target),
    }
}
