//! Headless simulation runner.
//!
//! Runs the enemy simulation for a fixed number of ticks and prints the
//! summary as JSON on stdout. Logs go to stderr; set `RUST_LOG` to adjust.
//!
//! Run with: `cargo run -p stria-sim -- --ticks 600 --seed 7`

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stria_sim::prelude::*;

/// Headless enemy simulation on the Stria ECS
#[derive(Parser, Debug)]
#[command(name = "stria-sim")]
struct Args {
    /// JSON config file; missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks to run (overrides the config file)
    #[arg(long)]
    ticks: Option<u64>,

    /// Seed for the spawner (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Enemies present at start (overrides the config file)
    #[arg(long)]
    enemies: Option<u32>,

    /// Pretty-print the summary
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(enemies) = args.enemies {
        config.initial_enemies = enemies;
    }

    let mut sim = Simulation::new(config).context("invalid simulation config")?;
    let summary = sim.run();

    let json = if args.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{json}");
    Ok(())
}
