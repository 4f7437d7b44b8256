#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a skirmish encounter headlessly.

mod simulation;

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use skirmish_core::{EncounterConfig, SpawnerConfig, Vec3, WaveConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs an encounter against a simulated battlefield and prints a summary.
#[derive(Debug, Parser)]
#[command(name = "skirmish", version)]
struct Cli {
    /// Encounter description in TOML. A small built-in encounter is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of simulation ticks.
    #[arg(long, default_value_t = 6_000)]
    ticks: u32,

    /// Length of a tick in milliseconds.
    #[arg(long = "dt-ms", default_value_t = 100)]
    dt_ms: u64,

    /// Overrides the encounter's random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Logs at debug level regardless of RUST_LOG.
    #[arg(long)]
    verbose: bool,
}

/// Entry point for the skirmish command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    ensure!(cli.dt_ms > 0, "--dt-ms must be positive");

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.rng_seed = seed;
    }
    info!(
        waves = config.waves.len(),
        fodder = config.fodder.is_some(),
        seed = config.rng_seed,
        "starting encounter"
    );

    let options = simulation::Options {
        ticks: cli.ticks,
        dt: Duration::from_millis(cli.dt_ms),
        seed: config.rng_seed,
    };
    let summary = simulation::run(config, &options);
    println!("{summary}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EncounterConfig> {
    let Some(path) = path else {
        return Ok(demo_encounter());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read encounter {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse encounter {}", path.display()))
}

fn demo_encounter() -> EncounterConfig {
    let ring = |radius: f32, count: usize| SpawnerConfig {
        positions: (0..count)
            .map(|slot| {
                let angle = slot as f32 / count as f32 * std::f32::consts::TAU;
                Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0)
            })
            .collect(),
    };

    EncounterConfig {
        grid_half_size: 1500.0,
        point_spacing: 250.0,
        teardown_delay_secs: 5.0,
        waves: vec![
            WaveConfig {
                threshold_to_advance: 2,
                spawners: vec![ring(1400.0, 4)],
            },
            WaveConfig {
                threshold_to_advance: 0,
                spawners: vec![ring(1400.0, 3), ring(900.0, 2)],
            },
        ],
        fodder: Some(WaveConfig {
            threshold_to_advance: 0,
            spawners: vec![ring(1200.0, 2)],
        }),
        ..EncounterConfig::default()
    }
}
