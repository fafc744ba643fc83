use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ecoguardian_app::{HeadlessOptions, run_headless};
use ecoguardian_core::{GuardianConfig, Simulation};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "ecoguardian",
    version,
    about = "Run the EcoGuardian wildfire fleet simulation headlessly"
)]
struct Cli {
    /// JSON configuration file; missing fields fall back to defaults.
    #[arg(long, env = "ECOGUARDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the RNG seed from the configuration.
    #[arg(long, env = "ECOGUARDIAN_SEED")]
    seed: Option<u64>,

    /// Number of ticks to simulate.
    #[arg(long, env = "ECOGUARDIAN_TICKS", default_value_t = 2_000)]
    ticks: u64,

    /// Light a random fuel cell every N ticks (0 disables).
    #[arg(long, env = "ECOGUARDIAN_IGNITE_EVERY", default_value_t = 0)]
    ignite_every: u64,

    /// Record a report frame every N ticks.
    #[arg(long, env = "ECOGUARDIAN_FRAME_INTERVAL", default_value_t = 100)]
    frame_interval: u64,

    /// Where to write the JSON report.
    #[arg(long, env = "ECOGUARDIAN_REPORT")]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardianConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }

    let mut sim = Simulation::new(config).context("failed to build simulation")?;
    info!(
        width = sim.grid().width(),
        height = sim.grid().height(),
        ground = sim.ground_agents().len(),
        scouts = sim.scouts().len(),
        rescuers = sim.rescuers().len(),
        ticks = cli.ticks,
        "Starting EcoGuardian headless run"
    );

    let report = run_headless(
        &mut sim,
        HeadlessOptions {
            ticks: cli.ticks,
            ignite_every: cli.ignite_every,
            frame_interval: cli.frame_interval,
        },
    );

    if let Some(path) = &cli.report {
        report.write_json(path)?;
        info!(path = %path.display(), "Wrote headless report");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: &Path) -> Result<GuardianConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}
