//! Headless shell around [`ecoguardian_core::Simulation`]: runs a tick budget,
//! injects scheduled ignitions and collects a JSON-friendly report.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use ecoguardian_core::{
    CellState, ControlCommand, FEATURE_COUNT, GenerationRecord, Genome, GroundStatus, RunTotals,
    Simulation, WorldSnapshot, apply_control_command,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Knobs for a headless run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessOptions {
    pub ticks: u64,
    /// Inject a random ignition every N ticks; 0 disables it.
    pub ignite_every: u64,
    /// Record a frame every N ticks.
    pub frame_interval: u64,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            ticks: 2_000,
            ignite_every: 0,
            frame_interval: 100,
        }
    }
}

/// Run the simulation and return the collected report.
pub fn run_headless(sim: &mut Simulation, options: HeadlessOptions) -> HeadlessReport {
    let mut report = HeadlessReport::new(&sim.snapshot());
    let interval = options.frame_interval.max(1);

    for step in 1..=options.ticks {
        if options.ignite_every > 0 && step % options.ignite_every == 0 {
            apply_control_command(sim, ControlCommand::IgniteRandom);
        }
        let events = sim.step();
        if events.generation_rolled {
            debug!(tick = events.tick.0, "generation rolled");
        }
        if step % interval == 0 || step == options.ticks {
            report.record(&sim.snapshot());
        }
    }

    report.finalize(sim);
    info!(
        ticks = report.summary.ticks_simulated,
        extinguished = report.summary.totals.extinguished,
        stranded = report.summary.totals.stranded,
        generation = report.summary.final_generation,
        "headless run completed"
    );
    report
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessReport {
    pub initial: FrameStats,
    pub frames: Vec<FrameStats>,
    pub summary: ReportSummary,
}

impl HeadlessReport {
    fn new(initial: &WorldSnapshot) -> Self {
        Self {
            initial: FrameStats::from_snapshot(initial),
            frames: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    fn record(&mut self, snapshot: &WorldSnapshot) {
        self.frames.push(FrameStats::from_snapshot(snapshot));
    }

    fn finalize(&mut self, sim: &Simulation) {
        self.summary = ReportSummary::from_frames(&self.initial, &self.frames, sim);
    }

    /// Write the report as pretty JSON, creating parent directories on demand.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize headless report")?;
        Ok(())
    }
}

/// Per-frame fleet and fire statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameStats {
    pub tick: u64,
    pub fires: usize,
    pub burnt: usize,
    pub extinguished_cells: usize,
    pub discovered: usize,
    pub idle: usize,
    pub moving: usize,
    pub returning: usize,
    pub stranded: usize,
    pub avg_battery: f32,
    pub avg_water: f32,
    pub generation: u32,
    pub genome_index: usize,
}

impl FrameStats {
    fn from_snapshot(snapshot: &WorldSnapshot) -> Self {
        let count_cells =
            |state: CellState| snapshot.cells.iter().filter(|cell| **cell == state).count();
        let count_status = |status: GroundStatus| {
            snapshot
                .ground
                .iter()
                .filter(|agent| agent.status == status)
                .count()
        };
        let fleet = snapshot.ground.len().max(1) as f32;
        Self {
            tick: snapshot.tick.0,
            fires: snapshot.fires,
            burnt: count_cells(CellState::Burnt),
            extinguished_cells: count_cells(CellState::Extinguished),
            discovered: snapshot.discovered.len(),
            idle: count_status(GroundStatus::Idle),
            moving: count_status(GroundStatus::Moving),
            returning: count_status(GroundStatus::Returning),
            stranded: count_status(GroundStatus::Stranded),
            avg_battery: snapshot.ground.iter().map(|a| a.battery as f32).sum::<f32>() / fleet,
            avg_water: snapshot.ground.iter().map(|a| a.water as f32).sum::<f32>() / fleet,
            generation: snapshot.generation,
            genome_index: snapshot.genome_index,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub frame_count: usize,
    pub ticks_simulated: u64,
    pub final_tick: u64,
    pub peak_fires: usize,
    pub fires_mean: f32,
    pub final_generation: u32,
    pub active_genome: Option<Genome>,
    pub generations: Vec<GenerationRecord>,
    pub predictor_weights: [f32; FEATURE_COUNT],
    pub predictor_updates: u64,
    pub totals: RunTotals,
}

impl ReportSummary {
    fn from_frames(initial: &FrameStats, frames: &[FrameStats], sim: &Simulation) -> Self {
        let final_tick = frames.last().map_or(initial.tick, |frame| frame.tick);
        let peak_fires = frames
            .iter()
            .map(|frame| frame.fires)
            .fold(initial.fires, usize::max);
        let fires_mean = if frames.is_empty() {
            initial.fires as f32
        } else {
            frames.iter().map(|frame| frame.fires as f32).sum::<f32>() / frames.len() as f32
        };
        let optimizer = sim.optimizer();

        Self {
            frame_count: frames.len(),
            ticks_simulated: final_tick.saturating_sub(initial.tick),
            final_tick,
            peak_fires,
            fires_mean,
            final_generation: optimizer.generation(),
            active_genome: Some(*optimizer.active()),
            generations: optimizer.history().to_vec(),
            predictor_weights: *sim.predictor().weights(),
            predictor_updates: sim.predictor().updates(),
            totals: sim.totals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoguardian_core::GuardianConfig;

    fn small_sim() -> Simulation {
        let config = GuardianConfig {
            rng_seed: Some(11),
            initial_fires: 2,
            ..GuardianConfig::default()
        };
        Simulation::new(config).expect("simulation")
    }

    #[test]
    fn frames_follow_interval_and_final_tick() {
        let mut sim = small_sim();
        let options = HeadlessOptions {
            ticks: 250,
            ignite_every: 0,
            frame_interval: 100,
        };
        let report = run_headless(&mut sim, options);
        let ticks: Vec<u64> = report.frames.iter().map(|frame| frame.tick).collect();
        assert_eq!(ticks, vec![100, 200, 250]);
        assert_eq!(report.initial.tick, 0);
        assert_eq!(report.summary.ticks_simulated, 250);
        assert_eq!(report.summary.frame_count, 3);
    }

    #[test]
    fn scheduled_ignitions_are_counted() {
        let mut sim = small_sim();
        let before = sim.totals().ignitions;
        let options = HeadlessOptions {
            ticks: 50,
            ignite_every: 10,
            frame_interval: 25,
        };
        let report = run_headless(&mut sim, options);
        assert!(report.summary.totals.ignitions >= before + 5);
    }

    #[test]
    fn zero_tick_run_summarises_initial_frame() {
        let mut sim = small_sim();
        let report = run_headless(
            &mut sim,
            HeadlessOptions {
                ticks: 0,
                ..HeadlessOptions::default()
            },
        );
        assert!(report.frames.is_empty());
        assert_eq!(report.summary.final_tick, 0);
        assert_eq!(report.summary.peak_fires, report.initial.fires);
    }
}
