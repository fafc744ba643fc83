//! The staged tick pipeline tying the grid, the fleet, dispatch and learning together.
//!
//! Each [`Simulation::step`] runs fire dynamics, scanning, dispatch, ground and rescue
//! moves, fitness bookkeeping and genome windows, in that order.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, info, warn};

use crate::agents::{GroundAgent, GroundId, GroundStatus, RescueAgent, Scout, StepContext};
use crate::dispatch::{Assignment, AuctionContext, Dispatcher};
use crate::grid::{CellState, Grid, WindDirection};
use crate::optimizer::{GenerationRecord, Genome, Optimizer};
use crate::predictor::{FEATURE_COUNT, Outcome, Predictor};
use crate::{GridPos, GuardianConfig, Tick, WorldError};

/// External commands accepted by the simulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlCommand {
    /// Set a random fuel cell alight.
    IgniteRandom,
    /// Rebuild the map and send every unit back to its spawn cell.
    Reset,
}

/// Apply a control command to the simulation.
pub fn apply_control_command(sim: &mut Simulation, command: ControlCommand) {
    match command {
        ControlCommand::IgniteRandom => {
            if sim.ignite_random().is_none() {
                debug!("ignite requested but no fuel remains");
            }
        }
        ControlCommand::Reset => {
            if let Err(err) = sim.reset() {
                warn!(%err, "reset failed; keeping current episode");
            }
        }
    }
}

/// Events emitted after processing a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    pub ignited: usize,
    pub burnt_out: usize,
    pub spontaneous: Vec<GridPos>,
    /// Fires added to the discovery set this tick.
    pub discovered: usize,
    pub assignments: Vec<Assignment>,
    pub extinguished: usize,
    pub stranded: usize,
    pub rescued: usize,
    pub crowded: bool,
    pub idle_frame: bool,
    /// The active genome's evaluation window ended.
    pub window_closed: bool,
    pub generation_rolled: bool,
}

/// Counters accumulated over the whole run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunTotals {
    pub ignitions: u64,
    pub spontaneous: u64,
    pub assignments: u64,
    pub fallback_assignments: u64,
    pub extinguished: u64,
    pub successes: u64,
    pub failures: u64,
    pub stranded: u64,
    pub rescued: u64,
    pub resets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundSnapshot {
    pub label: u32,
    pub position: GridPos,
    pub status: GroundStatus,
    pub battery: u32,
    pub water: u32,
    pub target: Option<GridPos>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoutSnapshot {
    pub label: u32,
    pub position: GridPos,
    pub target: Option<GridPos>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescueSnapshot {
    pub label: u32,
    pub position: GridPos,
    /// Label of the stranded agent being approached.
    pub target: Option<u32>,
}

/// Read-only view of the simulation for renderers and reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub width: u32,
    pub height: u32,
    pub wind: WindDirection,
    /// Row-major cell states.
    pub cells: Vec<CellState>,
    pub fires: usize,
    pub ground: Vec<GroundSnapshot>,
    pub scouts: Vec<ScoutSnapshot>,
    pub rescuers: Vec<RescueSnapshot>,
    pub discovered: Vec<GridPos>,
    pub predictor_weights: [f32; FEATURE_COUNT],
    pub predictor_updates: u64,
    pub generation: u32,
    pub genome_index: usize,
    pub active_genome: Genome,
    pub generations: Vec<GenerationRecord>,
    pub totals: RunTotals,
    pub log: Vec<String>,
}

/// Wildfire episode: grid, fleet, dispatcher and the learning components.
pub struct Simulation {
    config: GuardianConfig,
    tick: Tick,
    rng: SmallRng,
    grid: Grid,
    template: Option<Grid>,
    grounds: SlotMap<GroundId, GroundAgent>,
    scouts: Vec<Scout>,
    rescuers: Vec<RescueAgent>,
    dispatcher: Dispatcher,
    predictor: Predictor,
    optimizer: Optimizer,
    discovered: BTreeSet<GridPos>,
    window_elapsed: u32,
    totals: RunTotals,
    log: VecDeque<String>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("ground_agents", &self.grounds.len())
            .field("scouts", &self.scouts.len())
            .field("rescuers", &self.rescuers.len())
            .field("discovered", &self.discovered.len())
            .field("generation", &self.optimizer.generation())
            .finish()
    }
}

impl Simulation {
    /// Generate a fresh episode from the configuration and light the initial fires.
    pub fn new(config: GuardianConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let grid = Grid::generate(&config, &mut rng)?;
        let mut sim = Self::assemble(config, rng, grid, None);
        for _ in 0..sim.config.initial_fires {
            sim.ignite_random();
        }
        Ok(sim)
    }

    /// Run on a hand-built map. Resets restore this map instead of generating one.
    pub fn with_grid(config: GuardianConfig, grid: Grid) -> Result<Self, WorldError> {
        config.validate()?;
        if grid.width() != config.grid_width || grid.height() != config.grid_height {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must match the configuration",
            ));
        }
        let rng = config.seeded_rng();
        let template = grid.clone();
        Ok(Self::assemble(config, rng, grid, Some(template)))
    }

    fn assemble(
        config: GuardianConfig,
        mut rng: SmallRng,
        mut grid: Grid,
        template: Option<Grid>,
    ) -> Self {
        Self::clear_spawns(&config, &mut grid);
        let fleet = &config.fleet;
        let mut grounds = SlotMap::with_key();
        for (label, spawn) in (0_u32..).zip(&fleet.ground_spawns) {
            grounds.insert(GroundAgent::new(label, *spawn, fleet));
        }
        let scouts = (0_u32..)
            .zip(&fleet.scout_spawns)
            .map(|(label, spawn)| Scout::new(label, *spawn, fleet.scout_scan_radius))
            .collect();
        let rescuers = (0_u32..)
            .zip(&fleet.rescue_spawns)
            .map(|(label, spawn)| RescueAgent::new(label, *spawn))
            .collect();
        let optimizer = Optimizer::new(config.evolution.clone(), &mut rng);
        let log_capacity = config.log_capacity;
        info!(
            ground = fleet.ground_spawns.len(),
            scouts = fleet.scout_spawns.len(),
            rescuers = fleet.rescue_spawns.len(),
            "fleet deployed"
        );
        Self {
            dispatcher: Dispatcher::new(config.dispatch.clone()),
            predictor: Predictor::new(config.learning.learning_rate),
            config,
            tick: Tick::zero(),
            rng,
            grid,
            template,
            grounds,
            scouts,
            rescuers,
            optimizer,
            discovered: BTreeSet::new(),
            window_elapsed: 0,
            totals: RunTotals::default(),
            log: VecDeque::with_capacity(log_capacity),
        }
    }

    /// Ground and rescue units must not start inside a wall.
    fn clear_spawns(config: &GuardianConfig, grid: &mut Grid) {
        let fleet = &config.fleet;
        for spawn in fleet.ground_spawns.iter().chain(&fleet.rescue_spawns) {
            if grid.get(*spawn) == CellState::Wall {
                grid.set(*spawn, CellState::Empty);
            }
        }
    }

    fn push_log(&mut self, tick: Tick, message: String) {
        if self.log.len() >= self.config.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(format!("[{:>6}] {message}", tick.0));
    }

    fn stage_fire(&mut self, tick: Tick, events: &mut TickEvents) {
        let report = self.grid.advance(&mut self.rng);
        events.ignited = report.ignited;
        events.burnt_out = report.burnt_out;
        for pos in &report.spontaneous {
            self.totals.spontaneous += 1;
            self.push_log(tick, format!("spontaneous ignition at {pos}"));
        }
        events.spontaneous = report.spontaneous;
    }

    fn stage_scan(&mut self, tick: Tick, events: &mut TickEvents) {
        let mut found = Vec::new();
        for scout in &mut self.scouts {
            scout.step(&self.grid, &self.config.fleet, tick, &mut self.rng);
            found.extend(scout.scan(&mut self.grid, tick));
        }
        let radius = self.config.fleet.sensor_radius;
        for agent in self.grounds.values() {
            if agent.status() != GroundStatus::Stranded {
                found.extend(agent.sense(&self.grid, radius));
            }
        }
        for fire in found {
            if self.discovered.insert(fire) {
                events.discovered += 1;
            }
        }
        let grid = &self.grid;
        self.discovered
            .retain(|pos| grid.get(*pos) == CellState::Fire);
    }

    fn stage_dispatch(&mut self, tick: Tick, events: &mut TickEvents) {
        if !self.dispatcher.is_due(tick) || self.discovered.is_empty() {
            return;
        }
        let ctx = AuctionContext {
            grid: &self.grid,
            predictor: &self.predictor,
            fires: &self.discovered,
            genome: self.optimizer.active(),
            fleet: &self.config.fleet,
            tick,
        };
        let assignments = self.dispatcher.run_cycle(&mut self.grounds, &ctx);
        for assignment in &assignments {
            self.totals.assignments += 1;
            if assignment.fallback {
                self.totals.fallback_assignments += 1;
            }
            let label = self
                .grounds
                .get(assignment.agent)
                .map_or(u32::MAX, GroundAgent::label);
            let marker = if assignment.fallback { " (fallback)" } else { "" };
            self.push_log(
                tick,
                format!(
                    "ground {label} assigned to fire at {} (cost {:.1}){marker}",
                    assignment.fire, assignment.cost
                ),
            );
        }
        events.assignments = assignments;
    }

    fn teammate_claims(&self, id: GroundId) -> Vec<GridPos> {
        self.grounds
            .iter()
            .filter(|(other, _)| *other != id)
            .flat_map(|(_, agent)| std::iter::once(agent.position()).chain(agent.target()))
            .collect()
    }

    fn stage_ground(&mut self, tick: Tick, events: &mut TickEvents) {
        let ids: Vec<GroundId> = self.grounds.keys().collect();
        let crowd_radius = self.optimizer.active().crowd_radius;
        for id in ids {
            let claimed = self.teammate_claims(id);
            let Some(agent) = self.grounds.get_mut(id) else {
                continue;
            };
            let mut ctx = StepContext {
                grid: &mut self.grid,
                predictor: &mut self.predictor,
                rng: &mut self.rng,
                fleet: &self.config.fleet,
                crowd_radius,
                claimed: &claimed,
            };
            let report = agent.step(&mut ctx);
            let label = agent.label();
            let position = agent.position();

            for (cell, neighbours) in &report.extinguished {
                self.optimizer.record_extinguished(*neighbours);
                self.discovered.remove(cell);
            }
            events.extinguished += report.extinguished.len();
            self.totals.extinguished += report.extinguished.len() as u64;
            match report.outcome {
                Some(Outcome::Success) => self.totals.successes += 1,
                Some(Outcome::Failure) => {
                    self.totals.failures += 1;
                    self.push_log(tick, format!("ground {label} abandoned its task"));
                }
                None => {}
            }
            if report.stranded {
                events.stranded += 1;
                self.totals.stranded += 1;
                self.optimizer.record_stranded();
                self.push_log(tick, format!("ground {label} stranded at {position}"));
            }
            if report.returning {
                self.push_log(tick, format!("ground {label} returning to depot"));
            }
            if report.refilled {
                self.push_log(tick, format!("ground {label} refilled at {position}"));
            }
            if let Some(fire) = report.chained {
                self.push_log(tick, format!("ground {label} chained to fire at {fire}"));
            }
        }
    }

    fn stage_rescue(&mut self, tick: Tick, events: &mut TickEvents) {
        let charge = self.config.fleet.rescue_charge;
        for index in 0..self.rescuers.len() {
            let taken: Vec<GroundId> = self
                .rescuers
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .filter_map(|(_, rescuer)| rescuer.target())
                .collect();
            let restored =
                self.rescuers[index].step(&self.grid, &mut self.grounds, &taken, charge);
            if let Some(id) = restored {
                events.rescued += 1;
                self.totals.rescued += 1;
                let rescuer = self.rescuers[index].label();
                let label = self.grounds.get(id).map_or(u32::MAX, GroundAgent::label);
                self.push_log(tick, format!("rescue {rescuer} recharged ground {label}"));
            }
        }
    }

    fn stage_fitness(&mut self, events: &mut TickEvents) {
        let radius = self.optimizer.active().crowd_radius;
        let busy: Vec<GridPos> = self
            .grounds
            .values()
            .filter(|agent| agent.is_busy())
            .map(GroundAgent::position)
            .collect();
        events.crowded = busy.iter().enumerate().any(|(i, a)| {
            busy[i + 1..]
                .iter()
                .any(|b| a.manhattan(*b) <= radius)
        });
        let fleet = &self.config.fleet;
        events.idle_frame = !self.discovered.is_empty()
            && self.grounds.values().any(|agent| agent.is_available(fleet));
        if events.crowded {
            self.optimizer.record_crowded_frame();
        }
        if events.idle_frame {
            self.optimizer.record_idle_frame();
        }
    }

    fn stage_evolution(&mut self, tick: Tick, events: &mut TickEvents) {
        self.window_elapsed += 1;
        if self.window_elapsed < self.optimizer.window_ticks() {
            return;
        }
        self.window_elapsed = 0;
        events.window_closed = true;
        events.generation_rolled = self.optimizer.advance_window(&mut self.rng);
        if self.config.learning.reset_per_window {
            self.predictor.reset();
        }
        if events.generation_rolled {
            if let Some(best) = self.optimizer.history().last().copied() {
                self.push_log(
                    tick,
                    format!(
                        "generation {} best: penalty {:.0}, radius {}, fitness {:.1}",
                        best.generation, best.crowd_penalty, best.crowd_radius, best.fitness
                    ),
                );
            }
        }
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();
        let mut events = TickEvents {
            tick: next_tick,
            ..TickEvents::default()
        };

        self.stage_fire(next_tick, &mut events);
        self.stage_scan(next_tick, &mut events);
        self.stage_dispatch(next_tick, &mut events);
        self.stage_ground(next_tick, &mut events);
        self.stage_rescue(next_tick, &mut events);
        self.stage_fitness(&mut events);
        self.stage_evolution(next_tick, &mut events);

        self.tick = next_tick;
        events
    }

    /// Set a random fuel cell alight.
    pub fn ignite_random(&mut self) -> Option<GridPos> {
        let pos = self.grid.ignite_random(&mut self.rng)?;
        self.totals.ignitions += 1;
        self.push_log(self.tick, format!("fire started at {pos}"));
        Some(pos)
    }

    /// Rebuild the map and return every unit to its spawn state.
    ///
    /// The predictor, the optimizer and the clock carry over.
    pub fn reset(&mut self) -> Result<(), WorldError> {
        let mut grid = match &self.template {
            Some(template) => template.clone(),
            None => Grid::generate(&self.config, &mut self.rng)?,
        };
        Self::clear_spawns(&self.config, &mut grid);
        self.grid = grid;
        self.discovered.clear();
        self.dispatcher.clear();
        for agent in self.grounds.values_mut() {
            agent.reset();
        }
        for scout in &mut self.scouts {
            scout.reset();
        }
        for rescuer in &mut self.rescuers {
            rescuer.reset();
        }
        self.totals.resets += 1;
        info!(tick = self.tick.0, "episode reset");
        self.push_log(self.tick, "episode reset".to_string());
        Ok(())
    }

    /// Apply an external command.
    pub fn apply_command(&mut self, command: ControlCommand) {
        apply_control_command(self, command);
    }

    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        let labels = |id: GroundId| self.grounds.get(id).map(GroundAgent::label);
        WorldSnapshot {
            tick: self.tick,
            width: self.grid.width(),
            height: self.grid.height(),
            wind: self.grid.wind(),
            cells: self.grid.cells().to_vec(),
            fires: self.grid.count(CellState::Fire),
            ground: self
                .grounds
                .values()
                .map(|agent| GroundSnapshot {
                    label: agent.label(),
                    position: agent.position(),
                    status: agent.status(),
                    battery: agent.battery(),
                    water: agent.water(),
                    target: agent.target(),
                })
                .collect(),
            scouts: self
                .scouts
                .iter()
                .map(|scout| ScoutSnapshot {
                    label: scout.label(),
                    position: scout.position(),
                    target: scout.target(),
                })
                .collect(),
            rescuers: self
                .rescuers
                .iter()
                .map(|rescuer| RescueSnapshot {
                    label: rescuer.label(),
                    position: rescuer.position(),
                    target: rescuer.target().and_then(labels),
                })
                .collect(),
            discovered: self.discovered.iter().copied().collect(),
            predictor_weights: *self.predictor.weights(),
            predictor_updates: self.predictor.updates(),
            generation: self.optimizer.generation(),
            genome_index: self.optimizer.current_index(),
            active_genome: *self.optimizer.active(),
            generations: self.optimizer.history().to_vec(),
            totals: self.totals,
            log: self.log.iter().cloned().collect(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Mutable access to the map (for scripted scenarios).
    #[must_use]
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    #[must_use]
    pub fn ground_agents(&self) -> &SlotMap<GroundId, GroundAgent> {
        &self.grounds
    }

    #[must_use]
    pub fn ground_agents_mut(&mut self) -> &mut SlotMap<GroundId, GroundAgent> {
        &mut self.grounds
    }

    #[must_use]
    pub fn scouts(&self) -> &[Scout] {
        &self.scouts
    }

    #[must_use]
    pub fn rescuers(&self) -> &[RescueAgent] {
        &self.rescuers
    }

    #[must_use]
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    #[must_use]
    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fires known to the fleet.
    #[must_use]
    pub fn discovered(&self) -> &BTreeSet<GridPos> {
        &self.discovered
    }

    #[must_use]
    pub const fn totals(&self) -> RunTotals {
        self.totals
    }

    /// Recent human-readable events, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &String> {
        self.log.iter()
    }
}
