//! Core types shared across the EcoGuardian workspace.
//!
//! The crate owns every piece of the wildfire-suppression simulation: the fire
//! grid, the pathfinder, the ground/scout/rescue agents, the dispatcher, the
//! online success predictor and the genetic optimizer. [`Simulation`] wires
//! them into the per-tick pipeline.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod agents;
pub mod dispatch;
pub mod grid;
pub mod optimizer;
pub mod pathfinding;
pub mod predictor;
mod world;

pub use agents::{GroundAgent, GroundId, GroundStatus, RescueAgent, Scout, StepReport};
pub use dispatch::{Assignment, AuctionContext, Dispatcher};
pub use grid::{CellState, Grid, SpreadReport, WindDirection};
pub use optimizer::{FitnessCounters, Genome, GenerationRecord, Optimizer};
pub use pathfinding::{FIRE_TRAVERSAL_COST, find_path};
pub use predictor::{FEATURE_COUNT, Outcome, Predictor, TaskFeatures};
pub use world::{
    ControlCommand, GroundSnapshot, RescueSnapshot, RunTotals, ScoutSnapshot, Simulation,
    TickEvents, WorldSnapshot, apply_control_command,
};

/// Discrete simulation clock (ticks processed since the episode started).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Tick reached after waiting `ticks` more ticks.
    #[must_use]
    pub const fn after(self, ticks: u32) -> Self {
        Self(self.0 + ticks as u64)
    }
}

/// Integer grid coordinate. Signed so neighbourhood offsets may step off the map;
/// the grid answers such queries with [`CellState::Wall`].
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    /// Construct a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 4-connected (taxicab) distance.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Coordinate shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for an EcoGuardian episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardianConfig {
    /// Number of grid columns.
    pub grid_width: u32,
    /// Number of grid rows.
    pub grid_height: u32,
    /// Optional RNG seed for reproducible episodes.
    pub rng_seed: Option<u64>,
    /// Probability that a generated cell is fuel.
    pub fuel_density: f32,
    /// Probability that a generated cell is a wall (checked after fuel).
    pub wall_density: f32,
    /// Refill depots. Empty means "one in each corner".
    pub depots: Vec<GridPos>,
    /// Fixed wind direction; `None` draws one per episode.
    pub wind: Option<grid::WindDirection>,
    /// Fires lit when an episode starts.
    pub initial_fires: u32,
    /// Maximum number of recent log lines retained for snapshots.
    pub log_capacity: usize,
    pub fire: FireSettings,
    pub fleet: FleetSettings,
    pub dispatch: DispatchSettings,
    pub learning: LearningSettings,
    pub evolution: EvolutionSettings,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            grid_width: 40,
            grid_height: 30,
            rng_seed: None,
            fuel_density: 0.7,
            wall_density: 0.05,
            depots: Vec::new(),
            wind: None,
            initial_fires: 1,
            log_capacity: 64,
            fire: FireSettings::default(),
            fleet: FleetSettings::default(),
            dispatch: DispatchSettings::default(),
            learning: LearningSettings::default(),
            evolution: EvolutionSettings::default(),
        }
    }
}

/// Fire propagation and ignition parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FireSettings {
    /// Base probability that a burning cell ignites one fuel neighbour per tick.
    pub spread_probability: f32,
    /// Scale of the wind bias applied to spread.
    pub wind_strength: f32,
    /// Fuel units a freshly grown fuel cell holds (ticks it can burn).
    pub max_fuel: u32,
    /// Mean dryness gained by a fuel cell per tick.
    pub dryness_rate: f32,
    /// Dryness above which spontaneous ignition becomes possible.
    pub ignition_dryness: f32,
    /// Per-tick spontaneous ignition probability of a dry fuel cell.
    pub spontaneous_ignition: f32,
}

impl Default for FireSettings {
    fn default() -> Self {
        Self {
            spread_probability: 0.01,
            wind_strength: 1.5,
            max_fuel: 100,
            dryness_rate: 1.5,
            ignition_dryness: 100.0,
            spontaneous_ignition: 0.0001,
        }
    }
}

/// Fleet composition and per-agent resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetSettings {
    pub ground_spawns: Vec<GridPos>,
    pub scout_spawns: Vec<GridPos>,
    pub rescue_spawns: Vec<GridPos>,
    pub max_battery: u32,
    pub max_water: u32,
    /// Battery strictly below this forces a return to a depot.
    pub low_battery: u32,
    /// Water at or below this forces a return to a depot.
    pub water_reserve: u32,
    /// Ticks an idle agent waits off-depot before heading home.
    pub idle_timeout: u32,
    /// Ticks between two replans of the same agent.
    pub replan_cooldown: u32,
    /// Radius of the ground agents' short-range fire sensor.
    pub sensor_radius: i32,
    pub scout_scan_radius: i32,
    /// Candidate cells sampled when a scout picks a roam target.
    pub scout_samples: u32,
    /// Distance at which a scout considers its roam target reached.
    pub scout_arrival_distance: u32,
    /// Battery restored by a rescue agent.
    pub rescue_charge: u32,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            ground_spawns: vec![GridPos::new(2, 28), GridPos::new(5, 28), GridPos::new(38, 28)],
            scout_spawns: vec![GridPos::new(0, 0), GridPos::new(39, 29)],
            rescue_spawns: vec![GridPos::new(20, 29)],
            max_battery: 200,
            max_water: 20,
            low_battery: 50,
            water_reserve: 4,
            idle_timeout: 100,
            replan_cooldown: 10,
            sensor_radius: 2,
            scout_scan_radius: 4,
            scout_samples: 20,
            scout_arrival_distance: 2,
            rescue_charge: 100,
        }
    }
}

/// Auction parameters used by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    /// Ticks between dispatch cycles.
    pub interval: u32,
    /// Bids at or above this cost are rejected unless nothing else qualifies.
    pub reject_threshold: f32,
    /// Cost added for a predicted certain failure.
    pub risk_penalty: f32,
    /// Cost added for an empty battery.
    pub battery_weight: f32,
    /// Ticks an (agent, fire) pair stays blacklisted after a path failure.
    pub blacklist_ticks: u32,
    /// Multiplier turning the genome's crowd penalty into bid cost.
    pub crowd_penalty_scale: f32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval: 5,
            reject_threshold: 800.0,
            risk_penalty: 500.0,
            battery_weight: 50.0,
            blacklist_ticks: 30,
            crowd_penalty_scale: 0.01,
        }
    }
}

/// Online predictor parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningSettings {
    pub learning_rate: f32,
    /// Reset the predictor at each genome evaluation window.
    pub reset_per_window: bool,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            reset_per_window: false,
        }
    }
}

/// Genetic optimizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvolutionSettings {
    pub population_size: usize,
    /// Ticks each genome stays active before being scored.
    pub window_ticks: u32,
    /// Independent probability of mutating each gene of a clone.
    pub mutation_rate: f32,
    pub penalty_min: f32,
    pub penalty_max: f32,
    /// Half-width of the uniform penalty jitter.
    pub penalty_jitter: f32,
    pub radius_min: u32,
    pub radius_max: u32,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            population_size: 4,
            window_ticks: 600,
            mutation_rate: 0.5,
            penalty_min: 0.0,
            penalty_max: 4_000.0,
            penalty_jitter: 500.0,
            radius_min: 2,
            radius_max: 6,
        }
    }
}

fn is_probability(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl GuardianConfig {
    /// Validates the configuration before any state is built from it.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(WorldError::InvalidConfig("grid dimensions must be non-zero"));
        }
        if self.grid_width > i32::MAX as u32 || self.grid_height > i32::MAX as u32 {
            return Err(WorldError::InvalidConfig("grid dimensions overflow i32"));
        }
        if !is_probability(self.fuel_density)
            || !is_probability(self.wall_density)
            || self.fuel_density + self.wall_density > 1.0
        {
            return Err(WorldError::InvalidConfig(
                "fuel and wall densities must be probabilities summing to at most 1",
            ));
        }
        if self.log_capacity == 0 {
            return Err(WorldError::InvalidConfig("log_capacity must be non-zero"));
        }

        let in_bounds = |pos: &GridPos| {
            pos.x >= 0
                && pos.y >= 0
                && (pos.x as u32) < self.grid_width
                && (pos.y as u32) < self.grid_height
        };
        if !self.depots.iter().all(in_bounds) {
            return Err(WorldError::InvalidConfig("depots must lie inside the grid"));
        }
        let fleet = &self.fleet;
        if !fleet.ground_spawns.iter().all(in_bounds)
            || !fleet.scout_spawns.iter().all(in_bounds)
            || !fleet.rescue_spawns.iter().all(in_bounds)
        {
            return Err(WorldError::InvalidConfig(
                "agent spawn cells must lie inside the grid",
            ));
        }

        let fire = &self.fire;
        if !is_probability(fire.spread_probability) || !is_probability(fire.spontaneous_ignition)
        {
            return Err(WorldError::InvalidConfig(
                "spread and ignition probabilities must be in [0, 1]",
            ));
        }
        if fire.wind_strength < 0.0 || fire.dryness_rate < 0.0 || fire.ignition_dryness < 0.0 {
            return Err(WorldError::InvalidConfig(
                "wind strength and dryness parameters must be non-negative",
            ));
        }
        if fire.max_fuel == 0 {
            return Err(WorldError::InvalidConfig("max_fuel must be positive"));
        }

        if fleet.max_battery == 0 || fleet.max_water == 0 {
            return Err(WorldError::InvalidConfig(
                "max_battery and max_water must be positive",
            ));
        }
        if fleet.low_battery > fleet.max_battery || fleet.water_reserve >= fleet.max_water {
            return Err(WorldError::InvalidConfig(
                "resource thresholds must sit below the tank sizes",
            ));
        }
        if fleet.rescue_charge == 0 || fleet.rescue_charge > fleet.max_battery {
            return Err(WorldError::InvalidConfig(
                "rescue_charge must be in (0, max_battery]",
            ));
        }
        if fleet.sensor_radius < 0 || fleet.scout_scan_radius < 0 || fleet.scout_samples == 0 {
            return Err(WorldError::InvalidConfig(
                "sensor radii must be non-negative and scout_samples positive",
            ));
        }
        let span = self.grid_width.max(self.grid_height) as i32;
        if fleet.sensor_radius > span || fleet.scout_scan_radius > span {
            return Err(WorldError::InvalidConfig(
                "sensor radii must not exceed the larger grid dimension",
            ));
        }

        let dispatch = &self.dispatch;
        if dispatch.interval == 0 {
            return Err(WorldError::InvalidConfig("dispatch interval must be positive"));
        }
        if dispatch.risk_penalty < 0.0
            || dispatch.battery_weight < 0.0
            || dispatch.crowd_penalty_scale < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "bid weights must be non-negative",
            ));
        }

        if !(self.learning.learning_rate.is_finite() && self.learning.learning_rate > 0.0) {
            return Err(WorldError::InvalidConfig("learning_rate must be positive"));
        }

        let evolution = &self.evolution;
        if evolution.population_size == 0 || evolution.window_ticks == 0 {
            return Err(WorldError::InvalidConfig(
                "population_size and window_ticks must be positive",
            ));
        }
        if !is_probability(evolution.mutation_rate) {
            return Err(WorldError::InvalidConfig("mutation_rate must be in [0, 1]"));
        }
        if evolution.penalty_min > evolution.penalty_max
            || evolution.radius_min > evolution.radius_max
            || evolution.penalty_jitter < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "genome bounds must be ordered and jitter non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
