//! Elitist genetic search over the fleet's crowding parameters.

use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::EvolutionSettings;

const SEED_PENALTY: f32 = 2_500.0;
const SEED_RADIUS: u32 = 5;
const RANDOM_PENALTY_MIN: f32 = 1_000.0;
const RANDOM_PENALTY_MAX: f32 = 4_000.0;

/// Observations accumulated while a genome is active.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FitnessCounters {
    pub extinguished: u32,
    pub severity_bonus: u32,
    pub stranded: u32,
    pub crowded_frames: u32,
    pub idle_frames: u32,
}

impl FitnessCounters {
    /// Weighted score, floored at 1.
    #[must_use]
    pub fn fitness(&self) -> f32 {
        let score = 15.0 * self.extinguished as f32 + 5.0 * self.severity_bonus as f32
            - 150.0 * self.stranded as f32
            - 10.0 * self.crowded_frames as f32
            - 8.0 * self.idle_frames as f32;
        score.max(1.0)
    }
}

/// Crowding behaviour applied fleet-wide while the genome is evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Genome {
    pub crowd_penalty: f32,
    pub crowd_radius: u32,
    pub counters: FitnessCounters,
    /// Score from the most recent completed window.
    pub fitness: f32,
}

impl Genome {
    #[must_use]
    pub const fn new(crowd_penalty: f32, crowd_radius: u32) -> Self {
        Self {
            crowd_penalty,
            crowd_radius,
            counters: FitnessCounters {
                extinguished: 0,
                severity_bonus: 0,
                stranded: 0,
                crowded_frames: 0,
                idle_frames: 0,
            },
            fitness: 0.0,
        }
    }

    fn mutated(&self, settings: &EvolutionSettings, rng: &mut impl Rng) -> Self {
        let mut child = Self::new(self.crowd_penalty, self.crowd_radius);
        if rng.random::<f32>() < settings.mutation_rate {
            let jitter = settings.penalty_jitter;
            let delta = if jitter > 0.0 {
                rng.random_range(-jitter..=jitter)
            } else {
                0.0
            };
            child.crowd_penalty =
                (child.crowd_penalty + delta).clamp(settings.penalty_min, settings.penalty_max);
        }
        if rng.random::<f32>() < settings.mutation_rate {
            let shifted = if rng.random::<bool>() {
                child.crowd_radius.saturating_add(1)
            } else {
                child.crowd_radius.saturating_sub(1)
            };
            child.crowd_radius = shifted.clamp(settings.radius_min, settings.radius_max);
        }
        child
    }
}

/// Best genome recorded at the end of a generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    pub generation: u32,
    pub crowd_penalty: f32,
    pub crowd_radius: u32,
    pub fitness: f32,
}

/// Population evaluated one genome per window; evolves after a full pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimizer {
    settings: EvolutionSettings,
    population: Vec<Genome>,
    current: usize,
    generation: u32,
    history: Vec<GenerationRecord>,
}

impl Optimizer {
    /// Seed the population with one aggressive genome and random peers.
    pub fn new(settings: EvolutionSettings, rng: &mut impl Rng) -> Self {
        let clamp_radius = |radius: u32| radius.clamp(settings.radius_min, settings.radius_max);
        let mut population = Vec::with_capacity(settings.population_size);
        population.push(Genome::new(
            SEED_PENALTY.clamp(settings.penalty_min, settings.penalty_max),
            clamp_radius(SEED_RADIUS),
        ));
        while population.len() < settings.population_size {
            let penalty = rng.random_range(RANDOM_PENALTY_MIN..RANDOM_PENALTY_MAX);
            let radius = rng.random_range(settings.radius_min..=settings.radius_max);
            population.push(Genome::new(
                penalty.clamp(settings.penalty_min, settings.penalty_max),
                radius,
            ));
        }
        Self::with_population(settings, population)
    }

    /// Start from an explicit population (at least one genome).
    #[must_use]
    pub fn with_population(settings: EvolutionSettings, mut population: Vec<Genome>) -> Self {
        if population.is_empty() {
            population.push(Genome::new(SEED_PENALTY, SEED_RADIUS));
        }
        Self {
            settings,
            population,
            current: 0,
            generation: 0,
            history: Vec::new(),
        }
    }

    /// Genome currently driving the fleet.
    #[must_use]
    pub fn active(&self) -> &Genome {
        &self.population[self.current]
    }

    fn active_counters(&mut self) -> &mut FitnessCounters {
        &mut self.population[self.current].counters
    }

    #[must_use]
    pub fn population(&self) -> &[Genome] {
        &self.population
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn history(&self) -> &[GenerationRecord] {
        &self.history
    }

    #[must_use]
    pub const fn window_ticks(&self) -> u32 {
        self.settings.window_ticks
    }

    pub fn record_extinguished(&mut self, severity: u32) {
        let counters = self.active_counters();
        counters.extinguished += 1;
        counters.severity_bonus += severity;
    }

    pub fn record_stranded(&mut self) {
        self.active_counters().stranded += 1;
    }

    pub fn record_crowded_frame(&mut self) {
        self.active_counters().crowded_frames += 1;
    }

    pub fn record_idle_frame(&mut self) {
        self.active_counters().idle_frames += 1;
    }

    /// Score the active genome and move on; evolves once every genome has run.
    /// Returns `true` when a new generation began.
    pub fn advance_window(&mut self, rng: &mut impl Rng) -> bool {
        let genome = &mut self.population[self.current];
        genome.fitness = genome.counters.fitness();
        info!(
            generation = self.generation,
            index = self.current,
            crowd_penalty = genome.crowd_penalty,
            crowd_radius = genome.crowd_radius,
            fitness = genome.fitness,
            "genome window scored"
        );
        self.current += 1;
        if self.current < self.population.len() {
            return false;
        }
        self.evolve(rng);
        true
    }

    /// Keep the fittest genome and refill the population with its mutants.
    pub fn evolve(&mut self, rng: &mut impl Rng) {
        self.population
            .sort_by_key(|genome| std::cmp::Reverse(OrderedFloat(genome.fitness)));
        let elite = self.population[0];
        self.history.push(GenerationRecord {
            generation: self.generation,
            crowd_penalty: elite.crowd_penalty,
            crowd_radius: elite.crowd_radius,
            fitness: elite.fitness,
        });
        info!(
            generation = self.generation,
            crowd_penalty = elite.crowd_penalty,
            crowd_radius = elite.crowd_radius,
            fitness = elite.fitness,
            "generation complete"
        );

        let size = self.population.len();
        let mut next = Vec::with_capacity(size);
        let mut kept = elite;
        kept.counters = FitnessCounters::default();
        next.push(kept);
        while next.len() < size {
            next.push(elite.mutated(&self.settings, rng));
        }
        self.population = next;
        self.current = 0;
        self.generation += 1;
    }
}
