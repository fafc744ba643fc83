//! Online logistic model estimating whether a ground task will succeed.

use serde::{Deserialize, Serialize};

use crate::GridPos;
use crate::grid::Grid;

/// Inputs the model sees, bias included.
pub const FEATURE_COUNT: usize = 7;

const PROXIMITY: usize = 0;
const SEVERITY: usize = 1;
const WIND_ALIGNMENT: usize = 5;
const LOGIT_CLAMP: f32 = 20.0;

/// Feature vector describing an (agent, fire) pairing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaskFeatures {
    /// `1 - manhattan / (width + height)`.
    pub proximity: f32,
    /// Burning cells around the fire, over nine.
    pub severity: f32,
    pub battery: f32,
    pub water: f32,
    /// Share of walls and fires between agent and fire.
    pub obstacle_density: f32,
    /// Cosine between the wind and the approach direction.
    pub wind_alignment: f32,
}

impl TaskFeatures {
    /// Measure the features of sending an agent at `agent` to the fire at `fire`.
    #[must_use]
    pub fn observe(
        grid: &Grid,
        agent: GridPos,
        fire: GridPos,
        battery_fraction: f32,
        water_fraction: f32,
    ) -> Self {
        let span = (grid.width() + grid.height()) as f32;
        Self {
            proximity: 1.0 - agent.manhattan(fire) as f32 / span,
            severity: grid.severity(fire) as f32 / 9.0,
            battery: battery_fraction.clamp(0.0, 1.0),
            water: water_fraction.clamp(0.0, 1.0),
            obstacle_density: grid.obstacle_density(agent, fire),
            wind_alignment: grid.wind_alignment(agent, fire),
        }
    }

    #[must_use]
    pub const fn to_vector(&self) -> [f32; FEATURE_COUNT] {
        [
            self.proximity,
            self.severity,
            self.battery,
            self.water,
            self.obstacle_density,
            self.wind_alignment,
            1.0,
        ]
    }
}

/// Label fed back once a task resolves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    const fn label(self) -> f32 {
        match self {
            Self::Success => 1.0,
            Self::Failure => 0.0,
        }
    }
}

/// Single-sample SGD logistic regression with sign priors on a few weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predictor {
    weights: [f32; FEATURE_COUNT],
    learning_rate: f32,
    updates: u64,
}

impl Predictor {
    #[must_use]
    pub const fn new(learning_rate: f32) -> Self {
        Self {
            weights: [0.0; FEATURE_COUNT],
            learning_rate,
            updates: 0,
        }
    }

    #[must_use]
    pub const fn weights(&self) -> &[f32; FEATURE_COUNT] {
        &self.weights
    }

    /// Number of labelled outcomes absorbed since the last reset.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }

    /// Success probability in `(0, 1)`.
    #[must_use]
    pub fn predict(&self, features: &TaskFeatures) -> f32 {
        let x = features.to_vector();
        let logit: f32 = self.weights.iter().zip(x).map(|(w, x)| w * x).sum();
        1.0 / (1.0 + (-logit.clamp(-LOGIT_CLAMP, LOGIT_CLAMP)).exp())
    }

    pub fn train(&mut self, features: &TaskFeatures, outcome: Outcome) {
        let error = self.predict(features) - outcome.label();
        for (weight, x) in self.weights.iter_mut().zip(features.to_vector()) {
            *weight -= self.learning_rate * error * x;
        }
        // Closer and hotter fires never look worse; tailwind never looks better.
        self.weights[PROXIMITY] = self.weights[PROXIMITY].max(0.0);
        self.weights[SEVERITY] = self.weights[SEVERITY].max(0.0);
        self.weights[WIND_ALIGNMENT] = self.weights[WIND_ALIGNMENT].min(0.0);
        self.updates += 1;
    }

    pub fn reset(&mut self) {
        self.weights = [0.0; FEATURE_COUNT];
        self.updates = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FireSettings, grid::WindDirection};

    fn features(battery: f32) -> TaskFeatures {
        TaskFeatures {
            proximity: 0.5,
            severity: 0.2,
            battery,
            water: 0.5,
            obstacle_density: 0.1,
            wind_alignment: 0.0,
        }
    }

    #[test]
    fn untrained_model_is_undecided() {
        let model = Predictor::new(0.1);
        assert!((model.predict(&features(1.0)) - 0.5).abs() < 1e-6);
        assert_eq!(model.updates(), 0);
    }

    #[test]
    fn correlated_feature_learns_matching_sign() {
        let mut model = Predictor::new(0.1);
        for round in 0..200 {
            if round % 2 == 0 {
                model.train(&features(1.0), Outcome::Success);
            } else {
                model.train(&features(0.0), Outcome::Failure);
            }
        }
        assert!(model.weights()[2] > 0.0, "weights {:?}", model.weights());
        assert!(model.predict(&features(1.0)) > model.predict(&features(0.0)));

        let mut inverse = Predictor::new(0.1);
        for round in 0..200 {
            if round % 2 == 0 {
                inverse.train(&features(1.0), Outcome::Failure);
            } else {
                inverse.train(&features(0.0), Outcome::Success);
            }
        }
        assert!(inverse.weights()[2] < 0.0);
    }

    #[test]
    fn priors_hold_after_adversarial_updates() {
        let mut model = Predictor::new(0.5);
        let hostile = TaskFeatures {
            proximity: 1.0,
            severity: 1.0,
            battery: 0.5,
            water: 0.5,
            obstacle_density: 0.0,
            wind_alignment: -1.0,
        };
        for _ in 0..50 {
            model.train(&hostile, Outcome::Failure);
        }
        let weights = model.weights();
        assert!(weights[PROXIMITY] >= 0.0);
        assert!(weights[SEVERITY] >= 0.0);
        assert!(weights[WIND_ALIGNMENT] <= 0.0);
        assert_eq!(model.updates(), 50);

        model.reset();
        assert_eq!(model.weights(), &[0.0; FEATURE_COUNT]);
        assert_eq!(model.updates(), 0);
    }

    #[test]
    fn extreme_logits_stay_finite() {
        let mut model = Predictor::new(1_000.0);
        for _ in 0..10 {
            model.train(&features(1.0), Outcome::Success);
        }
        let p = model.predict(&features(1.0));
        assert!(p.is_finite() && p > 0.0 && p <= 1.0);
    }

    #[test]
    fn observed_features_are_normalised() {
        let mut grid = Grid::new(20, 20, WindDirection::East, FireSettings::default())
            .expect("grid");
        let fire = GridPos::new(10, 10);
        grid.plant(fire);
        grid.ignite(fire);
        let observed = TaskFeatures::observe(&grid, GridPos::new(0, 10), fire, 0.5, 2.0);
        assert!((observed.proximity - 0.75).abs() < 1e-6);
        assert!((observed.severity - 1.0 / 9.0).abs() < 1e-6);
        assert_eq!(observed.water, 1.0);
        assert!((observed.wind_alignment - 1.0).abs() < 1e-6);
        assert_eq!(observed.to_vector()[FEATURE_COUNT - 1], 1.0);
    }
}
