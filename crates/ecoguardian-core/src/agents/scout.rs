//! Scouts roam toward stale regions and report the fires they scan.

use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::{FleetSettings, GridPos, Tick};

/// Roaming observer steering towards the least recently scanned regions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scout {
    label: u32,
    spawn: GridPos,
    position: GridPos,
    target: Option<GridPos>,
    scan_radius: i32,
}

impl Scout {
    #[must_use]
    pub const fn new(label: u32, spawn: GridPos, scan_radius: i32) -> Self {
        Self {
            label,
            spawn,
            position: spawn,
            target: None,
            scan_radius,
        }
    }

    #[must_use]
    pub const fn label(&self) -> u32 {
        self.label
    }

    #[must_use]
    pub const fn position(&self) -> GridPos {
        self.position
    }

    #[must_use]
    pub const fn target(&self) -> Option<GridPos> {
        self.target
    }

    #[must_use]
    pub const fn scan_radius(&self) -> i32 {
        self.scan_radius
    }

    pub fn reset(&mut self) {
        self.position = self.spawn;
        self.target = None;
    }

    /// Sample candidate cells and keep the one whose surroundings are stalest.
    fn choose_target(
        &self,
        grid: &Grid,
        tick: Tick,
        samples: u32,
        rng: &mut impl Rng,
    ) -> Option<GridPos> {
        (0..samples)
            .map(|_| {
                GridPos::new(
                    rng.random_range(0..grid.width() as i32),
                    rng.random_range(0..grid.height() as i32),
                )
            })
            .map(|candidate| {
                let urgency = grid.average_urgency(candidate, self.scan_radius, tick);
                (OrderedFloat(urgency), candidate)
            })
            .max()
            .map(|(_, candidate)| candidate)
    }

    /// Move one cell per axis towards the roam target, ignoring obstacles.
    pub fn step(&mut self, grid: &Grid, fleet: &FleetSettings, tick: Tick, rng: &mut impl Rng) {
        if self.target.is_none() {
            self.target = self.choose_target(grid, tick, fleet.scout_samples, rng);
        }
        let Some(target) = self.target else {
            return;
        };
        let next = self.position.offset(
            (target.x - self.position.x).signum(),
            (target.y - self.position.y).signum(),
        );
        self.position = GridPos::new(
            next.x.clamp(0, grid.width() as i32 - 1),
            next.y.clamp(0, grid.height() as i32 - 1),
        );
        if self.position.manhattan(target) <= fleet.scout_arrival_distance {
            self.target = self.choose_target(grid, tick, fleet.scout_samples, rng);
        }
    }

    /// Mark the covered window as observed and report the fires in it.
    pub fn scan(&self, grid: &mut Grid, tick: Tick) -> Vec<GridPos> {
        grid.mark_scanned(self.position, self.scan_radius, tick);
        grid.fires_within(self.position, self.scan_radius)
    }
}
