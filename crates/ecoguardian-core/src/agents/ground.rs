//! Ground firefighter state machine.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::{CellState, Grid};
use crate::pathfinding::find_path;
use crate::predictor::{Outcome, Predictor, TaskFeatures};
use crate::{DispatchSettings, FleetSettings, GridPos};

/// Lifecycle of a ground agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GroundStatus {
    Idle,
    /// Heading for an assigned fire.
    Moving,
    /// Heading for a depot to refill.
    Returning,
    /// Out of battery; waits for a rescue unit.
    Stranded,
}

/// Shared world state a ground agent acts on during its step.
pub struct StepContext<'a> {
    pub grid: &'a mut Grid,
    pub predictor: &'a mut Predictor,
    pub rng: &'a mut SmallRng,
    pub fleet: &'a FleetSettings,
    /// Crowd radius of the active genome, bounding chained searches.
    pub crowd_radius: u32,
    /// Positions and targets held by teammates.
    pub claimed: &'a [GridPos],
}

/// What happened during one [`GroundAgent::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Cells put out this tick, with the burning neighbours each had.
    pub extinguished: Vec<(GridPos, u32)>,
    /// Labelled outcome fed to the predictor.
    pub outcome: Option<Outcome>,
    pub moved: bool,
    pub stranded: bool,
    pub returning: bool,
    pub refilled: bool,
    /// Follow-up fire picked without going back to the dispatcher.
    pub chained: Option<GridPos>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundAgent {
    label: u32,
    spawn: GridPos,
    position: GridPos,
    status: GroundStatus,
    battery: u32,
    water: u32,
    max_battery: u32,
    max_water: u32,
    target: Option<GridPos>,
    path: VecDeque<GridPos>,
    pending: Option<TaskFeatures>,
    idle_ticks: u32,
    replan_cooldown: u32,
    target_secured: bool,
}

impl GroundAgent {
    #[must_use]
    pub fn new(label: u32, spawn: GridPos, fleet: &FleetSettings) -> Self {
        Self {
            label,
            spawn,
            position: spawn,
            status: GroundStatus::Idle,
            battery: fleet.max_battery,
            water: fleet.max_water,
            max_battery: fleet.max_battery,
            max_water: fleet.max_water,
            target: None,
            path: VecDeque::new(),
            pending: None,
            idle_ticks: 0,
            replan_cooldown: 0,
            target_secured: false,
        }
    }

    /// Human-facing number used in logs.
    #[must_use]
    pub const fn label(&self) -> u32 {
        self.label
    }

    #[must_use]
    pub const fn position(&self) -> GridPos {
        self.position
    }

    #[must_use]
    pub const fn spawn(&self) -> GridPos {
        self.spawn
    }

    #[must_use]
    pub const fn status(&self) -> GroundStatus {
        self.status
    }

    #[must_use]
    pub const fn battery(&self) -> u32 {
        self.battery
    }

    #[must_use]
    pub const fn water(&self) -> u32 {
        self.water
    }

    #[must_use]
    pub const fn target(&self) -> Option<GridPos> {
        self.target
    }

    /// Remaining route, next cell first.
    #[must_use]
    pub fn path(&self) -> &VecDeque<GridPos> {
        &self.path
    }

    #[must_use]
    pub const fn pending_features(&self) -> Option<&TaskFeatures> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn battery_fraction(&self) -> f32 {
        self.battery as f32 / self.max_battery.max(1) as f32
    }

    #[must_use]
    pub fn water_fraction(&self) -> f32 {
        self.water as f32 / self.max_water.max(1) as f32
    }

    /// Enough battery and water to accept a task.
    #[must_use]
    pub const fn resources_sufficient(&self, fleet: &FleetSettings) -> bool {
        self.battery >= fleet.low_battery && self.water > fleet.water_reserve
    }

    /// Idle and equipped: eligible for dispatch.
    #[must_use]
    pub const fn is_available(&self, fleet: &FleetSettings) -> bool {
        matches!(self.status, GroundStatus::Idle) && self.resources_sufficient(fleet)
    }

    /// Holding a task or heading home.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.status, GroundStatus::Moving | GroundStatus::Returning)
    }

    /// Auction cost of taking on a fire `distance` steps away; lower wins.
    #[must_use]
    pub fn bid(
        &self,
        features: &TaskFeatures,
        predictor: &Predictor,
        distance: u32,
        dispatch: &DispatchSettings,
    ) -> f32 {
        let success = predictor.predict(features);
        distance as f32
            + (1.0 - success) * dispatch.risk_penalty
            + (1.0 - self.battery_fraction()) * dispatch.battery_weight
    }

    /// Fires picked up by the short-range sensor.
    #[must_use]
    pub fn sense(&self, grid: &Grid, radius: i32) -> Vec<GridPos> {
        grid.fires_within(self.position, radius)
    }

    /// Take on a fire along a precomputed route.
    pub fn assign(&mut self, target: GridPos, path: Vec<GridPos>, features: TaskFeatures) {
        self.status = GroundStatus::Moving;
        self.target = Some(target);
        self.path = path.into();
        self.pending = Some(features);
        self.idle_ticks = 0;
        self.target_secured = false;
    }

    /// Head for the nearest depot. The route is retried later when none exists yet.
    pub fn begin_return(&mut self, grid: &Grid, rng: &mut SmallRng) {
        let retry = self.status == GroundStatus::Returning;
        self.status = GroundStatus::Returning;
        self.pending = None;
        self.target_secured = false;
        self.idle_ticks = 0;
        self.target = grid.nearest_depot(self.position, rng);
        self.path.clear();
        match self.target {
            Some(depot) => {
                if let Some(route) = find_path(grid, self.position, depot, self.water > 0) {
                    self.path = route.into();
                }
            }
            None if retry => {}
            None => warn!(agent = self.label, "no depot to return to"),
        }
    }

    /// Put back at the spawn cell with full tanks.
    pub fn reset(&mut self) {
        let (label, spawn) = (self.label, self.spawn);
        let (max_battery, max_water) = (self.max_battery, self.max_water);
        *self = Self {
            label,
            spawn,
            position: spawn,
            status: GroundStatus::Idle,
            battery: max_battery,
            water: max_water,
            max_battery,
            max_water,
            target: None,
            path: VecDeque::new(),
            pending: None,
            idle_ticks: 0,
            replan_cooldown: 0,
            target_secured: false,
        };
    }

    /// Recharge a stranded agent in place.
    pub fn restore(&mut self, charge: u32) {
        self.battery = charge.min(self.max_battery);
        self.go_idle();
    }

    /// Drop the current task and wait for a rescue unit.
    pub(crate) fn strand(&mut self) {
        self.go_idle();
        self.status = GroundStatus::Stranded;
    }

    fn go_idle(&mut self) {
        self.status = GroundStatus::Idle;
        self.target = None;
        self.path.clear();
        self.pending = None;
        self.idle_ticks = 0;
        self.target_secured = false;
    }

    fn abort(&mut self, predictor: &mut Predictor, report: &mut StepReport) {
        if let Some(features) = self.pending.take() {
            predictor.train(&features, Outcome::Failure);
            report.outcome = Some(Outcome::Failure);
        }
        self.go_idle();
    }

    fn is_blocked(&self, grid: &Grid, cell: GridPos) -> bool {
        match grid.get(cell) {
            CellState::Wall => true,
            CellState::Fire => self.target != Some(cell),
            _ => false,
        }
    }

    fn replan(&mut self, grid: &Grid) -> bool {
        let Some(goal) = self.target else {
            return false;
        };
        match find_path(grid, self.position, goal, self.water > 0) {
            Some(route) => {
                self.path = route.into();
                true
            }
            None => false,
        }
    }

    /// Advance the state machine by one tick.
    pub fn step(&mut self, ctx: &mut StepContext<'_>) -> StepReport {
        let mut report = StepReport::default();
        self.replan_cooldown = self.replan_cooldown.saturating_sub(1);

        if self.status == GroundStatus::Stranded {
            return report;
        }
        if self.battery == 0 {
            self.strand();
            report.stranded = true;
            warn!(agent = self.label, position = %self.position, "ground agent stranded");
            return report;
        }

        if self.status == GroundStatus::Idle {
            if ctx.grid.get(self.position) == CellState::Depot {
                self.idle_ticks = 0;
            } else {
                self.idle_ticks += 1;
                if self.idle_ticks > ctx.fleet.idle_timeout {
                    debug!(agent = self.label, "idle timeout, heading home");
                    self.begin_return(ctx.grid, ctx.rng);
                    report.returning = true;
                }
            }
        }

        if matches!(self.status, GroundStatus::Idle | GroundStatus::Moving)
            && !self.resources_sufficient(ctx.fleet)
        {
            debug!(
                agent = self.label,
                battery = self.battery,
                water = self.water,
                "resources low, heading home"
            );
            self.begin_return(ctx.grid, ctx.rng);
            report.returning = true;
        }

        if self.status == GroundStatus::Moving && !self.target_secured {
            let lost = self
                .target
                .is_none_or(|target| ctx.grid.get(target) != CellState::Fire);
            if lost {
                debug!(agent = self.label, target = ?self.target, "target no longer burning");
                self.abort(ctx.predictor, &mut report);
            }
        }

        if self.water > 0 {
            self.extinguish_around(ctx, &mut report);
        }

        if self.is_busy() && !self.path.is_empty() {
            self.advance_along_path(ctx, &mut report);
        }

        if self.path.is_empty() {
            match self.status {
                GroundStatus::Returning => self.arrive_home(ctx, &mut report),
                GroundStatus::Moving => self.arrive_at_target(ctx, &mut report),
                GroundStatus::Idle | GroundStatus::Stranded => {}
            }
        }
        report
    }

    fn extinguish_around(&mut self, ctx: &mut StepContext<'_>, report: &mut StepReport) {
        'scan: for dy in -1..=1 {
            for dx in -1..=1 {
                if self.water == 0 {
                    break 'scan;
                }
                let cell = self.position.offset(dx, dy);
                if ctx.grid.get(cell) != CellState::Fire {
                    continue;
                }
                let neighbours = ctx.grid.severity(cell).saturating_sub(1);
                ctx.grid.set(cell, CellState::Extinguished);
                self.water -= 1;
                report.extinguished.push((cell, neighbours));
                if self.status == GroundStatus::Moving && self.target == Some(cell) {
                    self.target_secured = true;
                }
            }
        }
        self.credit_success(ctx, report);
    }

    fn credit_success(&mut self, ctx: &mut StepContext<'_>, report: &mut StepReport) {
        if report.extinguished.is_empty() || self.status != GroundStatus::Moving {
            return;
        }
        if let Some(features) = self.pending.take() {
            ctx.predictor.train(&features, Outcome::Success);
            report.outcome = Some(Outcome::Success);
        }
    }

    fn advance_along_path(&mut self, ctx: &mut StepContext<'_>, report: &mut StepReport) {
        let Some(&next) = self.path.front() else {
            return;
        };
        if self.is_blocked(ctx.grid, next) {
            if self.replan_cooldown > 0 {
                return;
            }
            self.replan_cooldown = ctx.fleet.replan_cooldown;
            if !self.replan(ctx.grid) && self.status == GroundStatus::Moving {
                debug!(agent = self.label, target = ?self.target, "route lost, aborting task");
                self.abort(ctx.predictor, report);
            }
            return;
        }
        self.path.pop_front();
        self.position = next;
        self.battery = self.battery.saturating_sub(1);
        report.moved = true;
    }

    fn arrive_home(&mut self, ctx: &mut StepContext<'_>, report: &mut StepReport) {
        if ctx.grid.get(self.position) == CellState::Depot {
            self.battery = self.max_battery;
            self.water = self.max_water;
            self.go_idle();
            report.refilled = true;
            debug!(agent = self.label, position = %self.position, "refilled at depot");
            return;
        }
        let reached_stale_target = self.target == Some(self.position);
        if self.target.is_none() || reached_stale_target || !self.replan(ctx.grid) {
            self.begin_return(ctx.grid, ctx.rng);
        }
    }

    fn arrive_at_target(&mut self, ctx: &mut StepContext<'_>, report: &mut StepReport) {
        if self.target != Some(self.position) && self.replan(ctx.grid) && !self.path.is_empty() {
            return;
        }
        match self.next_nearby_fire(ctx) {
            Some((fire, route)) => {
                let features = TaskFeatures::observe(
                    ctx.grid,
                    self.position,
                    fire,
                    self.battery_fraction(),
                    self.water_fraction(),
                );
                debug!(agent = self.label, %fire, "chaining to nearby fire");
                self.assign(fire, route, features);
                report.chained = Some(fire);
            }
            None => self.go_idle(),
        }
    }

    fn next_nearby_fire(&self, ctx: &StepContext<'_>) -> Option<(GridPos, Vec<GridPos>)> {
        let radius = ctx.crowd_radius;
        let mut candidates: Vec<GridPos> = ctx
            .grid
            .fires_within(self.position, radius as i32)
            .into_iter()
            .filter(|fire| fire.manhattan(self.position) <= radius)
            .filter(|fire| !ctx.claimed.contains(fire))
            .collect();
        candidates.sort_by_key(|fire| (fire.manhattan(self.position), *fire));
        candidates.into_iter().find_map(|fire| {
            find_path(ctx.grid, self.position, fire, self.water > 0).map(|route| (fire, route))
        })
    }
}
