//! Rescue units that recharge stranded ground agents in the field.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, info};

use super::{GroundAgent, GroundId, GroundStatus};
use crate::GridPos;
use crate::grid::{CellState, Grid};
use crate::pathfinding::find_path;

/// Support unit that drives to stranded ground agents and recharges them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescueAgent {
    label: u32,
    spawn: GridPos,
    position: GridPos,
    target: Option<GroundId>,
    path: VecDeque<GridPos>,
}

impl RescueAgent {
    #[must_use]
    pub const fn new(label: u32, spawn: GridPos) -> Self {
        Self {
            label,
            spawn,
            position: spawn,
            target: None,
            path: VecDeque::new(),
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
    pub const fn target(&self) -> Option<GroundId> {
        self.target
    }

    pub fn reset(&mut self) {
        self.position = self.spawn;
        self.target = None;
        self.path.clear();
    }

    /// Pick the closest stranded agent nobody else is already driving to.
    fn choose_target(
        &self,
        grounds: &SlotMap<GroundId, GroundAgent>,
        taken: &[GroundId],
    ) -> Option<GroundId> {
        grounds
            .iter()
            .filter(|(id, agent)| {
                agent.status() == GroundStatus::Stranded && !taken.contains(id)
            })
            .min_by_key(|(_, agent)| (agent.position().manhattan(self.position), agent.position()))
            .map(|(id, _)| id)
    }

    fn route_to(&mut self, grid: &Grid, goal: GridPos) {
        self.path = find_path(grid, self.position, goal, false)
            .unwrap_or_default()
            .into();
    }

    /// Advance one tick. `taken` lists agents other rescue units are heading for.
    /// Returns the agent recharged this tick, if any.
    pub fn step(
        &mut self,
        grid: &Grid,
        grounds: &mut SlotMap<GroundId, GroundAgent>,
        taken: &[GroundId],
        charge: u32,
    ) -> Option<GroundId> {
        let still_stranded = self
            .target
            .and_then(|id| grounds.get(id))
            .is_some_and(|agent| agent.status() == GroundStatus::Stranded);
        if !still_stranded {
            self.target = self.choose_target(grounds, taken);
            self.path.clear();
            if let Some(id) = self.target {
                debug!(rescuer = self.label, ?id, "rescue target acquired");
            }
        }
        let id = self.target?;
        let goal = grounds.get(id)?.position();

        if self.position.manhattan(goal) <= 1 {
            let agent = grounds.get_mut(id)?;
            agent.restore(charge);
            info!(
                rescuer = self.label,
                agent = agent.label(),
                position = %goal,
                "stranded agent recharged"
            );
            self.target = None;
            self.path.clear();
            return Some(id);
        }

        if self.path.is_empty() {
            self.route_to(grid, goal);
        }
        match self.path.front().copied() {
            Some(next) if matches!(grid.get(next), CellState::Wall | CellState::Fire) => {
                self.route_to(grid, goal);
            }
            Some(next) => {
                self.path.pop_front();
                self.position = next;
            }
            None => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FireSettings, FleetSettings, grid::WindDirection};

    fn stranded(fleet: &FleetSettings, at: GridPos) -> GroundAgent {
        let mut agent = GroundAgent::new(1, at, fleet);
        agent.strand();
        agent
    }

    #[test]
    fn drives_to_and_recharges_stranded_agent() {
        let grid = Grid::new(10, 10, WindDirection::North, FireSettings::default())
            .expect("grid");
        let fleet = FleetSettings::default();
        let mut grounds: SlotMap<GroundId, GroundAgent> = SlotMap::with_key();
        let healthy = grounds.insert(GroundAgent::new(0, GridPos::new(1, 1), &fleet));
        let victim = grounds.insert(stranded(&fleet, GridPos::new(6, 0)));

        let mut rescuer = RescueAgent::new(0, GridPos::new(0, 0));
        let mut restored = None;
        for _ in 0..10 {
            restored = rescuer.step(&grid, &mut grounds, &[], fleet.rescue_charge);
            if restored.is_some() {
                break;
            }
        }
        assert_eq!(restored, Some(victim));
        assert_eq!(rescuer.position(), GridPos::new(5, 0));
        assert_eq!(grounds[victim].status(), GroundStatus::Idle);
        assert_eq!(grounds[victim].battery(), fleet.rescue_charge);
        assert_eq!(grounds[healthy].battery(), fleet.max_battery);
        assert_eq!(rescuer.target(), None);
    }

    #[test]
    fn ignores_agents_claimed_by_other_rescuers() {
        let grid = Grid::new(10, 10, WindDirection::North, FireSettings::default())
            .expect("grid");
        let fleet = FleetSettings::default();
        let mut grounds: SlotMap<GroundId, GroundAgent> = SlotMap::with_key();
        let victim = grounds.insert(stranded(&fleet, GridPos::new(6, 6)));

        let mut rescuer = RescueAgent::new(0, GridPos::new(0, 0));
        assert_eq!(rescuer.step(&grid, &mut grounds, &[victim], 100), None);
        assert_eq!(rescuer.target(), None);
        assert_eq!(rescuer.position(), GridPos::new(0, 0));
    }
}
