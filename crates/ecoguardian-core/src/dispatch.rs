//! Periodic auction pairing idle ground agents with discovered fires.
//!
//! Every cycle the dispatcher:
//! 1. prunes expired blacklist entries,
//! 2. locks the targets busy agents are already pursuing,
//! 3. gathers bids from every idle, equipped agent for every unlocked fire that is
//!    not blacklisted for it and not inside the crowd radius of a busy teammate,
//! 4. accepts bids cheapest-first below the reject threshold, one fire and one task
//!    per agent, skipping fires crowded by assignments made earlier in the cycle.
//!
//! When nothing qualifies the cheapest routable bid is accepted anyway so that fires
//! never starve. A bid whose route cannot be computed blacklists its (agent, fire)
//! pair for a while and the auction moves on to the next bid.

use std::collections::{BTreeSet, HashMap, HashSet};

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, info};

use crate::agents::{GroundAgent, GroundId};
use crate::grid::Grid;
use crate::optimizer::Genome;
use crate::pathfinding::find_path;
use crate::predictor::{Predictor, TaskFeatures};
use crate::{DispatchSettings, FleetSettings, GridPos, Tick};

/// Read-only world state an auction cycle bids against.
pub struct AuctionContext<'a> {
    pub grid: &'a Grid,
    pub predictor: &'a Predictor,
    pub fires: &'a BTreeSet<GridPos>,
    pub genome: &'a Genome,
    pub fleet: &'a FleetSettings,
    pub tick: Tick,
}

/// A task handed out by the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub agent: GroundId,
    pub fire: GridPos,
    pub cost: f32,
    pub route_len: usize,
    /// Accepted above the reject threshold because nothing else qualified.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy)]
struct Bid {
    agent: GroundId,
    fire: GridPos,
    cost: f32,
    features: TaskFeatures,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    settings: DispatchSettings,
    blacklist: HashMap<(GroundId, GridPos), Tick>,
    cycles: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            settings,
            blacklist: HashMap::new(),
            cycles: 0,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Whether an auction should run on `tick`.
    #[must_use]
    pub const fn is_due(&self, tick: Tick) -> bool {
        tick.0 % self.settings.interval as u64 == 0
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether `agent` may currently bid on `fire`.
    #[must_use]
    pub fn is_blacklisted(&self, agent: GroundId, fire: GridPos, tick: Tick) -> bool {
        self.blacklist
            .get(&(agent, fire))
            .is_some_and(|expiry| *expiry > tick)
    }

    #[must_use]
    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn clear(&mut self) {
        self.blacklist.clear();
    }

    /// Targets held by agents that are not idle.
    #[must_use]
    pub fn locked_targets(grounds: &SlotMap<GroundId, GroundAgent>) -> HashSet<GridPos> {
        grounds
            .values()
            .filter(|agent| agent.is_busy())
            .filter_map(GroundAgent::target)
            .collect()
    }

    /// Positions and targets of busy agents, tagged with their owner.
    fn busy_claims(grounds: &SlotMap<GroundId, GroundAgent>) -> Vec<(GroundId, GridPos)> {
        grounds
            .iter()
            .filter(|(_, agent)| agent.is_busy())
            .flat_map(|(id, agent)| {
                std::iter::once((id, agent.position()))
                    .chain(agent.target().map(|target| (id, target)))
            })
            .collect()
    }

    fn bids_for(
        &self,
        id: GroundId,
        agent: &GroundAgent,
        fires: &[GridPos],
        claims: &[(GroundId, GridPos)],
        ctx: &AuctionContext<'_>,
    ) -> Vec<Bid> {
        let radius = ctx.genome.crowd_radius;
        let crowd_weight = ctx.genome.crowd_penalty * self.settings.crowd_penalty_scale;
        let others = || claims.iter().filter(move |(owner, _)| *owner != id);
        fires
            .iter()
            .copied()
            .filter(|fire| !self.is_blacklisted(id, *fire, ctx.tick))
            .filter(|fire| !others().any(|(_, claim)| claim.manhattan(*fire) <= radius))
            .map(|fire| {
                let features = TaskFeatures::observe(
                    ctx.grid,
                    agent.position(),
                    fire,
                    agent.battery_fraction(),
                    agent.water_fraction(),
                );
                let distance = agent.position().manhattan(fire);
                let crowd = others()
                    .filter(|(_, claim)| claim.manhattan(fire) <= 2 * radius)
                    .count();
                let cost = agent.bid(&features, ctx.predictor, distance, &self.settings)
                    + crowd_weight * crowd as f32;
                Bid {
                    agent: id,
                    fire,
                    cost,
                    features,
                }
            })
            .collect()
    }

    fn try_assign(
        &mut self,
        grounds: &mut SlotMap<GroundId, GroundAgent>,
        bid: &Bid,
        ctx: &AuctionContext<'_>,
        fallback: bool,
    ) -> Option<Assignment> {
        let agent = grounds.get_mut(bid.agent)?;
        match find_path(ctx.grid, agent.position(), bid.fire, agent.water() > 0) {
            Some(route) => {
                let route_len = route.len();
                agent.assign(bid.fire, route, bid.features);
                info!(
                    agent = agent.label(),
                    fire = %bid.fire,
                    cost = bid.cost,
                    fallback,
                    "fire assigned"
                );
                Some(Assignment {
                    agent: bid.agent,
                    fire: bid.fire,
                    cost: bid.cost,
                    route_len,
                    fallback,
                })
            }
            None => {
                let expiry = ctx.tick.after(self.settings.blacklist_ticks);
                self.blacklist.insert((bid.agent, bid.fire), expiry);
                debug!(
                    agent = agent.label(),
                    fire = %bid.fire,
                    until = expiry.0,
                    "no route, pair blacklisted"
                );
                None
            }
        }
    }

    /// Run one auction and hand out tasks.
    pub fn run_cycle(
        &mut self,
        grounds: &mut SlotMap<GroundId, GroundAgent>,
        ctx: &AuctionContext<'_>,
    ) -> Vec<Assignment> {
        self.cycles += 1;
        let tick = ctx.tick;
        self.blacklist.retain(|_, expiry| *expiry > tick);

        let locked = Self::locked_targets(grounds);
        let fires: Vec<GridPos> = ctx
            .fires
            .iter()
            .copied()
            .filter(|fire| !locked.contains(fire))
            .collect();
        let bidders: Vec<(GroundId, &GroundAgent)> = grounds
            .iter()
            .filter(|(_, agent)| agent.is_available(ctx.fleet))
            .collect();
        if fires.is_empty() || bidders.is_empty() {
            return Vec::new();
        }

        let claims = Self::busy_claims(grounds);
        let this = &*self;
        let mut bids: Vec<Bid> = bidders
            .par_iter()
            .map(|(id, agent)| this.bids_for(*id, agent, &fires, &claims, ctx))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();
        bids.sort_by_key(|bid| (OrderedFloat(bid.cost), bid.fire, bid.agent));

        let radius = ctx.genome.crowd_radius;
        let mut busy_agents: HashSet<GroundId> = HashSet::new();
        let mut assignments: Vec<Assignment> = Vec::new();
        for bid in &bids {
            if bid.cost >= self.settings.reject_threshold {
                break;
            }
            if busy_agents.contains(&bid.agent)
                || assignments.iter().any(|taken| taken.fire.manhattan(bid.fire) <= radius)
            {
                continue;
            }
            if let Some(assignment) = self.try_assign(grounds, bid, ctx, false) {
                busy_agents.insert(bid.agent);
                assignments.push(assignment);
            }
        }

        if assignments.is_empty() {
            for bid in &bids {
                if self.is_blacklisted(bid.agent, bid.fire, tick) {
                    continue;
                }
                if let Some(assignment) = self.try_assign(grounds, bid, ctx, true) {
                    assignments.push(assignment);
                    break;
                }
            }
        }

        debug!(
            tick = tick.0,
            bids = bids.len(),
            assigned = assignments.len(),
            "dispatch cycle finished"
        );
        assignments
    }
}
