use std::collections::HashSet;

use ecoguardian_core::{
    CellState, ControlCommand, FireSettings, Grid, GridPos, GroundStatus, GuardianConfig,
    Simulation, TickEvents, WindDirection, WorldSnapshot, apply_control_command,
};

fn run_events(config: GuardianConfig, ticks: usize) -> Vec<TickEvents> {
    let mut sim = Simulation::new(config).expect("simulation");
    (0..ticks).map(|_| sim.step()).collect()
}

/// 20x20 open map with a single depot in the far corner and a fire in the middle.
fn scenario() -> (GuardianConfig, Grid) {
    let mut config = GuardianConfig {
        grid_width: 20,
        grid_height: 20,
        rng_seed: Some(42),
        initial_fires: 0,
        ..GuardianConfig::default()
    };
    config.fire = FireSettings {
        spread_probability: 0.0,
        spontaneous_ignition: 0.0,
        ..FireSettings::default()
    };
    config.fleet.ground_spawns = vec![GridPos::new(0, 0)];
    config.fleet.scout_spawns = vec![GridPos::new(9, 9)];
    config.fleet.rescue_spawns = Vec::new();
    config.dispatch.interval = 1;

    let mut grid = Grid::new(20, 20, WindDirection::East, config.fire.clone()).expect("grid");
    grid.set(GridPos::new(19, 19), CellState::Depot);
    grid.plant(GridPos::new(10, 10));
    assert!(grid.ignite(GridPos::new(10, 10)));
    (config, grid)
}

#[test]
fn seeded_world_advances_deterministically() {
    let config = GuardianConfig {
        rng_seed: Some(0xABCDEF),
        initial_fires: 3,
        ..GuardianConfig::default()
    };
    let events_a = run_events(config.clone(), 300);
    let events_b = run_events(config.clone(), 300);
    assert_eq!(events_a, events_b);
    assert_eq!(events_a.last().map(|events| events.tick.0), Some(300));
}

#[test]
fn single_agent_extinguishes_central_fire() {
    let (config, grid) = scenario();
    let mut sim = Simulation::with_grid(config, grid).expect("simulation");
    let id = sim.ground_agents().keys().next().expect("agent");
    let fire = GridPos::new(10, 10);

    let mut assigned = false;
    for _ in 0..60 {
        let events = sim.step();
        assigned |= events.assignments.iter().any(|a| a.agent == id && a.fire == fire);
        if assigned && sim.ground_agents()[id].status() == GroundStatus::Idle {
            break;
        }
    }

    let agent = &sim.ground_agents()[id];
    assert!(assigned, "agent was never dispatched");
    assert_eq!(agent.position(), fire);
    assert_ne!(sim.grid().get(fire), CellState::Fire);
    assert_eq!(agent.status(), GroundStatus::Idle);
    assert_eq!(agent.battery(), sim.config().fleet.max_battery - 20);
}

#[test]
fn reset_restores_hand_built_map() {
    let (config, grid) = scenario();
    let template = grid.clone();
    let mut sim = Simulation::with_grid(config, grid).expect("simulation");
    for _ in 0..30 {
        sim.step();
    }
    assert_ne!(sim.grid().cells(), template.cells());

    apply_control_command(&mut sim, ControlCommand::Reset);
    assert_eq!(sim.grid().cells(), template.cells());
    let agent = sim.ground_agents().values().next().expect("agent");
    assert_eq!(agent.position(), GridPos::new(0, 0));
    assert_eq!(agent.status(), GroundStatus::Idle);
    assert!(sim.discovered().is_empty());
}

#[test]
fn fleet_invariants_hold_over_long_run() {
    let config = GuardianConfig {
        rng_seed: Some(2024),
        initial_fires: 2,
        ..GuardianConfig::default()
    };
    let max_battery = config.fleet.max_battery;
    let max_water = config.fleet.max_water;
    let mut sim = Simulation::new(config).expect("simulation");

    for tick in 0..1_500 {
        if tick % 250 == 0 {
            apply_control_command(&mut sim, ControlCommand::IgniteRandom);
        }
        let events = sim.step();

        let mut targets = HashSet::new();
        for agent in sim.ground_agents().values() {
            assert!(agent.battery() <= max_battery);
            assert!(agent.water() <= max_water);
            if agent.status() == GroundStatus::Moving {
                let target = agent.target().expect("moving agents hold a target");
                assert!(
                    targets.insert(target),
                    "two agents chasing {target} at tick {}",
                    events.tick.0
                );
            }
        }
        for fire in sim.discovered() {
            assert_eq!(sim.grid().get(*fire), CellState::Fire);
        }
    }

    let totals = sim.totals();
    assert!(totals.assignments > 0);
    assert!(totals.extinguished > 0);
    assert!(sim.predictor().updates() > 0);
    // Default windows last 600 ticks: two genomes have been scored so far.
    assert_eq!(sim.optimizer().current_index(), 2);
}

#[test]
fn snapshot_serializes_for_external_viewers() {
    let mut config = GuardianConfig {
        rng_seed: Some(5),
        grid_width: 16,
        grid_height: 12,
        ..GuardianConfig::default()
    };
    config.fleet.ground_spawns = vec![GridPos::new(1, 10), GridPos::new(14, 10)];
    config.fleet.scout_spawns = vec![GridPos::new(0, 0)];
    config.fleet.rescue_spawns = vec![GridPos::new(8, 11)];
    let mut sim = Simulation::new(config).expect("simulation");
    for _ in 0..20 {
        sim.step();
    }

    let snapshot = sim.snapshot();
    assert_eq!(snapshot.cells.len(), 16 * 12);
    assert_eq!(snapshot.ground.len(), 2);
    assert_eq!(snapshot.tick.0, 20);

    let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
    let decoded: WorldSnapshot = serde_json::from_str(&json).expect("deserialize snapshot");
    assert_eq!(decoded.cells, snapshot.cells);
    assert_eq!(decoded.ground, snapshot.ground);
    assert_eq!(decoded.log, snapshot.log);
}
