use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use ecoguardian_core::{GridPos, GuardianConfig, Simulation, find_path};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn bench_config(width: u32, height: u32) -> GuardianConfig {
    let mut config = GuardianConfig {
        grid_width: width,
        grid_height: height,
        rng_seed: Some(0xF1AE),
        initial_fires: 4,
        ..GuardianConfig::default()
    };
    config.fire.spread_probability = 0.05;
    let (w, h) = (width as i32, height as i32);
    config.fleet.ground_spawns = (0..8)
        .map(|i| GridPos::new((i * w / 8).min(w - 1), h - 2))
        .collect();
    config.fleet.scout_spawns = vec![GridPos::new(0, 0), GridPos::new(w - 1, h - 1)];
    config.fleet.rescue_spawns = vec![GridPos::new(w / 2, h - 1)];
    config
}

fn bench_world_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    let samples: usize = env_or("EG_BENCH_SAMPLES", 30).max(10);
    group.sample_size(samples);
    group.warm_up_time(Duration::from_secs(env_or("EG_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("EG_BENCH_MEASURE_SECS", 10)));
    // Steps per bench iteration (can override via EG_BENCH_STEPS)
    let steps: usize = env_or("EG_BENCH_STEPS", 64).max(1);
    let sizes: Vec<u32> = std::env::var("EG_BENCH_SIZES")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<u32>().ok())
                .filter(|v| *v >= 8)
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![40_u32, 80, 160]);
    for &size in &sizes {
        group.bench_function(format!("steps{steps}_grid{size}"), |b| {
            b.iter_batched(
                || Simulation::new(bench_config(size, size)).expect("simulation"),
                |mut sim| {
                    for _ in 0..steps {
                        sim.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_pathfinding(c: &mut Criterion) {
    let sim = Simulation::new(bench_config(160, 160)).expect("simulation");
    let grid = sim.grid();
    c.bench_function("find_path_160", |b| {
        b.iter(|| {
            find_path(
                grid,
                GridPos::new(1, 158),
                GridPos::new(158, 1),
                true,
            )
        });
    });
}

criterion_group!(benches, bench_world_steps, bench_pathfinding);
criterion_main!(benches);
