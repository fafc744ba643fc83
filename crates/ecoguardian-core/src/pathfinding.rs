//! Best-first grid routing with cargo-aware fire costs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::GridPos;
use crate::grid::{CellState, Grid};

/// Step cost of entering a burning cell without water aboard.
pub const FIRE_TRAVERSAL_COST: u32 = 1_000;

const STEPS_4: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

fn step_cost(grid: &Grid, pos: GridPos, goal: GridPos, has_payload: bool) -> Option<u32> {
    match grid.get(pos) {
        CellState::Wall => None,
        _ if pos == goal => Some(1),
        CellState::Fire if !has_payload => Some(FIRE_TRAVERSAL_COST),
        _ => Some(1),
    }
}

/// Lowest-cost 4-connected route from `start` to `goal`.
///
/// The returned cells exclude `start`, so the length equals the number of moves.
/// Walls are impassable and a walled goal is unreachable. Burning cells cost a
/// single step when `has_payload` is set and [`FIRE_TRAVERSAL_COST`] otherwise;
/// the goal itself may burn either way. The search gives up after
/// `2 * width * height` expansions and reports the route as unreachable.
#[must_use]
pub fn find_path(
    grid: &Grid,
    start: GridPos,
    goal: GridPos,
    has_payload: bool,
) -> Option<Vec<GridPos>> {
    if !grid.contains(start) || !grid.contains(goal) || grid.get(goal) == CellState::Wall {
        return None;
    }
    if start == goal {
        return Some(Vec::new());
    }

    let budget = 2 * (grid.width() as usize) * (grid.height() as usize);
    let mut open = BinaryHeap::new();
    let mut best: HashMap<GridPos, u32> = HashMap::new();
    let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();

    best.insert(start, 0);
    open.push(Reverse((start.manhattan(goal), start, 0_u32)));

    let mut expansions = 0_usize;
    while let Some(Reverse((_, current, cost))) = open.pop() {
        if best.get(&current).is_some_and(|known| *known < cost) {
            continue;
        }
        if current == goal {
            return Some(reconstruct(&came_from, start, goal));
        }
        expansions += 1;
        if expansions > budget {
            return None;
        }
        for (dx, dy) in STEPS_4 {
            let next = current.offset(dx, dy);
            let Some(step) = step_cost(grid, next, goal, has_payload) else {
                continue;
            };
            let tentative = cost.saturating_add(step);
            if best.get(&next).is_some_and(|known| *known <= tentative) {
                continue;
            }
            best.insert(next, tentative);
            came_from.insert(next, current);
            open.push(Reverse((
                tentative.saturating_add(next.manhattan(goal)),
                next,
                tentative,
            )));
        }
    }
    None
}

fn reconstruct(came_from: &HashMap<GridPos, GridPos>, start: GridPos, goal: GridPos) -> Vec<GridPos> {
    let mut path = vec![goal];
    let mut cursor = goal;
    while let Some(previous) = came_from.get(&cursor) {
        if *previous == start {
            break;
        }
        path.push(*previous);
        cursor = *previous;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FireSettings, grid::WindDirection};

    fn empty_grid(width: u32, height: u32) -> Grid {
        Grid::new(width, height, WindDirection::North, FireSettings::default()).expect("grid")
    }

    fn burn(grid: &mut Grid, pos: GridPos) {
        grid.plant(pos);
        grid.ignite(pos);
    }

    fn assert_connected(start: GridPos, path: &[GridPos]) {
        let mut previous = start;
        for cell in path {
            assert_eq!(previous.manhattan(*cell), 1, "{previous} -> {cell}");
            previous = *cell;
        }
    }

    #[test]
    fn open_grid_path_matches_manhattan_distance() {
        let grid = empty_grid(20, 20);
        let start = GridPos::new(0, 0);
        for goal in [GridPos::new(10, 10), GridPos::new(19, 0), GridPos::new(3, 17)] {
            let path = find_path(&grid, start, goal, false).expect("reachable");
            assert_eq!(path.len() as u32, start.manhattan(goal));
            assert_eq!(path.last(), Some(&goal));
            assert!(!path.contains(&start));
            assert_connected(start, &path);
        }
    }

    #[test]
    fn trivial_and_unreachable_requests() {
        let mut grid = empty_grid(5, 5);
        let here = GridPos::new(2, 2);
        assert_eq!(find_path(&grid, here, here, false), Some(Vec::new()));

        grid.set(GridPos::new(4, 4), CellState::Wall);
        assert_eq!(find_path(&grid, here, GridPos::new(4, 4), true), None);
        assert_eq!(find_path(&grid, here, GridPos::new(7, 1), true), None);

        for y in 0..5 {
            grid.set(GridPos::new(3, y), CellState::Wall);
        }
        assert_eq!(find_path(&grid, GridPos::new(0, 0), GridPos::new(4, 0), true), None);
    }

    #[test]
    fn dry_agents_detour_around_fire() {
        let mut grid = empty_grid(7, 7);
        for y in 0..6 {
            burn(&mut grid, GridPos::new(3, y));
        }
        let start = GridPos::new(0, 0);
        let goal = GridPos::new(6, 0);

        let dry = find_path(&grid, start, goal, false).expect("detour");
        assert!(dry.iter().all(|cell| grid.get(*cell) != CellState::Fire));
        assert!(dry.len() as u32 > start.manhattan(goal));
        assert_connected(start, &dry);

        let wet = find_path(&grid, start, goal, true).expect("straight");
        assert_eq!(wet.len() as u32, start.manhattan(goal));
    }

    #[test]
    fn fire_is_a_last_resort_without_payload() {
        let mut grid = empty_grid(5, 1);
        burn(&mut grid, GridPos::new(2, 0));
        let path = find_path(&grid, GridPos::new(0, 0), GridPos::new(4, 0), false)
            .expect("only route crosses fire");
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn burning_goal_is_always_enterable() {
        let mut grid = empty_grid(6, 6);
        let goal = GridPos::new(4, 4);
        burn(&mut grid, goal);
        let path = find_path(&grid, GridPos::new(0, 0), goal, false).expect("goal");
        assert_eq!(path.len(), 8);
        assert_eq!(path.last(), Some(&goal));
    }
}
