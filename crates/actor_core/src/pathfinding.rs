//! Path requests and the grid A* pathfinder.
//!
//! A unit never computes a long-range route itself. It fills a [`PathInfo`]
//! and hands it to a [`Pathfinder`], which sets [`PathInfo::result`] and the
//! low-level path buffer. [`GridPathfinder`] is the reference
//! implementation: 8-connected A* over passable terrain.
//!
//! All calculations use fixed-point math for deterministic results
//! across different platforms and clients.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::unit::UnitId;
use crate::world::World;

/// Outcome of the last path request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PathResult {
    /// No request made since the last reset.
    #[default]
    None,
    /// Complete path to the destination.
    Ok,
    /// The route is longer than one request returns; the path holds its
    /// beginning and a new request must be made once it is used up.
    PartialOutOfRange,
    /// The destination cannot be reached.
    NoPath,
}

/// A unit's in-progress move order and its pathfinding state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathInfo {
    /// Where the last request started.
    pub start: Vec2Fixed,
    /// Destination point.
    pub dest: Vec2Fixed,
    /// Acceptable Chebyshev distance to the destination, in cells.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Result of the last request.
    pub result: PathResult,
    /// Points returned by the last request, excluding the start cell.
    pub llpath: Vec<Vec2Fixed>,
    /// Engage enemies met on the way.
    pub move_attacking: bool,
    /// Drop speed to zero on arrival.
    pub slow_down_at_dest: bool,
    /// Ticks spent waiting on the current obstacle.
    pub waiting: u32,
    /// Path recalculations since the unit last moved freely.
    pub path_recalced: u32,
    /// Ticks spent blocked since the unit last moved freely.
    pub blocked_ticks: u32,
    /// Unit being moved to, re-read on every request.
    pub target: Option<UnitId>,
    /// Target position used by the last request.
    pub last_target_pos: Vec2Fixed,
    /// Mover is an aircraft.
    pub flying: bool,
    /// Footprint extent around the center cell.
    pub edge_distances: (i32, i32),
    /// Offset from a cell corner to where the unit's center sits.
    #[serde(with = "fixed_serde")]
    pub center_offset: Fixed,
}

impl PathInfo {
    /// Clear everything but the mover's shape.
    pub fn reset(&mut self) {
        *self = Self {
            flying: self.flying,
            edge_distances: self.edge_distances,
            center_offset: self.center_offset,
            ..Self::default()
        };
    }
}

/// Long-range route search.
pub trait Pathfinder {
    /// Search from `info.start` to `info.dest` and store the outcome in
    /// `info.result` and `info.llpath`.
    fn find_path(&self, world: &dyn World, info: &mut PathInfo);
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    x: i32,
    y: i32,
    /// `g + h`, ordered as a min-heap.
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Cost of a cardinal step.
const STRAIGHT_COST: u32 = 10;

/// Cost of a diagonal step, close to `STRAIGHT_COST * sqrt(2)`.
const DIAGONAL_COST: u32 = 14;

#[inline]
fn chebyshev(x1: i32, y1: i32, x2: i32, y2: i32) -> u32 {
    x1.abs_diff(x2).max(y1.abs_diff(y2))
}

#[inline]
#[allow(clippy::cast_sign_loss)]
fn coords_to_tie_breaker(x: i32, y: i32) -> u64 {
    (u64::from(y as u32) << 32) | u64::from(x as u32)
}

/// 8-connected A* over terrain passability.
///
/// Units are ignored; blocking by units is resolved locally by the mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPathfinder {
    /// Longest path returned by one request.
    pub max_path_len: usize,
    /// Nodes expanded before the search gives up.
    pub max_expanded: usize,
}

impl Default for GridPathfinder {
    fn default() -> Self {
        Self {
            max_path_len: 48,
            max_expanded: 16_384,
        }
    }
}

impl GridPathfinder {
    /// Whether a unit with this footprint can stand centered on the cell.
    fn passable(world: &dyn World, x: i32, y: i32, (e1, e2): (i32, i32)) -> bool {
        for cy in (y - e1)..=(y + e2) {
            for cx in (x - e1)..=(x + e2) {
                if !world.cell(cx, cy).is_some_and(|c| c.passable) {
                    return false;
                }
            }
        }
        true
    }

    /// Check that a diagonal step does not cut a blocked corner.
    fn diagonal_valid(world: &dyn World, x: i32, y: i32, dx: i32, dy: i32, edges: (i32, i32)) -> bool {
        if dx != 0 && dy != 0 {
            Self::passable(world, x + dx, y, edges) && Self::passable(world, x, y + dy, edges)
        } else {
            true
        }
    }

    fn search(
        &self,
        world: &dyn World,
        start: (i32, i32),
        goal: (i32, i32),
        range: u32,
        edges: (i32, i32),
    ) -> Option<Vec<(i32, i32)>> {
        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut g_score: HashMap<(i32, i32), u32> = HashMap::new();

        g_score.insert(start, 0);
        open_set.push(AStarNode {
            x: start.0,
            y: start.1,
            f_score: chebyshev(start.0, start.1, goal.0, goal.1) * STRAIGHT_COST,
            tie_breaker: coords_to_tie_breaker(start.0, start.1),
        });

        let mut expanded = 0;
        while let Some(current) = open_set.pop() {
            let pos = (current.x, current.y);
            if chebyshev(current.x, current.y, goal.0, goal.1) <= range {
                return Some(reconstruct_path(&came_from, pos));
            }
            expanded += 1;
            if expanded > self.max_expanded {
                break;
            }
            let current_g = g_score.get(&pos).copied().unwrap_or(u32::MAX);

            for &(dx, dy) in &DIRECTIONS {
                let next = (current.x + dx, current.y + dy);
                if !Self::passable(world, next.0, next.1, edges)
                    || !Self::diagonal_valid(world, current.x, current.y, dx, dy, edges)
                {
                    continue;
                }
                let step = if dx != 0 && dy != 0 {
                    DIAGONAL_COST
                } else {
                    STRAIGHT_COST
                };
                let tentative_g = current_g.saturating_add(step);
                if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, pos);
                    g_score.insert(next, tentative_g);
                    open_set.push(AStarNode {
                        x: next.0,
                        y: next.1,
                        f_score: tentative_g
                            + chebyshev(next.0, next.1, goal.0, goal.1) * STRAIGHT_COST,
                        tie_breaker: coords_to_tie_breaker(next.0, next.1),
                    });
                }
            }
        }
        None
    }
}

/// Walk `came_from` back from `end`. The start cell is not included.
fn reconstruct_path(came_from: &HashMap<(i32, i32), (i32, i32)>, end: (i32, i32)) -> Vec<(i32, i32)> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    // Last pushed is the start cell.
    path.pop();
    path.reverse();
    path
}

impl Pathfinder for GridPathfinder {
    fn find_path(&self, world: &dyn World, info: &mut PathInfo) {
        info.llpath.clear();
        let start = info.start.cell();
        let goal = info.dest.cell();
        let range = info.range.max(Fixed::ZERO).to_num::<u32>();

        if !world.on_map(start.0, start.1) {
            info.result = PathResult::NoPath;
            return;
        }

        let Some(cells) = self.search(world, start, goal, range, info.edge_distances) else {
            tracing::debug!(?start, ?goal, "no path");
            info.result = PathResult::NoPath;
            return;
        };

        let offset = info.center_offset;
        let truncated = cells.len() > self.max_path_len;
        info.llpath = cells
            .into_iter()
            .take(self.max_path_len)
            .map(|(x, y)| Vec2Fixed::new(Fixed::from_num(x) + offset, Fixed::from_num(y) + offset))
            .collect();
        info.result = if truncated {
            PathResult::PartialOutOfRange
        } else {
            PathResult::Ok
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::UnitTypeRegistry;
    use crate::simulation::UnitStorage;
    use crate::world::{OccupancyIndex, TerrainMap, WorldView};

    fn request(from: (i32, i32), to: (i32, i32)) -> PathInfo {
        PathInfo {
            start: Vec2Fixed::cell_center(from.0, from.1),
            dest: Vec2Fixed::cell_center(to.0, to.1),
            center_offset: Fixed::from_num(0.5),
            ..PathInfo::default()
        }
    }

    fn run(terrain: &TerrainMap, finder: &GridPathfinder, info: &mut PathInfo) {
        let units = UnitStorage::new();
        let registry = UnitTypeRegistry::new();
        let occupancy = OccupancyIndex::build(terrain, &units, &registry);
        let world = WorldView {
            terrain,
            occupancy: &occupancy,
            units: &units,
            registry: &registry,
        };
        finder.find_path(&world, info);
    }

    #[test]
    fn test_straight_path_excludes_start() {
        let terrain = TerrainMap::new(16, 4);
        let mut info = request((0, 0), (5, 0));
        run(&terrain, &GridPathfinder::default(), &mut info);
        assert_eq!(info.result, PathResult::Ok);
        assert_eq!(info.llpath.len(), 5);
        assert_eq!(info.llpath[0], Vec2Fixed::cell_center(1, 0));
        assert_eq!(info.llpath[4], Vec2Fixed::cell_center(5, 0));
    }

    #[test]
    fn test_path_around_wall() {
        let mut terrain = TerrainMap::new(10, 10);
        for y in 0..8 {
            terrain.set_passable(5, y, false);
        }
        let mut info = request((2, 2), (8, 2));
        run(&terrain, &GridPathfinder::default(), &mut info);
        assert_eq!(info.result, PathResult::Ok);
        assert_eq!(info.llpath.last(), Some(&Vec2Fixed::cell_center(8, 2)));
        for p in &info.llpath {
            let (x, y) = p.cell();
            assert!(terrain.get(x, y).unwrap().passable);
        }
    }

    #[test]
    fn test_no_corner_cutting() {
        let mut terrain = TerrainMap::new(3, 3);
        terrain.set_passable(1, 0, false);
        terrain.set_passable(0, 1, false);
        let mut info = request((0, 0), (1, 1));
        run(&terrain, &GridPathfinder::default(), &mut info);
        assert_eq!(info.result, PathResult::NoPath);
        assert!(info.llpath.is_empty());
    }

    #[test]
    fn test_range_stops_early() {
        let terrain = TerrainMap::new(16, 4);
        let mut info = request((0, 0), (10, 0));
        info.range = Fixed::from_num(3);
        run(&terrain, &GridPathfinder::default(), &mut info);
        assert_eq!(info.result, PathResult::Ok);
        assert_eq!(info.llpath.last(), Some(&Vec2Fixed::cell_center(7, 0)));
    }

    #[test]
    fn test_long_path_is_partial() {
        let terrain = TerrainMap::new(32, 2);
        let finder = GridPathfinder {
            max_path_len: 8,
            ..GridPathfinder::default()
        };
        let mut info = request((0, 0), (20, 0));
        run(&terrain, &finder, &mut info);
        assert_eq!(info.result, PathResult::PartialOutOfRange);
        assert_eq!(info.llpath.len(), 8);
        assert_eq!(info.llpath[7], Vec2Fixed::cell_center(8, 0));
    }

    #[test]
    fn test_deterministic_paths() {
        let mut terrain = TerrainMap::new(12, 12);
        terrain.set_passable(6, 6, false);
        let mut a = request((0, 0), (11, 11));
        let mut b = request((0, 0), (11, 11));
        run(&terrain, &GridPathfinder::default(), &mut a);
        run(&terrain, &GridPathfinder::default(), &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset_keeps_shape() {
        let mut info = request((0, 0), (3, 3));
        info.flying = true;
        info.edge_distances = (1, 1);
        info.waiting = 7;
        info.reset();
        assert!(info.flying);
        assert_eq!(info.edge_distances, (1, 1));
        assert_eq!(info.center_offset, Fixed::from_num(0.5));
        assert_eq!(info.waiting, 0);
        assert_eq!(info.dest, Vec2Fixed::ZERO);
    }
}
