//! Ground unit path following.
//!
//! The pathfinder returns one point per cell. While moving, a unit skips
//! ahead to the farthest point it can reach in a straight line without
//! crossing a blocked cell, using the precomputed [`GeometryTables`]. Before
//! each step it computes the cell it is about to enter; an occupied cell
//! makes it wait, periodically re-requesting a path and eventually giving
//! up.
//!
//! [`GeometryTables`]: crate::geometry::GeometryTables

use crate::collision::{cell_occupied, is_crushable};
use crate::dispatch::TickContext;
use crate::math::{rotation_to_point, Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::PathResult;
use crate::unit::{MovingStatus, Unit, WorkMode};

use super::{attack_while_moving, interrupt_move, waypoint_reached};

/// Path points skipped at most per lookahead.
const MAX_SKIPPED_POINTS: usize = 6;

/// Path points this many cells away are never looked at.
const LOOKAHEAD_CELLS: i32 = 6;

/// Ticks a blocked unit waits in total before it gives up.
pub const GIVE_UP_TICKS: u32 = 600;

/// Squared distance a tracked unit may move before the path is recomputed.
const TARGET_DRIFT_SQUARED: Fixed = Fixed::const_from_int(25);

/// Routine body for ground units in [`WorkMode::Move`].
pub fn advance_move(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    advance_move_internal(unit, ctx);
    if matches!(unit.advance_work(), WorkMode::Move | WorkMode::Turn) {
        advance_move_check(unit, ctx);
    }
}

fn advance_move_internal(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if unit.path_info.waiting > 0 {
        return;
    }
    if !ctx.properties.is_mobile() {
        unit.stop_moving();
        return;
    }

    if unit.moving_status == MovingStatus::MustSearch {
        if attack_while_moving(unit, ctx) {
            return;
        }
        if !new_path(unit, ctx) {
            return;
        }
    } else if !track_move_target(unit, ctx) {
        return;
    }

    if unit.path_points.is_empty() {
        if unit.path_info.result != PathResult::PartialOutOfRange {
            waypoint_reached(unit);
            return;
        }
        if !new_path(unit, ctx) {
            return;
        }
    }

    if interrupt_move(unit, ctx) {
        return;
    }

    let center = unit.center();
    let old_speed = unit.speed;
    unit.accelerate(ctx.properties);

    let mut dist = unit.speed;
    let mut step = Vec2Fixed::ZERO;
    // At most one re-plan per tick; a blocked fresh path waits for the next.
    let mut replanned = false;
    let mut engaged = false;
    while dist > Fixed::ZERO {
        if unit.path_points.is_empty() {
            if unit.path_info.result == PathResult::PartialOutOfRange
                && !replanned
                && new_path_from(unit, center + step, ctx)
            {
                replanned = true;
                continue;
            }
            break;
        }

        let cur = (center + step).cell();
        if unit.mover.last_cell != Some(cur) {
            if unit.mover.fresh_path {
                current_path_point_changed(unit, cur);
                unit.mover.fresh_path = false;
            }
            if unit.path_points.front().map(|p| p.cell()) != Some(cur) {
                select_next_path_point(unit, cur, ctx);
                unit.mover.last_cell = Some(cur);
            }
        }

        if let Some(blocked) = blocked_on_way(unit, cur, ctx) {
            if replanned {
                if step == Vec2Fixed::ZERO {
                    start_waiting(unit, blocked);
                }
                break;
            }
            if !new_path_from(unit, center + step, ctx) {
                break;
            }
            replanned = true;
            current_path_point_changed(unit, cur);
            select_next_path_point(unit, cur, ctx);
            unit.mover.last_cell = Some(cur);
            continue;
        }

        let Some(&point) = unit.path_points.front() else {
            break;
        };
        let (delta, moved) = move_towards_point(center + step, point, dist);
        step = step + delta;
        dist -= moved;

        if center + step == point {
            unit.path_points.pop_front();
            current_path_point_changed(unit, point.cell());
            if attack_while_moving(unit, ctx) {
                engaged = true;
                break;
            }
        }
    }

    // Stopped, borrowed or engaged while stepping.
    if engaged || unit.advance_work() != WorkMode::Move {
        return;
    }
    if step == Vec2Fixed::ZERO {
        unit.velocity = Vec3Fixed::ZERO;
        if unit.moving_status == MovingStatus::Moving {
            unit.moving_status = MovingStatus::Waiting;
        }
        return;
    }

    unit.velocity = Vec3Fixed::new(step.x, step.y, Fixed::ZERO);
    unit.moving_status = MovingStatus::Moving;
    let facing = unit.turn_to(rotation_to_point(step.x, step.y), ctx.properties);
    if !facing && old_speed == Fixed::ZERO {
        // Turn in place before driving off.
        unit.velocity = Vec3Fixed::ZERO;
    }
}

/// Collision and blocking checks after the step was decided.
fn advance_move_check(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if unit.path_info.waiting > 0 {
        wait_for_next_cell(unit, ctx);
        return;
    }

    let next_center = unit.center() + unit.velocity.xy();
    let (e1, e2) = ctx.properties.edge_distances();
    let (cx, cy) = next_center.cell();
    if cx - e1 < 0
        || cy - e1 < 0
        || cx + e2 >= ctx.world.map_width()
        || cy + e2 >= ctx.world.map_height()
    {
        tracing::warn!(unit = unit.id(), cx, cy, "unit would leave the map");
        unit.stop_moving();
        return;
    }

    if unit.path_points.is_empty() || unit.velocity.is_zero() {
        return;
    }

    let next = next_cell(unit, (cx, cy), ctx);
    unit.mover.next_cell = next;

    if cell_occupied(unit, next.0, next.1, false, ctx) {
        tracing::trace!(unit = unit.id(), ?next, "next cell occupied");
        unit.velocity = Vec3Fixed::ZERO;
        unit.moving_status = MovingStatus::Waiting;
        unit.speed = Fixed::ZERO;
        unit.path_info.waiting += 1;
        unit.path_info.blocked_ticks += 1;
        return;
    }

    crush_occupants(unit, next, ctx);
    unit.path_info.waiting = 0;
    unit.path_info.path_recalced = 0;
    unit.path_info.blocked_ticks = 0;
}

/// A blocked unit re-checks every fifth tick. It re-requests a path at a
/// growing interval and gives up after [`GIVE_UP_TICKS`] in total.
fn wait_for_next_cell(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    unit.path_info.blocked_ticks += 1;
    let waiting = unit.path_info.waiting;
    if waiting % 5 != 0 {
        unit.path_info.waiting += 1;
        return;
    }

    let (nx, ny) = unit.mover.next_cell;
    if !cell_occupied(unit, nx, ny, false, ctx) {
        unit.path_info.waiting = 0;
        unit.moving_status = MovingStatus::Waiting;
        return;
    }

    if unit.path_info.blocked_ticks >= GIVE_UP_TICKS {
        tracing::debug!(unit = unit.id(), "blocked for too long, giving up");
        unit.stop_moving();
        unit.set_work(WorkMode::Idle);
        return;
    }

    let interval = 20 + (unit.path_info.path_recalced * 20).min(80);
    if waiting % interval == 0 {
        tracing::debug!(unit = unit.id(), recalced = unit.path_info.path_recalced, "re-requesting path");
        unit.path_info.path_recalced += 1;
        unit.path_info.waiting = 0;
        new_path(unit, ctx);
        return;
    }
    unit.path_info.waiting += 1;
}

/// Request a path from the unit's center to its destination.
///
/// A move towards another unit aims at that unit's current position. On
/// failure the move is stopped.
pub(crate) fn new_path(unit: &mut Unit, ctx: &TickContext<'_>) -> bool {
    new_path_from(unit, unit.center(), ctx)
}

/// Like [`new_path`], starting from `from`, where the unit will be after
/// the part of this tick's step already taken.
fn new_path_from(unit: &mut Unit, from: Vec2Fixed, ctx: &TickContext<'_>) -> bool {
    unit.path_info.start = from;
    if let Some(id) = unit.path_info.target {
        let Some(target) = ctx.living(id) else {
            unit.stop_moving();
            return false;
        };
        unit.path_info.dest = target.center();
        unit.path_info.last_target_pos = target.center();
    }

    unit.path_points.clear();
    ctx.pathfinder.find_path(ctx.world, &mut unit.path_info);
    if unit.path_info.result == PathResult::NoPath || unit.path_info.llpath.is_empty() {
        tracing::debug!(unit = unit.id(), result = ?unit.path_info.result, "no path");
        unit.stop_moving();
        return false;
    }

    unit.path_points = unit.path_info.llpath.iter().copied().collect();
    unit.mover.last_cell = None;
    unit.mover.fresh_path = true;
    unit.mover.intersection_key = (0, 0);
    unit.mover.intersection_offset = from.cell();
    if unit.moving_status == MovingStatus::MustSearch {
        unit.moving_status = MovingStatus::Standing;
    }
    true
}

/// Re-path when the unit being moved to has drifted away.
fn track_move_target(unit: &mut Unit, ctx: &TickContext<'_>) -> bool {
    let Some(id) = unit.path_info.target else {
        return true;
    };
    let Some(target) = ctx.living(id) else {
        unit.stop_moving();
        return false;
    };
    if target.center().distance_squared(unit.path_info.last_target_pos) > TARGET_DRIFT_SQUARED {
        return new_path(unit, ctx);
    }
    true
}

/// Skip path points that can be reached in a straight line from `cur`.
fn select_next_path_point(unit: &mut Unit, cur: (i32, i32), ctx: &TickContext<'_>) {
    let geometry = ctx.geometry;
    let mut skipped = 0;
    while skipped < MAX_SKIPPED_POINTS && unit.path_points.len() > 1 {
        let (nx, ny) = unit.path_points[1].cell();
        let (dx, dy) = (nx - cur.0, ny - cur.1);
        if dx.abs() >= LOOKAHEAD_CELLS || dy.abs() >= LOOKAHEAD_CELLS {
            break;
        }
        let Some(cells) = geometry.intersections(dx, dy) else {
            break;
        };
        let blocked = cells
            .iter()
            .any(|&(ox, oy)| cell_occupied(unit, cur.0 + ox, cur.1 + oy, true, ctx));
        if blocked {
            break;
        }
        unit.path_points.pop_front();
        skipped += 1;
    }
    if skipped > 0 {
        current_path_point_changed(unit, cur);
    }
}

/// First cell on the straight line to the current path point that holds a
/// standing unit, or the point's own cell when it is out of lookahead.
fn blocked_on_way(unit: &Unit, cur: (i32, i32), ctx: &TickContext<'_>) -> Option<(i32, i32)> {
    let (px, py) = unit.path_points.front()?.cell();
    let (dx, dy) = (px - cur.0, py - cur.1);
    if dx.abs() >= LOOKAHEAD_CELLS || dy.abs() >= LOOKAHEAD_CELLS {
        return Some((px, py));
    }
    let Some(cells) = ctx.geometry.intersections(dx, dy) else {
        return Some((px, py));
    };
    for &(ox, oy) in cells {
        let cell = (cur.0 + ox, cur.1 + oy);
        for &id in ctx.world.occupants(cell.0, cell.1) {
            if id == unit.id() || ctx.effects.is_doomed(id) {
                continue;
            }
            let Some(other) = ctx.world.unit(id) else {
                continue;
            };
            if other.is_flying()
                || other.moving_status() == MovingStatus::Moving
                || is_crushable(unit, other, ctx)
            {
                continue;
            }
            return Some(cell);
        }
    }
    None
}

/// Hand a unit stuck in front of `cell` to the waiting policy of
/// [`wait_for_next_cell`].
fn start_waiting(unit: &mut Unit, cell: (i32, i32)) {
    tracing::trace!(unit = unit.id(), ?cell, "way blocked after re-plan");
    unit.mover.next_cell = cell;
    unit.velocity = Vec3Fixed::ZERO;
    unit.speed = Fixed::ZERO;
    unit.moving_status = MovingStatus::Waiting;
    unit.path_info.waiting = 1;
}

/// Point the lookahead at the cells between `cur` and the current path
/// point.
fn current_path_point_changed(unit: &mut Unit, cur: (i32, i32)) {
    if unit.is_flying() {
        return;
    }
    let Some(point) = unit.path_points.front() else {
        return;
    };
    let (px, py) = point.cell();
    unit.mover.intersection_key = (px - cur.0, py - cur.1);
    unit.mover.intersection_offset = cur;
}

/// The cell after `cur` on the way to the current path point.
fn next_cell(unit: &Unit, cur: (i32, i32), ctx: &TickContext<'_>) -> (i32, i32) {
    let (kx, ky) = unit.mover.intersection_key;
    let (ox, oy) = unit.mover.intersection_offset;
    let cells = ctx.geometry.intersections(kx, ky).unwrap_or(&[]);
    let Some(&first) = cells.first() else {
        return unit.path_points.front().map_or(cur, |p| p.cell());
    };
    let rel = cells
        .iter()
        .position(|&(x, y)| (x + ox, y + oy) == cur)
        .map_or(first, |i| cells[(i + 1).min(cells.len() - 1)]);
    (rel.0 + ox, rel.1 + oy)
}

/// Flatten crushable units in the footprint of `cell`.
fn crush_occupants(unit: &Unit, (x, y): (i32, i32), ctx: &mut TickContext<'_>) {
    let (e1, e2) = ctx.properties.edge_distances();
    let mut victims = Vec::new();
    for cy in (y - e1)..=(y + e2) {
        for cx in (x - e1)..=(x + e2) {
            for &id in ctx.world.occupants(cx, cy) {
                if id == unit.id() || ctx.effects.is_doomed(id) || victims.contains(&id) {
                    continue;
                }
                if ctx.world.unit(id).is_some_and(|other| is_crushable(unit, other, ctx)) {
                    victims.push(id);
                }
            }
        }
    }
    for id in victims {
        ctx.effects.crush(unit.id(), id);
    }
}

/// Step from `pos` towards `point` by at most `max`.
///
/// Returns the step and its length. A point within reach is hit exactly.
fn move_towards_point(pos: Vec2Fixed, point: Vec2Fixed, max: Fixed) -> (Vec2Fixed, Fixed) {
    let diff = point - pos;
    if diff == Vec2Fixed::ZERO {
        return (Vec2Fixed::ZERO, Fixed::ZERO);
    }
    let len = diff.length();
    if len <= max {
        return (diff, len);
    }
    (Vec2Fixed::new(diff.x * max / len, diff.y * max / len), max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_towards_point_exact_arrival() {
        let pos = Vec2Fixed::cell_center(0, 0);
        let point = Vec2Fixed::cell_center(1, 0);
        let (step, moved) = move_towards_point(pos, point, Fixed::from_num(2));
        assert_eq!(pos + step, point);
        assert_eq!(moved, Fixed::ONE);
    }

    #[test]
    fn test_move_towards_point_partial() {
        let pos = Vec2Fixed::cell_center(0, 0);
        let point = Vec2Fixed::cell_center(4, 0);
        let (step, moved) = move_towards_point(pos, point, Fixed::from_num(0.5));
        assert_eq!(step, Vec2Fixed::new(Fixed::from_num(0.5), Fixed::ZERO));
        assert_eq!(moved, Fixed::from_num(0.5));
    }

    #[test]
    fn test_move_towards_point_diagonal_bounded() {
        let pos = Vec2Fixed::cell_center(0, 0);
        let point = Vec2Fixed::cell_center(3, 3);
        let (step, moved) = move_towards_point(pos, point, Fixed::ONE);
        assert_eq!(moved, Fixed::ONE);
        assert!(step.length() <= Fixed::ONE + Fixed::from_bits(16));
        assert_eq!(step.x, step.y);
    }
}
