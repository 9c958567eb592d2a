//! Movement routines.
//!
//! Ground units follow the low-level path returned by the pathfinder,
//! looking a few cells ahead to cut corners and to detect blockers
//! ([`land`]). Aircraft ignore paths and steer straight at their
//! destination with a bounded turn rate ([`flying`]).

pub mod flying;
pub mod land;

use crate::combat;
use crate::dispatch::TickContext;
use crate::math::Fixed;
use crate::pathfinding::PathResult;
use crate::unit::{MovingStatus, Unit, WorkMode};

/// Routine for [`WorkMode::Move`].
pub fn advance_move(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if unit.is_flying() {
        flying::advance_move(unit, ctx);
    } else {
        land::advance_move(unit, ctx);
    }
}

/// Routine for [`WorkMode::Follow`]: stay within the follow distance of the
/// target, checked every fifth tick.
pub fn advance_follow(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if !ctx.every(5) {
        if unit.is_flying() {
            flying::fly_in_circle(unit, ctx);
        }
        return;
    }
    let Some(target) = unit.target().and_then(|id| ctx.living(id)) else {
        tracing::debug!(unit = unit.id(), "follow target lost");
        unit.set_work(WorkMode::Idle);
        return;
    };

    let distance = unit.follow_distance();
    if unit.center().chebyshev_distance(target.center()) <= distance + Fixed::ONE {
        return;
    }
    if unit.move_to_unit(target, distance, ctx.world, ctx.properties) {
        unit.set_advance_work(WorkMode::Move);
    } else {
        unit.set_work(WorkMode::Idle);
    }
}

/// Fight enemies met on the way when the move order allows it.
///
/// Returns `true` while the unit is busy fighting. A ground unit stands
/// still meanwhile.
pub(crate) fn attack_while_moving(unit: &mut Unit, ctx: &mut TickContext<'_>) -> bool {
    if !unit.path_info.move_attacking {
        return false;
    }
    if !combat::attack_enemies_in_range(unit, ctx) {
        return false;
    }
    if !unit.is_flying() {
        unit.velocity = crate::math::Vec3Fixed::ZERO;
        unit.speed = Fixed::ZERO;
        if unit.moving_status != MovingStatus::MustSearch {
            unit.moving_status = MovingStatus::Engaging;
        }
    }
    true
}

/// Shared start-of-tick checks for a move.
///
/// A move borrowed by an attack ends as soon as the target is in range or
/// gone. A move-attack order looks for enemies when it has a target and
/// every tenth tick otherwise. Returns `true` if the move routine must not
/// advance this tick.
pub(crate) fn interrupt_move(unit: &mut Unit, ctx: &mut TickContext<'_>) -> bool {
    if unit.advance_work() != unit.work() {
        if unit.work() != WorkMode::Attack {
            return false;
        }
        let Some(target) = unit.target().and_then(|id| ctx.living(id)) else {
            unit.stop_attacking();
            return true;
        };
        if unit.in_range(unit.range_against(target), target) {
            if !unit.is_flying() {
                unit.moving_status = MovingStatus::Standing;
            }
            unit.stop_moving();
            return true;
        }
        return false;
    }
    if unit.path_info.move_attacking && (unit.target().is_some() || ctx.every(10)) {
        return attack_while_moving(unit, ctx);
    }
    false
}

/// The path to the current waypoint is used up.
///
/// Continues with the next queued waypoint or ends the move.
pub(crate) fn waypoint_reached(unit: &mut Unit) {
    unit.waypoints.pop_front();
    if let Some(&next) = unit.waypoints.front() {
        tracing::debug!(unit = unit.id(), x = %next.x, y = %next.y, "next waypoint");
        unit.path_info.dest = next;
        unit.path_info.result = PathResult::None;
        unit.moving_status = MovingStatus::MustSearch;
    } else {
        unit.stop_moving();
    }
}
