//! Cell occupancy tests for ground movers.

use crate::dispatch::TickContext;
use crate::unit::{MovingStatus, Unit};
use crate::world::Relation;

/// Whether `mover` would flatten `other` by driving over it.
///
/// Only light units of other players are crushed; allies always block.
#[must_use]
pub fn is_crushable(mover: &Unit, other: &Unit, ctx: &TickContext<'_>) -> bool {
    if other.is_flying() || other.is_destroyed() {
        return false;
    }
    let crush = ctx.properties.crush_damage;
    if crush == 0 || other.max_health() > crush {
        return false;
    }
    matches!(
        ctx.diplomacy.relation(mover.owner(), other.owner()),
        Relation::Enemy | Relation::Neutral
    )
}

/// Whether `unit` cannot stand centered on cell `(x, y)`.
///
/// Cells near the border, impassable terrain and other ground units block.
/// Units the mover would crush never block, nor do units already doomed this
/// tick. With `ignore_moving` set, units that are on the move are ignored as
/// well since they will likely be gone by the time the mover arrives.
#[must_use]
pub fn cell_occupied(unit: &Unit, x: i32, y: i32, ignore_moving: bool, ctx: &TickContext<'_>) -> bool {
    if unit.is_flying() {
        return false;
    }
    let world = ctx.world;
    let (e1, e2) = ctx.properties.edge_distances();
    if x < e1 || y < e1 || x > world.map_width() - 1 - e2 || y > world.map_height() - 1 - e2 {
        return true;
    }

    for cy in (y - e1)..=(y + e2) {
        for cx in (x - e1)..=(x + e2) {
            if !world.cell(cx, cy).is_some_and(|c| c.passable) {
                return true;
            }
            for &id in world.occupants(cx, cy) {
                if id == unit.id() || ctx.effects.is_doomed(id) {
                    continue;
                }
                let Some(other) = world.unit(id) else {
                    continue;
                };
                if other.is_flying() || is_crushable(unit, other, ctx) {
                    continue;
                }
                if ignore_moving && other.moving_status() == MovingStatus::Moving {
                    continue;
                }
                return true;
            }
        }
    }
    false
}
