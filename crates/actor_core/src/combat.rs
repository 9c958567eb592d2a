//! Target selection and firing.
//!
//! Shots resolve instantly: firing records a damage effect against the
//! snapshot of the target and predicts whether it dies, so that later
//! weapons and units do not keep shooting at a corpse in the same tick.

use crate::dispatch::TickContext;
use crate::math::{rotation_delta, rotation_to_point, Fixed, Vec2Fixed};
use crate::movement::flying;
use crate::properties::UnitProperties;
use crate::unit::{Unit, WorkMode};

/// Largest facing error, in degrees, at which fixed weapons still fire.
const FIRING_ARC: Fixed = Fixed::const_from_int(5);

/// Routine for [`WorkMode::Attack`], evaluated every fifth tick.
///
/// Out of range the unit borrows a move towards the target. In range it
/// faces the target and fires every ready weapon that can hit it.
pub fn advance_attack(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if !ctx.every(5) {
        if unit.is_flying() {
            flying::fly_in_circle(unit, ctx);
        }
        return;
    }

    let Some(target) = unit
        .target()
        .and_then(|id| ctx.living(id))
        .filter(|t| !ctx.effects.is_doomed(t.id()))
    else {
        tracing::debug!(unit = unit.id(), "attack target gone");
        unit.stop_attacking();
        return;
    };

    let range = unit.range_against(target);
    if !unit.in_range(range, target) {
        let approach = if range >= Fixed::ONE {
            range - Fixed::ONE
        } else {
            range
        };
        if unit.move_to_point(target.center(), approach, ctx.world, ctx.properties) {
            unit.set_advance_work(WorkMode::Move);
        } else {
            unit.set_work(WorkMode::Idle);
        }
        return;
    }

    let fixed_mount = unit.weapons.iter().any(|w| !w.properties.turret);
    if fixed_mount && !face_target(unit, target.center(), ctx.properties) {
        return;
    }

    let mut killed = false;
    for index in 0..unit.weapons.len() {
        let weapon = &unit.weapons[index];
        let ready = weapon.properties.auto_use
            && weapon.reloaded()
            && weapon.properties.can_hit(target.is_flying())
            && unit.in_range(weapon.properties.range, target);
        if ready && !killed {
            killed = fire(unit, index, target, ctx);
        }
    }
    if killed {
        tracing::debug!(unit = unit.id(), target = target.id(), "target destroyed");
        unit.stop_attacking();
    }
}

/// Shoot at whatever is in range with every ready auto-use weapon.
///
/// Keeps the current target while it is alive and within the maximum weapon
/// range, otherwise picks the best enemy in range. Returns `true` if the
/// unit has something to fight; this includes turning to face it.
pub fn attack_enemies_in_range(unit: &mut Unit, ctx: &mut TickContext<'_>) -> bool {
    if !ctx.properties.can_shoot() {
        return false;
    }

    let mut found = false;
    for index in 0..unit.weapons.len() {
        let weapon = &unit.weapons[index];
        if !weapon.properties.auto_use || !weapon.reloaded() {
            continue;
        }

        let current = unit
            .target()
            .and_then(|id| ctx.living(id))
            .filter(|t| !ctx.effects.is_doomed(t.id()) && unit.in_range(unit.max_weapon_range(), t));
        let target = match current {
            Some(target) => target,
            None => {
                let Some(best) = best_enemy_in_range(unit, ctx) else {
                    unit.target = None;
                    return found;
                };
                unit.target = Some(best.id());
                best
            }
        };
        found = true;

        let weapon = &unit.weapons[index].properties;
        if !weapon.turret && !face_target(unit, target.center(), ctx.properties) {
            return true;
        }
        let weapon = &unit.weapons[index].properties;
        if weapon.can_hit(target.is_flying())
            && unit.in_range(weapon.range, target)
            && fire(unit, index, target, ctx)
        {
            unit.target = None;
        }
    }
    found || unit.target().is_some()
}

/// The enemy most worth shooting at among those in range.
///
/// Enemies able to shoot back at the unit's domain come first, then other
/// armed enemies, then everything else. Within a tier the candidate with
/// the highest id wins.
pub fn best_enemy_in_range<'a>(unit: &Unit, ctx: &TickContext<'a>) -> Option<&'a Unit> {
    let world = ctx.world;
    let mut threat = None;
    let mut armed = None;
    let mut harmless = None;

    for id in world.units_near(unit.center(), unit.max_weapon_range()) {
        if id == unit.id() || ctx.effects.is_doomed(id) {
            continue;
        }
        let Some(other) = world.unit(id) else {
            continue;
        };
        if !ctx.diplomacy.is_enemy(unit.owner(), other.owner()) {
            continue;
        }
        let range = unit.range_against(other);
        if range == Fixed::ZERO || !unit.in_range(range, other) {
            continue;
        }

        let props = world.properties(other.type_id());
        let shoots_back = props.is_some_and(|p| {
            if unit.is_flying() {
                p.can_shoot_at_air()
            } else {
                p.can_shoot_at_land()
            }
        });
        if shoots_back {
            threat = Some(other);
        } else if props.is_some_and(UnitProperties::can_shoot) {
            armed = Some(other);
        } else {
            harmless = Some(other);
        }
    }
    threat.or(armed).or(harmless)
}

/// Turn a fixed-weapon ground unit towards `point`.
///
/// Returns `true` if it already faces the point closely enough to fire.
fn face_target(unit: &mut Unit, point: Vec2Fixed, props: &UnitProperties) -> bool {
    if !props.is_mobile() || unit.is_flying() {
        return true;
    }
    let center = unit.center();
    let wanted = rotation_to_point(point.x - center.x, point.y - center.y);
    let (delta, _) = rotation_delta(unit.rotation(), wanted);
    if delta <= FIRING_ARC {
        return true;
    }
    unit.turn_to(wanted, props)
}

/// Fire one weapon. Returns whether the target is predicted to die.
fn fire(unit: &mut Unit, index: usize, target: &Unit, ctx: &mut TickContext<'_>) -> bool {
    let id = unit.id();
    let Some(weapon) = unit.weapons.get_mut(index) else {
        return false;
    };
    weapon.fire();
    let damage = weapon.properties.damage;
    tracing::trace!(
        tick = ctx.tick,
        unit = id,
        target = target.id(),
        weapon = %weapon.properties.name,
        damage,
        "fire"
    );
    ctx.effects.damage(id, target, index, damage)
}
