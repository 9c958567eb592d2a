//! Aircraft steering.

use crate::dispatch::TickContext;
use crate::math::{
    direction_from_rotation, normalize_rotation, rotation_delta, rotation_to_point, Fixed,
    Vec3Fixed,
};
use crate::unit::{MovingStatus, Unit};

use super::interrupt_move;

/// Bank angle while circling.
const CIRCLE_ROLL: Fixed = Fixed::const_from_int(25);

/// Bank angle at full turn rate.
const MAX_ROLL: Fixed = Fixed::const_from_int(45);

/// Roll change per tick.
const ROLL_STEP: Fixed = Fixed::const_from_int(2);

/// Circling aircraft keep their speed between 70% and 80% of the maximum.
const CIRCLE_MIN_FACTOR: Fixed = Fixed::from_bits(3_006_477_107);
const CIRCLE_MAX_FACTOR: Fixed = Fixed::from_bits(3_435_973_837);

/// Routine body for aircraft in [`WorkMode::Move`](crate::unit::WorkMode::Move).
pub fn advance_move(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if let Some(id) = unit.path_info.target {
        let Some(target) = ctx.living(id) else {
            unit.stop_moving();
            return;
        };
        unit.path_info.dest = target.center();
    }
    if interrupt_move(unit, ctx) {
        return;
    }

    let props = ctx.properties;
    unit.accelerate(props);

    let dest = unit.path_info.dest;
    let center = unit.center();
    let (dx, dy) = (dest.x - center.x, dest.y - center.y);
    let distance = (dest - center).length();
    if distance <= unit.path_info.range || distance <= unit.speed {
        tracing::debug!(unit = unit.id(), "aircraft arrived");
        unit.stop_moving();
        unit.moving_status = MovingStatus::Standing;
        return;
    }

    let wanted = rotation_to_point(dx, dy);
    let (delta, clockwise) = rotation_delta(unit.rotation, wanted);
    let max_turn = props.rotation_speed;
    let turn = delta.min(max_turn);
    unit.rotation = if clockwise {
        normalize_rotation(unit.rotation + turn)
    } else {
        normalize_rotation(unit.rotation - turn)
    };

    let mut wanted_roll = if max_turn > Fixed::ZERO {
        (delta / max_turn).min(Fixed::ONE) * MAX_ROLL
    } else {
        Fixed::ZERO
    };
    if !clockwise {
        wanted_roll = -wanted_roll;
    }
    roll_towards(unit, wanted_roll);

    set_velocity_from_rotation(unit, ctx);
    unit.moving_status = MovingStatus::Moving;
}

/// Idle flight: keep circling at cruise speed and altitude.
pub fn fly_in_circle(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    let props = ctx.properties;
    let factor = if props.max_speed > Fixed::ZERO {
        unit.speed / props.max_speed
    } else {
        Fixed::ZERO
    };
    if factor < CIRCLE_MIN_FACTOR {
        unit.accelerate(props);
    } else if factor > CIRCLE_MAX_FACTOR {
        unit.decelerate(props);
    }

    unit.rotation = normalize_rotation(unit.rotation + props.rotation_speed);
    keep_on_map(unit, ctx);
    set_velocity_from_rotation(unit, ctx);
    roll_towards(unit, CIRCLE_ROLL);
}

/// Velocity along the facing, plus a climb or descent back into the band
/// of one unit around cruise altitude.
fn set_velocity_from_rotation(unit: &mut Unit, ctx: &TickContext<'_>) {
    let dir = direction_from_rotation(unit.rotation).scale(unit.speed);
    let next = unit.center() + dir;
    let ground = ctx.world.height_at(next.x, next.y);
    let wanted = ground + ctx.properties.preferred_altitude;
    let z = unit.position.z;
    let vz = if z < wanted - Fixed::ONE || z > wanted + Fixed::ONE {
        (wanted - z).clamp(-Fixed::ONE, Fixed::ONE)
    } else {
        Fixed::ZERO
    };
    unit.velocity = Vec3Fixed::new(dir.x, dir.y, vz);
}

/// Pull a circling aircraft back when it drifts onto the map border.
fn keep_on_map(unit: &mut Unit, ctx: &TickContext<'_>) {
    let size = Fixed::from_num(ctx.properties.size);
    let half = Fixed::from_bits(1 << 31);
    let low = Fixed::ONE;
    let width = Fixed::from_num(ctx.world.map_width());
    let height = Fixed::from_num(ctx.world.map_height());
    let high_x = (width - size - Fixed::ONE).max(low);
    let high_y = (height - size - Fixed::ONE).max(low);

    let pos = &mut unit.position;
    if pos.x < half || pos.x > width - half {
        pos.x = pos.x.clamp(low, high_x);
    }
    if pos.y < half || pos.y > height - half {
        pos.y = pos.y.clamp(low, high_y);
    }
}

fn roll_towards(unit: &mut Unit, wanted: Fixed) {
    unit.roll = if unit.roll < wanted {
        (unit.roll + ROLL_STEP).min(wanted)
    } else {
        (unit.roll - ROLL_STEP).max(wanted)
    };
}
