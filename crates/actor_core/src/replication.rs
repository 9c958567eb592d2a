//! Replicated unit properties.
//!
//! Declares which unit fields affect the outcome of the simulation and must
//! be kept identical on every replica. Each property has a stable numeric
//! id; the order of [`SYNCED_PROPERTIES`] is the wire order. The simulation
//! state hash is computed from exactly these values.

use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::PathResult;
use crate::unit::{Unit, UnitId};

/// A replicated unit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum SyncedProperty {
    /// Center point and altitude.
    Position = 1,
    /// Facing.
    Rotation = 2,
    /// Facing being turned towards.
    WantedRotation = 3,
    /// Velocity.
    Velocity = 4,
    /// Scalar speed.
    Speed = 5,
    /// Aircraft bank angle.
    Roll = 6,
    /// Health.
    Health = 7,
    /// Shields.
    Shields = 8,
    /// Movement state.
    MovingStatus = 9,
    /// Real work.
    Work = 10,
    /// Routine running next tick.
    AdvanceWork = 11,
    /// Target handle.
    Target = 12,
    /// Follow distance.
    FollowDistance = 13,
    /// Waypoint queue.
    Waypoints = 14,
    /// Path point queue.
    PathPoints = 15,
    /// Move order state.
    PathInfo = 16,
    /// Land mover lookahead state.
    Mover = 17,
    /// Weapon reload counters.
    Reload = 18,
    /// Running plugin and plugin work counters.
    Plugins = 19,
    /// Construction progress.
    ConstructionStep = 20,
    /// Ticks spent as wreckage.
    WreckageAge = 21,
}

/// All replicated properties in wire order.
pub const SYNCED_PROPERTIES: [SyncedProperty; 21] = [
    SyncedProperty::Position,
    SyncedProperty::Rotation,
    SyncedProperty::WantedRotation,
    SyncedProperty::Velocity,
    SyncedProperty::Speed,
    SyncedProperty::Roll,
    SyncedProperty::Health,
    SyncedProperty::Shields,
    SyncedProperty::MovingStatus,
    SyncedProperty::Work,
    SyncedProperty::AdvanceWork,
    SyncedProperty::Target,
    SyncedProperty::FollowDistance,
    SyncedProperty::Waypoints,
    SyncedProperty::PathPoints,
    SyncedProperty::PathInfo,
    SyncedProperty::Mover,
    SyncedProperty::Reload,
    SyncedProperty::Plugins,
    SyncedProperty::ConstructionStep,
    SyncedProperty::WreckageAge,
];

impl SyncedProperty {
    /// Stable wire id.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }
}

/// Current value of a replicated property, as raw integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncedValue {
    /// A single number; fixed-point values use their raw bits.
    Scalar(i64),
    /// An ordered list of numbers.
    List(Vec<i64>),
    /// A unit handle.
    Handle(Option<UnitId>),
}

fn bits(value: Fixed) -> i64 {
    value.to_bits()
}

fn push_vec2(out: &mut Vec<i64>, v: Vec2Fixed) {
    out.push(bits(v.x));
    out.push(bits(v.y));
}

fn vec3(v: Vec3Fixed) -> SyncedValue {
    SyncedValue::List(vec![bits(v.x), bits(v.y), bits(v.z)])
}

fn points<'a>(iter: impl Iterator<Item = &'a Vec2Fixed>) -> SyncedValue {
    let mut out = Vec::new();
    for p in iter {
        push_vec2(&mut out, *p);
    }
    SyncedValue::List(out)
}

fn cell(out: &mut Vec<i64>, cell: Option<(i32, i32)>) {
    match cell {
        Some((x, y)) => out.extend([1, i64::from(x), i64::from(y)]),
        None => out.push(0),
    }
}

const fn path_result_tag(result: PathResult) -> i64 {
    match result {
        PathResult::None => 0,
        PathResult::Ok => 1,
        PathResult::PartialOutOfRange => 2,
        PathResult::NoPath => 3,
    }
}

/// Read one property from a unit.
#[must_use]
pub fn synced_value(unit: &Unit, property: SyncedProperty) -> SyncedValue {
    match property {
        SyncedProperty::Position => vec3(unit.position),
        SyncedProperty::Rotation => SyncedValue::Scalar(bits(unit.rotation)),
        SyncedProperty::WantedRotation => SyncedValue::Scalar(bits(unit.wanted_rotation)),
        SyncedProperty::Velocity => vec3(unit.velocity),
        SyncedProperty::Speed => SyncedValue::Scalar(bits(unit.speed)),
        SyncedProperty::Roll => SyncedValue::Scalar(bits(unit.roll)),
        SyncedProperty::Health => SyncedValue::Scalar(i64::from(unit.health)),
        SyncedProperty::Shields => SyncedValue::Scalar(i64::from(unit.shields)),
        SyncedProperty::MovingStatus => SyncedValue::Scalar(unit.moving_status as i64),
        SyncedProperty::Work => SyncedValue::Scalar(unit.work as i64),
        SyncedProperty::AdvanceWork => SyncedValue::Scalar(unit.advance_work as i64),
        SyncedProperty::Target => SyncedValue::Handle(unit.target),
        SyncedProperty::FollowDistance => SyncedValue::Scalar(bits(unit.follow_distance)),
        SyncedProperty::Waypoints => points(unit.waypoints.iter()),
        SyncedProperty::PathPoints => points(unit.path_points.iter()),
        SyncedProperty::PathInfo => {
            let info = &unit.path_info;
            let mut out = Vec::new();
            push_vec2(&mut out, info.start);
            push_vec2(&mut out, info.dest);
            out.push(bits(info.range));
            out.push(path_result_tag(info.result));
            out.push(i64::from(info.move_attacking));
            out.push(i64::from(info.slow_down_at_dest));
            out.push(i64::from(info.waiting));
            out.push(i64::from(info.path_recalced));
            out.push(i64::from(info.blocked_ticks));
            out.push(info.target.map_or(-1, |t| i64::try_from(t).unwrap_or(i64::MAX)));
            push_vec2(&mut out, info.last_target_pos);
            for p in &info.llpath {
                push_vec2(&mut out, *p);
            }
            SyncedValue::List(out)
        }
        SyncedProperty::Mover => {
            let mover = &unit.mover;
            let mut out = vec![i64::from(mover.fresh_path)];
            cell(&mut out, mover.last_cell);
            cell(&mut out, Some(mover.next_cell));
            cell(&mut out, Some(mover.intersection_key));
            cell(&mut out, Some(mover.intersection_offset));
            SyncedValue::List(out)
        }
        SyncedProperty::Reload => SyncedValue::List(
            unit.weapons
                .iter()
                .map(|w| i64::from(w.reload_counter()))
                .collect(),
        ),
        SyncedProperty::Plugins => {
            let mut out = vec![unit
                .current_plugin
                .map_or(-1, |i| i64::try_from(i).unwrap_or(i64::MAX))];
            out.extend(unit.plugins.iter().map(|p| i64::from(p.work_counter)));
            SyncedValue::List(out)
        }
        SyncedProperty::ConstructionStep => SyncedValue::Scalar(i64::from(unit.construction_step)),
        SyncedProperty::WreckageAge => SyncedValue::Scalar(i64::from(unit.wreckage_age)),
    }
}

/// Read every replicated property of a unit, in wire order.
#[must_use]
pub fn synced_values(unit: &Unit) -> Vec<(SyncedProperty, SyncedValue)> {
    SYNCED_PROPERTIES
        .iter()
        .map(|&p| (p, synced_value(unit, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::UnitProperties;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let ids: Vec<u16> = SYNCED_PROPERTIES.iter().map(|p| p.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_values_track_unit_state() {
        let props = UnitProperties {
            id: 1,
            name: "probe".to_string(),
            size: 1,
            max_health: 20,
            max_shields: 0,
            armor: 0,
            max_speed: Fixed::ONE,
            acceleration: Fixed::ONE,
            deceleration: Fixed::ONE,
            rotation_speed: Fixed::from_num(10),
            crush_damage: 0,
            aircraft: false,
            preferred_altitude: Fixed::ZERO,
            depth: Fixed::ONE,
            construction_steps: 0,
            weapons: Vec::new(),
            plugins: Vec::new(),
        };
        let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(0, 0), Fixed::ZERO);
        let before = synced_values(&unit);
        assert_eq!(before.len(), SYNCED_PROPERTIES.len());
        unit.take_damage(5);
        assert_eq!(
            synced_value(&unit, SyncedProperty::Health),
            SyncedValue::Scalar(15)
        );
        assert_ne!(synced_values(&unit), before);
    }
}
