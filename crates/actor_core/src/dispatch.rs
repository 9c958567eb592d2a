//! Per-tick routine dispatch.
//!
//! Every [`WorkMode`] maps to exactly one routine in a fixed table. A unit
//! runs the routine of its *advance* work, which lets a short-lived mode
//! such as a turn or an approach move borrow control from the real work
//! without replacing it.
//!
//! Routines read other units only through the committed snapshot behind
//! [`TickContext::world`] and never mutate them. Whatever they do to other
//! units is recorded in the [`EffectQueue`] and applied after all units have
//! advanced.

use std::collections::{BTreeMap, BTreeSet};

use crate::combat;
use crate::construction;
use crate::geometry::GeometryTables;
use crate::math::{normalize_rotation, rotation_delta, Fixed, Vec3Fixed};
use crate::movement;
use crate::pathfinding::Pathfinder;
use crate::plugins;
use crate::properties::UnitProperties;
use crate::unit::{absorb_damage, MovingStatus, Unit, UnitId, WorkMode};
use crate::world::{Diplomacy, World};

/// Ticks a wreck stays on the map before it is removed.
pub const WRECKAGE_LIFETIME: u32 = 400;

/// A change to another unit, applied after the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEffect {
    /// A weapon hit.
    Damage {
        /// Shooter.
        source: UnitId,
        /// Victim.
        target: UnitId,
        /// Index of the weapon that fired.
        weapon: usize,
        /// Raw damage before shields and armor.
        amount: u32,
    },
    /// Driven over by a heavier unit.
    Crush {
        /// Crusher.
        source: UnitId,
        /// Victim.
        target: UnitId,
    },
    /// A facility finished construction.
    ConstructionCompleted {
        /// The facility.
        unit: UnitId,
    },
}

/// Effects emitted during one tick, in emission order.
///
/// Also tracks the predicted state of damaged units so that later shooters
/// in the same tick do not waste shots on a unit that is already dead.
#[derive(Debug, Default)]
pub struct EffectQueue {
    effects: Vec<UnitEffect>,
    predicted: BTreeMap<UnitId, (u32, u32)>,
    doomed: BTreeSet<UnitId>,
}

impl EffectQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit on `target` and return whether it is predicted to die.
    pub fn damage(&mut self, source: UnitId, target: &Unit, weapon: usize, amount: u32) -> bool {
        self.effects.push(UnitEffect::Damage {
            source,
            target: target.id(),
            weapon,
            amount,
        });
        let (health, shields) = self
            .predicted
            .entry(target.id())
            .or_insert((target.health(), target.shields()));
        let (rest, loss) = absorb_damage(*shields, target.armor, amount);
        *shields = rest;
        *health = health.saturating_sub(loss);
        if *health == 0 {
            self.doomed.insert(target.id());
            true
        } else {
            false
        }
    }

    /// Record that `source` drives over `target`.
    pub fn crush(&mut self, source: UnitId, target: UnitId) {
        if self.doomed.insert(target) {
            tracing::debug!(source, target, "crushing unit");
        }
        self.effects.push(UnitEffect::Crush { source, target });
    }

    /// Record a finished facility.
    pub fn construction_completed(&mut self, unit: UnitId) {
        self.effects
            .push(UnitEffect::ConstructionCompleted { unit });
    }

    /// Whether the unit is already predicted to die this tick.
    #[must_use]
    pub fn is_doomed(&self, id: UnitId) -> bool {
        self.doomed.contains(&id)
    }

    /// Consume the queue.
    #[must_use]
    pub fn into_effects(self) -> Vec<UnitEffect> {
        self.effects
    }
}

/// Everything a routine may consult while advancing one unit.
pub struct TickContext<'a> {
    /// One-based index of the running tick.
    pub tick: u64,
    /// Committed state from the previous tick.
    pub world: &'a dyn World,
    /// Player relations.
    pub diplomacy: &'a dyn Diplomacy,
    /// Route search.
    pub pathfinder: &'a dyn Pathfinder,
    /// Lookahead cell tables.
    pub geometry: &'a GeometryTables,
    /// Static data of the advancing unit.
    pub properties: &'a UnitProperties,
    /// Changes to other units.
    pub effects: &'a mut EffectQueue,
}

impl<'a> TickContext<'a> {
    /// Whether the running tick falls on a multiple of `period`.
    #[must_use]
    pub const fn every(&self, period: u64) -> bool {
        self.tick % period == 0
    }

    /// Resolve a living unit from the snapshot.
    #[must_use]
    pub fn living(&self, id: UnitId) -> Option<&'a Unit> {
        let world = self.world;
        world.unit(id).filter(|u| !u.is_destroyed())
    }
}

/// A behavior routine.
pub type Routine = fn(&mut Unit, &mut TickContext<'_>);

/// One routine per [`WorkMode`], indexed by [`WorkMode::index`].
const ROUTINES: [Routine; WorkMode::COUNT] = [
    advance_none,
    advance_idle,
    movement::advance_move,
    combat::advance_attack,
    advance_turn,
    construction::advance_construction,
    advance_destroyed,
    movement::advance_follow,
    plugins::advance_plugin,
];

/// Routine for a work mode.
#[must_use]
pub const fn routine(work: WorkMode) -> Routine {
    ROUTINES[work.index()]
}

/// Run the routine of the unit's advance work once.
pub fn dispatch(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    routine(unit.advance_work())(unit, ctx);
}

fn advance_none(_unit: &mut Unit, _ctx: &mut TickContext<'_>) {}

/// Watch for enemies. Scans are staggered so idle armies stay cheap.
fn advance_idle(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    let scan = if unit.target().is_none() {
        ctx.tick % 40 == 10
    } else {
        ctx.every(10)
    };
    if scan {
        if !ctx.properties.can_shoot() && !unit.is_flying() {
            unit.set_advance_work(WorkMode::None);
            return;
        }
        combat::attack_enemies_in_range(unit, ctx);
    }
    if unit.is_flying() && unit.advance_work() == WorkMode::Idle {
        movement::flying::fly_in_circle(unit, ctx);
    }
}

/// Rotate towards the wanted rotation, at most the rotation speed per tick.
fn advance_turn(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    // The kept step of velocity is only used once.
    if !unit.is_flying() {
        unit.velocity = Vec3Fixed::ZERO;
        if unit.moving_status == MovingStatus::Moving {
            unit.moving_status = MovingStatus::Standing;
        }
    }

    let (delta, clockwise) = rotation_delta(unit.rotation, unit.wanted_rotation);
    let step = ctx.properties.rotation_speed;
    if delta <= step {
        unit.rotation = unit.wanted_rotation;
    } else if clockwise {
        unit.rotation = normalize_rotation(unit.rotation + step);
    } else {
        unit.rotation = normalize_rotation(unit.rotation - step);
    }

    if unit.rotation != unit.wanted_rotation {
        return;
    }
    if unit.work() == WorkMode::Turn {
        unit.set_work(WorkMode::Idle);
    } else if unit.advance_work() != unit.work() {
        if unit.path_points.is_empty() && unit.waypoints.is_empty() {
            unit.set_advance_work(unit.work());
        } else {
            unit.set_advance_work(WorkMode::Move);
        }
    }
}

/// Sink wreckage into the ground over its lifetime.
fn advance_destroyed(unit: &mut Unit, ctx: &mut TickContext<'_>) {
    if !ctx.every(10) {
        return;
    }
    let lifetime = Fixed::from_num(WRECKAGE_LIFETIME);
    let sink = ctx.properties.depth * 6 / 5 / lifetime;
    unit.velocity = Vec3Fixed::new(Fixed::ZERO, Fixed::ZERO, -sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_table_matches_modes() {
        let modes = [
            WorkMode::None,
            WorkMode::Idle,
            WorkMode::Move,
            WorkMode::Attack,
            WorkMode::Turn,
            WorkMode::Construct,
            WorkMode::Destroyed,
            WorkMode::Follow,
            WorkMode::Plugin,
        ];
        assert_eq!(modes.len(), WorkMode::COUNT);
        for (i, mode) in modes.iter().enumerate() {
            assert_eq!(mode.index(), i);
        }
    }

    #[test]
    fn test_kill_prediction_accumulates() {
        use crate::math::Vec2Fixed;
        use crate::properties::UnitProperties;

        let props = UnitProperties {
            id: 1,
            name: "scout".to_string(),
            size: 1,
            max_health: 15,
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
        let target = Unit::new(7, 2, &props, Vec2Fixed::cell_center(1, 1), Fixed::ZERO);
        let mut queue = EffectQueue::new();
        assert!(!queue.damage(1, &target, 0, 10));
        assert!(!queue.is_doomed(7));
        assert!(queue.damage(2, &target, 0, 10));
        assert!(queue.is_doomed(7));
        queue.crush(3, 9);
        assert!(queue.is_doomed(9));
        assert_eq!(queue.into_effects().len(), 3);
    }
}
