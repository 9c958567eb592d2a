//! Per-unit state.
//!
//! A [`Unit`] owns everything its behavior routines mutate: kinematics,
//! health, the work mode pair, its path queues and [`PathInfo`], weapon
//! reload timers, plugins and construction progress. Other units are only
//! referenced by [`UnitId`] and resolved against committed state each tick.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::math::{normalize_rotation, rotation_delta, Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::PathInfo;
use crate::properties::{
    PluginKind, UnitProperties, UnitTypeId, WeaponProperties, MAX_WEAPONS_PER_UNIT,
};
use crate::world::World;

/// Unique unit identifier.
pub type UnitId = u64;

/// Owning player.
pub type PlayerId = u32;

/// Movement state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovingStatus {
    /// Not moving.
    #[default]
    Standing,
    /// Following a path.
    Moving,
    /// Blocked on the path, waiting for the next cell to clear.
    Waiting,
    /// Stopped on the way to fight.
    Engaging,
    /// A move was ordered; the path is requested on the next move tick.
    MustSearch,
}

/// High-level behavior a unit executes. Each mode has exactly one routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkMode {
    /// Nothing to do; the unit is not scheduled.
    None = 0,
    /// Watching for enemies.
    #[default]
    Idle = 1,
    /// Following a path.
    Move = 2,
    /// Fighting a target.
    Attack = 3,
    /// Turning in place.
    Turn = 4,
    /// Being built.
    Construct = 5,
    /// Wreckage.
    Destroyed = 6,
    /// Staying close to another unit.
    Follow = 7,
    /// Running a plugin.
    Plugin = 8,
}

impl WorkMode {
    /// Number of modes.
    pub const COUNT: usize = 9;

    /// Position in the routine table.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A mounted weapon and its reload timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Weapon {
    /// Static definition.
    pub properties: WeaponProperties,
    reload_counter: u32,
}

impl Weapon {
    /// A loaded weapon.
    #[must_use]
    pub const fn new(properties: WeaponProperties) -> Self {
        Self {
            properties,
            reload_counter: 0,
        }
    }

    /// Ready to fire.
    #[must_use]
    pub const fn reloaded(&self) -> bool {
        self.reload_counter == 0
    }

    /// Ticks until ready.
    #[must_use]
    pub const fn reload_counter(&self) -> u32 {
        self.reload_counter
    }

    /// Restore a saved timer, clamped to the reload time.
    pub fn set_reload_counter(&mut self, counter: u32) {
        self.reload_counter = counter.min(self.properties.reload);
    }

    /// Advance the timer by one tick.
    pub fn reload(&mut self) {
        self.reload_counter = self.reload_counter.saturating_sub(1);
    }

    /// Start a reload cycle.
    pub fn fire(&mut self) {
        self.reload_counter = self.properties.reload;
    }
}

/// A capability instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// What the plugin does.
    pub kind: PluginKind,
    /// Ticks of work performed.
    pub work_counter: u32,
}

/// Land mover bookkeeping for local path following.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoverState {
    /// Cell where path points were last skipped.
    pub last_cell: Option<(i32, i32)>,
    /// A path was just received and the intersection list is stale.
    pub fresh_path: bool,
    /// Cell the unit enters next.
    pub next_cell: (i32, i32),
    /// Intersection table entry towards the current path point.
    pub intersection_key: (i32, i32),
    /// Absolute cell the intersection entry is relative to.
    pub intersection_offset: (i32, i32),
}

/// A simulated game object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) type_id: UnitTypeId,
    pub(crate) owner: PlayerId,

    pub(crate) position: Vec3Fixed,
    pub(crate) rotation: Fixed,
    pub(crate) wanted_rotation: Fixed,
    pub(crate) velocity: Vec3Fixed,
    pub(crate) speed: Fixed,
    pub(crate) roll: Fixed,

    pub(crate) health: u32,
    pub(crate) max_health: u32,
    pub(crate) shields: u32,
    pub(crate) max_shields: u32,
    pub(crate) armor: u32,

    pub(crate) moving_status: MovingStatus,
    pub(crate) work: WorkMode,
    pub(crate) advance_work: WorkMode,

    pub(crate) target: Option<UnitId>,
    pub(crate) follow_distance: Fixed,
    pub(crate) waypoints: VecDeque<Vec2Fixed>,
    pub(crate) path_points: VecDeque<Vec2Fixed>,
    pub(crate) path_info: PathInfo,
    pub(crate) mover: MoverState,

    pub(crate) weapons: Vec<Weapon>,
    pub(crate) plugins: Vec<Plugin>,
    pub(crate) current_plugin: Option<usize>,

    pub(crate) construction_step: u32,
    pub(crate) construction_total: u32,
    pub(crate) wreckage_age: u32,

    pub(crate) flying: bool,
    pub(crate) max_air_range: Fixed,
    pub(crate) max_land_range: Fixed,
    pub(crate) max_range: Fixed,
}

impl Unit {
    /// Create a unit of the given type centered at `center`.
    ///
    /// Facilities start in [`WorkMode::Construct`], everything else idle.
    /// Aircraft start at cruise altitude with three quarters of top speed.
    #[must_use]
    pub fn new(
        id: UnitId,
        owner: PlayerId,
        props: &UnitProperties,
        center: Vec2Fixed,
        ground: Fixed,
    ) -> Self {
        let mut weapon_defs = props.weapons.clone();
        if weapon_defs.len() > MAX_WEAPONS_PER_UNIT {
            tracing::warn!(
                unit = id,
                count = weapon_defs.len(),
                "too many weapons, dropping the excess"
            );
            weapon_defs.truncate(MAX_WEAPONS_PER_UNIT);
        }

        let flying = props.aircraft;
        let (z, speed) = if flying {
            (
                ground + props.preferred_altitude,
                props.max_speed * Fixed::from_bits(3 << 30),
            )
        } else {
            (ground, Fixed::ZERO)
        };

        let center_offset = if props.size % 2 == 1 {
            Fixed::from_bits(1 << 31)
        } else {
            Fixed::ZERO
        };
        let path_info = PathInfo {
            flying,
            edge_distances: props.edge_distances(),
            center_offset,
            ..PathInfo::default()
        };

        let work = if props.is_facility() {
            WorkMode::Construct
        } else {
            WorkMode::Idle
        };

        let mut unit = Self {
            id,
            type_id: props.id,
            owner,
            position: Vec3Fixed::new(center.x, center.y, z),
            rotation: Fixed::ZERO,
            wanted_rotation: Fixed::ZERO,
            velocity: Vec3Fixed::ZERO,
            speed,
            roll: Fixed::ZERO,
            health: props.max_health,
            max_health: props.max_health,
            shields: props.max_shields,
            max_shields: props.max_shields,
            armor: props.armor,
            moving_status: MovingStatus::Standing,
            work,
            advance_work: work,
            target: None,
            follow_distance: Fixed::ZERO,
            waypoints: VecDeque::new(),
            path_points: VecDeque::new(),
            path_info,
            mover: MoverState::default(),
            weapons: weapon_defs.into_iter().map(Weapon::new).collect(),
            plugins: props
                .plugin_kinds()
                .into_iter()
                .map(|kind| Plugin {
                    kind,
                    work_counter: 0,
                })
                .collect(),
            current_plugin: None,
            construction_step: 0,
            construction_total: props.construction_steps,
            wreckage_age: 0,
            flying,
            max_air_range: Fixed::ZERO,
            max_land_range: Fixed::ZERO,
            max_range: Fixed::ZERO,
        };
        unit.recalculate_max_weapon_range();
        unit
    }

    /// Unit id.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Unit type.
    #[must_use]
    pub const fn type_id(&self) -> UnitTypeId {
        self.type_id
    }

    /// Owning player.
    #[must_use]
    pub const fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Center point and altitude.
    #[must_use]
    pub const fn position(&self) -> Vec3Fixed {
        self.position
    }

    /// Center point on the ground plane.
    #[must_use]
    pub const fn center(&self) -> Vec2Fixed {
        self.position.xy()
    }

    /// Facing in degrees, `[0, 360)`.
    #[must_use]
    pub const fn rotation(&self) -> Fixed {
        self.rotation
    }

    /// Current velocity.
    #[must_use]
    pub const fn velocity(&self) -> Vec3Fixed {
        self.velocity
    }

    /// Current scalar speed.
    #[must_use]
    pub const fn speed(&self) -> Fixed {
        self.speed
    }

    /// Bank angle of an aircraft.
    #[must_use]
    pub const fn roll(&self) -> Fixed {
        self.roll
    }

    /// Health points.
    #[must_use]
    pub const fn health(&self) -> u32 {
        self.health
    }

    /// Maximum health points.
    #[must_use]
    pub const fn max_health(&self) -> u32 {
        self.max_health
    }

    /// Shield points.
    #[must_use]
    pub const fn shields(&self) -> u32 {
        self.shields
    }

    /// Movement state.
    #[must_use]
    pub const fn moving_status(&self) -> MovingStatus {
        self.moving_status
    }

    /// The work the unit is trying to do.
    #[must_use]
    pub const fn work(&self) -> WorkMode {
        self.work
    }

    /// The routine that runs next tick.
    #[must_use]
    pub const fn advance_work(&self) -> WorkMode {
        self.advance_work
    }

    /// Current target handle.
    #[must_use]
    pub const fn target(&self) -> Option<UnitId> {
        self.target
    }

    /// High-level destinations.
    #[must_use]
    pub const fn waypoints(&self) -> &VecDeque<Vec2Fixed> {
        &self.waypoints
    }

    /// Low-level steps of the current path.
    #[must_use]
    pub const fn path_points(&self) -> &VecDeque<Vec2Fixed> {
        &self.path_points
    }

    /// Move order bookkeeping.
    #[must_use]
    pub const fn path_info(&self) -> &PathInfo {
        &self.path_info
    }

    /// Land mover bookkeeping.
    #[must_use]
    pub const fn mover(&self) -> &MoverState {
        &self.mover
    }

    /// Weapon set.
    #[must_use]
    pub fn weapons(&self) -> &[Weapon] {
        &self.weapons
    }

    /// Plugin set.
    #[must_use]
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Index of the running plugin.
    #[must_use]
    pub const fn current_plugin(&self) -> Option<usize> {
        self.current_plugin
    }

    /// Construction progress.
    #[must_use]
    pub const fn construction_step(&self) -> u32 {
        self.construction_step
    }

    /// Ticks spent as wreckage.
    #[must_use]
    pub const fn wreckage_age(&self) -> u32 {
        self.wreckage_age
    }

    /// Health reached zero.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.health == 0
    }

    /// Aircraft.
    #[must_use]
    pub const fn is_flying(&self) -> bool {
        self.flying
    }

    /// Longest weapon range against aircraft.
    #[must_use]
    pub const fn max_air_weapon_range(&self) -> Fixed {
        self.max_air_range
    }

    /// Longest weapon range against ground units.
    #[must_use]
    pub const fn max_land_weapon_range(&self) -> Fixed {
        self.max_land_range
    }

    /// Longest weapon range.
    #[must_use]
    pub const fn max_weapon_range(&self) -> Fixed {
        self.max_range
    }

    /// Distance a follower keeps.
    #[must_use]
    pub const fn follow_distance(&self) -> Fixed {
        self.follow_distance
    }

    pub(crate) fn recalculate_max_weapon_range(&mut self) {
        let mut air = Fixed::ZERO;
        let mut land = Fixed::ZERO;
        for weapon in &self.weapons {
            if weapon.properties.can_shoot_at_air {
                air = air.max(weapon.properties.range);
            }
            if weapon.properties.can_shoot_at_land {
                land = land.max(weapon.properties.range);
            }
        }
        self.max_air_range = air;
        self.max_land_range = land;
        self.max_range = air.max(land);
    }

    /// Whether `other` is within Chebyshev distance `range`.
    #[must_use]
    pub fn in_range(&self, range: Fixed, other: &Self) -> bool {
        self.center().chebyshev_distance(other.center()) <= range
    }

    /// Range that applies against `other`'s domain.
    #[must_use]
    pub const fn range_against(&self, other: &Self) -> Fixed {
        if other.flying {
            self.max_air_range
        } else {
            self.max_land_range
        }
    }

    /// Whether the unit has finished construction.
    #[must_use]
    pub const fn is_construction_complete(&self) -> bool {
        if self.construction_total == 0 {
            return true;
        }
        !matches!(self.work, WorkMode::Construct) && self.construction_step >= self.construction_total
    }

    /// Index of a plugin of this kind. Facilities under construction have
    /// none.
    #[must_use]
    pub fn plugin(&self, kind: PluginKind) -> Option<usize> {
        if !self.is_construction_complete() {
            return None;
        }
        self.plugins.iter().position(|p| p.kind == kind)
    }

    /// Install a work mode. Leaving [`WorkMode::Plugin`] drops the running
    /// plugin.
    pub fn set_work(&mut self, work: WorkMode) {
        if self.current_plugin.is_some() && work != WorkMode::Plugin {
            self.current_plugin = None;
        }
        if work == self.work && work == self.advance_work {
            return;
        }
        self.work = work;
        self.set_advance_work(work);
    }

    /// Substitute the routine that runs without changing the real work.
    pub fn set_advance_work(&mut self, work: WorkMode) {
        self.advance_work = work;
    }

    /// Run the plugin of the given kind.
    ///
    /// Returns `false` if the unit has no such plugin or is still under
    /// construction.
    pub fn set_plugin_work(&mut self, kind: PluginKind) -> bool {
        let Some(index) = self.plugin(kind) else {
            tracing::debug!(unit = self.id, ?kind, "no such plugin");
            return false;
        };
        self.set_work(WorkMode::Plugin);
        self.current_plugin = Some(index);
        true
    }

    /// Speed up by one tick of acceleration.
    pub fn accelerate(&mut self, props: &UnitProperties) {
        self.speed = (self.speed + props.acceleration).min(props.max_speed);
    }

    /// Slow down by one tick of deceleration.
    pub fn decelerate(&mut self, props: &UnitProperties) {
        self.speed = (self.speed - props.deceleration).max(Fixed::ZERO);
    }

    /// Face `dir`.
    ///
    /// Small turns happen immediately and return `true`. Larger ones borrow
    /// the turn routine and return `false`; a moving unit keeps one more
    /// step of its velocity.
    pub fn turn_to(&mut self, dir: Fixed, props: &UnitProperties) -> bool {
        let dir = normalize_rotation(dir);
        if self.rotation == dir {
            return true;
        }
        let (delta, _) = rotation_delta(self.rotation, dir);
        if delta < props.rotation_speed {
            self.rotation = dir;
            return true;
        }
        tracing::debug!(unit = self.id, from = %self.rotation, to = %dir, "turning");
        let keep = if self.advance_work == WorkMode::Move {
            self.velocity
        } else {
            Vec3Fixed::ZERO
        };
        self.wanted_rotation = dir;
        self.set_advance_work(WorkMode::Turn);
        self.velocity = Vec3Fixed::new(keep.x, keep.y, Fixed::ZERO);
        false
    }

    pub(crate) fn add_waypoint(&mut self, point: Vec2Fixed) {
        self.waypoints.push_back(point);
    }

    pub(crate) fn reset_path_info(&mut self) {
        self.path_info.reset();
    }

    /// Cancel movement.
    ///
    /// A pure move order ends in [`WorkMode::Idle`]; a move borrowed by
    /// another work hands control back to it.
    pub fn stop_moving(&mut self) {
        self.waypoints.clear();
        self.path_points.clear();
        if self.work == WorkMode::Move {
            self.set_work(WorkMode::Idle);
        } else if self.advance_work != self.work {
            self.set_advance_work(self.work);
        }
        if !self.flying {
            self.moving_status = MovingStatus::Standing;
            self.velocity = Vec3Fixed::ZERO;
            if self.path_info.slow_down_at_dest {
                self.speed = Fixed::ZERO;
            }
        }
    }

    /// Cancel the attack and go idle.
    pub fn stop_attacking(&mut self) {
        self.stop_moving();
        self.moving_status = MovingStatus::Standing;
        self.target = None;
        self.set_work(WorkMode::Idle);
    }

    /// Low-level move towards a point.
    ///
    /// Records the destination and sets [`MovingStatus::MustSearch`]; the
    /// path is requested on the next move tick. Returns `false` and leaves
    /// the unit unchanged when it cannot move or the point is off the map.
    pub fn move_to_point(
        &mut self,
        point: Vec2Fixed,
        range: Fixed,
        world: &dyn World,
        props: &UnitProperties,
    ) -> bool {
        if !self.is_construction_complete() {
            tracing::warn!(unit = self.id, "not yet constructed completely");
            return false;
        }
        if !props.is_mobile() {
            tracing::debug!(unit = self.id, "cannot move with max speed 0");
            return false;
        }
        let point = if self.flying {
            clamp_for_aircraft(point, world)
        } else {
            point
        };
        let (cx, cy) = point.cell();
        if world.cell(cx, cy).is_none() {
            tracing::debug!(unit = self.id, cx, cy, "destination cell is not valid");
            return false;
        }

        self.reset_path_info();
        self.path_info.dest = point;
        self.path_info.range = range;
        self.waypoints.clear();
        self.path_points.clear();
        self.add_waypoint(point);
        self.moving_status = MovingStatus::MustSearch;
        tracing::debug!(unit = self.id, x = %point.x, y = %point.y, range = %range, "move requested");
        true
    }

    /// Low-level move towards another unit, tracking its position.
    pub fn move_to_unit(
        &mut self,
        target: &Self,
        range: Fixed,
        world: &dyn World,
        props: &UnitProperties,
    ) -> bool {
        if !self.is_construction_complete() {
            tracing::warn!(unit = self.id, "not yet constructed completely");
            return false;
        }
        if !props.is_mobile() {
            return false;
        }
        let point = if self.flying {
            clamp_for_aircraft(target.center(), world)
        } else {
            target.center()
        };

        self.reset_path_info();
        self.path_info.target = Some(target.id);
        self.path_info.dest = point;
        self.path_info.last_target_pos = target.center();
        self.path_info.range = range;
        self.path_info.slow_down_at_dest = true;
        self.waypoints.clear();
        self.path_points.clear();
        self.add_waypoint(point);
        self.moving_status = MovingStatus::MustSearch;
        true
    }

    /// Player move order.
    ///
    /// Ground units aim for the middle of the destination cell. Issuing the
    /// same order twice replaces the first one completely.
    pub fn request_move(
        &mut self,
        point: Vec2Fixed,
        attack: bool,
        world: &dyn World,
        props: &UnitProperties,
    ) -> bool {
        if !self.is_construction_complete() {
            tracing::warn!(unit = self.id, "not yet constructed completely");
            return false;
        }
        self.target = None;

        let snapped = if self.flying {
            point
        } else {
            let add = self.path_info.center_offset;
            let (cx, cy) = point.cell();
            Vec2Fixed::new(Fixed::from_num(cx) + add, Fixed::from_num(cy) + add)
        };

        if self.move_to_point(snapped, Fixed::ZERO, world, props) {
            self.path_info.move_attacking = attack;
            self.path_info.slow_down_at_dest = true;
            self.set_work(WorkMode::Move);
            true
        } else {
            self.set_work(WorkMode::Idle);
            self.stop_moving();
            false
        }
    }

    /// Apply incoming damage: shields absorb first, then armor reduces the
    /// rest to no less than one point. Returns the health lost.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let (shields, loss) = absorb_damage(self.shields, self.armor, amount);
        self.shields = shields;
        let loss = loss.min(self.health);
        self.health -= loss;
        loss
    }

    /// Turn into wreckage.
    pub fn destroy(&mut self) {
        self.health = 0;
        self.velocity = Vec3Fixed::ZERO;
        self.speed = Fixed::ZERO;
        self.moving_status = MovingStatus::Standing;
        self.target = None;
        self.waypoints.clear();
        self.path_points.clear();
        self.current_plugin = None;
        self.set_work(WorkMode::Destroyed);
    }

    /// Per-tick upkeep of living units: weapons reload, shields regenerate.
    pub fn reload(&mut self) {
        for weapon in &mut self.weapons {
            weapon.reload();
        }
        if self.shields < self.max_shields {
            self.shields += 1;
        }
    }

    /// Set health, clamped to max health.
    pub fn set_health(&mut self, health: u32) {
        self.health = health.min(self.max_health);
    }

    /// Place the unit at a new center. Ground units snap to the terrain on
    /// the next tick.
    pub fn set_center(&mut self, center: Vec2Fixed) {
        self.position.x = center.x;
        self.position.y = center.y;
    }
}

/// Damage model shared by the simulation and kill prediction.
///
/// Returns the remaining shields and the health loss.
#[must_use]
pub fn absorb_damage(shields: u32, armor: u32, amount: u32) -> (u32, u32) {
    if amount == 0 {
        return (shields, 0);
    }
    if shields >= amount {
        return (shields - amount, 0);
    }
    let rest = amount - shields;
    (0, rest.saturating_sub(armor).max(1))
}

/// Aircraft keep clear of the map border to have room for turning.
fn clamp_for_aircraft(point: Vec2Fixed, world: &dyn World) -> Vec2Fixed {
    let margin = Fixed::const_from_int(6);
    let max_x = (Fixed::from_num(world.map_width()) - margin).max(margin);
    let max_y = (Fixed::from_num(world.map_height()) - margin).max(margin);
    Vec2Fixed::new(point.x.clamp(margin, max_x), point.y.clamp(margin, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ShotKind, UnitTypeRegistry};
    use crate::simulation::UnitStorage;
    use crate::world::{OccupancyIndex, TerrainMap, WorldView};

    fn tank() -> UnitProperties {
        UnitProperties {
            id: 1,
            name: "tank".to_string(),
            size: 1,
            max_health: 100,
            max_shields: 5,
            armor: 2,
            max_speed: Fixed::ONE,
            acceleration: Fixed::from_num(0.25),
            deceleration: Fixed::from_num(0.25),
            rotation_speed: Fixed::from_num(10),
            crush_damage: 0,
            aircraft: false,
            preferred_altitude: Fixed::ZERO,
            depth: Fixed::ONE,
            construction_steps: 0,
            weapons: vec![
                WeaponProperties {
                    name: "cannon".to_string(),
                    range: Fixed::from_num(5),
                    damage: 10,
                    reload: 20,
                    can_shoot_at_air: false,
                    can_shoot_at_land: true,
                    auto_use: true,
                    turret: false,
                    shot: ShotKind::Bullet,
                },
                WeaponProperties {
                    name: "flak".to_string(),
                    range: Fixed::from_num(7),
                    damage: 4,
                    reload: 5,
                    can_shoot_at_air: true,
                    can_shoot_at_land: false,
                    auto_use: true,
                    turret: true,
                    shot: ShotKind::Missile,
                },
            ],
            plugins: vec![PluginKind::Repair],
        }
    }

    fn with_world<R>(f: impl FnOnce(&dyn World) -> R) -> R {
        let terrain = TerrainMap::new(32, 32);
        let units = UnitStorage::new();
        let registry = UnitTypeRegistry::new();
        let occupancy = OccupancyIndex::build(&terrain, &units, &registry);
        let world = WorldView {
            terrain: &terrain,
            occupancy: &occupancy,
            units: &units,
            registry: &registry,
        };
        f(&world)
    }

    #[test]
    fn test_max_ranges() {
        let unit = Unit::new(1, 1, &tank(), Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert_eq!(unit.max_land_weapon_range(), Fixed::from_num(5));
        assert_eq!(unit.max_air_weapon_range(), Fixed::from_num(7));
        assert_eq!(unit.max_weapon_range(), Fixed::from_num(7));
    }

    #[test]
    fn test_weapon_limit() {
        let mut props = tank();
        let extra = props.weapons[0].clone();
        props.weapons = vec![extra; MAX_WEAPONS_PER_UNIT + 3];
        let unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert_eq!(unit.weapons().len(), MAX_WEAPONS_PER_UNIT);
    }

    #[test]
    fn test_damage_order() {
        let mut unit = Unit::new(1, 1, &tank(), Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert_eq!(unit.take_damage(3), 0);
        assert_eq!(unit.shields(), 2);
        // 2 absorbed, 8 left, armor 2.
        assert_eq!(unit.take_damage(10), 6);
        assert_eq!(unit.health(), 94);
        // Armor never reduces a hit below one point.
        assert_eq!(unit.take_damage(1), 1);
        assert_eq!(unit.take_damage(500), 93);
        assert!(unit.is_destroyed());
    }

    #[test]
    fn test_turn_to_small_delta_snaps() {
        let props = tank();
        let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert!(unit.turn_to(Fixed::from_num(355), &props));
        assert_eq!(unit.rotation(), Fixed::from_num(355));
        assert_eq!(unit.advance_work(), WorkMode::Idle);
    }

    #[test]
    fn test_turn_to_large_delta_borrows_turn() {
        let props = tank();
        let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert!(!unit.turn_to(Fixed::from_num(90), &props));
        assert_eq!(unit.work(), WorkMode::Idle);
        assert_eq!(unit.advance_work(), WorkMode::Turn);
        assert_eq!(unit.wanted_rotation, Fixed::from_num(90));
    }

    #[test]
    fn test_request_move_snaps_and_replaces() {
        let props = tank();
        with_world(|world| {
            let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
            let dest = Vec2Fixed::new(Fixed::from_num(9.2), Fixed::from_num(4.9));
            assert!(unit.request_move(dest, false, world, &props));
            let first = (unit.waypoints().clone(), unit.path_info().clone());
            assert!(unit.request_move(dest, false, world, &props));
            assert_eq!((unit.waypoints().clone(), unit.path_info().clone()), first);
            assert_eq!(unit.waypoints().len(), 1);
            assert_eq!(unit.path_info().dest, Vec2Fixed::cell_center(9, 4));
            assert_eq!(unit.moving_status(), MovingStatus::MustSearch);
            assert_eq!(unit.work(), WorkMode::Move);
        });
    }

    #[test]
    fn test_request_move_rejects_off_map() {
        let props = tank();
        with_world(|world| {
            let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
            let dest = Vec2Fixed::from_int(40, 3);
            assert!(!unit.request_move(dest, false, world, &props));
            assert_eq!(unit.work(), WorkMode::Idle);
            assert_eq!(unit.moving_status(), MovingStatus::Standing);
        });
    }

    #[test]
    fn test_immobile_unit_declines_move() {
        let mut props = tank();
        props.max_speed = Fixed::ZERO;
        with_world(|world| {
            let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
            assert!(!unit.request_move(Vec2Fixed::from_int(5, 5), false, world, &props));
            assert_eq!(unit.work(), WorkMode::Idle);
        });
    }

    #[test]
    fn test_facility_has_no_plugins_until_complete() {
        let mut props = tank();
        props.construction_steps = 3;
        let mut unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        assert_eq!(unit.work(), WorkMode::Construct);
        assert!(!unit.set_plugin_work(PluginKind::Repair));
        unit.construction_step = 3;
        unit.set_work(WorkMode::Idle);
        assert!(unit.set_plugin_work(PluginKind::Repair));
        assert_eq!(unit.current_plugin(), Some(0));
        unit.set_work(WorkMode::Idle);
        assert_eq!(unit.current_plugin(), None);
    }

    #[test]
    fn test_reload_and_shield_regen() {
        let mut unit = Unit::new(1, 1, &tank(), Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        unit.weapons[0].fire();
        unit.shields = 0;
        unit.reload();
        assert_eq!(unit.weapons()[0].reload_counter(), 19);
        assert_eq!(unit.shields(), 1);
    }

    #[test]
    fn test_aircraft_start_state() {
        let mut props = tank();
        props.aircraft = true;
        props.max_speed = Fixed::from_num(2);
        props.preferred_altitude = Fixed::from_num(4);
        let unit = Unit::new(1, 1, &props, Vec2Fixed::cell_center(8, 8), Fixed::ONE);
        assert_eq!(unit.speed(), Fixed::from_num(1.5));
        assert_eq!(unit.position().z, Fixed::from_num(5));
    }
}
