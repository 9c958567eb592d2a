//! Core simulation loop.
//!
//! The simulation advances every unit once per tick in ascending id order.
//! Routines read the committed state of the previous tick through a
//! [`WorldView`] over a snapshot, write only the unit being advanced, and
//! queue effects on other units. Effects are applied in emission order once
//! every unit has advanced.
//!
//! # Determinism
//!
//! - No floating point (all positions, speeds and angles are [`Fixed`])
//! - No randomness
//! - Ordered storage ([`BTreeMap`]) so iteration order is the id order
//! - Routines never observe a partially updated tick
//!
//! # Example
//!
//! ```
//! use actor_core::math::{Fixed, Vec2Fixed};
//! use actor_core::properties::{UnitProperties, UnitTypeRegistry};
//! use actor_core::simulation::{Order, Simulation, UnitSpawnParams};
//! use actor_core::world::TerrainMap;
//!
//! let mut registry = UnitTypeRegistry::new();
//! registry
//!     .insert(UnitProperties {
//!         id: 1,
//!         name: "rover".to_string(),
//!         size: 1,
//!         max_health: 50,
//!         max_shields: 0,
//!         armor: 0,
//!         max_speed: Fixed::ONE,
//!         acceleration: Fixed::ONE,
//!         deceleration: Fixed::ONE,
//!         rotation_speed: Fixed::from_num(45),
//!         crush_damage: 0,
//!         aircraft: false,
//!         preferred_altitude: Fixed::ZERO,
//!         depth: Fixed::ONE,
//!         construction_steps: 0,
//!         weapons: Vec::new(),
//!         plugins: Vec::new(),
//!     })
//!     .unwrap();
//!
//! let mut sim = Simulation::new(TerrainMap::new(16, 16), registry);
//! let rover = sim
//!     .spawn(UnitSpawnParams {
//!         type_id: 1,
//!         owner: 1,
//!         position: Vec2Fixed::cell_center(1, 1),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let accepted = sim
//!     .apply_order(rover, Order::Move { target: Vec2Fixed::cell_center(5, 1), attack: false })
//!     .unwrap();
//! assert!(accepted);
//! sim.run(10);
//! assert_eq!(sim.unit(rover).unwrap().center(), Vec2Fixed::cell_center(5, 1));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::dispatch::{dispatch, EffectQueue, TickContext, UnitEffect, WRECKAGE_LIFETIME};
use crate::error::{GameError, Result};
use crate::geometry::GeometryTables;
use crate::math::{fixed_serde, normalize_rotation, Fixed, Vec2Fixed};
use crate::pathfinding::GridPathfinder;
use crate::persistence::SaveGame;
use crate::properties::{PluginKind, UnitTypeId, UnitTypeRegistry};
use crate::replication::synced_values;
use crate::unit::{PlayerId, Unit, UnitId, WorkMode};
use crate::world::{DiplomacyTable, OccupancyIndex, TerrainMap, WorldView};

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// All units, keyed and iterated by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitStorage {
    units: BTreeMap<UnitId, Unit>,
    next_id: UnitId,
}

impl UnitStorage {
    /// Create empty unit storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next unit id.
    pub fn allocate_id(&mut self) -> UnitId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id the next spawned unit receives.
    #[must_use]
    pub const fn next_id(&self) -> UnitId {
        self.next_id
    }

    /// Raise the next id to at least `id`. Never lowers it.
    pub fn reserve_up_to(&mut self, id: UnitId) {
        self.next_id = self.next_id.max(id);
    }

    /// Insert a unit under its own id, replacing any previous one.
    pub fn insert(&mut self, unit: Unit) {
        self.reserve_up_to(unit.id().saturating_add(1));
        self.units.insert(unit.id(), unit);
    }

    /// Remove a unit by id.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        self.units.remove(&id)
    }

    /// Get a unit by id.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Get a mutable reference to a unit by id.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Check if a unit exists.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }

    /// Iterate over units in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Iterate mutably over units in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }
}

/// A weapon hit applied this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotEvent {
    /// Shooter.
    pub source: UnitId,
    /// Victim.
    pub target: UnitId,
    /// Index of the weapon that fired.
    pub weapon: usize,
    /// Raw damage.
    pub damage: u32,
}

/// Events generated during a simulation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick these events belong to.
    pub tick: u64,
    /// Shots fired, in firing order.
    pub shots: Vec<ShotEvent>,
    /// Units destroyed this tick.
    pub deaths: Vec<UnitId>,
    /// Subset of `deaths` caused by crushing.
    pub crushed: Vec<UnitId>,
    /// Facilities that finished construction.
    pub construction_completed: Vec<UnitId>,
    /// Wreckage removed from the simulation.
    pub removed: Vec<UnitId>,
}

/// Placement of a new unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpawnParams {
    /// Unit type.
    pub type_id: UnitTypeId,
    /// Owning player.
    pub owner: PlayerId,
    /// Center point.
    pub position: Vec2Fixed,
    /// Initial facing in degrees.
    #[serde(default, with = "fixed_serde")]
    pub rotation: Fixed,
    /// Place a facility already built.
    #[serde(default)]
    pub complete: bool,
}

/// Player orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Move to a point, optionally engaging enemies on the way.
    Move {
        /// Destination.
        target: Vec2Fixed,
        /// Engage enemies met on the way.
        attack: bool,
    },
    /// Queue another destination after the current move.
    Waypoint {
        /// Destination.
        target: Vec2Fixed,
    },
    /// Move next to another unit.
    MoveToUnit {
        /// Unit to approach.
        target: UnitId,
        /// Acceptable distance in cells.
        #[serde(with = "fixed_serde")]
        range: Fixed,
    },
    /// Attack a unit.
    Attack {
        /// Victim.
        target: UnitId,
    },
    /// Stay close to a unit.
    Follow {
        /// Unit to follow.
        target: UnitId,
        /// Distance to keep in cells.
        #[serde(with = "fixed_serde")]
        distance: Fixed,
    },
    /// Face a direction.
    Turn {
        /// Wanted rotation in degrees.
        #[serde(with = "fixed_serde")]
        rotation: Fixed,
    },
    /// Drop every order.
    Stop,
    /// Run a plugin.
    Plugin {
        /// Plugin to run.
        kind: PluginKind,
    },
}

/// The unit behavior simulation.
///
/// Owns all units and the map they live on, and advances them
/// deterministically one tick at a time.
///
/// # Tick order
///
/// 1. Snapshot the units and index cell occupancy
/// 2. For each unit by ascending id: reload weapons and regenerate shields,
///    run the routine of its advance work if it is scheduled, integrate its
///    velocity
/// 3. Apply queued damage and crushes in emission order
/// 4. Remove expired wreckage and invalidate handles to dead units
/// 5. Update the schedule
#[derive(Debug, Clone)]
pub struct Simulation {
    tick: u64,
    units: UnitStorage,
    terrain: TerrainMap,
    registry: UnitTypeRegistry,
    diplomacy: DiplomacyTable,
    pathfinder: GridPathfinder,
    geometry: GeometryTables,
    active: BTreeSet<UnitId>,
}

impl Simulation {
    /// Create an empty simulation on the given map.
    #[must_use]
    pub fn new(terrain: TerrainMap, registry: UnitTypeRegistry) -> Self {
        Self {
            tick: 0,
            units: UnitStorage::new(),
            terrain,
            registry,
            diplomacy: DiplomacyTable::new(),
            pathfinder: GridPathfinder::default(),
            geometry: GeometryTables::init(),
            active: BTreeSet::new(),
        }
    }

    /// Number of ticks advanced so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// All units.
    #[must_use]
    pub const fn units(&self) -> &UnitStorage {
        &self.units
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Mutable access for scenario setup and tests. Changes take effect on
    /// the next tick.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id)
    }

    /// The map.
    #[must_use]
    pub const fn terrain(&self) -> &TerrainMap {
        &self.terrain
    }

    /// Mutable map access.
    pub fn terrain_mut(&mut self) -> &mut TerrainMap {
        &mut self.terrain
    }

    /// Unit type catalog.
    #[must_use]
    pub const fn registry(&self) -> &UnitTypeRegistry {
        &self.registry
    }

    /// Player relations.
    #[must_use]
    pub const fn diplomacy(&self) -> &DiplomacyTable {
        &self.diplomacy
    }

    /// Mutable player relations.
    pub fn diplomacy_mut(&mut self) -> &mut DiplomacyTable {
        &mut self.diplomacy
    }

    /// Route search configuration.
    #[must_use]
    pub const fn pathfinder(&self) -> &GridPathfinder {
        &self.pathfinder
    }

    /// Replace the route search configuration.
    pub fn set_pathfinder(&mut self, pathfinder: GridPathfinder) {
        self.pathfinder = pathfinder;
    }

    /// Whether the unit's routine runs each tick.
    #[must_use]
    pub fn is_active(&self, id: UnitId) -> bool {
        self.active.contains(&id)
    }

    /// Place a new unit.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownUnitType`] for an unregistered type and
    /// [`GameError::InvalidState`] for a position off the map.
    pub fn spawn(&mut self, params: UnitSpawnParams) -> Result<UnitId> {
        let props = self
            .registry
            .get(params.type_id)
            .ok_or(GameError::UnknownUnitType(params.type_id))?;
        let (cx, cy) = params.position.cell();
        if self.terrain.get(cx, cy).is_none() {
            return Err(GameError::InvalidState(format!(
                "spawn position ({cx}, {cy}) is off the map"
            )));
        }

        let id = self.units.allocate_id();
        let ground = self
            .terrain
            .height_at(params.position.x, params.position.y);
        let mut unit = Unit::new(id, params.owner, props, params.position, ground);
        unit.rotation = normalize_rotation(params.rotation);
        unit.wanted_rotation = unit.rotation;
        if params.complete {
            unit.set_construction_step(unit.construction_total());
        }
        tracing::debug!(id, type_id = params.type_id, owner = params.owner, "unit spawned");

        self.units.insert(unit);
        self.refresh_active(id);
        Ok(id)
    }

    /// Remove a unit immediately and invalidate every handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnitNotFound`] if the unit does not exist.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<()> {
        self.units.remove(id).ok_or(GameError::UnitNotFound(id))?;
        self.active.remove(&id);
        self.invalidate_handles(&BTreeSet::from([id]));
        Ok(())
    }

    /// Give an order to a unit.
    ///
    /// Returns whether the unit accepted it. Destroyed units, units still
    /// under construction and units lacking the capability decline orders
    /// without changing state.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnitNotFound`] if the unit does not exist.
    pub fn apply_order(&mut self, id: UnitId, order: Order) -> Result<bool> {
        let mut unit = self.units.remove(id).ok_or(GameError::UnitNotFound(id))?;
        let accepted = self.order_unit(&mut unit, order);
        self.units.insert(unit);
        self.refresh_active(id);
        tracing::debug!(id, ?order, accepted, "order");
        Ok(accepted)
    }

    fn order_unit(&self, unit: &mut Unit, order: Order) -> bool {
        if unit.is_destroyed() {
            return false;
        }
        let Some(props) = self.registry.get(unit.type_id()) else {
            return false;
        };
        let occupancy = OccupancyIndex::default();
        let world = WorldView {
            terrain: &self.terrain,
            occupancy: &occupancy,
            units: &self.units,
            registry: &self.registry,
        };
        let living = |target: UnitId| self.units.get(target).filter(|t| !t.is_destroyed());

        match order {
            Order::Move { target, attack } => unit.request_move(target, attack, &world, props),
            Order::Waypoint { target } => {
                if unit.work() == WorkMode::Move && !unit.waypoints().is_empty() {
                    unit.add_waypoint(target);
                    true
                } else {
                    unit.request_move(target, false, &world, props)
                }
            }
            Order::MoveToUnit { target, range } => {
                let Some(target) = living(target) else {
                    return false;
                };
                unit.target = None;
                if unit.move_to_unit(target, range, &world, props) {
                    unit.set_work(WorkMode::Move);
                    true
                } else {
                    false
                }
            }
            Order::Attack { target } => {
                if !props.can_shoot() || !unit.is_construction_complete() || living(target).is_none() {
                    return false;
                }
                unit.stop_moving();
                unit.target = Some(target);
                unit.set_work(WorkMode::Attack);
                true
            }
            Order::Follow { target, distance } => {
                if !props.is_mobile() || living(target).is_none() {
                    return false;
                }
                unit.stop_moving();
                unit.target = Some(target);
                unit.follow_distance = distance.max(Fixed::ZERO);
                unit.set_work(WorkMode::Follow);
                true
            }
            Order::Turn { rotation } => {
                if !props.is_mobile() {
                    return false;
                }
                unit.stop_moving();
                unit.wanted_rotation = normalize_rotation(rotation);
                unit.set_work(WorkMode::Turn);
                true
            }
            Order::Stop => {
                unit.stop_attacking();
                true
            }
            Order::Plugin { kind } => {
                if unit.plugin(kind).is_none() {
                    return false;
                }
                unit.stop_moving();
                unit.set_plugin_work(kind)
            }
        }
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickEvents {
        self.tick += 1;
        let tick = self.tick;
        let mut events = TickEvents {
            tick,
            ..TickEvents::default()
        };

        let snapshot = self.units.clone();
        let occupancy = OccupancyIndex::build(&self.terrain, &snapshot, &self.registry);
        let world = WorldView {
            terrain: &self.terrain,
            occupancy: &occupancy,
            units: &snapshot,
            registry: &self.registry,
        };
        let mut effects = EffectQueue::new();

        for id in snapshot.ids() {
            let Some(unit) = self.units.get_mut(id) else {
                continue;
            };
            let Some(props) = self.registry.get(unit.type_id()) else {
                tracing::warn!(id, type_id = unit.type_id(), "unit of unknown type skipped");
                continue;
            };

            if unit.is_destroyed() {
                unit.wreckage_age += 1;
            } else {
                unit.reload();
            }

            if self.active.contains(&id) {
                let mut ctx = TickContext {
                    tick,
                    world: &world,
                    diplomacy: &self.diplomacy,
                    pathfinder: &self.pathfinder,
                    geometry: &self.geometry,
                    properties: props,
                    effects: &mut effects,
                };
                dispatch(unit, &mut ctx);
            }

            integrate(unit, &self.terrain);
        }

        let mut gone = BTreeSet::new();
        for effect in effects.into_effects() {
            self.apply_effect(effect, &mut events, &mut gone);
        }

        // Catch health set to zero outside of combat.
        for unit in self.units.iter_mut() {
            if unit.is_destroyed() && unit.work() != WorkMode::Destroyed {
                unit.destroy();
                events.deaths.push(unit.id());
                gone.insert(unit.id());
            }
        }

        let expired: Vec<UnitId> = self
            .units
            .iter()
            .filter(|u| u.is_destroyed() && u.wreckage_age() >= WRECKAGE_LIFETIME)
            .map(Unit::id)
            .collect();
        for id in expired {
            tracing::debug!(tick, id, "wreckage removed");
            self.units.remove(id);
            self.active.remove(&id);
            events.removed.push(id);
            gone.insert(id);
        }

        if !gone.is_empty() {
            self.invalidate_handles(&gone);
        }
        for id in self.units.ids() {
            self.refresh_active(id);
        }

        #[cfg(feature = "debug-validation")]
        self.validate();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Advance several ticks, collecting the events of each.
    pub fn run(&mut self, ticks: u64) -> Vec<TickEvents> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    fn apply_effect(&mut self, effect: UnitEffect, events: &mut TickEvents, gone: &mut BTreeSet<UnitId>) {
        match effect {
            UnitEffect::Damage {
                source,
                target,
                weapon,
                amount,
            } => {
                events.shots.push(ShotEvent {
                    source,
                    target,
                    weapon,
                    damage: amount,
                });
                let Some(victim) = self.units.get_mut(target) else {
                    return;
                };
                if victim.is_destroyed() {
                    return;
                }
                victim.take_damage(amount);
                if victim.is_destroyed() {
                    tracing::debug!(tick = self.tick, source, target, "unit destroyed");
                    victim.destroy();
                    events.deaths.push(target);
                    gone.insert(target);
                }
            }
            UnitEffect::Crush { source, target } => {
                let Some(victim) = self.units.get_mut(target) else {
                    return;
                };
                if victim.is_destroyed() {
                    return;
                }
                tracing::debug!(tick = self.tick, source, target, "unit crushed");
                victim.destroy();
                events.deaths.push(target);
                events.crushed.push(target);
                gone.insert(target);
            }
            UnitEffect::ConstructionCompleted { unit } => {
                events.construction_completed.push(unit);
            }
        }
    }

    /// Clear every handle to a unit that died or left the simulation.
    fn invalidate_handles(&mut self, gone: &BTreeSet<UnitId>) {
        for unit in self.units.iter_mut() {
            if unit.path_info.target.is_some_and(|t| gone.contains(&t)) {
                unit.path_info.target = None;
                unit.stop_moving();
            }
            let Some(target) = unit.target() else {
                continue;
            };
            if !gone.contains(&target) {
                continue;
            }
            match unit.work() {
                WorkMode::Attack => unit.stop_attacking(),
                WorkMode::Follow => {
                    unit.target = None;
                    unit.set_work(WorkMode::Idle);
                }
                _ => unit.target = None,
            }
        }
    }

    fn refresh_active(&mut self, id: UnitId) {
        let scheduled = self
            .units
            .get(id)
            .is_some_and(|u| u.advance_work() != WorkMode::None);
        if scheduled {
            self.active.insert(id);
        } else {
            self.active.remove(&id);
        }
    }

    /// Log units that violate state invariants.
    #[cfg(feature = "debug-validation")]
    fn validate(&self) {
        for unit in self.units.iter() {
            if unit.health() > unit.max_health() {
                tracing::error!(id = unit.id(), health = unit.health(), "health above maximum");
            }
            if unit.construction_step() > unit.construction_total() {
                tracing::error!(id = unit.id(), "construction step above total");
            }
            if unit.is_destroyed() != (unit.work() == WorkMode::Destroyed) {
                tracing::error!(id = unit.id(), work = ?unit.work(), "destroyed state mismatch");
            }
        }
    }

    /// Hash of everything that affects the outcome of future ticks.
    ///
    /// Two simulations with the same hash are in the same state; replicas
    /// compare hashes to detect desyncs.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.units.len().hash(&mut hasher);
        for unit in self.units.iter() {
            unit.id().hash(&mut hasher);
            for (property, value) in synced_values(unit) {
                property.id().hash(&mut hasher);
                value.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Compare against a hash reported by another replica.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DesyncDetected`] if the hashes differ.
    pub fn check_sync(&self, remote_hash: u64) -> Result<()> {
        let local_hash = self.state_hash();
        if local_hash == remote_hash {
            Ok(())
        } else {
            Err(GameError::DesyncDetected {
                tick: self.tick,
                local_hash,
                remote_hash,
            })
        }
    }

    /// Serialize the simulation state as a save game.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        SaveGame::capture(self).to_bytes()
    }

    /// Restore a simulation from [`Simulation::serialize`] output.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed data, a version mismatch or units of
    /// unknown types.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        SaveGame::from_bytes(data)?.into_simulation()
    }

    pub(crate) fn from_parts(
        tick: u64,
        units: UnitStorage,
        terrain: TerrainMap,
        registry: UnitTypeRegistry,
        diplomacy: DiplomacyTable,
        pathfinder: GridPathfinder,
    ) -> Self {
        let mut sim = Self {
            tick,
            units,
            terrain,
            registry,
            diplomacy,
            pathfinder,
            geometry: GeometryTables::init(),
            active: BTreeSet::new(),
        };
        for id in sim.units.ids() {
            sim.refresh_active(id);
        }
        sim
    }
}

/// Move a unit by its velocity. Ground units stick to the terrain, aircraft
/// and sinking wreckage move in three dimensions.
fn integrate(unit: &mut Unit, terrain: &TerrainMap) {
    if unit.is_destroyed() || unit.is_flying() {
        unit.position = unit.position + unit.velocity;
        return;
    }
    unit.position.x += unit.velocity.x;
    unit.position.y += unit.velocity.y;
    unit.position.z = terrain.height_at(unit.position.x, unit.position.y);
}
