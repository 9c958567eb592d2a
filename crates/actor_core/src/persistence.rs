//! Save games.
//!
//! A [`SaveGame`] captures everything needed to resume a simulation
//! exactly: the map, the unit catalog, diplomacy and one [`UnitSave`] per
//! unit, including in-progress path following and weapon reload state.
//! Saves are encoded with `bincode` and carry a format version.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::{GridPathfinder, PathInfo};
use crate::properties::{UnitProperties, UnitTypeId, UnitTypeRegistry};
use crate::simulation::{Simulation, UnitStorage};
use crate::unit::{MoverState, MovingStatus, PlayerId, Unit, UnitId, WorkMode};
use crate::world::{DiplomacyTable, TerrainMap};

/// Save format version.
pub const SAVE_VERSION: u32 = 1;

/// Persistent state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSave {
    /// Unit id.
    pub id: UnitId,
    /// Unit type.
    pub type_id: UnitTypeId,
    /// Owning player.
    pub owner: PlayerId,
    /// Center point and altitude.
    pub position: Vec3Fixed,
    /// Facing.
    #[serde(with = "fixed_serde")]
    pub rotation: Fixed,
    /// Facing the unit is turning towards.
    #[serde(with = "fixed_serde")]
    pub wanted_rotation: Fixed,
    /// Velocity.
    pub velocity: Vec3Fixed,
    /// Scalar speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Aircraft bank angle.
    #[serde(with = "fixed_serde")]
    pub roll: Fixed,
    /// Health.
    pub health: u32,
    /// Shields.
    pub shields: u32,
    /// Movement state.
    pub moving_status: MovingStatus,
    /// Real work.
    pub work: WorkMode,
    /// Routine running next tick.
    pub advance_work: WorkMode,
    /// Target id.
    pub target: Option<UnitId>,
    /// Follow distance.
    #[serde(with = "fixed_serde")]
    pub follow_distance: Fixed,
    /// Waypoint queue.
    pub waypoints: Vec<Vec2Fixed>,
    /// Path point queue.
    pub path_points: Vec<Vec2Fixed>,
    /// Move order state, including the raw path.
    pub path_info: PathInfo,
    /// Land mover lookahead state.
    pub mover: MoverState,
    /// Reload counter per weapon.
    pub reload_counters: Vec<u32>,
    /// Work counter per plugin.
    pub plugin_counters: Vec<u32>,
    /// Running plugin.
    pub current_plugin: Option<usize>,
    /// Construction progress.
    pub construction_step: u32,
    /// Ticks spent as wreckage.
    pub wreckage_age: u32,
}

impl UnitSave {
    /// Record a unit.
    #[must_use]
    pub fn capture(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            type_id: unit.type_id,
            owner: unit.owner,
            position: unit.position,
            rotation: unit.rotation,
            wanted_rotation: unit.wanted_rotation,
            velocity: unit.velocity,
            speed: unit.speed,
            roll: unit.roll,
            health: unit.health,
            shields: unit.shields,
            moving_status: unit.moving_status,
            work: unit.work,
            advance_work: unit.advance_work,
            target: unit.target,
            follow_distance: unit.follow_distance,
            waypoints: unit.waypoints.iter().copied().collect(),
            path_points: unit.path_points.iter().copied().collect(),
            path_info: unit.path_info.clone(),
            mover: unit.mover,
            reload_counters: unit.weapons.iter().map(|w| w.reload_counter()).collect(),
            plugin_counters: unit.plugins.iter().map(|p| p.work_counter).collect(),
            current_plugin: unit.current_plugin,
            construction_step: unit.construction_step,
            wreckage_age: unit.wreckage_age,
        }
    }

    /// Rebuild the unit against its type definition.
    ///
    /// Out-of-range values are clamped with a warning: health to max health,
    /// reload counters to the reload time, the construction step to the
    /// total, an unknown plugin index to the first plugin.
    #[must_use]
    pub fn restore(&self, props: &UnitProperties) -> Unit {
        let mut unit = Unit::new(self.id, self.owner, props, self.position.xy(), self.position.z);
        unit.position = self.position;
        unit.rotation = self.rotation;
        unit.wanted_rotation = self.wanted_rotation;
        unit.velocity = self.velocity;
        unit.speed = self.speed;
        unit.roll = self.roll;

        if self.health > unit.max_health {
            tracing::warn!(id = self.id, health = self.health, "saved health above maximum, clamping");
        }
        unit.set_health(self.health);
        unit.shields = self.shields.min(unit.max_shields);

        unit.moving_status = self.moving_status;
        unit.work = self.work;
        unit.advance_work = self.advance_work;
        unit.target = self.target;
        unit.follow_distance = self.follow_distance;
        unit.waypoints = self.waypoints.iter().copied().collect();
        unit.path_points = self.path_points.iter().copied().collect();
        unit.path_info = self.path_info.clone();
        unit.mover = self.mover;

        if self.reload_counters.len() != unit.weapons.len() {
            tracing::warn!(
                id = self.id,
                saved = self.reload_counters.len(),
                actual = unit.weapons.len(),
                "weapon count changed since save"
            );
        }
        for (weapon, &counter) in unit.weapons.iter_mut().zip(&self.reload_counters) {
            weapon.set_reload_counter(counter);
        }
        for (plugin, &counter) in unit.plugins.iter_mut().zip(&self.plugin_counters) {
            plugin.work_counter = counter;
        }

        unit.current_plugin = match self.current_plugin {
            Some(index) if index >= unit.plugins.len() => {
                tracing::warn!(id = self.id, index, "invalid plugin index, using the first plugin");
                if unit.plugins.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            other => other,
        };
        if unit.current_plugin.is_none() && unit.work == WorkMode::Plugin {
            unit.set_work(WorkMode::Idle);
        }

        unit.set_construction_step(self.construction_step);
        unit.wreckage_age = self.wreckage_age;
        unit
    }
}

/// A complete simulation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    /// Format version, [`SAVE_VERSION`] when written.
    pub version: u32,
    /// Ticks advanced.
    pub tick: u64,
    /// Id the next spawned unit receives.
    pub next_id: UnitId,
    /// The map.
    pub terrain: TerrainMap,
    /// Unit types.
    pub registry: UnitTypeRegistry,
    /// Player relations.
    pub diplomacy: DiplomacyTable,
    /// Route search configuration.
    pub pathfinder: GridPathfinder,
    /// Units in ascending id order.
    pub units: Vec<UnitSave>,
}

impl SaveGame {
    /// Snapshot a simulation.
    #[must_use]
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            version: SAVE_VERSION,
            tick: sim.current_tick(),
            next_id: sim.units().next_id(),
            terrain: sim.terrain().clone(),
            registry: sim.registry().clone(),
            diplomacy: sim.diplomacy().clone(),
            pathfinder: *sim.pathfinder(),
            units: sim.units().iter().map(UnitSave::capture).collect(),
        }
    }

    /// Rebuild the simulation.
    ///
    /// Handles to units that are not part of the save are dropped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownUnitType`] if a unit's type is missing
    /// from the saved catalog.
    pub fn into_simulation(self) -> Result<Simulation> {
        let ids: BTreeSet<UnitId> = self.units.iter().map(|u| u.id).collect();
        let mut storage = UnitStorage::new();
        for save in &self.units {
            let props = self
                .registry
                .get(save.type_id)
                .ok_or(GameError::UnknownUnitType(save.type_id))?;
            let mut unit = save.restore(props);
            if let Some(target) = unit.target.filter(|t| !ids.contains(t)) {
                tracing::warn!(id = unit.id, target, "saved target no longer exists, dropping");
                unit.target = None;
            }
            if let Some(target) = unit.path_info.target.filter(|t| !ids.contains(t)) {
                tracing::warn!(id = unit.id, target, "saved move target no longer exists, dropping");
                unit.path_info.target = None;
            }
            storage.insert(unit);
        }
        storage.reserve_up_to(self.next_id);

        Ok(Simulation::from_parts(
            self.tick,
            storage,
            self.terrain,
            self.registry,
            self.diplomacy,
            self.pathfinder,
        ))
    }

    /// Encode with `bincode`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize save game: {e}")))
    }

    /// Decode and check the format version.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] for malformed data and
    /// [`GameError::SaveVersionMismatch`] for a different format version.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let save: Self = bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize save game: {e}")))?;
        if save.version != SAVE_VERSION {
            return Err(GameError::SaveVersionMismatch {
                expected: SAVE_VERSION,
                found: save.version,
            });
        }
        Ok(save)
    }

    /// Write the save to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        tracing::info!(path = %path.as_ref().display(), units = self.units.len(), "game saved");
        Ok(())
    }

    /// Read a save from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if file reading, decoding or the version check fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{PluginKind, ShotKind, WeaponProperties};

    fn props() -> UnitProperties {
        UnitProperties {
            id: 4,
            name: "bomber".to_string(),
            size: 1,
            max_health: 80,
            max_shields: 10,
            armor: 0,
            max_speed: Fixed::ONE,
            acceleration: Fixed::ONE,
            deceleration: Fixed::ONE,
            rotation_speed: Fixed::from_num(20),
            crush_damage: 0,
            aircraft: false,
            preferred_altitude: Fixed::ZERO,
            depth: Fixed::ONE,
            construction_steps: 0,
            weapons: vec![WeaponProperties {
                name: "bombs".to_string(),
                range: Fixed::from_num(2),
                damage: 50,
                reload: 40,
                can_shoot_at_air: false,
                can_shoot_at_land: true,
                auto_use: true,
                turret: true,
                shot: ShotKind::Bomb,
            }],
            plugins: vec![PluginKind::Repair],
        }
    }

    #[test]
    fn test_restore_clamps_corrupt_values() {
        let props = props();
        let unit = Unit::new(3, 1, &props, Vec2Fixed::cell_center(4, 4), Fixed::ZERO);
        let mut save = UnitSave::capture(&unit);
        save.health = 500;
        save.reload_counters = vec![1000];
        save.current_plugin = Some(7);
        save.work = WorkMode::Plugin;
        save.advance_work = WorkMode::Plugin;

        let restored = save.restore(&props);
        assert_eq!(restored.health(), 80);
        assert_eq!(restored.weapons()[0].reload_counter(), 40);
        assert_eq!(restored.current_plugin(), Some(0));
        assert_eq!(restored.work(), WorkMode::Plugin);
    }

    #[test]
    fn test_restore_reproduces_unit() {
        let props = props();
        let mut unit = Unit::new(3, 1, &props, Vec2Fixed::cell_center(4, 4), Fixed::ZERO);
        unit.weapons[0].fire();
        unit.target = Some(9);
        unit.path_info.waiting = 7;
        unit.path_points.push_back(Vec2Fixed::cell_center(5, 4));
        unit.mover.last_cell = Some((4, 4));
        let restored = UnitSave::capture(&unit).restore(&props);
        assert_eq!(restored, unit);
    }

    #[test]
    fn test_version_mismatch() {
        let sim = Simulation::new(TerrainMap::new(4, 4), UnitTypeRegistry::new());
        let mut save = SaveGame::capture(&sim);
        save.version = SAVE_VERSION + 1;
        let bytes = bincode::serialize(&save).unwrap();
        assert!(matches!(
            SaveGame::from_bytes(&bytes),
            Err(GameError::SaveVersionMismatch { found, .. }) if found == SAVE_VERSION + 1
        ));
    }

    #[test]
    fn test_missing_target_dropped_on_load() {
        let mut registry = UnitTypeRegistry::new();
        registry.insert(props()).unwrap();
        let sim = Simulation::new(TerrainMap::new(8, 8), registry);
        let mut save = SaveGame::capture(&sim);
        let unit = Unit::new(1, 1, &props(), Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        let mut unit_save = UnitSave::capture(&unit);
        unit_save.target = Some(42);
        save.units.push(unit_save);

        let restored = save.into_simulation().unwrap();
        assert_eq!(restored.unit(1).unwrap().target(), None);
        assert_eq!(restored.units().next_id(), 2);
    }

    #[test]
    fn test_next_id_restored_without_counting_up() {
        let sim = Simulation::new(TerrainMap::new(4, 4), UnitTypeRegistry::new());
        let mut save = SaveGame::capture(&sim);
        save.next_id = u64::MAX - 1;
        let restored = save.into_simulation().unwrap();
        assert_eq!(restored.units().next_id(), u64::MAX - 1);
    }

    #[test]
    fn test_next_id_never_below_saved_units() {
        let mut registry = UnitTypeRegistry::new();
        registry.insert(props()).unwrap();
        let sim = Simulation::new(TerrainMap::new(8, 8), registry);
        let mut save = SaveGame::capture(&sim);
        let unit = Unit::new(6, 1, &props(), Vec2Fixed::cell_center(2, 2), Fixed::ZERO);
        save.units.push(UnitSave::capture(&unit));
        save.next_id = 2;
        let restored = save.into_simulation().unwrap();
        assert_eq!(restored.units().next_id(), 7);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.sav");
        let sim = Simulation::new(TerrainMap::new(6, 5), UnitTypeRegistry::new());
        let save = SaveGame::capture(&sim);
        save.save(&path).unwrap();
        assert_eq!(SaveGame::load(&path).unwrap(), save);
    }
}
