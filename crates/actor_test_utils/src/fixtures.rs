//! Test fixtures and helpers.
//!
//! A small unit type catalog covering every behavior the engine has, and a
//! builder for simulations on open maps.

use fixed::types::I32F32;

use actor_core::math::{Fixed, Vec2Fixed};
use actor_core::properties::{
    PluginKind, ShotKind, UnitProperties, UnitTypeId, UnitTypeRegistry, WeaponProperties,
};
use actor_core::simulation::{Simulation, UnitSpawnParams};
use actor_core::unit::{PlayerId, UnitId};
use actor_core::world::{Relation, TerrainMap};

/// Armed ground unit: speed 1, range 5 gun reloading in 20 ticks.
pub const ROVER: UnitTypeId = 1;
/// Unarmed ground unit: speed 1.
pub const RUNNER: UnitTypeId = 2;
/// Unarmed ground unit with crush damage 50.
pub const CRUSHER: UnitTypeId = 3;
/// Immobile, unarmed, 40 health.
pub const LIGHT_POST: UnitTypeId = 4;
/// Immobile, unarmed, 60 health.
pub const HEAVY_POST: UnitTypeId = 5;
/// Immobile, unarmed, 1000 health.
pub const DUMMY: UnitTypeId = 6;
/// 2x2 facility built in 10 steps, with a production plugin.
pub const DEPOT: UnitTypeId = 7;
/// Aircraft with a gun hitting air and ground.
pub const GUNSHIP: UnitTypeId = 8;
/// Immobile turret with shields and armor.
pub const BUNKER: UnitTypeId = 9;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A ground gun.
#[must_use]
pub fn gun(range: i32, damage: u32, reload: u32) -> WeaponProperties {
    WeaponProperties {
        name: "gun".to_string(),
        range: fixed(range),
        damage,
        reload,
        can_shoot_at_air: false,
        can_shoot_at_land: true,
        auto_use: true,
        turret: false,
        shot: ShotKind::Bullet,
    }
}

/// A unit type with no weapons that cannot move.
#[must_use]
pub fn static_type(id: UnitTypeId, name: &str, max_health: u32) -> UnitProperties {
    UnitProperties {
        id,
        name: name.to_string(),
        size: 1,
        max_health,
        max_shields: 0,
        armor: 0,
        max_speed: Fixed::ZERO,
        acceleration: Fixed::ZERO,
        deceleration: Fixed::ZERO,
        rotation_speed: Fixed::ZERO,
        crush_damage: 0,
        aircraft: false,
        preferred_altitude: Fixed::ZERO,
        depth: Fixed::ONE,
        construction_steps: 0,
        weapons: Vec::new(),
        plugins: Vec::new(),
    }
}

/// A ground unit type with speed 1 turning 45 degrees per tick.
#[must_use]
pub fn mobile_type(id: UnitTypeId, name: &str, max_health: u32) -> UnitProperties {
    UnitProperties {
        max_speed: Fixed::ONE,
        acceleration: Fixed::ONE,
        deceleration: Fixed::ONE,
        rotation_speed: fixed(45),
        ..static_type(id, name, max_health)
    }
}

/// Every fixture unit type.
#[must_use]
pub fn unit_types() -> Vec<UnitProperties> {
    vec![
        UnitProperties {
            weapons: vec![gun(5, 10, 20)],
            ..mobile_type(ROVER, "rover", 100)
        },
        mobile_type(RUNNER, "runner", 50),
        UnitProperties {
            crush_damage: 50,
            ..mobile_type(CRUSHER, "crusher", 200)
        },
        static_type(LIGHT_POST, "light_post", 40),
        static_type(HEAVY_POST, "heavy_post", 60),
        static_type(DUMMY, "dummy", 1000),
        UnitProperties {
            size: 2,
            construction_steps: 10,
            plugins: vec![PluginKind::Production],
            ..static_type(DEPOT, "depot", 500)
        },
        UnitProperties {
            aircraft: true,
            preferred_altitude: fixed(4),
            rotation_speed: fixed(10),
            weapons: vec![WeaponProperties {
                can_shoot_at_air: true,
                turret: true,
                ..gun(4, 8, 15)
            }],
            ..mobile_type(GUNSHIP, "gunship", 80)
        },
        UnitProperties {
            max_shields: 20,
            armor: 2,
            weapons: vec![WeaponProperties {
                turret: true,
                can_shoot_at_air: true,
                ..gun(6, 15, 30)
            }],
            ..static_type(BUNKER, "bunker", 300)
        },
    ]
}

/// Registry holding [`unit_types`].
#[must_use]
pub fn unit_catalog() -> UnitTypeRegistry {
    let mut registry = UnitTypeRegistry::new();
    for properties in unit_types() {
        registry
            .insert(properties)
            .expect("fixture unit types are valid");
    }
    registry
}

/// Builds a [`Simulation`] over an open map with the fixture catalog.
#[derive(Debug, Clone)]
pub struct SimBuilder {
    sim: Simulation,
}

impl SimBuilder {
    /// Open, flat map of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_registry(width, height, unit_catalog())
    }

    /// Open, flat map with a custom catalog.
    #[must_use]
    pub fn with_registry(width: u32, height: u32, registry: UnitTypeRegistry) -> Self {
        Self {
            sim: Simulation::new(TerrainMap::new(width, height), registry),
        }
    }

    /// Mark a cell impassable.
    pub fn block(&mut self, x: i32, y: i32) -> &mut Self {
        self.sim.terrain_mut().set_passable(x, y, false);
        self
    }

    /// Mark a vertical line of cells impassable, `y0..=y1` inclusive.
    pub fn wall(&mut self, x: i32, y0: i32, y1: i32) -> &mut Self {
        for y in y0..=y1 {
            self.block(x, y);
        }
        self
    }

    /// Override the relation between two players.
    pub fn relation(&mut self, a: PlayerId, b: PlayerId, relation: Relation) -> &mut Self {
        self.sim.diplomacy_mut().set(a, b, relation);
        self
    }

    /// Spawn a unit centered on a cell, facing east.
    pub fn spawn(&mut self, type_id: UnitTypeId, owner: PlayerId, x: i32, y: i32) -> UnitId {
        self.spawn_with(UnitSpawnParams {
            type_id,
            owner,
            position: Vec2Fixed::cell_center(x, y),
            rotation: fixed(90),
            complete: false,
        })
    }

    /// Spawn a unit with explicit parameters.
    pub fn spawn_with(&mut self, params: UnitSpawnParams) -> UnitId {
        self.sim.spawn(params).expect("fixture spawn must succeed")
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Simulation {
        self.sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_complete() {
        let registry = unit_catalog();
        assert_eq!(registry.len(), unit_types().len());
        assert!(registry.get(ROVER).is_some_and(UnitProperties::can_shoot));
        assert!(registry.get(DEPOT).is_some_and(UnitProperties::is_facility));
        assert!(registry.get(GUNSHIP).is_some_and(|p| p.aircraft));
    }

    #[test]
    fn test_builder_spawns_sequential_ids() {
        let mut builder = SimBuilder::new(16, 16);
        let a = builder.spawn(ROVER, 1, 2, 2);
        let b = builder.spawn(DUMMY, 2, 5, 2);
        let sim = builder.build();
        assert_eq!((a, b), (1, 2));
        assert_eq!(sim.units().len(), 2);
        assert_eq!(sim.unit(a).map(|u| u.rotation()), Some(fixed(90)));
    }

    #[test]
    fn test_builder_blocks_cells() {
        let mut builder = SimBuilder::new(8, 8);
        builder.wall(3, 0, 7);
        let sim = builder.build();
        assert!(!sim.terrain().get(3, 4).is_some_and(|c| c.passable));
        assert!(sim.terrain().get(4, 4).is_some_and(|c| c.passable));
    }
}
