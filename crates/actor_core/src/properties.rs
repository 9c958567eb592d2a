//! Static unit type data.
//!
//! Unit and weapon definitions are plain data loaded from RON. Fixed-point
//! fields are stored as raw bits like every other fixed value.
//!
//! # Example RON
//!
//! ```ron
//! UnitProperties(
//!     id: 1,
//!     name: "tank",
//!     max_health: 100,
//!     max_speed: 2147483648,      // Fixed-point for 0.5
//!     acceleration: 429496730,    // Fixed-point for 0.1
//!     deceleration: 429496730,
//!     rotation_speed: 42949672960, // Fixed-point for 10.0
//!     crush_damage: 50,
//!     weapons: [
//!         WeaponProperties(
//!             name: "cannon",
//!             range: 21474836480, // Fixed-point for 5.0
//!             damage: 20,
//!             reload: 20,
//!             can_shoot_at_land: true,
//!         ),
//!     ],
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed};

/// Identifier of a unit type in the [`UnitTypeRegistry`].
pub type UnitTypeId = u32;

/// Upper bound on weapons a single unit carries.
pub const MAX_WEAPONS_PER_UNIT: usize = 16;

/// What a weapon fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShotKind {
    /// Instant hit.
    #[default]
    Bullet,
    /// Guided projectile.
    Missile,
    /// Dropped from the air; grants the bombing capability.
    Bomb,
    /// Placed on the ground; grants the mining capability.
    Mine,
}

/// Capability kinds a unit may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PluginKind {
    /// Produces other units.
    Production,
    /// Repairs nearby units.
    Repair,
    /// Collects resources.
    Harvester,
    /// Accepts harvested resources.
    Refinery,
    /// A resource deposit.
    ResourceMine,
    /// Drops bombs on a location.
    Bombing,
    /// Places mines.
    Mining,
}

/// Definition of a single weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponProperties {
    /// Display name.
    pub name: String,

    /// Maximum Chebyshev distance to the target, in cells.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,

    /// Damage per shot before shields and armor.
    pub damage: u32,

    /// Ticks between shots.
    pub reload: u32,

    /// Can hit flying units.
    #[serde(default)]
    pub can_shoot_at_air: bool,

    /// Can hit ground units.
    #[serde(default)]
    pub can_shoot_at_land: bool,

    /// Fired automatically against enemies in range.
    #[serde(default = "default_true")]
    pub auto_use: bool,

    /// Mounted on a turret, so the unit needs not face the target.
    #[serde(default)]
    pub turret: bool,

    /// Projectile kind.
    #[serde(default)]
    pub shot: ShotKind,
}

impl WeaponProperties {
    /// Whether this weapon can hit a unit of the given domain.
    #[must_use]
    pub const fn can_hit(&self, flying: bool) -> bool {
        if flying {
            self.can_shoot_at_air
        } else {
            self.can_shoot_at_land
        }
    }
}

/// Data-driven unit type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProperties {
    /// Registry key.
    pub id: UnitTypeId,

    /// Display name.
    pub name: String,

    /// Footprint side length in cells.
    #[serde(default = "default_size")]
    pub size: u32,

    /// Maximum health points.
    pub max_health: u32,

    /// Maximum shield points.
    #[serde(default)]
    pub max_shields: u32,

    /// Flat damage reduction per hit.
    #[serde(default)]
    pub armor: u32,

    /// Top speed in cells per tick. Zero means the unit never moves.
    #[serde(default, with = "fixed_serde")]
    pub max_speed: Fixed,

    /// Speed gained per tick.
    #[serde(default, with = "fixed_serde")]
    pub acceleration: Fixed,

    /// Speed lost per tick.
    #[serde(default, with = "fixed_serde")]
    pub deceleration: Fixed,

    /// Degrees turned per tick.
    #[serde(default, with = "fixed_serde")]
    pub rotation_speed: Fixed,

    /// Units with max health at or below this are crushed when driven over.
    #[serde(default)]
    pub crush_damage: u32,

    /// Flies instead of driving.
    #[serde(default)]
    pub aircraft: bool,

    /// Cruise altitude above the terrain.
    #[serde(default, with = "fixed_serde")]
    pub preferred_altitude: Fixed,

    /// Model height, used to sink wreckage.
    #[serde(default = "default_depth", with = "fixed_serde")]
    pub depth: Fixed,

    /// Steps to finish construction; zero for units that spawn complete.
    #[serde(default)]
    pub construction_steps: u32,

    /// Weapon set.
    #[serde(default)]
    pub weapons: Vec<WeaponProperties>,

    /// Capabilities granted by this type.
    #[serde(default)]
    pub plugins: Vec<PluginKind>,
}

const fn default_true() -> bool {
    true
}

const fn default_size() -> u32 {
    1
}

const fn default_depth() -> Fixed {
    Fixed::ONE
}

impl UnitProperties {
    /// Whether the unit can move at all.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.max_speed > Fixed::ZERO
    }

    /// Whether the unit is built step by step after placement.
    #[must_use]
    pub const fn is_facility(&self) -> bool {
        self.construction_steps > 0
    }

    /// Whether any weapon is present.
    #[must_use]
    pub fn can_shoot(&self) -> bool {
        !self.weapons.is_empty()
    }

    /// Whether any weapon hits flying units.
    #[must_use]
    pub fn can_shoot_at_air(&self) -> bool {
        self.weapons.iter().any(|w| w.can_shoot_at_air)
    }

    /// Whether any weapon hits ground units.
    #[must_use]
    pub fn can_shoot_at_land(&self) -> bool {
        self.weapons.iter().any(|w| w.can_shoot_at_land)
    }

    /// Footprint extent around the center cell as `(before, after)`.
    #[must_use]
    pub fn edge_distances(&self) -> (i32, i32) {
        let size = i32::try_from(self.size.max(1)).unwrap_or(1);
        ((size - 1) / 2, size / 2)
    }

    /// Capabilities this type carries, including those implied by weapons.
    #[must_use]
    pub fn plugin_kinds(&self) -> Vec<PluginKind> {
        let mut kinds = self.plugins.clone();
        for weapon in &self.weapons {
            let implied = match weapon.shot {
                ShotKind::Bomb => Some(PluginKind::Bombing),
                ShotKind::Mine => Some(PluginKind::Mining),
                ShotKind::Bullet | ShotKind::Missile => None,
            };
            if let Some(kind) = implied {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }

    /// Reject definitions the engine cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidUnitType`] for a zero max health,
    /// negative speeds, or a mobile unit that cannot accelerate.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| GameError::InvalidUnitType {
            name: self.name.clone(),
            message: message.to_string(),
        };
        if self.max_health == 0 {
            return Err(fail("max_health must be positive"));
        }
        if self.max_speed < Fixed::ZERO
            || self.acceleration < Fixed::ZERO
            || self.deceleration < Fixed::ZERO
            || self.rotation_speed < Fixed::ZERO
        {
            return Err(fail("speeds must not be negative"));
        }
        if self.is_mobile() && self.acceleration == Fixed::ZERO {
            return Err(fail("mobile units need a positive acceleration"));
        }
        if self.is_mobile() && self.rotation_speed == Fixed::ZERO {
            return Err(fail("mobile units need a positive rotation speed"));
        }
        Ok(())
    }
}

/// Catalog of unit types by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTypeRegistry {
    types: BTreeMap<UnitTypeId, UnitProperties>,
}

impl UnitTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a type after validating it.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the definition.
    pub fn insert(&mut self, properties: UnitProperties) -> Result<()> {
        properties.validate()?;
        self.types.insert(properties.id, properties);
        Ok(())
    }

    /// Look up a type.
    #[must_use]
    pub fn get(&self, id: UnitTypeId) -> Option<&UnitProperties> {
        self.types.get(&id)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitProperties> {
        self.types.values()
    }

    /// Parse a RON list of unit types.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] on malformed RON and the
    /// validation error of any invalid definition.
    pub fn from_ron_str(source: &str, path: &str) -> Result<Self> {
        let list: Vec<UnitProperties> =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let mut registry = Self::new();
        for properties in list {
            registry.insert(properties)?;
        }
        Ok(registry)
    }

    /// Load a RON list of unit types from a file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_ron_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weapon(shot: ShotKind) -> WeaponProperties {
        WeaponProperties {
            name: "gun".to_string(),
            range: Fixed::from_num(5),
            damage: 10,
            reload: 20,
            can_shoot_at_air: false,
            can_shoot_at_land: true,
            auto_use: true,
            turret: false,
            shot,
        }
    }

    fn tank() -> UnitProperties {
        UnitProperties {
            id: 1,
            name: "tank".to_string(),
            size: 1,
            max_health: 100,
            max_shields: 0,
            armor: 0,
            max_speed: Fixed::from_num(0.5),
            acceleration: Fixed::from_num(0.1),
            deceleration: Fixed::from_num(0.1),
            rotation_speed: Fixed::from_num(10),
            crush_damage: 0,
            aircraft: false,
            preferred_altitude: Fixed::ZERO,
            depth: Fixed::ONE,
            construction_steps: 0,
            weapons: vec![weapon(ShotKind::Bullet)],
            plugins: Vec::new(),
        }
    }

    #[test]
    fn test_edge_distances() {
        let mut props = tank();
        assert_eq!(props.edge_distances(), (0, 0));
        props.size = 2;
        assert_eq!(props.edge_distances(), (0, 1));
        props.size = 3;
        assert_eq!(props.edge_distances(), (1, 1));
    }

    #[test]
    fn test_shot_kinds_imply_plugins() {
        let mut props = tank();
        props.weapons.push(weapon(ShotKind::Bomb));
        props.weapons.push(weapon(ShotKind::Bomb));
        props.weapons.push(weapon(ShotKind::Mine));
        assert_eq!(
            props.plugin_kinds(),
            vec![PluginKind::Bombing, PluginKind::Mining]
        );
    }

    #[test]
    fn test_validate_rejects_zero_health() {
        let mut props = tank();
        props.max_health = 0;
        assert!(matches!(
            props.validate(),
            Err(GameError::InvalidUnitType { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_immobile_acceleration() {
        let mut props = tank();
        props.acceleration = Fixed::ZERO;
        assert!(props.validate().is_err());
        props.max_speed = Fixed::ZERO;
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_registry_from_ron() {
        let source = r#"[
            (
                id: 7,
                name: "scout",
                max_health: 40,
                max_speed: 4294967296,
                acceleration: 4294967296,
                rotation_speed: 42949672960,
                weapons: [
                    (name: "mg", range: 12884901888, damage: 5, reload: 10, can_shoot_at_land: true),
                ],
            ),
        ]"#;
        let registry = UnitTypeRegistry::from_ron_str(source, "inline").unwrap();
        let scout = registry.get(7).unwrap();
        assert_eq!(scout.max_speed, Fixed::ONE);
        assert_eq!(scout.size, 1);
        assert_eq!(scout.weapons[0].range, Fixed::from_num(3));
        assert!(scout.weapons[0].auto_use);
        assert!(scout.can_shoot_at_land());
        assert!(!scout.can_shoot_at_air());
    }

    #[test]
    fn test_registry_parse_error() {
        let err = UnitTypeRegistry::from_ron_str("[ (id: ", "broken.ron").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { .. }));
    }
}
