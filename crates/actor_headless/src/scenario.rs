//! Scenario loading and configuration.
//!
//! Scenarios describe a map, a unit type catalog, starting units and a
//! script of timed orders. Units are referenced by label so scripts stay
//! readable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use actor_core::error::GameError;
use actor_core::math::{Fixed, Vec2Fixed};
use actor_core::properties::{PluginKind, UnitProperties, UnitTypeId, UnitTypeRegistry};
use actor_core::simulation::{Order, Simulation, UnitSpawnParams};
use actor_core::unit::{PlayerId, UnitId};
use actor_core::world::{Relation, TerrainMap};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A placement names a type missing from the catalog.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),
    /// An order refers to a label no placement carries.
    #[error("Unknown unit label: {0}")]
    UnknownLabel(String),
    /// Two placements share a label.
    #[error("Duplicate unit label: {0}")]
    DuplicateLabel(String),
    /// The engine rejected the setup.
    #[error("Simulation error: {0}")]
    Game(#[from] GameError),
}

/// Inclusive rectangle of impassable cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Lower corner (x, y).
    pub min: (i32, i32),
    /// Upper corner (x, y).
    pub max: (i32, i32),
}

/// Terrain height of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightPatch {
    /// Cell (x, y).
    pub cell: (i32, i32),
    /// Height in whole units.
    pub height: i32,
}

/// Relation override between two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSetup {
    /// First player.
    pub a: PlayerId,
    /// Second player.
    pub b: PlayerId,
    /// Relation in both directions.
    pub relation: Relation,
}

/// A unit present at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Name orders use to refer to this unit.
    #[serde(default)]
    pub label: Option<String>,
    /// Unit type name from the catalog.
    pub unit_type: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Cell the unit is centered on.
    pub cell: (i32, i32),
    /// Initial facing in degrees.
    #[serde(default)]
    pub facing: i32,
    /// Place a facility already built.
    #[serde(default)]
    pub complete: bool,
}

impl UnitPlacement {
    /// Create an unlabeled placement.
    #[must_use]
    pub fn new(unit_type: impl Into<String>, owner: PlayerId, x: i32, y: i32) -> Self {
        Self {
            label: None,
            unit_type: unit_type.into(),
            owner,
            cell: (x, y),
            facing: 0,
            complete: false,
        }
    }

    /// Attach a label.
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An order in scenario terms: cells instead of points, labels instead of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSpec {
    /// Move to the center of a cell.
    Move {
        /// Destination cell.
        to: (i32, i32),
        /// Engage enemies on the way.
        #[serde(default)]
        attack: bool,
    },
    /// Queue another destination.
    Waypoint {
        /// Destination cell.
        to: (i32, i32),
    },
    /// Approach another unit.
    MoveToUnit {
        /// Label of the unit to approach.
        target: String,
        /// Acceptable distance in cells.
        range: i32,
    },
    /// Attack a unit.
    Attack {
        /// Label of the victim.
        target: String,
    },
    /// Stay close to a unit.
    Follow {
        /// Label of the leader.
        target: String,
        /// Distance to keep in cells.
        distance: i32,
    },
    /// Face a direction.
    Turn {
        /// Rotation in degrees.
        rotation: i32,
    },
    /// Drop every order.
    Stop,
    /// Run a plugin.
    Plugin {
        /// Plugin to run.
        kind: PluginKind,
    },
}

/// A scripted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOrder {
    /// Issued right before this tick runs (1-based).
    pub tick: u64,
    /// Label of the receiving unit.
    pub unit: String,
    /// What to do.
    pub order: OrderSpec,
}

/// An order resolved to engine ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOrder {
    /// Issued right before this tick runs.
    pub tick: u64,
    /// Receiver.
    pub unit: UnitId,
    /// Order.
    pub order: Order,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map dimensions in cells.
    pub map_size: (u32, u32),
    /// Impassable areas.
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    /// Raised cells.
    #[serde(default)]
    pub heights: Vec<HeightPatch>,
    /// Relation overrides; unlisted players are enemies.
    #[serde(default)]
    pub relations: Vec<RelationSetup>,
    /// Unit type catalog file, relative to the scenario file.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Inline unit types, added after the catalog.
    #[serde(default)]
    pub unit_types: Vec<UnitProperties>,
    /// Starting units, spawned in order.
    pub units: Vec<UnitPlacement>,
    /// Order script.
    #[serde(default)]
    pub orders: Vec<ScenarioOrder>,
    /// Ticks to run.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Directory catalog paths resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

const fn default_ticks() -> u64 {
    600
}

/// A scenario turned into a live simulation.
#[derive(Debug, Clone)]
pub struct PreparedScenario {
    /// Simulation at tick 0.
    pub simulation: Simulation,
    /// Orders sorted by tick, stable within a tick.
    pub orders: Vec<ScheduledOrder>,
    /// Unit ids by label.
    pub labels: BTreeMap<String, UnitId>,
    /// Ticks to run.
    pub ticks: u64,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        scenario.base_dir = path.parent().map(Path::to_path_buf);
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Resolve the unit type catalog.
    pub fn registry(&self) -> Result<UnitTypeRegistry, ScenarioError> {
        let mut registry = match &self.catalog {
            Some(catalog) => {
                let path = match &self.base_dir {
                    Some(dir) => dir.join(catalog),
                    None => catalog.clone(),
                };
                tracing::debug!("Loading unit catalog from {}", path.display());
                UnitTypeRegistry::load(path)?
            }
            None => UnitTypeRegistry::new(),
        };
        for properties in &self.unit_types {
            registry.insert(properties.clone())?;
        }
        Ok(registry)
    }

    /// Build the map, spawn the starting units and resolve the order script.
    pub fn prepare(&self) -> Result<PreparedScenario, ScenarioError> {
        let registry = self.registry()?;
        let names: BTreeMap<&str, UnitTypeId> = registry
            .iter()
            .map(|props| (props.name.as_str(), props.id))
            .collect();

        let mut terrain = TerrainMap::new(self.map_size.0, self.map_size.1);
        for obstacle in &self.obstacles {
            for x in obstacle.min.0..=obstacle.max.0 {
                for y in obstacle.min.1..=obstacle.max.1 {
                    terrain.set_passable(x, y, false);
                }
            }
        }
        for patch in &self.heights {
            terrain.set_height(patch.cell.0, patch.cell.1, Fixed::from_num(patch.height));
        }

        let mut simulation = Simulation::new(terrain, registry.clone());
        for setup in &self.relations {
            simulation.diplomacy_mut().set(setup.a, setup.b, setup.relation);
        }

        let mut labels = BTreeMap::new();
        for placement in &self.units {
            let type_id = *names
                .get(placement.unit_type.as_str())
                .ok_or_else(|| ScenarioError::UnknownUnitType(placement.unit_type.clone()))?;
            let id = simulation.spawn(UnitSpawnParams {
                type_id,
                owner: placement.owner,
                position: Vec2Fixed::cell_center(placement.cell.0, placement.cell.1),
                rotation: Fixed::from_num(placement.facing),
                complete: placement.complete,
            })?;
            if let Some(label) = &placement.label {
                if labels.insert(label.clone(), id).is_some() {
                    return Err(ScenarioError::DuplicateLabel(label.clone()));
                }
            }
        }

        let lookup = |label: &str| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| ScenarioError::UnknownLabel(label.to_string()))
        };
        let mut orders = self
            .orders
            .iter()
            .map(|scripted| {
                Ok(ScheduledOrder {
                    tick: scripted.tick,
                    unit: lookup(&scripted.unit)?,
                    order: resolve_order(&scripted.order, &lookup)?,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;
        orders.sort_by_key(|scheduled| scheduled.tick);

        tracing::info!(
            "Prepared scenario '{}': {} units, {} orders",
            self.name,
            simulation.units().len(),
            orders.len()
        );

        Ok(PreparedScenario {
            simulation,
            orders,
            labels,
            ticks: self.ticks,
        })
    }
}

fn resolve_order(
    spec: &OrderSpec,
    lookup: &impl Fn(&str) -> Result<UnitId, ScenarioError>,
) -> Result<Order, ScenarioError> {
    Ok(match spec {
        OrderSpec::Move { to, attack } => Order::Move {
            target: Vec2Fixed::cell_center(to.0, to.1),
            attack: *attack,
        },
        OrderSpec::Waypoint { to } => Order::Waypoint {
            target: Vec2Fixed::cell_center(to.0, to.1),
        },
        OrderSpec::MoveToUnit { target, range } => Order::MoveToUnit {
            target: lookup(target)?,
            range: Fixed::from_num(*range),
        },
        OrderSpec::Attack { target } => Order::Attack {
            target: lookup(target)?,
        },
        OrderSpec::Follow { target, distance } => Order::Follow {
            target: lookup(target)?,
            distance: Fixed::from_num(*distance),
        },
        OrderSpec::Turn { rotation } => Order::Turn {
            rotation: Fixed::from_num(*rotation),
        },
        OrderSpec::Stop => Order::Stop,
        OrderSpec::Plugin { kind } => Order::Plugin { kind: *kind },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Raw bits: 4294967296 = 1.0, 21474836480 = 5.0, 193273528320 = 45.0
    const DUEL: &str = r#"
        Scenario(
            name: "Duel",
            map_size: (16, 8),
            obstacles: [(min: (8, 0), max: (8, 2))],
            heights: [(cell: (1, 1), height: 2)],
            unit_types: [
                (
                    id: 1,
                    name: "rover",
                    max_health: 100,
                    max_speed: 4294967296,
                    acceleration: 4294967296,
                    deceleration: 4294967296,
                    rotation_speed: 193273528320,
                    weapons: [(name: "gun", range: 21474836480, damage: 10, reload: 20, can_shoot_at_land: true)],
                ),
                (id: 2, name: "post", max_health: 40),
            ],
            units: [
                (label: Some("hunter"), unit_type: "rover", owner: 1, cell: (2, 4), facing: 90),
                (label: Some("prey"), unit_type: "post", owner: 2, cell: (12, 4)),
            ],
            orders: [
                (tick: 1, unit: "hunter", order: Attack(target: "prey")),
            ],
            ticks: 120,
        )
    "#;

    #[test]
    fn test_parse_from_ron() {
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        assert_eq!(scenario.name, "Duel");
        assert_eq!(scenario.map_size, (16, 8));
        assert_eq!(scenario.units.len(), 2);
        assert_eq!(scenario.unit_types[0].max_speed, Fixed::ONE);
        assert!(scenario.description.is_empty());
    }

    #[test]
    fn test_prepare_spawns_and_resolves_labels() {
        let prepared = Scenario::from_ron_str(DUEL).unwrap().prepare().unwrap();
        assert_eq!(prepared.labels["hunter"], 1);
        assert_eq!(prepared.labels["prey"], 2);
        assert_eq!(prepared.orders, vec![ScheduledOrder {
            tick: 1,
            unit: 1,
            order: Order::Attack { target: 2 },
        }]);
        let terrain = prepared.simulation.terrain();
        assert!(!terrain.get(8, 1).is_some_and(|c| c.passable));
        assert!(terrain.get(8, 3).is_some_and(|c| c.passable));
        assert_eq!(prepared.ticks, 120);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.units.push(UnitPlacement::new("tank", 1, 3, 3));
        assert!(matches!(
            scenario.prepare(),
            Err(ScenarioError::UnknownUnitType(name)) if name == "tank"
        ));
    }

    #[test]
    fn test_unknown_and_duplicate_labels_are_rejected() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.orders[0].unit = "ghost".to_string();
        assert!(matches!(scenario.prepare(), Err(ScenarioError::UnknownLabel(_))));

        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario
            .units
            .push(UnitPlacement::new("post", 2, 14, 4).labeled("prey"));
        assert!(matches!(scenario.prepare(), Err(ScenarioError::DuplicateLabel(_))));
    }

    #[test]
    fn test_catalog_resolves_against_scenario_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("units.ron"),
            r#"[(id: 7, name: "crate", max_health: 10)]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("boxes.ron"),
            r#"Scenario(
                name: "Boxes",
                map_size: (4, 4),
                catalog: Some("units.ron"),
                units: [(unit_type: "crate", owner: 1, cell: (1, 1))],
            )"#,
        )
        .unwrap();

        let scenario = Scenario::load(dir.path().join("boxes.ron")).unwrap();
        assert_eq!(scenario.ticks, 600);
        let prepared = scenario.prepare().unwrap();
        assert_eq!(prepared.simulation.units().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("does/not/exist.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
