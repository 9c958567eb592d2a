//! World and diplomacy collaborators.
//!
//! The behavior routines only see the map, other units and ownership
//! relations through the [`World`] and [`Diplomacy`] traits. Inside the
//! simulation both are backed by committed state from the previous tick:
//! a [`TerrainMap`], an [`OccupancyIndex`] rebuilt from the unit snapshot,
//! and a [`DiplomacyTable`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::properties::{UnitProperties, UnitTypeId, UnitTypeRegistry};
use crate::simulation::UnitStorage;
use crate::unit::{PlayerId, Unit, UnitId};

/// A single map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Whether ground units may enter.
    pub passable: bool,
    /// Ground height.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            passable: true,
            height: Fixed::ZERO,
        }
    }
}

/// Read-only view of the map and the committed unit state.
pub trait World {
    /// Map width in cells.
    fn map_width(&self) -> i32;

    /// Map height in cells.
    fn map_height(&self) -> i32;

    /// Cell at the given coordinate, `None` outside the map.
    fn cell(&self, x: i32, y: i32) -> Option<Cell>;

    /// Ground units whose footprint covers the cell, in ascending id order.
    fn occupants(&self, x: i32, y: i32) -> &[UnitId];

    /// Terrain height at a point. Zero outside the map.
    fn height_at(&self, x: Fixed, y: Fixed) -> Fixed;

    /// Resolve a unit handle. `None` once the unit is gone.
    fn unit(&self, id: UnitId) -> Option<&Unit>;

    /// Static data of a unit type.
    fn properties(&self, type_id: UnitTypeId) -> Option<&UnitProperties>;

    /// Living units within Chebyshev distance `range` of `center`, in
    /// ascending id order.
    fn units_near(&self, center: Vec2Fixed, range: Fixed) -> Vec<UnitId>;

    /// Whether a cell coordinate lies on the map.
    fn on_map(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.map_width() && y < self.map_height()
    }
}

/// Row-major terrain grid with one-unit cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainMap {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl TerrainMap {
    /// Flat, fully passable map.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let width = i32::try_from(width).unwrap_or(i32::MAX);
        let height = i32::try_from(height).unwrap_or(i32::MAX);
        #[allow(clippy::cast_sign_loss)]
        let count = width.max(0) as usize * height.max(0) as usize;
        Self {
            width,
            height,
            cells: vec![Cell::default(); count],
        }
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        usize::try_from(y * self.width + x).ok()
    }

    /// Cell at a coordinate.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.index(x, y).and_then(|i| self.cells.get(i).copied())
    }

    /// Mark a cell passable or blocked. Ignored outside the map.
    pub fn set_passable(&mut self, x: i32, y: i32, passable: bool) {
        if let Some(cell) = self.index(x, y).and_then(|i| self.cells.get_mut(i)) {
            cell.passable = passable;
        }
    }

    /// Set a cell's ground height. Ignored outside the map.
    pub fn set_height(&mut self, x: i32, y: i32, height: Fixed) {
        if let Some(cell) = self.index(x, y).and_then(|i| self.cells.get_mut(i)) {
            cell.height = height;
        }
    }

    /// Ground height under a point.
    #[must_use]
    pub fn height_at(&self, x: Fixed, y: Fixed) -> Fixed {
        let (cx, cy) = Vec2Fixed::new(x, y).cell();
        self.get(cx, cy).map_or(Fixed::ZERO, |c| c.height)
    }
}

/// Which ground units cover each cell, rebuilt once per tick.
#[derive(Debug, Clone, Default)]
pub struct OccupancyIndex {
    width: i32,
    height: i32,
    cells: Vec<Vec<UnitId>>,
}

impl OccupancyIndex {
    /// Index the footprints of all living ground units.
    ///
    /// Wreckage and aircraft never occupy cells.
    #[must_use]
    pub fn build(terrain: &TerrainMap, units: &UnitStorage, registry: &UnitTypeRegistry) -> Self {
        let width = terrain.width();
        let height = terrain.height();
        #[allow(clippy::cast_sign_loss)]
        let count = width.max(0) as usize * height.max(0) as usize;
        let mut cells = vec![Vec::new(); count];

        for unit in units.iter() {
            if unit.is_destroyed() || unit.is_flying() {
                continue;
            }
            let Some(props) = registry.get(unit.type_id()) else {
                continue;
            };
            let (e1, e2) = props.edge_distances();
            let (cx, cy) = unit.center().cell();
            for y in (cy - e1)..=(cy + e2) {
                for x in (cx - e1)..=(cx + e2) {
                    if x < 0 || y < 0 || x >= width || y >= height {
                        continue;
                    }
                    if let Ok(i) = usize::try_from(y * width + x) {
                        cells[i].push(unit.id());
                    }
                }
            }
        }

        Self {
            width,
            height,
            cells,
        }
    }

    /// Units covering a cell.
    #[must_use]
    pub fn at(&self, x: i32, y: i32) -> &[UnitId] {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return &[];
        }
        usize::try_from(y * self.width + x)
            .ok()
            .and_then(|i| self.cells.get(i))
            .map_or(&[], Vec::as_slice)
    }
}

/// [`World`] backed by the committed simulation state.
#[derive(Debug, Clone, Copy)]
pub struct WorldView<'a> {
    /// Terrain.
    pub terrain: &'a TerrainMap,
    /// Occupancy of the committed state.
    pub occupancy: &'a OccupancyIndex,
    /// Unit snapshot from the start of the tick.
    pub units: &'a UnitStorage,
    /// Unit type catalog.
    pub registry: &'a UnitTypeRegistry,
}

impl World for WorldView<'_> {
    fn map_width(&self) -> i32 {
        self.terrain.width()
    }

    fn map_height(&self) -> i32 {
        self.terrain.height()
    }

    fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        self.terrain.get(x, y)
    }

    fn occupants(&self, x: i32, y: i32) -> &[UnitId] {
        self.occupancy.at(x, y)
    }

    fn height_at(&self, x: Fixed, y: Fixed) -> Fixed {
        self.terrain.height_at(x, y)
    }

    fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    fn properties(&self, type_id: UnitTypeId) -> Option<&UnitProperties> {
        self.registry.get(type_id)
    }

    fn units_near(&self, center: Vec2Fixed, range: Fixed) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| !u.is_destroyed() && u.center().chebyshev_distance(center) <= range)
            .map(Unit::id)
            .collect()
    }
}

/// Relation between two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// Same side.
    Ally,
    /// Neither friend nor foe; may be crushed but is never attacked.
    Neutral,
    /// Hostile.
    Enemy,
}

/// Ownership relations between players.
pub trait Diplomacy {
    /// Relation of `a` towards `b`.
    fn relation(&self, a: PlayerId, b: PlayerId) -> Relation;

    /// Whether `a` treats `b` as an enemy.
    fn is_enemy(&self, a: PlayerId, b: PlayerId) -> bool {
        self.relation(a, b) == Relation::Enemy
    }
}

/// Symmetric relation table. Players are allied with themselves and enemies
/// of everyone else unless overridden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomacyTable {
    overrides: BTreeMap<(PlayerId, PlayerId), Relation>,
}

impl DiplomacyTable {
    /// Everyone hostile to everyone else.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relation between two players in both directions.
    pub fn set(&mut self, a: PlayerId, b: PlayerId, relation: Relation) {
        if a != b {
            self.overrides.insert((a.min(b), a.max(b)), relation);
        }
    }
}

impl Diplomacy for DiplomacyTable {
    fn relation(&self, a: PlayerId, b: PlayerId) -> Relation {
        if a == b {
            return Relation::Ally;
        }
        self.overrides
            .get(&(a.min(b), a.max(b)))
            .copied()
            .unwrap_or(Relation::Enemy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_bounds() {
        let mut map = TerrainMap::new(4, 3);
        assert!(map.get(3, 2).is_some());
        assert!(map.get(4, 0).is_none());
        assert!(map.get(0, -1).is_none());
        map.set_passable(1, 1, false);
        assert!(!map.get(1, 1).unwrap().passable);
        map.set_passable(10, 10, false);
    }

    #[test]
    fn test_height_at_point() {
        let mut map = TerrainMap::new(4, 4);
        map.set_height(2, 1, Fixed::from_num(3));
        assert_eq!(
            map.height_at(Fixed::from_num(2.9), Fixed::from_num(1.1)),
            Fixed::from_num(3)
        );
        assert_eq!(map.height_at(Fixed::from_num(-1), Fixed::ZERO), Fixed::ZERO);
    }

    #[test]
    fn test_diplomacy_defaults_and_overrides() {
        let mut table = DiplomacyTable::new();
        assert_eq!(table.relation(1, 1), Relation::Ally);
        assert_eq!(table.relation(1, 2), Relation::Enemy);
        table.set(2, 1, Relation::Neutral);
        assert_eq!(table.relation(1, 2), Relation::Neutral);
        assert_eq!(table.relation(2, 1), Relation::Neutral);
        assert!(!table.is_enemy(1, 2));
        table.set(3, 3, Relation::Enemy);
        assert_eq!(table.relation(3, 3), Relation::Ally);
    }
}
