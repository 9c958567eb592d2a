//! # Actor Core
//!
//! Deterministic per-tick unit behavior engine for a lockstep RTS.
//!
//! Nothing here renders, reads files during a tick, draws random numbers or
//! touches floats; all arithmetic is [`math::Fixed`].
//!
//! Every unit runs exactly one behavior routine per tick, selected by its
//! work mode. Routines move units along pathfinder output, pick and shoot
//! targets, build facilities step by step and crush light obstacles. Given
//! identical inputs, every replica reaches bit-identical state.
//!
//! ## Crate Structure
//!
//! - [`math`] - Fixed-point scalars, vectors and angles
//! - [`unit`] - Per-unit state and order primitives
//! - [`dispatch`] - Work mode routine table and tick context
//! - [`movement`] - Ground path following and aircraft steering
//! - [`combat`] - Target selection and firing
//! - [`construction`] - Facility construction
//! - [`world`] - Map, occupancy and diplomacy collaborators
//! - [`pathfinding`] - Path requests and the grid A* pathfinder
//! - [`simulation`] - Unit storage, orders and the tick loop
//! - [`persistence`] - Save games
//! - [`replication`] - Replicated property declaration

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod collision;
pub mod combat;
pub mod construction;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod math;
pub mod movement;
pub mod pathfinding;
pub mod persistence;
pub mod plugins;
pub mod properties;
pub mod replication;
pub mod simulation;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::pathfinding::{GridPathfinder, PathInfo, PathResult, Pathfinder};
    pub use crate::persistence::{SaveGame, UnitSave, SAVE_VERSION};
    pub use crate::properties::{
        PluginKind, ShotKind, UnitProperties, UnitTypeId, UnitTypeRegistry, WeaponProperties,
    };
    pub use crate::simulation::{Order, ShotEvent, Simulation, TickEvents, UnitSpawnParams};
    pub use crate::unit::{MovingStatus, PlayerId, Unit, UnitId, WorkMode};
    pub use crate::world::{Diplomacy, DiplomacyTable, Relation, TerrainMap, World};
}
