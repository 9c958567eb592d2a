//! Error types for the behavior engine.
//!
//! Errors only exist at the crate's API boundary. Inside a tick every
//! routine signals failure by returning `false` or leaving state unchanged.

use thiserror::Error;

use crate::properties::UnitTypeId;
use crate::unit::UnitId;

/// Shorthand for results carrying a [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum GameError {
    /// No unit with this id exists.
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// Spawn or load referenced a type missing from the registry.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(UnitTypeId),

    /// A unit type definition failed validation.
    #[error("Invalid unit type '{name}': {message}")]
    InvalidUnitType {
        /// Name of the offending type.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A unit catalog or save could not be decoded.
    #[error("Cannot read '{path}': {message}")]
    DataParseError {
        /// Source file, or a label for in-memory data.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// Save data written by an incompatible version.
    #[error("Save version mismatch: expected {expected}, found {found}")]
    SaveVersionMismatch {
        /// Version this build writes.
        expected: u32,
        /// Version found in the data.
        found: u32,
    },

    /// Loaded or requested state breaks an engine invariant.
    #[error("Inconsistent simulation state: {0}")]
    InvalidState(String),

    /// File access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Two replicas disagree on the state hash.
    #[error("Replicas diverged at tick {tick}: {local_hash:016x} vs {remote_hash:016x}")]
    DesyncDetected {
        /// First tick with differing hashes.
        tick: u64,
        /// Hash on this side.
        local_hash: u64,
        /// Hash on the other side.
        remote_hash: u64,
    },
}
