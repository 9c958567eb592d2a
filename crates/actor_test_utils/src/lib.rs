//! Test support shared by the actor crates.
//!
//! [`fixtures`] holds a small catalog of unit types and a map builder;
//! [`determinism`] compares replicas and generates random order scripts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
