//! Headless scenario runner for CI verification.
//!
//! Loads RON scenarios, drives the simulation with their order scripts and
//! reports the outcome as JSON. This enables:
//!
//! - **Regression checks**: Compare summaries and final state hashes
//! - **Determinism checks**: Run a scenario several times in parallel
//! - **Save checks**: Save mid-run, restore, and compare against the
//!   uninterrupted run
//!
//! Logs go to stderr; summaries go to stdout.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario
//! cargo run -p actor_headless -- run --scenario scenarios/skirmish.ron
//!
//! # Verify determinism
//! cargo run -p actor_headless -- verify --scenario scenarios/skirmish.ron --runs 8
//! ```

pub mod runner;
pub mod scenario;

pub use runner::{
    run_batch, run_scenario, verify_determinism, verify_save_roundtrip, DeterminismReport,
    RoundTripReport, RunSummary, ScenarioRunner,
};
pub use scenario::{PreparedScenario, Scenario, ScenarioError};
