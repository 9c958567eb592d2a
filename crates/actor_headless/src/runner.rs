//! Scenario execution, determinism checks and save round trips.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use actor_core::persistence::SaveGame;
use actor_core::simulation::{Simulation, TickEvents};
use actor_core::unit::{PlayerId, UnitId};

use crate::scenario::{PreparedScenario, Scenario, ScenarioError, ScheduledOrder};

/// Final state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    /// Unit id.
    pub id: UnitId,
    /// Scenario label, if any.
    pub label: Option<String>,
    /// Unit type name.
    pub unit_type: String,
    /// Owning player.
    pub owner: PlayerId,
    /// Cell of the unit center.
    pub cell: (i32, i32),
    /// Remaining health.
    pub health: u32,
    /// Current work mode.
    pub work: String,
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// State hash after the last tick.
    pub final_hash: u64,
    /// Shots fired.
    pub shots: usize,
    /// Units destroyed.
    pub deaths: usize,
    /// Units destroyed by crushing.
    pub crushed: usize,
    /// Facilities finished.
    pub constructions_completed: usize,
    /// Orders the engine refused.
    pub rejected_orders: usize,
    /// Units left on the map, wreckage included.
    pub units: Vec<UnitSummary>,
}

impl RunSummary {
    /// Save the summary as JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Outcome of running a scenario several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismReport {
    /// Final hash of every run.
    pub hashes: Vec<u64>,
    /// First tick at which a run diverged from run 0.
    pub first_divergence: Option<u64>,
}

impl DeterminismReport {
    /// Whether all runs matched.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.first_divergence.is_none()
    }
}

/// Outcome of saving mid-run and continuing from the save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTripReport {
    /// Tick the save was taken at.
    pub saved_at: u64,
    /// Size of the encoded save.
    pub save_bytes: usize,
    /// First tick whose events or hash differed after restoring.
    pub first_mismatch: Option<u64>,
    /// Final hash of the uninterrupted run.
    pub original_hash: u64,
    /// Final hash of the restored run.
    pub restored_hash: u64,
}

impl RoundTripReport {
    /// Whether the restored run matched the uninterrupted one.
    #[must_use]
    pub fn matches(&self) -> bool {
        self.first_mismatch.is_none() && self.original_hash == self.restored_hash
    }
}

/// Drives a prepared scenario tick by tick.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    simulation: Simulation,
    orders: Vec<ScheduledOrder>,
    next_order: usize,
    rejected: usize,
}

impl ScenarioRunner {
    /// Start from tick 0.
    #[must_use]
    pub fn new(prepared: PreparedScenario) -> Self {
        Self {
            simulation: prepared.simulation,
            orders: prepared.orders,
            next_order: 0,
            rejected: 0,
        }
    }

    /// Continue from an already advanced simulation. Orders scheduled for
    /// ticks that already ran are skipped.
    #[must_use]
    pub fn resume(simulation: Simulation, orders: Vec<ScheduledOrder>) -> Self {
        let done = simulation.current_tick();
        let next_order = orders.partition_point(|o| o.tick <= done);
        Self {
            simulation,
            orders,
            next_order,
            rejected: 0,
        }
    }

    /// The simulation being driven.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Orders refused so far.
    #[must_use]
    pub fn rejected_orders(&self) -> usize {
        self.rejected
    }

    /// Issue the orders due and run one tick.
    pub fn step(&mut self) -> TickEvents {
        let tick = self.simulation.current_tick() + 1;
        while let Some(&scheduled) = self.orders.get(self.next_order) {
            if scheduled.tick > tick {
                break;
            }
            self.next_order += 1;
            if scheduled.tick < tick {
                continue;
            }
            match self.simulation.apply_order(scheduled.unit, scheduled.order) {
                Ok(true) => debug!("Tick {}: unit {} took {:?}", tick, scheduled.unit, scheduled.order),
                Ok(false) => {
                    debug!("Tick {}: unit {} refused {:?}", tick, scheduled.unit, scheduled.order);
                    self.rejected += 1;
                }
                Err(e) => {
                    warn!("Tick {}: order for unit {} failed: {}", tick, scheduled.unit, e);
                    self.rejected += 1;
                }
            }
        }
        self.simulation.tick()
    }
}

/// Run a scenario to its configured length.
pub fn run_scenario(scenario: &Scenario) -> Result<RunSummary, ScenarioError> {
    run_scenario_for(scenario, scenario.ticks)
}

/// Run a scenario for a given number of ticks.
pub fn run_scenario_for(scenario: &Scenario, ticks: u64) -> Result<RunSummary, ScenarioError> {
    let prepared = scenario.prepare()?;
    let labels = prepared.labels.clone();
    let mut runner = ScenarioRunner::new(prepared);

    let mut shots = 0;
    let mut deaths = 0;
    let mut crushed = 0;
    let mut constructions_completed = 0;
    for _ in 0..ticks {
        let events = runner.step();
        shots += events.shots.len();
        deaths += events.deaths.len();
        crushed += events.crushed.len();
        constructions_completed += events.construction_completed.len();
        for id in &events.deaths {
            info!("Tick {}: unit {} destroyed", events.tick, id);
        }
        for id in &events.construction_completed {
            info!("Tick {}: facility {} completed", events.tick, id);
        }
    }

    let sim = runner.simulation();
    let units = sim
        .units()
        .iter()
        .map(|unit| UnitSummary {
            id: unit.id(),
            label: labels
                .iter()
                .find(|(_, &id)| id == unit.id())
                .map(|(label, _)| label.clone()),
            unit_type: sim
                .registry()
                .get(unit.type_id())
                .map(|props| props.name.clone())
                .unwrap_or_default(),
            owner: unit.owner(),
            cell: unit.center().cell(),
            health: unit.health(),
            work: format!("{:?}", unit.work()),
        })
        .collect();

    Ok(RunSummary {
        scenario: scenario.name.clone(),
        ticks: sim.current_tick(),
        final_hash: sim.state_hash(),
        shots,
        deaths,
        crushed,
        constructions_completed,
        rejected_orders: runner.rejected_orders(),
        units,
    })
}

fn hash_trace(prepared: PreparedScenario, ticks: u64) -> Vec<u64> {
    let mut runner = ScenarioRunner::new(prepared);
    (0..ticks)
        .map(|_| {
            runner.step();
            runner.simulation().state_hash()
        })
        .collect()
}

/// Run a scenario `runs` times in parallel and compare per-tick hashes.
pub fn verify_determinism(scenario: &Scenario, runs: u32) -> Result<DeterminismReport, ScenarioError> {
    let prepared = scenario.prepare()?;
    let ticks = scenario.ticks;

    let traces: Vec<Vec<u64>> = (0..runs.max(1))
        .into_par_iter()
        .map(|_| hash_trace(prepared.clone(), ticks))
        .collect();

    let reference = &traces[0];
    let first_divergence = traces
        .iter()
        .skip(1)
        .filter_map(|trace| {
            trace
                .iter()
                .zip(reference)
                .position(|(a, b)| a != b)
                .map(|i| i as u64 + 1)
        })
        .min();

    if let Some(tick) = first_divergence {
        warn!("Runs of '{}' diverged at tick {}", scenario.name, tick);
    }

    Ok(DeterminismReport {
        hashes: traces.iter().map(|t| t.last().copied().unwrap_or_default()).collect(),
        first_divergence,
    })
}

/// Save at `save_at`, restore, and continue both runs to the scenario end.
///
/// With `save_path` the save goes through a file, otherwise through memory.
pub fn verify_save_roundtrip(
    scenario: &Scenario,
    save_at: u64,
    save_path: Option<&Path>,
) -> Result<RoundTripReport, ScenarioError> {
    let prepared = scenario.prepare()?;
    let orders = prepared.orders.clone();
    let mut original = ScenarioRunner::new(prepared);
    let save_at = save_at.min(scenario.ticks);
    for _ in 0..save_at {
        original.step();
    }

    let save = SaveGame::capture(original.simulation());
    let bytes = save.to_bytes()?;
    let restored_save = match save_path {
        Some(path) => {
            save.save(path)?;
            info!("Saved tick {} to {}", save_at, path.display());
            SaveGame::load(path)?
        }
        None => SaveGame::from_bytes(&bytes)?,
    };
    let mut restored = ScenarioRunner::resume(restored_save.into_simulation()?, orders);

    let mut first_mismatch = None;
    if restored.simulation().state_hash() != original.simulation().state_hash() {
        first_mismatch = Some(save_at);
    }
    for _ in save_at..scenario.ticks {
        let a = original.step();
        let b = restored.step();
        if first_mismatch.is_none()
            && (a != b || original.simulation().state_hash() != restored.simulation().state_hash())
        {
            warn!("Restored run diverged at tick {}", a.tick);
            first_mismatch = Some(a.tick);
        }
    }

    Ok(RoundTripReport {
        saved_at: save_at,
        save_bytes: bytes.len(),
        first_mismatch,
        original_hash: original.simulation().state_hash(),
        restored_hash: restored.simulation().state_hash(),
    })
}

/// Run many scenarios in parallel. Results keep the input order.
pub fn run_batch(scenarios: &[Scenario]) -> Vec<Result<RunSummary, ScenarioError>> {
    scenarios.par_iter().map(run_scenario).collect()
}
