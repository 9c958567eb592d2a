//! The bundled scenarios load, run and stay reproducible.

use std::path::PathBuf;

use actor_headless::runner::{run_scenario, verify_determinism, verify_save_roundtrip};
use actor_headless::scenario::Scenario;

fn sample(name: &str) -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name);
    Scenario::load(path).unwrap()
}

#[test]
fn test_skirmish_loads() {
    let scenario = sample("skirmish.ron");
    let prepared = scenario.prepare().unwrap();
    assert_eq!(prepared.simulation.registry().len(), 7);
    assert_eq!(prepared.simulation.units().len(), scenario.units.len());
    assert_eq!(prepared.orders.first().map(|o| o.tick), Some(1));
    assert!(prepared.orders.windows(2).all(|w| w[0].tick <= w[1].tick));
}

#[test]
fn test_skirmish_runs() {
    let summary = run_scenario(&sample("skirmish.ron")).unwrap();
    assert_eq!(summary.ticks, 600);
    assert!(summary.shots > 0);
    assert!(summary.crushed >= 1);
    assert!(summary.deaths >= summary.crushed);
    assert_eq!(summary.constructions_completed, 1);
}

#[test]
fn test_skirmish_is_deterministic() {
    let report = verify_determinism(&sample("skirmish.ron"), 3).unwrap();
    assert!(report.is_deterministic(), "{report:?}");
}

#[test]
fn test_skirmish_survives_save_and_restore() {
    let scenario = sample("skirmish.ron");
    for at in [0, 1, 150, 333] {
        let report = verify_save_roundtrip(&scenario, at, None).unwrap();
        assert!(report.matches(), "save at {at}: {report:?}");
    }
}
