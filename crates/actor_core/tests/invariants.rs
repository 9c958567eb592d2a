//! Invariants that must hold after every tick, under random order scripts.

use actor_core::prelude::{Fixed, MovingStatus, Simulation, UnitId, WorkMode};
use actor_test_utils::determinism::strategies::arb_order_script;
use actor_test_utils::determinism::ScriptedOrder;
use actor_test_utils::fixtures::{SimBuilder, BUNKER, CRUSHER, DEPOT, GUNSHIP, LIGHT_POST, ROVER, RUNNER};
use proptest::prelude::*;

const MAP: i32 = 24;
const TICKS: u64 = 160;

fn skirmish() -> Simulation {
    let mut builder = SimBuilder::new(24, 24);
    builder.wall(12, 6, 16);
    builder.spawn(ROVER, 1, 3, 4);
    builder.spawn(RUNNER, 1, 4, 12);
    builder.spawn(CRUSHER, 1, 3, 18);
    builder.spawn(GUNSHIP, 1, 8, 8);
    builder.spawn(DEPOT, 1, 6, 20);
    builder.spawn(ROVER, 2, 20, 6);
    builder.spawn(LIGHT_POST, 2, 16, 12);
    builder.spawn(BUNKER, 2, 20, 18);
    builder.spawn(RUNNER, 2, 18, 3);
    builder.build()
}

/// Run a script, checking invariants after every tick.
fn check_script(script: &[ScriptedOrder]) -> Result<(), TestCaseError> {
    let mut sim = skirmish();
    let mut stalled: Vec<UnitId> = Vec::new();

    for _ in 0..TICKS {
        let next = sim.current_tick() + 1;
        for scripted in script.iter().filter(|s| s.tick == next) {
            let _ = sim.apply_order(scripted.unit, scripted.order);
        }
        sim.tick();

        let mut now_stalled = Vec::new();
        for unit in sim.units().iter() {
            prop_assert!(unit.health() <= unit.max_health());
            if unit.is_destroyed() {
                prop_assert_eq!(unit.work(), WorkMode::Destroyed);
            }
            prop_assert!(unit.rotation() >= Fixed::ZERO && unit.rotation() < Fixed::from_num(360));

            for weapon in unit.weapons() {
                prop_assert!(weapon.reload_counter() <= weapon.properties.reload);
            }

            if !unit.is_flying()
                && unit.moving_status() == MovingStatus::Moving
                && unit.velocity().is_zero()
            {
                prop_assert!(
                    !stalled.contains(&unit.id()),
                    "unit {} moving without velocity for two ticks at tick {}",
                    unit.id(),
                    sim.current_tick()
                );
                now_stalled.push(unit.id());
            }

            if !unit.is_flying() && !unit.is_destroyed() {
                let (x, y) = unit.center().cell();
                prop_assert!(
                    x >= 0 && y >= 0 && x < MAP && y < MAP,
                    "unit {} left the map at tick {}",
                    unit.id(),
                    sim.current_tick()
                );
            }
        }
        stalled = now_stalled;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_tick_invariants_hold(script in arb_order_script(MAP, MAP, 9, TICKS, 24)) {
        check_script(&script)?;
    }
}

#[test]
fn test_tick_invariants_without_orders() {
    check_script(&[]).unwrap();
}
