//! Save files restore in-progress moves, fights and plugin work exactly.

use actor_core::prelude::*;
use actor_core::unit::Weapon;
use actor_test_utils::fixtures::{SimBuilder, DEPOT, DUMMY, ROVER, RUNNER};

fn busy_simulation() -> Simulation {
    let mut builder = SimBuilder::new(32, 32);
    let rover = builder.spawn(ROVER, 1, 2, 8);
    let runner = builder.spawn(RUNNER, 1, 2, 20);
    let depot = builder.spawn_with(UnitSpawnParams {
        type_id: DEPOT,
        owner: 1,
        position: Vec2Fixed::cell_center(12, 26),
        complete: true,
        ..Default::default()
    });
    let dummy = builder.spawn(DUMMY, 2, 24, 8);
    builder.wall(16, 14, 24);
    let mut sim = builder.build();

    sim.apply_order(rover, Order::Attack { target: dummy }).unwrap();
    sim.apply_order(
        runner,
        Order::Move {
            target: Vec2Fixed::cell_center(28, 20),
            attack: false,
        },
    )
    .unwrap();
    sim.apply_order(
        depot,
        Order::Plugin {
            kind: PluginKind::Production,
        },
    )
    .unwrap();
    sim
}

fn assert_units_match(a: &Simulation, b: &Simulation) {
    assert_eq!(a.units().ids(), b.units().ids());
    for unit in a.units().iter() {
        let other = b.unit(unit.id()).unwrap();
        assert_eq!(unit.path_info(), other.path_info());
        assert_eq!(unit.path_points(), other.path_points());
        assert_eq!(unit.waypoints(), other.waypoints());
        assert_eq!(unit.target(), other.target());
        assert_eq!(unit.current_plugin(), other.current_plugin());
        let reloads = |u: &Unit| u.weapons().iter().map(Weapon::reload_counter).collect::<Vec<_>>();
        assert_eq!(reloads(unit), reloads(other));
        assert_eq!(unit.rotation(), other.rotation());
        assert_eq!(unit.mover(), other.mover());
        assert_eq!(unit, other);
    }
}

#[test]
fn test_file_roundtrip_mid_move_and_fight() {
    let mut sim = busy_simulation();
    sim.run(37);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("battle.sav");
    SaveGame::capture(&sim).save(&path).unwrap();
    let mut restored = SaveGame::load(&path).unwrap().into_simulation().unwrap();

    assert_eq!(restored.current_tick(), 37);
    assert_units_match(&sim, &restored);
    assert_eq!(sim.state_hash(), restored.state_hash());

    for _ in 0..150 {
        assert_eq!(sim.tick(), restored.tick());
    }
    assert_units_match(&sim, &restored);
}

#[test]
fn test_byte_roundtrip_keeps_partial_path() {
    let mut builder = SimBuilder::new(96, 8);
    let runner = builder.spawn(RUNNER, 1, 1, 4);
    let mut sim = builder.build();
    sim.apply_order(
        runner,
        Order::Move {
            target: Vec2Fixed::cell_center(90, 4),
            attack: false,
        },
    )
    .unwrap();
    sim.run(3);
    assert_eq!(
        sim.unit(runner).unwrap().path_info().result,
        PathResult::PartialOutOfRange
    );

    let bytes = sim.serialize().unwrap();
    let mut restored = Simulation::deserialize(&bytes).unwrap();
    assert_units_match(&sim, &restored);

    sim.run(100);
    restored.run(100);
    assert_eq!(
        sim.unit(runner).unwrap().center(),
        Vec2Fixed::cell_center(90, 4)
    );
    assert_units_match(&sim, &restored);
}

#[test]
fn test_version_mismatch_is_rejected() {
    let sim = busy_simulation();
    let mut save = SaveGame::capture(&sim);
    save.version = SAVE_VERSION + 1;
    let bytes = save.to_bytes().unwrap();
    assert!(matches!(
        SaveGame::from_bytes(&bytes),
        Err(GameError::SaveVersionMismatch { .. })
    ));
}

#[test]
fn test_garbage_is_rejected() {
    assert!(Simulation::deserialize(&[1, 2, 3]).is_err());
}
