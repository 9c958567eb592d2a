//! Replica agreement checks for the actor engine.
//!
//! Two simulations built from the same units and fed the same orders must
//! agree on every tick: same events, same trajectories, same state hash.
//! Everything here runs a setup closure more than once and compares what
//! comes out.
//!
//! The engine keeps this property because it only uses [`actor_core::math::Fixed`]
//! arithmetic, stores units in id order and lets each routine read the
//! previous tick's state. The helpers below catch regressions in any of
//! those, either sequentially, on scoped threads, across a save and load,
//! or under random order scripts from [`strategies`].

use std::collections::BTreeSet;
use std::thread;

use actor_core::math::{Fixed, Vec3Fixed};
use actor_core::simulation::{Order, Simulation};
use actor_core::unit::UnitId;

/// Final state hashes of several replicas of one setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashReport {
    /// One hash per replica, in launch order.
    pub hashes: Vec<u64>,
    /// Ticks each replica ran.
    pub ticks: u64,
}

impl HashReport {
    /// True when every replica ended on the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Distinct hashes, ascending.
    #[must_use]
    pub fn distinct_hashes(&self) -> Vec<u64> {
        self.hashes.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// # Panics
    ///
    /// Panics listing every hash when the replicas disagree.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} replicas ended on {} different hashes after {} ticks: {:x?}",
            self.hashes.len(),
            self.distinct_hashes().len(),
            self.ticks,
            self.hashes
        );
    }
}

/// Position, rotation and health of one unit after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitSample {
    /// Unit.
    pub id: UnitId,
    /// Position.
    pub position: Vec3Fixed,
    /// Facing.
    pub rotation: Fixed,
    /// Health.
    pub health: u32,
}

/// Sample every unit in id order.
#[must_use]
pub fn sample_units(sim: &Simulation) -> Vec<UnitSample> {
    sim.units()
        .iter()
        .map(|u| UnitSample {
            id: u.id(),
            position: u.position(),
            rotation: u.rotation(),
            health: u.health(),
        })
        .collect()
}

/// An order issued to a unit before a given tick is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedOrder {
    /// Issued right before this tick (1-based) runs.
    pub tick: u64,
    /// Receiver.
    pub unit: UnitId,
    /// Order.
    pub order: Order,
}

/// Run `ticks` ticks, issuing scripted orders at their ticks, and collect
/// the trajectory of every unit.
///
/// Rejected orders and orders to missing units are skipped.
pub fn run_script(sim: &mut Simulation, script: &[ScriptedOrder], ticks: u64) -> Vec<Vec<UnitSample>> {
    let mut trajectory = Vec::with_capacity(usize::try_from(ticks).unwrap_or(0));
    for _ in 0..ticks {
        let next = sim.current_tick() + 1;
        for scripted in script.iter().filter(|s| s.tick == next) {
            let _ = sim.apply_order(scripted.unit, scripted.order);
        }
        sim.tick();
        trajectory.push(sample_units(sim));
    }
    trajectory
}

/// Build `runs` replicas with `setup`, step each one `ticks` times and
/// collect `hash` of the final state.
///
/// ```
/// use actor_test_utils::determinism::replica_hashes;
/// use actor_test_utils::fixtures::{SimBuilder, DUMMY, ROVER};
///
/// let report = replica_hashes(
///     3,
///     100,
///     || {
///         let mut builder = SimBuilder::new(16, 16);
///         builder.spawn(ROVER, 1, 2, 2);
///         builder.spawn(DUMMY, 2, 5, 2);
///         builder.build()
///     },
///     |sim| {
///         sim.tick();
///     },
///     |sim| sim.state_hash(),
/// );
/// report.assert_deterministic();
/// ```
pub fn replica_hashes<S>(
    runs: usize,
    ticks: u64,
    setup: impl Fn() -> S,
    step: impl Fn(&mut S),
    hash: impl Fn(&S) -> u64,
) -> HashReport {
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            (0..ticks).for_each(|_| step(&mut state));
            hash(&state)
        })
        .collect();
    HashReport { hashes, ticks }
}

/// Two sequential replicas of `setup` agree after `ticks` ticks.
pub fn replicas_agree(setup: impl Fn() -> Simulation, ticks: u64) -> bool {
    replica_hashes(
        2,
        ticks,
        setup,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic()
}

/// Like [`replica_hashes`] for full simulations, but every replica gets its
/// own scoped thread.
///
/// # Panics
///
/// Panics if a replica panics.
pub fn threaded_replica_hashes(
    setup: impl Fn() -> Simulation + Sync,
    replicas: usize,
    ticks: u64,
) -> HashReport {
    let hashes = thread::scope(|scope| {
        let workers: Vec<_> = (0..replicas)
            .map(|_| {
                scope.spawn(|| {
                    let mut sim = setup();
                    sim.run(ticks);
                    sim.state_hash()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("replica panicked"))
            .collect()
    });
    HashReport { hashes, ticks }
}

/// Step two replicas side by side and return the first tick whose state
/// hash or unit samples differ. Tick 0 means the setup itself disagrees.
pub fn first_divergence(setup: impl Fn() -> Simulation, ticks: u64) -> Option<u64> {
    let mut left = setup();
    let mut right = setup();
    if left.state_hash() != right.state_hash() {
        return Some(0);
    }
    (1..=ticks).find(|_| {
        left.tick();
        right.tick();
        left.state_hash() != right.state_hash() || sample_units(&left) != sample_units(&right)
    })
}

/// Run `ticks`, save, load, then run `ticks` more on both copies. True when
/// the loaded copy matches right after loading and at the end.
pub fn save_load_agrees(setup: impl Fn() -> Simulation, ticks: u64) -> bool {
    let mut sim = setup();
    sim.run(ticks);
    let Some(mut loaded) = sim
        .serialize()
        .ok()
        .and_then(|bytes| Simulation::deserialize(&bytes).ok())
    else {
        return false;
    };
    if sim.state_hash() != loaded.state_hash() {
        return false;
    }
    sim.run(ticks);
    loaded.run(ticks);
    sim.state_hash() == loaded.state_hash()
}

/// Proptest generators for points, orders and order scripts.
pub mod strategies {
    use proptest::prelude::*;

    use actor_core::math::{Fixed, Vec2Fixed};
    use actor_core::properties::PluginKind;
    use actor_core::simulation::Order;
    use actor_core::unit::UnitId;

    use super::ScriptedOrder;

    /// Generate a cell center inside a `width` x `height` map.
    pub fn arb_cell_center(width: i32, height: i32) -> impl Strategy<Value = Vec2Fixed> {
        (0..width, 0..height).prop_map(|(x, y)| Vec2Fixed::cell_center(x, y))
    }

    /// Generate a point anywhere on or slightly off a map, in quarter cells.
    pub fn arb_point(width: i32, height: i32) -> impl Strategy<Value = Vec2Fixed> {
        (-8..width * 4 + 8, -8..height * 4 + 8).prop_map(|(x, y)| {
            Vec2Fixed::new(Fixed::from_num(x) / 4, Fixed::from_num(y) / 4)
        })
    }

    /// Generate a rotation in whole degrees, including out-of-range values.
    pub fn arb_rotation() -> impl Strategy<Value = Fixed> {
        (-720i32..720).prop_map(Fixed::from_num)
    }

    /// Generate any order addressing units `1..=max_unit`.
    pub fn arb_order(width: i32, height: i32, max_unit: UnitId) -> impl Strategy<Value = Order> {
        prop_oneof![
            (arb_point(width, height), any::<bool>())
                .prop_map(|(target, attack)| Order::Move { target, attack }),
            arb_point(width, height).prop_map(|target| Order::Waypoint { target }),
            (1..=max_unit, 0i32..4).prop_map(|(target, range)| Order::MoveToUnit {
                target,
                range: Fixed::from_num(range),
            }),
            (1..=max_unit).prop_map(|target| Order::Attack { target }),
            (1..=max_unit, 0i32..4).prop_map(|(target, distance)| Order::Follow {
                target,
                distance: Fixed::from_num(distance),
            }),
            arb_rotation().prop_map(|rotation| Order::Turn { rotation }),
            Just(Order::Stop),
            Just(Order::Plugin {
                kind: PluginKind::Production
            }),
        ]
    }

    /// Generate a script of orders over `ticks` ticks for units
    /// `1..=max_unit`.
    pub fn arb_order_script(
        width: i32,
        height: i32,
        max_unit: UnitId,
        ticks: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedOrder>> {
        proptest::collection::vec(
            (1..=ticks, 1..=max_unit, arb_order(width, height, max_unit)).prop_map(
                |(tick, unit, order)| ScriptedOrder { tick, unit, order },
            ),
            0..max_len,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{SimBuilder, BUNKER, CRUSHER, DEPOT, DUMMY, GUNSHIP, ROVER, RUNNER};
    use actor_core::math::Vec2Fixed;
    use proptest::prelude::*;

    fn combat_scenario() -> Simulation {
        let mut builder = SimBuilder::new(32, 32);
        let a = builder.spawn(ROVER, 1, 4, 10);
        let b = builder.spawn(ROVER, 2, 20, 10);
        builder.spawn(BUNKER, 2, 24, 14);
        builder.spawn(GUNSHIP, 1, 6, 20);
        builder.spawn(DEPOT, 1, 10, 26);
        let mut sim = builder.build();
        let _ = sim.apply_order(
            a,
            Order::Move {
                target: Vec2Fixed::cell_center(26, 10),
                attack: true,
            },
        );
        let _ = sim.apply_order(b, Order::Attack { target: a });
        sim
    }

    fn traffic_scenario() -> Simulation {
        let mut builder = SimBuilder::new(32, 32);
        builder.wall(15, 4, 26);
        let mut movers = Vec::new();
        for row in 0..5 {
            movers.push(builder.spawn(RUNNER, 1, 3, 8 + row * 3));
            movers.push(builder.spawn(CRUSHER, 2, 28, 8 + row * 3));
        }
        builder.spawn(DUMMY, 3, 15, 2);
        let mut sim = builder.build();
        for (i, id) in movers.into_iter().enumerate() {
            let x = if i % 2 == 0 { 28 } else { 3 };
            let _ = sim.apply_order(
                id,
                Order::Move {
                    target: Vec2Fixed::cell_center(x, 16),
                    attack: false,
                },
            );
        }
        sim
    }

    #[test]
    fn test_replica_hashes_counter() {
        let report = replica_hashes(3, 100, || 0u64, |n| *n += 1, |n| *n);
        assert!(report.is_deterministic());
        assert_eq!(report.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_map_replicas_agree() {
        assert!(replicas_agree(|| SimBuilder::new(8, 8).build(), 100));
    }

    #[test]
    fn test_distinct_hashes_sorted() {
        let report = HashReport {
            hashes: vec![3, 1, 3],
            ticks: 1,
        };
        assert!(!report.is_deterministic());
        assert_eq!(report.distinct_hashes(), vec![1, 3]);
    }

    #[test]
    #[should_panic(expected = "2 different hashes")]
    fn test_assert_deterministic_reports_mismatch() {
        HashReport {
            hashes: vec![1, 2],
            ticks: 5,
        }
        .assert_deterministic();
    }

    #[test]
    fn test_no_divergence_in_combat() {
        assert_eq!(first_divergence(combat_scenario, 200), None);
    }

    #[test]
    fn test_combat_replicas() {
        replica_hashes(
            4,
            300,
            combat_scenario,
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        )
        .assert_deterministic();
    }

    #[test]
    fn test_combat_shots_are_exact() {
        let mut sim1 = combat_scenario();
        let mut sim2 = combat_scenario();

        for tick in 0..300 {
            let events1 = sim1.tick();
            let events2 = sim2.tick();
            assert_eq!(events1, events2, "events differ at tick {tick}");
        }
    }

    #[test]
    fn test_traffic_replicas_agree() {
        assert!(replicas_agree(traffic_scenario, 400));
    }

    #[test]
    fn test_threaded_combat_replicas() {
        threaded_replica_hashes(combat_scenario, 4, 200).assert_deterministic();
    }

    #[test]
    fn test_threaded_traffic_replicas() {
        threaded_replica_hashes(traffic_scenario, 4, 200).assert_deterministic();
    }

    #[test]
    fn test_save_load_empty_map() {
        assert!(save_load_agrees(|| SimBuilder::new(8, 8).build(), 0));
    }

    #[test]
    fn test_save_load_mid_combat() {
        assert!(save_load_agrees(combat_scenario, 60));
    }

    #[test]
    fn test_save_load_mid_traffic() {
        assert!(save_load_agrees(traffic_scenario, 45));
    }

    #[test]
    fn test_run_script_issues_orders_on_time() {
        let mut builder = SimBuilder::new(16, 16);
        let runner = builder.spawn(RUNNER, 1, 2, 2);
        let mut sim = builder.build();
        let script = [ScriptedOrder {
            tick: 5,
            unit: runner,
            order: Order::Move {
                target: Vec2Fixed::cell_center(8, 2),
                attack: false,
            },
        }];
        let trajectory = run_script(&mut sim, &script, 12);
        assert_eq!(trajectory.len(), 12);
        assert_eq!(trajectory[3][0].position, trajectory[0][0].position);
        assert_ne!(trajectory[4][0].position, trajectory[3][0].position);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Random order scripts replay identically.
        #[test]
        fn prop_order_scripts_are_replayable(
            script in strategies::arb_order_script(24, 24, 6, 120, 12),
        ) {
            let setup = || {
                let mut builder = SimBuilder::new(24, 24);
                builder.spawn(ROVER, 1, 3, 3);
                builder.spawn(RUNNER, 1, 5, 12);
                builder.spawn(CRUSHER, 2, 18, 12);
                builder.spawn(ROVER, 2, 20, 20);
                builder.spawn(GUNSHIP, 2, 12, 6);
                builder.spawn(DEPOT, 1, 10, 18);
                builder.build()
            };
            let mut sim1 = setup();
            let mut sim2 = setup();
            let first = run_script(&mut sim1, &script, 150);
            let second = run_script(&mut sim2, &script, 150);
            prop_assert_eq!(first, second);
            prop_assert_eq!(sim1.state_hash(), sim2.state_hash());
        }

        /// Save round trips are exact at any point of a scripted game.
        #[test]
        fn prop_serialization_roundtrip_is_exact(
            script in strategies::arb_order_script(24, 24, 4, 60, 8),
            num_ticks in 0u64..60,
        ) {
            let mut builder = SimBuilder::new(24, 24);
            builder.spawn(ROVER, 1, 3, 3);
            builder.spawn(RUNNER, 1, 5, 12);
            builder.spawn(ROVER, 2, 18, 12);
            builder.spawn(DEPOT, 2, 12, 18);
            let mut sim = builder.build();
            run_script(&mut sim, &script, num_ticks);

            let bytes = sim.serialize().expect("serialize");
            let restored = Simulation::deserialize(&bytes).expect("deserialize");
            prop_assert_eq!(sim.state_hash(), restored.state_hash());
            prop_assert_eq!(sample_units(&sim), sample_units(&restored));
        }
    }

    #[test]
    #[ignore = "slow"]
    fn stress_sixteen_threaded_traffic_replicas() {
        threaded_replica_hashes(traffic_scenario, 16, 2000).assert_deterministic();
    }
}
