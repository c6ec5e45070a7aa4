mod common;

use pgas_reclaim::memory::{HazardPointers, Leaking, LocalityAware, Reclaim};
use pgas_reclaim::shmem::World;
use pgas_reclaim::stack::EliminationStack;
use pgas_reclaim::transport::Transport;

const OPS: usize = 300;

fn conserves_values<R: Reclaim>(units: usize, units_per_node: usize) {
    let world = common::world(units).with_units_per_node(units_per_node);
    let results = World::run(&world, |unit| {
        let mut stack = EliminationStack::<u64, R, _>::new(&unit, &common::config(2048)).unwrap();
        let mut popped = Vec::new();
        for i in 0..OPS {
            stack.push(common::tag(unit.unit_id(), i)).unwrap();
            if i % 2 == 1 {
                popped.extend(stack.pop());
                popped.extend(stack.pop());
            }
        }

        let resident = stack.snapshot();
        stack.destroy();
        (popped, resident)
    });

    let popped: Vec<u64> = results.iter().flat_map(|(popped, _)| popped.iter().copied()).collect();
    common::assert_conserved(units, OPS, &popped, &results[0].1);
}

#[test]
fn hazard_pointers_single_node() {
    conserves_values::<HazardPointers>(4, 4);
}

#[test]
fn hazard_pointers_two_nodes() {
    conserves_values::<HazardPointers>(6, 3);
}

#[test]
fn locality_aware() {
    conserves_values::<LocalityAware>(4, 2);
}

#[test]
fn leaking() {
    conserves_values::<Leaking>(4, 4);
}

#[test]
fn sequential_lifo() {
    World::run(&common::world(1), |unit| {
        let mut stack =
            EliminationStack::<u64, HazardPointers, _>::new(&unit, &common::config(8)).unwrap();
        for value in 1..=5 {
            stack.push(value).unwrap();
        }

        assert_eq!(stack.snapshot(), vec![5, 4, 3, 2, 1]);
        assert_eq!((0..6).map(|_| stack.pop()).collect::<Vec<_>>(), vec![
            Some(5),
            Some(4),
            Some(3),
            Some(2),
            Some(1),
            None
        ]);
        stack.destroy();
    });
}

#[test]
fn prefilled_by_master() {
    let results = World::run(&common::world(3), |unit| {
        let config = common::config(16);
        let mut stack =
            EliminationStack::<u64, HazardPointers, _>::with_values(&unit, &config, 0..4).unwrap();
        let snapshot = stack.snapshot();
        let popped = stack.pop();
        unit.barrier();
        let remaining = stack.snapshot();
        stack.destroy();
        (snapshot, popped, remaining)
    });

    for (snapshot, popped, remaining) in &results {
        assert_eq!(snapshot, &vec![3, 2, 1, 0]);
        assert!(popped.is_some());
        assert_eq!(remaining, &vec![0]);
    }

    let mut popped: Vec<u64> = results.iter().filter_map(|(_, popped, _)| *popped).collect();
    popped.sort_unstable();
    assert_eq!(popped, vec![1, 2, 3]);
}

#[test]
fn pop_never_invents_values() {
    for _ in 0..20 {
        let results = World::run(&common::world(2), |unit| {
            let mut stack =
                EliminationStack::<u64, HazardPointers, _>::new(&unit, &common::config(4)).unwrap();
            let popped = if unit.unit_id() == 0 {
                stack.push(10).unwrap();
                None
            } else {
                stack.pop()
            };

            let resident = stack.snapshot();
            stack.destroy();
            (popped, resident)
        });

        match results[1].0 {
            Some(value) => {
                assert_eq!(value, 10);
                assert!(results[0].1.is_empty());
            }
            None => assert_eq!(results[0].1, vec![10]),
        }
    }
}
