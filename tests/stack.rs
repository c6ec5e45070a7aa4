mod common;

use pgas_reclaim::memory::{FreeList, HazardPointers, Leaking, LocalityAware, Reclaim};
use pgas_reclaim::shmem::World;
use pgas_reclaim::stack::{BlockingStack, TreiberStack};
use pgas_reclaim::transport::Transport;

const UNITS: usize = 4;
const OPS: usize = 300;

fn treiber_conserves_values<R: Reclaim>() {
    let results = World::run(&common::world(UNITS), |unit| {
        let mut stack = TreiberStack::<u64, R, _>::new(&unit, &common::config(1024)).unwrap();
        let mut popped = Vec::new();
        for i in 0..OPS {
            stack.push(common::tag(unit.unit_id(), i)).unwrap();
            if i % 3 == 0 {
                popped.extend(stack.pop());
            }
        }

        let resident = stack.snapshot();
        stack.destroy();
        (popped, resident)
    });

    let popped: Vec<u64> = results.iter().flat_map(|(popped, _)| popped.iter().copied()).collect();
    // every unit sees the same resident values
    assert!(results.windows(2).all(|pair| pair[0].1 == pair[1].1));
    common::assert_conserved(UNITS, OPS, &popped, &results[0].1);
}

#[test]
fn treiber_hazard_pointers() {
    treiber_conserves_values::<HazardPointers>();
}

#[test]
fn treiber_locality_aware() {
    treiber_conserves_values::<LocalityAware>();
}

#[test]
fn treiber_leaking() {
    treiber_conserves_values::<Leaking>();
}

#[test]
fn treiber_keeps_per_unit_order() {
    let results = World::run(&common::world(UNITS), |unit| {
        let mut stack =
            TreiberStack::<u64, HazardPointers, _>::new(&unit, &common::config(1024)).unwrap();
        for i in 0..OPS {
            stack.push(common::tag(unit.unit_id(), i)).unwrap();
        }

        unit.barrier();
        let mut popped = Vec::new();
        while let Some(value) = stack.pop() {
            popped.push(value);
        }

        unit.barrier();
        assert!(stack.is_empty());
        stack.destroy();
        popped
    });

    // values of one producer are popped in reverse push order by every consumer
    for popped in &results {
        let mut last = vec![usize::MAX; UNITS];
        for &value in popped {
            let (unit, i) = common::untag(value);
            assert!(i < last[unit], "unit {} popped {} after {}", unit, i, last[unit]);
            last[unit] = i;
        }
    }

    let popped: Vec<u64> = results.into_iter().flatten().collect();
    common::assert_conserved(UNITS, OPS, &popped, &[]);
}

#[test]
fn treiber_prefilled_by_master() {
    let results = World::run(&common::world(2), |unit| {
        let values = if unit.is_master() { vec![1, 2, 3] } else { vec![9, 9] };
        let config = common::config(8);
        let stack = TreiberStack::<u64, Leaking, _>::with_values(&unit, &config, values).unwrap();
        let snapshot = stack.snapshot();
        stack.destroy();
        snapshot
    });

    assert_eq!(results, vec![vec![3, 2, 1], vec![3, 2, 1]]);
}

#[test]
fn treiber_prefill_beyond_capacity_fails_everywhere() {
    let results = World::run(&common::world(2), |unit| {
        TreiberStack::<u64, Leaking, _>::with_values(&unit, &common::config(2), 0..3)
            .map(|stack| stack.destroy())
            .map_err(|err| err.to_string())
    });

    assert_eq!(results[0], Err("arena exhausted, no reclaimable slot available".to_string()));
    assert!(results[1].is_err());
}

#[test]
fn exhausted_unit_still_reaches_teardown() {
    let results = World::run(&common::world(3), |unit| {
        let mut stack = TreiberStack::<u64, Leaking, _>::new(&unit, &common::config(2)).unwrap();
        let pushes = if unit.unit_id() == 1 { 3 } else { 1 };

        let mut failed = None;
        for i in 0..pushes {
            if let Err(err) = stack.push(common::tag(unit.unit_id(), i)) {
                failed = Some(err);
                break;
            }
        }

        unit.barrier();
        let resident = stack.snapshot().len();
        stack.destroy();
        (failed.map(|err| err.is_exhausted()), resident)
    });

    assert_eq!(results[0], (None, 4));
    assert_eq!(results[1], (Some(true), 4));
    assert_eq!(results[2], (None, 4));
}

#[test]
fn empty_pop() {
    World::run(&common::world(3), |unit| {
        let mut stack =
            TreiberStack::<u64, HazardPointers, _>::new(&unit, &common::config(4)).unwrap();
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
        stack.destroy();
    });
}

fn blocking_conserves_values<R: Reclaim>() {
    let results = World::run(&common::world(UNITS), |unit| {
        let mut stack = BlockingStack::<u64, R, _>::new(&unit, &common::config(1024)).unwrap();
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
    common::assert_conserved(UNITS, OPS, &popped, &results[0].1);
}

#[test]
fn blocking_free_list() {
    blocking_conserves_values::<FreeList>();
}

#[test]
fn blocking_hazard_pointers() {
    blocking_conserves_values::<HazardPointers>();
}

#[test]
fn blocking_pop_is_lifo_for_single_unit() {
    World::run(&common::world(1), |unit| {
        let mut stack = BlockingStack::<u64, FreeList, _>::new(&unit, &common::config(2)).unwrap();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert!(stack.push(3).is_err());
        assert_eq!(stack.pop(), Some(2));
        stack.push(3).unwrap();
        assert_eq!(stack.snapshot(), vec![3, 1]);
        assert_eq!(stack.manager().free(), 0);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.manager().free(), 2);
        stack.destroy();
    });
}
