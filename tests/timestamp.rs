mod common;

use pgas_reclaim::config::ClockKind;
use pgas_reclaim::shmem::World;
use pgas_reclaim::stack::TimestampStack;
use pgas_reclaim::transport::Transport;
use pgas_reclaim::Config;

const UNITS: usize = 4;
const OPS: usize = 200;

fn config(clock: ClockKind) -> Config {
    let mut config = common::config(1024);
    config.timestamp.clock = clock;
    config
}

fn conserves_values(clock: ClockKind) {
    let results = World::run(&common::world(UNITS), |unit| {
        let mut stack = TimestampStack::<u64, _>::new(&unit, &config(clock)).unwrap();
        let mut popped = Vec::new();
        for i in 0..OPS {
            stack.push(common::tag(unit.unit_id(), i)).unwrap();
            if i % 3 != 0 {
                popped.extend(stack.pop());
            }
        }

        let resident = stack.snapshot();
        stack.destroy();
        (popped, resident)
    });

    let popped: Vec<u64> = results.iter().flat_map(|(popped, _)| popped.iter().copied()).collect();
    assert!(results.windows(2).all(|pair| pair[0].1 == pair[1].1));
    common::assert_conserved(UNITS, OPS, &popped, &results[0].1);
}

#[test]
fn interval_clock() {
    conserves_values(ClockKind::Interval);
}

#[test]
fn counter_clock() {
    conserves_values(ClockKind::Counter);
}

#[test]
fn single_unit_is_lifo() {
    for clock in [ClockKind::Interval, ClockKind::Counter] {
        World::run(&common::world(1), |unit| {
            let mut stack = TimestampStack::<u64, _>::new(&unit, &config(clock)).unwrap();
            for value in 1..=5 {
                stack.push(value).unwrap();
            }

            assert_eq!(stack.pop(), Some(5));
            assert_eq!(stack.pop(), Some(4));
            stack.push(6).unwrap();
            assert_eq!(stack.snapshot(), vec![6, 3, 2, 1]);
            assert_eq!(stack.pop(), Some(6));
            assert_eq!(stack.pop(), Some(3));
            assert_eq!(stack.pop(), Some(2));
            assert_eq!(stack.pop(), Some(1));
            assert_eq!(stack.pop(), None);
            assert_eq!(stack.allocated(), 6);
            stack.destroy();
        });
    }
}

#[test]
fn youngest_across_units_is_popped_first() {
    World::run(&common::world(3), |unit| {
        let mut stack = TimestampStack::<u64, _>::new(&unit, &config(ClockKind::Counter)).unwrap();
        // pushes happen one unit after another
        for turn in 0..3 {
            if unit.unit_id() == turn {
                stack.push(turn as u64).unwrap();
            }
            unit.barrier();
        }

        if unit.is_master() {
            assert_eq!(stack.pop(), Some(2));
            assert_eq!(stack.pop(), Some(1));
            assert_eq!(stack.pop(), Some(0));
            assert_eq!(stack.pop(), None);
        }

        unit.barrier();
        stack.destroy();
    });
}

#[test]
fn prefilled_by_master() {
    let results = World::run(&common::world(2), |unit| {
        let stack =
            TimestampStack::<u64, _>::with_values(&unit, &config(ClockKind::Interval), 1..=3)
                .unwrap();
        let snapshot = stack.snapshot();
        stack.destroy();
        snapshot
    });

    assert_eq!(results, vec![vec![3, 2, 1], vec![3, 2, 1]]);
}

#[test]
fn concurrent_push_and_pop() {
    for _ in 0..20 {
        let results = World::run(&common::world(2), |unit| {
            let mut stack =
                TimestampStack::<u64, _>::new(&unit, &config(ClockKind::Interval)).unwrap();
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
