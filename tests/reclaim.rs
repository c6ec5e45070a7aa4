mod common;

use pgas_reclaim::memory::{
    FreeList, HazardManager, HazardPointers, Leaking, LeakingManager, LocalityAware,
    LocalityManager, Manage, Reclaim,
};
use pgas_reclaim::shmem::{Unit, World};
use pgas_reclaim::stack::{Node, TreiberStack};
use pgas_reclaim::transport::Transport;
use pgas_reclaim::Error;

/// push 1..=4 into a stack of capacity 4, the fifth push fails, then pop twice
/// and return the outcome of the next two pushes and the final contents.
fn exhaust_and_refill<R: Reclaim>() -> (Vec<bool>, Vec<u64>) {
    let mut results = World::run(&common::world(1), |unit| {
        let mut stack = TreiberStack::<u64, R, _>::new(&unit, &common::config(4)).unwrap();
        for value in 1..=4 {
            stack.push(value).unwrap();
        }

        assert!(matches!(stack.push(5), Err(Error::Exhausted)));
        assert_eq!(stack.pop(), Some(4));
        assert_eq!(stack.pop(), Some(3));

        let refilled = vec![stack.push(6).is_ok(), stack.push(7).is_ok()];
        let contents = stack.snapshot();
        stack.destroy();
        (refilled, contents)
    });

    results.remove(0)
}

#[test]
fn leaking_never_reuses() {
    let (refilled, contents) = exhaust_and_refill::<Leaking>();
    assert_eq!(refilled, vec![false, false]);
    assert_eq!(contents, vec![2, 1]);
}

#[test]
fn hazard_pointers_reuse_released_nodes() {
    let (refilled, contents) = exhaust_and_refill::<HazardPointers>();
    assert_eq!(refilled, vec![true, true]);
    assert_eq!(contents, vec![7, 6, 2, 1]);
}

#[test]
fn locality_aware_reuses_released_nodes() {
    let (refilled, contents) = exhaust_and_refill::<LocalityAware>();
    assert_eq!(refilled, vec![true, true]);
    assert_eq!(contents, vec![7, 6, 2, 1]);
}

#[test]
fn free_list_reuses_released_nodes() {
    let (refilled, contents) = exhaust_and_refill::<FreeList>();
    assert_eq!(refilled, vec![true, true]);
    assert_eq!(contents, vec![7, 6, 2, 1]);
}

#[test]
fn hazard_protected_node_is_not_reclaimed() {
    World::run(&common::world(2), |unit| {
        let config = common::config(4);
        let mut manager = HazardManager::<Node<u64>, Unit>::build(&unit, &config.reclaim).unwrap();

        // unit 0 releases a node unit 1 has protected
        let node =
            if unit.unit_id() == 0 { manager.allocate().unwrap() } else { Default::default() };
        let node = unit.broadcast(node, 0);
        if unit.unit_id() == 1 {
            manager.protect(0, node);
        }
        unit.barrier();

        if unit.unit_id() == 0 {
            unsafe { manager.release(node) };
            manager.scan();
            assert_eq!(manager.retired(), 1);
            assert_eq!(manager.reclaimed(), 0);
        }
        unit.barrier();

        if unit.unit_id() == 1 {
            manager.clear(0);
        }
        unit.barrier();

        if unit.unit_id() == 0 {
            manager.scan();
            assert_eq!(manager.retired(), 0);
            assert_eq!(manager.reclaimed(), 1);
            assert_eq!(manager.allocate().unwrap(), node);
        }

        manager.destroy();
    });
}

#[test]
fn locality_aware_keeps_taken_nodes() {
    World::run(&common::world(1), |unit| {
        let config = common::config(2);
        let mut manager =
            LocalityManager::<Node<u64>, Unit>::build(&unit, &config.reclaim).unwrap();

        let a = manager.allocate().unwrap();
        let b = manager.allocate().unwrap();
        assert!(matches!(manager.allocate(), Err(Error::Exhausted)));
        assert_eq!(manager.tracked(), 2);

        // only the released node can be handed out again
        unsafe { manager.release(b) };
        assert_eq!(manager.allocate().unwrap(), b);
        assert!(matches!(manager.allocate(), Err(Error::Exhausted)));

        unsafe { manager.release(a) };
        manager.scan();
        assert_eq!(manager.reclaimed(), 1);
        assert_eq!(manager.allocate().unwrap(), a);

        manager.destroy();
    });
}

#[test]
fn leaking_counts_allocations() {
    World::run(&common::world(1), |unit| {
        type M = LeakingManager<Unit>;

        let config = common::config(3);
        let mut manager = <M as Manage<Node<u64>, Unit>>::build(&unit, &config.reclaim).unwrap();
        for _ in 0..3 {
            let node = <M as Manage<Node<u64>, Unit>>::allocate(&mut manager).unwrap();
            unsafe { <M as Manage<Node<u64>, Unit>>::release(&mut manager, node) };
        }

        assert_eq!(manager.allocated(), 3);
        assert_eq!(<M as Manage<Node<u64>, Unit>>::capacity(&manager), 3);
        assert!(matches!(
            <M as Manage<Node<u64>, Unit>>::allocate(&mut manager),
            Err(Error::Exhausted)
        ));
        <M as Manage<Node<u64>, Unit>>::destroy(manager);
    });
}

#[test]
fn concurrent_reuse_under_hazard_pointers() {
    const OPS: usize = 500;
    let units = 4;
    let results = World::run(&common::world(units), |unit| {
        // far fewer nodes than operations, so nodes must be recycled
        let mut stack =
            TreiberStack::<u64, HazardPointers, _>::new(&unit, &common::config(64)).unwrap();
        let mut popped = Vec::new();
        for i in 0..OPS {
            stack.push(common::tag(unit.unit_id(), i)).unwrap();
            popped.push(stack.pop().expect("a unit always finds at least its own value"));
        }

        let resident = stack.snapshot();
        stack.destroy();
        (popped, resident)
    });

    let popped: Vec<u64> = results.iter().flat_map(|(popped, _)| popped.iter().copied()).collect();
    common::assert_conserved(units, OPS, &popped, &results[0].1);
}
