//! A node-aware elimination-backoff stack.
//!
//! Every operation first tries the shared `top` pointer once, like a
//! [`TreiberStack`](crate::stack::TreiberStack).
//! On contention it advertises itself in its own `location` slot and
//! swaps its id into the collision slot of a random unit on the same node.
//! If the unit found there advertises the complementary operation, the two
//! operations eliminate each other: a push hands its node directly to a pop
//! without ever touching `top`.
//!
//! Location slots hold [`Advert`] words instead of pointers to the per-unit
//! operation records, so a stale advertisement of a finished operation can
//! never be mistaken for a pending one.

use rand::Rng;

use crate::backoff::{self, Backoff};
use crate::collective;
use crate::config::{BackoffConfig, Config};
use crate::error::Error;
use crate::memory::{Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record, Word};
use crate::stack::{self, Node};
use crate::stats::{self, Event};
use crate::topology::Topology;
use crate::transport::{AtomicOp, Transport};

type Manager<V, R, C> = <R as Reclaim>::Manager<Node<V>, C>;

const COUNT_INIT: u32 = 5;
const COUNT_MAX: u32 = 2 * COUNT_INIT;
const FACTOR_INIT: f64 = 0.5;
const FACTOR_MIN: f64 = 0.0;
const FACTOR_MAX: f64 = 1.0;

////////////////////////////////////////////////////////////////////////////////////////////////////
// EliminationStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free stack with an elimination fast path between units on the
/// same node.
pub struct EliminationStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport + Topology,
{
    transport: C,
    top: GlobalPtr<GlobalPtr<Node<V>>>,
    manager: Manager<V, R, C>,
    /// the operation slots of every unit, indexed by unit id
    slots: Vec<GlobalPtr<Slots<V>>>,
    /// unit ids of the calling unit's node, indexed by local rank
    rank_table: Vec<usize>,
    adapt: Adapt,
    seq: u64,
    backoff: BackoffConfig,
    collision_delay: u64,
}

/********** impl inherent *************************************************************************/

impl<V, R, C> EliminationStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport + Topology,
{
    const PROTECTS: bool = <Manager<V, R, C> as Manage<Node<V>, C>>::PROTECTS;

    /// Collective: creates a new empty stack.
    #[inline]
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        Self::with_values(transport, config, core::iter::empty())
    }

    /// Collective: creates a new stack holding the `values` supplied by the
    /// master unit, the last one on top.
    pub fn with_values(
        transport: &C,
        config: &Config,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        let top = collective::share::<_, GlobalPtr<Node<V>>>(transport, 1, |_| {})?;
        let free_top = || {
            if transport.is_master() {
                unsafe { transport.dealloc(top) };
            }
        };

        let local = transport.alloc::<Slots<V>>(1);
        let undo = |own: GlobalPtr<Slots<V>>| unsafe { transport.dealloc(own) };
        let own = match collective::settle(transport, local, undo) {
            Ok(own) => own,
            Err(err) => {
                free_top();
                return Err(err);
            }
        };
        let slots = transport.all_gather(own);

        let manager = match <Manager<V, R, C> as Manage<_, _>>::build(transport, &config.reclaim) {
            Ok(manager) => manager,
            Err(err) => {
                unsafe { transport.dealloc(own) };
                free_top();
                return Err(err);
            }
        };

        let mut stack = Self {
            transport: transport.clone(),
            top,
            manager,
            slots,
            rank_table: transport.rank_table(),
            adapt: Adapt::new(),
            seq: 0,
            backoff: config.backoff,
            collision_delay: config.elimination.collision_delay,
        };

        let filled = if transport.is_master() {
            stack::prefill(transport, &mut stack.manager, top, values)
        } else {
            Ok(())
        };

        if let Err(err) = collective::settle(transport, filled, |_| {}) {
            stack.destroy();
            return Err(err);
        }

        transport.barrier();
        tracing::debug!(
            unit = transport.unit_id(),
            policy = R::NAME,
            node_size = stack.rank_table.len(),
            "elimination stack created"
        );
        Ok(stack)
    }

    /// Pushes `value` onto the stack.
    pub fn push(&mut self, value: V) -> Result<(), Error> {
        let node = self.manager.allocate()?;
        self.transport.write(Node::value(node), value);

        self.announce(Op::Push, node);
        if self.try_stack_op(Op::Push, node).is_none() {
            self.eliminate(Op::Push, node);
        }

        Ok(())
    }

    /// Pops the value on top of the stack, or returns `None` if it is empty.
    pub fn pop(&mut self) -> Option<V> {
        self.announce(Op::Pop, GlobalPtr::NULL);
        let node = match self.try_stack_op(Op::Pop, GlobalPtr::NULL) {
            Some(node) => node,
            None => self.eliminate(Op::Pop, GlobalPtr::NULL),
        };

        node.non_null().map(|node| {
            let value = self.transport.read(Node::value(node));
            // safety: the node was either unlinked or handed over exclusively
            unsafe { self.manager.release(node) };
            value
        })
    }

    #[inline]
    pub fn manager(&self) -> &Manager<V, R, C> {
        &self.manager
    }

    /// Collective: returns all values currently in the stack, top first.
    pub fn snapshot(&self) -> Vec<V> {
        self.transport.barrier();
        let values = stack::walk(&self.transport, self.transport.read(self.top));
        self.transport.barrier();
        values
    }

    /// Collective: frees the stack and every node allocated by any unit.
    pub fn destroy(self) {
        self.transport.barrier();
        unsafe {
            self.transport.dealloc(self.slots[self.transport.unit_id()]);
            if self.transport.is_master() {
                self.transport.dealloc(self.top);
            }
        }

        self.manager.destroy();
        tracing::debug!(unit = self.transport.unit_id(), "elimination stack destroyed");
    }

    /// Publishes the operation record of a new operation.
    #[inline]
    fn announce(&mut self, op: Op, elem: GlobalPtr<Node<V>>) {
        self.seq += 1;
        let own = self.own();
        self.transport.write(Slots::elem(own), elem);
        self.transport.write(Slots::op(own), op);
        self.transport.write(Slots::seq(own), self.seq);
    }

    /// A single attempt on the shared `top` pointer.
    ///
    /// Returns `None` if the compare-and-swap failed, otherwise the pushed
    /// node or the popped node (`null` if the stack was empty).
    fn try_stack_op(&mut self, op: Op, elem: GlobalPtr<Node<V>>) -> Option<GlobalPtr<Node<V>>> {
        let top = self.transport.read(self.top);
        let res = match op {
            Op::Push => {
                self.transport.write(Node::next(elem), top);
                self.transport.cas(self.top, top, elem).then(|| elem)
            }
            Op::Pop => {
                if top.is_null() {
                    return Some(GlobalPtr::NULL);
                }

                if Self::PROTECTS {
                    self.manager.protect(0, top);
                    if self.transport.read(self.top) != top {
                        self.manager.clear(0);
                        stats::record(Event::CasFailure);
                        return None;
                    }
                }

                let next = self.transport.read(Node::next(top));
                let res = self.transport.cas(self.top, top, next).then(|| top);
                self.manager.clear(0);
                res
            }
        };

        match res {
            Some(_) => stats::record(Event::CasSuccess),
            None => stats::record(Event::CasFailure),
        }

        res
    }

    /// The elimination-backoff loop, runs until the operation has completed
    /// either by elimination or on the shared `top` pointer.
    fn eliminate(&mut self, op: Op, elem: GlobalPtr<Node<V>>) -> GlobalPtr<Node<V>> {
        let me = self.transport.unit_id();
        let ticket = Advert::Ticket { unit: me, seq: self.seq };
        let location = Slots::location(self.own());
        let mut backoff = Backoff::from_config(&self.backoff);

        loop {
            self.transport.write(location, ticket);

            let pos = self.position();
            let him = self.transport.fetch_and_op(
                Slots::collision(self.slots[pos]),
                Some(me),
                AtomicOp::Replace,
            );

            let partner = him.filter(|&him| him != me).and_then(|him| self.partner(him, op));
            if let Some(partner) = partner {
                // withdraw the own advertisement before acting on the partner's
                if self.transport.cas(location, ticket, Advert::Empty) {
                    if let Some(node) = self.try_collision(op, elem, partner) {
                        stats::record(Event::EliminationSuccess);
                        return node;
                    }

                    stats::record(Event::EliminationFailure);
                    if let Some(node) = self.try_stack_op(op, elem) {
                        return node;
                    }

                    continue;
                }

                stats::record(Event::EliminationSuccess);
                return self.finish_collision(op, elem);
            }

            backoff::sleep_micros(self.collision_delay);
            self.adapt.shrink();

            if !self.transport.cas(location, ticket, Advert::Empty) {
                stats::record(Event::EliminationSuccess);
                return self.finish_collision(op, elem);
            }

            stats::record(Event::EliminationFailure);
            if let Some(node) = self.try_stack_op(op, elem) {
                return node;
            }

            backoff.delay_exponential();
        }
    }

    /// Returns the pending operation of unit `him` if it complements `op`.
    #[inline]
    fn partner(&self, him: usize, op: Op) -> Option<Partner<V>> {
        let slots = self.slots[him];
        match self.transport.read(Slots::location(slots)) {
            Advert::Ticket { unit, seq } if unit == him => {
                let elem = self.transport.read(Slots::elem(slots));
                let their_op = self.transport.read(Slots::op(slots));
                let their_seq = self.transport.read(Slots::seq(slots));
                (their_seq & TICKET_SEQ_MASK == seq && their_op == op.complement())
                    .then(|| Partner { unit: him, seq, elem })
            }
            _ => None,
        }
    }

    /// The active side of an elimination, called after the own advertisement
    /// has been withdrawn.
    fn try_collision(
        &mut self,
        op: Op,
        elem: GlobalPtr<Node<V>>,
        partner: Partner<V>,
    ) -> Option<GlobalPtr<Node<V>>> {
        let location = Slots::location(self.slots[partner.unit]);
        let ticket = Advert::Ticket { unit: partner.unit, seq: partner.seq };
        let (replacement, res) = match op {
            Op::Push => (Advert::Handoff(elem.cast()), elem),
            Op::Pop => (Advert::Empty, partner.elem),
        };

        if self.transport.cas(location, ticket, replacement) {
            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(
                    unit = self.transport.unit_id(),
                    partner = partner.unit,
                    op = ?op,
                    "eliminated with partner"
                );
            }

            Some(res)
        } else {
            self.adapt.enlarge();
            None
        }
    }

    /// The passive side of an elimination, called after a partner has
    /// replaced the own advertisement.
    fn finish_collision(&mut self, op: Op, elem: GlobalPtr<Node<V>>) -> GlobalPtr<Node<V>> {
        match op {
            // the partner has taken the node
            Op::Push => elem,
            Op::Pop => {
                let location = Slots::location(self.own());
                let advert = self.transport.read(location);
                self.transport.write(location, Advert::Empty);
                match advert {
                    Advert::Handoff(node) => node.cast(),
                    other => {
                        debug_assert!(false, "passive pop found {:?} instead of a hand-off", other);
                        GlobalPtr::NULL
                    }
                }
            }
        }
    }

    /// Picks the unit whose collision slot is used next, the adaptive factor
    /// determines how far from the middle of the node's rank table it may
    /// lie.
    fn position(&self) -> usize {
        let (min, max) = self.adapt.bounds(self.rank_table.len());
        let index = rand::thread_rng().gen_range(min..=max);
        self.rank_table[index]
    }

    #[inline]
    fn own(&self) -> GlobalPtr<Slots<V>> {
        self.slots[self.transport.unit_id()]
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Adapt
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Adaptive width of the collision range.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Adapt {
    count: u32,
    factor: f64,
}

impl Adapt {
    #[inline]
    fn new() -> Self {
        Self { count: COUNT_INIT, factor: FACTOR_INIT }
    }

    #[inline]
    fn shrink(&mut self) {
        if self.count > 0 {
            self.count -= 1;
        } else {
            self.count = COUNT_INIT;
            self.factor = (self.factor / 2.0).max(FACTOR_MIN);
        }
    }

    #[inline]
    fn enlarge(&mut self) {
        if self.count < COUNT_MAX {
            self.count += 1;
        } else {
            self.count = COUNT_INIT;
            self.factor = (self.factor * 2.0).min(FACTOR_MAX);
        }
    }

    /// Returns the inclusive range of local ranks for a node of `size` units.
    fn bounds(&self, size: usize) -> (usize, usize) {
        debug_assert!(size > 0);
        let half = (size / 2) as f64;
        let span = FACTOR_MAX - FACTOR_MIN;
        let min = if size % 2 == 0 {
            ((half - 1.0) * (span - self.factor)).round()
        } else {
            (half * (span - self.factor)).round()
        };
        let max = (half * (span + self.factor)).round();

        let max = (max.max(0.0) as usize).min(size - 1);
        let min = (min.max(0.0) as usize).min(max);
        (min, max)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Advert
////////////////////////////////////////////////////////////////////////////////////////////////////

const TAG_SHIFT: u32 = 62;
const TAG_TICKET: u64 = 0b01 << TAG_SHIFT;
const TAG_HANDOFF: u64 = 0b10 << TAG_SHIFT;
const TAG_MASK: u64 = 0b11 << TAG_SHIFT;
const TICKET_UNIT_SHIFT: u32 = 40;
const TICKET_SEQ_MASK: u64 = (1 << TICKET_UNIT_SHIFT) - 1;

/// The contents of a location slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Advert {
    /// No pending operation.
    Empty,
    /// Operation `seq` of `unit` is pending and described by the unit's
    /// operation record.
    Ticket { unit: usize, seq: u64 },
    /// A push has handed its node to the pending pop.
    Handoff(GlobalPtr<()>),
}

impl Word for Advert {
    #[inline]
    fn into_word(self) -> u64 {
        match self {
            Advert::Empty => 0,
            Advert::Ticket { unit, seq } => {
                TAG_TICKET | (unit as u64) << TICKET_UNIT_SHIFT | (seq & TICKET_SEQ_MASK)
            }
            Advert::Handoff(node) => TAG_HANDOFF | node.into_raw(),
        }
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        match word & TAG_MASK {
            TAG_TICKET => Advert::Ticket {
                unit: ((word & !TAG_MASK) >> TICKET_UNIT_SHIFT) as usize,
                seq: word & TICKET_SEQ_MASK,
            },
            TAG_HANDOFF => Advert::Handoff(GlobalPtr::from_raw(word & !TAG_MASK)),
            _ => Advert::Empty,
        }
    }
}

/********** collision slot contents ***************************************************************/

// unit ids are stored off by one, so that a zeroed slot names no unit
impl Word for Option<usize> {
    #[inline]
    fn into_word(self) -> u64 {
        self.map_or(0, |unit| unit as u64 + 1)
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        word.checked_sub(1).map(|unit| unit as usize)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Op
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Op {
    Push,
    Pop,
}

impl Op {
    #[inline]
    fn complement(self) -> Self {
        match self {
            Op::Push => Op::Pop,
            Op::Pop => Op::Push,
        }
    }
}

impl Word for Op {
    #[inline]
    fn into_word(self) -> u64 {
        match self {
            Op::Push => 1,
            Op::Pop => 2,
        }
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        if word == 1 {
            Op::Push
        } else {
            Op::Pop
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Slots
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The per-unit elimination slots,
/// `{ location: Advert, collision: Option<usize>, elem, seq, op }`.
struct Slots<V>(core::marker::PhantomData<V>);

unsafe impl<V: Word> Record for Slots<V> {
    const WORDS: usize = 5;
}

impl<V: Word> Slots<V> {
    #[inline]
    fn location(slots: GlobalPtr<Self>) -> GlobalPtr<Advert> {
        slots.field(0)
    }

    #[inline]
    fn collision(slots: GlobalPtr<Self>) -> GlobalPtr<Option<usize>> {
        slots.field(1)
    }

    #[inline]
    fn elem(slots: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Node<V>>> {
        slots.field(2)
    }

    #[inline]
    fn seq(slots: GlobalPtr<Self>) -> GlobalPtr<u64> {
        slots.field(3)
    }

    #[inline]
    fn op(slots: GlobalPtr<Self>) -> GlobalPtr<Op> {
        slots.field(4)
    }
}

struct Partner<V> {
    unit: usize,
    seq: u64,
    elem: GlobalPtr<Node<V>>,
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::memory::HazardPointers;
    use crate::shmem::{Unit, World, WorldConfig};

    const PASSIVE_DELAY: u64 = 500_000;

    /// Runs one elimination between a passive unit, which advertises first
    /// and then waits for `PASSIVE_DELAY` microseconds, and an active unit,
    /// which collides with it as soon as the advertisement is visible.
    ///
    /// Both units use the collision slot of unit 0.
    /// Returns the value the pop received and whether `top` stayed empty.
    fn collide(passive: Op) -> (Option<u64>, bool) {
        let results = World::run(&WorldConfig::new(2), |unit: Unit| {
            let mut stack =
                EliminationStack::<u64, HazardPointers, _>::new(&unit, &Config::default()).unwrap();
            stack.rank_table = vec![0];

            let me = unit.unit_id();
            let op = if me == 0 { passive } else { passive.complement() };
            let is_passive = op == passive;
            stack.collision_delay = if is_passive { PASSIVE_DELAY } else { 1 };

            let elem = match op {
                Op::Push => {
                    let node = stack.manager.allocate().unwrap();
                    unit.write(Node::value(node), 42);
                    node
                }
                Op::Pop => GlobalPtr::NULL,
            };

            unit.barrier();
            stack.announce(op, elem);
            if !is_passive {
                let collision = Slots::collision(stack.slots[0]);
                let other = 1 - me;
                while unit.read(collision) != Some(other) {
                    thread::yield_now();
                }
            }

            let node = stack.eliminate(op, elem);
            let popped = match op {
                Op::Push => {
                    assert_eq!(node, elem);
                    None
                }
                Op::Pop => {
                    assert!(!node.is_null());
                    let value = unit.read(Node::value(node));
                    unsafe { stack.manager.release(node) };
                    Some(value)
                }
            };

            unit.barrier();
            let empty = unit.read(stack.top).is_null();
            stack.destroy();
            (popped, empty)
        });

        let popped = results.iter().find_map(|(popped, _)| *popped);
        (popped, results.iter().all(|(_, empty)| *empty))
    }

    #[test]
    fn passive_pop_receives_hand_off() {
        assert_eq!(collide(Op::Pop), (Some(42), true));
    }

    #[test]
    fn active_pop_takes_advertised_node() {
        assert_eq!(collide(Op::Push), (Some(42), true));
    }

    #[test]
    fn advert_encoding() {
        let ticket = Advert::Ticket { unit: 17, seq: 123_456 };
        assert_eq!(Advert::from_word(ticket.into_word()), ticket);
        assert_eq!(Advert::from_word(0), Advert::Empty);

        let node = GlobalPtr::<()>::new(3, 99);
        let handoff = Advert::Handoff(node);
        assert_eq!(Advert::from_word(handoff.into_word()), handoff);
        // a ticket of unit 0 must never be mistaken for an empty slot
        assert_ne!(Advert::Ticket { unit: 0, seq: 0 }.into_word(), 0);
    }

    #[test]
    fn collision_encoding() {
        assert_eq!(Option::<usize>::from_word(0), None);
        assert_eq!(Option::<usize>::from_word(Some(0).into_word()), Some(0));
        assert_eq!(Option::<usize>::from_word(Some(7).into_word()), Some(7));
    }

    #[test]
    fn bounds_stay_in_table() {
        let mut adapt = Adapt::new();
        for size in 1..=9 {
            let (min, max) = adapt.bounds(size);
            assert!(min <= max && max < size, "size {}: ({}, {})", size, min, max);
        }

        for _ in 0..64 {
            adapt.enlarge();
        }
        assert_eq!(adapt.factor, FACTOR_MAX);
        assert_eq!(adapt.bounds(4), (0, 3));
        assert_eq!(adapt.bounds(1), (0, 0));

        for _ in 0..256 {
            adapt.shrink();
        }
        assert!(adapt.factor < 0.01);
        let (min, max) = adapt.bounds(4);
        assert!(min >= 1 && max <= 2);
    }

    #[test]
    fn adapt_counts_before_scaling() {
        let mut adapt = Adapt::new();
        for _ in 0..COUNT_INIT {
            adapt.shrink();
        }
        assert_eq!(adapt.factor, FACTOR_INIT);
        adapt.shrink();
        assert_eq!(adapt.factor, FACTOR_INIT / 2.0);
        assert_eq!(adapt.count, COUNT_INIT);
    }
}
