//! A stack of per-unit lists ordered by interval timestamps.
//!
//! Every unit pushes only onto its own list and stamps each node with an
//! interval `[start, end]` taken from a global logical clock.
//! A pop mints its own timestamp, then looks at the first live node of every
//! unit's list: a node stamped after the pop began was pushed concurrently
//! and is eliminated right away, otherwise the youngest node across all lists
//! is taken.
//! Nodes are claimed by a compare-and-swap on their `taken` flag, no unit ever
//! swaps a shared top pointer to pop.
//!
//! Taken nodes are unlinked lazily by later pushes and pops but never reused,
//! so the stack always allocates through a [`LeakingManager`].

use core::cmp::Ordering;
use core::fmt;
use core::marker::PhantomData;

use crate::backoff;
use crate::collective;
use crate::config::{ClockKind, Config};
use crate::error::Error;
use crate::memory::{Leaking, LeakingManager, Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record, Word};
use crate::transport::{AtomicOp, Transport};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Timestamp
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A logical time interval.
///
/// Two timestamps are ordered only if their intervals do not overlap,
/// overlapping intervals belong to concurrent operations.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Timestamp {
    pub start: u64,
    pub end: u64,
}

/********** impl inherent *************************************************************************/

impl Timestamp {
    /// The timestamp of a node whose push has not been stamped yet, it is
    /// after every minted timestamp.
    pub const PENDING: Self = Self { start: u64::MAX, end: u64::MAX };

    /// Returns `true` if `self` ends before `other` starts.
    #[inline]
    pub const fn is_before(self, other: Self) -> bool {
        self.end < other.start
    }

    #[inline]
    pub const fn is_pending(self) -> bool {
        self.start == u64::MAX
    }
}

/********** impl PartialOrd ***********************************************************************/

impl PartialOrd for Timestamp {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_before(*other) {
            Some(Ordering::Less)
        } else if other.is_before(*self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

/********** impl Display **************************************************************************/

impl fmt::Display for Timestamp {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_pending() {
            f.write_str("[pending]")
        } else {
            write!(f, "[{}, {}]", self.start, self.end)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// TimestampStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A linearizable stack built from one list per unit and interval
/// timestamps.
pub struct TimestampStack<V: Word, C: Transport> {
    transport: C,
    /// the top pointer of every unit's list, indexed by unit id
    tops: Vec<GlobalPtr<GlobalPtr<TsNode<V>>>>,
    clock: GlobalPtr<u64>,
    manager: LeakingManager<C>,
    kind: ClockKind,
    interval: u64,
}

/********** impl inherent *************************************************************************/

impl<V: Word, C: Transport> TimestampStack<V, C> {
    /// Collective: creates a new empty stack.
    #[inline]
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        Self::with_values(transport, config, core::iter::empty())
    }

    /// Collective: creates a new stack holding the `values` supplied by the
    /// master unit in its own list, the last one on top.
    pub fn with_values(
        transport: &C,
        config: &Config,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        // the clock starts at 1 so that every minted timestamp is after the
        // zeroed initial maximum of a pop's scan
        let clock = collective::share::<_, u64>(transport, 1, |clock| transport.write(clock, 1))?;
        let free_clock = || {
            if transport.is_master() {
                unsafe { transport.dealloc(clock) };
            }
        };

        let local = transport.alloc::<GlobalPtr<TsNode<V>>>(1);
        let undo = |own: GlobalPtr<GlobalPtr<TsNode<V>>>| unsafe { transport.dealloc(own) };
        let own = match collective::settle(transport, local, undo) {
            Ok(own) => own,
            Err(err) => {
                free_clock();
                return Err(err);
            }
        };
        let tops = transport.all_gather(own);

        let manager =
            match <LeakingManager<C> as Manage<TsNode<V>, C>>::build(transport, &config.reclaim) {
                Ok(manager) => manager,
                Err(err) => {
                    unsafe { transport.dealloc(own) };
                    free_clock();
                    return Err(err);
                }
            };

        let mut stack = Self {
            transport: transport.clone(),
            tops,
            clock,
            manager,
            kind: config.timestamp.clock,
            interval: config.timestamp.interval,
        };

        let filled = if transport.is_master() {
            values.into_iter().try_for_each(|value| stack.push(value))
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
            policy = Leaking::NAME,
            clock = ?stack.kind,
            "timestamp stack created"
        );
        Ok(stack)
    }

    /// Pushes `value` onto the calling unit's list.
    pub fn push(&mut self, value: V) -> Result<(), Error> {
        let top = self.tops[self.transport.unit_id()];
        let old = self.transport.read(top);

        let node = <LeakingManager<C> as Manage<TsNode<V>, C>>::allocate(&mut self.manager)?;
        self.transport.write(TsNode::next(node), old);
        self.transport.write(TsNode::taken(node), false);
        self.transport.write(TsNode::end(node), u64::MAX);
        self.transport.write(TsNode::start(node), u64::MAX);
        self.transport.write(TsNode::value(node), value);
        self.transport.write(top, node);

        // skip the taken nodes below the new one
        let live = self.first_live(old);
        if live != old {
            self.transport.write(TsNode::next(node), live);
        }

        let ts = self.mint();
        self.transport.write(TsNode::end(node), ts.end);
        self.transport.write(TsNode::start(node), ts.start);

        Ok(())
    }

    /// Pops the youngest value of the stack, or a value pushed concurrently
    /// with this call, or returns `None` if the stack is empty.
    pub fn pop(&mut self) -> Option<V> {
        let start = self.mint();
        loop {
            if let Some(res) = self.try_remove(start) {
                return res;
            }
        }
    }

    /// Returns the timestamp of `node`, [`Timestamp::PENDING`] if it has not
    /// been stamped yet.
    #[inline]
    fn read_ts(&self, node: GlobalPtr<TsNode<V>>) -> Timestamp {
        // the end is always written before the start
        let start = self.transport.read(TsNode::start(node));
        if start == u64::MAX {
            return Timestamp::PENDING;
        }

        Timestamp { start, end: self.transport.read(TsNode::end(node)) }
    }

    /// Returns the first node reachable from `node` (inclusive) that has not
    /// been taken.
    #[inline]
    fn first_live(&self, mut node: GlobalPtr<TsNode<V>>) -> GlobalPtr<TsNode<V>> {
        while !node.is_null() && self.transport.read(TsNode::taken(node)) {
            node = self.transport.read(TsNode::next(node));
        }

        node
    }

    /// A single scan over all lists.
    ///
    /// Returns `None` if the scan has to be repeated, `Some(None)` if the
    /// stack is empty.
    fn try_remove(&self, start: Timestamp) -> Option<Option<V>> {
        let mut observed = Vec::with_capacity(self.tops.len());
        let mut youngest: Option<Candidate<V>> = None;

        for (unit, &top) in self.tops.iter().enumerate() {
            let head = self.transport.read(top);
            observed.push(head);

            let node = self.first_live(head);
            if node.is_null() {
                continue;
            }

            let ts = self.read_ts(node);
            let candidate = Candidate { unit, head, node, ts };
            if start.is_before(ts) {
                return self.remove(candidate).map(Some);
            }

            // the zero timestamp is before every minted one
            let max = youngest.as_ref().map_or(Timestamp { start: 0, end: 0 }, |y| y.ts);
            if max.is_before(ts) {
                youngest = Some(candidate);
            }
        }

        match youngest {
            Some(candidate) => self.remove(candidate).map(Some),
            None => {
                let unchanged = self
                    .tops
                    .iter()
                    .zip(&observed)
                    .all(|(&top, &head)| self.transport.read(top) == head);
                unchanged.then(|| None)
            }
        }
    }

    /// Claims the candidate's node and unlinks the taken nodes around it.
    fn remove(&self, candidate: Candidate<V>) -> Option<V> {
        let Candidate { unit, head, node, .. } = candidate;
        if !self.transport.cas(TsNode::taken(node), false, true) {
            return None;
        }

        self.transport.cas(self.tops[unit], head, node);
        if head != node {
            self.transport.write(TsNode::next(head), node);
        }

        let next = self.transport.read(TsNode::next(node));
        let live = self.first_live(next);
        if live != next {
            self.transport.write(TsNode::next(node), live);
        }

        Some(self.transport.read(TsNode::value(node)))
    }

    /// Mints a new timestamp from the global clock.
    fn mint(&self) -> Timestamp {
        match self.kind {
            ClockKind::Counter => {
                let time = self.transport.fetch_and_op(self.clock, 1, AtomicOp::Add);
                Timestamp { start: time, end: time }
            }
            ClockKind::Interval => {
                let start = self.transport.read(self.clock);
                backoff::sleep_micros(self.interval);
                let end = self.transport.read(self.clock);
                if start != end {
                    return Timestamp { start, end: end - 1 };
                }

                if self.transport.cas(self.clock, start, start + 1) {
                    Timestamp { start, end: start }
                } else {
                    Timestamp { start, end: self.transport.read(self.clock) - 1 }
                }
            }
        }
    }

    /// Returns the number of nodes the calling unit has allocated.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.manager.allocated()
    }

    /// Collective: returns the values of all live nodes, grouped by unit and
    /// top first within each unit's list.
    pub fn snapshot(&self) -> Vec<V> {
        self.transport.barrier();
        let mut values = Vec::new();
        for &top in &self.tops {
            let mut curr = self.transport.read(top);
            while !curr.is_null() {
                if !self.transport.read(TsNode::taken(curr)) {
                    values.push(self.transport.read(TsNode::value(curr)));
                }
                curr = self.transport.read(TsNode::next(curr));
            }
        }

        self.transport.barrier();
        values
    }

    /// Collective: frees the stack and every node allocated by any unit.
    pub fn destroy(self) {
        self.transport.barrier();
        unsafe {
            self.transport.dealloc(self.tops[self.transport.unit_id()]);
            if self.transport.is_master() {
                self.transport.dealloc(self.clock);
            }
        }

        <LeakingManager<C> as Manage<TsNode<V>, C>>::destroy(self.manager);
        tracing::debug!(unit = self.transport.unit_id(), "timestamp stack destroyed");
    }
}

/// The first live node of one unit's list found by a pop.
struct Candidate<V> {
    unit: usize,
    /// the unit's top pointer at the time of the scan
    head: GlobalPtr<TsNode<V>>,
    node: GlobalPtr<TsNode<V>>,
    ts: Timestamp,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// TsNode
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `{ next, taken: bool, start: u64, end: u64, value: V }`
pub(crate) struct TsNode<V>(PhantomData<V>);

unsafe impl<V: Word> Record for TsNode<V> {
    const WORDS: usize = 5;
}

impl<V: Word> TsNode<V> {
    #[inline]
    fn next(node: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Self>> {
        node.field(0)
    }

    #[inline]
    fn taken(node: GlobalPtr<Self>) -> GlobalPtr<bool> {
        node.field(1)
    }

    #[inline]
    fn start(node: GlobalPtr<Self>) -> GlobalPtr<u64> {
        node.field(2)
    }

    #[inline]
    fn end(node: GlobalPtr<Self>) -> GlobalPtr<u64> {
        node.field(3)
    }

    #[inline]
    fn value(node: GlobalPtr<Self>) -> GlobalPtr<V> {
        node.field(4)
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn overlapping_intervals_are_unordered() {
        let a = Timestamp { start: 1, end: 3 };
        let b = Timestamp { start: 3, end: 5 };
        let c = Timestamp { start: 4, end: 4 };

        assert!(a.is_before(c));
        assert!(!a.is_before(b));
        assert!(!b.is_before(a));
        assert_eq!(a.partial_cmp(&b), None);
        assert!(a < c);
        assert!(c > a);
        assert_eq!(c.partial_cmp(&c), Some(core::cmp::Ordering::Equal));
    }

    #[test]
    fn pending_is_after_everything() {
        let ts = Timestamp { start: 10, end: 12 };
        assert!(ts.is_before(Timestamp::PENDING));
        assert!(!Timestamp::PENDING.is_before(ts));
        assert!(Timestamp::PENDING.is_pending());
        assert_eq!(Timestamp::PENDING.to_string(), "[pending]");
        assert_eq!(ts.to_string(), "[10, 12]");
    }
}
