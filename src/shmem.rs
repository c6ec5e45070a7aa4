//! An in-process transport: every unit is an OS thread and every unit segment
//! is an array of atomic words.
//!
//! [`World::run`] spawns one thread per unit and hands each a [`Unit`]
//! handle, mirroring the SPMD launch of a real PGAS runtime.
//!
//! ```
//! use pgas_reclaim::shmem::{World, WorldConfig};
//! use pgas_reclaim::transport::{Transport, MASTER_UNIT};
//!
//! let ids = World::run(&WorldConfig::new(4), |unit| {
//!     let value = unit.broadcast(unit.unit_id() as u64 + 10, MASTER_UNIT);
//!     assert_eq!(value, 10);
//!     unit.unit_id()
//! });
//!
//! assert_eq!(ids, vec![0, 1, 2, 3]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::Arc;
use std::thread;

use conquer_util::align::Aligned128;
use parking_lot::{Condvar, Mutex};

use crate::error::Error;
use crate::pointer::{GlobalPtr, Word, MAX_UNITS};
use crate::topology::Topology;
use crate::transport::{AtomicOp, Complete, Transport};

/// The default number of words in each unit segment (8 MiB).
pub const DEFAULT_SEGMENT_WORDS: usize = 1 << 20;

////////////////////////////////////////////////////////////////////////////////////////////////////
// WorldConfig
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The shape of an in-process world.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WorldConfig {
    /// The number of units (threads).
    pub units: usize,
    /// The number of words in every unit segment.
    pub segment_words: usize,
    /// The number of consecutive unit ids that share a (simulated) node.
    pub units_per_node: usize,
}

impl WorldConfig {
    /// Creates a configuration for `units` units on a single node.
    #[inline]
    pub fn new(units: usize) -> Self {
        Self { units, segment_words: DEFAULT_SEGMENT_WORDS, units_per_node: units.max(1) }
    }

    #[inline]
    pub fn with_segment_words(mut self, segment_words: usize) -> Self {
        self.segment_words = segment_words;
        self
    }

    #[inline]
    pub fn with_units_per_node(mut self, units_per_node: usize) -> Self {
        self.units_per_node = units_per_node.max(1);
        self
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// World
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The shared state of all units: their segments and the collective
/// primitives.
pub struct World {
    segments: Box<[Aligned128<Segment>]>,
    rendezvous: Rendezvous,
    broadcast: Aligned128<AtomicU64>,
    units_per_node: usize,
}

/********** impl inherent *************************************************************************/

impl World {
    /// Runs `f` once on every unit of a freshly created world and returns the
    /// results indexed by unit id.
    ///
    /// If any unit panics, the units waiting in a collective operation panic
    /// as well and the first panic is resumed on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if `config.units` is zero or exceeds the encodable maximum.
    pub fn run<R, F>(config: &WorldConfig, f: F) -> Vec<R>
    where
        F: Fn(Unit) -> R + Sync,
        R: Send,
    {
        assert!(config.units > 0, "a world requires at least one unit");
        assert!(config.units <= MAX_UNITS, "too many units");

        let world = Arc::new(World::new(config));
        tracing::debug!(
            units = config.units,
            segment_words = config.segment_words,
            "world started"
        );

        let results: Vec<thread::Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..config.units)
                .map(|id| {
                    let unit = Unit { world: Arc::clone(&world), id };
                    let f = &f;
                    thread::Builder::new()
                        .name(format!("unit-{}", id))
                        .spawn_scoped(scope, move || {
                            let world = Arc::clone(&unit.world);
                            let res = panic::catch_unwind(AssertUnwindSafe(|| f(unit)));
                            if res.is_err() {
                                world.rendezvous.poison();
                            }
                            res
                        })
                })
                .collect::<Result<_, _>>()
                .unwrap_or_else(|err| panic!("failed to spawn unit thread: {}", err));

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(Err))
                .collect()
        });

        let mut values = Vec::with_capacity(results.len());
        for res in results {
            match res {
                Ok(value) => values.push(value),
                Err(payload) => panic::resume_unwind(payload),
            }
        }

        values
    }

    fn new(config: &WorldConfig) -> Self {
        Self {
            segments: (0..config.units)
                .map(|_| Aligned128 { aligned: Segment::new(config.segment_words) })
                .collect(),
            rendezvous: Rendezvous::new(config.units),
            broadcast: Aligned128 { aligned: AtomicU64::new(0) },
            units_per_node: config.units_per_node,
        }
    }

    #[inline]
    fn word(&self, addr: GlobalPtr<u64>) -> &AtomicU64 {
        assert!(!addr.is_null(), "access through a null global pointer");
        let segment = self
            .segments
            .get(addr.unit())
            .unwrap_or_else(|| panic!("global pointer to unknown unit {}", addr.unit()));
        segment
            .aligned
            .words
            .get(addr.offset())
            .unwrap_or_else(|| panic!("global pointer out of segment bounds: {:?}", addr))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Unit
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The transport handle of one unit of a [`World`].
#[derive(Clone)]
pub struct Unit {
    world: Arc<World>,
    id: usize,
}

/********** impl Transport ************************************************************************/

impl Transport for Unit {
    type Pending<W: Word> = Ready<W>;

    #[inline]
    fn unit_id(&self) -> usize {
        self.id
    }

    #[inline]
    fn unit_count(&self) -> usize {
        self.world.segments.len()
    }

    #[inline]
    fn allocate(&self, words: usize) -> Result<GlobalPtr<u64>, Error> {
        let segment = &self.world.segments[self.id].aligned;
        let offset = segment.allocate(words).map_err(|available| Error::OutOfMemory {
            unit: self.id,
            requested: words,
            available,
        })?;

        Ok(GlobalPtr::new(self.id, offset))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: GlobalPtr<u64>) {
        debug_assert_eq!(ptr.unit(), self.id, "deallocation in a foreign segment");
        self.world.segments[ptr.unit()].aligned.deallocate(ptr.offset());
    }

    #[inline]
    fn read_word(&self, addr: GlobalPtr<u64>) -> u64 {
        self.world.word(addr).load(SeqCst)
    }

    #[inline]
    fn write_word(&self, addr: GlobalPtr<u64>, word: u64) {
        self.world.word(addr).store(word, SeqCst)
    }

    #[inline]
    fn fetch_and_op_word(&self, addr: GlobalPtr<u64>, operand: u64, op: AtomicOp) -> u64 {
        let word = self.world.word(addr);
        match op {
            AtomicOp::Add => word.fetch_add(operand, SeqCst),
            AtomicOp::Or => word.fetch_or(operand, SeqCst),
            AtomicOp::And => word.fetch_and(operand, SeqCst),
            AtomicOp::Replace => word.swap(operand, SeqCst),
        }
    }

    #[inline]
    fn compare_and_swap_word(&self, addr: GlobalPtr<u64>, expected: u64, new: u64) -> u64 {
        match self.world.word(addr).compare_exchange(expected, new, SeqCst, SeqCst) {
            Ok(observed) | Err(observed) => observed,
        }
    }

    #[inline]
    fn barrier(&self) {
        self.world.rendezvous.wait();
    }

    #[inline]
    fn broadcast_word(&self, word: u64, root: usize) -> u64 {
        assert!(root < self.unit_count(), "broadcast root {} is not a unit", root);
        self.barrier();
        if self.id == root {
            self.world.broadcast.aligned.store(word, SeqCst);
        }
        self.barrier();
        let word = self.world.broadcast.aligned.load(SeqCst);
        // nobody may overwrite the value before every unit has read it
        self.barrier();
        word
    }

    #[inline]
    fn read_async<W: Word>(&self, addr: GlobalPtr<W>) -> Self::Pending<W> {
        Ready(self.read(addr))
    }

    #[inline]
    fn write_async<W: Word>(&self, addr: GlobalPtr<W>, value: W) -> Self::Pending<W> {
        self.write(addr, value);
        Ready(value)
    }
}

/********** impl Topology *************************************************************************/

impl Topology for Unit {
    #[inline]
    fn local_group_size(&self) -> usize {
        self.rank_table().len()
    }

    #[inline]
    fn local_rank(&self) -> usize {
        self.id % self.world.units_per_node
    }

    #[inline]
    fn rank_table(&self) -> Vec<usize> {
        let first = self.id - self.local_rank();
        let last = (first + self.world.units_per_node).min(self.unit_count());
        (first..last).collect()
    }
}

/********** impl Debug ****************************************************************************/

impl std::fmt::Debug for Unit {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Unit").field("id", &self.id).field("units", &self.unit_count()).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Ready
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An asynchronous operation that completed eagerly.
#[derive(Copy, Clone, Debug)]
pub struct Ready<W>(W);

impl<W> Complete<W> for Ready<W> {
    #[inline]
    fn test(&mut self) -> bool {
        true
    }

    #[inline]
    fn wait(self) -> W {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Segment
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Segment {
    words: Box<[AtomicU64]>,
    heap: Mutex<SegmentHeap>,
}

/********** impl inherent *************************************************************************/

impl Segment {
    fn new(len: usize) -> Self {
        let mut free = BTreeMap::new();
        if len > 0 {
            free.insert(0, len);
        }

        Self {
            words: (0..len).map(|_| AtomicU64::new(0)).collect(),
            heap: Mutex::new(SegmentHeap { free, used: HashMap::new() }),
        }
    }

    /// First-fit allocation, returns the largest free block size on failure.
    fn allocate(&self, words: usize) -> Result<usize, usize> {
        let words = words.max(1);
        let mut heap = self.heap.lock();
        let found = heap.free.iter().find(|(_, &len)| len >= words).map(|(&off, &len)| (off, len));
        let (offset, len) = match found {
            Some(block) => block,
            None => return Err(heap.free.values().copied().max().unwrap_or(0)),
        };

        heap.free.remove(&offset);
        if len > words {
            heap.free.insert(offset + words, len - words);
        }
        heap.used.insert(offset, words);
        drop(heap);

        for word in &self.words[offset..offset + words] {
            word.store(0, SeqCst);
        }

        Ok(offset)
    }

    fn deallocate(&self, offset: usize) {
        let mut heap = self.heap.lock();
        let len = match heap.used.remove(&offset) {
            Some(len) => len,
            None => panic!("deallocation of unallocated offset {}", offset),
        };

        let (mut start, mut len) = (offset, len);
        let next = heap.free.range(start + len..).next().map(|(&off, &l)| (off, l));
        if let Some((next_off, next_len)) = next {
            if next_off == start + len {
                heap.free.remove(&next_off);
                len += next_len;
            }
        }

        let prev = heap.free.range(..start).next_back().map(|(&off, &l)| (off, l));
        if let Some((prev_off, prev_len)) = prev {
            if prev_off + prev_len == start {
                heap.free.remove(&prev_off);
                start = prev_off;
                len += prev_len;
            }
        }

        heap.free.insert(start, len);
    }

    #[cfg(test)]
    fn free_words(&self) -> usize {
        self.heap.lock().free.values().sum()
    }
}

struct SegmentHeap {
    /// free blocks by offset
    free: BTreeMap<usize, usize>,
    /// allocated blocks by offset
    used: HashMap<usize, usize>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Rendezvous
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A reusable barrier that fails instead of blocking forever once one of the
/// participating units has panicked.
struct Rendezvous {
    state: Mutex<RendezvousState>,
    cvar: Condvar,
    poisoned: AtomicBool,
    parties: usize,
}

struct RendezvousState {
    arrived: usize,
    generation: u64,
}

impl Rendezvous {
    fn new(parties: usize) -> Self {
        Self {
            state: Mutex::new(RendezvousState { arrived: 0, generation: 0 }),
            cvar: Condvar::new(),
            poisoned: AtomicBool::new(false),
            parties,
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        self.check_poisoned();

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }

        while state.generation == generation {
            self.cvar.wait(&mut state);
            self.check_poisoned();
        }
    }

    fn poison(&self) {
        let _state = self.state.lock();
        self.poisoned.store(true, SeqCst);
        self.cvar.notify_all();
    }

    #[inline]
    fn check_poisoned(&self) {
        if self.poisoned.load(SeqCst) {
            panic!("another unit panicked while this unit was waiting in a barrier");
        }
    }
}
