//! The one-sided remote memory interface all data structures are built on.
//!
//! A [`Transport`] is the handle of a single unit: it knows its own id, can
//! allocate words in its own segment and can read, write and atomically
//! update words in the segment of any unit.
//! Every synchronous operation is a full fence, its effect is globally
//! visible once it returns.
//! Asynchronous reads and writes return a [`Complete`] handle which must be
//! waited on before the result can be trusted.

use crate::error::Error;
use crate::pointer::{GlobalPtr, Record, Word};

/// The designated unit that allocates the shared headers of every data
/// structure.
pub const MASTER_UNIT: usize = 0;

////////////////////////////////////////////////////////////////////////////////////////////////////
// AtomicOp
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The operation applied by [`Transport::fetch_and_op`].
#[derive(Copy, Clone, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub enum AtomicOp {
    /// Wrapping addition.
    Add,
    /// Bitwise or.
    Or,
    /// Bitwise and.
    And,
    /// Unconditional swap.
    Replace,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Complete (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A pending asynchronous remote operation.
pub trait Complete<W> {
    /// Returns `true` if the operation has completed and [`wait`](Complete::wait)
    /// would return immediately.
    fn test(&mut self) -> bool;
    /// Blocks until the operation has completed and returns its result.
    fn wait(self) -> W;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Transport (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The handle of one unit to the partitioned global address space.
///
/// Implementors provide raw word operations, all typed operations are derived
/// from them.
pub trait Transport: Clone + Send + 'static {
    /// The handle type of asynchronous reads and writes.
    type Pending<W: Word>: Complete<W>;

    /// Returns the id of the calling unit.
    fn unit_id(&self) -> usize;

    /// Returns the number of units.
    fn unit_count(&self) -> usize;

    /// Allocates `words` zeroed words in the segment of the calling unit.
    fn allocate(&self, words: usize) -> Result<GlobalPtr<u64>, Error>;

    /// Frees memory previously returned by [`allocate`](Transport::allocate)
    /// on the same unit.
    ///
    /// # Safety
    ///
    /// `ptr` must not be accessed by any unit afterwards.
    unsafe fn deallocate(&self, ptr: GlobalPtr<u64>);

    fn read_word(&self, addr: GlobalPtr<u64>) -> u64;

    fn write_word(&self, addr: GlobalPtr<u64>, word: u64);

    /// Atomically applies `op` with `operand` to the word at `addr` and
    /// returns its previous value.
    fn fetch_and_op_word(&self, addr: GlobalPtr<u64>, operand: u64, op: AtomicOp) -> u64;

    /// Atomically replaces the word at `addr` with `new` if it equals
    /// `expected` and returns the observed value in either case.
    fn compare_and_swap_word(&self, addr: GlobalPtr<u64>, expected: u64, new: u64) -> u64;

    /// Blocks until every unit has entered the barrier.
    fn barrier(&self);

    /// Collective: returns the word supplied by unit `root` on every unit.
    fn broadcast_word(&self, word: u64, root: usize) -> u64;

    /// Starts an asynchronous read of the value at `addr`.
    fn read_async<W: Word>(&self, addr: GlobalPtr<W>) -> Self::Pending<W>;

    /// Starts an asynchronous write of `value` to `addr`, the handle returns
    /// the written value.
    fn write_async<W: Word>(&self, addr: GlobalPtr<W>, value: W) -> Self::Pending<W>;

    /********** provided methods ******************************************************************/

    /// Allocates `count` zeroed records of type `T` in the caller's segment.
    #[inline]
    fn alloc<T: Record>(&self, count: usize) -> Result<GlobalPtr<T>, Error> {
        self.allocate(count * T::WORDS).map(GlobalPtr::cast)
    }

    /// Frees records previously returned by [`alloc`](Transport::alloc).
    ///
    /// # Safety
    ///
    /// See [`deallocate`](Transport::deallocate).
    #[inline]
    unsafe fn dealloc<T: Record>(&self, ptr: GlobalPtr<T>) {
        self.deallocate(ptr.cast())
    }

    #[inline]
    fn read<W: Word>(&self, addr: GlobalPtr<W>) -> W {
        W::from_word(self.read_word(addr.cast()))
    }

    #[inline]
    fn write<W: Word>(&self, addr: GlobalPtr<W>, value: W) {
        self.write_word(addr.cast(), value.into_word())
    }

    /// Reads a value from the caller's own segment.
    #[inline]
    fn local_load<W: Word>(&self, addr: GlobalPtr<W>) -> W {
        debug_assert_eq!(addr.unit(), self.unit_id(), "local load from a remote segment");
        self.read(addr)
    }

    /// Writes a value to the caller's own segment.
    #[inline]
    fn local_store<W: Word>(&self, addr: GlobalPtr<W>, value: W) {
        debug_assert_eq!(addr.unit(), self.unit_id(), "local store to a remote segment");
        self.write(addr, value)
    }

    #[inline]
    fn fetch_and_op<W: Word>(&self, addr: GlobalPtr<W>, operand: W, op: AtomicOp) -> W {
        W::from_word(self.fetch_and_op_word(addr.cast(), operand.into_word(), op))
    }

    /// Returns the observed value, the swap succeeded iff it equals
    /// `expected`.
    #[inline]
    fn compare_and_swap<W: Word>(&self, addr: GlobalPtr<W>, expected: W, new: W) -> W {
        W::from_word(self.compare_and_swap_word(
            addr.cast(),
            expected.into_word(),
            new.into_word(),
        ))
    }

    /// Like [`compare_and_swap`](Transport::compare_and_swap), but only
    /// reports success.
    #[inline]
    fn cas<W: Word>(&self, addr: GlobalPtr<W>, expected: W, new: W) -> bool {
        let expected = expected.into_word();
        self.compare_and_swap_word(addr.cast(), expected, new.into_word()) == expected
    }

    /// Collective: returns the value supplied by unit `root` on every unit.
    #[inline]
    fn broadcast<W: Word>(&self, value: W, root: usize) -> W {
        W::from_word(self.broadcast_word(value.into_word(), root))
    }

    /// Collective: returns the values supplied by all units, indexed by unit
    /// id.
    #[inline]
    fn all_gather<W: Word>(&self, value: W) -> Vec<W> {
        (0..self.unit_count()).map(|root| self.broadcast(value, root)).collect()
    }

    /// Collective: returns `Ok` only if every unit supplied `true`, otherwise
    /// the id of the first unit that did not.
    #[inline]
    fn agree(&self, ok: bool) -> Result<(), usize> {
        match self.all_gather(ok).into_iter().position(|ok| !ok) {
            Some(unit) => Err(unit),
            None => Ok(()),
        }
    }

    #[inline]
    fn is_master(&self) -> bool {
        self.unit_id() == MASTER_UNIT
    }
}
