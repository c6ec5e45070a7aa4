use crate::config::ReclaimConfig;
use crate::error::Error;
use crate::local::Stack;
use crate::memory::{Arena, Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record};
use crate::stats;
use crate::transport::Transport;

////////////////////////////////////////////////////////////////////////////////////////////////////
// FreeList
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Immediate reuse of released nodes through a local free list.
///
/// There is no protection whatsoever: a node is handed out again while
/// another unit may still be reading it.
/// Only sound for algorithms in which no unit can hold a reference to a node
/// past its release, e.g. structures serialized by a lock.
#[derive(Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct FreeList;

/********** impl Reclaim **************************************************************************/

impl Reclaim for FreeList {
    const NAME: &'static str = "free-list";

    type Manager<T: Record, C: Transport> = FreeListManager<T, C>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// FreeListManager
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct FreeListManager<T, C> {
    transport: C,
    arena: Arena,
    free: Stack<GlobalPtr<T>>,
}

/********** impl inherent *************************************************************************/

impl<T, C> FreeListManager<T, C> {
    /// Returns the number of released nodes ready for reuse.
    #[inline]
    pub fn free(&self) -> usize {
        self.free.len()
    }
}

/********** impl Manage ***************************************************************************/

impl<T: Record, C: Transport> Manage<T, C> for FreeListManager<T, C> {
    fn build(transport: &C, config: &ReclaimConfig) -> Result<Self, Error> {
        let arena = Arena::build(transport, T::WORDS, config.capacity)?;
        tracing::debug!(
            unit = transport.unit_id(),
            policy = FreeList::NAME,
            capacity = config.capacity,
            "reclamation manager built"
        );

        Ok(Self { transport: transport.clone(), arena, free: Stack::new() })
    }

    #[inline]
    fn allocate(&mut self) -> Result<GlobalPtr<T>, Error> {
        if let Some(ptr) = self.free.pop() {
            stats::record(stats::Event::Reused);
            return Ok(ptr);
        }

        match self.arena.grow(&self.transport) {
            Some(slot) => Ok(slot.cast()),
            None => {
                tracing::trace!(unit = self.transport.unit_id(), "free list arena exhausted");
                Err(Error::Exhausted)
            }
        }
    }

    #[inline]
    unsafe fn release(&mut self, ptr: GlobalPtr<T>) {
        self.free.push(ptr);
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn destroy(self) {
        self.transport.barrier();
        unsafe { self.arena.free(&self.transport) };
    }
}
