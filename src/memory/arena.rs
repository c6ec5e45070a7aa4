use crate::collective;
use crate::error::Error;
use crate::pointer::GlobalPtr;
use crate::transport::{AtomicOp, Transport};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Arena
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A monotonically growing region of fixed-size slots in the caller's segment.
///
/// The first word is the cursor, the index of the next unused slot.
/// It is only ever advanced by a remote fetch-and-add, never reset.
#[derive(Debug)]
pub(crate) struct Arena {
    base: GlobalPtr<u64>,
    slot_words: usize,
    capacity: usize,
}

/********** impl inherent *************************************************************************/

impl Arena {
    /// Collective: allocates an arena of `capacity` slots of `slot_words`
    /// words on every unit.
    pub fn build<C: Transport>(
        transport: &C,
        slot_words: usize,
        capacity: usize,
    ) -> Result<Self, Error> {
        let local = transport
            .allocate(1 + capacity * slot_words)
            .map(|base| Self { base, slot_words, capacity });
        collective::settle(transport, local, |arena| unsafe { arena.free(transport) })
    }

    /// Claims the next unused slot and returns the address of its first
    /// word, or `None` if the arena is full.
    #[inline]
    pub fn grow<C: Transport>(&self, transport: &C) -> Option<GlobalPtr<u64>> {
        let index = transport.fetch_and_op(self.base, 1, AtomicOp::Add) as usize;
        if index >= self.capacity {
            return None;
        }

        Some(GlobalPtr::new(self.base.unit(), self.base.offset() + 1 + index * self.slot_words))
    }

    /// Returns the number of slots claimed so far.
    #[inline]
    pub fn claimed<C: Transport>(&self, transport: &C) -> usize {
        (transport.local_load(self.base) as usize).min(self.capacity)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// # Safety
    ///
    /// No slot of the arena may be accessed afterwards.
    #[inline]
    pub unsafe fn free<C: Transport>(self, transport: &C) {
        transport.deallocate(self.base);
    }
}
