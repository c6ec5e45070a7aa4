//! A no-op reclamation policy that never reuses a node.

use crate::config::ReclaimConfig;
use crate::error::Error;
use crate::memory::{Arena, Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record};
use crate::transport::Transport;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Leaking
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Released nodes are leaked until the structure is destroyed.
///
/// Since no node is ever reused, no algorithm can suffer from ABA or
/// use-after-free, at the cost of an arena that only ever fills up.
#[derive(Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct Leaking;

/********** impl Reclaim **************************************************************************/

impl Reclaim for Leaking {
    const NAME: &'static str = "leaking";

    type Manager<T: Record, C: Transport> = LeakingManager<C>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LeakingManager
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct LeakingManager<C> {
    transport: C,
    arena: Arena,
}

/********** impl Manage ***************************************************************************/

impl<T: Record, C: Transport> Manage<T, C> for LeakingManager<C> {
    fn build(transport: &C, config: &ReclaimConfig) -> Result<Self, Error> {
        let arena = Arena::build(transport, T::WORDS, config.capacity)?;
        tracing::debug!(
            unit = transport.unit_id(),
            policy = Leaking::NAME,
            capacity = config.capacity,
            "reclamation manager built"
        );

        Ok(Self { transport: transport.clone(), arena })
    }

    #[inline]
    fn allocate(&mut self) -> Result<GlobalPtr<T>, Error> {
        self.arena.grow(&self.transport).map(GlobalPtr::cast).ok_or_else(|| {
            tracing::trace!(unit = self.transport.unit_id(), "arena exhausted");
            Error::Exhausted
        })
    }

    #[inline(always)]
    unsafe fn release(&mut self, _: GlobalPtr<T>) {}

    #[inline]
    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn destroy(self) {
        self.transport.barrier();
        unsafe { self.arena.free(&self.transport) };
    }
}

impl<C: Transport> LeakingManager<C> {
    /// Returns the number of nodes handed out so far.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.arena.claimed(&self.transport)
    }
}
