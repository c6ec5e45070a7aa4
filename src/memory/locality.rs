//! Locality-aware reclamation: hazard pointers plus a `taken` flag stored in
//! the word preceding every node.
//!
//! The flag lives in the same segment as the node, so an owner can tell
//! whether one of its own nodes is still in use without consulting any
//! hazard slot.
//! `allocate` sets the flag, `release` clears it.
//! Every unit tracks the nodes it handed out, a scan returns a tracked node
//! to the reclaimed list once its flag is clear and no hazard slot names it.

use crate::config::ReclaimConfig;
use crate::error::Error;
use crate::local::{self, List};
use crate::memory::{Arena, Hazards, Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record};
use crate::stats;
use crate::transport::Transport;

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalityAware
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Reclamation by co-located `taken` flags and hazard pointers.
#[derive(Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct LocalityAware;

/********** impl Reclaim **************************************************************************/

impl Reclaim for LocalityAware {
    const NAME: &'static str = "locality-aware";

    type Manager<T: Record, C: Transport> = LocalityManager<T, C>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalityManager
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct LocalityManager<T, C> {
    transport: C,
    arena: Arena,
    hazards: Hazards<T>,
    /// own nodes that have been handed out and not yet reclaimed
    tracked: List<GlobalPtr<T>>,
    reclaimed: List<GlobalPtr<T>>,
    released: usize,
}

/********** impl inherent *************************************************************************/

impl<T: Record, C: Transport> LocalityManager<T, C> {
    /// Returns the number of own nodes currently handed out or awaiting
    /// reclamation.
    #[inline]
    pub fn tracked(&self) -> usize {
        self.tracked.len()
    }

    #[inline]
    pub fn reclaimed(&self) -> usize {
        self.reclaimed.len()
    }

    /// Moves every tracked node whose flag is clear and which is not named by
    /// any hazard slot to the reclaimed list.
    pub fn scan(&mut self) {
        let hazards = self.hazards.collect(&self.transport);

        let mut still_tracked = List::new();
        while let Some(ptr) = self.tracked.remove_front() {
            let taken = self.transport.read(Self::flag(ptr));
            if taken || local::binary_search(&hazards, &ptr) {
                still_tracked.insert(ptr);
            } else {
                self.reclaimed.insert(ptr);
            }
        }

        tracing::debug!(
            unit = self.transport.unit_id(),
            hazards = hazards.len(),
            retained = still_tracked.len(),
            reclaimed = self.reclaimed.len(),
            "locality-aware scan"
        );

        self.tracked.assign(&mut still_tracked);
        self.released = 0;
    }

    #[inline]
    fn flag(ptr: GlobalPtr<T>) -> GlobalPtr<bool> {
        ptr.prefix()
    }

    #[inline]
    fn hand_out(&mut self, ptr: GlobalPtr<T>) -> GlobalPtr<T> {
        // only own nodes are ever handed out
        self.transport.local_store(Self::flag(ptr), true);
        self.tracked.insert(ptr);
        ptr
    }

    #[inline]
    fn reuse(&mut self) -> Option<GlobalPtr<T>> {
        let ptr = self.reclaimed.remove_front()?;
        stats::record(stats::Event::Reused);
        Some(self.hand_out(ptr))
    }
}

/********** impl Manage ***************************************************************************/

impl<T: Record, C: Transport> Manage<T, C> for LocalityManager<T, C> {
    const PROTECTS: bool = true;

    fn build(transport: &C, config: &ReclaimConfig) -> Result<Self, Error> {
        let hazards = Hazards::build(transport, config.hazards_per_unit)?;
        let arena = match Arena::build(transport, 1 + T::WORDS, config.capacity) {
            Ok(arena) => arena,
            Err(err) => {
                unsafe { hazards.free(transport) };
                return Err(err);
            }
        };

        tracing::debug!(
            unit = transport.unit_id(),
            policy = LocalityAware::NAME,
            capacity = config.capacity,
            threshold = hazards.threshold(),
            "reclamation manager built"
        );

        Ok(Self {
            transport: transport.clone(),
            arena,
            hazards,
            tracked: List::new(),
            reclaimed: List::new(),
            released: 0,
        })
    }

    #[inline]
    fn allocate(&mut self) -> Result<GlobalPtr<T>, Error> {
        if let Some(ptr) = self.reuse() {
            return Ok(ptr);
        }

        if let Some(slot) = self.arena.grow(&self.transport) {
            // the flag occupies the first word of the slot
            let ptr = GlobalPtr::new(slot.unit(), slot.offset() + 1);
            return Ok(self.hand_out(ptr));
        }

        self.scan();
        self.reuse().ok_or_else(|| {
            tracing::trace!(unit = self.transport.unit_id(), "locality-aware arena exhausted");
            Error::Exhausted
        })
    }

    #[inline]
    unsafe fn release(&mut self, ptr: GlobalPtr<T>) {
        self.transport.write(Self::flag(ptr), false);
        self.released += 1;
        if self.released >= self.hazards.threshold() {
            self.scan();
        }
    }

    #[inline]
    fn protect(&mut self, slot: usize, ptr: GlobalPtr<T>) {
        self.hazards.protect(&self.transport, slot, ptr);
    }

    #[inline]
    fn clear(&mut self, slot: usize) {
        self.hazards.protect(&self.transport, slot, GlobalPtr::NULL);
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn destroy(self) {
        self.transport.barrier();
        unsafe {
            self.arena.free(&self.transport);
            self.hazards.free(&self.transport);
        }
    }
}
