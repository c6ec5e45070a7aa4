//! Hazard pointers over global memory.
//!
//! Every unit owns `hazards_per_unit` slots in its own segment.
//! A unit about to dereference a shared node publishes the node's address in
//! one of its slots and re-validates that the node is still reachable.
//! Released nodes are collected in a retired list, once that list grows past
//! twice the total number of hazard slots a scan reads all slots of all units
//! and moves every retired node no slot names to the reclaimed list.

use crate::collective;
use crate::config::ReclaimConfig;
use crate::error::Error;
use crate::local::{self, List};
use crate::memory::{Arena, Manage, Reclaim};
use crate::pointer::{GlobalPtr, Record};
use crate::stats;
use crate::transport::{Complete, Transport};

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardPointers
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Hazard pointer based reclamation.
#[derive(Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct HazardPointers;

/********** impl Reclaim **************************************************************************/

impl Reclaim for HazardPointers {
    const NAME: &'static str = "hazard-pointers";

    type Manager<T: Record, C: Transport> = HazardManager<T, C>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardManager
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The per-unit state of the [`HazardPointers`] policy.
pub struct HazardManager<T, C> {
    transport: C,
    arena: Arena,
    hazards: Hazards<T>,
    retired: List<GlobalPtr<T>>,
    reclaimed: List<GlobalPtr<T>>,
}

/********** impl inherent *************************************************************************/

impl<T: Record, C: Transport> HazardManager<T, C> {
    /// Returns the number of released nodes that are waiting for a scan.
    #[inline]
    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    /// Returns the number of nodes that are ready for reuse.
    #[inline]
    pub fn reclaimed(&self) -> usize {
        self.reclaimed.len()
    }

    /// Moves every retired node that is not named by any hazard slot to the
    /// reclaimed list.
    pub fn scan(&mut self) {
        let hazards = self.hazards.collect(&self.transport);

        let mut still_retired = List::new();
        while let Some(ptr) = self.retired.remove_front() {
            if local::binary_search(&hazards, &ptr) {
                still_retired.insert(ptr);
            } else {
                self.reclaimed.insert(ptr);
            }
        }

        tracing::debug!(
            unit = self.transport.unit_id(),
            hazards = hazards.len(),
            retained = still_retired.len(),
            reclaimed = self.reclaimed.len(),
            "hazard pointer scan"
        );

        self.retired.assign(&mut still_retired);
    }

    #[inline]
    fn reuse(&mut self) -> Option<GlobalPtr<T>> {
        let ptr = self.reclaimed.remove_front()?;
        stats::record(stats::Event::Reused);
        Some(ptr)
    }
}

/********** impl Manage ***************************************************************************/

impl<T: Record, C: Transport> Manage<T, C> for HazardManager<T, C> {
    const PROTECTS: bool = true;

    fn build(transport: &C, config: &ReclaimConfig) -> Result<Self, Error> {
        let hazards = Hazards::build(transport, config.hazards_per_unit)?;
        let arena = match Arena::build(transport, T::WORDS, config.capacity) {
            Ok(arena) => arena,
            Err(err) => {
                unsafe { hazards.free(transport) };
                return Err(err);
            }
        };

        tracing::debug!(
            unit = transport.unit_id(),
            policy = HazardPointers::NAME,
            capacity = config.capacity,
            threshold = hazards.threshold(),
            "reclamation manager built"
        );

        Ok(Self {
            transport: transport.clone(),
            arena,
            hazards,
            retired: List::new(),
            reclaimed: List::new(),
        })
    }

    #[inline]
    fn allocate(&mut self) -> Result<GlobalPtr<T>, Error> {
        if let Some(ptr) = self.reuse() {
            return Ok(ptr);
        }

        if let Some(slot) = self.arena.grow(&self.transport) {
            return Ok(slot.cast());
        }

        // the arena is full, try once more to reclaim a node
        self.scan();
        self.reuse().ok_or_else(|| {
            tracing::trace!(unit = self.transport.unit_id(), "hazard pointer arena exhausted");
            Error::Exhausted
        })
    }

    #[inline]
    unsafe fn release(&mut self, ptr: GlobalPtr<T>) {
        self.retired.insert(ptr);
        if self.retired.len() >= self.hazards.threshold() {
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

////////////////////////////////////////////////////////////////////////////////////////////////////
// Hazards
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The hazard slots of all units.
pub(crate) struct Hazards<T> {
    own: GlobalPtr<GlobalPtr<T>>,
    all: Vec<GlobalPtr<GlobalPtr<T>>>,
    per_unit: usize,
}

/********** impl inherent *************************************************************************/

impl<T: Record> Hazards<T> {
    /// Collective: allocates `per_unit` cleared slots on every unit and
    /// exchanges their addresses.
    pub fn build<C: Transport>(transport: &C, per_unit: usize) -> Result<Self, Error> {
        let local = transport.alloc::<GlobalPtr<T>>(per_unit);
        let own = collective::settle(transport, local, |own| unsafe { transport.dealloc(own) })?;
        let all = transport.all_gather(own);

        Ok(Self { own, all, per_unit })
    }

    /// The number of retired nodes that triggers a scan.
    #[inline]
    pub fn threshold(&self) -> usize {
        2 * self.all.len() * self.per_unit
    }

    #[inline]
    pub fn protect<C: Transport>(&self, transport: &C, slot: usize, ptr: GlobalPtr<T>) {
        assert!(slot < self.per_unit, "hazard slot {} out of range", slot);
        transport.write(self.own.add(slot), ptr);
    }

    /// Reads every non-null hazard pointer of every unit and returns them
    /// sorted and without duplicates.
    pub fn collect<C: Transport>(&self, transport: &C) -> Vec<GlobalPtr<T>> {
        let pending: Vec<_> = self
            .all
            .iter()
            .flat_map(|base| (0..self.per_unit).map(move |slot| base.add(slot)))
            .map(|slot| transport.read_async(slot))
            .collect();

        let mut hazards: Vec<GlobalPtr<T>> =
            pending.into_iter().map(|read| read.wait()).filter(|ptr| !ptr.is_null()).collect();

        local::heap_sort(&mut hazards);
        let len = local::remove_duplicates(&mut hazards);
        hazards.truncate(len);
        hazards
    }

    /// # Safety
    ///
    /// The slots must not be accessed by any unit afterwards.
    #[inline]
    pub unsafe fn free<C: Transport>(self, transport: &C) {
        transport.dealloc(self.own);
    }
}
