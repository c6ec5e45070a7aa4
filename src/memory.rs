//! Memory reclamation for nodes living in global memory.
//!
//! Nodes can not be garbage collected implicitly, because they are spread
//! across the segments of all units and any unit may still be reading a node
//! that another unit has just unlinked.
//! Every data structure is therefore generic over a reclamation policy
//! implementing [`Reclaim`], whose per-unit [`Manage`] instance hands out
//! nodes (`allocate`) and takes back unlinked ones (`release`).
//!
//! Four policies are provided:
//!
//! - [`HazardPointers`]: classic hazard pointers, every unit publishes the
//!   nodes it is about to dereference and released nodes are only reused once
//!   a scan of all hazard slots proves that nobody does.
//! - [`LocalityAware`]: hazard pointers plus a `taken` flag co-located with
//!   every node, a node is only reused once its flag is cleared and no hazard
//!   slot names it.
//! - [`FreeList`]: a plain local free list without any protection.
//! - [`Leaking`]: never reuses a node.
//!
//! Each unit's arena grows by a single remote atomic increment, so the
//! managers themselves need no local synchronization.

mod arena;
mod free_list;
mod hazard;
mod leak;
mod locality;

use crate::config::ReclaimConfig;
use crate::error::Error;
use crate::pointer::{GlobalPtr, Record};
use crate::transport::Transport;

pub use self::free_list::{FreeList, FreeListManager};
pub use self::hazard::{HazardManager, HazardPointers};
pub use self::leak::{LeakingManager, Leaking};
pub use self::locality::{LocalityAware, LocalityManager};

pub(crate) use self::arena::Arena;
pub(crate) use self::hazard::Hazards;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Reclaim (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A reclamation policy.
///
/// The policy itself is a marker type, the per-unit state lives in its
/// [`Manager`](Reclaim::Manager).
pub trait Reclaim: Sized + 'static {
    /// A short name of the policy, used in log messages.
    const NAME: &'static str;

    /// The per-unit manager of nodes of type `T`.
    type Manager<T: Record, C: Transport>: Manage<T, C>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Manage (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The per-unit state of a reclamation policy.
pub trait Manage<T: Record, C: Transport>: Sized + Send {
    /// `true` if [`protect`](Manage::protect) publishes hazard pointers, in
    /// which case algorithms must validate a protected pointer by re-reading
    /// its source.
    const PROTECTS: bool = false;

    /// Collective: allocates the arena of the calling unit and any slots
    /// shared with other units.
    fn build(transport: &C, config: &ReclaimConfig) -> Result<Self, Error>;

    /// Returns a node that is not referenced by any structure or any unit.
    ///
    /// The contents of the node are garbage and must be overwritten before it
    /// is linked.
    /// Fails with [`Error::Exhausted`] if the arena is full and no released
    /// node can be reused.
    fn allocate(&mut self) -> Result<GlobalPtr<T>, Error>;

    /// Hands back a node for eventual reuse.
    ///
    /// # Safety
    ///
    /// The node must have been unlinked from its structure, so no unit can
    /// acquire a new reference to it, and it must not be released twice.
    unsafe fn release(&mut self, ptr: GlobalPtr<T>);

    /// Publishes `ptr` in hazard slot `slot` of the calling unit.
    #[inline]
    fn protect(&mut self, _slot: usize, _ptr: GlobalPtr<T>) {}

    /// Clears hazard slot `slot` of the calling unit.
    #[inline]
    fn clear(&mut self, _slot: usize) {}

    /// Returns the number of nodes the calling unit's arena can hold.
    fn capacity(&self) -> usize;

    /// Collective: frees the arena and slots of the calling unit.
    ///
    /// Every node allocated by this manager becomes invalid.
    fn destroy(self);
}
