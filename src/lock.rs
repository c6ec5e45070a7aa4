//! The MCS queue lock over global memory.
//!
//! The lock is a single `tail` word on the master unit plus one queue node
//! per unit in that unit's own segment, so every unit spins only on a word
//! in its own segment while it waits.
//! Units are granted the lock in the order in which their swap into `tail`
//! took effect.

use crate::backoff::Spin;
use crate::collective;
use crate::error::Error;
use crate::pointer::{GlobalPtr, Record};
use crate::transport::{AtomicOp, Transport};

////////////////////////////////////////////////////////////////////////////////////////////////////
// McsLock
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A distributed FIFO mutual exclusion lock.
///
/// Each unit holds its own `McsLock` handle, obtained collectively through
/// [`new`](McsLock::new).
pub struct McsLock<C> {
    transport: C,
    tail: GlobalPtr<GlobalPtr<QNode>>,
    node: GlobalPtr<QNode>,
}

/********** impl inherent *************************************************************************/

impl<C: Transport> McsLock<C> {
    /// Collective: creates a new unlocked lock.
    pub fn new(transport: &C) -> Result<Self, Error> {
        transport.barrier();
        let tail = collective::share::<_, GlobalPtr<QNode>>(transport, 1, |_| {})?;
        let local = transport.alloc::<QNode>(1);
        let node = collective::settle(transport, local, |node| unsafe { transport.dealloc(node) })
            .map_err(|err| {
                if transport.is_master() {
                    unsafe { transport.dealloc(tail) };
                }
                err
            })?;

        transport.barrier();
        tracing::debug!(unit = transport.unit_id(), "mcs lock created");
        Ok(Self { transport: transport.clone(), tail, node })
    }

    /// Blocks until the calling unit holds the lock.
    pub fn acquire(&mut self) -> McsGuard<'_, C> {
        let transport = &self.transport;
        transport.write(QNode::next(self.node), GlobalPtr::NULL);
        transport.write(QNode::locked(self.node), true);

        let pred = transport.fetch_and_op(self.tail, self.node, AtomicOp::Replace);
        if !pred.is_null() {
            transport.write(QNode::next(pred), self.node);
            let mut spin = Spin::new();
            while transport.read(QNode::locked(self.node)) {
                spin.spin();
            }
        }

        McsGuard { lock: self }
    }

    /// Returns `true` if some unit currently holds or waits for the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        !self.transport.read(self.tail).is_null()
    }

    /// Collective: frees the lock.
    pub fn destroy(self) {
        self.transport.barrier();
        unsafe {
            self.transport.dealloc(self.node);
            if self.transport.is_master() {
                self.transport.dealloc(self.tail);
            }
        }
    }

    fn release(&self) {
        let transport = &self.transport;
        let mut succ = transport.read(QNode::next(self.node));
        if succ.is_null() {
            if transport.cas(self.tail, self.node, GlobalPtr::NULL) {
                return;
            }

            // a successor has swapped itself into `tail` but has not linked
            // itself to this node yet
            let mut spin = Spin::new();
            loop {
                succ = transport.read(QNode::next(self.node));
                if !succ.is_null() {
                    break;
                }
                spin.spin();
            }
        }

        transport.write(QNode::locked(succ), false);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// McsGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Releases the lock when dropped.
#[must_use = "the lock is released immediately if the guard is not bound"]
pub struct McsGuard<'a, C: Transport> {
    lock: &'a McsLock<C>,
}

impl<C: Transport> McsGuard<'_, C> {
    /// Releases the lock.
    #[inline]
    pub fn release(self) {}
}

impl<C: Transport> Drop for McsGuard<'_, C> {
    #[inline]
    fn drop(&mut self) {
        self.lock.release();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QNode
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `{ next: GlobalPtr<QNode>, locked: bool }`
pub(crate) struct QNode;

unsafe impl Record for QNode {
    const WORDS: usize = 2;
}

impl QNode {
    #[inline]
    fn next(node: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Self>> {
        node.field(0)
    }

    #[inline]
    fn locked(node: GlobalPtr<Self>) -> GlobalPtr<bool> {
        node.field(1)
    }
}
