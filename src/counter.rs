//! A non-blocking global counter.

use crate::collective;
use crate::error::Error;
use crate::pointer::GlobalPtr;
use crate::transport::{AtomicOp, Transport, MASTER_UNIT};

/// The unit hosting the counter word a unit increments.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Placement {
    /// All units share a single word on the master unit.
    Master,
    /// Every unit increments the word hosted by its right neighbour
    /// `(unit + 1) % unit_count`, spreading the contention.
    Neighbor,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Counter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A counter incremented by a single remote fetch-and-add.
///
/// Every counter word starts at 1.
pub struct Counter<C> {
    transport: C,
    own: GlobalPtr<u64>,
    target: GlobalPtr<u64>,
}

/********** impl inherent *************************************************************************/

impl<C: Transport> Counter<C> {
    /// Collective: creates a new counter.
    pub fn new(transport: &C, placement: Placement) -> Result<Self, Error> {
        transport.barrier();
        let local = transport.alloc::<u64>(1).map(|own| {
            transport.write(own, 1);
            own
        });
        let own = collective::settle(transport, local, |own| unsafe { transport.dealloc(own) })?;

        let words = transport.all_gather(own);
        let target = match placement {
            Placement::Master => words[MASTER_UNIT],
            Placement::Neighbor => words[(transport.unit_id() + 1) % transport.unit_count()],
        };

        transport.barrier();
        tracing::debug!(unit = transport.unit_id(), ?placement, "counter created");
        Ok(Self { transport: transport.clone(), own, target })
    }

    /// Increments the counter and returns its previous value.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.transport.fetch_and_op(self.target, 1, AtomicOp::Add)
    }

    /// Returns the current value of the word this unit increments.
    #[inline]
    pub fn load(&self) -> u64 {
        self.transport.read(self.target)
    }

    /// Collective: frees the counter.
    pub fn destroy(self) {
        self.transport.barrier();
        unsafe { self.transport.dealloc(self.own) };
    }
}
