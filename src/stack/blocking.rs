use crate::collective;
use crate::config::Config;
use crate::error::Error;
use crate::lock::McsLock;
use crate::memory::{Manage, Reclaim};
use crate::pointer::{GlobalPtr, Word};
use crate::stack::{self, Node};
use crate::transport::{AtomicOp, Transport};

type Manager<V, R, C> = <R as Reclaim>::Manager<Node<V>, C>;

////////////////////////////////////////////////////////////////////////////////////////////////////
// BlockingStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A stack whose `top` pointer is only ever modified while holding an
/// [`McsLock`].
///
/// No node is ever read outside of the lock once it is linked, so every
/// reclamation policy (including [`FreeList`](crate::memory::FreeList)) is
/// safe to use.
pub struct BlockingStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    transport: C,
    top: GlobalPtr<GlobalPtr<Node<V>>>,
    lock: McsLock<C>,
    manager: Manager<V, R, C>,
}

/********** impl inherent *************************************************************************/

impl<V, R, C> BlockingStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    /// Collective: creates a new empty stack.
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        let top = collective::share::<_, GlobalPtr<Node<V>>>(transport, 1, |_| {})?;
        let free_top = || {
            if transport.is_master() {
                unsafe { transport.dealloc(top) };
            }
        };

        let lock = McsLock::new(transport).map_err(|err| {
            free_top();
            err
        })?;

        let manager = match <Manager<V, R, C> as Manage<_, _>>::build(transport, &config.reclaim) {
            Ok(manager) => manager,
            Err(err) => {
                lock.destroy();
                free_top();
                return Err(err);
            }
        };

        transport.barrier();
        tracing::debug!(unit = transport.unit_id(), policy = R::NAME, "blocking stack created");
        Ok(Self { transport: transport.clone(), top, lock, manager })
    }

    /// Pushes `value` onto the stack.
    pub fn push(&mut self, value: V) -> Result<(), Error> {
        let node = self.manager.allocate()?;
        self.transport.write(Node::value(node), value);

        let _guard = self.lock.acquire();
        let top = self.transport.fetch_and_op(self.top, node, AtomicOp::Replace);
        self.transport.write(Node::next(node), top);

        Ok(())
    }

    /// Pops the value on top of the stack, or returns `None` if it is empty.
    pub fn pop(&mut self) -> Option<V> {
        let (node, value) = {
            let _guard = self.lock.acquire();
            let top = self.transport.read(self.top);
            if top.is_null() {
                return None;
            }

            let next = self.transport.read(Node::next(top));
            self.transport.write(self.top, next);
            (top, self.transport.read(Node::value(top)))
        };

        // safety: the node was unlinked under the lock
        unsafe { self.manager.release(node) };
        Some(value)
    }

    #[inline]
    pub fn manager(&self) -> &Manager<V, R, C> {
        &self.manager
    }

    /// Collective: returns all values currently in the stack, top first.
    pub fn snapshot(&self) -> Vec<V> {
        self.transport.barrier();
        let values = stack::walk(&self.transport, self.transport.read(self.top));
        self.transport.barrier();
        values
    }

    /// Collective: frees the stack, its lock and every node allocated by any
    /// unit.
    pub fn destroy(self) {
        self.transport.barrier();
        if self.transport.is_master() {
            unsafe { self.transport.dealloc(self.top) };
        }

        self.lock.destroy();
        self.manager.destroy();
        tracing::debug!(unit = self.transport.unit_id(), "blocking stack destroyed");
    }
}
