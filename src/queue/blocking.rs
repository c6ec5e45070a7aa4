use crate::collective;
use crate::config::Config;
use crate::error::Error;
use crate::lock::McsLock;
use crate::memory::{Manage, Reclaim};
use crate::pointer::{GlobalPtr, Word};
use crate::queue::Header;
use crate::stack::{self, Node};
use crate::transport::Transport;

type Manager<V, R, C> = <R as Reclaim>::Manager<Node<V>, C>;

////////////////////////////////////////////////////////////////////////////////////////////////////
// BlockingQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A queue without a dummy node whose `front` and `rear` pointers are only
/// ever accessed while holding an [`McsLock`].
pub struct BlockingQueue<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    transport: C,
    header: GlobalPtr<Header<V>>,
    lock: McsLock<C>,
    manager: Manager<V, R, C>,
}

/********** impl inherent *************************************************************************/

impl<V, R, C> BlockingQueue<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    /// Collective: creates a new empty queue.
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        let header = collective::share::<_, Header<V>>(transport, 1, |_| {})?;
        let free_header = || {
            if transport.is_master() {
                unsafe { transport.dealloc(header) };
            }
        };

        let lock = McsLock::new(transport).map_err(|err| {
            free_header();
            err
        })?;

        let manager = match <Manager<V, R, C> as Manage<_, _>>::build(transport, &config.reclaim) {
            Ok(manager) => manager,
            Err(err) => {
                lock.destroy();
                free_header();
                return Err(err);
            }
        };

        transport.barrier();
        tracing::debug!(unit = transport.unit_id(), policy = R::NAME, "blocking queue created");
        Ok(Self { transport: transport.clone(), header, lock, manager })
    }

    /// Appends `value` at the rear of the queue.
    pub fn enqueue(&mut self, value: V) -> Result<(), Error> {
        let node = self.manager.allocate()?;
        self.transport.write(Node::next(node), GlobalPtr::NULL);
        self.transport.write(Node::value(node), value);

        let (front, rear) = (Header::front(self.header), Header::rear(self.header));
        let _guard = self.lock.acquire();
        let last = self.transport.read(rear);
        if last.is_null() {
            self.transport.write(front, node);
        } else {
            self.transport.write(Node::next(last), node);
        }
        self.transport.write(rear, node);

        Ok(())
    }

    /// Removes the value at the front of the queue, or returns `None` if it
    /// is empty.
    pub fn dequeue(&mut self) -> Option<V> {
        let (front, rear) = (Header::front(self.header), Header::rear(self.header));
        let (node, value) = {
            let _guard = self.lock.acquire();
            let first = self.transport.read(front);
            if first.is_null() {
                return None;
            }

            let next = self.transport.read(Node::next(first));
            self.transport.write(front, next);
            if next.is_null() {
                self.transport.write(rear, GlobalPtr::NULL);
            }

            (first, self.transport.read(Node::value(first)))
        };

        // safety: the node was unlinked under the lock
        unsafe { self.manager.release(node) };
        Some(value)
    }

    #[inline]
    pub fn manager(&self) -> &Manager<V, R, C> {
        &self.manager
    }

    /// Collective: returns all values currently in the queue, front first.
    pub fn snapshot(&self) -> Vec<V> {
        self.transport.barrier();
        let values = stack::walk(&self.transport, self.transport.read(Header::front(self.header)));
        self.transport.barrier();
        values
    }

    /// Collective: frees the queue, its lock and every node allocated by any
    /// unit.
    pub fn destroy(self) {
        self.transport.barrier();
        if self.transport.is_master() {
            unsafe { self.transport.dealloc(self.header) };
        }

        self.lock.destroy();
        self.manager.destroy();
        tracing::debug!(unit = self.transport.unit_id(), "blocking queue destroyed");
    }
}
