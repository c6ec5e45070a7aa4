use crate::backoff::Backoff;
use crate::collective;
use crate::config::{BackoffConfig, Config};
use crate::error::Error;
use crate::memory::{Manage, Reclaim};
use crate::pointer::{GlobalPtr, Word};
use crate::queue::Header;
use crate::stack::{self, Node};
use crate::stats::{self, Event};
use crate::transport::Transport;

type Manager<V, R, C> = <R as Reclaim>::Manager<Node<V>, C>;

const HAZARD_FRONT: usize = 0;
const HAZARD_NEXT: usize = 1;
const HAZARD_REAR: usize = 0;

////////////////////////////////////////////////////////////////////////////////////////////////////
// MsQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The lock-free Michael-Scott queue.
///
/// `front` always points to a dummy node whose successor holds the oldest
/// value.
/// `rear` points to the last or the second to last node, an enqueuer that
/// finds it lagging behind advances it before linking its own node.
pub struct MsQueue<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    transport: C,
    header: GlobalPtr<Header<V>>,
    manager: Manager<V, R, C>,
    backoff: BackoffConfig,
}

/********** impl inherent *************************************************************************/

impl<V, R, C> MsQueue<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    const PROTECTS: bool = <Manager<V, R, C> as Manage<Node<V>, C>>::PROTECTS;

    /// Collective: creates a new empty queue.
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        let header = collective::share::<_, Header<V>>(transport, 1, |_| {})?;
        let mut manager =
            match <Manager<V, R, C> as Manage<_, _>>::build(transport, &config.reclaim) {
                Ok(manager) => manager,
                Err(err) => {
                    if transport.is_master() {
                        unsafe { transport.dealloc(header) };
                    }
                    return Err(err);
                }
            };

        let dummy = if transport.is_master() {
            manager.allocate().map(|dummy| {
                transport.write(Node::next(dummy), GlobalPtr::NULL);
                transport.write(Header::front(header), dummy);
                transport.write(Header::rear(header), dummy);
            })
        } else {
            Ok(())
        };

        let queue = Self { transport: transport.clone(), header, manager, backoff: config.backoff };
        if let Err(err) = collective::settle(transport, dummy, |_| {}) {
            queue.destroy();
            return Err(err);
        }

        transport.barrier();
        tracing::debug!(
            unit = transport.unit_id(),
            policy = R::NAME,
            "michael-scott queue created"
        );
        Ok(queue)
    }

    /// Appends `value` at the rear of the queue.
    pub fn enqueue(&mut self, value: V) -> Result<(), Error> {
        let node = self.manager.allocate()?;
        self.transport.write(Node::next(node), GlobalPtr::NULL);
        self.transport.write(Node::value(node), value);

        let rear = Header::rear(self.header);
        let mut backoff = Backoff::from_config(&self.backoff);
        let last = loop {
            let last = self.transport.read(rear);
            if Self::PROTECTS {
                self.manager.protect(HAZARD_REAR, last);
            }

            if self.transport.read(rear) != last {
                continue;
            }

            let next = self.transport.read(Node::next(last));
            if next.is_null() {
                if self.transport.cas(Node::next(last), GlobalPtr::NULL, node) {
                    stats::record(Event::CasSuccess);
                    break last;
                }

                stats::record(Event::CasFailure);
                backoff.delay_linear();
            } else {
                // another enqueuer has linked its node but not yet swung `rear`
                self.transport.cas(rear, last, next);
            }
        };

        self.transport.cas(rear, last, node);
        self.manager.clear(HAZARD_REAR);
        Ok(())
    }

    /// Removes the value at the front of the queue, or returns `None` if it
    /// is empty.
    pub fn dequeue(&mut self) -> Option<V> {
        let (front, rear) = (Header::front(self.header), Header::rear(self.header));
        let mut backoff = Backoff::from_config(&self.backoff);
        loop {
            let first = self.transport.read(front);
            if Self::PROTECTS {
                self.manager.protect(HAZARD_FRONT, first);
                if self.transport.read(front) != first {
                    continue;
                }
            }

            let last = self.transport.read(rear);
            let next = self.transport.read(Node::next(first));
            if Self::PROTECTS {
                self.manager.protect(HAZARD_NEXT, next);
            }

            if self.transport.read(front) != first {
                continue;
            }

            if next.is_null() {
                self.clear();
                return None;
            }

            if first == last {
                // `rear` is lagging behind
                self.transport.cas(rear, last, next);
                continue;
            }

            // the value must be read before `front` moves on, afterwards
            // `next` becomes the dummy and may be released by another dequeue
            let value = self.transport.read(Node::value(next));
            if self.transport.cas(front, first, next) {
                stats::record(Event::CasSuccess);
                self.clear();
                // safety: `first` has just been unlinked by this unit
                unsafe { self.manager.release(first) };
                return Some(value);
            }

            stats::record(Event::CasFailure);
            backoff.delay_linear();
        }
    }

    /// Returns `true` if the queue was empty at the time of the call.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let first = self.transport.read(Header::front(self.header));
        self.transport.read(Node::next(first)).is_null()
    }

    #[inline]
    pub fn manager(&self) -> &Manager<V, R, C> {
        &self.manager
    }

    /// Collective: returns all values currently in the queue, front first.
    pub fn snapshot(&self) -> Vec<V> {
        self.transport.barrier();
        let dummy = self.transport.read(Header::front(self.header));
        let values = stack::walk(&self.transport, self.transport.read(Node::next(dummy)));
        self.transport.barrier();
        values
    }

    /// Collective: frees the queue and every node allocated by any unit.
    pub fn destroy(self) {
        self.transport.barrier();
        if self.transport.is_master() {
            unsafe { self.transport.dealloc(self.header) };
        }

        self.manager.destroy();
        tracing::debug!(unit = self.transport.unit_id(), "michael-scott queue destroyed");
    }

    #[inline]
    fn clear(&mut self) {
        self.manager.clear(HAZARD_FRONT);
        self.manager.clear(HAZARD_NEXT);
    }
}
