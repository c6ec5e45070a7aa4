use crate::backoff::Backoff;
use crate::collective;
use crate::config::{BackoffConfig, Config};
use crate::error::Error;
use crate::memory::{Manage, Reclaim};
use crate::pointer::{GlobalPtr, Word};
use crate::stack::{self, Node};
use crate::stats::{self, Event};
use crate::transport::Transport;

type Manager<V, R, C> = <R as Reclaim>::Manager<Node<V>, C>;

////////////////////////////////////////////////////////////////////////////////////////////////////
// TreiberStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free stack with a single `top` pointer on the master unit.
///
/// `push` and `pop` linearize at their successful compare-and-swap on `top`.
/// Nodes are allocated from and released to the calling unit's reclamation
/// manager `R`.
pub struct TreiberStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    transport: C,
    top: GlobalPtr<GlobalPtr<Node<V>>>,
    manager: Manager<V, R, C>,
    backoff: BackoffConfig,
}

/********** impl inherent *************************************************************************/

impl<V, R, C> TreiberStack<V, R, C>
where
    V: Word,
    R: Reclaim,
    C: Transport,
{
    const PROTECTS: bool = <Manager<V, R, C> as Manage<Node<V>, C>>::PROTECTS;

    /// Collective: creates a new empty stack.
    #[inline]
    pub fn new(transport: &C, config: &Config) -> Result<Self, Error> {
        Self::with_values(transport, config, core::iter::empty())
    }

    /// Collective: creates a new stack holding the `values` supplied by the
    /// master unit, the last one on top.
    ///
    /// The values supplied by all other units are ignored.
    pub fn with_values(
        transport: &C,
        config: &Config,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, Error> {
        config.validate()?;
        transport.barrier();

        let top = collective::share::<_, GlobalPtr<Node<V>>>(transport, 1, |_| {})?;
        let manager = match <Manager<V, R, C> as Manage<_, _>>::build(transport, &config.reclaim) {
            Ok(manager) => manager,
            Err(err) => {
                if transport.is_master() {
                    unsafe { transport.dealloc(top) };
                }
                return Err(err);
            }
        };

        let mut stack =
            Self { transport: transport.clone(), top, manager, backoff: config.backoff };

        let filled = if transport.is_master() {
            stack::prefill(transport, &mut stack.manager, top, values)
        } else {
            Ok(())
        };

        if let Err(err) = collective::settle(transport, filled, |_| {}) {
            stack.destroy();
            return Err(err);
        }

        transport.barrier();
        tracing::debug!(unit = transport.unit_id(), policy = R::NAME, "treiber stack created");
        Ok(stack)
    }

    /// Pushes `value` onto the stack.
    ///
    /// Fails only if the calling unit's manager has no node left.
    pub fn push(&mut self, value: V) -> Result<(), Error> {
        let node = self.manager.allocate()?;
        self.transport.write(Node::value(node), value);

        let mut backoff = Backoff::from_config(&self.backoff);
        loop {
            let top = self.transport.read(self.top);
            self.transport.write(Node::next(node), top);
            if self.transport.cas(self.top, top, node) {
                stats::record(Event::CasSuccess);
                return Ok(());
            }

            stats::record(Event::CasFailure);
            backoff.delay_linear();
        }
    }

    /// Pops the value on top of the stack, or returns `None` if it is empty.
    pub fn pop(&mut self) -> Option<V> {
        let mut backoff = Backoff::from_config(&self.backoff);
        loop {
            let top = self.transport.read(self.top);
            if top.is_null() {
                self.manager.clear(0);
                return None;
            }

            if Self::PROTECTS {
                self.manager.protect(0, top);
                if self.transport.read(self.top) != top {
                    continue;
                }
            }

            let next = self.transport.read(Node::next(top));
            let value = self.transport.read(Node::value(top));
            if self.transport.cas(self.top, top, next) {
                stats::record(Event::CasSuccess);
                self.manager.clear(0);
                // safety: the node has just been unlinked by this unit
                unsafe { self.manager.release(top) };
                return Some(value);
            }

            stats::record(Event::CasFailure);
            backoff.delay_linear();
        }
    }

    /// Returns `true` if the stack was empty at the time of the call.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transport.read(self.top).is_null()
    }

    /// Returns the calling unit's reclamation manager.
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

    /// Collective: frees the stack and every node allocated by any unit.
    pub fn destroy(self) {
        self.transport.barrier();
        if self.transport.is_master() {
            unsafe { self.transport.dealloc(self.top) };
        }

        self.manager.destroy();
        tracing::debug!(unit = self.transport.unit_id(), "treiber stack destroyed");
    }
}
