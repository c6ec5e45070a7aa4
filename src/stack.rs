//! Concurrent stacks over global memory.
//!
//! - [`TreiberStack`]: lock-free stack with a single shared `top` pointer.
//! - [`EliminationStack`]: Treiber stack with a node-aware elimination fast
//!   path.
//! - [`TimestampStack`]: per-unit lists ordered by interval timestamps.
//! - [`BlockingStack`]: a stack serialized by an [`McsLock`](crate::lock::McsLock).
//!
//! All constructors and `destroy` are collective, `push` and `pop` are not.

mod blocking;
mod elimination;
mod timestamp;
mod treiber;

use core::marker::PhantomData;

use crate::error::Error;
use crate::memory::Manage;
use crate::pointer::{GlobalPtr, Record, Word};
use crate::transport::Transport;

pub use self::blocking::BlockingStack;
pub use self::elimination::EliminationStack;
pub use self::timestamp::{Timestamp, TimestampStack};
pub use self::treiber::TreiberStack;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A singly-linked node in global memory, `{ next: GlobalPtr<Node<V>>, value: V }`.
///
/// Shared by the stacks and the queues.
pub struct Node<V>(PhantomData<V>);

unsafe impl<V: Word> Record for Node<V> {
    const WORDS: usize = 2;
}

impl<V: Word> Node<V> {
    #[inline]
    pub(crate) fn next(node: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Self>> {
        node.field(0)
    }

    #[inline]
    pub(crate) fn value(node: GlobalPtr<Self>) -> GlobalPtr<V> {
        node.field(1)
    }
}

/// Links `values` on top of the stack at `top` without any synchronization,
/// the last value ends up on top.
pub(crate) fn prefill<V, M, C>(
    transport: &C,
    manager: &mut M,
    top: GlobalPtr<GlobalPtr<Node<V>>>,
    values: impl IntoIterator<Item = V>,
) -> Result<(), Error>
where
    V: Word,
    M: Manage<Node<V>, C>,
    C: Transport,
{
    for value in values {
        let node = manager.allocate()?;
        transport.write(Node::value(node), value);
        transport.write(Node::next(node), transport.read(top));
        transport.write(top, node);
    }

    Ok(())
}

/// Returns the values of all nodes reachable from `top`, `top` first.
pub(crate) fn walk<V: Word, C: Transport>(transport: &C, top: GlobalPtr<Node<V>>) -> Vec<V> {
    let mut values = Vec::new();
    let mut curr = top;
    while !curr.is_null() {
        values.push(transport.read(Node::value(curr)));
        curr = transport.read(Node::next(curr));
    }

    values
}
