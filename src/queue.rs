//! Concurrent FIFO queues over global memory.
//!
//! - [`MsQueue`]: the lock-free two-pointer queue of Michael and Scott.
//! - [`BlockingQueue`]: a two-pointer queue serialized by an
//!   [`McsLock`](crate::lock::McsLock).
//!
//! Both queues keep their `front` and `rear` pointers in a header on the
//! master unit and link [`Node`](crate::stack::Node)s allocated through a
//! reclamation policy.

mod blocking;
mod michael_scott;

use crate::pointer::{GlobalPtr, Record};
use crate::stack::Node;

pub use self::blocking::BlockingQueue;
pub use self::michael_scott::MsQueue;

/// `{ front, rear }`
pub(crate) struct Header<V>(core::marker::PhantomData<V>);

unsafe impl<V: 'static> Record for Header<V> {
    const WORDS: usize = 2;
}

impl<V: 'static> Header<V> {
    #[inline]
    pub(crate) fn front(header: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Node<V>>> {
        header.field(0)
    }

    #[inline]
    pub(crate) fn rear(header: GlobalPtr<Self>) -> GlobalPtr<GlobalPtr<Node<V>>> {
        header.field(1)
    }
}
