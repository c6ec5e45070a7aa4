//! Memory reclamation and concurrent data structures over a partitioned global
//! address space (PGAS).
//!
//! Memory is split into one segment per *unit* (a process or thread of an
//! SPMD program) and every unit can read, write and atomically update any
//! segment through one-sided remote operations of a [`Transport`].
//! On top of that the crate provides
//!
//! - reclamation policies deciding when an unlinked node may be reused
//!   ([`memory`]),
//! - a distributed MCS queue lock ([`lock`]),
//! - lock-free, elimination-based and blocking stacks ([`stack`]),
//! - lock-free and blocking queues ([`queue`]),
//! - a non-blocking global counter ([`counter`]).
//!
//! Every data structure is constructed and destroyed collectively: all units
//! must call the constructor, which returns only after every unit holds a
//! ready handle.
//! Operations on the handle are independent per unit.
//!
//! The [`shmem`] module provides an in-process transport, where every unit
//! is a thread, which is used by the tests and demos.
//!
//! # Example
//!
//! ```
//! use pgas_reclaim::prelude::*;
//!
//! let popped = World::run(&WorldConfig::new(4), |unit| {
//!     let config = Config::default();
//!     let mut stack = TreiberStack::<u64, HazardPointers, _>::new(&unit, &config).unwrap();
//!     stack.push(unit.unit_id() as u64).unwrap();
//!     unit.barrier();
//!     let popped = stack.pop();
//!     stack.destroy();
//!     popped
//! });
//!
//! assert!(popped.iter().all(Option::is_some));
//! ```

pub mod backoff;
pub mod config;
pub mod counter;
pub mod error;
pub mod local;
pub mod lock;
pub mod memory;
pub mod pointer;
pub mod queue;
pub mod shmem;
pub mod stack;
pub mod stats;
pub mod topology;
pub mod transport;

mod collective;

pub mod prelude {
    //! Re-exports of the most commonly used types and traits.

    pub use crate::config::Config;
    pub use crate::error::Error;
    pub use crate::memory::{FreeList, HazardPointers, Leaking, LocalityAware, Manage, Reclaim};
    pub use crate::queue::{BlockingQueue, MsQueue};
    pub use crate::shmem::{Unit, World, WorldConfig};
    pub use crate::stack::{BlockingStack, EliminationStack, TimestampStack, TreiberStack};
    pub use crate::topology::Topology;
    pub use crate::transport::Transport;
}

pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::pointer::{GlobalPtr, Record, Word};
pub use crate::transport::{Transport, MASTER_UNIT};
