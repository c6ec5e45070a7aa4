//! The error type shared by all collective constructors and allocating
//! operations.

pub use crate::config::ConfigError;

/// Errors reported by data structures and reclamation managers.
///
/// Contention is never surfaced as an error and an empty structure is not an
/// error either (`pop` and `dequeue` return `None`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The arena and every free list are empty, the structure is full.
    #[error("arena exhausted, no reclaimable slot available")]
    Exhausted,
    /// A unit segment can not satisfy an allocation request.
    #[error(
        "segment of unit {unit} out of memory \
         ({requested} words requested, {available} available)"
    )]
    OutOfMemory {
        /// The unit whose segment was asked for memory.
        unit: usize,
        /// The number of words requested.
        requested: usize,
        /// The largest contiguous number of words still free.
        available: usize,
    },
    /// Invalid configuration supplied to a constructor.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Another unit failed during a collective construction.
    #[error("collective construction failed on unit {0}")]
    Collective(usize),
}

impl Error {
    /// Returns `true` if the error signals a full structure.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::Exhausted)
    }
}
