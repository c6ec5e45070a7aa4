//! Unit-local bookkeeping containers used by the reclamation managers.
//!
//! None of these types ever touches global memory, they only hold global
//! pointers as plain values.

mod list;
mod sort;
mod stack;

pub use self::list::{Iter, List};
pub use self::sort::{binary_search, heap_sort, remove_duplicates};
pub use self::stack::Stack;
