//! Location-independent handles into the partitioned global address space.

use core::cmp;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Number of bits reserved for the word offset of a [`GlobalPtr`].
const OFFSET_BITS: u32 = 40;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// The largest unit id that can be encoded in a [`GlobalPtr`].
///
/// The two most significant bits of an encoded pointer are always clear.
pub const MAX_UNITS: usize = (1 << (61 - OFFSET_BITS)) - 1;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Word (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A value that fits into a single word of global memory and can therefore be
/// the target of a remote atomic operation.
pub trait Word: Copy + Send + 'static {
    /// Encodes the value as a raw word.
    fn into_word(self) -> u64;
    /// Decodes a value from a raw word previously produced by `into_word`.
    fn from_word(word: u64) -> Self;
}

macro_rules! impl_word_for_int {
    ($($ty:ty),*) => {
        $(
            impl Word for $ty {
                #[inline]
                fn into_word(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_word(word: u64) -> Self {
                    word as $ty
                }
            }

            unsafe impl Record for $ty {
                const WORDS: usize = 1;
            }
        )*
    };
}

impl_word_for_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/********** impl Word (bool) **********************************************************************/

impl Word for bool {
    #[inline]
    fn into_word(self) -> u64 {
        self as u64
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        word != 0
    }
}

unsafe impl Record for bool {
    const WORDS: usize = 1;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Record (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A fixed-size record laid out as consecutive words of global memory.
///
/// # Safety
///
/// `WORDS` must be at least one and must cover every field index that is ever
/// addressed through [`GlobalPtr::field`].
pub unsafe trait Record: 'static {
    /// The number of words occupied by one instance of the record.
    const WORDS: usize;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// GlobalPtr
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A typed pointer to a record residing in the segment of an arbitrary unit.
///
/// The pointer is packed into a single word, `(unit + 1) << 40 | offset`, so
/// it can itself be stored in global memory and be swapped atomically.
/// The all-zero word is the distinguished `null` pointer, which means freshly
/// allocated (zeroed) memory holds only null pointers.
/// There is no implicit dereferencing: every access goes through a
/// [`Transport`](crate::transport::Transport).
pub struct GlobalPtr<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

/********** impl inherent (const) *****************************************************************/

impl<T> GlobalPtr<T> {
    /// The `null` pointer.
    pub const NULL: Self = Self { raw: 0, _marker: PhantomData };

    /// Creates a new pointer to word `offset` in the segment of `unit`.
    ///
    /// # Panics
    ///
    /// Panics if `unit` or `offset` can not be encoded.
    #[inline]
    pub fn new(unit: usize, offset: usize) -> Self {
        assert!(unit <= MAX_UNITS, "unit id {} exceeds the encodable maximum", unit);
        assert!((offset as u64) <= OFFSET_MASK, "offset {} exceeds the encodable maximum", offset);
        Self { raw: ((unit as u64 + 1) << OFFSET_BITS) | offset as u64, _marker: PhantomData }
    }

    /// Creates a pointer from its raw (packed) representation.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self { raw, _marker: PhantomData }
    }

    /// Returns the raw (packed) representation.
    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.raw
    }

    /// Returns `true` if the pointer is `null`.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.raw == 0
    }

    /// Returns the id of the unit owning the pointed-to segment.
    ///
    /// The result is meaningless for `null` pointers.
    #[inline]
    pub const fn unit(self) -> usize {
        ((self.raw >> OFFSET_BITS) as usize).wrapping_sub(1)
    }

    /// Returns the word offset into the owning unit's segment.
    #[inline]
    pub const fn offset(self) -> usize {
        (self.raw & OFFSET_MASK) as usize
    }

    /// Reinterprets the pointer as pointing to a value of type `U`.
    #[inline]
    pub const fn cast<U>(self) -> GlobalPtr<U> {
        GlobalPtr { raw: self.raw, _marker: PhantomData }
    }

    /// Returns `None` for `null` pointers.
    #[inline]
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

/********** impl inherent *************************************************************************/

impl<T: Record> GlobalPtr<T> {
    /// The element size in words.
    pub const ELEMENT_WORDS: usize = T::WORDS;

    /// Returns a pointer to the `index`-th record following `self`.
    #[inline]
    pub fn add(self, index: usize) -> Self {
        debug_assert!(!self.is_null());
        Self::new(self.unit(), self.offset() + index * T::WORDS)
    }

    /// Returns a pointer to the word-sized field at word `index` of the record.
    #[inline]
    pub fn field<F: Word>(self, index: usize) -> GlobalPtr<F> {
        debug_assert!(!self.is_null());
        debug_assert!(index < T::WORDS);
        GlobalPtr::new(self.unit(), self.offset() + index)
    }

    /// Returns a pointer to the word immediately preceding the record.
    #[inline]
    pub(crate) fn prefix<F: Word>(self) -> GlobalPtr<F> {
        debug_assert!(self.offset() > 0);
        GlobalPtr::new(self.unit(), self.offset() - 1)
    }
}

/********** impl Word *****************************************************************************/

impl<T: 'static> Word for GlobalPtr<T> {
    #[inline]
    fn into_word(self) -> u64 {
        self.raw
    }

    #[inline]
    fn from_word(word: u64) -> Self {
        Self::from_raw(word)
    }
}

unsafe impl<T: 'static> Record for GlobalPtr<T> {
    const WORDS: usize = 1;
}

/********** impl Clone ****************************************************************************/

impl<T> Clone for GlobalPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

/********** impl Copy *****************************************************************************/

impl<T> Copy for GlobalPtr<T> {}

/********** impl Default **************************************************************************/

impl<T> Default for GlobalPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::NULL
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for GlobalPtr<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            f.write_str("GlobalPtr(null)")
        } else {
            f.debug_struct("GlobalPtr")
                .field("unit", &self.unit())
                .field("offset", &self.offset())
                .finish()
        }
    }
}

/********** impl PartialEq ************************************************************************/

impl<T> cmp::PartialEq for GlobalPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/********** impl Eq *******************************************************************************/

impl<T> cmp::Eq for GlobalPtr<T> {}

/********** impl PartialOrd ***********************************************************************/

impl<T> cmp::PartialOrd for GlobalPtr<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/********** impl Ord ******************************************************************************/

impl<T> cmp::Ord for GlobalPtr<T> {
    // the packed layout places the unit above the offset, so comparing the raw
    // words orders by (unit, offset)
    #[inline]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

/********** impl Hash *****************************************************************************/

impl<T> Hash for GlobalPtr<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_zero() {
        let null = GlobalPtr::<u64>::NULL;
        assert!(null.is_null());
        assert_eq!(null.into_raw(), 0);
        assert_eq!(GlobalPtr::<u64>::from_word(0), null);
    }

    #[test]
    fn unit_zero_offset_zero_is_not_null() {
        let ptr = GlobalPtr::<u64>::new(0, 0);
        assert!(!ptr.is_null());
        assert_eq!(ptr.unit(), 0);
        assert_eq!(ptr.offset(), 0);
    }

    #[test]
    fn ordering_is_unit_major() {
        let a = GlobalPtr::<u64>::new(0, 1_000);
        let b = GlobalPtr::<u64>::new(1, 0);
        let c = GlobalPtr::<u64>::new(1, 8);
        assert!(a < b);
        assert!(b < c);
    }

    struct Pair;

    unsafe impl Record for Pair {
        const WORDS: usize = 2;
    }

    #[test]
    fn record_arithmetic() {
        let base = GlobalPtr::<Pair>::new(3, 10);
        assert_eq!(base.add(2).offset(), 14);
        assert_eq!(base.field::<u64>(1).offset(), 11);
        assert_eq!(base.field::<u64>(1).unit(), 3);
        assert_eq!(base.prefix::<bool>().offset(), 9);
    }
}
