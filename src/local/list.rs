use core::fmt;
use core::iter::FromIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

////////////////////////////////////////////////////////////////////////////////////////////////////
// List
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A singly-linked FIFO list with O(1) append and O(1) removal at the front.
pub struct List<T> {
    head: Option<Box<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
    len: usize,
}

/********** impl Send *****************************************************************************/

unsafe impl<T: Send> Send for List<T> {}

/********** impl inherent *************************************************************************/

impl<T> List<T> {
    /// Creates a new empty list.
    #[inline]
    pub const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    /// Returns the number of elements in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `elem` at the back of the list.
    #[inline]
    pub fn insert(&mut self, elem: T) {
        let mut node = Box::new(Node { elem, next: None });
        let raw = NonNull::from(&mut *node);
        match self.tail {
            // safety: `tail` always points at the last node owned by `head`
            Some(mut tail) => unsafe { tail.as_mut().next = Some(node) },
            None => self.head = Some(node),
        }

        self.tail = Some(raw);
        self.len += 1;
    }

    /// Removes and returns the element at the front of the list.
    #[inline]
    pub fn remove_front(&mut self) -> Option<T> {
        self.head.take().map(|node| {
            let Node { elem, next } = *node;
            self.head = next;
            if self.head.is_none() {
                self.tail = None;
            }

            self.len -= 1;
            elem
        })
    }

    /// Replaces the contents of `self` with those of `other`, leaving `other`
    /// empty.
    ///
    /// The previous contents of `self` are dropped.
    #[inline]
    pub fn assign(&mut self, other: &mut Self) {
        self.clear();
        self.head = other.head.take();
        self.tail = other.tail.take();
        self.len = other.len;
        other.len = 0;
    }

    /// Removes all elements.
    #[inline]
    pub fn clear(&mut self) {
        while self.remove_front().is_some() {}
    }

    /// Returns an iterator over the elements, front to back.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { curr: self.head.as_deref(), _marker: PhantomData }
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for List<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug> fmt::Debug for List<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for List<T> {
    #[inline]
    fn drop(&mut self) {
        // iterative, a recursive drop of long lists would overflow the stack
        self.clear();
    }
}

/********** impl FromIterator *********************************************************************/

impl<T> FromIterator<T> for List<T> {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        for elem in iter {
            list.insert(elem);
        }

        list
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct Iter<'a, T> {
    curr: Option<&'a Node<T>>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.curr.map(|node| {
            self.curr = node.next.as_deref();
            &node.elem
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T> {
    elem: T,
    next: Option<Box<Node<T>>>,
}

#[cfg(test)]
mod tests {
    use super::List;

    #[test]
    fn fifo_order() {
        let mut list = List::new();
        assert!(list.is_empty());
        list.insert(1);
        list.insert(2);
        list.insert(3);
        assert_eq!(list.len(), 3);
        assert_eq!(list.remove_front(), Some(1));
        assert_eq!(list.remove_front(), Some(2));
        list.insert(4);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(list.remove_front(), Some(3));
        assert_eq!(list.remove_front(), Some(4));
        assert_eq!(list.remove_front(), None);
        assert!(list.is_empty());

        // the tail must be reset once the list runs empty
        list.insert(5);
        assert_eq!(list.remove_front(), Some(5));
    }

    #[test]
    fn assign_splices_and_clears() {
        let mut retired: List<u32> = (0..4).collect();
        let mut kept: List<u32> = vec![7, 9].into_iter().collect();

        retired.assign(&mut kept);
        assert!(kept.is_empty());
        assert_eq!(retired.len(), 2);
        retired.insert(11);
        assert_eq!(retired.iter().copied().collect::<Vec<_>>(), vec![7, 9, 11]);

        kept.insert(1);
        assert_eq!(kept.remove_front(), Some(1));
    }

    #[test]
    fn long_list_drops() {
        let list: List<usize> = (0..200_000).collect();
        assert_eq!(list.len(), 200_000);
        drop(list);
    }
}
