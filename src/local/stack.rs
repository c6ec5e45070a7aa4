use core::fmt;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Stack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A singly-linked LIFO stack.
pub struct Stack<T> {
    head: Option<Box<Node<T>>>,
    len: usize,
}

/********** impl inherent *************************************************************************/

impl<T> Stack<T> {
    #[inline]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn push(&mut self, elem: T) {
        let next = self.head.take();
        self.head = Some(Box::new(Node { elem, next }));
        self.len += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.head.take().map(|node| {
            let Node { elem, next } = *node;
            self.head = next;
            self.len -= 1;
            elem
        })
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.elem)
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for Stack<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for Stack<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stack").field("len", &self.len).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for Stack<T> {
    #[inline]
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

struct Node<T> {
    elem: T,
    next: Option<Box<Node<T>>>,
}
