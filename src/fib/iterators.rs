use super::{dead_node, Cursor, Fib, FibNode, NodeId, Slot};

//------------ FibIter -------------------------------------------------------

/// A borrowing iterator over all nodes of a FIB.
pub struct FibIter<'a, T> {
    fib: &'a Fib<T>,
    bucket: usize,
    next: Option<NodeId>,
}

impl<'a, T> FibIter<'a, T> {
    pub(super) fn new(fib: &'a Fib<T>) -> Self {
        Self {
            fib,
            bucket: 0,
            next: fib.buckets.first().copied().flatten(),
        }
    }
}

impl<'a, T> Iterator for FibIter<'a, T> {
    type Item = (NodeId, &'a FibNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.next {
                let node = self.fib.node(id);
                self.next = node.next;
                return Some((id, node));
            }
            self.bucket += 1;
            self.next = *self.fib.buckets.get(self.bucket)?;
        }
    }
}

//------------ FibIterator ---------------------------------------------------

/// A resumable iterator over a FIB.
///
/// The iterator is a handle to a cursor that lives inside the FIB, so that
/// the FIB can fix it up when nodes are deleted or the table is rehashed.
/// It is handed back with [`Fib::iter_release`].
#[derive(Debug)]
pub struct FibIterator {
    slot: usize,
}

impl<T> Fib<T> {
    pub fn iter_init(&mut self) -> FibIterator {
        let cursor = Cursor {
            bucket: 0,
            next: self.buckets.first().copied().flatten(),
        };
        self.live_iterators += 1;
        if let Some(slot) = self.cursors.iter().position(Option::is_none) {
            if let Some(c) = self.cursors.get_mut(slot) {
                *c = Some(cursor);
            }
            return FibIterator { slot };
        }
        self.cursors.push(Some(cursor));
        FibIterator {
            slot: self.cursors.len() - 1,
        }
    }

    /// Return the next node, or `None` once the iterator has passed the
    /// last bucket. Nodes added behind the position of the iterator are
    /// not returned.
    pub fn iter_next(&mut self, it: &mut FibIterator) -> Option<NodeId> {
        let cursor = match self.cursors.get_mut(it.slot) {
            Some(Some(cursor)) => cursor,
            _ => released_iterator(),
        };
        loop {
            if let Some(id) = cursor.next {
                cursor.next = match self.slots.get(id.index()) {
                    Some(Slot::Occupied(node)) => node.next,
                    _ => dead_node(id),
                };
                return Some(id);
            }
            if cursor.bucket + 1 >= self.buckets.len() {
                cursor.bucket = self.buckets.len();
                return None;
            }
            cursor.bucket += 1;
            cursor.next = self.buckets.get(cursor.bucket).copied().flatten();
        }
    }

    pub fn iter_release(&mut self, it: FibIterator) {
        match self.cursors.get_mut(it.slot) {
            Some(c @ Some(_)) => *c = None,
            _ => released_iterator(),
        }
        self.live_iterators -= 1;
    }

    pub fn live_iterators(&self) -> usize {
        self.live_iterators
    }
}

#[allow(clippy::panic)]
fn released_iterator() -> ! {
    panic!("fib: use of a released iterator")
}
