//! A hash table of networks.
//!
//! The FIB maps networks to nodes carrying a payload. Nodes live in a slab
//! and are addressed by a [`NodeId`] that stays valid until the node is
//! deleted, no matter how often the table is rehashed. Nodes with the same
//! bucket hash are chained, and chains are kept sorted by the full hash
//! value. Buckets take the top bits of the hash, so walking the buckets in
//! order visits the nodes in the same order whatever the size of the table.
//!
//! Besides plain borrowing iteration, the FIB supports resumable iteration
//! with a [`FibIterator`]: a cursor registered with the table, that can be
//! advanced a few nodes at a time while the table is modified in between.
//! Deleting a node that a cursor points at moves the cursor on to the next
//! node, and rehashing moves cursors to the same position in the new
//! buckets.
mod iterators;

pub use iterators::{FibIter, FibIterator};

use std::fmt;

use log::debug;

use crate::types::net::Net;

/// The order of a table that is created with [`Fib::with_default_order`].
pub const DEFAULT_ORDER: u32 = 10;
const MIN_ORDER: u32 = 4;
const MAX_ORDER: u32 = 24;
const HASH_MULT: u32 = 0x9e37_79b9;
/// Grow when there are more than this many entries per bucket on average.
const HIGH_MARK: usize = 4;
/// Shrink when there is less than one entry in this many buckets.
const LOW_MARK: usize = 16;
/// The number of orders to grow or shrink at once.
const STEP: u32 = 2;

//------------ NodeId --------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

//------------ FibNode -------------------------------------------------------

#[derive(Debug)]
pub struct FibNode<T> {
    net: Net,
    hash: u32,
    next: Option<NodeId>,
    data: T,
}

impl<T> FibNode<T> {
    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied(FibNode<T>),
    Vacant,
}

//------------ Cursor --------------------------------------------------------

/// The state of a registered iterator: the bucket it is in, and the node
/// it returns next.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    bucket: usize,
    next: Option<NodeId>,
}

//------------ Fib -----------------------------------------------------------

pub struct Fib<T> {
    slots: Vec<Slot<T>>,
    free: Vec<NodeId>,
    buckets: Vec<Option<NodeId>>,
    order: u32,
    min_order: u32,
    entries: usize,
    cursors: Vec<Option<Cursor>>,
    live_iterators: usize,
    init: fn(&Net) -> T,
}

impl<T> Fib<T> {
    /// Create a FIB with `2^order` buckets. New nodes get their payload
    /// from `init`. The table never shrinks below the initial order.
    pub fn new(order: u32, init: fn(&Net) -> T) -> Self {
        let order = order.clamp(MIN_ORDER, MAX_ORDER);
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; 1 << order],
            order,
            min_order: order,
            entries: 0,
            cursors: Vec::new(),
            live_iterators: 0,
            init,
        }
    }

    pub fn with_default_order(init: fn(&Net) -> T) -> Self {
        Self::new(DEFAULT_ORDER, init)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    fn bucket(&self, hash: u32) -> usize {
        (hash >> (32 - self.order)) as usize
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Occupied(_)))
    }

    pub fn try_node(&self, id: NodeId) -> Option<&FibNode<T>> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    /// The node `id`, which must be live.
    pub fn node(&self, id: NodeId) -> &FibNode<T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(node)) => node,
            _ => dead_node(id),
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut FibNode<T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied(node)) => node,
            _ => dead_node(id),
        }
    }

    pub fn find(&self, net: &Net) -> Option<NodeId> {
        let hash = fib_hash(net);
        let mut cursor = self.buckets.get(self.bucket(hash)).copied()?;
        while let Some(id) = cursor {
            let node = self.node(id);
            if node.hash > hash {
                break;
            }
            if node.net == *net {
                return Some(id);
            }
            cursor = node.next;
        }
        None
    }

    /// Find the node for `net`, creating it if it does not exist yet.
    pub fn get(&mut self, net: &Net) -> NodeId {
        if let Some(id) = self.find(net) {
            return id;
        }
        let node = FibNode {
            net: *net,
            hash: fib_hash(net),
            next: None,
            data: (self.init)(net),
        };
        let id = match self.free.pop() {
            Some(id) => {
                if let Some(slot) = self.slots.get_mut(id.index()) {
                    *slot = Slot::Occupied(node);
                }
                id
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        };
        self.link(id);
        self.entries += 1;
        self.check_size();
        id
    }

    /// Remove a node from the table and return its payload. Iterators
    /// that were about to return the node move on to its successor.
    pub fn delete(&mut self, id: NodeId) -> T {
        let (hash, next) = {
            let node = self.node(id);
            (node.hash, node.next)
        };
        for cursor in self.cursors.iter_mut().flatten() {
            if cursor.next == Some(id) {
                cursor.next = next;
            }
        }

        let b = self.bucket(hash);
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.buckets.get(b).copied().flatten();
        while let Some(cur) = cursor {
            if cur == id {
                break;
            }
            prev = Some(cur);
            cursor = self.node(cur).next;
        }
        assert!(cursor.is_some(), "fib: {} is not in its bucket", id);
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => {
                if let Some(head) = self.buckets.get_mut(b) {
                    *head = next;
                }
            }
        }

        let slot = match self.slots.get_mut(id.index()) {
            Some(slot) => std::mem::replace(slot, Slot::Vacant),
            None => dead_node(id),
        };
        self.free.push(id);
        self.entries -= 1;
        self.check_size();
        match slot {
            Slot::Occupied(node) => node.data,
            Slot::Vacant => dead_node(id),
        }
    }

    /// Borrowing iteration over all nodes, in bucket order.
    pub fn iter(&self) -> FibIter<'_, T> {
        FibIter::new(self)
    }

    fn target_order(&self) -> Option<u32> {
        let size = self.buckets.len();
        if self.entries > size * HIGH_MARK && self.order < MAX_ORDER {
            Some((self.order + STEP).min(MAX_ORDER))
        } else if self.entries < size / LOW_MARK && self.order > self.min_order
        {
            Some(self.order.saturating_sub(STEP).max(self.min_order))
        } else {
            None
        }
    }

    /// Insert a node into its chain, behind all nodes that sort before
    /// it.
    fn link(&mut self, id: NodeId) {
        let key = (self.node(id).hash, id);
        let b = self.bucket(key.0);
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.buckets.get(b).copied().flatten();
        while let Some(cur) = cursor {
            let node = self.node(cur);
            if (node.hash, cur) > key {
                break;
            }
            prev = Some(cur);
            cursor = node.next;
        }
        self.node_mut(id).next = cursor;
        match prev {
            Some(prev) => self.node_mut(prev).next = Some(id),
            None => {
                if let Some(head) = self.buckets.get_mut(b) {
                    *head = Some(id);
                }
            }
        }
    }

    fn check_size(&mut self) {
        if let Some(order) = self.target_order() {
            self.rehash(order);
        }
    }

    fn rehash(&mut self, order: u32) {
        debug!(
            "fib: rehashing {} entries from order {} to {}",
            self.entries, self.order, order
        );
        let old_order = self.order;
        self.order = order;

        // Rebuild the chains back to front, so that they come out sorted.
        let mut nodes: Vec<(u32, NodeId)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(node) => Some((node.hash, NodeId(i as u32))),
                Slot::Vacant => None,
            })
            .collect();
        nodes.sort_unstable();
        let mut buckets = vec![None; 1 << order];
        for &(hash, id) in nodes.iter().rev() {
            if let (Some(Slot::Occupied(node)), Some(head)) = (
                self.slots.get_mut(id.index()),
                buckets.get_mut((hash >> (32 - order)) as usize),
            ) {
                node.next = *head;
                *head = Some(id);
            }
        }
        self.buckets = buckets;

        for i in 0..self.cursors.len() {
            let Some(Some(cursor)) = self.cursors.get(i).copied() else {
                continue;
            };
            let moved = self.relocate(cursor, old_order);
            if let Some(c) = self.cursors.get_mut(i) {
                *c = Some(moved);
            }
        }
    }

    /// The position of `cursor`, which was taken with `old_order`, in the
    /// current buckets.
    fn relocate(&self, cursor: Cursor, old_order: u32) -> Cursor {
        if let Some(id) = cursor.next {
            return Cursor {
                bucket: self.bucket(self.node(id).hash),
                next: Some(id),
            };
        }
        // The cursor is done with its bucket: continue with the first
        // node that would have gone into the next one.
        let last = self.buckets.len() - 1;
        let resume = (cursor.bucket as u64 + 1) << (32 - old_order);
        let Ok(resume) = u32::try_from(resume) else {
            return Cursor {
                bucket: last,
                next: None,
            };
        };
        let bucket = self.bucket(resume);
        let mut next = self.buckets.get(bucket).copied().flatten();
        while let Some(id) = next {
            let node = self.node(id);
            if node.hash >= resume {
                break;
            }
            next = node.next;
        }
        Cursor { bucket, next }
    }
}

/// The hash of a network. Its top bits select the bucket.
fn fib_hash(net: &Net) -> u32 {
    net.hash().wrapping_mul(HASH_MULT)
}

impl<T: fmt::Debug> fmt::Debug for Fib<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fib")
            .field("order", &self.order)
            .field("entries", &self.entries)
            .field("live_iterators", &self.live_iterators)
            .finish()
    }
}

#[allow(clippy::panic)]
fn dead_node(id: NodeId) -> ! {
    panic!("fib: {} is not a live node", id)
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};

    fn net(i: u32) -> Net {
        Net::new(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 | (i << 8))), 24)
    }

    fn fib() -> Fib<u32> {
        Fib::new(MIN_ORDER, |_| 0)
    }

    #[test]
    fn get_find_delete() {
        let mut fib = fib();
        let a = fib.get(&net(1));
        assert_eq!(fib.get(&net(1)), a);
        assert_eq!(fib.find(&net(1)), Some(a));
        assert_eq!(fib.find(&net(2)), None);
        *fib.node_mut(a).data_mut() = 7;
        assert_eq!(*fib.node(a).data(), 7);
        assert_eq!(fib.delete(a), 7);
        assert_eq!(fib.find(&net(1)), None);
        assert!(!fib.contains(a));
        assert!(fib.is_empty());
    }

    #[test]
    #[should_panic]
    fn delete_dead_node_panics() {
        let mut fib = fib();
        let a = fib.get(&net(1));
        fib.delete(a);
        fib.delete(a);
    }

    #[test]
    fn grows_and_shrinks() {
        let mut fib = fib();
        let ids: Vec<_> = (0..1000).map(|i| fib.get(&net(i))).collect();
        assert_eq!(fib.len(), 1000);
        assert_eq!(fib.order(), 8);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(fib.find(&net(i as u32)), Some(*id));
        }
        for id in ids.iter().skip(3) {
            fib.delete(*id);
        }
        assert_eq!(fib.order(), MIN_ORDER);
        assert_eq!(fib.iter().count(), 3);
    }

    #[test]
    fn iteration_survives_deletion() {
        let mut fib = fib();
        for i in 0..100 {
            fib.get(&net(i));
        }
        assert_eq!(fib.order(), 6);
        let mut it = fib.iter_init();
        let mut seen = HashSet::new();
        while let Some(id) = fib.iter_next(&mut it) {
            assert!(seen.insert(*fib.node(id).net()));
            fib.delete(id);
        }
        // Shrunk on the way.
        assert_eq!(fib.order(), MIN_ORDER);
        fib.iter_release(it);
        assert_eq!(seen.len(), 100);
        assert!(fib.is_empty());
    }

    #[test]
    fn iteration_survives_growth() {
        let mut fib = fib();
        for i in 0..60 {
            fib.get(&net(i));
        }
        assert_eq!(fib.order(), MIN_ORDER);
        let mut it = fib.iter_init();
        let mut seen = Vec::new();
        for _ in 0..20 {
            let id = fib.iter_next(&mut it).unwrap();
            seen.push(*fib.node(id).net());
        }
        for i in 60..2000 {
            fib.get(&net(i));
        }
        assert_eq!(fib.order(), 10);
        while let Some(id) = fib.iter_next(&mut it) {
            seen.push(*fib.node(id).net());
        }
        fib.iter_release(it);

        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
        assert!((0..60).all(|i| unique.contains(&net(i))));
    }

    #[test]
    fn finished_cursors_stay_finished() {
        let mut fib = fib();
        for i in 0..10 {
            fib.get(&net(i));
        }
        let mut it = fib.iter_init();
        while fib.iter_next(&mut it).is_some() {}
        for i in 10..500 {
            fib.get(&net(i));
        }
        assert!(fib.order() > MIN_ORDER);
        assert_eq!(fib.iter_next(&mut it), None);
        fib.iter_release(it);
    }

    #[test]
    fn chains_are_sorted() {
        let mut fib = fib();
        for i in 0..300 {
            fib.get(&net(i * 7));
        }
        let hashes: Vec<u32> = fib.iter().map(|(_, n)| n.hash).collect();
        assert_eq!(hashes.len(), 300);
        assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn deleted_nodes_ahead_are_skipped() {
        let mut fib = fib();
        for i in 0..50 {
            fib.get(&net(i));
        }
        let mut it = fib.iter_init();
        let Some(first) = fib.iter_next(&mut it) else {
            panic!("empty table")
        };
        let first_net = *fib.node(first).net();
        let mut deleted = HashSet::new();
        for i in (0..50).step_by(2) {
            let n = net(i);
            if n != first_net {
                let id = fib.find(&n).unwrap();
                fib.delete(id);
                deleted.insert(n);
            }
        }
        let mut seen = vec![first_net];
        while let Some(id) = fib.iter_next(&mut it) {
            seen.push(*fib.node(id).net());
        }
        fib.iter_release(it);
        assert!(seen.iter().all(|n| !deleted.contains(n)));
        assert_eq!(seen.len(), 50 - deleted.len());
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), seen.len());
    }
}
