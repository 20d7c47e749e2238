//! The route attribute cache.
//!
//! Attribute blocks are hash-consed: [`RtaCache::lookup`] turns a candidate
//! [`Rta`] into a handle to the one cached block with the same content, and
//! counts how many users the block has. Cached blocks are immutable. Once
//! the last user lets go of a block, it is unlinked from its hash chain and
//! its slot is reused.
//!
//! Handles carry the generation of their slot, so a handle that outlives
//! its block is caught on the next access instead of silently referring to
//! whatever block reuses the slot.
use std::fmt;

use log::{debug, trace};

use crate::types::attrs::Rta;

const INITIAL_ORDER: u32 = 6;
const MAX_ORDER: u32 = 24;

//------------ RtaRef --------------------------------------------------------

/// A counted reference to a cached attribute block.
///
/// The handle itself is plain data: cloning it with `Copy` does not count
/// as a use. Take a new use with [`RtaCache::clone_ref`] and give it back
/// with [`RtaCache::release`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RtaRef {
    index: u32,
    generation: u32,
}

impl fmt::Display for RtaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rta#{}.{}", self.index, self.generation)
    }
}

//------------ RtaCache ------------------------------------------------------

#[derive(Debug)]
struct Entry {
    rta: Rta,
    hash: u32,
    uses: u32,
    next: Option<u32>,
}

#[derive(Debug)]
enum Slot {
    Occupied { generation: u32, entry: Entry },
    Vacant { generation: u32 },
}

#[derive(Debug)]
pub struct RtaCache {
    slots: Vec<Slot>,
    free: Vec<u32>,
    buckets: Vec<Option<u32>>,
    order: u32,
    live: usize,
    lookups: u64,
    hits: u64,
}

impl Default for RtaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RtaCache {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; 1 << INITIAL_ORDER],
            order: INITIAL_ORDER,
            live: 0,
            lookups: 0,
            hits: 0,
        }
    }

    /// The number of distinct blocks in the cache.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// The number of lookups, and how many of those found an existing
    /// block.
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.lookups, self.hits)
    }

    fn bucket(&self, hash: u32) -> usize {
        (hash.wrapping_mul(0x9e37_79b9) >> (32 - self.order)) as usize
    }

    fn entry(&self, r: RtaRef) -> &Entry {
        match self.slots.get(r.index as usize) {
            Some(Slot::Occupied { generation, entry })
                if *generation == r.generation =>
            {
                entry
            }
            _ => stale_ref(r),
        }
    }

    fn entry_mut(&mut self, r: RtaRef) -> &mut Entry {
        match self.slots.get_mut(r.index as usize) {
            Some(Slot::Occupied { generation, entry })
                if *generation == r.generation =>
            {
                entry
            }
            _ => stale_ref(r),
        }
    }

    fn entry_at(&self, index: u32) -> Option<(RtaRef, &Entry)> {
        match self.slots.get(index as usize) {
            Some(Slot::Occupied { generation, entry }) => Some((
                RtaRef {
                    index,
                    generation: *generation,
                },
                entry,
            )),
            _ => None,
        }
    }

    /// Find the cached block with the same content as `rta`, or cache
    /// `rta` as a new block. Either way the returned reference counts as
    /// one use. `salt` is mixed into the hash; it should be the hash key of
    /// the protocol owning the block.
    ///
    /// Panics if the extended attributes of `rta` are marked as cached.
    pub fn lookup(&mut self, mut rta: Rta, salt: u32) -> RtaRef {
        assert!(
            !rta.eattrs.is_cached(),
            "rta cache: resubmitting a cached attribute block"
        );
        self.lookups += 1;
        rta.eattrs.normalize();
        let hash = rta.hash(salt);

        let mut cursor = self.buckets.get(self.bucket(hash)).copied().flatten();
        while let Some(index) = cursor {
            let Some((r, entry)) = self.entry_at(index) else {
                break;
            };
            if entry.hash == hash && entry.rta.same(&rta) {
                self.hits += 1;
                self.entry_mut(r).uses += 1;
                trace!("rta cache: hit {}", r);
                return r;
            }
            cursor = entry.next;
        }

        rta.eattrs.set_cached();
        let b = self.bucket(hash);
        let entry = Entry {
            rta,
            hash,
            uses: 1,
            next: self.buckets.get(b).copied().flatten(),
        };
        let r = match self.free.pop() {
            Some(index) => {
                let generation = match self.slots.get(index as usize) {
                    Some(Slot::Vacant { generation }) => generation + 1,
                    _ => 0,
                };
                if let Some(slot) = self.slots.get_mut(index as usize) {
                    *slot = Slot::Occupied { generation, entry };
                }
                RtaRef { index, generation }
            }
            None => {
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    entry,
                });
                RtaRef {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        if let Some(head) = self.buckets.get_mut(b) {
            *head = Some(r.index);
        }
        self.live += 1;
        trace!("rta cache: new block {}", r);

        if self.live > self.buckets.len() * 2 && self.order < MAX_ORDER {
            self.rehash((self.order + 2).min(MAX_ORDER));
        }
        r
    }

    /// Take another use of a cached block.
    pub fn clone_ref(&mut self, r: RtaRef) -> RtaRef {
        self.entry_mut(r).uses += 1;
        r
    }

    /// Give back a use of a cached block. The block is dropped with its
    /// last use.
    pub fn release(&mut self, r: RtaRef) {
        let entry = self.entry_mut(r);
        entry.uses -= 1;
        if entry.uses > 0 {
            return;
        }
        let (hash, next) = (entry.hash, entry.next);

        let b = self.bucket(hash);
        let mut prev: Option<u32> = None;
        let mut cursor = self.buckets.get(b).copied().flatten();
        while let Some(index) = cursor {
            if index == r.index {
                break;
            }
            prev = Some(index);
            cursor = self.entry_at(index).and_then(|(_, e)| e.next);
        }
        assert!(
            cursor.is_some(),
            "rta cache: {} is not in its hash chain",
            r
        );
        match prev {
            Some(prev) => {
                if let Some(Slot::Occupied { entry, .. }) =
                    self.slots.get_mut(prev as usize)
                {
                    entry.next = next;
                }
            }
            None => {
                if let Some(head) = self.buckets.get_mut(b) {
                    *head = next;
                }
            }
        }
        if let Some(slot) = self.slots.get_mut(r.index as usize) {
            *slot = Slot::Vacant {
                generation: r.generation,
            };
        }
        self.free.push(r.index);
        self.live -= 1;
        trace!("rta cache: freed {}", r);
    }

    /// The attributes of a cached block.
    pub fn get(&self, r: RtaRef) -> &Rta {
        &self.entry(r).rta
    }

    /// The number of uses of a cached block.
    pub fn uses(&self, r: RtaRef) -> u32 {
        self.entry(r).uses
    }

    /// Whether `r` refers to a live block.
    pub fn contains(&self, r: RtaRef) -> bool {
        matches!(
            self.slots.get(r.index as usize),
            Some(Slot::Occupied { generation, .. }) if *generation == r.generation
        )
    }

    fn rehash(&mut self, order: u32) {
        debug!(
            "rta cache: rehashing {} blocks from order {} to {}",
            self.live, self.order, order
        );
        self.order = order;
        let mut buckets = vec![None; 1 << order];
        for i in 0..self.slots.len() {
            let b = match self.slots.get(i) {
                Some(Slot::Occupied { entry, .. }) => self.bucket(entry.hash),
                _ => continue,
            };
            if let (Some(Slot::Occupied { entry, .. }), Some(head)) =
                (self.slots.get_mut(i), buckets.get_mut(b))
            {
                entry.next = *head;
                *head = Some(i as u32);
            }
        }
        self.buckets = buckets;
    }
}

#[allow(clippy::panic)]
fn stale_ref(r: RtaRef) -> ! {
    panic!("rta cache: {} does not refer to a cached block", r)
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ProtocolId, ProtocolKind};
    use crate::types::attrs::{Dest, RouteSource};
    use crate::types::eattrs::{EaId, EaList, EaValue, Eattr};
    use std::net::{IpAddr, Ipv4Addr};

    const MED: EaId = EaId::new(ProtocolKind::Bgp, 4);
    const ORIGIN: EaId = EaId::new(ProtocolKind::Bgp, 1);

    fn rta(gw: u8, attrs: Vec<Eattr>) -> Rta {
        Rta::new(
            ProtocolId(1),
            RouteSource::Bgp,
            Dest::Router {
                gw: IpAddr::V4(Ipv4Addr::new(10, 0, 0, gw)),
                iface: None,
            },
        )
        .with_eattrs(EaList::from_attrs(attrs))
    }

    #[test]
    fn equal_content_shares_a_block() {
        let mut cache = RtaCache::new();
        let a = cache.lookup(
            rta(
                1,
                vec![
                    Eattr::new(MED, EaValue::Int(10)),
                    Eattr::new(ORIGIN, EaValue::Int(0)),
                ],
            ),
            7,
        );
        let b = cache.lookup(
            rta(
                1,
                vec![
                    Eattr::new(ORIGIN, EaValue::Int(0)),
                    Eattr::new(MED, EaValue::Int(10)),
                ],
            ),
            7,
        );
        assert_eq!(a, b);
        assert_eq!(cache.uses(a), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(a).eattrs.is_cached());

        let c = cache.lookup(rta(2, vec![]), 7);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn release_frees_at_zero() {
        let mut cache = RtaCache::new();
        let a = cache.lookup(rta(1, vec![]), 0);
        let a2 = cache.clone_ref(a);
        assert_eq!(cache.uses(a), 2);
        cache.release(a2);
        assert!(cache.contains(a));
        cache.release(a);
        assert!(!cache.contains(a));
        assert!(cache.is_empty());

        // The slot is reused under a new generation.
        let b = cache.lookup(rta(1, vec![]), 0);
        assert_ne!(a, b);
        assert_eq!(cache.uses(b), 1);
    }

    #[test]
    #[should_panic]
    fn stale_reference_panics() {
        let mut cache = RtaCache::new();
        let a = cache.lookup(rta(1, vec![]), 0);
        cache.release(a);
        cache.get(a);
    }

    #[test]
    #[should_panic]
    fn resubmitting_a_cached_block_panics() {
        let mut cache = RtaCache::new();
        let a = cache.lookup(rta(1, vec![]), 0);
        let mut copy = cache.get(a).clone();
        copy.eattrs.set_cached();
        cache.lookup(copy, 0);
    }

    #[test]
    fn grows_with_live_blocks() {
        let mut cache = RtaCache::new();
        let refs: Vec<_> = (0..1000u32)
            .map(|i| {
                cache.lookup(
                    rta(1, vec![Eattr::new(MED, EaValue::Int(i))]),
                    0,
                )
            })
            .collect();
        assert_eq!(cache.len(), 1000);
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(cache.get(*r).eattrs.get_int(MED, u32::MAX), i as u32);
            let again = cache.lookup(
                rta(1, vec![Eattr::new(MED, EaValue::Int(i as u32))]),
                0,
            );
            assert_eq!(again, *r);
        }
        assert_eq!(cache.hit_stats(), (2000, 1000));
    }
}
