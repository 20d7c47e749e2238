//! Extended attribute lists.
//!
//! Everything a protocol wants to attach to a route beyond the fixed fields
//! of an [`Rta`](super::attrs::Rta) goes into an extended attribute list:
//! BGP path attributes, OSPF tags, RIP metrics and the like. The core does
//! not interpret the attributes, it only normalizes, hashes and compares
//! them, so that attribute blocks with the same content can be shared.
//!
//! Lists can be chained. A chain is an override stack: an attribute in a
//! list masks all attributes with the same id further down the chain, and
//! an [`EaValue::Undef`] attribute masks without replacing, i.e. it deletes
//! the attribute. Normalization merges a chain into a single list sorted
//! by id.
use std::fmt;
use std::net::IpAddr;

use crate::proto::ProtocolKind;

/// Lists with more attributes than this are searched by bisection.
const BISECT_THRESHOLD: usize = 5;

//------------ EaId ----------------------------------------------------------

/// The id of an extended attribute: the kind of protocol that defines the
/// attribute, and the attribute code within that protocol.
///
/// Ids are ordered by protocol kind first, and by code second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EaId {
    kind: ProtocolKind,
    code: u8,
}

impl EaId {
    pub const fn new(kind: ProtocolKind, code: u8) -> Self {
        Self { kind, code }
    }

    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    fn as_u32(&self) -> u32 {
        ((self.kind as u32) << 8) | self.code as u32
    }
}

impl fmt::Display for EaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.code)
    }
}

//------------ EaValue -------------------------------------------------------

/// The value of an extended attribute. The first three variants are
/// stored inline, the others carry a payload of their own.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EaValue {
    Int(u32),
    RouterId(u32),
    Bitfield(u32),
    IpAddr(IpAddr),
    Opaque(Vec<u8>),
    AsPath(Vec<u8>),
    IntSet(Vec<u32>),
    EcSet(Vec<u64>),
    /// The attribute has been removed.
    Undef,
}

impl EaValue {
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            EaValue::Int(_)
                | EaValue::RouterId(_)
                | EaValue::Bitfield(_)
                | EaValue::Undef
        )
    }

    pub fn as_int(&self) -> Option<u32> {
        match self {
            EaValue::Int(v) | EaValue::RouterId(v) | EaValue::Bitfield(v) => {
                Some(*v)
            }
            _ => None,
        }
    }

    fn hash(&self) -> u32 {
        match self {
            EaValue::Int(v) | EaValue::RouterId(v) | EaValue::Bitfield(v) => {
                *v
            }
            EaValue::Undef => 0,
            EaValue::IpAddr(IpAddr::V4(a)) => hash_bytes(&a.octets()),
            EaValue::IpAddr(IpAddr::V6(a)) => hash_bytes(&a.octets()),
            EaValue::Opaque(d) | EaValue::AsPath(d) => hash_bytes(d),
            EaValue::IntSet(s) => s
                .iter()
                .fold(s.len() as u32, |h, v| h.rotate_left(5) ^ v),
            EaValue::EcSet(s) => s.iter().fold(s.len() as u32, |h, v| {
                h.rotate_left(5) ^ (*v as u32) ^ ((*v >> 32) as u32)
            }),
        }
    }
}

// Whole words are folded in with xor, the trailing bytes are shifted in.
fn hash_bytes(data: &[u8]) -> u32 {
    let mut h = data.len() as u32;
    let mut words = data.chunks_exact(4);
    for w in words.by_ref() {
        h ^= u32::from_be_bytes(<[u8; 4]>::try_from(w).unwrap_or([0; 4]));
    }
    for b in words.remainder() {
        h = (h >> 24) ^ (h << 8) ^ *b as u32;
    }
    h
}

impl fmt::Display for EaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EaValue::Int(v) => write!(f, "{}", v),
            EaValue::RouterId(v) => {
                write!(f, "{}", std::net::Ipv4Addr::from(*v))
            }
            EaValue::Bitfield(v) => write!(f, "{:#010x}", v),
            EaValue::IpAddr(a) => write!(f, "{}", a),
            EaValue::Opaque(d) | EaValue::AsPath(d) => {
                for (i, b) in d.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            EaValue::IntSet(s) => {
                write!(f, "(")?;
                for (i, v) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{},{}", v >> 16, v & 0xffff)?;
                }
                write!(f, ")")
            }
            EaValue::EcSet(s) => {
                write!(f, "(")?;
                for (i, v) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:#018x}", v)?;
                }
                write!(f, ")")
            }
            EaValue::Undef => write!(f, "<undef>"),
        }
    }
}

//------------ Eattr ---------------------------------------------------------

/// One extended attribute. `flags` belong to the protocol that owns the
/// attribute (BGP keeps its attribute flags in there), the core only
/// compares and hashes them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Eattr {
    pub id: EaId,
    pub flags: u8,
    pub value: EaValue,
}

impl Eattr {
    pub fn new(id: EaId, value: EaValue) -> Self {
        Self {
            id,
            flags: 0,
            value,
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Display for Eattr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.id, self.value)
    }
}

//------------ EaList --------------------------------------------------------

#[derive(Debug, Default)]
pub struct EaList {
    attrs: Vec<Eattr>,
    sorted: bool,
    bisectable: bool,
    cached: bool,
    next: Option<Box<EaList>>,
}

// A copy of a cached list is not cached itself.
impl Clone for EaList {
    fn clone(&self) -> Self {
        Self {
            attrs: self.attrs.clone(),
            sorted: self.sorted,
            bisectable: self.bisectable,
            cached: false,
            next: self.next.clone(),
        }
    }
}

impl EaList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attrs(attrs: Vec<Eattr>) -> Self {
        Self {
            attrs,
            ..Default::default()
        }
    }

    /// Append an attribute to this list (not to the chain). Duplicates are
    /// allowed, the first occurrence wins on normalization.
    pub fn push(&mut self, attr: Eattr) {
        self.attrs.push(attr);
        self.sorted = false;
        self.bisectable = false;
    }

    /// Set the value of an attribute in this list, replacing an existing
    /// attribute with the same id.
    pub fn set(&mut self, id: EaId, value: EaValue) {
        match self.attrs.iter_mut().find(|a| a.id == id) {
            Some(a) => a.value = value,
            None => self.push(Eattr::new(id, value)),
        }
    }

    /// Mark an attribute as removed: it masks the attribute further down
    /// the chain, and disappears on normalization.
    pub fn unset(&mut self, id: EaId) {
        self.set(id, EaValue::Undef);
    }

    /// Put `next` at the end of the chain of this list. Attributes in
    /// `self` take precedence over those in `next`.
    pub fn chain(mut self, next: EaList) -> Self {
        self.append_to_chain(next);
        self
    }

    fn append_to_chain(&mut self, next: EaList) {
        match self.next {
            Some(ref mut n) => n.append_to_chain(next),
            None => self.next = Some(Box::new(next)),
        }
    }

    pub fn is_chained(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_bisectable(&self) -> bool {
        self.bisectable
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub(crate) fn set_cached(&mut self) {
        self.cached = true;
    }

    /// The number of attributes in this list, not counting the chain.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.next.is_none()
    }

    /// The attributes of this list, not the chain.
    pub fn iter(&self) -> impl Iterator<Item = &Eattr> {
        self.attrs.iter()
    }

    /// Find an attribute, honouring the override semantics of a chain.
    pub fn find(&self, id: EaId) -> Option<&Eattr> {
        let mut list = Some(self);
        while let Some(l) = list {
            if let Some(a) = l.find_local(id) {
                return match a.value {
                    EaValue::Undef => None,
                    _ => Some(a),
                };
            }
            list = l.next.as_deref();
        }
        None
    }

    fn find_local(&self, id: EaId) -> Option<&Eattr> {
        if self.bisectable {
            self.attrs
                .binary_search_by(|a| a.id.cmp(&id))
                .ok()
                .and_then(|i| self.attrs.get(i))
        } else {
            self.attrs.iter().find(|a| a.id == id)
        }
    }

    pub fn get_int(&self, id: EaId, default: u32) -> u32 {
        self.find(id)
            .and_then(|a| a.value.as_int())
            .unwrap_or(default)
    }

    /// Merge the chain into this list, sort it by attribute id and drop
    /// masked and removed attributes.
    ///
    /// The sort is stable and all entries of a list come before those of
    /// the next list in the chain, so for every id the first entry after
    /// sorting is the one with the highest priority.
    pub fn normalize(&mut self) {
        assert!(!self.cached, "eattrs: normalizing a cached list");

        let mut next = self.next.take();
        while let Some(mut n) = next {
            self.attrs.append(&mut n.attrs);
            self.sorted = false;
            next = n.next.take();
        }

        if !self.sorted {
            self.attrs.sort_by(|a, b| a.id.cmp(&b.id));
            let mut last: Option<EaId> = None;
            self.attrs.retain(|a| {
                let first = last != Some(a.id);
                last = Some(a.id);
                first
            });
        }
        self.attrs.retain(|a| a.value != EaValue::Undef);

        self.sorted = true;
        self.bisectable = self.attrs.len() > BISECT_THRESHOLD;
    }

    /// Structural hash over a normalized list.
    pub fn hash(&self) -> u32 {
        debug_assert!(self.sorted && self.next.is_none());
        let mut h = self.attrs.len() as u32;
        for a in &self.attrs {
            h ^= a.id.as_u32() ^ ((a.flags as u32) << 24);
            h = h.rotate_left(3) ^ a.value.hash();
        }
        h ^= h >> 16;
        h ^= h >> 6;
        h
    }

    /// Structural equality of two normalized lists.
    pub fn same(&self, other: &EaList) -> bool {
        self.next.is_none() && other.next.is_none() && self.attrs == other.attrs
    }
}

impl fmt::Display for EaList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = Some(self);
        let mut first = true;
        while let Some(l) = list {
            for a in &l.attrs {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{}", a)?;
            }
            list = l.next.as_deref();
            if list.is_some() {
                write!(f, " | ")?;
                first = true;
            }
        }
        Ok(())
    }
}

//------------ Tests ---------------------------------------------------------
