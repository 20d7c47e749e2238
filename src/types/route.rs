use std::fmt;
use std::time::Instant;

use crate::attr_cache::RtaRef;
use crate::fib::NodeId;

use super::attrs::Rta;

//------------ RteFlags ------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RteFlags(u8);

impl RteFlags {
    /// The route was announced as part of an initial feed.
    pub const FEED: RteFlags = RteFlags(0x01);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: RteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RteFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RteFlags) {
        self.0 &= !other.0;
    }
}

//------------ RouteMetric ---------------------------------------------------

/// Protocol specific route data. The routing table never looks inside, it
/// only compares it to detect updates that do not change anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RouteMetric {
    #[default]
    None,
    Rip {
        metric: u32,
        tag: u16,
    },
    Ospf {
        metric1: u32,
        metric2: u32,
        tag: u32,
        router_id: u32,
    },
    Kernel {
        src: u8,
        metric: u32,
    },
}

//------------ Rte -----------------------------------------------------------

/// A route: one protocol's entry for one network.
#[derive(Clone, Debug)]
pub struct Rte {
    /// The FIB node of the network the route belongs to.
    pub net: NodeId,
    pub attrs: RtaRef,
    pub pref: u32,
    pub lastmod: Instant,
    pub flags: RteFlags,
    pub metric: RouteMetric,
}

impl Rte {
    /// Two routes are the same if they point to the same attribute block
    /// and carry the same preference and metric.
    pub fn same(&self, other: &Rte) -> bool {
        self.attrs == other.attrs
            && self.pref == other.pref
            && self.metric == other.metric
    }
}

//------------ RouteView -----------------------------------------------------

/// A route together with its resolved attributes, as handed to protocol
/// hooks that compare or inspect routes.
#[derive(Clone, Copy, Debug)]
pub struct RouteView<'a> {
    pub rte: &'a Rte,
    pub attrs: &'a Rta,
}

impl fmt::Display for RouteView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pref {}", self.attrs, self.rte.pref)
    }
}
