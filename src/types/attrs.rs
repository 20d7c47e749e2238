use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

use crate::proto::ProtocolId;

use super::eattrs::EaList;
use super::net::Scope;

//------------ Iface ---------------------------------------------------------

/// An outgoing interface, as far as the routing table is concerned: an
/// index and a name. The interface list itself lives elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Iface {
    index: u32,
    name: Rc<str>,
}

impl Iface {
    pub fn new(index: u32, name: &str) -> Self {
        Self {
            index,
            name: Rc::from(name),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

//------------ RouteSource ---------------------------------------------------

/// Where a route came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteSource {
    Dummy,
    Static,
    Inherit,
    Device,
    StaticDevice,
    Redirect,
    Rip,
    Ospf,
    OspfIa,
    OspfExt1,
    OspfExt2,
    Bgp,
    Pipe,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteSource::Dummy => "dummy",
            RouteSource::Static => "static",
            RouteSource::Inherit => "inherit",
            RouteSource::Device => "device",
            RouteSource::StaticDevice => "static-device",
            RouteSource::Redirect => "redirect",
            RouteSource::Rip => "RIP",
            RouteSource::Ospf => "OSPF",
            RouteSource::OspfIa => "OSPF-IA",
            RouteSource::OspfExt1 => "OSPF-E1",
            RouteSource::OspfExt2 => "OSPF-E2",
            RouteSource::Bgp => "BGP",
            RouteSource::Pipe => "pipe",
        })
    }
}

//------------ Cast ----------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cast {
    #[default]
    Unicast,
    Broadcast,
    Multicast,
    Anycast,
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cast::Unicast => "unicast",
            Cast::Broadcast => "broadcast",
            Cast::Multicast => "multicast",
            Cast::Anycast => "anycast",
        })
    }
}

//------------ Dest ----------------------------------------------------------

/// What happens to packets matching the route.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dest {
    /// Forward to a next hop router.
    Router { gw: IpAddr, iface: Option<Iface> },
    /// The network is directly attached to an interface.
    Device { iface: Iface },
    Blackhole,
    Unreachable,
    Prohibit,
}

impl Dest {
    pub fn gateway(&self) -> Option<IpAddr> {
        match self {
            Dest::Router { gw, .. } => Some(*gw),
            _ => None,
        }
    }

    pub fn iface(&self) -> Option<&Iface> {
        match self {
            Dest::Router { iface, .. } => iface.as_ref(),
            Dest::Device { iface } => Some(iface),
            Dest::Blackhole | Dest::Unreachable | Dest::Prohibit => None,
        }
    }

    fn gw_hash(&self) -> u32 {
        match self.gateway() {
            Some(gw) => super::net::Net::new(gw, 0).addr_hash(),
            None => 0,
        }
    }
}

impl fmt::Display for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::Router { gw, iface: Some(iface) } => {
                write!(f, "via {} on {}", gw, iface)
            }
            Dest::Router { gw, iface: None } => write!(f, "via {}", gw),
            Dest::Device { iface } => write!(f, "dev {}", iface),
            Dest::Blackhole => write!(f, "blackhole"),
            Dest::Unreachable => write!(f, "unreachable"),
            Dest::Prohibit => write!(f, "prohibited"),
        }
    }
}

//------------ Rta -----------------------------------------------------------

/// A block of route attributes.
///
/// Routes do not own their attributes: a protocol builds an `Rta` as a
/// candidate, and the attribute cache turns it into a shared, immutable
/// block, that all routes with the same attributes point to. BGP routes
/// learned in one UPDATE message typically share one block.
#[derive(Clone, Debug)]
pub struct Rta {
    pub proto: ProtocolId,
    pub source: RouteSource,
    pub scope: Scope,
    pub cast: Cast,
    pub dest: Dest,
    /// The router that advertised the route, if it is not the gateway.
    pub from: Option<IpAddr>,
    pub eattrs: EaList,
}

impl Rta {
    pub fn new(proto: ProtocolId, source: RouteSource, dest: Dest) -> Self {
        Self {
            proto,
            source,
            scope: Scope::Universe,
            cast: Cast::Unicast,
            dest,
            from: None,
            eattrs: EaList::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_cast(mut self, cast: Cast) -> Self {
        self.cast = cast;
        self
    }

    pub fn with_from(mut self, from: IpAddr) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_eattrs(mut self, eattrs: EaList) -> Self {
        self.eattrs = eattrs;
        self
    }

    /// The structural hash of a block with a normalized attribute list,
    /// salted with the hash key of the owning protocol.
    pub(crate) fn hash(&self, salt: u32) -> u32 {
        salt ^ self.dest.gw_hash() ^ self.eattrs.hash()
    }

    /// Structural equality of two blocks with normalized attribute lists.
    pub fn same(&self, other: &Rta) -> bool {
        self.proto == other.proto
            && self.source == other.source
            && self.scope == other.scope
            && self.cast == other.cast
            && self.dest == other.dest
            && self.from == other.from
            && self.eattrs.same(&other.eattrs)
    }
}

impl fmt::Display for Rta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} scope {}",
            self.dest, self.source, self.cast, self.scope
        )?;
        if let Some(from) = self.from {
            write!(f, " from {}", from)?;
        }
        Ok(())
    }
}
