//! Protocol instances, as the routing table sees them.
//!
//! The routing table does not implement any routing protocol. It keeps a
//! registry of protocol instances, each with a kind, a lifecycle state, a
//! preference, filters and a set of optional hooks, and it calls those hooks
//! while it processes updates.
use std::fmt;
use std::rc::Rc;

use serde_derive::{Deserialize, Serialize};

use crate::filter::{Filter, FilterRoute};
use crate::rib::config::AnnounceMode;
use crate::rib::{Rib, TableId};
use crate::types::eattrs::EaList;
use crate::types::net::{Net, Scope};
use crate::types::route::{RouteView, Rte};
use crate::types::stats::ImportStats;

//------------ ProtocolId ----------------------------------------------------

/// The handle of a protocol instance registered with a [`Rib`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(pub(crate) u32);

impl ProtocolId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proto#{}", self.0)
    }
}

//------------ ProtocolKind --------------------------------------------------

/// The kind of a protocol.
///
/// The declaration order doubles as the tie breaker between routes of equal
/// preference from protocols of different kinds. It carries no policy
/// meaning, it only makes the choice deterministic.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Device,
    Static,
    Kernel,
    Rip,
    Ospf,
    Bgp,
    Bfd,
    Pipe,
}

impl ProtocolKind {
    /// The preference routes of this kind of protocol get if the protocol
    /// configuration does not say otherwise.
    pub fn default_preference(&self) -> u32 {
        match self {
            ProtocolKind::Device => 240,
            ProtocolKind::Static => 200,
            ProtocolKind::Ospf => 150,
            ProtocolKind::Rip => 120,
            ProtocolKind::Bgp => 100,
            ProtocolKind::Kernel | ProtocolKind::Pipe => 10,
            ProtocolKind::Bfd => 0,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolKind::Device => "device",
            ProtocolKind::Static => "static",
            ProtocolKind::Kernel => "kernel",
            ProtocolKind::Rip => "rip",
            ProtocolKind::Ospf => "ospf",
            ProtocolKind::Bgp => "bgp",
            ProtocolKind::Bfd => "bfd",
            ProtocolKind::Pipe => "pipe",
        })
    }
}

//------------ ProtoState ----------------------------------------------------

/// The lifecycle state of a protocol instance.
///
/// Only protocols that are `Up` get their updates accepted and receive
/// announcements. A `Flushing` protocol is on its way down: the next prune
/// pass removes all its routes, after which it goes `Down`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtoState {
    #[default]
    Down,
    Starting,
    Up,
    Flushing,
}

impl fmt::Display for ProtoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtoState::Down => "down",
            ProtoState::Starting => "start",
            ProtoState::Up => "up",
            ProtoState::Flushing => "flush",
        })
    }
}

//------------ Preexport -----------------------------------------------------

/// The verdict of a protocol's pre-export check, which runs before the
/// export filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preexport {
    /// Export the route, skipping the export filter.
    Accept,
    /// Do not export the route.
    Reject,
    /// Leave the decision to the export filter.
    Continue,
}

//------------ ProtocolHooks -------------------------------------------------

/// The callbacks a protocol instance registers with the routing table.
///
/// All methods have a default that does nothing, so a protocol only
/// implements what it needs. The table may call into the hooks while an
/// update is in progress, and `rt_notify` is allowed to call back into the
/// [`Rib`] to push updates of its own.
pub trait ProtocolHooks {
    /// A route change for `net` in `table`, after export filtering. `new`
    /// is the route to install, `old` the route that is replaced or
    /// withdrawn. At least one of them is present.
    fn rt_notify(
        &self,
        _rib: &mut Rib,
        _table: TableId,
        _net: Net,
        _new: Option<&Rte>,
        _old: Option<&Rte>,
        _tmp_attrs: &EaList,
    ) {
    }

    /// Compare two routes of this protocol with the same preference.
    /// Returns true if `new` is better than `old`.
    fn better(&self, _new: RouteView<'_>, _old: RouteView<'_>) -> bool {
        false
    }

    /// A route of this protocol for `net` went into a table.
    fn rte_insert(&self, _net: Net, _rte: &Rte) {}

    /// A route of this protocol for `net` left a table, either withdrawn
    /// or replaced.
    fn rte_remove(&self, _net: Net, _rte: &Rte) {}

    /// Expose protocol specific route data as temporary attributes, for
    /// filters to look at.
    fn make_tmp_attrs(&self, _route: &FilterRoute<'_>) -> Option<EaList> {
        None
    }

    /// Fold temporary attributes changed by an import filter back into the
    /// route.
    fn store_tmp_attrs(&self, _route: &mut FilterRoute<'_>, _tmp: &EaList) {}

    fn preexport(&self, _route: &FilterRoute<'_>) -> Preexport {
        Preexport::Continue
    }

    /// All routes of the protocol have been flushed from all tables.
    fn flush_done(&self, _proto: ProtocolId) {}
}

/// Hooks for a protocol that does not want to be called.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ProtocolHooks for NoHooks {}

//------------ Protocol ------------------------------------------------------

/// A protocol instance registered with a [`Rib`].
pub struct Protocol {
    pub(crate) id: ProtocolId,
    pub(crate) name: String,
    pub(crate) kind: ProtocolKind,
    pub(crate) state: ProtoState,
    pub(crate) preference: u32,
    pub(crate) min_scope: Scope,
    pub(crate) import_filter: Filter,
    pub(crate) export_filter: Filter,
    pub(crate) announce: AnnounceMode,
    /// Salt for hashing the attribute blocks of this protocol.
    pub(crate) hash_key: u32,
    pub(crate) hooks: Rc<dyn ProtocolHooks>,
    pub(crate) stats: ImportStats,
    /// The number of routes of this protocol over all tables.
    pub(crate) routes: usize,
}

impl Protocol {
    pub fn id(&self) -> ProtocolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProtocolKind {
        self.kind
    }

    pub fn state(&self) -> ProtoState {
        self.state
    }

    pub fn preference(&self) -> u32 {
        self.preference
    }

    pub fn min_scope(&self) -> Scope {
        self.min_scope
    }

    pub fn announce_mode(&self) -> AnnounceMode {
        self.announce
    }

    pub fn import_filter(&self) -> &Filter {
        &self.import_filter
    }

    pub fn export_filter(&self) -> &Filter {
        &self.export_filter
    }

    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    pub fn route_count(&self) -> usize {
        self.routes
    }

    pub fn is_up(&self) -> bool {
        self.state == ProtoState::Up
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("preference", &self.preference)
            .field("min_scope", &self.min_scope)
            .field("announce", &self.announce)
            .finish()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, preference {})",
            self.name, self.kind, self.state, self.preference
        )
    }
}
