#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

//! The core of a multi-protocol routing table.
//!
//! This crate provides the data structures that sit between routing
//! protocols: routing tables that hold, per network, the routes all
//! protocols know, select the best one, and announce changes to every
//! protocol that subscribed to the table.
//!
//! The main parts are:
//!
//! * a hash table of networks (the FIB), with iterators that can be
//!   suspended and resumed while the table changes underneath them,
//! * a cache of route attribute blocks, that makes routes with equal
//!   attributes share a single block,
//! * the route update path: validation, import filtering, best route
//!   selection and export filtering per subscribed protocol.
//!
//! Routing protocols, the filter language, configuration files and
//! anything that does I/O live elsewhere. Protocols plug in through the
//! [`ProtocolHooks`](proto::ProtocolHooks) trait, filters through the
//! [`RouteFilter`](filter::RouteFilter) trait.
//!
//! Everything is single threaded: a [`Rib`](rib::Rib) is owned by one
//! thread and all work happens in calls to it.
pub mod attr_cache;
pub mod fib;
pub mod filter;
pub mod list;
pub mod pool;
pub mod proto;
mod types;

// re-exports
pub use inetnum::addr;

// Public Interfaces on the root of the crate

/// Routing tables and the route update path
pub mod rib;

/// Networks, route attributes and routes
pub use types::{attrs, eattrs, net, route};

/// Error types returned by a RIB
pub use types::errors;

/// Counters kept by a RIB
pub use types::stats;

#[doc(hidden)]
pub use types::test_types;

pub use types::{
    Cast, Dest, EaId, EaList, EaValue, Eattr, Iface, Net, RouteMetric,
    RouteSource, RouteView, Rta, Rte, RteFlags, Scope,
};

pub use attr_cache::{RtaCache, RtaRef};
pub use filter::{Filter, FilterRoute, FilterVerdict, RouteFilter};
pub use proto::{
    NoHooks, Preexport, ProtoState, ProtocolHooks, ProtocolId, ProtocolKind,
};
pub use rib::{RouteCandidate, Rib, TableId};
