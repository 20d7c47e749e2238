use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use roaring::RoaringBitmap;

use crate::fib::{Fib, FibIterator, NodeId};
use crate::list::{ListArena, ListHead, ListId};
use crate::types::net::Net;
use crate::types::route::Rte;
use crate::types::stats::TableStats;

use super::config::TableConfig;

//------------ TableId -------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

//------------ Network -------------------------------------------------------

/// The payload of a FIB node in a routing table: the list of routes for
/// the network, best route first.
///
/// A network that lost its last route stays in the FIB, empty, until the
/// next prune pass of the table removes it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Network {
    pub(crate) routes: ListHead,
}

impl Network {
    pub(crate) fn new(_net: &Net) -> Self {
        Self::default()
    }

    pub fn routes(&self) -> &ListHead {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

//------------ RoutingTable --------------------------------------------------

pub struct RoutingTable {
    pub(crate) id: TableId,
    pub(crate) config: TableConfig,
    pub(crate) fib: Fib<Network>,
    pub(crate) routes: ListArena<Rte>,
    /// The announce hooks of the protocols connected to this table.
    pub(crate) hooks: ListHead,
    pub(crate) gc_counter: u32,
    pub(crate) gc_time: Instant,
    pub(crate) gc_pending: bool,
    /// The position of an unfinished prune pass.
    pub(crate) prune: Option<FibIterator>,
    /// The protocols that were flushing when the current prune pass
    /// started.
    pub(crate) flushing: RoaringBitmap,
    /// The positions of paged walks, next to a handle that tells whether
    /// the walk still exists.
    pub(crate) walks: Vec<(Weak<()>, FibIterator)>,
    pub(crate) prune_passes: u64,
    pub(crate) pruned_routes: u64,
    pub(crate) pruned_networks: u64,
}

impl RoutingTable {
    pub(crate) fn new(id: TableId, config: TableConfig) -> Self {
        Self {
            id,
            fib: Fib::new(config.fib_order, Network::new),
            config,
            routes: ListArena::new(),
            hooks: ListHead::new(),
            gc_counter: 0,
            gc_time: Instant::now(),
            gc_pending: false,
            prune: None,
            flushing: RoaringBitmap::new(),
            walks: Vec::new(),
            prune_passes: 0,
            pruned_routes: 0,
            pruned_networks: 0,
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn fib(&self) -> &Fib<Network> {
        &self.fib
    }

    /// The number of networks in the table, including empty networks that
    /// have not been pruned yet.
    pub fn network_count(&self) -> usize {
        self.fib.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn find(&self, net: &Net) -> Option<NodeId> {
        self.fib.find(net)
    }

    pub fn network(&self, net: &Net) -> Option<&Network> {
        self.fib.find(net).map(|id| self.fib.node(id).data())
    }

    /// The best route for a network.
    pub fn best(&self, net: &Net) -> Option<&Rte> {
        let first = self.network(net)?.routes.first()?;
        self.routes.get(first)
    }

    /// All routes for a network, best route first.
    pub fn routes(&self, net: &Net) -> Vec<&Rte> {
        match self.network(net) {
            Some(n) => self.routes.iter(&n.routes).map(|(_, r)| r).collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn node_routes(&self, node: NodeId) -> ListHead {
        self.fib.node(node).data().routes
    }

    pub(crate) fn route(&self, id: ListId) -> &Rte {
        match self.routes.get(id) {
            Some(rte) => rte,
            None => missing_route(id),
        }
    }

    /// Whether a prune pass should run.
    pub fn gc_pending(&self) -> bool {
        self.gc_pending
    }

    /// Whether a prune pass is in progress.
    pub fn is_pruning(&self) -> bool {
        self.prune.is_some()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            networks: self.fib.len(),
            routes: self.routes.len(),
            prune_passes: self.prune_passes,
            pruned_routes: self.pruned_routes,
            pruned_networks: self.pruned_networks,
        }
    }

    /// Take the position of a walk out of the table.
    pub(crate) fn take_walk(&mut self, token: &Rc<()>) -> Option<FibIterator> {
        let pos = self
            .walks
            .iter()
            .position(|(w, _)| std::ptr::eq(w.as_ptr(), Rc::as_ptr(token)))?;
        Some(self.walks.swap_remove(pos).1)
    }

    /// Release the positions of walks that were dropped unfinished.
    pub(crate) fn reap_walks(&mut self) {
        let (live, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.walks)
            .into_iter()
            .partition(|(w, _)| w.strong_count() > 0);
        for (_, it) in dropped {
            self.fib.iter_release(it);
        }
        self.walks = live;
    }

    /// Count a network that lost its last route, and flag the table for
    /// pruning if enough of them have piled up.
    pub(crate) fn count_gc_op(&mut self) {
        self.gc_counter = self.gc_counter.saturating_add(1);
        if self.gc_counter >= self.config.gc_max_ops
            && self.gc_time.elapsed().as_secs() >= self.config.gc_min_time
        {
            self.gc_pending = true;
        }
    }
}

impl fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("networks", &self.fib.len())
            .field("routes", &self.routes.len())
            .field("gc_pending", &self.gc_pending)
            .finish()
    }
}

#[allow(clippy::panic)]
fn missing_route(id: ListId) -> ! {
    panic!("table: route {} does not exist", id)
}
