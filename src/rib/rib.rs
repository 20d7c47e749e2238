use std::rc::Rc;

use log::{debug, info};

use crate::attr_cache::{RtaCache, RtaRef};
use crate::list::ListArena;
use crate::pool::LinPool;
use crate::proto::{ProtoState, Protocol, ProtocolHooks, ProtocolId};
use crate::types::attrs::Rta;
use crate::types::errors::RibError;
use crate::types::net::Net;
use crate::types::route::Rte;
use crate::types::stats::RibStats;

use super::config::{ProtocolConfig, RibConfig, TableConfig};
use super::hooks::{AnnounceHook, HookId};
use super::table::{RoutingTable, TableId};

//------------ Rib -----------------------------------------------------------

/// The routing information base: a set of routing tables, the protocols
/// that feed them, and the attribute cache they share.
///
/// All operations go through this object, there is no global state. A
/// `Rib` is meant to be owned by a single thread.
pub struct Rib {
    pub(crate) config: RibConfig,
    pub(crate) tables: Vec<RoutingTable>,
    pub(crate) protocols: Vec<Protocol>,
    pub(crate) cache: RtaCache,
    pub(crate) hooks: ListArena<AnnounceHook>,
    /// Scratch memory for filters.
    pub(crate) pool: LinPool,
    /// How deep the current call stack is nested in route updates.
    pub(crate) update_nest: u32,
}

impl Rib {
    /// Create a RIB with the tables from `config`.
    pub fn new(config: RibConfig) -> Result<Self, RibError> {
        config.check()?;
        let mut rib = Self {
            tables: Vec::new(),
            protocols: Vec::new(),
            cache: RtaCache::new(),
            hooks: ListArena::new(),
            pool: LinPool::new(config.pool_chunk_size),
            update_nest: 0,
            config: config.clone(),
        };
        for table in config.tables {
            rib.add_table(table)?;
        }
        Ok(rib)
    }

    /// Create a RIB with a default configuration, i.e. with a single
    /// table called "master".
    pub fn try_default() -> Result<Self, RibError> {
        Self::new(RibConfig::default())
    }

    pub fn config(&self) -> &RibConfig {
        &self.config
    }

    //--- Tables

    pub fn add_table(
        &mut self,
        config: TableConfig,
    ) -> Result<TableId, RibError> {
        if self.tables.iter().any(|t| t.name() == config.name) {
            return Err(RibError::DuplicateName(config.name));
        }
        let id = TableId(self.tables.len() as u32);
        info!("creating routing table {}", config.name);
        self.tables.push(RoutingTable::new(id, config));
        Ok(id)
    }

    pub fn table_id(&self, name: &str) -> Result<TableId, RibError> {
        self.tables
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.id)
            .ok_or_else(|| RibError::TableNotFound(name.to_string()))
    }

    pub fn table(&self, id: TableId) -> Result<&RoutingTable, RibError> {
        self.tables
            .get(id.index())
            .ok_or_else(|| RibError::TableNotFound(id.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &RoutingTable> {
        self.tables.iter()
    }

    pub(crate) fn check_table(&self, id: TableId) -> Result<(), RibError> {
        self.table(id).map(|_| ())
    }

    /// A table that is known to exist.
    pub(crate) fn table_ref(&self, id: TableId) -> &RoutingTable {
        match self.tables.get(id.index()) {
            Some(t) => t,
            None => unknown(&id),
        }
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> &mut RoutingTable {
        match self.tables.get_mut(id.index()) {
            Some(t) => t,
            None => unknown(&id),
        }
    }

    /// The best route for `net` in `table`.
    pub fn best_route(&self, table: TableId, net: &Net) -> Option<&Rte> {
        self.tables.get(table.index())?.best(net)
    }

    //--- Protocols

    /// Register a protocol instance. The protocol starts out `Down`, and
    /// is connected to the table named in its configuration, if any.
    pub fn add_protocol(
        &mut self,
        config: ProtocolConfig,
        hooks: Rc<dyn ProtocolHooks>,
    ) -> Result<ProtocolId, RibError> {
        if self.protocols.iter().any(|p| p.name == config.name) {
            return Err(RibError::DuplicateName(config.name));
        }
        let table = match &config.table {
            Some(name) => Some(self.table_id(name)?),
            None => None,
        };
        let id = ProtocolId(self.protocols.len() as u32);
        self.protocols.push(Protocol {
            id,
            name: config.name.clone(),
            kind: config.kind,
            state: ProtoState::Down,
            preference: config.preference(),
            min_scope: config.min_scope,
            import_filter: config.import_filter(),
            export_filter: config.export_filter(),
            announce: config.announce,
            hash_key: rand::random::<u32>(),
            hooks,
            stats: Default::default(),
            routes: 0,
        });
        debug!("added protocol {} as {}", config.name, id);
        if let Some(table) = table {
            self.connect(id, table)?;
        }
        Ok(id)
    }

    pub fn protocol_id(&self, name: &str) -> Result<ProtocolId, RibError> {
        self.protocols
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .ok_or_else(|| RibError::ProtocolNotFound(name.to_string()))
    }

    pub fn protocol(&self, id: ProtocolId) -> Result<&Protocol, RibError> {
        self.protocols
            .get(id.index())
            .ok_or_else(|| RibError::ProtocolNotFound(id.to_string()))
    }

    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter()
    }

    pub(crate) fn check_protocol(
        &self,
        id: ProtocolId,
    ) -> Result<(), RibError> {
        self.protocol(id).map(|_| ())
    }

    pub(crate) fn protocol_ref(&self, id: ProtocolId) -> &Protocol {
        match self.protocols.get(id.index()) {
            Some(p) => p,
            None => unknown(&id),
        }
    }

    pub(crate) fn protocol_mut(&mut self, id: ProtocolId) -> &mut Protocol {
        match self.protocols.get_mut(id.index()) {
            Some(p) => p,
            None => unknown(&id),
        }
    }

    pub(crate) fn hash_key(&self, id: ProtocolId) -> u32 {
        self.protocols
            .get(id.index())
            .map(|p| p.hash_key)
            .unwrap_or(0)
    }

    /// Move a protocol to a new state.
    ///
    /// A protocol that comes up gets fed the current content of all tables
    /// it is connected to. Taking a protocol down flushes its routes, see
    /// [`shutdown_protocol`](Self::shutdown_protocol).
    pub fn set_protocol_state(
        &mut self,
        id: ProtocolId,
        state: ProtoState,
    ) -> Result<(), RibError> {
        let old = self.protocol(id)?.state;
        if old == state {
            return Ok(());
        }
        if matches!(state, ProtoState::Flushing | ProtoState::Down) {
            return self.shutdown_protocol(id);
        }
        info!("{}: {} -> {}", self.protocol_ref(id).name, old, state);
        self.protocol_mut(id).state = state;
        if state == ProtoState::Up {
            for hook in self.hooks_of(id) {
                self.feed(hook)?;
            }
        }
        Ok(())
    }

    /// Take a protocol down: disconnect it from all tables, and let the
    /// next prune pass of every table remove its routes. Once all routes
    /// are gone, the protocol goes `Down` and its `flush_done` hook is
    /// called. A protocol without routes goes down right away.
    pub fn shutdown_protocol(
        &mut self,
        id: ProtocolId,
    ) -> Result<(), RibError> {
        for hook in self.hooks_of(id) {
            self.disconnect(hook)?;
        }
        let p = self.protocol_mut(id);
        if p.routes == 0 {
            info!("{}: {} -> {}", p.name, p.state, ProtoState::Down);
            p.state = ProtoState::Down;
            let hooks = p.hooks.clone();
            hooks.flush_done(id);
            return Ok(());
        }
        info!("{}: {} -> {}", p.name, p.state, ProtoState::Flushing);
        p.state = ProtoState::Flushing;
        for table in &mut self.tables {
            table.gc_pending = true;
        }
        Ok(())
    }

    //--- Announce hooks

    /// Subscribe protocol `proto` to the changes in `table`. If the
    /// protocol is up, it is fed the current content of the table right
    /// away.
    pub fn connect(
        &mut self,
        proto: ProtocolId,
        table: TableId,
    ) -> Result<HookId, RibError> {
        let name = self.protocol(proto)?.name.clone();
        let t = self.table(table)?;
        if self.hooks.iter(&t.hooks).any(|(_, h)| h.proto == proto) {
            return Err(RibError::AlreadyConnected(name));
        }
        let Rib { tables, hooks, .. } = self;
        let Some(t) = tables.get_mut(table.index()) else {
            return Err(RibError::TableNotFound(table.to_string()));
        };
        let hook =
            hooks.push_back(&mut t.hooks, AnnounceHook::new(table, proto));
        debug!("{} connected to {}", name, t.name());
        if self.protocol_ref(proto).is_up() {
            self.feed(hook)?;
        }
        Ok(hook)
    }

    /// Remove an announce hook. An unfinished feed is abandoned.
    pub fn disconnect(&mut self, hook: HookId) -> Result<(), RibError> {
        let table = self.hooks.get(hook).ok_or(RibError::HookNotFound)?.table;
        let Rib { tables, hooks, .. } = self;
        let Some(t) = tables.get_mut(table.index()) else {
            return Err(RibError::TableNotFound(table.to_string()));
        };
        let removed = hooks.unlink(&mut t.hooks, hook);
        if let Some(it) = removed.feed {
            t.fib.iter_release(it);
        }
        debug!("{} disconnected from {}", removed.proto, t.name());
        Ok(())
    }

    pub fn hook(&self, hook: HookId) -> Option<&AnnounceHook> {
        self.hooks.get(hook)
    }

    /// The announce hooks of a protocol.
    pub fn hooks_of(&self, proto: ProtocolId) -> Vec<HookId> {
        self.tables
            .iter()
            .flat_map(|t| self.hooks.iter(&t.hooks))
            .filter(|(_, h)| h.proto == proto)
            .map(|(id, _)| id)
            .collect()
    }

    //--- Attributes

    /// The attributes of a route.
    pub fn rta(&self, attrs: RtaRef) -> &Rta {
        self.cache.get(attrs)
    }

    /// Put attributes into the cache ahead of an update, so that several
    /// routes can share them. The returned reference holds a use that has
    /// to be given back with [`release_attrs`](Self::release_attrs).
    pub fn lookup_attrs(&mut self, rta: Rta) -> RtaRef {
        let salt = self.hash_key(rta.proto);
        self.cache.lookup(rta, salt)
    }

    pub fn clone_attrs(&mut self, attrs: RtaRef) -> RtaRef {
        self.cache.clone_ref(attrs)
    }

    pub fn release_attrs(&mut self, attrs: RtaRef) {
        self.cache.release(attrs)
    }

    pub fn cache(&self) -> &RtaCache {
        &self.cache
    }

    pub fn pool(&self) -> &LinPool {
        &self.pool
    }

    //--- Statistics

    pub fn stats(&self) -> RibStats {
        let (rta_lookups, rta_hits) = self.cache.hit_stats();
        RibStats {
            tables: self
                .tables
                .iter()
                .map(|t| (t.name().to_string(), t.stats()))
                .collect(),
            cached_rtas: self.cache.len(),
            rta_lookups,
            rta_hits,
            pool_peak: self.pool.peak(),
        }
    }
}

impl std::fmt::Debug for Rib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rib")
            .field("tables", &self.tables)
            .field("protocols", &self.protocols)
            .field("cached_rtas", &self.cache.len())
            .finish()
    }
}

#[allow(clippy::panic)]
fn unknown(id: &dyn std::fmt::Display) -> ! {
    panic!("rib: {} does not exist", id)
}
