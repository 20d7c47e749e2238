//! Pruning: removing the routes of flushing protocols and the networks
//! that are left without routes.
//!
//! A prune pass walks the whole FIB of a table. It can run to completion
//! in one go, or a limited number of networks at a time, with the position
//! kept in the table in between.
use std::time::Instant;

use log::{debug, info};
use roaring::RoaringBitmap;

use crate::proto::{ProtoState, ProtocolId};
use crate::types::errors::RibError;

use super::rib::Rib;
use super::table::TableId;

/// The number of networks [`Rib::prune`] visits per step.
const PRUNE_STEP: usize = 512;

impl Rib {
    /// Run a complete prune pass over a table.
    pub fn prune(&mut self, table: TableId) -> Result<(), RibError> {
        while !self.prune_step(table, PRUNE_STEP)? {}
        Ok(())
    }

    /// Prune up to `limit` networks of a table. Returns true when the
    /// pass is complete.
    ///
    /// The set of flushing protocols is fixed when a pass starts. If a
    /// protocol starts flushing while a pass is in progress, the table
    /// stays flagged for another pass once this one is done.
    pub fn prune_step(
        &mut self,
        table: TableId,
        limit: usize,
    ) -> Result<bool, RibError> {
        self.check_table(table)?;
        let mut it = match self.table_mut(table).prune.take() {
            Some(it) => it,
            None => {
                let flushing: RoaringBitmap = self
                    .protocols
                    .iter()
                    .filter(|p| p.state == ProtoState::Flushing)
                    .map(|p| p.id.as_u32())
                    .collect();
                debug!(
                    "{}: prune pass started, {} protocols flushing",
                    table,
                    flushing.len()
                );
                let t = self.table_mut(table);
                t.reap_walks();
                t.flushing = flushing;
                t.fib.iter_init()
            }
        };

        self.update_nest += 1;
        let mut done = false;
        for _ in 0..limit {
            let Some(node) = self.table_mut(table).fib.iter_next(&mut it)
            else {
                done = true;
                break;
            };
            let victims: Vec<ProtocolId> = {
                let t = self.table_ref(table);
                let head = t.node_routes(node);
                t.routes
                    .iter(&head)
                    .map(|(_, r)| self.cache.get(r.attrs).proto)
                    .filter(|p| t.flushing.contains(p.as_u32()))
                    .collect()
            };
            for proto in victims {
                if !self.table_ref(table).fib.contains(node) {
                    break;
                }
                self.recalculate(table, node, proto, None);
                self.table_mut(table).pruned_routes += 1;
            }
            let t = self.table_mut(table);
            if t.fib.contains(node) && t.fib.node(node).data().is_empty() {
                t.fib.delete(node);
                t.pruned_networks += 1;
            }
        }
        self.update_nest -= 1;
        if self.update_nest == 0 {
            self.pool.flush();
        }

        let t = self.table_mut(table);
        if !done {
            t.prune = Some(it);
            return Ok(false);
        }
        t.fib.iter_release(it);
        t.gc_counter = 0;
        t.gc_time = Instant::now();
        t.prune_passes += 1;
        debug!("{}: prune pass done, {} networks left", table, t.fib.len());
        self.finish_flushes();

        let flushing = std::mem::take(&mut self.table_mut(table).flushing);
        let late = self.protocols.iter().any(|p| {
            p.state == ProtoState::Flushing
                && !flushing.contains(p.id.as_u32())
        });
        if late {
            debug!("{}: protocols started flushing during the pass", table);
        }
        self.table_mut(table).gc_pending = late;
        Ok(true)
    }

    /// Run the prune passes that were scheduled by withdrawals or protocol
    /// shutdowns. Returns the number of tables that were pruned.
    pub fn run_pending(&mut self) -> Result<usize, RibError> {
        let pending: Vec<TableId> = self
            .tables
            .iter()
            .filter(|t| t.gc_pending)
            .map(|t| t.id)
            .collect();
        for table in &pending {
            self.prune(*table)?;
        }
        Ok(pending.len())
    }

    /// Move flushing protocols without routes to `Down`.
    fn finish_flushes(&mut self) {
        let flushed: Vec<ProtocolId> = self
            .protocols
            .iter()
            .filter(|p| p.state == ProtoState::Flushing && p.routes == 0)
            .map(|p| p.id)
            .collect();
        for id in flushed {
            let p = self.protocol_mut(id);
            info!("{}: {} -> {}", p.name, p.state, ProtoState::Down);
            p.state = ProtoState::Down;
            let hooks = p.hooks.clone();
            hooks.flush_done(id);
        }
    }
}
