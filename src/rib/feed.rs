//! Initial feeds: bringing a newly subscribed protocol up to date with the
//! content of a table.
use log::debug;

use crate::attr_cache::RtaRef;
use crate::types::errors::RibError;
use crate::types::route::{Rte, RteFlags};

use super::config::AnnounceMode;
use super::hooks::HookId;
use super::rib::Rib;

/// The number of networks [`Rib::feed`] announces per step.
const FEED_STEP: usize = 256;

impl Rib {
    /// Feed a hook the complete content of its table.
    pub fn feed(&mut self, hook: HookId) -> Result<(), RibError> {
        while !self.feed_step(hook, FEED_STEP)? {}
        Ok(())
    }

    /// Announce up to `limit` networks of the table to a hook, as if all
    /// their routes were new: the best route for protocols that take
    /// optimal announcements, every route for the others. Returns true
    /// once the whole table has been fed.
    ///
    /// The scratch pool is flushed after every network, unless the feed
    /// runs inside a route update.
    pub fn feed_step(
        &mut self,
        hook: HookId,
        limit: usize,
    ) -> Result<bool, RibError> {
        let (table, proto) = self
            .hooks
            .get(hook)
            .map(|h| (h.table, h.proto))
            .ok_or(RibError::HookNotFound)?;
        let mode = self.protocol(proto)?.announce;
        let mut it = match self.hooks.get_mut(hook).and_then(|h| h.feed.take())
        {
            Some(it) => it,
            None => {
                debug!("feeding {} from {}", proto, table);
                self.table_mut(table).fib.iter_init()
            }
        };

        for _ in 0..limit {
            let Some(node) = self.table_mut(table).fib.iter_next(&mut it)
            else {
                self.table_mut(table).fib.iter_release(it);
                debug!("feeding {} from {} done", proto, table);
                return Ok(true);
            };
            let t = self.table_ref(table);
            let net = *t.fib.node(node).net();
            let head = t.node_routes(node);
            let routes: Vec<Rte> = match mode {
                AnnounceMode::Optimal => head
                    .first()
                    .map(|id| t.route(id).clone())
                    .into_iter()
                    .collect(),
                AnnounceMode::Any => {
                    t.routes.iter(&head).map(|(_, r)| r.clone()).collect()
                }
            };
            // The protocol may withdraw routes of the network while it is
            // being fed.
            let held: Vec<RtaRef> = routes
                .iter()
                .map(|r| self.cache.clone_ref(r.attrs))
                .collect();
            for mut rte in routes {
                rte.flags.insert(RteFlags::FEED);
                self.announce_to_hook(hook, net, Some(&rte), None);
            }
            for r in held {
                self.cache.release(r);
            }
            if self.update_nest == 0 {
                self.pool.flush();
            }
            if !self.hooks.contains(hook) {
                // Disconnected by the protocol itself.
                self.table_mut(table).fib.iter_release(it);
                return Ok(true);
            }
        }

        match self.hooks.get_mut(hook) {
            Some(h) => h.feed = Some(it),
            None => self.table_mut(table).fib.iter_release(it),
        }
        Ok(false)
    }
}
