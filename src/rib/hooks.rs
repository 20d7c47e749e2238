//! Announce hooks: the subscriptions of protocols to route changes in a
//! table, and the export path that runs for every subscriber.
use std::borrow::Cow;
use std::rc::Rc;

use log::trace;

use crate::attr_cache::RtaRef;
use crate::fib::FibIterator;
use crate::filter::{Filter, FilterRoute};
use crate::list::ListId;
use crate::proto::{Preexport, ProtocolHooks, ProtocolId};
use crate::types::eattrs::EaList;
use crate::types::net::{Net, Scope};
use crate::types::route::Rte;
use crate::types::stats::ExportStats;

use super::config::AnnounceMode;
use super::rib::Rib;
use super::table::TableId;

/// The handle of an announce hook.
pub type HookId = ListId;

//------------ AnnounceHook --------------------------------------------------

#[derive(Debug)]
pub struct AnnounceHook {
    pub(crate) table: TableId,
    pub(crate) proto: ProtocolId,
    pub(crate) stats: ExportStats,
    /// The position of an unfinished initial feed.
    pub(crate) feed: Option<FibIterator>,
}

impl AnnounceHook {
    pub(crate) fn new(table: TableId, proto: ProtocolId) -> Self {
        Self {
            table,
            proto,
            stats: ExportStats::default(),
            feed: None,
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn proto(&self) -> ProtocolId {
        self.proto
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    pub fn is_feeding(&self) -> bool {
        self.feed.is_some()
    }
}

/// A route that passed export filtering for one hook. If the filter
/// changed the attributes, `rte` points to a temporary block.
struct Exported {
    rte: Rte,
    tmp_attrs: EaList,
}

/// Everything needed to run the export path of one hook, copied out of
/// the RIB so that the RIB can be borrowed mutably while it runs.
struct ExportCtx {
    hooks: Rc<dyn ProtocolHooks>,
    filter: Filter,
    min_scope: Scope,
}

impl Rib {
    /// Announce a change of `net` in `table` to every hook that wants to
    /// hear about changes of the kind `mode`.
    pub(crate) fn announce(
        &mut self,
        table: TableId,
        mode: AnnounceMode,
        net: Net,
        new: Option<&Rte>,
        old: Option<&Rte>,
    ) {
        if new.is_none() && old.is_none() {
            return;
        }
        let Some(t) = self.tables.get(table.index()) else {
            return;
        };
        // Hooks may come and go while protocols are notified, so walk a
        // snapshot and skip whatever disappeared.
        let hooks = self.hooks.ids(&t.hooks);
        for hook in hooks {
            let wants = self
                .hooks
                .get(hook)
                .and_then(|h| self.protocols.get(h.proto.index()))
                .is_some_and(|p| p.announce == mode);
            if wants {
                self.announce_to_hook(hook, net, new, old);
            }
        }
    }

    /// Run the export path for one hook, and notify its protocol if
    /// anything is left.
    pub(crate) fn announce_to_hook(
        &mut self,
        hook: HookId,
        net: Net,
        new: Option<&Rte>,
        old: Option<&Rte>,
    ) {
        let Some((table, proto)) =
            self.hooks.get(hook).map(|h| (h.table, h.proto))
        else {
            return;
        };
        let ctx = match self.protocols.get(proto.index()) {
            Some(p) if p.is_up() => ExportCtx {
                hooks: p.hooks.clone(),
                filter: p.export_filter.clone(),
                min_scope: p.min_scope,
            },
            _ => return,
        };

        // The routes have to outlive anything the protocol does in
        // rt_notify, including withdrawing them.
        let held: Vec<RtaRef> = new
            .iter()
            .chain(old.iter())
            .map(|r| self.cache.clone_ref(r.attrs))
            .collect();

        let new_exp = new.and_then(|r| self.export(&ctx, net, r));
        let old_exp = old.and_then(|r| self.export(&ctx, net, r));

        if let Some(h) = self.hooks.get_mut(hook) {
            if new.is_some() {
                h.stats.updates_received += 1;
                match new_exp {
                    Some(_) => h.stats.updates_accepted += 1,
                    None => h.stats.updates_rejected += 1,
                }
            } else {
                h.stats.withdraws_received += 1;
                if old_exp.is_some() {
                    h.stats.withdraws_accepted += 1;
                }
            }
        }

        if new_exp.is_some() || old_exp.is_some() {
            let empty = EaList::new();
            let tmp_attrs = new_exp
                .as_ref()
                .map(|e| &e.tmp_attrs)
                .unwrap_or(&empty);
            trace!(
                "{} < {} {}",
                proto,
                net,
                if new_exp.is_some() { "added" } else { "removed" }
            );
            ctx.hooks.rt_notify(
                self,
                table,
                net,
                new_exp.as_ref().map(|e| &e.rte),
                old_exp.as_ref().map(|e| &e.rte),
                tmp_attrs,
            );
        }

        for e in new_exp.iter().chain(old_exp.iter()) {
            self.cache.release(e.rte.attrs);
        }
        for r in held {
            self.cache.release(r);
        }
    }

    /// Export filtering of a single route for one hook: the scope check,
    /// the preexport hook and the export filter. The returned route holds
    /// a use of its attributes, to be released by the caller.
    fn export(&mut self, ctx: &ExportCtx, net: Net, rte: &Rte) -> Option<Exported> {
        let rta = self.cache.get(rte.attrs);
        if rta.scope < ctx.min_scope {
            trace!("{} out of scope for export", net);
            return None;
        }
        let mut route = FilterRoute::new(
            net,
            Cow::Borrowed(rta),
            rte.pref,
            rte.metric.clone(),
        );
        let accepted = match ctx.hooks.preexport(&route) {
            Preexport::Accept => true,
            Preexport::Reject => false,
            Preexport::Continue => ctx.filter.apply(
                ctx.hooks.as_ref(),
                &mut route,
                &mut self.pool,
                false,
            ),
        };
        if !accepted {
            return None;
        }
        let (attrs, pref, metric, tmp_attrs) = route.into_parts();
        let modified = match attrs {
            Cow::Owned(rta) => Some(rta),
            Cow::Borrowed(_) => None,
        };
        let attrs = match modified {
            Some(rta) => {
                let salt = self.hash_key(rta.proto);
                self.cache.lookup(rta, salt)
            }
            None => self.cache.clone_ref(rte.attrs),
        };
        Some(Exported {
            rte: Rte {
                attrs,
                pref,
                metric,
                ..rte.clone()
            },
            tmp_attrs,
        })
    }
}
