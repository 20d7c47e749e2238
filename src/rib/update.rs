//! The route update path: validation, import filtering, canonicalization,
//! best route selection and announcement.
use std::borrow::Cow;
use std::time::Instant;

use log::{trace, warn};

use crate::attr_cache::{RtaCache, RtaRef};
use crate::fib::NodeId;
use crate::filter::FilterRoute;
use crate::list::ListId;
use crate::proto::{Protocol, ProtocolId};
use crate::types::attrs::Rta;
use crate::types::errors::RibError;
use crate::types::net::{AddrClass, Net, Scope};
use crate::types::route::{RouteMetric, RouteView, Rte, RteFlags};

use super::config::AnnounceMode;
use super::rib::Rib;
use super::table::TableId;

//------------ RouteCandidate ------------------------------------------------

/// The attributes of a route handed to [`Rib::update`].
#[derive(Clone, Debug)]
pub enum Attrs {
    /// Attributes that still have to go through the attribute cache.
    New(Rta),
    /// A block the protocol already holds a use of. The table takes a use
    /// of its own, the protocol keeps its use.
    Cached(RtaRef),
}

/// A route as a protocol submits it.
#[derive(Clone, Debug)]
pub struct RouteCandidate {
    pub attrs: Attrs,
    /// The preference of the route. Defaults to the preference of the
    /// protocol.
    pub pref: Option<u32>,
    pub metric: RouteMetric,
}

impl RouteCandidate {
    pub fn new(rta: Rta) -> Self {
        Self {
            attrs: Attrs::New(rta),
            pref: None,
            metric: RouteMetric::None,
        }
    }

    pub fn cached(attrs: RtaRef) -> Self {
        Self {
            attrs: Attrs::Cached(attrs),
            pref: None,
            metric: RouteMetric::None,
        }
    }

    pub fn with_pref(mut self, pref: u32) -> Self {
        self.pref = Some(pref);
        self
    }

    pub fn with_metric(mut self, metric: RouteMetric) -> Self {
        self.metric = metric;
        self
    }
}

//------------ Route comparison ----------------------------------------------

/// Is `new` a better route than `old`? Higher preference wins, then the
/// protocol kind, and routes of the same kind are compared by the
/// protocol that owns `new`.
pub(crate) fn rte_better(
    cache: &RtaCache,
    protocols: &[Protocol],
    new: Option<&Rte>,
    old: Option<&Rte>,
) -> bool {
    let (new, old) = match (new, old) {
        (None, _) => return false,
        (Some(_), None) => return true,
        (Some(new), Some(old)) => (new, old),
    };
    if new.pref != old.pref {
        return new.pref > old.pref;
    }
    let (new_attrs, old_attrs) = (cache.get(new.attrs), cache.get(old.attrs));
    let (Some(new_proto), Some(old_proto)) = (
        protocols.get(new_attrs.proto.index()),
        protocols.get(old_attrs.proto.index()),
    ) else {
        return false;
    };
    if new_proto.kind != old_proto.kind {
        return new_proto.kind < old_proto.kind;
    }
    new_proto.hooks.better(
        RouteView {
            rte: new,
            attrs: new_attrs,
        },
        RouteView {
            rte: old,
            attrs: old_attrs,
        },
    )
}

//------------ Update --------------------------------------------------------

impl Rib {
    /// Add, replace or withdraw the route of protocol `proto` for `net` in
    /// `table`.
    ///
    /// Routes that fail validation or are rejected by the import filter
    /// are not errors: they are logged and counted, and withdraw whatever
    /// route the protocol had for the network before. Errors are only
    /// returned for unknown tables and protocols.
    ///
    /// Protocols may call this method from within their hooks.
    pub fn update(
        &mut self,
        table: TableId,
        net: Net,
        proto: ProtocolId,
        new: Option<RouteCandidate>,
    ) -> Result<(), RibError> {
        self.check_table(table)?;
        self.check_protocol(proto)?;
        self.update_nest += 1;
        match new {
            Some(new) => self.update_route(table, net, proto, new),
            None => self.withdraw_route(table, net, proto),
        }
        self.update_nest -= 1;
        if self.update_nest == 0 {
            self.pool.flush();
        }
        Ok(())
    }

    /// Withdraw the route of `proto` for `net` without any checks. Used to
    /// force routes out of a table.
    pub fn discard(
        &mut self,
        table: TableId,
        net: Net,
        proto: ProtocolId,
    ) -> Result<(), RibError> {
        self.check_table(table)?;
        self.check_protocol(proto)?;
        if let Some(node) = self.table_ref(table).find(&net) {
            self.update_nest += 1;
            self.recalculate(table, node, proto, None);
            self.update_nest -= 1;
            if self.update_nest == 0 {
                self.pool.flush();
            }
        }
        Ok(())
    }

    fn update_route(
        &mut self,
        table: TableId,
        net: Net,
        proto: ProtocolId,
        new: RouteCandidate,
    ) {
        let p = self.protocol_ref(proto);
        if !p.is_up() {
            trace!("{} > {} ignored, protocol is {}", p.name, net, p.state);
            self.protocol_mut(proto).stats.updates_filtered += 1;
            return;
        }
        let (filter, hooks, min_scope) =
            (p.import_filter.clone(), p.hooks.clone(), p.min_scope);
        self.protocol_mut(proto).stats.updates_received += 1;

        if !net_is_valid(&net, min_scope) {
            warn!(
                "{}: ignoring bogus route {}",
                self.protocol_ref(proto).name,
                net
            );
            self.protocol_mut(proto).stats.updates_invalid += 1;
            self.drop_route(table, net, proto);
            return;
        }
        if filter.is_reject() {
            trace!("{} > {} filtered out", proto, net);
            self.protocol_mut(proto).stats.updates_filtered += 1;
            self.drop_route(table, net, proto);
            return;
        }

        let pref = new.pref.unwrap_or(self.protocol_ref(proto).preference);
        let filtered = {
            let attrs = match &new.attrs {
                Attrs::New(rta) => Cow::Borrowed(rta),
                Attrs::Cached(r) => Cow::Borrowed(self.cache.get(*r)),
            };
            let mut route =
                FilterRoute::new(net, attrs, pref, new.metric.clone());
            if filter.apply(hooks.as_ref(), &mut route, &mut self.pool, true)
            {
                let (attrs, pref, metric, _) = route.into_parts();
                let modified = match attrs {
                    Cow::Owned(rta) => Some(rta),
                    Cow::Borrowed(_) => None,
                };
                Some((modified, pref, metric))
            } else {
                None
            }
        };
        let Some((modified, pref, metric)) = filtered else {
            trace!("{} > {} filtered out", proto, net);
            self.protocol_mut(proto).stats.updates_filtered += 1;
            self.drop_route(table, net, proto);
            return;
        };

        let salt = self.protocol_ref(proto).hash_key;
        let attrs = match (modified, new.attrs) {
            (Some(rta), _) | (None, Attrs::New(rta)) => {
                self.cache.lookup(rta, salt)
            }
            (None, Attrs::Cached(r)) => self.cache.clone_ref(r),
        };
        let node = self.table_mut(table).fib.get(&net);
        let rte = Rte {
            net: node,
            attrs,
            pref,
            lastmod: Instant::now(),
            flags: RteFlags::empty(),
            metric,
        };
        self.recalculate(table, node, proto, Some(rte));
    }

    fn withdraw_route(&mut self, table: TableId, net: Net, proto: ProtocolId) {
        let p = self.protocol_mut(proto);
        p.stats.withdraws_received += 1;
        if !net_is_valid(&net, p.min_scope) {
            warn!("{}: ignoring withdrawal of bogus route {}", p.name, net);
            p.stats.withdraws_invalid += 1;
            return;
        }
        match self.table_ref(table).find(&net) {
            Some(node) => self.recalculate(table, node, proto, None),
            None => {
                self.protocol_mut(proto).stats.withdraws_ignored += 1;
            }
        }
    }

    /// A route that did not make it into the table replaces the route
    /// the protocol had for the network, so that one has to go.
    fn drop_route(&mut self, table: TableId, net: Net, proto: ProtocolId) {
        if let Some(node) = self.table_ref(table).find(&net) {
            if self.route_of(table, node, proto).is_some() {
                self.recalculate(table, node, proto, None);
            }
        }
    }

    /// The route of `proto` in the list of `node`, if any.
    fn route_of(
        &self,
        table: TableId,
        node: NodeId,
        proto: ProtocolId,
    ) -> Option<ListId> {
        let t = self.table_ref(table);
        let head = t.node_routes(node);
        t.routes
            .iter(&head)
            .find(|(_, r)| self.cache.get(r.attrs).proto == proto)
            .map(|(id, _)| id)
    }

    /// Replace the route of `proto` for the network at `node` with `new`,
    /// find the new best route, and tell everyone who needs to know.
    ///
    /// `new` holds a use of its attributes, that passes to the table.
    pub(crate) fn recalculate(
        &mut self,
        table: TableId,
        node: NodeId,
        proto: ProtocolId,
        new: Option<Rte>,
    ) {
        if let Some(new) = &new {
            assert_eq!(
                self.cache.get(new.attrs).proto,
                proto,
                "rib: route for {} attributed to the wrong protocol",
                self.table_ref(table).fib.node(node).net()
            );
        }
        let net = *self.table_ref(table).fib.node(node).net();
        let old_id = self.route_of(table, node, proto);

        if let (Some(old_id), Some(new_rte)) = (old_id, &new) {
            if self.table_ref(table).route(old_id).same(new_rte) {
                trace!("{} > {} ignored, route unchanged", proto, net);
                self.cache.release(new_rte.attrs);
                self.protocol_mut(proto).stats.updates_ignored += 1;
                return;
            }
        }
        if old_id.is_none() && new.is_none() {
            self.protocol_mut(proto).stats.withdraws_ignored += 1;
            return;
        }

        let Rib {
            tables,
            protocols,
            cache,
            ..
        } = self;
        let Some(t) = tables.get_mut(table.index()) else {
            return;
        };
        let mut head = t.node_routes(node);
        let old_best_id = head.first();
        let old_best_removed = old_id.is_some() && old_id == old_best_id;
        let old = old_id.map(|id| t.routes.unlink(&mut head, id));
        let old_best = if old_best_removed {
            old.clone()
        } else {
            old_best_id.map(|id| t.route(id).clone())
        };

        if rte_better(cache, protocols, new.as_ref(), old_best.as_ref()) {
            // The new route beats the old best route.
            if let Some(new) = &new {
                t.routes.push_front(&mut head, new.clone());
            }
        } else if old_best_removed || old_best.is_none() {
            // The old best route is gone: elect a new one.
            if let Some(new) = &new {
                t.routes.push_front(&mut head, new.clone());
            }
            let mut best: Option<ListId> = None;
            for (id, rte) in t.routes.iter(&head) {
                let current = best.map(|b| t.route(b));
                if best.is_none()
                    || rte_better(cache, protocols, Some(rte), current)
                {
                    best = Some(id);
                }
            }
            if let Some(best) = best {
                t.routes.move_to_front(&mut head, best);
            }
        } else if let (Some(new), Some(first)) = (&new, head.first()) {
            // Not the best route, and the old best route is still there.
            t.routes.insert_after(&mut head, first, new.clone());
        }
        t.fib.node_mut(node).data_mut().routes = head;

        let best_changed = if old_best_removed {
            true
        } else {
            head.first() != old_best_id
        };
        let new_best = head.first().map(|id| t.route(id).clone());
        if head.is_empty() {
            t.count_gc_op();
        }

        if let Some(p) = protocols.get_mut(proto.index()) {
            match (&new, &old) {
                (Some(_), None) => {
                    p.routes += 1;
                    p.stats.updates_accepted += 1;
                }
                (Some(_), Some(_)) => p.stats.updates_accepted += 1,
                (None, Some(_)) => {
                    p.routes -= 1;
                    p.stats.withdraws_accepted += 1;
                }
                (None, None) => {}
            }
            let hooks = p.hooks.clone();
            if let Some(old) = &old {
                hooks.rte_remove(net, old);
            }
            if let Some(new) = &new {
                hooks.rte_insert(net, new);
            }
        }
        trace!(
            "{}: {} {} by {}",
            table,
            net,
            if new.is_some() { "updated" } else { "withdrawn" },
            proto
        );

        // A notified protocol may withdraw any of these routes, and the
        // hooks after it still have to be told about them.
        let held: Vec<RtaRef> =
            [new.as_ref(), new_best.as_ref(), old_best.as_ref()]
                .into_iter()
                .flatten()
                .map(|r| self.cache.clone_ref(r.attrs))
                .collect();
        self.announce(
            table,
            AnnounceMode::Any,
            net,
            new.as_ref(),
            old.as_ref(),
        );
        if best_changed {
            self.announce(
                table,
                AnnounceMode::Optimal,
                net,
                new_best.as_ref(),
                old_best.as_ref(),
            );
        }
        for r in held {
            self.cache.release(r);
        }

        if let Some(old) = old {
            self.cache.release(old.attrs);
        }
    }
}

/// Whether a route for `net` can go into a table on behalf of a protocol
/// with minimum scope `min_scope`.
fn net_is_valid(net: &Net, min_scope: Scope) -> bool {
    if net.is_default_or_half() {
        return true;
    }
    if !net.is_valid() {
        return false;
    }
    match net.classify() {
        Some((AddrClass::Host, scope)) => scope >= min_scope,
        _ => false,
    }
}

//------------ Tests ---------------------------------------------------------
