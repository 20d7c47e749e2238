//! Read-only, paged walks over the routes of a table, for whatever shows
//! routes to operators.
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use inetnum::addr::Prefix;

use crate::types::attrs::RouteSource;
use crate::types::errors::RibError;

use super::rib::Rib;
use super::table::TableId;

//------------ RouteSummary --------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSummary {
    pub prefix: Prefix,
    /// Whether this is the best route for the prefix.
    pub best: bool,
    pub proto: String,
    pub source: RouteSource,
    pub dest: String,
    /// Time since the route was last changed.
    pub age: Duration,
    pub pref: u32,
}

impl fmt::Display for RouteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.age.as_secs();
        write!(
            f,
            "{:<20} {} [{} {:02}:{:02}:{:02}]{} ({})",
            self.prefix.to_string(),
            self.dest,
            self.proto,
            secs / 3600,
            secs / 60 % 60,
            secs % 60,
            if self.best { " *" } else { "" },
            self.pref
        )
    }
}

//------------ RouteWalk -----------------------------------------------------

/// The position of a paged walk over a table.
///
/// The position itself is kept by the table. A walk that is dropped
/// without [`Rib::walk_finish`] is cleaned up by the table later on.
#[derive(Debug)]
pub struct RouteWalk {
    table: TableId,
    token: Option<Rc<()>>,
}

impl RouteWalk {
    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn is_done(&self) -> bool {
        self.token.is_none()
    }
}

impl Rib {
    pub fn walk_start(&mut self, table: TableId) -> Result<RouteWalk, RibError> {
        self.check_table(table)?;
        let t = self.table_mut(table);
        t.reap_walks();
        let token = Rc::new(());
        let it = t.fib.iter_init();
        t.walks.push((Rc::downgrade(&token), it));
        Ok(RouteWalk {
            table,
            token: Some(token),
        })
    }

    /// The next page of a walk: the routes of networks, best route first,
    /// until at least `max` routes are collected. All routes of a network
    /// end up on the same page, so a page can hold more than `max` routes.
    /// An empty page means the walk is done.
    pub fn walk_page(
        &mut self,
        walk: &mut RouteWalk,
        max: usize,
    ) -> Vec<RouteSummary> {
        let mut page = Vec::new();
        let Some(token) = walk.token.take() else {
            return page;
        };
        let Some(t) = self.tables.get_mut(walk.table.index()) else {
            return page;
        };
        let Some(mut it) = t.take_walk(&token) else {
            return page;
        };
        while page.len() < max.max(1) {
            let Some(node) = t.fib.iter_next(&mut it) else {
                t.fib.iter_release(it);
                return page;
            };
            let Some(prefix) = t.fib.node(node).net().to_prefix() else {
                continue;
            };
            let head = t.node_routes(node);
            for (i, (_, rte)) in t.routes.iter(&head).enumerate() {
                let rta = self.cache.get(rte.attrs);
                let proto = self
                    .protocols
                    .get(rta.proto.index())
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| rta.proto.to_string());
                page.push(RouteSummary {
                    prefix,
                    best: i == 0,
                    proto,
                    source: rta.source,
                    dest: rta.dest.to_string(),
                    age: rte.lastmod.elapsed(),
                    pref: rte.pref,
                });
            }
        }
        t.walks.push((Rc::downgrade(&token), it));
        walk.token = Some(token);
        page
    }

    /// End a walk before it is done.
    pub fn walk_finish(&mut self, walk: RouteWalk) {
        let (Some(token), Some(t)) =
            (walk.token, self.tables.get_mut(walk.table.index()))
        else {
            return;
        };
        if let Some(it) = t.take_walk(&token) {
            t.fib.iter_release(it);
        }
    }
}
