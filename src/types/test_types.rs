//! Protocol hooks and filters for tests: a protocol that records what the
//! routing table tells it, and a couple of small filters.
use std::cell::{Cell, RefCell};
use std::str::FromStr;

use crate::filter::{FilterRoute, FilterVerdict, RouteFilter};
use crate::pool::LinPool;
use crate::proto::{ProtocolHooks, ProtocolId};
use crate::rib::{Rib, TableId};

use super::attrs::{Dest, RouteSource};
use super::eattrs::{EaId, EaList, EaValue};
use super::net::Net;
use super::route::{RouteView, Rte, RteFlags};

#[allow(clippy::panic)]
pub fn net(s: &str) -> Net {
    match Net::from_str(s) {
        Ok(net) => net,
        Err(err) => panic!("bad network {}: {}", s, err),
    }
}

//------------ RouteNote -----------------------------------------------------

/// What a recorder remembers of a route it was told about.
#[derive(Clone, Debug)]
pub struct RouteNote {
    pub proto: ProtocolId,
    pub source: RouteSource,
    pub pref: u32,
    pub dest: Dest,
    pub eattrs: EaList,
    pub feed: bool,
}

impl RouteNote {
    fn new(rib: &Rib, rte: &Rte) -> Self {
        let rta = rib.rta(rte.attrs);
        Self {
            proto: rta.proto,
            source: rta.source,
            pref: rte.pref,
            dest: rta.dest.clone(),
            eattrs: rta.eattrs.clone(),
            feed: rte.flags.contains(RteFlags::FEED),
        }
    }
}

//------------ Notification --------------------------------------------------

#[derive(Clone, Debug)]
pub struct Notification {
    pub table: TableId,
    pub net: Net,
    pub new: Option<RouteNote>,
    pub old: Option<RouteNote>,
    pub tmp_attrs: EaList,
}

//------------ Recorder ------------------------------------------------------

/// Protocol hooks that write down every call.
#[derive(Default)]
pub struct Recorder {
    notes: RefCell<Vec<Notification>>,
    inserted: RefCell<Vec<Net>>,
    removed: RefCell<Vec<Net>>,
    flushed: Cell<bool>,
    /// Prefer the route with the lower value of this attribute among
    /// routes of the same protocol kind and preference.
    metric: Option<EaId>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric(metric: EaId) -> Self {
        Self {
            metric: Some(metric),
            ..Self::default()
        }
    }

    /// The notifications received since the last call.
    pub fn take(&self) -> Vec<Notification> {
        self.notes.take()
    }

    pub fn inserted(&self) -> Vec<Net> {
        self.inserted.borrow().clone()
    }

    pub fn removed(&self) -> Vec<Net> {
        self.removed.borrow().clone()
    }

    pub fn flushed(&self) -> bool {
        self.flushed.get()
    }
}

impl ProtocolHooks for Recorder {
    fn rt_notify(
        &self,
        rib: &mut Rib,
        table: TableId,
        net: Net,
        new: Option<&Rte>,
        old: Option<&Rte>,
        tmp_attrs: &EaList,
    ) {
        let note = Notification {
            table,
            net,
            new: new.map(|r| RouteNote::new(rib, r)),
            old: old.map(|r| RouteNote::new(rib, r)),
            tmp_attrs: tmp_attrs.clone(),
        };
        self.notes.borrow_mut().push(note);
    }

    fn better(&self, new: RouteView<'_>, old: RouteView<'_>) -> bool {
        match self.metric {
            Some(id) => {
                new.attrs.eattrs.get_int(id, u32::MAX)
                    < old.attrs.eattrs.get_int(id, u32::MAX)
            }
            None => false,
        }
    }

    fn rte_insert(&self, net: Net, _rte: &Rte) {
        self.inserted.borrow_mut().push(net);
    }

    fn rte_remove(&self, net: Net, _rte: &Rte) {
        self.removed.borrow_mut().push(net);
    }

    fn flush_done(&self, _proto: ProtocolId) {
        self.flushed.set(true);
    }
}

//------------ Filters -------------------------------------------------------

/// Rejects routes for the given networks, accepts everything else.
pub struct RejectNets(pub Vec<Net>);

impl RouteFilter for RejectNets {
    fn run(
        &self,
        route: &mut FilterRoute<'_>,
        _pool: &mut LinPool,
    ) -> FilterVerdict {
        if self.0.contains(&route.net()) {
            FilterVerdict::Reject
        } else {
            FilterVerdict::Accept
        }
    }
}

/// Overrides the preference of every route.
pub struct SetPref(pub u32);

impl RouteFilter for SetPref {
    fn run(
        &self,
        route: &mut FilterRoute<'_>,
        _pool: &mut LinPool,
    ) -> FilterVerdict {
        route.set_pref(self.0);
        FilterVerdict::Accept
    }
}

/// Sets an extended attribute on every route.
pub struct SetAttr(pub EaId, pub u32);

impl RouteFilter for SetAttr {
    fn run(
        &self,
        route: &mut FilterRoute<'_>,
        _pool: &mut LinPool,
    ) -> FilterVerdict {
        route.attrs_mut().eattrs.set(self.0, EaValue::Int(self.1));
        FilterVerdict::Accept
    }
}
