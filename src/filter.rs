//! The boundary to the filter engine.
//!
//! The routing table does not interpret filters. A filter is either one of
//! the two trivial sentinels, or an object implementing [`RouteFilter`] that
//! the table runs on a [`FilterRoute`] and that answers with a
//! [`FilterVerdict`]. A filter may change the route it is given; the table
//! notices and re-canonicalizes the attributes afterwards.
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use log::{trace, warn};

use crate::pool::LinPool;
use crate::proto::ProtocolHooks;
use crate::types::attrs::Rta;
use crate::types::eattrs::EaList;
use crate::types::net::Net;
use crate::types::route::RouteMetric;

//------------ FilterVerdict -------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    Reject,
    /// The filter failed to run to completion. Treated as a reject.
    Error(String),
}

//------------ RouteFilter ---------------------------------------------------

/// A filter program, as compiled by whatever filter engine is in use.
pub trait RouteFilter {
    /// Run the filter over `route`. Scratch memory can be allocated from
    /// `pool`, it is valid until the outermost route update returns.
    fn run(
        &self,
        route: &mut FilterRoute<'_>,
        pool: &mut LinPool,
    ) -> FilterVerdict;

    fn name(&self) -> &str {
        "custom"
    }
}

//------------ Filter --------------------------------------------------------

#[derive(Clone, Default)]
pub enum Filter {
    /// Let everything through, without running anything.
    #[default]
    Accept,
    /// Drop everything, without running anything.
    Reject,
    Custom(Rc<dyn RouteFilter>),
}

impl Filter {
    pub fn custom(filter: impl RouteFilter + 'static) -> Self {
        Filter::Custom(Rc::new(filter))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Filter::Reject)
    }

    /// Run the filter over a route, with the temporary attributes the
    /// protocol `hooks` provide. On import, changed temporary attributes
    /// are folded back into the route by the protocol.
    ///
    /// Returns true if the route is accepted.
    pub(crate) fn apply(
        &self,
        hooks: &dyn ProtocolHooks,
        route: &mut FilterRoute<'_>,
        pool: &mut LinPool,
        import: bool,
    ) -> bool {
        let filter = match self {
            Filter::Accept => return true,
            Filter::Reject => return false,
            Filter::Custom(filter) => filter,
        };
        if let Some(tmp) = hooks.make_tmp_attrs(route) {
            route.tmp_attrs = tmp;
        }
        match filter.run(route, pool) {
            FilterVerdict::Accept => {
                if import && route.tmp_modified {
                    let tmp = std::mem::take(&mut route.tmp_attrs);
                    hooks.store_tmp_attrs(route, &tmp);
                    route.tmp_attrs = tmp;
                }
                true
            }
            FilterVerdict::Reject => {
                trace!("filter {} rejected {}", filter.name(), route.net);
                false
            }
            FilterVerdict::Error(err) => {
                warn!(
                    "filter {} failed on {}: {}",
                    filter.name(),
                    route.net,
                    err
                );
                false
            }
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Accept => write!(f, "Accept"),
            Filter::Reject => write!(f, "Reject"),
            Filter::Custom(filter) => write!(f, "Custom({})", filter.name()),
        }
    }
}

//------------ FilterRoute ---------------------------------------------------

/// A route as a filter sees it.
///
/// The attributes are borrowed from the attribute cache until a filter
/// asks for mutable access, at which point they are copied.
#[derive(Clone, Debug)]
pub struct FilterRoute<'a> {
    net: Net,
    attrs: Cow<'a, Rta>,
    pref: u32,
    metric: RouteMetric,
    tmp_attrs: EaList,
    pref_modified: bool,
    metric_modified: bool,
    tmp_modified: bool,
}

impl<'a> FilterRoute<'a> {
    pub fn new(
        net: Net,
        attrs: Cow<'a, Rta>,
        pref: u32,
        metric: RouteMetric,
    ) -> Self {
        Self {
            net,
            attrs,
            pref,
            metric,
            tmp_attrs: EaList::new(),
            pref_modified: false,
            metric_modified: false,
            tmp_modified: false,
        }
    }

    pub fn net(&self) -> Net {
        self.net
    }

    pub fn attrs(&self) -> &Rta {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Rta {
        self.attrs.to_mut()
    }

    pub fn pref(&self) -> u32 {
        self.pref
    }

    pub fn set_pref(&mut self, pref: u32) {
        self.pref = pref;
        self.pref_modified = true;
    }

    pub fn metric(&self) -> &RouteMetric {
        &self.metric
    }

    pub fn set_metric(&mut self, metric: RouteMetric) {
        self.metric = metric;
        self.metric_modified = true;
    }

    pub fn tmp_attrs(&self) -> &EaList {
        &self.tmp_attrs
    }

    pub fn tmp_attrs_mut(&mut self) -> &mut EaList {
        self.tmp_modified = true;
        &mut self.tmp_attrs
    }

    /// Whether the attributes were copied for modification.
    pub fn attrs_modified(&self) -> bool {
        matches!(self.attrs, Cow::Owned(_))
    }

    pub fn is_modified(&self) -> bool {
        self.attrs_modified()
            || self.pref_modified
            || self.metric_modified
            || self.tmp_modified
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Cow<'a, Rta>, u32, RouteMetric, EaList) {
        (self.attrs, self.pref, self.metric, self.tmp_attrs)
    }
}

//------------ Tests ---------------------------------------------------------
