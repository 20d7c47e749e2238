pub mod attrs;
pub mod eattrs;
pub mod errors;
pub mod net;
pub mod route;
pub mod stats;
#[doc(hidden)]
pub mod test_types;

pub use attrs::{Cast, Dest, Iface, RouteSource, Rta};
pub use eattrs::{EaId, EaList, EaValue, Eattr};
pub use net::{AddrClass, Net, Scope};
pub use route::{RouteMetric, RouteView, Rte, RteFlags};
