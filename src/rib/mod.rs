pub mod config;
mod feed;
pub mod hooks;
mod prune;
#[allow(clippy::module_inception)]
pub mod rib;
pub mod table;
pub mod update;
pub mod walk;

pub use hooks::{AnnounceHook, HookId};
pub use rib::Rib;
pub use table::{Network, RoutingTable, TableId};
pub use update::{Attrs, RouteCandidate};
pub use walk::{RouteSummary, RouteWalk};
