//! Configuration for a [`Rib`](super::Rib), its tables and its protocols.
//!
//! All configuration types can be built in code, or deserialized from JSON
//! with defaults for every field that is left out.
//!
//! ```
//! use rib_core::rib::config::{RibConfig, ProtocolConfig};
//! use rib_core::rib::Rib;
//! use rib_core::proto::ProtocolKind;
//!
//! let config = RibConfig::from_json(
//!     r#"{ "tables": [ { "name": "master", "gc_max_ops": 100 } ] }"#
//! ).unwrap();
//! let mut rib = Rib::new(config).unwrap();
//! let bgp = ProtocolConfig::new("bgp1", ProtocolKind::Bgp)
//!     .with_table("master");
//! rib.add_protocol(bgp, std::rc::Rc::new(rib_core::proto::NoHooks)).unwrap();
//! ```

use serde_derive::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::fib::DEFAULT_ORDER;
use crate::pool::DEFAULT_CHUNK_SIZE;
use crate::proto::ProtocolKind;
use crate::types::errors::RibError;
use crate::types::net::Scope;

/// The name of the table a default configuration creates.
pub const MASTER_TABLE: &str = "master";

//------------ AnnounceMode --------------------------------------------------

/// Which route changes a protocol wants to hear about.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceMode {
    /// Changes of the best route of a network.
    #[default]
    Optimal,
    /// Every change of any route, each protocol's route is announced on
    /// its own.
    Any,
}

//------------ FilterConfig --------------------------------------------------

/// The filters that can be expressed in a configuration file. Filter
/// programs are attached in code, see [`ProtocolConfig::with_import`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FilterConfig {
    All,
    None,
}

impl FilterConfig {
    pub fn to_filter(self) -> Filter {
        match self {
            FilterConfig::All => Filter::Accept,
            FilterConfig::None => Filter::Reject,
        }
    }
}

//------------ TableConfig ---------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// The initial order of the FIB, i.e. it starts with `2^fib_order`
    /// buckets.
    #[serde(default = "default_fib_order")]
    pub fib_order: u32,
    /// Schedule a prune pass after this many withdrawals...
    #[serde(default = "default_gc_max_ops")]
    pub gc_max_ops: u32,
    /// ...but not sooner than this many seconds after the previous one.
    #[serde(default = "default_gc_min_time")]
    pub gc_min_time: u64,
}

impl TableConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fib_order: default_fib_order(),
            gc_max_ops: default_gc_max_ops(),
            gc_min_time: default_gc_min_time(),
        }
    }

    pub fn with_gc(mut self, max_ops: u32, min_time: u64) -> Self {
        self.gc_max_ops = max_ops;
        self.gc_min_time = min_time;
        self
    }

    pub fn with_fib_order(mut self, order: u32) -> Self {
        self.fib_order = order;
        self
    }
}

fn default_fib_order() -> u32 {
    DEFAULT_ORDER
}

fn default_gc_max_ops() -> u32 {
    1000
}

fn default_gc_min_time() -> u64 {
    5
}

//------------ ProtocolConfig ------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    pub kind: ProtocolKind,
    /// The table the protocol is connected to when it is added. If left
    /// out, the protocol has to be connected explicitly.
    #[serde(default)]
    pub table: Option<String>,
    /// The preference of the routes of this protocol. Defaults to the
    /// preference for the kind of protocol.
    #[serde(default)]
    pub preference: Option<u32>,
    /// Routes for networks with a narrower scope are refused on import
    /// and not announced to this protocol.
    #[serde(default = "default_min_scope")]
    pub min_scope: Scope,
    #[serde(default = "default_import")]
    pub import: FilterConfig,
    #[serde(default = "default_export")]
    pub export: FilterConfig,
    #[serde(default)]
    pub announce: AnnounceMode,
    #[serde(skip)]
    pub import_filter: Option<Filter>,
    #[serde(skip)]
    pub export_filter: Option<Filter>,
}

impl ProtocolConfig {
    pub fn new(name: &str, kind: ProtocolKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            table: None,
            preference: None,
            min_scope: default_min_scope(),
            import: default_import(),
            export: default_export(),
            announce: AnnounceMode::default(),
            import_filter: None,
            export_filter: None,
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn with_preference(mut self, preference: u32) -> Self {
        self.preference = Some(preference);
        self
    }

    pub fn with_min_scope(mut self, scope: Scope) -> Self {
        self.min_scope = scope;
        self
    }

    pub fn with_import(mut self, filter: Filter) -> Self {
        self.import_filter = Some(filter);
        self
    }

    pub fn with_export(mut self, filter: Filter) -> Self {
        self.export_filter = Some(filter);
        self
    }

    pub fn with_announce(mut self, announce: AnnounceMode) -> Self {
        self.announce = announce;
        self
    }

    pub fn preference(&self) -> u32 {
        self.preference
            .unwrap_or_else(|| self.kind.default_preference())
    }

    pub fn import_filter(&self) -> Filter {
        self.import_filter
            .clone()
            .unwrap_or_else(|| self.import.to_filter())
    }

    pub fn export_filter(&self) -> Filter {
        self.export_filter
            .clone()
            .unwrap_or_else(|| self.export.to_filter())
    }
}

fn default_min_scope() -> Scope {
    Scope::Site
}

fn default_import() -> FilterConfig {
    FilterConfig::All
}

fn default_export() -> FilterConfig {
    FilterConfig::None
}

//------------ RibConfig -----------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RibConfig {
    #[serde(default = "default_tables")]
    pub tables: Vec<TableConfig>,
    /// The size of the chunks of the scratch pool used by filters.
    #[serde(default = "default_chunk_size")]
    pub pool_chunk_size: usize,
}

impl RibConfig {
    pub fn from_json(json: &str) -> Result<Self, RibError> {
        let config: RibConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn with_table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Returns an error if two tables have the same name, or if there are
    /// no tables at all.
    pub fn check(&self) -> Result<(), RibError> {
        if self.tables.is_empty() {
            return Err(RibError::Config("no tables configured".to_string()));
        }
        for (i, table) in self.tables.iter().enumerate() {
            if self.tables.iter().skip(i + 1).any(|t| t.name == table.name) {
                return Err(RibError::DuplicateName(table.name.clone()));
            }
        }
        Ok(())
    }
}

impl Default for RibConfig {
    fn default() -> Self {
        Self {
            tables: default_tables(),
            pool_chunk_size: default_chunk_size(),
        }
    }
}

fn default_tables() -> Vec<TableConfig> {
    vec![TableConfig::new(MASTER_TABLE)]
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

//------------ Tests ---------------------------------------------------------
