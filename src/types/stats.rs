//------------ Types for Statistics -----------------------------------------

use std::fmt::{Debug, Display};

//------------ ImportStats ---------------------------------------------------
//
// Counters for the routes a protocol pushes into the tables, kept per
// protocol.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub updates_received: u64,
    // bogus prefixes and routes out of scope
    pub updates_invalid: u64,
    // rejected by the import filter, or sent while the protocol was not up
    pub updates_filtered: u64,
    // equal to the route already in the table
    pub updates_ignored: u64,
    pub updates_accepted: u64,
    pub withdraws_received: u64,
    pub withdraws_invalid: u64,
    // withdrawals of routes that were not in the table
    pub withdraws_ignored: u64,
    pub withdraws_accepted: u64,
}

impl Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "  Import updates:  {:>10} {:>10} {:>10} {:>10} {:>10}",
            self.updates_received,
            self.updates_invalid,
            self.updates_filtered,
            self.updates_ignored,
            self.updates_accepted
        )?;
        writeln!(
            f,
            "  Import withdraws:{:>10} {:>10} {:>10} {:>10} {:>10}",
            self.withdraws_received,
            self.withdraws_invalid,
            "---",
            self.withdraws_ignored,
            self.withdraws_accepted
        )
    }
}

//------------ ExportStats ---------------------------------------------------
//
// Counters for the announcements a table makes to one subscribed protocol,
// kept per announce hook.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub updates_received: u64,
    // refused by the preexport hook, the export filter or the scope check
    pub updates_rejected: u64,
    pub updates_accepted: u64,
    pub withdraws_received: u64,
    pub withdraws_accepted: u64,
}

impl Display for ExportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "  Export updates:  {:>10} {:>10} {:>10}",
            self.updates_received, self.updates_rejected, self.updates_accepted
        )?;
        writeln!(
            f,
            "  Export withdraws:{:>10} {:>10} {:>10}",
            self.withdraws_received, "---", self.withdraws_accepted
        )
    }
}

//------------ TableStats ----------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    // number of networks in the FIB, including those awaiting the pruner
    pub networks: usize,
    pub routes: usize,
    pub prune_passes: u64,
    pub pruned_routes: u64,
    pub pruned_networks: u64,
}

impl Display for TableStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} networks, {} routes ({} prune passes removed {} routes \
             and {} networks)",
            self.networks,
            self.routes,
            self.prune_passes,
            self.pruned_routes,
            self.pruned_networks
        )
    }
}

//------------ RibStats ------------------------------------------------------
//
// A snapshot of the counters of a whole RIB, returned by `Rib::stats`.

#[derive(Clone, Debug, Default)]
pub struct RibStats {
    pub tables: Vec<(String, TableStats)>,
    pub cached_rtas: usize,
    pub rta_lookups: u64,
    pub rta_hits: u64,
    pub pool_peak: usize,
}

impl Display for RibStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, stats) in &self.tables {
            writeln!(f, "{}:\t{}", name, stats)?;
        }
        writeln!(
            f,
            "attribute cache:\t{} blocks, {} of {} lookups hit",
            self.cached_rtas, self.rta_hits, self.rta_lookups
        )?;
        writeln!(f, "scratch pool peak:\t{} bytes", self.pool_peak)
    }
}
