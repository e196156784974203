//! javarank core library - Java import graphs, PageRank centrality over repository history

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Parser failures stay inside extraction; a bad file yields no FQN
// - A failing snapshot is skipped, never fatal to the run
// - Deterministic traversal order must be explicit (ordered maps, sorted lists)
// - Identical input yields byte-for-byte identical output
// - Missing observations stay missing; they are never written as 0
// - Configuration is passed explicitly; there is no global state

pub mod config;
pub mod encoding;
pub mod extract;
pub mod git;
pub mod graph;
pub mod language;
pub mod pipeline;
pub mod plot;
pub mod rank;
pub mod snapshot;
pub mod stability;
pub mod table;
pub mod timeseries;

pub use config::ResolvedConfig;
pub use extract::ExtractionRecord;
pub use graph::{DependencyGraph, EdgePolicy};
pub use pipeline::{Pipeline, RunSummary, SnapshotResult};
pub use rank::{CentralityRecord, PageRankSettings};
pub use snapshot::{SnapshotIndex, SnapshotPoint};
pub use timeseries::{NoSnapshotData, TimeSeriesMatrix};
