//! Class dependency graph
//!
//! One node per fully qualified class name, one directed edge per import
//! from the importing class to the imported name. Storage is ordered so that
//! iteration, and therefore ranking, never depends on insertion order.
//!
//! Which imports become edges is an explicit [`EdgePolicy`]:
//!
//! - `ProjectOnly` (default): the import must start with the package prefix
//!   and name a class declared in the same snapshot. No dangling edges.
//! - `AllImports`: every import becomes an edge; undeclared targets are added
//!   as nodes without outgoing edges.

use crate::extract::ExtractionRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Only imports of classes declared under the package prefix in the same
    /// snapshot. A class outside the prefix never becomes a node.
    #[default]
    ProjectOnly,
    /// Every import, including library and out-of-prefix classes, which
    /// become sink nodes and are ranked alongside project classes. This
    /// departs from the project-only graph; use it only to study how
    /// external dependencies shift centrality.
    AllImports,
}

/// Directed import graph for one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, fqn: impl Into<String>) {
        self.nodes.insert(fqn.into());
    }

    /// Add `from -> to`, creating both endpoints. Repeated edges and
    /// self-loops are ignored.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        if from != to {
            self.edges.entry(from).or_default().insert(to);
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.nodes.contains(fqn)
    }

    /// Outgoing neighbours of `fqn`, sorted
    pub fn successors(&self, fqn: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(fqn)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of classes importing `fqn`
    pub fn fan_in(&self, fqn: &str) -> usize {
        self.edges
            .values()
            .filter(|targets| targets.contains(fqn))
            .count()
    }

    /// Number of classes `fqn` imports
    pub fn fan_out(&self, fqn: &str) -> usize {
        self.edges.get(fqn).map(BTreeSet::len).unwrap_or(0)
    }

    /// Build the graph for one snapshot's extraction records.
    pub fn build(records: &[ExtractionRecord], package_prefix: &str, policy: EdgePolicy) -> Self {
        let mut graph = DependencyGraph::new();

        for record in records {
            if let Some(fqn) = &record.fqn {
                graph.add_node(fqn.as_str());
            }
        }

        for record in records {
            let Some(fqn) = &record.fqn else {
                continue;
            };

            for import in &record.imports {
                let keep = match policy {
                    EdgePolicy::ProjectOnly => {
                        import.starts_with(package_prefix) && graph.contains(import)
                    }
                    EdgePolicy::AllImports => true,
                };
                if keep {
                    graph.add_edge(fqn.as_str(), import.as_str());
                }
            }
        }

        graph
    }
}
