//! PageRank centrality and score normalizations
//!
//! `pagerank` is the power method with uniform teleport and uniform
//! redistribution of rank held by dangling nodes (no outgoing edges). The
//! four normalizations are pure transforms over the raw score vector; each
//! degenerate input (zero norm, zero spread, fewer than two values) maps to
//! all zeros.

use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRankSettings {
    /// Probability of following an edge rather than teleporting
    pub damping: f64,
    /// Per-node convergence tolerance; the run stops once the L1 change
    /// between iterations drops below `node_count * tolerance`
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PageRankSettings {
    fn default() -> Self {
        PageRankSettings {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Stationary distribution of the graph, keyed by FQN.
///
/// Scores are non-negative and sum to 1 for a non-empty graph.
pub fn pagerank(graph: &DependencyGraph, settings: &PageRankSettings) -> BTreeMap<String, f64> {
    let nodes: Vec<&str> = graph.nodes().collect();
    let n = nodes.len();
    if n == 0 {
        return BTreeMap::new();
    }

    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, &node)| (node, i)).collect();
    let out: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| {
            graph
                .successors(node)
                .filter_map(|target| index.get(target).copied())
                .collect()
        })
        .collect();

    let d = settings.damping;
    let nf = n as f64;
    let mut x = vec![1.0 / nf; n];
    let mut converged = false;

    for iteration in 0..settings.max_iterations {
        let last = std::mem::replace(&mut x, vec![0.0; n]);

        let dangling_sum: f64 = d * out
            .iter()
            .zip(&last)
            .filter(|(targets, _)| targets.is_empty())
            .map(|(_, rank)| rank)
            .sum::<f64>();

        for (source, targets) in out.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = d * last[source] / targets.len() as f64;
            for &target in targets {
                x[target] += share;
            }
        }

        let base = dangling_sum / nf + (1.0 - d) / nf;
        for rank in &mut x {
            *rank += base;
        }

        let err: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if err < nf * settings.tolerance {
            debug!(iterations = iteration + 1, nodes = n, "pagerank converged");
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            max_iterations = settings.max_iterations,
            nodes = n,
            "pagerank stopped before converging"
        );
    }

    nodes
        .into_iter()
        .zip(x)
        .map(|(node, rank)| (node.to_string(), rank))
        .collect()
}

/// Divide by the Euclidean norm
pub fn l2(scores: &[f64]) -> Vec<f64> {
    let norm = scores.iter().map(|s| s * s).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s / norm).collect()
}

/// Standard score using the sample standard deviation (n - 1)
pub fn z_score(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let mean = scores.iter().sum::<f64>() / n as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return vec![0.0; n];
    }
    scores.iter().map(|s| (s - mean) / std).collect()
}

/// Rescale into [0, 1]
pub fn min_max(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if scores.is_empty() || max == min {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// `ln(1 + x)`
pub fn log1p(scores: &[f64]) -> Vec<f64> {
    scores.iter().map(|s| s.ln_1p()).collect()
}

/// One ranked class with every normalization of its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityRecord {
    pub fqn: String,
    pub score: f64,
    pub l2: f64,
    pub z: f64,
    pub min_max: f64,
    pub log: f64,
}

/// Rank the graph and attach normalizations.
pub fn rank_records(graph: &DependencyGraph, settings: &PageRankSettings) -> Vec<CentralityRecord> {
    records_from_scores(&pagerank(graph, settings))
}

/// Records sorted by score descending, ties by FQN ascending
pub fn records_from_scores(scores: &BTreeMap<String, f64>) -> Vec<CentralityRecord> {
    let raw: Vec<f64> = scores.values().copied().collect();
    let l2 = l2(&raw);
    let z = z_score(&raw);
    let min_max = min_max(&raw);
    let log = log1p(&raw);

    let mut records: Vec<CentralityRecord> = scores
        .iter()
        .enumerate()
        .map(|(i, (fqn, &score))| CentralityRecord {
            fqn: fqn.clone(),
            score,
            l2: l2[i],
            z: z[i],
            min_max: min_max[i],
            log: log[i],
        })
        .collect();

    records.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.fqn.cmp(&b.fqn)));
    records
}
