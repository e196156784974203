//! File stability scores
//!
//! Every commit in the most recent `recent_fraction` of history gets a weight
//! rising linearly from `weight_min` to just under 1; older commits weigh 0.
//! A file's score is the sum of the weights of the commits that touched it,
//! so frequently and recently changed files score highest.

use crate::config::StabilitySettings;
use crate::git::{changed_files, list_commits};
use crate::snapshot::{atomic_write, stability_dir};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const COMMIT_WEIGHTS_CSV: &str = "commit_weights.csv";
pub const STABILITY_SCORES_CSV: &str = "stability_scores.csv";

/// Commit history with the files each commit changed, oldest first
#[derive(Debug, Clone, Default)]
pub struct ChangeHistory {
    pub commits: Vec<String>,
    /// File path -> indexes into `commits`
    pub touches: BTreeMap<String, Vec<usize>>,
}

impl ChangeHistory {
    /// Build from `(commit, changed files)` pairs, oldest first, keeping
    /// files with the given extension
    pub fn from_changes(changes: Vec<(String, Vec<String>)>, extension: &str) -> Self {
        let suffix = format!(".{}", extension);
        let mut history = ChangeHistory::default();
        for (idx, (commit, files)) in changes.into_iter().enumerate() {
            for file in files.into_iter().filter(|f| f.ends_with(&suffix)) {
                history.touches.entry(file).or_default().push(idx);
            }
            history.commits.push(commit);
        }
        history
    }

    /// Walk the history of `rev`
    pub fn collect(
        repo: &Path,
        rev: &str,
        extension: &str,
        mut on_commit: impl FnMut(usize, usize),
    ) -> Result<Self> {
        let commits = list_commits(repo, rev, None)?;
        let total = commits.len();
        info!(commits = total, "mapping file changes");

        let mut changes = Vec::with_capacity(total);
        for (i, commit) in commits.into_iter().enumerate() {
            let files = changed_files(repo, &commit.commit_id)?;
            changes.push((commit.commit_id, files));
            on_commit(i + 1, total);
        }
        Ok(Self::from_changes(changes, extension))
    }
}

/// Weight of every commit index in the recent window
pub fn commit_weights(n_total: usize, settings: &StabilitySettings) -> BTreeMap<usize, f64> {
    let n_recent = (settings.recent_fraction * n_total as f64).floor() as usize;
    let n_recent = n_recent.min(n_total);
    if n_recent == 0 {
        return BTreeMap::new();
    }

    let first = n_total - n_recent;
    (first..n_total)
        .map(|idx| {
            let relative = (idx - first) as f64 / n_recent as f64;
            let weight = (1.0 - settings.weight_min) * relative + settings.weight_min;
            (idx, weight)
        })
        .collect()
}

/// Per-file sums of commit weights
pub fn stability_scores(
    history: &ChangeHistory,
    weights: &BTreeMap<usize, f64>,
) -> BTreeMap<String, f64> {
    history
        .touches
        .iter()
        .map(|(file, commits)| {
            let score = commits
                .iter()
                .map(|idx| weights.get(idx).copied().unwrap_or(0.0))
                .sum::<f64>();
            (file.clone(), score)
        })
        .collect()
}

/// Scores sorted descending, ties by path
pub fn ranked(scores: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
    let mut ranked: Vec<(&str, f64)> = scores.iter().map(|(f, s)| (f.as_str(), *s)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

pub fn write_commit_weights(
    path: &Path,
    history: &ChangeHistory,
    weights: &BTreeMap<usize, f64>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["commit_index", "commit_hash", "weight"])?;
    for (idx, weight) in weights {
        let hash = history
            .commits
            .get(*idx)
            .with_context(|| format!("commit index {} out of range", idx))?;
        writer.write_record([idx.to_string(), hash.clone(), format!("{:.6}", weight)])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush commit weights: {}", e.error()))?;
    atomic_write(path, bytes)
}

pub fn write_stability_scores(path: &Path, scores: &BTreeMap<String, f64>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["file_path", "stability_score"])?;
    for (file, score) in ranked(scores) {
        writer.write_record([file.to_string(), format!("{:.6}", score)])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush stability scores: {}", e.error()))?;
    atomic_write(path, bytes)
}

/// Compute and persist both stability outputs under `<output>/stability`
pub fn run(
    repo: &Path,
    rev: &str,
    extension: &str,
    settings: &StabilitySettings,
    output_dir: &Path,
    on_commit: impl FnMut(usize, usize),
) -> Result<(PathBuf, PathBuf)> {
    let history = ChangeHistory::collect(repo, rev, extension, on_commit)?;
    let weights = commit_weights(history.commits.len(), settings);
    let scores = stability_scores(&history, &weights);

    let dir = stability_dir(output_dir);
    let weights_path = dir.join(COMMIT_WEIGHTS_CSV);
    let scores_path = dir.join(STABILITY_SCORES_CSV);
    write_commit_weights(&weights_path, &history, &weights)?;
    write_stability_scores(&scores_path, &scores)?;

    info!(files = scores.len(), weighted_commits = weights.len(), "wrote stability scores");
    Ok((weights_path, scores_path))
}
