//! Snapshot points, the snapshot index, and the output layout
//!
//! Global invariants enforced:
//! - Snapshots are ordered by commit timestamp, then commit id
//! - A commit id appears at most once in the index
//! - Per-snapshot directories are named by an ISO-8601 basic UTC stamp,
//!   which sorts lexically in time order
//! - All writes go through temp file + rename

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version for the snapshot index
const INDEX_SCHEMA_VERSION: u32 = 1;

/// `YYYYMMDDTHHMMSSZ`
pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub const DEPENDENCY_JSON: &str = "file_dependency.json";
pub const CENTRALITY_CSV: &str = "centrality_scores.csv";

/// One selected historical commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotPoint {
    // Field order gives the derived ordering: timestamp, then commit id
    pub timestamp: DateTime<Utc>,
    pub commit_id: String,
}

impl SnapshotPoint {
    pub fn new(commit_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        SnapshotPoint {
            timestamp,
            commit_id: commit_id.into(),
        }
    }

    /// Directory name for this snapshot's outputs
    pub fn stamp(&self) -> String {
        format_stamp(&self.timestamp)
    }
}

pub fn format_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(STAMP_FORMAT).to_string()
}

/// Parse a snapshot directory name back into its timestamp
pub fn parse_stamp(name: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(name, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Selected snapshots persisted as `snapshots.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotIndex {
    pub schema_version: u32,
    pub snapshots: Vec<SnapshotPoint>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        SnapshotIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            snapshots: Vec::new(),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = SnapshotPoint>) -> Self {
        let mut index = Self::new();
        for point in points {
            index.add(point);
        }
        index
    }

    /// Load index from JSON file, or create new if file doesn't exist
    pub fn load_or_new(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot index: {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let index: SnapshotIndex =
            serde_json::from_str(json).context("failed to deserialize snapshot index")?;

        if index.schema_version != INDEX_SCHEMA_VERSION {
            anyhow::bail!(
                "snapshot index schema version mismatch: expected {}, got {}",
                INDEX_SCHEMA_VERSION,
                index.schema_version
            );
        }

        Ok(index)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize snapshot index")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.to_json()?)
    }

    /// Add a snapshot; a commit id already present is a no-op.
    pub fn add(&mut self, point: SnapshotPoint) {
        if !self.contains(&point.commit_id) {
            self.snapshots.push(point);
            self.snapshots.sort();
        }
    }

    pub fn contains(&self, commit_id: &str) -> bool {
        self.snapshots.iter().any(|p| p.commit_id == commit_id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Default for SnapshotIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// `<output>/snapshots.json`
pub fn index_path(output_dir: &Path) -> PathBuf {
    output_dir.join("snapshots.json")
}

/// `<output>/centrality`
pub fn centrality_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("centrality")
}

/// `<output>/centrality/<stamp>`
pub fn snapshot_dir(output_dir: &Path, point: &SnapshotPoint) -> PathBuf {
    centrality_dir(output_dir).join(point.stamp())
}

pub fn dependency_path(output_dir: &Path, point: &SnapshotPoint) -> PathBuf {
    snapshot_dir(output_dir, point).join(DEPENDENCY_JSON)
}

pub fn scores_path(output_dir: &Path, point: &SnapshotPoint) -> PathBuf {
    snapshot_dir(output_dir, point).join(CENTRALITY_CSV)
}

/// `<output>/centrality_matrix`
pub fn matrix_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("centrality_matrix")
}

/// `<output>/centrality_changes`
pub fn plots_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("centrality_changes")
}

/// `<output>/stability`
pub fn stability_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("stability")
}

/// Write data to file atomically using temp file + rename
pub fn atomic_write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    use std::fs;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
    file.write_all(contents.as_ref())
        .with_context(|| format!("failed to write to temp file: {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync temp file: {}", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("failed to rename temp file to: {}", path.display()))?;

    Ok(())
}
