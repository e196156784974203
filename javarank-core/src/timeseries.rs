//! Time-series assembly
//!
//! Pivots the per-snapshot centrality tables into one matrix per score
//! column: rows are FQNs, columns are snapshot timestamps in ascending
//! order. A class absent from a snapshot has an empty cell there, never 0.

use crate::snapshot::{atomic_write, centrality_dir, matrix_dir, parse_stamp, CENTRALITY_CSV};
use crate::table::{read_table, ENTITY_COLUMN};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// No snapshot directory held a readable centrality table
#[derive(Debug, Error)]
#[error("no usable centrality tables under {}", dir.display())]
pub struct NoSnapshotData {
    pub dir: PathBuf,
}

/// Entity x timestamp matrix for one score
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesMatrix {
    pub score_name: String,
    /// Ascending snapshot timestamps
    pub columns: Vec<DateTime<Utc>>,
    /// One cell per column; `None` where the entity was absent
    pub rows: BTreeMap<String, Vec<Option<f64>>>,
}

impl TimeSeriesMatrix {
    /// Pivot per-snapshot scores into a matrix.
    ///
    /// Snapshots sharing a timestamp merge into one column; later entries win.
    pub fn assemble(score_name: &str, snapshots: &[(DateTime<Utc>, BTreeMap<String, f64>)]) -> Self {
        let mut by_time: BTreeMap<DateTime<Utc>, BTreeMap<&str, f64>> = BTreeMap::new();
        for (timestamp, scores) in snapshots {
            let column = by_time.entry(*timestamp).or_default();
            for (entity, score) in scores {
                column.insert(entity.as_str(), *score);
            }
        }

        let columns: Vec<DateTime<Utc>> = by_time.keys().copied().collect();
        let mut rows: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for (i, scores) in by_time.values().enumerate() {
            for (entity, score) in scores {
                rows.entry(entity.to_string())
                    .or_insert_with(|| vec![None; columns.len()])[i] = Some(*score);
            }
        }

        TimeSeriesMatrix {
            score_name: score_name.to_string(),
            columns,
            rows,
        }
    }

    pub fn get(&self, entity: &str, timestamp: &DateTime<Utc>) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == timestamp)?;
        self.rows.get(entity)?.get(col).copied().flatten()
    }

    /// `(timestamp, value)` pairs of one entity, gaps included
    pub fn series(&self, entity: &str) -> Option<Vec<(DateTime<Utc>, Option<f64>)>> {
        let cells = self.rows.get(entity)?;
        Some(self.columns.iter().copied().zip(cells.iter().copied()).collect())
    }

    pub fn entity_count(&self) -> usize {
        self.rows.len()
    }
}

/// Load every `<stamp>/centrality_scores.csv` below `dir` and pivot each
/// score column.
///
/// Directories whose name is not a stamp and tables that cannot be read are
/// skipped with a warning. Fails with [`NoSnapshotData`] when nothing usable
/// remains.
pub fn load_from_dir(dir: &Path) -> Result<Vec<TimeSeriesMatrix>> {
    let mut subdirs: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read centrality directory");
            Vec::new()
        }
    };
    subdirs.sort();

    let mut per_score: BTreeMap<String, Vec<(DateTime<Utc>, BTreeMap<String, f64>)>> =
        BTreeMap::new();
    let mut loaded = 0usize;

    for name in subdirs {
        let Some(timestamp) = parse_stamp(&name) else {
            warn!(dir = %name, "skipping directory with invalid timestamp name");
            continue;
        };

        let path = dir.join(&name).join(CENTRALITY_CSV);
        let table = match read_table(&path) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "skipping unreadable centrality table");
                continue;
            }
        };

        if table.columns.is_empty() {
            warn!(path = %path.display(), "skipping centrality table without score columns");
            continue;
        }

        loaded += 1;
        for column in table.columns.keys() {
            per_score
                .entry(column.clone())
                .or_default()
                .push((timestamp, table.column_values(column)));
        }
    }

    if loaded == 0 {
        return Err(NoSnapshotData {
            dir: dir.to_path_buf(),
        }
        .into());
    }

    Ok(per_score
        .iter()
        .map(|(score, snapshots)| TimeSeriesMatrix::assemble(score, snapshots))
        .collect())
}

fn format_header(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Write a matrix as CSV: `FQN` then one RFC 3339 column per snapshot
pub fn write_matrix(path: &Path, matrix: &TimeSeriesMatrix) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![ENTITY_COLUMN.to_string()];
    header.extend(matrix.columns.iter().map(format_header));
    writer.write_record(&header)?;

    for (entity, cells) in &matrix.rows {
        let mut row = vec![entity.clone()];
        row.extend(
            cells
                .iter()
                .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush matrix: {}", e.error()))?;
    atomic_write(path, bytes)
}

/// Read a matrix written by [`write_matrix`]; the score name is the file stem
pub fn read_matrix(path: &Path) -> Result<TimeSeriesMatrix> {
    let score_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("no file name: {}", path.display()))?;

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open matrix: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    if headers.get(0) != Some(ENTITY_COLUMN) {
        anyhow::bail!("{}: first column must be '{}'", path.display(), ENTITY_COLUMN);
    }

    let columns = headers
        .iter()
        .skip(1)
        .map(|h| {
            DateTime::parse_from_rfc3339(h)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("{}: invalid timestamp header '{}'", path.display(), h))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let entity = record.get(0).unwrap_or_default().to_string();
        let cells = (1..=columns.len())
            .map(|i| match record.get(i).map(str::trim) {
                None | Some("") => Ok(None),
                Some(cell) => cell
                    .parse::<f64>()
                    .map(Some)
                    .with_context(|| format!("{}: invalid number '{}'", path.display(), cell)),
            })
            .collect::<Result<Vec<_>>>()?;
        rows.insert(entity, cells);
    }

    Ok(TimeSeriesMatrix {
        score_name,
        columns,
        rows,
    })
}

/// Assemble `<output>/centrality` into `<output>/centrality_matrix/<score>.csv`
pub fn assemble_outputs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let matrices = load_from_dir(&centrality_dir(output_dir))?;
    let target = matrix_dir(output_dir);

    let mut written = Vec::new();
    for matrix in &matrices {
        let path = target.join(format!("{}.csv", matrix.score_name));
        write_matrix(&path, matrix)?;
        info!(
            score = %matrix.score_name,
            entities = matrix.entity_count(),
            snapshots = matrix.columns.len(),
            "wrote time series"
        );
        written.push(path);
    }

    Ok(written)
}
