//! Per-snapshot centrality table (CSV)
//!
//! Header: `FQN,centrality_score,centrality_l2,centrality_z,centrality_min_max,centrality_log`.
//! Floats use Rust's shortest round-trip formatting, so equal inputs give
//! byte-identical files.

use crate::rank::CentralityRecord;
use crate::snapshot::atomic_write;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENTITY_COLUMN: &str = "FQN";

/// Every column holding a score starts with this prefix
pub const SCORE_PREFIX: &str = "centrality_";

pub const SCORE_COLUMNS: [&str; 5] = [
    "centrality_score",
    "centrality_l2",
    "centrality_z",
    "centrality_min_max",
    "centrality_log",
];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("{}: missing 'FQN' column", path.display())]
    MissingEntityColumn { path: PathBuf },
    #[error("{}: row {row}, column '{column}': invalid number '{value}'", path.display())]
    InvalidNumber {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
}

/// Score columns read back from a centrality table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    /// Entity names in file order
    pub entities: Vec<String>,
    /// `centrality_*` column name -> one value per entity
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl ScoreTable {
    /// Present values of one column keyed by entity
    pub fn column_values(&self, name: &str) -> BTreeMap<String, f64> {
        let Some(values) = self.columns.get(name) else {
            return BTreeMap::new();
        };
        self.entities
            .iter()
            .zip(values)
            .filter_map(|(entity, value)| value.map(|v| (entity.clone(), v)))
            .collect()
    }
}

/// Serialize records in the order given
pub fn render_table(records: &[CentralityRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![ENTITY_COLUMN];
    header.extend(SCORE_COLUMNS);
    writer.write_record(&header)?;

    for record in records {
        writer.write_record([
            record.fqn.clone(),
            record.score.to_string(),
            record.l2.to_string(),
            record.z.to_string(),
            record.min_max.to_string(),
            record.log.to_string(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write the table, replacing any previous file
pub fn write_table(path: &Path, records: &[CentralityRecord]) -> Result<(), TableError> {
    let bytes = render_table(records).map_err(|source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, bytes).map_err(|e| TableError::Write {
        path: path.to_path_buf(),
        message: format!("{:#}", e),
    })
}

/// Read the entity column and every `centrality_*` column
pub fn read_table(path: &Path) -> Result<ScoreTable, TableError> {
    let csv_err = |source: csv::Error| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let entity_idx = headers
        .iter()
        .position(|h| h == ENTITY_COLUMN)
        .ok_or_else(|| TableError::MissingEntityColumn {
            path: path.to_path_buf(),
        })?;
    let score_idx: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with(SCORE_PREFIX))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut table = ScoreTable::default();
    for (_, name) in &score_idx {
        table.columns.insert(name.clone(), Vec::new());
    }

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(csv_err)?;
        table
            .entities
            .push(record.get(entity_idx).unwrap_or_default().to_string());

        for (idx, name) in &score_idx {
            let cell = record.get(*idx).unwrap_or_default().trim();
            let value = if cell.is_empty() {
                None
            } else {
                Some(cell.parse::<f64>().map_err(|_| TableError::InvalidNumber {
                    path: path.to_path_buf(),
                    row: row + 1,
                    column: name.clone(),
                    value: cell.to_string(),
                })?)
            };
            if let Some(values) = table.columns.get_mut(name) {
                values.push(value);
            }
        }
    }

    Ok(table)
}
