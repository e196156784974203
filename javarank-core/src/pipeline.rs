//! Snapshot orchestration
//!
//! For every selected snapshot, in timestamp order:
//! checkout -> enumerate files -> extract (parallel) -> build graph -> rank -> persist.
//!
//! A snapshot whose checkout, enumeration or persistence fails is logged,
//! recorded in the [`RunSummary`] and skipped; the run continues with the
//! next snapshot. Re-running over the same snapshots overwrites the same
//! files with identical bytes.

use crate::config::ResolvedConfig;
use crate::extract::{extract_file, ExtractionRecord};
use crate::git::{GitWorktree, InPlaceCheckout, WorkingTree};
use crate::graph::DependencyGraph;
use crate::language::SourceParser;
use crate::rank::{rank_records, CentralityRecord};
use crate::snapshot::{atomic_write, dependency_path, scores_path, SnapshotPoint};
use crate::table::write_table;
use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use tracing::{debug, info, warn};

/// Everything computed for one working tree
#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub records: Vec<ExtractionRecord>,
    pub graph: DependencyGraph,
    pub ranking: Vec<CentralityRecord>,
}

/// Progress notifications emitted by [`Pipeline::run`]
#[derive(Debug)]
pub enum SnapshotEvent<'a> {
    Started {
        index: usize,
        total: usize,
        point: &'a SnapshotPoint,
    },
    Finished {
        point: &'a SnapshotPoint,
        nodes: usize,
        edges: usize,
    },
    Failed {
        point: &'a SnapshotPoint,
        error: &'a anyhow::Error,
    },
}

/// Outcome of a pipeline run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: Vec<SnapshotPoint>,
    pub failed: Vec<(SnapshotPoint, String)>,
}

/// Open the working tree the configuration asks for
pub fn open_tree(config: &ResolvedConfig) -> Result<Box<dyn WorkingTree>> {
    if config.isolated_checkout {
        Ok(Box::new(GitWorktree::create(&config.repo, config.settle)?))
    } else {
        Ok(Box::new(InPlaceCheckout::new(&config.repo, config.settle)))
    }
}

pub struct Pipeline<'a> {
    config: &'a ResolvedConfig,
    tree: Box<dyn WorkingTree + 'a>,
    parser: &'a dyn SourceParser,
    pool: ThreadPool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        tree: Box<dyn WorkingTree + 'a>,
        parser: &'a dyn SourceParser,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("javarank-extract-{}", i))
            .build()
            .context("failed to build extraction thread pool")?;

        Ok(Pipeline {
            config,
            tree,
            parser,
            pool,
        })
    }

    /// Process every snapshot, oldest first
    pub fn run(
        &mut self,
        points: &[SnapshotPoint],
        mut on_event: impl FnMut(&SnapshotEvent<'_>),
    ) -> RunSummary {
        let mut ordered = points.to_vec();
        ordered.sort();
        ordered.dedup_by(|a, b| a.commit_id == b.commit_id);

        let total = ordered.len();
        let mut summary = RunSummary::default();

        for (index, point) in ordered.iter().enumerate() {
            on_event(&SnapshotEvent::Started {
                index,
                total,
                point,
            });

            match self.run_snapshot(point) {
                Ok(result) => {
                    on_event(&SnapshotEvent::Finished {
                        point,
                        nodes: result.graph.node_count(),
                        edges: result.graph.edge_count(),
                    });
                    summary.processed.push(point.clone());
                }
                Err(error) => {
                    warn!(
                        commit = %point.commit_id,
                        timestamp = %point.timestamp,
                        error = %format!("{:#}", error),
                        "skipping snapshot"
                    );
                    on_event(&SnapshotEvent::Failed {
                        point,
                        error: &error,
                    });
                    summary
                        .failed
                        .push((point.clone(), format!("{:#}", error)));
                }
            }
        }

        info!(
            processed = summary.processed.len(),
            failed = summary.failed.len(),
            "pipeline finished"
        );
        summary
    }

    /// Check out, analyse and persist one snapshot
    pub fn run_snapshot(&mut self, point: &SnapshotPoint) -> Result<SnapshotResult> {
        self.tree
            .checkout(&point.commit_id)
            .with_context(|| format!("checkout of {} failed", point.commit_id))?;

        let files = self.enumerate()?;
        let result = self.process_tree(self.tree.root(), &files);
        self.persist(point, &result)?;

        debug!(
            commit = %point.commit_id,
            files = files.len(),
            nodes = result.graph.node_count(),
            edges = result.graph.edge_count(),
            "snapshot processed"
        );
        Ok(result)
    }

    /// Files to analyse at the current checkout: filtered, sorted, capped
    fn enumerate(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .tree
            .list_files(&self.config.extension)?
            .into_iter()
            .filter(|f| self.config.should_include(Path::new(f)))
            .collect();
        files.sort();

        if files.len() > self.config.max_files {
            info!(
                found = files.len(),
                kept = self.config.max_files,
                "truncating file list"
            );
            files.truncate(self.config.max_files);
        }

        Ok(files)
    }

    /// Extract, build and rank the given files below `root`
    pub fn process_tree(&self, root: &Path, files: &[String]) -> SnapshotResult {
        let prefix = self.config.package_prefix.as_str();
        let parser = self.parser;

        let records: Vec<ExtractionRecord> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| extract_file(parser, root, file, prefix))
                .collect()
        });

        let graph = DependencyGraph::build(&records, prefix, self.config.edge_policy);
        let ranking = rank_records(&graph, &self.config.pagerank);

        SnapshotResult {
            records,
            graph,
            ranking,
        }
    }

    fn persist(&self, point: &SnapshotPoint, result: &SnapshotResult) -> Result<()> {
        let output = &self.config.output_dir;

        let json = serde_json::to_string_pretty(&result.records)
            .context("failed to serialize extraction records")?;
        atomic_write(&dependency_path(output, point), json)?;

        write_table(&scores_path(output, point), &result.ranking)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::JavaParser;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Tree backed by a plain directory; `fail` lists commits whose checkout errors
    struct DirTree {
        root: PathBuf,
        fail: Vec<String>,
    }

    impl WorkingTree for DirTree {
        fn root(&self) -> &Path {
            &self.root
        }

        fn checkout(&mut self, commit_id: &str) -> Result<()> {
            if self.fail.iter().any(|f| f == commit_id) {
                anyhow::bail!("cannot check out {}", commit_id);
            }
            Ok(())
        }

        fn list_files(&self, extension: &str) -> Result<Vec<String>> {
            let suffix = format!(".{}", extension);
            let mut files = Vec::new();
            for entry in fs::read_dir(&self.root)? {
                let name = entry?.file_name().to_string_lossy().to_string();
                if name.ends_with(&suffix) {
                    files.push(name);
                }
            }
            Ok(files)
        }
    }

    fn write_sources(dir: &Path) {
        fs::write(dir.join("A.java"), "package org.x;\nimport org.x.B;\nclass A {}\n").unwrap();
        fs::write(dir.join("B.java"), "package org.x;\nimport org.x.C;\nclass B {}\n").unwrap();
        fs::write(dir.join("C.java"), "package org.x;\nclass C {}\n").unwrap();
        fs::write(dir.join("Bad.java"), "package org.x;\nclass Bad { void f( }\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    fn config(output: &Path) -> ResolvedConfig {
        let mut config = ResolvedConfig::defaults(output).unwrap();
        config.package_prefix = "org.x".to_string();
        config.output_dir = output.to_path_buf();
        config.workers = 2;
        config
    }

    fn point(sha: &str, day: u32) -> SnapshotPoint {
        SnapshotPoint::new(sha, Utc.with_ymd_and_hms(2021, 1, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_process_tree_ranks_chain() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_sources(src.path());
        let config = config(out.path());

        let tree = DirTree {
            root: src.path().to_path_buf(),
            fail: vec![],
        };
        let pipeline = Pipeline::new(&config, Box::new(tree), &JavaParser).unwrap();

        let files: Vec<String> = ["A.java", "B.java", "Bad.java", "C.java"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = pipeline.process_tree(src.path(), &files);

        assert_eq!(result.records.len(), 4);
        assert_eq!(result.records[2].fqn, None);
        let order: Vec<&str> = result.ranking.iter().map(|r| r.fqn.as_str()).collect();
        assert_eq!(order, vec!["org.x.C", "org.x.B", "org.x.A"]);
    }

    #[test]
    fn test_run_skips_failed_checkout() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_sources(src.path());
        let config = config(out.path());

        let tree = DirTree {
            root: src.path().to_path_buf(),
            fail: vec!["bad".to_string()],
        };
        let mut pipeline = Pipeline::new(&config, Box::new(tree), &JavaParser).unwrap();

        let points = vec![point("third", 3), point("bad", 2), point("first", 1)];
        let mut started = Vec::new();
        let summary = pipeline.run(&points, |event| {
            if let SnapshotEvent::Started { point, .. } = event {
                started.push(point.commit_id.clone());
            }
        });

        assert_eq!(started, vec!["first", "bad", "third"]);
        assert_eq!(summary.processed.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0.commit_id, "bad");

        assert!(scores_path(out.path(), &points[0]).exists());
        assert!(dependency_path(out.path(), &points[2]).exists());
        assert!(!scores_path(out.path(), &points[1]).exists());
    }

    #[test]
    fn test_max_files_keeps_sorted_prefix() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_sources(src.path());
        let mut config = config(out.path());
        config.max_files = 2;

        let tree = DirTree {
            root: src.path().to_path_buf(),
            fail: vec![],
        };
        let mut pipeline = Pipeline::new(&config, Box::new(tree), &JavaParser).unwrap();
        let result = pipeline.run_snapshot(&point("one", 1)).unwrap();

        let paths: Vec<&str> = result.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["A.java", "B.java"]);
        // B imports C, which is outside the sample
        assert_eq!(result.graph.edge_count(), 1);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_sources(src.path());
        let config = config(out.path());
        let snapshot = point("one", 1);

        let read_outputs = || {
            let tree = DirTree {
                root: src.path().to_path_buf(),
                fail: vec![],
            };
            let mut pipeline = Pipeline::new(&config, Box::new(tree), &JavaParser).unwrap();
            pipeline.run_snapshot(&snapshot).unwrap();
            (
                fs::read(scores_path(out.path(), &snapshot)).unwrap(),
                fs::read(dependency_path(out.path(), &snapshot)).unwrap(),
            )
        };

        let first = read_outputs();
        let second = read_outputs();
        assert_eq!(first, second);
    }
}
