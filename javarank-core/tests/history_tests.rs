//! History integration tests - full runs against real git repositories
//!
//! Global test rules:
//! - Real git repos
//! - Temp directories
//! - No fixed SHAs
//! - Assert relationships only

use javarank_core::config::ResolvedConfig;
use javarank_core::git::select_snapshots;
use javarank_core::language::JavaParser;
use javarank_core::pipeline::open_tree;
use javarank_core::snapshot::{self, SnapshotPoint};
use javarank_core::table::read_table;
use javarank_core::timeseries::{assemble_outputs, read_matrix};
use javarank_core::{plot, stability, Pipeline};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Create a temporary git repository for testing
fn create_temp_git_repo() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
    let repo_path = temp_dir.path();

    git_command(repo_path, &["init", "--initial-branch=main"]);
    git_command(repo_path, &["config", "user.name", "Test User"]);
    git_command(repo_path, &["config", "user.email", "test@example.com"]);
    // Disable commit signing (may be configured globally in some environments)
    git_command(repo_path, &["config", "commit.gpgsign", "false"]);

    temp_dir
}

/// Run a git command in the repository
fn git_command(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .unwrap_or_else(|_| panic!("failed to run git {:?}", args));

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write_file(repo_path: &Path, path: &str, content: &str) {
    let file_path = repo_path.join(path);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).expect("failed to create directory");
    }
    fs::write(&file_path, content).expect("failed to write file");
}

/// Commit everything with a fixed author and committer date
fn commit_at(repo_path: &Path, message: &str, date: &str) -> String {
    git_command(repo_path, &["add", "-A"]);
    let status = Command::new("git")
        .current_dir(repo_path)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .args(["commit", "--quiet", "-m", message])
        .status()
        .expect("failed to run git commit");
    assert!(status.success(), "git commit failed");
    git_command(repo_path, &["rev-parse", "HEAD"])
}

/// Two monthly snapshots; `org.x.B` only exists in the second
fn build_history(repo_path: &Path) {
    write_file(
        repo_path,
        "src/org/x/A.java",
        "package org.x;\nimport org.x.C;\nimport java.util.List;\npublic class A {}\n",
    );
    write_file(repo_path, "src/org/x/C.java", "package org.x;\npublic class C {}\n");
    write_file(
        repo_path,
        "lib/com/other/Ext.java",
        "package com.other;\nimport org.x.C;\npublic class Ext {}\n",
    );
    commit_at(repo_path, "initial", "2021-01-15T12:00:00+00:00");

    write_file(
        repo_path,
        "src/org/x/B.java",
        "package org.x;\nimport org.x.C;\npublic class B {}\n",
    );
    write_file(
        repo_path,
        "src/org/x/A.java",
        "package org.x;\nimport org.x.B;\nimport org.x.C;\npublic class A {}\n",
    );
    commit_at(repo_path, "add B", "2021-02-15T12:00:00+00:00");
}

fn test_config(repo_path: &Path, output: &Path) -> ResolvedConfig {
    let mut config = ResolvedConfig::defaults(repo_path).expect("default config");
    config.package_prefix = "org.x".to_string();
    config.output_dir = output.to_path_buf();
    config.settle = Duration::ZERO;
    config.workers = 2;
    config
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn select(config: &ResolvedConfig) -> Vec<SnapshotPoint> {
    select_snapshots(
        &config.repo,
        &config.branch,
        day(2021, 1, 1),
        day(2021, 12, 31),
        config.cadence,
    )
    .expect("snapshot selection")
}

fn run_pipeline(config: &ResolvedConfig, points: &[SnapshotPoint]) {
    let tree = open_tree(config).expect("open working tree");
    let parser = JavaParser;
    let mut pipeline = Pipeline::new(config, tree, &parser).expect("pipeline");
    let summary = pipeline.run(points, |_| {});
    assert!(summary.failed.is_empty(), "failed: {:?}", summary.failed);
    assert_eq!(summary.processed.len(), points.len());
}

#[test]
fn test_end_to_end_history() {
    let repo = create_temp_git_repo();
    let out = tempfile::tempdir().unwrap();
    build_history(repo.path());
    let config = test_config(repo.path(), out.path());

    let points = select(&config);
    assert_eq!(points.len(), 2);
    assert!(points[0].timestamp < points[1].timestamp);

    run_pipeline(&config, &points);

    // First snapshot: A -> C, Ext is outside the prefix
    let first = read_table(&snapshot::scores_path(out.path(), &points[0])).unwrap();
    assert_eq!(first.entities, vec!["org.x.C", "org.x.A"]);

    // Second snapshot: A -> B -> C and A -> C
    let second = read_table(&snapshot::scores_path(out.path(), &points[1])).unwrap();
    assert_eq!(second.entities[0], "org.x.C");
    assert_eq!(second.entities.len(), 3);
    assert!(!second.entities.iter().any(|e| e.starts_with("com.other")));

    let dump = fs::read_to_string(snapshot::dependency_path(out.path(), &points[0])).unwrap();
    assert!(dump.contains("lib/com/other/Ext.java"));

    let written = assemble_outputs(out.path()).unwrap();
    assert_eq!(written.len(), 5);

    let matrix = read_matrix(&snapshot::matrix_dir(out.path()).join("centrality_score.csv"))
        .unwrap();
    assert_eq!(matrix.columns.len(), 2);
    assert_eq!(matrix.get("org.x.B", &matrix.columns[0]), None);
    assert!(matrix.get("org.x.B", &matrix.columns[1]).is_some());
    assert!(matrix.get("org.x.A", &matrix.columns[0]).is_some());

    let raw = fs::read_to_string(snapshot::matrix_dir(out.path()).join("centrality_score.csv"))
        .unwrap();
    let b_row = raw.lines().find(|l| l.starts_with("org.x.B,")).unwrap();
    assert!(b_row.starts_with("org.x.B,,"), "missing cell must be empty: {}", b_row);

    let charts = plot::plot_outputs(out.path(), |_, _| {}).unwrap();
    assert_eq!(charts, 3 * 5);
    assert!(snapshot::plots_dir(out.path())
        .join("centrality_score/org.x.B.svg")
        .exists());
}

#[test]
fn test_rerun_is_byte_identical() {
    let repo = create_temp_git_repo();
    let out = tempfile::tempdir().unwrap();
    build_history(repo.path());
    let config = test_config(repo.path(), out.path());
    let points = select(&config);

    let read_outputs = || -> Vec<Vec<u8>> {
        points
            .iter()
            .flat_map(|p| {
                [
                    fs::read(snapshot::scores_path(out.path(), p)).unwrap(),
                    fs::read(snapshot::dependency_path(out.path(), p)).unwrap(),
                ]
            })
            .collect()
    };

    run_pipeline(&config, &points);
    let first = read_outputs();
    run_pipeline(&config, &points);
    let second = read_outputs();

    assert_eq!(first, second);
}

#[test]
fn test_worktree_leaves_repository_untouched() {
    let repo = create_temp_git_repo();
    let out = tempfile::tempdir().unwrap();
    build_history(repo.path());
    write_file(repo.path(), "scratch.txt", "uncommitted");
    let head_before = git_command(repo.path(), &["rev-parse", "HEAD"]);

    let config = test_config(repo.path(), out.path());
    let points = select(&config);
    run_pipeline(&config, &points);

    assert_eq!(git_command(repo.path(), &["rev-parse", "HEAD"]), head_before);
    assert!(repo.path().join("scratch.txt").exists());
    assert!(repo.path().join("src/org/x/B.java").exists());

    let worktrees = git_command(repo.path(), &["worktree", "list", "--porcelain"]);
    assert_eq!(worktrees.matches("worktree ").count(), 1);
}

#[test]
fn test_empty_range_selects_nothing() {
    let repo = create_temp_git_repo();
    build_history(repo.path());

    let points = select_snapshots(
        repo.path(),
        "main",
        day(2015, 1, 1),
        day(2015, 12, 31),
        Default::default(),
    )
    .unwrap();
    assert!(points.is_empty());
}

#[test]
fn test_stability_prefers_recent_changes() {
    let repo = create_temp_git_repo();
    let out = tempfile::tempdir().unwrap();

    write_file(repo.path(), "Old.java", "class Old {}\n");
    write_file(repo.path(), "README.md", "readme\n");
    commit_at(repo.path(), "c0", "2021-01-01T00:00:00+00:00");
    for (i, date) in ["2021-02-01", "2021-03-01", "2021-04-01"].iter().enumerate() {
        write_file(repo.path(), "Hot.java", &format!("class Hot {{ int v = {}; }}\n", i));
        commit_at(repo.path(), &format!("c{}", i + 1), &format!("{}T00:00:00+00:00", date));
    }

    let config = test_config(repo.path(), out.path());
    let (weights_path, scores_path) = stability::run(
        repo.path(),
        "main",
        "java",
        &config.stability,
        out.path(),
        |_, _| {},
    )
    .unwrap();

    let scores = fs::read_to_string(&scores_path).unwrap();
    let lines: Vec<&str> = scores.lines().collect();
    assert_eq!(lines[0], "file_path,stability_score");
    assert!(lines[1].starts_with("Hot.java,"));
    assert_eq!(lines[2], "Old.java,0.000000");
    assert!(!scores.contains("README.md"));

    let weights = fs::read_to_string(&weights_path).unwrap();
    assert_eq!(weights.lines().next(), Some("commit_index,commit_hash,weight"));
    // floor(0.67 * 4) = 2 weighted commits
    assert_eq!(weights.lines().count(), 3);
}
