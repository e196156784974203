//! javarank CLI - PageRank centrality of Java classes across repository history

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use javarank_core::config::{self, Cadence, ResolvedConfig};
use javarank_core::git;
use javarank_core::language::JavaParser;
use javarank_core::pipeline::{open_tree, SnapshotEvent};
use javarank_core::snapshot::{self, SnapshotIndex};
use javarank_core::{plot, stability, timeseries, Pipeline};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "javarank")]
#[command(about = "Rank Java classes by import-graph PageRank across a repository's history")]
#[command(version = env!("JAVARANK_VERSION"))]
struct Cli {
    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that touches a repository
#[derive(clap::Args, Default)]
struct RepoArgs {
    /// Repository to mine (overrides config file)
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Output directory (overrides config file)
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Flags controlling which commits are sampled
#[derive(clap::Args, Default)]
struct SelectArgs {
    /// Branch to sample
    #[arg(long)]
    branch: Option<String>,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Sample every N days instead of monthly
    #[arg(long)]
    every_days: Option<u32>,
}

/// Flags controlling extraction and ranking
#[derive(clap::Args, Default)]
struct AnalysisArgs {
    /// Package prefix that marks project classes
    #[arg(long)]
    prefix: Option<String>,

    /// Extraction worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum files analysed per snapshot
    #[arg(long)]
    max_files: Option<usize>,

    /// Check out in the repository itself instead of a separate worktree
    #[arg(long)]
    in_place: bool,
}

impl SelectArgs {
    fn is_set(&self) -> bool {
        self.branch.is_some()
            || self.start.is_some()
            || self.end.is_some()
            || self.every_days.is_some()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Select historical snapshots and write the snapshot index
    Select {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        select: SelectArgs,
    },
    /// Extract, rank and persist every snapshot
    Run {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        select: SelectArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Re-select snapshots even if an index exists
        #[arg(long)]
        fresh: bool,
    },
    /// Rank a single commit (default: HEAD)
    Rank {
        #[command(flatten)]
        repo: RepoArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Revision to rank
        #[arg(default_value = "HEAD")]
        rev: String,

        /// Show only the top N classes
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Assemble per-snapshot scores into time-series matrices
    Assemble {
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Render one chart per class and score
    Plot {
        #[command(flatten)]
        repo: RepoArgs,
    },
    /// Compute file stability scores from the change history
    Stability {
        #[command(flatten)]
        repo: RepoArgs,

        /// Branch or revision to walk (default: configured branch)
        #[arg(long)]
        rev: Option<String>,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running anything
    Validate,
    /// Show the resolved configuration (merged defaults + config file)
    Show,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Select { repo, select } => {
            let resolved = resolve(&cwd, config_path, &repo, &select, &AnalysisArgs::default())?;
            require_git_repo(&resolved)?;
            let index = select_and_save(&resolved)?;
            println!(
                "Selected {} snapshots -> {}",
                index.len(),
                snapshot::index_path(&resolved.output_dir).display()
            );
        }
        Commands::Run {
            repo,
            select,
            analysis,
            fresh,
        } => {
            let resolved = resolve(&cwd, config_path, &repo, &select, &analysis)?;
            require_git_repo(&resolved)?;
            let index_path = snapshot::index_path(&resolved.output_dir);
            let index = if should_reselect(fresh, &select, index_path.exists()) {
                if select.is_set() && index_path.exists() && !fresh {
                    info!("selection flags given; replacing existing snapshot index");
                }
                select_and_save(&resolved)?
            } else {
                SnapshotIndex::load(&index_path)?
            };

            if index.is_empty() {
                warn!("no snapshots in range; nothing to do");
                return Ok(());
            }

            let tree = open_tree(&resolved)?;
            let parser = JavaParser;
            let mut pipeline = Pipeline::new(&resolved, tree, &parser)?;

            let bar = ProgressBar::new(index.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
                    .progress_chars("=> "),
            );
            let summary = pipeline.run(&index.snapshots, |event| match event {
                SnapshotEvent::Started { point, .. } => {
                    bar.set_message(format!("{} {}", point.stamp(), short_sha(&point.commit_id)));
                }
                SnapshotEvent::Finished { .. } => bar.inc(1),
                SnapshotEvent::Failed { point, error } => {
                    bar.println(format!("skipped {}: {:#}", point.stamp(), error));
                    bar.inc(1);
                }
            });
            bar.finish_and_clear();

            println!(
                "Processed {} snapshots ({} skipped) -> {}",
                summary.processed.len(),
                summary.failed.len(),
                snapshot::centrality_dir(&resolved.output_dir).display()
            );
        }
        Commands::Rank {
            repo,
            analysis,
            rev,
            top,
        } => {
            let resolved = resolve(&cwd, config_path, &repo, &SelectArgs::default(), &analysis)?;
            require_git_repo(&resolved)?;
            let point = git::resolve_commit(&resolved.repo, &rev)?;

            let tree = open_tree(&resolved)?;
            let parser = JavaParser;
            let mut pipeline = Pipeline::new(&resolved, tree, &parser)?;
            let result = pipeline.run_snapshot(&point)?;

            println!(
                "{} at {}: {} classes, {} edges",
                short_sha(&point.commit_id),
                point.timestamp.to_rfc3339(),
                result.graph.node_count(),
                result.graph.edge_count()
            );
            println!();
            println!("{:<4} {:<60} {:>10} {:>8}", "#", "FQN", "score", "z");
            for (i, record) in result.ranking.iter().take(top).enumerate() {
                println!(
                    "{:<4} {:<60} {:>10.6} {:>8.3}",
                    i + 1,
                    truncate_string(&record.fqn, 60),
                    record.score,
                    record.z
                );
            }
        }
        Commands::Assemble { repo } => {
            let resolved = resolve(
                &cwd,
                config_path,
                &repo,
                &SelectArgs::default(),
                &AnalysisArgs::default(),
            )?;
            let written = timeseries::assemble_outputs(&resolved.output_dir)
                .context("failed to assemble time series")?;
            for path in &written {
                println!("Wrote {}", path.display());
            }
        }
        Commands::Plot { repo } => {
            let resolved = resolve(
                &cwd,
                config_path,
                &repo,
                &SelectArgs::default(),
                &AnalysisArgs::default(),
            )?;

            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template("{spinner:.green} {pos} charts {msg}")?);
            let total = plot::plot_outputs(&resolved.output_dir, |score, fqn| {
                bar.set_message(format!("{} {}", score, fqn));
                bar.inc(1);
            })?;
            bar.finish_and_clear();

            println!(
                "Rendered {} charts -> {}",
                total,
                snapshot::plots_dir(&resolved.output_dir).display()
            );
        }
        Commands::Stability { repo, rev } => {
            let resolved = resolve(
                &cwd,
                config_path,
                &repo,
                &SelectArgs::default(),
                &AnalysisArgs::default(),
            )?;
            require_git_repo(&resolved)?;
            let rev = rev.unwrap_or_else(|| resolved.branch.clone());

            let bar = ProgressBar::new(0);
            bar.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} commits",
            )?);
            let (weights, scores) = stability::run(
                &resolved.repo,
                &rev,
                &resolved.extension,
                &resolved.stability,
                &resolved.output_dir,
                |done, total| {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                },
            )?;
            bar.finish_and_clear();

            println!("Wrote {}", weights.display());
            println!("Wrote {}", scores.display());
        }
        Commands::Config { action } => {
            let root = project_root(&cwd);
            match action {
                ConfigAction::Validate => {
                    match config::load_and_resolve(&root, config_path) {
                        Ok(resolved) => {
                            if let Some(ref p) = resolved.config_path {
                                println!("Config valid: {}", p.display());
                            } else {
                                println!("No config file found. Using defaults.");
                            }
                        }
                        Err(e) => {
                            eprintln!("Config validation failed: {:#}", e);
                            std::process::exit(1);
                        }
                    }
                }
                ConfigAction::Show => {
                    let resolved = config::load_and_resolve(&root, config_path)
                        .context("failed to load configuration")?;
                    print_config(&resolved);
                }
            }
        }
    }

    Ok(())
}

/// Directory config files are discovered from: the enclosing repository
/// root, or `cwd` itself outside a repository
fn project_root(cwd: &Path) -> PathBuf {
    find_repo_root(cwd).unwrap_or_else(|_| cwd.to_path_buf())
}

/// Load configuration and apply CLI overrides
fn resolve(
    cwd: &Path,
    config_path: Option<&Path>,
    repo: &RepoArgs,
    select: &SelectArgs,
    analysis: &AnalysisArgs,
) -> anyhow::Result<ResolvedConfig> {
    let mut resolved = config::load_and_resolve(&project_root(cwd), config_path)
        .context("failed to load configuration")?;

    if let Some(p) = &resolved.config_path {
        info!(path = %p.display(), "using config");
    }

    let absolute = |p: &Path| {
        if p.is_relative() {
            cwd.join(p)
        } else {
            p.to_path_buf()
        }
    };

    // CLI flags override config file values
    if let Some(r) = &repo.repo {
        resolved.repo = absolute(r);
    }
    if let Some(o) = &repo.output {
        resolved.output_dir = absolute(o);
    }
    if let Some(b) = &select.branch {
        resolved.branch = b.clone();
    }
    if let Some(s) = select.start {
        resolved.start_date = s;
    }
    if let Some(e) = select.end {
        resolved.end_date = e;
    }
    if let Some(n) = select.every_days {
        if n == 0 {
            anyhow::bail!("--every-days must be at least 1");
        }
        resolved.cadence = Cadence::EveryDays(n);
    }
    if let Some(p) = &analysis.prefix {
        resolved.package_prefix = p.clone();
    }
    if let Some(w) = analysis.workers {
        if w == 0 {
            anyhow::bail!("--workers must be at least 1");
        }
        resolved.workers = w;
    }
    if let Some(m) = analysis.max_files {
        if m == 0 {
            anyhow::bail!("--max-files must be at least 1");
        }
        resolved.max_files = m;
    }
    if analysis.in_place {
        resolved.isolated_checkout = false;
    }

    if resolved.start_date > resolved.end_date {
        anyhow::bail!(
            "start date {} is after end date {}",
            resolved.start_date,
            resolved.end_date
        );
    }
    Ok(resolved)
}

/// Commands that read history need a repository; `assemble` and `plot`
/// only read persisted tables
fn require_git_repo(resolved: &ResolvedConfig) -> anyhow::Result<()> {
    if !resolved.repo.join(".git").exists() {
        anyhow::bail!("not a git repository: {}", resolved.repo.display());
    }
    Ok(())
}

/// Selection flags always win over a persisted index
fn should_reselect(fresh: bool, select: &SelectArgs, index_exists: bool) -> bool {
    fresh || !index_exists || select.is_set()
}

fn select_and_save(resolved: &ResolvedConfig) -> anyhow::Result<SnapshotIndex> {
    let points = git::select_snapshots(
        &resolved.repo,
        &resolved.branch,
        resolved.start_date,
        resolved.end_date,
        resolved.cadence,
    )?;
    let index = SnapshotIndex::from_points(points);
    index.save(&snapshot::index_path(&resolved.output_dir))?;
    Ok(index)
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Repository:");
    println!("  repo: {}", resolved.repo.display());
    println!("  branch: {}", resolved.branch);
    println!("  extension: {}", resolved.extension);
    println!(
        "  package_prefix: {}",
        if resolved.package_prefix.is_empty() {
            "(none)"
        } else {
            resolved.package_prefix.as_str()
        }
    );
    println!();
    println!("Sampling:");
    println!("  range: {} .. {}", resolved.start_date, resolved.end_date);
    match resolved.cadence {
        Cadence::Monthly => println!("  cadence: monthly"),
        Cadence::EveryDays(n) => println!("  cadence: every {} days", n),
    }
    println!("  max_files: {}", resolved.max_files);
    println!("  workers: {}", resolved.workers);
    println!(
        "  checkout: {}",
        if resolved.isolated_checkout {
            "worktree"
        } else {
            "in place"
        }
    );
    println!("  settle: {}ms", resolved.settle.as_millis());
    println!();
    println!("PageRank:");
    println!("  damping: {}", resolved.pagerank.damping);
    println!("  tolerance: {}", resolved.pagerank.tolerance);
    println!("  max_iterations: {}", resolved.pagerank.max_iterations);
    println!("  edge_policy: {:?}", resolved.edge_policy);
    println!();
    println!("Stability:");
    println!("  recent_fraction: {}", resolved.stability.recent_fraction);
    println!("  weight_min: {}", resolved.stability.weight_min);
    println!();
    println!("Output:");
    println!("  dir: {}", resolved.output_dir.display());
    println!(
        "  include: {}",
        if resolved.include.is_some() {
            "custom patterns"
        } else {
            "all files"
        }
    );
}

fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}

/// Truncate string to max length, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn find_repo_root(start_path: &Path) -> anyhow::Result<PathBuf> {
    let mut current = start_path.to_path_buf();

    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => anyhow::bail!("not in a git repository (no .git directory found)"),
        }
    }
}
