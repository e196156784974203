//! Configuration file support for javarank
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.javarankrc.json` in the working directory
//! 3. `javarank.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.
//! The resolved value is passed explicitly to every component; nothing reads
//! configuration from global state.

use crate::graph::EdgePolicy;
use crate::rank::PageRankSettings;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_EXTENSION: &str = "java";
const DEFAULT_START_DATE: &str = "2008-01-01";
const DEFAULT_END_DATE: &str = "2024-12-31";
const DEFAULT_MAX_FILES: usize = 20_000;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_SETTLE_MS: u64 = 2_000;
const DEFAULT_OUTPUT_DIR: &str = "data";
const DEFAULT_RECENT_FRACTION: f64 = 0.67;
const DEFAULT_WEIGHT_MIN: f64 = 0.1;

/// How historical snapshots are spaced across the date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Last commit of every calendar month
    #[default]
    Monthly,
    /// Last commit of every N-day window starting at the range start
    EveryDays(u32),
}

/// javarank configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JavarankConfig {
    /// Repository to mine (default: working directory)
    #[serde(default)]
    pub repo: Option<PathBuf>,

    /// Branch whose history is sampled (default: "main")
    #[serde(default)]
    pub branch: Option<String>,

    /// Source file extension without the dot (default: "java")
    #[serde(default)]
    pub extension: Option<String>,

    /// Package-name prefix that marks a declaration as in-project
    #[serde(default)]
    pub package_prefix: Option<String>,

    /// Glob patterns for files to include (default: all files with the extension)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for files to exclude
    #[serde(default)]
    pub exclude: Vec<String>,

    /// First day of the sampled range, `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,

    /// Last day of the sampled range, `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub cadence: Option<Cadence>,

    /// Maximum files analyzed per snapshot (deterministic prefix)
    #[serde(default)]
    pub max_files: Option<usize>,

    /// Extraction worker threads per snapshot
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub damping: Option<f64>,

    #[serde(default)]
    pub tolerance: Option<f64>,

    #[serde(default)]
    pub max_iterations: Option<usize>,

    #[serde(default)]
    pub edge_policy: Option<EdgePolicy>,

    /// Check snapshots out in a temporary worktree instead of resetting the repo in place
    #[serde(default)]
    pub isolated_checkout: Option<bool>,

    /// Pause after each destructive reset, in milliseconds
    #[serde(default)]
    pub settle_ms: Option<u64>,

    /// Root directory for all persisted output
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub stability: Option<StabilityConfig>,
}

/// Weighting of recent commits for stability scores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StabilityConfig {
    /// Share of history (newest commits) that carries weight (default: 0.67)
    pub recent_fraction: Option<f64>,
    /// Weight of the oldest commit inside the recent window (default: 0.1)
    pub weight_min: Option<f64>,
}

/// Resolved stability weighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilitySettings {
    pub recent_fraction: f64,
    pub weight_min: f64,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        StabilitySettings {
            recent_fraction: DEFAULT_RECENT_FRACTION,
            weight_min: DEFAULT_WEIGHT_MIN,
        }
    }
}

/// Resolved configuration with compiled glob patterns
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub repo: PathBuf,
    pub branch: String,
    pub extension: String,
    pub package_prefix: String,
    /// Compiled include patterns (None means include all)
    pub include: Option<GlobSet>,
    /// Compiled exclude patterns
    pub exclude: GlobSet,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
    pub max_files: usize,
    pub workers: usize,
    pub pagerank: PageRankSettings,
    pub edge_policy: EdgePolicy,
    pub isolated_checkout: bool,
    pub settle: Duration,
    pub output_dir: PathBuf,
    pub stability: StabilitySettings,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("{} must be YYYY-MM-DD (got {})", field, value))
}

impl JavarankConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        let start = parse_date(
            "start_date",
            self.start_date.as_deref().unwrap_or(DEFAULT_START_DATE),
        )?;
        let end = parse_date(
            "end_date",
            self.end_date.as_deref().unwrap_or(DEFAULT_END_DATE),
        )?;
        if start > end {
            anyhow::bail!(
                "start_date ({}) must not be after end_date ({})",
                start,
                end
            );
        }

        if let Some(Cadence::EveryDays(0)) = self.cadence {
            anyhow::bail!("cadence.every_days must be at least 1");
        }

        if let Some(ext) = &self.extension {
            if ext.is_empty() || ext.starts_with('.') {
                anyhow::bail!("extension must be non-empty and given without a dot (got {:?})", ext);
            }
        }

        if self.max_files == Some(0) {
            anyhow::bail!("max_files must be at least 1");
        }
        if self.workers == Some(0) {
            anyhow::bail!("workers must be at least 1");
        }

        if let Some(d) = self.damping {
            if d.is_nan() || d <= 0.0 || d >= 1.0 {
                anyhow::bail!("damping must be between 0 and 1 exclusive (got {})", d);
            }
        }
        if let Some(t) = self.tolerance {
            if t.is_nan() || t <= 0.0 {
                anyhow::bail!("tolerance must be positive (got {})", t);
            }
        }
        if self.max_iterations == Some(0) {
            anyhow::bail!("max_iterations must be at least 1");
        }

        if let Some(ref s) = self.stability {
            if let Some(f) = s.recent_fraction {
                if f.is_nan() || f <= 0.0 || f > 1.0 {
                    anyhow::bail!("stability.recent_fraction must be in (0, 1] (got {})", f);
                }
            }
            if let Some(w) = s.weight_min {
                if !(0.0..=1.0).contains(&w) {
                    anyhow::bail!("stability.weight_min must be in [0, 1] (got {})", w);
                }
            }
        }

        // Validate glob patterns compile
        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    ///
    /// Relative `repo` and `output_dir` paths are taken relative to `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedConfig> {
        self.validate()?;

        let include = if self.include.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.include {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        let exclude = {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.exclude {
                builder.add(Glob::new(pattern)?);
            }
            builder.build()?
        };

        let defaults = PageRankSettings::default();
        let pagerank = PageRankSettings {
            damping: self.damping.unwrap_or(defaults.damping),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
        };

        let stability = match &self.stability {
            Some(s) => StabilitySettings {
                recent_fraction: s.recent_fraction.unwrap_or(DEFAULT_RECENT_FRACTION),
                weight_min: s.weight_min.unwrap_or(DEFAULT_WEIGHT_MIN),
            },
            None => StabilitySettings::default(),
        };

        let anchor = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        };

        Ok(ResolvedConfig {
            repo: self
                .repo
                .as_deref()
                .map(anchor)
                .unwrap_or_else(|| base_dir.to_path_buf()),
            branch: self
                .branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            extension: self
                .extension
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            package_prefix: self.package_prefix.clone().unwrap_or_default(),
            include,
            exclude,
            start_date: parse_date(
                "start_date",
                self.start_date.as_deref().unwrap_or(DEFAULT_START_DATE),
            )?,
            end_date: parse_date(
                "end_date",
                self.end_date.as_deref().unwrap_or(DEFAULT_END_DATE),
            )?,
            cadence: self.cadence.unwrap_or_default(),
            max_files: self.max_files.unwrap_or(DEFAULT_MAX_FILES),
            workers: self.workers.unwrap_or(DEFAULT_WORKERS),
            pagerank,
            edge_policy: self.edge_policy.unwrap_or_default(),
            isolated_checkout: self.isolated_checkout.unwrap_or(true),
            settle: Duration::from_millis(self.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
            output_dir: anchor(
                self.output_dir
                    .as_deref()
                    .unwrap_or_else(|| Path::new(DEFAULT_OUTPUT_DIR)),
            ),
            stability,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Check if a repository-relative path should be analyzed
    ///
    /// The extension filter is applied by file enumeration; this only checks
    /// include/exclude patterns.
    pub fn should_include(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        // Check exclude first
        if self.exclude.is_match(path_str.as_ref()) {
            return false;
        }

        // If include patterns exist, file must match at least one
        if let Some(ref include) = self.include {
            return include.is_match(path_str.as_ref());
        }

        true
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults(base_dir: &Path) -> Result<Self> {
        JavarankConfig::default().resolve(base_dir)
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.javarankrc.json`
/// 2. `javarank.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(dir: &Path) -> Result<Option<(JavarankConfig, PathBuf)>> {
    for name in [".javarankrc.json", "javarank.config.json"] {
        let path = dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }

    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<JavarankConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: JavarankConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a working directory
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from `base_dir`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(base_dir: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(base_dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (JavarankConfig::default(), None),
        }
    };

    let mut resolved = config.resolve(base_dir)?;
    resolved.config_path = source_path;
    Ok(resolved)
}
