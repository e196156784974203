//! Git collaborator
//!
//! Commit listing, snapshot selection, file enumeration and destructive
//! checkouts. Uses git CLI directly (no libgit2) for portability.
//!
//! Global invariants enforced:
//! - Commit hash is the sole identity
//! - Timestamps are author dates, normalized to UTC
//! - Selected snapshots are returned oldest first
//! - The analysed repository's own checkout is never touched unless
//!   in-place mode is requested explicitly

use crate::config::Cadence;
use crate::snapshot::SnapshotPoint;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Execute a git command in `repo_path` and return the trimmed stdout
pub fn git_at(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .context("failed to invoke git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Parse `%H|%aI` lines
fn parse_commit_lines(raw: &str) -> Result<Vec<SnapshotPoint>> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (sha, date) = line
                .split_once('|')
                .with_context(|| format!("malformed git log line: {}", line))?;
            let timestamp = DateTime::parse_from_rfc3339(date.trim())
                .with_context(|| format!("invalid commit date '{}' for {}", date, sha))?
                .with_timezone(&Utc);
            Ok(SnapshotPoint::new(sha.trim(), timestamp))
        })
        .collect()
}

/// Commits reachable from `branch` whose date falls in `[since, until]`,
/// in git log order reversed (oldest first).
pub fn commits_in_range(
    repo: &Path,
    branch: &str,
    since: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<SnapshotPoint>> {
    let after = format!("--after={}T00:00:00+00:00", since.format("%Y-%m-%d"));
    let before_day = until
        .succ_opt()
        .with_context(|| format!("end date out of range: {}", until))?;
    let before = format!("--before={}T00:00:00+00:00", before_day.format("%Y-%m-%d"));

    let raw = git_at(
        repo,
        &[
            "log",
            branch,
            &after,
            &before,
            "--reverse",
            "--format=%H|%aI",
        ],
    )
    .with_context(|| format!("failed to list commits on {}", branch))?;

    let commits = parse_commit_lines(&raw)?;

    // git filters on committer date; keep the author-date view consistent
    let start = since.and_time(NaiveTime::MIN).and_utc();
    let end = before_day.and_time(NaiveTime::MIN).and_utc();
    Ok(commits
        .into_iter()
        .filter(|c| c.timestamp >= start && c.timestamp < end)
        .collect())
}

/// Bucket key of a commit date under `cadence`
fn bucket_key(cadence: Cadence, start: NaiveDate, timestamp: &DateTime<Utc>) -> i64 {
    let date = timestamp.date_naive();
    match cadence {
        Cadence::Monthly => i64::from(date.year()) * 12 + i64::from(date.month0()),
        Cadence::EveryDays(days) => (date - start).num_days() / i64::from(days.max(1)),
    }
}

/// Last commit of every cadence bucket in `[start, end]`, oldest first.
///
/// An empty range yields an empty list.
pub fn select_snapshots(
    repo: &Path,
    branch: &str,
    start: NaiveDate,
    end: NaiveDate,
    cadence: Cadence,
) -> Result<Vec<SnapshotPoint>> {
    let commits = commits_in_range(repo, branch, start, end)?;
    let total = commits.len();

    let mut buckets: BTreeMap<i64, SnapshotPoint> = BTreeMap::new();
    for commit in commits {
        buckets.insert(bucket_key(cadence, start, &commit.timestamp), commit);
    }

    let mut selected: Vec<SnapshotPoint> = buckets.into_values().collect();
    selected.sort();

    info!(
        commits = total,
        snapshots = selected.len(),
        %start,
        %end,
        "selected snapshots"
    );
    Ok(selected)
}

/// Resolve a revision to a snapshot point
pub fn resolve_commit(repo: &Path, rev: &str) -> Result<SnapshotPoint> {
    let raw = git_at(repo, &["show", "-s", "--format=%H|%aI", rev])
        .with_context(|| format!("failed to resolve revision {}", rev))?;
    parse_commit_lines(&raw)?
        .into_iter()
        .next()
        .with_context(|| format!("revision {} resolved to no commit", rev))
}

/// Destructive reset of the working tree at `dir`
pub fn reset_hard(dir: &Path, commit_id: &str) -> Result<()> {
    git_at(dir, &["reset", "--hard", "--quiet", commit_id])
        .with_context(|| format!("failed to reset {} to {}", dir.display(), commit_id))?;
    Ok(())
}

/// Tracked files at HEAD with the given extension, in git's order
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let raw = git_at(dir, &["ls-tree", "-r", "-z", "--name-only", "HEAD"])
        .with_context(|| format!("failed to list files in {}", dir.display()))?;
    let suffix = format!(".{}", extension);
    Ok(raw
        .split('\0')
        .filter(|path| !path.is_empty() && path.ends_with(&suffix))
        .map(str::to_string)
        .collect())
}

/// All commits reachable from `rev`, oldest first, optionally only those
/// touching `path`
pub fn list_commits(repo: &Path, rev: &str, path: Option<&str>) -> Result<Vec<SnapshotPoint>> {
    let mut args = vec!["log", rev, "--reverse", "--format=%H|%aI"];
    if let Some(path) = path {
        args.extend(["--full-history", "--", path]);
    }
    let raw = git_at(repo, &args).with_context(|| format!("failed to list commits of {}", rev))?;
    parse_commit_lines(&raw)
}

/// Paths changed by one commit; the root commit lists every file it adds
pub fn changed_files(repo: &Path, commit_id: &str) -> Result<Vec<String>> {
    let raw = git_at(
        repo,
        &[
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "-r",
            "-z",
            "--root",
            commit_id,
        ],
    )
    .with_context(|| format!("failed to diff {}", commit_id))?;
    Ok(raw
        .split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect())
}

/// A checkout that can be moved between historical commits
pub trait WorkingTree {
    /// Directory holding the checked-out files
    fn root(&self) -> &Path;

    /// Move the tree to `commit_id`, discarding local state
    fn checkout(&mut self, commit_id: &str) -> Result<()>;

    fn list_files(&self, extension: &str) -> Result<Vec<String>> {
        list_files(self.root(), extension)
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

/// Ephemeral detached worktree in a temporary directory, removed on drop
pub struct GitWorktree {
    repo: PathBuf,
    path: PathBuf,
    settle: Duration,
    // Keeps the directory alive until the worktree is unregistered
    _temp: TempDir,
}

impl GitWorktree {
    pub fn create(repo: &Path, settle: Duration) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("javarank-")
            .tempdir()
            .context("failed to create temporary directory for worktree")?;
        let path = temp.path().join("tree");
        let path_arg = path.to_string_lossy().to_string();

        git_at(repo, &["worktree", "add", "--detach", "--quiet", &path_arg])
            .with_context(|| format!("failed to add worktree for {}", repo.display()))?;
        debug!(path = %path.display(), "created isolated worktree");

        Ok(GitWorktree {
            repo: repo.to_path_buf(),
            path,
            settle,
            _temp: temp,
        })
    }
}

impl WorkingTree for GitWorktree {
    fn root(&self) -> &Path {
        &self.path
    }

    fn checkout(&mut self, commit_id: &str) -> Result<()> {
        reset_hard(&self.path, commit_id)?;
        settle(self.settle);
        Ok(())
    }
}

impl Drop for GitWorktree {
    fn drop(&mut self) {
        let path_arg = self.path.to_string_lossy().to_string();
        if let Err(e) = git_at(&self.repo, &["worktree", "remove", "--force", &path_arg]) {
            warn!(error = %e, "failed to remove worktree");
            let _ = git_at(&self.repo, &["worktree", "prune"]);
        }
    }
}

/// Resets the repository's own checkout in place
pub struct InPlaceCheckout {
    repo: PathBuf,
    settle: Duration,
}

impl InPlaceCheckout {
    pub fn new(repo: &Path, settle: Duration) -> Self {
        InPlaceCheckout {
            repo: repo.to_path_buf(),
            settle,
        }
    }
}

impl WorkingTree for InPlaceCheckout {
    fn root(&self) -> &Path {
        &self.repo
    }

    fn checkout(&mut self, commit_id: &str) -> Result<()> {
        warn!(commit = commit_id, repo = %self.repo.display(), "resetting repository in place");
        reset_hard(&self.repo, commit_id)?;
        settle(self.settle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn git(repo: &Path, args: &[&str]) -> String {
        git_at(repo, args).unwrap_or_else(|e| panic!("{}", e))
    }

    fn init_repo() -> TempDir {
        let dir = tempfile::tempdir().expect("failed to create temp directory");
        git(dir.path(), &["init", "--initial-branch=main"]);
        git(dir.path(), &["config", "user.name", "Test User"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        dir
    }

    fn commit_at(repo: &Path, file: &str, content: &str, date: &str) -> String {
        let path = repo.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        git(repo, &["add", "."]);
        let status = Command::new("git")
            .current_dir(repo)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .args(["commit", "--quiet", "-m", file])
            .status()
            .unwrap();
        assert!(status.success());
        git(repo, &["rev-parse", "HEAD"])
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_selection_takes_last_commit() {
        let repo = init_repo();
        let p = repo.path();
        commit_at(p, "A.java", "1", "2021-01-05T10:00:00+00:00");
        let jan = commit_at(p, "A.java", "2", "2021-01-20T10:00:00+00:00");
        let feb = commit_at(p, "B.java", "3", "2021-02-10T10:00:00+09:00");
        commit_at(p, "C.java", "4", "2022-06-01T10:00:00+00:00");

        let selected =
            select_snapshots(p, "main", day(2021, 1, 1), day(2021, 12, 31), Cadence::Monthly)
                .unwrap();

        let shas: Vec<&str> = selected.iter().map(|s| s.commit_id.as_str()).collect();
        assert_eq!(shas, vec![jan.as_str(), feb.as_str()]);
        assert_eq!(
            selected[1].timestamp,
            Utc.with_ymd_and_hms(2021, 2, 10, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_every_days_selection() {
        let repo = init_repo();
        let p = repo.path();
        let first = commit_at(p, "A.java", "1", "2021-01-01T10:00:00+00:00");
        let second = commit_at(p, "A.java", "2", "2021-01-09T10:00:00+00:00");
        let third = commit_at(p, "A.java", "3", "2021-01-10T10:00:00+00:00");

        let selected =
            select_snapshots(p, "main", day(2021, 1, 1), day(2021, 1, 31), Cadence::EveryDays(7))
                .unwrap();
        let shas: Vec<&str> = selected.iter().map(|s| s.commit_id.as_str()).collect();
        assert_eq!(shas, vec![first.as_str(), third.as_str()]);
        assert!(!shas.contains(&second.as_str()));
    }

    #[test]
    fn test_empty_range_is_not_an_error() {
        let repo = init_repo();
        commit_at(repo.path(), "A.java", "1", "2021-01-05T10:00:00+00:00");
        let selected = select_snapshots(
            repo.path(),
            "main",
            day(2030, 1, 1),
            day(2030, 12, 31),
            Cadence::Monthly,
        )
        .unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_list_files_filters_extension() {
        let repo = init_repo();
        let p = repo.path();
        commit_at(p, "src/org/x/A.java", "class A {}", "2021-01-05T10:00:00+00:00");
        commit_at(p, "README.md", "readme", "2021-01-06T10:00:00+00:00");
        commit_at(p, "src/日本/B.java", "class B {}", "2021-01-07T10:00:00+00:00");

        let files = list_files(p, "java").unwrap();
        assert_eq!(files, vec!["src/org/x/A.java", "src/日本/B.java"]);
    }

    #[test]
    fn test_list_commits_and_changed_files() {
        let repo = init_repo();
        let p = repo.path();
        let c1 = commit_at(p, "A.java", "1", "2021-01-05T10:00:00+00:00");
        let c2 = commit_at(p, "B.java", "2", "2021-01-06T10:00:00+00:00");

        let all = list_commits(p, "HEAD", None).unwrap();
        assert_eq!(
            all.iter().map(|c| c.commit_id.as_str()).collect::<Vec<_>>(),
            vec![c1.as_str(), c2.as_str()]
        );

        let touching_b = list_commits(p, "HEAD", Some("B.java")).unwrap();
        assert_eq!(touching_b.len(), 1);
        assert_eq!(touching_b[0].commit_id, c2);

        assert_eq!(changed_files(p, &c1).unwrap(), vec!["A.java"]);
        assert_eq!(changed_files(p, &c2).unwrap(), vec!["B.java"]);
    }

    #[test]
    fn test_resolve_commit() {
        let repo = init_repo();
        let sha = commit_at(repo.path(), "A.java", "1", "2021-01-05T10:00:00+00:00");
        let point = resolve_commit(repo.path(), "HEAD").unwrap();
        assert_eq!(point.commit_id, sha);
        assert!(resolve_commit(repo.path(), "no-such-rev").is_err());
    }

    #[test]
    fn test_worktree_is_isolated_and_removed() {
        let repo = init_repo();
        let p = repo.path();
        let old = commit_at(p, "A.java", "old", "2021-01-05T10:00:00+00:00");
        commit_at(p, "A.java", "new", "2021-01-06T10:00:00+00:00");

        let tree_root;
        {
            let mut tree = GitWorktree::create(p, Duration::ZERO).unwrap();
            tree.checkout(&old).unwrap();
            tree_root = tree.root().to_path_buf();
            assert_eq!(fs::read_to_string(tree_root.join("A.java")).unwrap(), "old");
            assert_eq!(fs::read_to_string(p.join("A.java")).unwrap(), "new");
        }

        assert!(!tree_root.exists());
        assert!(!git(p, &["worktree", "list"]).contains("javarank-"));
    }

    #[test]
    fn test_checkout_unknown_commit_fails() {
        let repo = init_repo();
        commit_at(repo.path(), "A.java", "1", "2021-01-05T10:00:00+00:00");
        let mut tree = InPlaceCheckout::new(repo.path(), Duration::ZERO);
        assert!(tree.checkout("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").is_err());
    }
}
