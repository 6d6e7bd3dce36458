//! Git operations module
//!
//! Provides:
//! - A `git` command wrapper bound to one repository
//! - Change log (`--numstat`) parsing with author exclusion
//! - Working tree snapshots
//! - Target commit resolution by date

pub mod log;
pub mod resolve;
pub mod snapshot;

pub use log::{parse_log, AuthorFilter, ChangeAggregate, CommitRecord, FileChange};
pub use resolve::{resolve_target, TargetCommit, TargetKind};
pub use snapshot::{capture_snapshot, OriginalRef, RepositorySnapshot};

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::ToolError;
use crate::process::run_tool;

const STASH_MESSAGE: &str = "locscope analysis backup";

/// Per-operation timeouts for git invocations
#[derive(Debug, Clone, Copy)]
pub struct GitTimeouts {
    /// Ref and status queries
    pub query: Duration,
    /// Stash, checkout and commit lookups
    pub mutate: Duration,
    /// Full history scans
    pub history: Duration,
}

impl Default for GitTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(30),
            mutate: Duration::from_secs(60),
            history: Duration::from_secs(300),
        }
    }
}

/// `git` bound to a single working tree
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
    program: String,
    timeouts: GitTimeouts,
}

impl Git {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            program: "git".to_string(),
            timeouts: GitTimeouts::default(),
        }
    }

    /// Use a specific git executable instead of the one on `PATH`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: GitTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<String, ToolError> {
        run_tool(&self.program, args, &self.repo, timeout).map(|out| out.stdout)
    }

    /// Short name of the checked-out branch, `None` when HEAD is detached
    pub fn current_branch(&self) -> Result<Option<String>, ToolError> {
        match self.run(&["symbolic-ref", "-q", "--short", "HEAD"], self.timeouts.query) {
            Ok(out) => Ok(non_empty(&out)),
            // -q makes a detached HEAD a silent exit 1
            Err(ToolError::ProcessFailed { code: 1, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn head_commit(&self) -> Result<Option<String>, ToolError> {
        self.run(&["rev-parse", "--verify", "HEAD"], self.timeouts.query)
            .map(|out| non_empty(&out))
    }

    /// Whether `git status --porcelain` reports anything, untracked files included
    pub fn is_dirty(&self) -> Result<bool, ToolError> {
        self.run(&["status", "--porcelain"], self.timeouts.query)
            .map(|out| !out.trim().is_empty())
    }

    fn stash_head(&self) -> Result<Option<String>, ToolError> {
        match self.run(&["rev-parse", "-q", "--verify", "refs/stash"], self.timeouts.query) {
            Ok(out) => Ok(non_empty(&out)),
            Err(ToolError::ProcessFailed { code: 1, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stash tracked and untracked changes
    ///
    /// Returns whether a new stash entry was actually created; `git stash`
    /// exits 0 without creating one when there is nothing to save. Once the
    /// push itself has succeeded this never returns an error: if the entry
    /// cannot be verified it is assumed to exist so it still gets popped.
    pub fn stash_push(&self) -> Result<bool, ToolError> {
        let before = self.stash_head()?;
        self.run(
            &["stash", "push", "--include-untracked", "-m", STASH_MESSAGE],
            self.timeouts.mutate,
        )?;
        match self.stash_head() {
            Ok(after) => Ok(after.is_some() && after != before),
            Err(e) => {
                warn!(
                    repo = %self.repo.display(),
                    "Could not verify stash entry, assuming it was created: {}", e
                );
                Ok(true)
            }
        }
    }

    /// Pop the newest stash, reinstating the index as it was stashed
    ///
    /// Falls back to a plain pop when the index cannot be reapplied, which
    /// restores the changes but leaves them unstaged.
    pub fn stash_pop(&self) -> Result<(), ToolError> {
        match self.run(&["stash", "pop", "--index"], self.timeouts.mutate) {
            Ok(_) => Ok(()),
            Err(ToolError::ProcessFailed { stderr, .. }) => {
                warn!(
                    repo = %self.repo.display(),
                    "Could not restore staged state ({}), popping without --index", stderr
                );
                self.run(&["stash", "pop"], self.timeouts.mutate).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    pub fn checkout(&self, target: &str) -> Result<(), ToolError> {
        self.run(&["checkout", "--quiet", target], self.timeouts.mutate)
            .map(|_| ())
    }

    /// Most recent commit reachable from HEAD at or before `bound`
    pub fn last_commit_until(&self, bound: &str) -> Result<Option<String>, ToolError> {
        let until = format!("--until={}", bound);
        self.run(
            &["log", "--format=%H", until.as_str(), "--max-count=1"],
            self.timeouts.mutate,
        )
        .map(|out| first_line(&out))
    }

    /// Root-most commit in HEAD's history
    pub fn earliest_commit(&self) -> Result<Option<String>, ToolError> {
        // --max-count is applied before --reverse, so it cannot be used here
        self.run(&["log", "--format=%H", "--reverse"], self.timeouts.mutate)
            .map(|out| first_line(&out))
    }

    /// Raw `git log --numstat` text for the date window, bounds inclusive
    pub fn numstat_log(
        &self,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<String, ToolError> {
        let mut args: Vec<String> = vec![
            "-c".into(),
            "core.quotepath=off".into(),
            "log".into(),
            "--no-color".into(),
            "--pretty=format:%H|%ad|%an|%s".into(),
            "--date=short".into(),
            "--numstat".into(),
        ];
        if let Some(since) = since {
            args.push(format!("--since={} 00:00:00", since.format("%Y-%m-%d")));
        }
        if let Some(until) = until {
            args.push(format!("--until={}", end_of_day(until)));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args, self.timeouts.history)
    }
}

/// Inclusive upper bound for a calendar date
pub fn end_of_day(date: NaiveDate) -> String {
    format!("{} 23:59:59", date.format("%Y-%m-%d"))
}

fn non_empty(out: &str) -> Option<String> {
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn first_line(out: &str) -> Option<String> {
    out.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
