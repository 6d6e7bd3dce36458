//! Typed errors for the git and line-counting layers
//!
//! Config loading and the CLI use `anyhow`; everything that runs per
//! repository returns one of these so the orchestrator can decide, by
//! variant, whether a failure is transient, unsafe-to-rewind, or a restore
//! failure that needs an operator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external tool invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} exited with code {code}: {stderr}")]
    ProcessFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to run {tool}: {reason}")]
    SpawnFailed { tool: String, reason: String },

    #[error("malformed output from {tool}: {reason}")]
    MalformedOutput { tool: String, reason: String },
}

/// Could not capture the current state of a working tree
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("{} has no HEAD commit to record", .0.display())]
    NoHead(PathBuf),

    #[error("could not query working tree state: {0}")]
    Tool(#[from] ToolError),
}

/// No commit could be chosen for the target date
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{} has no commits", .0.display())]
    NoCommits(PathBuf),

    #[error("could not search history: {0}")]
    Tool(#[from] ToolError),
}

/// Reasons the checkout path was abandoned before the tree moved
///
/// Every variant means measurement falls back to the live working tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cannot snapshot repository state: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("cannot stash uncommitted changes: {0}")]
    Stash(ToolError),

    #[error("cannot resolve target commit: {0}")]
    Resolve(#[from] ResolveError),

    #[error("cannot check out {commit}: {source}")]
    Checkout { commit: String, source: ToolError },
}

/// The working tree could not be put back the way it was found
///
/// This is the one failure class that needs operator attention: the tree
/// may be left at a historical commit and/or with changes still stashed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("could not return {} to {target}: {source}", .repo.display())]
    Checkout {
        repo: PathBuf,
        target: String,
        source: ToolError,
    },

    #[error("could not pop stashed changes in {}: {source}", .repo.display())]
    StashPop { repo: PathBuf, source: ToolError },

    #[error(
        "could not return {} to {target} ({checkout}) and could not pop stashed changes ({stash})",
        .repo.display()
    )]
    Both {
        repo: PathBuf,
        target: String,
        checkout: ToolError,
        stash: ToolError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_reports_seconds() {
        let err = ToolError::TimedOut {
            tool: "git checkout".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "git checkout timed out after 60s");
    }

    #[test]
    fn test_checkout_error_wraps_snapshot_error() {
        let err: CheckoutError = SnapshotError::NoHead(PathBuf::from("/tmp/repo")).into();
        assert!(err.to_string().contains("cannot snapshot"));
        assert!(err.to_string().contains("/tmp/repo"));
    }
}
