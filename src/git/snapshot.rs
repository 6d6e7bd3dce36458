//! Working tree snapshots
//!
//! A snapshot records just enough to put a working tree back: which branch
//! (or detached commit) was checked out and whether there were uncommitted
//! changes.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use super::Git;
use crate::error::{SnapshotError, ToolError};

/// What HEAD pointed at before anything moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum OriginalRef {
    Branch(String),
    DetachedCommit(String),
}

impl OriginalRef {
    /// Argument for `git checkout` that returns to this ref
    pub fn checkout_target(&self) -> &str {
        match self {
            OriginalRef::Branch(name) => name,
            OriginalRef::DetachedCommit(hash) => hash,
        }
    }
}

impl fmt::Display for OriginalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginalRef::Branch(name) => write!(f, "branch {}", name),
            OriginalRef::DetachedCommit(hash) => write!(f, "commit {}", hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    pub repo_path: PathBuf,
    pub original_ref: OriginalRef,
    pub working_tree_was_dirty: bool,
    /// Set once a stash entry has been created for this snapshot
    pub stash_created: bool,
}

/// Record the current branch/commit and dirty state without touching the tree
pub fn capture_snapshot(git: &Git) -> Result<RepositorySnapshot, SnapshotError> {
    // Fails outright outside a repository, so later failures mean no commits
    let working_tree_was_dirty = git.is_dirty()?;

    let head = match git.head_commit() {
        Ok(head) => head,
        // An unborn branch has nothing for rev-parse to verify
        Err(ToolError::ProcessFailed { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let Some(head) = head else {
        return Err(SnapshotError::NoHead(git.repo().to_path_buf()));
    };

    let original_ref = match git.current_branch()? {
        Some(branch) => OriginalRef::Branch(branch),
        None => OriginalRef::DetachedCommit(head),
    };

    debug!(
        repo = %git.repo().display(),
        original = %original_ref,
        dirty = working_tree_was_dirty,
        "captured snapshot"
    );

    Ok(RepositorySnapshot {
        repo_path: git.repo().to_path_buf(),
        original_ref,
        working_tree_was_dirty,
        stash_created: false,
    })
}
