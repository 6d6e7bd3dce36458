//! Target commit resolution
//!
//! Picks the commit that represents a repository at the end of a given day.
//! Repositories whose history starts after that day resolve to their
//! earliest commit instead of being skipped.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use super::{end_of_day, Git};
use crate::error::{ResolveError, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Newest commit at or before the end of the target day
    AtOrBefore,
    /// History starts after the target day; earliest commit used instead
    EarliestAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetCommit {
    pub hash: String,
    pub kind: TargetKind,
}

impl TargetCommit {
    pub fn short_hash(&self) -> &str {
        self.hash.get(..8).unwrap_or(&self.hash)
    }
}

pub fn resolve_target(git: &Git, date: NaiveDate) -> Result<TargetCommit, ResolveError> {
    let repo = git.repo().display();

    match git.last_commit_until(&end_of_day(date)) {
        Ok(Some(hash)) => {
            let target = TargetCommit {
                hash,
                kind: TargetKind::AtOrBefore,
            };
            info!(repo = %repo, "Found target commit {} for date {}", target.short_hash(), date);
            return Ok(target);
        }
        Ok(None) => {}
        // An unborn HEAD makes `git log` exit non-zero; the fallback below
        // reports that as NoCommits.
        Err(ToolError::ProcessFailed { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    warn!(repo = %repo, "No commits found before {}, using earliest commit", date);

    match git.earliest_commit() {
        Ok(Some(hash)) => {
            let target = TargetCommit {
                hash,
                kind: TargetKind::EarliestAvailable,
            };
            info!(repo = %repo, "Using earliest commit {}", target.short_hash());
            Ok(target)
        }
        Ok(None) | Err(ToolError::ProcessFailed { .. }) => {
            Err(ResolveError::NoCommits(git.repo().to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
