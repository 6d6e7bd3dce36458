//! Historical checkout with guaranteed restore
//!
//! A [`CheckoutSession`] moves a working tree to the commit matching a target
//! date and owns the obligation to move it back. The obligation is discharged
//! either by [`CheckoutSession::restore`] or, if the session is dropped
//! without it (for instance while a panic unwinds through the measurement
//! step), by `Drop`. Either way restore runs exactly once.
//!
//! Phases:
//!
//! ```text
//! Clean -> Snapshotted -> [Stashed] -> CheckedOut -> Measured -> [Unstashed] -> Restored
//!                 \____________\______________\__________________________\-> Aborted
//! ```

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::{CheckoutError, RestoreError};
use crate::git::{capture_snapshot, resolve_target, Git, RepositorySnapshot, TargetCommit, TargetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Clean,
    Snapshotted,
    Stashed,
    CheckedOut,
    Measured,
    Unstashed,
    Restored,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckoutOptions {
    pub target_date: NaiveDate,
    /// Stash uncommitted changes before moving the tree
    pub preserve_working_tree: bool,
}

/// The checkout path was abandoned; the tree is at its original ref
#[derive(Debug)]
pub struct CheckoutAbort {
    pub cause: CheckoutError,
    /// Set when a stash made before the abort could not be popped again
    pub restore_error: Option<RestoreError>,
}

impl fmt::Display for CheckoutAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

/// A working tree currently checked out at a historical commit
#[derive(Debug)]
pub struct CheckoutSession<'g> {
    git: &'g Git,
    // Taken by restore so the Drop impl can tell whether it still owes one
    snapshot: Option<RepositorySnapshot>,
    target: TargetCommit,
    phase: CheckoutPhase,
}

impl<'g> CheckoutSession<'g> {
    /// Snapshot, stash if needed, resolve the target commit and check it out
    ///
    /// Nothing is left modified when this returns an error: a stash created
    /// along the way is popped before returning.
    pub fn begin(git: &'g Git, options: &CheckoutOptions) -> Result<Self, CheckoutAbort> {
        let repo = git.repo().display();
        let mut phase = CheckoutPhase::Clean;

        let mut snapshot = capture_snapshot(git).map_err(|e| CheckoutAbort {
            cause: e.into(),
            restore_error: None,
        })?;
        advance(git, &mut phase, CheckoutPhase::Snapshotted);

        if options.preserve_working_tree && snapshot.working_tree_was_dirty {
            match git.stash_push() {
                Ok(created) => {
                    snapshot.stash_created = created;
                    if created {
                        info!(repo = %repo, "Stashed uncommitted changes");
                        advance(git, &mut phase, CheckoutPhase::Stashed);
                    }
                }
                Err(e) => {
                    warn!(repo = %repo, "Could not stash changes, skipping checkout: {}", e);
                    return Err(CheckoutAbort {
                        cause: CheckoutError::Stash(e),
                        restore_error: None,
                    });
                }
            }
        }

        let target = match resolve_target(git, options.target_date) {
            Ok(target) => target,
            Err(e) => return Err(abort(git, &snapshot, e.into())),
        };

        if let Err(e) = git.checkout(&target.hash) {
            let cause = CheckoutError::Checkout {
                commit: target.hash.clone(),
                source: e,
            };
            return Err(abort(git, &snapshot, cause));
        }
        advance(git, &mut phase, CheckoutPhase::CheckedOut);
        info!(repo = %repo, "Checked out {} for {}", target.short_hash(), options.target_date);

        Ok(Self {
            git,
            snapshot: Some(snapshot),
            target,
            phase,
        })
    }

    pub fn target(&self) -> &TargetCommit {
        &self.target
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&RepositorySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn mark_measured(&mut self) {
        if self.phase == CheckoutPhase::CheckedOut {
            advance(self.git, &mut self.phase, CheckoutPhase::Measured);
        }
    }

    /// Return the tree to its original ref and pop any stash
    pub fn restore(mut self) -> Result<(), RestoreError> {
        self.restore_once().unwrap_or(Ok(()))
    }

    fn restore_once(&mut self) -> Option<Result<(), RestoreError>> {
        let snapshot = self.snapshot.take()?;
        let result = restore_snapshot(self.git, &snapshot, &mut self.phase);
        Some(result)
    }
}

impl Drop for CheckoutSession<'_> {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.restore_once() {
            error!(
                repo = %self.git.repo().display(),
                "Failed to restore git state - manual intervention may be required: {}", e
            );
        }
    }
}

fn advance(git: &Git, phase: &mut CheckoutPhase, next: CheckoutPhase) {
    let from = *phase;
    debug!(repo = %git.repo().display(), from = ?from, to = ?next, "checkout phase");
    *phase = next;
}

/// Abandon the checkout path before the tree moved, popping any stash
fn abort(git: &Git, snapshot: &RepositorySnapshot, cause: CheckoutError) -> CheckoutAbort {
    warn!(repo = %git.repo().display(), "Skipping historical checkout: {}", cause);
    let restore_error = if snapshot.stash_created {
        git.stash_pop()
            .err()
            .map(|source| RestoreError::StashPop {
                repo: snapshot.repo_path.clone(),
                source,
            })
    } else {
        None
    };
    if let Some(ref e) = restore_error {
        error!(repo = %git.repo().display(), "{}", e);
    }
    CheckoutAbort {
        cause,
        restore_error,
    }
}

/// Check out the original ref, then pop the stash if one was created
///
/// The stash pop is attempted even when the checkout fails so stashed work
/// is never left behind silently.
fn restore_snapshot(
    git: &Git,
    snapshot: &RepositorySnapshot,
    phase: &mut CheckoutPhase,
) -> Result<(), RestoreError> {
    let repo = snapshot.repo_path.clone();
    let target = snapshot.original_ref.checkout_target().to_string();
    info!(repo = %repo.display(), "Restoring original git state ({})", snapshot.original_ref);

    let checkout = git.checkout(&target);
    let stash = if snapshot.stash_created {
        let popped = git.stash_pop();
        if popped.is_ok() {
            advance(git, phase, CheckoutPhase::Unstashed);
        }
        popped
    } else {
        Ok(())
    };

    let result = match (checkout, stash) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(source), Ok(())) => Err(RestoreError::Checkout {
            repo,
            target,
            source,
        }),
        (Ok(()), Err(source)) => Err(RestoreError::StashPop { repo, source }),
        (Err(checkout), Err(stash)) => Err(RestoreError::Both {
            repo,
            target,
            checkout,
            stash,
        }),
    };

    match result {
        Ok(()) => {
            advance(git, phase, CheckoutPhase::Restored);
            info!(repo = %snapshot.repo_path.display(), "Restored git state");
        }
        Err(_) => advance(git, phase, CheckoutPhase::Aborted),
    }
    result
}

/// Which tree state a measurement was taken against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MeasurementState {
    /// Historical checkout was not requested for this repository
    Current,
    /// Measured at a historical commit
    Historical { commit: String, kind: TargetKind },
    /// Checkout was requested but unsafe or impossible; measured live instead
    LiveState { reason: String },
}

impl MeasurementState {
    pub fn is_live_fallback(&self) -> bool {
        matches!(self, MeasurementState::LiveState { .. })
    }

    pub fn is_earliest_available(&self) -> bool {
        matches!(
            self,
            MeasurementState::Historical {
                kind: TargetKind::EarliestAvailable,
                ..
            }
        )
    }
}

#[derive(Debug)]
pub struct CheckoutReport {
    pub state: MeasurementState,
    pub restore_error: Option<RestoreError>,
}

/// Run `measure` with the tree rewound to `options.target_date`
///
/// If the tree cannot be rewound safely, `measure` runs against the live
/// tree and the report says so. Once the checkout happened, restore runs no
/// matter how `measure` finishes, including by panicking.
pub fn measure_at_date<T, F>(git: &Git, options: &CheckoutOptions, measure: F) -> (T, CheckoutReport)
where
    F: FnOnce() -> T,
{
    let mut session = match CheckoutSession::begin(git, options) {
        Ok(session) => session,
        Err(abort) => {
            let value = measure();
            let report = CheckoutReport {
                state: MeasurementState::LiveState {
                    reason: abort.cause.to_string(),
                },
                restore_error: abort.restore_error,
            };
            return (value, report);
        }
    };

    let value = measure();
    session.mark_measured();

    let state = MeasurementState::Historical {
        commit: session.target().hash.clone(),
        kind: session.target().kind,
    };
    let restore_error = session.restore().err();
    if let Some(ref e) = restore_error {
        error!(
            repo = %git.repo().display(),
            "Failed to restore git state - manual intervention may be required: {}", e
        );
    }

    (value, CheckoutReport { state, restore_error })
}
