//! Multi-repository measurement
//!
//! Drives each project through checkout, line counting, change statistics
//! and restore, one repository at a time, and folds the per-project results
//! into run-level totals.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::checkout::{measure_at_date, CheckoutOptions, MeasurementState};
use crate::cloc::{count_lines, LocStats};
use crate::config::{Config, DATE_FORMAT};
use crate::discovery::ProjectInfo;
use crate::git::{parse_log, AuthorFilter, ChangeAggregate, CommitRecord, Git, GitTimeouts};

/// Something that measures lines of code in a directory
pub trait LineCounter {
    fn count(&self, path: &Path, exclude_dirs: &[String]) -> LocStats;
}

/// The `cloc` command line tool
#[derive(Debug, Clone, Copy, Default)]
pub struct Cloc;

impl LineCounter for Cloc {
    fn count(&self, path: &Path, exclude_dirs: &[String]) -> LocStats {
        count_lines(path, exclude_dirs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub checkout_enabled: bool,
    pub preserve_working_tree: bool,
    pub exclude_dirs: Vec<String>,
    pub author_filter: AuthorFilter,
    pub git_timeouts: GitTimeouts,
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            start_date: config.start_date()?,
            end_date: config.end_date()?,
            checkout_enabled: config.git.checkout_target_date,
            preserve_working_tree: config.git.preserve_working_directory,
            exclude_dirs: config.filters.exclude_directories.clone(),
            author_filter: AuthorFilter::new(&config.git.exclude_authors),
            git_timeouts: GitTimeouts::default(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResult {
    pub info: ProjectInfo,
    pub loc_stats: LocStats,
    pub change_stats: ChangeAggregate,
    pub measurement: MeasurementState,
    /// Set when the working tree could not be put back; needs an operator
    pub restore_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimePeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LocTotals {
    pub projects_analyzed: usize,
    pub total_loc: u64,
    pub source_loc: u64,
    pub comment_loc: u64,
    pub blank_loc: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeTotals {
    pub lines_added: u64,
    pub lines_removed: u64,
    /// Sum of each project's `min(added, removed)` estimate
    pub lines_modified: u64,
    pub net_change: i64,
    pub total_commits: usize,
    pub total_files_changed: usize,
    pub all_contributors: BTreeSet<String>,
}

/// A commit annotated with the project it came from
#[derive(Debug, Clone, Serialize)]
pub struct ProjectCommit {
    #[serde(flatten)]
    pub commit: CommitRecord,
    pub project: String,
    pub project_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResults {
    pub analysis_timestamp: String,
    pub time_period: TimePeriod,
    pub projects: Vec<ProjectResult>,
    pub totals: LocTotals,
    pub changes: ChangeTotals,
    pub languages: BTreeMap<String, u64>,
    pub language_percentages: BTreeMap<String, f64>,
    pub commits: Vec<ProjectCommit>,
}

impl AnalysisResults {
    fn new(options: &AnalysisOptions) -> Self {
        let fmt = |d: NaiveDate| d.format(DATE_FORMAT).to_string();
        Self {
            analysis_timestamp: Local::now().to_rfc3339(),
            time_period: TimePeriod {
                start: options.start_date.map(fmt),
                end: options.end_date.map(fmt),
            },
            ..Default::default()
        }
    }

    /// Fold one project's result into the run totals
    fn accumulate(&mut self, result: ProjectResult) {
        let loc = &result.loc_stats;
        self.totals.projects_analyzed += 1;
        self.totals.total_loc += loc.total_lines;
        self.totals.source_loc += loc.source_lines;
        self.totals.comment_loc += loc.comment_lines;
        self.totals.blank_loc += loc.blank_lines;

        let changes = &result.change_stats;
        self.changes.lines_added += changes.total_added;
        self.changes.lines_removed += changes.total_removed;
        self.changes.lines_modified += changes.lines_modified;
        self.changes.net_change += changes.net_change;
        self.changes.total_commits += changes.commit_count;
        self.changes.total_files_changed += changes.files_changed_count;
        self.changes
            .all_contributors
            .extend(changes.contributors.iter().cloned());

        for commit in &changes.commits {
            self.commits.push(ProjectCommit {
                commit: commit.clone(),
                project: result.info.name.clone(),
                project_path: result.info.path.clone(),
            });
        }

        for (lang, stats) in &loc.languages {
            *self.languages.entry(lang.clone()).or_insert(0) += stats.lines;
        }

        self.projects.push(result);
    }

    fn finish(&mut self) {
        let total: u64 = self.languages.values().sum();
        if total == 0 {
            return;
        }
        self.language_percentages = self
            .languages
            .iter()
            .map(|(lang, lines)| {
                let pct = (*lines as f64 / total as f64) * 100.0;
                (lang.clone(), (pct * 10.0).round() / 10.0)
            })
            .collect();
    }

    pub fn restore_failures(&self) -> impl Iterator<Item = &ProjectResult> {
        self.projects.iter().filter(|p| p.restore_error.is_some())
    }

    pub fn live_state_fallbacks(&self) -> impl Iterator<Item = &ProjectResult> {
        self.projects
            .iter()
            .filter(|p| p.measurement.is_live_fallback())
    }
}

pub struct Analyzer<C: LineCounter = Cloc> {
    options: AnalysisOptions,
    counter: C,
}

impl Analyzer<Cloc> {
    pub fn new(options: AnalysisOptions) -> Self {
        Self::with_counter(options, Cloc)
    }
}

impl<C: LineCounter> Analyzer<C> {
    pub fn with_counter(options: AnalysisOptions, counter: C) -> Self {
        Self { options, counter }
    }

    /// Analyze every project sequentially
    ///
    /// At most one working tree is rewound at any time. A failure in one
    /// project never stops the next one from being processed.
    pub fn run(&self, projects: &[ProjectInfo]) -> AnalysisResults {
        info!("Starting multi-project analysis...");
        self.log_checkout_mode();

        let mut results = AnalysisResults::new(&self.options);
        for project in projects {
            let result = self.analyze_project(project);
            results.accumulate(result);
        }
        results.finish();

        info!("Analysis completed");
        results
    }

    fn log_checkout_mode(&self) {
        match (self.options.checkout_enabled, self.options.end_date) {
            (true, Some(end)) => info!(
                "Historical checkout enabled - will analyze LOC at state matching {}",
                end
            ),
            (true, None) => {
                warn!("No end date specified - LOC analysis will use current repository state")
            }
            (false, _) => {
                info!("Historical checkout disabled - LOC analysis will use current repository state")
            }
        }
    }

    pub fn analyze_project(&self, project: &ProjectInfo) -> ProjectResult {
        info!(project = %project.name, "Processing project");

        let git = Git::new(&project.path).with_timeouts(self.options.git_timeouts);
        let measure = || self.counter.count(&project.path, &self.options.exclude_dirs);

        let (loc_stats, measurement, restore_error) = match self.checkout_options(project) {
            Some(checkout) => {
                info!(
                    project = %project.name,
                    "Preparing historical checkout to date {}", checkout.target_date
                );
                let (loc, report) = measure_at_date(&git, &checkout, measure);
                if report.state.is_live_fallback() {
                    warn!(
                        project = %project.name,
                        "Measured at current state, not target date"
                    );
                }
                (loc, report.state, report.restore_error.map(|e| e.to_string()))
            }
            None => (measure(), MeasurementState::Current, None),
        };

        if let Some(ref e) = restore_error {
            error!(project = %project.name, "Restore failed: {}", e);
        }

        // The change window is always read from the live log; rewinding only
        // affects the line count.
        let change_stats = self.change_stats(project, &git);

        ProjectResult {
            info: project.clone(),
            loc_stats,
            change_stats,
            measurement,
            restore_error,
        }
    }

    fn checkout_options(&self, project: &ProjectInfo) -> Option<CheckoutOptions> {
        if !self.options.checkout_enabled || !project.is_git_repo {
            return None;
        }
        self.options.end_date.map(|target_date| CheckoutOptions {
            target_date,
            preserve_working_tree: self.options.preserve_working_tree,
        })
    }

    fn change_stats(&self, project: &ProjectInfo, git: &Git) -> ChangeAggregate {
        if !project.is_git_repo {
            info!(project = %project.name, "Skipping git analysis (not a git repo)");
            return ChangeAggregate::empty();
        }

        info!(project = %project.name, "Analyzing git changes");
        match git.numstat_log(self.options.start_date, self.options.end_date) {
            Ok(raw) => parse_log(&raw, &self.options.author_filter),
            Err(e) => {
                error!(project = %project.name, "git log failed: {}", e);
                ChangeAggregate::empty()
            }
        }
    }
}
