mod common;

use common::{date, lines, Fixture};
use locscope::analyzer::{AnalysisOptions, Analyzer, LineCounter};
use locscope::checkout::MeasurementState;
use locscope::cloc::LocStats;
use locscope::discovery::ProjectInfo;
use locscope::git::{AuthorFilter, TargetKind};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Counts every line of every file outside `.git`
struct WalkCounter;

impl LineCounter for WalkCounter {
    fn count(&self, path: &Path, _exclude_dirs: &[String]) -> LocStats {
        let (files, lines) = walk(path);
        LocStats {
            total_lines: lines,
            source_lines: lines,
            total_files: files,
            ..Default::default()
        }
    }
}

fn walk(dir: &Path) -> (u64, u64) {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(files, lines), e| {
            let count = fs::read_to_string(e.path()).unwrap_or_default().lines().count() as u64;
            (files + 1, lines + count)
        })
}

fn project(name: &str, path: &Path, is_git_repo: bool) -> ProjectInfo {
    ProjectInfo {
        name: name.to_string(),
        path: path.to_path_buf(),
        kind: "rust".to_string(),
        size_bytes: 0,
        last_modified: String::new(),
        is_git_repo,
    }
}

/// alice seeds the repo in January, bot-ci and alice change it in February,
/// alice adds more in April
fn history() -> Fixture {
    let fx = Fixture::new();
    fx.commit(
        "alice",
        "2024-01-05",
        "seed",
        &[("gen.txt", &lines("seed", 10)), ("lib.rs", &lines("old", 5))],
    );
    fx.commit("bot-ci", "2024-02-10", "regenerate", &[("gen.txt", &lines("gen", 50))]);
    fx.commit("alice", "2024-02-20", "rewrite lib", &[("lib.rs", &lines("new", 20))]);
    fx.commit("alice", "2024-04-01", "extra", &[("extra.txt", &lines("x", 7))]);
    fx
}

fn february(checkout_enabled: bool) -> AnalysisOptions {
    AnalysisOptions {
        start_date: Some(date("2024-02-01")),
        end_date: Some(date("2024-02-29")),
        checkout_enabled,
        preserve_working_tree: true,
        author_filter: AuthorFilter::new(["bot-ci"]),
        ..Default::default()
    }
}

#[test]
fn excluded_author_is_dropped_from_change_stats() {
    let fx = history();
    let analyzer = Analyzer::with_counter(february(true), WalkCounter);

    let results = analyzer.run(&[project("demo", fx.path(), true)]);
    let changes = &results.projects[0].change_stats;

    assert_eq!(changes.commit_count, 1);
    assert_eq!(changes.excluded_commits, 1);
    assert_eq!(changes.total_added, 20);
    assert_eq!(changes.total_removed, 5);
    assert_eq!(changes.net_change, 15);
    assert_eq!(changes.contributors.iter().collect::<Vec<_>>(), ["alice"]);
    assert!(changes.files_changed.contains("lib.rs"));
    assert!(!changes.files_changed.contains("gen.txt"));

    assert_eq!(results.changes.total_commits, 1);
    assert_eq!(results.commits.len(), 1);
    assert_eq!(results.commits[0].project, "demo");
}

#[test]
fn lines_are_counted_at_the_end_date() {
    let fx = history();
    let head = fx.head_commit();
    let analyzer = Analyzer::with_counter(february(true), WalkCounter);

    let results = analyzer.run(&[project("demo", fx.path(), true)]);
    let result = &results.projects[0];

    // gen.txt (50) + lib.rs (20); extra.txt is from April
    assert_eq!(result.loc_stats.total_lines, 70);
    assert_eq!(result.loc_stats.total_files, 2);
    assert!(matches!(
        result.measurement,
        MeasurementState::Historical {
            kind: TargetKind::AtOrBefore,
            ..
        }
    ));
    assert!(result.restore_error.is_none());

    assert_eq!(fx.head_branch().as_deref(), Some("main"));
    assert_eq!(fx.head_commit(), head);
    assert_eq!(fx.read("extra.txt"), Some(lines("x", 7)));
}

#[test]
fn disabled_checkout_counts_current_tree() {
    let fx = history();
    let analyzer = Analyzer::with_counter(february(false), WalkCounter);

    let results = analyzer.run(&[project("demo", fx.path(), true)]);
    let result = &results.projects[0];

    assert_eq!(result.loc_stats.total_lines, 77);
    assert_eq!(result.measurement, MeasurementState::Current);
    // The change window does not depend on checkout
    assert_eq!(result.change_stats.commit_count, 1);
}

#[test]
fn end_date_before_history_uses_earliest_commit() {
    let fx = history();
    let options = AnalysisOptions {
        start_date: None,
        end_date: Some(date("2023-12-01")),
        checkout_enabled: true,
        preserve_working_tree: true,
        ..Default::default()
    };
    let analyzer = Analyzer::with_counter(options, WalkCounter);

    let results = analyzer.run(&[project("demo", fx.path(), true)]);
    let result = &results.projects[0];

    // The seed commit: gen.txt (10) + lib.rs (5)
    assert_eq!(result.loc_stats.total_lines, 15);
    assert!(result.measurement.is_earliest_available());
    assert_eq!(result.change_stats.commit_count, 0);
    assert_eq!(fx.head_branch().as_deref(), Some("main"));
}

#[test]
fn mixed_projects_are_all_processed() {
    let fx = history();
    let plain = tempfile::tempdir().unwrap();
    fs::write(plain.path().join("main.py"), "print('hi')\nprint('bye')\n").unwrap();
    let empty = Fixture::new();
    empty.write("draft.rs", "fn main() {}\n");

    let analyzer = Analyzer::with_counter(february(true), WalkCounter);
    let results = analyzer.run(&[
        project("plain", plain.path(), false),
        project("empty", empty.path(), true),
        project("demo", fx.path(), true),
    ]);

    assert_eq!(results.totals.projects_analyzed, 3);
    assert_eq!(results.projects[0].measurement, MeasurementState::Current);
    assert_eq!(results.projects[0].loc_stats.total_lines, 2);
    assert!(results.projects[1].measurement.is_live_fallback());
    assert_eq!(results.projects[1].loc_stats.total_lines, 1);
    assert_eq!(results.projects[1].change_stats.commit_count, 0);
    assert_eq!(results.projects[2].loc_stats.total_lines, 70);
    assert_eq!(results.totals.total_loc, 73);
    assert_eq!(results.live_state_fallbacks().count(), 1);
    assert_eq!(results.restore_failures().count(), 0);
}
