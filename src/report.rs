use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analyzer::{AnalysisResults, ProjectCommit};
use crate::checkout::MeasurementState;
use crate::config::{CommitsReports, Config};
use crate::git::TargetKind;

/// Write every report the config asks for into `output_dir`
pub fn save_results(results: &AnalysisResults, config: &Config, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let commits_config = &config.reporting.commits_reports;
    let mut written = Vec::new();

    if config.wants_format("json") {
        let json = serde_json::to_string_pretty(results)?;
        written.push(write_report(output_dir, "analysis_results.json", &json)?);
    }

    if config.wants_format("csv") {
        written.push(write_report(output_dir, "project_summary.csv", &project_summary_csv(results))?);
        if commits_config.generate_csv {
            if results.commits.is_empty() {
                info!("No commits data to export to CSV");
            } else {
                written.push(write_report(output_dir, "commits_details.csv", &commits_csv(results))?);
            }
        }
    }

    if config.wants_format("html") {
        written.push(write_report(output_dir, "analysis_report.html", &summary_html(results))?);
        if commits_config.generate_html {
            written.push(write_report(
                output_dir,
                "commits_report.html",
                &commits_html(results, commits_config),
            )?);
        }
    }

    Ok(written)
}

fn write_report(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Report saved to {}", path.display());
    Ok(path)
}

fn measurement_label(state: &MeasurementState) -> String {
    match state {
        MeasurementState::Current => "current".to_string(),
        MeasurementState::Historical { commit, kind } => {
            let short = commit.get(..8).unwrap_or(commit);
            match kind {
                TargetKind::AtOrBefore => format!("historical {}", short),
                TargetKind::EarliestAvailable => format!("earliest available {}", short),
            }
        }
        MeasurementState::LiveState { .. } => "live (checkout skipped)".to_string(),
    }
}

fn project_summary_csv(results: &AnalysisResults) -> String {
    let mut out = String::from(
        "Project Name,Project Type,Path,Total LOC,Source LOC,Comments LOC,Blank LOC,\
Lines Added,Lines Removed,Net Change,Commits,Contributors,Is Git Repo,Measured At,Restore Error\n",
    );
    for p in &results.projects {
        let row = [
            csv_field(&p.info.name),
            csv_field(&p.info.kind),
            csv_field(&p.info.path.display().to_string()),
            p.loc_stats.total_lines.to_string(),
            p.loc_stats.source_lines.to_string(),
            p.loc_stats.comment_lines.to_string(),
            p.loc_stats.blank_lines.to_string(),
            p.change_stats.total_added.to_string(),
            p.change_stats.total_removed.to_string(),
            p.change_stats.net_change.to_string(),
            p.change_stats.commit_count.to_string(),
            p.change_stats.contributors.len().to_string(),
            p.info.is_git_repo.to_string(),
            csv_field(&measurement_label(&p.measurement)),
            csv_field(p.restore_error.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Commits newest first; `date` is `YYYY-MM-DD` so string order is date order
fn sorted_commits(results: &AnalysisResults) -> Vec<&ProjectCommit> {
    let mut commits: Vec<&ProjectCommit> = results.commits.iter().collect();
    commits.sort_by(|a, b| b.commit.date.cmp(&a.commit.date));
    commits
}

fn commits_csv(results: &AnalysisResults) -> String {
    let mut out = String::from(
        "Project,Date,Hash,Hash Short,Author,Message,Files Changed,Lines Added,Lines Removed,Net Change,Project Path\n",
    );
    for c in sorted_commits(results) {
        let row = [
            csv_field(&c.project),
            csv_field(&c.commit.date),
            csv_field(&c.commit.hash),
            csv_field(c.commit.short_hash()),
            csv_field(&c.commit.author),
            csv_field(&c.commit.message),
            c.commit.file_changes.len().to_string(),
            c.commit.lines_added().to_string(),
            c.commit.lines_removed().to_string(),
            c.commit.net_change().to_string(),
            csv_field(&c.project_path.display().to_string()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `1234567` -> `1,234,567`
fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn period(results: &AnalysisResults) -> String {
    format!(
        "{} to {}",
        results.time_period.start.as_deref().unwrap_or("beginning"),
        results.time_period.end.as_deref().unwrap_or("now")
    )
}

const STYLE: &str = r#"
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; color: #222; }
        .summary { background: #f5f5f5; padding: 20px; border-radius: 5px; margin-bottom: 20px; }
        .metric { display: inline-block; margin: 10px 20px; }
        .metric-value { font-size: 24px; font-weight: bold; color: #2c3e50; }
        .metric-label { font-size: 12px; color: #7f8c8d; }
        table { border-collapse: collapse; width: 100%; margin-top: 20px; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #f2f2f2; }
        .warn { color: #e67e22; }
        .error { color: #e74c3c; font-weight: bold; }
        .commit-hash { font-family: monospace; font-size: 12px; }
        .files-changed { font-size: 11px; color: #7f8c8d; }
        .added { color: #27ae60; }
        .removed { color: #e74c3c; }
"#;

fn metric(value: &str, label: &str) -> String {
    format!(
        r#"        <div class="metric"><div class="metric-value">{}</div><div class="metric-label">{}</div></div>
"#,
        value, label
    )
}

fn summary_html(results: &AnalysisResults) -> String {
    let totals = &results.totals;
    let changes = &results.changes;

    let metrics: String = [
        metric(&totals.projects_analyzed.to_string(), "Projects"),
        metric(&thousands(totals.total_loc as i64), "Total LOC"),
        metric(&thousands(totals.source_loc as i64), "Source Code"),
        metric(&thousands(totals.comment_loc as i64), "Comments"),
        metric(&thousands(totals.blank_loc as i64), "Blank Lines"),
        metric(&thousands(changes.net_change), "Net Change"),
        metric(&changes.total_commits.to_string(), "Total Commits"),
    ]
    .concat();

    let mut languages: Vec<(&String, &f64)> = results.language_percentages.iter().collect();
    languages.sort_by(|a, b| b.1.total_cmp(a.1));
    let mut language_rows = String::new();
    for (lang, pct) in languages {
        let lines = results.languages.get(lang).copied().unwrap_or(0);
        let _ = writeln!(
            language_rows,
            "            <tr><td>{}</td><td>{:.1}%</td><td>{}</td></tr>",
            escape_html(lang),
            pct,
            thousands(lines as i64)
        );
    }

    let mut project_rows = String::new();
    for p in &results.projects {
        let state_class = match (&p.restore_error, &p.measurement) {
            (Some(_), _) => "error",
            (None, MeasurementState::LiveState { .. }) => "warn",
            _ => "",
        };
        let state_text = match &p.restore_error {
            Some(e) => format!("restore failed: {}", e),
            None => measurement_label(&p.measurement),
        };
        let _ = write!(
            project_rows,
            r#"        <tr>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>{}</td>
            <td>+{}/-{}</td>
            <td>{}</td>
            <td class="{}">{}</td>
        </tr>
"#,
            escape_html(&p.info.name),
            escape_html(&p.info.kind),
            thousands(p.loc_stats.total_lines as i64),
            thousands(p.loc_stats.source_lines as i64),
            thousands(p.loc_stats.comment_lines as i64),
            thousands(p.loc_stats.blank_lines as i64),
            thousands(p.change_stats.total_added as i64),
            thousands(p.change_stats.total_removed as i64),
            p.change_stats.commit_count,
            state_class,
            escape_html(&state_text),
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Multi-Project LOC Analysis Report</title>
    <style>{style}</style>
</head>
<body>
    <h1>Multi-Project Lines of Code Analysis</h1>
    <p>Generated: {generated}</p>
    <p>Analysis Period: {period}</p>

    <div class="summary">
        <h2>Summary</h2>
{metrics}    </div>

    <h2>Language Distribution</h2>
    <table>
        <tr><th>Language</th><th>Percentage</th><th>Lines</th></tr>
{language_rows}    </table>

    <h2>Project Details</h2>
    <table>
        <tr>
            <th>Project</th>
            <th>Type</th>
            <th>Total LOC</th>
            <th>Source</th>
            <th>Comments</th>
            <th>Blanks</th>
            <th>Changes (+/-)</th>
            <th>Commits</th>
            <th>Measured At</th>
        </tr>
{project_rows}    </table>
</body>
</html>"#,
        style = STYLE,
        generated = escape_html(&results.analysis_timestamp),
        period = escape_html(&period(results)),
        metrics = metrics,
        language_rows = language_rows,
        project_rows = project_rows,
    )
}

fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() > max_len {
        let cut: String = message.chars().take(max_len).collect();
        format!("{}...", cut)
    } else {
        message.to_string()
    }
}

fn commits_html(results: &AnalysisResults, config: &CommitsReports) -> String {
    let commits = sorted_commits(results);
    let authors: BTreeSet<&str> =
        commits.iter().map(|c| c.commit.author.as_str()).collect();
    let projects: BTreeSet<&str> =
        commits.iter().map(|c| c.project.as_str()).collect();
    let added: u64 = commits.iter().map(|c| c.commit.lines_added()).sum();
    let removed: u64 = commits.iter().map(|c| c.commit.lines_removed()).sum();

    let metrics: String = [
        metric(&thousands(commits.len() as i64), "Total Commits"),
        metric(&authors.len().to_string(), "Contributors"),
        metric(&projects.len().to_string(), "Projects"),
        metric(&thousands(added as i64), "Lines Added"),
        metric(&thousands(removed as i64), "Lines Removed"),
    ]
    .concat();

    let mut rows = String::new();
    for c in &commits {
        let files = &c.commit.file_changes;
        let mut file_list: Vec<String> = files
            .iter()
            .take(config.max_files_per_commit_display)
            .map(|f| format!("{} (+{}/-{})", escape_html(&f.path), f.lines_added, f.lines_removed))
            .collect();
        if files.len() > config.max_files_per_commit_display {
            file_list.push(format!(
                "... and {} more files",
                files.len() - config.max_files_per_commit_display
            ));
        }

        let _ = write!(
            rows,
            r#"
            <tr>
                <td>{}</td>
                <td>{}</td>
                <td class="commit-hash">{}</td>
                <td>{}</td>
                <td>{}</td>
                <td class="files-changed">{} files<br><small>{}</small></td>
                <td><span class="added">+{}</span> / <span class="removed">-{}</span></td>
            </tr>"#,
            escape_html(&c.commit.date),
            escape_html(&c.project),
            escape_html(c.commit.short_hash()),
            escape_html(&c.commit.author),
            escape_html(&truncate_message(&c.commit.message, config.max_commit_message_length)),
            files.len(),
            file_list.join("<br>"),
            c.commit.lines_added(),
            c.commit.lines_removed(),
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Multi-Project Commits Report</title>
    <style>{style}</style>
</head>
<body>
    <h1>Multi-Project Commits Report</h1>
    <p>Generated: {generated}</p>
    <p>Analysis Period: {period}</p>

    <div class="summary">
        <h2>Commits Summary</h2>
{metrics}    </div>

    <h2>Detailed Commits ({count} commits)</h2>
    <table id="commitsTable">
        <thead>
            <tr>
                <th>Date</th>
                <th>Project</th>
                <th>Hash</th>
                <th>Author</th>
                <th>Message</th>
                <th>Files Changed</th>
                <th>Changes</th>
            </tr>
        </thead>
        <tbody>{rows}
        </tbody>
    </table>
</body>
</html>"#,
        style = STYLE,
        generated = escape_html(&results.analysis_timestamp),
        period = escape_html(&period(results)),
        metrics = metrics,
        count = commits.len(),
        rows = rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{CommitRecord, FileChange};

    fn commit(hash: &str, date: &str, message: &str, files: usize) -> ProjectCommit {
        ProjectCommit {
            commit: CommitRecord {
                hash: hash.to_string(),
                date: date.to_string(),
                author: "alice".to_string(),
                message: message.to_string(),
                file_changes: (0..files)
                    .map(|i| FileChange {
                        path: format!("src/f{}.rs", i),
                        lines_added: 2,
                        lines_removed: 1,
                    })
                    .collect(),
            },
            project: "demo".to_string(),
            project_path: PathBuf::from("/src/demo"),
        }
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-4200), "-4,200");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn test_commits_csv_newest_first() {
        let results = AnalysisResults {
            commits: vec![
                commit("aaaaaaaaaa", "2024-01-01", "old, with comma", 1),
                commit("bbbbbbbbbb", "2024-02-01", "new", 2),
            ],
            ..Default::default()
        };
        let csv = commits_csv(&results);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("demo,2024-02-01,bbbbbbbbbb,bbbbbbbb,alice,new,2,4,2,2,"));
        assert!(lines[2].contains("\"old, with comma\""));
    }

    #[test]
    fn test_commits_html_truncates() {
        let results = AnalysisResults {
            commits: vec![commit("cccccccccc", "2024-01-01", "a very long message", 4)],
            ..Default::default()
        };
        let config = CommitsReports {
            max_commit_message_length: 6,
            max_files_per_commit_display: 2,
            ..Default::default()
        };
        let html = commits_html(&results, &config);
        assert!(html.contains("a very..."));
        assert!(html.contains("... and 2 more files"));
        assert!(!html.contains("src/f3.rs"));
    }

    #[test]
    fn test_save_results_writes_requested_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.format = vec!["json".to_string(), "csv".to_string(), "html".to_string()];
        let results = AnalysisResults {
            commits: vec![commit("dddddddddd", "2024-01-01", "msg", 1)],
            ..Default::default()
        };

        let written = save_results(&results, &config, dir.path()).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "analysis_results.json",
                "project_summary.csv",
                "commits_details.csv",
                "analysis_report.html",
                "commits_report.html",
            ]
        );

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("analysis_results.json")).unwrap())
                .unwrap();
        assert_eq!(json["commits"][0]["project"], "demo");
    }
}
