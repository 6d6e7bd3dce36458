//! Line counting via `cloc --json`

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::error::ToolError;
use crate::process::run_tool;

const CLOC_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LanguageStats {
    pub files: u64,
    pub lines: u64,
    pub code: u64,
    pub comments: u64,
    pub blanks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocStats {
    pub total_lines: u64,
    pub source_lines: u64,
    pub comment_lines: u64,
    pub blank_lines: u64,
    pub total_files: u64,
    pub languages: BTreeMap<String, LanguageStats>,
}

/// Count lines under `path`; any failure is logged and yields zero stats
pub fn count_lines(path: &Path, exclude_dirs: &[String]) -> LocStats {
    info!(path = %path.display(), "Analyzing LOC");
    match run_cloc(path, exclude_dirs) {
        Ok(stats) => stats,
        Err(ToolError::SpawnFailed { reason, .. }) => {
            error!("cloc unavailable ({}). Install with: apt-get install cloc or brew install cloc", reason);
            LocStats::default()
        }
        Err(e) => {
            error!(path = %path.display(), "Line count failed: {}", e);
            LocStats::default()
        }
    }
}

fn run_cloc(path: &Path, exclude_dirs: &[String]) -> Result<LocStats, ToolError> {
    let exclude = format!("--exclude-dir={}", exclude_dirs.join(","));
    let target = path.to_string_lossy();
    let mut args = vec!["--json", "--quiet"];
    if !exclude_dirs.is_empty() {
        args.push(exclude.as_str());
    }
    args.push(target.as_ref());
    let output = run_tool("cloc", &args, path, CLOC_TIMEOUT)?;
    parse_cloc_json(&output.stdout)
}

/// Parse cloc's JSON report
///
/// Uses `SUM` for totals when present, otherwise sums the per-language
/// entries. Empty output (no recognised files) is a zero result.
pub fn parse_cloc_json(raw: &str) -> Result<LocStats, ToolError> {
    if raw.trim().is_empty() {
        return Ok(LocStats::default());
    }

    let data: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|e| ToolError::MalformedOutput {
            tool: "cloc".to_string(),
            reason: e.to_string(),
        })?;

    let mut stats = LocStats::default();

    for (lang, entry) in &data {
        if lang == "header" || lang == "SUM" {
            continue;
        }
        let code = field(entry, "code");
        let comments = field(entry, "comment");
        let blanks = field(entry, "blank");
        stats.languages.insert(
            lang.clone(),
            LanguageStats {
                files: field(entry, "nFiles"),
                lines: code + comments + blanks,
                code,
                comments,
                blanks,
            },
        );
    }

    match data.get("SUM") {
        Some(sum) => {
            stats.total_files = field(sum, "nFiles");
            stats.source_lines = field(sum, "code");
            stats.comment_lines = field(sum, "comment");
            stats.blank_lines = field(sum, "blank");
        }
        None => {
            for lang in stats.languages.values() {
                stats.total_files += lang.files;
                stats.source_lines += lang.code;
                stats.comment_lines += lang.comments;
                stats.blank_lines += lang.blanks;
            }
        }
    }
    stats.total_lines = stats.source_lines + stats.comment_lines + stats.blank_lines;

    Ok(stats)
}

fn field(entry: &Value, key: &str) -> u64 {
    entry.get(key).and_then(Value::as_u64).unwrap_or(0)
}
