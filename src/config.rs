use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const KNOWN_FORMATS: &[&str] = &["json", "csv", "html"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projects: Projects,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub time_analysis: TimeAnalysis,
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub reporting: Reporting,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Projects {
    #[serde(default = "default_roots")]
    pub root_directories: Vec<String>,
}

impl Default for Projects {
    fn default() -> Self {
        Self {
            root_directories: default_roots(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    /// Directory names skipped during discovery and by the line counter
    #[serde(default)]
    pub exclude_directories: Vec<String>,
    /// Glob patterns (`*.min.js`) or exact file names left out of size totals
    #[serde(default)]
    pub exclude_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeAnalysis {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSettings {
    /// Case-insensitive substrings; matching authors are left out of change stats
    #[serde(default)]
    pub exclude_authors: Vec<String>,
    /// Rewind each repository to `end_date` before counting lines
    #[serde(default = "default_true")]
    pub checkout_target_date: bool,
    /// Stash uncommitted changes before the rewind
    #[serde(default = "default_true")]
    pub preserve_working_directory: bool,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            exclude_authors: Vec::new(),
            checkout_target_date: true,
            preserve_working_directory: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Output {
    #[serde(default = "default_formats")]
    pub format: Vec<String>,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            format: default_formats(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reporting {
    #[serde(default)]
    pub commits_reports: CommitsReports,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitsReports {
    #[serde(default = "default_true")]
    pub generate_csv: bool,
    #[serde(default = "default_true")]
    pub generate_html: bool,
    #[serde(default = "default_message_length")]
    pub max_commit_message_length: usize,
    #[serde(default = "default_files_display")]
    pub max_files_per_commit_display: usize,
}

impl Default for CommitsReports {
    fn default() -> Self {
        Self {
            generate_csv: true,
            generate_html: true,
            max_commit_message_length: default_message_length(),
            max_files_per_commit_display: default_files_display(),
        }
    }
}

fn default_roots() -> Vec<String> {
    vec![".".to_string()]
}

fn default_formats() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_message_length() -> usize {
    100
}

fn default_files_display() -> usize {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let start = self.start_date()?;
        let end = self.end_date()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                anyhow::bail!(
                    "start_date {} is after end_date {}",
                    start.format(DATE_FORMAT),
                    end.format(DATE_FORMAT)
                );
            }
        }

        for format in &self.output.format {
            if !KNOWN_FORMATS.contains(&format.as_str()) {
                anyhow::bail!(
                    "Unknown output format '{}' (expected one of: {})",
                    format,
                    KNOWN_FORMATS.join(", ")
                );
            }
        }

        Ok(())
    }

    pub fn start_date(&self) -> Result<Option<NaiveDate>> {
        parse_date("start_date", self.time_analysis.start_date.as_deref())
    }

    pub fn end_date(&self) -> Result<Option<NaiveDate>> {
        parse_date("end_date", self.time_analysis.end_date.as_deref())
    }

    /// Root directories with `~` and `$VARS` expanded
    pub fn root_paths(&self) -> Result<Vec<PathBuf>> {
        self.projects
            .root_directories
            .iter()
            .map(|root| {
                shellexpand::full(root)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .with_context(|| format!("Could not expand root directory '{}'", root))
            })
            .collect()
    }

    pub fn wants_format(&self, format: &str) -> bool {
        self.output.format.iter().any(|f| f == format)
    }
}

/// Parse an optional `YYYY-MM-DD` value; blank strings count as unset
pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .with_context(|| format!("Invalid {} '{}', expected YYYY-MM-DD", field, raw)),
    }
}
