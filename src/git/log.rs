//! Change log parsing
//!
//! Turns `git log --pretty=format:%H|%ad|%an|%s --numstat` output into
//! commit records and a per-repository aggregate, dropping commits whose
//! author matches the exclusion list.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Case-insensitive substring block-list for commit authors
#[derive(Debug, Clone, Default)]
pub struct AuthorFilter {
    patterns: Vec<String>,
}

impl AuthorFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            // An empty pattern would match every author
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn is_excluded(&self, author: &str) -> bool {
        let author = author.trim().to_lowercase();
        self.patterns.iter().any(|p| author.contains(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// One numstat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    #[serde(rename = "file")]
    pub path: String,
    /// Binary files report `-`, which counts as 0
    #[serde(rename = "added")]
    pub lines_added: u64,
    #[serde(rename = "removed")]
    pub lines_removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub date: String,
    pub author: String,
    pub message: String,
    #[serde(rename = "files")]
    pub file_changes: Vec<FileChange>,
}

impl CommitRecord {
    pub fn lines_added(&self) -> u64 {
        self.file_changes.iter().map(|f| f.lines_added).sum()
    }

    pub fn lines_removed(&self) -> u64 {
        self.file_changes.iter().map(|f| f.lines_removed).sum()
    }

    pub fn net_change(&self) -> i64 {
        self.lines_added() as i64 - self.lines_removed() as i64
    }

    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }
}

/// Change activity of one repository over the analysis window
///
/// Built once by [`ChangeAggregate::from_commits`]; the derived fields are
/// always consistent with `commits`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeAggregate {
    #[serde(rename = "lines_added")]
    pub total_added: u64,
    #[serde(rename = "lines_removed")]
    pub total_removed: u64,
    /// `min(total_added, total_removed)`, a coarse estimate rather than a diff count
    pub lines_modified: u64,
    pub net_change: i64,
    #[serde(rename = "commits_count")]
    pub commit_count: usize,
    pub files_changed: BTreeSet<String>,
    /// `files_changed.len()`, kept alongside the set for report consumers
    pub files_changed_count: usize,
    pub contributors: BTreeSet<String>,
    #[serde(rename = "commits_details")]
    pub commits: Vec<CommitRecord>,
    /// Commits dropped by the author filter
    pub excluded_commits: usize,
}

impl ChangeAggregate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_commits(commits: Vec<CommitRecord>, excluded_commits: usize) -> Self {
        let mut total_added = 0u64;
        let mut total_removed = 0u64;
        let mut files_changed = BTreeSet::new();
        let mut contributors = BTreeSet::new();

        for commit in &commits {
            contributors.insert(commit.author.clone());
            for change in &commit.file_changes {
                total_added += change.lines_added;
                total_removed += change.lines_removed;
                files_changed.insert(change.path.clone());
            }
        }

        Self {
            total_added,
            total_removed,
            lines_modified: total_added.min(total_removed),
            net_change: total_added as i64 - total_removed as i64,
            commit_count: commits.len(),
            files_changed_count: files_changed.len(),
            files_changed,
            contributors,
            commits,
            excluded_commits,
        }
    }
}

/// Parse raw log text into an aggregate, applying `filter`
///
/// Never fails: unrecognised lines are skipped and non-numeric counts
/// become 0.
pub fn parse_log(output: &str, filter: &AuthorFilter) -> ChangeAggregate {
    let mut commits: Vec<CommitRecord> = Vec::new();
    let mut excluded = 0usize;
    // false while inside an excluded commit or before the first header
    let mut collecting = false;

    for line in output.lines() {
        if let Some(header) = parse_header(line) {
            if filter.is_excluded(header.author) {
                excluded += 1;
                collecting = false;
                continue;
            }
            commits.push(CommitRecord {
                hash: header.hash.to_string(),
                date: header.date.to_string(),
                author: header.author.to_string(),
                message: header.message.to_string(),
                file_changes: Vec::new(),
            });
            collecting = true;
        } else if collecting && line.contains('\t') {
            if let (Some(change), Some(commit)) = (parse_numstat(line), commits.last_mut()) {
                commit.file_changes.push(change);
            }
        }
    }

    if excluded > 0 {
        info!("Excluded {} automated commits from analysis", excluded);
    }

    ChangeAggregate::from_commits(commits, excluded)
}

struct Header<'a> {
    hash: &'a str,
    date: &'a str,
    author: &'a str,
    message: &'a str,
}

fn parse_header(line: &str) -> Option<Header<'_>> {
    if line.split('|').count() < 4 {
        return None;
    }
    let mut parts = line.splitn(4, '|');
    Some(Header {
        hash: parts.next()?,
        date: parts.next()?,
        author: parts.next()?,
        message: parts.next()?,
    })
}

fn parse_numstat(line: &str) -> Option<FileChange> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?;
    let removed = parts.next()?;
    let path = parts.next()?;
    Some(FileChange {
        path: path.to_string(),
        lines_added: parse_count(added),
        lines_removed: parse_count(removed),
    })
}

fn parse_count(token: &str) -> u64 {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    token.parse().unwrap_or(0)
}
