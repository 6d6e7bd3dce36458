//! Project discovery module
//!
//! Finds projects by marker file in each root directory and its direct
//! subdirectories (depth 1).

use chrono::{DateTime, Local};
use glob::Pattern;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Marker entry -> project kind, checked in order; the first hit wins
const PROJECT_MARKERS: &[(&str, &str)] = &[
    (".git", "git"),
    ("package.json", "nodejs"),
    ("pom.xml", "java-maven"),
    ("build.gradle", "java-gradle"),
    ("Cargo.toml", "rust"),
    ("setup.py", "python-setuptools"),
    ("pyproject.toml", "python-modern"),
    ("go.mod", "go"),
    ("composer.json", "php"),
    ("Gemfile", "ruby"),
    ("CMakeLists.txt", "cpp-cmake"),
    ("Makefile", "c-make"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub last_modified: String,
    pub is_git_repo: bool,
}

/// Discovery rules taken from the `[filters]` config section
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilters {
    exclude_dirs: HashSet<String>,
    exclude_files: Vec<Pattern>,
}

impl DiscoveryFilters {
    pub fn new(exclude_dirs: &[String], exclude_files: &[String]) -> Self {
        let exclude_files = exclude_files
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid file pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self {
            exclude_dirs: exclude_dirs.iter().cloned().collect(),
            exclude_files,
        }
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.contains(name)
    }

    pub fn is_excluded_file(&self, file_name: &str) -> bool {
        self.exclude_files.iter().any(|p| p.matches(file_name))
    }
}

/// Discover projects under every root, skipping missing roots
pub fn discover_projects(roots: &[PathBuf], filters: &DiscoveryFilters) -> Vec<ProjectInfo> {
    info!("Discovering projects in {} root directories...", roots.len());

    let mut projects = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        if !root.exists() {
            warn!("Root path {} does not exist, skipping...", root.display());
            continue;
        }

        check_and_add(root, filters, &mut seen, &mut projects);

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not access directory {}: {}", root.display(), e);
                continue;
            }
        };

        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|entry| !filters.is_excluded_dir(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        subdirs.sort();

        for dir in subdirs {
            check_and_add(&dir, filters, &mut seen, &mut projects);
        }
    }

    info!("Discovered {} projects", projects.len());
    projects
}

fn check_and_add(
    path: &Path,
    filters: &DiscoveryFilters,
    seen: &mut HashSet<PathBuf>,
    projects: &mut Vec<ProjectInfo>,
) {
    let Some(kind) = detect_project_kind(path) else {
        return;
    };

    let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(key) {
        return;
    }

    let name = project_name(path);
    info!("Found {} project: {}", kind, name);

    projects.push(ProjectInfo {
        name,
        path: path.to_path_buf(),
        kind: kind.to_string(),
        size_bytes: directory_size(path, filters),
        last_modified: last_modified(path),
        is_git_repo: is_git_repo(path),
    });
}

/// Project kind by marker, `None` when the directory is not a project
pub fn detect_project_kind(dir: &Path) -> Option<&'static str> {
    PROJECT_MARKERS
        .iter()
        .find(|(marker, _)| dir.join(marker).exists())
        .map(|(_, kind)| *kind)
}

pub fn is_git_repo(dir: &Path) -> bool {
    dir.join(".git").exists()
}

fn project_name(path: &Path) -> String {
    fs::canonicalize(path)
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

/// Total size in bytes of files not matching an exclusion pattern
pub fn directory_size(path: &Path, filters: &DiscoveryFilters) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !filters.is_excluded_file(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

fn last_modified(path: &Path) -> String {
    let modified: DateTime<Local> = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::from)
        .unwrap_or_else(|_| Local::now());
    modified.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> DiscoveryFilters {
        DiscoveryFilters::new(&["node_modules".to_string()], &["*.lock".to_string()])
    }

    #[test]
    fn test_detect_project_kind_order() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_project_kind(dir.path()), None);

        fs::write(dir.path().join("Makefile"), "all:").unwrap();
        assert_eq!(detect_project_kind(dir.path()), Some("c-make"));

        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(detect_project_kind(dir.path()), Some("rust"));

        fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(detect_project_kind(dir.path()), Some("git"));
        assert!(is_git_repo(dir.path()));
    }

    #[test]
    fn test_discover_depth_one_with_exclusions() {
        let root = tempfile::tempdir().unwrap();
        let app = root.path().join("app");
        let deps = root.path().join("node_modules");
        let nested = root.path().join("group").join("inner");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&deps).unwrap();
        fs::create_dir_all(&nested).unwrap();
        fs::write(app.join("package.json"), "{}").unwrap();
        fs::write(deps.join("package.json"), "{}").unwrap();
        fs::write(nested.join("go.mod"), "module x").unwrap();

        let projects = discover_projects(&[root.path().to_path_buf()], &filters());
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "app");
        assert_eq!(projects[0].kind, "nodejs");
        assert!(!projects[0].is_git_repo);
    }

    #[test]
    fn test_root_itself_counts_once() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("go.mod"), "module x").unwrap();
        let roots = vec![root.path().to_path_buf(), root.path().to_path_buf()];
        let projects = discover_projects(&roots, &filters());
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].kind, "go");
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let projects = discover_projects(&[PathBuf::from("/definitely/not/here")], &filters());
        assert!(projects.is_empty());
    }

    #[test]
    fn test_directory_size_skips_excluded_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "0123456789").unwrap();
        fs::write(dir.path().join("Cargo.lock"), "x".repeat(100)).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("lib.rs"), "abcde").unwrap();

        assert_eq!(directory_size(dir.path(), &filters()), 15);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_size_does_not_follow_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("leaf.rs"), "1234567").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

        assert_eq!(directory_size(dir.path(), &filters()), 7);
    }

    #[test]
    fn test_exact_file_name_pattern() {
        let filters = DiscoveryFilters::new(&[], &["package-lock.json".to_string()]);
        assert!(filters.is_excluded_file("package-lock.json"));
        assert!(!filters.is_excluded_file("package.json"));
    }
}
