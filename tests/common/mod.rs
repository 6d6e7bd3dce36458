//! Fixture repositories with controlled commit dates

#![allow(dead_code)]

use chrono::{Local, NaiveDate, TimeZone};
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub struct Fixture {
    dir: TempDir,
    pub repo: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Fixture").unwrap();
            config.set_str("user.email", "fixture@example.com").unwrap();
        }
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn write(&self, file: &str, content: &str) {
        let path = self.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, file: &str) -> Option<String> {
        fs::read_to_string(self.path().join(file)).ok()
    }

    /// Commit `files` as `author` at noon local time on `date` (YYYY-MM-DD)
    pub fn commit(&self, author: &str, date: &str, message: &str, files: &[(&str, &str)]) -> String {
        for (file, content) in files {
            self.write(file, content);
        }

        let mut index = self.repo.index().unwrap();
        for (file, _) in files {
            index.add_path(Path::new(file)).unwrap();
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        let sig = signature(author, date);
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| self.repo.find_commit(oid).unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
        oid.to_string()
    }

    pub fn detach_head(&self, hash: &str) {
        self.repo.set_head_detached(Oid::from_str(hash).unwrap()).unwrap();
    }

    pub fn git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    pub fn head_branch(&self) -> Option<String> {
        let head = self.repo.head().unwrap();
        if head.is_branch() {
            head.shorthand().map(str::to_string)
        } else {
            None
        }
    }

    pub fn head_commit(&self) -> String {
        self.repo.head().unwrap().target().unwrap().to_string()
    }

    pub fn status_porcelain(&self) -> String {
        self.git(&["status", "--porcelain"])
    }

    pub fn stash_list(&self) -> String {
        self.git(&["stash", "list"])
    }
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn signature(author: &str, raw_date: &str) -> Signature<'static> {
    let noon = date(raw_date).and_hms_opt(12, 0, 0).unwrap();
    let local = Local.from_local_datetime(&noon).single().unwrap();
    let offset_minutes = local.offset().local_minus_utc() / 60;
    let email = format!("{}@example.com", author.replace(' ', "."));
    Signature::new(author, &email, &Time::new(local.timestamp(), offset_minutes)).unwrap()
}

/// Write an executable `sh` wrapper around the real git into `dir`
///
/// `rules` runs first with the git arguments in `$1..`; it can `exit` to
/// fake a failure, otherwise the call falls through to git. `count FILE`
/// increments a counter file and leaves the new value in `$n`.
#[cfg(unix)]
pub fn git_wrapper(dir: &Path, rules: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("git-wrapper");
    let script = format!(
        "#!/bin/sh\n\
count() {{ n=$(cat \"$1\" 2>/dev/null || echo 0); n=$((n + 1)); echo \"$n\" > \"$1\"; }}\n\
{}\n\
exec git \"$@\"\n",
        rules
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    // A sibling test thread forking while the file was open for writing
    // makes exec fail with ETXTBSY for a moment
    for _ in 0..50 {
        match Command::new(&path).arg("--version").output() {
            Err(e) if e.raw_os_error() == Some(26) => {
                std::thread::sleep(std::time::Duration::from_millis(20))
            }
            _ => break,
        }
    }
    path.to_string_lossy().into_owned()
}

/// `n` distinct lines starting with `prefix`
pub fn lines(prefix: &str, n: usize) -> String {
    (0..n).map(|i| format!("{}-{}\n", prefix, i)).collect()
}
