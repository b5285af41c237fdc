//! File discovery: walk the sync roots and collect files that need uploading.
//!
//! A file qualifies when its name ends with an allowed extension, no
//! exclusion substring appears in its normalized path, and the ledger says
//! it is stale. Excluded directories are pruned before descending, so their
//! contents are never even listed.

use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::FiltersConfig;
use crate::error::SyncError;
use crate::ledger::{file_mtime, Ledger};
use crate::progress::{SyncEvent, SyncReporter};

/// Extension and exclusion rules for one run.
#[derive(Debug, Clone)]
pub struct Filters {
    /// Case-sensitive file name suffixes, e.g. `.md`.
    pub extensions: Vec<String>,
    /// Substrings matched against the forward-slash path.
    pub excludes: Vec<String>,
    pub follow_symlinks: bool,
}

impl Filters {
    pub fn from_config(config: &FiltersConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    pub fn allows_name(&self, file_name: &str) -> bool {
        self.extensions.iter().any(|ext| file_name.ends_with(ext))
    }

    pub fn excludes_path(&self, normalized: &str) -> bool {
        is_excluded(normalized, &self.excludes)
    }

    /// Directories are tested with a trailing slash so `plugins/` prunes
    /// a directory named `plugins`.
    fn excludes_dir(&self, dir: &Path) -> bool {
        let mut normalized = normalize_path(dir);
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        self.excludes_path(&normalized)
    }
}

pub fn is_excluded(normalized: &str, excludes: &[String]) -> bool {
    excludes.iter().any(|pattern| normalized.contains(pattern.as_str()))
}

/// Lexically normalize `path` into forward-slash form.
///
/// `.` components are dropped and `..` cancels the preceding normal
/// component. The filesystem is not consulted.
pub fn normalize_path(path: &Path) -> String {
    let mut prefix = String::new();
    let mut absolute = false;
    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
        }
    }

    let mut out = prefix;
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    out.replace('\\', "/")
}

/// Collect stale, allowed, non-excluded files under `roots`, in traversal order.
///
/// Every queued path is marked in the ledger's in-memory overlay, so a file
/// reachable from two roots is returned once. Unreadable roots and
/// subdirectories are reported as errors and skipped.
pub fn discover(
    roots: &[PathBuf],
    filters: &Filters,
    ledger: &mut Ledger,
    reporter: &dyn SyncReporter,
) -> Vec<String> {
    let mut found = Vec::new();

    for root in roots {
        let metadata = match std::fs::metadata(root) {
            Ok(m) => m,
            Err(e) => {
                report_error(reporter, root, &e.to_string());
                continue;
            }
        };

        if metadata.is_dir() {
            walk_dir(root, filters, ledger, reporter, &mut found);
        } else if metadata.is_file() {
            let name = file_name(root);
            let normalized = normalize_path(root);
            if !filters.allows_name(&name) {
                reporter.report(SyncEvent::Log(format!(
                    "Skipping {}: file type not selected",
                    normalized
                )));
            } else if filters.excludes_path(&normalized) {
                reporter.report(SyncEvent::Log(format!(
                    "Skipping {}: matches an exclude pattern",
                    normalized
                )));
            } else {
                consider_file(root, normalized, ledger, reporter, &mut found);
            }
        } else {
            report_error(reporter, root, "not a regular file or directory");
        }
    }

    debug!(queued = found.len(), "discovery finished");
    found
}

fn walk_dir(
    root: &Path,
    filters: &Filters,
    ledger: &mut Ledger,
    reporter: &dyn SyncReporter,
    found: &mut Vec<String>,
) {
    let walker = WalkDir::new(root)
        .follow_links(filters.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && filters.excludes_dir(entry.path())));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let at = e.path().unwrap_or(root).to_path_buf();
                report_error(reporter, &at, &e.to_string());
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_symlink() {
            // Unfollowed links: a link to a file counts as that file, links
            // to directories are not descended.
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    if filters.allows_name(&name) {
                        report_error(reporter, entry.path(), &e.to_string());
                    }
                    continue;
                }
            }
        } else if !entry.file_type().is_file() {
            continue;
        }

        if !filters.allows_name(&name) {
            continue;
        }
        let normalized = normalize_path(entry.path());
        if filters.excludes_path(&normalized) {
            continue;
        }
        consider_file(entry.path(), normalized, ledger, reporter, found);
    }
}

fn consider_file(
    path: &Path,
    normalized: String,
    ledger: &mut Ledger,
    reporter: &dyn SyncReporter,
    found: &mut Vec<String>,
) {
    // The ledger is line-oriented; such a path could never be read back.
    if normalized.contains(['\n', '\r']) {
        report_error(reporter, path, "path contains a line break");
        return;
    }

    let mtime = match file_mtime(path) {
        Ok(t) => t,
        Err(e) => {
            report_error(reporter, path, &e.to_string());
            return;
        }
    };

    if ledger.is_stale(&normalized, mtime) {
        ledger.mark_queued(&normalized, mtime);
        found.push(normalized);
    }
}

fn report_error(reporter: &dyn SyncReporter, path: &Path, message: &str) {
    let err = SyncError::Discovery {
        path: normalize_path(path),
        message: message.to_string(),
    };
    reporter.report(SyncEvent::Error(err.to_string()));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
