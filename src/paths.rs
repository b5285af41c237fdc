//! The configured-paths file: one sync root per line.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::discover::normalize_path;
use crate::error::SyncError;

/// Read sync roots from `list_file`, skipping blank lines.
///
/// A missing file or one with no paths is a [`SyncError::Configuration`]:
/// there is nothing to sync and no upload must be attempted.
pub fn load_sync_paths(list_file: &Path) -> std::result::Result<Vec<PathBuf>, SyncError> {
    if !list_file.exists() {
        return Err(SyncError::Configuration(format!(
            "{} not found",
            list_file.display()
        )));
    }
    let content = std::fs::read_to_string(list_file)?;
    let paths = parse_sync_paths(&content);
    if paths.is_empty() {
        return Err(SyncError::Configuration(format!(
            "no paths specified in {}",
            list_file.display()
        )));
    }
    Ok(paths)
}

fn parse_sync_paths(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| PathBuf::from(normalize_path(Path::new(line))))
        .collect()
}

/// Append `paths` to `list_file`, skipping ones already listed.
/// Returns how many were added.
pub fn add_sync_paths(list_file: &Path, paths: &[PathBuf]) -> Result<usize> {
    let existing = if list_file.exists() {
        std::fs::read_to_string(list_file)
            .with_context(|| format!("Failed to read {}", list_file.display()))?
    } else {
        String::new()
    };
    let mut known: HashSet<PathBuf> = parse_sync_paths(&existing).into_iter().collect();

    let mut lines = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        lines.push('\n');
    }
    let mut added = 0;
    for path in paths {
        let normalized = PathBuf::from(normalize_path(path));
        if known.insert(normalized.clone()) {
            lines.push_str(&normalized.to_string_lossy());
            lines.push('\n');
            added += 1;
        }
    }

    if added > 0 {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(list_file)
            .with_context(|| format!("Failed to open {}", list_file.display()))?;
        file.write_all(lines.as_bytes())?;
    }
    Ok(added)
}

pub fn list_sync_paths(list_file: &Path) -> Result<()> {
    let paths = load_sync_paths(list_file)?;

    println!("{:<8} PATH", "KIND");
    for path in &paths {
        let kind = if path.is_dir() {
            "dir"
        } else if path.is_file() {
            "file"
        } else {
            "missing"
        };
        println!("{:<8} {}", kind, path.display());
    }

    Ok(())
}
