//! Modification ledger: the persisted record of what has already been sent.
//!
//! The ledger is a plain text file with one `<path>: <mtime>` line per
//! upload. Writes are appends; a path re-uploaded later simply gets a new
//! line, and on load the **last** line for a path wins. [`Ledger::compact`]
//! rewrites the file with one line per path.
//!
//! Paths queued during discovery are tracked in a separate in-memory overlay
//! so the same file is not queued twice in one run. The overlay is never
//! written; only [`Ledger::record`] (after the service accepted a batch)
//! touches the file.
//!
//! No locking: one sync process at a time.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    recorded: BTreeMap<String, f64>,
    queued: HashMap<String, f64>,
}

impl Ledger {
    /// An empty ledger that will persist to `path`. Nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recorded: BTreeMap::new(),
            queued: HashMap::new(),
        }
    }

    /// Read the ledger at `path`. A missing file yields an empty ledger;
    /// a malformed line is a [`SyncError::Format`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut ledger = Self::new(path);
        if !ledger.path.exists() {
            debug!(path = %ledger.path.display(), "no ledger yet");
            return Ok(ledger);
        }

        let content = std::fs::read_to_string(&ledger.path)?;
        ledger.recorded = parse_records(&content)?;
        debug!(
            path = %ledger.path.display(),
            entries = ledger.recorded.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Last recorded mtime for `path`, ignoring the queued overlay.
    pub fn recorded_mtime(&self, path: &str) -> Option<f64> {
        self.recorded.get(path).copied()
    }

    /// Persisted entries, sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.recorded.iter().map(|(p, t)| (p.as_str(), *t))
    }

    /// True when `path` has never been sent or was sent with an older mtime.
    /// Paths queued earlier in this run count as sent.
    pub fn is_stale(&self, path: &str, current_mtime: f64) -> bool {
        let known = self
            .queued
            .get(path)
            .or_else(|| self.recorded.get(path))
            .copied();
        match known {
            None => true,
            Some(t) => t < current_mtime,
        }
    }

    /// Remember that discovery queued `path` so later roots skip it.
    pub fn mark_queued(&mut self, path: &str, mtime: f64) {
        self.queued.insert(path.to_string(), mtime);
    }

    /// Append one line per path with its mtime as it is on disk right now.
    /// Paths that vanished since discovery are skipped.
    pub fn record(&mut self, paths: &[String]) -> Result<()> {
        let mut lines = String::new();
        for path in paths {
            let mtime = match file_mtime(Path::new(path)) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path, error = %e, "not recording vanished file");
                    continue;
                }
            };
            lines.push_str(&format_record(path, mtime));
            self.recorded.insert(path.clone(), mtime);
        }

        if lines.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(lines.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Drop entries so the matching files are queued again next run.
    /// Returns how many entries were removed. Rewrites the file.
    pub fn forget(&mut self, paths: &[String]) -> Result<usize> {
        let before = self.recorded.len();
        for path in paths {
            self.recorded.remove(path);
        }
        let removed = before - self.recorded.len();
        if removed > 0 {
            self.compact()?;
        }
        Ok(removed)
    }

    /// Rewrite the ledger with exactly one line per path.
    ///
    /// Writes a sibling temp file and renames it over the ledger, so a crash
    /// leaves either the old or the new file.
    pub fn compact(&self) -> Result<()> {
        let mut content = String::new();
        for (path, mtime) in &self.recorded {
            content.push_str(&format_record(path, *mtime));
        }

        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = self.recorded.len(), "ledger compacted");
        Ok(())
    }
}

/// Parse ledger text. Blank lines are skipped; the timestamp is whatever
/// follows the last `:` so drive letters in paths survive.
pub fn parse_records(content: &str) -> Result<BTreeMap<String, f64>> {
    let mut records = BTreeMap::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let format_err = |reason: &str| SyncError::Format {
            line_no: idx + 1,
            line: raw.to_string(),
            reason: reason.to_string(),
        };

        let (name, ts) = line
            .rsplit_once(':')
            .ok_or_else(|| format_err("missing ':' separator"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format_err("empty path"));
        }
        let mtime: f64 = ts
            .trim()
            .parse()
            .map_err(|_| format_err("timestamp is not a number"))?;
        if !mtime.is_finite() {
            return Err(format_err("timestamp is not finite"));
        }
        records.insert(name.to_string(), mtime);
    }
    Ok(records)
}

fn format_record(path: &str, mtime: f64) -> String {
    format!("{}: {}\n", path, mtime)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Modification time in seconds since the Unix epoch, with sub-second precision.
pub fn file_mtime(path: &Path) -> std::io::Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(system_time_secs(modified))
}

pub fn system_time_secs(t: SystemTime) -> f64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = Ledger::load(tmp.path().join("ledger.txt")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn last_occurrence_wins() {
        let records = parse_records("a/b.md: 10.5\nc.md:3\n\na/b.md: 12.25\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records["a/b.md"], 12.25);
        assert_eq!(records["c.md"], 3.0);
    }

    #[test]
    fn drive_letter_paths_split_on_last_colon() {
        let records = parse_records("C:/notes/x.md: 1700000000.5\n").unwrap();
        assert_eq!(records["C:/notes/x.md"], 1700000000.5);
    }

    #[test]
    fn malformed_line_is_fatal() {
        let err = parse_records("ok.md: 1.0\nbroken line\n").unwrap_err();
        match err {
            SyncError::Format { line_no, .. } => assert_eq!(line_no, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_records("x.md: soon\n").is_err());
        assert!(parse_records(": 1.0\n").is_err());
    }

    #[test]
    fn staleness_rules() {
        let mut ledger = Ledger::new("unused");
        ledger.recorded.insert("a.md".to_string(), 100.0);

        assert!(ledger.is_stale("new.md", 1.0));
        assert!(ledger.is_stale("a.md", 100.5));
        assert!(!ledger.is_stale("a.md", 100.0));
        assert!(!ledger.is_stale("a.md", 99.0));

        ledger.mark_queued("new.md", 1.0);
        assert!(!ledger.is_stale("new.md", 1.0));
        assert_eq!(ledger.recorded_mtime("new.md"), None);
    }

    #[test]
    fn record_appends_and_reloads() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("note.md");
        std::fs::write(&file, "hello").unwrap();
        let path = file.to_string_lossy().replace('\\', "/");
        let ledger_path = tmp.path().join("ledger.txt");

        let mut ledger = Ledger::load(&ledger_path).unwrap();
        ledger.record(std::slice::from_ref(&path)).unwrap();
        ledger.record(std::slice::from_ref(&path)).unwrap();

        let raw = std::fs::read_to_string(&ledger_path).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let reloaded = Ledger::load(&ledger_path).unwrap();
        let expected = file_mtime(&file).unwrap();
        assert_eq!(reloaded.recorded_mtime(&path), Some(expected));
        assert!(!reloaded.is_stale(&path, expected));
    }

    #[test]
    fn record_skips_vanished_files() {
        let tmp = TempDir::new().unwrap();
        let ledger_path = tmp.path().join("ledger.txt");
        let mut ledger = Ledger::new(&ledger_path);
        ledger.record(&["does/not/exist.md".to_string()]).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger_path.exists());
    }

    #[test]
    fn compact_keeps_one_line_per_path() {
        let tmp = TempDir::new().unwrap();
        let ledger_path = tmp.path().join("ledger.txt");
        std::fs::write(&ledger_path, "b.md: 1\na.md: 2\nb.md: 3\n").unwrap();

        let ledger = Ledger::load(&ledger_path).unwrap();
        ledger.compact().unwrap();

        let raw = std::fs::read_to_string(&ledger_path).unwrap();
        assert_eq!(raw, "a.md: 2\nb.md: 3\n");
        assert!(!tmp.path().join("ledger.txt.tmp").exists());
    }

    #[test]
    fn forget_rewrites_without_entry() {
        let tmp = TempDir::new().unwrap();
        let ledger_path = tmp.path().join("ledger.txt");
        std::fs::write(&ledger_path, "a.md: 1\nb.md: 2\n").unwrap();

        let mut ledger = Ledger::load(&ledger_path).unwrap();
        let removed = ledger
            .forget(&["a.md".to_string(), "zzz.md".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(std::fs::read_to_string(&ledger_path).unwrap(), "b.md: 2\n");
    }
}
