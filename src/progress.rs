//! Sync progress and log reporting.
//!
//! The engine never touches presentation state. It emits [`SyncEvent`]s to a
//! [`SyncReporter`], and the controlling context decides how to render them.
//! The background worker uses [`ChannelReporter`] so events cross back to
//! the caller over a channel; the CLI then drains them into a stderr
//! reporter, so stdout stays parseable for scripts.

use std::io::Write;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::SyncSummary;

/// A single event emitted during a sync run.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Informational line (file being uploaded, batch accepted, ...).
    Log(String),
    /// A non-fatal failure: unreadable path, rejected batch.
    Error(String),
    /// `completed` of `total` files processed.
    Progress {
        completed: u64,
        total: u64,
        percent: f64,
    },
    /// Terminal event; nothing follows it.
    Complete(SyncSummary),
}

impl SyncEvent {
    pub fn progress(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        SyncEvent::Progress {
            completed: completed as u64,
            total: total as u64,
            percent,
        }
    }
}

/// Receives sync events. Called from the worker, so implementations must be thread-safe.
pub trait SyncReporter: Send + Sync {
    fn report(&self, event: SyncEvent);
}

/// Human-friendly lines on stderr: "sync  uploading  20 / 25 files (80%)".
pub struct StderrProgress;

impl SyncReporter for StderrProgress {
    fn report(&self, event: SyncEvent) {
        let line = match &event {
            SyncEvent::Log(msg) => format!("{}\n", msg),
            SyncEvent::Error(msg) => format!("error: {}\n", msg),
            SyncEvent::Progress {
                completed,
                total,
                percent,
            } => format!(
                "sync  uploading  {} / {} files ({:.0}%)\n",
                format_number(*completed),
                format_number(*total),
                percent
            ),
            SyncEvent::Complete(summary) => format!(
                "sync  done  {} uploaded, {} failed\n",
                format_number(summary.uploaded as u64),
                format_number(summary.failed as u64)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncReporter for JsonProgress {
    fn report(&self, event: SyncEvent) {
        let obj = match &event {
            SyncEvent::Log(msg) => serde_json::json!({ "event": "log", "message": msg }),
            SyncEvent::Error(msg) => serde_json::json!({ "event": "error", "message": msg }),
            SyncEvent::Progress {
                completed,
                total,
                percent,
            } => serde_json::json!({
                "event": "progress",
                "completed": completed,
                "total": total,
                "percent": percent
            }),
            SyncEvent::Complete(summary) => serde_json::json!({
                "event": "complete",
                "summary": summary
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// Used when progress is off: errors still reach stderr, everything else is dropped.
pub struct ErrorsOnly;

impl SyncReporter for ErrorsOnly {
    fn report(&self, event: SyncEvent) {
        if let SyncEvent::Error(msg) = event {
            let _ = writeln!(std::io::stderr().lock(), "error: {}", msg);
        }
    }
}

/// Forwards events to another context. Send failures (receiver dropped) are ignored.
pub struct ChannelReporter {
    tx: UnboundedSender<SyncEvent>,
}

impl ChannelReporter {
    pub fn new(tx: UnboundedSender<SyncEvent>) -> Self {
        Self { tx }
    }
}

impl SyncReporter for ChannelReporter {
    fn report(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory. Handy for embedding and for tests.
#[derive(Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemoryReporter {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::Log(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl SyncReporter for MemoryReporter {
    fn report(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse the `--progress` flag. `auto` picks human output on a TTY.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncReporter> {
        match self {
            ProgressMode::Off => Box::new(ErrorsOnly),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_percent() {
        match SyncEvent::progress(10, 25) {
            SyncEvent::Progress {
                completed,
                total,
                percent,
            } => {
                assert_eq!((completed, total), (10, 25));
                assert!((percent - 40.0).abs() < 1e-9);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_reporter_forwards_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reporter = ChannelReporter::new(tx);
        reporter.report(SyncEvent::Log("one".into()));
        reporter.report(SyncEvent::Error("two".into()));
        drop(reporter);

        assert!(matches!(rx.try_recv(), Ok(SyncEvent::Log(m)) if m == "one"));
        assert!(matches!(rx.try_recv(), Ok(SyncEvent::Error(m)) if m == "two"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
