//! Sync orchestration.
//!
//! Coordinates one run: sync paths → discovery → audit log → batched upload →
//! ledger compaction. [`spawn_sync`] runs the whole pipeline on a background
//! task and hands events back over a channel, so the caller stays responsive
//! and never shares presentation state with the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::discover::{discover, Filters};
use crate::error::{Result, SyncError};
use crate::ledger::Ledger;
use crate::models::SyncSummary;
use crate::paths::load_sync_paths;
use crate::progress::{ChannelReporter, SyncEvent, SyncReporter};
use crate::upload::{UploadOptions, UploadTransport, Uploader};

/// Per-run switches supplied by the controlling interface.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Replace indexed content (PUT) instead of merging (PATCH).
    pub force_update: bool,
    /// Discover and write the audit log, but send and record nothing.
    pub dry_run: bool,
    /// Roots to sync instead of the ones in the paths file.
    pub roots: Vec<PathBuf>,
}

pub async fn run_sync(
    config: &Config,
    options: &SyncOptions,
    transport: &dyn UploadTransport,
    reporter: Arc<dyn SyncReporter>,
) -> Result<SyncSummary> {
    let roots = if options.roots.is_empty() {
        load_sync_paths(&config.paths.list_file)?
    } else {
        options.roots.clone()
    };
    let filters = Filters::from_config(&config.filters);
    let ledger = Ledger::load(&config.ledger.path)?;

    info!(
        roots = roots.len(),
        ledger_entries = ledger.len(),
        "starting sync"
    );
    reporter.report(SyncEvent::Log(format!(
        "Scanning {} sync path(s)...",
        roots.len()
    )));

    let (mut ledger, files) = {
        let reporter = Arc::clone(&reporter);
        tokio::task::spawn_blocking(move || {
            let mut ledger = ledger;
            let files = discover(&roots, &filters, &mut ledger, reporter.as_ref());
            (ledger, files)
        })
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))?
    };

    write_audit_log(&config.paths.audit_log, &files)?;
    debug!(path = %config.paths.audit_log.display(), files = files.len(), "audit log written");

    let mut summary = SyncSummary {
        discovered: files.len(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    if options.dry_run {
        reporter.report(SyncEvent::Log(format!(
            "Dry run: {} file(s) would be uploaded.",
            files.len()
        )));
    } else if files.is_empty() {
        reporter.report(SyncEvent::Log(
            "No new or modified files to upload.".to_string(),
        ));
    } else {
        let upload_options = UploadOptions::from_config(&config.upload, options.force_update);
        summary = Uploader::new(transport, reporter.as_ref(), upload_options)
            .upload_all(&files, &mut ledger)
            .await?;

        if summary.uploaded > 0 && config.ledger.compact_on_finish {
            ledger.compact()?;
        }
    }

    reporter.report(SyncEvent::Complete(summary.clone()));
    Ok(summary)
}

/// Overwrite the audit log with the newline-joined list of queued paths.
pub fn write_audit_log(path: &Path, files: &[String]) -> Result<()> {
    std::fs::write(path, files.join("\n"))?;
    Ok(())
}

/// A sync running in the background.
pub struct SyncHandle {
    pub events: UnboundedReceiver<SyncEvent>,
    pub task: JoinHandle<Result<SyncSummary>>,
}

impl SyncHandle {
    /// Forward every event to `reporter` until the worker finishes, then
    /// return its result.
    pub async fn drain_into(mut self, reporter: &dyn SyncReporter) -> Result<SyncSummary> {
        while let Some(event) = self.events.recv().await {
            reporter.report(event);
        }
        self.task
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }
}

/// Start [`run_sync`] on a background task. Events arrive on the returned
/// handle's channel; the channel closes when the run ends. A run that
/// aborts sends its error as the last event instead of `Complete`.
pub fn spawn_sync(
    config: Config,
    options: SyncOptions,
    transport: Arc<dyn UploadTransport>,
) -> SyncHandle {
    let (tx, events) = unbounded_channel();
    let task = tokio::spawn(async move {
        let reporter: Arc<dyn SyncReporter> = Arc::new(ChannelReporter::new(tx));
        let result = run_sync(&config, &options, transport.as_ref(), Arc::clone(&reporter)).await;
        if let Err(e) = &result {
            reporter.report(SyncEvent::Error(e.to_string()));
        }
        result
    });
    SyncHandle { events, task }
}
