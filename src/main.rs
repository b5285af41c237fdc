//! # Index Sync CLI (`index-sync`)
//!
//! Uploads new and modified files from the configured sync paths to a
//! content-indexing service.
//!
//! ## Usage
//!
//! ```bash
//! index-sync --config ./config/index-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `index-sync sync` | Upload changed files (PATCH, or PUT with `--force`) |
//! | `index-sync paths list` | Show configured sync paths and whether they exist |
//! | `index-sync paths add <path>...` | Append sync paths |
//! | `index-sync ledger show` | Print recorded upload times |
//! | `index-sync ledger compact` | Rewrite the ledger with one line per path |
//! | `index-sync ledger forget <path>...` | Make files eligible for upload again |

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use index_sync::config::{self, clean_list, Config};
use index_sync::discover::normalize_path;
use index_sync::ledger::Ledger;
use index_sync::models::SyncSummary;
use index_sync::paths;
use index_sync::progress::ProgressMode;
use index_sync::sync::{spawn_sync, SyncOptions};
use index_sync::upload::HttpTransport;

const DEFAULT_CONFIG: &str = "./config/index-sync.toml";

/// Index Sync: incremental uploader for a content-indexing service.
///
/// Every command accepts `--config`. When the default config file does not
/// exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "index-sync",
    about = "Index Sync: upload new and modified notes, PDFs, and images to a content-indexing service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/index-sync.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files changed since their last successful upload.
    ///
    /// Roots come from the sync paths file unless given on the command line.
    Sync {
        /// Roots to sync instead of the configured sync paths.
        roots: Vec<PathBuf>,

        /// Replace the indexed content for these files (HTTP PUT) instead of merging (PATCH).
        #[arg(long)]
        force: bool,

        /// Discover and write the audit log without uploading or recording anything.
        #[arg(long)]
        dry_run: bool,

        /// Allowed file name suffixes (repeatable or comma-separated), e.g. `.md,.pdf`.
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Exclusion substrings (repeatable or comma-separated), e.g. `.obsidian/`.
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        /// Override `upload.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override `upload.batch_delay_secs`.
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Progress output on stderr: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Manage the sync paths file.
    Paths {
        #[command(subcommand)]
        action: PathsAction,
    },

    /// Inspect or maintain the modification ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand)]
enum PathsAction {
    /// List configured sync paths and whether each is a directory, file, or missing.
    List,
    /// Append paths, skipping ones already listed.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Print every recorded path with its modification time.
    Show,
    /// Rewrite the ledger with exactly one line per path.
    Compact,
    /// Remove entries so those files are uploaded again on the next sync.
    Forget {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "index_sync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// An explicit `--config` must exist; the default location may be absent.
fn load(cli_config: Option<&Path>) -> anyhow::Result<Config> {
    match cli_config {
        Some(path) => config::load_config(path),
        None => config::load_or_default(Path::new(DEFAULT_CONFIG)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            roots,
            force,
            dry_run,
            extensions,
            excludes,
            batch_size,
            delay_secs,
            progress,
        } => {
            let mode = ProgressMode::parse(&progress).with_context(|| {
                format!(
                    "Unknown progress mode '{}'. Must be auto, human, json, or off.",
                    progress
                )
            })?;

            if !extensions.is_empty() {
                cfg.filters.extensions = clean_list(&extensions);
            }
            if !excludes.is_empty() {
                cfg.filters.excludes = clean_list(&excludes);
            }
            if let Some(n) = batch_size {
                cfg.upload.batch_size = n;
            }
            if let Some(secs) = delay_secs {
                cfg.upload.batch_delay_secs = secs;
            }
            let cfg = cfg.validate()?;

            let transport = Arc::new(HttpTransport::from_config(&cfg.upload)?);
            let options = SyncOptions {
                force_update: force,
                dry_run,
                roots,
            };

            let reporter = mode.reporter();
            let summary = spawn_sync(cfg, options, transport)
                .drain_into(reporter.as_ref())
                .await?;
            print_summary(&summary);
        }
        Commands::Paths { action } => match action {
            PathsAction::List => {
                paths::list_sync_paths(&cfg.paths.list_file)?;
            }
            PathsAction::Add { paths: new_paths } => {
                let added = paths::add_sync_paths(&cfg.paths.list_file, &new_paths)?;
                println!(
                    "added {} path(s) to {}",
                    added,
                    cfg.paths.list_file.display()
                );
            }
        },
        Commands::Ledger { action } => {
            let mut ledger = Ledger::load(&cfg.ledger.path)?;
            match action {
                LedgerAction::Show => {
                    for (path, mtime) in ledger.entries() {
                        println!("{}  {}", format_mtime(mtime), path);
                    }
                    println!("{} entries", ledger.len());
                }
                LedgerAction::Compact => {
                    ledger.compact()?;
                    println!(
                        "compacted {} to {} entries",
                        ledger.path().display(),
                        ledger.len()
                    );
                }
                LedgerAction::Forget { paths: targets } => {
                    let keys: Vec<String> = targets.iter().map(|p| normalize_path(p)).collect();
                    let removed = ledger.forget(&keys)?;
                    println!("forgot {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
                }
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    if summary.dry_run {
        println!("sync (dry-run)");
        println!("  files to upload: {}", summary.discovered);
        return;
    }
    println!("sync");
    println!("  discovered: {}", summary.discovered);
    println!("  uploaded: {}", summary.uploaded);
    println!("  failed: {}", summary.failed);
    println!(
        "  batches: {} ({} failed)",
        summary.batches_sent, summary.batches_failed
    );
    println!("ok");
}

fn format_mtime(mtime: f64) -> String {
    let secs = mtime.floor() as i64;
    let nanos = ((mtime - mtime.floor()) * 1e9) as u32;
    match Utc.timestamp_opt(secs, nanos).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{:.3}", mtime),
    }
}
