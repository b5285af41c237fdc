//! Error taxonomy for the sync engine.
//!
//! Fatal errors ([`SyncError::Configuration`], [`SyncError::Format`], ledger
//! [`SyncError::Io`]) abort a run before or during ledger handling. Discovery
//! and transport errors are reported as events and the run continues.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or empty sync paths, or an invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A path could not be read during discovery; the path is skipped.
    #[error("cannot read {path}: {message}")]
    Discovery { path: String, message: String },

    /// The indexing service rejected a batch.
    #[error("batch {batch} failed with status {status}: {body}")]
    Transport { batch: usize, status: u16, body: String },

    /// A ledger line that does not parse. The ledger cannot be trusted past this point.
    #[error("malformed ledger line {line_no}: {line:?} ({reason})")]
    Format {
        line_no: usize,
        line: String,
        reason: String,
    },

    /// The background worker panicked or was torn down.
    #[error("sync worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
