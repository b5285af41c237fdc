//! Core data types that flow through a sync run.
//!
//! Everything here is recomputed each run from the filesystem and the
//! configuration; only the ledger is persisted.

use serde::Serialize;

/// A file read and ready to go into a multipart request.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    /// Normalized, forward-slash path. Also used as the multipart file name.
    pub path: String,
    pub mime_type: &'static str,
    pub content: Vec<u8>,
}

/// One HTTP request worth of candidates.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based position within the run.
    pub number: usize,
    pub candidates: Vec<UploadCandidate>,
}

impl Batch {
    pub fn paths(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Update semantics requested from the indexing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMethod {
    /// Full replace of the indexed content for these files (HTTP PUT).
    Replace,
    /// Incremental merge (HTTP PATCH).
    Merge,
}

impl UploadMethod {
    pub fn from_force(force_update: bool) -> Self {
        if force_update {
            UploadMethod::Replace
        } else {
            UploadMethod::Merge
        }
    }

    pub fn http_verb(&self) -> &'static str {
        match self {
            UploadMethod::Replace => "PUT",
            UploadMethod::Merge => "PATCH",
        }
    }
}

/// What the indexing service said about one batch.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Totals for one run, emitted with the completion event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub discovered: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub dry_run: bool,
}
