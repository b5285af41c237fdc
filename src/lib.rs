//! # Index Sync
//!
//! Incrementally uploads notes, PDFs, and images from a set of watched
//! directories to a content-indexing service, skipping files that have not
//! changed since their last successful upload.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ sync paths │──▶│  discover  │──▶│  transform │──▶│ upload (HTTP │
//! │   (file)   │   │ +exclusion │   │  text only │   │  PUT/PATCH)  │
//! └────────────┘   └─────┬──────┘   └────────────┘   └──────┬───────┘
//!                        │ is_stale            record        │
//!                        └──────────▶ ledger ◀───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! index-sync paths add ~/vault ~/papers   # remember sync roots
//! index-sync sync --dry-run               # see what would be sent
//! index-sync sync                         # upload changed files (PATCH)
//! index-sync sync --force                 # replace indexed content (PUT)
//! index-sync ledger show                  # what has been sent, and when
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ledger`] | Persisted path → mtime record |
//! | [`transform`] | Drawing-note content filter |
//! | [`discover`] | Filesystem walk with exclusion pruning |
//! | [`upload`] | MIME typing, batching, HTTP transport |
//! | [`credentials`] | Bearer token providers |
//! | [`sync`] | Run orchestration and background worker |
//! | [`paths`] | Configured sync paths file |
//! | [`progress`] | Event reporting |
//! | [`error`] | Error taxonomy |

pub mod config;
pub mod credentials;
pub mod discover;
pub mod error;
pub mod ledger;
pub mod models;
pub mod paths;
pub mod progress;
pub mod sync;
pub mod transform;
pub mod upload;
