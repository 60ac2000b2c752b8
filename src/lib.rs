//! Stream OCR task output as a single archive.
//!
//! A request names tasks (optionally narrowed to some file ids). The files
//! they produced are resolved to physical paths, deduplicated, given
//! collision-free names, linked into a per-request scratch workspace after a
//! permission check, and packed by a streaming packager. The workspace is
//! removed whatever way the request ends.

pub mod config;
pub mod download;
pub mod error;
pub mod model;
pub mod pack;
pub mod share;
pub mod store;
pub mod streaming;

pub use config::Settings;
pub use download::{DownloadOutcome, Downloader};
pub use error::{PackError, Result};
pub use model::{Condition, ConditionKind, FileRecord, Identity, TaskRequest, UserType};
