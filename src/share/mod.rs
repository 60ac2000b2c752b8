//! Share layer: logical share paths, physical paths and per-user access.
//!
//! The download pipeline only depends on the [`PathResolver`] and
//! [`AccessPolicy`] traits. The smb.conf-backed implementations in this module
//! are what the binary wires in.

pub mod conf;
pub mod perm;
pub mod resolver;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::Identity;

pub use conf::{Share, ShareTable};
pub use perm::{ShareGate, SharePermissions};
pub use resolver::ShareResolver;

/// Share configuration could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse share configuration {path}:{line}: {reason}")]
pub struct ShareConfigError {
    pub path: PathBuf,
    /// 1-based; 0 when the file itself could not be read
    pub line: usize,
    pub reason: String,
}

impl ShareConfigError {
    pub fn new(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Translates a logical share path into a physical filesystem path.
pub trait PathResolver: Send + Sync {
    /// `Ok(None)` is a soft failure (unknown share, malformed logical path).
    /// `Err` means the share configuration itself is broken.
    fn to_physical_path(
        &self,
        logical: &str,
        identity: &Identity,
    ) -> Result<Option<PathBuf>, ShareConfigError>;
}

/// Per-identity access decision for logical paths.
pub trait PermissionGate: Send {
    fn has_access(&self, logical: &str) -> Result<bool, ShareConfigError>;
}

/// Builds a [`PermissionGate`] bound to one identity.
pub trait AccessPolicy: Send + Sync {
    fn gate(&self, identity: &Identity) -> Result<Box<dyn PermissionGate>, ShareConfigError>;
}

/// Split `/Share/rest/of/path` into the share name and the relative remainder.
///
/// Returns `None` for paths that are not absolute, name no share, or contain
/// `.`/`..` components.
pub(crate) fn split_logical(logical: &str) -> Option<(&str, &Path)> {
    let trimmed = logical.strip_prefix('/')?;
    let (share, rest) = match trimmed.split_once('/') {
        Some((share, rest)) => (share, rest),
        None => (trimmed, ""),
    };
    if share.is_empty() {
        return None;
    }
    if rest
        .split('/')
        .any(|component| component == "." || component == "..")
    {
        return None;
    }
    Some((share, Path::new(rest.trim_start_matches('/'))))
}
