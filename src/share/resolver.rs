use std::path::PathBuf;

use super::{split_logical, PathResolver, ShareConfigError, ShareTable};
use crate::model::Identity;

/// Resolves share paths against an smb.conf-style file.
///
/// The file is re-read on every call so a configuration edited mid-request is
/// seen (and a broken one reported) immediately.
#[derive(Debug, Clone)]
pub struct ShareResolver {
    config_path: PathBuf,
}

impl ShareResolver {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }
}

impl PathResolver for ShareResolver {
    fn to_physical_path(
        &self,
        logical: &str,
        identity: &Identity,
    ) -> Result<Option<PathBuf>, ShareConfigError> {
        let table = ShareTable::load(&self.config_path).map_err(|e| {
            tracing::error!("Can't parse share configuration: {}", e);
            e
        })?;

        let Some((share_name, relative)) = split_logical(logical) else {
            tracing::debug!(logical, "Malformed logical path");
            return Ok(None);
        };
        let Some(share) = table.get(share_name) else {
            tracing::debug!(logical, share = share_name, "Unknown share");
            return Ok(None);
        };

        Ok(Some(share.physical_path(relative, &identity.username)))
    }
}
