use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::share::ShareConfigError;

#[derive(Debug, Error)]
pub enum PackError {
    /// Share configuration could not be parsed. Affects the whole request.
    #[error(transparent)]
    ShareConfig(#[from] ShareConfigError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Task store error: {0}")]
    Store(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Packager error: {0}")]
    Packager(String),

    /// The consumer held the archive stream without reading from it.
    #[error("Archive consumer stalled for {0:?}")]
    Stalled(Duration),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PackError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures that only an administrator can fix (malformed share
    /// configuration). Retrying the same request will fail the same way.
    pub fn is_config_error(&self) -> bool {
        matches!(self, PackError::ShareConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
