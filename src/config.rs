//! Application settings (`config.toml`).
//!
//! ```toml
//! scratch_root = "/share/CACHEDEV1_DATA/.ocrpack/tmp"
//! share_config = "/etc/config/smb.conf"
//! task_store = "/share/CACHEDEV1_DATA/.ocrpack/tasks.json"
//! missing_source_marker = "source_missing"
//! chunk_size = 4096
//! channel_depth = 16
//! stall_timeout_secs = 300
//!
//! [packager]
//! kind = "command"
//! program = "/usr/local/sbin/zip"
//! args = ["-jq0@", "-"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PackError, Result};
use crate::pack::{StageOptions, DEFAULT_MISSING_SOURCE_MARKER};
use crate::streaming::{
    CommandPackager, Packager, StreamOptions, TarPackager, DEFAULT_CHANNEL_DEPTH,
    DEFAULT_CHUNK_SIZE, DEFAULT_STALL_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackagerKind {
    /// External process reading the manifest on stdin
    #[default]
    Command,
    /// Built-in tar encoder
    Tar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerSettings {
    pub kind: PackagerKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for PackagerSettings {
    fn default() -> Self {
        Self {
            kind: PackagerKind::Command,
            program: PathBuf::from("/usr/local/sbin/zip"),
            args: vec!["-jq0@".to_string(), "-".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scratch_root: PathBuf,
    pub share_config: PathBuf,
    pub task_store: PathBuf,
    pub missing_source_marker: String,
    pub chunk_size: usize,
    pub channel_depth: usize,
    pub stall_timeout_secs: u64,
    pub packager: PackagerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("ocrpack"),
            share_config: PathBuf::from("/etc/config/smb.conf"),
            task_store: PathBuf::from("tasks.json"),
            missing_source_marker: DEFAULT_MISSING_SOURCE_MARKER.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT.as_secs(),
            packager: PackagerSettings::default(),
        }
    }
}

impl Settings {
    /// `~/.config/ocrpack/config.toml` (platform config dir).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ocrpack").join("config.toml"))
    }

    /// Load from `path`, or from [`Settings::default_path`] when `None`.
    ///
    /// An explicitly given file must exist; a missing default file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| PackError::io(&path, e))?;
        Self::from_toml(&text)
            .map_err(|e| PackError::Settings(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn stage_options(&self, include_source: bool) -> StageOptions {
        StageOptions {
            scratch_root: self.scratch_root.clone(),
            missing_marker: self.missing_source_marker.clone(),
            include_source,
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            channel_depth: self.channel_depth.max(1),
            stall_timeout: Duration::from_secs(self.stall_timeout_secs.max(1)),
        }
    }

    pub fn build_packager(&self) -> Arc<dyn Packager> {
        match self.packager.kind {
            PackagerKind::Command => Arc::new(
                CommandPackager::new(&self.packager.program, self.packager.args.clone())
                    .chunk_size(self.chunk_size),
            ),
            PackagerKind::Tar => Arc::new(TarPackager::new().chunk_size(self.chunk_size)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_is_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_toml() {
        let settings = Settings::from_toml(
            r#"
scratch_root = "/srv/scratch"
stall_timeout_secs = 10

[packager]
kind = "tar"
"#,
        )
        .unwrap();

        assert_eq!(settings.scratch_root, PathBuf::from("/srv/scratch"));
        assert_eq!(settings.packager.kind, PackagerKind::Tar);
        assert_eq!(settings.packager.program, PathBuf::from("/usr/local/sbin/zip"));
        assert_eq!(settings.stream_options().stall_timeout, Duration::from_secs(10));
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_unknown_packager_kind_rejected() {
        assert!(Settings::from_toml("[packager]\nkind = \"rar\"\n").is_err());
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            Settings::load(Some(&missing)),
            Err(PackError::Io { .. })
        ));
    }

    #[test]
    fn test_load_invalid_file_is_settings_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "chunk_size = \"big\"\n").unwrap();

        assert!(matches!(
            Settings::load(Some(&path)),
            Err(PackError::Settings(_))
        ));
    }

    #[test]
    fn test_stage_options_carry_marker() {
        let settings = Settings {
            missing_source_marker: "gone".to_string(),
            ..Default::default()
        };
        let options = settings.stage_options(true);
        assert_eq!(options.missing_marker, "gone");
        assert!(options.include_source);
    }
}
