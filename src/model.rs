//! Request and record types shared by the download pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Account type of the requesting user, as known to the share layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Local,
    Domain,
}

/// The user a download is performed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub username: String,
    pub user_type: UserType,
    /// Group names, matched against `@group` entries in share user lists
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(uid: u32, username: impl Into<String>, user_type: UserType) -> Self {
        Self {
            uid,
            username: username.into(),
            user_type,
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Whether a condition keeps or drops the listed file ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Include,
    Exclude,
}

/// Narrows a task to a subset of its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub fids: Vec<String>,
}

impl Condition {
    pub fn matches(&self, fid: &str) -> bool {
        let listed = self.fids.iter().any(|f| f == fid);
        match self.kind {
            ConditionKind::Include => listed,
            ConditionKind::Exclude => !listed,
        }
    }
}

/// One entry of a download request: a task id plus an optional file filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub tid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl TaskRequest {
    pub fn all(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            condition: None,
        }
    }

    pub fn filtered(tid: impl Into<String>, kind: ConditionKind, fids: Vec<String>) -> Self {
        Self {
            tid: tid.into(),
            condition: Some(Condition { kind, fids }),
        }
    }
}

/// One requested file: an OCR output and the source it was produced from.
///
/// Logical paths are share paths (`/Public/scans/a.pdf`). The `*_real_path`
/// fields are filled in by the path resolver; `None` means resolution failed
/// softly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default)]
    pub fid: String,
    pub ocr_path: String,
    pub ocr_name: String,
    pub source_path: String,
    pub source_name: String,
    #[serde(skip)]
    pub ocr_real_path: Option<PathBuf>,
    #[serde(skip)]
    pub source_real_path: Option<PathBuf>,
}

impl FileRecord {
    pub fn new(
        ocr_path: impl Into<String>,
        ocr_name: impl Into<String>,
        source_path: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            ocr_path: ocr_path.into(),
            ocr_name: ocr_name.into(),
            source_path: source_path.into(),
            source_name: source_name.into(),
            ..Default::default()
        }
    }
}
