//! Build the link farm the packager reads from.
//!
//! Staging runs on a blocking worker: permission checks may parse the share
//! configuration and every link is a syscall.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{PackError, Result};
use crate::model::{FileRecord, Identity};
use crate::pack::naming::{
    assign_names, fit_name, with_sequence, DEFAULT_MISSING_SOURCE_MARKER,
};
use crate::pack::workspace::Workspace;
use crate::share::{AccessPolicy, PermissionGate};

/// A planned link inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Where the link goes (inside the workspace)
    pub link_path: PathBuf,
    /// What it points at
    pub physical_path: PathBuf,
    /// Share path checked against the permission gate
    pub logical_path: String,
}

#[derive(Debug, Clone)]
pub struct StageOptions {
    pub scratch_root: PathBuf,
    pub missing_marker: String,
    pub include_source: bool,
}

impl StageOptions {
    pub fn new(scratch_root: impl Into<PathBuf>, include_source: bool) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            missing_marker: DEFAULT_MISSING_SOURCE_MARKER.to_string(),
            include_source,
        }
    }
}

/// A populated workspace with a non-empty manifest, ready for streaming.
#[derive(Debug)]
pub struct StagedArchive {
    workspace: Workspace,
    links: usize,
}

impl StagedArchive {
    pub(crate) fn new(workspace: Workspace, links: usize) -> Self {
        Self { workspace, links }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn link_count(&self) -> usize {
        self.links
    }

    /// Hand the workspace over to whoever streams it.
    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }
}

/// Make a display name usable as a single entry in a flat directory, no
/// longer than a filesystem accepts.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' | '\n' | '\r' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => fit_name(&cleaned),
    }
}

/// Reserve `name` in `used`, adding `(N)` suffixes until it is free.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 1;
    loop {
        let candidate = with_sequence(&name, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Plan one link per OCR file and, with `include_source`, one per distinct
/// physical source. No two planned links share a name.
pub fn plan_links(records: &[FileRecord], dir: &Path, include_source: bool) -> Vec<LinkEntry> {
    let mut used_names = HashSet::new();
    let mut seen_sources: HashSet<&Path> = HashSet::new();
    let mut plan = Vec::with_capacity(records.len() * 2);

    for record in records {
        let Some(ocr_real) = record.ocr_real_path.as_deref() else {
            continue;
        };
        let name = unique_name(sanitize_name(&record.ocr_name), &mut used_names);
        plan.push(LinkEntry {
            link_path: dir.join(name),
            physical_path: ocr_real.to_path_buf(),
            logical_path: record.ocr_path.clone(),
        });

        if !include_source {
            continue;
        }
        if let Some(source_real) = record.source_real_path.as_deref() {
            if seen_sources.insert(source_real) {
                let name = unique_name(sanitize_name(&record.source_name), &mut used_names);
                plan.push(LinkEntry {
                    link_path: dir.join(name),
                    physical_path: source_real.to_path_buf(),
                    logical_path: record.source_path.clone(),
                });
            }
        }
    }

    plan
}

fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }
}

fn permitted(gate: &dyn PermissionGate, logical: &str) -> Result<bool> {
    gate.has_access(logical).map_err(|e| {
        tracing::error!("Download task error, can't parse share configuration: {}", e);
        PackError::from(e)
    })
}

/// Stage `records` into a fresh workspace.
///
/// Records whose OCR file is gone or not permitted are dropped before naming,
/// so collision numbers stay contiguous. Returns `Ok(None)` when nothing
/// survives. On every error path the workspace is deleted before returning.
pub fn stage(
    records: Vec<FileRecord>,
    identity: &Identity,
    access: &dyn AccessPolicy,
    options: &StageOptions,
) -> Result<Option<StagedArchive>> {
    let workspace = Workspace::create(&options.scratch_root)?;

    let gate = access.gate(identity).map_err(|e| {
        tracing::error!("Download task error, can't parse share configuration: {}", e);
        PackError::from(e)
    })?;

    let mut eligible = Vec::with_capacity(records.len());
    for record in records {
        let Some(ocr_real) = record.ocr_real_path.as_deref() else {
            continue;
        };
        if !ocr_real.exists() {
            tracing::debug!(ocr = %ocr_real.display(), "OCR file missing, skipping");
            continue;
        }
        if !permitted(gate.as_ref(), &record.ocr_path)? {
            tracing::debug!(
                ocr_path = %record.ocr_path,
                user = %identity.username,
                "Permission denied, skipping"
            );
            continue;
        }
        eligible.push(record);
    }

    assign_names(&mut eligible, &options.missing_marker, |record| {
        record
            .source_real_path
            .as_deref()
            .is_some_and(Path::exists)
    });

    let plan = plan_links(&eligible, workspace.dir(), options.include_source);

    let mut manifest = workspace.manifest_writer()?;
    for entry in &plan {
        if !entry.physical_path.exists() {
            tracing::debug!(path = %entry.physical_path.display(), "Link target missing, skipping");
            continue;
        }
        if !permitted(gate.as_ref(), &entry.logical_path)? {
            tracing::debug!(logical = %entry.logical_path, "Permission denied, skipping");
            continue;
        }
        make_link(&entry.physical_path, &entry.link_path)
            .map_err(|e| PackError::io(&entry.link_path, e))?;
        manifest.push(&entry.link_path)?;
    }
    let links = manifest.finish()?;

    if links == 0 {
        tracing::info!(workspace = %workspace.id(), "Nothing to package");
        workspace.remove()?;
        return Ok(None);
    }

    tracing::info!(
        workspace = %workspace.id(),
        links,
        planned = plan.len(),
        "Staged download"
    );
    Ok(Some(StagedArchive::new(workspace, links)))
}
