//! Per-request scratch directory.
//!
//! A [`Workspace`] is owned by exactly one download. Dropping it (or calling
//! [`Workspace::remove`]) deletes the directory; the delete runs at most once.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{PackError, Result};

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    manifest: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create `<scratch_root>/<uuid>`. The scratch root is created if needed.
    pub fn create(scratch_root: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_root).map_err(|e| PackError::io(scratch_root, e))?;

        let id = Uuid::new_v4();
        let dir = scratch_root.join(id.to_string());
        // create_dir (not _all) so an existing directory is never adopted
        fs::create_dir(&dir).map_err(|e| PackError::io(&dir, e))?;

        let manifest = dir.join(format!(".{}.lst", Uuid::new_v4()));
        tracing::debug!(workspace = %id, dir = %dir.display(), "Created workspace");

        Ok(Self {
            id,
            dir,
            manifest,
            removed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    /// Open the manifest for writing, truncating any previous content.
    pub fn manifest_writer(&self) -> Result<ManifestWriter> {
        let file = fs::File::create(&self.manifest).map_err(|e| PackError::io(&self.manifest, e))?;
        Ok(ManifestWriter {
            path: self.manifest.clone(),
            out: BufWriter::new(file),
            entries: 0,
        })
    }

    /// Delete the workspace now and report the outcome.
    pub fn remove(mut self) -> Result<()> {
        let dir = self.dir.clone();
        self.delete().map_err(|e| PackError::io(dir, e))
    }

    fn delete(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::debug!(workspace = %self.id, "Removed workspace");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.delete() {
            tracing::warn!(
                "Failed to remove workspace {}: {}",
                self.dir.display(),
                e
            );
        }
    }
}

/// Newline-separated list of staged link paths handed to the packager.
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    out: BufWriter<fs::File>,
    entries: usize,
}

impl ManifestWriter {
    pub fn push(&mut self, link: &Path) -> Result<()> {
        let line = link.to_string_lossy();
        writeln!(self.out, "{}", line).map_err(|e| PackError::io(&self.path, e))?;
        self.entries += 1;
        Ok(())
    }

    /// Flush and close, returning the number of entries written.
    pub fn finish(mut self) -> Result<usize> {
        self.out.flush().map_err(|e| PackError::io(&self.path, e))?;
        Ok(self.entries)
    }
}

/// Read a manifest back into link paths.
pub fn read_manifest(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
