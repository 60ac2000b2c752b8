//! Archive producers.
//!
//! A [`Packager`] turns a manifest of staged links into archive bytes. The
//! subprocess variant pipes the manifest into an external tool (`zip -jq0@ -`
//! by default); the tar variant encodes in-process on a blocking worker.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PackError, Result};
use crate::pack::read_manifest;

/// Read size for packager output (4KB)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Depth of the channel between the tar worker and its reader
const TAR_CHANNEL_SIZE: usize = 4;

/// Running archive producer.
#[async_trait]
pub trait ArchiveSource: Send {
    /// Next block of archive bytes, `Ok(None)` once the archive is complete.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Stop producing and wait for the producer to go away.
    async fn abort(&mut self);
}

/// Starts an [`ArchiveSource`] over a finished manifest.
///
/// `start` runs on a blocking worker and may do blocking I/O, but must be
/// called from within a tokio runtime.
pub trait Packager: Send + Sync {
    fn start(&self, manifest: &Path) -> Result<Box<dyn ArchiveSource>>;
}

// =============================================================================
// Subprocess packager
// =============================================================================

/// Runs `program args…` with the manifest on stdin and reads the archive from
/// stdout.
#[derive(Debug, Clone)]
pub struct CommandPackager {
    program: PathBuf,
    args: Vec<String>,
    chunk_size: usize,
}

impl CommandPackager {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// `zip` storing entries uncompressed with junked paths, names from stdin.
    pub fn zip() -> Self {
        Self::new(
            "/usr/local/sbin/zip",
            vec!["-jq0@".to_string(), "-".to_string()],
        )
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Packager for CommandPackager {
    fn start(&self, manifest: &Path) -> Result<Box<dyn ArchiveSource>> {
        let input = std::fs::File::open(manifest).map_err(|e| PackError::io(manifest, e))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PackError::Packager(format!(
                    "Failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PackError::Packager("Failed to open packager stdout".to_string()))?;

        tracing::debug!(program = %self.program.display(), "Started packager");

        Ok(Box::new(CommandSource {
            program: self.program.clone(),
            child,
            stdout,
            buf: vec![0u8; self.chunk_size],
            finished: false,
        }))
    }
}

struct CommandSource {
    program: PathBuf,
    child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
    finished: bool,
}

#[async_trait]
impl ArchiveSource for CommandSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let n = self
            .stdout
            .read(&mut self.buf)
            .await
            .map_err(|e| PackError::Packager(format!("Failed to read packager output: {}", e)))?;
        if n > 0 {
            return Ok(Some(Bytes::copy_from_slice(&self.buf[..n])));
        }

        // EOF: the archive is only complete if the process exited cleanly
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| PackError::Packager(format!("Failed to wait for packager: {}", e)))?;
        self.finished = true;
        if !status.success() {
            return Err(PackError::Packager(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        Ok(None)
    }

    async fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill packager {}: {}", self.program.display(), e);
        }
    }
}

// =============================================================================
// Native tar packager
// =============================================================================

/// Encodes a ustar archive in-process. Entries are named by the link's file
/// name and hold the content of the file the link points at.
#[derive(Debug, Clone)]
pub struct TarPackager {
    chunk_size: usize,
}

impl TarPackager {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for TarPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for TarPackager {
    fn start(&self, manifest: &Path) -> Result<Box<dyn ArchiveSource>> {
        let manifest = manifest.to_path_buf();
        let (tx, rx) = mpsc::channel(TAR_CHANNEL_SIZE);
        let writer = ChannelWriter {
            tx,
            buf: Vec::with_capacity(self.chunk_size),
            chunk_size: self.chunk_size,
        };

        let handle = tokio::task::spawn_blocking(move || {
            let links = read_manifest(&manifest)?;
            write_tar(links, writer)
        });

        Ok(Box::new(TarSource {
            rx,
            handle: Some(handle),
        }))
    }
}

fn write_tar(links: Vec<PathBuf>, writer: ChannelWriter) -> Result<()> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(true);

    for link in &links {
        let name = link
            .file_name()
            .ok_or_else(|| PackError::Packager(format!("Bad manifest entry {}", link.display())))?;
        builder
            .append_path_with_name(link, name)
            .map_err(|e| PackError::io(link, e))?;
    }

    let mut writer = builder
        .into_inner()
        .map_err(|e| PackError::Packager(format!("Failed to finish tar archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| PackError::Packager(format!("Failed to flush tar archive: {}", e)))?;
    Ok(())
}

/// Blocking `Write` that forwards fixed-size chunks into a channel.
struct ChannelWriter {
    tx: mpsc::Sender<Bytes>,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl ChannelWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(self.chunk_size),
        ));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader went away"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= self.chunk_size {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

struct TarSource {
    rx: mpsc::Receiver<Bytes>,
    handle: Option<JoinHandle<Result<()>>>,
}

#[async_trait]
impl ArchiveSource for TarSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(chunk) = self.rx.recv().await {
            return Ok(Some(chunk));
        }
        match self.handle.take() {
            Some(handle) => handle.await?.map(|()| None),
            None => Ok(None),
        }
    }

    async fn abort(&mut self) {
        // Pending and future sends fail, which ends the worker
        self.rx.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
