//! Lazy archive byte stream over a staged workspace.
//!
//! The workspace moves into a producer task when streaming starts. The
//! producer pumps packager output into a bounded channel and deletes the
//! workspace when it stops, whichever way that happens:
//!
//! - packager finished: stream ends with `None`
//! - packager failed or the consumer stalled: stream ends with one `Err`
//! - consumer dropped or cancelled the stream: packager is aborted

use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{PackError, Result};
use crate::pack::{StagedArchive, Workspace};
use crate::streaming::packager::{ArchiveSource, Packager};

/// Default depth of the producer -> consumer channel
pub const DEFAULT_CHANNEL_DEPTH: usize = 16;

/// Default time the producer waits on a full channel before giving up
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub channel_depth: usize,
    pub stall_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            channel_depth: DEFAULT_CHANNEL_DEPTH,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }
}

/// Single-pass stream of archive bytes.
pub struct ArchiveStream {
    rx: mpsc::Receiver<Bytes>,
    producer: Option<JoinHandle<Result<()>>>,
    workspace_id: Uuid,
    workspace_dir: PathBuf,
    links: usize,
}

impl ArchiveStream {
    /// Take ownership of `staged` and start packaging it.
    pub fn start(
        staged: StagedArchive,
        packager: Arc<dyn Packager>,
        options: StreamOptions,
    ) -> Self {
        let links = staged.link_count();
        let workspace = staged.into_workspace();
        let workspace_id = workspace.id();
        let workspace_dir = workspace.dir().to_path_buf();

        let (tx, rx) = mpsc::channel(options.channel_depth.max(1));
        let producer = tokio::spawn(produce(workspace, packager, tx, options.stall_timeout));

        Self {
            rx,
            producer: Some(producer),
            workspace_id,
            workspace_dir,
            links,
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    /// Directory of the workspace being streamed. Gone once the stream has
    /// ended or been cancelled.
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Number of files in the archive.
    pub fn link_count(&self) -> usize {
        self.links
    }

    /// Stop streaming and wait until the packager is gone and the workspace
    /// deleted.
    pub async fn cancel(mut self) {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.await {
                tracing::warn!("Archive producer failed during cancel: {}", e);
            }
        }
    }
}

impl Stream for ArchiveStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }

        // Channel closed: the producer's result decides how the stream ends
        let Some(producer) = self.producer.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = match Pin::new(producer).poll(cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => return Poll::Pending,
        };
        self.producer = None;
        match outcome {
            Ok(Ok(())) => Poll::Ready(None),
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(e) => Poll::Ready(Some(Err(PackError::Join(e)))),
        }
    }
}

enum Step {
    Chunk(Result<Option<Bytes>>),
    ConsumerGone,
}

async fn produce(
    workspace: Workspace,
    packager: Arc<dyn Packager>,
    tx: mpsc::Sender<Bytes>,
    stall_timeout: Duration,
) -> Result<()> {
    let id = workspace.id();
    let manifest = workspace.manifest_path().to_path_buf();
    // Starting may read the manifest and spawn processes
    let started = match tokio::task::spawn_blocking(move || packager.start(&manifest)).await {
        Ok(started) => started,
        Err(e) => Err(PackError::Join(e)),
    };
    let outcome = match started {
        Ok(mut source) => pump(source.as_mut(), &tx, stall_timeout).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &outcome {
        tracing::warn!(workspace = %id, "Archive streaming failed: {}", e);
    }

    release(workspace).await;
    outcome
}

async fn pump(
    source: &mut dyn ArchiveSource,
    tx: &mpsc::Sender<Bytes>,
    stall_timeout: Duration,
) -> Result<()> {
    let mut bytes_sent = 0u64;

    loop {
        let step = tokio::select! {
            _ = tx.closed() => Step::ConsumerGone,
            chunk = source.next_chunk() => Step::Chunk(chunk),
        };

        let chunk = match step {
            Step::ConsumerGone => {
                tracing::debug!(bytes_sent, "Archive consumer went away, aborting");
                source.abort().await;
                return Ok(());
            }
            Step::Chunk(Ok(Some(chunk))) => chunk,
            Step::Chunk(Ok(None)) => {
                tracing::debug!(bytes_sent, "Archive complete");
                return Ok(());
            }
            Step::Chunk(Err(e)) => {
                source.abort().await;
                return Err(e);
            }
        };

        let len = chunk.len() as u64;
        match tokio::time::timeout(stall_timeout, tx.send(chunk)).await {
            Ok(Ok(())) => bytes_sent += len,
            Ok(Err(_)) => {
                tracing::debug!(bytes_sent, "Archive consumer went away, aborting");
                source.abort().await;
                return Ok(());
            }
            Err(_) => {
                source.abort().await;
                return Err(PackError::Stalled(stall_timeout));
            }
        }
    }
}

async fn release(workspace: Workspace) {
    let dir = workspace.dir().to_path_buf();
    match tokio::task::spawn_blocking(move || workspace.remove()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to remove workspace: {}", e),
        Err(e) => tracing::warn!("Workspace cleanup for {} did not run: {}", dir.display(), e),
    }
}
