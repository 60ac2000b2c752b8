//! The download operation: task requests in, archive stream out.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::model::{Identity, TaskRequest};
use crate::pack::{dedup_records, stage, StageOptions, StagedArchive};
use crate::share::{AccessPolicy, PathResolver, ShareResolver, SharePermissions};
use crate::store::{collect_files, JsonTaskStore, TaskStore};
use crate::streaming::{ArchiveStream, Packager, StreamOptions};

/// Result of a download request that did not fail outright.
pub enum DownloadOutcome {
    /// Archive bytes are ready to be streamed.
    Ready(ArchiveStream),
    /// The request named no tasks.
    NoFilesRequested,
    /// Nothing the user may read was found.
    NothingToPackage,
}

impl std::fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadOutcome::Ready(stream) => f
                .debug_struct("Ready")
                .field("workspace", &stream.workspace_id())
                .field("links", &stream.link_count())
                .finish(),
            DownloadOutcome::NoFilesRequested => f.write_str("NoFilesRequested"),
            DownloadOutcome::NothingToPackage => f.write_str("NothingToPackage"),
        }
    }
}

/// Wires the collaborators of a download together.
#[derive(Clone)]
pub struct Downloader {
    store: Arc<dyn TaskStore>,
    resolver: Arc<dyn PathResolver>,
    access: Arc<dyn AccessPolicy>,
    packager: Arc<dyn Packager>,
    stage: StageOptions,
    stream: StreamOptions,
}

impl Downloader {
    pub fn new(
        store: Arc<dyn TaskStore>,
        resolver: Arc<dyn PathResolver>,
        access: Arc<dyn AccessPolicy>,
        packager: Arc<dyn Packager>,
        stage: StageOptions,
        stream: StreamOptions,
    ) -> Self {
        Self {
            store,
            resolver,
            access,
            packager,
            stage,
            stream,
        }
    }

    /// Build the smb.conf + JSON store + configured packager stack.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = JsonTaskStore::open(&settings.task_store)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(ShareResolver::new(&settings.share_config)),
            Arc::new(SharePermissions::new(&settings.share_config)),
            settings.build_packager(),
            settings.stage_options(true),
            settings.stream_options(),
        ))
    }

    /// Package the files of `requests` that `identity` may read.
    ///
    /// Share configuration errors are returned as `Err` after any workspace
    /// created for the request has been removed.
    pub async fn download(
        &self,
        requests: Vec<TaskRequest>,
        identity: Identity,
        include_source: bool,
    ) -> Result<DownloadOutcome> {
        if requests.is_empty() {
            return Ok(DownloadOutcome::NoFilesRequested);
        }

        let store = Arc::clone(&self.store);
        let resolver = Arc::clone(&self.resolver);
        let access = Arc::clone(&self.access);
        let options = StageOptions {
            include_source,
            ..self.stage.clone()
        };

        let staged = tokio::task::spawn_blocking(move || -> Result<Option<StagedArchive>> {
            let files = collect_files(store.as_ref(), &requests, &identity)?;
            tracing::debug!(
                candidates = files.len(),
                user = %identity.username,
                uid = identity.uid,
                user_type = ?identity.user_type,
                "Collected files"
            );
            if files.is_empty() {
                return Ok(None);
            }

            let files = dedup_records(files, resolver.as_ref(), &identity).map_err(|e| {
                tracing::error!("Download task error, can't parse share configuration: {}", e);
                e
            })?;
            if files.is_empty() {
                return Ok(None);
            }

            stage(files, &identity, access.as_ref(), &options)
        })
        .await??;

        Ok(match staged {
            Some(staged) => DownloadOutcome::Ready(ArchiveStream::start(
                staged,
                Arc::clone(&self.packager),
                self.stream,
            )),
            None => DownloadOutcome::NothingToPackage,
        })
    }
}
