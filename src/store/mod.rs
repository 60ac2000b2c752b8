//! Task store: which tasks a user owns and which files they produced.

pub mod json;

use std::collections::HashSet;

use crate::error::Result;
use crate::model::{Condition, FileRecord, Identity, TaskRequest};

pub use json::{JsonTaskStore, StoredTask, TaskStatus};

pub trait TaskStore: Send + Sync {
    /// Subset of `tids` owned by `identity`.
    fn owned_tasks(&self, identity: &Identity, tids: &[String]) -> Result<HashSet<String>>;

    /// Files of a finished task, narrowed by `condition` when given.
    /// Unfinished or unknown tasks yield no files.
    fn files_for_task(&self, tid: &str, condition: Option<&Condition>) -> Result<Vec<FileRecord>>;
}

/// Gather the candidate files for a download request, in request order.
///
/// Requests for tasks the user does not own are dropped. A condition with an
/// empty id list selects nothing.
pub fn collect_files(
    store: &dyn TaskStore,
    requests: &[TaskRequest],
    identity: &Identity,
) -> Result<Vec<FileRecord>> {
    let tids: Vec<String> = requests.iter().map(|r| r.tid.clone()).collect();
    let owned = store.owned_tasks(identity, &tids)?;

    let mut files = Vec::new();
    for request in requests {
        if !owned.contains(&request.tid) {
            tracing::debug!(
                tid = %request.tid,
                user = %identity.username,
                "Task not owned, skipping"
            );
            continue;
        }
        match &request.condition {
            None => files.extend(store.files_for_task(&request.tid, None)?),
            Some(condition) if condition.fids.is_empty() => {}
            Some(condition) => files.extend(store.files_for_task(&request.tid, Some(condition))?),
        }
    }
    Ok(files)
}
