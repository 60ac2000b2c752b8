//! JSON file backed task store.
//!
//! ```json
//! {
//!   "tasks": [
//!     {
//!       "tid": "a0c4354b-058d-40b7-9bd6-0556515b23fd",
//!       "owner": "admin",
//!       "status": "finished",
//!       "files": [
//!         {
//!           "fid": "03642a1a-283e-4172-a4a1-bc2746624a3b",
//!           "ocr_path": "/Public/ocr/report.txt",
//!           "ocr_name": "report.txt",
//!           "source_path": "/Public/scans/report.pdf",
//!           "source_name": "report.pdf"
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::TaskStore;
use crate::error::{PackError, Result};
use crate::model::{Condition, FileRecord, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTask {
    pub tid: String,
    pub owner: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    tasks: Vec<StoredTask>,
}

#[derive(Debug, Default)]
pub struct JsonTaskStore {
    tasks: HashMap<String, StoredTask>,
}

impl JsonTaskStore {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;
        let doc: StoreDocument = serde_json::from_str(&text)
            .map_err(|e| PackError::Store(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_tasks(doc.tasks))
    }

    pub fn from_tasks(tasks: Vec<StoredTask>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.tid.clone(), t)).collect(),
        }
    }
}

impl TaskStore for JsonTaskStore {
    fn owned_tasks(&self, identity: &Identity, tids: &[String]) -> Result<HashSet<String>> {
        Ok(tids
            .iter()
            .filter(|tid| {
                self.tasks
                    .get(tid.as_str())
                    .is_some_and(|task| task.owner == identity.username)
            })
            .cloned()
            .collect())
    }

    fn files_for_task(&self, tid: &str, condition: Option<&Condition>) -> Result<Vec<FileRecord>> {
        let Some(task) = self.tasks.get(tid) else {
            return Ok(Vec::new());
        };
        if task.status != TaskStatus::Finished {
            return Ok(Vec::new());
        }
        Ok(task
            .files
            .iter()
            .filter(|file| condition.map_or(true, |c| c.matches(&file.fid)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserType;
    use tempfile::TempDir;

    #[test]
    fn test_open_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"{"tasks": [{"tid": "t1", "owner": "admin", "status": "finished", "files": [
                {"fid": "f1", "ocr_path": "/P/a.txt", "ocr_name": "a.txt",
                 "source_path": "/P/a.pdf", "source_name": "a.pdf"}
            ]}]}"#,
        )
        .unwrap();

        let store = JsonTaskStore::open(&path).unwrap();
        let admin = Identity::new(0, "admin", UserType::Local);
        let owned = store.owned_tasks(&admin, &["t1".to_string(), "t9".to_string()]).unwrap();
        assert_eq!(owned.len(), 1);

        let files = store.files_for_task("t1", None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source_name, "a.pdf");
        assert!(files[0].ocr_real_path.is_none());
    }

    #[test]
    fn test_open_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(JsonTaskStore::open(&path), Err(PackError::Store(_))));
    }
}
