//! Turn resolved file records into a staged, collision-free link set.
//!
//! ```text
//! records -> dedup -> (permission/existence filter) -> naming -> links + manifest
//! ```

pub mod dedup;
pub mod naming;
pub mod staging;
pub mod workspace;

pub use dedup::dedup_records;
pub use naming::{assign_names, DEFAULT_MISSING_SOURCE_MARKER};
pub use staging::{plan_links, stage, LinkEntry, StageOptions, StagedArchive};
pub use workspace::{read_manifest, ManifestWriter, Workspace};
