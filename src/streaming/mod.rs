//! Archive streaming.
//!
//! ```text
//! +-------------+     +------------+     +-----------+     +----------+
//! |  Workspace  | --> |  Packager  | --> |  channel  | --> | consumer |
//! | (manifest)  |     | (zip, tar) |     | (bounded) |     | (Stream) |
//! +-------------+     +------------+     +-----------+     +----------+
//! ```
//!
//! The producer side owns the workspace and removes it when packaging ends,
//! fails, or the consumer goes away.

pub mod packager;
pub mod stream;

pub use packager::{ArchiveSource, CommandPackager, Packager, TarPackager, DEFAULT_CHUNK_SIZE};
pub use stream::{ArchiveStream, StreamOptions, DEFAULT_CHANNEL_DEPTH, DEFAULT_STALL_TIMEOUT};
