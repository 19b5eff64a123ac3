//! Window cache error types.

use tessera_config::WindowFitError;
use tessera_voxel::{AuthorityError, ChunkIndex};

/// Errors produced by a [`WindowCache`](crate::WindowCache).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// The window shape does not fit its slot grid.
    #[error("window does not fit the slot grid: {0}")]
    InvalidWindow(#[from] WindowFitError),

    /// The chunk authority failed a subscribe or release.
    #[error("chunk authority failed: {0}")]
    Authority(#[from] AuthorityError),

    /// The authority answered a subscribe with a chunk for another index.
    #[error("authority returned chunk {returned:?} when {requested:?} was subscribed")]
    MismatchedChunk {
        /// Index passed to `subscribe`.
        requested: ChunkIndex,
        /// Index carried by the returned chunk.
        returned: ChunkIndex,
    },
}
