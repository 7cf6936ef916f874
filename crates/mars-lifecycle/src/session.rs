use mars_chunk_graph::ChunkKey;

use crate::error::DecrefError;

/// A synchronous facade over a (normally async) session, narrow enough for the decref runner's
/// single blocking call per item. A real session implementation bridges this to its own async
/// `decref` by blocking on a channel or a runtime handle.
pub trait SessionDecref: Send + Sync {
    fn decref(&self, key: ChunkKey) -> Result<(), DecrefError>;
}
