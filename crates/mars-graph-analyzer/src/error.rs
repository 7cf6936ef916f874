use mars_chunk_graph::{Band, ChunkGraphError, ChunkKey};
use thiserror::Error;

/// All errors the analyzer can raise. Per §4.1/§7, every one of these is fatal: analysis either
/// fully succeeds or the task driver sees a complete failure, never a partial subtask graph.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("input chunk graph is invalid: {0}")]
    InvalidChunkGraph(#[from] ChunkGraphError),

    #[error(
        "chunk {chunk} requests affinity {requested} which conflicts with {existing}, \
         already set by another chunk in the same color class"
    )]
    InconsistentAffinity { chunk: ChunkKey, requested: Band, existing: Band },

    #[error(
        "chunk {chunk} was assigned band {assigned} which conflicts with {existing}, \
         already set by another chunk in the same color class"
    )]
    InconsistentBand { chunk: ChunkKey, assigned: Band, existing: Band },

    #[error("color class containing chunk {0} has more than one virtual operand")]
    MultipleVirtualOperands(ChunkKey),

    #[error(
        "chunk {chunk} has priority {requested} which conflicts with {existing}, \
         already set by another chunk in the same color class"
    )]
    InconsistentPriority { chunk: ChunkKey, requested: i64, existing: i64 },

    #[error("color class produced more than one shuffle-proxy result chunk")]
    MultipleShuffleProxyResults,

    #[error("chunk {0} has no band assignment; the assigner must cover every chunk")]
    MissingBandAssignment(ChunkKey),

    #[error("input chunk {0} was not assigned to any subtask before being referenced")]
    MissingInputSubtask(ChunkKey),

    #[error("band resource map is empty; at least one band is required")]
    NoBandsAvailable,
}
