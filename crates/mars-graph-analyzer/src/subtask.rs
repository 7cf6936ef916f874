use mars_chunk_graph::{Band, ChunkGraph, ChunkKey};
use serde::{Deserialize, Serialize};

pub type SubtaskId = u64;
pub type LogicKey = u64;

/// The fused execution unit: a connected color class turned into one schedulable subgraph.
/// Field layout matches the wire shape documented in §6 (subtask persistence format), so
/// `#[derive(Serialize, Deserialize)]` alone gives round-trip persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub stage_id: Option<String>,
    pub logic_key: LogicKey,
    pub logic_index: usize,
    pub logic_parallelism: usize,
    pub session_id: String,
    pub task_id: String,
    /// The fused inner chunk subgraph, with `Fetch`/`FetchShuffle` stubs standing in for
    /// cross-subtask inputs.
    pub chunk_graph: ChunkGraph,
    pub expect_bands: Option<Vec<Band>>,
    pub bands_specified: bool,
    pub is_virtual: bool,
    /// `(depth, op_priority)`; compared lexicographically, higher runs first.
    pub priority: (i64, i64),
    pub retryable: bool,
    pub update_meta_chunks: Vec<ChunkKey>,
    pub stage_n_outputs: usize,
    pub is_shuffle_proxy: bool,
    pub extra_config: Option<serde_json::Value>,
}

impl Subtask {
    pub fn depth(&self) -> i64 {
        self.priority.0
    }
}
