use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::op::Op;

pub type ChunkKey = u64;

/// A value produced by one output of an operator. Attributes mirror the source `Chunk` type:
/// a stable content-addressed key, the producing operator, ordered input chunk keys, and the
/// output index of this chunk within its operator's outputs (operators can be multi-output,
/// e.g. a shuffle proxy with several reducer partitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub key: ChunkKey,
    pub op: Arc<Op>,
    pub inputs: Vec<ChunkKey>,
    pub output_index: usize,
    /// Extra analyzer-only bookkeeping, e.g. `analyzer_map_reduce_id` stamped on mapper copies
    /// by `_gen_map_reduce_info`.
    pub analyzer_map_reduce_id: Option<u64>,
}

impl Chunk {
    pub fn new(key: ChunkKey, op: Arc<Op>, inputs: Vec<ChunkKey>, output_index: usize) -> Self {
        Self {
            key,
            op,
            inputs,
            output_index,
            analyzer_map_reduce_id: None,
        }
    }

    pub fn is_fetch(&self) -> bool {
        self.op.kind.is_fetch()
    }
}
