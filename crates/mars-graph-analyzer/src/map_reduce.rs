use mars_chunk_graph::Band;
use serde::{Deserialize, Serialize};

/// Per shuffle-proxy chunk: a freshly allocated map-reduce id, the ordered reducer partition
/// indexes, and the band each reducer landed on. Mapper chunks gain a matching
/// `analyzer_map_reduce_id` pointing back to this record (`Chunk::analyzer_map_reduce_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapReduceInfo {
    pub map_reduce_id: u64,
    pub reducer_indexes: Vec<usize>,
    pub reducer_bands: Vec<Band>,
}

impl MapReduceInfo {
    pub fn n_reducers(&self) -> usize {
        self.reducer_indexes.len()
    }
}
