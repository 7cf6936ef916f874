use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chunk::{Chunk, ChunkKey},
    dag::Dag,
};

#[derive(Debug, Error)]
pub enum ChunkGraphError {
    #[error("chunk graph contains a cycle")]
    Cyclic,
    #[error("result chunk {0} is not a node of the chunk graph")]
    DanglingResult(ChunkKey),
    #[error("chunk {chunk} references input {input} which is not a node of the chunk graph")]
    DanglingInput { chunk: ChunkKey, input: ChunkKey },
}

/// A DAG over [`Chunk`]s with a distinguished set of result chunks (the user-visible outputs
/// of the computation this graph represents).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkGraph {
    dag: Dag<ChunkKey, Chunk>,
    result_chunks: Vec<ChunkKey>,
}

impl ChunkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, chunk: Chunk) {
        for input in &chunk.inputs {
            debug_assert!(
                self.dag.contains_node(input) || *input == chunk.key,
                "inputs must be added before the chunk that depends on them"
            );
        }
        let key = chunk.key;
        let inputs = chunk.inputs.clone();
        self.dag.add_node(key, chunk);
        for input in inputs {
            self.dag.add_edge(input, key);
        }
    }

    pub fn set_result_chunks(&mut self, result_chunks: Vec<ChunkKey>) {
        self.result_chunks = result_chunks;
    }

    pub fn result_chunks(&self) -> &[ChunkKey] {
        &self.result_chunks
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&Chunk> {
        self.dag.node(key)
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.dag.contains_node(key)
    }

    pub fn predecessors(&self, key: &ChunkKey) -> &[ChunkKey] {
        self.dag.predecessors(key)
    }

    pub fn successors(&self, key: &ChunkKey) -> &[ChunkKey] {
        self.dag.successors(key)
    }

    /// Chunks with no predecessors, i.e. sources of the graph.
    pub fn iter_indep(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.dag.indep_nodes().copied()
    }

    /// Chunks with no successors. `reverse` matches the source's
    /// `iter_indep(reverse=True)` naming: it walks the graph from the sink side.
    pub fn iter_indep_reverse(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.dag.indep_nodes_reverse().copied()
    }

    pub fn topological_iter(&self) -> Result<Vec<ChunkKey>, ChunkGraphError> {
        self.dag.topological_order().ok_or(ChunkGraphError::Cyclic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.dag.iter().map(|(_, chunk)| chunk)
    }

    /// Validates the three invariants §3 calls out: acyclic; every input of a node is a node;
    /// result chunks are a subset of nodes (which, combined with acyclicity, guarantees a
    /// topological order exists).
    pub fn validate(&self) -> Result<(), ChunkGraphError> {
        self.topological_iter()?;
        for key in self.dag.keys() {
            let chunk = self.dag.node(key).expect("key came from keys()");
            for input in &chunk.inputs {
                if !self.dag.contains_node(input) {
                    return Err(ChunkGraphError::DanglingInput { chunk: *key, input: *input });
                }
            }
        }
        for result in &self.result_chunks {
            if !self.dag.contains_node(result) {
                return Err(ChunkGraphError::DanglingResult(*result));
            }
        }
        Ok(())
    }

    pub fn result_chunks_set(&self) -> FxHashSet<ChunkKey> {
        self.result_chunks.iter().copied().collect()
    }
}
