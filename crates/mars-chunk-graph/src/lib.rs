//! The immutable chunk DAG model: [`Chunk`], [`ChunkGraph`], [`Op`]/[`OperandKind`], and
//! [`Band`]. This crate has no knowledge of coloring, assignment, or subtasks -- it is the data
//! model the graph analyzer (`mars-graph-analyzer`) operates on.

pub mod band;
pub mod chunk;
pub mod chunk_graph;
pub mod dag;
pub mod op;

pub use band::Band;
pub use chunk::{Chunk, ChunkKey};
pub use chunk_graph::{ChunkGraph, ChunkGraphError};
pub use dag::Dag;
pub use op::{LogicKeyGenerator, Op, OpKey, OperandKind, OperandStage, ShuffleFetchType, tokenize};
