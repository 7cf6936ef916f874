//! Turns a [`mars_chunk_graph::ChunkGraph`] into a [`SubtaskGraph`]: band assignment, fusion
//! coloring, shuffle handling, and subtask emission (§4 of the design). The outer driver lives
//! in [`analyzer::GraphAnalyzer`]; the rest of the modules are the pieces it composes.

pub mod analyzer;
pub mod assigner;
pub mod coloring;
pub mod config;
pub mod dot;
pub mod error;
pub mod map_reduce;
pub mod map_reduce_id;
pub mod subtask;
pub mod subtask_graph;

pub use analyzer::{AnalyzerOutput, GraphAnalyzer};
pub use assigner::{Assigner, Resource};
pub use coloring::{Color, Coloring};
pub use config::AnalyzerConfig;
pub use error::AnalyzerError;
pub use map_reduce::MapReduceInfo;
pub use map_reduce_id::MapReduceIdAllocator;
pub use subtask::{LogicKey, Subtask, SubtaskId};
pub use subtask_graph::SubtaskGraph;
