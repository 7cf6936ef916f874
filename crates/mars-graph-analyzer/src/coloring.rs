use mars_chunk_graph::{Band, ChunkGraph, ChunkKey, ShuffleFetchType};
use rustc_hash::FxHashMap;

use crate::error::AnalyzerError;

pub type Color = u64;

/// Assigns a color to each non-fetch chunk such that chunks sharing a color can be fused into
/// one subtask. Implements the three rules from §4.1 step 3:
///
/// (a) fetch chunks are never colored;
/// (b) two chunks share a color only if they're assigned to the same band and neither crosses a
///     virtual-operand boundary;
/// (c) under [`ShuffleFetchType::FetchByIndex`], at most one shuffle mapper per color.
///
/// An optional per-band budget caps how many chunks may join one color before a fresh one
/// starts (`initial_same_color_num`).
pub struct Coloring<'a> {
    chunk_graph: &'a ChunkGraph,
    chunk_to_band: &'a FxHashMap<ChunkKey, Band>,
    shuffle_fetch_type: ShuffleFetchType,
    same_color_budget: Option<usize>,
    next_color: Color,
}

struct ColorState {
    band: Band,
    has_virtual: bool,
    mapper_count: usize,
    size: usize,
}

impl<'a> Coloring<'a> {
    pub fn new(
        chunk_graph: &'a ChunkGraph,
        chunk_to_band: &'a FxHashMap<ChunkKey, Band>,
        shuffle_fetch_type: ShuffleFetchType,
        same_color_budget: Option<usize>,
    ) -> Self {
        Self {
            chunk_graph,
            chunk_to_band,
            shuffle_fetch_type,
            same_color_budget,
            next_color: 0,
        }
    }

    /// Allocates a fresh, previously unused color. Used by the analyzer's shuffle pre-split
    /// step (§4.1 step 4) to peel mapper chunks that ended up sharing a color into their own.
    pub fn next_color(&mut self) -> Color {
        let color = self.next_color;
        self.next_color += 1;
        color
    }

    pub fn color(&mut self) -> Result<FxHashMap<ChunkKey, Color>, AnalyzerError> {
        let order = self.chunk_graph.topological_iter()?;
        let mut chunk_to_color: FxHashMap<ChunkKey, Color> = FxHashMap::default();
        let mut states: FxHashMap<Color, ColorState> = FxHashMap::default();

        for chunk_key in order {
            let chunk = self
                .chunk_graph
                .get(&chunk_key)
                .expect("topological order only yields existing nodes");
            if chunk.is_fetch() {
                continue;
            }
            let band = self
                .chunk_to_band
                .get(&chunk_key)
                .ok_or(AnalyzerError::MissingBandAssignment(chunk_key))?
                .clone();
            let is_virtual = chunk.op.kind.is_virtual();
            let is_mapper = chunk.op.kind.is_mapper();

            let mut chosen = None;
            if !is_virtual {
                for pred in self.chunk_graph.predecessors(&chunk_key) {
                    let Some(&pred_color) = chunk_to_color.get(pred) else { continue };
                    let Some(state) = states.get(&pred_color) else { continue };
                    if state.band != band {
                        continue;
                    }
                    if state.has_virtual {
                        continue;
                    }
                    if self.shuffle_fetch_type == ShuffleFetchType::FetchByIndex
                        && is_mapper
                        && state.mapper_count >= 1
                    {
                        continue;
                    }
                    if let Some(budget) = self.same_color_budget {
                        if state.size >= budget {
                            continue;
                        }
                    }
                    chosen = Some(pred_color);
                    break;
                }
            }

            let color = chosen.unwrap_or_else(|| self.next_color());
            chunk_to_color.insert(chunk_key, color);
            let state = states.entry(color).or_insert_with(|| ColorState {
                band: band.clone(),
                has_virtual: false,
                mapper_count: 0,
                size: 0,
            });
            state.size += 1;
            if is_virtual {
                state.has_virtual = true;
            }
            if is_mapper {
                state.mapper_count += 1;
            }
        }

        Ok(chunk_to_color)
    }
}
