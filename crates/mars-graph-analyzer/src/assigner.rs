use indexmap::IndexMap;
use mars_chunk_graph::{Band, ChunkGraph, ChunkKey, OpKey};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::AnalyzerError;

/// Capacity available on a band, expressed in arbitrary slots. The core treats this as opaque;
/// a real deployment would derive it from CPU/memory/GPU availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Resource {
    pub slots: u32,
}

impl Resource {
    pub fn new(slots: u32) -> Self {
        Self { slots }
    }
}

/// Maps chunks to bands, honoring operator affinity as a hard constraint and otherwise
/// round-robining start chunks across bands with free resource, with the remainder of the
/// graph inheriting its predecessors' band.
pub struct Assigner<'a> {
    chunk_graph: &'a ChunkGraph,
    band_resource: &'a IndexMap<Band, Resource>,
}

impl<'a> Assigner<'a> {
    pub fn new(chunk_graph: &'a ChunkGraph, band_resource: &'a IndexMap<Band, Resource>) -> Self {
        Self { chunk_graph, band_resource }
    }

    /// `to_assign_ops` are the operator keys whose chunks need a fresh band decision (start
    /// operators plus anything `need_reassign_worker` flagged). `explicit` carries
    /// `expect_band`/`expect_worker` affinities already known for some of those ops -- hard
    /// constraints that bypass round-robin entirely.
    pub fn assign(
        &self,
        to_assign_ops: &[OpKey],
        explicit: &FxHashMap<OpKey, Band>,
    ) -> Result<FxHashMap<ChunkKey, Band>, AnalyzerError> {
        if self.band_resource.is_empty() {
            return Err(AnalyzerError::NoBandsAvailable);
        }

        let mut remaining: FxHashMap<Band, u32> = self
            .band_resource
            .iter()
            .map(|(band, resource)| (band.clone(), resource.slots))
            .collect();
        let bands: Vec<Band> = self.band_resource.keys().cloned().collect();
        let mut round_robin = 0usize;

        let mut op_key_to_chunks: FxHashMap<OpKey, Vec<ChunkKey>> = FxHashMap::default();
        for chunk in self.chunk_graph.iter() {
            op_key_to_chunks.entry(chunk.op.key).or_default().push(chunk.key);
        }

        let mut chunk_to_band: FxHashMap<ChunkKey, Band> = FxHashMap::default();

        for &op_key in to_assign_ops {
            let Some(chunks) = op_key_to_chunks.get(&op_key) else { continue };
            let band = if let Some(explicit_band) = explicit.get(&op_key) {
                explicit_band.clone()
            } else {
                self.pick_band_round_robin(&bands, &mut remaining, &mut round_robin)
            };
            debug!(op_key, %band, "assigned start chunk to band");
            for &chunk_key in chunks {
                chunk_to_band.insert(chunk_key, band.clone());
            }
        }

        // Propagate to the rest of the graph in topological order: a chunk with no assignment
        // yet inherits the band of its first already-assigned predecessor.
        let order = self.chunk_graph.topological_iter()?;
        for chunk_key in order {
            if chunk_to_band.contains_key(&chunk_key) {
                continue;
            }
            let mut inherited = None;
            for pred in self.chunk_graph.predecessors(&chunk_key) {
                if let Some(band) = chunk_to_band.get(pred) {
                    inherited = Some(band.clone());
                    break;
                }
            }
            let band = inherited
                .unwrap_or_else(|| self.pick_band_round_robin(&bands, &mut remaining, &mut round_robin));
            chunk_to_band.insert(chunk_key, band);
        }

        Ok(chunk_to_band)
    }

    fn pick_band_round_robin(
        &self,
        bands: &[Band],
        remaining: &mut FxHashMap<Band, u32>,
        cursor: &mut usize,
    ) -> Band {
        for _ in 0..bands.len() {
            let candidate = &bands[*cursor % bands.len()];
            *cursor += 1;
            if let Some(slots) = remaining.get_mut(candidate) {
                if *slots > 0 {
                    *slots -= 1;
                    return candidate.clone();
                }
            }
        }
        // every band is at capacity: fall back to plain round robin, over capacity is better
        // than failing to schedule.
        let candidate = bands[*cursor % bands.len()].clone();
        *cursor += 1;
        candidate
    }
}
