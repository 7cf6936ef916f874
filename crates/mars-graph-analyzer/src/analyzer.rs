//! The `GraphAnalyzer` pipeline: turns a validated [`ChunkGraph`] into a [`SubtaskGraph`],
//! following the five steps from §4.1 -- start selection, band assignment, fusion coloring,
//! shuffle pre-split, and subtask emission.

use std::sync::Arc;

use indexmap::IndexMap;
use mars_chunk_graph::{
    Band, Chunk, ChunkGraph, ChunkKey, LogicKeyGenerator, Op, OpKey, OperandKind, ShuffleFetchType,
    tokenize,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument, warn};

use crate::{
    assigner::{Assigner, Resource},
    config::AnalyzerConfig,
    coloring::{Color, Coloring},
    error::AnalyzerError,
    map_reduce::MapReduceInfo,
    map_reduce_id::MapReduceIdAllocator,
    subtask::{LogicKey, Subtask, SubtaskId},
    subtask_graph::SubtaskGraph,
};

/// Distinguishes a fetch stub's synthetic key from any real chunk key produced by `tokenize`
/// elsewhere; an arbitrary constant is enough since stub keys never need to cross a subtask
/// boundary.
const FETCH_STUB_SALT: u64 = 0x66657463_685f_6b31;

fn fetch_stub_key(input_key: ChunkKey) -> ChunkKey {
    tokenize([input_key, FETCH_STUB_SALT])
}

fn subtask_id_for(session_id: &str, task_id: &str, chunks: &[ChunkKey]) -> SubtaskId {
    use std::hash::{Hash, Hasher};
    let mut sorted = chunks.to_vec();
    sorted.sort_unstable();
    let mut hasher = rustc_hash::FxHasher::default();
    session_id.hash(&mut hasher);
    task_id.hash(&mut hasher);
    sorted.hash(&mut hasher);
    hasher.finish()
}

/// Output of [`GraphAnalyzer::gen_subtask_graph`]: the subtask graph plus the map-reduce
/// bookkeeping keyed by the shuffle-proxy chunk each [`MapReduceInfo`] describes. A consumer
/// that needs `Chunk::analyzer_map_reduce_id` stamped on a given mapper's fused chunk can look
/// its shuffle up here by walking to the mapper's proxy successor -- see DESIGN.md for why the
/// analyzer itself doesn't mutate already-emitted subtasks to do that stamping inline.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOutput {
    pub subtask_graph: SubtaskGraph,
    pub map_reduce_infos: FxHashMap<ChunkKey, MapReduceInfo>,
}

pub struct GraphAnalyzer<'a> {
    chunk_graph: &'a ChunkGraph,
    band_resource: &'a IndexMap<Band, Resource>,
    config: &'a AnalyzerConfig,
    session_id: String,
    task_id: String,
    stage_id: Option<String>,
    map_reduce_ids: &'a MapReduceIdAllocator,
}

impl<'a> GraphAnalyzer<'a> {
    pub fn new(
        chunk_graph: &'a ChunkGraph,
        band_resource: &'a IndexMap<Band, Resource>,
        config: &'a AnalyzerConfig,
        session_id: impl Into<String>,
        task_id: impl Into<String>,
        map_reduce_ids: &'a MapReduceIdAllocator,
    ) -> Self {
        Self {
            chunk_graph,
            band_resource,
            config,
            session_id: session_id.into(),
            task_id: task_id.into(),
            stage_id: None,
            map_reduce_ids,
        }
    }

    pub fn with_stage_id(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }

    #[instrument(skip(self), fields(session_id = %self.session_id, task_id = %self.task_id))]
    pub fn gen_subtask_graph(&self) -> Result<AnalyzerOutput, AnalyzerError> {
        self.chunk_graph.validate()?;

        let mut op_by_key: FxHashMap<OpKey, Arc<Op>> = FxHashMap::default();
        for chunk in self.chunk_graph.iter() {
            op_by_key.entry(chunk.op.key).or_insert_with(|| chunk.op.clone());
        }

        // Step 1: start selection -- one entry per distinct operator among the graph's source
        // chunks, plus any operator flagged for mandatory reassignment wherever it sits.
        let mut seen_ops: FxHashSet<OpKey> = FxHashSet::default();
        let mut start_ops: Vec<OpKey> = Vec::new();
        for chunk_key in self.chunk_graph.iter_indep() {
            let chunk = self.chunk_graph.get(&chunk_key).expect("iter_indep yields real nodes");
            if seen_ops.insert(chunk.op.key) {
                start_ops.push(chunk.op.key);
            }
        }
        let start_ops_set: FxHashSet<OpKey> = start_ops.iter().copied().collect();

        let mut to_assign_ops = start_ops.clone();
        let mut seen_to_assign = seen_ops.clone();
        for chunk in self.chunk_graph.iter() {
            if chunk.op.needs_reassign_worker() && seen_to_assign.insert(chunk.op.key) {
                to_assign_ops.push(chunk.op.key);
            }
        }

        let mut explicit: FxHashMap<OpKey, Band> = FxHashMap::default();
        for &op_key in &to_assign_ops {
            if let Some(op) = op_by_key.get(&op_key) {
                if let Some(band) = op.get_expect_band() {
                    explicit.insert(op_key, band);
                }
            }
        }

        // Step 2: band assignment.
        let assigner = Assigner::new(self.chunk_graph, self.band_resource);
        let mut chunk_to_band = assigner.assign(&to_assign_ops, &explicit)?;
        for chunk in self.chunk_graph.iter() {
            if !start_ops_set.contains(&chunk.op.key) {
                if let Some(band) = chunk.op.get_expect_band() {
                    chunk_to_band.insert(chunk.key, band);
                }
            }
        }

        let has_shuffle = self
            .chunk_graph
            .iter()
            .any(|c| matches!(c.op.kind, OperandKind::MapReduce { .. }));

        // Step 3: fusion coloring.
        let same_color_budget = if has_shuffle && self.config.shuffle_fetch_type == ShuffleFetchType::FetchByIndex {
            Some(1)
        } else {
            self.config.initial_same_color_num
        };

        let topo = self.chunk_graph.topological_iter()?;
        let mut chunk_to_color: FxHashMap<ChunkKey, Color> = FxHashMap::default();
        let mut next_color: u64;
        if self.config.fuse_enabled {
            let mut coloring = Coloring::new(
                self.chunk_graph,
                &chunk_to_band,
                self.config.shuffle_fetch_type,
                same_color_budget,
            );
            chunk_to_color = coloring.color()?;
            next_color = chunk_to_color.values().copied().max().map_or(0, |m| m + 1);
        } else {
            let mut op_color: FxHashMap<OpKey, Color> = FxHashMap::default();
            let mut counter = 0u64;
            for &chunk_key in &topo {
                let chunk = self.chunk_graph.get(&chunk_key).expect("topo yields real nodes");
                if chunk.is_fetch() {
                    continue;
                }
                let color = *op_color.entry(chunk.op.key).or_insert_with(|| {
                    let c = counter;
                    counter += 1;
                    c
                });
                chunk_to_color.insert(chunk_key, color);
            }
            next_color = counter;
        }

        let mut color_to_chunks: FxHashMap<Color, Vec<ChunkKey>> = FxHashMap::default();
        for &chunk_key in &topo {
            if let Some(&color) = chunk_to_color.get(&chunk_key) {
                color_to_chunks.entry(color).or_default().push(chunk_key);
            }
        }

        // Step 4: shuffle pre-split. Under `FetchByIndex`, a shuffle proxy identifies its
        // mappers positionally, so at most one mapper feeding a given proxy may share a color.
        if has_shuffle && self.config.shuffle_fetch_type == ShuffleFetchType::FetchByIndex {
            for &chunk_key in &topo {
                let chunk = self.chunk_graph.get(&chunk_key).expect("topo yields real nodes");
                if !chunk.op.kind.is_shuffle_proxy() {
                    continue;
                }
                for &mapper_key in self.chunk_graph.predecessors(&chunk_key) {
                    let Some(&mapper_color) = chunk_to_color.get(&mapper_key) else { continue };
                    let same_class = color_to_chunks.get(&mapper_color).cloned().unwrap_or_default();
                    let mappers_to_split: Vec<ChunkKey> = same_class
                        .iter()
                        .copied()
                        .filter(|&c| {
                            let cc = self.chunk_graph.get(&c).expect("color class chunk must exist");
                            cc.op.kind.is_mapper()
                                && self.chunk_graph.successors(&c).iter().any(|s| {
                                    self.chunk_graph
                                        .get(s)
                                        .map(|sc| sc.op.kind.is_shuffle_proxy())
                                        .unwrap_or(false)
                                })
                        })
                        .collect();
                    if mappers_to_split.len() > 1 {
                        for mapper in mappers_to_split {
                            if let Some(v) = color_to_chunks.get_mut(&mapper_color) {
                                v.retain(|&c| c != mapper);
                            }
                            let fresh = next_color;
                            next_color += 1;
                            chunk_to_color.insert(mapper, fresh);
                            color_to_chunks.entry(fresh).or_default().push(mapper);
                        }
                    }
                }
            }
        }

        // Step 5: subtask emission, one color class at a time, in a topological order of the
        // *color* DAG. Iterating chunk-level topo order and emitting a class the moment its
        // first member is seen is wrong: a class's topologically-first chunk can have a second,
        // different-colored input that only becomes ready later in chunk topo order (e.g. a
        // diamond join across bands), so that naive order can hit a class before one of its
        // external-input classes has emitted.
        let color_order = Self::topological_color_order(&topo, &chunk_to_color, &color_to_chunks, self.chunk_graph);

        let final_result_chunks = self.chunk_graph.result_chunks_set();
        let mut subtask_graph = SubtaskGraph::new();
        let mut chunk_to_subtask: FxHashMap<ChunkKey, SubtaskId> = FxHashMap::default();
        let mut logic_key_gen = LogicKeyGenerator::new();
        let mut logic_key_counts: FxHashMap<LogicKey, usize> = FxHashMap::default();
        let mut map_reduce_infos: FxHashMap<ChunkKey, MapReduceInfo> = FxHashMap::default();
        let mut emission_order: Vec<SubtaskId> = Vec::new();

        for color in color_order {
            let same_color_chunks = color_to_chunks.get(&color).cloned().unwrap_or_default();
            if same_color_chunks.is_empty() {
                continue;
            }

            let (subtask, input_subtasks, proxy_chunk) = self.gen_subtask_info(
                &same_color_chunks,
                &chunk_to_subtask,
                &chunk_to_band,
                &final_result_chunks,
                &mut logic_key_gen,
                &subtask_graph,
            )?;

            *logic_key_counts.entry(subtask.logic_key).or_insert(0) += 1;
            let subtask_id = subtask.id;
            debug!(subtask_id, chunks = same_color_chunks.len(), "emitted subtask");
            subtask_graph.add_node(subtask);
            emission_order.push(subtask_id);
            for input_subtask in input_subtasks {
                subtask_graph.add_edge(input_subtask, subtask_id);
            }
            for &c in &same_color_chunks {
                chunk_to_subtask.insert(c, subtask_id);
            }
            if let Some(proxy_chunk_key) = proxy_chunk {
                subtask_graph.add_shuffle_proxy_subtask(subtask_id);
                let info = self.gen_map_reduce_info(proxy_chunk_key, &chunk_to_band);
                map_reduce_infos.insert(proxy_chunk_key, info);
            }
        }

        let mut logic_index_cursor: FxHashMap<LogicKey, usize> = FxHashMap::default();
        for id in &emission_order {
            let subtask = subtask_graph.get_mut(id).expect("just inserted");
            let key = subtask.logic_key;
            let idx = logic_index_cursor.entry(key).or_insert(0);
            subtask.logic_index = *idx;
            *idx += 1;
            subtask.logic_parallelism = logic_key_counts[&key];
        }

        if let Some(dir) = &self.config.debug_dump_dir {
            if let Err(error) = crate::dot::write_debug_dump(dir, &self.task_id, &subtask_graph) {
                warn!(%error, "failed to write subtask graph debug dump");
            }
        }

        Ok(AnalyzerOutput { subtask_graph, map_reduce_infos })
    }

    /// Kahn's algorithm over the color-level DAG contracted from `chunk_to_color`: an edge
    /// `a -> b` exists whenever some chunk colored `b` takes an input chunk colored `a`. The
    /// coloring never merges across a real chunk-graph cycle, so this contraction is guaranteed
    /// acyclic. Ties (colors that become ready simultaneously) break on each color's first
    /// occurrence in chunk-level topo order, for a deterministic, close-to-original emission
    /// order.
    fn topological_color_order(
        topo: &[ChunkKey],
        chunk_to_color: &FxHashMap<ChunkKey, Color>,
        color_to_chunks: &FxHashMap<Color, Vec<ChunkKey>>,
        chunk_graph: &ChunkGraph,
    ) -> Vec<Color> {
        use std::{cmp::Reverse, collections::BinaryHeap};

        let mut first_seen: FxHashMap<Color, usize> = FxHashMap::default();
        for (idx, &chunk_key) in topo.iter().enumerate() {
            if let Some(&color) = chunk_to_color.get(&chunk_key) {
                first_seen.entry(color).or_insert(idx);
            }
        }

        let mut predecessors: FxHashMap<Color, FxHashSet<Color>> = FxHashMap::default();
        let mut successors: FxHashMap<Color, FxHashSet<Color>> = FxHashMap::default();
        for (&color, chunks) in color_to_chunks {
            predecessors.entry(color).or_default();
            successors.entry(color).or_default();
            for &chunk_key in chunks {
                let chunk = chunk_graph.get(&chunk_key).expect("color class chunk must exist");
                for &input_key in &chunk.inputs {
                    let Some(&input_color) = chunk_to_color.get(&input_key) else { continue };
                    if input_color == color {
                        continue;
                    }
                    predecessors.entry(color).or_default().insert(input_color);
                    successors.entry(input_color).or_default().insert(color);
                }
            }
        }

        let mut in_degree: FxHashMap<Color, usize> =
            color_to_chunks.keys().map(|&c| (c, predecessors.get(&c).map_or(0, |p| p.len()))).collect();
        let mut heap: BinaryHeap<Reverse<(usize, Color)>> = BinaryHeap::new();
        for (&color, &degree) in &in_degree {
            if degree == 0 {
                heap.push(Reverse((first_seen.get(&color).copied().unwrap_or(usize::MAX), color)));
            }
        }

        let mut order = Vec::with_capacity(color_to_chunks.len());
        while let Some(Reverse((_, color))) = heap.pop() {
            order.push(color);
            if let Some(succs) = successors.get(&color) {
                for &succ in succs {
                    let degree = in_degree.get_mut(&succ).expect("successor is a known color");
                    *degree -= 1;
                    if *degree == 0 {
                        heap.push(Reverse((first_seen.get(&succ).copied().unwrap_or(usize::MAX), succ)));
                    }
                }
            }
        }
        order
    }

    /// Fuses one color class into a single [`Subtask`]: builds the inner chunk graph with fetch
    /// stubs standing in for every out-of-scope input, reconciles per-chunk band/priority/
    /// retryability, and determines the class's depth from its input subtasks' depths.
    #[allow(clippy::too_many_arguments)]
    fn gen_subtask_info(
        &self,
        same_color_chunks: &[ChunkKey],
        chunk_to_subtask: &FxHashMap<ChunkKey, SubtaskId>,
        chunk_to_band: &FxHashMap<ChunkKey, Band>,
        final_result_chunks: &FxHashSet<ChunkKey>,
        logic_key_gen: &mut LogicKeyGenerator,
        subtask_graph: &SubtaskGraph,
    ) -> Result<(Subtask, FxHashSet<SubtaskId>, Option<ChunkKey>), AnalyzerError> {
        let chunks_set: FxHashSet<ChunkKey> = same_color_chunks.iter().copied().collect();
        let mut inner = ChunkGraph::new();
        let mut band: Option<Band> = None;
        let mut bands_specified = false;
        let mut is_virtual = false;
        let mut retryable = true;
        let mut chunk_priority: Option<i64> = None;
        let mut depth: i64 = 0;
        let mut input_subtasks: FxHashSet<SubtaskId> = FxHashSet::default();

        for &chunk_key in same_color_chunks {
            let chunk = self.chunk_graph.get(&chunk_key).expect("color class chunk must exist");

            if let Some(expect_band) = chunk.op.get_expect_band() {
                bands_specified = true;
                match &band {
                    Some(existing) if *existing != expect_band => {
                        return Err(AnalyzerError::InconsistentAffinity {
                            chunk: chunk_key,
                            requested: expect_band,
                            existing: existing.clone(),
                        });
                    }
                    _ => band = Some(expect_band),
                }
            }
            let assigned_band = chunk_to_band
                .get(&chunk_key)
                .ok_or(AnalyzerError::MissingBandAssignment(chunk_key))?;
            match &band {
                None => band = Some(assigned_band.clone()),
                Some(existing) if !bands_specified && existing != assigned_band => {
                    return Err(AnalyzerError::InconsistentBand {
                        chunk: chunk_key,
                        assigned: assigned_band.clone(),
                        existing: existing.clone(),
                    });
                }
                _ => {}
            }

            if chunk.op.kind.is_virtual() {
                if is_virtual {
                    return Err(AnalyzerError::MultipleVirtualOperands(chunk_key));
                }
                is_virtual = true;
            }
            if !chunk.op.retryable {
                retryable = false;
            }
            if let Some(p) = chunk.op.priority {
                match chunk_priority {
                    Some(existing) if existing != p => {
                        return Err(AnalyzerError::InconsistentPriority {
                            chunk: chunk_key,
                            requested: p,
                            existing,
                        });
                    }
                    _ => chunk_priority = Some(p),
                }
            }

            let mut local_inputs = Vec::with_capacity(chunk.inputs.len());
            for &input_key in &chunk.inputs {
                if chunks_set.contains(&input_key) {
                    local_inputs.push(input_key);
                    continue;
                }
                let input_chunk = self.chunk_graph.get(&input_key).expect("input must be a graph node");
                let fetch_key = fetch_stub_key(input_key);
                if !inner.contains(&fetch_key) {
                    let fetch_op = if input_chunk.op.kind.is_shuffle_proxy() {
                        let n_reducers = match input_chunk.op.kind {
                            OperandKind::ShuffleProxy { n_reducers } => n_reducers,
                            _ => unreachable!("checked is_shuffle_proxy above"),
                        };
                        Op::new(
                            fetch_key,
                            OperandKind::FetchShuffle { n_reducers, fetch_type: self.config.shuffle_fetch_type },
                        )
                    } else {
                        Op::fetch(fetch_key)
                    };
                    inner.add_node(Chunk::new(fetch_key, Arc::new(fetch_op), vec![], input_chunk.output_index));
                }
                local_inputs.push(fetch_key);

                let input_subtask = *chunk_to_subtask
                    .get(&input_key)
                    .ok_or(AnalyzerError::MissingInputSubtask(input_key))?;
                input_subtasks.insert(input_subtask);
                let input_depth = subtask_graph
                    .get(&input_subtask)
                    .expect("input subtask was emitted before its dependents")
                    .depth();
                depth = depth.max(input_depth + 1);
            }

            inner.add_node(Chunk::new(chunk_key, chunk.op.clone(), local_inputs, chunk.output_index));
        }

        let mut result_chunks: Vec<ChunkKey> = Vec::new();
        let mut update_meta_chunks: Vec<ChunkKey> = Vec::new();
        for &chunk_key in same_color_chunks {
            let successors = self.chunk_graph.successors(&chunk_key);
            let escapes_class = successors.is_empty() || successors.iter().any(|s| !chunks_set.contains(s));
            if escapes_class {
                result_chunks.push(chunk_key);
            }
            if final_result_chunks.contains(&chunk_key) {
                update_meta_chunks.push(chunk_key);
            }
        }
        inner.set_result_chunks(result_chunks.clone());

        let proxy_chunks: Vec<ChunkKey> = result_chunks
            .iter()
            .copied()
            .filter(|c| self.chunk_graph.get(c).expect("result chunk exists").op.kind.is_shuffle_proxy())
            .collect();
        if proxy_chunks.len() > 1 {
            return Err(AnalyzerError::MultipleShuffleProxyResults);
        }
        let proxy_chunk = proxy_chunks.first().copied();
        let stage_n_outputs = match proxy_chunk {
            Some(c) => match self.chunk_graph.get(&c).expect("checked above").op.kind {
                OperandKind::ShuffleProxy { n_reducers } => n_reducers,
                _ => 1,
            },
            None => 1,
        };

        let logic_key_parts: Vec<u64> = same_color_chunks
            .iter()
            .map(|c| logic_key_gen.get_logic_key(&self.chunk_graph.get(c).expect("chunk exists").op))
            .collect();
        let logic_key = tokenize(logic_key_parts);
        let id = subtask_id_for(&self.session_id, &self.task_id, same_color_chunks);

        let subtask = Subtask {
            id,
            stage_id: self.stage_id.clone(),
            logic_key,
            logic_index: 0,
            logic_parallelism: 1,
            session_id: self.session_id.clone(),
            task_id: self.task_id.clone(),
            chunk_graph: inner,
            expect_bands: band.map(|b| vec![b]),
            bands_specified,
            is_virtual,
            priority: (depth, chunk_priority.unwrap_or(0)),
            retryable,
            update_meta_chunks,
            stage_n_outputs,
            is_shuffle_proxy: proxy_chunk.is_some(),
            extra_config: None,
        };

        Ok((subtask, input_subtasks, proxy_chunk))
    }

    fn gen_map_reduce_info(&self, proxy_chunk_key: ChunkKey, chunk_to_band: &FxHashMap<ChunkKey, Band>) -> MapReduceInfo {
        let mut indexed: Vec<(usize, Band)> = self
            .chunk_graph
            .successors(&proxy_chunk_key)
            .iter()
            .map(|&reducer_key| {
                let reducer = self.chunk_graph.get(&reducer_key).expect("reducer chunk exists");
                let index = reducer.op.kind.reducer_index().unwrap_or(0);
                (index, chunk_to_band.get(&reducer_key).cloned().unwrap_or_else(|| Band::new("unknown", "numa-0")))
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        MapReduceInfo {
            map_reduce_id: self.map_reduce_ids.next_map_reduce_id(),
            reducer_indexes: indexed.iter().map(|(i, _)| *i).collect(),
            reducer_bands: indexed.into_iter().map(|(_, b)| b).collect(),
        }
    }
}
