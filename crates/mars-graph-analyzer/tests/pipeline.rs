use std::sync::Arc;

use indexmap::IndexMap;
use mars_chunk_graph::{Band, Chunk, ChunkGraph, Op, OperandKind, OperandStage, ShuffleFetchType};
use mars_graph_analyzer::{AnalyzerConfig, GraphAnalyzer, MapReduceIdAllocator, Resource};

fn user_chunk(key: u64, op_key: u64, inputs: Vec<u64>) -> Chunk {
    let op = Arc::new(Op::new(op_key, OperandKind::User { opcode: "add".into(), is_mapper: false }));
    Chunk::new(key, op, inputs, 0)
}

fn single_band_resources(n: u32) -> IndexMap<Band, Resource> {
    let mut resources = IndexMap::new();
    resources.insert(Band::new("w1", "numa-0"), Resource::new(n));
    resources
}

#[test]
fn linear_chain_fuses_into_a_single_subtask() {
    let mut graph = ChunkGraph::new();
    graph.add_node(user_chunk(1, 1, vec![]));
    graph.add_node(user_chunk(2, 2, vec![1]));
    graph.add_node(user_chunk(3, 3, vec![2]));
    graph.set_result_chunks(vec![3]);
    graph.validate().unwrap();

    let resources = single_band_resources(4);
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    assert_eq!(output.subtask_graph.len(), 1);
    let subtask = output.subtask_graph.iter().next().unwrap();
    assert_eq!(subtask.chunk_graph.len(), 3);
    assert!(subtask.retryable);
    assert!(!subtask.is_shuffle_proxy);
}

#[test]
fn disjoint_bands_produce_separate_subtasks_linked_by_a_fetch_stub() {
    let mut graph = ChunkGraph::new();
    let op1 = Arc::new(
        Op::new(1, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w1", "numa-0")),
    );
    let op2 = Arc::new(
        Op::new(2, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w2", "numa-0")),
    );
    graph.add_node(Chunk::new(1, op1, vec![], 0));
    graph.add_node(Chunk::new(2, op2, vec![1], 0));
    graph.set_result_chunks(vec![2]);
    graph.validate().unwrap();

    let mut resources = IndexMap::new();
    resources.insert(Band::new("w1", "numa-0"), Resource::new(1));
    resources.insert(Band::new("w2", "numa-0"), Resource::new(1));
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    assert_eq!(output.subtask_graph.len(), 2);
    let downstream = output
        .subtask_graph
        .iter()
        .find(|s| s.chunk_graph.contains(&2))
        .unwrap();
    // the downstream subtask's inner graph has two nodes: the real chunk plus a fetch stub
    // standing in for chunk 1, which lives in the other subtask.
    assert_eq!(downstream.chunk_graph.len(), 2);
    assert!(output
        .subtask_graph
        .predecessors(&downstream.id)
        .iter()
        .any(|p| output.subtask_graph.get(p).unwrap().chunk_graph.contains(&1)));
}

#[test]
fn shuffle_mappers_and_reducers_route_through_a_proxy_subtask() {
    let mut graph = ChunkGraph::new();
    graph.add_node(user_chunk(1, 1, vec![]));

    let mapper_op = Arc::new(Op::new(2, OperandKind::MapReduce { stage: OperandStage::Map, reducer_index: 0 }));
    graph.add_node(Chunk::new(2, mapper_op, vec![1], 0));

    let proxy_op = Arc::new(Op::new(3, OperandKind::ShuffleProxy { n_reducers: 2 }));
    graph.add_node(Chunk::new(3, proxy_op, vec![2], 0));

    let reducer0 = Arc::new(Op::new(4, OperandKind::MapReduce { stage: OperandStage::Reduce, reducer_index: 0 }));
    let reducer1 = Arc::new(Op::new(5, OperandKind::MapReduce { stage: OperandStage::Reduce, reducer_index: 1 }));
    graph.add_node(Chunk::new(4, reducer0, vec![3], 0));
    graph.add_node(Chunk::new(5, reducer1, vec![3], 0));
    graph.set_result_chunks(vec![4, 5]);
    graph.validate().unwrap();

    let resources = single_band_resources(8);
    let config = AnalyzerConfig::default().with_shuffle_fetch_type(ShuffleFetchType::FetchByIndex);
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    assert_eq!(output.subtask_graph.shuffle_proxy_subtasks().count(), 1);
    assert_eq!(output.map_reduce_infos.len(), 1);
    let info = output.map_reduce_infos.values().next().unwrap();
    assert_eq!(info.n_reducers(), 2);
    assert_eq!(info.reducer_indexes, vec![0, 1]);
}

#[test]
fn logic_indexes_are_dense_within_each_logic_key_group() {
    let mut graph = ChunkGraph::new();
    graph.add_node(user_chunk(1, 1, vec![]));
    graph.add_node(user_chunk(2, 2, vec![]));
    graph.add_node(user_chunk(3, 3, vec![1, 2]));
    graph.set_result_chunks(vec![3]);
    graph.validate().unwrap();

    let resources = single_band_resources(8);
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    for (_, group) in output.subtask_graph.logic_key_groups() {
        for (i, subtask) in group.iter().enumerate() {
            assert_eq!(subtask.logic_index, i);
            assert_eq!(subtask.logic_parallelism, group.len());
        }
    }
}

#[test]
fn fusion_disabled_emits_one_subtask_per_operator() {
    let mut graph = ChunkGraph::new();
    graph.add_node(user_chunk(1, 1, vec![]));
    graph.add_node(user_chunk(2, 2, vec![1]));
    graph.set_result_chunks(vec![2]);
    graph.validate().unwrap();

    let resources = single_band_resources(4);
    let config = AnalyzerConfig::default().with_fuse_enabled(false);
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    assert_eq!(output.subtask_graph.len(), 2);
}

#[test]
fn single_chunk_with_explicit_affinity_lands_on_its_requested_band() {
    let mut graph = ChunkGraph::new();
    let op1 = Arc::new(
        Op::new(1, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w2", "numa-0")),
    );
    graph.add_node(Chunk::new(1, op1, vec![], 0));
    graph.set_result_chunks(vec![1]);
    graph.validate().unwrap();

    let mut resources = IndexMap::new();
    resources.insert(Band::new("w1", "numa-0"), Resource::new(4));
    resources.insert(Band::new("w2", "numa-0"), Resource::new(4));
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    let subtask = output.subtask_graph.iter().next().unwrap();
    assert_eq!(subtask.expect_bands, Some(vec![Band::new("w2", "numa-0")]));
    assert!(subtask.bands_specified);
}

#[test]
fn debug_dump_dir_writes_a_dot_file_named_after_the_task() {
    let mut graph = ChunkGraph::new();
    graph.add_node(user_chunk(1, 1, vec![]));
    graph.set_result_chunks(vec![1]);
    graph.validate().unwrap();

    let resources = single_band_resources(1);
    let dir = tempfile::tempdir().unwrap();
    let config = AnalyzerConfig::default().with_debug_dump_dir(dir.path());
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "dump-task", &allocator);
    analyzer.gen_subtask_graph().unwrap();

    let dumped = std::fs::read_to_string(dir.path().join("dump-task.dot")).unwrap();
    assert!(dumped.starts_with("digraph subtasks"));
}

#[test]
fn subtask_graph_round_trips_through_json_with_the_same_shape() {
    let mut graph = ChunkGraph::new();
    let op1 = Arc::new(
        Op::new(1, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w1", "numa-0")),
    );
    let op2 = Arc::new(
        Op::new(2, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w2", "numa-0")),
    );
    graph.add_node(Chunk::new(1, op1, vec![], 0));
    graph.add_node(Chunk::new(2, op2, vec![1], 0));
    graph.set_result_chunks(vec![2]);
    graph.validate().unwrap();

    let mut resources = IndexMap::new();
    resources.insert(Band::new("w1", "numa-0"), Resource::new(1));
    resources.insert(Band::new("w2", "numa-0"), Resource::new(1));
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let original = analyzer.gen_subtask_graph().unwrap().subtask_graph;

    let json = serde_json::to_string(&original).unwrap();
    let restored: mars_graph_analyzer::SubtaskGraph = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.topological_order(), original.topological_order());
    for subtask in original.iter() {
        let restored_subtask = restored.get(&subtask.id).unwrap();
        assert_eq!(restored_subtask.priority, subtask.priority);
        assert_eq!(restored.successors(&subtask.id), original.successors(&subtask.id));
    }
}

#[test]
fn diamond_join_across_bands_does_not_require_chunk_topo_order_to_match_color_order() {
    // chunk 1 (band w1, no inputs), chunk 2 (band w2, no inputs), chunk 3 (band w1,
    // inputs [1, 2]). Fusion colors {1, 3} together (same band, direct edge) and leaves 2 in its
    // own color. Chunk-topo order is [1, 2, 3], so the naive "emit a class at its first chunk"
    // rule would hit color {1, 3} at chunk 1, before chunk 2's class has emitted -- even though
    // chunk 3 needs chunk 2's subtask as an input.
    let mut graph = ChunkGraph::new();
    let op1 = Arc::new(
        Op::new(1, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w1", "numa-0")),
    );
    let op2 = Arc::new(
        Op::new(2, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w2", "numa-0")),
    );
    let op3 = Arc::new(
        Op::new(3, OperandKind::User { opcode: "add".into(), is_mapper: false })
            .with_expect_band(Band::new("w1", "numa-0")),
    );
    graph.add_node(Chunk::new(1, op1, vec![], 0));
    graph.add_node(Chunk::new(2, op2, vec![], 0));
    graph.add_node(Chunk::new(3, op3, vec![1, 2], 0));
    graph.set_result_chunks(vec![3]);
    graph.validate().unwrap();

    let mut resources = IndexMap::new();
    resources.insert(Band::new("w1", "numa-0"), Resource::new(1));
    resources.insert(Band::new("w2", "numa-0"), Resource::new(1));
    let config = AnalyzerConfig::default();
    let allocator = MapReduceIdAllocator::new();
    let analyzer = GraphAnalyzer::new(&graph, &resources, &config, "session-1", "task-1", &allocator);
    let output = analyzer.gen_subtask_graph().unwrap();

    assert_eq!(output.subtask_graph.len(), 2);
    let joined = output.subtask_graph.iter().find(|s| s.chunk_graph.contains(&3)).unwrap();
    // chunk 3's inner graph has chunk 1 (fused in) plus a fetch stub standing in for chunk 2.
    assert_eq!(joined.chunk_graph.len(), 3);
    assert_eq!(output.subtask_graph.predecessors(&joined.id).len(), 1);
}
