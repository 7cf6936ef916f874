use mars_chunk_graph::Dag;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::subtask::{Subtask, SubtaskId};

/// A DAG over [`Subtask`]s with an auxiliary set of shuffle-proxy subtasks (those whose result
/// is a `ShuffleProxy` chunk -- the map/reduce boundary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskGraph {
    dag: Dag<SubtaskId, Subtask>,
    shuffle_proxy_subtasks: FxHashSet<SubtaskId>,
}

impl SubtaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, subtask: Subtask) {
        self.dag.add_node(subtask.id, subtask);
    }

    pub fn add_edge(&mut self, from: SubtaskId, to: SubtaskId) {
        self.dag.add_edge(from, to);
    }

    pub fn add_shuffle_proxy_subtask(&mut self, id: SubtaskId) {
        self.shuffle_proxy_subtasks.insert(id);
    }

    pub fn shuffle_proxy_subtasks(&self) -> impl Iterator<Item = &SubtaskId> {
        self.shuffle_proxy_subtasks.iter()
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    pub fn get(&self, id: &SubtaskId) -> Option<&Subtask> {
        self.dag.node(id)
    }

    pub fn get_mut(&mut self, id: &SubtaskId) -> Option<&mut Subtask> {
        self.dag.node_mut(id)
    }

    pub fn predecessors(&self, id: &SubtaskId) -> &[SubtaskId] {
        self.dag.predecessors(id)
    }

    pub fn successors(&self, id: &SubtaskId) -> &[SubtaskId] {
        self.dag.successors(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subtask> {
        self.dag.iter().map(|(_, s)| s)
    }

    pub fn topological_order(&self) -> Option<Vec<SubtaskId>> {
        self.dag.topological_order()
    }

    pub fn is_acyclic(&self) -> bool {
        self.dag.is_acyclic()
    }

    /// Groups subtasks by `logic_key`, returning each group in `logic_index` order. Used by
    /// tests checking invariant 3 (§8): logic indexes are dense and `logic_parallelism` matches
    /// the group size.
    pub fn logic_key_groups(&self) -> std::collections::HashMap<u64, Vec<&Subtask>> {
        let mut groups: std::collections::HashMap<u64, Vec<&Subtask>> = std::collections::HashMap::new();
        for subtask in self.iter() {
            groups.entry(subtask.logic_key).or_default().push(subtask);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|s| s.logic_index);
        }
        groups
    }
}
