//! A minimal directed-acyclic-graph store shared by [`crate::chunk_graph::ChunkGraph`] and the
//! subtask graph in `mars-graph-analyzer`. Modeled on the adjacency-map traversal helper used
//! throughout this codebase's task graphs: nodes are content-addressed, edges are a plain
//! successor/predecessor index, and topological iteration is computed on demand rather than kept
//! incrementally up to date.

use std::hash::Hash;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A DAG over nodes keyed by `K`. Construction never validates acyclicity eagerly; call
/// [`Dag::topological_order`] (which fails on a cycle) when that guarantee is needed.
#[derive(Debug, Clone)]
pub struct Dag<K, V> {
    nodes: IndexMap<K, V>,
    successors: FxHashMap<K, Vec<K>>,
    predecessors: FxHashMap<K, Vec<K>>,
}

impl<K, V> Default for Dag<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            nodes: IndexMap::new(),
            successors: FxHashMap::default(),
            predecessors: FxHashMap::default(),
        }
    }
}

impl<K, V> Dag<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, key: K, value: V) {
        self.successors.entry(key.clone()).or_default();
        self.predecessors.entry(key.clone()).or_default();
        self.nodes.insert(key, value);
    }

    pub fn contains_node(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn add_edge(&mut self, from: K, to: K) {
        self.successors.entry(from.clone()).or_default().push(to.clone());
        self.predecessors.entry(to).or_default().push(from);
    }

    pub fn node(&self, key: &K) -> Option<&V> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &K) -> Option<&mut V> {
        self.nodes.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.nodes.iter()
    }

    pub fn successors(&self, key: &K) -> &[K] {
        self.successors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, key: &K) -> &[K] {
        self.predecessors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with no predecessors (sources), in insertion order.
    pub fn indep_nodes(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys().filter(move |k| self.predecessors(k).is_empty())
    }

    /// Nodes with no successors (sinks), in insertion order.
    pub fn indep_nodes_reverse(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys().filter(move |k| self.successors(k).is_empty())
    }

    /// Kahn's algorithm. Returns `None` if the graph contains a cycle.
    pub fn topological_order(&self) -> Option<Vec<K>> {
        let mut in_degree: FxHashMap<K, usize> = FxHashMap::default();
        for key in self.nodes.keys() {
            in_degree.insert(key.clone(), self.predecessors(key).len());
        }
        let mut queue: Vec<K> = self
            .nodes
            .keys()
            .filter(|k| in_degree[*k] == 0)
            .cloned()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = 0;
        while cursor < queue.len() {
            let key = queue[cursor].clone();
            cursor += 1;
            order.push(key.clone());
            for succ in self.successors(&key) {
                let degree = in_degree.get_mut(succ).expect("successor must be a node");
                *degree -= 1;
                if *degree == 0 {
                    queue.push(succ.clone());
                }
            }
        }
        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }

    /// Whether the graph is acyclic, i.e. a valid DAG.
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }
}

/// Wire shape for a [`Dag`]: nodes in insertion order plus a flat edge list. This is what §6's
/// "adjacency + per-node op-blob" persistence format actually looks like on the wire.
#[derive(Serialize, Deserialize)]
struct DagWire<K, V> {
    nodes: Vec<(K, V)>,
    edges: Vec<(K, K)>,
}

impl<K, V> Serialize for Dag<K, V>
where
    K: Eq + Hash + Clone + Serialize,
    V: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<(K, &V)> = self.nodes.iter().map(|(k, v)| (k.clone(), v)).collect();
        let mut edges = Vec::new();
        for (from, tos) in &self.successors {
            for to in tos {
                edges.push((from.clone(), to.clone()));
            }
        }
        DagWire { nodes, edges }.serialize(serializer)
    }
}

impl<'de, K, V> Deserialize<'de> for Dag<K, V>
where
    K: Eq + Hash + Clone + Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = DagWire::<K, V>::deserialize(deserializer)?;
        let mut dag = Dag::new();
        for (k, v) in wire.nodes {
            dag.add_node(k, v);
        }
        for (from, to) in wire.edges {
            dag.add_edge(from, to);
        }
        Ok(dag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topological_order_respects_edges() {
        let mut dag: Dag<u32, &'static str> = Dag::new();
        dag.add_node(1, "a");
        dag.add_node(2, "b");
        dag.add_node(3, "c");
        dag.add_edge(1, 2);
        dag.add_edge(2, 3);
        let order = dag.topological_order().unwrap();
        let pos = |k: u32| order.iter().position(|x| *x == k).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn detects_cycles() {
        let mut dag: Dag<u32, ()> = Dag::new();
        dag.add_node(1, ());
        dag.add_node(2, ());
        dag.add_edge(1, 2);
        dag.add_edge(2, 1);
        assert!(dag.topological_order().is_none());
        assert!(!dag.is_acyclic());
    }

    #[test]
    fn indep_nodes_are_sources_and_sinks() {
        let mut dag: Dag<u32, ()> = Dag::new();
        dag.add_node(1, ());
        dag.add_node(2, ());
        dag.add_node(3, ());
        dag.add_edge(1, 2);
        dag.add_edge(2, 3);
        assert_eq!(dag.indep_nodes().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(dag.indep_nodes_reverse().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn round_trips_through_json_with_the_same_nodes_and_edges() {
        let mut dag: Dag<u32, String> = Dag::new();
        dag.add_node(1, "a".into());
        dag.add_node(2, "b".into());
        dag.add_node(3, "c".into());
        dag.add_edge(1, 2);
        dag.add_edge(1, 3);

        let json = serde_json::to_string(&dag).unwrap();
        let restored: Dag<u32, String> = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.topological_order(), dag.topological_order());
        assert_eq!(restored.successors(&1), dag.successors(&1));
        assert_eq!(restored.node(&2), dag.node(&2));
    }
}
