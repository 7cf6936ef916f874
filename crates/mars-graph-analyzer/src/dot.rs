//! DOT-format debug dump of an emitted subtask graph (§6 task debug dump). Written when
//! [`crate::config::AnalyzerConfig::debug_dump_dir`] is set; otherwise never touched.

use std::path::Path;

use crate::subtask_graph::SubtaskGraph;

pub fn to_dot(graph: &SubtaskGraph) -> String {
    let mut out = String::from("digraph subtasks {\n");
    for subtask in graph.iter() {
        let shape = if subtask.is_shuffle_proxy { "diamond" } else { "box" };
        out.push_str(&format!(
            "  \"{}\" [shape={}, label=\"logic={} idx={}/{} depth={}\"];\n",
            subtask.id,
            shape,
            subtask.logic_key,
            subtask.logic_index,
            subtask.logic_parallelism,
            subtask.depth(),
        ));
    }
    for subtask in graph.iter() {
        for succ in graph.successors(&subtask.id) {
            out.push_str(&format!("  \"{}\" -> \"{}\";\n", subtask.id, succ));
        }
    }
    out.push_str("}\n");
    out
}

pub fn write_debug_dump(dir: &Path, task_id: &str, graph: &SubtaskGraph) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{task_id}.dot"));
    std::fs::write(path, to_dot(graph))
}
