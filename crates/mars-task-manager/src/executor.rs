use async_trait::async_trait;
use mars_graph_analyzer::Subtask;

/// Runs one subtask's fused chunk graph to completion. The real dataframe/tensor operator
/// library is explicitly out of scope (§1); this seam is what a worker actor calls into once it
/// has a subtask dispatched to it.
#[async_trait]
pub trait SubtaskExecutor: Send + Sync {
    async fn execute(&self, subtask: &Subtask) -> anyhow::Result<()>;
}
