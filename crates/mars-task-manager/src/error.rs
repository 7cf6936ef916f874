use mars_actor_pool::ActorPoolError;
use mars_graph_analyzer::{AnalyzerError, SubtaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskManagerError {
    #[error("failed to plan subtask graph: {0}")]
    Analysis(#[from] AnalyzerError),
    #[error("actor pool error: {0}")]
    ActorPool(#[from] ActorPoolError),
    #[error("subtask {subtask} failed: {message}")]
    SubtaskFailed { subtask: SubtaskId, message: String },
    #[error("subtask graph contains a cycle; the analyzer should never produce one")]
    CyclicSubtaskGraph,
}
