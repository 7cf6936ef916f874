//! Drives a [`SubtaskGraph`] to completion over an [`SubtaskExecutor`] seam, wave by wave in
//! topological order, with cooperative cancellation (§5) and lifecycle release at subtask
//! granularity (see DESIGN.md for why this isn't chunk-granularity refcounting).

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use mars_graph_analyzer::{SubtaskGraph, SubtaskId};
use mars_lifecycle::SessionDecref;
use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::{
    error::TaskManagerError,
    executor::SubtaskExecutor,
    status::{SubtaskStatus, TaskResult, TaskStatus},
};

/// Schedules and runs one task's subtask graph. Each wave is the set of subtasks whose
/// predecessors have all finished; a wave runs concurrently, mirroring how the actor pool would
/// dispatch independent subtasks to idle workers at once.
pub struct TaskManager {
    subtask_graph: SubtaskGraph,
    executor: Arc<dyn SubtaskExecutor>,
    cancelled: Arc<AtomicBool>,
    lifecycle: Option<(Arc<mars_lifecycle::DecrefRunner>, Weak<dyn SessionDecref>)>,
    statuses: DashMap<SubtaskId, SubtaskStatus>,
}

impl TaskManager {
    pub fn new(subtask_graph: SubtaskGraph, executor: Arc<dyn SubtaskExecutor>) -> Result<Self, TaskManagerError> {
        Self::new_with_cancellation(subtask_graph, executor, Arc::new(AtomicBool::new(false)))
    }

    /// Like [`Self::new`], but shares an externally-held cancellation flag instead of minting
    /// one internally -- useful when a caller needs to hand the flag to something (e.g. the
    /// executor itself, or a task registry) before the manager exists.
    pub fn new_with_cancellation(
        subtask_graph: SubtaskGraph,
        executor: Arc<dyn SubtaskExecutor>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Self, TaskManagerError> {
        if !subtask_graph.is_acyclic() {
            return Err(TaskManagerError::CyclicSubtaskGraph);
        }
        let statuses = DashMap::new();
        for subtask in subtask_graph.iter() {
            statuses.insert(subtask.id, SubtaskStatus::Pending);
        }
        Ok(Self { subtask_graph, executor, cancelled, lifecycle: None, statuses })
    }

    /// Opts into releasing each finished subtask's id through a decref runner once all of its
    /// successors have also finished consuming it. Without this, subtasks simply accumulate for
    /// the caller to inspect via [`Self::statuses`] after `run` returns.
    pub fn with_lifecycle(mut self, runner: Arc<mars_lifecycle::DecrefRunner>, session: Weak<dyn SessionDecref>) -> Self {
        self.lifecycle = Some((runner, session));
        self
    }

    /// A shared handle a caller can flip to request cancellation (§5): subtasks already running
    /// finish on their own; only subtasks not yet dispatched are skipped.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[instrument(skip(self), fields(task_id = %task_id, subtasks = self.subtask_graph.len()))]
    pub async fn run(&self, task_id: &str) -> TaskResult {
        let mut remaining: FxHashMap<SubtaskId, usize> = FxHashMap::default();
        for subtask in self.subtask_graph.iter() {
            remaining.insert(subtask.id, self.subtask_graph.predecessors(&subtask.id).len());
        }

        let mut wave: Vec<SubtaskId> =
            remaining.iter().filter(|(_, &count)| count == 0).map(|(&id, _)| id).collect();
        let mut first_error: Option<String> = None;
        let mut cancelled = false;

        while !wave.is_empty() {
            if self.cancelled.load(Ordering::SeqCst) {
                for &id in &wave {
                    self.statuses.insert(id, SubtaskStatus::Cancelled);
                }
                cancelled = true;
                break;
            }

            for &id in &wave {
                self.statuses.insert(id, SubtaskStatus::Running);
            }

            let outcomes = futures::future::join_all(wave.iter().map(|&id| {
                let subtask = self.subtask_graph.get(&id).expect("wave id comes from this graph").clone();
                let executor = self.executor.clone();
                async move { (id, executor.execute(&subtask).await) }
            }))
            .await;

            let mut next_wave = Vec::new();
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        self.statuses.insert(id, SubtaskStatus::Succeeded);
                        self.release_subtask(id);
                    }
                    Err(error) => {
                        self.statuses.insert(id, SubtaskStatus::Failed);
                        warn!(subtask = id, %error, "subtask failed");
                        if first_error.is_none() {
                            first_error = Some(error.to_string());
                        }
                    }
                }
                for &successor in self.subtask_graph.successors(&id) {
                    let counter = remaining.get_mut(&successor).expect("successor tracked in remaining map");
                    *counter -= 1;
                    if *counter == 0 {
                        next_wave.push(successor);
                    }
                }
            }

            if first_error.is_some() {
                break;
            }
            wave = next_wave;
        }

        info!(cancelled, failed = first_error.is_some(), "task terminated");
        TaskResult { task_id: task_id.to_string(), status: TaskStatus::Terminated, cancelled, error: first_error }
    }

    pub fn status_of(&self, id: SubtaskId) -> Option<SubtaskStatus> {
        self.statuses.get(&id).map(|entry| *entry)
    }

    /// Subtask-granularity release: once a subtask has produced its result chunks and is itself
    /// done, nothing downstream needs its inputs anymore from this task's point of view. A real
    /// storage tier would instead refcount the individual result chunks across task boundaries;
    /// that tier is out of scope here, so the subtask id stands in as the decref key.
    fn release_subtask(&self, id: SubtaskId) {
        let Some((runner, session)) = &self.lifecycle else { return };
        let runner = runner.clone();
        let session = session.clone();
        tokio::spawn(async move {
            runner.release(id, session, false).await;
        });
    }
}
