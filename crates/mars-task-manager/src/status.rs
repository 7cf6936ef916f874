use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Terminated,
}

/// `error` carries a display-formatted message rather than the original error type: once a task
/// is terminal, §7 requires the failure (or cancel marker) to be inspectable without holding
/// onto whatever executor-specific error type produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Terminated && !self.cancelled && self.error.is_none()
    }
}
