use std::fmt;

use serde::{Deserialize, Serialize};

/// The smallest scheduling unit: a worker address paired with a resource lane
/// (e.g. a NUMA node or a GPU slot) on that worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Band {
    pub worker: String,
    pub lane: String,
}

impl Band {
    pub fn new(worker: impl Into<String>, lane: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            lane: lane.into(),
        }
    }

    /// Mirrors `GraphAnalyzer._to_band`: a bare worker address is promoted to the
    /// default `"numa-0"` lane.
    pub fn from_worker(worker: impl Into<String>) -> Self {
        Self::new(worker, "numa-0")
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker, self.lane)
    }
}
