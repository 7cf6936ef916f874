//! The operator model. The original system dispatches on the Python runtime type of an
//! operand (`Fetch`, `VirtualOperand`, `MapReduceOperand`, `ShuffleProxy`, or a concrete
//! user operator class). Rust has no such open-ended runtime type hierarchy to lean on, so this
//! is modeled as the tagged variant the spec's design notes call for: [`OperandKind`], plus a
//! small capability table ([`OperandKind::is_mapper`] and friends) keyed off the variant instead
//! of `isinstance` checks.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::band::Band;

pub type OpKey = u64;

/// Hashes an arbitrary sequence of hashable parts into a stable content-addressed key, the
/// same role `tokenize()` plays in the source system for chunk and logic keys.
pub fn tokenize<T: Hash>(parts: impl IntoIterator<Item = T>) -> u64 {
    let mut hasher = FxHasher::default();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandStage {
    Map,
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShuffleFetchType {
    FetchByKey,
    FetchByIndex,
}

/// The tagged operand kind. `User` covers every concrete dataframe/tensor operator; the core
/// never needs to know more about it than its opcode and logic key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    /// Placeholder standing in for data produced by another subtask.
    Fetch,
    /// Fetch stub reading a shuffle-proxy's partitioned output.
    FetchShuffle {
        n_reducers: usize,
        fetch_type: ShuffleFetchType,
    },
    /// An operand with no chunk-graph-visible data dependency; exactly one may exist per
    /// color class / subtask.
    Virtual,
    /// A mapper or reducer half of a shuffle.
    MapReduce {
        stage: OperandStage,
        reducer_index: usize,
    },
    /// Synthetic chunk marking the map -> reduce boundary.
    ShuffleProxy { n_reducers: usize },
    /// A concrete dataframe/tensor operator, identified only by its opcode for the core's
    /// purposes. `is_mapper` flags operators that behave as shuffle mappers without formally
    /// being staged as `MapReduce{stage: Map, ..}` (the source's `DataFrameIndexAlign` case).
    User { opcode: String, is_mapper: bool },
}

impl OperandKind {
    pub fn is_fetch(&self) -> bool {
        matches!(self, OperandKind::Fetch | OperandKind::FetchShuffle { .. })
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, OperandKind::Virtual)
    }

    pub fn is_shuffle_proxy(&self) -> bool {
        matches!(self, OperandKind::ShuffleProxy { .. })
    }

    pub fn is_mapper(&self) -> bool {
        match self {
            OperandKind::MapReduce { stage: OperandStage::Map, .. } => true,
            OperandKind::User { is_mapper, .. } => *is_mapper,
            _ => false,
        }
    }

    pub fn is_reducer(&self) -> bool {
        matches!(self, OperandKind::MapReduce { stage: OperandStage::Reduce, .. })
    }

    pub fn reducer_index(&self) -> Option<usize> {
        match self {
            OperandKind::MapReduce { stage: OperandStage::Reduce, reducer_index } => {
                Some(*reducer_index)
            }
            _ => None,
        }
    }
}

/// Common fields every operator carries, regardless of [`OperandKind`]. Mirrors the base
/// attributes every `OperandType` subclass inherits in the source (`key`, `priority`,
/// `retryable`, `expect_band`/`expect_worker`, `reassign_worker`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub key: OpKey,
    pub kind: OperandKind,
    pub priority: Option<i64>,
    pub retryable: bool,
    pub expect_band: Option<Band>,
    pub expect_worker: Option<String>,
    pub reassign_worker: bool,
}

impl Op {
    pub fn new(key: OpKey, kind: OperandKind) -> Self {
        Self {
            key,
            kind,
            priority: None,
            retryable: true,
            expect_band: None,
            expect_worker: None,
            reassign_worker: false,
        }
    }

    pub fn fetch(key: OpKey) -> Self {
        Self::new(key, OperandKind::Fetch)
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_expect_band(mut self, band: Band) -> Self {
        self.expect_band = Some(band);
        self
    }

    pub fn with_expect_worker(mut self, worker: impl Into<String>) -> Self {
        self.expect_worker = Some(worker.into());
        self
    }

    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn reassigning_worker(mut self) -> Self {
        self.reassign_worker = true;
        self
    }

    /// `GraphAnalyzer._get_expect_band`: an explicit band wins over a worker-only hint, which
    /// is promoted to the worker's default `"numa-0"` lane.
    pub fn get_expect_band(&self) -> Option<Band> {
        self.expect_band
            .clone()
            .or_else(|| self.expect_worker.as_deref().map(Band::from_worker))
    }

    /// `need_reassign_worker`: reducer-stage operands are always reassignable even when the
    /// operator itself didn't request it, because reducer copies are usually cloned from a
    /// tileable op before the reduce stage is stamped on.
    pub fn needs_reassign_worker(&self) -> bool {
        self.reassign_worker || self.kind.is_reducer()
    }

    pub fn logic_key_part(&self) -> String {
        match &self.kind {
            OperandKind::Fetch => "fetch".to_string(),
            OperandKind::FetchShuffle { .. } => "fetch_shuffle".to_string(),
            OperandKind::Virtual => "virtual".to_string(),
            OperandKind::MapReduce { stage, reducer_index } => {
                format!("map_reduce:{stage:?}:{reducer_index}")
            }
            OperandKind::ShuffleProxy { n_reducers } => format!("shuffle_proxy:{n_reducers}"),
            OperandKind::User { opcode, .. } => opcode.clone(),
        }
    }
}

/// Generates per-operator logic keys, deduplicating opcodes the same way
/// `LogicKeyGenerator` in the source keeps a stable key per (op-class, structural-signature)
/// pair rather than per individual operator instance.
#[derive(Debug, Default)]
pub struct LogicKeyGenerator {
    seen: std::collections::HashMap<String, u64>,
    next: u64,
}

impl LogicKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_logic_key(&mut self, op: &Op) -> u64 {
        let part = op.logic_key_part();
        if let Some(existing) = self.seen.get(&part) {
            *existing
        } else {
            let id = self.next;
            self.next += 1;
            self.seen.insert(part, id);
            id
        }
    }
}
