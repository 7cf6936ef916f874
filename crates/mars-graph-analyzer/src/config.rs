use serde::{Deserialize, Serialize};

use mars_chunk_graph::ShuffleFetchType;

/// Knobs that change how the analyzer colors and dumps a subtask graph. Grounded in the
/// `ActorPoolConfig`-style typed config structs this codebase uses elsewhere: a `serde`-backed
/// struct with builder methods and documented defaults rather than a raw map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Whether fusion coloring runs at all. When `false`, every operator becomes its own color
    /// (all outputs of a multi-output op still share one).
    pub fuse_enabled: bool,
    /// Per-band cap on how many chunks may share one color before a new color is started.
    /// `None` means unbounded.
    pub initial_same_color_num: Option<usize>,
    /// Reserved for broadcaster-aware coloring; currently advisory only (see DESIGN.md).
    pub as_broadcaster_successor_num: Option<usize>,
    pub shuffle_fetch_type: ShuffleFetchType,
    /// When set, `gen_subtask_graph` writes a DOT dump of the emitted subtask graph to this
    /// directory (see §6 task debug dump).
    pub debug_dump_dir: Option<std::path::PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fuse_enabled: true,
            initial_same_color_num: None,
            as_broadcaster_successor_num: None,
            shuffle_fetch_type: ShuffleFetchType::FetchByKey,
            debug_dump_dir: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_fuse_enabled(mut self, enabled: bool) -> Self {
        self.fuse_enabled = enabled;
        self
    }

    pub fn with_initial_same_color_num(mut self, n: usize) -> Self {
        self.initial_same_color_num = Some(n);
        self
    }

    pub fn with_shuffle_fetch_type(mut self, fetch_type: ShuffleFetchType) -> Self {
        self.shuffle_fetch_type = fetch_type;
        self
    }

    pub fn with_debug_dump_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.debug_dump_dir = Some(dir.into());
        self
    }
}
