use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonic id allocator for map-reduce shuffles. The source keeps this as a
/// hidden class-level `itertools.count()`; per §9's design note, this implementation threads it
/// through as explicit context instead, so tests can run with independent, reproducible
/// counters instead of sharing hidden global state.
#[derive(Debug, Default)]
pub struct MapReduceIdAllocator {
    next: AtomicU64,
}

impl MapReduceIdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    /// Must only be called from the analyzer's own (single-threaded) execution, never
    /// concurrently -- see §5's resource policy on `map_reduce_id`.
    pub fn next_map_reduce_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
