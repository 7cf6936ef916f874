use crate::address::ProcessIndex;

/// How `create_actor` picks a target process. The main pool resolves this to a concrete
/// [`ProcessIndex`] before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Force creation on the main process itself (supervisor actors: task manager, lifecycle).
    MainPool,
    /// Any subpool, chosen uniformly at random.
    RandomSubPool,
    /// The least-loaded subpool carrying the given label.
    IdleLabel(String),
    /// An explicit process index.
    ProcessIndex(ProcessIndex),
}
