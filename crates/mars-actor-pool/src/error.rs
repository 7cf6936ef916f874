use thiserror::Error;

use crate::{address::ProcessIndex, allocation::AllocationStrategy};

#[derive(Debug, Error)]
pub enum ActorPoolError {
    #[error("actor {0} does not exist")]
    ActorNotExist(String),
    #[error("failed to send message to actor {0}: {1}")]
    SendMessageFailed(String, String),
    #[error("subpool {0} failed to start: {1}")]
    SubPoolStartFailed(ProcessIndex, String),
    #[error("subpool {0} is not alive")]
    SubPoolDead(ProcessIndex),
    #[error("no candidate process for allocation strategy {0:?}")]
    NoCandidateProcess(AllocationStrategy),
    #[error("unknown actor type {0:?}; register it with MainActorPool::register_actor_type first")]
    UnknownActorType(String),
    #[error("pool is shutting down")]
    PoolClosed,
}
