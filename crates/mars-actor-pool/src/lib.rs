//! Main/subpool actor runtime: addressing, subpool lifecycle (spawn/kill/auto-recover), and
//! allocation strategies (§4.2). Subpools are modeled as dedicated tokio tasks rather than OS
//! processes; see DESIGN.md.

pub mod actor;
pub mod address;
pub mod allocation;
pub mod backend;
pub mod config;
pub mod error;
pub mod pool;

pub use actor::{Actor, ActorId, ActorRef, actor_id};
pub use address::{ExternalAddress, InternalAddress, ProcessIndex, derive_internal_address};
pub use allocation::AllocationStrategy;
pub use backend::ActorBackend;
pub use config::{ActorPoolConfig, PoolConfigEntry};
pub use error::ActorPoolError;
pub use pool::{CreateActorMessage, KillPolicy, MainActorPool, MarsBackend, RecoveryMode, SubPoolStatus};
