//! The actor seam: a minimal message-handling trait plus the reference type clients hold.
//! A real backend (`mars://`, `ray://` per §6) would route `ActorRef::send` over its own
//! transport; this crate dispatches in-process via the owning subpool's command channel.

use async_trait::async_trait;
use mars_chunk_graph::tokenize;
use serde::{Deserialize, Serialize};

use crate::address::{ExternalAddress, ProcessIndex};

pub type ActorId = u64;

pub fn actor_id(label: &str, name: &str) -> ActorId {
    tokenize([label.to_string(), name.to_string()])
}

/// A unit of independently-scheduled state. `on_message` is invoked with exclusive access by
/// its owning pool's single-threaded loop -- no actor ever needs internal locking.
#[async_trait]
pub trait Actor: Send + 'static {
    async fn on_message(&mut self, message: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorRef {
    pub process_index: ProcessIndex,
    pub uid: ActorId,
    pub external_address: ExternalAddress,
}
