//! `MainActorPool` / subpool lifecycle, grounded in `oscar/backends/mars/pool.py`. Each pool
//! (main or sub) is modeled as its own single-threaded-cooperative loop -- here a dedicated
//! tokio task reading one command channel -- so no actor ever needs internal locking (§5).
//!
//! This crate simulates subpool "processes" as in-process tokio tasks rather than forking real
//! OS processes; see DESIGN.md for why that's the right tradeoff at this scope. The addressing,
//! recovery-replay, and allocation semantics are otherwise unchanged from the source design.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use rand::seq::IteratorRandom;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, instrument, warn};

use crate::{
    actor::{Actor, ActorId, ActorRef},
    address::{ExternalAddress, ProcessIndex, derive_internal_address},
    allocation::AllocationStrategy,
    backend::ActorBackend,
    config::{ActorPoolConfig, PoolConfigEntry},
    error::ActorPoolError,
};

/// This crate's one registered [`ActorBackend`]: everything here runs in-process under the
/// `mars` scheme.
pub struct MarsBackend;

impl ActorBackend for MarsBackend {
    fn name(&self) -> &'static str {
        "mars"
    }

    fn scheme(&self) -> &'static str {
        "mars"
    }
}

pub type ActorFactory = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPoolStatus {
    Started,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillPolicy {
    GracefulThenForce,
    GracefulOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Actor,
    Process,
    None,
}

#[derive(Debug, Clone)]
pub struct CreateActorMessage {
    pub type_name: String,
    pub uid: ActorId,
    pub init: serde_json::Value,
}

enum PoolCommand {
    CreateActor {
        type_name: String,
        uid: ActorId,
        init: serde_json::Value,
        reply: oneshot::Sender<Result<(), ActorPoolError>>,
    },
    DestroyActor { uid: ActorId, reply: oneshot::Sender<Result<(), ActorPoolError>> },
    HasActor { uid: ActorId, reply: oneshot::Sender<bool> },
    Send {
        uid: ActorId,
        message: serde_json::Value,
        reply: oneshot::Sender<Result<serde_json::Value, ActorPoolError>>,
    },
    Ping { reply: oneshot::Sender<()> },
    Shutdown,
}

async fn run_pool_loop(
    mut rx: mpsc::Receiver<PoolCommand>,
    factories: Arc<DashMap<String, ActorFactory>>,
) {
    let mut actors: HashMap<ActorId, Box<dyn Actor>> = HashMap::new();
    while let Some(command) = rx.recv().await {
        match command {
            PoolCommand::CreateActor { type_name, uid, init: _init, reply } => {
                let result = match factories.get(&type_name) {
                    Some(factory) => {
                        actors.insert(uid, factory());
                        Ok(())
                    }
                    None => Err(ActorPoolError::UnknownActorType(type_name)),
                };
                let _ = reply.send(result);
            }
            PoolCommand::DestroyActor { uid, reply } => {
                let result = if actors.remove(&uid).is_some() {
                    Ok(())
                } else {
                    Err(ActorPoolError::ActorNotExist(uid.to_string()))
                };
                let _ = reply.send(result);
            }
            PoolCommand::HasActor { uid, reply } => {
                let _ = reply.send(actors.contains_key(&uid));
            }
            PoolCommand::Send { uid, message, reply } => {
                let result = match actors.get_mut(&uid) {
                    Some(actor) => actor
                        .on_message(message)
                        .await
                        .map_err(|e| ActorPoolError::SendMessageFailed(uid.to_string(), e.to_string())),
                    None => Err(ActorPoolError::ActorNotExist(uid.to_string())),
                };
                let _ = reply.send(result);
            }
            PoolCommand::Ping { reply } => {
                let _ = reply.send(());
            }
            PoolCommand::Shutdown => break,
        }
    }
}

/// Polls a `JoinHandle` for completion without consuming it, so the caller can still `abort()`
/// it afterward if the deadline passes.
async fn wait_until_finished(task: &tokio::task::JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !task.is_finished() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

struct SubPoolHandle {
    sender: mpsc::Sender<PoolCommand>,
    task: tokio::task::JoinHandle<()>,
    alive: Arc<AtomicBool>,
    entry: PoolConfigEntry,
}

/// The supervisor: owns the address book, every subpool's command channel, and the per-process
/// log of `CreateActorMessage`s needed to replay actor creation after a recovery respawn.
pub struct MainActorPool {
    config: RwLock<ActorPoolConfig>,
    base_dir: PathBuf,
    factories: Arc<DashMap<String, ActorFactory>>,
    subpools: DashMap<ProcessIndex, SubPoolHandle>,
    create_log: DashMap<ProcessIndex, Vec<CreateActorMessage>>,
    loads: DashMap<ProcessIndex, AtomicUsize>,
    kill_policy: KillPolicy,
    closed: AtomicBool,
}

impl MainActorPool {
    pub fn new(config: ActorPoolConfig, base_dir: PathBuf, kill_policy: KillPolicy) -> Self {
        Self {
            config: RwLock::new(config),
            base_dir,
            factories: Arc::new(DashMap::new()),
            subpools: DashMap::new(),
            create_log: DashMap::new(),
            loads: DashMap::new(),
            kill_policy,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether [`Self::shutdown`] has already run; every mutating operation below refuses once
    /// this is set.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Kills every live subpool and marks the pool closed. Once this returns, `create_actor`,
    /// `destroy_actor`, and `send` all fail with `ActorPoolError::PoolClosed` instead of reaching
    /// a subpool.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), ActorPoolError> {
        self.closed.store(true, Ordering::SeqCst);
        let indexes: Vec<ProcessIndex> = self.subpools.iter().map(|entry| *entry.key()).collect();
        for index in indexes {
            self.kill_subpool(index).await?;
        }
        Ok(())
    }

    pub fn register_actor_type(&self, name: impl Into<String>, factory: impl Fn() -> Box<dyn Actor> + Send + Sync + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Starts a subpool process: installs it into `config`, spawns its loop, and posts a
    /// `SubPoolStatus`. Always used for both the initial spawn and any auto-recovery respawn,
    /// matching the source's "always via spawn to avoid state carryover" rule.
    #[instrument(skip(self, entry))]
    pub async fn spawn_subpool(&self, process_index: ProcessIndex, mut entry: PoolConfigEntry) -> SubPoolStatus {
        if self.subpools.contains_key(&process_index) {
            warn!(process_index, "subpool already running at this process index; refusing to spawn over it");
            return SubPoolStatus::Failed;
        }
        if entry.internal_address.is_empty() {
            entry.internal_address = derive_internal_address(&self.base_dir, process_index);
        }
        let (tx, rx) = mpsc::channel(256);
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_pool_loop(rx, self.factories.clone()));

        self.config.write().await.add_pool_conf(process_index, entry.clone());
        self.loads.insert(process_index, AtomicUsize::new(0));
        self.subpools.insert(process_index, SubPoolHandle { sender: tx, task, alive, entry });
        info!(process_index, "subpool started");
        SubPoolStatus::Started
    }

    fn resolve_strategy(&self, strategy: &AllocationStrategy) -> Result<ProcessIndex, ActorPoolError> {
        match strategy {
            AllocationStrategy::MainPool => Ok(0),
            AllocationStrategy::ProcessIndex(index) => {
                if self.subpools.contains_key(index) {
                    Ok(*index)
                } else {
                    Err(ActorPoolError::NoCandidateProcess(strategy.clone()))
                }
            }
            AllocationStrategy::RandomSubPool => self
                .subpools
                .iter()
                .map(|entry| *entry.key())
                .filter(|&i| i != 0)
                .choose(&mut rand::rng())
                .ok_or_else(|| ActorPoolError::NoCandidateProcess(strategy.clone())),
            AllocationStrategy::IdleLabel(label) => self
                .subpools
                .iter()
                .filter(|entry| &entry.value().entry.label == label)
                .map(|entry| *entry.key())
                .min_by_key(|index| self.loads.get(index).map(|l| l.load(Ordering::SeqCst)).unwrap_or(usize::MAX))
                .ok_or_else(|| ActorPoolError::NoCandidateProcess(strategy.clone())),
        }
    }

    fn external_address_for(&self, process_index: ProcessIndex) -> ExternalAddress {
        self.subpools
            .get(&process_index)
            .and_then(|h| h.entry.external_address.first().cloned())
            .unwrap_or_default()
    }

    pub async fn create_actor(
        &self,
        strategy: AllocationStrategy,
        type_name: &str,
        uid: ActorId,
        init: serde_json::Value,
    ) -> Result<ActorRef, ActorPoolError> {
        if self.is_closed() {
            return Err(ActorPoolError::PoolClosed);
        }
        let process_index = self.resolve_strategy(&strategy)?;
        let handle = self.subpools.get(&process_index).ok_or(ActorPoolError::SubPoolDead(process_index))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .sender
            .send(PoolCommand::CreateActor { type_name: type_name.to_string(), uid, init: init.clone(), reply: reply_tx })
            .await
            .map_err(|_| ActorPoolError::SubPoolDead(process_index))?;
        reply_rx.await.map_err(|_| ActorPoolError::SubPoolDead(process_index))??;
        drop(handle);

        self.create_log
            .entry(process_index)
            .or_default()
            .push(CreateActorMessage { type_name: type_name.to_string(), uid, init });
        if let Some(load) = self.loads.get(&process_index) {
            load.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ActorRef { process_index, uid, external_address: self.external_address_for(process_index) })
    }

    /// Builds a locator for an actor already known to live on `process_index`, without creating
    /// or checking it -- an `ActorRef` never owns the actor it names.
    pub fn actor_ref(&self, process_index: ProcessIndex, uid: ActorId) -> ActorRef {
        ActorRef { process_index, uid, external_address: self.external_address_for(process_index) }
    }

    pub async fn destroy_actor(&self, actor_ref: &ActorRef) -> Result<(), ActorPoolError> {
        if self.is_closed() {
            return Err(ActorPoolError::PoolClosed);
        }
        let handle = self.subpools.get(&actor_ref.process_index).ok_or(ActorPoolError::SubPoolDead(actor_ref.process_index))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .sender
            .send(PoolCommand::DestroyActor { uid: actor_ref.uid, reply: reply_tx })
            .await
            .map_err(|_| ActorPoolError::SubPoolDead(actor_ref.process_index))?;
        reply_rx.await.map_err(|_| ActorPoolError::SubPoolDead(actor_ref.process_index))??;
        drop(handle);
        if let Some(load) = self.loads.get(&actor_ref.process_index) {
            load.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub async fn has_actor(&self, actor_ref: &ActorRef) -> bool {
        let Some(handle) = self.subpools.get(&actor_ref.process_index) else { return false };
        let (reply_tx, reply_rx) = oneshot::channel();
        if handle.sender.send(PoolCommand::HasActor { uid: actor_ref.uid, reply: reply_tx }).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn send(&self, actor_ref: &ActorRef, message: serde_json::Value) -> Result<serde_json::Value, ActorPoolError> {
        if self.is_closed() {
            return Err(ActorPoolError::PoolClosed);
        }
        let handle = self.subpools.get(&actor_ref.process_index).ok_or(ActorPoolError::SubPoolDead(actor_ref.process_index))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .sender
            .send(PoolCommand::Send { uid: actor_ref.uid, message, reply: reply_tx })
            .await
            .map_err(|_| ActorPoolError::SubPoolDead(actor_ref.process_index))?;
        drop(handle);
        reply_rx.await.map_err(|_| ActorPoolError::SubPoolDead(actor_ref.process_index))?
    }

    /// `kill_actor`: in this single-process simulation there is no separate "in-flight message"
    /// to forcibly interrupt, so this is destroy_actor under another name, matching the source's
    /// observable behavior for a well-behaved actor.
    pub async fn kill_actor(&self, actor_ref: &ActorRef) -> Result<(), ActorPoolError> {
        self.destroy_actor(actor_ref).await
    }

    pub async fn is_sub_pool_alive(&self, process_index: ProcessIndex) -> bool {
        let Some(handle) = self.subpools.get(&process_index) else { return false };
        if !handle.alive.load(Ordering::SeqCst) {
            return false;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if handle.sender.send(PoolCommand::Ping { reply: reply_tx }).await.is_err() {
            return false;
        }
        tokio::time::timeout(Duration::from_millis(500), reply_rx).await.map(|r| r.is_ok()).unwrap_or(false)
    }

    /// Graceful-then-forced kill: send `Shutdown` and wait up to 3s; under
    /// [`KillPolicy::GracefulThenForce`], abort the task if it hasn't exited after another 5s.
    #[instrument(skip(self))]
    pub async fn kill_subpool(&self, process_index: ProcessIndex) -> Result<(), ActorPoolError> {
        let Some((_, handle)) = self.subpools.remove(&process_index) else {
            return Err(ActorPoolError::SubPoolDead(process_index));
        };
        handle.alive.store(false, Ordering::SeqCst);
        let _ = handle.sender.send(PoolCommand::Shutdown).await;

        if wait_until_finished(&handle.task, Duration::from_secs(3)).await {
            return Ok(());
        }
        if self.kill_policy == KillPolicy::GracefulOnly {
            warn!(process_index, "subpool did not exit within graceful window; coverage-preserving mode leaves it running");
            return Ok(());
        }
        warn!(process_index, "subpool did not exit gracefully within 3s; forcing");
        handle.task.abort();
        wait_until_finished(&handle.task, Duration::from_secs(5)).await;
        Ok(())
    }

    /// Re-spawns a dead subpool and, under [`RecoveryMode::Actor`], replays every
    /// `CreateActorMessage` recorded for it.
    #[instrument(skip(self))]
    pub async fn auto_recover(&self, process_index: ProcessIndex, mode: RecoveryMode) -> Result<(), ActorPoolError> {
        if mode == RecoveryMode::None {
            return Ok(());
        }
        let entry = self
            .config
            .read()
            .await
            .get_pool_config(process_index)
            .cloned()
            .ok_or(ActorPoolError::SubPoolDead(process_index))?;
        let still_alive = self.subpools.get(&process_index).map(|h| h.alive.load(Ordering::SeqCst)).unwrap_or(false);
        if still_alive {
            return Err(ActorPoolError::SubPoolStartFailed(
                process_index,
                "refused to recover over a process index that is still alive".to_string(),
            ));
        }
        self.subpools.remove(&process_index);
        if self.spawn_subpool(process_index, entry).await == SubPoolStatus::Failed {
            return Err(ActorPoolError::SubPoolStartFailed(
                process_index,
                "refused to spawn over an already-running process index".to_string(),
            ));
        }

        if mode == RecoveryMode::Actor {
            let replay: Vec<CreateActorMessage> =
                self.create_log.get(&process_index).map(|v| v.clone()).unwrap_or_default();
            self.create_log.remove(&process_index);
            for message in replay {
                self.create_actor(
                    AllocationStrategy::ProcessIndex(process_index),
                    &message.type_name,
                    message.uid,
                    message.init,
                )
                .await?;
            }
        }
        Ok(())
    }

    pub async fn wait_actor_pool_recovered(&self, process_index: ProcessIndex, timeout: Duration) -> Result<(), ActorPoolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_sub_pool_alive(process_index).await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ActorPoolError::SubPoolDead(process_index));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Spawns a background task that polls every tracked subpool's liveness every
    /// `poll_interval` and triggers `auto_recover` under `mode` for any subpool found dead --
    /// the monitor half of §4.2's "periodically polls liveness via a pluggable predicate"
    /// contract (`is_sub_pool_alive` is the predicate).
    pub fn spawn_health_monitor(self: Arc<Self>, poll_interval: Duration, mode: RecoveryMode) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                let indexes: Vec<ProcessIndex> = self.subpools.iter().map(|entry| *entry.key()).collect();
                for index in indexes {
                    if !self.is_sub_pool_alive(index).await {
                        warn!(process_index = index, "health monitor detected a dead subpool");
                        if let Err(error) = self.auto_recover(index, mode).await {
                            warn!(process_index = index, %error, "auto-recovery failed");
                        }
                    }
                }
            }
        })
    }
}
