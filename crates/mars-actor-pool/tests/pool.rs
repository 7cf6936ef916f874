use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use mars_actor_pool::{
    Actor, ActorPoolConfig, ActorPoolError, AllocationStrategy, KillPolicy, MainActorPool, PoolConfigEntry, RecoveryMode,
    actor_id,
};
use serde_json::json;

struct Counter {
    value: i64,
}

#[async_trait]
impl Actor for Counter {
    async fn on_message(&mut self, message: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let delta = message.get("add").and_then(|v| v.as_i64()).unwrap_or(0);
        self.value += delta;
        Ok(json!({ "value": self.value }))
    }
}

fn entry(label: &str, external: &str) -> PoolConfigEntry {
    PoolConfigEntry { label: label.into(), external_address: vec![external.into()], ..Default::default() }
}

#[tokio::test]
async fn create_send_destroy_round_trip() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(0, entry("main", "127.0.0.1:9000")).await;

    let uid = actor_id("main", "counter-1");
    let actor_ref = pool
        .create_actor(AllocationStrategy::MainPool, "counter", uid, json!({}))
        .await
        .unwrap();
    assert!(pool.has_actor(&actor_ref).await);

    let reply = pool.send(&actor_ref, json!({ "add": 5 })).await.unwrap();
    assert_eq!(reply["value"], 5);
    let reply = pool.send(&actor_ref, json!({ "add": 2 })).await.unwrap();
    assert_eq!(reply["value"], 7);

    pool.destroy_actor(&actor_ref).await.unwrap();
    assert!(!pool.has_actor(&actor_ref).await);
}

#[tokio::test]
async fn idle_label_picks_least_loaded_subpool() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(0, entry("main", "127.0.0.1:9000")).await;
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;
    pool.spawn_subpool(2, entry("worker", "127.0.0.1:9002")).await;

    let first = pool
        .create_actor(AllocationStrategy::IdleLabel("worker".into()), "counter", actor_id("w", "a"), json!({}))
        .await
        .unwrap();
    let second = pool
        .create_actor(AllocationStrategy::IdleLabel("worker".into()), "counter", actor_id("w", "b"), json!({}))
        .await
        .unwrap();

    assert_ne!(first.process_index, second.process_index);
    assert!(first.process_index == 1 || first.process_index == 2);
}

#[tokio::test]
async fn recovery_replays_recorded_actor_creation() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;

    let uid = actor_id("worker", "counter-1");
    let actor_ref = pool
        .create_actor(AllocationStrategy::ProcessIndex(1), "counter", uid, json!({}))
        .await
        .unwrap();
    assert!(pool.has_actor(&actor_ref).await);

    pool.kill_subpool(1).await.unwrap();
    pool.auto_recover(1, RecoveryMode::Actor).await.unwrap();
    pool.wait_actor_pool_recovered(1, Duration::from_secs(2)).await.unwrap();

    // recovery always respawns fresh, so the actor's state resets, but its identity persists.
    assert!(pool.has_actor(&actor_ref).await);
}

#[tokio::test]
async fn actor_ref_builds_the_same_locator_as_create_actor() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(0, entry("main", "127.0.0.1:9000")).await;

    let uid = actor_id("main", "counter-1");
    let created = pool.create_actor(AllocationStrategy::MainPool, "counter", uid, json!({})).await.unwrap();
    let located = pool.actor_ref(created.process_index, uid);

    assert_eq!(created.process_index, located.process_index);
    assert_eq!(created.uid, located.uid);
    assert_eq!(created.external_address, located.external_address);
}

#[tokio::test]
async fn health_monitor_recovers_a_dead_subpool() {
    let pool = Arc::new(MainActorPool::new(
        ActorPoolConfig::new(),
        PathBuf::from("/tmp/mars-test"),
        KillPolicy::GracefulThenForce,
    ));
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;

    let monitor = pool.clone().spawn_health_monitor(Duration::from_millis(20), RecoveryMode::Process);
    pool.kill_subpool(1).await.unwrap();

    pool.wait_actor_pool_recovered(1, Duration::from_secs(2)).await.unwrap();
    monitor.abort();
}

#[tokio::test]
async fn shutdown_kills_every_subpool_and_closes_the_pool() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(0, entry("main", "127.0.0.1:9000")).await;
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;

    let uid = actor_id("main", "counter-1");
    let actor_ref = pool
        .create_actor(AllocationStrategy::MainPool, "counter", uid, json!({}))
        .await
        .unwrap();

    pool.shutdown().await.unwrap();

    assert!(pool.is_closed());
    assert!(!pool.is_sub_pool_alive(0).await);
    assert!(!pool.is_sub_pool_alive(1).await);
    assert!(matches!(
        pool.create_actor(AllocationStrategy::MainPool, "counter", actor_id("main", "counter-2"), json!({})).await,
        Err(ActorPoolError::PoolClosed)
    ));
    assert!(matches!(pool.destroy_actor(&actor_ref).await, Err(ActorPoolError::PoolClosed)));
    assert!(matches!(pool.send(&actor_ref, json!({})).await, Err(ActorPoolError::PoolClosed)));
}

#[tokio::test]
async fn auto_recover_surfaces_a_start_failure_instead_of_dead() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;

    // never killed, so the subpool is still alive; auto_recover must refuse to respawn over it
    // rather than silently stomping a live process index.
    let result = pool.auto_recover(1, RecoveryMode::Process).await;
    assert!(matches!(result, Err(ActorPoolError::SubPoolStartFailed(1, _))));
}

#[tokio::test]
async fn process_recovery_mode_does_not_replay_actors() {
    let pool = MainActorPool::new(ActorPoolConfig::new(), PathBuf::from("/tmp/mars-test"), KillPolicy::GracefulThenForce);
    pool.register_actor_type("counter", || Box::new(Counter { value: 0 }));
    pool.spawn_subpool(1, entry("worker", "127.0.0.1:9001")).await;

    let uid = actor_id("worker", "counter-1");
    let actor_ref = pool
        .create_actor(AllocationStrategy::ProcessIndex(1), "counter", uid, json!({}))
        .await
        .unwrap();

    pool.kill_subpool(1).await.unwrap();
    pool.auto_recover(1, RecoveryMode::Process).await.unwrap();
    pool.wait_actor_pool_recovered(1, Duration::from_secs(2)).await.unwrap();

    assert!(!pool.has_actor(&actor_ref).await);
}
