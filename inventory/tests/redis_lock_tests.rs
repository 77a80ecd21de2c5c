//! Redis-backed lock and counter.
//!
//! These tests require a running Redis instance:
//!   docker run -d -p 6379:6379 redis:7-alpine
//!   cargo test -p inventory --test redis_lock_tests -- --ignored
//! `REDIS_URL` overrides the default address.

use std::time::Duration;

use inventory::CounterStore;
use inventory::counter::RedisCounterStore;
use inventory::keys::{inventory_key, lock_key};
use inventory::lock::{LockError, LockManager, RedisLockManager};
use uuid::Uuid;

const LEASE: Duration = Duration::from_secs(10);
const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(20);

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Event id no other test run uses, so keys never collide.
fn fresh_event() -> i64 {
    (Uuid::new_v4().as_u128() >> 65) as i64
}

async fn locks() -> RedisLockManager {
    RedisLockManager::connect(&redis_url(), POLL).await.unwrap()
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn acquire_and_release_frees_the_key() {
    let locks = locks().await;
    let key = lock_key(fresh_event());

    let token = locks.acquire(&key, LEASE, WAIT).await.unwrap();
    assert_eq!(token.key(), key);

    assert!(locks.release(token).await.unwrap());

    // Free again: a zero-wait acquire succeeds.
    let again = locks.acquire(&key, LEASE, Duration::ZERO).await.unwrap();
    assert!(locks.release(again).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn waiter_gives_up_after_max_wait() {
    let locks = locks().await;
    let key = lock_key(fresh_event());

    let holder = locks.acquire(&key, LEASE, WAIT).await.unwrap();

    let err = locks
        .acquire(&key, LEASE, Duration::from_millis(300))
        .await
        .unwrap_err();

    match err {
        LockError::Busy { key: k, waited } => {
            assert_eq!(k, key);
            assert!(waited >= Duration::from_millis(300), "waited only {waited:?}");
        }
        other => panic!("expected Busy, got {other:?}"),
    }

    assert!(locks.release(holder).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn different_events_never_block_each_other() {
    let locks = locks().await;

    let a = locks
        .acquire(&lock_key(fresh_event()), LEASE, WAIT)
        .await
        .unwrap();
    let b = locks
        .acquire(&lock_key(fresh_event()), LEASE, Duration::ZERO)
        .await
        .unwrap();

    assert_ne!(a.owner(), b.owner());
    assert!(locks.release(a).await.unwrap());
    assert!(locks.release(b).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn expired_lease_is_taken_over_and_stale_release_is_refused() {
    let locks = locks().await;
    let key = lock_key(fresh_event());

    let stale = locks
        .acquire(&key, Duration::from_millis(200), WAIT)
        .await
        .unwrap();

    // Redis expires the key; the second caller gets it while waiting.
    let fresh = locks.acquire(&key, LEASE, WAIT).await.unwrap();
    assert_ne!(stale.owner(), fresh.owner());

    // Compare-and-delete leaves the new holder alone.
    assert!(!locks.release(stale).await.unwrap());

    let err = locks
        .acquire(&key, LEASE, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Busy { .. }));

    assert!(locks.release(fresh).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn counter_round_trip() {
    let counter = RedisCounterStore::connect(&redis_url()).await.unwrap();
    let key = inventory_key(fresh_event());

    assert_eq!(counter.get(&key).await.unwrap(), 0);

    counter.set(&key, 10).await.unwrap();
    assert_eq!(counter.decrement_by(&key, 3).await.unwrap(), 7);
    assert_eq!(counter.increment_by(&key, 3).await.unwrap(), 10);
    assert_eq!(counter.get(&key).await.unwrap(), 10);

    let untouched = inventory_key(fresh_event());
    assert_eq!(counter.increment_by(&untouched, 4).await.unwrap(), 4);
    assert_eq!(counter.decrement_by(&untouched, 4).await.unwrap(), 0);
}
