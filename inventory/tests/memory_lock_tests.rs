use std::sync::Arc;
use std::time::Duration;

use inventory::keys::lock_key;
use inventory::lock::{InMemoryLockManager, LockError, LockManager};
use parking_lot::Mutex;
use tokio::task::JoinSet;

const LEASE: Duration = Duration::from_secs(45);
const WAIT: Duration = Duration::from_secs(45);

#[tokio::test]
async fn acquire_and_release_frees_the_key() {
    let locks = InMemoryLockManager::new();
    let key = lock_key(1);

    let token = locks.acquire(&key, LEASE, WAIT).await.unwrap();
    assert!(locks.is_held(&key));
    assert_eq!(token.key(), key);

    assert!(locks.release(token).await.unwrap());
    assert!(!locks.is_held(&key));
}

#[tokio::test]
async fn different_events_never_block_each_other() {
    let locks = InMemoryLockManager::new();

    let a = locks.acquire(&lock_key(1), LEASE, WAIT).await.unwrap();
    // Zero wait: would fail immediately if the keys contended.
    let b = locks
        .acquire(&lock_key(2), LEASE, Duration::ZERO)
        .await
        .unwrap();

    assert_ne!(a.owner(), b.owner());
    locks.release(a).await.unwrap();
    locks.release(b).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn waiter_gives_up_after_max_wait() {
    let locks = InMemoryLockManager::new();
    let key = lock_key(1);

    let _holder = locks.acquire(&key, LEASE, WAIT).await.unwrap();

    let err = locks
        .acquire(&key, LEASE, Duration::from_secs(2))
        .await
        .unwrap_err();

    match err {
        LockError::Busy { key: k, waited } => {
            assert_eq!(k, key);
            assert!(waited >= Duration::from_secs(2), "waited only {waited:?}");
        }
        other => panic!("expected Busy, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn waiter_is_woken_by_release() {
    let locks = Arc::new(InMemoryLockManager::new());
    let key = lock_key(1);

    let holder = locks.acquire(&key, LEASE, WAIT).await.unwrap();

    let l = Arc::clone(&locks);
    let k = key.clone();
    let waiter = tokio::spawn(async move { l.acquire(&k, LEASE, WAIT).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    locks.release(holder).await.unwrap();

    let token = waiter.await.expect("Task panicked").unwrap();
    assert!(token.held_for() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn expired_lease_passes_the_lock_to_the_next_waiter() {
    let locks = InMemoryLockManager::new();
    let key = lock_key(1);

    // Holder "crashes": never releases.
    let stale = locks
        .acquire(&key, Duration::from_secs(5), WAIT)
        .await
        .unwrap();

    let next = locks
        .acquire(&key, LEASE, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(stale.lease_expired());

    // The stale owner must not be able to free the new holder's lock.
    assert!(!locks.release(stale).await.unwrap());
    assert!(locks.is_held(&key));

    assert!(locks.release(next).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_serializes_read_modify_write() {
    let locks = Arc::new(InMemoryLockManager::new());
    let shared = Arc::new(Mutex::new(0u64));
    let key = lock_key(9);

    let mut set = JoinSet::new();
    for _ in 0..50 {
        let l = Arc::clone(&locks);
        let s = Arc::clone(&shared);
        let k = key.clone();
        set.spawn(async move {
            let token = l.acquire(&k, LEASE, WAIT).await?;
            let seen = *s.lock();
            tokio::task::yield_now().await;
            *s.lock() = seen + 1;
            l.release(token).await
        });
    }

    while let Some(res) = set.join_next().await {
        assert!(res.expect("Task panicked").expect("lock op failed"));
    }

    assert_eq!(*shared.lock(), 50);
}
