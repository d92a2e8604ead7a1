// Scoped lock handle tests
// Every exit path must leave no claim node behind

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{FlakyClient, LOCK_PATH, child_count, service, session, wait_for};
use dlock_core::{DistributedLock, LockConfig, LockError, ScopedLockHandle};

async fn guarded_work(
    service: &dlock_coordination::MemoryCoordinationService,
    fail: bool,
) -> Result<usize, LockError> {
    let handle = ScopedLockHandle::acquire(session(service), LOCK_PATH, "worker").await?;
    assert!(handle.is_held());
    if fail {
        return Err(LockError::AlreadyReleased);
    }
    Ok(child_count(service))
}

#[tokio::test]
async fn test_explicit_release() {
    let service = service();
    let handle = ScopedLockHandle::acquire(session(&service), LOCK_PATH, "hostA")
        .await
        .unwrap();
    assert!(handle.is_held());
    assert_eq!(
        handle.claim_node().unwrap().name,
        "lock_hostA_0000000000"
    );

    handle.release().await.unwrap();
    assert_eq!(child_count(&service), 0);
}

#[tokio::test]
async fn test_drop_releases_claim() {
    let service = service();
    let client = session(&service);
    {
        let _handle = ScopedLockHandle::acquire(client.clone(), LOCK_PATH, "hostA")
            .await
            .unwrap();
        assert_eq!(child_count(&service), 1);
    }
    wait_for("release on drop", || child_count(&service) == 0).await;
    // The session is still open: the node was deleted, not expired
    assert!(client.is_live());
}

#[tokio::test]
async fn test_early_return_releases_claim() {
    let service = service();

    let err = guarded_work(&service, true).await.unwrap_err();
    assert!(matches!(err, LockError::AlreadyReleased));
    wait_for("release after early return", || child_count(&service) == 0).await;

    assert_eq!(guarded_work(&service, false).await.unwrap(), 1);
    wait_for("release after success", || child_count(&service) == 0).await;
}

#[tokio::test]
async fn test_waiter_proceeds_after_handle_dropped() {
    let service = service();
    let first = ScopedLockHandle::acquire(session(&service), LOCK_PATH, "first")
        .await
        .unwrap();

    let waiter = tokio::spawn({
        let client = session(&service);
        async move { ScopedLockHandle::acquire(client, LOCK_PATH, "second").await }
    });
    wait_for("second claim", || child_count(&service) == 2).await;

    drop(first);
    let second = tokio::time::timeout(Duration::from_secs(10), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(second.is_held());
    second.release().await.unwrap();
}

#[tokio::test]
async fn test_failed_acquire_leaves_nothing_behind() {
    let service = service();
    let holder = DistributedLock::new(session(&service));
    holder.acquire(LOCK_PATH, "holder").await.unwrap();

    let config = LockConfig::default().with_acquire_timeout(Duration::from_millis(50));
    let err = ScopedLockHandle::acquire_with_config(session(&service), LOCK_PATH, "waiter", config)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));
    assert_eq!(child_count(&service), 1);

    let err = ScopedLockHandle::acquire(session(&service), "/missing", "waiter")
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Create { .. }));

    holder.release().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_acquire_withdraws_claim() {
    let service = service();
    let holder = DistributedLock::new(session(&service));
    holder.acquire(LOCK_PATH, "holder").await.unwrap();

    let client = session(&service);
    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        ScopedLockHandle::acquire(client.clone(), LOCK_PATH, "waiter"),
    )
    .await;
    assert!(attempt.is_err());

    wait_for("claim withdrawn", || child_count(&service) == 1).await;
    assert!(client.is_live());
    holder.release().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_during_slow_create_withdraws_claim() {
    let service = service();
    let holder = DistributedLock::new(session(&service));
    holder.acquire(LOCK_PATH, "holder").await.unwrap();

    let slow = FlakyClient::new(session(&service));
    slow.create_delay_ms.store(200, Ordering::SeqCst);
    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        ScopedLockHandle::acquire(slow.clone(), LOCK_PATH, "waiter"),
    )
    .await;
    assert!(attempt.is_err());

    wait_for("interrupted claim withdrawn", || child_count(&service) == 1).await;
    holder.release().await.unwrap();
    assert_eq!(child_count(&service), 0);
}
