//! Scoped lock handle

use std::sync::Arc;

use dlock_foundation::CoordinationClient;
use tracing::{debug, warn};

use super::model::ClaimNode;
use super::service::DistributedLock;
use crate::config::LockConfig;
use crate::error::LockError;

/// Holds a distributed lock for as long as it lives.
///
/// The lock is released on every exit path: explicitly through
/// [`ScopedLockHandle::release`], on drop, when acquisition fails after a
/// claim node was created, and when the acquiring future is cancelled.
/// Drop-time release is spawned onto the current tokio runtime.
#[derive(Debug)]
pub struct ScopedLockHandle {
    lock: Option<DistributedLock>,
}

impl ScopedLockHandle {
    pub async fn acquire(
        client: Arc<dyn CoordinationClient>,
        lock_path: &str,
        identity: &str,
    ) -> Result<Self, LockError> {
        Self::acquire_with_config(client, lock_path, identity, LockConfig::default()).await
    }

    pub async fn acquire_with_config(
        client: Arc<dyn CoordinationClient>,
        lock_path: &str,
        identity: &str,
        config: LockConfig,
    ) -> Result<Self, LockError> {
        // Built before acquiring so a cancelled acquire still releases on drop
        let mut handle = Self {
            lock: Some(DistributedLock::with_config(client, config)),
        };

        let result = match handle.lock.as_ref() {
            Some(lock) => lock.acquire(lock_path, identity).await,
            None => Ok(()),
        };

        if let Err(err) = result {
            if let Some(lock) = handle.lock.take()
                && let Err(release_err) = lock.release().await
            {
                debug!(error = %release_err, "Releasing claim after failed acquire");
            }
            return Err(err);
        }
        Ok(handle)
    }

    pub fn claim_node(&self) -> Option<ClaimNode> {
        self.lock.as_ref().and_then(DistributedLock::claim_node)
    }

    pub fn is_held(&self) -> bool {
        self.lock.as_ref().is_some_and(DistributedLock::is_held)
    }

    /// Release now and wait for the claim node to be deleted
    pub async fn release(mut self) -> Result<(), LockError> {
        match self.lock.take() {
            Some(lock) => lock.release().await,
            None => Ok(()),
        }
    }
}

impl Drop for ScopedLockHandle {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        if !lock.has_outstanding_claim() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = lock.release().await {
                        warn!(error = %err, "Release on drop failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    claim = ?lock.claim_node().map(|node| node.path()),
                    "No async runtime to release lock on drop, claim node remains until the session ends"
                );
            }
        }
    }
}
