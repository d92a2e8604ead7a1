//! Distributed lock state machine
//!
//! Acquisition creates (or adopts) an ephemeral sequential claim node under
//! the lock path, then loops: list the siblings while registering a watch in
//! the same request, stop if the claim has the lowest sequence, otherwise park
//! until the watch fires and look again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dlock_foundation::{CoordinationClient, CreateMode, path};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::model::{ClaimNode, LockState};
use super::ordering::{self, Siblings};
use super::watch::{LockSignal, WatchBinding};
use crate::config::LockConfig;
use crate::error::LockError;
use crate::metrics;

/// A claim creation that has been sent but not yet recorded in the state
#[derive(Debug, Clone)]
struct ClaimAttempt {
    lock_path: String,
    identity: String,
}

/// A lock on one path of a coordination service.
///
/// One instance makes one acquisition: after `release` it is spent and a new
/// instance is needed to lock again.
pub struct DistributedLock {
    client: Arc<dyn CoordinationClient>,
    config: LockConfig,
    state: Mutex<LockState>,
    /// Set while `create_node` is in flight. Lock order: `state`, then `attempt`.
    attempt: Mutex<Option<ClaimAttempt>>,
    /// Serializes acquisition attempts on this instance
    gate: tokio::sync::Mutex<()>,
    signal: Arc<LockSignal>,
}

impl DistributedLock {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self::with_config(client, LockConfig::default())
    }

    pub fn with_config(client: Arc<dyn CoordinationClient>, config: LockConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(LockState::Unclaimed),
            attempt: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
            signal: LockSignal::new(),
        }
    }

    pub fn state(&self) -> LockState {
        self.state.lock().clone()
    }

    pub fn claim_node(&self) -> Option<ClaimNode> {
        self.state.lock().claim().cloned()
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().is_held()
    }

    /// Whether a claim node may exist for this lock: recorded, or being created
    pub(crate) fn has_outstanding_claim(&self) -> bool {
        let state = self.state.lock();
        state.is_claimed() || self.attempt.lock().is_some()
    }

    /// Watch notifications this lock has received
    pub fn wakeups(&self) -> u64 {
        self.signal.wakeups()
    }

    /// Block until this caller holds the lock on `lock_path`.
    ///
    /// Applies the configured acquire timeout, if any. On a `List` error the
    /// claim stays in place and calling `acquire` again resumes waiting on it.
    pub async fn acquire(&self, lock_path: &str, identity: &str) -> Result<(), LockError> {
        match self.config.acquire_timeout() {
            Some(timeout) => self.acquire_timeout(lock_path, identity, timeout).await,
            None => self.acquire_recorded(lock_path, identity).await,
        }
    }

    /// Like `acquire`, but gives up after `timeout`, withdrawing the claim
    /// node and leaving the lock `Released`.
    pub async fn acquire_timeout(
        &self,
        lock_path: &str,
        identity: &str,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.acquire_recorded(lock_path, identity)).await {
            Ok(result) => result,
            Err(_) => {
                let waited = started.elapsed();
                warn!(lock_path, identity, ?waited, "Timed out waiting for lock, withdrawing claim");
                if let Err(err) = self.release().await {
                    debug!(error = %err, "Claim withdrawal after timeout failed");
                }
                metrics::record_acquire_error("timeout");
                Err(LockError::Timeout {
                    path: lock_path.to_string(),
                    waited,
                })
            }
        }
    }

    /// Take the lock only if no one else holds it, without waiting.
    ///
    /// When another holder is ahead, the claim is withdrawn, the lock becomes
    /// `Released` and `false` is returned. When another acquisition on this
    /// instance is in progress, `false` is returned and that acquisition
    /// carries on undisturbed.
    pub async fn try_acquire(&self, lock_path: &str, identity: &str) -> Result<bool, LockError> {
        ordering::validate_identity(identity)?;
        let Ok(_gate) = self.gate.try_lock() else {
            debug!(lock_path, identity, "Acquisition already in progress on this lock");
            return Ok(false);
        };

        let node = match self.state() {
            LockState::Released => return Err(LockError::AlreadyReleased),
            LockState::Held(node) => {
                check_claim(&node, lock_path, identity)?;
                return Ok(true);
            }
            LockState::Pending(node) => {
                check_claim(&node, lock_path, identity)?;
                node
            }
            LockState::Unclaimed => self.claim(lock_path, identity).await?,
        };

        let children = self
            .client
            .list_children(&node.lock_path)
            .await
            .map_err(|source| LockError::List {
                path: node.lock_path.clone(),
                source,
            })?;
        let siblings = Siblings::parse(&children);
        self.ensure_present(&node, &siblings)?;

        if siblings.is_lowest(node.sequence) {
            if !self.transition(&node, LockState::Held(node.clone())) {
                return Err(LockError::AlreadyReleased);
            }
            info!(claim = %node, "Lock acquired");
            metrics::record_acquired(Duration::ZERO);
            return Ok(true);
        }

        debug!(claim = %node, holder = siblings.lowest().unwrap_or("-"), "Lock busy, withdrawing claim");
        if let Err(err) = self.release().await {
            debug!(error = %err, "Claim withdrawal failed");
        }
        Ok(false)
    }

    /// Delete the claim node if there is one. The lock ends up `Released`
    /// whatever the outcome; a failed delete is reported as a non-fatal
    /// `LockError::Delete` since the ephemeral node dies with its session.
    ///
    /// If the lock was dropped out of an acquisition while its claim node was
    /// being created, the node was never recorded; it is found by identity
    /// and deleted instead.
    pub async fn release(&self) -> Result<(), LockError> {
        let (previous, attempt) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut *state, LockState::Released);
            (previous, self.attempt.lock().take())
        };
        // A concurrent acquire re-checks, sees Released and stops
        self.signal.notify();

        let Some(node) = previous.claim() else {
            return match attempt {
                Some(attempt) => self.sweep(&attempt).await,
                None => Ok(()),
            };
        };
        let path = node.path();
        match self.client.delete_node(&path).await {
            Ok(()) => {
                info!(claim = %node, held = previous.is_held(), "Lock released");
                metrics::record_release(false);
                Ok(())
            }
            Err(source) if source.is_no_node() => {
                debug!(claim = %node, "Claim node already gone");
                metrics::record_release(false);
                Ok(())
            }
            Err(source) => {
                warn!(
                    claim = %node,
                    error = %source,
                    "Failed to delete claim node, it will be removed when the session ends"
                );
                metrics::record_release(true);
                Err(LockError::Delete { path, source })
            }
        }
    }

    async fn acquire_recorded(&self, lock_path: &str, identity: &str) -> Result<(), LockError> {
        let started = Instant::now();
        let result = self.acquire_inner(lock_path, identity).await;
        match &result {
            Ok(()) => metrics::record_acquired(started.elapsed()),
            Err(err) => metrics::record_acquire_error(err.kind()),
        }
        result
    }

    async fn acquire_inner(&self, lock_path: &str, identity: &str) -> Result<(), LockError> {
        ordering::validate_identity(identity)?;
        let _gate = self.gate.lock().await;

        let node = match self.state() {
            LockState::Released => return Err(LockError::AlreadyReleased),
            LockState::Held(node) => {
                check_claim(&node, lock_path, identity)?;
                return Ok(());
            }
            LockState::Pending(node) => {
                check_claim(&node, lock_path, identity)?;
                debug!(claim = %node, "Resuming pending claim");
                node
            }
            LockState::Unclaimed => self.claim(lock_path, identity).await?,
        };

        self.wait_until_lowest(node).await
    }

    /// Adopt this identity's existing claim under `lock_path`, or create one.
    async fn claim(&self, lock_path: &str, identity: &str) -> Result<ClaimNode, LockError> {
        // A failed scan is not fatal: creation below reports the real problem
        let existing = match self.client.list_children(lock_path).await {
            Ok(children) => Siblings::parse(&children)
                .find(identity)
                .map(|name| ClaimNode::from_child(lock_path, name))
                .transpose()?,
            Err(err) => {
                debug!(lock_path, error = %err, "Could not scan for an existing claim");
                None
            }
        };

        let node = match existing {
            Some(node) => {
                info!(claim = %node, "Adopting existing claim node");
                node
            }
            None => {
                let prefix = ordering::claim_prefix(lock_path, identity);
                // Recorded first: if this future is dropped mid-create, release can still find the node
                *self.attempt.lock() = Some(ClaimAttempt {
                    lock_path: lock_path.to_string(),
                    identity: identity.to_string(),
                });
                let created = match self
                    .client
                    .create_node(&prefix, CreateMode::EphemeralSequential)
                    .await
                {
                    Ok(created) => created,
                    Err(source) => {
                        self.attempt.lock().take();
                        return Err(LockError::Create {
                            path: lock_path.to_string(),
                            source,
                        });
                    }
                };
                match ClaimNode::from_path(&created) {
                    Ok(node) => {
                        debug!(claim = %node, "Created claim node");
                        node
                    }
                    Err(err) => {
                        self.withdraw(&created).await;
                        self.attempt.lock().take();
                        return Err(err);
                    }
                }
            }
        };

        {
            let mut state = self.state.lock();
            self.attempt.lock().take();
            if matches!(*state, LockState::Unclaimed) {
                *state = LockState::Pending(node.clone());
                return Ok(node);
            }
        }
        // Released while the claim was being made
        self.withdraw(&node.path()).await;
        Err(LockError::AlreadyReleased)
    }

    async fn wait_until_lowest(&self, node: ClaimNode) -> Result<(), LockError> {
        loop {
            if !self.is_pending(&node) {
                return Err(LockError::AlreadyReleased);
            }

            // Listing and watching in one request: no change can slip between them
            let binding = WatchBinding::new(&self.signal, node.lock_path.clone());
            let children = self
                .client
                .list_children_and_watch(&node.lock_path, binding.into_watcher())
                .await
                .map_err(|source| LockError::List {
                    path: node.lock_path.clone(),
                    source,
                })?;
            let siblings = Siblings::parse(&children);
            self.ensure_present(&node, &siblings)?;

            if siblings.is_lowest(node.sequence) {
                if !self.transition(&node, LockState::Held(node.clone())) {
                    return Err(LockError::AlreadyReleased);
                }
                info!(claim = %node, "Lock acquired");
                return Ok(());
            }

            debug!(
                claim = %node,
                waiting_for = siblings.predecessor_of(node.sequence).unwrap_or("-"),
                "Lock busy, waiting for a change"
            );
            self.signal.wait().await;
        }
    }

    /// Our claim must appear among the children; if it is gone (session
    /// expiry, foreign delete) waiting would never end.
    fn ensure_present(&self, node: &ClaimNode, siblings: &Siblings<'_>) -> Result<(), LockError> {
        if siblings.contains(&node.name) {
            return Ok(());
        }
        warn!(claim = %node, "Claim node vanished while waiting for the lock");
        self.transition(node, LockState::Released);
        Err(LockError::ClaimLost(node.path()))
    }

    fn is_pending(&self, node: &ClaimNode) -> bool {
        matches!(&*self.state.lock(), LockState::Pending(current) if current == node)
    }

    /// Move from `Pending(node)` to `next`; false if the state moved on meanwhile
    fn transition(&self, node: &ClaimNode, next: LockState) -> bool {
        let mut state = self.state.lock();
        match &*state {
            LockState::Pending(current) if current == node => {
                *state = next;
                true
            }
            _ => false,
        }
    }

    /// Delete every claim under the attempt's identity. Used when a create was
    /// interrupted before its result could be recorded.
    async fn sweep(&self, attempt: &ClaimAttempt) -> Result<(), LockError> {
        let children = self
            .client
            .list_children(&attempt.lock_path)
            .await
            .map_err(|source| {
                warn!(lock_path = %attempt.lock_path, error = %source, "Could not scan for an interrupted claim");
                metrics::record_release(true);
                LockError::Delete {
                    path: attempt.lock_path.clone(),
                    source,
                }
            })?;

        let mut failure = None;
        for name in Siblings::parse(&children).all_for(&attempt.identity) {
            let claim_path = path::join(&attempt.lock_path, name);
            match self.client.delete_node(&claim_path).await {
                Ok(()) => info!(claim = %claim_path, "Withdrew claim left by an interrupted acquire"),
                Err(source) if source.is_no_node() => {}
                Err(source) => {
                    warn!(claim = %claim_path, error = %source, "Failed to withdraw interrupted claim");
                    failure = Some(LockError::Delete {
                        path: claim_path,
                        source,
                    });
                }
            }
        }
        metrics::record_release(failure.is_some());
        failure.map_or(Ok(()), Err)
    }

    async fn withdraw(&self, path: &str) {
        if let Err(err) = self.client.delete_node(path).await
            && !err.is_no_node()
        {
            warn!(claim = %path, error = %err, "Failed to withdraw claim node");
        }
    }
}

/// A resumed claim must be for the same path and identity as the request
fn check_claim(node: &ClaimNode, lock_path: &str, identity: &str) -> Result<(), LockError> {
    if node.lock_path != lock_path {
        return Err(LockError::PathMismatch {
            claimed: node.lock_path.clone(),
            requested: lock_path.to_string(),
        });
    }
    if node.identity != identity {
        return Err(LockError::IdentityMismatch {
            claimed: node.identity.clone(),
            requested: identity.to_string(),
        });
    }
    Ok(())
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        if let Some(node) = self.state.get_mut().claim() {
            warn!(claim = %node, "Lock dropped without release, claim node remains until the session ends");
        } else if let Some(attempt) = self.attempt.get_mut() {
            warn!(
                lock_path = %attempt.lock_path,
                identity = %attempt.identity,
                "Lock dropped during claim creation, claim node may remain until the session ends"
            );
        }
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("session", &self.client.session_id())
            .field("state", &*self.state.lock())
            .finish()
    }
}
