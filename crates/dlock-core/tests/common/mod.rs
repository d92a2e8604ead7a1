// Shared helpers for lock integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dlock_coordination::{MemoryCoordinationService, MemoryServiceConfig, MemorySession};
use dlock_foundation::{CoordinationClient, CoordinationError, CreateMode, SessionId, Watcher};

pub const LOCK_PATH: &str = "/locks/orders";

pub fn service() -> MemoryCoordinationService {
    service_with(MemoryServiceConfig::default())
}

pub fn service_with(config: MemoryServiceConfig) -> MemoryCoordinationService {
    let service = MemoryCoordinationService::new(config).expect("start coordination service");
    service.ensure_path(LOCK_PATH).expect("create lock path");
    service
}

pub fn session(service: &MemoryCoordinationService) -> Arc<MemorySession> {
    Arc::new(service.connect())
}

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn child_count(service: &MemoryCoordinationService) -> usize {
    service.children(LOCK_PATH).map(|c| c.len()).unwrap_or(0)
}

/// Session wrapper that can be told to fail or slow down specific calls
pub struct FlakyClient {
    inner: Arc<MemorySession>,
    pub fail_watch_list: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Extra latency after the node is created, before the call returns
    pub create_delay_ms: AtomicU64,
}

impl FlakyClient {
    pub fn new(inner: Arc<MemorySession>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_watch_list: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            create_delay_ms: AtomicU64::new(0),
        })
    }

    fn injected() -> CoordinationError {
        CoordinationError::Unavailable("injected failure".to_string())
    }
}

#[async_trait]
impl CoordinationClient for FlakyClient {
    fn session_id(&self) -> SessionId {
        self.inner.session_id()
    }

    async fn create_node(&self, path: &str, mode: CreateMode) -> Result<String, CoordinationError> {
        let created = self.inner.create_node(path, mode).await?;
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(created)
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.inner.list_children(path).await
    }

    async fn list_children_and_watch(
        &self,
        path: &str,
        watcher: Watcher,
    ) -> Result<Vec<String>, CoordinationError> {
        if self.fail_watch_list.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.list_children_and_watch(path, watcher).await
    }

    async fn delete_node(&self, path: &str) -> Result<(), CoordinationError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.delete_node(path).await
    }
}
