//! Client sessions of the in-memory service

use std::sync::Arc;

use async_trait::async_trait;
use dlock_foundation::{CoordinationClient, CoordinationError, CreateMode, SessionId, Watcher};

use crate::service::ServiceInner;

/// A client session. Closing it (explicitly or by drop) deletes every
/// ephemeral node it created.
pub struct MemorySession {
    service: Arc<ServiceInner>,
    id: SessionId,
}

impl MemorySession {
    pub(crate) fn new(service: Arc<ServiceInner>, id: SessionId) -> Self {
        Self { service, id }
    }

    /// End the session; returns the number of ephemeral nodes removed
    pub fn close(&self) -> usize {
        self.service.close_session(self.id)
    }

    pub fn is_live(&self) -> bool {
        self.service.with_tree(|tree| tree.is_live(self.id))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession").field("id", &self.id).finish()
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> SessionId {
        self.id
    }

    async fn create_node(&self, path: &str, mode: CreateMode) -> Result<String, CoordinationError> {
        let id = self.id;
        self.service.mutate(|tree, out| {
            tree.check_session(id)?;
            tree.create(Some(id), path, mode, out)
        })
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.service.with_tree(|tree| {
            tree.check_session(self.id)?;
            tree.children(path)
        })
    }

    async fn list_children_and_watch(
        &self,
        path: &str,
        watcher: Watcher,
    ) -> Result<Vec<String>, CoordinationError> {
        self.service.with_tree(|tree| {
            tree.check_session(self.id)?;
            tree.watch_children(path, watcher)
        })
    }

    async fn delete_node(&self, path: &str) -> Result<(), CoordinationError> {
        let id = self.id;
        self.service.mutate(|tree, out| {
            tree.check_session(id)?;
            tree.delete(path, out)
        })
    }
}
