//! In-memory coordination service

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dlock_foundation::{CoordinationError, CreateMode, SessionId, path};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MemoryServiceConfig;
use crate::session::MemorySession;
use crate::tree::{Delivery, Tree};

/// State shared by the service handle and all of its sessions
pub(crate) struct ServiceInner {
    tree: Mutex<Tree>,
    events: mpsc::UnboundedSender<Delivery>,
    next_session: AtomicU64,
}

impl ServiceInner {
    /// Run `op` against the tree and hand any fired watches to the event thread
    pub(crate) fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Tree, &mut Vec<Delivery>) -> Result<T, CoordinationError>,
    ) -> Result<T, CoordinationError> {
        let mut fired = Vec::new();
        let result = {
            let mut tree = self.tree.lock();
            op(&mut tree, &mut fired)
        };
        self.dispatch(fired);
        result
    }

    pub(crate) fn with_tree<T>(&self, op: impl FnOnce(&mut Tree) -> T) -> T {
        let mut tree = self.tree.lock();
        op(&mut tree)
    }

    fn dispatch(&self, fired: Vec<Delivery>) {
        for delivery in fired {
            if self.events.send(delivery).is_err() {
                warn!("Coordination event thread is gone, dropping watch event");
            }
        }
    }

    pub(crate) fn close_session(&self, session: SessionId) -> usize {
        let removed = self
            .mutate(|tree, out| Ok(tree.close_session(session, out)))
            .unwrap_or(0);
        debug!(session, removed, "Session closed");
        removed
    }
}

/// A ZooKeeper-style coordination service living in this process.
///
/// Watches fire from a dedicated event-delivery thread, never from inside a
/// client call, so watchers observe the same asynchrony a remote service
/// would give them.
#[derive(Clone)]
pub struct MemoryCoordinationService {
    inner: Arc<ServiceInner>,
}

impl MemoryCoordinationService {
    /// Create the service and start its event-delivery thread
    pub fn new(config: MemoryServiceConfig) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        std::thread::Builder::new()
            .name(config.event_thread_name.clone())
            .spawn(move || {
                while let Some(delivery) = rx.blocking_recv() {
                    (delivery.watcher)(delivery.event);
                }
                debug!("Coordination event thread stopped");
            })?;

        info!(
            sequence_width = config.sequence_width,
            "In-memory coordination service started"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                tree: Mutex::new(Tree::new(config.sequence_width)),
                events: tx,
                next_session: AtomicU64::new(1),
            }),
        })
    }

    /// Open a new client session
    pub fn connect(&self) -> MemorySession {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        self.inner.with_tree(|tree| tree.open_session(id));
        debug!(session = id, "Session opened");
        MemorySession::new(self.inner.clone(), id)
    }

    /// Expire a session from the service side, as a lost connection would
    pub fn expire_session(&self, session: SessionId) -> usize {
        self.inner.close_session(session)
    }

    /// Create a persistent node and any missing ancestors
    pub fn ensure_path(&self, node_path: &str) -> Result<(), CoordinationError> {
        path::validate(node_path)?;
        let mut prefix = String::new();
        for segment in node_path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            let current = prefix.clone();
            self.inner.mutate(|tree, out| {
                if tree.exists(&current) {
                    return Ok(());
                }
                tree.create(None, &current, CreateMode::Persistent, out)
                    .map(|_| ())
            })?;
        }
        Ok(())
    }

    pub fn exists(&self, node_path: &str) -> bool {
        self.inner.with_tree(|tree| tree.exists(node_path))
    }

    /// Children of a node, bypassing sessions
    pub fn children(&self, node_path: &str) -> Result<Vec<String>, CoordinationError> {
        self.inner.with_tree(|tree| tree.children(node_path))
    }

    /// Watches registered on a node's children and not yet fired
    pub fn pending_watches(&self, node_path: &str) -> usize {
        self.inner.with_tree(|tree| tree.pending_watches(node_path))
    }

    pub fn live_sessions(&self) -> usize {
        self.inner.with_tree(|tree| tree.live_sessions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlock_foundation::{CoordinationClient, WatchEventKind, WatchedEvent};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn service() -> MemoryCoordinationService {
        MemoryCoordinationService::new(MemoryServiceConfig::default()).unwrap()
    }

    #[test]
    fn test_ensure_path() {
        let service = service();
        service.ensure_path("/app/locks/orders").unwrap();
        assert!(service.exists("/app"));
        assert!(service.exists("/app/locks"));
        assert!(service.exists("/app/locks/orders"));

        // Idempotent
        service.ensure_path("/app/locks/orders").unwrap();
        assert!(service.ensure_path("app").is_err());
    }

    #[tokio::test]
    async fn test_watch_fires_on_event_thread() {
        let service = service();
        service.ensure_path("/locks").unwrap();
        let session = service.connect();

        let (tx, rx) = oneshot::channel::<(WatchedEvent, Option<String>)>();
        let children = session
            .list_children_and_watch(
                "/locks",
                Box::new(move |event| {
                    let thread = std::thread::current().name().map(str::to_string);
                    let _ = tx.send((event, thread));
                }),
            )
            .await
            .unwrap();
        assert!(children.is_empty());

        session
            .create_node("/locks/lock_a_", CreateMode::EphemeralSequential)
            .await
            .unwrap();

        let (event, thread) = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.path, "/locks");
        assert_eq!(event.kind, WatchEventKind::ChildrenChanged);
        assert_eq!(thread.as_deref(), Some("coordination-events"));
    }

    #[tokio::test]
    async fn test_expire_session() {
        let service = service();
        service.ensure_path("/locks").unwrap();
        let session = service.connect();
        session
            .create_node("/locks/lock_a_", CreateMode::EphemeralSequential)
            .await
            .unwrap();
        assert_eq!(service.live_sessions(), 1);

        assert_eq!(service.expire_session(session.session_id()), 1);
        assert_eq!(service.live_sessions(), 0);
        assert!(service.children("/locks").unwrap().is_empty());

        let err = session.list_children("/locks").await.unwrap_err();
        assert_eq!(err, CoordinationError::SessionExpired(session.session_id()));
    }
}
