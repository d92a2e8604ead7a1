//! Node tree shared by all sessions of one service

use std::collections::{BTreeSet, HashMap};

use dlock_foundation::path;
use dlock_foundation::{CoordinationError, CreateMode, SessionId, WatchedEvent, Watcher};

/// A watch that fired and is waiting for the event thread
pub(crate) struct Delivery {
    pub watcher: Watcher,
    pub event: WatchedEvent,
}

struct Node {
    ephemeral_owner: Option<SessionId>,
    children: BTreeSet<String>,
    /// Next sequence number handed to a sequential child
    next_sequence: u64,
    child_watches: Vec<Watcher>,
}

impl Node {
    fn new(ephemeral_owner: Option<SessionId>) -> Self {
        Self {
            ephemeral_owner,
            children: BTreeSet::new(),
            next_sequence: 0,
            child_watches: Vec::new(),
        }
    }
}

pub(crate) struct Tree {
    nodes: HashMap<String, Node>,
    /// Live sessions and the ephemeral nodes they own
    sessions: HashMap<SessionId, Vec<String>>,
    sequence_width: usize,
}

impl Tree {
    pub fn new(sequence_width: usize) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(path::ROOT.to_string(), Node::new(None));
        Self {
            nodes,
            sessions: HashMap::new(),
            sequence_width,
        }
    }

    pub fn open_session(&mut self, session: SessionId) {
        self.sessions.insert(session, Vec::new());
    }

    pub fn is_live(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn check_session(&self, session: SessionId) -> Result<(), CoordinationError> {
        if self.is_live(session) {
            Ok(())
        } else {
            Err(CoordinationError::SessionExpired(session))
        }
    }

    pub fn exists(&self, node_path: &str) -> bool {
        self.nodes.contains_key(node_path)
    }

    pub fn create(
        &mut self,
        owner: Option<SessionId>,
        node_path: &str,
        mode: CreateMode,
        out: &mut Vec<Delivery>,
    ) -> Result<String, CoordinationError> {
        path::validate(node_path)?;
        let (parent_path, base) =
            path::split(node_path).ok_or_else(|| CoordinationError::BadPath(node_path.to_string()))?;
        let width = self.sequence_width;

        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| CoordinationError::NoNode(parent_path.to_string()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(CoordinationError::NoChildrenForEphemerals(
                parent_path.to_string(),
            ));
        }

        let name = if mode.is_sequential() {
            format!("{}{:0width$}", base, parent.next_sequence, width = width)
        } else {
            base.to_string()
        };
        let full_path = path::join(parent_path, &name);
        if parent.children.contains(&name) {
            return Err(CoordinationError::NodeExists(full_path));
        }

        parent.children.insert(name);
        if mode.is_sequential() {
            parent.next_sequence += 1;
        }
        let watches = std::mem::take(&mut parent.child_watches);

        let owner = if mode.is_ephemeral() { owner } else { None };
        self.nodes.insert(full_path.clone(), Node::new(owner));
        if let Some(owner) = owner {
            self.sessions
                .entry(owner)
                .or_default()
                .push(full_path.clone());
        }

        fire(out, watches, WatchedEvent::children_changed(parent_path));
        Ok(full_path)
    }

    pub fn delete(
        &mut self,
        node_path: &str,
        out: &mut Vec<Delivery>,
    ) -> Result<(), CoordinationError> {
        path::validate(node_path)?;
        let (parent_path, name) =
            path::split(node_path).ok_or_else(|| CoordinationError::BadPath(node_path.to_string()))?;

        match self.nodes.get(node_path) {
            None => return Err(CoordinationError::NoNode(node_path.to_string())),
            Some(node) if !node.children.is_empty() => {
                return Err(CoordinationError::NotEmpty(node_path.to_string()));
            }
            Some(_) => {}
        }
        let Some(node) = self.nodes.remove(node_path) else {
            return Err(CoordinationError::NoNode(node_path.to_string()));
        };

        if let Some(owner) = node.ephemeral_owner
            && let Some(owned) = self.sessions.get_mut(&owner)
        {
            owned.retain(|p| p != node_path);
        }
        fire(out, node.child_watches, WatchedEvent::node_deleted(node_path));

        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.remove(name);
            let watches = std::mem::take(&mut parent.child_watches);
            fire(out, watches, WatchedEvent::children_changed(parent_path));
        }
        Ok(())
    }

    pub fn children(&self, node_path: &str) -> Result<Vec<String>, CoordinationError> {
        path::validate(node_path)?;
        self.nodes
            .get(node_path)
            .map(|node| node.children.iter().cloned().collect())
            .ok_or_else(|| CoordinationError::NoNode(node_path.to_string()))
    }

    pub fn watch_children(
        &mut self,
        node_path: &str,
        watcher: Watcher,
    ) -> Result<Vec<String>, CoordinationError> {
        path::validate(node_path)?;
        let node = self
            .nodes
            .get_mut(node_path)
            .ok_or_else(|| CoordinationError::NoNode(node_path.to_string()))?;
        node.child_watches.push(watcher);
        Ok(node.children.iter().cloned().collect())
    }

    pub fn pending_watches(&self, node_path: &str) -> usize {
        self.nodes
            .get(node_path)
            .map(|node| node.child_watches.len())
            .unwrap_or(0)
    }

    /// End a session, deleting its ephemeral nodes. Returns how many were removed.
    pub fn close_session(&mut self, session: SessionId, out: &mut Vec<Delivery>) -> usize {
        let Some(owned) = self.sessions.remove(&session) else {
            return 0;
        };
        let mut removed = 0;
        for node_path in owned {
            if self.delete(&node_path, out).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

fn fire(out: &mut Vec<Delivery>, watches: Vec<Watcher>, event: WatchedEvent) {
    out.extend(watches.into_iter().map(|watcher| Delivery {
        watcher,
        event: event.clone(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_watcher(counter: &Arc<AtomicUsize>) -> Watcher {
        let counter = counter.clone();
        Box::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn run(out: Vec<Delivery>) {
        for delivery in out {
            (delivery.watcher)(delivery.event);
        }
    }

    #[test]
    fn test_sequential_names_are_padded_and_increasing() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        tree.open_session(1);
        tree.create(None, "/locks", CreateMode::Persistent, &mut out)
            .unwrap();

        let first = tree
            .create(Some(1), "/locks/lock_a_", CreateMode::EphemeralSequential, &mut out)
            .unwrap();
        let second = tree
            .create(Some(1), "/locks/lock_b_", CreateMode::EphemeralSequential, &mut out)
            .unwrap();

        assert_eq!(first, "/locks/lock_a_0000000000");
        assert_eq!(second, "/locks/lock_b_0000000001");
    }

    #[test]
    fn test_unpadded_sequence() {
        let mut tree = Tree::new(0);
        let mut out = Vec::new();
        tree.create(None, "/locks", CreateMode::Persistent, &mut out)
            .unwrap();
        for _ in 0..10 {
            tree.create(None, "/locks/n_", CreateMode::PersistentSequential, &mut out)
                .unwrap();
        }
        let children = tree.children("/locks").unwrap();
        assert!(children.contains(&"n_9".to_string()));
        assert!(children.contains(&"n_0".to_string()));
        assert_eq!(children.len(), 10);
    }

    #[test]
    fn test_create_requires_parent() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        let err = tree
            .create(None, "/missing/child", CreateMode::Persistent, &mut out)
            .unwrap_err();
        assert_eq!(err, CoordinationError::NoNode("/missing".to_string()));
    }

    #[test]
    fn test_ephemeral_cannot_have_children() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        tree.open_session(7);
        tree.create(Some(7), "/eph", CreateMode::Ephemeral, &mut out)
            .unwrap();
        let err = tree
            .create(Some(7), "/eph/child", CreateMode::Persistent, &mut out)
            .unwrap_err();
        assert!(matches!(err, CoordinationError::NoChildrenForEphemerals(_)));
    }

    #[test]
    fn test_child_watch_is_one_shot() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        tree.create(None, "/locks", CreateMode::Persistent, &mut out)
            .unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        tree.watch_children("/locks", counting_watcher(&fired))
            .unwrap();
        assert_eq!(tree.pending_watches("/locks"), 1);

        let mut out = Vec::new();
        tree.create(None, "/locks/a", CreateMode::Persistent, &mut out)
            .unwrap();
        tree.create(None, "/locks/b", CreateMode::Persistent, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
        run(out);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tree.pending_watches("/locks"), 0);
    }

    #[test]
    fn test_delete_rules() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        tree.create(None, "/locks", CreateMode::Persistent, &mut out)
            .unwrap();
        tree.create(None, "/locks/a", CreateMode::Persistent, &mut out)
            .unwrap();

        assert!(matches!(
            tree.delete("/locks", &mut out),
            Err(CoordinationError::NotEmpty(_))
        ));
        tree.delete("/locks/a", &mut out).unwrap();
        assert!(matches!(
            tree.delete("/locks/a", &mut out),
            Err(CoordinationError::NoNode(_))
        ));
        assert!(tree.delete("/", &mut out).is_err());
    }

    #[test]
    fn test_close_session_removes_ephemerals_and_fires_watches() {
        let mut tree = Tree::new(10);
        let mut out = Vec::new();
        tree.open_session(3);
        tree.create(None, "/locks", CreateMode::Persistent, &mut out)
            .unwrap();
        tree.create(Some(3), "/locks/lock_x_", CreateMode::EphemeralSequential, &mut out)
            .unwrap();
        tree.create(Some(3), "/locks/keep", CreateMode::Persistent, &mut out)
            .unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        tree.watch_children("/locks", counting_watcher(&fired))
            .unwrap();

        let mut out = Vec::new();
        assert_eq!(tree.close_session(3, &mut out), 1);
        run(out);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tree.children("/locks").unwrap(), vec!["keep".to_string()]);
        assert!(tree.check_session(3).is_err());
    }
}
