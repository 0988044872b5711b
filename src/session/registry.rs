//! In-memory table of live sessions
//!
//! The registry is the single source of truth for whether a session exists.
//! It is guarded by one lock over the whole table; session counts are small
//! and no backend I/O happens while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::common::{Error, Result};

use super::state::Session;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under an id that is not yet taken
    ///
    /// `new_id` is called until it yields an unused id; `build` then creates
    /// the session under the same write lock, so the id cannot be claimed in
    /// between.
    pub async fn insert_fresh<I, B>(&self, mut new_id: I, build: B) -> Arc<Session>
    where
        I: FnMut() -> String,
        B: FnOnce(String) -> Session,
    {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let id = new_id();
            if !sessions.contains_key(&id) {
                break id;
            }
        };
        let session = Arc::new(build(id.clone()));
        sessions.insert(id, session.clone());
        session
    }

    /// Look up a session for `operation`
    pub async fn get(&self, operation: &'static str, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(operation, id))
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    /// Remove a session only if the registered entry is this exact one
    pub async fn remove_exact(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.id());
                true
            }
            _ => false,
        }
    }

    /// All sessions, oldest first
    pub async fn list(&self) -> Vec<Arc<Session>> {
        let mut list: Vec<_> = self.sessions.read().await.values().cloned().collect();
        list.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        list
    }

    /// Empty the table, handing every session to the caller
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().await.drain().map(|(_, s)| s).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::{BackendProcess, LaunchSpec};

    fn build(id: String, port: u16) -> Session {
        let process =
            BackendProcess::spawn(std::path::Path::new("sleep"), &["30".to_string()]).unwrap();
        Session::new(
            id,
            LaunchSpec::Debug {
                package: None,
                build_flags: None,
            },
            format!("127.0.0.1:{}", port).parse().unwrap(),
            process,
        )
    }

    async fn register(registry: &SessionRegistry, id: &str, port: u16) -> Arc<Session> {
        registry
            .insert_fresh(|| id.to_string(), |id| build(id, port))
            .await
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        let s1 = register(&registry, "s1", 40001).await;

        let found = registry.get("continue", "s1").await.unwrap();
        assert!(Arc::ptr_eq(&found, &s1));
        assert_eq!(registry.len().await, 1);

        let removed = registry.remove("s1").await.unwrap();
        assert!(registry.remove("s1").await.is_none());
        assert_eq!(registry.len().await, 0);
        removed.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_session() {
        let registry = SessionRegistry::new();
        match registry.get("evaluate", "nope").await {
            Err(Error::SessionNotFound { operation, id }) => {
                assert_eq!(operation, "evaluate");
                assert_eq!(id, "nope");
            }
            other => panic!("Expected SessionNotFound, got {:?}", other.map(|s| s.id().to_string())),
        }
    }

    #[tokio::test]
    async fn test_remove_exact_ignores_replaced_entry() {
        let registry = SessionRegistry::new();
        let first = register(&registry, "dup", 40002).await;
        registry.remove("dup").await.unwrap();
        let second = register(&registry, "dup", 40003).await;

        // A stale handle must not evict the session now holding the id
        assert!(!registry.remove_exact(&first).await);
        assert_eq!(registry.get("list", "dup").await.unwrap().port(), 40003);
        assert!(registry.remove_exact(&second).await);

        first.terminate().await.unwrap();
        second.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_fresh_skips_taken_ids() {
        let registry = SessionRegistry::new();
        register(&registry, "taken", 40006).await;

        let mut candidates = vec!["fresh", "taken"];
        let created = registry
            .insert_fresh(
                || candidates.pop().unwrap_or("fallback").to_string(),
                |id| build(id, 40007),
            )
            .await;
        assert_eq!(created.id(), "fresh");
        assert_eq!(registry.len().await, 2);

        for s in registry.drain().await {
            s.terminate().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_drain() {
        let registry = SessionRegistry::new();
        register(&registry, "a", 40004).await;
        register(&registry, "b", 40005).await;
        assert_eq!(registry.list().await.len(), 2);

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len().await, 0);
        for s in drained {
            s.terminate().await.unwrap();
        }
    }
}
