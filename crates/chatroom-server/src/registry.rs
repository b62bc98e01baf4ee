//! Process-wide session registry.
//!
//! Every [`SessionHandler`](crate::handler::SessionHandler) shares one
//! registry. Registration is a single check-and-insert on the map entry, so
//! two concurrent HELLOs for the same name can never both succeed.
//! Broadcasts iterate a [`snapshot`](SessionRegistry::snapshot) taken at call
//! time; sessions joining or leaving mid-broadcast may or may not be included.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use tracing::debug;

use crate::metrics::SESSIONS_ACTIVE;
use crate::session::{Identity, Session};

/// Concurrent map of display name → session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `name` iff the name is free.
    ///
    /// On success the session's identity is set to `name`/`joined_at` before
    /// it becomes visible to other handlers. Returns `false` if the name is
    /// taken or the session already has an identity.
    pub fn try_register(&self, session: &Arc<Session>, name: &str, joined_at: DateTime<Utc>) -> bool {
        let registered = match self.sessions.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let identity = Identity {
                    name: name.to_string(),
                    joined_at,
                };
                if session.assign_identity(identity) {
                    let _ = slot.insert(Arc::clone(session));
                    true
                } else {
                    false
                }
            }
        };
        if registered {
            debug!(name, "session registered");
            gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        }
        registered
    }

    /// Remove the session registered under `name`. No-op if absent.
    pub fn remove(&self, name: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(name).map(|(_, session)| session);
        if removed.is_some() {
            debug!(name, "session removed");
            gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        }
        removed
    }

    /// Session registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `name` is currently registered.
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Point-in-time copy of all registered sessions, in no particular order.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Snapshot ordered by ascending join time, ties broken by name.
    pub fn snapshot_by_join_time(&self) -> Vec<Arc<Session>> {
        let mut sessions = self.snapshot();
        sessions.sort_by(|a, b| {
            a.joined_at()
                .cmp(&b.joined_at())
                .then_with(|| a.name().cmp(&b.name()))
        });
        sessions
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatroom_core::Connection;
    use chrono::TimeZone;
    use tokio::net::{TcpListener, TcpStream};

    /// Session backed by a real loopback socket; the peer end is returned to keep it open.
    async fn session() -> (Arc<Session>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        (Arc::new(Session::new(Connection::new(stream).unwrap())), peer)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = SessionRegistry::new();
        let (s, _peer) = session().await;
        assert!(registry.try_register(&s, "alice", at(1)));
        let found = registry.lookup("alice").unwrap();
        assert!(Arc::ptr_eq(&found, &s));
        assert_eq!(s.name(), Some("alice"));
        assert_eq!(s.joined_at(), Some(at(1)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let registry = SessionRegistry::new();
        let (a, _pa) = session().await;
        let (b, _pb) = session().await;
        assert!(registry.try_register(&a, "alice", at(1)));
        assert!(!registry.try_register(&b, "alice", at(2)));
        assert_eq!(b.identity(), None);
        assert!(Arc::ptr_eq(&registry.lookup("alice").unwrap(), &a));
    }

    #[tokio::test]
    async fn rejected_session_can_retry_with_new_name() {
        let registry = SessionRegistry::new();
        let (a, _pa) = session().await;
        let (b, _pb) = session().await;
        assert!(registry.try_register(&a, "alice", at(1)));
        assert!(!registry.try_register(&b, "alice", at(2)));
        assert!(registry.try_register(&b, "bob", at(3)));
        assert_eq!(registry.names(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn session_cannot_register_twice() {
        let registry = SessionRegistry::new();
        let (a, _pa) = session().await;
        assert!(registry.try_register(&a, "alice", at(1)));
        assert!(!registry.try_register(&a, "alias", at(2)));
        assert!(!registry.contains("alias"));
    }

    #[tokio::test]
    async fn remove_is_noop_when_absent() {
        let registry = SessionRegistry::new();
        assert!(registry.remove("ghost").is_none());
        let (a, _pa) = session().await;
        assert!(registry.try_register(&a, "alice", at(1)));
        assert!(registry.remove("alice").is_some());
        assert!(registry.remove("alice").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn snapshot_by_join_time_orders_ascending() {
        let registry = SessionRegistry::new();
        let (a, _pa) = session().await;
        let (b, _pb) = session().await;
        let (c, _pc) = session().await;
        assert!(registry.try_register(&a, "alice", at(30)));
        assert!(registry.try_register(&b, "bob", at(10)));
        assert!(registry.try_register(&c, "carol", at(20)));
        let order: Vec<_> = registry
            .snapshot_by_join_time()
            .iter()
            .map(|s| s.name().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["bob", "carol", "alice"]);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_mutation() {
        let registry = SessionRegistry::new();
        let (a, _pa) = session().await;
        let (b, _pb) = session().await;
        assert!(registry.try_register(&a, "alice", at(1)));
        let snap = registry.snapshot();
        assert!(registry.try_register(&b, "bob", at(2)));
        let _ = registry.remove("alice");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name(), Some("alice"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_has_one_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let mut sessions = Vec::new();
        for _ in 0..32 {
            sessions.push(session().await);
        }

        let barrier = Arc::new(tokio::sync::Barrier::new(sessions.len()));
        let mut tasks = Vec::new();
        for (s, _) in &sessions {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            let s = Arc::clone(s);
            tasks.push(tokio::spawn(async move {
                let _ = barrier.wait().await;
                registry.try_register(&s, "alice", at(1))
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
        let named = sessions.iter().filter(|(s, _)| s.identity().is_some()).count();
        assert_eq!(named, 1);
    }
}
