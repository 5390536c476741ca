//! Per-DID sessions
//!
//! Every authenticated DID gets its own key/value session, created on first
//! access and held in memory only. The store is a bounded cache with an idle
//! TTL, so abandoned sessions age out; nothing survives a process restart.
//!
//! Isolation invariant: a call authenticated as DID A can reach only DID A's
//! session. The dispatcher hands each invocation the one session matching the
//! verified caller, and nothing else exposes the map.

use moka::sync::Cache;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum number of live sessions.
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;
/// Default idle lifetime before a session is evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

/// A mutable key/value store scoped to one DID.
///
/// Reads take a shared lock and writes an exclusive one, so concurrent reads
/// are safe and writes are serialized per session.
#[derive(Debug, Default)]
pub struct Session {
    data: RwLock<HashMap<String, Value>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

/// Concurrent map from DID to [`Session`].
#[derive(Clone)]
pub struct SessionManager {
    sessions: Cache<String, Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TTL)
    }

    /// Creates a manager with a bounded capacity and idle TTL.
    pub fn with_policy(max_sessions: u64, idle_ttl: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(idle_ttl)
                .build(),
        }
    }

    /// Returns the session for a DID, creating it on first access.
    pub fn get(&self, did: &str) -> Arc<Session> {
        self.sessions
            .get_with(did.to_string(), || Arc::new(Session::new()))
    }

    /// Drops a DID's session immediately.
    pub fn remove(&self, did: &str) {
        self.sessions.invalidate(did);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sessions_are_isolated_by_did() {
        let manager = SessionManager::new();
        let a = manager.get("did:wba:a.example");
        let b = manager.get("did:wba:b.example");

        a.set("k", json!("va"));
        assert_eq!(a.get("k"), Some(json!("va")));
        assert_eq!(b.get("k"), None);

        b.set("k", json!("vb"));
        assert_eq!(a.get("k"), Some(json!("va")));
    }

    #[test]
    fn session_is_shared_per_did() {
        let manager = SessionManager::new();
        manager.get("did:wba:a.example").set("count", json!(1));
        assert_eq!(manager.get("did:wba:a.example").get("count"), Some(json!(1)));

        assert_eq!(
            manager.get("did:wba:a.example").delete("count"),
            Some(json!(1))
        );
        assert!(manager.get("did:wba:a.example").is_empty());
    }

    #[test]
    fn remove_discards_state() {
        let manager = SessionManager::new();
        manager.get("did:wba:a.example").set("k", json!(true));
        manager.remove("did:wba:a.example");
        assert_eq!(manager.get("did:wba:a.example").get("k"), None);
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let manager = SessionManager::new();
        let session = manager.get("did:wba:a.example");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        session.set(format!("k{i}-{j}"), json!(j));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(session.len(), 800);
    }
}
