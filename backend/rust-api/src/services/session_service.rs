use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::metrics::SESSIONS_ACTIVE;
use crate::models::session::Session;

pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory session registry. Each session sits behind its own mutex, so handlers that
/// hold the lock for a whole operation serialize overlapping requests on one session
/// without blocking any other.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self) -> SessionHandle {
        let session = Session::new();
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), handle.clone());
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        tracing::info!("Created session {} ({} active)", id, sessions.len());

        handle
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        SESSIONS_ACTIVE.set(sessions.len() as i64);
        if removed {
            tracing::info!("Removed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops sessions idle for longer than the TTL. Sessions locked by an in-flight
    /// operation are skipped.
    pub async fn evict_idle(&self) -> usize {
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX);
        let cutoff = Utc::now() - ttl;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.last_active_at >= cutoff,
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        SESSIONS_ACTIVE.set(sessions.len() as i64);

        if evicted > 0 {
            tracing::info!(
                "Evicted {} idle session(s), {} remaining",
                evicted,
                sessions.len()
            );
        }
        evicted
    }

    /// Runs [`evict_idle`](Self::evict_idle) forever at the given interval.
    pub async fn run_eviction(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.evict_idle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        let handle = store.create().await;
        let id = handle.lock().await.id.clone();

        assert!(store.get(&id).await.is_some());
        assert_eq!(store.len().await, 1);
        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        assert!(store.get(&id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let store = SessionStore::new(Duration::from_secs(60));
        let stale = store.create().await;
        let fresh = store.create().await;
        stale.lock().await.last_active_at = Utc::now() - ChronoDuration::seconds(120);

        assert_eq!(store.evict_idle().await, 1);
        let fresh_id = fresh.lock().await.id.clone();
        assert!(store.get(&fresh_id).await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn locked_sessions_survive_eviction() {
        let store = SessionStore::new(Duration::from_secs(60));
        let handle = store.create().await;
        let mut guard = handle.lock().await;
        guard.last_active_at = Utc::now() - ChronoDuration::seconds(120);

        assert_eq!(store.evict_idle().await, 0);
        drop(guard);
        assert_eq!(store.evict_idle().await, 1);
    }
}
